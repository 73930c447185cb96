//! The variability model: the configuration space of the analyzed system.

use crate::writer::Record;
use serde::{Deserialize, Serialize};

/// A single configuration variable (e.g. a Kconfig option).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariabilityVariable {
    /// Variable name, e.g. `CONFIG_X86`.
    pub name: String,

    /// Type of the variable, e.g. `bool` or `tristate`.
    #[serde(default = "default_variable_type")]
    pub variable_type: String,
}

fn default_variable_type() -> String {
    "bool".to_string()
}

impl VariabilityVariable {
    /// Create a boolean variable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable_type: default_variable_type(),
        }
    }

    /// Create a variable with an explicit type.
    pub fn with_type(name: impl Into<String>, variable_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable_type: variable_type.into(),
        }
    }
}

/// The set of configuration variables extracted from the target system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariabilityModel {
    /// All variables, in extraction order.
    pub variables: Vec<VariabilityVariable>,
}

impl VariabilityModel {
    /// Create a model from a list of variables.
    pub fn new(variables: Vec<VariabilityVariable>) -> Self {
        Self { variables }
    }

    /// Create a model of boolean variables from their names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: names.into_iter().map(VariabilityVariable::new).collect(),
        }
    }

    /// Number of variables in the model.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the model has no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate over the variable names.
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }
}

impl Record for VariabilityModel {
    fn to_record(&self) -> String {
        format!("VariabilityModel with {} variables", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names() {
        let model = VariabilityModel::from_names(["Var_A", "Var_B"]);

        assert_eq!(model.len(), 2);
        assert_eq!(
            model.variable_names().collect::<Vec<_>>(),
            vec!["Var_A", "Var_B"]
        );
        assert_eq!(model.variables[0].variable_type, "bool");
    }

    #[test]
    fn test_serde_roundtrip() {
        let model = VariabilityModel::new(vec![
            VariabilityVariable::new("CONFIG_A"),
            VariabilityVariable::with_type("CONFIG_B", "tristate"),
        ]);

        let json = serde_json::to_string(&model).unwrap();
        let back: VariabilityModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}
