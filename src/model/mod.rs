//! Model payloads carried through the pipeline.
//!
//! The pipeline core treats models as opaque typed payloads with a
//! serialization hook; only the fields the providers and built-in stages
//! exercise are represented here. Anything implementing the serde traits can
//! ride a provider and the cache.

mod build;
mod code;
mod variability;

pub use build::BuildModel;
pub use code::{CodeElement, SourceFile};
pub use variability::{VariabilityModel, VariabilityVariable};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A model payload: serializable for the cache, shareable across stages.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Model for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}
