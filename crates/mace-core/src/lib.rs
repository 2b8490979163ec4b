//! Core building blocks shared by every MACE component: the domain model,
//! the error taxonomy, the layered configuration loader, and the SQLite
//! persistence layer.

pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod store;

pub use error::{MaceError, MaceResult};
pub use model::*;
