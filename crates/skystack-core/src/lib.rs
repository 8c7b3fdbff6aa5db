//! Core configuration model for skystack projects.
//!
//! This crate owns everything that exists before an engine runs: finding the
//! project on disk, loading its YAML tree into a typed model, the `ref:`
//! grammar used to wire configuration together, and scope expressions for
//! narrowing commands. It knows nothing about providers or stacks.

pub mod discovery;
pub mod error;
pub mod loader;
pub mod model;
pub mod reference;
pub mod scope;

pub use discovery::{PROJECT_ROOT_ENV, find_project_root};
pub use error::{CoreError, Result};
pub use loader::{PROJECT_FILE, load_project};
pub use model::*;
pub use reference::{REF_PREFIX, Ref};
pub use scope::Scope;
