//! Shared utilities for the Forge scheduling backend.
mod errors;
mod id;
mod namegenerator;

pub use errors::{Error, ErrorKind, ForgeResult};
pub use id::{GetName, Id};
pub use namegenerator::NameGenerator;
