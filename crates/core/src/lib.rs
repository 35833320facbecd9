//! Cobble Core - Shared error taxonomy and identifiers

mod error;
mod idgen;
mod types;

pub use error::*;
pub use idgen::*;
pub use types::*;
