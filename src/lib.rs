pub mod bundle;
pub mod cli;
pub mod error;
pub mod manifest;
pub mod tee;

pub use error::{BundleError, Result};
