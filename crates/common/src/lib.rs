//! Common utilities and types shared across Sheetwatch components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
