//! The `utils` module provides the pieces shared by every layer of the relay:
//! the error taxonomy and logging setup.

pub mod error;
pub mod logging;

pub use error::RelayError;
