//! The `utils` module provides shared definitions used across `roomhub`:
//! the error taxonomy and logging setup.

pub mod error;
pub mod logging;

pub use error::{AuthError, HubError, StoreError, TransportError};
