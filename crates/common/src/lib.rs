//! Common types for quill-rs.
//!
//! This crate holds the pieces shared by every other crate in the
//! workspace: the error taxonomy and the layered client configuration.

pub mod config;
pub mod error;

pub use config::{ApiConfig, ClientConfig, RetryConfig};
pub use error::{ClientError, ClientResult};
