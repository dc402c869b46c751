//! HTTP transport for the research job service.

pub mod config;
pub mod http;

pub use config::{ClientConfig, ClientError};
pub use http::{HttpJobService, error_from_response};
