//! `delve-core`: data model of remote research jobs.
//!
//! This crate has no runtime concerns: it only describes what travels between
//! a caller, the polling engine and the remote job service.

pub mod error;
pub mod id;
pub mod model;

pub use error::{ErrorCode, ModelError, PollingError, RemoteError, ServiceError};
pub use id::{JobId, SessionId};
pub use model::{
    CreateJobRequest, CreateJobResponse, JobStatus, ProgressSnapshot, ResearchDepth,
    ResearchRequest, ResearchResult, StatusResponse,
};
