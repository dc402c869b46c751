//! Process-wide logging setup shared by the binaries.
//!
//! Call [`init`] once at startup with a [`LogConfig`]; later calls are no-ops.

mod tracing;

pub use self::tracing::{ENV_LOG_FORMAT, LogConfig, LogFormat, UnknownLogFormat, init};
