//! Concrete collaborators for the Synapse engine.
//!
//! - [`HttpWorkflowInvoker`] posts workflow inputs to HTTP endpoints.
//! - [`LoggingInvoker`] logs invocations instead of running them (dry runs).
//! - [`SpoolEmailSource`] reads emails dropped as JSON files into a directory.
//! - [`CursorFile`] keeps the email cursor across runs.

pub mod cursor;
pub mod error;
pub mod http_invoker;
pub mod logging;
pub mod spool;

pub use cursor::CursorFile;
pub use error::{AdapterError, Result};
pub use http_invoker::HttpWorkflowInvoker;
pub use logging::LoggingInvoker;
pub use spool::SpoolEmailSource;
