//! Update trigger surface for reposync.
//!
//! Provides:
//! - Synchronous trigger: runs an update and returns its result
//! - Asynchronous trigger: starts a background job, deduplicated per repository
//! - Job status query over the job ledger
//! - Machine-readable success and error payloads

pub mod response;
pub mod service;

pub use response::{AsyncTriggerResponse, ErrorCode, ErrorResponse, UpdateResponse};
pub use service::{ServiceConfig, UpdateService};
