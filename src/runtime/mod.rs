//! API surface consumed by the HTTP layer.

pub mod api;

pub use api::{health, notify_changed, status, submit_adhoc, AdhocSubmission, Health, TaskSubmitted};
