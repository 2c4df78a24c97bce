//! Pipeline E2E test suite.
//!
//! Drives the HTTP API end-to-end against the in-memory store, the in-memory
//! object store and a scripted AI service. No external services are needed,
//! except for the ignored PostgreSQL store tests in `test_store`.
//!
//! Run with: cargo test --test pipeline_e2e

mod test_helpers;

mod test_approval;
mod test_auth;
mod test_extraction;
mod test_rejection;
mod test_store;
mod test_upload;
