//! ESG extraction server library.
//!
//! Upload, AI extraction, staging, human reconciliation, classification,
//! typed transformation and audited commit of ESG records.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
