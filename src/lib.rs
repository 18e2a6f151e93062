//! forge-bridge library.
//!
//! Keeps GitHub pull requests and GitLab CI pipelines in sync: webhook
//! handlers, platform clients and the reconciliation of remote resources.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod platform;
pub mod services;
