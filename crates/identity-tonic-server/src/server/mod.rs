//! Server-side building blocks of the identity service.
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`auth`] - Credential interceptor attaching an `IdentityContext`.
//! - [`resolver`] - Identity providers and the optional identity cache.
//! - [`service`] - The `IdentityService` handler, deadlines and drain.
//! - [`telemetry`] - Logging, tracing and metrics.

pub mod auth;
pub mod config;
pub mod resolver;
pub mod service;
pub mod telemetry;
