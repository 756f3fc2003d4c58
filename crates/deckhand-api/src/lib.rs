//! deckhand deploy API
//!
//! HTTP front end for the deploy pipeline.
//!
//! # Endpoints
//!
//! - `POST /deploy` - Deploy an application version, answers with a plain text report
//! - `GET /deploystatus/{namespace}/{deployName}` - Rollout status of a deployment
//! - `GET /isalive` - Liveness check

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod service;

pub use config::{Cli, ServerConfig};
pub use error::{Error, Result};
pub use server::{router, start_server, AppState};
pub use service::{DeployRunner, DeployStatusViewer};
