//! # edgekit
//!
//! An edge layer for HTTP services: a per-client fixed-window rate limiter
//! and a TTL response cache, composed as async middleware in front of an
//! origin handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgekit::clock::SystemClock;
//! use edgekit::config::{EdgeConfig, EdgeState};
//! use edgekit::context::Context;
//! use edgekit::server::Server;
//! use edgekit::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EdgeConfig::default().apply_env()?;
//!     let state = EdgeState::new(Arc::new(SystemClock));
//!     let pipeline = config.pipeline(&state, |ctx: Context| async move {
//!         Response::new(StatusCode::Ok).body(format!("origin saw {}", ctx.request().path()))
//!     });
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     println!("Listening on http://{}", server.local_addr());
//!     server.serve(Arc::new(pipeline)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod security;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
