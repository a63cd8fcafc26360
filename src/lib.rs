//! # rttp-caching
//!
//! HTTP response caching for the rttp async HTTP/1.1 framework: a fixed
//! `Cache-Control` policy, `Expires` helpers, and ETag conditional GET backed
//! by a pluggable key-value cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rttp_caching::{Pipeline, Response, Server, StatusCode};
//! use rttp_caching::caching::{Caching, CachingOptions, CachingReply, privacy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let caching = Caching::new(
//!         CachingOptions::new()
//!             .privacy(privacy::PUBLIC)
//!             .expires_in(300)
//!             .server_expires_in(600),
//!     );
//!
//!     let app = caching.install(Pipeline::new(|_ctx| async {
//!         Response::new(StatusCode::Ok)
//!             .etag("v1", Duration::from_secs(60))
//!             .body("Hello, World!")
//!     }));
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(app).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod caching;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

pub use caching::{Caching, CachingOptions, CachingReply};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Pipeline;
pub use server::{Server, ServerError};
