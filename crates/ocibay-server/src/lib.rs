//! # ocibay-server
//!
//! HTTP surface of the ocibay gateway.
//!
//! A single request names an image (and optionally a platform); the server
//! either streams a previously built archive straight from the cache
//! directory or coordinates one build through the single-flight group and
//! then streams the result. Everything user-controlled is validated before
//! it touches a filename or an outbound URL.
//!
//! ## Architecture
//!
//! ```text
//! GET /image?name=alpine:latest
//!        │
//!        ▼
//!   handlers ──► cache (hit? stream with Range support)
//!        │
//!        ▼ miss
//!   flight (one build per fingerprint) ──► ocibay_image::ImageSaver
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod flight;
pub mod handlers;
pub mod server;
pub mod stats;

pub use config::{AuthConfig, Config};
pub use error::{ApiError, Result};
pub use server::GatewayServer;
