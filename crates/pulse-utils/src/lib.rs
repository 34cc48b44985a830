//! Shared utilities for pulse
//!
//! This crate provides common functionality used across the pulse workspace,
//! including logging setup and environment-backed configuration helpers.

pub mod config;
pub mod logging;

pub use config::{EnvError, env_optional, env_parse, load_dotenv};
pub use logging::{init_tracing, init_tracing_with_default};
