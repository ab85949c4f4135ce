//! # OffKit Common
//!
//! Shared logging configuration for the OffKit cache engine crates.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
