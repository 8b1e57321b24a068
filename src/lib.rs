// src/lib.rs

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::EngineConfig;
pub use crate::core::engine::{Engine, ScanRequest};
pub use crate::core::error::{EngineError, EngineResult};
