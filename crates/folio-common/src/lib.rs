//! Shared plumbing for the folio export tools: errors, configuration and telemetry.

pub mod config;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::config::{ExportConfig, MathDelimiters, MathOutput, Retypeset};
pub use crate::error::{ConfigError, ExportError, Result};
