// src/lib.rs

//! Deep security scanner and grading engine.
//!
//! Give [`Scanner::scan`] a URL and a [`ScanMode`]; it probes the site's TLS endpoint,
//! HTTP security headers and redirects, DNS records, common TCP ports and domain
//! registration data, then returns a single [`ScanResult`] with findings, a 0 to 100
//! score and a letter grade.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use crate::config::ScanConfig;
pub use crate::core::models::{Finding, FindingType, Grade, ScanMode, ScanRequest, ScanResult, ScanStatus};
pub use crate::core::scanner::{NetworkProbes, ProbeSet, Scanner};
pub use crate::error::{ConfigError, ScanError};
