// src/core/mod.rs

// Root of the scanning engine. Everything the front end needs is re-exported from lib.rs.

/// Data structures shared by every probe and the final `ScanResult`.
pub mod models;

/// Target parsing, domain splitting and host resolution.
pub mod normalizer;

/// The individual probes and the orchestrator that schedules them.
pub mod scanner;

/// Weighted aggregation of probe results into a score and grade.
pub mod scoring;

/// Static tables: header checklist, port catalogue, technology signatures and registry
/// endpoints.
pub mod knowledge_base;
