// src/core/mod.rs

// The `core` module holds everything the shell drives: the data model, the
// probes, the findings pipeline and the scan registry that ties them together.

/// Data structures shared across the crate: assets, scan status, issues and
/// the raw records probes return.
pub mod models;

pub mod error;

/// Typed scan options and the check table.
pub mod options;

/// Probe traits and their network-backed implementations (DNS, WHOIS,
/// subdomains, mail security, lookalikes, attribution).
pub mod scanner;

/// Static catalog of mail-security findings with remediation text.
pub mod knowledge_base;

pub mod spf;

/// Raw result store and its materialization into issues.
pub mod findings;

/// Scan registry, dispatcher and worker pool.
pub mod engine;
