//! Issuegate core library.
//!
//! This crate reconciles FHIR validator reports with declared suppressions
//! ("ignored issues") and decides whether a validation run passes.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective configuration resolution.
//! - `error`: Error taxonomy shared by all stages.
//! - `models`: Severities, issues, defects, and run results; rule file shapes.
//! - `xml`: Streaming XML tokenizer with source positions and a small tree.
//! - `spans`: Element span mapping for XML and JSON resources.
//! - `resolve`: Innermost element lookup for a position.
//! - `rules`: Suppression rule loading, wildcard patterns, activation.
//! - `source`: Source resource loading and resource id discovery.
//! - `engine`: Per-resource reconciliation of issues against rules.
//! - `report`: OperationOutcome report reader.
//! - `run`: Report driver and verdict aggregation.
//! - `output`: Human/JSON printers and the statistics file.
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod output;
pub mod report;
pub mod resolve;
pub mod rules;
pub mod run;
pub mod source;
pub mod spans;
pub mod xml;
