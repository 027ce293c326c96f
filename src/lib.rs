//! # Pedigree Compatibility
//!
//! Breeding compatibility engine for registered animals. Given two candidate
//! partners it decides whether they may be paired, based on how closely
//! related they are and whether their hip dysplasia grades are an allowed
//! combination under the active breeding policy.
//!
//! ## Features
//!
//! - Breadth-first ancestry traversal with a generation bound and cycle-safe
//!   visited set
//! - Wright's coefficient of relationship with parent/child and sibling
//!   shortcuts
//! - Fixed 5x5 dysplasia compatibility matrix, fail-closed for unset pairings
//! - Aggregate verdict over gender, inbreeding limit and dysplasia grades
//! - Per-lookup timeouts and concurrent root fetching
//! - Pedigree loading from CSV, TSV and JSON exports
//! - Multiple report formats (text, HTML, CSV, JSON, TSV)

pub mod ancestry;
pub mod compatibility;
pub mod config;
pub mod dysplasia;
pub mod engine;
pub mod error;
pub mod output;
pub mod parsers;
pub mod relatedness;
pub mod repository;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export key types
pub use ancestry::{common_ancestors, AncestryMap, AncestryTreeBuilder};
pub use compatibility::CompatibilityChecker;
pub use config::{EngineSettings, PedigreeConfig};
pub use dysplasia::DysplasiaEvaluator;
pub use engine::PedigreeEngine;
pub use error::{PedigreeError, RepositoryError, Result};
pub use output::{ReportFormat, ReportGenerator};
pub use parsers::{PedigreeFileParser, PedigreeFormat};
pub use relatedness::RelatednessCalculator;
pub use repository::{
    InMemoryPedigree, InMemoryPolicyStore, PedigreeRepository, PolicyStore, TimedRepository,
};
pub use types::*;
