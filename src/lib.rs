//! # Statute Normalization Pipeline
//!
//! ## Overview
//! This library deduplicates, groups, and chronologically versions a corpus of
//! legal-statute documents, then decomposes each statute into individually
//! versioned sections with active/inactive status.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `similarity`: Normalized string and content similarity scoring
//! - `oracle`: Decision oracle gateway with caching, rate limiting, and fallback
//! - `dedup`: Exact/near-duplicate resolution with a removal audit log
//! - `grouping`: Same-instrument clustering by base name and oracle lineage
//! - `versioning`: Chronological ordering and version-label assignment
//! - `timeline`: Section-level timelines with expiration-aware status
//! - `pipeline`: Staged batch orchestration with per-stage checkpoints
//! - `storage`: Persistent checkpoint store
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Normalized statute records (JSON) from an upstream cleanup stage
//! - **Output**: Deduplicated statutes plus removal log, grouped and versioned
//!   statutes, and exported section-version timelines
//! - **Determinism**: Re-running any stage on identical input reproduces
//!   identical groups, labels, and flags
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use statute_pipeline::{Config, Pipeline};
//! use statute_pipeline::oracle::FallbackOracle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let pipeline = Pipeline::new(config, Arc::new(FallbackOracle::new()))?;
//!     let summary = pipeline.run_all(Vec::new()).await?;
//!     println!("removed {} duplicates", summary.duplicates_removed);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod dedup;
pub mod errors;
pub mod grouping;
pub mod oracle;
pub mod pipeline;
pub mod similarity;
pub mod storage;
pub mod timeline;
pub mod versioning;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use errors::{PipelineError, Result};
pub use pipeline::{Pipeline, RunSummary};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for statutes
pub type StatuteId = Uuid;

/// Unique identifier for same-instrument groups
pub type GroupId = Uuid;

/// Document type of a legal instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatuteType {
    Constitution,
    Act,
    Ordinance,
    Amendment,
    Rule,
    Order,
    Regulation,
    Unknown,
}

impl StatuteType {
    /// Whether instruments of this type lapse after a fixed period without renewal
    pub fn is_time_limited(&self) -> bool {
        matches!(self, StatuteType::Ordinance)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatuteType::Constitution => "constitution",
            StatuteType::Act => "act",
            StatuteType::Ordinance => "ordinance",
            StatuteType::Amendment => "amendment",
            StatuteType::Rule => "rule",
            StatuteType::Order => "order",
            StatuteType::Regulation => "regulation",
            StatuteType::Unknown => "unknown",
        }
    }
}

impl Default for StatuteType {
    fn default() -> Self {
        StatuteType::Unknown
    }
}

/// Confidence attached to a promulgation date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateConfidence {
    /// Date taken directly from the gazette record
    High,
    /// Date inferred from the name or surrounding text
    Low,
    /// No recoverable date
    Missing,
}

impl Default for DateConfidence {
    fn default() -> Self {
        DateConfidence::Missing
    }
}

/// A single section of a statute version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section identifier/number, e.g. "6" or "12A"
    pub number: String,
    /// Short label or marginal definition, e.g. "High Treason"
    pub definition: String,
    /// Full body text
    pub text: String,
}

/// A statute document as supplied by the upstream normalization stage
///
/// Read-only to this core except for the fields written by each stage:
/// `base_name` (grouping), `group_id` (grouping), `version_label` (versioning).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statute {
    pub id: StatuteId,
    /// Raw statute name as ingested
    pub name: String,
    /// Derived grouping key; set by the grouping stage
    pub base_name: Option<String>,
    /// Jurisdiction/province tag; cross-jurisdiction merges are forbidden
    pub jurisdiction: String,
    /// Promulgation date, when recoverable
    pub promulgation_date: Option<NaiveDate>,
    pub date_confidence: DateConfidence,
    pub statute_type: StatuteType,
    /// Free-text preamble
    pub preamble: String,
    pub sections: Vec<Section>,
    /// Position in the original ingestion order; deterministic tie-break
    pub ingestion_seq: u64,
    /// Set by the grouping stage
    pub group_id: Option<GroupId>,
    /// Set by the versioning stage, e.g. "Original", "First Amendment"
    pub version_label: Option<String>,
}

/// Raw input record prior to structural validation
///
/// Required: `id`, `name`, `jurisdiction`. Everything else is optional; this
/// core validates structural completeness only, not raw-field correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatute {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub promulgation_date: Option<NaiveDate>,
    #[serde(default)]
    pub date_confidence: Option<DateConfidence>,
    #[serde(default)]
    pub statute_type: Option<StatuteType>,
    #[serde(default)]
    pub preamble: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl RawStatute {
    /// Validate structural completeness and promote to a `Statute`
    ///
    /// `ingestion_seq` records the record's position in the input batch and is
    /// used everywhere an ordering tie must be broken deterministically.
    pub fn into_statute(self, ingestion_seq: u64) -> Result<Statute> {
        let id = self.id.ok_or_else(|| PipelineError::DataError {
            id: format!("seq {}", ingestion_seq),
            reason: "missing required field 'id'".into(),
        })?;
        let name = match self.name {
            Some(n) if !n.trim().is_empty() => n,
            _ => {
                return Err(PipelineError::DataError {
                    id: id.to_string(),
                    reason: "missing required field 'name'".into(),
                })
            }
        };
        let jurisdiction = match self.jurisdiction {
            Some(j) if !j.trim().is_empty() => j,
            _ => {
                return Err(PipelineError::DataError {
                    id: id.to_string(),
                    reason: "missing required field 'jurisdiction'".into(),
                })
            }
        };

        let date_confidence = match (self.date_confidence, self.promulgation_date) {
            (Some(c), _) => c,
            (None, Some(_)) => DateConfidence::High,
            (None, None) => DateConfidence::Missing,
        };

        Ok(Statute {
            id,
            name,
            base_name: None,
            jurisdiction,
            promulgation_date: self.promulgation_date,
            date_confidence,
            statute_type: self.statute_type.unwrap_or_default(),
            preamble: self.preamble.unwrap_or_default(),
            sections: self.sections,
            ingestion_seq,
            group_id: None,
            version_label: None,
        })
    }
}

/// A cluster of statutes believed to be the same legal instrument over time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Shared jurisdiction of every member (hard invariant)
    pub jurisdiction: String,
    /// Representative base name (from the earliest-ingested member)
    pub base_name: String,
    /// Member statute ids, sorted for reproducibility
    pub member_ids: Vec<StatuteId>,
}
