//! # Decision Oracle Module
//!
//! ## Purpose
//! Defines the common interface for semantic-relationship oracles and provides
//! the gateway that every grouping/ordering decision routes through, plus two
//! adapters: a deterministic rule-based fallback and an HTTP production client.
//!
//! ## Architecture
//! - `DecisionOracle` trait: common interface for all adapters
//! - `gateway.rs`: caching, rate limiting, circuit breaking, fallback routing
//! - `fallback.rs`: deterministic rules over names, dates, and similarity
//! - `remote.rs`: hosted classifier adapter (reqwest)
//!
//! Tests run exclusively against the fallback adapter so results stay
//! deterministic; the remote adapter is covered by contract tests only.

pub mod fallback;
pub mod gateway;
pub mod remote;

pub use fallback::FallbackOracle;
pub use gateway::OracleGateway;
pub use remote::RemoteOracle;

use crate::errors::Result;
use crate::utils::stable_hash;
use crate::{Statute, StatuteType};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Semantic relationship between two statutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Members of one amendment chain (e.g. act and later amending acts)
    AmendmentChain,
    /// One document directly amends the other
    DirectAmendment,
    /// One document consolidates the other
    Consolidation,
    /// Constitutional-amendment lineage
    ConstitutionalLineage,
    Unrelated,
}

impl Relationship {
    /// Lineage relationships justify merging groups regardless of name similarity
    pub fn is_lineage(&self) -> bool {
        !matches!(self, Relationship::Unrelated)
    }
}

/// Chronological ordering verdict for a document pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingDecision {
    ABeforeB,
    BBeforeA,
    Unknown,
}

/// Raw adapter answer before gateway policy is applied
#[derive(Debug, Clone, Copy)]
pub struct RawAnswer<T> {
    pub value: T,
    pub confidence: f64,
}

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Oracle,
    Cache,
    Fallback,
}

/// Final gateway answer with provenance
#[derive(Debug, Clone, Copy)]
pub struct OracleAnswer<T> {
    pub value: T,
    pub confidence: f64,
    pub source: AnswerSource,
    /// Set when the answer came from the fallback path or scored below the
    /// configured confidence threshold; surfaced in the run summary
    pub low_confidence: bool,
}

/// The fields of a statute an oracle is allowed to see
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFacts {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub statute_type: StatuteType,
    pub jurisdiction: String,
}

impl DocumentFacts {
    pub fn from_statute(statute: &Statute) -> Self {
        Self {
            name: statute.name.clone(),
            date: statute.promulgation_date,
            statute_type: statute.statute_type,
            jurisdiction: statute.jurisdiction.clone(),
        }
    }

    fn normalized_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.name.trim().to_lowercase(),
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            self.statute_type.as_str(),
            self.jurisdiction.trim().to_lowercase(),
        )
    }
}

/// Relationship classification query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipQuery {
    pub a: DocumentFacts,
    pub b: DocumentFacts,
}

impl RelationshipQuery {
    pub fn new(a: &Statute, b: &Statute) -> Self {
        Self {
            a: DocumentFacts::from_statute(a),
            b: DocumentFacts::from_statute(b),
        }
    }

    /// Stable content hash of the normalized query, used as the cache key
    pub fn cache_key(&self) -> u64 {
        stable_hash(&format!(
            "relationship:{}::{}",
            self.a.normalized_key(),
            self.b.normalized_key()
        ))
    }
}

/// Chronological ordering query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingQuery {
    pub a: DocumentFacts,
    pub b: DocumentFacts,
    /// Free-text context, e.g. the group's base name
    pub context: String,
}

impl OrderingQuery {
    pub fn new(a: &Statute, b: &Statute, context: impl Into<String>) -> Self {
        Self {
            a: DocumentFacts::from_statute(a),
            b: DocumentFacts::from_statute(b),
            context: context.into(),
        }
    }

    /// Stable content hash of the normalized query, used as the cache key
    pub fn cache_key(&self) -> u64 {
        stable_hash(&format!(
            "order:{}::{}::{}",
            self.a.normalized_key(),
            self.b.normalized_key(),
            self.context.trim().to_lowercase(),
        ))
    }
}

/// Trait for semantic-relationship oracles
///
/// Adapters answer two query types; confidence interpretation and all
/// cost/reliability policy live in [`OracleGateway`], not in adapters.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &str;

    /// Classify the semantic relationship between two documents
    async fn classify_relationship(
        &self,
        query: &RelationshipQuery,
    ) -> Result<RawAnswer<Relationship>>;

    /// Decide which of two documents comes first chronologically
    async fn order(&self, query: &OrderingQuery) -> Result<RawAnswer<OrderingDecision>>;
}

/// Observability counters for the gateway; every call is counted, cached or not
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub queries: AtomicU64,
    pub oracle_calls: AtomicU64,
    pub cache_hits: AtomicU64,
    pub fallback_invocations: AtomicU64,
    pub timeouts: AtomicU64,
}

/// Point-in-time copy of the gateway counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    pub queries: u64,
    pub oracle_calls: u64,
    pub cache_hits: u64,
    pub fallback_invocations: u64,
    pub timeouts: u64,
}

impl GatewayStats {
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            oracle_calls: self.oracle_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fallback_invocations: self.fallback_invocations.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
