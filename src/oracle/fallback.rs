//! # Fallback Oracle Adapter
//!
//! ## Purpose
//! Deterministic rule-based answers for when the remote oracle is unavailable,
//! over budget, or not confident enough. Pattern matching on names and dates
//! plus similarity scores; zero I/O, so it can never fail and tests built on
//! it are reproducible.

use crate::errors::Result;
use crate::oracle::{
    DecisionOracle, OrderingDecision, OrderingQuery, RawAnswer, Relationship, RelationshipQuery,
};
use crate::similarity;
use crate::StatuteType;
use regex::Regex;
use std::sync::OnceLock;

fn amendment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bamendment\b").unwrap())
}

fn consolidation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bconsolidat(?:ion|ed|ing)\b").unwrap())
}

fn constitution_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bconstitution(?:al)?\b").unwrap())
}

fn name_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap())
}

/// Deterministic rule-based oracle
#[derive(Debug, Default)]
pub struct FallbackOracle;

impl FallbackOracle {
    pub fn new() -> Self {
        Self
    }

    /// Apply the relationship rules; infallible
    pub fn classify_rules(&self, query: &RelationshipQuery) -> RawAnswer<Relationship> {
        let a = &query.a;
        let b = &query.b;

        // Jurisdiction boundary is a hard constraint upstream; reaffirm it here
        // so the fallback never suggests a forbidden merge.
        if !a.jurisdiction.trim().eq_ignore_ascii_case(b.jurisdiction.trim()) {
            return RawAnswer {
                value: Relationship::Unrelated,
                confidence: 0.95,
            };
        }

        let name_sim = similarity::name_similarity(&a.name, &b.name);

        let mentions_constitution =
            constitution_regex().is_match(&a.name) && constitution_regex().is_match(&b.name);
        let a_constitutional = a.statute_type == StatuteType::Constitution;
        let b_constitutional = b.statute_type == StatuteType::Constitution;
        if mentions_constitution || (a_constitutional && constitution_regex().is_match(&b.name))
            || (b_constitutional && constitution_regex().is_match(&a.name))
        {
            return RawAnswer {
                value: Relationship::ConstitutionalLineage,
                confidence: 0.8,
            };
        }

        let amendment_marker = |facts: &crate::oracle::DocumentFacts| {
            facts.statute_type == StatuteType::Amendment || amendment_regex().is_match(&facts.name)
        };
        if (amendment_marker(a) || amendment_marker(b)) && name_sim >= 0.7 {
            return RawAnswer {
                value: Relationship::DirectAmendment,
                confidence: 0.75,
            };
        }

        if (consolidation_regex().is_match(&a.name) || consolidation_regex().is_match(&b.name))
            && name_sim >= 0.6
        {
            return RawAnswer {
                value: Relationship::Consolidation,
                confidence: 0.7,
            };
        }

        if name_sim >= 0.85 {
            return RawAnswer {
                value: Relationship::AmendmentChain,
                confidence: 0.65,
            };
        }

        RawAnswer {
            value: Relationship::Unrelated,
            confidence: 0.9,
        }
    }

    /// Apply the ordering rules; infallible
    pub fn order_rules(&self, query: &OrderingQuery) -> RawAnswer<OrderingDecision> {
        if let (Some(da), Some(db)) = (query.a.date, query.b.date) {
            if da != db {
                return RawAnswer {
                    value: if da < db {
                        OrderingDecision::ABeforeB
                    } else {
                        OrderingDecision::BBeforeA
                    },
                    confidence: 0.95,
                };
            }
        }

        // No usable dates: try the years embedded in statute names.
        let year_of = |name: &str| {
            name_year_regex()
                .captures(name)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i32>().ok())
        };
        if let (Some(ya), Some(yb)) = (year_of(&query.a.name), year_of(&query.b.name)) {
            if ya != yb {
                return RawAnswer {
                    value: if ya < yb {
                        OrderingDecision::ABeforeB
                    } else {
                        OrderingDecision::BBeforeA
                    },
                    confidence: 0.7,
                };
            }
        }

        RawAnswer {
            value: OrderingDecision::Unknown,
            confidence: 0.0,
        }
    }
}

#[async_trait::async_trait]
impl DecisionOracle for FallbackOracle {
    fn name(&self) -> &str {
        "rule-fallback"
    }

    async fn classify_relationship(
        &self,
        query: &RelationshipQuery,
    ) -> Result<RawAnswer<Relationship>> {
        Ok(self.classify_rules(query))
    }

    async fn order(&self, query: &OrderingQuery) -> Result<RawAnswer<OrderingDecision>> {
        Ok(self.order_rules(query))
    }
}
