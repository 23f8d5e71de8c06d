//! # Duplicate Resolver
//!
//! ## Purpose
//! Removes exact and near-duplicate statute documents within a jurisdiction,
//! retaining the most authoritative instance of each.
//!
//! ## Algorithm
//! Each statute gets a fingerprint: its normalized name (lowercase, punctuation
//! and legal suffixes stripped) and the concatenation of all section texts. Two
//! statutes are duplicates when name similarity and content similarity both
//! clear their thresholds. Among duplicates the survivor is the one with the
//! most recent valid date; ties go to the most complete section set, then the
//! larger body, then the earliest-ingested copy for determinism.
//!
//! Every removal is recorded with the surviving counterpart's id and the
//! similarity scores that triggered it — the audit trail is a hard output
//! requirement, not optional telemetry.

use crate::config::DedupConfig;
use crate::similarity;
use crate::utils::UnionFind;
use crate::{Statute, StatuteId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Audit record for one removed duplicate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub removed_id: StatuteId,
    pub removed_name: String,
    pub retained_id: StatuteId,
    pub name_similarity: f64,
    pub content_similarity: f64,
}

/// Result of a deduplication pass
#[derive(Debug)]
pub struct DedupOutcome {
    /// Surviving statutes in ingestion order
    pub retained: Vec<Statute>,
    /// Audit log of removed duplicates
    pub removals: Vec<RemovalRecord>,
}

struct Fingerprint {
    name_key: String,
    content: String,
}

/// Near-duplicate statute resolver
pub struct DuplicateResolver {
    config: DedupConfig,
}

impl DuplicateResolver {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Deduplicate a batch of statutes
    ///
    /// Comparison only happens within a jurisdiction; pairwise scoring is
    /// CPU-bound and runs on the rayon pool.
    pub fn resolve(&self, statutes: Vec<Statute>) -> DedupOutcome {
        let mut by_jurisdiction: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, statute) in statutes.iter().enumerate() {
            by_jurisdiction
                .entry(statute.jurisdiction.trim().to_lowercase())
                .or_default()
                .push(idx);
        }

        let fingerprints: Vec<Fingerprint> = statutes.iter().map(fingerprint).collect();

        let mut clusters = UnionFind::new(statutes.len());
        for indices in by_jurisdiction.values() {
            let pairs = self.duplicate_pairs(indices, &fingerprints);
            for (i, j, name_sim, content_sim) in pairs {
                tracing::debug!(
                    a = %statutes[i].name,
                    b = %statutes[j].name,
                    name_sim,
                    content_sim,
                    "duplicate pair detected"
                );
                clusters.union(i, j);
            }
        }

        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for idx in 0..statutes.len() {
            members.entry(clusters.find(idx)).or_default().push(idx);
        }

        let mut retained_idx: Vec<usize> = Vec::new();
        let mut removals: Vec<RemovalRecord> = Vec::new();

        for cluster in members.values() {
            let survivor = *cluster
                .iter()
                .max_by(|&&a, &&b| retention_rank(&statutes[a]).cmp(&retention_rank(&statutes[b])))
                .unwrap_or_else(|| unreachable!("clusters are never empty"));
            retained_idx.push(survivor);

            for &idx in cluster {
                if idx == survivor {
                    continue;
                }
                let name_sim = similarity::edit_similarity(
                    &fingerprints[idx].name_key,
                    &fingerprints[survivor].name_key,
                )
                .max(similarity::token_overlap(
                    &fingerprints[idx].name_key,
                    &fingerprints[survivor].name_key,
                ));
                let content_sim = similarity::token_overlap(
                    &fingerprints[idx].content,
                    &fingerprints[survivor].content,
                );
                tracing::info!(
                    removed = %statutes[idx].name,
                    retained = %statutes[survivor].name,
                    "removing duplicate statute"
                );
                removals.push(RemovalRecord {
                    removed_id: statutes[idx].id,
                    removed_name: statutes[idx].name.clone(),
                    retained_id: statutes[survivor].id,
                    name_similarity: name_sim,
                    content_similarity: content_sim,
                });
            }
        }

        retained_idx.sort_unstable();
        let retained_set: std::collections::HashSet<usize> = retained_idx.iter().copied().collect();
        let retained: Vec<Statute> = statutes
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| retained_set.contains(idx))
            .map(|(_, s)| s)
            .collect();

        removals.sort_by_key(|r| r.removed_id);

        DedupOutcome { retained, removals }
    }

    /// Score all pairs in one jurisdiction bucket in parallel
    fn duplicate_pairs(
        &self,
        indices: &[usize],
        fingerprints: &[Fingerprint],
    ) -> Vec<(usize, usize, f64, f64)> {
        let name_threshold = self.config.name_threshold;
        let content_threshold = self.config.content_threshold;

        (0..indices.len())
            .into_par_iter()
            .flat_map_iter(|a| {
                let i = indices[a];
                indices[a + 1..].iter().filter_map(move |&j| {
                    let name_sim = similarity::edit_similarity(
                        &fingerprints[i].name_key,
                        &fingerprints[j].name_key,
                    )
                    .max(similarity::token_overlap(
                        &fingerprints[i].name_key,
                        &fingerprints[j].name_key,
                    ));
                    if name_sim < name_threshold {
                        return None;
                    }
                    let content_sim = similarity::token_overlap(
                        &fingerprints[i].content,
                        &fingerprints[j].content,
                    );
                    if content_sim < content_threshold {
                        return None;
                    }
                    Some((i, j, name_sim, content_sim))
                })
            })
            .collect()
    }
}

fn fingerprint(statute: &Statute) -> Fingerprint {
    let mut content = String::new();
    for section in &statute.sections {
        content.push_str(&similarity::normalize_text(&section.text));
        content.push(' ');
    }
    Fingerprint {
        name_key: similarity::normalize_name(&statute.name),
        content,
    }
}

/// Ordering key for survivor selection; the maximum wins
fn retention_rank(statute: &Statute) -> (Option<chrono::NaiveDate>, usize, usize, std::cmp::Reverse<u64>) {
    let body_len: usize = statute.sections.iter().map(|s| s.text.len()).sum();
    (
        statute.promulgation_date,
        statute.sections.len(),
        body_len,
        std::cmp::Reverse(statute.ingestion_seq),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DateConfidence, Section, StatuteType};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn statute(
        name: &str,
        jurisdiction: &str,
        date: Option<NaiveDate>,
        sections: Vec<Section>,
        seq: u64,
    ) -> Statute {
        Statute {
            id: Uuid::new_v4(),
            name: name.to_string(),
            base_name: None,
            jurisdiction: jurisdiction.to_string(),
            promulgation_date: date,
            date_confidence: if date.is_some() {
                DateConfidence::High
            } else {
                DateConfidence::Missing
            },
            statute_type: StatuteType::Act,
            preamble: String::new(),
            sections,
            ingestion_seq: seq,
            group_id: None,
            version_label: None,
        }
    }

    fn section(number: &str, text: &str) -> Section {
        Section {
            number: number.to_string(),
            definition: String::new(),
            text: text.to_string(),
        }
    }

    const BODY: &str = "whoever commits an act of terrorism shall be punished with imprisonment \
                        for a term which may extend to fourteen years and shall also be liable to fine";

    #[test]
    fn near_duplicates_collapse_to_one() {
        let date = NaiveDate::from_ymd_opt(1997, 8, 14);
        let original = statute(
            "Anti-Terrorism Act 1997",
            "federal",
            date,
            vec![section("1", BODY)],
            0,
        );
        // Same date, near-identical body, one extra section: the more complete
        // copy survives.
        let amendment = statute(
            "Anti-Terrorism Act 1997 (Amendment)",
            "federal",
            date,
            vec![section("1", BODY), section("2", "short title and commencement")],
            1,
        );
        let amendment_id = amendment.id;
        let original_id = original.id;

        let outcome = DuplicateResolver::new(DedupConfig::default()).resolve(vec![original, amendment]);

        assert_eq!(outcome.retained.len(), 1);
        assert_eq!(outcome.retained[0].id, amendment_id);
        assert_eq!(outcome.removals.len(), 1);
        let record = &outcome.removals[0];
        assert_eq!(record.removed_id, original_id);
        assert_eq!(record.retained_id, amendment_id);
        assert!(record.name_similarity >= 0.9);
        assert!(record.content_similarity >= 0.85);
    }

    #[test]
    fn most_recent_date_wins() {
        let older = statute(
            "Companies Ordinance 1984",
            "federal",
            NaiveDate::from_ymd_opt(1984, 10, 8),
            vec![section("1", BODY)],
            0,
        );
        let newer = statute(
            "Companies Ordinance 1984",
            "federal",
            NaiveDate::from_ymd_opt(1985, 1, 2),
            vec![section("1", BODY)],
            1,
        );
        let newer_id = newer.id;

        let outcome = DuplicateResolver::new(DedupConfig::default()).resolve(vec![older, newer]);
        assert_eq!(outcome.retained.len(), 1);
        assert_eq!(outcome.retained[0].id, newer_id);
    }

    #[test]
    fn different_content_is_not_a_duplicate() {
        let a = statute(
            "Income Tax Act 1922",
            "federal",
            None,
            vec![section("1", "tax shall be charged on the total income of the previous year")],
            0,
        );
        let b = statute(
            "Income Tax Act 2001",
            "federal",
            None,
            vec![section("1", "a resident company shall pay advance tax on quarterly instalments computed differently")],
            1,
        );

        let outcome = DuplicateResolver::new(DedupConfig::default()).resolve(vec![a, b]);
        assert_eq!(outcome.retained.len(), 2);
        assert!(outcome.removals.is_empty());
    }

    #[test]
    fn jurisdictions_are_never_compared() {
        let a = statute("Local Government Act 2001", "punjab", None, vec![section("1", BODY)], 0);
        let b = statute("Local Government Act 2001", "sindh", None, vec![section("1", BODY)], 1);

        let outcome = DuplicateResolver::new(DedupConfig::default()).resolve(vec![a, b]);
        assert_eq!(outcome.retained.len(), 2);
    }

    #[test]
    fn missing_dates_fall_back_to_completeness_then_ingestion_order() {
        let sparse = statute("Evidence Act 1872", "federal", None, vec![section("1", BODY)], 0);
        let complete = statute(
            "Evidence Act 1872",
            "federal",
            None,
            vec![section("1", BODY), section("2", "definitions")],
            1,
        );
        let complete_id = complete.id;

        let outcome = DuplicateResolver::new(DedupConfig::default()).resolve(vec![sparse, complete]);
        assert_eq!(outcome.retained[0].id, complete_id);

        // Fully identical twins: the earlier-ingested copy survives.
        let twin_a = statute("Evidence Act 1872", "federal", None, vec![section("1", BODY)], 0);
        let twin_b = statute("Evidence Act 1872", "federal", None, vec![section("1", BODY)], 1);
        let twin_a_id = twin_a.id;
        let outcome = DuplicateResolver::new(DedupConfig::default()).resolve(vec![twin_a, twin_b]);
        assert_eq!(outcome.retained[0].id, twin_a_id);
    }

    #[test]
    fn resolve_is_idempotent() {
        let date = NaiveDate::from_ymd_opt(1997, 8, 14);
        let a = statute("Anti-Terrorism Act 1997", "federal", date, vec![section("1", BODY)], 0);
        let b = statute(
            "Anti-Terrorism Act 1997 (Amendment)",
            "federal",
            date,
            vec![section("1", BODY), section("2", "short title")],
            1,
        );

        let resolver = DuplicateResolver::new(DedupConfig::default());
        let first = resolver.resolve(vec![a.clone(), b.clone()]);
        let second = resolver.resolve(first.retained.clone());

        assert_eq!(first.retained.len(), second.retained.len());
        assert!(second.removals.is_empty());
        assert_eq!(first.retained[0].id, second.retained[0].id);
    }
}
