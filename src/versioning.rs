//! # Version Assignment Engine
//!
//! ## Purpose
//! Orders the members of each group chronologically and labels them
//! "Original", "First Amendment", "Second Amendment", and so on.
//!
//! ## Ordering policy
//! - dated members sort by promulgation date
//! - equal-date runs are tie-broken by the decision oracle
//! - undated members are placed by the oracle where it can decide (year
//!   tokens in titles are often enough) and by ingestion order otherwise,
//!   always after the dated members
//! - an ordering the oracle could not resolve is flagged ambiguous on the
//!   affected entries rather than failing the run
//!
//! Given the same inputs the assignment is fully reproducible: every
//! non-oracle tie falls back to ingestion order.

use crate::oracle::{OracleGateway, OrderingDecision, OrderingQuery};
use crate::{DateConfidence, Group, GroupId, Statute, StatuteId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One labelled position in a group's version sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub statute_id: StatuteId,
    /// Zero-based position in the chronological sequence
    pub position: usize,
    /// "Original", "First Amendment", "Second Amendment", ...
    pub label: String,
    pub date: Option<NaiveDate>,
    pub date_confidence: DateConfidence,
    /// Set when the position rests on an unresolved ordering tie
    pub ambiguous: bool,
}

/// Chronological version sequence for one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupVersions {
    pub group_id: GroupId,
    pub entries: Vec<VersionEntry>,
}

/// Result of the version-assignment stage
#[derive(Debug)]
pub struct VersioningOutcome {
    /// Statutes with `version_label` written
    pub statutes: Vec<Statute>,
    /// One sequence per group, sorted by group id
    pub group_versions: Vec<GroupVersions>,
    /// Ordering decisions that rested on a low-confidence (fallback) answer
    pub low_confidence_orderings: u64,
    /// Ties neither date, oracle, nor title could resolve
    pub ambiguous_orderings: u64,
}

/// Chronological labelling engine
#[derive(Default)]
pub struct VersionAssignmentEngine;

impl VersionAssignmentEngine {
    pub fn new() -> Self {
        Self
    }

    /// Assign version labels to every group member
    pub async fn assign(
        &self,
        mut statutes: Vec<Statute>,
        groups: &[Group],
        gateway: &OracleGateway,
    ) -> VersioningOutcome {
        let index_of: HashMap<StatuteId, usize> = statutes
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.id, idx))
            .collect();

        let mut group_versions = Vec::with_capacity(groups.len());
        let mut low_confidence_orderings = 0u64;
        let mut ambiguous_orderings = 0u64;

        for group in groups {
            let mut members: Vec<usize> = group
                .member_ids
                .iter()
                .filter_map(|id| index_of.get(id).copied())
                .collect();
            members.sort_by_key(|&idx| statutes[idx].ingestion_seq);

            let (dated, undated): (Vec<usize>, Vec<usize>) = members
                .into_iter()
                .partition(|&idx| statutes[idx].promulgation_date.is_some());

            let mut ordered: Vec<(usize, bool)> = Vec::new();

            // Dated members sort by date; equal-date runs go to the oracle.
            let mut by_date = dated;
            by_date.sort_by_key(|&idx| statutes[idx].promulgation_date);
            let mut run_start = 0;
            while run_start < by_date.len() {
                let date = statutes[by_date[run_start]].promulgation_date;
                let mut run_end = run_start + 1;
                while run_end < by_date.len()
                    && statutes[by_date[run_end]].promulgation_date == date
                {
                    run_end += 1;
                }
                let (run, low, ambiguous) = self
                    .oracle_sort(&by_date[run_start..run_end], &statutes, group, gateway)
                    .await;
                low_confidence_orderings += low;
                ambiguous_orderings += ambiguous;
                let flagged = ambiguous > 0;
                ordered.extend(run.into_iter().map(|idx| (idx, flagged)));
                run_start = run_end;
            }

            // Undated members come last, placed by the oracle where possible.
            if !undated.is_empty() {
                let (run, low, ambiguous) = self
                    .oracle_sort(&undated, &statutes, group, gateway)
                    .await;
                low_confidence_orderings += low;
                ambiguous_orderings += ambiguous;
                let flagged = ambiguous > 0;
                if flagged {
                    tracing::warn!(
                        group = %group.id,
                        base_name = %group.base_name,
                        undated = run.len(),
                        "ambiguous ordering for undated versions, using ingestion order"
                    );
                }
                ordered.extend(run.into_iter().map(|idx| (idx, flagged)));
            }

            let entries: Vec<VersionEntry> = ordered
                .iter()
                .enumerate()
                .map(|(position, &(idx, ambiguous))| {
                    let label = version_label(position);
                    statutes[idx].version_label = Some(label.clone());
                    VersionEntry {
                        statute_id: statutes[idx].id,
                        position,
                        label,
                        date: statutes[idx].promulgation_date,
                        date_confidence: statutes[idx].date_confidence,
                        ambiguous,
                    }
                })
                .collect();

            group_versions.push(GroupVersions {
                group_id: group.id,
                entries,
            });
        }

        group_versions.sort_by_key(|gv| gv.group_id);

        tracing::info!(
            groups = group_versions.len(),
            low_confidence_orderings,
            ambiguous_orderings,
            "version assignment complete"
        );

        VersioningOutcome {
            statutes,
            group_versions,
            low_confidence_orderings,
            ambiguous_orderings,
        }
    }

    /// Order a tie run with pairwise oracle decisions, insertion-sort style
    ///
    /// The run arrives in ingestion order; an Unknown verdict leaves the
    /// relative order untouched, so unresolved ties degrade to ingestion
    /// order. Returns the ordered run plus low-confidence and unresolved
    /// counts.
    async fn oracle_sort(
        &self,
        run: &[usize],
        statutes: &[Statute],
        group: &Group,
        gateway: &OracleGateway,
    ) -> (Vec<usize>, u64, u64) {
        if run.len() < 2 {
            return (run.to_vec(), 0, 0);
        }

        let mut low = 0u64;
        let mut ambiguous = 0u64;
        let mut ordered: Vec<usize> = Vec::with_capacity(run.len());

        for &idx in run {
            let mut insert_at = ordered.len();
            for (k, &placed) in ordered.iter().enumerate() {
                let query =
                    OrderingQuery::new(&statutes[idx], &statutes[placed], group.base_name.as_str());
                let answer = gateway.order(&query).await;
                if answer.low_confidence {
                    low += 1;
                }
                match answer.value {
                    OrderingDecision::ABeforeB => {
                        insert_at = k;
                        break;
                    }
                    OrderingDecision::BBeforeA => continue,
                    OrderingDecision::Unknown => {
                        ambiguous += 1;
                        continue;
                    }
                }
            }
            ordered.insert(insert_at, idx);
        }

        (ordered, low, ambiguous)
    }
}

/// Label for a zero-based chronological position
///
/// Position zero is "Original"; later positions are ordinal amendments with
/// word ordinals through "Twentieth" and numeric ordinals beyond.
pub fn version_label(position: usize) -> String {
    const WORDS: &[&str] = &[
        "First",
        "Second",
        "Third",
        "Fourth",
        "Fifth",
        "Sixth",
        "Seventh",
        "Eighth",
        "Ninth",
        "Tenth",
        "Eleventh",
        "Twelfth",
        "Thirteenth",
        "Fourteenth",
        "Fifteenth",
        "Sixteenth",
        "Seventeenth",
        "Eighteenth",
        "Nineteenth",
        "Twentieth",
    ];

    if position == 0 {
        return "Original".to_string();
    }
    if position <= WORDS.len() {
        return format!("{} Amendment", WORDS[position - 1]);
    }

    let suffix = match (position % 100, position % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{}{} Amendment", position, suffix)
}
