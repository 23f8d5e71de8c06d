//! # Section Timeline Builder
//!
//! ## Purpose
//! Decomposes each group's chronological versions into per-section timelines:
//! the same section tracked across versions even when its text is amended,
//! plus active/inactive status for every entry.
//!
//! ## Matching
//! Within a group, a section of a later version continues an existing
//! timeline when the section numbers are close AND either the marginal
//! definitions or the body texts are; among all candidates the highest
//! combined score wins (greedy best-match, not first-match). Unmatched
//! sections start new timelines.
//!
//! ## Status
//! The most recent entry of a timeline is Active and everything earlier is
//! Inactive, with one exception: a time-limited instrument (ordinance) whose
//! effective date lies more than the expiration window before the evaluation
//! date has lapsed, leaving the timeline with zero active entries. A missing
//! date never expires. Expiry is a pure function of effective date,
//! evaluation date, and statute type.

use crate::config::TimelineConfig;
use crate::similarity;
use crate::versioning::GroupVersions;
use crate::{Group, GroupId, Statute, StatuteId, StatuteType};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Whether a section version is currently in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Active,
    Inactive,
}

/// One version of one section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// The statute version this text came from
    pub version_id: StatuteId,
    /// Version label of that statute, e.g. "First Amendment"
    pub label: String,
    pub date: Option<NaiveDate>,
    pub text: String,
    pub status: SectionStatus,
}

/// The full history of one section across a group's versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionTimeline {
    pub group_id: GroupId,
    pub base_name: String,
    pub jurisdiction: String,
    /// Type of the latest version carrying this section; drives expiry
    pub statute_type: StatuteType,
    /// Section number as of the latest entry
    pub section_number: String,
    /// Marginal definition as of the latest entry
    pub definition: String,
    /// Entries in chronological version order
    pub entries: Vec<TimelineEntry>,
}

impl SectionTimeline {
    pub fn active_entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == SectionStatus::Active)
    }
}

/// Per-group section timeline construction
pub struct SectionTimelineBuilder {
    config: TimelineConfig,
}

struct Draft {
    number: String,
    definition: String,
    latest_text: String,
    latest_type: StatuteType,
    entries: Vec<TimelineEntry>,
}

impl SectionTimelineBuilder {
    pub fn new(config: TimelineConfig) -> Self {
        Self { config }
    }

    /// Build every group's section timelines
    ///
    /// `versions` must be the output of the version-assignment stage for the
    /// same statutes. `evaluation_date` anchors the expiration rule.
    pub fn build(
        &self,
        statutes: &[Statute],
        groups: &[Group],
        versions: &[GroupVersions],
        evaluation_date: NaiveDate,
    ) -> Vec<SectionTimeline> {
        let by_id: HashMap<StatuteId, &Statute> =
            statutes.iter().map(|s| (s.id, s)).collect();
        let versions_of: HashMap<GroupId, &GroupVersions> =
            versions.iter().map(|gv| (gv.group_id, gv)).collect();

        let mut timelines = Vec::new();
        for group in groups {
            let Some(group_versions) = versions_of.get(&group.id) else {
                tracing::warn!(group = %group.id, "group has no version sequence, skipping");
                continue;
            };
            timelines.extend(self.build_group(group, group_versions, &by_id, evaluation_date));
        }

        tracing::info!(timelines = timelines.len(), "section timelines built");
        timelines
    }

    fn build_group(
        &self,
        group: &Group,
        versions: &GroupVersions,
        by_id: &HashMap<StatuteId, &Statute>,
        evaluation_date: NaiveDate,
    ) -> Vec<SectionTimeline> {
        let mut drafts: Vec<Draft> = Vec::new();

        for entry in &versions.entries {
            let Some(statute) = by_id.get(&entry.statute_id) else {
                continue;
            };

            // Best-match assignment: score every (timeline, section) pair that
            // clears the gate, then take pairs in descending score order.
            let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
            for (ti, draft) in drafts.iter().enumerate() {
                for (si, section) in statute.sections.iter().enumerate() {
                    let number_sim = similarity::token_similarity(&draft.number, &section.number);
                    if number_sim < self.config.number_threshold {
                        continue;
                    }
                    let definition_sim =
                        similarity::token_similarity(&draft.definition, &section.definition);
                    let text_sim = similarity::text_similarity(&draft.latest_text, &section.text);
                    if definition_sim < self.config.definition_threshold
                        && text_sim < self.config.text_threshold
                    {
                        continue;
                    }
                    let score = number_sim + definition_sim + text_sim;
                    candidates.push((score, ti, si));
                }
            }
            candidates.sort_by(|a, b| {
                b.0.total_cmp(&a.0).then_with(|| (a.1, a.2).cmp(&(b.1, b.2)))
            });

            let mut taken_timelines: HashSet<usize> = HashSet::new();
            let mut taken_sections: HashSet<usize> = HashSet::new();
            for (_, ti, si) in candidates {
                if taken_timelines.contains(&ti) || taken_sections.contains(&si) {
                    continue;
                }
                taken_timelines.insert(ti);
                taken_sections.insert(si);

                let section = &statute.sections[si];
                let draft = &mut drafts[ti];
                draft.number = section.number.clone();
                draft.definition = section.definition.clone();
                draft.latest_text = section.text.clone();
                draft.latest_type = statute.statute_type;
                draft.entries.push(TimelineEntry {
                    version_id: statute.id,
                    label: entry.label.clone(),
                    date: statute.promulgation_date,
                    text: section.text.clone(),
                    status: SectionStatus::Inactive,
                });
            }

            // Sections with no timeline start their own.
            for (si, section) in statute.sections.iter().enumerate() {
                if taken_sections.contains(&si) {
                    continue;
                }
                drafts.push(Draft {
                    number: section.number.clone(),
                    definition: section.definition.clone(),
                    latest_text: section.text.clone(),
                    latest_type: statute.statute_type,
                    entries: vec![TimelineEntry {
                        version_id: statute.id,
                        label: entry.label.clone(),
                        date: statute.promulgation_date,
                        text: section.text.clone(),
                        status: SectionStatus::Inactive,
                    }],
                });
            }
        }

        drafts
            .into_iter()
            .map(|mut draft| {
                if let Some(last) = draft.entries.last_mut() {
                    if !is_expired(
                        draft.latest_type,
                        last.date,
                        evaluation_date,
                        self.config.expiration_window_days,
                    ) {
                        last.status = SectionStatus::Active;
                    }
                }
                SectionTimeline {
                    group_id: group.id,
                    base_name: group.base_name.clone(),
                    jurisdiction: group.jurisdiction.clone(),
                    statute_type: draft.latest_type,
                    section_number: draft.number,
                    definition: draft.definition,
                    entries: draft.entries,
                }
            })
            .collect()
    }
}

/// Whether a time-limited instrument has lapsed by the evaluation date
///
/// Exactly at the window boundary the instrument is still in force; a missing
/// effective date never expires.
fn is_expired(
    statute_type: StatuteType,
    effective: Option<NaiveDate>,
    evaluation: NaiveDate,
    window_days: i64,
) -> bool {
    if !statute_type.is_time_limited() {
        return false;
    }
    match effective {
        Some(date) => date + Duration::days(window_days) < evaluation,
        None => false,
    }
}

/// Export shape for downstream consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedVersion {
    pub version_id: StatuteId,
    pub year: Option<i32>,
    pub date: Option<NaiveDate>,
    /// Version label, e.g. "Original" or "First Amendment"
    pub status: String,
    pub text: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSection {
    pub section: String,
    pub definition: String,
    pub versions: Vec<ExportedVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedGroup {
    pub base_statute: String,
    pub jurisdiction: String,
    pub statute_type: StatuteType,
    pub section_versions: Vec<ExportedSection>,
}

/// Assemble the nested export document, one record per group
///
/// `base_statute` is the full name of the group's "Original" version so the
/// export reads naturally; groups appear in id order, sections in timeline
/// order.
pub fn export_groups(
    statutes: &[Statute],
    groups: &[Group],
    versions: &[GroupVersions],
    timelines: &[SectionTimeline],
) -> Vec<ExportedGroup> {
    let by_id: HashMap<StatuteId, &Statute> = statutes.iter().map(|s| (s.id, s)).collect();
    let versions_of: HashMap<GroupId, &GroupVersions> =
        versions.iter().map(|gv| (gv.group_id, gv)).collect();

    groups
        .iter()
        .map(|group| {
            let original_name = versions_of
                .get(&group.id)
                .and_then(|gv| gv.entries.first())
                .and_then(|entry| by_id.get(&entry.statute_id))
                .map(|s| s.name.clone())
                .unwrap_or_else(|| group.base_name.clone());
            let statute_type = versions_of
                .get(&group.id)
                .and_then(|gv| gv.entries.first())
                .and_then(|entry| by_id.get(&entry.statute_id))
                .map(|s| s.statute_type)
                .unwrap_or_default();

            let section_versions = timelines
                .iter()
                .filter(|t| t.group_id == group.id)
                .map(|t| ExportedSection {
                    section: t.section_number.clone(),
                    definition: t.definition.clone(),
                    versions: t
                        .entries
                        .iter()
                        .map(|e| ExportedVersion {
                            version_id: e.version_id,
                            year: e.date.map(|d| d.year()),
                            date: e.date,
                            status: e.label.clone(),
                            text: e.text.clone(),
                            is_active: e.status == SectionStatus::Active,
                        })
                        .collect(),
                })
                .collect();

            ExportedGroup {
                base_statute: original_name,
                jurisdiction: group.jurisdiction.clone(),
                statute_type,
                section_versions,
            }
        })
        .collect()
}
