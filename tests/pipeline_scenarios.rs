//! End-to-end scenario tests for the full pipeline against the deterministic
//! rule oracle: dedup auditing, grouping, version labelling, section
//! timelines, expiration, caching, and cross-run reproducibility.

use async_trait::async_trait;
use chrono::NaiveDate;
use statute_pipeline::errors::Result;
use statute_pipeline::oracle::{
    DecisionOracle, FallbackOracle, OrderingDecision, OrderingQuery, RawAnswer, Relationship,
    RelationshipQuery,
};
use statute_pipeline::pipeline::Stage;
use statute_pipeline::{Config, Pipeline, RawStatute, Section, StatuteType};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.storage.db_path = PathBuf::from(dir.path());
    config.pipeline.evaluation_date = NaiveDate::from_ymd_opt(2024, 1, 1);
    config
}

fn section(number: &str, definition: &str, text: &str) -> Section {
    Section {
        number: number.to_string(),
        definition: definition.to_string(),
        text: text.to_string(),
    }
}

fn raw(
    id: u128,
    name: &str,
    jurisdiction: &str,
    date: Option<(i32, u32, u32)>,
    statute_type: StatuteType,
    sections: Vec<Section>,
) -> RawStatute {
    RawStatute {
        id: Some(Uuid::from_u128(id)),
        name: Some(name.to_string()),
        jurisdiction: Some(jurisdiction.to_string()),
        promulgation_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        date_confidence: None,
        statute_type: Some(statute_type),
        preamble: None,
        sections,
    }
}

fn fallback_pipeline(dir: &tempfile::TempDir) -> Pipeline {
    Pipeline::new(test_config(dir), Arc::new(FallbackOracle::new())).unwrap()
}

const TREASON_TEXT: &str = "any person who abrogates or subverts the constitution by use of force \
                            or show of force shall be guilty of high treason";

/// Scenario: two near-identical copies of one act, where the later copy adds a
/// commencement section. The more complete copy survives and the removal is
/// audited.
#[tokio::test]
async fn near_duplicate_is_removed_and_audited() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = fallback_pipeline(&dir);

    let batch = vec![
        raw(
            1,
            "Anti-Terrorism Act 1997",
            "federal",
            Some((1997, 8, 20)),
            StatuteType::Act,
            vec![section("6", "Terrorism", TREASON_TEXT)],
        ),
        raw(
            2,
            "Anti-Terrorism Act 1997 (Amendment)",
            "federal",
            Some((1997, 8, 20)),
            StatuteType::Act,
            vec![
                section("6", "Terrorism", TREASON_TEXT),
                section("1", "Commencement", "it shall come into force at once"),
            ],
        ),
    ];

    let summary = pipeline.run_all(batch).await.unwrap();
    assert_eq!(summary.documents_in, 2);
    assert_eq!(summary.duplicates_removed, 1);

    let retained = pipeline.store().load_deduped().unwrap().unwrap();
    assert_eq!(retained.len(), 1);
    assert_eq!(retained[0].id, Uuid::from_u128(2));

    let log = pipeline.store().load_removal_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].removed_id, Uuid::from_u128(1));
    assert_eq!(log[0].retained_id, Uuid::from_u128(2));
    assert!(log[0].name_similarity >= 0.9);
    assert!(log[0].content_similarity >= 0.85);
}

/// Scenario: a constitution and its amendment acts share no base name, yet the
/// oracle's lineage answer pulls them into one group, and versions are
/// labelled chronologically.
#[tokio::test]
async fn constitutional_amendments_group_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = fallback_pipeline(&dir);

    let batch = vec![
        raw(
            10,
            "Constitution (Twenty-first Amendment) Act 2015",
            "federal",
            Some((2015, 1, 7)),
            StatuteType::Act,
            vec![],
        ),
        raw(
            11,
            "The Constitution of the Islamic Republic",
            "federal",
            Some((1973, 4, 12)),
            StatuteType::Constitution,
            vec![],
        ),
        raw(
            12,
            "Constitution (Eighteenth Amendment) Act 2010",
            "federal",
            Some((2010, 4, 19)),
            StatuteType::Act,
            vec![],
        ),
    ];

    let summary = pipeline.run_all(batch).await.unwrap();
    assert_eq!(summary.groups_formed, 1);
    assert!(summary.oracle_merges >= 1);

    let (statutes, versions) = pipeline.store().load_versioned().unwrap().unwrap();
    let entries = &versions[0].entries;
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].label, "Original");
    assert_eq!(entries[0].statute_id, Uuid::from_u128(11));
    assert_eq!(entries[1].label, "First Amendment");
    assert_eq!(entries[1].statute_id, Uuid::from_u128(12));
    assert_eq!(entries[2].label, "Second Amendment");
    assert_eq!(entries[2].statute_id, Uuid::from_u128(10));

    let constitution = statutes.iter().find(|s| s.id == Uuid::from_u128(11)).unwrap();
    assert_eq!(constitution.version_label.as_deref(), Some("Original"));
}

/// Scenario: the same section amended across versions stays one timeline with
/// exactly the latest entry active.
#[tokio::test]
async fn amended_section_timeline_has_single_active_entry() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = fallback_pipeline(&dir);

    let batch = vec![
        raw(
            20,
            "High Treason (Punishment) Act 1973",
            "federal",
            Some((1973, 9, 14)),
            StatuteType::Act,
            vec![section("2", "High Treason", TREASON_TEXT)],
        ),
        raw(
            21,
            "High Treason (Punishment) (Amendment) Act 2010",
            "federal",
            Some((2010, 4, 19)),
            StatuteType::Act,
            vec![section(
                "2",
                "High Treason",
                "any person who abrogates or subverts or suspends the constitution by use of \
                 force or show of force shall be guilty of high treason",
            )],
        ),
    ];

    pipeline.run_all(batch).await.unwrap();

    let timelines = pipeline.store().load_timelines().unwrap().unwrap();
    assert_eq!(timelines.len(), 1);
    let timeline = &timelines[0];
    assert_eq!(timeline.entries.len(), 2);
    assert_eq!(timeline.active_entries().count(), 1);
    assert_eq!(
        timeline.entries.last().unwrap().version_id,
        Uuid::from_u128(21)
    );

    let export = pipeline.export().unwrap();
    assert_eq!(export.len(), 1);
    let versions = &export[0].section_versions[0].versions;
    assert!(!versions[0].is_active);
    assert!(versions[1].is_active);
    assert_eq!(versions[1].status, "First Amendment");
}

/// Scenario: an ordinance past the six-month window has lapsed; its timeline
/// has zero active entries. A fresh ordinance stays active.
#[tokio::test]
async fn expired_ordinance_exports_no_active_sections() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = fallback_pipeline(&dir);

    let batch = vec![
        raw(
            30,
            "Accountability Ordinance 1999",
            "federal",
            Some((1999, 11, 16)),
            StatuteType::Ordinance,
            vec![section("3", "Corruption", "a holder of public office commits corruption")],
        ),
        raw(
            31,
            "Flood Relief Ordinance 2023",
            "federal",
            Some((2023, 9, 1)),
            StatuteType::Ordinance,
            vec![section("1", "Relief", "emergency relief measures are authorized")],
        ),
    ];

    pipeline.run_all(batch).await.unwrap();
    let export = pipeline.export().unwrap();
    assert_eq!(export.len(), 2);

    let lapsed = export
        .iter()
        .find(|g| g.base_statute == "Accountability Ordinance 1999")
        .unwrap();
    assert!(lapsed.section_versions[0].versions.iter().all(|v| !v.is_active));

    let fresh = export
        .iter()
        .find(|g| g.base_statute == "Flood Relief Ordinance 2023")
        .unwrap();
    assert!(fresh.section_versions[0].versions.iter().any(|v| v.is_active));
}

struct CountingOracle {
    inner: FallbackOracle,
    calls: AtomicUsize,
}

impl CountingOracle {
    fn new() -> Self {
        Self {
            inner: FallbackOracle::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DecisionOracle for CountingOracle {
    fn name(&self) -> &str {
        "counting"
    }

    async fn classify_relationship(
        &self,
        query: &RelationshipQuery,
    ) -> Result<RawAnswer<Relationship>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.classify_relationship(query).await
    }

    async fn order(&self, query: &OrderingQuery) -> Result<RawAnswer<OrderingDecision>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.order(query).await
    }
}

/// Scenario: re-running stages that repeat identical oracle queries within the
/// cache TTL must not re-invoke the oracle.
#[tokio::test]
async fn identical_queries_hit_the_cache_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = Arc::new(CountingOracle::new());
    let pipeline = Pipeline::new(test_config(&dir), oracle.clone()).unwrap();

    let batch = vec![
        raw(
            40,
            "The Constitution of the Islamic Republic",
            "federal",
            Some((1973, 4, 12)),
            StatuteType::Constitution,
            vec![],
        ),
        raw(
            41,
            "Constitution (Eighteenth Amendment) Act 2010",
            "federal",
            Some((2010, 4, 19)),
            StatuteType::Act,
            vec![],
        ),
    ];

    pipeline.run_all(batch).await.unwrap();
    let calls_after_first = oracle.calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    let summary = pipeline.run(Stage::Grouping, Stage::Versioning).await.unwrap();
    assert_eq!(oracle.calls.load(Ordering::SeqCst), calls_after_first);
    assert!(summary.cache_hits > 0);
}

/// Same-named instruments in different jurisdictions must never share a group.
#[tokio::test]
async fn jurisdiction_boundary_is_never_crossed() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = fallback_pipeline(&dir);

    let batch = vec![
        raw(
            50,
            "Local Government Act 2013",
            "punjab",
            Some((2013, 8, 23)),
            StatuteType::Act,
            vec![],
        ),
        raw(
            51,
            "Local Government Act 2013",
            "sindh",
            Some((2013, 8, 26)),
            StatuteType::Act,
            vec![],
        ),
    ];

    let summary = pipeline.run_all(batch).await.unwrap();
    assert_eq!(summary.duplicates_removed, 0);
    assert_eq!(summary.groups_formed, 2);

    let (statutes, groups) = pipeline.store().load_grouped().unwrap().unwrap();
    for group in &groups {
        for member in &group.member_ids {
            let statute = statutes.iter().find(|s| s.id == *member).unwrap();
            assert_eq!(statute.jurisdiction, group.jurisdiction);
        }
    }
}

/// Version positions must be monotonic in date for dated members.
#[tokio::test]
async fn version_order_is_monotonic_in_date() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = fallback_pipeline(&dir);

    let batch = vec![
        raw(60, "Finance Act 2008", "federal", Some((2008, 6, 27)), StatuteType::Act, vec![]),
        raw(61, "Finance Act 1997", "federal", Some((1997, 6, 30)), StatuteType::Act, vec![]),
        raw(62, "Finance Act 2015", "federal", Some((2015, 6, 30)), StatuteType::Act, vec![]),
    ];

    pipeline.run_all(batch).await.unwrap();
    let (_, versions) = pipeline.store().load_versioned().unwrap().unwrap();

    for group in &versions {
        let dated: Vec<_> = group.entries.iter().filter_map(|e| e.date).collect();
        assert!(dated.windows(2).all(|w| w[0] <= w[1]));
        for (position, entry) in group.entries.iter().enumerate() {
            assert_eq!(entry.position, position);
        }
    }
}

/// Two identical runs over the same input produce identical group ids, labels,
/// and flags.
#[tokio::test]
async fn pipeline_is_reproducible_across_runs() {
    let batch = || {
        vec![
            raw(
                70,
                "Anti-Terrorism Act 1997",
                "federal",
                Some((1997, 8, 20)),
                StatuteType::Act,
                vec![section("6", "Terrorism", TREASON_TEXT)],
            ),
            raw(
                71,
                "Anti-Terrorism (Amendment) Act 2004",
                "federal",
                Some((2004, 11, 1)),
                StatuteType::Act,
                vec![],
            ),
            raw(72, "Stamp Act 1899", "federal", Some((1899, 1, 27)), StatuteType::Act, vec![]),
            raw(73, "Undated Instruments Law", "federal", None, StatuteType::Unknown, vec![]),
        ]
    };

    let dir_a = tempfile::tempdir().unwrap();
    let pipeline_a = fallback_pipeline(&dir_a);
    pipeline_a.run_all(batch()).await.unwrap();

    let dir_b = tempfile::tempdir().unwrap();
    let pipeline_b = fallback_pipeline(&dir_b);
    pipeline_b.run_all(batch()).await.unwrap();

    let (statutes_a, groups_a) = pipeline_a.store().load_grouped().unwrap().unwrap();
    let (statutes_b, groups_b) = pipeline_b.store().load_grouped().unwrap().unwrap();
    let ids = |groups: &[statute_pipeline::Group]| {
        groups.iter().map(|g| g.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&groups_a), ids(&groups_b));
    assert_eq!(
        statutes_a.iter().map(|s| s.group_id).collect::<Vec<_>>(),
        statutes_b.iter().map(|s| s.group_id).collect::<Vec<_>>()
    );

    let (_, versions_a) = pipeline_a.store().load_versioned().unwrap().unwrap();
    let (_, versions_b) = pipeline_b.store().load_versioned().unwrap().unwrap();
    let labels = |versions: &[statute_pipeline::versioning::GroupVersions]| {
        versions
            .iter()
            .flat_map(|gv| gv.entries.iter().map(|e| (e.statute_id, e.label.clone(), e.ambiguous)))
            .collect::<Vec<_>>()
    };
    assert_eq!(labels(&versions_a), labels(&versions_b));
}
