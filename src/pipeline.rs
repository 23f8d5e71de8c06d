//! # Pipeline Orchestration Module
//!
//! ## Purpose
//! Staged batch execution: Dedup → Grouping → Versioning → Timelines, each
//! stage reading the previous stage's checkpoint and committing its own. Any
//! contiguous stage range can be re-run against existing checkpoints.
//!
//! ## Failure model
//! A malformed document is rejected at intake and the batch continues. Oracle
//! trouble degrades to the fallback path inside the gateway. Only storage
//! failures (and an explicit abort) stop a run; an abort between documents
//! leaves the previous checkpoints intact.
//!
//! ## Observability
//! Every run produces a [`RunSummary`] combining stage counters with the
//! oracle gateway's counters, logged and persisted under `run_meta`.

use crate::config::Config;
use crate::dedup::DuplicateResolver;
use crate::errors::{PipelineError, Result};
use crate::grouping::BaseGroupingEngine;
use crate::oracle::{DecisionOracle, OracleGateway};
use crate::storage::CheckpointStore;
use crate::timeline::{export_groups, ExportedGroup, SectionTimelineBuilder};
use crate::utils::Timer;
use crate::versioning::VersionAssignmentEngine;
use crate::RawStatute;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dedup,
    Grouping,
    Versioning,
    Timelines,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Dedup,
        Stage::Grouping,
        Stage::Versioning,
        Stage::Timelines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dedup => "dedup",
            Stage::Grouping => "grouping",
            Stage::Versioning => "versioning",
            Stage::Timelines => "timelines",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dedup" => Ok(Stage::Dedup),
            "grouping" => Ok(Stage::Grouping),
            "versioning" => Ok(Stage::Versioning),
            "timelines" => Ok(Stage::Timelines),
            other => Err(PipelineError::ValidationFailed {
                field: "stage".to_string(),
                reason: format!("unknown stage '{}'", other),
            }),
        }
    }
}

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub documents_in: u64,
    pub rejected_documents: u64,
    pub duplicates_removed: u64,
    pub groups_formed: u64,
    pub oracle_merges: u64,
    pub low_confidence_orderings: u64,
    pub ambiguous_orderings: u64,
    pub oracle_calls: u64,
    pub cache_hits: u64,
    pub fallback_invocations: u64,
    pub elapsed_ms: u64,
}

/// Staged batch pipeline over a checkpoint store
pub struct Pipeline {
    config: Config,
    store: CheckpointStore,
    gateway: Arc<OracleGateway>,
    abort: Arc<AtomicBool>,
}

impl Pipeline {
    /// Build a pipeline with an injected primary oracle adapter
    ///
    /// The gateway (cache, limiter, breaker, fallback) is constructed here and
    /// lives for the lifetime of this pipeline instance.
    pub fn new(config: Config, primary: Arc<dyn DecisionOracle>) -> Result<Self> {
        let store = CheckpointStore::open(&config.storage)?;
        let gateway = Arc::new(OracleGateway::new(primary, config.oracle.clone()));
        Ok(Self {
            config,
            store,
            gateway,
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between documents and stages; setting it aborts the run
    /// before the next checkpoint commit
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Validate raw records, persist the input checkpoint, and run every stage
    pub async fn run_all(&self, raw: Vec<RawStatute>) -> Result<RunSummary> {
        let rejected = self.intake(raw)?;
        self.execute(Stage::Dedup, Stage::Timelines, rejected).await
    }

    /// Run a contiguous stage range against existing checkpoints
    pub async fn run(&self, from: Stage, to: Stage) -> Result<RunSummary> {
        self.execute(from, to, 0).await
    }

    /// Structural validation and input checkpoint; returns the rejected count
    ///
    /// A document missing id, name, or jurisdiction is logged and dropped;
    /// the rest of the batch continues.
    pub fn intake(&self, raw: Vec<RawStatute>) -> Result<u64> {
        let mut statutes = Vec::with_capacity(raw.len());
        let mut rejected = 0u64;
        for record in raw {
            self.check_abort()?;
            let seq = statutes.len() as u64;
            match record.into_statute(seq) {
                Ok(statute) => statutes.push(statute),
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting document at intake");
                    rejected += 1;
                }
            }
        }
        tracing::info!(accepted = statutes.len(), rejected, "intake complete");
        self.store.save_input(&statutes)?;
        Ok(rejected)
    }

    async fn execute(&self, from: Stage, to: Stage, rejected: u64) -> Result<RunSummary> {
        if from > to {
            return Err(PipelineError::ValidationFailed {
                field: "stage range".to_string(),
                reason: format!("'{}' does not precede '{}'", from, to),
            });
        }

        let timer = Timer::new("pipeline run");
        let mut summary = RunSummary {
            rejected_documents: rejected,
            ..RunSummary::default()
        };

        for stage in Stage::ALL {
            if stage < from || stage > to {
                continue;
            }
            self.check_abort()?;
            tracing::info!(stage = %stage, "stage starting");
            match stage {
                Stage::Dedup => self.stage_dedup(&mut summary)?,
                Stage::Grouping => self.stage_grouping(&mut summary).await?,
                Stage::Versioning => self.stage_versioning(&mut summary).await?,
                Stage::Timelines => self.stage_timelines(&mut summary)?,
            }
        }

        let stats = self.gateway.stats();
        summary.oracle_calls = stats.oracle_calls;
        summary.cache_hits = stats.cache_hits;
        summary.fallback_invocations = stats.fallback_invocations;
        summary.elapsed_ms = timer.stop();

        self.store.save_run_summary(&summary)?;
        tracing::info!(
            documents_in = summary.documents_in,
            duplicates_removed = summary.duplicates_removed,
            groups_formed = summary.groups_formed,
            oracle_calls = summary.oracle_calls,
            elapsed_ms = summary.elapsed_ms,
            "pipeline run complete"
        );
        Ok(summary)
    }

    fn stage_dedup(&self, summary: &mut RunSummary) -> Result<()> {
        let input = self.store.load_input()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no input checkpoint; run intake first".to_string(),
            }
        })?;
        summary.documents_in = input.len() as u64;

        let resolver = DuplicateResolver::new(self.config.dedup.clone());
        let outcome = resolver.resolve(input);
        summary.duplicates_removed = outcome.removals.len() as u64;

        self.check_abort()?;
        self.store.save_deduped(&outcome.retained)?;
        self.store.save_removal_log(&outcome.removals)?;
        Ok(())
    }

    async fn stage_grouping(&self, summary: &mut RunSummary) -> Result<()> {
        let statutes = self.store.load_deduped()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no dedup checkpoint; run the dedup stage first".to_string(),
            }
        })?;

        let engine = BaseGroupingEngine::new(self.config.grouping.clone());
        let outcome = engine
            .group(statutes, &self.gateway, self.config.pipeline.worker_pool_size)
            .await;
        summary.groups_formed = outcome.groups.len() as u64;
        summary.oracle_merges = outcome.oracle_merges;

        self.check_abort()?;
        self.store.save_grouped(&outcome.statutes, &outcome.groups)?;
        Ok(())
    }

    async fn stage_versioning(&self, summary: &mut RunSummary) -> Result<()> {
        let (statutes, groups) = self.store.load_grouped()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no grouping checkpoint; run the grouping stage first".to_string(),
            }
        })?;

        let engine = VersionAssignmentEngine::new();
        let outcome = engine.assign(statutes, &groups, &self.gateway).await;
        summary.low_confidence_orderings = outcome.low_confidence_orderings;
        summary.ambiguous_orderings = outcome.ambiguous_orderings;

        self.check_abort()?;
        self.store.save_versioned(&outcome.statutes, &outcome.group_versions)?;
        Ok(())
    }

    fn stage_timelines(&self, summary: &mut RunSummary) -> Result<()> {
        let (statutes, versions) = self.store.load_versioned()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no versioning checkpoint; run the versioning stage first".to_string(),
            }
        })?;
        let (_, groups) = self.store.load_grouped()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no grouping checkpoint; run the grouping stage first".to_string(),
            }
        })?;
        if summary.groups_formed == 0 {
            summary.groups_formed = groups.len() as u64;
        }

        let builder = SectionTimelineBuilder::new(self.config.timeline.clone());
        let timelines = builder.build(&statutes, &groups, &versions, self.evaluation_date());

        self.check_abort()?;
        self.store.save_timelines(&timelines)?;
        Ok(())
    }

    /// Assemble the nested export document from the final checkpoints
    pub fn export(&self) -> Result<Vec<ExportedGroup>> {
        let (statutes, versions) = self.store.load_versioned()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no versioning checkpoint; nothing to export".to_string(),
            }
        })?;
        let (_, groups) = self.store.load_grouped()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no grouping checkpoint; nothing to export".to_string(),
            }
        })?;
        let timelines = self.store.load_timelines()?.ok_or_else(|| {
            PipelineError::ValidationFailed {
                field: "checkpoint".to_string(),
                reason: "no timeline checkpoint; nothing to export".to_string(),
            }
        })?;
        Ok(export_groups(&statutes, &groups, &versions, &timelines))
    }

    fn evaluation_date(&self) -> NaiveDate {
        self.config
            .pipeline
            .evaluation_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::SeqCst) {
            tracing::warn!("pipeline run aborted");
            return Err(PipelineError::Aborted);
        }
        Ok(())
    }
}
