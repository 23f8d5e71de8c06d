//! # Checkpoint Storage Module
//!
//! ## Purpose
//! Persistent per-stage checkpoints for the pipeline, backed by sled with
//! bincode values and optional gzip compression for the large text payloads.
//!
//! ## Layout
//! One tree per stage output: `input`, `deduped`, `removal_log`, `groups`,
//! `versions`, `timelines`, `run_meta`. Each checkpoint is written as a single
//! record, so a stage either commits completely or leaves the previous
//! checkpoint intact; an aborted run never produces a partial checkpoint.
//!
//! The removal log is a mandatory audit artifact: it survives re-runs and is
//! only replaced by the next completed dedup stage.

use crate::config::StorageConfig;
use crate::dedup::RemovalRecord;
use crate::errors::Result;
use crate::pipeline::RunSummary;
use crate::timeline::SectionTimeline;
use crate::versioning::GroupVersions;
use crate::{Group, Statute};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const TREE_INPUT: &str = "input";
const TREE_DEDUPED: &str = "deduped";
const TREE_REMOVAL_LOG: &str = "removal_log";
const TREE_GROUPS: &str = "groups";
const TREE_VERSIONS: &str = "versions";
const TREE_TIMELINES: &str = "timelines";
const TREE_RUN_META: &str = "run_meta";

const CHECKPOINT_KEY: &[u8] = b"checkpoint";

// First byte of every stored value marks the encoding.
const MARKER_PLAIN: u8 = 0;
const MARKER_GZIP: u8 = 1;

/// Grouping-stage checkpoint: statutes with group ids plus the groups
#[derive(Serialize, Deserialize)]
struct GroupCheckpoint {
    statutes: Vec<Statute>,
    groups: Vec<Group>,
}

/// Versioning-stage checkpoint: labelled statutes plus per-group sequences
#[derive(Serialize, Deserialize)]
struct VersionCheckpoint {
    statutes: Vec<Statute>,
    versions: Vec<GroupVersions>,
}

/// Sled-backed store with one tree per pipeline stage
pub struct CheckpointStore {
    db: sled::Db,
    compression: bool,
}

impl CheckpointStore {
    /// Open (or create) the checkpoint database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = sled::open(&config.db_path)?;
        tracing::info!(
            path = ?config.db_path,
            compression = config.enable_compression,
            "checkpoint store opened"
        );
        Ok(Self {
            db,
            compression: config.enable_compression,
        })
    }

    pub fn save_input(&self, statutes: &[Statute]) -> Result<()> {
        self.put(TREE_INPUT, statutes)
    }

    pub fn load_input(&self) -> Result<Option<Vec<Statute>>> {
        self.get(TREE_INPUT)
    }

    pub fn save_deduped(&self, statutes: &[Statute]) -> Result<()> {
        self.put(TREE_DEDUPED, statutes)
    }

    pub fn load_deduped(&self) -> Result<Option<Vec<Statute>>> {
        self.get(TREE_DEDUPED)
    }

    pub fn save_removal_log(&self, removals: &[RemovalRecord]) -> Result<()> {
        self.put(TREE_REMOVAL_LOG, removals)
    }

    /// The duplicate-removal audit log; empty when no dedup stage has run
    pub fn load_removal_log(&self) -> Result<Vec<RemovalRecord>> {
        Ok(self.get(TREE_REMOVAL_LOG)?.unwrap_or_default())
    }

    pub fn save_grouped(&self, statutes: &[Statute], groups: &[Group]) -> Result<()> {
        self.put(
            TREE_GROUPS,
            &GroupCheckpoint {
                statutes: statutes.to_vec(),
                groups: groups.to_vec(),
            },
        )
    }

    pub fn load_grouped(&self) -> Result<Option<(Vec<Statute>, Vec<Group>)>> {
        Ok(self
            .get::<GroupCheckpoint>(TREE_GROUPS)?
            .map(|cp| (cp.statutes, cp.groups)))
    }

    pub fn save_versioned(&self, statutes: &[Statute], versions: &[GroupVersions]) -> Result<()> {
        self.put(
            TREE_VERSIONS,
            &VersionCheckpoint {
                statutes: statutes.to_vec(),
                versions: versions.to_vec(),
            },
        )
    }

    pub fn load_versioned(&self) -> Result<Option<(Vec<Statute>, Vec<GroupVersions>)>> {
        Ok(self
            .get::<VersionCheckpoint>(TREE_VERSIONS)?
            .map(|cp| (cp.statutes, cp.versions)))
    }

    pub fn save_timelines(&self, timelines: &[SectionTimeline]) -> Result<()> {
        self.put(TREE_TIMELINES, timelines)
    }

    pub fn load_timelines(&self) -> Result<Option<Vec<SectionTimeline>>> {
        self.get(TREE_TIMELINES)
    }

    pub fn save_run_summary(&self, summary: &RunSummary) -> Result<()> {
        self.put(TREE_RUN_META, summary)
    }

    pub fn load_run_summary(&self) -> Result<Option<RunSummary>> {
        self.get(TREE_RUN_META)
    }

    /// Serialize, optionally compress, and commit a checkpoint in one insert
    fn put<T: Serialize + ?Sized>(&self, tree_name: &str, value: &T) -> Result<()> {
        let tree = self.db.open_tree(tree_name)?;
        let encoded = self.encode(value)?;
        let bytes = encoded.len();
        tree.insert(CHECKPOINT_KEY, encoded)?;
        tree.flush()?;
        tracing::debug!(tree = tree_name, bytes, "checkpoint written");
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, tree_name: &str) -> Result<Option<T>> {
        let tree = self.db.open_tree(tree_name)?;
        match tree.get(CHECKPOINT_KEY)? {
            Some(raw) => Ok(Some(self.decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let plain = bincode::serialize(value)?;
        if !self.compression {
            let mut out = Vec::with_capacity(plain.len() + 1);
            out.push(MARKER_PLAIN);
            out.extend_from_slice(&plain);
            return Ok(out);
        }
        let mut encoder = GzEncoder::new(vec![MARKER_GZIP], Compression::default());
        encoder.write_all(&plain)?;
        Ok(encoder.finish()?)
    }

    fn decode<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T> {
        let (marker, payload) = raw
            .split_first()
            .ok_or_else(|| crate::internal_error!("empty checkpoint value"))?;
        let plain = if *marker == MARKER_GZIP {
            let mut decoder = GzDecoder::new(payload);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf)?;
            buf
        } else {
            payload.to_vec()
        };
        Ok(bincode::deserialize(&plain)?)
    }
}
