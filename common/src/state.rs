//! Persisted run state: the timestamp of the last successful run.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// State carried from one run to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    last_execution: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(last_execution: Option<DateTime<Utc>>) -> Self {
        Self { last_execution }
    }

    /// Timestamp of the previous successful run, absent on the first run.
    pub fn read(&self) -> Option<DateTime<Utc>> {
        self.last_execution
    }

    /// State to persist once a run has completed.
    pub fn commit(self, now: DateTime<Utc>) -> RunState {
        RunState {
            last_execution: Some(now),
        }
    }
}

// On-disk shape. Kept as a string so hand-edited or older files still load.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_execution: Option<String>,
}

/// JSON file holding the run state.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file. A missing file is the first run.
    pub async fn load(&self) -> Result<RunState> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RunState::default()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read state file: {}", self.path.display())
                })
            }
        };

        let file: StateFile = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))?;

        let last_execution = match file.last_execution.as_deref() {
            Some(raw) => Some(parse_timestamp(raw).with_context(|| {
                format!("Unrecognized last_execution timestamp in state file: {raw}")
            })?),
            None => None,
        };

        Ok(RunState { last_execution })
    }

    /// Write the state through a temp file and rename, so an interrupted write
    /// leaves the previous state in place.
    pub async fn save(&self, state: &RunState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let file = StateFile {
            last_execution: state.last_execution.map(|t| t.to_rfc3339()),
        };
        let body = serde_json::to_string_pretty(&file).context("Failed to encode state")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;
        Ok(())
    }
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse the `last_execution` value of a state file.
///
/// Current files hold RFC 3339 UTC. Older or hand-edited files may hold RFC 2822,
/// or a naive date-time taken as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
