use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, error, warn};

use crate::error::ModsyncError;

/// Represents the version file: mod id -> version installed by the last successful download
///
/// Entries are only ever added or overwritten, never removed
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct VersionIndex {
    versions: BTreeMap<String, String>,
}

impl VersionIndex {
    /// Read the index from `path`
    ///
    /// A missing file or one that isn't a JSON object yields an empty index.
    /// Entries whose value isn't a string are logged and left out
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No version file at {}, starting fresh", path.display());
                return Self::default();
            }
            Err(e) => {
                error!("Unable to read version file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        let entries: Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Version file {} is malformed: {}", path.display(), e);
                return Self::default();
            }
        };

        let versions = entries
            .into_iter()
            .filter_map(|(id, v)| match v {
                Value::String(version) => Some((id, version)),
                other => {
                    warn!("Skipping entry '{}' in {}: {} is not a string", id, path.display(), other);
                    None
                }
            })
            .collect();
        Self { versions }
    }

    /// Overwrite `path` with the pretty-printed index, creating parent directories if needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModsyncError> {
        let path = path.as_ref();
        let parsed = serde_json::to_string_pretty(self)?;
        if let Some(p) = path.parent() {
            if !p.as_os_str().is_empty() {
                fs::create_dir_all(p)?;
            }
        }

        fs::write(path, parsed)?;
        debug!("Wrote version file at {}", path.display());
        Ok(())
    }

    pub fn get(&self, mod_id: impl AsRef<str>) -> Option<&str> {
        self.versions.get(mod_id.as_ref()).map(String::as_str)
    }

    /// Updates or inserts a mod's version, returning the previous one
    pub fn set(&mut self, mod_id: impl Into<String>, version: impl Into<String>) -> Option<String> {
        self.versions.insert(mod_id.into(), version.into())
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// What happened to a single mod during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Downloaded and recorded at this version
    Updated { version: String },
    UpToDate,
    /// Installed version is ahead of the site, skipped
    StaleLocal { local: String, remote: String },
    /// Name isn't in the configured mod map
    Untracked,
    Failed { reason: String },
}

impl Outcome {
    /// Whether this mod ended the run in a good state
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Updated { .. } | Outcome::UpToDate)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Updated { version } => write!(f, "updated to {version}"),
            Outcome::UpToDate => write!(f, "up to date"),
            Outcome::StaleLocal { local, remote } => {
                write!(f, "local {local} is newer than remote {remote}, skipped")
            }
            Outcome::Untracked => write!(f, "not tracked"),
            Outcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Results of a full run, in the order the mods were processed
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub mods: Vec<(String, Outcome)>,
    /// Archives that were extracted into the mods directory
    pub extracted: Vec<PathBuf>,
}

impl RunSummary {
    pub fn updated(&self) -> usize {
        self.mods
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Updated { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.mods.iter().filter(|(_, o)| !o.is_success()).count()
    }
}
