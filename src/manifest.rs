//! Manifest model - the integrity and compatibility descriptor of a blueprint.
//!
//! One `MANIFEST.json` per blueprint version. The `files` mapping is a
//! `BTreeMap` so the serialized key order is lexicographic by path no matter
//! how the filesystem enumerated it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{CoreError, Result};
use crate::hashing::ContentDigest;

/// File name of the manifest at the blueprint root.
pub const MANIFEST_FILENAME: &str = "MANIFEST.json";

/// Plain-text blueprint version marker at the blueprint root.
pub const VERSION_FILENAME: &str = "VERSION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub min_engine: String,
    pub max_engine: Option<String>,
    pub files: BTreeMap<String, ContentDigest>,
    /// Reserved for future signing; always null today.
    #[serde(default)]
    pub signature: Option<serde_json::Value>,
    #[serde(default, with = "rfc3339_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Manifest {
    pub fn path_in(blueprint_dir: &Path) -> PathBuf {
        blueprint_dir.join(MANIFEST_FILENAME)
    }

    /// Pretty JSON, two-space indented.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::ManifestCorrupt {
            path: PathBuf::from(MANIFEST_FILENAME),
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str, origin: &Path) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::ManifestCorrupt {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load `<blueprint_dir>/MANIFEST.json`.
    pub fn load(blueprint_dir: &Path) -> Result<Self> {
        let path = Self::path_in(blueprint_dir);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CoreError::ManifestMissing { path });
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(CoreError::ManifestCorrupt {
                    path,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(CoreError::io(path, e)),
        };
        Self::from_json(&content, &path)
    }

    /// Write the manifest into the blueprint root.
    ///
    /// The content goes to a temporary sibling first and is renamed into
    /// place, so a failed write never leaves a truncated manifest behind.
    pub fn write_to(&self, blueprint_dir: &Path) -> Result<PathBuf> {
        let dst = Self::path_in(blueprint_dir);
        let mut json = self.to_json()?;
        json.push('\n');

        let mut tmp =
            NamedTempFile::new_in(blueprint_dir).map_err(|e| CoreError::io(blueprint_dir, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| CoreError::io(tmp.path(), e))?;
        tmp.persist(&dst).map_err(|e| CoreError::io(&dst, e.error))?;

        tracing::info!(path = %dst.display(), files = self.files.len(), "Wrote manifest");
        Ok(dst)
    }
}

mod rfc3339_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_none(),
        }
    }

    /// Accepts any string; the verifier never re-checks the timestamp, so an
    /// unparsable value degrades to `None` instead of rejecting the manifest.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}
