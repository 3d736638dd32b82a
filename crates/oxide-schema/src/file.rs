//! Schema files and their resolution into snapshots.
//!
//! Each schema owner keeps one append-only [`SchemaFile`]: an ordered list of
//! versions where version 0 is a full snapshot and every later version is
//! either another full snapshot or a [`Version`] delta. [`resolve`] replays a
//! file into a snapshot and [`merge_all`] unions every owner's latest
//! snapshot into the global schema.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::delta::Version;
use crate::error::{Result, SchemaError};
use crate::schema::SchemaDecl;
use crate::state::apply_delta_to_schema;

/// One entry of a schema file's history.
///
/// In JSON a full snapshot is recognised by its `tables` key; anything else
/// is read as a delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VersionEntry {
    /// A complete snapshot, replacing whatever came before.
    Full(SchemaDecl),
    /// A delta applied to the previous snapshot.
    Delta(Version),
}

// The variant is picked from the keys first, so that a malformed entry
// reports the error of the variant it was meant to be.
impl<'de> Deserialize<'de> for VersionEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let full = value.get("tables").is_some();
        let entry = if full {
            SchemaDecl::deserialize(value).map(Self::Full)
        } else {
            Version::deserialize(value).map(Self::Delta)
        };
        entry.map_err(de::Error::custom)
    }
}

impl From<SchemaDecl> for VersionEntry {
    fn from(schema: SchemaDecl) -> Self {
        Self::Full(schema)
    }
}

impl From<Version> for VersionEntry {
    fn from(delta: Version) -> Self {
        Self::Delta(delta)
    }
}

/// The version history of one schema owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    /// Versions in order; the first one must be a full snapshot.
    pub versions: Vec<VersionEntry>,
    /// Tables whose rows may be wiped by the owner's maintenance tooling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wipe: Vec<String>,
    /// Version to resolve to instead of the last one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<usize>,
    /// Access-control settings per table, passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub acl_tables: BTreeMap<String, serde_json::Value>,
}

impl SchemaFile {
    /// Creates a file whose only version is the given snapshot.
    #[must_use]
    pub fn new(initial: SchemaDecl) -> Self {
        Self {
            versions: vec![VersionEntry::Full(initial)],
            wipe: Vec::new(),
            latest: None,
            acl_tables: BTreeMap::new(),
        }
    }

    /// Appends a version.
    #[must_use]
    pub fn version(mut self, entry: impl Into<VersionEntry>) -> Self {
        self.versions.push(entry.into());
        self
    }

    /// Pins the version [`merge_all`] resolves to.
    #[must_use]
    pub fn latest(mut self, version: usize) -> Self {
        self.latest = Some(version);
        self
    }

    /// Reads a schema file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| SchemaError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the version this file resolves to by default: `latest` if set,
    /// otherwise the last version.
    pub fn latest_version(&self) -> Result<usize> {
        let available = self.versions.len();
        if available == 0 {
            return Err(SchemaError::InvalidFile(
                "a schema file needs at least one version".to_string(),
            ));
        }
        match self.latest {
            Some(version) if version >= available => Err(SchemaError::InvalidVersion {
                version,
                available,
            }),
            Some(version) => Ok(version),
            None => Ok(available - 1),
        }
    }

    /// Replays the file up to `up_to`. See [`resolve`].
    pub fn resolve(&self, up_to: usize) -> Result<SchemaDecl> {
        resolve(self, up_to)
    }

    /// Checks the file as a whole: the first version is a full snapshot,
    /// `latest` is in range, every version resolves, and `wipe` and
    /// `acl_tables` only name tables of the latest snapshot.
    pub fn check(&self) -> Result<()> {
        let latest = self.latest_version()?;
        if !matches!(self.versions.first(), Some(VersionEntry::Full(_))) {
            return Err(SchemaError::InvalidFile(
                "version 0 must be a full schema".to_string(),
            ));
        }
        resolve(self, self.versions.len() - 1)?;

        let snapshot = resolve(self, latest)?;
        let mut errors = Vec::new();
        for table in &self.wipe {
            if !snapshot.tables.contains_key(table) {
                errors.push(SchemaError::InvalidFile(format!(
                    "wipe lists '{table}' which is not a table of version {latest}"
                )));
            }
        }
        for table in self.acl_tables.keys() {
            if !snapshot.tables.contains_key(table) {
                errors.push(SchemaError::InvalidFile(format!(
                    "acl_tables lists '{table}' which is not a table of version {latest}"
                )));
            }
        }
        SchemaError::from_list(errors)
    }
}

/// Reconstructs the snapshot at version `up_to` by replaying the file.
///
/// A full snapshot replaces the accumulator, a delta is applied to it. A
/// delta that does not fit its predecessor fails with
/// [`SchemaError::BrokenChain`].
pub fn resolve(file: &SchemaFile, up_to: usize) -> Result<SchemaDecl> {
    let Some((first, rest)) = file.versions.split_first() else {
        return Err(SchemaError::InvalidFile(
            "a schema file needs at least one version".to_string(),
        ));
    };
    if up_to >= file.versions.len() {
        return Err(SchemaError::InvalidVersion {
            version: up_to,
            available: file.versions.len(),
        });
    }
    let VersionEntry::Full(base) = first else {
        return Err(SchemaError::InvalidFile(
            "version 0 must be a full schema".to_string(),
        ));
    };

    rest.iter()
        .take(up_to)
        .enumerate()
        .try_fold(base.clone(), |snapshot, (offset, entry)| {
            let version = offset + 1;
            debug!(version, "Resolving version");
            match entry {
                VersionEntry::Full(schema) => Ok(schema.clone()),
                VersionEntry::Delta(delta) => {
                    apply_delta_to_schema(&snapshot, delta).map_err(|source| {
                        SchemaError::BrokenChain {
                            version,
                            source: Box::new(source),
                        }
                    })
                }
            }
        })
}

/// Unions the snapshots of several owners into one schema.
///
/// A table or index declared by two owners is an error naming both of them.
pub fn merge_snapshots<'a>(
    snapshots: impl IntoIterator<Item = (&'a str, SchemaDecl)>,
) -> Result<SchemaDecl> {
    let mut merged = SchemaDecl::new();
    let mut table_owners: BTreeMap<String, &str> = BTreeMap::new();
    let mut index_owners: BTreeMap<String, &str> = BTreeMap::new();

    for (owner, snapshot) in snapshots {
        for (name, table) in snapshot.tables {
            if let Some(first) = table_owners.get(&name) {
                return Err(SchemaError::DuplicateTable {
                    name,
                    owners: Some(((*first).to_string(), owner.to_string())),
                });
            }
            table_owners.insert(name.clone(), owner);
            merged.tables.insert(name, table);
        }
        for (name, index) in snapshot.indexes {
            if let Some(first) = index_owners.get(&name) {
                return Err(SchemaError::DuplicateIndex {
                    name,
                    owners: Some(((*first).to_string(), owner.to_string())),
                });
            }
            index_owners.insert(name.clone(), owner);
            merged.indexes.insert(name, index);
        }
    }

    Ok(merged)
}

/// Resolves every owner to its latest version and merges the results.
///
/// Returns the global schema and the version each owner was resolved to.
pub fn merge_all(owners: &[(String, SchemaFile)]) -> Result<(SchemaDecl, BTreeMap<String, usize>)> {
    let mut versions = BTreeMap::new();
    let mut snapshots = Vec::with_capacity(owners.len());

    for (owner, file) in owners {
        let latest = file.latest_version()?;
        debug!(owner = %owner, version = latest, "Resolving owner");
        snapshots.push((owner.as_str(), resolve(file, latest)?));
        versions.insert(owner.clone(), latest);
    }

    Ok((merge_snapshots(snapshots)?, versions))
}

/// Loads every `<owner>.json` file of a directory, sorted by owner name.
pub fn load_schema_dir(dir: impl AsRef<Path>) -> Result<Vec<(String, SchemaFile)>> {
    let mut owners = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(owner) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        owners.push((owner.to_string(), SchemaFile::load(&path)?));
    }

    owners.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(owners)
}
