use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BUNDLED_SCHEMA_JSON: &str = include_str!("../config/stat_schema.json");

static BUNDLED: Lazy<Result<StatSchema, String>> =
    Lazy::new(|| StatSchema::from_json(BUNDLED_SCHEMA_JSON).map_err(|err| format!("{err:#}")));

/// Ordered, duplicate-free list of statistic names for one row kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FieldSet {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("stat field list is empty"));
        }
        let mut index = HashMap::with_capacity(names.len());
        // SQLite column names ignore ASCII case.
        let mut folded = HashSet::with_capacity(names.len());
        for (pos, name) in names.iter().enumerate() {
            let trimmed = name.trim();
            if trimmed.is_empty() || trimmed != name {
                return Err(anyhow!("invalid stat field name {name:?}"));
            }
            if !folded.insert(name.to_ascii_lowercase()) {
                return Err(anyhow!("duplicate stat field {name:?}"));
            }
            index.insert(name.clone(), pos);
        }
        Ok(Self { names, index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct SchemaFile {
    version: String,
    team: Vec<String>,
    player: Vec<String>,
}

/// Canonical team and player statistic columns, versioned alongside the
/// provider's feed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatSchema {
    pub version: String,
    pub team: FieldSet,
    pub player: FieldSet,
}

impl StatSchema {
    pub fn new(version: impl Into<String>, team: Vec<String>, player: Vec<String>) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(anyhow!("stat schema version is empty"));
        }
        Ok(Self {
            version,
            team: FieldSet::new(team).context("team stat fields")?,
            player: FieldSet::new(player).context("player stat fields")?,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file = serde_json::from_str::<SchemaFile>(raw).context("invalid stat schema json")?;
        Self::new(file.version, file.team, file.player)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read stat schema {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load stat schema {}", path.display()))
    }

    /// Schema shipped with the crate under `config/stat_schema.json`.
    pub fn bundled() -> Result<Self> {
        (*BUNDLED).clone().map_err(|err| anyhow!("bundled stat schema: {err}"))
    }

    /// Hex SHA-256 over the version label and both ordered field lists.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        for (tag, set) in [("team", &self.team), ("player", &self.player)] {
            hasher.update([0u8]);
            hasher.update(tag.as_bytes());
            for name in set.names() {
                hasher.update([0u8]);
                hasher.update(name.as_bytes());
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}
