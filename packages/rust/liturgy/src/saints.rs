//! Saint biographies keyed by feast-name aliases.

use std::path::Path;

use lectio_shared::{LectioError, Result, SaintBio};
use serde::Deserialize;
use tracing::debug;

const EMBEDDED_SAINTS: &str = include_str!("../data/saints.json");

#[derive(Debug, Clone, Deserialize)]
struct SaintsFile {
    #[serde(default)]
    version: String,
    saints: Vec<SaintEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct SaintEntry {
    name: String,
    aliases: Vec<String>,
    #[serde(default)]
    birth_date: Option<String>,
    #[serde(default)]
    death_date: Option<String>,
    locations: Vec<String>,
    canonization_reason: String,
    more_info_url: String,
}

/// Lookup table from feast names to saint biographies.
///
/// Entries are matched in file order, so more specific aliases must come
/// before shorter ones they contain.
#[derive(Debug, Clone)]
pub struct SaintDirectory {
    version: String,
    entries: Vec<SaintEntry>,
}

impl SaintDirectory {
    /// The directory compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_SAINTS, "embedded saint directory")
    }

    /// Load from `path`, or the embedded directory when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| LectioError::io(path, e))?;
                Self::from_json(&raw, &path.display().to_string())
            }
            None => Self::embedded(),
        }
    }

    /// Parse and validate a directory. `origin` names it in error messages.
    ///
    /// Problems are fatal config errors, like those of the prayer dataset.
    pub fn from_json(raw: &str, origin: &str) -> Result<Self> {
        let invalid = |problem: String| {
            LectioError::config_with_hint(
                format!("invalid saint directory: {problem}"),
                format!("fix {origin} or point [calendar] saints_file elsewhere"),
            )
        };

        let file: SaintsFile =
            serde_json::from_str(raw).map_err(|e| invalid(format!("malformed JSON: {e}")))?;

        for entry in &file.saints {
            if entry.aliases.iter().all(|a| a.trim().is_empty()) {
                return Err(invalid(format!("saint '{}' has no aliases", entry.name)));
            }
            if entry.locations.is_empty() {
                return Err(invalid(format!("saint '{}' has no locations", entry.name)));
            }
        }

        Ok(Self {
            version: file.version,
            entries: file.saints,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Biography for the saint honoured by `feast_name`, if known.
    pub fn lookup(&self, feast_name: &str) -> Option<SaintBio> {
        let name = feast_name.to_lowercase();
        let entry = self.entries.iter().find(|entry| {
            entry
                .aliases
                .iter()
                .any(|alias| contains_phrase(&name, &alias.to_lowercase()))
        })?;
        debug!(feast = feast_name, saint = %entry.name, "saint biography found");
        Some(SaintBio {
            birth_date: entry.birth_date.clone(),
            death_date: entry.death_date.clone(),
            locations: entry.locations.clone(),
            canonization_reason: entry.canonization_reason.clone(),
            more_info_url: entry.more_info_url.clone(),
        })
    }
}

/// Whether `needle` occurs in `haystack` on word boundaries.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
