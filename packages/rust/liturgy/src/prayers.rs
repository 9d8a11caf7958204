//! The curated prayer dataset and context-based selection.
//!
//! The dataset is validated once at load; any problem is a fatal
//! configuration error. Selection is pure: the same context always yields
//! the same prayer.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use lectio_shared::{FeastInfo, LectioError, LiturgicalContext, Result, SourceName, SourcedPrayer};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

const EMBEDDED_PRAYERS: &str = include_str!("../data/prayers.json");

/// Context tag marking an entry as suitable for any day.
pub const UNIVERSAL_TAG: &str = "all";

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(default)]
    version: String,
    prayers: Vec<RawPrayer>,
}

#[derive(Debug, Deserialize)]
struct RawPrayer {
    id: String,
    title: String,
    text: String,
    source: String,
    source_url: String,
    liturgical_contexts: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    language: String,
}

/// A validated dataset entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prayer {
    pub id: String,
    pub title: String,
    pub text: String,
    pub source: SourceName,
    pub source_url: Url,
    pub contexts: BTreeSet<String>,
    pub tags: Vec<String>,
    pub language: String,
}

impl Prayer {
    pub fn is_universal(&self) -> bool {
        self.contexts.contains(UNIVERSAL_TAG)
    }

    fn score(&self, wanted: &BTreeSet<String>) -> usize {
        self.contexts.intersection(wanted).count()
    }
}

#[derive(Debug, Clone)]
pub struct PrayerDataset {
    version: String,
    fingerprint: String,
    prayers: Vec<Prayer>,
    /// Index of the first universal entry.
    fallback: usize,
}

impl PrayerDataset {
    /// The dataset compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_PRAYERS, "embedded prayer dataset")
    }

    /// Load from `path`, or the embedded dataset when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| LectioError::io(path, e))?;
                Self::from_json(&raw, &path.display().to_string())
            }
            None => Self::embedded(),
        }
    }

    /// Parse and validate a dataset. `origin` names it in error messages.
    pub fn from_json(raw: &str, origin: &str) -> Result<Self> {
        let invalid = |problem: String| {
            LectioError::config_with_hint(
                format!("invalid prayer dataset: {problem}"),
                format!("fix {origin} or point [prayers] dataset_path elsewhere"),
            )
        };

        let dataset: RawDataset =
            serde_json::from_str(raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?;

        let mut seen = HashSet::new();
        let mut prayers = Vec::with_capacity(dataset.prayers.len());
        for raw in dataset.prayers {
            let prayer = validate_entry(raw).map_err(&invalid)?;
            if !seen.insert(prayer.id.clone()) {
                return Err(invalid(format!("duplicate id '{}'", prayer.id)));
            }
            prayers.push(prayer);
        }

        let fallback = prayers.iter().position(Prayer::is_universal).ok_or_else(|| {
            invalid(format!(
                "no entry is tagged '{UNIVERSAL_TAG}', so some days would have no prayer"
            ))
        })?;

        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        let fingerprint = format!("{:x}", hasher.finalize());

        info!(
            origin,
            version = %dataset.version,
            entries = prayers.len(),
            fingerprint = %fingerprint,
            "prayer dataset loaded"
        );

        Ok(Self {
            version: dataset.version,
            fingerprint,
            prayers,
            fallback,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// SHA-256 of the raw dataset, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn prayers(&self) -> &[Prayer] {
        &self.prayers
    }

    pub fn len(&self) -> usize {
        self.prayers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prayers.is_empty()
    }

    /// Pick the entry whose contexts overlap most with the day's tags.
    ///
    /// Ties go to the earlier entry. With no overlap at all, the first
    /// universal entry is returned.
    pub fn select(&self, context: &LiturgicalContext, feast: Option<&FeastInfo>) -> SourcedPrayer {
        let mut wanted = context.tags();
        if let Some(feast) = feast {
            wanted.extend(feast.derived_tags().into_iter().map(str::to_string));
        }

        let mut best: Option<(&Prayer, usize)> = None;
        for prayer in &self.prayers {
            let score = prayer.score(&wanted);
            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((prayer, score));
            }
        }

        let (prayer, reason) = match best {
            Some((prayer, score)) => {
                let matched: Vec<&str> = prayer
                    .contexts
                    .intersection(&wanted)
                    .map(String::as_str)
                    .collect();
                let noun = if score == 1 { "tag" } else { "tags" };
                (
                    prayer,
                    format!("matched {score} context {noun}: {}", matched.join(", ")),
                )
            }
            None => (
                &self.prayers[self.fallback],
                "no contextual match; general prayer".to_string(),
            ),
        };

        debug!(
            prayer = %prayer.id,
            tags = ?wanted,
            reason = %reason,
            "prayer selected"
        );

        SourcedPrayer {
            prayer_id: prayer.id.clone(),
            title: prayer.title.clone(),
            text: prayer.text.clone(),
            source_name: prayer.source,
            source_url: prayer.source_url.to_string(),
            selection_reason: reason,
            liturgical_context: Some(context.day_label.clone()),
        }
    }
}

fn validate_entry(raw: RawPrayer) -> std::result::Result<Prayer, String> {
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err("entry with empty id".into());
    }
    for (field, value) in [
        ("title", &raw.title),
        ("text", &raw.text),
        ("language", &raw.language),
    ] {
        if value.trim().is_empty() {
            return Err(format!("'{id}' has an empty {field}"));
        }
    }

    let source = SourceName::ALL
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(raw.source.trim()))
        .ok_or_else(|| format!("'{id}' has unknown source '{}'", raw.source))?;

    let source_url = Url::parse(raw.source_url.trim())
        .map_err(|e| format!("'{id}' has an invalid source_url: {e}"))?;
    if source_url.scheme() != "https" {
        return Err(format!("'{id}' source_url must use https"));
    }

    let contexts: BTreeSet<String> = raw
        .liturgical_contexts
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    if contexts.is_empty() {
        return Err(format!("'{id}' has no liturgical contexts"));
    }

    Ok(Prayer {
        id,
        title: raw.title.trim().to_string(),
        text: raw.text.trim().to_string(),
        source,
        source_url,
        contexts,
        tags: raw.tags,
        language: raw.language.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lectio_shared::{FeastType, Rank, Season};

    use super::*;

    fn context(y: i32, m: u32, d: u32, season: Season, rank: Rank) -> LiturgicalContext {
        let mut ctx = LiturgicalContext::ordinary_weekday(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        ctx.season = season;
        ctx.rank = rank;
        ctx
    }

    fn entry(id: &str, contexts: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": format!("Title {id}"),
            "text": "Amen.",
            "source": "USCCB",
            "source_url": "https://www.usccb.org/prayers",
            "liturgical_contexts": contexts,
            "language": "en"
        })
    }

    fn dataset(entries: Vec<serde_json::Value>) -> Result<PrayerDataset> {
        let raw = serde_json::json!({ "version": "test", "prayers": entries }).to_string();
        PrayerDataset::from_json(&raw, "test dataset")
    }

    #[test]
    fn embedded_dataset_is_valid() {
        let dataset = PrayerDataset::embedded().unwrap();
        assert!(dataset.len() >= 10);
        assert_eq!(dataset.fingerprint().len(), 64);
        assert!(dataset.prayers().iter().any(Prayer::is_universal));
    }

    #[test]
    fn apostle_feast_selects_apostle_prayer() {
        let dataset = PrayerDataset::embedded().unwrap();
        let mut ctx = context(2025, 11, 29, Season::OrdinaryTime, Rank::Feast);
        ctx.day_label = "Saint Andrew, Apostle".into();
        let feast = FeastInfo {
            feast_type: FeastType::Saint,
            feast_name: "Saint Andrew, Apostle".into(),
            saint_bio: None,
        };

        let prayer = dataset.select(&ctx, Some(&feast));
        assert_eq!(prayer.prayer_id, "prayer-for-apostles");
        assert_eq!(prayer.source_name, SourceName::Usccb);
        assert_eq!(
            prayer.selection_reason,
            "matched 3 context tags: apostle, feast, saint"
        );
        assert_eq!(prayer.liturgical_context.as_deref(), Some("Saint Andrew, Apostle"));
    }

    #[test]
    fn selection_is_deterministic_with_first_wins_ties() {
        let dataset = dataset(vec![
            entry("universal", &["all"]),
            entry("advent-a", &["advent"]),
            entry("advent-b", &["advent"]),
        ])
        .unwrap();
        let ctx = context(2025, 12, 2, Season::Advent, Rank::Weekday);

        let first = dataset.select(&ctx, None);
        assert_eq!(first.prayer_id, "advent-a");
        for _ in 0..5 {
            assert_eq!(dataset.select(&ctx, None), first);
        }
    }

    #[test]
    fn no_overlap_falls_back_to_universal() {
        let dataset = dataset(vec![
            entry("lent-only", &["lent"]),
            entry("universal", &["all"]),
        ])
        .unwrap();
        let ctx = context(2025, 7, 15, Season::OrdinaryTime, Rank::Weekday);
        let prayer = dataset.select(&ctx, None);
        assert_eq!(prayer.prayer_id, "universal");
        assert!(prayer.selection_reason.contains("general"));
    }

    #[test]
    fn marian_feast_adds_marian_tag() {
        let dataset = dataset(vec![
            entry("universal", &["all"]),
            entry("marian", &["marian"]),
        ])
        .unwrap();
        let ctx = context(2025, 8, 15, Season::OrdinaryTime, Rank::Solemnity);
        let feast = FeastInfo {
            feast_type: FeastType::Solemnity,
            feast_name: "The Assumption of the Blessed Virgin Mary".into(),
            saint_bio: None,
        };
        assert_eq!(dataset.select(&ctx, Some(&feast)).prayer_id, "marian");
    }

    #[test]
    fn rejects_invalid_datasets() {
        let err = dataset(vec![entry("a", &["advent"])]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("'all'"));

        let err = dataset(vec![entry("a", &["all"]), entry("a", &["lent"])]).unwrap_err();
        assert!(err.to_string().contains("duplicate id"));

        let mut bad_source = entry("a", &["all"]);
        bad_source["source"] = "Some Blog".into();
        assert!(dataset(vec![bad_source]).unwrap_err().to_string().contains("unknown source"));

        let mut plain_http = entry("a", &["all"]);
        plain_http["source_url"] = "http://www.usccb.org/prayers".into();
        assert!(dataset(vec![plain_http]).unwrap_err().to_string().contains("https"));

        let mut empty_text = entry("a", &["all"]);
        empty_text["text"] = " ".into();
        assert!(dataset(vec![empty_text]).unwrap_err().to_string().contains("empty text"));

        assert!(PrayerDataset::from_json("{not json", "broken").is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = dataset(vec![entry("a", &["all"])]).unwrap();
        let b = dataset(vec![entry("b", &["all"])]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
