//! Liturgical calendar lookup and normalization.
//!
//! A [`CalendarSource`] returns the raw day record (romcal-shaped JSON);
//! [`LiturgicalContextAdapter`] turns it into a [`LiturgicalContext`],
//! classifying the feast and attaching a saint biography when one is known.
//! Lookup failures are returned to the caller, which substitutes an
//! ordinary weekday.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use lectio_shared::{
    CalendarConfig, CalendarSourceKind, FeastInfo, FeastType, LectioError, LiturgicalContext, Rank,
    Result, Season,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::saints::SaintDirectory;

/// One day as reported by a calendar source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    /// `YYYY-MM-DD`; checked against the requested date when present.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub liturgical_colors: Vec<String>,
    #[serde(default)]
    pub season: Option<String>,
}

#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn lookup(&self, date: NaiveDate) -> Result<CalendarDay>;
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// Queries `GET {base_url}/{YYYY-MM-DD}`.
#[derive(Debug, Clone)]
pub struct HttpCalendarSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalendarSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LectioError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn lookup(&self, date: NaiveDate) -> Result<CalendarDay> {
        let url = format!("{}/{}", self.base_url, date.format("%Y-%m-%d"));
        debug!(%url, "querying liturgical calendar");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LectioError::CalendarLookup(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LectioError::CalendarLookup(format!(
                "{url}: HTTP {status}"
            )));
        }

        response
            .json::<CalendarDay>()
            .await
            .map_err(|e| LectioError::CalendarLookup(format!("{url}: unreadable day record: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Static source
// ---------------------------------------------------------------------------

/// Day records from a JSON object keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendarSource {
    days: HashMap<NaiveDate, CalendarDay>,
}

impl StaticCalendarSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| LectioError::io(path, e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let keyed: HashMap<String, CalendarDay> = serde_json::from_str(raw)
            .map_err(|e| LectioError::parse(format!("calendar file: {e}")))?;

        let mut days = HashMap::with_capacity(keyed.len());
        for (key, day) in keyed {
            let date = NaiveDate::parse_from_str(&key, "%Y-%m-%d")
                .map_err(|e| LectioError::parse(format!("calendar file: bad date key '{key}': {e}")))?;
            days.insert(date, day);
        }
        Ok(Self { days })
    }

    pub fn insert(&mut self, date: NaiveDate, day: CalendarDay) {
        self.days.insert(date, day);
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[async_trait]
impl CalendarSource for StaticCalendarSource {
    async fn lookup(&self, date: NaiveDate) -> Result<CalendarDay> {
        self.days
            .get(&date)
            .cloned()
            .ok_or_else(|| LectioError::CalendarLookup(format!("no calendar entry for {date}")))
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Resolves dates into normalized liturgical contexts.
#[derive(Clone)]
pub struct LiturgicalContextAdapter {
    source: Option<Arc<dyn CalendarSource>>,
    saints: SaintDirectory,
}

impl LiturgicalContextAdapter {
    pub fn new(source: Arc<dyn CalendarSource>, saints: SaintDirectory) -> Self {
        Self {
            source: Some(source),
            saints,
        }
    }

    /// An adapter that never consults a calendar.
    pub fn disabled(saints: SaintDirectory) -> Self {
        Self {
            source: None,
            saints,
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        let saints = SaintDirectory::load(config.saints_file.as_deref().map(Path::new))?;
        let source: Arc<dyn CalendarSource> = match config.source {
            CalendarSourceKind::Http => Arc::new(HttpCalendarSource::new(
                &config.base_url,
                Duration::from_secs(config.timeout_secs),
            )?),
            CalendarSourceKind::File => {
                let path = config.file.as_deref().ok_or_else(|| {
                    LectioError::config_with_hint(
                        "calendar source is 'file' but no file is set",
                        "set [calendar] file",
                    )
                })?;
                Arc::new(StaticCalendarSource::from_path(Path::new(path))?)
            }
            CalendarSourceKind::None => return Ok(Self::disabled(saints)),
        };
        Ok(Self::new(source, saints))
    }

    /// Look up `date` and normalize the result.
    #[instrument(skip(self))]
    pub async fn resolve(&self, date: NaiveDate) -> Result<LiturgicalContext> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| LectioError::CalendarLookup("calendar lookup is disabled".into()))?;

        let day = source.lookup(date).await?;
        if let Some(reported) = day.date.as_deref() {
            let expected = date.format("%Y-%m-%d").to_string();
            if reported != expected {
                return Err(LectioError::CalendarLookup(format!(
                    "calendar answered for {reported}, expected {expected}"
                )));
            }
        }

        let context = self.normalize(date, &day);
        info!(
            day = %context.day_label,
            season = context.season.label(),
            feast_type = context.feast.feast_type.as_str(),
            "liturgical day resolved"
        );
        Ok(context)
    }

    /// Normalize a raw day record. Pure apart from the saint lookup.
    pub fn normalize(&self, date: NaiveDate, day: &CalendarDay) -> LiturgicalContext {
        let is_sunday = date.weekday() == Weekday::Sun;

        let mut rank = day
            .rank
            .as_deref()
            .map(Rank::from_calendar)
            .unwrap_or(Rank::Weekday);
        if rank == Rank::Weekday {
            if let Some(kind) = day.kind.as_deref() {
                rank = Rank::from_calendar(kind);
            }
        }
        if rank == Rank::Weekday && is_sunday {
            rank = Rank::Sunday;
        }

        let season = day
            .season
            .as_deref()
            .map(Season::from_calendar)
            .unwrap_or(Season::OrdinaryTime);

        let day_label = match day.name.trim() {
            "" => date.format("%A").to_string(),
            name => name.to_string(),
        };

        let color = day
            .liturgical_colors
            .iter()
            .map(|c| c.trim().to_lowercase())
            .find(|c| !c.is_empty());

        LiturgicalContext {
            date,
            feast: self.classify(&day_label, rank),
            day_label,
            season,
            rank,
            color,
        }
    }

    fn classify(&self, label: &str, rank: Rank) -> FeastInfo {
        let feast_type = rank.feast_type();
        if feast_type == FeastType::None {
            return FeastInfo::none(label);
        }

        let mut feast = FeastInfo {
            feast_type,
            feast_name: label.to_string(),
            saint_bio: None,
        };
        if feast.is_saint() {
            if let Some(bio) = self.saints.lookup(label) {
                feast.feast_type = FeastType::Saint;
                feast.saint_bio = Some(bio);
            } else {
                debug!(feast = label, "no biography for saint's feast; keeping rank type");
            }
        }
        feast
    }
}
