//! Core domain types for Lectio content bundles.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest valid Catechism of the Catholic Church paragraph number.
pub const CATECHISM_MIN_PARAGRAPH: u32 = 1;

/// Highest valid Catechism of the Catholic Church paragraph number.
pub const CATECHISM_MAX_PARAGRAPH: u32 = 2865;

/// Whether `paragraph` numbers a Catechism paragraph. The one range check
/// for generated citations.
pub fn is_catechism_paragraph(paragraph: i64) -> bool {
    (i64::from(CATECHISM_MIN_PARAGRAPH)..=i64::from(CATECHISM_MAX_PARAGRAPH)).contains(&paragraph)
}

// ---------------------------------------------------------------------------
// BundleId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for bundle identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(pub Uuid);

impl BundleId {
    /// Generate a new time-sortable bundle identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BundleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Readings & generated content
// ---------------------------------------------------------------------------

/// One Scripture passage for a liturgical day, as supplied by the scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Reading title (e.g., "First Reading", "Gospel").
    pub title: String,
    /// Biblical citation (e.g., "Luke 21:5-11").
    pub citation: String,
    /// Full reading text.
    pub text: String,
}

impl Reading {
    pub fn new(
        title: impl Into<String>,
        citation: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            citation: citation.into(),
            text: text.into(),
        }
    }

    /// Formatted title like `Gospel (Luke 21:5-11)`.
    pub fn title_with_citation(&self) -> String {
        format!("{} ({})", self.title, self.citation)
    }
}

/// One-line AI-generated summary of a single reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingSynopsis {
    pub reading_title: String,
    pub synopsis_text: String,
    /// Output tokens billed for the accepted response.
    pub tokens_used: u64,
}

/// Per-reading synopsis slot. There is exactly one entry per reading, in
/// reading order; a failed generation leaves a `Missing` entry behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynopsisEntry {
    Generated(ReadingSynopsis),
    Missing { reading_title: String, reason: String },
}

impl SynopsisEntry {
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }

    pub fn synopsis(&self) -> Option<&ReadingSynopsis> {
        match self {
            Self::Generated(s) => Some(s),
            Self::Missing { .. } => None,
        }
    }

    pub fn reading_title(&self) -> &str {
        match self {
            Self::Generated(s) => &s.reading_title,
            Self::Missing { reading_title, .. } => reading_title,
        }
    }
}

/// A reference to a numbered Catechism paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub reference_number: u32,
    pub excerpt_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_note: Option<String>,
}

impl Citation {
    /// Whether the paragraph number lies within the Catechism's range.
    pub fn in_range(&self) -> bool {
        is_catechism_paragraph(i64::from(self.reference_number))
    }
}

/// Unified reflection synthesizing all of a day's readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub reflection_text: String,
    /// Two or three questions, each ending in `?`.
    pub pondering_questions: Vec<String>,
    /// One or two Catechism citations.
    pub citations: Vec<Citation>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Prayers
// ---------------------------------------------------------------------------

/// The closed set of sources a curated prayer may be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceName {
    #[serde(rename = "USCCB")]
    Usccb,
    #[serde(rename = "Vatican")]
    Vatican,
    #[serde(rename = "Roman Missal")]
    RomanMissal,
    #[serde(rename = "Liturgy of the Hours")]
    LiturgyOfTheHours,
    #[serde(rename = "EWTN")]
    Ewtn,
}

impl SourceName {
    pub const ALL: [SourceName; 5] = [
        Self::Usccb,
        Self::Vatican,
        Self::RomanMissal,
        Self::LiturgyOfTheHours,
        Self::Ewtn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usccb => "USCCB",
            Self::Vatican => "Vatican",
            Self::RomanMissal => "Roman Missal",
            Self::LiturgyOfTheHours => "Liturgy of the Hours",
            Self::Ewtn => "EWTN",
        }
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prayer chosen from the curated dataset, with attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedPrayer {
    pub prayer_id: String,
    pub title: String,
    pub text: String,
    pub source_name: SourceName,
    pub source_url: String,
    /// Human-readable explanation of why this entry was chosen.
    pub selection_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liturgical_context: Option<String>,
}

// ---------------------------------------------------------------------------
// Liturgical calendar
// ---------------------------------------------------------------------------

/// Classification of a day's feast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeastType {
    None,
    Saint,
    Solemnity,
    Feast,
    Memorial,
    OptionalMemorial,
}

impl FeastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Saint => "saint",
            Self::Solemnity => "solemnity",
            Self::Feast => "feast",
            Self::Memorial => "memorial",
            Self::OptionalMemorial => "optional_memorial",
        }
    }
}

/// Biographical details for a saint whose feast is celebrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaintBio {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    /// Places associated with the saint's life (at least one).
    pub locations: Vec<String>,
    pub canonization_reason: String,
    pub more_info_url: String,
}

/// Feast information for a liturgical day.
///
/// `saint_bio` is present exactly when `feast_type` is [`FeastType::Saint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeastInfo {
    pub feast_type: FeastType,
    pub feast_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saint_bio: Option<SaintBio>,
}

const SAINT_KEYWORDS: &[&str] = &["saint", "st.", "blessed"];
const MARIAN_KEYWORDS: &[&str] = &["mary", "our lady", "virgin", "assumption", "immaculate"];
const APOSTLE_KEYWORDS: &[&str] = &["apostle", "peter", "paul", "andrew", "james", "john"];

impl FeastInfo {
    /// A day without a feast, labelled with the liturgical day name.
    pub fn none(label: impl Into<String>) -> Self {
        Self {
            feast_type: FeastType::None,
            feast_name: label.into(),
            saint_bio: None,
        }
    }

    pub fn is_feast(&self) -> bool {
        self.feast_type != FeastType::None
    }

    fn name_matches(&self, keywords: &[&str]) -> bool {
        let name = self.feast_name.to_lowercase();
        keywords.iter().any(|k| name.contains(k))
    }

    pub fn is_saint(&self) -> bool {
        self.feast_type == FeastType::Saint || (self.is_feast() && self.name_matches(SAINT_KEYWORDS))
    }

    pub fn is_marian(&self) -> bool {
        self.is_feast() && self.name_matches(MARIAN_KEYWORDS)
    }

    pub fn is_apostle(&self) -> bool {
        self.is_feast() && self.name_matches(APOSTLE_KEYWORDS)
    }

    pub fn is_martyr(&self) -> bool {
        self.is_feast() && self.name_matches(&["martyr"])
    }

    /// Tags derived from the feast for prayer selection.
    ///
    /// `apostle` and `martyr` are only derived for saints' days.
    pub fn derived_tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if self.is_saint() {
            tags.push("saint");
            if self.is_apostle() {
                tags.push("apostle");
            }
            if self.is_martyr() {
                tags.push("martyr");
            }
        }
        if self.is_marian() {
            tags.push("marian");
        }
        tags
    }

    /// Short description for prompts, e.g. `Saint Andrew, Apostle (feast)`.
    pub fn describe(&self) -> Option<String> {
        self.is_feast()
            .then(|| format!("{} ({})", self.feast_name, self.feast_type.as_str()))
    }
}

/// Liturgical season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Advent,
    Christmas,
    Lent,
    Easter,
    OrdinaryTime,
}

impl Season {
    /// Parse a calendar-service season identifier; unknown values map to
    /// Ordinary Time.
    pub fn from_calendar(raw: &str) -> Self {
        match normalize_key(raw).as_str() {
            "advent" => Self::Advent,
            "christmas" | "christmastide" | "christmas_time" => Self::Christmas,
            "lent" | "holy_week" | "paschal_triduum" | "triduum" => Self::Lent,
            "easter" | "eastertide" | "easter_time" => Self::Easter,
            _ => Self::OrdinaryTime,
        }
    }

    /// Prayer-dataset tag for this season.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Advent => "advent",
            Self::Christmas => "christmas",
            Self::Lent => "lent",
            Self::Easter => "easter",
            Self::OrdinaryTime => "ordinary",
        }
    }

    /// Human-readable season name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Advent => "Advent",
            Self::Christmas => "Christmas",
            Self::Lent => "Lent",
            Self::Easter => "Easter",
            Self::OrdinaryTime => "Ordinary Time",
        }
    }
}

/// Rank of a liturgical day as reported by the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Weekday,
    Sunday,
    OptionalMemorial,
    Memorial,
    Feast,
    Solemnity,
}

impl Rank {
    /// Parse a calendar-service rank identifier; unknown values map to
    /// [`Rank::Weekday`].
    pub fn from_calendar(raw: &str) -> Self {
        match normalize_key(raw).as_str() {
            "sunday" => Self::Sunday,
            "optional_memorial" | "opt_memorial" => Self::OptionalMemorial,
            "memorial" => Self::Memorial,
            "feast" => Self::Feast,
            "solemnity" => Self::Solemnity,
            _ => Self::Weekday,
        }
    }

    /// The feast type implied by the rank alone.
    pub fn feast_type(&self) -> FeastType {
        match self {
            Self::Weekday | Self::Sunday => FeastType::None,
            Self::OptionalMemorial => FeastType::OptionalMemorial,
            Self::Memorial => FeastType::Memorial,
            Self::Feast => FeastType::Feast,
            Self::Solemnity => FeastType::Solemnity,
        }
    }

    /// Prayer-dataset tag for this rank, if it has one.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Weekday | Self::Sunday => None,
            Self::OptionalMemorial | Self::Memorial => Some("memorial"),
            Self::Feast => Some("feast"),
            Self::Solemnity => Some("solemnity"),
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Normalized liturgical information for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiturgicalContext {
    pub date: NaiveDate,
    /// Liturgical day label (e.g., "Saturday of the Thirty-Fourth Week in Ordinary Time").
    pub day_label: String,
    pub season: Season,
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub feast: FeastInfo,
}

impl LiturgicalContext {
    /// The context used when the calendar cannot be consulted.
    pub fn ordinary_weekday(date: NaiveDate) -> Self {
        let day_label = format!("{} in Ordinary Time", date.format("%A"));
        let rank = if date.weekday() == Weekday::Sun {
            Rank::Sunday
        } else {
            Rank::Weekday
        };
        Self {
            date,
            feast: FeastInfo::none(day_label.clone()),
            day_label,
            season: Season::OrdinaryTime,
            rank,
            color: Some("green".into()),
        }
    }

    pub fn is_sunday(&self) -> bool {
        self.date.weekday() == Weekday::Sun
    }

    /// Context tags for prayer selection: season, day type, and rank.
    pub fn tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        tags.insert(self.season.tag().to_string());
        tags.insert(if self.is_sunday() { "sunday" } else { "weekday" }.to_string());
        if let Some(rank) = self.rank.tag() {
            tags.insert(rank.to_string());
        }
        tags
    }
}

// ---------------------------------------------------------------------------
// Cost accounting
// ---------------------------------------------------------------------------

/// One billed call to the text-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Operation name (`synopsis` or `reflection`).
    pub operation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// Token and dollar usage for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub ceiling: f64,
    pub exceeded_budget: bool,
    pub api_calls_count: usize,
    #[serde(default)]
    pub calls: Vec<CallRecord>,
}

impl CostSummary {
    /// A summary for a run in which no calls were made.
    pub fn empty(ceiling: f64) -> Self {
        Self {
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost: 0.0,
            ceiling,
            exceeded_budget: false,
            api_calls_count: 0,
            calls: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AugmentedBundle
// ---------------------------------------------------------------------------

/// Pipeline step a missing part is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Synopsis,
    FeastLookup,
    PrayerSelect,
    Reflection,
}

/// A piece of content that could not be produced, with diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPart {
    pub step: PipelineStep,
    /// What the step was about (e.g., the reading title).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub cause: String,
    /// Attempts made before giving up (0 when the step was skipped).
    pub attempts: u32,
}

/// The augmentation content of a non-failed bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedContent {
    pub liturgical_day: String,
    /// One entry per reading, in reading order.
    pub synopses: Vec<SynopsisEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<Reflection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prayer: Option<SourcedPrayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feast_info: Option<FeastInfo>,
}

impl AugmentedContent {
    pub fn generated_synopses(&self) -> usize {
        self.synopses.iter().filter(|s| s.is_generated()).count()
    }

    /// Whether any text-generation output made it into the content.
    pub fn has_generated_text(&self) -> bool {
        self.reflection.is_some() || self.generated_synopses() > 0
    }

    /// Whether the content earns a `success` bundle: the reflection is
    /// present, or every reading has a generated synopsis.
    pub fn is_complete(&self) -> bool {
        self.reflection.is_some()
            || (!self.synopses.is_empty() && self.synopses.iter().all(SynopsisEntry::is_generated))
    }
}

/// Overall pipeline health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    Success,
    Partial,
    Failed,
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        })
    }
}

/// Bundle content keyed by status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleOutcome {
    /// The reflection, or a generated synopsis for every reading.
    Success {
        content: AugmentedContent,
        #[serde(default)]
        missing: Vec<MissingPart>,
    },
    /// Some synopses without a reflection, or no generated text at all.
    /// Readings, prayer and feast information remain usable.
    Partial {
        content: AugmentedContent,
        #[serde(default)]
        missing: Vec<MissingPart>,
    },
    /// Precondition or configuration failure; nothing was generated.
    Failed { reason: String },
}

/// Root entity handed to the downstream renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedBundle {
    pub bundle_id: BundleId,
    pub date: NaiveDate,
    pub readings: Vec<Reading>,
    pub cost_summary: CostSummary,
    pub generation_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: BundleOutcome,
}

impl AugmentedBundle {
    pub fn status(&self) -> BundleStatus {
        match self.outcome {
            BundleOutcome::Success { .. } => BundleStatus::Success,
            BundleOutcome::Partial { .. } => BundleStatus::Partial,
            BundleOutcome::Failed { .. } => BundleStatus::Failed,
        }
    }

    pub fn content(&self) -> Option<&AugmentedContent> {
        match &self.outcome {
            BundleOutcome::Success { content, .. } | BundleOutcome::Partial { content, .. } => {
                Some(content)
            }
            BundleOutcome::Failed { .. } => None,
        }
    }

    pub fn synopses(&self) -> &[SynopsisEntry] {
        self.content().map(|c| c.synopses.as_slice()).unwrap_or_default()
    }

    pub fn reflection(&self) -> Option<&Reflection> {
        self.content().and_then(|c| c.reflection.as_ref())
    }

    pub fn prayer(&self) -> Option<&SourcedPrayer> {
        self.content().and_then(|c| c.prayer.as_ref())
    }

    pub fn feast_info(&self) -> Option<&FeastInfo> {
        self.content().and_then(|c| c.feast_info.as_ref())
    }

    pub fn missing(&self) -> &[MissingPart] {
        match &self.outcome {
            BundleOutcome::Success { missing, .. } | BundleOutcome::Partial { missing, .. } => {
                missing
            }
            BundleOutcome::Failed { .. } => &[],
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            BundleOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}
