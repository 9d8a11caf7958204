//! Liturgical reference data for Lectio.
//!
//! - [`calendar`]: resolve a date into a [`LiturgicalContext`](lectio_shared::LiturgicalContext)
//! - [`saints`]: biographies for saints' feasts
//! - [`prayers`]: the curated prayer dataset and context-based selection
//! - [`citations`]: Catechism paragraph checks and links

pub mod calendar;
pub mod citations;
pub mod prayers;
pub mod saints;

pub use calendar::{
    CalendarDay, CalendarSource, HttpCalendarSource, LiturgicalContextAdapter, StaticCalendarSource,
};
pub use citations::{ArchiveLink, CitationVerifier, catechism_url, in_range};
pub use prayers::{Prayer, PrayerDataset};
pub use saints::SaintDirectory;
