//! Catechism of the Catholic Church citation checks.
//!
//! The range check is authoritative. The remote existence check is advisory:
//! it only logs and never rejects generated output.

use std::time::Duration;

use lectio_shared::{Citation, CitationsConfig, LectioError, Result};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;

/// English Catechism archive; paragraphs live at `_P{hex}.HTM`.
pub const CATECHISM_ARCHIVE: &str = "https://www.vatican.va/archive/ENG0015/";

pub use lectio_shared::is_catechism_paragraph as in_range;

fn paragraph_url(base: &Url, paragraph: u32) -> Option<Url> {
    if !in_range(i64::from(paragraph)) {
        return None;
    }
    base.join(&format!("_P{paragraph:X}.HTM")).ok()
}

/// Link to a paragraph in the Vatican archive, or `None` when out of range.
pub fn catechism_url(paragraph: u32) -> Option<Url> {
    let base = Url::parse(CATECHISM_ARCHIVE).ok()?;
    paragraph_url(&base, paragraph)
}

/// Archive links for generated citations.
pub trait ArchiveLink {
    fn archive_url(&self) -> Option<Url>;
}

impl ArchiveLink for Citation {
    fn archive_url(&self) -> Option<Url> {
        catechism_url(self.reference_number)
    }
}

/// Checks that cited paragraphs resolve in the remote archive.
#[derive(Debug, Clone)]
pub struct CitationVerifier {
    client: reqwest::Client,
    base: Url,
}

impl CitationVerifier {
    pub fn from_config(config: &CitationsConfig) -> Result<Self> {
        Self::with_base(CATECHISM_ARCHIVE, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_base(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .map_err(|e| LectioError::config(format!("invalid catechism archive URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LectioError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    /// `HEAD` the paragraph page. `Ok(false)` on 404.
    #[instrument(skip(self))]
    pub async fn exists(&self, paragraph: u32) -> Result<bool> {
        let url = paragraph_url(&self.base, paragraph).ok_or_else(|| {
            LectioError::validation(format!("catechism paragraph {paragraph} is out of range"))
        })?;

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| LectioError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(LectioError::Network(format!("archive returned HTTP {s}"))),
        }
    }

    /// Check `paragraphs` in a detached task; results are only logged.
    pub fn spawn_check(&self, paragraphs: Vec<u32>) -> JoinHandle<()> {
        let verifier = self.clone();
        tokio::spawn(async move {
            for paragraph in paragraphs {
                match verifier.exists(paragraph).await {
                    Ok(true) => debug!(paragraph, "catechism paragraph confirmed"),
                    Ok(false) => warn!(paragraph, "catechism paragraph not found in archive"),
                    Err(e) => debug!(paragraph, error = %e, "catechism paragraph check skipped"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn range_is_inclusive() {
        assert!(!in_range(0));
        assert!(in_range(1));
        assert!(in_range(2865));
        assert!(!in_range(2866));
        assert!(!in_range(-5));
    }

    #[test]
    fn url_uses_hex_paragraph_id() {
        let url = catechism_url(863).unwrap();
        assert_eq!(url.as_str(), "https://www.vatican.va/archive/ENG0015/_P35F.HTM");
        assert!(catechism_url(9000).is_none());
    }

    #[test]
    fn citation_links_to_its_paragraph() {
        let citation = Citation {
            reference_number: 2558,
            excerpt_text: "Great is the mystery of the faith!".into(),
            context_note: None,
        };
        assert!(citation.archive_url().unwrap().as_str().ends_with("_P9FE.HTM"));
    }

    #[tokio::test]
    async fn remote_check_reads_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/_P35F.HTM"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/_P1.HTM"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let verifier = CitationVerifier::with_base(&server.uri(), Duration::from_secs(2)).unwrap();
        assert!(verifier.exists(863).await.unwrap());
        assert!(!verifier.exists(1).await.unwrap());
        assert!(verifier.exists(9000).await.is_err());
    }

    #[tokio::test]
    async fn detached_check_never_fails() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let verifier = CitationVerifier::with_base(&server.uri(), Duration::from_secs(2)).unwrap();
        verifier.spawn_check(vec![863, 2100]).await.unwrap();
    }
}
