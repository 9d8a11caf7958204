//! End-to-end augmentation run: readings → synopses → liturgical day →
//! prayer → reflection → bundle.
//!
//! The run is a fixed sequence of [`PipelineState`]s. Only a missing reading
//! set or an unconfigured backend fails the bundle; every later failure is
//! absorbed into a [`MissingPart`] and the affected field is left empty.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use lectio_generation::{
    AnthropicBackend, CostTracker, GenerationClient, GenerationError, GenerationSettings, Operation,
};
use lectio_liturgy::{CitationVerifier, LiturgicalContextAdapter, PrayerDataset};
use lectio_shared::{
    AppConfig, AugmentedBundle, AugmentedContent, BundleId, BundleOutcome, FeastInfo,
    LiturgicalContext, MissingPart, PipelineStep, Reading, Reflection, Result, SynopsisEntry,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

// ---------------------------------------------------------------------------
// States & progress
// ---------------------------------------------------------------------------

/// Steps of one augmentation run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Synopses,
    FeastLookup,
    PrayerSelect,
    ReflectionGen,
    CostCheck,
    /// Terminal: the reflection, or a synopsis for every reading.
    Assembled,
    /// Terminal: incomplete generated text, deterministic content kept.
    Degraded,
    /// Terminal: nothing was attempted.
    Failed,
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Init => "Checking inputs",
            Self::Synopses => "Generating synopses",
            Self::FeastLookup => "Looking up liturgical day",
            Self::PrayerSelect => "Selecting prayer",
            Self::ReflectionGen => "Generating reflection",
            Self::CostCheck => "Checking cost",
            Self::Assembled => "Assembled",
            Self::Degraded => "Degraded",
            Self::Failed => "Failed",
        }
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new state.
    fn phase(&self, state: PipelineState);
    /// Called as each synopsis settles, in reading order.
    fn synopsis_settled(&self, title: &str, generated: bool, current: usize, total: usize);
    /// Called once with the finished bundle.
    fn done(&self, bundle: &AugmentedBundle);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: PipelineState) {}
    fn synopsis_settled(&self, _title: &str, _generated: bool, _current: usize, _total: usize) {}
    fn done(&self, _bundle: &AugmentedBundle) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one augmentation run per call to [`run`](Self::run).
///
/// Each run accounts into its own cost tracker, built from the ceiling and
/// pricing of the client's tracker; repeated runs never share a budget.
pub struct ReflectionOrchestrator {
    client: GenerationClient,
    calendar: LiturgicalContextAdapter,
    prayers: Arc<PrayerDataset>,
    verifier: Option<CitationVerifier>,
    synopsis_concurrency: usize,
}

impl ReflectionOrchestrator {
    pub fn new(
        client: GenerationClient,
        calendar: LiturgicalContextAdapter,
        prayers: Arc<PrayerDataset>,
    ) -> Self {
        Self {
            client,
            calendar,
            prayers,
            verifier: None,
            synopsis_concurrency: 4,
        }
    }

    /// Wire up the production stack from configuration.
    ///
    /// Fails on an unusable budget, calendar or prayer dataset. Missing
    /// credentials are not checked here; [`run`](Self::run) reports them as
    /// a failed bundle.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = Arc::new(AnthropicBackend::from_config(&config.generation)?);
        let cost = Arc::new(CostTracker::from_config(&config.budget)?);
        let client = GenerationClient::new(backend, cost, GenerationSettings::from_config(config));
        let calendar = LiturgicalContextAdapter::from_config(&config.calendar)?;
        let prayers = Arc::new(PrayerDataset::load(
            config.prayers.dataset_path.as_deref().map(Path::new),
        )?);

        let mut orchestrator = Self::new(client, calendar, prayers)
            .with_synopsis_concurrency(config.generation.synopsis_concurrency as usize);
        if config.citations.verify_remote {
            orchestrator = orchestrator
                .with_citation_verifier(CitationVerifier::from_config(&config.citations)?);
        }
        Ok(orchestrator)
    }

    pub fn with_synopsis_concurrency(mut self, limit: usize) -> Self {
        self.synopsis_concurrency = limit.max(1);
        self
    }

    /// Check accepted citations against the remote archive (log only).
    pub fn with_citation_verifier(mut self, verifier: CitationVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// The template client. Runs use a copy with a fresh cost tracker.
    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    /// Run the full pipeline for `date`. Never errors: failures are encoded
    /// in the bundle's status.
    #[instrument(skip_all, fields(%date, readings = readings.len()))]
    pub async fn run(
        &self,
        date: NaiveDate,
        readings: Vec<Reading>,
        progress: &dyn ProgressReporter,
    ) -> AugmentedBundle {
        let start = Instant::now();
        let bundle_id = BundleId::new();
        let client = self.client.with_cost(Arc::new(self.client.cost().fresh()));
        info!(%bundle_id, %date, readings = readings.len(), "starting augmentation run");

        // --- Init ---
        progress.phase(PipelineState::Init);
        if readings.is_empty() {
            return fail(&client, bundle_id, date, readings, "no readings supplied", progress);
        }
        if let Err(e) = client.ensure_configured() {
            return fail(&client, bundle_id, date, readings, &e.to_string(), progress);
        }

        let mut missing = Vec::new();

        // --- Synopses ---
        progress.phase(PipelineState::Synopses);
        let synopses = self
            .generate_synopses(&client, &readings, &mut missing, progress)
            .await;

        // --- Feast lookup ---
        progress.phase(PipelineState::FeastLookup);
        let (context, feast_info) = match self.calendar.resolve(date).await {
            Ok(context) => {
                let feast = context.feast.clone();
                (context, Some(feast))
            }
            Err(e) => {
                warn!(%date, error = %e, "calendar lookup failed, assuming ordinary weekday");
                missing.push(MissingPart {
                    step: PipelineStep::FeastLookup,
                    subject: Some(date.to_string()),
                    cause: e.to_string(),
                    attempts: 1,
                });
                (LiturgicalContext::ordinary_weekday(date), None)
            }
        };

        // --- Prayer ---
        progress.phase(PipelineState::PrayerSelect);
        let prayer = self.prayers.select(&context, feast_info.as_ref());

        // --- Reflection ---
        progress.phase(PipelineState::ReflectionGen);
        let reflection = self
            .generate_reflection(
                &client,
                &readings,
                &synopses,
                &context,
                feast_info.as_ref(),
                &mut missing,
            )
            .await;

        // --- Cost check ---
        progress.phase(PipelineState::CostCheck);
        let cost_summary = client.cost().summary();
        info!(
            api_calls = cost_summary.api_calls_count,
            input_tokens = cost_summary.total_input_tokens,
            output_tokens = cost_summary.total_output_tokens,
            total_cost = cost_summary.total_cost,
            ceiling = cost_summary.ceiling,
            "cost summary"
        );
        if cost_summary.exceeded_budget {
            warn!(
                total_cost = cost_summary.total_cost,
                ceiling = cost_summary.ceiling,
                "actual usage crossed the budget ceiling"
            );
        }

        let content = AugmentedContent {
            liturgical_day: context.day_label.clone(),
            synopses,
            reflection,
            prayer: Some(prayer),
            feast_info,
        };
        let (state, outcome) = if content.is_complete() {
            (
                PipelineState::Assembled,
                BundleOutcome::Success { content, missing },
            )
        } else {
            if content.has_generated_text() {
                info!(
                    generated_synopses = content.generated_synopses(),
                    readings = content.synopses.len(),
                    "incomplete synopses and no reflection, bundle is partial"
                );
            }
            (
                PipelineState::Degraded,
                BundleOutcome::Partial { content, missing },
            )
        };
        progress.phase(state);

        let bundle = AugmentedBundle {
            bundle_id,
            date,
            readings,
            cost_summary,
            generation_timestamp: Utc::now(),
            outcome,
        };
        info!(
            status = %bundle.status(),
            missing = bundle.missing().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "augmentation run complete"
        );
        progress.done(&bundle);
        bundle
    }

    /// One task per reading, bounded by the concurrency limit, joined in
    /// reading order. The result always has one entry per reading.
    async fn generate_synopses(
        &self,
        client: &GenerationClient,
        readings: &[Reading],
        missing: &mut Vec<MissingPart>,
        progress: &dyn ProgressReporter,
    ) -> Vec<SynopsisEntry> {
        let permits = Arc::new(Semaphore::new(self.synopsis_concurrency));
        let handles: Vec<_> = readings
            .iter()
            .cloned()
            .map(|reading| {
                let client = client.clone();
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    client.synopsis(&reading).await
                })
            })
            .collect();

        let total = readings.len();
        let mut entries = Vec::with_capacity(total);
        for (i, (reading, handle)) in readings.iter().zip(handles).enumerate() {
            let outcome = handle.await.unwrap_or_else(|e| {
                Err(GenerationError::InvalidInput {
                    operation: Operation::Synopsis.to_string(),
                    message: format!("synopsis task aborted: {e}"),
                })
            });
            let entry = match outcome {
                Ok(synopsis) => SynopsisEntry::Generated(synopsis),
                Err(e) => {
                    warn!(reading = %reading.title, error = %e, "synopsis unavailable");
                    missing.push(MissingPart {
                        step: PipelineStep::Synopsis,
                        subject: Some(reading.title.clone()),
                        cause: e.to_string(),
                        attempts: e.attempts(),
                    });
                    SynopsisEntry::Missing {
                        reading_title: reading.title.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            progress.synopsis_settled(&reading.title, entry.is_generated(), i + 1, total);
            entries.push(entry);
        }
        entries
    }

    async fn generate_reflection(
        &self,
        client: &GenerationClient,
        readings: &[Reading],
        synopses: &[SynopsisEntry],
        context: &LiturgicalContext,
        feast: Option<&FeastInfo>,
        missing: &mut Vec<MissingPart>,
    ) -> Option<Reflection> {
        let cost = client.cost();
        let request = client.reflection_request(readings, synopses, context, feast);

        let skipped = if cost.exceeded() {
            Some("budget ceiling already reached".to_string())
        } else if client.would_exceed(Operation::Reflection, &request) {
            let (input, output) = client.estimate(Operation::Reflection, &request);
            Some(format!(
                "estimated ${:.4} exceeds remaining budget ${:.4}",
                cost.cost_of(input, output),
                cost.remaining()
            ))
        } else {
            None
        };
        if let Some(cause) = skipped {
            info!(cause = %cause, "reflection skipped by budget pre-flight");
            missing.push(MissingPart {
                step: PipelineStep::Reflection,
                subject: None,
                cause,
                attempts: 0,
            });
            return None;
        }

        match client.reflection_from(request).await {
            Ok(reflection) => {
                if let Some(verifier) = &self.verifier {
                    let paragraphs = reflection
                        .citations
                        .iter()
                        .map(|c| c.reference_number)
                        .collect();
                    debug!("spawning advisory citation check");
                    // Detached; the run never waits on the archive.
                    drop(verifier.spawn_check(paragraphs));
                }
                Some(reflection)
            }
            Err(e) => {
                warn!(error = %e, "reflection unavailable");
                missing.push(MissingPart {
                    step: PipelineStep::Reflection,
                    subject: None,
                    cause: e.to_string(),
                    attempts: e.attempts(),
                });
                None
            }
        }
    }
}

fn fail(
    client: &GenerationClient,
    bundle_id: BundleId,
    date: NaiveDate,
    readings: Vec<Reading>,
    reason: &str,
    progress: &dyn ProgressReporter,
) -> AugmentedBundle {
    warn!(%bundle_id, reason, "augmentation run failed before generation");
    progress.phase(PipelineState::Failed);
    let bundle = AugmentedBundle {
        bundle_id,
        date,
        readings,
        cost_summary: client.cost().summary(),
        generation_timestamp: Utc::now(),
        outcome: BundleOutcome::Failed {
            reason: reason.to_string(),
        },
    };
    progress.done(&bundle);
    bundle
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lectio_generation::testing::{ScriptedBackend, reflection_json, synopsis_json};
    use lectio_generation::{BackendError, BackoffPolicy, Pricing};
    use lectio_liturgy::{SaintDirectory, StaticCalendarSource};
    use lectio_shared::{BundleStatus, FeastType};

    use super::*;

    const CALENDAR: &str = r#"{
        "2024-11-30": {
            "date": "2024-11-30",
            "name": "Saint Andrew, Apostle",
            "type": "FEAST",
            "rank": "FEAST",
            "liturgicalColors": ["RED"],
            "season": "ORDINARY_TIME"
        }
    }"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()
    }

    fn readings() -> Vec<Reading> {
        vec![
            Reading::new(
                "First Reading",
                "Romans 10:9-18",
                "If you confess with your mouth that Jesus is Lord you will be saved.",
            ),
            Reading::new(
                "Responsorial Psalm",
                "Psalm 19:8-11",
                "The law of the Lord is perfect, refreshing the soul.",
            ),
            Reading::new(
                "Gospel",
                "Matthew 4:18-22",
                "Come after me, and I will make you fishers of men.",
            ),
        ]
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            backoff: BackoffPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..GenerationSettings::default()
        }
    }

    fn calendar() -> LiturgicalContextAdapter {
        let source = StaticCalendarSource::from_json(CALENDAR).unwrap();
        LiturgicalContextAdapter::new(Arc::new(source), SaintDirectory::embedded().unwrap())
    }

    fn orchestrator(
        backend: ScriptedBackend,
        ceiling: f64,
        calendar: LiturgicalContextAdapter,
    ) -> (ReflectionOrchestrator, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let cost = Arc::new(CostTracker::new(ceiling, Pricing::default()).unwrap());
        let client = GenerationClient::new(backend.clone(), cost, settings());
        let prayers = Arc::new(PrayerDataset::embedded().unwrap());
        (ReflectionOrchestrator::new(client, calendar, prayers), backend)
    }

    fn synopsis_ok() -> std::result::Result<lectio_generation::Completion, BackendError> {
        Ok(ScriptedBackend::completion(
            synopsis_json("God calls and sends messengers so that all may hear."),
            400,
            30,
        ))
    }

    fn reflection_ok(paragraphs: &[i64]) -> std::result::Result<lectio_generation::Completion, BackendError> {
        Ok(ScriptedBackend::completion(reflection_json(paragraphs), 1500, 500))
    }

    #[tokio::test]
    async fn all_calls_succeed() {
        let backend = ScriptedBackend::new()
            .synopsis_always(synopsis_ok())
            .reflection_always(reflection_ok(&[863]));
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Success);
        assert_eq!(bundle.synopses().len(), 3);
        assert!(bundle.synopses().iter().all(SynopsisEntry::is_generated));
        assert!(bundle.reflection().is_some());
        assert!(bundle.missing().is_empty());
        assert_eq!(bundle.cost_summary.api_calls_count, 4);
        assert!(bundle.cost_summary.total_cost < 0.04);
        assert!(!bundle.cost_summary.exceeded_budget);
        assert_eq!(backend.synopsis_calls(), 3);
        assert_eq!(backend.reflection_calls(), 1);
    }

    #[tokio::test]
    async fn saint_feast_shapes_prayer_and_prompt() {
        let backend = ScriptedBackend::new()
            .synopsis_always(synopsis_ok())
            .reflection_always(reflection_ok(&[863]));
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        let feast = bundle.feast_info().unwrap();
        assert_eq!(feast.feast_type, FeastType::Saint);
        assert!(feast.saint_bio.is_some());
        assert_eq!(bundle.prayer().unwrap().prayer_id, "prayer-for-apostles");
        assert_eq!(
            bundle.content().unwrap().liturgical_day,
            "Saint Andrew, Apostle"
        );

        let prompt = &backend.reflection_requests()[0].user;
        assert!(prompt.contains("Saint Andrew, Apostle"));
        assert!(prompt.contains("God calls and sends messengers"));
    }

    #[tokio::test]
    async fn out_of_range_citation_is_corrected() {
        let backend = ScriptedBackend::new()
            .synopsis_always(synopsis_ok())
            .reflection_then(reflection_ok(&[9000]))
            .reflection_then(reflection_ok(&[2100]));
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        let reflection = bundle.reflection().unwrap();
        assert_eq!(reflection.citations[0].reference_number, 2100);
        assert_eq!(backend.reflection_calls(), 2);
        assert_eq!(bundle.cost_summary.api_calls_count, 5);
        assert_eq!(bundle.status(), BundleStatus::Success);
    }

    #[tokio::test]
    async fn unreachable_synopses_still_succeed_with_reflection() {
        let backend = ScriptedBackend::new()
            .synopsis_always(Err(BackendError::Transport("connection refused".into())))
            .reflection_always(reflection_ok(&[1716]));
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Success);
        assert_eq!(bundle.readings.len(), 3);
        assert_eq!(bundle.synopses().len(), 3);
        assert!(!bundle.synopses().iter().any(SynopsisEntry::is_generated));
        assert_eq!(backend.synopsis_calls(), 9);
        let synopsis_gaps: Vec<_> = bundle
            .missing()
            .iter()
            .filter(|m| m.step == PipelineStep::Synopsis)
            .collect();
        assert_eq!(synopsis_gaps.len(), 3);
        assert!(synopsis_gaps.iter().all(|m| m.attempts == 3));
        assert!(bundle.reflection().is_some());
    }

    #[tokio::test]
    async fn no_generated_text_degrades_to_partial() {
        let backend = ScriptedBackend::new()
            .synopsis_always(Err(BackendError::Transport("connection refused".into())))
            .reflection_always(Err(BackendError::Transport("connection refused".into())));
        let (orchestrator, _) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Partial);
        assert_eq!(bundle.readings.len(), 3);
        assert_eq!(bundle.synopses().len(), 3);
        assert!(bundle.reflection().is_none());
        assert!(bundle.prayer().is_some());
        assert!(bundle.feast_info().is_some());
        assert!(
            bundle
                .missing()
                .iter()
                .any(|m| m.step == PipelineStep::Reflection && m.attempts == 3)
        );
    }

    #[tokio::test]
    async fn reflection_skipped_when_preflight_denies() {
        let backend = ScriptedBackend::new()
            .synopsis_always(Ok(ScriptedBackend::completion(
                synopsis_json("God calls and sends messengers so that all may hear."),
                100,
                20,
            )))
            .reflection_always(reflection_ok(&[863]));
        let (orchestrator, backend) = orchestrator(backend, 0.01, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(backend.reflection_calls(), 0);
        assert!(bundle.reflection().is_none());
        assert_eq!(bundle.status(), BundleStatus::Success);
        assert!(bundle.synopses().iter().all(SynopsisEntry::is_generated));
        assert!(bundle.prayer().is_some());
        let gap = bundle
            .missing()
            .iter()
            .find(|m| m.step == PipelineStep::Reflection)
            .unwrap();
        assert_eq!(gap.attempts, 0);
        assert!(bundle.cost_summary.total_cost <= 0.01);
    }

    #[tokio::test]
    async fn calendar_failure_falls_back_to_weekday() {
        let backend = ScriptedBackend::new()
            .synopsis_always(synopsis_ok())
            .reflection_always(reflection_ok(&[863]));
        let disabled = LiturgicalContextAdapter::disabled(SaintDirectory::embedded().unwrap());
        let (orchestrator, _) = orchestrator(backend, 0.04, disabled);

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Success);
        assert!(bundle.feast_info().is_none());
        assert!(bundle.prayer().is_some());
        assert_eq!(
            bundle.content().unwrap().liturgical_day,
            "Saturday in Ordinary Time"
        );
        assert!(
            bundle
                .missing()
                .iter()
                .any(|m| m.step == PipelineStep::FeastLookup)
        );
    }

    #[tokio::test]
    async fn no_readings_fails_without_calls() {
        let backend = ScriptedBackend::new().synopsis_always(synopsis_ok());
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), Vec::new(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Failed);
        assert!(bundle.failure_reason().unwrap().contains("no readings"));
        assert_eq!(bundle.cost_summary.api_calls_count, 0);
        assert_eq!(backend.synopsis_calls(), 0);
    }

    #[tokio::test]
    async fn missing_credentials_fail_with_hint() {
        let var = format!("LECTIO_TEST_KEY_{}", uuid::Uuid::now_v7().simple());
        let backend = ScriptedBackend::new()
            .requiring_key(var.clone())
            .synopsis_always(synopsis_ok());
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Failed);
        assert!(bundle.failure_reason().unwrap().contains(&var));
        assert_eq!(bundle.readings.len(), 3);
        assert_eq!(backend.synopsis_calls(), 0);
        assert_eq!(backend.reflection_calls(), 0);
    }

    #[tokio::test]
    async fn one_synopsis_entry_per_reading_in_order() {
        let backend = ScriptedBackend::new()
            .synopsis_then(synopsis_ok())
            .synopsis_then(Ok(ScriptedBackend::completion("not json", 50, 5)))
            .synopsis_always(synopsis_ok())
            .reflection_always(reflection_ok(&[863]));
        let (orchestrator, _) = orchestrator(backend, 0.04, calendar());
        let orchestrator = orchestrator.with_synopsis_concurrency(1);

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        let titles: Vec<_> = bundle.synopses().iter().map(SynopsisEntry::reading_title).collect();
        assert_eq!(titles, vec!["First Reading", "Responsorial Psalm", "Gospel"]);
        assert!(bundle.synopses().iter().all(SynopsisEntry::is_generated));
    }

    #[tokio::test]
    async fn some_synopses_without_reflection_is_partial() {
        let backend = ScriptedBackend::new()
            .synopsis_then(synopsis_ok())
            .synopsis_always(Err(BackendError::Transport("connection reset".into())))
            .reflection_always(Err(BackendError::Transport("connection reset".into())));
        let (orchestrator, _) = orchestrator(backend, 0.04, calendar());
        let orchestrator = orchestrator.with_synopsis_concurrency(1);

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Partial);
        assert_eq!(bundle.synopses().len(), 3);
        assert!(bundle.synopses()[0].is_generated());
        assert_eq!(bundle.content().unwrap().generated_synopses(), 1);
        assert!(bundle.reflection().is_none());
        assert!(bundle.prayer().is_some());
        let gaps: Vec<_> = bundle.missing().iter().map(|m| m.step).collect();
        assert_eq!(
            gaps,
            vec![PipelineStep::Synopsis, PipelineStep::Synopsis, PipelineStep::Reflection]
        );
    }

    #[tokio::test]
    async fn every_synopsis_without_reflection_succeeds() {
        let backend = ScriptedBackend::new()
            .synopsis_always(synopsis_ok())
            .reflection_always(Err(BackendError::Transport("connection reset".into())));
        let (orchestrator, _) = orchestrator(backend, 0.04, calendar());

        let bundle = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_eq!(bundle.status(), BundleStatus::Success);
        assert_eq!(bundle.synopses().len(), bundle.readings.len());
        assert!(bundle.reflection().is_none());
    }

    #[tokio::test]
    async fn each_run_starts_with_an_empty_budget() {
        let backend = ScriptedBackend::new()
            .synopsis_always(synopsis_ok())
            .reflection_always(reflection_ok(&[863]));
        let (orchestrator, backend) = orchestrator(backend, 0.04, calendar());

        let first = orchestrator.run(date(), readings(), &SilentProgress).await;
        let second = orchestrator.run(date(), readings(), &SilentProgress).await;

        assert_ne!(first.bundle_id, second.bundle_id);
        assert_eq!(first.status(), BundleStatus::Success);
        assert_eq!(second.status(), BundleStatus::Success);
        assert_eq!(first.cost_summary.api_calls_count, 4);
        assert_eq!(second.cost_summary.api_calls_count, 4);
        assert_eq!(
            first.cost_summary.total_input_tokens,
            second.cost_summary.total_input_tokens
        );
        assert_eq!(
            first.cost_summary.total_output_tokens,
            second.cost_summary.total_output_tokens
        );
        assert!((first.cost_summary.total_cost - second.cost_summary.total_cost).abs() < 1e-12);
        assert_eq!(backend.reflection_calls(), 2);
        assert_eq!(orchestrator.client().cost().api_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_synopses_respect_a_tight_ceiling() {
        let readings: Vec<Reading> = (1..=6)
            .map(|i| {
                Reading::new(
                    format!("Reading {i}"),
                    "Mark 1:14-20",
                    "Repent, and believe in the gospel.",
                )
            })
            .collect();

        let sizing_cost = Arc::new(CostTracker::new(1.0, Pricing::default()).unwrap());
        let sizing = GenerationClient::new(Arc::new(ScriptedBackend::new()), sizing_cost, settings());
        let (input, output) = sizing.estimate(
            Operation::Synopsis,
            &sizing.synopsis_request(&readings[0]),
        );
        let per_call = Pricing::default().cost(input, output);
        let ceiling = per_call * 2.5;

        let backend = ScriptedBackend::new()
            .synopsis_always(Ok(ScriptedBackend::completion(
                synopsis_json("Jesus calls the first disciples to follow him."),
                input,
                output,
            )))
            .reflection_always(reflection_ok(&[1427]));
        let (orchestrator, backend) = orchestrator(backend, ceiling, calendar());
        let orchestrator = orchestrator.with_synopsis_concurrency(6);

        let bundle = orchestrator.run(date(), readings, &SilentProgress).await;

        let summary = &bundle.cost_summary;
        assert_eq!(summary.api_calls_count, 2);
        assert!(summary.total_cost <= ceiling);
        assert!(!summary.exceeded_budget);
        let before_last: f64 = summary.calls[..summary.calls.len() - 1]
            .iter()
            .map(|c| c.cost)
            .sum();
        assert!(before_last <= ceiling);

        assert_eq!(bundle.synopses().len(), 6);
        assert_eq!(bundle.content().unwrap().generated_synopses(), 2);
        let denied: Vec<_> = bundle
            .missing()
            .iter()
            .filter(|m| m.step == PipelineStep::Synopsis)
            .collect();
        assert_eq!(denied.len(), 4);
        assert!(denied.iter().all(|m| m.attempts == 0));

        assert_eq!(backend.synopsis_calls(), 2);
        assert_eq!(backend.reflection_calls(), 0);
        assert_eq!(bundle.status(), BundleStatus::Partial);
    }
}
