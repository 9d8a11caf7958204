//! In-memory [`TextBackend`] with scripted responses, for tests.
//!
//! Requests are routed by system prompt, so synopsis and reflection scripts
//! stay independent even when synopses run concurrently.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use lectio_shared::{LectioError, validate_api_key};

use crate::backend::{BackendError, Completion, CompletionRequest, TextBackend};
use crate::prompts::REFLECTION_SYSTEM_PROMPT;

type Step = Result<Completion, BackendError>;

#[derive(Default)]
struct Script {
    queue: VecDeque<Step>,
    fallback: Option<Step>,
    requests: Vec<CompletionRequest>,
}

impl Script {
    fn next(&mut self, request: &CompletionRequest) -> Step {
        self.requests.push(request.clone());
        self.queue
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".into())))
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    synopsis: Mutex<Script>,
    reflection: Mutex<Script>,
    missing_key_env: Option<String>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completion(text: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Completion {
        Completion {
            text: text.into(),
            input_tokens,
            output_tokens,
        }
    }

    /// Answer every synopsis request with `step` once the queue is empty.
    pub fn synopsis_always(self, step: Step) -> Self {
        lock(&self.synopsis).fallback = Some(step);
        self
    }

    /// Queue one synopsis response.
    pub fn synopsis_then(self, step: Step) -> Self {
        lock(&self.synopsis).queue.push_back(step);
        self
    }

    pub fn reflection_always(self, step: Step) -> Self {
        lock(&self.reflection).fallback = Some(step);
        self
    }

    pub fn reflection_then(self, step: Step) -> Self {
        lock(&self.reflection).queue.push_back(step);
        self
    }

    /// Report missing credentials from `ensure_configured`, reading `var`.
    pub fn requiring_key(mut self, var: impl Into<String>) -> Self {
        self.missing_key_env = Some(var.into());
        self
    }

    pub fn synopsis_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.synopsis).requests.clone()
    }

    pub fn reflection_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.reflection).requests.clone()
    }

    pub fn synopsis_calls(&self) -> usize {
        lock(&self.synopsis).requests.len()
    }

    pub fn reflection_calls(&self) -> usize {
        lock(&self.reflection).requests.len()
    }
}

fn lock(script: &Mutex<Script>) -> std::sync::MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    fn ensure_configured(&self) -> Result<(), LectioError> {
        match &self.missing_key_env {
            Some(var) => validate_api_key(var).map(|_| ()),
            None => Ok(()),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let script = if request.system == REFLECTION_SYSTEM_PROMPT {
            &self.reflection
        } else {
            &self.synopsis
        };
        lock(script).next(request)
    }
}

/// A synopsis response body.
pub fn synopsis_json(text: &str) -> String {
    serde_json::json!({ "synopsis": text }).to_string()
}

/// A reflection response body citing the given paragraph numbers.
pub fn reflection_json(paragraphs: &[i64]) -> String {
    let citations: Vec<_> = paragraphs
        .iter()
        .map(|n| {
            serde_json::json!({
                "paragraph_number": n,
                "excerpt_text": "Christ calls each one to follow him.",
                "context_note": "The call of the first disciples."
            })
        })
        .collect();
    serde_json::json!({
        "reflection_text": "The readings speak of a call heard and answered.",
        "pondering_questions": [
            "Where is Christ calling me today?",
            "What nets must I leave behind?"
        ],
        "ccc_citations": citations,
    })
    .to_string()
}
