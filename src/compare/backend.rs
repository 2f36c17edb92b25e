//! External similarity backends (embeddings, LLM judges) and the gate that
//! bounds how many calls run at once and how long each may take.
//!
//! Backend failures never abort an evaluation: SEMANTIC and LLM fields whose
//! backend is missing, failing or slow get a zero-confidence outcome that
//! names the cause.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, warn};

use super::text::threshold_outcome;
use super::{CompareScope, Comparator, FieldRef};
use crate::error::{BackendError, ComparatorIncompatibleError};
use crate::model::ComparisonOutcome;
use crate::schema::ComparisonMethod;
use crate::value::FieldValue;

pub const DEFAULT_BACKEND_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 10_000;

pub trait EmbeddingBackend: Send + Sync {
    fn name(&self) -> &str;

    fn embed_similarity(&self, left: &str, right: &str) -> Result<f64, BackendError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub matched: bool,
    pub score: f64,
    pub reason: String,
}

pub trait JudgeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn llm_judge(
        &self,
        expected: &str,
        actual: &str,
        field_name: &str,
        field_description: Option<&str>,
    ) -> Result<Judgement, BackendError>;
}

/// Counting semaphore over a bounded channel of permits, plus a per-call
/// deadline covering both the wait for a permit and the call itself.
pub struct BackendGate {
    release: Sender<()>,
    acquire: Receiver<()>,
    max_concurrency: usize,
    timeout: Option<Duration>,
}

struct Permit {
    release: Sender<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        // Only fails if the gate is gone, and then nobody is waiting.
        let _ = self.release.send(());
    }
}

impl BackendGate {
    /// `timeout_ms == 0` disables the deadline. Concurrency is at least one.
    pub fn new(max_concurrency: usize, timeout_ms: u64) -> Self {
        let max_concurrency = max_concurrency.max(1);
        let (release, acquire) = bounded(max_concurrency);
        for _ in 0..max_concurrency {
            // Capacity equals the number of sends, so this cannot block or fail.
            let _ = release.send(());
        }
        Self {
            release,
            acquire,
            max_concurrency,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `call` under a permit. With a deadline, the call runs on its own
    /// thread so a hung backend only costs the caller the timeout; the permit
    /// stays held until the abandoned call actually returns.
    pub fn call<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    {
        let Some(timeout) = self.timeout else {
            self.acquire
                .recv()
                .map_err(|_| BackendError::Unavailable("backend gate closed".to_string()))?;
            let _permit = Permit {
                release: self.release.clone(),
            };
            return call();
        };

        let started = Instant::now();
        match self.acquire.recv_timeout(timeout) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => return Err(BackendError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BackendError::Unavailable("backend gate closed".to_string()));
            }
        }
        let permit = Permit {
            release: self.release.clone(),
        };

        let (result_tx, result_rx) = bounded::<Result<T, BackendError>>(1);
        thread::Builder::new()
            .name("backend-call".to_string())
            .spawn(move || {
                let _permit = permit;
                // The receiver is gone if the caller already timed out.
                let _ = result_tx.send(call());
            })
            .map_err(|err| BackendError::Failed(format!("could not spawn backend call: {err}")))?;

        let remaining = timeout.saturating_sub(started.elapsed());
        match result_rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(BackendError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(BackendError::Failed("backend call panicked".to_string()))
            }
        }
    }
}

impl Default for BackendGate {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_MAX_CONCURRENCY, DEFAULT_BACKEND_TIMEOUT_MS)
    }
}

#[derive(Clone)]
pub struct Backends {
    pub embedding: Option<Arc<dyn EmbeddingBackend>>,
    pub judge: Option<Arc<dyn JudgeBackend>>,
    pub gate: Arc<BackendGate>,
}

impl Backends {
    pub fn none() -> Self {
        Self {
            embedding: None,
            judge: None,
            gate: Arc::new(BackendGate::default()),
        }
    }

    pub fn with_embedding(mut self, backend: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedding = Some(backend);
        self
    }

    pub fn with_gate(mut self, gate: BackendGate) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    pub fn embedding_name(&self) -> &str {
        self.embedding
            .as_ref()
            .map(|backend| backend.name())
            .unwrap_or("none")
    }

    pub fn judge_name(&self) -> &str {
        self.judge
            .as_ref()
            .map(|backend| backend.name())
            .unwrap_or("none")
    }
}

fn backend_failure_outcome(
    method: ComparisonMethod,
    expected: &FieldValue,
    actual: &FieldValue,
    field: FieldRef<'_>,
    err: &BackendError,
) -> ComparisonOutcome {
    warn!(path = %field.path, method = %method, error = %err, "backend comparison failed");
    ComparisonOutcome::new(field.path, expected, actual, method, 0.0, false, err.to_string())
}

pub struct SemanticComparator {
    backends: Backends,
}

impl SemanticComparator {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }
}

impl Comparator for SemanticComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::Semantic
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        _scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        field.ensure_scalar(self.method(), expected, actual)?;
        let Some(backend) = self.backends.embedding.clone() else {
            let err = BackendError::Unavailable("no embedding backend configured".to_string());
            return Ok(backend_failure_outcome(self.method(), expected, actual, field, &err));
        };

        let left = expected.comparable_text();
        let right = actual.comparable_text();
        let result = self
            .backends
            .gate
            .call(move || backend.embed_similarity(&left, &right));

        Ok(match result {
            Ok(similarity) => {
                debug!(path = %field.path, similarity, "embedding similarity");
                let similarity = if similarity.is_finite() {
                    similarity.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                threshold_outcome(self.method(), expected, actual, field, similarity)
            }
            Err(err) => backend_failure_outcome(self.method(), expected, actual, field, &err),
        })
    }
}

pub struct LlmComparator {
    backends: Backends,
}

impl LlmComparator {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }
}

impl Comparator for LlmComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::Llm
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        _scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        field.ensure_scalar(self.method(), expected, actual)?;
        let Some(backend) = self.backends.judge.clone() else {
            let err = BackendError::Unavailable("no judge backend configured".to_string());
            return Ok(backend_failure_outcome(self.method(), expected, actual, field, &err));
        };

        let node = field.node();
        let left = expected.comparable_text();
        let right = actual.comparable_text();
        let field_name = node.name.clone();
        let description = node.description.clone();
        let result = self.backends.gate.call(move || {
            backend.llm_judge(&left, &right, &field_name, description.as_deref())
        });

        Ok(match result {
            Ok(judgement) => ComparisonOutcome::new(
                field.path,
                expected,
                actual,
                self.method(),
                judgement.score,
                judgement.matched,
                format!("judge: {}", judgement.reason),
            ),
            Err(err) => backend_failure_outcome(self.method(), expected, actual, field, &err),
        })
    }
}
