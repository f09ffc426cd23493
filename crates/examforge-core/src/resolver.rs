//! Model resolution and fallback.
//!
//! The resolver discovers which model identities the vendor serves, orders
//! them into a candidate list and walks that list until one call succeeds.
//! Failures are classified (see [`FailureKind`]):
//!
//! - quota: linear backoff, then the next candidate;
//! - model not found: the discovery cache is invalidated and the remaining
//!   candidates re-resolved (already attempted models are never retried);
//! - anything else: abort immediately.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ExamError, FailureKind, Result};
use crate::traits::{Attachment, GenerateRequest, GenerateResponse, GenerationBackend, ModelInfo};

/// Model used when the configuration names none.
pub const DEFAULT_CONFIGURED_MODEL: &str = "gemini-2.5-flash";

/// Static fallback tiers, best first.
pub const DEFAULT_FALLBACK_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

/// Default linear backoff step between quota failures.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(2);

/// Which models to prefer and how long to back off.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy {
    pub configured_model: String,
    pub fallback_models: Vec<String>,
    pub backoff_step: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            configured_model: DEFAULT_CONFIGURED_MODEL.to_string(),
            fallback_models: DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

/// Strip the vendor's "models/" prefix.
pub fn normalize_model_id(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix("models/").unwrap_or(id)
}

/// Keep models that can generate content and are not speech, embedding or
/// robotics models. Ids are normalized and deduplicated, listing order kept.
pub fn usable_models(listing: &[ModelInfo]) -> Vec<String> {
    let mut seen = HashSet::new();
    listing
        .iter()
        .filter(|m| m.supports_generation && !m.modality.is_excluded())
        .map(|m| normalize_model_id(&m.id).to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

/// Order candidate models.
///
/// With a discovered list: the configured model (if discovered), then the
/// fallback tiers that were discovered, then every other discovered model.
/// Without one: the configured model followed by the fallback tiers.
pub fn order_candidates(configured: &str, fallback: &[String], discovered: &[String]) -> Vec<String> {
    let configured = normalize_model_id(configured);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |id: &str, out: &mut Vec<String>| {
        if !id.is_empty() && seen.insert(id.to_string()) {
            out.push(id.to_string());
        }
    };

    if discovered.is_empty() {
        push(configured, &mut out);
        for model in fallback {
            push(normalize_model_id(model), &mut out);
        }
        return out;
    }

    let available: HashSet<&str> = discovered.iter().map(String::as_str).collect();
    if available.contains(configured) {
        push(configured, &mut out);
    }
    for model in fallback {
        let model = normalize_model_id(model);
        if available.contains(model) {
            push(model, &mut out);
        }
    }
    for model in discovered {
        push(model, &mut out);
    }
    out
}

// ---------------------------------------------------------------------------
// Discovery cache
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CacheState {
    epoch: u64,
    models: Option<Arc<Vec<String>>>,
}

/// Process-wide cache of discovered model identities.
///
/// A list is built completely before it is published. Every invalidation
/// bumps an epoch; a discovery that started under an older epoch returns its
/// result to the caller but never publishes it.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    state: RwLock<CacheState>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The published list, if any.
    pub fn cached(&self) -> Option<Arc<Vec<String>>> {
        self.read().models.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Drop the published list.
    pub fn invalidate(&self) {
        let mut state = self.write();
        state.epoch += 1;
        state.models = None;
    }

    /// Publish `models` if no invalidation happened since `epoch` was read.
    pub fn publish(&self, epoch: u64, models: Arc<Vec<String>>) -> bool {
        let mut state = self.write();
        if state.epoch != epoch {
            return false;
        }
        state.models = Some(models);
        true
    }

    /// Return the cached list, discovering it through `backend` on a miss.
    ///
    /// `None` means discovery failed or found no usable model; nothing is
    /// cached in that case so the next call tries again.
    pub async fn resolve(&self, backend: &dyn GenerationBackend) -> Option<Arc<Vec<String>>> {
        let epoch = {
            let state = self.read();
            if let Some(models) = &state.models {
                return Some(Arc::clone(models));
            }
            state.epoch
        };

        let listing = match backend.list_models().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(backend = backend.name(), "model discovery failed: {e:#}");
                return None;
            }
        };

        let models = usable_models(&listing);
        if models.is_empty() {
            warn!(
                backend = backend.name(),
                listed = listing.len(),
                "model discovery found no usable models"
            );
            return None;
        }

        let models = Arc::new(models);
        if self.publish(epoch, Arc::clone(&models)) {
            debug!(count = models.len(), "published discovered models");
        } else {
            debug!("discovery raced an invalidation; result not cached");
        }
        Some(models)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Fallback state machine
// ---------------------------------------------------------------------------

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait, then try the next candidate. Zero when no candidate remains.
    Backoff(Duration),
    /// Invalidate discovery and re-resolve the remaining candidates.
    Refresh,
    /// Surface the error now.
    Abort,
}

/// Progress through one candidate list.
#[derive(Debug, Clone)]
pub struct FallbackState {
    pending: VecDeque<String>,
    attempted: Vec<String>,
    quota_failures: u32,
    backoff_step: Duration,
    last_error: Option<String>,
}

impl FallbackState {
    pub fn new(candidates: Vec<String>, backoff_step: Duration) -> Self {
        Self {
            pending: candidates.into(),
            attempted: Vec::new(),
            quota_failures: 0,
            backoff_step,
            last_error: None,
        }
    }

    /// The next model to try. Models are never handed out twice.
    pub fn next_candidate(&mut self) -> Option<String> {
        while let Some(model) = self.pending.pop_front() {
            if !self.attempted.contains(&model) {
                self.attempted.push(model.clone());
                return Some(model);
            }
        }
        None
    }

    pub fn has_remaining(&self) -> bool {
        self.pending.iter().any(|m| !self.attempted.contains(m))
    }

    /// Record the failure of the last candidate and decide what comes next.
    pub fn record_failure(&mut self, kind: FailureKind, error: impl Into<String>) -> Step {
        self.last_error = Some(error.into());
        match kind {
            FailureKind::Quota => {
                self.quota_failures += 1;
                if self.has_remaining() {
                    Step::Backoff(self.backoff_step * self.quota_failures)
                } else {
                    Step::Backoff(Duration::ZERO)
                }
            }
            FailureKind::ModelNotFound => Step::Refresh,
            FailureKind::Fatal => Step::Abort,
        }
    }

    /// Replace the remaining candidates with a freshly resolved list, minus
    /// every model already attempted.
    pub fn replace_candidates(&mut self, fresh: Vec<String>) {
        self.pending = fresh
            .into_iter()
            .filter(|m| !self.attempted.contains(m))
            .collect();
    }

    pub fn attempted(&self) -> &[String] {
        &self.attempted
    }

    pub fn quota_failures(&self) -> u32 {
        self.quota_failures
    }

    pub fn into_exhausted(self) -> ExamError {
        ExamError::ModelsExhausted {
            attempted: self.attempted,
            last_error: self
                .last_error
                .unwrap_or_else(|| "no candidate models available".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// The model and credential of the last successful call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessRecord {
    pub model: String,
    /// 0-based credential index.
    pub credential_index: Option<usize>,
    pub at: DateTime<Utc>,
}

/// Runtime view of the generation setup.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeInfo {
    pub backend: String,
    pub configured_model: String,
    pub fallback_models: Vec<String>,
    pub credentials_configured: usize,
    pub discovered_models: Option<usize>,
    pub last_model_used: Option<String>,
    /// 1-based index of the credential used by the last successful call.
    pub last_credential: Option<usize>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Walks candidate models until a generation call succeeds.
pub struct ModelResolver {
    backend: Arc<dyn GenerationBackend>,
    policy: FallbackPolicy,
    cache: DiscoveryCache,
    last_success: RwLock<Option<SuccessRecord>>,
}

impl ModelResolver {
    pub fn new(backend: Arc<dyn GenerationBackend>, policy: FallbackPolicy) -> Self {
        Self {
            backend,
            policy,
            cache: DiscoveryCache::new(),
            last_success: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    /// The ordered candidate list, discovering models if needed.
    pub async fn candidates(&self) -> Vec<String> {
        let discovered = self.cache.resolve(self.backend.as_ref()).await;
        let discovered = discovered.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        order_candidates(
            &self.policy.configured_model,
            &self.policy.fallback_models,
            discovered,
        )
    }

    /// Generate with the first candidate that succeeds.
    pub async fn generate(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<GenerateResponse> {
        let mut state = FallbackState::new(self.candidates().await, self.policy.backoff_step);
        let started = Instant::now();

        while let Some(model) = state.next_candidate() {
            let request = GenerateRequest {
                model: model.clone(),
                prompt: prompt.to_string(),
                attachments: attachments.to_vec(),
            };
            debug!(model = %model, attempt = state.attempted().len(), "trying model");

            let err = match self.backend.generate(&request).await {
                Ok(response) => {
                    info!(
                        model = %model,
                        attempts = state.attempted().len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "generation succeeded"
                    );
                    self.record_success(&model, response.credential_index);
                    return Ok(response);
                }
                Err(err) => err,
            };

            let kind = FailureKind::classify(&err);
            match state.record_failure(kind, format!("{err:#}")) {
                Step::Backoff(delay) => {
                    warn!(model = %model, delay_ms = delay.as_millis() as u64, "quota exhausted: {err:#}");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Step::Refresh => {
                    warn!(model = %model, "model not found, refreshing discovery: {err:#}");
                    self.cache.invalidate();
                    let fresh = self.candidates().await;
                    state.replace_candidates(fresh);
                }
                Step::Abort => {
                    return Err(ExamError::Generation { model, source: err });
                }
            }
        }

        let err = state.into_exhausted();
        warn!("{err}");
        Err(err)
    }

    pub fn last_success(&self) -> Option<SuccessRecord> {
        self.last_success
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn runtime_info(&self) -> RuntimeInfo {
        let last = self.last_success();
        RuntimeInfo {
            backend: self.backend.name().to_string(),
            configured_model: self.policy.configured_model.clone(),
            fallback_models: self.policy.fallback_models.clone(),
            credentials_configured: self.backend.credential_count(),
            discovered_models: self.cache.cached().map(|m| m.len()),
            last_model_used: last.as_ref().map(|s| s.model.clone()),
            last_credential: last.as_ref().and_then(|s| s.credential_index).map(|i| i + 1),
            last_success_at: last.map(|s| s.at),
        }
    }

    fn record_success(&self, model: &str, credential_index: Option<usize>) {
        let record = SuccessRecord {
            model: model.to_string(),
            credential_index,
            at: Utc::now(),
        };
        *self.last_success.write().unwrap_or_else(|e| e.into_inner()) = Some(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::traits::Modality;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn info(id: &str) -> ModelInfo {
        ModelInfo {
            id: format!("models/{id}"),
            supports_generation: true,
            modality: Modality::Text,
        }
    }

    enum Outcome {
        Ok(&'static str),
        Quota,
        NotFound,
        Fatal,
    }

    /// Backend scripted per model; listings are served in order, the last
    /// one repeating.
    struct Scripted {
        outcomes: Mutex<HashMap<String, VecDeque<Outcome>>>,
        listings: Mutex<VecDeque<anyhow::Result<Vec<ModelInfo>>>>,
        calls: Mutex<Vec<String>>,
        list_calls: AtomicU32,
    }

    impl Scripted {
        fn new(listings: Vec<anyhow::Result<Vec<ModelInfo>>>) -> Self {
            Self {
                outcomes: Mutex::new(HashMap::new()),
                listings: Mutex::new(listings.into()),
                calls: Mutex::new(Vec::new()),
                list_calls: AtomicU32::new(0),
            }
        }

        fn script(self, model: &str, outcomes: Vec<Outcome>) -> Self {
            self.outcomes
                .lock()
                .unwrap()
                .insert(model.to_string(), outcomes.into());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn credential_count(&self) -> usize {
            2
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.calls.lock().unwrap().push(request.model.clone());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .get_mut(&request.model)
                .and_then(|q| q.pop_front());
            match outcome {
                Some(Outcome::Ok(text)) => Ok(GenerateResponse {
                    text: text.to_string(),
                    model: request.model.clone(),
                    credential_index: Some(1),
                    latency_ms: 1,
                }),
                Some(Outcome::Quota) => Err(ProviderError::QuotaExceeded {
                    model: request.model.clone(),
                    message: "RESOURCE_EXHAUSTED".into(),
                }
                .into()),
                Some(Outcome::Fatal) => Err(ProviderError::AuthenticationFailed("bad key".into()).into()),
                Some(Outcome::NotFound) | None => {
                    Err(ProviderError::ModelNotFound(request.model.clone()).into())
                }
            }
        }

        async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut listings = self.listings.lock().unwrap();
            if listings.len() > 1 {
                return listings.pop_front().unwrap();
            }
            match listings.front() {
                Some(Ok(list)) => Ok(list.clone()),
                Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
                None => Ok(vec![]),
            }
        }
    }

    fn policy(configured: &str, fallback: &[&str]) -> FallbackPolicy {
        FallbackPolicy {
            configured_model: configured.to_string(),
            fallback_models: strings(fallback),
            backoff_step: Duration::from_millis(500),
        }
    }

    #[test]
    fn ordering_prefers_configured_then_tiers_then_rest() {
        let discovered = strings(&["x-new", "m2", "m1", "cfg"]);
        let order = order_candidates("cfg", &strings(&["m1", "m2", "m3"]), &discovered);
        assert_eq!(order, strings(&["cfg", "m1", "m2", "x-new"]));
    }

    #[test]
    fn ordering_skips_undiscovered_configured_model() {
        let discovered = strings(&["m2"]);
        let order = order_candidates("cfg", &strings(&["m1", "m2"]), &discovered);
        assert_eq!(order, strings(&["m2"]));
    }

    #[test]
    fn ordering_without_discovery_uses_static_list() {
        let order = order_candidates("models/m2", &strings(&["m1", "m2"]), &[]);
        assert_eq!(order, strings(&["m2", "m1"]));
    }

    #[test]
    fn usable_models_filters_modalities() {
        let mut embed = info("text-embedding-004");
        embed.modality = Modality::Embedding;
        let mut no_gen = info("m-legacy");
        no_gen.supports_generation = false;
        let listing = vec![info("m1"), embed, no_gen, info("m1"), info("m2")];
        assert_eq!(usable_models(&listing), strings(&["m1", "m2"]));
    }

    #[test]
    fn quota_backoff_is_linear() {
        let mut state = FallbackState::new(strings(&["a", "b", "c"]), Duration::from_secs(2));
        assert_eq!(state.next_candidate().as_deref(), Some("a"));
        assert_eq!(
            state.record_failure(FailureKind::Quota, "429"),
            Step::Backoff(Duration::from_secs(2))
        );
        state.next_candidate();
        assert_eq!(
            state.record_failure(FailureKind::Quota, "429"),
            Step::Backoff(Duration::from_secs(4))
        );
        state.next_candidate();
        assert_eq!(
            state.record_failure(FailureKind::Quota, "429"),
            Step::Backoff(Duration::ZERO)
        );
        assert_eq!(state.next_candidate(), None);
        assert_eq!(state.quota_failures(), 3);
    }

    #[test]
    fn refresh_never_repeats_attempted_models() {
        let mut state = FallbackState::new(strings(&["a", "b"]), Duration::ZERO);
        state.next_candidate();
        assert_eq!(state.record_failure(FailureKind::ModelNotFound, "404"), Step::Refresh);
        state.replace_candidates(strings(&["a", "c"]));
        assert_eq!(state.next_candidate().as_deref(), Some("c"));
        assert_eq!(state.next_candidate(), None);
        assert_eq!(state.attempted(), strings(&["a", "c"]).as_slice());
    }

    #[test]
    fn fatal_aborts() {
        let mut state = FallbackState::new(strings(&["a", "b"]), Duration::ZERO);
        state.next_candidate();
        assert_eq!(state.record_failure(FailureKind::Fatal, "boom"), Step::Abort);
    }

    #[test]
    fn stale_discovery_is_not_published() {
        let cache = DiscoveryCache::new();
        let epoch = cache.epoch();
        cache.invalidate();
        assert!(!cache.publish(epoch, Arc::new(strings(&["m1"]))));
        assert!(cache.cached().is_none());
        assert!(cache.publish(cache.epoch(), Arc::new(strings(&["m2"]))));
        assert_eq!(cache.cached().unwrap().as_slice(), strings(&["m2"]).as_slice());
    }

    #[tokio::test]
    async fn discovery_is_cached() {
        let backend = Arc::new(Scripted::new(vec![Ok(vec![info("m1")])]).script("m1", vec![Outcome::Ok("a"), Outcome::Ok("b")]));
        let resolver = ModelResolver::new(backend.clone(), policy("m1", &[]));
        resolver.generate("p", &[]).await.unwrap();
        resolver.generate("p", &[]).await.unwrap();
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_falls_through_with_backoff() {
        let backend = Arc::new(
            Scripted::new(vec![Ok(vec![info("m1"), info("m2")])])
                .script("m1", vec![Outcome::Quota])
                .script("m2", vec![Outcome::Ok("paper")]),
        );
        let resolver = ModelResolver::new(backend.clone(), policy("m1", &["m2"]));
        let started = tokio::time::Instant::now();
        let response = resolver.generate("p", &[]).await.unwrap();
        assert_eq!(response.text, "paper");
        assert_eq!(response.model, "m2");
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(backend.calls(), strings(&["m1", "m2"]));

        let info = resolver.runtime_info();
        assert_eq!(info.last_model_used.as_deref(), Some("m2"));
        assert_eq!(info.last_credential, Some(2));
        assert_eq!(info.credentials_configured, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_chain_tries_every_model_in_order() {
        let backend = Arc::new(
            Scripted::new(vec![Ok(vec![info("m1"), info("m2"), info("m3"), info("m4")])])
                .script("m1", vec![Outcome::Quota])
                .script("m2", vec![Outcome::Quota])
                .script("m3", vec![Outcome::Quota])
                .script("m4", vec![Outcome::Ok("paper")]),
        );
        let resolver = ModelResolver::new(backend.clone(), policy("m1", &["m2", "m3", "m4"]));
        let started = tokio::time::Instant::now();
        let response = resolver.generate("p", &[]).await.unwrap();

        assert_eq!(response.model, "m4");
        assert_eq!(backend.calls(), strings(&["m1", "m2", "m3", "m4"]));
        // 500ms x (1 + 2 + 3); doubling would reach 3500ms.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn not_found_refreshes_discovery() {
        let backend = Arc::new(
            Scripted::new(vec![
                Ok(vec![info("old"), info("m2")]),
                Ok(vec![info("new"), info("m2")]),
            ])
            .script("old", vec![Outcome::NotFound])
            .script("new", vec![Outcome::Ok("fresh")]),
        );
        let resolver = ModelResolver::new(backend.clone(), policy("old", &[]));
        let response = resolver.generate("p", &[]).await.unwrap();
        assert_eq!(response.text, "fresh");
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.calls(), strings(&["old", "new"]));
    }

    #[tokio::test]
    async fn fatal_error_is_surfaced_immediately() {
        let backend = Arc::new(
            Scripted::new(vec![Ok(vec![info("m1"), info("m2")])])
                .script("m1", vec![Outcome::Fatal])
                .script("m2", vec![Outcome::Ok("unused")]),
        );
        let resolver = ModelResolver::new(backend.clone(), policy("m1", &["m2"]));
        let err = resolver.generate("p", &[]).await.unwrap_err();
        assert!(matches!(err, ExamError::Generation { ref model, .. } if model == "m1"));
        assert_eq!(backend.calls(), strings(&["m1"]));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempted_models() {
        let backend = Arc::new(
            Scripted::new(vec![Err(anyhow::anyhow!("listing unavailable"))])
                .script("m1", vec![Outcome::Quota])
                .script("m2", vec![Outcome::Quota]),
        );
        let resolver = ModelResolver::new(backend.clone(), policy("m1", &["m2"]));
        let err = resolver.generate("p", &[]).await.unwrap_err();
        match err {
            ExamError::ModelsExhausted { attempted, last_error } => {
                assert_eq!(attempted, strings(&["m1", "m2"]));
                assert!(last_error.contains("quota"), "got: {last_error}");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(resolver.runtime_info().last_model_used.is_none());
    }

    struct Gated {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl GenerationBackend for Gated {
        fn name(&self) -> &str {
            "gated"
        }

        async fn generate(&self, _: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            anyhow::bail!("not used")
        }

        async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(vec![info("stale")])
        }
    }

    #[tokio::test]
    async fn invalidation_during_discovery_discards_result() {
        let cache = Arc::new(DiscoveryCache::new());
        let backend = Arc::new(Gated {
            started: Notify::new(),
            release: Notify::new(),
        });

        let task = {
            let cache = Arc::clone(&cache);
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { cache.resolve(backend.as_ref()).await })
        };

        backend.started.notified().await;
        cache.invalidate();
        backend.release.notify_one();

        let returned = task.await.unwrap().unwrap();
        assert_eq!(returned.as_slice(), strings(&["stale"]).as_slice());
        assert!(cache.cached().is_none());
    }

    /// First listing blocks until released and returns a model the later
    /// listings no longer carry.
    #[derive(Default)]
    struct Racing {
        list_calls: AtomicU32,
        first_listing_started: Notify,
        release_first_listing: Notify,
    }

    #[async_trait]
    impl GenerationBackend for Racing {
        fn name(&self) -> &str {
            "racing"
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            match request.model.as_str() {
                "new" | "legacy" => Ok(GenerateResponse {
                    text: request.prompt.clone(),
                    model: request.model.clone(),
                    credential_index: None,
                    latency_ms: 1,
                }),
                other => Err(ProviderError::ModelNotFound(other.to_string()).into()),
            }
        }

        async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
            match self.list_calls.fetch_add(1, Ordering::SeqCst) {
                0 => {
                    self.first_listing_started.notify_one();
                    self.release_first_listing.notified().await;
                    Ok(vec![info("legacy")])
                }
                1 => Ok(vec![info("old"), info("new")]),
                _ => Ok(vec![info("new")]),
            }
        }
    }

    #[tokio::test]
    async fn concurrent_generate_keeps_refreshed_discovery() {
        let backend = Arc::new(Racing::default());
        let resolver = Arc::new(ModelResolver::new(backend.clone(), policy("old", &[])));

        let slow = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.generate("slow", &[]).await })
        };
        backend.first_listing_started.notified().await;

        // Hits "old", invalidates and re-resolves while the other call is
        // still inside discovery.
        let fast = resolver.generate("fast", &[]).await.unwrap();
        assert_eq!(fast.model, "new");
        assert_eq!(
            resolver.cache().cached().unwrap().as_slice(),
            strings(&["new"]).as_slice()
        );

        backend.release_first_listing.notify_one();
        let slow = slow.await.unwrap().unwrap();
        // The slow call still uses its own listing...
        assert_eq!(slow.model, "legacy");
        assert_eq!(slow.text, "slow");
        // ...but never publishes it over the refreshed one.
        assert_eq!(
            resolver.cache().cached().unwrap().as_slice(),
            strings(&["new"]).as_slice()
        );
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 3);
    }
}
