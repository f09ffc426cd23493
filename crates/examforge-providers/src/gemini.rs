//! Gemini API backend.
//!
//! Calls `generateContent` and the paginated model listing of the Generative
//! Language API. Several API keys may be configured; a key that hits its
//! quota is rotated out for the next one before the failure is reported to
//! the model resolver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use examforge_core::error::ProviderError;
use examforge_core::resolver::normalize_model_id;
use examforge_core::traits::{
    Attachment, GenerateRequest, GenerateResponse, GenerationBackend, Modality, ModelInfo,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const LIST_PAGE_SIZE: u32 = 1000;
/// Upper bound on listing pages, in case the server keeps returning tokens.
const MAX_LIST_PAGES: usize = 20;

/// Gemini backend with API-key rotation.
pub struct GeminiBackend {
    api_keys: Vec<String>,
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
    /// Index of the key to try first.
    preferred_key: AtomicUsize,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_keys", &format_args!("[***; {}]", self.api_keys.len()))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(
        api_keys: Vec<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        let api_keys: Vec<String> = api_keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if api_keys.is_empty() {
            anyhow::bail!("at least one Gemini API key is required");
        }

        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            api_keys,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs,
            client,
            preferred_key: AtomicUsize::new(0),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else {
            // Without the URL: it can carry a page token and is noise in logs.
            ProviderError::NetworkError(e.without_url().to_string())
        }
    }

    async fn generate_with_key(
        &self,
        key_index: usize,
        request: &GenerateRequest,
        body: &GeminiRequest,
    ) -> Result<GeminiResponse, ProviderError> {
        let model = normalize_model_id(&request.model);
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{model}:generateContent",
                self.base_url
            ))
            .header("x-goog-api-key", &self.api_keys[key_index])
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, model));
        }

        response.json().await.map_err(|e| ProviderError::ApiError {
            status: 0,
            message: format!("failed to parse response: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn build_request(request: &GenerateRequest) -> GeminiRequest {
    let mut parts = vec![GeminiPart::Text {
        text: request.prompt.clone(),
    }];
    parts.extend(request.attachments.iter().map(inline_part));
    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts,
        }],
    }
}

fn inline_part(attachment: &Attachment) -> GeminiPart {
    GeminiPart::Inline {
        inline_data: InlineData {
            mime_type: attachment.mime_type.clone(),
            data: BASE64.encode(&attachment.bytes),
        },
    }
}

/// Map an HTTP error response onto a typed provider error.
fn classify_status(status: u16, body: &str, model: &str) -> ProviderError {
    let (message, api_status) = match serde_json::from_str::<GeminiError>(body) {
        Ok(e) => (e.error.message, e.error.status),
        Err(_) => (body.to_string(), String::new()),
    };
    match status {
        429 => ProviderError::QuotaExceeded {
            model: model.to_string(),
            message,
        },
        404 => ProviderError::ModelNotFound(model.to_string()),
        401 | 403 => ProviderError::AuthenticationFailed(message),
        400 if message.contains("API key") => ProviderError::AuthenticationFailed(message),
        _ if api_status == "RESOURCE_EXHAUSTED" => ProviderError::QuotaExceeded {
            model: model.to_string(),
            message,
        },
        _ => ProviderError::ApiError { status, message },
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn credential_count(&self) -> usize {
        self.api_keys.len()
    }

    #[instrument(skip(self, request), fields(model = %request.model, attachments = request.attachments.len()))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();
        let body = build_request(request);
        let keys = self.api_keys.len();
        let first = self.preferred_key.load(Ordering::Relaxed) % keys;

        let mut last_quota = None;
        for offset in 0..keys {
            let key_index = (first + offset) % keys;
            match self.generate_with_key(key_index, request, &body).await {
                Ok(response) => {
                    self.preferred_key.store(key_index, Ordering::Relaxed);
                    let text = response.text();
                    if text.is_empty() {
                        debug!("response carried no text parts");
                    }
                    return Ok(GenerateResponse {
                        text,
                        model: response
                            .model_version
                            .unwrap_or_else(|| normalize_model_id(&request.model).to_string()),
                        credential_index: Some(key_index),
                        latency_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(err @ ProviderError::QuotaExceeded { .. }) => {
                    warn!(credential = key_index + 1, "quota exhausted for credential, rotating");
                    last_quota = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(last_quota
            .unwrap_or_else(|| ProviderError::QuotaExceeded {
                model: request.model.clone(),
                message: "every credential is exhausted".into(),
            })
            .into())
    }

    #[instrument(skip(self))]
    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let key_index = self.preferred_key.load(Ordering::Relaxed) % self.api_keys.len();
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut url = reqwest::Url::parse(&format!("{}/v1beta/models", self.base_url))
                .context("invalid Gemini base URL")?;
            url.query_pairs_mut()
                .append_pair("pageSize", &LIST_PAGE_SIZE.to_string());
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self
                .client
                .get(url)
                .header("x-goog-api-key", &self.api_keys[key_index])
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status().as_u16();
            if status >= 400 {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, &body, "models").into());
            }

            let page: ListModelsResponse =
                response.json().await.map_err(|e| ProviderError::ApiError {
                    status: 0,
                    message: format!("failed to parse model listing: {e}"),
                })?;

            models.extend(page.models.into_iter().map(|m| ModelInfo {
                supports_generation: m
                    .supported_generation_methods
                    .iter()
                    .any(|g| g == "generateContent"),
                modality: Modality::infer(&m.name, &m.display_name),
                id: m.name,
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(models),
            }
        }

        warn!(pages = MAX_LIST_PAGES, "model listing truncated");
        Ok(models)
    }
}
