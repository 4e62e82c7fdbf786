/// LLM-backed scoring oracle with provider fallback.
///
/// Providers are tried in configured order (primary, then secondary). The first
/// reply that validates wins; when every provider fails the oracle reports
/// `Unavailable` and the session falls back to heuristic scoring.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::chat::Turn;
use crate::models::vacancy::VacancySnapshot;
use crate::oracle::parser::parse_verdict;
use crate::oracle::prompts::{build_evaluation_prompt, SCREENING_SYSTEM};
use crate::oracle::{OracleOutcome, OracleVerdict, ScoringOracle};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Gemini models tried in order until one returns a usable reply.
pub const GEMINI_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-1.5-flash", "gemini-1.5-pro"];
const MAX_RETRIES: u32 = 2;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Provider returned empty content")]
    EmptyContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    OpenRouter { api_key: String, model: String },
    Gemini { api_key: String, models: Vec<String> },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter { .. } => "openrouter",
            Provider::Gemini { .. } => "gemini",
        }
    }
}

// ── OpenRouter (OpenAI-compatible) wire shapes ──────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// ── Gemini generateContent wire shapes ──────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

/// The production oracle. The HTTP client is built lazily on first use and
/// reused for the lifetime of the oracle.
pub struct LlmOracle {
    providers: Vec<Provider>,
    timeout: Duration,
    openrouter_url: String,
    gemini_base_url: String,
    http: OnceCell<Client>,
}

impl LlmOracle {
    pub fn new(providers: Vec<Provider>, timeout: Duration) -> Self {
        Self {
            providers,
            timeout,
            openrouter_url: OPENROUTER_API_URL.to_string(),
            gemini_base_url: GEMINI_API_BASE.to_string(),
            http: OnceCell::new(),
        }
    }

    /// Points both providers at another host (a local stand-in server).
    #[cfg(test)]
    pub fn with_endpoints(mut self, openrouter_url: String, gemini_base_url: String) -> Self {
        self.openrouter_url = openrouter_url;
        self.gemini_base_url = gemini_base_url;
        self
    }

    /// Orders providers by `LLM_PROVIDER`; a provider without a key is left out.
    pub fn from_config(config: &Config) -> Self {
        let openrouter = config
            .openrouter_api_key
            .clone()
            .map(|api_key| Provider::OpenRouter {
                api_key,
                model: config.llm_model.clone(),
            });
        let gemini = config.gemini_api_key.clone().map(|api_key| Provider::Gemini {
            api_key,
            models: GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
        });

        let ordered = if config.llm_provider == "openrouter" {
            [openrouter, gemini]
        } else {
            [gemini, openrouter]
        };

        Self::new(
            ordered.into_iter().flatten().collect(),
            Duration::from_secs(config.oracle_timeout_secs),
        )
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(Provider::name).collect()
    }

    async fn http(&self) -> Result<&Client, OracleError> {
        self.http
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(OracleError::Http)
            })
            .await
    }

    /// One provider, one verdict or `None`. Failures are logged, never raised.
    async fn ask(&self, provider: &Provider, prompt: &str) -> Option<OracleVerdict> {
        match provider {
            Provider::OpenRouter { api_key, model } => {
                match self.ask_openrouter(api_key, model, prompt).await {
                    Ok(text) => parse_logged(provider.name(), model, &text),
                    Err(e) => {
                        warn!(provider = "openrouter", model = %model, "Oracle call failed: {e}");
                        None
                    }
                }
            }
            Provider::Gemini { api_key, models } => {
                for model in models {
                    info!(provider = "gemini", model = %model, "Trying Gemini model");
                    match self.ask_gemini(api_key, model, prompt).await {
                        Ok(text) => {
                            if let Some(verdict) = parse_logged(provider.name(), model, &text) {
                                return Some(verdict);
                            }
                        }
                        Err(e) => {
                            warn!(provider = "gemini", model = %model, "Oracle call failed: {e}")
                        }
                    }
                }
                None
            }
        }
    }

    async fn ask_openrouter(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, OracleError> {
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SCREENING_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let raw = self
            .post_with_retry(|client| {
                client
                    .post(&self.openrouter_url)
                    .bearer_auth(api_key)
                    .json(&body)
            })
            .await?;

        let response: ChatResponse =
            serde_json::from_value(raw).map_err(|_| OracleError::EmptyContent)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(OracleError::EmptyContent)
    }

    async fn ask_gemini(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, OracleError> {
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: SCREENING_SYSTEM,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.6,
                top_p: 0.9,
            },
        };
        let url = format!(
            "{}/models/{}:generateContent",
            self.gemini_base_url,
            model.rsplit('/').next().unwrap_or(model)
        );

        let raw = self
            .post_with_retry(|client| {
                client
                    .post(&url)
                    .header("x-goog-api-key", api_key)
                    .json(&body)
            })
            .await?;

        let response: GeminiResponse =
            serde_json::from_value(raw).map_err(|_| OracleError::EmptyContent)?;
        gemini_text(response).ok_or(OracleError::EmptyContent)
    }

    /// Sends a request, retrying on 429 and 5xx with exponential backoff.
    async fn post_with_retry<F>(&self, build: F) -> Result<Value, OracleError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let client = self.http().await?;
        let mut last_error: Option<OracleError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, ...
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Oracle call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build(client).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(OracleError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Oracle provider returned {}: {}", status, body);
                last_error = Some(OracleError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(OracleError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response.json::<Value>().await?);
        }

        Err(last_error.unwrap_or(OracleError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl ScoringOracle for LlmOracle {
    async fn evaluate(
        &self,
        resume: &str,
        vacancy: &VacancySnapshot,
        context: &[Turn],
    ) -> OracleOutcome {
        if self.providers.is_empty() {
            debug!("No oracle provider configured; reporting unavailable");
            return OracleOutcome::Unavailable;
        }

        let prompt = build_evaluation_prompt(resume, vacancy, context);
        for (idx, provider) in self.providers.iter().enumerate() {
            if idx > 0 {
                info!(provider = provider.name(), "Falling back to secondary oracle provider");
            }
            if let Some(verdict) = self.ask(provider, &prompt).await {
                return OracleOutcome::Verdict(verdict);
            }
        }

        warn!("All oracle providers failed or returned unusable output");
        OracleOutcome::Unavailable
    }
}

fn parse_logged(provider: &str, model: &str, text: &str) -> Option<OracleVerdict> {
    let verdict = parse_verdict(text);
    if verdict.is_none() {
        warn!(provider, model, "Oracle returned non-JSON or invalid JSON");
    }
    verdict
}

/// Concatenated text parts of the first candidate.
fn gemini_text(response: GeminiResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::scoring::Mismatch;

    const VERDICT_JSON: &str = r#"{"score": 72, "mismatches": ["city"], "summary": "Lives in Astana", "question": "Would you relocate to Almaty?"}"#;

    /// Canned replies per provider; an empty queue answers 500.
    #[derive(Default)]
    struct Script {
        openrouter: Mutex<VecDeque<(StatusCode, Value)>>,
        gemini: Mutex<VecDeque<(StatusCode, Value)>>,
        openrouter_hits: AtomicUsize,
        gemini_hits: AtomicUsize,
    }

    impl Script {
        fn new(
            openrouter: Vec<(StatusCode, Value)>,
            gemini: Vec<(StatusCode, Value)>,
        ) -> Arc<Self> {
            Arc::new(Self {
                openrouter: Mutex::new(openrouter.into()),
                gemini: Mutex::new(gemini.into()),
                ..Default::default()
            })
        }
    }

    fn next_reply(queue: &Mutex<VecDeque<(StatusCode, Value)>>) -> (StatusCode, Json<Value>) {
        let (status, body) = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "down"})));
        (status, Json(body))
    }

    async fn openrouter_reply(State(script): State<Arc<Script>>) -> (StatusCode, Json<Value>) {
        script.openrouter_hits.fetch_add(1, Ordering::SeqCst);
        next_reply(&script.openrouter)
    }

    async fn gemini_reply(State(script): State<Arc<Script>>) -> (StatusCode, Json<Value>) {
        script.gemini_hits.fetch_add(1, Ordering::SeqCst);
        next_reply(&script.gemini)
    }

    fn openrouter_body(content: &str) -> (StatusCode, Value) {
        (
            StatusCode::OK,
            json!({"choices": [{"message": {"content": content}}]}),
        )
    }

    fn gemini_body(text: &str) -> (StatusCode, Value) {
        (
            StatusCode::OK,
            json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}),
        )
    }

    /// Serves the script on an ephemeral port and returns an oracle aimed at it.
    async fn oracle_against(script: Arc<Script>, providers: Vec<Provider>) -> LlmOracle {
        let app = Router::new()
            .route("/chat/completions", post(openrouter_reply))
            .route("/models/:call", post(gemini_reply))
            .with_state(script);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        LlmOracle::new(providers, Duration::from_secs(5))
            .with_endpoints(format!("{base}/chat/completions"), base)
    }

    fn both_providers() -> Vec<Provider> {
        vec![
            Provider::OpenRouter {
                api_key: "or-key".to_string(),
                model: "deepseek/deepseek-v3".to_string(),
            },
            Provider::Gemini {
                api_key: "g-key".to_string(),
                models: vec!["gemini-test".to_string()],
            },
        ]
    }

    async fn evaluate(oracle: &LlmOracle) -> OracleOutcome {
        oracle.evaluate("cv", &VacancySnapshot::default(), &[]).await
    }

    #[tokio::test]
    async fn test_secondary_provider_answers_when_primary_fails() {
        let fenced = format!("```json\n{VERDICT_JSON}\n```");
        let script = Script::new(vec![], vec![gemini_body(&fenced)]);
        let oracle = oracle_against(script.clone(), both_providers()).await;

        let OracleOutcome::Verdict(verdict) = evaluate(&oracle).await else {
            panic!("expected a verdict from the secondary provider");
        };
        assert_eq!(verdict.score, 72);
        assert_eq!(verdict.mismatches, vec![Mismatch::City]);
        assert_eq!(verdict.question.as_deref(), Some("Would you relocate to Almaty?"));
        // 500 is retried once before moving on
        assert_eq!(script.openrouter_hits.load(Ordering::SeqCst), 2);
        assert_eq!(script.gemini_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_unavailable() {
        let script = Script::new(
            vec![(StatusCode::UNAUTHORIZED, json!({"error": "bad key"}))],
            vec![gemini_body("Sorry, I cannot evaluate this candidate.")],
        );
        let oracle = oracle_against(script.clone(), both_providers()).await;

        assert_eq!(evaluate(&oracle).await, OracleOutcome::Unavailable);
        // 401 is not retried
        assert_eq!(script.openrouter_hits.load(Ordering::SeqCst), 1);
        assert_eq!(script.gemini_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let with_prose = format!("{VERDICT_JSON}\nLet me know if you need anything else.");
        let script = Script::new(
            vec![
                (StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"})),
                openrouter_body(&with_prose),
            ],
            vec![],
        );
        let providers = both_providers().into_iter().take(1).collect();
        let oracle = oracle_against(script.clone(), providers).await;

        let OracleOutcome::Verdict(verdict) = evaluate(&oracle).await else {
            panic!("expected a verdict after the retry");
        };
        assert_eq!(verdict.summary, "Lives in Astana");
        assert_eq!(script.openrouter_hits.load(Ordering::SeqCst), 2);
        assert_eq!(script.gemini_hits.load(Ordering::SeqCst), 0);
    }

    fn config(provider: &str, gemini: Option<&str>, openrouter: Option<&str>) -> Config {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            jwt_secret: "secret".to_string(),
            llm_provider: provider.to_string(),
            llm_model: "deepseek/deepseek-v3".to_string(),
            gemini_api_key: gemini.map(str::to_string),
            openrouter_api_key: openrouter.map(str::to_string),
            oracle_timeout_secs: 30,
            cors_origins: vec![],
            port: 8080,
            rust_log: "info".to_string(),
        }
    }

    #[test]
    fn test_openrouter_primary_gemini_secondary() {
        let oracle = LlmOracle::from_config(&config("openrouter", Some("g"), Some("o")));
        assert_eq!(oracle.provider_names(), vec!["openrouter", "gemini"]);
    }

    #[test]
    fn test_gemini_primary_by_default() {
        let oracle = LlmOracle::from_config(&config("gemini", Some("g"), Some("o")));
        assert_eq!(oracle.provider_names(), vec!["gemini", "openrouter"]);
    }

    #[test]
    fn test_provider_without_key_is_skipped() {
        let oracle = LlmOracle::from_config(&config("openrouter", Some("g"), None));
        assert_eq!(oracle.provider_names(), vec!["gemini"]);
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let oracle = LlmOracle::new(vec![], Duration::from_secs(1));
        let outcome = oracle
            .evaluate("cv", &VacancySnapshot::default(), &[])
            .await;
        assert_eq!(outcome, OracleOutcome::Unavailable);
    }

    #[test]
    fn test_gemini_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"score\":"}, {"text": " 61}"}]}}]
        }))
        .unwrap();
        assert_eq!(gemini_text(response).as_deref(), Some("{\"score\": 61}"));
    }

    #[test]
    fn test_gemini_text_empty_candidates() {
        let response: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(gemini_text(response).is_none());
    }

    #[test]
    fn test_gemini_request_shape() {
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: "sys" }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: "hi" }],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.6,
                top_p: 0.9,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
    }
}
