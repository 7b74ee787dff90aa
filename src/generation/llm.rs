use crate::config::WatsonxSettings;
use crate::errors::RagError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TEXT_GENERATION_VERSION: &str = "2023-05-29";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
/// Refresh tokens this long before the IAM expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub repetition_penalty: f32,
    /// Answers longer than this many words are cut and end with `...`.
    pub word_limit: Option<usize>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 200,
            temperature: 0.5,
            repetition_penalty: 1.05,
            word_limit: Some(150),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GenerationResult {
    #[serde(default)]
    pub generated_text: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GenerationPayload {
    #[serde(default)]
    pub results: Vec<GenerationResult>,
}

impl GenerationPayload {
    fn first_text(&self) -> String {
        self.results
            .first()
            .map(|r| r.generated_text.trim().to_string())
            .unwrap_or_default()
    }
}

/// A response object that hands out its payload through an accessor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GenerationEnvelope {
    result: GenerationPayload,
}

impl GenerationEnvelope {
    pub fn get_result(&self) -> &GenerationPayload {
        &self.result
    }
}

/// The shapes a text generation provider may answer with, in match priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    MapWithResults(GenerationPayload),
    AccessorObject(GenerationEnvelope),
    RawString(String),
}

impl ProviderResponse {
    pub fn from_json(value: Value) -> Self {
        if value.get("results").is_some_and(Value::is_array) {
            if let Ok(payload) = serde_json::from_value::<GenerationPayload>(value.clone()) {
                return ProviderResponse::MapWithResults(payload);
            }
        }
        if value
            .get("result")
            .and_then(|r| r.get("results"))
            .is_some_and(Value::is_array)
        {
            if let Ok(envelope) = serde_json::from_value::<GenerationEnvelope>(value.clone()) {
                return ProviderResponse::AccessorObject(envelope);
            }
        }
        match value {
            Value::String(text) => ProviderResponse::RawString(text),
            other => ProviderResponse::RawString(other.to_string()),
        }
    }

    /// Generated text of the first result.
    pub fn text(&self) -> String {
        match self {
            ProviderResponse::MapWithResults(payload) => payload.first_text(),
            ProviderResponse::AccessorObject(envelope) => envelope.get_result().first_text(),
            ProviderResponse::RawString(text) => text.clone(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<ProviderResponse>;
}

#[derive(Serialize)]
struct TextGenerationRequest<'a> {
    input: &'a str,
    model_id: &'a str,
    project_id: &'a str,
    parameters: TextGenerationParameters,
}

#[derive(Serialize)]
struct TextGenerationParameters {
    decoding_method: &'static str,
    max_new_tokens: u32,
    temperature: f32,
    repetition_penalty: f32,
}

#[derive(Deserialize)]
struct IamToken {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// IBM watsonx.ai text generation client.
pub struct WatsonxClient {
    client: reqwest::Client,
    settings: WatsonxSettings,
    token: Mutex<Option<CachedToken>>,
}

impl WatsonxClient {
    pub fn new(settings: WatsonxSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build watsonx HTTP client")?;
        Ok(Self {
            client,
            settings,
            token: Mutex::new(None),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/identity/token", self.settings.iam_url.trim_end_matches('/'));
        let token: IamToken = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", self.settings.api_key.as_str())])
            .send()
            .await
            .context("IAM token request failed")?
            .error_for_status()
            .context("IAM token request rejected")?
            .json()
            .await
            .context("Failed to parse IAM token response")?;

        tracing::debug!("Obtained IAM token valid for {}s", token.expires_in);
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }
}

#[async_trait]
impl LlmClient for WatsonxClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<ProviderResponse> {
        let token = self.bearer_token().await?;
        let url = format!("{}/ml/v1/text/generation", self.settings.url);
        let request = TextGenerationRequest {
            input: prompt,
            model_id: &self.settings.model_id,
            project_id: &self.settings.project_id,
            parameters: TextGenerationParameters {
                decoding_method: "sample",
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                repetition_penalty: params.repetition_penalty,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("version", TEXT_GENERATION_VERSION)])
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("Text generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Provider(format!("text generation returned {}: {}", status, body)).into());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse text generation response")?;
        Ok(ProviderResponse::from_json(body))
    }
}
