//! Language detection and translation.
//!
//! Translation providers are unreliable network services. [`LanguageRouter`]
//! owns the fallbacks: detection falls back to English and translation falls
//! back to the untranslated input.

use crate::defaults::WORKING_LANGUAGE;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Best guess of the language code of `text`.
    async fn detect(&self, text: &str) -> Result<String>;

    async fn translate(&self, text: &str, target: &str) -> Result<String>;
}

/// Google's public web translation endpoint (`client=gtx`).
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build translation HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, text: &str, target: &str) -> Result<Value> {
        let url = format!("{}/translate_a/single", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .context("Translation request failed")?
            .error_for_status()
            .context("Translation service returned an error status")?;
        response
            .json()
            .await
            .context("Failed to parse translation response")
    }
}

/// Concatenate the translated segments of a gtx response.
fn translated_text(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

fn detected_language(body: &Value) -> Option<String> {
    body.get(2)
        .and_then(Value::as_str)
        .map(|code| code.to_lowercase())
        .filter(|code| !code.is_empty())
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn detect(&self, text: &str) -> Result<String> {
        let body = self.call(text, WORKING_LANGUAGE).await?;
        detected_language(&body).ok_or_else(|| anyhow::anyhow!("No language in detection response"))
    }

    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        let body = self.call(text, target).await?;
        translated_text(&body).ok_or_else(|| anyhow::anyhow!("No text in translation response"))
    }
}

/// Map a language name or code onto a bare lowercase code.
fn canonical_code(requested: &str) -> String {
    let lowered = requested.trim().to_lowercase();
    match lowered.as_str() {
        "english" => "en".to_string(),
        "hindi" => "hi".to_string(),
        "kannada" => "kn".to_string(),
        "telugu" => "te".to_string(),
        "tamil" => "ta".to_string(),
        other => other
            .split(|c| c == '-' || c == '_')
            .next()
            .unwrap_or(other)
            .to_string(),
    }
}

pub struct LanguageRouter {
    translator: Arc<dyn Translator>,
    allowed: Vec<String>,
}

impl LanguageRouter {
    pub fn new(translator: Arc<dyn Translator>, allowed: Vec<String>) -> Self {
        Self { translator, allowed }
    }

    pub fn is_allowed(&self, code: &str) -> bool {
        self.allowed.iter().any(|c| c == code)
    }

    /// Detected language of `text`, `"en"` whenever detection fails.
    pub async fn detect(&self, text: &str) -> String {
        match self.translator.detect(text).await {
            Ok(code) if !code.trim().is_empty() => canonical_code(&code),
            Ok(_) => WORKING_LANGUAGE.to_string(),
            Err(e) => {
                tracing::warn!("Language detection failed, assuming English: {:#}", e);
                WORKING_LANGUAGE.to_string()
            }
        }
    }

    /// `text` translated into `target`, or `text` itself whenever translation fails.
    pub async fn translate(&self, text: &str, target: &str) -> String {
        match self.translator.translate(text, target).await {
            Ok(translated) => translated,
            Err(e) => {
                tracing::warn!("Translation to '{}' failed, returning original: {:#}", target, e);
                text.to_string()
            }
        }
    }

    /// Resolve the reply language for a request.
    ///
    /// `"auto"` (or nothing) detects from `text`; names such as `"Hindi"` are
    /// accepted; anything outside the allow-list becomes English.
    pub async fn resolve_target(&self, requested: Option<&str>, text: &str) -> String {
        let requested = requested.map(str::trim).filter(|r| !r.is_empty());
        let code = match requested {
            Some(r) if !r.eq_ignore_ascii_case("auto") => canonical_code(r),
            _ => self.detect(text).await,
        };

        if self.is_allowed(&code) {
            code
        } else {
            tracing::debug!("Language '{}' not supported, replying in English", code);
            WORKING_LANGUAGE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedTranslator {
        detected: &'static str,
    }

    #[async_trait]
    impl Translator for FixedTranslator {
        async fn detect(&self, _text: &str) -> Result<String> {
            Ok(self.detected.to_string())
        }

        async fn translate(&self, text: &str, target: &str) -> Result<String> {
            Ok(format!("[{}] {}", target, text))
        }
    }

    struct BrokenTranslator;

    #[async_trait]
    impl Translator for BrokenTranslator {
        async fn detect(&self, _text: &str) -> Result<String> {
            Err(anyhow::anyhow!("network down"))
        }

        async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
            Err(anyhow::anyhow!("network down"))
        }
    }

    fn router(translator: impl Translator + 'static) -> LanguageRouter {
        LanguageRouter::new(
            Arc::new(translator),
            vec!["en".to_string(), "hi".to_string(), "kn".to_string()],
        )
    }

    #[tokio::test]
    async fn test_translate_failure_returns_input() {
        let router = router(BrokenTranslator);
        for input in ["डेंगू के लक्षण क्या हैं?", "", "fever"] {
            assert_eq!(router.translate(input, "en").await, input);
        }
    }

    #[tokio::test]
    async fn test_detect_failure_is_english() {
        assert_eq!(router(BrokenTranslator).detect("ಡೇಂಗ್ಯೂ").await, "en");
    }

    #[tokio::test]
    async fn test_resolve_target() {
        let hindi = router(FixedTranslator { detected: "hi" });
        assert_eq!(hindi.resolve_target(Some("auto"), "x").await, "hi");
        assert_eq!(hindi.resolve_target(None, "x").await, "hi");
        assert_eq!(hindi.resolve_target(Some("Kannada"), "x").await, "kn");
        assert_eq!(hindi.resolve_target(Some("Auto"), "x").await, "hi");
        assert_eq!(hindi.resolve_target(Some("en-US"), "x").await, "en");
        assert_eq!(hindi.resolve_target(Some("fr"), "x").await, "en");
        assert_eq!(hindi.resolve_target(Some("Telugu"), "x").await, "en");

        let french = router(FixedTranslator { detected: "fr" });
        assert_eq!(french.resolve_target(Some("auto"), "bonjour").await, "en");
    }

    #[tokio::test]
    async fn test_google_translate_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_a/single"))
            .and(query_param("tl", "hi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                [["बुखार में ", "In fever ", null, null, 10], ["आराम करें।", "rest.", null, null, 10]],
                null,
                "en"
            ])))
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let text = translator.translate("In fever rest.", "hi").await.unwrap();
        assert_eq!(text, "बुखार में आराम करें।");
    }

    #[tokio::test]
    async fn test_google_detect_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_a/single"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                [["What are dengue symptoms?", "डेंगू के लक्षण क्या हैं?", null, null, 10]],
                null,
                "hi"
            ])))
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(translator.detect("डेंगू के लक्षण क्या हैं?").await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_router_over_failing_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let router = router(translator);
        assert_eq!(router.translate("Drink ORS.", "kn").await, "Drink ORS.");
        assert_eq!(router.detect("Drink ORS.").await, "en");
    }
}
