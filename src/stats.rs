use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const TRIGGER_WORDS: &[&str] = &["covid", "outbreak", "dengue"];

#[derive(Debug, Deserialize)]
struct GlobalTotals {
    #[serde(default)]
    active: Option<serde_json::Value>,
}

/// Best-effort public outbreak figures appended to relevant answers.
#[derive(Debug, Clone)]
pub struct OutbreakStats {
    client: reqwest::Client,
    base_url: String,
}

impl OutbreakStats {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build statistics HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_relevant(query_en: &str) -> bool {
        let lowered = query_en.to_lowercase();
        TRIGGER_WORDS.iter().any(|w| lowered.contains(w))
    }

    /// The note to append for `query_en`, if the query asks about outbreaks
    /// and the statistics service answers.
    pub async fn note_for(&self, query_en: &str) -> Option<String> {
        if !Self::is_relevant(query_en) {
            return None;
        }
        match self.fetch_active().await {
            Ok(active) => Some(format!("Note: Global active COVID cases (approx): {}", active)),
            Err(e) => {
                tracing::debug!("Skipping outbreak note: {:#}", e);
                None
            }
        }
    }

    async fn fetch_active(&self) -> Result<String> {
        let url = format!("{}/v3/covid-19/all", self.base_url);
        let totals: GlobalTotals = self
            .client
            .get(&url)
            .send()
            .await
            .context("Statistics request failed")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse statistics response")?;

        Ok(match totals.active {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => "N/A".to_string(),
            Some(other) => other.to_string(),
        })
    }
}
