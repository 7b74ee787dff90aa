use crate::defaults::*;
use crate::generation::GenerationParams;
use crate::index::IndexBackend;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedProvider {
    Ollama,
    Local,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbedProvider,
    pub url: String,
    pub model: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

/// Credentials for the hosted LLM. Present only when all three are set.
#[derive(Debug, Clone)]
pub struct WatsonxSettings {
    pub api_key: String,
    pub url: String,
    pub project_id: String,
    pub model_id: String,
    pub iam_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub index_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub index_backend: IndexBackend,
    pub embedding: EmbeddingSettings,
    pub watsonx: Option<WatsonxSettings>,
    pub generation: GenerationParams,
    pub fallback_sentences: usize,
    pub top_k: usize,
    pub languages: Vec<String>,
    pub domain_gate: bool,
    pub translate_url: String,
    pub translate_timeout: Duration,
    pub stats_url: String,
    pub stats_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let watsonx = match (get("WATSONX_API_KEY"), get("WATSONX_URL"), get("WATSONX_PROJECT_ID")) {
            (Some(api_key), Some(url), Some(project_id)) => Some(WatsonxSettings {
                api_key,
                url: url.trim_end_matches('/').to_string(),
                project_id,
                model_id: string_or("WATSONX_MODEL_ID", DEFAULT_LLM_MODEL),
                iam_url: string_or("WATSONX_IAM_URL", "https://iam.cloud.ibm.com"),
                timeout: Duration::from_secs(parse_or(get("WATSONX_TIMEOUT_SECS"), "WATSONX_TIMEOUT_SECS", 60)),
            }),
            _ => None,
        };

        let provider = match get("HEALTHBOT_EMBED_PROVIDER").as_deref() {
            Some("local") | Some("fastembed") => EmbedProvider::Local,
            Some("ollama") | None => EmbedProvider::Ollama,
            Some(other) => {
                tracing::warn!("Unknown embedding provider '{}', using ollama", other);
                EmbedProvider::Ollama
            }
        };

        let index_backend = match get("HEALTHBOT_INDEX_BACKEND") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                let fallback = IndexBackend::preferred();
                tracing::warn!("Unknown index backend '{}', using {}", value, fallback);
                fallback
            }),
            None => IndexBackend::preferred(),
        };

        let port = get("HEALTHBOT_PORT").or_else(|| get("FLASK_PORT"));

        let word_limit: usize = parse_or(get("HEALTHBOT_WORD_LIMIT"), "HEALTHBOT_WORD_LIMIT", 150);
        let generation = GenerationParams {
            max_new_tokens: parse_or(get("HEALTHBOT_MAX_NEW_TOKENS"), "HEALTHBOT_MAX_NEW_TOKENS", 200),
            temperature: parse_or(get("HEALTHBOT_TEMPERATURE"), "HEALTHBOT_TEMPERATURE", 0.5),
            repetition_penalty: parse_or(
                get("HEALTHBOT_REPETITION_PENALTY"),
                "HEALTHBOT_REPETITION_PENALTY",
                1.05,
            ),
            word_limit: (word_limit > 0).then_some(word_limit),
        };

        let languages = parse_languages(get("HEALTHBOT_LANGUAGES").as_deref());

        Self {
            port: parse_or(port, "HEALTHBOT_PORT", DEFAULT_PORT),
            index_dir: PathBuf::from(string_or("HEALTHBOT_INDEX_DIR", DEFAULT_INDEX_DIR)),
            docs_dir: PathBuf::from(string_or("HEALTHBOT_DOCS_DIR", DEFAULT_DOCS_DIR)),
            index_backend,
            embedding: EmbeddingSettings {
                provider,
                url: string_or("OLLAMA_URL", "http://localhost:11434")
                    .trim_end_matches('/')
                    .to_string(),
                model: string_or("HEALTHBOT_EMBED_MODEL", DEFAULT_EMBED_MODEL),
                batch_size: parse_or(get("HEALTHBOT_EMBED_BATCH"), "HEALTHBOT_EMBED_BATCH", DEFAULT_EMBED_BATCH)
                    .max(1),
                timeout: Duration::from_secs(30),
            },
            watsonx,
            generation,
            fallback_sentences: parse_or(
                get("HEALTHBOT_FALLBACK_SENTENCES"),
                "HEALTHBOT_FALLBACK_SENTENCES",
                3,
            ),
            top_k: parse_or(get("HEALTHBOT_TOP_K"), "HEALTHBOT_TOP_K", DEFAULT_TOP_K),
            languages,
            domain_gate: parse_or(get("HEALTHBOT_DOMAIN_GATE"), "HEALTHBOT_DOMAIN_GATE", true),
            translate_url: string_or("TRANSLATE_URL", "https://translate.googleapis.com")
                .trim_end_matches('/')
                .to_string(),
            translate_timeout: Duration::from_secs(10),
            stats_url: string_or("STATS_URL", "https://disease.sh")
                .trim_end_matches('/')
                .to_string(),
            stats_timeout: Duration::from_secs(10),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable value '{}' for {}", raw, key);
            default
        }),
        None => default,
    }
}

/// Parse a comma separated allow-list. English is always included.
pub fn parse_languages(raw: Option<&str>) -> Vec<String> {
    let codes: Vec<String> = match raw {
        Some(list) => list
            .split(',')
            .map(|code| code.trim().to_lowercase())
            .filter(|code| !code.is_empty())
            .collect(),
        None => DEFAULT_LANGUAGES.iter().map(|code| code.to_string()).collect(),
    };

    let mut languages = vec![WORKING_LANGUAGE.to_string()];
    for code in codes {
        if !languages.contains(&code) {
            languages.push(code);
        }
    }
    languages
}
