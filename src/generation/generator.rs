use super::llm::{GenerationParams, LlmClient};
use super::prompt::{CONTEXT_MARKER, QUESTION_MARKER};
use crate::metrics::get_metrics_collector;
use std::sync::Arc;

pub const INCOMPLETE_ANSWER: &str = "Sorry, I couldn't generate a complete answer.";
pub const NO_ANSWER: &str = "Sorry, I couldn't find a specific answer in the knowledge base.";
pub const EMERGENCY_REFERRAL: &str =
    "If symptoms are severe (e.g., difficulty breathing, very high fever), please go to the nearest PHC immediately.";

/// Produces the English answer for a composed prompt.
///
/// Uses the hosted LLM when one is configured and falls back to an extractive
/// summary of the prompt's context whenever the LLM is absent or fails.
pub struct AnswerGenerator {
    llm: Option<Arc<dyn LlmClient>>,
    params: GenerationParams,
    fallback_sentences: usize,
}

impl AnswerGenerator {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, params: GenerationParams, fallback_sentences: usize) -> Self {
        Self {
            llm,
            params,
            fallback_sentences,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn generate(&self, prompt: &str) -> String {
        let Some(llm) = self.llm.as_ref() else {
            return fallback_generate(prompt, self.fallback_sentences);
        };

        let _timer = crate::measure_operation!("generation.llm");
        match llm.generate(prompt, &self.params).await {
            Ok(response) => post_process(&response.text(), self.params.word_limit),
            Err(e) => {
                tracing::warn!("LLM generation failed, using extractive fallback: {:#}", e);
                get_metrics_collector().increment("generation.fallbacks");
                fallback_generate(prompt, self.fallback_sentences)
            }
        }
    }
}

/// Normalise raw model output into a single tidy paragraph.
pub fn post_process(raw: &str, word_limit: Option<usize>) -> String {
    let mut text = raw.replace("\n\n", " ").replace("  ", " ").trim().to_string();
    if text.is_empty() {
        return INCOMPLETE_ANSWER.to_string();
    }

    if let Some(limit) = word_limit {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > limit {
            text = format!("{}...", words[..limit].join(" "));
        }
    }

    if !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }
    text
}

/// Deterministic answer built from the first sentences of the prompt's context.
pub fn fallback_generate(prompt: &str, sentences: usize) -> String {
    let context = prompt
        .split_once(CONTEXT_MARKER)
        .map(|(_, rest)| rest.split(QUESTION_MARKER).next().unwrap_or_default().trim())
        .unwrap_or_default();

    let summary = context
        .split('.')
        .take(sentences)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(". ");

    if summary.is_empty() {
        NO_ANSWER.to_string()
    } else {
        format!("{}. {}", summary, EMERGENCY_REFERRAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::llm::ProviderResponse;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    const DENGUE_PROMPT: &str =
        "Context: The patient has a high fever. Rest and fluids are advised. Question: What should I do?";

    struct CannedLlm(serde_json::Value);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<ProviderResponse> {
            Ok(ProviderResponse::from_json(self.0.clone()))
        }
    }

    struct DownLlm;

    #[async_trait]
    impl LlmClient for DownLlm {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<ProviderResponse> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    fn generator(llm: Option<Arc<dyn LlmClient>>) -> AnswerGenerator {
        AnswerGenerator::new(llm, GenerationParams::default(), 3)
    }

    #[test]
    fn test_fallback_uses_context_sentences() {
        let answer = fallback_generate(DENGUE_PROMPT, 3);
        assert_eq!(
            answer,
            format!(
                "The patient has a high fever. Rest and fluids are advised. {}",
                EMERGENCY_REFERRAL
            )
        );
        assert!(answer.ends_with('.'));
    }

    #[test]
    fn test_fallback_sentence_count() {
        let prompt = "Context: One. Two. Three. Four.\n\nQuestion: q";
        assert!(fallback_generate(prompt, 2).starts_with("One. Two. If symptoms"));
    }

    #[test]
    fn test_fallback_without_context() {
        assert_eq!(fallback_generate("Context: \n\nQuestion: fever?", 3), NO_ANSWER);
        assert_eq!(fallback_generate("no markers at all", 3), NO_ANSWER);
        assert_eq!(fallback_generate("Context: ...\n\nQuestion: x", 3), NO_ANSWER);
    }

    #[test]
    fn test_post_process() {
        assert_eq!(post_process("Rest well\n\nDrink water", None), "Rest well Drink water.");
        assert_eq!(post_process("  Is it serious?  ", None), "Is it serious?");
        assert_eq!(post_process("   ", None), INCOMPLETE_ANSWER);
        assert_eq!(post_process("one two three four", Some(2)), "one two...");
        assert_eq!(post_process("one two", Some(2)), "one two.");
    }

    #[tokio::test]
    async fn test_all_response_shapes_end_in_punctuation() {
        let shapes = [
            json!({"results": [{"generated_text": "Drink ORS"}]}),
            json!({"result": {"results": [{"generated_text": "Use a mosquito net!"}]}}),
            json!("Wash your hands"),
            json!({"results": [{"generated_text": ""}]}),
        ];
        for shape in shapes {
            let answer = generator(Some(Arc::new(CannedLlm(shape)))).generate(DENGUE_PROMPT).await;
            assert!(!answer.is_empty());
            assert!(answer.ends_with(['.', '!', '?']), "{}", answer);
        }
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back() {
        let answer = generator(Some(Arc::new(DownLlm))).generate(DENGUE_PROMPT).await;
        assert!(answer.contains("The patient has a high fever"));
        assert!(answer.ends_with(EMERGENCY_REFERRAL));
    }

    #[tokio::test]
    async fn test_unconfigured_uses_fallback() {
        let generator = generator(None);
        assert!(!generator.is_configured());
        assert!(generator.generate(DENGUE_PROMPT).await.contains(EMERGENCY_REFERRAL));
    }
}
