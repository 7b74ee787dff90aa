//! Per-request chat flow.
//!
//! Domain gate, language resolution, translation into English, retrieval,
//! generation, the optional outbreak note and translation back. Every
//! collaborator is loaded once at startup and shared read-only.

use crate::config::Settings;
use crate::defaults::WORKING_LANGUAGE;
use crate::domain_gate::{DomainGate, REFUSAL_REPLY};
use crate::embedding::build_embedder;
use crate::generation::{prompt, AnswerGenerator, LlmClient, WatsonxClient};
use crate::language::{GoogleTranslator, LanguageRouter};
use crate::metrics::get_metrics_collector;
use crate::model::{ChatReply, ChatRequest, HealthStatus};
use crate::retrieval::Retriever;
use crate::stats::OutbreakStats;
use crate::store::IndexArtifacts;
use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("query required")]
    QueryRequired,
}

pub struct ChatPipeline {
    gate: Option<DomainGate>,
    router: LanguageRouter,
    retriever: Retriever,
    generator: AnswerGenerator,
    stats: Option<OutbreakStats>,
    top_k: usize,
}

impl ChatPipeline {
    /// Pipeline with the health domain gate enabled and no outbreak note.
    pub fn new(router: LanguageRouter, retriever: Retriever, generator: AnswerGenerator) -> Self {
        Self {
            gate: Some(DomainGate::health()),
            router,
            retriever,
            generator,
            stats: None,
            top_k: crate::defaults::DEFAULT_TOP_K,
        }
    }

    pub fn with_domain_gate(mut self, gate: Option<DomainGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_stats(mut self, stats: Option<OutbreakStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Wire up every collaborator from `settings`.
    ///
    /// A missing or unreadable index only disables retrieval, and missing LLM
    /// credentials select the extractive generator. An index built with a
    /// different embedding model is fatal.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = build_embedder(&settings.embedding)?;

        let artifacts = if IndexArtifacts::exists(&settings.index_dir) {
            match IndexArtifacts::load(&settings.index_dir) {
                Ok(artifacts) => {
                    if artifacts.manifest.embed_model != embedder.model_id() {
                        bail!(
                            "Index in {} was built with embedding model '{}' but '{}' is configured",
                            settings.index_dir.display(),
                            artifacts.manifest.embed_model,
                            embedder.model_id()
                        );
                    }
                    Some(Arc::new(artifacts))
                }
                Err(e) => {
                    tracing::warn!("Could not load index, retrieval disabled: {:#}", e);
                    None
                }
            }
        } else {
            tracing::warn!(
                "No index found in {}, retrieval disabled. Run `healthbot build-index` first.",
                settings.index_dir.display()
            );
            None
        };

        let llm: Option<Arc<dyn LlmClient>> = match settings.watsonx.clone() {
            Some(watsonx) => {
                let client = WatsonxClient::new(watsonx)?;
                tracing::info!("Using watsonx model {}", client.model_id());
                Some(Arc::new(client) as Arc<dyn LlmClient>)
            }
            None => {
                tracing::warn!("watsonx credentials missing, using extractive fallback generator");
                None
            }
        };

        let translator = GoogleTranslator::new(&settings.translate_url, settings.translate_timeout)?;
        let stats = OutbreakStats::new(&settings.stats_url, settings.stats_timeout)?;

        Ok(Self::new(
            LanguageRouter::new(Arc::new(translator), settings.languages.clone()),
            Retriever::new(embedder, artifacts),
            AnswerGenerator::new(llm, settings.generation, settings.fallback_sentences),
        )
        .with_domain_gate(settings.domain_gate.then(DomainGate::health))
        .with_stats(Some(stats))
        .with_top_k(settings.top_k))
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            llm_configured: self.generator.is_configured(),
            index_loaded: self.retriever.is_loaded(),
            index_texts_count: self.retriever.texts_count(),
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let request_id = Uuid::new_v4();
        self.process(request)
            .instrument(tracing::info_span!("chat", %request_id))
            .await
    }

    async fn process(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let metrics = get_metrics_collector();
        metrics.increment("chat.requests");
        let _timer = crate::measure_operation!("chat.handle");

        // Only a missing or zero-length query is rejected; blank text still goes to the gate.
        let query = request.query.as_deref().unwrap_or_default();
        if query.is_empty() {
            metrics.increment("chat.rejected");
            return Err(ChatError::QueryRequired);
        }

        if let Some(gate) = &self.gate {
            if !gate.is_in_domain(query) {
                tracing::info!("Query outside the health domain, refusing");
                metrics.increment("chat.refused");
                return Ok(ChatReply {
                    reply: REFUSAL_REPLY.to_string(),
                    lang: WORKING_LANGUAGE.to_string(),
                });
            }
        }

        let target = self.router.resolve_target(request.lang.as_deref(), query).await;
        let query_en = if target != WORKING_LANGUAGE {
            self.router.translate(query, WORKING_LANGUAGE).await
        } else {
            query.to_string()
        };
        tracing::debug!("Replying in '{}', working query: {}", target, query_en);

        let passages = self.retriever.retrieve(&query_en, self.top_k).await;
        let context = prompt::context_block(&passages);
        let prompt = prompt::compose(&context, &query_en, self.gate.is_some());

        let mut answer = self.generator.generate(&prompt).await;

        if let Some(stats) = &self.stats {
            if let Some(note) = stats.note_for(&query_en).await {
                answer.push_str("\n\n");
                answer.push_str(&note);
            }
        }

        let reply = if target != WORKING_LANGUAGE {
            self.router.translate(&answer, &target).await
        } else {
            answer
        };

        tracing::info!("Answered with {} passages in '{}'", passages.len(), target);
        metrics.increment("chat.answered");
        Ok(ChatReply { reply, lang: target })
    }
}
