//! Retrieval context assembly.
//!
//! Embeds a query, searches the knowledge store and turns the hits into a
//! bounded context block with source attributions, ready for a generation
//! prompt.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use crate::config::RetrievalSettings;
use crate::embedding::EmbeddingClient;
use crate::store::KnowledgeStore;
use crate::types::Result;

/// Separator between chunks in the assembled context block.
const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Assembled retrieval context for one query.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    /// Concatenated, length-bounded context text.
    pub context_text: String,
    /// Deduplicated source attributions (file basenames), ordered.
    pub sources: BTreeSet<String>,
    /// Highest similarity score among the used chunks.
    pub best_score: f32,
}

/// Outcome of a retrieval pass.
///
/// `NoMatch` is deliberately distinct from an error: the pipeline worked, the
/// store just holds nothing relevant. Callers must not render it as an empty
/// answer.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// Relevant chunks were found and assembled.
    Answer(RetrievalContext),
    /// Nothing in the store met the score threshold.
    NoMatch,
}

/// Builds generation-ready context from store search results.
pub struct ContextBuilder {
    top_k: usize,
    score_threshold: f32,
    max_context_chars: usize,
}

impl ContextBuilder {
    /// Build from settings.
    pub fn new(settings: &RetrievalSettings) -> Self {
        Self {
            top_k: settings.top_k,
            score_threshold: settings.score_threshold,
            max_context_chars: settings.max_context_chars,
        }
    }

    /// Override the score threshold (CLI flag support).
    pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    /// Override the number of retrieved chunks.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Retrieve and assemble context for a query.
    ///
    /// A failed query embedding propagates as an error; a query that cannot
    /// be embedded must not silently degrade into an empty context.
    pub async fn answer_context(
        &self,
        embedder: &EmbeddingClient,
        store: &KnowledgeStore,
        query: &str,
    ) -> Result<RetrievalOutcome> {
        let query_vector = embedder.embed(query).await?;

        let hits = store
            .search(&query_vector, self.top_k, self.score_threshold)
            .await;
        if hits.is_empty() {
            info!(query_len = query.len(), "No chunks met the score threshold");
            return Ok(RetrievalOutcome::NoMatch);
        }

        debug!(hits = hits.len(), best = hits[0].score, "Assembling context");

        let best_score = hits[0].score;
        let mut sources = BTreeSet::new();
        let mut texts = Vec::with_capacity(hits.len());
        for hit in hits {
            sources.insert(basename(&hit.source));
            texts.push(hit.text);
        }

        let context_text = self.bounded_context(&texts);

        Ok(RetrievalOutcome::Answer(RetrievalContext {
            context_text,
            sources,
            best_score,
        }))
    }

    /// Render the final generation prompt for a query and its context.
    pub fn build_prompt(&self, query: &str, context: &RetrievalContext) -> String {
        format!(
            "Based on the following transcript content, provide a detailed and \
             relevant answer.\n\n\
             Context:\n{}\n\n\
             Question: {}\n\n\
             Provide a clear and informative answer based on the given context.",
            context.context_text, query
        )
    }

    /// Join chunk texts and bound the result, cutting on a word boundary.
    fn bounded_context(&self, texts: &[String]) -> String {
        let joined = texts.join(CONTEXT_SEPARATOR);
        if joined.chars().count() <= self.max_context_chars {
            return joined;
        }

        let cut: String = joined.chars().take(self.max_context_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(pos) => &cut[..pos],
            None => cut.as_str(),
        };
        format!("{}...", trimmed)
    }
}

fn basename(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}
