/// Similarity scoring between two texts.
///
/// Two interchangeable strategies sit behind `SimilarityScorer`:
/// - `SemanticScorer`: cosine similarity of fastembed passage embeddings.
/// - `SequenceScorer`: Myers alignment ratio over whitespace-separated tokens, always
///   available.
///
/// The strategy is chosen once at startup by `select_scorer`. Both are deterministic for
/// fixed inputs and return a score in [0, 1], 1.0 meaning identical. Scoring is CPU-bound
/// and synchronous; async callers run it inside `spawn_blocking`.
use std::sync::Arc;

use similar::{capture_diff_slices, get_diff_ratio, Algorithm};
use tracing::{info, warn};

use tos_common::embedding::{cosine_similarity, Embedder};

pub trait SimilarityScorer: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    fn score(&self, a: &str, b: &str) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceScorer;

impl SimilarityScorer for SequenceScorer {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let old: Vec<&str> = a.split_whitespace().collect();
        let new: Vec<&str> = b.split_whitespace().collect();
        let ops = capture_diff_slices(Algorithm::Myers, &old, &new);
        (get_diff_ratio(&ops, old.len(), new.len()) as f64).clamp(0.0, 1.0)
    }
}

pub struct SemanticScorer {
    embedder: Arc<Embedder>,
    fallback: SequenceScorer,
}

impl SemanticScorer {
    pub fn new(embedder: Arc<Embedder>) -> Self {
        Self {
            embedder,
            fallback: SequenceScorer,
        }
    }

    fn embed_score(&self, a: &str, b: &str) -> Result<f64, tos_common::error::CommonError> {
        let va = self.embedder.embed_passage_blocking(a)?;
        let vb = self.embedder.embed_passage_blocking(b)?;
        Ok((cosine_similarity(&va, &vb) as f64).clamp(0.0, 1.0))
    }
}

impl SimilarityScorer for SemanticScorer {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        // An empty side has no meaning to embed.
        if a.trim().is_empty() || b.trim().is_empty() {
            return 0.0;
        }
        match self.embed_score(a, b) {
            Ok(score) => score,
            Err(e) => {
                warn!(error = %e, "semantic scoring failed, using sequence ratio for this comparison");
                self.fallback.score(a, b)
            }
        }
    }
}

/// Pick the scoring strategy for this process.
///
/// With `semantic_enabled`, tries to load the embedding model and uses it if that succeeds;
/// otherwise falls back to `SequenceScorer`.
pub async fn select_scorer(semantic_enabled: bool) -> Arc<dyn SimilarityScorer> {
    if !semantic_enabled {
        info!(scorer = "sequence", "semantic scoring disabled by configuration");
        return Arc::new(SequenceScorer);
    }

    info!("initializing embedding model (may download on first run)");
    match Embedder::new().await {
        Ok(embedder) => {
            info!(
                scorer = "semantic",
                dimensions = embedder.dimensions(),
                "embedding model ready"
            );
            Arc::new(SemanticScorer::new(Arc::new(embedder)))
        }
        Err(e) => {
            warn!(error = %e, scorer = "sequence", "embedding model unavailable, using fallback scorer");
            Arc::new(SequenceScorer)
        }
    }
}
