/// Embedding wrapper around fastembed.
///
/// `TextEmbedding` from fastembed is synchronous and CPU-bound. Model initialization goes
/// through `tokio::task::spawn_blocking`; the `embed_*_blocking` methods must themselves be
/// called from a blocking context (a `spawn_blocking` closure or a plain thread).
///
/// The nomic-embed-text-v1.5 model uses task-prefixed inputs. Passages compared for
/// similarity are embedded as documents: "search_document: {text}".
use std::sync::Arc;

use crate::error::CommonError;

/// Characters per chunk when a passage is longer than the model's context window.
const CHUNK_CHARS: usize = 1_500;
const EMBED_BATCH_SIZE: usize = 4;

/// Wraps fastembed's `TextEmbedding` model for generating vector embeddings.
pub struct Embedder {
    model: Arc<fastembed::TextEmbedding>,
}

impl Embedder {
    /// Initialize the embedding model (nomic-embed-text-v1.5).
    ///
    /// This downloads the model on first run (~300MB). The download happens synchronously
    /// inside a blocking task.
    pub async fn new() -> Result<Self, CommonError> {
        let model = tokio::task::spawn_blocking(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(false);
            fastembed::TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("model initialization failed: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }

    /// Embed a passage of arbitrary length into a single vector.
    ///
    /// Long passages are split into chunks on whitespace boundaries, each chunk is embedded,
    /// and the chunk vectors are mean-pooled. The result is deterministic for a fixed input.
    pub fn embed_passage_blocking(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        let prefixed: Vec<String> = chunk_text(text, CHUNK_CHARS)
            .into_iter()
            .map(|c| format!("search_document: {c}"))
            .collect();
        let vectors = self
            .model
            .embed(prefixed, Some(EMBED_BATCH_SIZE))
            .map_err(|e| CommonError::Embedding(format!("passage embedding failed: {e}")))?;
        mean_pool(&vectors).ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }

    /// Returns the dimensionality of the embedding vectors (768 for nomic-embed-text-v1.5).
    pub fn dimensions(&self) -> usize {
        768
    }
}

/// Cosine similarity of two vectors. Returns 0.0 when either vector has zero norm or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Split text into chunks of at most `max_chars` characters, breaking on whitespace where
/// possible. Always returns at least one chunk (possibly empty).
fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|x| x / n).collect())
}
