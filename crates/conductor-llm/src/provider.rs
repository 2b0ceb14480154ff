//! Provider Core (C3). The minimal contract every remote model endpoint
//! implements, plus the optional capability traits (streaming, embedding,
//! vision) concrete providers may layer on top.

use async_trait::async_trait;
use conductor_core::ConductorResult;
use regex::Regex;

/// `generate(prompt) → text` plus introspection. Every concrete provider
/// (OpenAI-compatible, Anthropic, Gemini, Ollama, Azure-OpenAI, ...)
/// implements this trait; the resilience layer (C4) wraps any `Provider` in
/// `RateLimiter → CircuitBreaker → Retry → TimeLimiter` without needing to
/// know which concrete provider is underneath.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Calls the underlying model with `prompt`, returning its full text
    /// response.
    async fn generate(&self, prompt: &str) -> ConductorResult<String>;

    fn info(&self) -> ProviderInfo;
}

pub type ProviderRef = std::sync::Arc<dyn Provider>;

/// `{name, model}` introspection (§4.3). `name` is the normalized provider
/// identifier (see [`normalize_name`]); `model` is the raw, un-normalized
/// model name as sent in API payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
}

/// Streaming capability: `generateStreaming(prompt, tokenSink) → finalText`.
/// `token_sink` is invoked with partial tokens in order; the sink calls are
/// sequential within one call.
#[async_trait]
pub trait StreamingProvider: Provider {
    async fn generate_streaming(
        &self,
        prompt: &str,
        token_sink: &mut (dyn FnMut(&str) + Send),
    ) -> ConductorResult<String>;
}

/// Embedding capability (§4.3).
#[async_trait]
pub trait EmbeddingProvider: Provider {
    async fn embed(&self, text: &str) -> ConductorResult<Vec<f64>>;

    async fn embed_batch(&self, texts: &[String]) -> ConductorResult<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;
}

/// Pure cosine-similarity helper over two equal-length embedding vectors.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Finds the index and score of the candidate most similar to `query` by
/// cosine similarity. Returns `None` for an empty candidate list.
pub fn find_most_similar(query: &[f64], candidates: &[Vec<f64>]) -> Option<(usize, f64)> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| (i, cosine(query, candidate)))
        .fold(None, |best, (i, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((i, score)),
        })
}

/// A reference to an image, either inline bytes or a URL, handed to a
/// vision-capable provider.
#[derive(Debug, Clone)]
pub enum ImageRef {
    Url(String),
    Bytes { data: Vec<u8>, mime_type: String },
}

/// Vision capability (§4.3).
#[async_trait]
pub trait VisionProvider: Provider {
    async fn generate_with_image(&self, prompt: &str, image: &ImageRef) -> ConductorResult<String>;

    async fn generate_with_images(&self, prompt: &str, images: &[ImageRef]) -> ConductorResult<String>;

    fn supported_image_formats(&self) -> &[&str];
}

/// Normalizes a provider or model name for routing/metrics keys: lowercased,
/// non-alphanumeric runs collapsed to `-`, leading/trailing `-` trimmed.
/// Empty inputs fall back to a generated `llm-provider-<rand>` identifier.
/// The raw model name passed to the API is never altered by this function —
/// only the key used for circuit-breaker/rate-limiter registries and
/// metrics is (§4.3).
pub fn normalize_name(raw: &str) -> String {
    let non_alnum = Regex::new(r"[^a-z0-9]+").unwrap();
    let lowered = raw.to_lowercase();
    let collapsed = non_alnum.replace_all(&lowered, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        format!("llm-provider-{}", rand::random::<u32>())
    } else {
        trimmed.to_string()
    }
}
