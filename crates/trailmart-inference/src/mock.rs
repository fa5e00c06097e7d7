//! Mock inference backend for deterministic testing.
//!
//! Embeddings are bag-of-words hashes: texts sharing words are similar,
//! identical word sets have cosine similarity 1.0, disjoint ones are close
//! to 0.0. Generation answers come from substring mappings on the prompt.
//!
//! ## Usage
//!
//! ```rust
//! use trailmart_inference::mock::MockInferenceBackend;
//!
//! let backend = MockInferenceBackend::new()
//!     .with_json_response(r#"["tent","camping","shelter"]"#)
//!     .with_text_response("A roomy tent.");
//! assert_eq!(backend.generate_call_count(), 0);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use trailmart_core::{EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result, Vector};

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    /// Generation calls that fail before normal answers resume.
    scheduled_failures: Arc<AtomicUsize>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    /// Prompt substring → response, checked before the defaults.
    mapped_responses: Vec<(String, String)>,
    text_response: String,
    json_response: String,
    latency_ms: u64,
    failure_rate: f64,
    embed_failure_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub system: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            mapped_responses: Vec::new(),
            text_response: "Mock response".to_string(),
            json_response: "[]".to_string(),
            latency_ms: 0,
            failure_rate: 0.0,
            embed_failure_rate: 0.0,
        }
    }
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
            scheduled_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Default answer for plain generation.
    pub fn with_text_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).text_response = response.into();
        self
    }

    /// Default answer for JSON-constrained generation.
    pub fn with_json_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).json_response = response.into();
        self
    }

    /// Answer `output` whenever the user prompt contains `needle`.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .mapped_responses
            .push((needle.into(), output.into()));
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for generation calls.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set failure rate (0.0 - 1.0) for embedding calls.
    pub fn with_embed_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).embed_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail the next `count` generation calls, then answer normally.
    pub fn with_fail_next(self, count: usize) -> Self {
        self.scheduled_failures.store(count, Ordering::SeqCst);
        self
    }

    fn take_scheduled_failure(&self) -> bool {
        self.scheduled_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.lock_log().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.lock_log().clear()
    }

    /// Get number of embedded texts.
    pub fn embed_call_count(&self) -> usize {
        self.count("embed")
    }

    /// Get number of plain generation calls.
    pub fn generate_call_count(&self) -> usize {
        self.count("generate")
    }

    /// Get number of JSON generation calls.
    pub fn generate_json_call_count(&self) -> usize {
        self.count("generate_json")
    }

    fn count(&self, operation: &str) -> usize {
        self.lock_log()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
        self.call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn log_call(&self, operation: &str, system: &str, input: &str) {
        self.lock_log().push(MockCall {
            operation: operation.to_string(),
            system: system.to_string(),
            input: input.to_string(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn roll(rate: f64) -> bool {
        use rand::Rng;
        rate > 0.0 && rand::thread_rng().gen::<f64>() < rate
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn answer(&self, prompt: &str, default: &str) -> String {
        self.config
            .mapped_responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| default.to_string())
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.simulate_latency().await;
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            self.log_call("embed", "", text);
            if Self::roll(self.config.embed_failure_rate) {
                return Err(Error::Embedding("Simulated failure for testing".into()));
            }
            out.push(Vector::from(MockEmbeddingGenerator::generate(
                text,
                self.config.dimension,
            )));
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.log_call("generate", system, prompt);
        self.simulate_latency().await;
        if self.take_scheduled_failure() || Self::roll(self.config.failure_rate) {
            return Err(Error::Inference("Simulated failure for testing".into()));
        }
        Ok(self.answer(prompt, &self.config.text_response))
    }

    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.log_call("generate_json", system, prompt);
        self.simulate_latency().await;
        if self.take_scheduled_failure() || Self::roll(self.config.failure_rate) {
            return Err(Error::Inference("Simulated failure for testing".into()));
        }
        Ok(self.answer(prompt, &self.config.json_response))
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Deterministic bag-of-words embedding.
    ///
    /// Each lower-cased alphanumeric word is hashed (FNV-1a) into a bucket;
    /// the bucket counts are normalized to a unit vector.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let dimension = dimension.max(1);
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % dimension as u64) as usize;
            *counts.entry(bucket).or_insert(0.0) += 1.0;
        }

        let mut vec = vec![0.0; dimension];
        for (idx, count) in counts {
            vec[idx] = count;
        }
        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_embed() {
        let backend = MockInferenceBackend::new().with_dimension(128);
        let out = backend.embed_texts(&["test".to_string()]).await.unwrap();
        assert_eq!(out[0].as_slice().len(), 128);
    }

    #[tokio::test]
    async fn test_mock_backend_deterministic() {
        let backend = MockInferenceBackend::new();
        let texts = vec!["alpine tent".to_string(), "alpine tent".to_string()];
        let out = backend.embed_texts(&texts).await.unwrap();
        assert_eq!(out[0], out[1], "Embeddings should be deterministic");
    }

    #[test]
    fn test_same_words_identical_similarity() {
        let a = MockEmbeddingGenerator::generate("Alpine Tent", 384);
        let b = MockEmbeddingGenerator::generate("tent alpine", 384);
        assert!((MockEmbeddingGenerator::cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_partial_overlap_is_between() {
        let a = MockEmbeddingGenerator::generate("alpine tent", 384);
        let b = MockEmbeddingGenerator::generate("alpine stove", 384);
        let sim = MockEmbeddingGenerator::cosine_similarity(&a, &b);
        assert!(sim > 0.3 && sim < 0.9, "got {sim}");
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = MockEmbeddingGenerator::generate("", 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_mock_backend_default_responses() {
        let backend = MockInferenceBackend::new()
            .with_text_response("Custom response")
            .with_json_response(r#"["a"]"#);

        assert_eq!(
            backend.generate_with_system("sys", "p").await.unwrap(),
            "Custom response"
        );
        assert_eq!(
            backend.generate_json_with_system("sys", "p").await.unwrap(),
            r#"["a"]"#
        );
    }

    #[tokio::test]
    async fn test_mock_backend_response_mapping() {
        let backend = MockInferenceBackend::new()
            .with_response_mapping("Name: Tent", "tent answer")
            .with_response_mapping("Name: Stove", "stove answer");

        assert_eq!(
            backend
                .generate_with_system("", "Name: Stove\nDescription: hot")
                .await
                .unwrap(),
            "stove answer"
        );
    }

    #[tokio::test]
    async fn test_mock_backend_call_logging() {
        let backend = MockInferenceBackend::new();

        backend
            .embed_texts(&["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        backend.generate_with_system("s", "prompt").await.unwrap();
        backend.generate_json_with_system("s", "prompt").await.unwrap();

        assert_eq!(backend.embed_call_count(), 2);
        assert_eq!(backend.generate_call_count(), 1);
        assert_eq!(backend.generate_json_call_count(), 1);
        assert_eq!(backend.get_calls()[2].system, "s");

        backend.clear_calls();
        assert!(backend.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_failures_are_consumed() {
        let backend = MockInferenceBackend::new().with_fail_next(2);
        let clone = backend.clone();
        assert!(backend.generate_with_system("", "a").await.is_err());
        assert!(clone.generate_json_with_system("", "b").await.is_err());
        assert!(backend.generate_with_system("", "c").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_backend_failure_simulation() {
        let backend = MockInferenceBackend::new()
            .with_failure_rate(1.0)
            .with_embed_failure_rate(1.0);

        assert!(matches!(
            backend.generate_with_system("", "x").await,
            Err(Error::Inference(_))
        ));
        assert!(matches!(
            backend.embed_texts(&["x".to_string()]).await,
            Err(Error::Embedding(_))
        ));
    }
}
