//! Centralized default constants for the trailmart services.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration loaders fall back to these when an environment variable is
//! unset or unparseable.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model (Ollama tag).
pub const EMBED_MODEL: &str = "all-minilm";

/// Embedding vector dimension produced by [`EMBED_MODEL`].
pub const EMBED_DIMENSION: usize = 384;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default chat model used for tagging, rich descriptions, and support.
pub const GEN_MODEL: &str = "qwen3:4b";

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Embedding calls slower than this are logged with `slow = true`.
pub const SLOW_EMBED_MS: u64 = 5_000;

/// Generation calls slower than this are logged with `slow = true`.
pub const SLOW_GENERATION_MS: u64 = 30_000;

// =============================================================================
// SEMANTIC SEARCH
// =============================================================================

/// Nearest neighbours fetched per semantic query.
pub const SEARCH_TOP_N: usize = 5;

/// Minimum cosine similarity a hit needs to survive filtering.
pub const SEARCH_THRESHOLD: f32 = 0.65;

/// Name of the vector collection holding product projections.
pub const VECTOR_COLLECTION: &str = "product_vectors";

// =============================================================================
// TAGGING
// =============================================================================

/// Fewest tags the tagging prompt asks for.
pub const TAG_MIN: usize = 3;

/// Most tags accepted from a single tagging response.
pub const TAG_MAX: usize = 6;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP listen port.
pub const SERVER_PORT: u16 = 3000;

/// Broadcast buffer for the in-process integration event bus.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Upper bound on a single consumer handler invocation (seconds).
pub const CONSUMER_HANDLER_TIMEOUT_SECS: u64 = 300;

/// Redeliveries of an event to a failing handler before it is dead-lettered.
pub const CONSUMER_MAX_RETRIES: u32 = 3;

/// Delay before the first redelivery; doubles on each further attempt.
pub const CONSUMER_RETRY_BACKOFF_MS: u64 = 500;

/// Maximum accepted webhook body.
pub const WEBHOOK_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Timeout for outbound HTTP calls to the identity provider and catalog lookup.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// WEBHOOK / IDENTITY PROVIDER
// =============================================================================

/// Header carrying the HMAC-SHA256 signature of the webhook body.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Keycloak-Signature";

/// Event types requested when registering the webhook (`*` = all).
pub const WEBHOOK_EVENT_TYPES: &str = "*";

/// Seconds subtracted from the admin token lifetime so it is refreshed early.
pub const TOKEN_REFRESH_SKEW_SECS: i64 = 30;

/// Username stored when a registration payload carries none.
pub const UNKNOWN_USERNAME: &str = "(unknown)";

// =============================================================================
// BASKET CACHE
// =============================================================================

/// Key prefix for cached carts (`basket:{user_id}`).
pub const BASKET_KEY_PREFIX: &str = "basket";

/// Key prefix for the product → carts index (`basket:product:{product_id}`).
pub const BASKET_PRODUCT_INDEX_PREFIX: &str = "basket:product";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_threshold_is_a_similarity() {
        assert!(SEARCH_THRESHOLD > 0.0 && SEARCH_THRESHOLD < 1.0);
    }

    #[test]
    fn test_tag_bounds_ordered() {
        assert!(TAG_MIN <= TAG_MAX);
    }
}
