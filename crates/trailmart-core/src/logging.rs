//! Structured logging schema and field name constants for trailmart.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query by the same keys across every service.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, lost event, requires operator attention |
//! | WARN  | Recoverable issue, message skipped, fallback applied |
//! | INFO  | Lifecycle events, catalog writes, identity upserts |
//! | DEBUG | Decision points, skipped duplicates, ignored event types |
//! | TRACE | Per-item iteration (vector hits, cart lines) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "catalog", "basket", "search", "db", "inference", "consumer", "webhook", "identity"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "ollama", "pool", "vector_index", "token_cache", "registrar"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create", "search", "embed_texts", "apply_price_change"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Catalog product id.
pub const PRODUCT_ID: &str = "product_id";

/// Basket owner / identity-provider user id.
pub const USER_ID: &str = "user_id";

/// Integration event id.
pub const EVENT_ID: &str = "event_id";

/// Integration event discriminator.
pub const EVENT_TYPE: &str = "event_type";

/// Upstream (identity provider) event uid used by the idempotency ledger.
pub const EVENT_UID: &str = "event_uid";

/// Consumer handler name.
pub const HANDLER: &str = "handler";

/// Search query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
