// Retask Infrastructure - Redis Adapter
// Implements: QueueClient over Redis lists, plus the wire envelope shared with producers

mod client;
mod connection;
pub mod envelope;
mod settings;

pub use client::RedisQueueClient;
pub use connection::{classify_redis_error, open_connection};
pub use envelope::{queue_key, Envelope, QUEUE_KEY_PREFIX};
pub use settings::{redact_url, RedisSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REPLY_TTL};

// Note: redis::RedisError cannot convert into AppError via From (orphan rules),
// so every call site maps through classify_redis_error
