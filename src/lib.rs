//! FeOx-reply: reply serialization and batching for FeOx protocol servers
//!
//! This crate turns command results into Redis (RESP2/RESP3) or Memcached
//! text protocol bytes and decides when those bytes are written to the
//! connection.
//!
//! # Architecture
//!
//! - One builder per connection, owned and driven by that connection only
//! - Batch mode and nested aggregation scopes coalesce replies into few writes
//! - Vectored writes reference large payloads instead of copying them
//! - Multi-get values live in a per-response arena, not one allocation each

/// Configuration for reply builders
pub mod config;

/// Error types and result aliases
pub mod error;

/// Byte sinks the builders write into
pub mod io;

/// Client-role protocol helpers (request serializer, reply reader)
pub mod protocol;

/// Protocol reply encoders and batching
pub mod reply;

/// Per-thread reply counters
pub mod stats;

pub use config::ReplyConfig;
pub use error::{Error, Result};
pub use reply::{
    McReplyBuilder, MGetResponse, RedisReplyBuilder, ReplyAggregator, ReplyBuilder,
    SinkReplyBuilder, SinkReplyBuilder2,
};
