mod builder;
mod memcache;
mod mget;
mod mode;
mod redis;
pub mod status;
mod vectored;

pub use builder::{ReplyAggregator, ReplyBuilder, SinkReplyBuilder};
pub use memcache::McReplyBuilder;
pub use mget::{BlockId, GetResp, MGetResponse, MGetStorage, ValueRef, DEFAULT_BLOCK_SIZE};
pub use mode::{Recorded, ReplyMode, ReplyRecorder};
pub use redis::{format_double, CollectionType, RedisReplyBuilder, VerbatimFormat};
pub use status::{ErrorReply, OpStatus};
pub use vectored::{ReplyScope, SinkReplyBuilder2};
