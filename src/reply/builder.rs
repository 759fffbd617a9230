use crate::config::ReplyConfig;
use crate::error::{Error, Result};
use crate::io::Sink;
use crate::reply::mget::MGetResponse;
use crate::reply::mode::{Recorded, ReplyMode, ReplyRecorder};
use crate::reply::status::{ErrorReply, OpStatus};
use crate::stats;
use bytes::{BufMut, BytesMut};
use std::io::{self, IoSlice};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Buffering and flush control shared by all protocol encoders.
///
/// Encoded bytes are appended to an owned buffer and written to the sink as
/// soon as neither batch mode nor an aggregation scope is active. The first
/// sink failure is sticky: later sends become no-ops and nothing else reaches
/// the sink.
pub struct SinkReplyBuilder {
    batch: BytesMut,
    sink: Box<dyn Sink + Send>,
    error: Option<io::ErrorKind>,

    // Coalescing controlled by the connection (pipelining)
    should_batch: bool,
    // Coalescing controlled at operation level, see ReplyAggregator
    aggregate_depth: u32,
    has_replied: bool,
    send_active: bool,
    closed: bool,

    max_batch_size: Option<usize>,
    recorder: ReplyRecorder,
}

impl SinkReplyBuilder {
    pub fn new(sink: impl Sink + Send + 'static) -> Self {
        Self::with_config(sink, &ReplyConfig::default())
    }

    pub fn with_config(sink: impl Sink + Send + 'static, config: &ReplyConfig) -> Self {
        Self {
            batch: BytesMut::with_capacity(config.buffer_capacity),
            sink: Box::new(sink),
            error: None,
            should_batch: false,
            aggregate_depth: 0,
            has_replied: true,
            send_active: false,
            closed: false,
            max_batch_size: config.max_batch_size,
            recorder: ReplyRecorder::new(config.reply_mode, config.record_capacity),
        }
    }

    /// Coalesce replies until [`flush_batch`](Self::flush_batch) or until
    /// batch mode is turned off, which flushes immediately.
    pub fn set_batch_mode(&mut self, batch: bool) -> Result<()> {
        self.should_batch = batch;
        if !batch && self.aggregate_depth == 0 {
            return self.flush_batch();
        }
        self.check()
    }

    pub fn is_batching(&self) -> bool {
        self.should_batch
    }

    /// Write everything buffered so far.
    ///
    /// Once the sink has failed the buffer is discarded and the sticky error
    /// is returned.
    pub fn flush_batch(&mut self) -> Result<()> {
        if self.error.is_some() || self.closed {
            self.batch.clear();
        } else if !self.batch.is_empty() {
            self.write_out(&[])?;
        }
        self.check()
    }

    /// Flush pending replies and mark the connection for teardown.
    /// Calling it again is a no-op.
    pub fn close_connection(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let res = self.flush_batch();
        self.closed = true;
        debug!("reply builder closed the connection");
        res
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Transport error observed by this builder, if any
    pub fn get_error(&self) -> Option<io::ErrorKind> {
        match self.error {
            Some(kind) => Some(kind),
            None if self.closed => Some(io::ErrorKind::ConnectionAborted),
            None => None,
        }
    }

    /// True only while a sink write is in progress
    pub fn is_send_active(&self) -> bool {
        self.send_active
    }

    /// Reset reply tracking before dispatching a command
    pub fn expect_reply(&mut self) {
        self.has_replied = false;
    }

    pub fn has_replied(&self) -> bool {
        self.has_replied
    }

    pub fn used_memory(&self) -> usize {
        self.batch.capacity()
    }

    /// Bytes buffered but not yet written
    pub fn pending(&self) -> &[u8] {
        &self.batch
    }

    pub fn start_aggregate(&mut self) {
        self.aggregate_depth += 1;
    }

    pub fn stop_aggregate(&mut self) {
        debug_assert!(self.aggregate_depth > 0, "unbalanced stop_aggregate");
        self.aggregate_depth = self.aggregate_depth.saturating_sub(1);
        if self.aggregate_depth > 0 || self.should_batch {
            return;
        }
        // Failures stay sticky and surface through get_error()
        let _ = self.flush_batch();
    }

    pub fn is_aggregating(&self) -> bool {
        self.aggregate_depth > 0
    }

    pub fn reply_mode(&self) -> ReplyMode {
        self.recorder.mode()
    }

    pub fn set_reply_mode(&mut self, mode: ReplyMode) {
        self.recorder.set_mode(mode);
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorder.entries().cloned().collect()
    }

    pub(crate) fn record_error(&mut self, msg: &str) {
        self.recorder.error(msg);
    }

    /// Sends raw bytes without any formatting
    pub fn send_raw(&mut self, data: &[u8]) {
        self.send_parts(&[data]);
    }

    /// Send one logical reply made of several pieces.
    ///
    /// When nothing is being coalesced the pieces go to the sink as a single
    /// vectored write, without being copied into the buffer.
    pub fn send_parts(&mut self, parts: &[&[u8]]) {
        debug_assert!(!self.send_active, "reentrant send");

        let total: usize = parts.iter().map(|p| p.len()).sum();
        self.has_replied = true;
        stats::record_send(total);

        if self.error.is_some() || self.closed {
            return;
        }
        self.recorder.reply(parts);

        if self.should_batch || self.aggregate_depth > 0 {
            let fits = self.aggregate_depth > 0
                || self
                    .max_batch_size
                    .map_or(true, |limit| self.batch.len() + total <= limit);
            if fits {
                for part in parts {
                    self.batch.put_slice(part);
                }
                return;
            }
        }

        let _ = self.write_out(parts);
    }

    /// Account for a reply that was produced but deliberately not written
    pub(crate) fn skip_parts(&mut self, parts: &[&[u8]]) {
        self.has_replied = true;
        stats::record_send(parts.iter().map(|p| p.len()).sum());
    }

    /// Write the buffer followed by `parts` in one sink call
    fn write_out(&mut self, parts: &[&[u8]]) -> io::Result<()> {
        let mut slices = Vec::with_capacity(parts.len() + 1);
        if !self.batch.is_empty() {
            slices.push(IoSlice::new(&self.batch));
        }
        slices.extend(
            parts
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| IoSlice::new(p)),
        );
        let total: usize = slices.iter().map(|s| s.len()).sum();

        self.send_active = true;
        let res = self.sink.write_vectored_all(&slices);
        self.send_active = false;
        drop(slices);
        self.batch.clear();

        match res {
            Ok(()) => {
                stats::record_io_write(total);
                Ok(())
            }
            Err(e) => {
                debug!("reply sink write failed: {}", e);
                self.error = Some(e.kind());
                Err(e)
            }
        }
    }

    fn check(&self) -> Result<()> {
        if let Some(kind) = self.error {
            return Err(Error::SinkFailed(kind));
        }
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

/// Protocol independent reply interface.
///
/// A connection picks one implementation at construction (Redis or
/// Memcached) and keeps it for its lifetime.
pub trait ReplyBuilder {
    fn core(&self) -> &SinkReplyBuilder;
    fn core_mut(&mut self) -> &mut SinkReplyBuilder;

    /// Application error with an optional kind tag
    fn send_error(&mut self, msg: &str, kind: &str);

    /// Reply for set commands
    fn send_stored(&mut self);
    fn send_set_skipped(&mut self);

    fn send_mget_response(&mut self, resp: MGetResponse);
    fn send_long(&mut self, val: i64);
    fn send_simple_string(&mut self, s: &str);

    /// The request itself could not be parsed
    fn send_protocol_error(&mut self, msg: &str);

    fn send_ok(&mut self) {
        self.send_simple_string("OK");
    }

    fn send_status(&mut self, status: OpStatus) {
        match status.error_message() {
            None => self.send_ok(),
            Some((msg, kind)) => self.send_error(msg, kind),
        }
    }

    fn send_error_reply(&mut self, err: &ErrorReply) {
        self.send_error(&err.message, &err.kind);
    }

    fn set_batch_mode(&mut self, batch: bool) -> Result<()> {
        self.core_mut().set_batch_mode(batch)
    }

    fn flush_batch(&mut self) -> Result<()> {
        self.core_mut().flush_batch()
    }

    fn close_connection(&mut self) -> Result<()> {
        self.core_mut().close_connection()
    }

    fn get_error(&self) -> Option<io::ErrorKind> {
        self.core().get_error()
    }

    fn expect_reply(&mut self) {
        self.core_mut().expect_reply();
    }

    fn has_replied(&self) -> bool {
        self.core().has_replied()
    }

    fn is_send_active(&self) -> bool {
        self.core().is_send_active()
    }

    fn used_memory(&self) -> usize {
        self.core().used_memory()
    }
}

/// Coalesces every reply sent through it into a single sink write.
///
/// Scopes nest freely; only the outermost one flushes when dropped
/// (e.g. commands inside MULTI/EXEC aggregating on their own).
pub struct ReplyAggregator<'a, B: ReplyBuilder + ?Sized> {
    rb: &'a mut B,
}

impl<'a, B: ReplyBuilder + ?Sized> ReplyAggregator<'a, B> {
    pub fn new(rb: &'a mut B) -> Self {
        rb.core_mut().start_aggregate();
        Self { rb }
    }
}

impl<B: ReplyBuilder + ?Sized> Deref for ReplyAggregator<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.rb
    }
}

impl<B: ReplyBuilder + ?Sized> DerefMut for ReplyAggregator<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.rb
    }
}

impl<B: ReplyBuilder + ?Sized> Drop for ReplyAggregator<'_, B> {
    fn drop(&mut self) {
        self.rb.core_mut().stop_aggregate();
    }
}
