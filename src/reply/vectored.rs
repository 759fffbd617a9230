//! Reply builder that batches scatter-gather entries as well as bytes.
//!
//! Inside a [`ReplyScope`] payloads owned by the caller can be referenced
//! instead of copied; they are written out by a single vectored write when
//! the outermost scope closes. The scope's data lifetime `'d` is fixed when
//! the scope is opened, so the borrow checker guarantees every referenced
//! slice outlives the flush that reads it.

use crate::config::ReplyConfig;
use crate::error::{Error, Result};
use crate::io::Sink;
use crate::stats;
use std::io::{self, IoSlice};
use std::marker::PhantomData;
use tracing::{debug, warn};

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy)]
enum Piece {
    /// Range of the owned buffer
    Buf { start: usize, len: usize },
    /// Caller memory, valid until the outermost scope closes
    Ref { ptr: *const u8, len: usize },
}

pub struct SinkReplyBuilder2 {
    sink: Box<dyn Sink + Send>,
    error: Option<io::ErrorKind>,

    scope_depth: u32,
    total_size: usize, // sum of vecs lengths
    buffer: Vec<u8>,
    vecs: Vec<Piece>,
    reserved: Option<usize>,
    max_iovecs: usize,
}

// SAFETY: `Ref` pieces point at `&[u8]` data (Send + Sync) and only exist while
// a ReplyScope holds the builder mutably borrowed.
unsafe impl Send for SinkReplyBuilder2 {}

impl SinkReplyBuilder2 {
    pub fn new(sink: impl Sink + Send + 'static) -> Self {
        Self::with_config(sink, &ReplyConfig::default())
    }

    pub fn with_config(sink: impl Sink + Send + 'static, config: &ReplyConfig) -> Self {
        Self {
            sink: Box::new(sink),
            error: None,
            scope_depth: 0,
            total_size: 0,
            buffer: Vec::with_capacity(config.buffer_capacity),
            vecs: Vec::with_capacity(64),
            reserved: None,
            max_iovecs: config.max_iovecs.max(2),
        }
    }

    /// Open a scope. Everything written through it (and through nested
    /// scopes) is sent together when it closes.
    pub fn reply_scope<'d>(&mut self) -> ReplyScope<'_, 'd> {
        self.discard_leaked_scope();
        self.scope_depth = 1;
        ReplyScope {
            rb: self,
            outermost: true,
            finished: false,
            _data: PhantomData,
        }
    }

    /// Copy `data` and send it right away
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.discard_leaked_scope();
        self.write_piece(data);
        self.flush()?;
        self.check()
    }

    pub fn get_error(&self) -> Option<io::ErrorKind> {
        self.error
    }

    /// Bytes accumulated and not yet sent
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Whether `ptr` points into the owned buffer
    pub fn is_in_buf(&self, ptr: *const u8) -> bool {
        let range = self.buffer.as_ptr_range();
        range.start <= ptr && ptr < range.end
    }

    /// Writable region of `size` bytes at the end of the buffer. Only the
    /// prefix passed to [`commit_piece`](Self::commit_piece) is kept.
    fn reserve_piece(&mut self, size: usize) -> &mut [u8] {
        if let Some(start) = self.reserved.take() {
            self.buffer.truncate(start);
        }
        let start = self.buffer.len();
        self.buffer.resize(start + size, 0);
        self.reserved = Some(start);
        &mut self.buffer[start..]
    }

    fn commit_piece(&mut self, size: usize) {
        let Some(start) = self.reserved.take() else {
            debug_assert!(false, "commit_piece without reserve_piece");
            return;
        };
        let size = size.min(self.buffer.len() - start);
        self.buffer.truncate(start + size);
        if size == 0 || self.error.is_some() {
            return;
        }
        self.total_size += size;

        // Merge with the previous buffer piece if they are adjacent
        if let Some(Piece::Buf { start: prev, len }) = self.vecs.last_mut() {
            if *prev + *len == start {
                *len += size;
                return;
            }
        }
        self.next_vec(Piece::Buf { start, len: size });
    }

    fn write_piece(&mut self, data: &[u8]) {
        let dest = self.reserve_piece(data.len());
        dest.copy_from_slice(data);
        self.commit_piece(data.len());
    }

    /// Reference `data` without copying.
    ///
    /// # Safety
    ///
    /// `data` must stay valid until the next flush.
    unsafe fn write_ref(&mut self, data: &[u8]) {
        debug_assert!(!self.is_in_buf(data.as_ptr()), "reference into own buffer");
        if data.is_empty() || self.error.is_some() {
            return;
        }
        self.total_size += data.len();
        self.next_vec(Piece::Ref {
            ptr: data.as_ptr(),
            len: data.len(),
        });
    }

    fn next_vec(&mut self, piece: Piece) {
        self.vecs.push(piece);
        if self.vecs.len() >= self.max_iovecs {
            // Failures are sticky and reported when the scope closes
            let _ = self.flush();
        }
    }

    /// Send all accumulated data and reset to a clear state
    fn flush(&mut self) -> io::Result<()> {
        if self.vecs.is_empty() || self.error.is_some() {
            self.reset();
            return Ok(());
        }

        let buffer = &self.buffer;
        let slices: Vec<IoSlice<'_>> = self
            .vecs
            .iter()
            .map(|piece| match *piece {
                Piece::Buf { start, len } => IoSlice::new(&buffer[start..start + len]),
                // SAFETY: refs are only added through a ReplyScope whose data
                // lifetime outlives the scope, and the scope flushes before
                // it ends.
                Piece::Ref { ptr, len } => {
                    IoSlice::new(unsafe { std::slice::from_raw_parts(ptr, len) })
                }
            })
            .collect();

        let res = self.sink.write_vectored_all(&slices);
        drop(slices);
        let total = self.total_size;
        self.reset();

        match res {
            Ok(()) => {
                stats::record_io_write(total);
                Ok(())
            }
            Err(e) => {
                debug!("vectored reply write failed: {}", e);
                self.error = Some(e.kind());
                Err(e)
            }
        }
    }

    fn finish_scope(&mut self) -> Result<()> {
        self.scope_depth = 0;
        self.flush()?;
        self.check()
    }

    fn reset(&mut self) {
        self.vecs.clear();
        self.buffer.clear();
        self.total_size = 0;
        self.reserved = None;
    }

    /// A scope that was leaked with mem::forget may have left references
    /// behind; they can no longer be trusted.
    fn discard_leaked_scope(&mut self) {
        if self.scope_depth > 0 {
            warn!("discarding {} bytes of a leaked reply scope", self.total_size);
            self.reset();
            self.scope_depth = 0;
        }
    }

    fn check(&self) -> Result<()> {
        match self.error {
            Some(kind) => Err(Error::SinkFailed(kind)),
            None => Ok(()),
        }
    }
}

/// Active reply scope. All slices passed to [`write_ref`](Self::write_ref)
/// must live for `'d`, which outlasts the scope.
pub struct ReplyScope<'b, 'd> {
    rb: &'b mut SinkReplyBuilder2,
    outermost: bool,
    finished: bool,
    // Invariant in 'd: a nested scope must not accept shorter-lived data
    _data: PhantomData<fn(&'d [u8]) -> &'d [u8]>,
}

impl<'d> ReplyScope<'_, 'd> {
    /// Copy `data` into the buffer
    pub fn write(&mut self, data: &[u8]) {
        self.rb.write_piece(data);
    }

    /// Reference `data` without copying it
    pub fn write_ref(&mut self, data: &'d [u8]) {
        // SAFETY: 'd outlives this scope, and the outermost scope flushes
        // before it is gone.
        unsafe { self.rb.write_ref(data) }
    }

    /// Two-phase write: format up to `size` bytes in place, then commit
    pub fn reserve_piece(&mut self, size: usize) -> &mut [u8] {
        self.rb.reserve_piece(size)
    }

    pub fn commit_piece(&mut self, size: usize) {
        self.rb.commit_piece(size);
    }

    /// RESP bulk string whose payload is referenced, not copied
    pub fn write_bulk_string(&mut self, data: &'d [u8]) {
        let mut num = itoa::Buffer::new();
        let digits = num.format(data.len()).as_bytes();

        let dest = self.reserve_piece(digits.len() + 3);
        dest[0] = b'$';
        dest[1..1 + digits.len()].copy_from_slice(digits);
        dest[1 + digits.len()..].copy_from_slice(CRLF);
        self.commit_piece(digits.len() + 3);

        self.write_ref(data);
        self.write(CRLF);
    }

    /// Nested scope; it only delays, the outermost scope does the flush
    pub fn nested(&mut self) -> ReplyScope<'_, 'd> {
        self.rb.scope_depth += 1;
        ReplyScope {
            rb: &mut *self.rb,
            outermost: false,
            finished: false,
            _data: PhantomData,
        }
    }

    /// Close the scope and report the outcome of the flush
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.outermost {
            self.rb.finish_scope()
        } else {
            self.rb.scope_depth = self.rb.scope_depth.saturating_sub(1);
            self.rb.check()
        }
    }
}

impl Drop for ReplyScope<'_, '_> {
    fn drop(&mut self) {
        if !self.finished {
            // Errors stay sticky on the builder
            let _ = self.close();
        }
    }
}
