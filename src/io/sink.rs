use parking_lot::Mutex;
use std::io::{self, IoSlice, Write};
use std::sync::Arc;

/// Destination of encoded reply bytes.
///
/// A single call either delivers every byte of `bufs` in order or returns an
/// error. Implementations may be a raw socket, a TLS stream or a test double.
pub trait Sink {
    /// Write all slices as one logical write
    fn write_vectored_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()>;

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_vectored_all(&[IoSlice::new(buf)])
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write_vectored_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        (**self).write_vectored_all(bufs)
    }
}

/// Adapts any [`Write`] stream (TcpStream, TLS stream, stdout) into a [`Sink`]
pub struct StreamSink<W> {
    inner: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Sink for StreamSink<W> {
    fn write_vectored_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        let mut owned: Vec<IoSlice<'_>> = bufs.to_vec();
        let mut slices = &mut owned[..];
        // Drop leading empty slices, a zero-length write would look like WriteZero
        IoSlice::advance_slices(&mut slices, 0);

        // Handle partial writes until every slice is drained
        while !slices.is_empty() {
            match self.inner.write_vectored(slices) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole reply",
                    ))
                }
                Ok(n) => IoSlice::advance_slices(&mut slices, n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemSinkState {
    writes: Vec<Vec<u8>>,
    fail_with: Option<io::ErrorKind>,
}

/// In-memory sink that records every physical write.
///
/// Clones share the same recording, so a test can keep one handle while the
/// builder owns another.
#[derive(Debug, Clone, Default)]
pub struct MemSink {
    state: Arc<Mutex<MemSinkState>>,
}

impl MemSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with `kind`
    pub fn fail_with(&self, kind: io::ErrorKind) {
        self.state.lock().fail_with = Some(kind);
    }

    pub fn recover(&self) {
        self.state.lock().fail_with = None;
    }

    /// Physical writes received so far, one entry per write call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Concatenation of everything written
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().writes.concat()
    }

    pub fn clear(&self) {
        self.state.lock().writes.clear();
    }
}

impl Sink for MemSink {
    fn write_vectored_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fail_with {
            return Err(io::Error::new(kind, "injected sink failure"));
        }

        let total = bufs.iter().map(|b| b.len()).sum();
        let mut data = Vec::with_capacity(total);
        for buf in bufs {
            data.extend_from_slice(buf);
        }
        state.writes.push(data);
        Ok(())
    }
}
