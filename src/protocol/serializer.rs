use crate::error::{Error, Result};
use crate::io::Sink;
use std::io::{self, IoSlice};
use tracing::{debug, trace};

const CRLF: &[u8] = b"\r\n";

/// Encodes outgoing requests when this process acts as a RESP client,
/// e.g. when forwarding commands to another node.
///
/// Writes go straight to the sink; there is no buffering. The first sink
/// failure is kept and every later request is rejected.
pub struct ReqSerializer {
    sink: Box<dyn Sink + Send>,
    ec: Option<io::ErrorKind>,
}

impl ReqSerializer {
    pub fn new(sink: impl Sink + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            ec: None,
        }
    }

    /// Send an inline command: `PING`, `SET key value`
    pub fn send_command(&mut self, line: &str) -> Result<()> {
        trace!(command = line, "sending inline command");
        self.write(&[IoSlice::new(line.as_bytes()), IoSlice::new(CRLF)])
    }

    /// Send a command as a RESP array of bulk strings
    pub fn send_args<I>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: AsRef<[u8]>,
    {
        let args = args.into_iter();
        let mut num = itoa::Buffer::new();
        let mut out = Vec::with_capacity(64);
        out.push(b'*');
        out.extend_from_slice(num.format(args.len()).as_bytes());
        out.extend_from_slice(CRLF);
        for arg in args {
            let arg = arg.as_ref();
            out.push(b'$');
            out.extend_from_slice(num.format(arg.len()).as_bytes());
            out.extend_from_slice(CRLF);
            out.extend_from_slice(arg);
            out.extend_from_slice(CRLF);
        }
        self.write(&[IoSlice::new(&out)])
    }

    pub fn ec(&self) -> Option<io::ErrorKind> {
        self.ec
    }

    fn write(&mut self, bufs: &[IoSlice<'_>]) -> Result<()> {
        if let Some(kind) = self.ec {
            return Err(Error::SinkFailed(kind));
        }
        self.sink.write_vectored_all(bufs).map_err(|e| {
            debug!("request write failed: {}", e);
            self.ec = Some(e.kind());
            Error::Io(e)
        })
    }
}
