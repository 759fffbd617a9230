use crate::config::ReplyConfig;
use crate::io::Sink;
use crate::reply::builder::{ReplyBuilder, SinkReplyBuilder};
use crate::reply::mget::MGetResponse;
use crate::reply::status::{CLIENT_ERR_TYPE, PROTOCOL_ERR_TYPE, SYNTAX_ERR_TYPE};
use crate::stats;

const CRLF: &[u8] = b"\r\n";

/// Memcached text protocol encoder
pub struct McReplyBuilder {
    core: SinkReplyBuilder,
    noreply: bool,
}

impl McReplyBuilder {
    pub fn new(sink: impl Sink + Send + 'static) -> Self {
        Self::with_config(sink, &ReplyConfig::default())
    }

    pub fn with_config(sink: impl Sink + Send + 'static, config: &ReplyConfig) -> Self {
        Self {
            core: SinkReplyBuilder::with_config(sink, config),
            noreply: false,
        }
    }

    /// Suppress output for the current command. Replies are still counted.
    pub fn set_noreply(&mut self, noreply: bool) {
        self.noreply = noreply;
    }

    pub fn no_reply(&self) -> bool {
        self.noreply
    }

    pub fn send_client_error(&mut self, msg: &str) {
        stats::record_error(CLIENT_ERR_TYPE);
        self.send_line(&[b"CLIENT_ERROR ", msg.as_bytes(), CRLF]);
    }

    pub fn send_not_found(&mut self) {
        self.send_line(&[b"NOT_FOUND\r\n"]);
    }

    fn send_line(&mut self, parts: &[&[u8]]) {
        if self.noreply {
            self.core.skip_parts(parts);
        } else {
            self.core.send_parts(parts);
        }
    }
}

impl ReplyBuilder for McReplyBuilder {
    fn core(&self) -> &SinkReplyBuilder {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SinkReplyBuilder {
        &mut self.core
    }

    /// `ERROR` for an empty message, `CLIENT_ERROR` for request problems,
    /// `SERVER_ERROR` for everything else
    fn send_error(&mut self, msg: &str, kind: &str) {
        if msg.is_empty() {
            stats::record_error(if kind.is_empty() { "error" } else { kind });
            return self.send_line(&[b"ERROR\r\n"]);
        }

        stats::record_error(if kind.is_empty() { msg } else { kind });
        if !self.noreply {
            self.core.record_error(msg);
        }

        // Redis style "-CODE" prefixes have no meaning here
        let msg = msg.trim_start_matches('-');
        let class: &[u8] = match kind {
            SYNTAX_ERR_TYPE | PROTOCOL_ERR_TYPE | CLIENT_ERR_TYPE => b"CLIENT_ERROR ",
            _ => b"SERVER_ERROR ",
        };
        self.send_line(&[class, msg.as_bytes(), CRLF]);
    }

    fn send_stored(&mut self) {
        self.send_line(&[b"STORED\r\n"]);
    }

    fn send_set_skipped(&mut self) {
        self.send_line(&[b"NOT_STORED\r\n"]);
    }

    /// `VALUE <key> <flags> <bytes>[ <cas>]` blocks for the keys that were
    /// found, then `END`. Misses are omitted.
    fn send_mget_response(&mut self, resp: MGetResponse) {
        let mut headers = Vec::with_capacity(resp.len() * 48);
        let mut ends = Vec::with_capacity(resp.len());
        let mut num = itoa::Buffer::new();
        for (get, value) in resp.iter().flatten() {
            headers.extend_from_slice(b"VALUE ");
            headers.extend_from_slice(get.key.as_bytes());
            headers.push(b' ');
            headers.extend_from_slice(num.format(get.mc_flag).as_bytes());
            headers.push(b' ');
            headers.extend_from_slice(num.format(value.len()).as_bytes());
            if get.mc_ver != 0 {
                headers.push(b' ');
                headers.extend_from_slice(num.format(get.mc_ver).as_bytes());
            }
            headers.extend_from_slice(CRLF);
            ends.push(headers.len());
        }

        let mut parts: Vec<&[u8]> = Vec::with_capacity(ends.len() * 3 + 1);
        let mut start = 0;
        for ((_, value), end) in resp.iter().flatten().zip(&ends) {
            parts.push(&headers[start..*end]);
            parts.push(value);
            parts.push(CRLF);
            start = *end;
        }
        parts.push(b"END\r\n");

        self.send_line(&parts);
    }

    fn send_long(&mut self, val: i64) {
        let mut num = itoa::Buffer::new();
        self.send_line(&[num.format(val).as_bytes(), CRLF]);
    }

    fn send_simple_string(&mut self, s: &str) {
        self.send_line(&[s.as_bytes(), CRLF]);
    }

    fn send_protocol_error(&mut self, msg: &str) {
        self.send_client_error(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemSink;
    use crate::reply::status::OpStatus;

    fn builder() -> (McReplyBuilder, MemSink) {
        let sink = MemSink::new();
        (McReplyBuilder::new(sink.clone()), sink)
    }

    #[test]
    fn test_acknowledgements() {
        let (mut rb, sink) = builder();
        rb.send_stored();
        rb.send_set_skipped();
        rb.send_not_found();
        rb.send_long(17);
        rb.send_simple_string("VERSION 1.6.21");
        assert_eq!(
            sink.contents(),
            b"STORED\r\nNOT_STORED\r\nNOT_FOUND\r\n17\r\nVERSION 1.6.21\r\n"
        );
    }

    #[test]
    fn test_error_classes() {
        let (mut rb, sink) = builder();
        rb.send_error("", "");
        rb.send_error("bad data chunk", SYNTAX_ERR_TYPE);
        rb.send_status(OpStatus::OutOfMemory);
        rb.send_status(OpStatus::WrongType);
        rb.send_protocol_error("line too long");
        assert_eq!(
            sink.contents(),
            b"ERROR\r\n\
              CLIENT_ERROR bad data chunk\r\n\
              SERVER_ERROR Out of memory\r\n\
              SERVER_ERROR WRONGTYPE Operation against a key holding the wrong kind of value\r\n\
              CLIENT_ERROR line too long\r\n"
                .as_slice()
        );
    }

    #[test]
    fn test_mget_with_cas() {
        let (mut rb, sink) = builder();
        let mut resp = MGetResponse::new(2);
        let slot = resp.insert(0, "foo", b"bar").unwrap();
        slot.mc_flag = 5;
        slot.mc_ver = 99;
        rb.send_mget_response(resp);
        assert_eq!(
            sink.writes(),
            vec![b"VALUE foo 5 3 99\r\nbar\r\nEND\r\n".to_vec()]
        );
    }

    #[test]
    fn test_noreply_suppresses_output() {
        let (mut rb, sink) = builder();
        rb.set_noreply(true);
        rb.expect_reply();
        rb.send_stored();
        assert!(rb.has_replied());
        rb.send_error("oops", "");
        assert_eq!(sink.write_count(), 0);

        rb.set_noreply(false);
        rb.send_stored();
        assert_eq!(sink.contents(), b"STORED\r\n");
    }
}
