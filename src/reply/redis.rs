use crate::config::ReplyConfig;
use crate::io::Sink;
use crate::reply::builder::{ReplyAggregator, ReplyBuilder, SinkReplyBuilder};
use crate::reply::mget::MGetResponse;
use crate::reply::status::{PROTOCOL_ERR_TYPE, SYNTAX_ERR, SYNTAX_ERR_TYPE};
use crate::stats;
use std::ops::Deref;

const CRLF: &[u8] = b"\r\n";
const NULL_RESP2: &[u8] = b"$-1\r\n";
const NULL_RESP3: &[u8] = b"_\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionType {
    Array,
    Set,
    Map,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerbatimFormat {
    #[default]
    Txt,
    Markdown,
}

impl VerbatimFormat {
    fn tag(self) -> &'static [u8] {
        match self {
            VerbatimFormat::Txt => b"txt:",
            VerbatimFormat::Markdown => b"mkd:",
        }
    }
}

/// Formats a double into a token that can be embedded in a reply as is.
///
/// Uses the shortest representation that parses back to the same value,
/// independent of locale. Integral values drop the fractional part and the
/// non-finite values map to `inf`, `-inf` and `nan`.
pub fn format_double(val: f64, buf: &mut ryu::Buffer) -> &str {
    if val.is_nan() {
        return "nan";
    }
    if val.is_infinite() {
        return if val > 0.0 { "inf" } else { "-inf" };
    }
    let s = buf.format_finite(val);
    s.strip_suffix(".0").unwrap_or(s)
}

// Prefix, 40 chars for i128::MIN, CRLF
const HEADER_CAP: usize = 43;

/// `<prefix><number>\r\n` on the stack
struct Header {
    buf: [u8; HEADER_CAP],
    len: usize,
}

impl Header {
    fn new<I: itoa::Integer>(prefix: u8, n: I) -> Self {
        let mut num = itoa::Buffer::new();
        let digits = num.format(n).as_bytes();

        let mut buf = [0u8; HEADER_CAP];
        buf[0] = prefix;
        buf[1..1 + digits.len()].copy_from_slice(digits);
        buf[1 + digits.len()..3 + digits.len()].copy_from_slice(CRLF);
        Self {
            buf,
            len: digits.len() + 3,
        }
    }
}

impl Deref for Header {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

fn push_header(out: &mut Vec<u8>, prefix: u8, n: usize) {
    out.extend_from_slice(&Header::new(prefix, n));
}

/// RESP2/RESP3 reply encoder
pub struct RedisReplyBuilder {
    core: SinkReplyBuilder,
    is_resp3: bool,
}

impl RedisReplyBuilder {
    pub fn new(sink: impl Sink + Send + 'static) -> Self {
        Self::with_config(sink, &ReplyConfig::default())
    }

    pub fn with_config(sink: impl Sink + Send + 'static, config: &ReplyConfig) -> Self {
        Self {
            core: SinkReplyBuilder::with_config(sink, config),
            is_resp3: config.resp3,
        }
    }

    pub fn set_resp3(&mut self, is_resp3: bool) {
        self.is_resp3 = is_resp3;
    }

    pub fn is_resp3(&self) -> bool {
        self.is_resp3
    }

    fn null_token(&self) -> &'static [u8] {
        if self.is_resp3 {
            NULL_RESP3
        } else {
            NULL_RESP2
        }
    }

    /// Send *-1
    pub fn send_null_array(&mut self) {
        self.core.send_raw(b"*-1\r\n");
    }

    /// Send *0
    pub fn send_empty_array(&mut self) {
        self.start_array(0);
    }

    pub fn send_null(&mut self) {
        let null = self.null_token();
        self.core.send_raw(null);
    }

    pub fn send_bool(&mut self, val: bool) {
        let token: &[u8] = match (self.is_resp3, val) {
            (true, true) => b"#t\r\n",
            (true, false) => b"#f\r\n",
            (false, true) => b":1\r\n",
            (false, false) => b":0\r\n",
        };
        self.core.send_raw(token);
    }

    /// RESP3 double, or a bulk string holding the same token under RESP2
    pub fn send_double(&mut self, val: f64) {
        let mut buf = ryu::Buffer::new();
        let token = format_double(val, &mut buf);
        if self.is_resp3 {
            self.core.send_parts(&[b",", token.as_bytes(), CRLF]);
        } else {
            self.send_bulk_string(token);
        }
    }

    pub fn send_bulk_string(&mut self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        let header = Header::new(b'$', data.len());
        self.core.send_parts(&[&*header, data, CRLF]);
    }

    /// RESP3 verbatim string; plain bulk string under RESP2
    pub fn send_verbatim_string(&mut self, data: impl AsRef<[u8]>, format: VerbatimFormat) {
        let data = data.as_ref();
        if !self.is_resp3 {
            return self.send_bulk_string(data);
        }
        let header = Header::new(b'=', data.len() + 4);
        self.core.send_parts(&[&*header, format.tag(), data, CRLF]);
    }

    /// Array of simple strings
    pub fn send_simple_str_arr<I>(&mut self, arr: I)
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: AsRef<[u8]>,
    {
        let iter = arr.into_iter();
        let mut agg = ReplyAggregator::new(self);
        agg.start_array(iter.len());
        for item in iter {
            agg.core.send_parts(&[b"+", item.as_ref(), CRLF]);
        }
    }

    /// Collection of bulk strings. For MAP, `arr` holds keys and values
    /// interleaved.
    pub fn send_string_arr<I>(&mut self, arr: I, ty: CollectionType)
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: AsRef<[u8]>,
    {
        let iter = arr.into_iter();
        let len = iter.len();
        let header_len = if ty == CollectionType::Map {
            debug_assert!(len % 2 == 0, "map needs key/value pairs");
            len / 2
        } else {
            len
        };

        let mut agg = ReplyAggregator::new(self);
        agg.start_collection(header_len, ty);
        for item in iter {
            agg.send_bulk_string(item);
        }
    }

    /// Members with optional scores, as used by sorted-set ranges.
    ///
    /// RESP2 flattens member/score pairs into one array, RESP3 sends an array
    /// of `[member, score]` pairs with native doubles.
    pub fn send_scored_array(&mut self, arr: &[(String, f64)], with_scores: bool) {
        if !with_scores {
            return self.send_string_arr(arr.iter().map(|(m, _)| m), CollectionType::Array);
        }

        let mut agg = ReplyAggregator::new(self);
        if !agg.is_resp3 {
            let mut buf = ryu::Buffer::new();
            agg.start_array(arr.len() * 2);
            for (member, score) in arr {
                agg.send_bulk_string(member);
                agg.send_bulk_string(format_double(*score, &mut buf));
            }
            return;
        }

        agg.start_array(arr.len());
        for (member, score) in arr {
            agg.start_array(2);
            agg.send_bulk_string(member);
            agg.send_double(*score);
        }
    }

    pub fn start_array(&mut self, len: usize) {
        self.start_collection(len, CollectionType::Array);
    }

    /// Collection header. `len` counts pairs for MAP; RESP2 has no map type
    /// and flattens it to an array of `len * 2` elements.
    pub fn start_collection(&mut self, len: usize, ty: CollectionType) {
        let (prefix, len) = if self.is_resp3 {
            let prefix = match ty {
                CollectionType::Array => b'*',
                CollectionType::Set => b'~',
                CollectionType::Map => b'%',
                CollectionType::Push => b'>',
            };
            (prefix, len)
        } else if ty == CollectionType::Map {
            (b'*', len * 2)
        } else {
            (b'*', len)
        };
        let header = Header::new(prefix, len);
        self.core.send_raw(&header);
    }
}

impl ReplyBuilder for RedisReplyBuilder {
    fn core(&self) -> &SinkReplyBuilder {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SinkReplyBuilder {
        &mut self.core
    }

    fn send_error(&mut self, msg: &str, kind: &str) {
        let kind = match kind {
            "" if msg == SYNTAX_ERR => SYNTAX_ERR_TYPE,
            "" => msg,
            kind => kind,
        };
        stats::record_error(kind);
        self.core.record_error(msg);

        if msg.starts_with('-') {
            self.core.send_parts(&[msg.as_bytes(), CRLF]);
        } else {
            self.core.send_parts(&[b"-ERR ", msg.as_bytes(), CRLF]);
        }
    }

    fn send_stored(&mut self) {
        self.send_ok();
    }

    fn send_set_skipped(&mut self) {
        self.send_null();
    }

    /// Array with one entry per requested key; misses stay in place as nulls.
    fn send_mget_response(&mut self, resp: MGetResponse) {
        let null = self.null_token();

        // Headers first, then values are referenced straight from the arena
        let mut headers = Vec::with_capacity(16 + resp.len() * 8);
        let mut ends = Vec::with_capacity(resp.len() + 1);
        push_header(&mut headers, b'*', resp.len());
        ends.push(headers.len());
        for slot in resp.iter() {
            match slot {
                Some((_, value)) => push_header(&mut headers, b'$', value.len()),
                None => headers.extend_from_slice(null),
            }
            ends.push(headers.len());
        }

        let mut parts: Vec<&[u8]> = Vec::with_capacity(resp.len() * 3 + 1);
        let mut run_start = 0;
        for (i, slot) in resp.iter().enumerate() {
            if let Some((_, value)) = slot {
                parts.push(&headers[run_start..ends[i + 1]]);
                parts.push(value);
                parts.push(CRLF);
                run_start = ends[i + 1];
            }
        }
        if run_start < headers.len() {
            parts.push(&headers[run_start..]);
        }

        self.core.send_parts(&parts);
    }

    fn send_long(&mut self, val: i64) {
        let header = Header::new(b':', val);
        self.core.send_raw(&header);
    }

    fn send_simple_string(&mut self, s: &str) {
        self.core.send_parts(&[b"+", s.as_bytes(), CRLF]);
    }

    fn send_protocol_error(&mut self, msg: &str) {
        self.send_error(&format!("-ERR Protocol error: {}", msg), PROTOCOL_ERR_TYPE);
    }
}
