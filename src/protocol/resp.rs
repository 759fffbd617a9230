use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use memchr::memchr;
use std::str;

/// Incremental RESP2/RESP3 reply decoder for the client role
pub struct RespReader {
    buffer: BytesMut,
    position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(Bytes),
    Error(String),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<RespFrame>>),
    Null,
    Boolean(bool),
    Double(f64),
    Verbatim { format: String, data: Bytes },
    Map(Vec<(RespFrame, RespFrame)>),
    Set(Vec<RespFrame>),
    Push(Vec<RespFrame>),
}

type Parsed = Option<(RespFrame, usize)>;

impl RespReader {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            position: 0,
        }
    }

    /// Feed data into the reader
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete frame, `None` if more data is needed
    pub fn parse_next(&mut self) -> Result<Option<RespFrame>> {
        if self.position >= self.buffer.len() {
            return Ok(None);
        }

        let remaining = &self.buffer[self.position..];
        match parse_value(remaining)? {
            Some((frame, consumed)) => {
                self.position += consumed;

                // Compact buffer if needed
                if self.position > self.buffer.len() / 2 {
                    let _ = self.buffer.split_to(self.position);
                    self.position = 0;
                }

                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Decode every complete frame in `data`; trailing partial input is an error
    pub fn parse_all(data: &[u8]) -> Result<Vec<RespFrame>> {
        let mut reader = Self::new();
        reader.feed(data);
        let mut frames = Vec::new();
        while let Some(frame) = reader.parse_next()? {
            frames.push(frame);
        }
        if reader.position < reader.buffer.len() {
            return Err(Error::Protocol("incomplete frame".to_string()));
        }
        Ok(frames)
    }
}

impl Default for RespReader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_value(buf: &[u8]) -> Result<Parsed> {
    let Some(&marker) = buf.first() else {
        return Ok(None);
    };

    match marker {
        b'+' => parse_line(buf, |line| {
            Ok(RespFrame::SimpleString(Bytes::copy_from_slice(line)))
        }),
        b'-' => parse_line(buf, |line| {
            let msg = str::from_utf8(line).map_err(|_| protocol("invalid UTF-8 in error"))?;
            Ok(RespFrame::Error(msg.to_string()))
        }),
        b':' => parse_line(buf, |line| Ok(RespFrame::Integer(parse_int(line)?))),
        b'_' => parse_line(buf, |_| Ok(RespFrame::Null)),
        b'#' => parse_line(buf, |line| match line {
            b"t" => Ok(RespFrame::Boolean(true)),
            b"f" => Ok(RespFrame::Boolean(false)),
            _ => Err(protocol("invalid boolean")),
        }),
        b',' => parse_line(buf, |line| Ok(RespFrame::Double(parse_double(line)?))),
        b'$' => parse_blob(
            buf,
            |data| RespFrame::BulkString(Some(data)),
            Some(RespFrame::BulkString(None)),
        ),
        b'=' => parse_blob(buf, verbatim, None),
        b'*' => parse_aggregate(
            buf,
            1,
            |items| RespFrame::Array(Some(items)),
            Some(RespFrame::Array(None)),
        ),
        b'~' => parse_aggregate(buf, 1, RespFrame::Set, None),
        b'>' => parse_aggregate(buf, 1, RespFrame::Push, None),
        b'%' => parse_aggregate(buf, 2, pairs, None),
        other => Err(protocol(&format!("invalid RESP type: {}", other as char))),
    }
}

/// Single-line frame: marker, payload, CRLF
fn parse_line(buf: &[u8], build: impl FnOnce(&[u8]) -> Result<RespFrame>) -> Result<Parsed> {
    match find_crlf(buf) {
        Some(end) => Ok(Some((build(&buf[1..end])?, end + 2))),
        None => Ok(None),
    }
}

/// Length-prefixed frame: $6\r\nfoobar\r\n, $-1\r\n for null
fn parse_blob(
    buf: &[u8],
    build: impl FnOnce(Bytes) -> RespFrame,
    null: Option<RespFrame>,
) -> Result<Parsed> {
    let Some(len_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let len = parse_int(&buf[1..len_end])?;
    if len < 0 {
        return null
            .map(|frame| Some((frame, len_end + 2)))
            .ok_or_else(|| protocol("negative length"));
    }

    let data_start = len_end + 2;
    let data_end = data_start + len as usize;
    if buf.len() < data_end + 2 {
        return Ok(None);
    }
    if &buf[data_end..data_end + 2] != b"\r\n" {
        return Err(protocol("missing CRLF after bulk string"));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
    Ok(Some((build(data), data_end + 2)))
}

/// Counted aggregate; `per_entry` is 2 for maps
fn parse_aggregate(
    buf: &[u8],
    per_entry: usize,
    build: impl FnOnce(Vec<RespFrame>) -> RespFrame,
    null: Option<RespFrame>,
) -> Result<Parsed> {
    let Some(len_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let len = parse_int(&buf[1..len_end])?;
    if len < 0 {
        return null
            .map(|frame| Some((frame, len_end + 2)))
            .ok_or_else(|| protocol("negative length"));
    }

    let count = len as usize * per_entry;
    let mut elements = Vec::with_capacity(count.min(1024));
    let mut pos = len_end + 2;
    for _ in 0..count {
        match parse_value(&buf[pos..])? {
            Some((value, consumed)) => {
                elements.push(value);
                pos += consumed;
            }
            None => return Ok(None), // Need more data
        }
    }

    Ok(Some((build(elements), pos)))
}

fn verbatim(data: Bytes) -> RespFrame {
    if data.len() >= 4 && data[3] == b':' {
        RespFrame::Verbatim {
            format: String::from_utf8_lossy(&data[..3]).into_owned(),
            data: data.slice(4..),
        }
    } else {
        RespFrame::Verbatim {
            format: String::new(),
            data,
        }
    }
}

fn pairs(items: Vec<RespFrame>) -> RespFrame {
    let mut iter = items.into_iter();
    let mut out = Vec::with_capacity(iter.len() / 2);
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        out.push((k, v));
    }
    RespFrame::Map(out)
}

fn parse_int(line: &[u8]) -> Result<i64> {
    let s = str::from_utf8(line).map_err(|_| protocol("invalid UTF-8 in integer"))?;
    s.parse::<i64>()
        .map_err(|_| protocol(&format!("invalid integer: {}", s)))
}

fn parse_double(line: &[u8]) -> Result<f64> {
    match line {
        b"inf" => Ok(f64::INFINITY),
        b"-inf" => Ok(f64::NEG_INFINITY),
        b"nan" => Ok(f64::NAN),
        _ => {
            let s = str::from_utf8(line).map_err(|_| protocol("invalid UTF-8 in double"))?;
            s.parse::<f64>()
                .map_err(|_| protocol(&format!("invalid double: {}", s)))
        }
    }
}

fn protocol(msg: &str) -> Error {
    Error::Protocol(msg.to_string())
}

/// Position of the first CRLF in buffer
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while let Some(cr) = memchr(b'\r', &buf[pos..]) {
        let cr = pos + cr;
        if buf.get(cr + 1) == Some(&b'\n') {
            return Some(cr);
        }
        pos = cr + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp3_frames() {
        let frames = RespReader::parse_all(
            b"%1\r\n+k\r\n,1.5\r\n~2\r\n#t\r\n_\r\n>1\r\n:7\r\n=8\r\ntxt:abcd\r\n",
        )
        .unwrap();
        assert_eq!(
            frames,
            vec![
                RespFrame::Map(vec![(
                    RespFrame::SimpleString(Bytes::from_static(b"k")),
                    RespFrame::Double(1.5)
                )]),
                RespFrame::Set(vec![RespFrame::Boolean(true), RespFrame::Null]),
                RespFrame::Push(vec![RespFrame::Integer(7)]),
                RespFrame::Verbatim {
                    format: "txt".into(),
                    data: Bytes::from_static(b"abcd")
                },
            ]
        );
    }

    #[test]
    fn test_incremental_feed() {
        let mut reader = RespReader::new();
        reader.feed(b"*2\r\n$3\r\nfoo\r");
        assert_eq!(reader.parse_next().unwrap(), None);
        reader.feed(b"\n$-1\r\n");
        assert_eq!(
            reader.parse_next().unwrap(),
            Some(RespFrame::Array(Some(vec![
                RespFrame::BulkString(Some(Bytes::from_static(b"foo"))),
                RespFrame::BulkString(None),
            ])))
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(RespReader::parse_all(b"?oops\r\n").is_err());
        assert!(RespReader::parse_all(b"$3\r\nab").is_err());
    }
}
