use std::borrow::Cow;

pub const SYNTAX_ERR: &str = "syntax error";
pub const WRONG_TYPE_ERR: &str =
    "-WRONGTYPE Operation against a key holding the wrong kind of value";
pub const KEY_NOT_FOUND_ERR: &str = "no such key";
pub const INVALID_INT_ERR: &str = "value is not an integer or out of range";
pub const INVALID_FLOAT_ERR: &str = "value is not a valid float";
pub const INDEX_OUT_OF_RANGE_ERR: &str = "index out of range";
pub const OUT_OF_MEMORY_ERR: &str = "Out of memory";
pub const TIMED_OUT_ERR: &str = "timed out";
pub const BUSY_GROUP_ERR: &str = "-BUSYGROUP Consumer Group name already exists";
pub const INVALID_NUMERIC_RESULT_ERR: &str = "result is not a number";
pub const CANCELLED_ERR: &str = "Cancelled";
pub const AT_LEAST_ONE_KEY_ERR: &str = "at least 1 input key is needed for this command";
pub const INVALID_VALUE_ERR: &str = "invalid value";

/// Error kinds used as stats keys and for protocol specific framing
pub const SYNTAX_ERR_TYPE: &str = "syntax_error";
pub const PROTOCOL_ERR_TYPE: &str = "protocol_error";
pub const CLIENT_ERR_TYPE: &str = "client_error";
pub const WRONG_TYPE_ERR_TYPE: &str = "wrong_type";
pub const OUT_OF_MEMORY_ERR_TYPE: &str = "out_of_memory";

/// Outcome of a storage operation as reported by the command layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Ok,
    KeyExists,
    KeyNotFound,
    Skipped,
    InvalidValue,
    OutOfRange,
    WrongType,
    TimedOut,
    OutOfMemory,
    InvalidFloat,
    InvalidInt,
    SyntaxErr,
    BusyGroup,
    InvalidNumericResult,
    Cancelled,
    AtLeastOneKey,
}

impl OpStatus {
    /// Message and kind for a failed status. `None` for `Ok`.
    pub fn error_message(self) -> Option<(&'static str, &'static str)> {
        let pair = match self {
            OpStatus::Ok => return None,
            OpStatus::KeyExists => ("key already exists", ""),
            OpStatus::KeyNotFound => (KEY_NOT_FOUND_ERR, ""),
            OpStatus::Skipped => ("operation skipped", ""),
            OpStatus::InvalidValue => (INVALID_VALUE_ERR, ""),
            OpStatus::OutOfRange => (INDEX_OUT_OF_RANGE_ERR, ""),
            OpStatus::WrongType => (WRONG_TYPE_ERR, WRONG_TYPE_ERR_TYPE),
            OpStatus::TimedOut => (TIMED_OUT_ERR, ""),
            OpStatus::OutOfMemory => (OUT_OF_MEMORY_ERR, OUT_OF_MEMORY_ERR_TYPE),
            OpStatus::InvalidFloat => (INVALID_FLOAT_ERR, ""),
            OpStatus::InvalidInt => (INVALID_INT_ERR, ""),
            OpStatus::SyntaxErr => (SYNTAX_ERR, SYNTAX_ERR_TYPE),
            OpStatus::BusyGroup => (BUSY_GROUP_ERR, ""),
            OpStatus::InvalidNumericResult => (INVALID_NUMERIC_RESULT_ERR, ""),
            OpStatus::Cancelled => (CANCELLED_ERR, ""),
            OpStatus::AtLeastOneKey => (AT_LEAST_ONE_KEY_ERR, ""),
        };
        Some(pair)
    }
}

/// Structured application error: a message plus an optional kind tag.
///
/// An empty kind lets the encoder derive one from the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub message: Cow<'static, str>,
    pub kind: Cow<'static, str>,
    pub status: Option<OpStatus>,
}

impl ErrorReply {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            kind: Cow::Borrowed(""),
            status: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<Cow<'static, str>>) -> Self {
        self.kind = kind.into();
        self
    }
}

impl From<OpStatus> for ErrorReply {
    fn from(status: OpStatus) -> Self {
        let (message, kind) = status.error_message().unwrap_or(("", ""));
        Self {
            message: Cow::Borrowed(message),
            kind: Cow::Borrowed(kind),
            status: Some(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(OpStatus::Ok.error_message(), None);
        let reply = ErrorReply::from(OpStatus::SyntaxErr);
        assert_eq!(reply.message, SYNTAX_ERR);
        assert_eq!(reply.kind, SYNTAX_ERR_TYPE);
        assert_eq!(reply.status, Some(OpStatus::SyntaxErr));
    }
}
