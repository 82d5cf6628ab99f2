//! NNTP response parsing and classification.

use crate::error::NntpError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Response codes used by the client
pub mod codes {
    /// Service available, posting allowed
    pub const READY_POSTING: u16 = 200;
    /// Service available, posting prohibited
    pub const READY_NO_POSTING: u16 = 201;
    /// Connection closing
    pub const CLOSING: u16 = 205;
    /// Group selected
    pub const GROUP_SELECTED: u16 = 211;
    /// Body follows
    pub const BODY_FOLLOWS: u16 = 222;
    /// Authentication accepted
    pub const AUTH_ACCEPTED: u16 = 281;
    /// Password required
    pub const PASSWORD_REQUIRED: u16 = 381;
    /// Service temporarily unavailable
    pub const SERVICE_UNAVAILABLE: u16 = 400;
    /// No such newsgroup
    pub const NO_SUCH_GROUP: u16 = 411;
    /// No current article
    pub const NO_CURRENT_ARTICLE: u16 = 420;
    /// No article with that number
    pub const NO_SUCH_NUMBER: u16 = 423;
    /// No article with that message-id
    pub const NO_SUCH_ARTICLE: u16 = 430;
    /// Internal fault
    pub const INTERNAL_FAULT: u16 = 403;
    /// Authentication required
    pub const AUTH_REQUIRED: u16 = 480;
    /// Authentication failed
    pub const AUTH_FAILED: u16 = 481;
    /// Authentication commands out of sequence
    pub const AUTH_OUT_OF_SEQUENCE: u16 = 482;
    /// Permission denied / service permanently unavailable
    pub const ACCESS_DENIED: u16 = 502;
    /// Feature not supported / temporary failure
    pub const TEMPORARY_FAILURE: u16 = 503;
}

/// A parsed status line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    /// Three-digit response code
    pub code: u16,
    /// Text after the code
    pub message: String,
}

/// Parse `"211 1234 1 1234 alt.test"` into code and message
pub fn parse_status_line(line: &[u8]) -> Result<StatusLine, NntpError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);

    let (code, message) = match text.split_once(' ') {
        Some((code, message)) => (code, message),
        None => (text, ""),
    };

    let code = match code.parse::<u16>() {
        Ok(code) if code.to_string().len() == 3 => code,
        _ => {
            return Err(NntpError::Protocol {
                code: 0,
                message: format!("malformed status line: {text:?}"),
            });
        }
    };

    Ok(StatusLine {
        code,
        message: message.to_string(),
    })
}

/// Read a dot-terminated multi-line block, undoing dot-stuffing.
///
/// Line terminators are kept as delivered; the terminating `.` line is not
/// part of the result.
pub async fn read_dot_block<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before end of multi-line block",
            ));
        }

        let content = line
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(&line);
        if content == b"." {
            return Ok(body);
        }

        if line.starts_with(b"..") {
            body.extend_from_slice(&line[1..]);
        } else {
            body.extend_from_slice(&line);
        }
    }
}

/// Classify a non-222 reply to `BODY`
pub fn classify_body_failure(status: StatusLine, message_id: &str) -> NntpError {
    use codes::*;
    match status.code {
        NO_CURRENT_ARTICLE | NO_SUCH_NUMBER | NO_SUCH_ARTICLE => NntpError::NotFound {
            message_id: message_id.to_string(),
            code: status.code,
        },
        SERVICE_UNAVAILABLE | INTERNAL_FAULT | TEMPORARY_FAILURE => NntpError::Transient {
            code: status.code,
            message: status.message,
        },
        AUTH_REQUIRED | AUTH_FAILED | AUTH_OUT_OF_SEQUENCE => NntpError::Auth {
            code: status.code,
            message: status.message,
        },
        code => NntpError::Protocol {
            code,
            message: status.message,
        },
    }
}

/// Classify a non-211 reply to `GROUP`
pub fn classify_group_failure(status: StatusLine, group: &str) -> NntpError {
    use codes::*;
    match status.code {
        AUTH_REQUIRED | AUTH_FAILED => NntpError::Auth {
            code: status.code,
            message: status.message,
        },
        SERVICE_UNAVAILABLE | INTERNAL_FAULT | TEMPORARY_FAILURE => NntpError::Transient {
            code: status.code,
            message: status.message,
        },
        code => NntpError::Group {
            group: group.to_string(),
            code,
            message: status.message,
        },
    }
}

/// Classify a greeting that does not announce service
pub fn classify_greeting_failure(status: StatusLine) -> NntpError {
    match status.code {
        // Typically "too many connections": worth another attempt later
        codes::SERVICE_UNAVAILABLE => NntpError::Transient {
            code: status.code,
            message: status.message,
        },
        code => NntpError::Protocol {
            code,
            message: status.message,
        },
    }
}
