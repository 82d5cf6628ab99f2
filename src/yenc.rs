//! yEnc codec: turns a staged article body into verified decoded bytes.
//!
//! A body looks like:
//!
//! ```text
//! =ybegin part=1 total=3 line=128 size=300 name=demo.bin
//! =ypart begin=1 end=100
//! <encoded lines>
//! =yend size=100 part=1 pcrc32=1a2b3c4d
//! ```
//!
//! Everything here is pure: no I/O, no shared state.

use crate::error::YencError;
use std::collections::HashMap;

const HEADER_SENTINEL: &[u8] = b"=ybegin";
const TRAILER_SENTINEL: &[u8] = b"=yend";
const ESCAPE: u8 = b'=';

/// A parsed `=y<kind> key=value ...` line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordLine {
    /// Line kind without the `=y` prefix (`begin`, `part`, `end`)
    pub kind: String,
    /// Keyword values; `name` always extends to the end of the line
    pub fields: HashMap<String, String>,
}

impl KeywordLine {
    /// Look up a keyword value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Parse a yEnc keyword line such as `=ybegin line=128 size=42 name=a b.bin`.
///
/// Returns `None` when the line is not a keyword line. The `name` keyword
/// takes the rest of the line verbatim, so filenames may contain spaces or `=`.
pub fn parse_keyword_line(line: &str) -> Option<KeywordLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    let rest = line.strip_prefix("=y")?;

    let (kind, mut rest) = match rest.split_once(' ') {
        Some((kind, rest)) => (kind, rest),
        None => (rest, ""),
    };
    if kind.is_empty() {
        return None;
    }

    let mut fields = HashMap::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(name) = rest.strip_prefix("name=") {
            fields.insert("name".to_string(), name.to_string());
            break;
        }
        let (token, tail) = rest.split_once(' ').unwrap_or((rest, ""));
        if let Some((key, value)) = token.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
        rest = tail;
    }

    Some(KeywordLine {
        kind: kind.to_string(),
        fields,
    })
}

/// Metadata from the `=ybegin` line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YencHeader {
    /// True output filename
    pub name: String,
    /// 1-based part index; present only for multipart files
    pub part: Option<u32>,
    /// Total number of parts
    pub total: Option<u32>,
    /// Size of the whole file in bytes
    pub size: Option<u64>,
}

impl YencHeader {
    fn from_line(line: &KeywordLine) -> Result<Self, YencError> {
        let name = line
            .get("name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| YencError::Malformed("header has no name".to_string()))?;
        Ok(Self {
            name: name.to_string(),
            part: parse_number(line, "part")?,
            total: parse_number(line, "total")?,
            size: parse_number(line, "size")?,
        })
    }

    /// Whether the header declares a part index
    pub fn is_multipart(&self) -> bool {
        self.part.is_some()
    }
}

/// Metadata from the `=yend` line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YencTrailer {
    /// Size of this part in bytes
    pub size: Option<u64>,
    /// Checksum of the whole file (single-part)
    pub crc32: Option<u32>,
    /// Checksum of this part (multipart)
    pub pcrc32: Option<u32>,
}

impl YencTrailer {
    fn from_line(line: &KeywordLine) -> Result<Self, YencError> {
        Ok(Self {
            size: parse_number(line, "size")?,
            crc32: parse_crc(line, "crc32")?,
            pcrc32: parse_crc(line, "pcrc32")?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(line: &KeywordLine, key: &str) -> Result<Option<T>, YencError> {
    line.get(key)
        .map(|v| {
            v.trim().parse::<T>().map_err(|_| {
                YencError::Malformed(format!("invalid {key} value {v:?} on =y{} line", line.kind))
            })
        })
        .transpose()
}

fn parse_crc(line: &KeywordLine, key: &str) -> Result<Option<u32>, YencError> {
    line.get(key)
        .map(|v| {
            let hex = v.trim();
            let hex = hex
                .strip_prefix("0x")
                .or_else(|| hex.strip_prefix("0X"))
                .unwrap_or(hex);
            u32::from_str_radix(hex, 16)
                .map_err(|_| YencError::Malformed(format!("invalid {key} value {v:?}")))
        })
        .transpose()
}

/// Whether the decoded bytes were checked against the trailer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Trailer checksum present and equal to the computed CRC32
    Verified(u32),
    /// Trailer carried no checksum for this kind of segment; accepted as-is
    Unchecked,
}

/// Decoded payload of one segment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPart {
    /// Decoded bytes
    pub data: Vec<u8>,
    /// Output filename from the header
    pub name: String,
    /// Part index (1 for single-part files)
    pub part: u32,
    /// Whether the header declared a part index
    pub multipart: bool,
    /// Checksum verification result
    pub checksum: ChecksumStatus,
}

/// Decode yEnc payload bytes.
///
/// CR and LF are line structure and carry no data. An `=` escapes exactly
/// the next payload byte, which is shifted back by 64 before the base
/// transform (subtract 42, modulo 256).
pub fn decode(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len());
    let mut escaped = false;

    for &c in src {
        if c == b'\r' || c == b'\n' {
            continue;
        }
        if c == ESCAPE && !escaped {
            escaped = true;
            continue;
        }
        let c = if escaped {
            escaped = false;
            c.wrapping_sub(64)
        } else {
            c
        };
        dst.push(c.wrapping_sub(42));
    }
    dst
}

/// Split `body` into lines, each keeping its terminator.
fn lines(body: &[u8]) -> impl Iterator<Item = &[u8]> {
    body.split_inclusive(|&b| b == b'\n')
}

fn keyword_line(raw: &[u8]) -> Result<KeywordLine, YencError> {
    let text = String::from_utf8_lossy(raw);
    parse_keyword_line(&text)
        .ok_or_else(|| YencError::Malformed(format!("unparsable keyword line {:?}", text.trim_end())))
}

/// Decode and verify one staged article body.
///
/// The `=ybegin` header is required; if it declares a `part`, the following
/// line (the `=ypart` range) is skipped without being interpreted. Everything
/// up to the `=yend` trailer is payload. The part CRC (`pcrc32`) is checked
/// for multipart bodies and `crc32` otherwise; when the relevant key is
/// absent the part is accepted unchecked.
pub fn decode_segment(body: &[u8]) -> Result<DecodedPart, YencError> {
    let mut iter = lines(body);

    let header_line = iter
        .by_ref()
        .find(|line| line.starts_with(HEADER_SENTINEL))
        .ok_or_else(|| YencError::Malformed("no =ybegin header".to_string()))?;
    let header = YencHeader::from_line(&keyword_line(header_line)?)?;

    if header.is_multipart() {
        iter.next();
    }

    let mut payload = Vec::with_capacity(body.len());
    let mut trailer = None;
    for line in iter {
        if line.starts_with(TRAILER_SENTINEL) {
            trailer = Some(YencTrailer::from_line(&keyword_line(line)?)?);
            break;
        }
        payload.extend_from_slice(line);
    }
    let trailer = trailer.ok_or_else(|| YencError::Malformed("no =yend trailer".to_string()))?;

    let data = decode(&payload);
    let actual = crc32fast::hash(&data);
    let expected = if header.is_multipart() {
        trailer.pcrc32
    } else {
        trailer.crc32
    };

    let checksum = match expected {
        Some(expected) if expected != actual => {
            return Err(YencError::ChecksumMismatch { expected, actual });
        }
        Some(_) => ChecksumStatus::Verified(actual),
        None => ChecksumStatus::Unchecked,
    };

    Ok(DecodedPart {
        data,
        part: header.part.unwrap_or(1),
        multipart: header.is_multipart(),
        name: header.name,
        checksum,
    })
}
