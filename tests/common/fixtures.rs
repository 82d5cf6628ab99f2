//! NZB documents and yEnc bodies generated on the fly

use std::fmt::Write as _;

/// One `<file>` entry of a generated NZB
pub struct NzbFile {
    /// Output name placed in quotes inside the subject
    pub name: String,
    /// Candidate groups in preference order
    pub groups: Vec<String>,
    /// (number, declared bytes, message-id)
    pub segments: Vec<(u32, u64, String)>,
}

impl NzbFile {
    pub fn new(name: &str, groups: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, number: u32, bytes: u64, message_id: &str) -> Self {
        self.segments.push((number, bytes, message_id.to_string()));
        self
    }
}

/// Render an NZB 1.1 document for `files`
pub fn nzb_document(files: &[NzbFile]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="title">Generated</meta>
  </head>
"#,
    );

    let count = files.len();
    for (i, file) in files.iter().enumerate() {
        writeln!(
            xml,
            r#"  <file poster="tester@example.com" date="1700000000" subject='Generated [{}/{}] - "{}" yEnc (1/{})'>"#,
            i + 1,
            count,
            file.name,
            file.segments.len()
        )
        .unwrap();
        xml.push_str("    <groups>\n");
        for group in &file.groups {
            writeln!(xml, "      <group>{group}</group>").unwrap();
        }
        xml.push_str("    </groups>\n    <segments>\n");
        for (number, bytes, id) in &file.segments {
            writeln!(
                xml,
                r#"      <segment bytes="{bytes}" number="{number}">{id}</segment>"#
            )
            .unwrap();
        }
        xml.push_str("    </segments>\n  </file>\n");
    }
    xml.push_str("</nzb>\n");
    xml
}

/// Deterministic test payload that hits every byte value, including the
/// ones yEnc must escape
pub fn sample_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// yEnc-encode `data` into CRLF-terminated lines of about 128 characters
pub fn yenc_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut column = 0;
    for &byte in data {
        let encoded = byte.wrapping_add(42);
        if matches!(encoded, 0x00 | b'\n' | b'\r' | b'=') {
            out.push(b'=');
            out.push(encoded.wrapping_add(64));
            column += 2;
        } else {
            out.push(encoded);
            column += 1;
        }
        if column >= 128 {
            out.extend_from_slice(b"\r\n");
            column = 0;
        }
    }
    if column > 0 {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Single-part article body with a `crc32` trailer
pub fn yenc_single(name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!("=ybegin line=128 size={} name={}\r\n", data.len(), name).into_bytes();
    body.extend(yenc_encode(data));
    body.extend(
        format!(
            "=yend size={} crc32={:08x}\r\n",
            data.len(),
            crc32fast::hash(data)
        )
        .into_bytes(),
    );
    body
}

/// Split `data` into `parts` multipart article bodies with `pcrc32` trailers
pub fn yenc_multipart(name: &str, data: &[u8], parts: usize) -> Vec<Vec<u8>> {
    let chunk = data.len().div_ceil(parts);
    data.chunks(chunk)
        .enumerate()
        .map(|(i, piece)| {
            let begin = i * chunk;
            let mut body = format!(
                "=ybegin part={} total={} line=128 size={} name={}\r\n=ypart begin={} end={}\r\n",
                i + 1,
                parts,
                data.len(),
                name,
                begin + 1,
                begin + piece.len()
            )
            .into_bytes();
            body.extend(yenc_encode(piece));
            body.extend(
                format!(
                    "=yend size={} part={} pcrc32={:08x}\r\n",
                    piece.len(),
                    i + 1,
                    crc32fast::hash(piece)
                )
                .into_bytes(),
            );
            body
        })
        .collect()
}
