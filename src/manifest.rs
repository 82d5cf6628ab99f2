//! NZB manifest loading
//!
//! Turns an NZB document into the ordered list of [`FileDescriptor`]s the
//! downloader works on. Parsing and structural validation are done by
//! `nntp_rs`; this module derives output names and enforces the invariants
//! the scheduler relies on (at least one group, at least one segment, unique
//! segment numbers).

use crate::error::{Error, Result};
use crate::types::{FileDescriptor, SegmentRef};
use chrono::DateTime;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::debug;

/// A parsed manifest
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Files in manifest order
    pub files: Vec<FileDescriptor>,
}

impl Manifest {
    /// Sum of the declared sizes of every file
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.total_bytes).sum()
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the manifest lists no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Read and parse an NZB file
pub async fn load_nzb(path: &Path) -> Result<Manifest> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        Error::InvalidNzb(format!("failed to read {}: {}", path.display(), e))
    })?;
    let content = String::from_utf8(content)
        .map_err(|e| Error::InvalidNzb(format!("NZB content is not valid UTF-8: {}", e)))?;

    let manifest = parse_nzb_content(&content)?;
    debug!(
        path = %path.display(),
        files = manifest.len(),
        bytes = manifest.total_bytes(),
        "loaded NZB"
    );
    Ok(manifest)
}

/// Parse NZB XML into a [`Manifest`]
pub fn parse_nzb_content(content: &str) -> Result<Manifest> {
    let nzb = nntp_rs::parse_nzb(content)
        .map_err(|e| Error::InvalidNzb(format!("Failed to parse NZB: {}", e)))?;
    nzb.validate()
        .map_err(|e| Error::InvalidNzb(format!("NZB validation failed: {}", e)))?;

    let mut files = Vec::with_capacity(nzb.files.len());
    for file in &nzb.files {
        let name = parse_filename_from_subject(&file.subject);

        let groups: Vec<String> = file
            .groups
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if groups.is_empty() {
            return Err(Error::InvalidNzb(format!("{name}: no newsgroups listed")));
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::with_capacity(file.segments.len());
        for segment in &file.segments {
            let number = segment.number;
            if number == 0 || !seen.insert(number) {
                return Err(Error::InvalidNzb(format!(
                    "{name}: invalid or duplicate segment number {number}"
                )));
            }
            segments.push(SegmentRef {
                number,
                message_id: segment
                    .message_id
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
                declared_bytes: segment.bytes,
            });
        }
        if segments.is_empty() {
            return Err(Error::InvalidNzb(format!("{name}: no segments listed")));
        }

        let posted_at = match file.date {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        };

        files.push(FileDescriptor::new(name, groups, segments, posted_at));
    }

    if files.is_empty() {
        return Err(Error::InvalidNzb("NZB lists no files".to_string()));
    }

    Ok(Manifest { files })
}

/// Parse a filename from an NZB subject line.
///
/// Usenet subjects typically contain the filename in quotes, e.g.:
/// `Some.Movie.2024 [01/50] - "Some.Movie.2024.part01.rar" yEnc (1/100)`
///
/// The name is the text between the first and the last quote. Subjects
/// without a quoted name fall back to `file_<hash of subject>`.
pub fn parse_filename_from_subject(subject: &str) -> String {
    if let Some(start) = subject.find('"')
        && let Some(end) = subject.rfind('"')
        && end > start + 1
    {
        let filename = subject[start + 1..end].trim();
        if !filename.is_empty() {
            return filename.to_string();
        }
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    subject.hash(&mut hasher);
    format!("file_{:x}", hasher.finish())
}

/// Job name for an NZB path: the file name with a trailing `.nzb` removed
pub fn job_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match base.len().checked_sub(4) {
        Some(cut) if base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".nzb") => {
            base[..cut].to_string()
        }
        _ => base,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FILES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="title">Demo</meta>
  </head>
  <file poster="poster@example.com" date="1700000000" subject='Demo [1/2] - "demo.bin" yEnc (1/3)'>
    <groups>
      <group>alt.binaries.test</group>
      <group>alt.binaries.misc</group>
    </groups>
    <segments>
      <segment bytes="500" number="3">seg3@example.com</segment>
      <segment bytes="1000" number="1">seg1@example.com</segment>
      <segment bytes="1000" number="2">seg2@example.com</segment>
    </segments>
  </file>
  <file poster="poster@example.com" date="1700000001" subject='Demo [2/2] - "demo.par2" yEnc (1/1)'>
    <groups>
      <group>alt.binaries.test</group>
    </groups>
    <segments>
      <segment bytes="200" number="1">par@example.com</segment>
    </segments>
  </file>
</nzb>"#;

    #[test]
    fn parses_files_in_manifest_order() {
        let manifest = parse_nzb_content(TWO_FILES).unwrap();

        assert_eq!(manifest.len(), 2);
        let demo = &manifest.files[0];
        assert_eq!(demo.name, "demo.bin");
        assert_eq!(demo.groups, vec!["alt.binaries.test", "alt.binaries.misc"]);
        assert_eq!(
            demo.segments.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(demo.segments[0].message_id, "seg1@example.com");
        assert_eq!(demo.total_bytes, 2500);
        assert_eq!(demo.posted_at.unwrap().timestamp(), 1_700_000_000);

        assert_eq!(manifest.files[1].name, "demo.par2");
        assert_eq!(manifest.total_bytes(), 2700);
    }

    #[test]
    fn garbage_is_invalid_nzb() {
        let err = parse_nzb_content("this is not xml").unwrap_err();
        assert!(matches!(err, Error::InvalidNzb(_)));
    }

    #[tokio::test]
    async fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.nzb");
        tokio::fs::write(&path, TWO_FILES).await.unwrap();

        let manifest = load_nzb(&path).await.unwrap();
        assert_eq!(manifest.files[0].name, "demo.bin");

        let missing = load_nzb(&dir.path().join("absent.nzb")).await.unwrap_err();
        assert!(matches!(missing, Error::InvalidNzb(_)));
    }

    #[test]
    fn filename_is_between_first_and_last_quote() {
        assert_eq!(
            parse_filename_from_subject(r#"[1/5] - "My "Quoted" Name.rar" yEnc (1/3)"#),
            r#"My "Quoted" Name.rar"#
        );
        assert_eq!(
            parse_filename_from_subject(r#"x " spaced.bin " y"#),
            "spaced.bin"
        );
    }

    #[test]
    fn filename_falls_back_to_hash() {
        let a = parse_filename_from_subject("no quotes here (1/1)");
        let b = parse_filename_from_subject("other subject (1/1)");
        assert!(a.starts_with("file_"));
        assert_ne!(a, b);
        assert!(parse_filename_from_subject(r#"lonely " quote"#).starts_with("file_"));
        assert!(parse_filename_from_subject(r#"empty "" name"#).starts_with("file_"));
    }

    #[test]
    fn job_name_strips_nzb_suffix() {
        assert_eq!(job_name(Path::new("/downloads/My.Show.S01E01.nzb")), "My.Show.S01E01");
        assert_eq!(job_name(Path::new("upper.NZB")), "upper");
        assert_eq!(job_name(Path::new("plain")), "plain");
        assert_eq!(job_name(Path::new("a.nzb.bak")), "a.nzb.bak");
    }
}
