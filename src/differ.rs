//! Part-level Differ: compares a candidate package against a host-repaired
//! package and emits unified text diffs for XML parts. Classification is by
//! content hash, never by size; the differ never reserializes XML, it only
//! compares bytes and decoded text.

use std::collections::BTreeMap;
use std::io::Read;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, TriageError};
use crate::text;

const DIFF_CONTEXT_LINES: usize = 4;
const DIFF_MAX_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartDelta {
    pub name: String,
    pub status: PartStatus,
    pub candidate_size: Option<u64>,
    pub repaired_size: Option<u64>,
    pub candidate_sha256: Option<String>,
    pub repaired_sha256: Option<String>,
    pub size_delta: Option<i64>,
    /// Unified diff snippet; only present for `changed` parts whose name
    /// ends in `.xml`.
    pub xml_diff: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub candidate_path: String,
    pub repaired_path: String,
    pub parts: Vec<PartDelta>,
}

impl DiffReport {
    pub fn added(&self) -> impl Iterator<Item = &PartDelta> {
        self.parts.iter().filter(|p| p.status == PartStatus::Added)
    }

    pub fn removed(&self) -> impl Iterator<Item = &PartDelta> {
        self.parts.iter().filter(|p| p.status == PartStatus::Removed)
    }

    pub fn changed(&self) -> impl Iterator<Item = &PartDelta> {
        self.parts.iter().filter(|p| p.status == PartStatus::Changed)
    }

    pub fn unchanged(&self) -> impl Iterator<Item = &PartDelta> {
        self.parts.iter().filter(|p| p.status == PartStatus::Unchanged)
    }

    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut m = BTreeMap::new();
        m.insert("added", self.added().count());
        m.insert("removed", self.removed().count());
        m.insert("changed", self.changed().count());
        m.insert("unchanged", self.unchanged().count());
        m
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "candidate": self.candidate_path,
            "repaired": self.repaired_path,
            "summary": self.summary(),
            "added": self.added().map(|p| &p.name).collect::<Vec<_>>(),
            "removed": self.removed().map(|p| &p.name).collect::<Vec<_>>(),
            "changed": self.changed().map(|p| serde_json::json!({
                "part": p.name,
                "candidate_size": p.candidate_size,
                "repaired_size": p.repaired_size,
                "size_delta": p.size_delta,
                "candidate_sha256": p.candidate_sha256,
                "repaired_sha256": p.repaired_sha256,
                "xml_diff": p.xml_diff,
            })).collect::<Vec<_>>(),
        })
    }
}

struct LoadedPart {
    size: u64,
    sha256: String,
    bytes: Vec<u8>,
}

fn load_parts(bytes: &[u8], label: &str) -> Result<BTreeMap<String, LoadedPart>> {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|source| {
        TriageError::InvalidPackage {
            path: label.into(),
            source,
        }
    })?;
    let mut out = BTreeMap::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|source| TriageError::InvalidPackage {
            path: label.into(),
            source,
        })?;
        let name = entry.name().to_string();
        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut raw).map_err(|source| TriageError::Io {
            path: name.clone().into(),
            source,
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&raw);
        let sha256 = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        out.insert(
            name,
            LoadedPart {
                size: raw.len() as u64,
                sha256,
                bytes: raw,
            },
        );
    }
    Ok(out)
}

/// Compare two packages already held in memory.
pub fn diff_bytes(
    candidate_label: &str,
    candidate_bytes: &[u8],
    repaired_label: &str,
    repaired_bytes: &[u8],
) -> Result<DiffReport> {
    let cand = load_parts(candidate_bytes, candidate_label)?;
    let rep = load_parts(repaired_bytes, repaired_label)?;

    let mut names: Vec<&String> = cand.keys().chain(rep.keys()).collect();
    names.sort();
    names.dedup();

    let mut parts = Vec::with_capacity(names.len());
    for name in names {
        let in_cand = cand.get(name);
        let in_rep = rep.get(name);

        let delta = match (in_cand, in_rep) {
            (Some(c), None) => PartDelta {
                name: name.clone(),
                status: PartStatus::Removed,
                candidate_size: Some(c.size),
                repaired_size: None,
                candidate_sha256: Some(c.sha256.clone()),
                repaired_sha256: None,
                size_delta: None,
                xml_diff: None,
            },
            (None, Some(r)) => PartDelta {
                name: name.clone(),
                status: PartStatus::Added,
                candidate_size: None,
                repaired_size: Some(r.size),
                candidate_sha256: None,
                repaired_sha256: Some(r.sha256.clone()),
                size_delta: None,
                xml_diff: None,
            },
            (Some(c), Some(r)) if c.sha256 == r.sha256 => PartDelta {
                name: name.clone(),
                status: PartStatus::Unchanged,
                candidate_size: Some(c.size),
                repaired_size: Some(r.size),
                candidate_sha256: Some(c.sha256.clone()),
                repaired_sha256: Some(r.sha256.clone()),
                size_delta: Some(0),
                xml_diff: None,
            },
            (Some(c), Some(r)) => {
                let xml_diff = if name.to_ascii_lowercase().ends_with(".xml") {
                    Some(unified_diff(&c.bytes, &r.bytes, DIFF_CONTEXT_LINES, DIFF_MAX_LINES))
                } else {
                    None
                };
                PartDelta {
                    name: name.clone(),
                    status: PartStatus::Changed,
                    candidate_size: Some(c.size),
                    repaired_size: Some(r.size),
                    candidate_sha256: Some(c.sha256.clone()),
                    repaired_sha256: Some(r.sha256.clone()),
                    size_delta: Some(r.size as i64 - c.size as i64),
                    xml_diff,
                }
            }
            (None, None) => unreachable!("name came from the union of both key sets"),
        };
        parts.push(delta);
    }

    Ok(DiffReport {
        candidate_path: candidate_label.to_string(),
        repaired_path: repaired_label.to_string(),
        parts,
    })
}

/// Compare two packages on disk.
pub fn diff_packages(candidate_path: &str, repaired_path: &str) -> Result<DiffReport> {
    let candidate_bytes = std::fs::read(candidate_path).map_err(|source| TriageError::Io {
        path: candidate_path.into(),
        source,
    })?;
    let repaired_bytes = std::fs::read(repaired_path).map_err(|source| TriageError::Io {
        path: repaired_path.into(),
        source,
    })?;
    diff_bytes(candidate_path, &candidate_bytes, repaired_path, &repaired_bytes)
}

/// A unified diff over lines, decoded lossily from bytes, with `context`
/// lines of surrounding unchanged text and truncated (with a sentinel line)
/// past `max_lines`.
fn unified_diff(a_bytes: &[u8], b_bytes: &[u8], context: usize, max_lines: usize) -> String {
    let a_text = text::decode_lossy(a_bytes);
    let b_text = text::decode_lossy(b_bytes);

    let diff = similar::TextDiff::from_lines(a_text.as_ref(), b_text.as_ref());
    let rendered = diff
        .unified_diff()
        .context_radius(context)
        .header("", "")
        .to_string();

    let mut out_lines: Vec<&str> = rendered.lines().collect();
    if out_lines.len() > max_lines {
        out_lines.truncate(max_lines);
        let mut truncated: Vec<String> = out_lines.into_iter().map(str::to_string).collect();
        truncated.push(format!("... diff truncated at {max_lines} lines ..."));
        return truncated.join("\n");
    }
    out_lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn zip_bytes(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = std::io::Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(cursor);
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn identical_packages_are_all_unchanged() {
        let a = zip_bytes(&[("xl/workbook.xml", b"<workbook/>")]);
        let report = diff_bytes("a", &a, "b", &a).unwrap();
        assert_eq!(report.parts.len(), 1);
        assert_eq!(report.parts[0].status, PartStatus::Unchanged);
    }

    #[test]
    fn added_and_removed_parts_are_classified() {
        let a = zip_bytes(&[("only_in_a.xml", b"<a/>")]);
        let b = zip_bytes(&[("only_in_b.xml", b"<b/>")]);
        let report = diff_bytes("a", &a, "b", &b).unwrap();
        assert_eq!(report.added().count(), 1);
        assert_eq!(report.removed().count(), 1);
    }

    #[test]
    fn changed_xml_part_carries_a_diff_snippet() {
        let a = zip_bytes(&[("xl/worksheets/sheet1.xml", b"line1\nline2\nline3\n")]);
        let b = zip_bytes(&[("xl/worksheets/sheet1.xml", b"line1\nCHANGED\nline3\n")]);
        let report = diff_bytes("a", &a, "b", &b).unwrap();
        let delta = &report.parts[0];
        assert_eq!(delta.status, PartStatus::Changed);
        let diff = delta.xml_diff.as_ref().unwrap();
        assert!(diff.contains("-line2"));
        assert!(diff.contains("+CHANGED"));
    }

    #[test]
    fn changed_non_xml_part_has_no_diff_snippet() {
        let a = zip_bytes(&[("xl/media/image1.png", b"\x01\x02")]);
        let b = zip_bytes(&[("xl/media/image1.png", b"\x03\x04")]);
        let report = diff_bytes("a", &a, "b", &b).unwrap();
        assert!(report.parts[0].xml_diff.is_none());
    }

    #[test]
    fn diff_is_deterministic_across_runs() {
        let a = zip_bytes(&[("xl/worksheets/sheet1.xml", b"a\nb\nc\n")]);
        let b = zip_bytes(&[("xl/worksheets/sheet1.xml", b"a\nx\nc\n")]);
        let r1 = diff_bytes("a", &a, "b", &b).unwrap();
        let r2 = diff_bytes("a", &a, "b", &b).unwrap();
        assert_eq!(r1.parts[0].xml_diff, r2.parts[0].xml_diff);
    }
}
