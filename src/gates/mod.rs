//! Gate Check Battery: ten independent, read-only structural hazard
//! detectors operating on raw XML bytes, plus an informational
//! "active view" triage record.

mod activetab;
mod calc_chain;
mod cf_ref;
mod control_chars;
mod rels;
mod shared_formula;
mod stopship;
mod styles;
mod table_column;
mod wellformed;

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

pub use activetab::ActiveTabInfo;

/// Gate identifiers, in battery execution order. This order also governs
/// serialization order of `failing_gates`/`samples`.
pub const GATE_IDS: [&str; 10] = [
    "stopship_tokens",
    "cf_ref_hits",
    "tablecolumn_lf",
    "calcchain_invalid",
    "shared_ref_oob",
    "shared_ref_bbox",
    "styles_dxf_integrity",
    "xml_wellformed",
    "illegal_control_chars",
    "rels_missing_targets",
];

/// Number of samples retained in a serialized report for each gate.
fn sample_cap(gate_id: &str) -> usize {
    match gate_id {
        "xml_wellformed" => 10,
        "illegal_control_chars" => 10,
        "rels_missing_targets" => 20,
        _ => 25,
    }
}

/// A single structured finding produced by one gate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GateFinding {
    pub part: String,
    /// Per-gate discriminator, e.g. `"dxfs_count_mismatch"` or
    /// `"no_formula_at_target"`.
    pub issue: String,
    /// Small excerpt of the offending bytes/text, for human display.
    pub excerpt: String,
    /// Gate-specific structured fields (e.g. `declared`, `actual`, `cell`).
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl GateFinding {
    pub fn new(part: impl Into<String>, issue: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            issue: issue.into(),
            excerpt: excerpt.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// All ten gate results for one package, plus the informational
/// active-view triage record.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub path: String,
    findings: Vec<(&'static str, Vec<GateFinding>)>,
    pub activetab: ActiveTabInfo,
}

impl GateReport {
    /// Findings for a given gate id, in the order produced by the battery.
    pub fn findings(&self, gate_id: &str) -> &[GateFinding] {
        self.findings
            .iter()
            .find(|(id, _)| *id == gate_id)
            .map(|(_, f)| f.as_slice())
            .unwrap_or(&[])
    }

    /// A gate passes iff its finding list is empty.
    pub fn gate_passes(&self, gate_id: &str) -> bool {
        self.findings(gate_id).is_empty()
    }

    /// The whole report is failing iff any gate has at least one finding.
    pub fn pass(&self) -> bool {
        self.findings.iter().all(|(_, f)| f.is_empty())
    }

    /// Map from gate id to hit count, excluding gates with zero findings.
    pub fn failing_gates(&self) -> std::collections::BTreeMap<String, usize> {
        self.findings
            .iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(id, f)| (id.to_string(), f.len()))
            .collect()
    }

    /// Serialize to the report's wire format.
    pub fn to_json(&self) -> serde_json::Value {
        let mut samples = serde_json::Map::new();
        for (id, f) in &self.findings {
            let cap = sample_cap(id);
            let sample: Vec<serde_json::Value> = f
                .iter()
                .take(cap)
                .map(|finding| serde_json::to_value(finding).expect("GateFinding serializes"))
                .collect();
            samples.insert(id.to_string(), serde_json::Value::Array(sample));
        }
        serde_json::json!({
            "path": self.path,
            "pass": self.pass(),
            "failing_gates": self.failing_gates(),
            "samples": samples,
            "triage": { "activetab": self.activetab.to_json() },
        })
    }
}

/// Run the full gate battery against an archive already loaded into memory.
pub fn run_all_bytes(path_label: &str, archive_bytes: &[u8]) -> Result<GateReport> {
    let mut findings: Vec<(&'static str, Vec<GateFinding>)> = Vec::new();

    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive_bytes))
        .map_err(|source| crate::error::TriageError::InvalidPackage {
            path: path_label.into(),
            source,
        })?;

    let parts = read_all_parts(&mut zip)?;

    findings.push(("stopship_tokens", stopship::check(&parts)));
    findings.push(("cf_ref_hits", cf_ref::check(&parts)));
    findings.push(("tablecolumn_lf", table_column::check(&parts)));
    findings.push(("calcchain_invalid", calc_chain::check(&parts)));
    let (oob, bbox) = shared_formula::check(&parts);
    findings.push(("shared_ref_oob", oob));
    findings.push(("shared_ref_bbox", bbox));
    findings.push(("styles_dxf_integrity", styles::check(&parts)));
    findings.push(("xml_wellformed", wellformed::check(&parts)));
    findings.push(("illegal_control_chars", control_chars::check(&parts)));
    findings.push(("rels_missing_targets", rels::check(&parts)));

    let activetab = activetab::extract(&parts);

    for (id, f) in &findings {
        if !f.is_empty() {
            log::warn!("gate '{id}' reported {} finding(s) for {path_label}", f.len());
        }
    }

    Ok(GateReport {
        path: path_label.to_string(),
        findings,
        activetab,
    })
}

/// Run the full gate battery against a package on disk.
pub fn run_all(path: impl AsRef<Path>) -> Result<GateReport> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| crate::error::TriageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    run_all_bytes(&path.to_string_lossy(), &bytes)
}

/// All parts keyed by name, read once up front so every gate shares one
/// in-memory copy of the archive.
pub(crate) struct Parts {
    pub by_name: std::collections::BTreeMap<String, Vec<u8>>,
    pub names_in_order: Vec<String>,
}

impl Parts {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.by_name.get(name).map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn worksheet_parts(&self) -> impl Iterator<Item = &str> {
        self.names_in_order
            .iter()
            .map(|s| s.as_str())
            .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
    }

    pub fn table_parts(&self) -> impl Iterator<Item = &str> {
        self.names_in_order
            .iter()
            .map(|s| s.as_str())
            .filter(|n| n.starts_with("xl/tables/") && n.ends_with(".xml"))
    }

    pub fn xml_parts(&self) -> impl Iterator<Item = &str> {
        self.names_in_order
            .iter()
            .map(|s| s.as_str())
            .filter(|n| n.to_ascii_lowercase().ends_with(".xml"))
    }

    pub fn rels_parts(&self) -> impl Iterator<Item = &str> {
        self.names_in_order
            .iter()
            .map(|s| s.as_str())
            .filter(|n| n.ends_with(".rels"))
    }
}

fn read_all_parts<R: std::io::Read + std::io::Seek>(
    zip: &mut zip::ZipArchive<R>,
) -> Result<Parts> {
    let mut by_name = std::collections::BTreeMap::new();
    let mut names_in_order = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|source| crate::error::TriageError::InvalidPackage {
            path: "<archive>".into(),
            source,
        })?;
        let name = entry.name().to_string();
        let mut raw = Vec::with_capacity(entry.size() as usize);
        std::io::Read::read_to_end(&mut entry, &mut raw).map_err(|source| crate::error::TriageError::Io {
            path: name.clone().into(),
            source,
        })?;
        names_in_order.push(name.clone());
        by_name.insert(name, raw);
    }
    Ok(Parts {
        by_name,
        names_in_order,
    })
}
