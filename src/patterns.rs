//! Pattern Classifier: maps diff evidence onto a fixed catalogue of named
//! host-repair behaviours. Each detector is a pure function from
//! `DiffReport` to an optional `Pattern`; `detect_all` runs them in
//! catalogue order.

use serde::Serialize;

use crate::differ::{DiffReport, PartDelta, PartStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub name: &'static str,
    pub description: String,
    pub affected_parts: Vec<String>,
    pub confidence: Confidence,
    pub suggested_patch: Option<String>,
}

pub fn detect_all(diff: &DiffReport) -> Vec<Pattern> {
    let detectors: [fn(&DiffReport) -> Option<Pattern>; 7] = [
        detect_calcchain_drop,
        detect_dxfs_insertion,
        detect_cf_dxfid_clone,
        detect_sharedstrings_rebuild,
        detect_table_style_norm,
        detect_shared_ref_trim,
        detect_rels_cleanup,
    ];
    detectors.iter().filter_map(|f| f(diff)).collect()
}

fn diff_lines(p: &PartDelta) -> Vec<&str> {
    p.xml_diff.as_deref().map(|d| d.lines().collect()).unwrap_or_default()
}

fn detect_calcchain_drop(diff: &DiffReport) -> Option<Pattern> {
    diff.removed().find(|p| p.name == "xl/calcChain.xml").map(|_| Pattern {
        name: "CALCCHAIN_DROP",
        description: "Excel removed xl/calcChain.xml during repair. The calcChain had entries \
                       pointing to non-formula cells."
            .to_string(),
        affected_parts: vec!["xl/calcChain.xml".to_string()],
        confidence: Confidence::High,
        suggested_patch: Some("delete_part: xl/calcChain.xml".to_string()),
    })
}

fn detect_dxfs_insertion(diff: &DiffReport) -> Option<Pattern> {
    for p in diff.changed() {
        if p.name != "xl/styles.xml" {
            continue;
        }
        let lines = diff_lines(p);
        if lines.is_empty() {
            continue;
        }
        let added_dxf = lines.iter().filter(|l| l.starts_with('+') && l.contains("<dxf")).count();
        let changed_count = lines.iter().filter(|l| l.starts_with('+') && l.contains("count=\"")).count();
        if added_dxf > 0 {
            return Some(Pattern {
                name: "DXFS_INSERTION",
                description: format!(
                    "Excel inserted {added_dxf} <dxf> element(s) into xl/styles.xml and updated \
                     dxfs/@count. Likely triggered by cfRule dxfId references pointing beyond the \
                     declared dxf pool."
                ),
                affected_parts: vec!["xl/styles.xml".to_string()],
                confidence: if changed_count > 0 { Confidence::High } else { Confidence::Medium },
                suggested_patch: Some(
                    "append_block: insert missing <dxf> entries before </dxfs>, then literal_replace \
                     dxfs count= to match new total."
                        .to_string(),
                ),
            });
        }
    }
    None
}

fn detect_cf_dxfid_clone(diff: &DiffReport) -> Option<Pattern> {
    for p in diff.changed() {
        if !p.name.starts_with("xl/worksheets/sheet") {
            continue;
        }
        let lines = diff_lines(p);
        if lines.is_empty() {
            continue;
        }
        let minus_dxf = lines.iter().filter(|l| l.starts_with('-') && l.contains("dxfId=")).count();
        let plus_dxf = lines.iter().filter(|l| l.starts_with('+') && l.contains("dxfId=")).count();
        if minus_dxf > 0 && plus_dxf > 0 {
            return Some(Pattern {
                name: "CF_DXFID_CLONE",
                description: format!(
                    "Excel renumbered dxfId values in conditional formatting rules ({minus_dxf} \
                     removed, {plus_dxf} added lines). Affected part: {}",
                    p.name
                ),
                affected_parts: vec![p.name.clone(), "xl/styles.xml".to_string()],
                confidence: Confidence::High,
                suggested_patch: Some(
                    "literal_replace: update each dxfId= in cfRule to reference valid index within \
                     dxfs pool, or append missing dxf entries."
                        .to_string(),
                ),
            });
        }
    }
    None
}

fn detect_sharedstrings_rebuild(diff: &DiffReport) -> Option<Pattern> {
    diff.changed().find(|p| p.name == "xl/sharedStrings.xml").map(|_| Pattern {
        name: "SHAREDSTRINGS_REBUILD",
        description: "Excel rebuilt xl/sharedStrings.xml. This often happens when si/t elements \
                       have illegal control characters or malformed XML."
            .to_string(),
        affected_parts: vec!["xl/sharedStrings.xml".to_string()],
        confidence: Confidence::Medium,
        suggested_patch: Some("check_illegal_control_chars gate, then strip or encode offending bytes.".to_string()),
    })
}

fn detect_table_style_norm(diff: &DiffReport) -> Option<Pattern> {
    let hits: Vec<&PartDelta> = diff
        .changed()
        .filter(|p| p.name.starts_with("xl/tables/table") && p.name.ends_with(".xml"))
        .collect();
    if hits.is_empty() {
        return None;
    }
    Some(Pattern {
        name: "TABLE_STYLE_NORM",
        description: format!(
            "Excel normalised {} table XML part(s). Common cause: tableStyleInfo name pointing to \
             a non-existent style, or tableColumn/@name containing linefeeds.",
            hits.len()
        ),
        affected_parts: hits.iter().map(|p| p.name.clone()).collect(),
        confidence: Confidence::Medium,
        suggested_patch: Some(
            "literal_replace: set tableStyleInfo name= to a built-in style (e.g. TableStyleMedium9), \
             strip linefeeds from tableColumn name="
                .to_string(),
        ),
    })
}

fn detect_shared_ref_trim(diff: &DiffReport) -> Option<Pattern> {
    for p in diff.changed() {
        if !p.name.starts_with("xl/worksheets/sheet") {
            continue;
        }
        let lines = diff_lines(p);
        if lines.iter().any(|l| l.contains("ref=") && (l.starts_with('-') || l.starts_with('+'))) {
            return Some(Pattern {
                name: "SHARED_REF_TRIM",
                description: format!(
                    "Excel adjusted shared formula ref= bounding boxes in {}. Declared bbox extended \
                     beyond actual data rows (OOB) or mismatched participating cells.",
                    p.name
                ),
                affected_parts: vec![p.name.clone()],
                confidence: Confidence::High,
                suggested_patch: Some(
                    "literal_replace: update ref= attribute on shared formula base cell to match \
                     actual bounding box of all si= siblings."
                        .to_string(),
                ),
            });
        }
    }
    None
}

fn detect_rels_cleanup(diff: &DiffReport) -> Option<Pattern> {
    let hits: Vec<&PartDelta> = diff.changed().filter(|p| p.name.ends_with(".rels")).collect();
    if hits.is_empty() {
        return None;
    }
    let names: Vec<&str> = hits.iter().map(|p| p.name.as_str()).collect();
    Some(Pattern {
        name: "RELS_CLEANUP",
        description: format!(
            "Excel rewrote {} relationship part(s): {}. Missing or orphaned relationship targets \
             are common triggers.",
            hits.len(),
            names.join(", ")
        ),
        affected_parts: hits.iter().map(|p| p.name.clone()).collect(),
        confidence: Confidence::Medium,
        suggested_patch: Some("check rels_missing_targets gate; add or remove Relationship entries to match.".to_string()),
    })
}
