//! Gates 5 & 6: shared-formula bounding-box checks.
//!
//! A shared formula is stored once at a base cell (`<f t="shared" si="N"
//! ref="A1:B9">...</f>`) and applied to every cell carrying the same `si`.
//! Gate 5 checks the declared `ref=` doesn't extend past the sheet's
//! highest `<row r="...">`. Gate 6 checks the declared `ref=` matches the
//! tight bounding box of every cell that actually participates in that
//! `si`.

use std::collections::HashMap;

use crate::colref::{self, RangeRef};
use crate::text;

use super::{GateFinding, Parts};

struct SharedFormulaCell {
    cell: String,
    si: String,
}

pub(crate) fn check(parts: &Parts) -> (Vec<GateFinding>, Vec<GateFinding>) {
    let mut oob = Vec::new();
    let mut bbox_mismatch = Vec::new();

    for name in parts.worksheet_parts() {
        let Some(sheet) = parts.get(name) else { continue };
        let max_row = sheet_max_row(sheet);

        let (cells, declared_refs) = collect_shared_formula_cells(sheet);

        // Gate 5: declared ref must not exceed the sheet's max row.
        for (si, declared) in &declared_refs {
            if let Some(range) = colref::parse_range_ref(declared) {
                if range.end.row > max_row {
                    oob.push(
                        GateFinding::new(name, "shared_ref_oob", declared.clone())
                            .with("si", si.clone())
                            .with("ref", declared.clone())
                            .with("sheet_max_row", max_row),
                    );
                }
            }
        }

        // Gate 6: tight bounding box of participating cells vs declared ref.
        let mut by_si_cells: HashMap<&str, Vec<&str>> = HashMap::new();
        for c in &cells {
            by_si_cells.entry(c.si.as_str()).or_default().push(c.cell.as_str());
        }
        for (si, declared) in &declared_refs {
            let Some(cell_refs) = by_si_cells.get(si.as_str()) else {
                continue;
            };
            let Some(declared_range) = colref::parse_range_ref(declared) else {
                continue;
            };
            let Some(actual) = tight_bounding_box(cell_refs) else {
                continue;
            };
            if actual.to_ref_string() != declared_range.to_ref_string() {
                bbox_mismatch.push(
                    GateFinding::new(name, "shared_ref_bbox_mismatch", declared.clone())
                        .with("si", si.clone())
                        .with("declared_ref", declared_range.to_ref_string())
                        .with("actual_ref", actual.to_ref_string()),
                );
            }
        }
    }

    (oob, bbox_mismatch)
}

fn sheet_max_row(sheet: &[u8]) -> u32 {
    text::find_open_tags(sheet, "row")
        .into_iter()
        .filter_map(|(start, end)| text::attr_value(&sheet[start..end], "r"))
        .filter_map(|v| v.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

/// Returns (participating shared-formula cells, declared (si, ref) pairs in
/// first-seen order).
fn collect_shared_formula_cells(sheet: &[u8]) -> (Vec<SharedFormulaCell>, Vec<(String, String)>) {
    let mut cells = Vec::new();
    let mut declared: Vec<(String, String)> = Vec::new();
    let mut seen_si = std::collections::HashSet::new();

    for chunk in text::split_on_cell_close(sheet) {
        let Some((cell, tag_end)) = text::last_cell_open_tag(chunk) else {
            continue;
        };
        let rest = &chunk[tag_end..];
        for (f_start, f_tag_end) in text::find_open_tags(rest, "f") {
            let f_open_tag = &rest[f_start..f_tag_end];
            let is_shared = text::attr_value(f_open_tag, "t").as_deref() == Some("shared");
            if !is_shared {
                continue;
            }
            let Some(si) = text::attr_value(f_open_tag, "si") else {
                continue;
            };
            let si = si.into_owned();
            cells.push(SharedFormulaCell {
                cell: cell.clone(),
                si: si.clone(),
            });
            if let Some(r) = text::attr_value(f_open_tag, "ref") {
                if seen_si.insert(si.clone()) {
                    declared.push((si, r.into_owned()));
                }
            }
        }
    }

    (cells, declared)
}

fn tight_bounding_box(cell_refs: &[&str]) -> Option<RangeRef> {
    let parsed: Vec<_> = cell_refs
        .iter()
        .filter_map(|c| colref::parse_cell_ref(c))
        .collect();
    if parsed.is_empty() {
        return None;
    }
    let col_min = parsed.iter().map(|c| c.col).min().unwrap();
    let col_max = parsed.iter().map(|c| c.col).max().unwrap();
    let row_min = parsed.iter().map(|c| c.row).min().unwrap();
    let row_max = parsed.iter().map(|c| c.row).max().unwrap();
    Some(RangeRef {
        start: colref::CellRef { col: col_min, row: row_min },
        end: colref::CellRef { col: col_max, row: row_max },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn parts(sheet: &[u8]) -> Parts {
        let mut by_name = BTreeMap::new();
        by_name.insert("xl/worksheets/sheet1.xml".to_string(), sheet.to_vec());
        Parts {
            by_name,
            names_in_order: vec!["xl/worksheets/sheet1.xml".to_string()],
        }
    }

    #[test]
    fn oob_when_declared_ref_exceeds_max_row() {
        let sheet = br#"<worksheet><sheetData>
            <row r="50"><c r="A50"/></row>
            <row r="1"><c r="A1"><f t="shared" si="0" ref="A1:A100">SUM(A1)</f></c></row>
        </sheetData></worksheet>"#;
        let (oob, _bbox) = check(&parts(sheet));
        assert_eq!(oob.len(), 1);
        assert_eq!(oob[0].details.get("sheet_max_row").unwrap(), 50);
    }

    #[test]
    fn bbox_mismatch_when_participants_dont_match_declared_box() {
        let sheet = br#"<worksheet><sheetData>
            <row r="1">
                <c r="A1"><f t="shared" si="0" ref="A1:B2">SUM(A1)</f></c>
                <c r="B1"><f t="shared" si="0"/></c>
            </row>
        </sheetData></worksheet>"#;
        let (_oob, bbox) = check(&parts(sheet));
        assert_eq!(bbox.len(), 1);
        assert_eq!(bbox[0].details.get("declared_ref").unwrap(), "A1:B2");
        assert_eq!(bbox[0].details.get("actual_ref").unwrap(), "A1:B1");
    }

    #[test]
    fn matching_box_passes() {
        let sheet = br#"<worksheet><sheetData>
            <row r="1">
                <c r="A1"><f t="shared" si="0" ref="A1:B1">SUM(A1)</f></c>
                <c r="B1"><f t="shared" si="0"/></c>
            </row>
        </sheetData></worksheet>"#;
        let (oob, bbox) = check(&parts(sheet));
        assert!(oob.is_empty());
        assert!(bbox.is_empty());
    }
}
