//! Gate 4: calcChain invalidity.
//!
//! Every `<c r="..." i="..."/>` entry in `xl/calcChain.xml` must resolve to
//! a cell in `xl/worksheets/sheet{i}.xml` that itself carries an `<f>`
//! child. Lookups are O(n) overall: for each referenced sheet we build a
//! set of "cells that carry a formula" once, by splitting the sheet text on
//! `</c>` rather than running a DOTALL regex over a multi-megabyte part.

use std::collections::{HashMap, HashSet};

use crate::text;

use super::{GateFinding, Parts};

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut findings = Vec::new();
    let Some(calc) = parts.get(CALC_CHAIN_PART) else {
        return findings;
    };

    let mut formula_cells_by_sheet: HashMap<String, Option<HashSet<String>>> = HashMap::new();

    for (start, end) in text::find_open_tags(calc, "c") {
        let tag = &calc[start..end];
        let (Some(r), Some(i)) = (text::attr_value(tag, "r"), text::attr_value(tag, "i")) else {
            continue;
        };
        let cell = r.into_owned();
        let sheet_part = format!("xl/worksheets/sheet{}.xml", i);

        let pool = formula_cells_by_sheet
            .entry(sheet_part.clone())
            .or_insert_with(|| parts.get(&sheet_part).map(formula_cell_set));

        match pool {
            None => {
                findings.push(
                    GateFinding::new(sheet_part.clone(), "missing_sheet_part", cell.clone())
                        .with("cell", cell)
                        .with("sheet_part", sheet_part),
                );
            }
            Some(set) => {
                if !set.contains(&cell) {
                    findings.push(
                        GateFinding::new(sheet_part.clone(), "no_formula_at_target", cell.clone())
                            .with("cell", cell)
                            .with("sheet_part", sheet_part),
                    );
                }
            }
        }
    }

    findings
}

/// Build the set of cell references in a worksheet part that carry an `<f>`
/// child, by splitting on `</c>` boundaries (O(n), no backtracking).
fn formula_cell_set(sheet_xml: &[u8]) -> HashSet<String> {
    let mut set = HashSet::new();
    for chunk in text::split_on_cell_close(sheet_xml) {
        if let Some((cell, tag_end)) = text::last_cell_open_tag(chunk) {
            if text::find(&chunk[tag_end..], b"<f").is_some() {
                set.insert(cell);
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn parts(calc_chain: &[u8], sheet1: Option<&[u8]>) -> Parts {
        let mut by_name = BTreeMap::new();
        by_name.insert(CALC_CHAIN_PART.to_string(), calc_chain.to_vec());
        let mut names_in_order = vec![CALC_CHAIN_PART.to_string()];
        if let Some(s) = sheet1 {
            by_name.insert("xl/worksheets/sheet1.xml".to_string(), s.to_vec());
            names_in_order.push("xl/worksheets/sheet1.xml".to_string());
        }
        Parts { by_name, names_in_order }
    }

    #[test]
    fn missing_sheet_part_is_a_finding() {
        let calc = br#"<calcChain><c r="A1" i="1"/></calcChain>"#;
        let findings = check(&parts(calc, None));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue, "missing_sheet_part");
    }

    #[test]
    fn dangling_entry_with_no_formula_is_a_finding() {
        let calc = br#"<calcChain><c r="A1" i="1"/></calcChain>"#;
        let sheet = br#"<worksheet><sheetData><row r="1"><c r="A1"><v>5</v></c></row></sheetData></worksheet>"#;
        let findings = check(&parts(calc, Some(sheet)));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue, "no_formula_at_target");
        assert_eq!(findings[0].details.get("cell").unwrap(), "A1");
    }

    #[test]
    fn entry_with_formula_passes() {
        let calc = br#"<calcChain><c r="A1" i="1"/></calcChain>"#;
        let sheet = br#"<worksheet><sheetData><row r="1"><c r="A1"><f>SUM(B1:B2)</f><v>5</v></c></row></sheetData></worksheet>"#;
        assert!(check(&parts(calc, Some(sheet))).is_empty());
    }

    #[test]
    fn missing_calc_chain_part_passes() {
        let parts = Parts {
            by_name: BTreeMap::new(),
            names_in_order: vec![],
        };
        assert!(check(&parts).is_empty());
    }
}
