//! Gate 1: stop-ship tokens in worksheet formulas.
//!
//! Within any `<f>...</f>` element inside a worksheet part, a sentinel
//! substring (`_xlfn.`, `_xludf.`, `_xlpm.`, `AGGREGATE(`) forces a repair
//! pass on the hosted spreadsheet service. Every match is its own finding,
//! including overlapping tokens within the same formula text.

use aho_corasick::AhoCorasick;

use crate::text;

use super::{GateFinding, Parts};

const TOKENS: [&str; 4] = ["_xlfn.", "_xludf.", "_xlpm.", "AGGREGATE("];

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let ac = AhoCorasick::new(TOKENS).expect("static pattern set is valid");
    let mut hits = Vec::new();

    for name in parts.worksheet_parts() {
        let Some(bytes) = parts.get(name) else { continue };
        for (f_start, f_end) in text::find_element_spans(bytes, "f") {
            let formula = &bytes[f_start..f_end];
            for m in ac.find_iter(formula) {
                let token = TOKENS[m.pattern().as_usize()];
                let excerpt_start = m.start().saturating_sub(0);
                let excerpt_end = (m.end() + 40).min(formula.len());
                let excerpt = text::decode_lossy(&formula[excerpt_start..excerpt_end]).into_owned();
                hits.push(
                    GateFinding::new(name, "stopship_token", excerpt)
                        .with("token", token)
                        .with("offset", f_start + m.start()),
                );
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn parts(worksheet_xml: &[u8]) -> Parts {
        let mut by_name = BTreeMap::new();
        by_name.insert("xl/worksheets/sheet1.xml".to_string(), worksheet_xml.to_vec());
        Parts {
            by_name,
            names_in_order: vec!["xl/worksheets/sheet1.xml".to_string()],
        }
    }

    #[test]
    fn detects_overlapping_tokens_as_two_findings() {
        let xml = br#"<row><c r="A1"><f>_xlfn.AGGREGATE(1,2,A1:A9)</f></c></row>"#;
        let hits = check(&parts(xml));
        let tokens: Vec<&str> = hits
            .iter()
            .map(|h| h.details.get("token").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(tokens, vec!["_xlfn.", "AGGREGATE("]);
    }

    #[test]
    fn clean_formula_passes() {
        let xml = br#"<c r="A1"><f>SUM(A1:A9)</f></c>"#;
        assert!(check(&parts(xml)).is_empty());
    }
}
