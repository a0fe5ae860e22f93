//! Gate 7: style pool integrity.
//!
//! `xl/styles.xml` declares `<dxfs count="N">...</dxfs>`; `N` must equal the
//! number of `<dxf` records actually present. Every `<cfRule dxfId="k">` in
//! every worksheet must then satisfy `0 <= k < actual_count` — deliberately
//! against the *actual* count, not the declared one, since that's what a
//! host repair pass would see (see Open Questions).

use crate::text;

use super::{GateFinding, Parts};

const STYLES_PART: &str = "xl/styles.xml";

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut findings = Vec::new();

    let Some(styles) = parts.get(STYLES_PART) else {
        findings.push(GateFinding::new(STYLES_PART, "missing_styles", ""));
        return findings;
    };

    let actual = text::find_open_tags(styles, "dxf").len();

    let declared = text::find_open_tags(styles, "dxfs")
        .into_iter()
        .next()
        .and_then(|(start, end)| text::attr_value(&styles[start..end], "count"))
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(declared) = declared {
        if declared != actual {
            findings.push(
                GateFinding::new(STYLES_PART, "dxfs_count_mismatch", "")
                    .with("declared", declared)
                    .with("actual", actual),
            );
        }
    }

    for name in parts.worksheet_parts() {
        let Some(sheet) = parts.get(name) else { continue };
        for (start, end) in text::find_open_tags(sheet, "cfRule") {
            let tag = &sheet[start..end];
            let Some(dxf_id) = text::attr_value(tag, "dxfId").and_then(|v| v.parse::<i64>().ok())
            else {
                continue;
            };
            if dxf_id < 0 || dxf_id as usize >= actual {
                findings.push(
                    GateFinding::new(name, "cf_dxfId_out_of_range", dxf_id.to_string())
                        .with("dxfId", dxf_id)
                        .with("dxf_count", actual),
                );
            }
        }
    }

    findings
}
