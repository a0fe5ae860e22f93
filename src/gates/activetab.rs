//! Informational "active view" triage record: which sheet is selected and
//! what it resolves to. Never a gate — always informational.

use serde::Serialize;

use crate::text;

use super::Parts;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ActiveTabInfo {
    pub active_tab: Option<u32>,
    pub sheet_count: Option<usize>,
    pub active_sheet_name: Option<String>,
    pub active_sheet_rid: Option<String>,
}

impl ActiveTabInfo {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ActiveTabInfo serializes")
    }
}

pub(crate) fn extract(parts: &Parts) -> ActiveTabInfo {
    let Some(workbook) = parts.get("xl/workbook.xml") else {
        return ActiveTabInfo::default();
    };

    // `workbookView` is always a self-closing opening tag in practice, so we
    // scan for the tag itself rather than a matching close tag.
    let Some((start, end)) = text::find_open_tags(workbook, "workbookView").into_iter().next() else {
        return ActiveTabInfo::default();
    };
    let tag_bytes = &workbook[start..end];
    let active_tab = text::attr_value(tag_bytes, "activeTab").and_then(|v| v.parse::<u32>().ok());

    let Some(active_tab) = active_tab else {
        return ActiveTabInfo::default();
    };

    let sheets = extract_sheets(workbook);
    let sheet_count = sheets.len();
    let (active_sheet_name, active_sheet_rid) = sheets
        .get(active_tab as usize)
        .map(|(name, rid)| (Some(name.clone()), Some(rid.clone())))
        .unwrap_or((None, None));

    ActiveTabInfo {
        active_tab: Some(active_tab),
        sheet_count: Some(sheet_count),
        active_sheet_name,
        active_sheet_rid,
    }
}

/// Extract `(name, r:id)` pairs from each `<sheet .../>` element inside
/// `<sheets>...</sheets>`, in document order.
fn extract_sheets(workbook: &[u8]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (start, end) in text::find_open_tags(workbook, "sheet") {
        let tag = &workbook[start..end];
        let name = text::attr_value(tag, "name");
        let rid = text::attr_value(tag, "r:id").or_else(|| text::attr_value(tag, "id"));
        if let (Some(name), Some(rid)) = (name, rid) {
            out.push((name.into_owned(), rid.into_owned()));
        }
    }
    out
}
