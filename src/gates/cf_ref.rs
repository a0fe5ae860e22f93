//! Gate 2: conditional-formatting `#REF!` literals.
//!
//! Within any `<conditionalFormatting>...</conditionalFormatting>` block in
//! a worksheet part, a literal `#REF!` triggers one finding per part (first
//! hit only).

use crate::text;

use super::{GateFinding, Parts};

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut hits = Vec::new();
    for name in parts.worksheet_parts() {
        let Some(bytes) = parts.get(name) else { continue };
        for (start, end) in text::find_element_spans(bytes, "conditionalFormatting") {
            let block = &bytes[start..end];
            if text::find(block, b"#REF!").is_some() {
                let excerpt_len = block.len().min(200);
                hits.push(GateFinding::new(
                    name,
                    "cf_ref_hit",
                    text::decode_lossy(&block[..excerpt_len]).into_owned(),
                ));
                break;
            }
        }
    }
    hits
}
