//! Gate 3: table column name linefeed.
//!
//! For any part under `xl/tables/` ending `.xml`, a `name="..."` attribute
//! containing a raw LF (0x0A) or CR (0x0D) byte is a finding. This must
//! operate on raw bytes rather than XML-entity-decoded text: a literal
//! control byte in the source would be hidden by entity decoding. Only the
//! first hit per part is emitted.

use crate::text;

use super::{GateFinding, Parts};

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut hits = Vec::new();
    for name in parts.table_parts() {
        let Some(bytes) = parts.get(name) else { continue };
        let mut search_from = 0usize;
        while let Some(rel) = text::find(&bytes[search_from..], b"name=\"") {
            let value_start = search_from + rel + b"name=\"".len();
            let Some(end_rel) = memchr::memchr(b'"', &bytes[value_start..]) else {
                break;
            };
            let value = &bytes[value_start..value_start + end_rel];
            if value.contains(&0x0A) || value.contains(&0x0D) {
                hits.push(GateFinding::new(
                    name,
                    "tablecolumn_lf",
                    text::decode_lossy(value).into_owned(),
                ));
                break;
            }
            search_from = value_start + end_rel + 1;
        }
    }
    hits
}
