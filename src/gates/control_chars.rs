//! Gate 9: illegal control characters.
//!
//! XML 1.0 forbids raw control bytes below 0x20 other than TAB, LF, CR. A
//! part containing one is usually evidence of a value that should have been
//! entity-escaped and was instead written as a literal byte.

use super::{GateFinding, Parts};

const MAX_EXAMPLES: usize = 10;

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut findings = Vec::new();
    for name in parts.xml_parts() {
        let Some(bytes) = parts.get(name) else { continue };
        let examples: Vec<(usize, u8)> = bytes
            .iter()
            .enumerate()
            .filter(|(_, &b)| b < 0x20 && b != 0x09 && b != 0x0A && b != 0x0D)
            .map(|(i, &b)| (i, b))
            .take(MAX_EXAMPLES)
            .collect();
        if examples.is_empty() {
            continue;
        }
        let excerpt = examples
            .iter()
            .map(|(i, b)| format!("{i}:0x{b:02x}"))
            .collect::<Vec<_>>()
            .join(", ");
        let examples_json: Vec<serde_json::Value> = examples
            .iter()
            .map(|(i, b)| serde_json::json!([i, b]))
            .collect();
        findings.push(
            GateFinding::new(name, "illegal_control_char", excerpt)
                .with("examples", serde_json::Value::Array(examples_json)),
        );
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn parts(name: &str, bytes: &[u8]) -> Parts {
        let mut by_name = BTreeMap::new();
        by_name.insert(name.to_string(), bytes.to_vec());
        Parts { by_name, names_in_order: vec![name.to_string()] }
    }

    #[test]
    fn detects_bare_control_byte() {
        let xml = b"<a>before\x01after</a>";
        let findings = check(&parts("xl/workbook.xml", xml));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue, "illegal_control_char");
    }

    #[test]
    fn tab_lf_cr_are_allowed() {
        let xml = b"<a>\t\n\r</a>";
        assert!(check(&parts("xl/workbook.xml", xml)).is_empty());
    }

    #[test]
    fn caps_examples_at_ten() {
        let mut xml = b"<a>".to_vec();
        xml.extend(std::iter::repeat(0x01u8).take(20));
        xml.extend_from_slice(b"</a>");
        let findings = check(&parts("xl/workbook.xml", &xml));
        let examples = findings[0].details.get("examples").unwrap().as_array().unwrap();
        assert_eq!(examples.len(), 10);
    }
}
