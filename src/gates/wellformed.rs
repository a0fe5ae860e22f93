//! Gate 8: XML well-formedness.
//!
//! The only gate that constructs an XML tree. It still never writes XML —
//! `roxmltree` is used purely as a well-formedness probe, one parse per
//! `.xml` part, and its tree is discarded immediately after.

use crate::text;

use super::{GateFinding, Parts};

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut findings = Vec::new();
    for name in parts.xml_parts() {
        let Some(bytes) = parts.get(name) else { continue };
        let text = text::decode_lossy(bytes);
        if let Err(err) = roxmltree::Document::parse(&text) {
            findings.push(GateFinding::new(name, "parse_error", err.to_string()));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn parts(xml: &[(&str, &[u8])]) -> Parts {
        let mut by_name = BTreeMap::new();
        let mut names_in_order = Vec::new();
        for (name, bytes) in xml {
            by_name.insert(name.to_string(), bytes.to_vec());
            names_in_order.push(name.to_string());
        }
        Parts { by_name, names_in_order }
    }

    #[test]
    fn well_formed_xml_passes() {
        let p = parts(&[("xl/workbook.xml", b"<workbook><sheets/></workbook>")]);
        assert!(check(&p).is_empty());
    }

    #[test]
    fn unclosed_tag_is_a_finding() {
        let p = parts(&[("xl/workbook.xml", b"<workbook><sheets></workbook>")]);
        let findings = check(&p);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue, "parse_error");
    }

    #[test]
    fn non_xml_parts_are_skipped() {
        let p = parts(&[("xl/media/image1.png", b"\x89PNG not xml")]);
        assert!(check(&p).is_empty());
    }
}
