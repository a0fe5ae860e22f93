//! Gate 10: broken relationships.
//!
//! Every part ending `.rels` lists `<Relationship Target="..."/>` entries
//! for its owner part. `External` targets are out of scope (they point
//! outside the package). Everything else must resolve, relative to the
//! owner directory, to a part that actually exists in the archive.

use crate::text;

use super::{GateFinding, Parts};

pub(crate) fn check(parts: &Parts) -> Vec<GateFinding> {
    let mut findings = Vec::new();

    for rels in parts.rels_parts() {
        let Some(bytes) = parts.get(rels) else { continue };
        let owner = owner_dir(rels);

        for (start, end) in text::find_open_tags(bytes, "Relationship") {
            let tag = &bytes[start..end];
            if text::find(tag, b"External").is_some() {
                continue;
            }
            let Some(target) = text::attr_value(tag, "Target") else {
                continue;
            };
            let resolved = resolve_target(&owner, &target);
            if !parts.contains(&resolved) {
                findings.push(
                    GateFinding::new(rels, "broken_relationship", resolved.clone())
                        .with("target", target.into_owned())
                        .with("resolved", resolved),
                );
            }
        }
    }

    findings
}

/// The directory that owns a `.rels` file: `.rels` lives in a `_rels`
/// subdirectory of the part it describes, so the owner is the parent of
/// that `_rels` directory.
fn owner_dir(rels_path: &str) -> String {
    let base = match rels_path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    match base.rsplit_once('/') {
        Some((owner, _)) => owner.to_string(),
        None => String::new(),
    }
}

fn resolve_target(owner: &str, target: &str) -> String {
    let joined = format!("{owner}/{target}").replace("//", "/");
    joined
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}
