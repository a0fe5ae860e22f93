//! Patch Engine: applies a `PatchRecipe` to a package as byte-level
//! mutations and re-packs it, without ever reserializing XML. Hard errors
//! and stub skips are accumulated separately so the caller can distinguish
//! "the engine is broken" from "a human must fill in a template".

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{PatchOpError, Result, TriageError};
use crate::recipe::{is_stub_sentinel, PatchOp, PatchRecipe, Position};

/// The outcome of a successful (or partially successful) patch application.
/// The output file always exists once this is returned or a `PatchError`/
/// `PatchWarning` is raised.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub output_path: PathBuf,
    pub skipped: Vec<PatchOpError>,
}

/// Apply `recipe` to the package at `source_path`, writing the result to
/// `output_path`. Returns the written path on full success; raises
/// `TriageError::PatchWarning` if only stubs were skipped, or
/// `TriageError::PatchError` if any hard op failure occurred (it
/// supersedes `PatchWarning` when both occur).
pub fn apply_recipe(
    source_path: impl AsRef<Path>,
    recipe: &PatchRecipe,
    output_path: impl AsRef<Path>,
) -> Result<PatchOutcome> {
    let source_path = source_path.as_ref();
    let bytes = std::fs::read(source_path).map_err(|source| TriageError::Io {
        path: source_path.to_path_buf(),
        source,
    })?;
    apply_recipe_bytes(&bytes, source_path.to_string_lossy().as_ref(), recipe, output_path)
}

/// Same as `apply_recipe` but takes the source package already loaded into
/// memory (used by tests and by callers that already hold the bytes).
pub fn apply_recipe_bytes(
    source_bytes: &[u8],
    source_label: &str,
    recipe: &PatchRecipe,
    output_path: impl AsRef<Path>,
) -> Result<PatchOutcome> {
    let output_path = output_path.as_ref().to_path_buf();

    // 1. Load every ZIP entry into an in-memory map, preserving insertion
    // order so the output archive's entry order is deterministic.
    let mut parts: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut names_in_order = Vec::new();
    {
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(source_bytes)).map_err(|source| {
            TriageError::InvalidPackage {
                path: source_label.into(),
                source,
            }
        })?;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|source| TriageError::InvalidPackage {
                path: source_label.into(),
                source,
            })?;
            let name = entry.name().to_string();
            let mut raw = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut raw).map_err(|source| TriageError::Io {
                path: name.clone().into(),
                source,
            })?;
            names_in_order.push(name.clone());
            parts.insert(name, raw);
        }
    }

    let mut deleted: HashSet<String> = HashSet::new();
    let mut hard_errors: Vec<PatchOpError> = Vec::new();
    let mut skipped: Vec<PatchOpError> = Vec::new();

    // 2. Apply ops strictly in recipe order.
    for op in &recipe.patches {
        if let PatchOp::LiteralReplace { match_, .. } = op {
            if is_stub_sentinel(match_) {
                skipped.push(PatchOpError {
                    op_id: op.id().to_string(),
                    part: op.part().to_string(),
                    message: "skipped — requires human review".to_string(),
                });
                continue;
            }
        }

        if matches!(op, PatchOp::DeletePart { .. }) {
            if parts.contains_key(op.part()) {
                deleted.insert(op.part().to_string());
            } else {
                hard_errors.push(PatchOpError {
                    op_id: op.id().to_string(),
                    part: op.part().to_string(),
                    message: format!("delete_part: '{}' not in archive (already absent?)", op.part()),
                });
            }
            continue;
        }

        if matches!(op, PatchOp::SetPart { .. }) {
            if let PatchOp::SetPart { content, .. } = op {
                let name = op.part().to_string();
                if !names_in_order.contains(&name) {
                    names_in_order.push(name.clone());
                }
                parts.insert(name, content.clone().into_bytes());
            }
            continue;
        }

        let Some(current) = parts.get(op.part()) else {
            hard_errors.push(PatchOpError {
                op_id: op.id().to_string(),
                part: op.part().to_string(),
                message: format!("part '{}' not found in archive", op.part()),
            });
            continue;
        };

        match apply_one(current, op) {
            Ok(new_bytes) => {
                parts.insert(op.part().to_string(), new_bytes);
            }
            Err(message) => {
                hard_errors.push(PatchOpError {
                    op_id: op.id().to_string(),
                    part: op.part().to_string(),
                    message,
                });
            }
        }
    }

    // 3. Write the output ZIP with deterministic entry order, excluding
    // deletions. The output file is always produced, even on hard errors.
    write_zip(&output_path, &names_in_order, &parts, &deleted)?;

    // 4. Decide the outcome.
    if !hard_errors.is_empty() {
        return Err(TriageError::PatchError { errors: hard_errors });
    }
    if !skipped.is_empty() {
        return Err(TriageError::PatchWarning {
            output_path,
            skipped,
        });
    }
    Ok(PatchOutcome {
        output_path,
        skipped: Vec::new(),
    })
}

/// Apply a single non-`delete_part`/`set_part` operation's pure function to
/// `data`. Returns `Err(message)` on op-level failure (match/anchor not
/// found, unknown position).
fn apply_one(data: &[u8], op: &PatchOp) -> std::result::Result<Vec<u8>, String> {
    match op {
        PatchOp::LiteralReplace {
            match_,
            replacement,
            occurrence,
            ..
        } => literal_replace(data, match_.as_bytes(), replacement.as_bytes(), *occurrence),
        PatchOp::AppendBlock {
            anchor,
            block,
            position,
            ..
        } => append_block(data, anchor.as_bytes(), block.as_bytes(), *position),
        PatchOp::DeletePart { .. } | PatchOp::SetPart { .. } => {
            unreachable!("delete_part/set_part are handled by the caller before reaching here")
        }
    }
}

/// Replace the nth (1-based) occurrence of `match_` with `replacement`.
fn literal_replace(data: &[u8], match_: &[u8], replacement: &[u8], occurrence: u32) -> std::result::Result<Vec<u8>, String> {
    if occurrence == 0 {
        return Err("literal_replace: occurrence must be >= 1".to_string());
    }
    let mut search_from = 0usize;
    let mut found_at = None;
    for _ in 0..occurrence {
        match crate::text::find(&data[search_from..], match_) {
            Some(rel) => {
                found_at = Some(search_from + rel);
                search_from = found_at.unwrap() + 1;
            }
            None => {
                found_at = None;
                break;
            }
        }
    }
    let Some(idx) = found_at else {
        let preview = String::from_utf8_lossy(&match_[..match_.len().min(80)]);
        return Err(format!("literal_replace: match not found (occurrence {occurrence}): {preview:?}"));
    };
    let mut out = Vec::with_capacity(data.len() - match_.len() + replacement.len());
    out.extend_from_slice(&data[..idx]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&data[idx + match_.len()..]);
    Ok(out)
}

/// Insert `block` immediately before or after the first occurrence of
/// `anchor`.
fn append_block(data: &[u8], anchor: &[u8], block: &[u8], position: Position) -> std::result::Result<Vec<u8>, String> {
    let Some(idx) = crate::text::find(data, anchor) else {
        let preview = String::from_utf8_lossy(&anchor[..anchor.len().min(80)]);
        return Err(format!("append_block: anchor not found: {preview:?}"));
    };
    let insert_at = match position {
        Position::Before => idx,
        Position::After => idx + anchor.len(),
    };
    let mut out = Vec::with_capacity(data.len() + block.len());
    out.extend_from_slice(&data[..insert_at]);
    out.extend_from_slice(block);
    out.extend_from_slice(&data[insert_at..]);
    Ok(out)
}

fn write_zip(
    output_path: &Path,
    names_in_order: &[String],
    parts: &BTreeMap<String, Vec<u8>>,
    deleted: &HashSet<String>,
) -> Result<()> {
    let file = std::fs::File::create(output_path).map_err(|source| TriageError::Io {
        path: output_path.to_path_buf(),
        source,
    })?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    let mut written = HashSet::new();
    for name in names_in_order {
        if deleted.contains(name) || written.contains(name) {
            continue;
        }
        written.insert(name.clone());
        let Some(bytes) = parts.get(name) else { continue };
        writer.start_file(name, options).map_err(|source| TriageError::InvalidPackage {
            path: output_path.to_path_buf(),
            source,
        })?;
        writer.write_all(bytes).map_err(|source| TriageError::Io {
            path: output_path.to_path_buf(),
            source,
        })?;
    }
    writer.finish().map_err(|source| TriageError::InvalidPackage {
        path: output_path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn zip_bytes(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = std::io::Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(cursor);
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn read_back(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let bytes = std::fs::read(path).unwrap();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut raw = Vec::new();
            entry.read_to_end(&mut raw).unwrap();
            out.insert(entry.name().to_string(), raw);
        }
        out
    }

    #[test]
    fn empty_recipe_is_byte_identical_round_trip() {
        let src = zip_bytes(&[("xl/workbook.xml", b"<workbook/>"), ("xl/styles.xml", b"<styleSheet/>")]);
        let recipe = PatchRecipe::new("c.xlsx", "t");
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let outcome = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap();
        assert!(outcome.skipped.is_empty());
        let result = read_back(&outcome.output_path);
        assert_eq!(result.get("xl/workbook.xml").unwrap().as_slice(), b"<workbook/>");
        assert_eq!(result.get("xl/styles.xml").unwrap().as_slice(), b"<styleSheet/>");
    }

    #[test]
    fn literal_replace_then_inverse_restores_original() {
        let src = zip_bytes(&[("xl/styles.xml", br#"<dxfs count="5"></dxfs>"#)]);
        let mut recipe = PatchRecipe::new("c.xlsx", "t");
        recipe.patches.push(PatchOp::literal_replace("xl/styles.xml", "fwd", r#"count="5""#, r#"count="7""#, 1));
        recipe.patches.push(PatchOp::literal_replace("xl/styles.xml", "inv", r#"count="7""#, r#"count="5""#, 1));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let outcome = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap();
        let result = read_back(&outcome.output_path);
        assert_eq!(result.get("xl/styles.xml").unwrap().as_slice(), br#"<dxfs count="5"></dxfs>"#);
    }

    #[test]
    fn stub_only_recipe_leaves_output_identical_and_warns() {
        let src = zip_bytes(&[("xl/tables/table1.xml", b"<table name=\"T\"/>")]);
        let mut recipe = PatchRecipe::new("c.xlsx", "t");
        recipe.patches.push(PatchOp::literal_replace(
            "xl/tables/table1.xml",
            "stub",
            crate::recipe::FILL_IN_LINEFEED_VALUE,
            crate::recipe::FILL_IN_CLEAN_VALUE,
            1,
        ));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap_err();
        match err {
            TriageError::PatchWarning { output_path, skipped } => {
                assert_eq!(skipped.len(), 1);
                let result = read_back(&output_path);
                assert_eq!(result.get("xl/tables/table1.xml").unwrap().as_slice(), b"<table name=\"T\"/>");
            }
            other => panic!("expected PatchWarning, got {other:?}"),
        }
    }

    #[test]
    fn mixed_valid_and_stub_ops_apply_real_op_and_warn() {
        let src = zip_bytes(&[("xl/worksheets/sheet1.xml", b"HELLO")]);
        let mut recipe = PatchRecipe::new("c.xlsx", "t");
        recipe.patches.push(PatchOp::literal_replace("xl/worksheets/sheet1.xml", "real", "HELLO", "PATCHED", 1));
        recipe.patches.push(PatchOp::literal_replace(
            "xl/worksheets/sheet1.xml",
            "stub",
            crate::recipe::REVIEW_REQUIRED,
            crate::recipe::REVIEW_REQUIRED,
            1,
        ));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap_err();
        match err {
            TriageError::PatchWarning { output_path, skipped } => {
                assert_eq!(skipped.len(), 1);
                let result = read_back(&output_path);
                assert_eq!(result.get("xl/worksheets/sheet1.xml").unwrap().as_slice(), b"PATCHED");
            }
            other => panic!("expected PatchWarning, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_match_raises_patch_error_but_output_still_exists() {
        let src = zip_bytes(&[("xl/workbook.xml", b"<workbook/>")]);
        let mut recipe = PatchRecipe::new("c.xlsx", "t");
        recipe.patches.push(PatchOp::literal_replace("xl/workbook.xml", "bad", "NOPE", "X", 1));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap_err();
        match err {
            TriageError::PatchError { errors } => assert_eq!(errors.len(), 1),
            other => panic!("expected PatchError, got {other:?}"),
        }
        assert!(tmp.path().exists());
    }

    #[test]
    fn delete_part_removes_entry_from_output() {
        let src = zip_bytes(&[("xl/calcChain.xml", b"<calcChain/>"), ("xl/workbook.xml", b"<workbook/>")]);
        let mut recipe = PatchRecipe::new("c.xlsx", "t");
        recipe.patches.push(PatchOp::delete_part("xl/calcChain.xml", "drop"));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let outcome = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap();
        let result = read_back(&outcome.output_path);
        assert!(!result.contains_key("xl/calcChain.xml"));
        assert!(result.contains_key("xl/workbook.xml"));
    }

    #[test]
    fn delete_part_on_absent_entry_is_a_hard_error() {
        let src = zip_bytes(&[("xl/workbook.xml", b"<workbook/>")]);
        let mut recipe = PatchRecipe::new("c.xlsx", "t");
        recipe.patches.push(PatchOp::delete_part("xl/calcChain.xml", "already gone"));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = apply_recipe_bytes(&src, "c.xlsx", &recipe, tmp.path()).unwrap_err();
        assert!(matches!(err, TriageError::PatchError { .. }));
    }
}
