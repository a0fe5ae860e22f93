//! Pipeline Orchestrator: composes the gate battery, differ, pattern
//! classifier, recipe builder, patch engine, and cloud probe into one
//! typed, stateless call.

use std::path::{Path, PathBuf};

use crate::cloud_probe::{self, CloudProbeCredentials, CloudProbeResult};
use crate::differ::{self, DiffReport};
use crate::error::Result;
use crate::gates::{self, GateReport};
use crate::patch::{self, PatchOutcome};
use crate::patterns::{self, Pattern};
use crate::recipe::{self, PatchRecipe};

/// Everything the orchestrator needs up front. `repaired_path`,
/// `apply_patch_to`, and `cloud_credentials` are each optional and gate
/// whether their corresponding phase runs at all.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// A host-repaired copy of the candidate, if one was captured. Present
    /// only when the caller actually observed Excel repair the file.
    pub repaired_path: Option<PathBuf>,
    /// Where to write a patched copy. Presence of this field is the
    /// "explicit request" the patch engine phase requires.
    pub apply_patch_to: Option<PathBuf>,
    /// Bearer-token credentials for the cloud probe. Absence skips that
    /// phase entirely.
    pub cloud_credentials: Option<CloudProbeCredentials>,
    /// Remote file name to use when the cloud probe uploads the candidate.
    /// Defaults to the candidate's file name if unset.
    pub cloud_remote_name: Option<String>,
}

/// The typed result of one phase handing its output to the next. Any
/// phase the options didn't request is `None`.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub gate_report: GateReport,
    pub diff_report: Option<DiffReport>,
    pub patterns: Vec<Pattern>,
    pub recipe: PatchRecipe,
    /// `Some(Err(..))` is a legitimate terminal state for this phase: a
    /// `PatchError`/`PatchWarning` does not abort the pipeline, it's simply
    /// what the patch phase produced.
    pub patch_result: Option<Result<PatchOutcome>>,
    pub cloud_probe_result: Option<CloudProbeResult>,
}

/// Run the full pipeline against a candidate package on disk.
///
/// Phase order: Gate Checks (always) -> Differ + Pattern Classifier (only
/// if `repaired_path` is set) -> Recipe builder (always, merging
/// gate-derived and pattern-derived recipes when both exist) -> Patch
/// Engine (only if `apply_patch_to` is set) -> Cloud probe (only if
/// credentials are set). Each phase consumes the prior phase's typed
/// output; phases share no mutable state.
pub fn run(candidate_path: impl AsRef<Path>, options: &PipelineOptions) -> Result<PipelineOutcome> {
    let candidate_path = candidate_path.as_ref();

    let gate_report = gates::run_all(candidate_path)?;

    let mut diff_report = None;
    let mut detected_patterns = Vec::new();
    if let Some(repaired_path) = &options.repaired_path {
        let diff = differ::diff_packages(&candidate_path.to_string_lossy(), &repaired_path.to_string_lossy())?;
        detected_patterns = patterns::detect_all(&diff);
        diff_report = Some(diff);
    }

    let gate_recipe = recipe::recipe_from_gates(&gate_report);
    let recipe = if detected_patterns.is_empty() {
        gate_recipe
    } else {
        let pattern_recipe = recipe::recipe_from_patterns(candidate_path.to_string_lossy().to_string(), &detected_patterns);
        recipe::merge_recipes(&[gate_recipe, pattern_recipe])
    };

    let patch_result = options
        .apply_patch_to
        .as_ref()
        .map(|output_path| patch::apply_recipe(candidate_path, &recipe, output_path));

    let cloud_probe_result = options.cloud_credentials.as_ref().map(|creds| {
        let remote_name = options.cloud_remote_name.clone().unwrap_or_else(|| {
            candidate_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "candidate.xlsx".to_string())
        });
        cloud_probe::probe_upload_and_test(creds, candidate_path, &remote_name)
    });

    Ok(PipelineOutcome {
        gate_report,
        diff_report,
        patterns: detected_patterns,
        recipe,
        patch_result,
        cloud_probe_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
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

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn clean_workbook_runs_gate_phase_only_and_produces_empty_recipe() {
        let candidate = write_temp(&zip_bytes(&[("xl/workbook.xml", b"<workbook/>")]));
        let options = PipelineOptions::default();
        let outcome = run(candidate.path(), &options).unwrap();
        assert!(outcome.gate_report.pass());
        assert!(outcome.recipe.patches.is_empty());
        assert!(outcome.diff_report.is_none());
        assert!(outcome.patch_result.is_none());
        assert!(outcome.cloud_probe_result.is_none());
    }

    #[test]
    fn calcchain_dangling_entry_produces_delete_part_recipe() {
        let candidate = write_temp(&zip_bytes(&[
            (
                "xl/worksheets/sheet1.xml",
                b"<worksheet><sheetData><row r=\"1\"><c r=\"A1\"><v>1</v></c></row></sheetData></worksheet>",
            ),
            ("xl/calcChain.xml", br#"<calcChain><c r="A1" i="1"/></calcChain>"#),
        ]));
        let options = PipelineOptions::default();
        let outcome = run(candidate.path(), &options).unwrap();
        assert!(!outcome.gate_report.gate_passes("calcchain_invalid"));
        assert_eq!(outcome.recipe.patches.len(), 1);
        assert_eq!(outcome.recipe.patches[0].operation_name(), "delete_part");
    }

    #[test]
    fn repaired_package_triggers_diff_and_pattern_phases() {
        let candidate_bytes = zip_bytes(&[
            ("xl/workbook.xml", b"<workbook/>"),
            ("xl/calcChain.xml", b"<calcChain/>"),
        ]);
        let repaired_bytes = zip_bytes(&[("xl/workbook.xml", b"<workbook/>")]);
        let candidate = write_temp(&candidate_bytes);
        let repaired = write_temp(&repaired_bytes);

        let options = PipelineOptions {
            repaired_path: Some(repaired.path().to_path_buf()),
            ..Default::default()
        };
        let outcome = run(candidate.path(), &options).unwrap();
        let diff = outcome.diff_report.unwrap();
        assert_eq!(diff.removed().count(), 1);
        assert!(outcome.patterns.iter().any(|p| p.name == "CALCCHAIN_DROP"));
    }

    #[test]
    fn explicit_patch_request_applies_recipe() {
        let candidate = write_temp(&zip_bytes(&[
            (
                "xl/worksheets/sheet1.xml",
                b"<worksheet><sheetData><row r=\"1\"><c r=\"A1\"><v>1</v></c></row></sheetData></worksheet>",
            ),
            ("xl/calcChain.xml", br#"<calcChain><c r="A1" i="1"/></calcChain>"#),
        ]));
        let output = tempfile::NamedTempFile::new().unwrap();
        let options = PipelineOptions {
            apply_patch_to: Some(output.path().to_path_buf()),
            ..Default::default()
        };
        let outcome = run(candidate.path(), &options).unwrap();
        let patch_result = outcome.patch_result.unwrap();
        assert!(patch_result.is_ok());
    }

    #[test]
    fn no_patch_request_leaves_patch_result_none() {
        let candidate = write_temp(&zip_bytes(&[("xl/workbook.xml", b"<workbook/>")]));
        let options = PipelineOptions::default();
        let outcome = run(candidate.path(), &options).unwrap();
        assert!(outcome.patch_result.is_none());
    }
}
