use std::path::PathBuf;

/// A single failed or skipped operation recorded during patch application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOpError {
    pub op_id: String,
    pub part: String,
    pub message: String,
}

impl std::fmt::Display for PatchOpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.op_id, self.part, self.message)
    }
}

/// Top-level failures raised by the triage engine.
///
/// Package-level and per-op failures are collected by their phase and only
/// surfaced here once the phase has finished.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("'{path}' could not be opened as a ZIP package: {source}")]
    InvalidPackage {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("'{path}' could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more patch operations failed outright. The output archive was
    /// still written (it preserves post-mortem evidence) but may be
    /// incomplete.
    #[error("patch application failed with {} error(s): {}", .errors.len(), join_errors(.errors))]
    PatchError { errors: Vec<PatchOpError> },

    /// Every hard operation succeeded; only stub placeholders were skipped.
    /// The output archive is valid and usable as-is.
    #[error("patch applied with {} stub(s) requiring review: {}", .skipped.len(), join_errors(.skipped))]
    PatchWarning {
        output_path: PathBuf,
        skipped: Vec<PatchOpError>,
    },

    #[error("recipe is malformed: {0}")]
    MalformedRecipe(String),
}

fn join_errors(errors: &[PatchOpError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, TriageError>;
