//! Diagnose and byte-level repair OOXML workbook packages that trigger
//! Excel's "we found a problem" repair banner.
//!
//! The crate is organised around one diagnosis-and-repair pipeline:
//! a [`scanner`] enumerates package parts, a [`gates`] battery runs
//! structural hazard checks, a [`differ`] compares a candidate against a
//! host-repaired copy when one is available, a [`patterns`] classifier
//! maps diff evidence onto a named catalogue, a [`recipe`] model
//! describes byte-level fixes, a [`patch`] engine applies them, and
//! [`pipeline`] composes all of the above. [`cloud_probe`] is the
//! optional external boundary that exercises a hosted spreadsheet
//! service.

pub mod cloud_probe;
pub mod colref;
pub mod differ;
pub mod error;
pub mod gates;
pub mod patch;
pub mod patterns;
pub mod pipeline;
pub mod recipe;
pub mod scanner;
mod text;

pub use cloud_probe::{CloudProbeCredentials, CloudProbeResult};
pub use differ::{diff_bytes, diff_packages, DiffReport, PartDelta, PartStatus};
pub use error::{PatchOpError, Result, TriageError};
pub use gates::{run_all as run_gates, run_all_bytes as run_gates_bytes, ActiveTabInfo, GateFinding, GateReport};
pub use patch::{apply_recipe, apply_recipe_bytes, PatchOutcome};
pub use patterns::{detect_all as detect_patterns, Confidence, Pattern};
pub use pipeline::{run as run_pipeline, PipelineOptions, PipelineOutcome};
pub use recipe::{merge_recipes, recipe_from_gates, recipe_from_patterns, PatchOp, PatchRecipe, Position};
pub use scanner::{scan, scan_bytes, PartInfo, ScanResult};
