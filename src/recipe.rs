//! Recipe Model: `PatchOp` as a tagged sum over the four supported
//! operations, `PatchRecipe` as an ordered, serialisable list of them, and
//! the gate/pattern-derived recipe builders.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::gates::GateReport;
use crate::patterns::Pattern;

/// Reserved `match` values on a `literal_replace`: the engine must not
/// attempt these, and must instead record the op as skipped pending human
/// review. Part of the recipe contract; must round-trip exactly.
pub const REVIEW_REQUIRED: &str = "<REVIEW_REQUIRED>";
pub const FILL_IN_LINEFEED_VALUE: &str = "<FILL_IN_LINEFEED_VALUE>";
pub const FILL_IN_CLEAN_VALUE: &str = "<FILL_IN_CLEAN_VALUE>";

pub const STUB_SENTINELS: [&str; 3] = [REVIEW_REQUIRED, FILL_IN_LINEFEED_VALUE, FILL_IN_CLEAN_VALUE];

pub fn is_stub_sentinel(s: &str) -> bool {
    STUB_SENTINELS.contains(&s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Before,
    After,
}

impl Default for Position {
    fn default() -> Self {
        Position::Before
    }
}

fn default_occurrence() -> u32 {
    1
}

/// A single byte-level mutation instruction, tagged by `operation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PatchOp {
    LiteralReplace {
        id: String,
        part: String,
        description: String,
        #[serde(rename = "match")]
        match_: String,
        replacement: String,
        #[serde(default = "default_occurrence")]
        occurrence: u32,
    },
    AppendBlock {
        id: String,
        part: String,
        description: String,
        anchor: String,
        block: String,
        #[serde(default)]
        position: Position,
    },
    DeletePart {
        id: String,
        part: String,
        description: String,
    },
    SetPart {
        id: String,
        part: String,
        description: String,
        content: String,
    },
}

fn generate_id() -> String {
    let mut rng = rand::rng();
    let token: u32 = rng.random_range(0..0x1000000);
    format!("p{token:06x}")
}

impl PatchOp {
    pub fn literal_replace(part: impl Into<String>, description: impl Into<String>, match_: impl Into<String>, replacement: impl Into<String>, occurrence: u32) -> Self {
        PatchOp::LiteralReplace {
            id: generate_id(),
            part: part.into(),
            description: description.into(),
            match_: match_.into(),
            replacement: replacement.into(),
            occurrence,
        }
    }

    pub fn append_block(part: impl Into<String>, description: impl Into<String>, anchor: impl Into<String>, block: impl Into<String>, position: Position) -> Self {
        PatchOp::AppendBlock {
            id: generate_id(),
            part: part.into(),
            description: description.into(),
            anchor: anchor.into(),
            block: block.into(),
            position,
        }
    }

    pub fn delete_part(part: impl Into<String>, description: impl Into<String>) -> Self {
        PatchOp::DeletePart {
            id: generate_id(),
            part: part.into(),
            description: description.into(),
        }
    }

    pub fn set_part(part: impl Into<String>, description: impl Into<String>, content: impl Into<String>) -> Self {
        PatchOp::SetPart {
            id: generate_id(),
            part: part.into(),
            description: description.into(),
            content: content.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PatchOp::LiteralReplace { id, .. }
            | PatchOp::AppendBlock { id, .. }
            | PatchOp::DeletePart { id, .. }
            | PatchOp::SetPart { id, .. } => id,
        }
    }

    pub fn part(&self) -> &str {
        match self {
            PatchOp::LiteralReplace { part, .. }
            | PatchOp::AppendBlock { part, .. }
            | PatchOp::DeletePart { part, .. }
            | PatchOp::SetPart { part, .. } => part,
        }
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            PatchOp::LiteralReplace { .. } => "literal_replace",
            PatchOp::AppendBlock { .. } => "append_block",
            PatchOp::DeletePart { .. } => "delete_part",
            PatchOp::SetPart { .. } => "set_part",
        }
    }

    /// Dedup key used by `merge_recipes`: `(part, operation, match)`. Only
    /// `literal_replace` carries a `match`; other operations dedup on
    /// `(part, operation, None)`.
    fn dedup_key(&self) -> (String, &'static str, Option<String>) {
        let match_field = match self {
            PatchOp::LiteralReplace { match_, .. } => Some(match_.clone()),
            _ => None,
        };
        (self.part().to_string(), self.operation_name(), match_field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRecipe {
    pub version: String,
    pub source_file: String,
    pub created_at: String,
    pub patches: Vec<PatchOp>,
}

impl PatchRecipe {
    pub fn new(source_file: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            version: "1".to_string(),
            source_file: source_file.into(),
            created_at: created_at.into(),
            patches: Vec::new(),
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

fn now_iso8601_z() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Auto-generate minimal patch operations from a `GateReport` alone (no
/// diff required): conservative, gate-derivable fixes only.
pub fn recipe_from_gates(gate: &GateReport) -> PatchRecipe {
    let mut recipe = PatchRecipe::new(gate.path.clone(), now_iso8601_z());

    let calcchain_invalid = gate.findings("calcchain_invalid");
    if !calcchain_invalid.is_empty() {
        recipe.patches.push(PatchOp::delete_part(
            "xl/calcChain.xml",
            format!(
                "Drop xl/calcChain.xml ({} invalid entries). Excel will rebuild it on next open.",
                calcchain_invalid.len()
            ),
        ));
    }

    for issue in gate.findings("styles_dxf_integrity") {
        if issue.issue == "dxfs_count_mismatch" {
            let declared = issue.details.get("declared").and_then(|v| v.as_u64()).unwrap_or(0);
            let actual = issue.details.get("actual").and_then(|v| v.as_u64()).unwrap_or(0);
            recipe.patches.push(PatchOp::literal_replace(
                "xl/styles.xml",
                format!("Fix dxfs/@count: declared {declared}, actual {actual}."),
                format!(r#"count="{declared}""#),
                format!(r#"count="{actual}""#),
                1,
            ));
            break; // only one <dxfs> element
        }
    }

    for hit in gate.findings("tablecolumn_lf") {
        recipe.patches.push(PatchOp::literal_replace(
            hit.part.clone(),
            "Strip linefeed from tableColumn name= attribute. Set match/replacement manually after \
             inspecting the part."
                .to_string(),
            FILL_IN_LINEFEED_VALUE,
            FILL_IN_CLEAN_VALUE,
            1,
        ));
    }

    recipe
}

/// Translate detected diff patterns into patch operations. More precise
/// than a gate-only recipe because it has the actual diff, but several
/// patterns can only be expressed as human-review stubs.
pub fn recipe_from_patterns(source_file: impl Into<String>, patterns: &[Pattern]) -> PatchRecipe {
    let mut recipe = PatchRecipe::new(source_file, now_iso8601_z());

    for p in patterns {
        match p.name {
            "CALCCHAIN_DROP" => {
                recipe.patches.push(PatchOp::delete_part("xl/calcChain.xml", p.description.clone()));
            }
            "DXFS_INSERTION" => {
                recipe.patches.push(PatchOp::append_block(
                    "xl/styles.xml",
                    format!("{} — Fill in <dxf> content from repaired file diff.", p.description),
                    "</dxfs>",
                    "<!-- INSERT_DXF_ELEMENTS_HERE -->",
                    Position::Before,
                ));
            }
            "CF_DXFID_CLONE" | "SHARED_REF_TRIM" | "TABLE_STYLE_NORM" | "SHAREDSTRINGS_REBUILD" | "RELS_CLEANUP" => {
                for part in &p.affected_parts {
                    recipe.patches.push(PatchOp::literal_replace(
                        part.clone(),
                        format!(
                            "[{}] {} — Manual review required. Set match/replacement from the XML diff.",
                            p.name, p.description
                        ),
                        REVIEW_REQUIRED,
                        REVIEW_REQUIRED,
                        1,
                    ));
                }
            }
            _ => {}
        }
    }

    recipe
}

/// Merge multiple recipes, deduplicating by `(part, operation, match)`. Op
/// order is preserved: new ops append after existing ones.
pub fn merge_recipes(recipes: &[PatchRecipe]) -> PatchRecipe {
    let source_file = recipes.first().map(|r| r.source_file.clone()).unwrap_or_default();
    let mut merged = PatchRecipe::new(source_file, now_iso8601_z());
    let mut seen: HashSet<(String, &'static str, Option<String>)> = HashSet::new();

    for recipe in recipes {
        for op in &recipe.patches {
            let key = op.dedup_key();
            if seen.insert(key) {
                merged.patches.push(op.clone());
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_replace_round_trips_through_json() {
        let op = PatchOp::literal_replace("xl/styles.xml", "fix count", r#"count="5""#, r#"count="7""#, 1);
        let recipe = PatchRecipe { patches: vec![op], ..PatchRecipe::new("candidate.xlsx", "2024-01-01T00:00:00Z") };
        let json = recipe.to_json_string().unwrap();
        let parsed = PatchRecipe::from_json_str(&json).unwrap();
        assert_eq!(parsed.patches.len(), 1);
        assert_eq!(parsed.patches[0].id(), recipe.patches[0].id());
        assert_eq!(parsed.patches[0].operation_name(), "literal_replace");
    }

    #[test]
    fn merge_dedups_by_part_operation_match() {
        let op_a = PatchOp::delete_part("xl/calcChain.xml", "drop");
        let op_b = PatchOp::delete_part("xl/calcChain.xml", "drop again");
        let r1 = PatchRecipe { patches: vec![op_a], ..PatchRecipe::new("c.xlsx", "t") };
        let r2 = PatchRecipe { patches: vec![op_b], ..PatchRecipe::new("c.xlsx", "t") };
        let merged = merge_recipes(&[r1, r2]);
        assert_eq!(merged.patches.len(), 1);
    }

    #[test]
    fn merge_preserves_order_and_appends_new_ops() {
        let op1 = PatchOp::delete_part("xl/calcChain.xml", "drop");
        let op2 = PatchOp::literal_replace("xl/styles.xml", "fix", r#"count="5""#, r#"count="7""#, 1);
        let r1 = PatchRecipe { patches: vec![op1], ..PatchRecipe::new("c.xlsx", "t") };
        let r2 = PatchRecipe { patches: vec![op2], ..PatchRecipe::new("c.xlsx", "t") };
        let merged = merge_recipes(&[r1, r2]);
        assert_eq!(merged.patches.len(), 2);
        assert_eq!(merged.patches[0].operation_name(), "delete_part");
        assert_eq!(merged.patches[1].operation_name(), "literal_replace");
    }

    #[test]
    fn stub_sentinel_recognition() {
        assert!(is_stub_sentinel(REVIEW_REQUIRED));
        assert!(is_stub_sentinel(FILL_IN_LINEFEED_VALUE));
        assert!(!is_stub_sentinel("count=\"5\""));
    }
}
