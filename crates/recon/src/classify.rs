use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::mapping::{ColumnMapping, ColumnType};
use crate::row::ResultRow;
use crate::thresholds::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    Match,
    Mismatch,
}

impl CellStatus {
    fn from_bool(matched: bool) -> Self {
        if matched {
            Self::Match
        } else {
            Self::Mismatch
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "MATCH"),
            Self::Mismatch => write!(f, "MISMATCH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellVerdict {
    pub status: CellStatus,
    pub explanation: String,
}

impl CellVerdict {
    fn new(status: CellStatus, explanation: impl Into<String>) -> Self {
        Self { status, explanation: explanation.into() }
    }

    pub fn is_match(&self) -> bool {
        self.status == CellStatus::Match
    }
}

// ---------------------------------------------------------------------------
// Single cell
// ---------------------------------------------------------------------------

/// Classify one mapped column of one row. Never fails: absent columns read
/// as null and unusable hints are ignored.
pub fn classify(mapping: &ColumnMapping, row: &ResultRow, thresholds: &Thresholds) -> CellVerdict {
    match mapping.col_type {
        ColumnType::String => classify_string(mapping, row),
        ColumnType::Numeric => classify_numeric(mapping, row, thresholds),
        ColumnType::Other => classify_exact(mapping, row),
    }
}

fn classify_string(mapping: &ColumnMapping, row: &ResultRow) -> CellVerdict {
    // The service may normalize strings in ways not replicated here; its
    // verdict wins when present.
    if let Some(reported) = row.hint(&mapping.a_col).and_then(|h| h.string_recon.as_ref()) {
        return CellVerdict::new(
            hint_status(reported),
            format!("Service string comparison: {}", display_value(reported)),
        );
    }

    let a = row.value_a(mapping);
    let b = row.value_b(mapping);
    let matched = match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => coerce_string(a).to_lowercase() == coerce_string(b).to_lowercase(),
    };

    if matched {
        CellVerdict::new(CellStatus::Match, "Values match (case-insensitive)")
    } else {
        CellVerdict::new(CellStatus::Mismatch, both_values(a, b))
    }
}

fn classify_numeric(
    mapping: &ColumnMapping,
    row: &ResultRow,
    thresholds: &Thresholds,
) -> CellVerdict {
    let hint = row.hint(&mapping.a_col);
    let abs_diff = hint.and_then(|h| h.abs_diff).filter(|d| !d.is_nan());
    let rel_diff = hint.and_then(|h| h.rel_diff).filter(|d| !d.is_nan());

    // A missing diff is not a breach.
    let abs_ok = abs_diff.map_or(true, |d| d.abs() <= thresholds.abs);
    let rel_ok = rel_diff.map_or(true, |d| d.abs() <= thresholds.rel);
    let status = CellStatus::from_bool(abs_ok && rel_ok);

    let lead = match status {
        CellStatus::Match => "Within tolerance",
        CellStatus::Mismatch => "Outside tolerance",
    };
    CellVerdict::new(
        status,
        format!(
            "{lead}: abs diff {} (limit {}), rel diff {} (limit {})",
            display_diff(abs_diff),
            thresholds.abs,
            display_diff(rel_diff),
            thresholds.rel,
        ),
    )
}

fn classify_exact(mapping: &ColumnMapping, row: &ResultRow) -> CellVerdict {
    let a = row.value_a(mapping);
    let b = row.value_b(mapping);
    if strict_eq(a, b) {
        CellVerdict::new(CellStatus::Match, format!("Values are identical ({})", display_value(a)))
    } else {
        CellVerdict::new(CellStatus::Mismatch, both_values(a, b))
    }
}

/// A reported string verdict: `"MATCH"` (any case) or `true` is a match,
/// everything else is not.
fn hint_status(reported: &Value) -> CellStatus {
    let matched = match reported {
        Value::String(s) => s.trim().eq_ignore_ascii_case("MATCH"),
        Value::Bool(b) => *b,
        _ => false,
    };
    CellStatus::from_bool(matched)
}

/// Strict equality with no type coercion. Numbers compare by value so that
/// `1` and `1.0` agree. Arrays and objects have identity semantics and are
/// never equal to anything, themselves included.
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Largest integer an f64 represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// String form used for case-insensitive comparison. Integral floats drop
/// the trailing `.0`, so `10.0` reads as `"10"`.
fn coerce_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_diff(diff: Option<f64>) -> String {
    diff.map_or_else(|| "n/a".to_string(), |d| d.to_string())
}

fn both_values(a: &Value, b: &Value) -> String {
    format!("A = {}, B = {}", display_value(a), display_value(b))
}

// ---------------------------------------------------------------------------
// Rows and summary
// ---------------------------------------------------------------------------

/// One classified cell with the values it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellReport {
    pub a_col: String,
    pub b_col: String,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
    pub a_value: Value,
    pub b_value: Value,
    #[serde(flatten)]
    pub verdict: CellVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowVerdicts {
    pub cells: Vec<CellReport>,
}

impl RowVerdicts {
    pub fn has_mismatch(&self) -> bool {
        self.cells.iter().any(|c| !c.verdict.is_match())
    }
}

/// Classify every mapping against one row, in mapping order.
pub fn classify_row(
    mappings: &[ColumnMapping],
    row: &ResultRow,
    thresholds: &Thresholds,
) -> RowVerdicts {
    let cells = mappings
        .iter()
        .map(|m| CellReport {
            a_col: m.a_col.clone(),
            b_col: m.b_col.clone(),
            col_type: m.col_type,
            a_value: row.value_a(m).clone(),
            b_value: row.value_b(m).clone(),
            verdict: classify(m, row, thresholds),
        })
        .collect();
    RowVerdicts { cells }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerdictSummary {
    pub rows: usize,
    pub cells: usize,
    pub matches: usize,
    pub mismatches: usize,
    pub rows_with_mismatch: usize,
    /// Mismatch count per `a_col`.
    pub mismatches_by_column: BTreeMap<String, usize>,
}

pub fn summarize(rows: &[RowVerdicts]) -> VerdictSummary {
    let mut summary = VerdictSummary { rows: rows.len(), ..VerdictSummary::default() };

    for row in rows {
        if row.has_mismatch() {
            summary.rows_with_mismatch += 1;
        }
        for cell in &row.cells {
            summary.cells += 1;
            match cell.verdict.status {
                CellStatus::Match => summary.matches += 1,
                CellStatus::Mismatch => {
                    summary.mismatches += 1;
                    *summary.mismatches_by_column.entry(cell.a_col.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    summary
}
