//! Result rows and their per-column diff hints.
//!
//! The service flattens hints into the row under `<a_col>_abs_diff`,
//! `<a_col>_rel_diff` and `<a_col>_string_recon`. [`ResultRow::from_wire`]
//! is the only code that knows those names; everything downstream reads
//! [`DiffHint`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ClassificationAnomaly;
use crate::mapping::ColumnMapping;
use crate::wire::WireRow;

const ABS_DIFF_SUFFIX: &str = "_abs_diff";
const REL_DIFF_SUFFIX: &str = "_rel_diff";
const STRING_RECON_SUFFIX: &str = "_string_recon";

static NULL: Value = Value::Null;

/// Backend-computed comparison data for one mapped column of one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffHint {
    pub abs_diff: Option<f64>,
    pub rel_diff: Option<f64>,
    /// Pre-computed string verdict, kept exactly as the service sent it.
    pub string_recon: Option<Value>,
}

impl DiffHint {
    pub fn is_empty(&self) -> bool {
        self.abs_diff.is_none() && self.rel_diff.is_none() && self.string_recon.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultRow {
    pub values: BTreeMap<String, Value>,
    /// Keyed by `a_col`.
    pub hints: BTreeMap<String, DiffHint>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn with_hint(mut self, a_col: impl Into<String>, hint: DiffHint) -> Self {
        self.hints.insert(a_col.into(), hint);
        self
    }

    /// Split a service row into values and typed hints for `mappings`.
    ///
    /// Hint keys of mapped columns are lifted out of the values. A diff
    /// that is not a number is dropped (logged at debug level).
    pub fn from_wire(row: &WireRow, mappings: &[ColumnMapping]) -> Self {
        let mut values: BTreeMap<String, Value> =
            row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut hints = BTreeMap::new();

        for mapping in mappings {
            let col = &mapping.a_col;
            if hints.contains_key(col) {
                continue;
            }
            let abs_raw = values.remove(&format!("{col}{ABS_DIFF_SUFFIX}"));
            let rel_raw = values.remove(&format!("{col}{REL_DIFF_SUFFIX}"));
            let string_recon = values
                .remove(&format!("{col}{STRING_RECON_SUFFIX}"))
                .filter(|v| !v.is_null());

            let hint = DiffHint {
                abs_diff: numeric_hint(col, "abs_diff", abs_raw),
                rel_diff: numeric_hint(col, "rel_diff", rel_raw),
                string_recon,
            };
            if !hint.is_empty() {
                hints.insert(col.clone(), hint);
            }
        }

        Self { values, hints }
    }

    pub fn hint(&self, a_col: &str) -> Option<&DiffHint> {
        self.hints.get(a_col)
    }

    /// Dataset A's value for a mapping: `<a_col>_a` when the service
    /// disambiguated the column, otherwise `a_col`. Absent reads as null.
    pub fn value_a(&self, mapping: &ColumnMapping) -> &Value {
        self.side_value(&mapping.a_col, "_a")
    }

    /// Dataset B's value for a mapping, see [`value_a`](Self::value_a).
    pub fn value_b(&self, mapping: &ColumnMapping) -> &Value {
        self.side_value(&mapping.b_col, "_b")
    }

    fn side_value(&self, col: &str, suffix: &str) -> &Value {
        self.values
            .get(&format!("{col}{suffix}"))
            .or_else(|| self.values.get(col))
            .unwrap_or(&NULL)
    }
}

/// Read a diff hint as `f64`. Absent and null read as `None`; so does
/// anything that is not a finite number, which is also logged.
fn numeric_hint(column: &str, hint: &'static str, raw: Option<Value>) -> Option<f64> {
    let raw = raw?;
    let parsed = match &raw {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed.filter(|v| v.is_finite()) {
        Some(v) => Some(v),
        None => {
            let anomaly = ClassificationAnomaly { column: column.to_string(), hint, raw };
            log::debug!("ignoring diff hint: {anomaly}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ColumnType;
    use serde_json::json;

    fn wire(value: Value) -> WireRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lifts_hints_out_of_values() {
        let mappings = vec![
            ColumnMapping::new("amount", "amt", ColumnType::Numeric, 0.9),
            ColumnMapping::new("name", "name", ColumnType::String, 0.9),
        ];
        let row = ResultRow::from_wire(
            &wire(json!({
                "amount": 10.0,
                "amt": 10.02,
                "amount_abs_diff": 0.02,
                "amount_rel_diff": "0.002",
                "name_string_recon": "MATCH",
                "desk": "FX",
            })),
            &mappings,
        );
        let amount = row.hint("amount").unwrap();
        assert_eq!(amount.abs_diff, Some(0.02));
        assert_eq!(amount.rel_diff, Some(0.002));
        assert_eq!(row.hint("name").unwrap().string_recon, Some(json!("MATCH")));
        assert!(!row.values.contains_key("amount_abs_diff"));
        assert!(row.values.contains_key("desk"));
    }

    #[test]
    fn non_numeric_hint_is_dropped() {
        let mappings = vec![ColumnMapping::new("amount", "amount", ColumnType::Numeric, 0.9)];
        let row = ResultRow::from_wire(
            &wire(json!({ "amount_abs_diff": "n/a", "amount_rel_diff": null })),
            &mappings,
        );
        assert!(row.hint("amount").is_none());
    }

    #[test]
    fn unmapped_hint_keys_stay_in_values() {
        let row = ResultRow::from_wire(&wire(json!({ "other_abs_diff": 1.0 })), &[]);
        assert!(row.hints.is_empty());
        assert_eq!(row.values["other_abs_diff"], json!(1.0));
    }

    #[test]
    fn side_values_prefer_suffixed_columns() {
        let mapping = ColumnMapping::new("name", "name", ColumnType::String, 0.9);
        let row = ResultRow::new()
            .with_value("name_a", json!("Acme"))
            .with_value("name_b", json!("ACME"));
        assert_eq!(row.value_a(&mapping), &json!("Acme"));
        assert_eq!(row.value_b(&mapping), &json!("ACME"));

        let plain = ColumnMapping::new("note", "memo", ColumnType::String, 0.9);
        let row = ResultRow::new().with_value("note", json!("x"));
        assert_eq!(row.value_a(&plain), &json!("x"));
        assert_eq!(row.value_b(&plain), &Value::Null);
    }
}
