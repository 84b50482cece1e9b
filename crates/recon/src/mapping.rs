//! Suggested column mappings and the user's approval of them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Suggestions at or above this confidence start out approved.
pub const DEFAULT_APPROVAL_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Numeric,
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Numeric => write!(f, "numeric"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One column correspondence suggested by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub a_col: String,
    pub b_col: String,
    #[serde(rename = "type", default)]
    pub col_type: ColumnType,
    #[serde(default)]
    pub confidence: f64,
}

impl ColumnMapping {
    pub fn new(
        a_col: impl Into<String>,
        b_col: impl Into<String>,
        col_type: ColumnType,
        confidence: f64,
    ) -> Self {
        Self { a_col: a_col.into(), b_col: b_col.into(), col_type, confidence }
    }

    pub fn pair(&self) -> MappingPair {
        MappingPair { a_col: self.a_col.clone(), b_col: self.b_col.clone() }
    }
}

/// An approved match as sent to phase 2: confidence and type stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingPair {
    pub a_col: String,
    pub b_col: String,
}

impl fmt::Display for MappingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.a_col, self.b_col)
    }
}

/// Columns of each dataset that no suggestion mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnmappedColumns {
    pub a: Vec<String>,
    pub b: Vec<String>,
}

/// The working list of suggestions plus one approval flag per entry.
///
/// Immutable: every edit returns a new selection. The suggestion list is
/// shared between versions and never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSelection {
    suggestions: Arc<[ColumnMapping]>,
    approved: Vec<bool>,
}

impl MappingSelection {
    /// Each entry starts approved iff `confidence >= 0.5`.
    pub fn from_suggestions(suggestions: Vec<ColumnMapping>) -> Self {
        let approved = suggestions
            .iter()
            .map(|m| m.confidence >= DEFAULT_APPROVAL_CONFIDENCE)
            .collect();
        Self { suggestions: suggestions.into(), approved }
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn suggestions(&self) -> &[ColumnMapping] {
        &self.suggestions
    }

    pub fn is_approved(&self, index: usize) -> Option<bool> {
        self.approved.get(index).copied()
    }

    /// Suggestions paired with their current approval flag, in order.
    pub fn entries(&self) -> impl Iterator<Item = (&ColumnMapping, bool)> {
        self.suggestions.iter().zip(self.approved.iter().copied())
    }

    /// Flip one entry's flag.
    pub fn toggled(&self, index: usize) -> Result<Self, ValidationError> {
        let current = self.flag(index)?;
        self.with_flag(index, !current)
    }

    /// Set one entry's flag explicitly.
    pub fn with_flag(&self, index: usize, approved: bool) -> Result<Self, ValidationError> {
        self.flag(index)?;
        let mut next = self.clone();
        next.approved[index] = approved;
        Ok(next)
    }

    /// Index of the first suggestion for this exact pair.
    pub fn position(&self, a_col: &str, b_col: &str) -> Option<usize> {
        self.suggestions.iter().position(|m| m.a_col == a_col && m.b_col == b_col)
    }

    pub fn approved_subset(&self) -> Vec<MappingPair> {
        self.entries().filter(|(_, on)| *on).map(|(m, _)| m.pair()).collect()
    }

    /// Approved suggestions with their types, for classifying results.
    pub fn approved_mappings(&self) -> Vec<ColumnMapping> {
        self.entries().filter(|(_, on)| *on).map(|(m, _)| m.clone()).collect()
    }

    /// [`approved_subset`](Self::approved_subset), refusing an empty result.
    pub fn require_approved(&self) -> Result<Vec<MappingPair>, ValidationError> {
        let subset = self.approved_subset();
        if subset.is_empty() {
            return Err(ValidationError::NoApprovedMappings);
        }
        Ok(subset)
    }

    /// Columns the service never suggested a mapping for.
    ///
    /// Independent of approval flags: a declined suggestion still counts as
    /// mapped. Input order is kept; duplicates are reported once.
    pub fn unmapped(&self, columns_a: &[String], columns_b: &[String]) -> UnmappedColumns {
        let mapped_a: BTreeSet<&str> = self.suggestions.iter().map(|m| m.a_col.as_str()).collect();
        let mapped_b: BTreeSet<&str> = self.suggestions.iter().map(|m| m.b_col.as_str()).collect();
        UnmappedColumns {
            a: missing_from(columns_a, &mapped_a),
            b: missing_from(columns_b, &mapped_b),
        }
    }

    fn flag(&self, index: usize) -> Result<bool, ValidationError> {
        self.is_approved(index).ok_or(ValidationError::MappingIndexOutOfRange {
            index,
            len: self.len(),
        })
    }
}

fn missing_from(columns: &[String], mapped: &BTreeSet<&str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    columns
        .iter()
        .filter(|c| !mapped.contains(c.as_str()) && seen.insert(c.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestions() -> Vec<ColumnMapping> {
        vec![
            ColumnMapping::new("id", "id", ColumnType::String, 0.9),
            ColumnMapping::new("note", "memo", ColumnType::String, 0.3),
            ColumnMapping::new("amount", "amt", ColumnType::Numeric, 0.5),
        ]
    }

    #[test]
    fn initial_approval_uses_confidence_cutoff() {
        let sel = MappingSelection::from_suggestions(suggestions());
        let approved: Vec<_> = sel.approved_subset().into_iter().map(|p| p.a_col).collect();
        // 0.5 is inclusive, 0.3 is not
        assert_eq!(approved, vec!["id", "amount"]);
    }

    #[test]
    fn toggle_returns_new_selection() {
        let sel = MappingSelection::from_suggestions(suggestions());
        let next = sel.toggled(1).unwrap();
        assert_eq!(sel.is_approved(1), Some(false));
        assert_eq!(next.is_approved(1), Some(true));
        assert_eq!(next.toggled(1).unwrap(), sel);
    }

    #[test]
    fn toggle_out_of_range() {
        let sel = MappingSelection::from_suggestions(suggestions());
        assert_eq!(
            sel.toggled(3).unwrap_err(),
            ValidationError::MappingIndexOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn require_approved_rejects_empty() {
        let sel = MappingSelection::from_suggestions(vec![ColumnMapping::new(
            "a",
            "b",
            ColumnType::Other,
            0.1,
        )]);
        assert!(sel.approved_subset().is_empty());
        assert_eq!(sel.require_approved().unwrap_err(), ValidationError::NoApprovedMappings);
        let sel = sel.with_flag(0, true).unwrap();
        let expected = vec![MappingPair { a_col: "a".into(), b_col: "b".into() }];
        assert_eq!(sel.require_approved().unwrap(), expected);
    }

    #[test]
    fn approved_mappings_keep_type() {
        let sel = MappingSelection::from_suggestions(suggestions());
        let typed = sel.approved_mappings();
        assert_eq!(typed.len(), 2);
        assert_eq!(typed[1].col_type, ColumnType::Numeric);
    }

    #[test]
    fn unmapped_ignores_user_toggles() {
        let sel = MappingSelection::from_suggestions(suggestions())
            .with_flag(0, false)
            .unwrap();
        let cols_a =
            vec!["id".to_string(), "note".into(), "amount".into(), "desk".into(), "desk".into()];
        let cols_b = vec!["id".to_string(), "memo".into(), "amt".into(), "book".into()];
        let unmapped = sel.unmapped(&cols_a, &cols_b);
        assert_eq!(unmapped.a, vec!["desk"]);
        assert_eq!(unmapped.b, vec!["book"]);
    }

    #[test]
    fn unknown_type_tag_is_other() {
        let m: ColumnMapping = serde_json::from_str(
            r#"{"a_col":"ts","b_col":"ts","type":"timestamp","confidence":0.7}"#,
        )
        .unwrap();
        assert_eq!(m.col_type, ColumnType::Other);
        let m: ColumnMapping = serde_json::from_str(r#"{"a_col":"x","b_col":"y"}"#).unwrap();
        assert_eq!(m.col_type, ColumnType::Other);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn position_finds_pair() {
        let sel = MappingSelection::from_suggestions(suggestions());
        assert_eq!(sel.position("note", "memo"), Some(1));
        assert_eq!(sel.position("note", "id"), None);
    }
}
