//! Request and response bodies of the reconciliation service.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::mapping::{ColumnMapping, MappingPair};
use crate::source::{FileUpload, SourceConfig};
use crate::thresholds::Thresholds;

pub const STATUS_PENDING_APPROVAL: &str = "PENDING_APPROVAL";
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// A JSON object row as returned by the service.
pub type WireRow = Map<String, Value>;

// ---------------------------------------------------------------------------
// Phase 1
// ---------------------------------------------------------------------------

/// `POST /reconcile` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconRequest {
    pub dataset_a: SourceConfig,
    pub dataset_b: SourceConfig,
    pub thresholds: Thresholds,
    pub entities: Vec<Value>,
}

impl ReconRequest {
    pub fn has_uploads(&self) -> bool {
        self.uploads().next().is_some()
    }

    /// Multipart part names paired with the uploads that travel under them.
    pub fn uploads(&self) -> impl Iterator<Item = (&'static str, &FileUpload)> {
        [("fileA", &self.dataset_a), ("fileB", &self.dataset_b)]
            .into_iter()
            .filter_map(|(part, source)| source.upload().map(|upload| (part, upload)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMapping {
    #[serde(default, deserialize_with = "null_as_default")]
    pub matches: Vec<ColumnMapping>,
}

/// `POST /reconcile` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuggestionResponse {
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub schema_mapping: SchemaMapping,
    #[serde(default, deserialize_with = "null_as_default")]
    pub df_a_sample: Vec<WireRow>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub df_b_sample: Vec<WireRow>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns_a: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns_b: Vec<String>,
    /// The service's own view of each dataset (may reference server-side
    /// copies of uploaded files). Kept verbatim.
    #[serde(default)]
    pub dataset_a: Option<Value>,
    #[serde(default)]
    pub dataset_b: Option<Value>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    #[serde(default)]
    pub entities: Option<Vec<Value>>,
}

// ---------------------------------------------------------------------------
// Phase 2
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Approval {
    pub approved_matches: Vec<MappingPair>,
}

/// `POST /reconcile/approve` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub dataset_a: Value,
    pub dataset_b: Value,
    pub thresholds: Thresholds,
    pub entities: Vec<Value>,
    pub approval: Approval,
}

/// `POST /reconcile/approve` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApprovalResponse {
    pub status: String,
    #[serde(default)]
    pub summary: Option<Value>,
    #[serde(default)]
    pub metrics: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<WireRow>,
    #[serde(default)]
    pub preview_rows: Option<Vec<WireRow>>,
    #[serde(default)]
    pub schema_mapping: Option<SchemaMapping>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl ApprovalResponse {
    /// Older service builds report `metrics` instead of `summary`.
    pub fn summary(&self) -> Option<&Value> {
        self.summary.as_ref().or(self.metrics.as_ref())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ColumnType;
    use crate::source::{FileSource, SourceKind};
    use serde_json::json;

    #[test]
    fn suggestion_response_parses_with_nulls() {
        let resp: SuggestionResponse = serde_json::from_value(json!({
            "status": "PENDING_APPROVAL",
            "schema_mapping": { "matches": [
                { "a_col": "id", "b_col": "id", "type": "string", "confidence": 0.9 }
            ]},
            "df_a_sample": null,
            "columns_a": ["id", "amount"],
            "dataset_a": { "type": "file", "path": "/tmp/upload_a.csv", "temp_table": "t_a" },
        }))
        .unwrap();
        assert_eq!(resp.schema_mapping.matches.len(), 1);
        assert_eq!(resp.schema_mapping.matches[0].col_type, ColumnType::String);
        assert!(resp.df_a_sample.is_empty());
        assert!(resp.columns_b.is_empty());
        assert_eq!(resp.dataset_a.unwrap()["temp_table"], "t_a");
    }

    #[test]
    fn approval_response_prefers_summary_over_metrics() {
        let resp: ApprovalResponse = serde_json::from_value(json!({
            "status": "COMPLETED",
            "metrics": { "rows": 3 },
            "result": [{ "id": 1 }],
            "sql": "SELECT 1",
        }))
        .unwrap();
        assert_eq!(resp.summary(), Some(&json!({ "rows": 3 })));
        assert_eq!(resp.result.len(), 1);
        assert_eq!(resp.sql.as_deref(), Some("SELECT 1"));
        assert!(resp.preview_rows.is_none());
    }

    #[test]
    fn uploads_are_labelled_per_side() {
        let file = |name: Option<&str>| {
            SourceConfig::File(FileSource {
                path: String::new(),
                format: "csv".into(),
                upload: name.map(|n| FileUpload { file_name: n.into(), bytes: vec![1, 2] }),
            })
        };
        let request = ReconRequest {
            dataset_a: file(None),
            dataset_b: file(Some("b.csv")),
            thresholds: Thresholds::default(),
            entities: vec![],
        };
        assert!(request.has_uploads());
        let parts: Vec<_> =
            request.uploads().map(|(part, u)| (part, u.file_name.clone())).collect();
        assert_eq!(parts, vec![("fileB", "b.csv".to_string())]);
        assert_eq!(request.dataset_b.kind(), SourceKind::File);
    }

    #[test]
    fn approval_request_wire_shape() {
        let request = ApprovalRequest {
            dataset_a: json!({ "type": "file", "path": "a.csv", "format": "csv" }),
            dataset_b: json!({ "type": "file", "path": "b.csv", "format": "csv" }),
            thresholds: Thresholds::default(),
            entities: vec![],
            approval: Approval {
                approved_matches: vec![MappingPair { a_col: "id".into(), b_col: "id".into() }],
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["approval"],
            json!({ "approved_matches": [{ "a_col": "id", "b_col": "id" }] })
        );
        assert_eq!(json["entities"], json!([]));
        assert_eq!(json["thresholds"], json!({ "abs": 0.01, "rel": 0.001 }));
    }
}
