//! Reconciliation Service HTTP client.
//!
//! Blocking reqwest client (no Tokio runtime required).
//! Phase 1 is JSON unless a file upload is attached, in which case the same
//! fields travel as multipart text parts next to `fileA` / `fileB`.

use recon_core::{
    ApprovalRequest, ApprovalResponse, ReconRequest, ReconService, SuggestionResponse,
    TransportError,
};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::settings::ClientSettings;

pub const RECONCILE_PATH: &str = "reconcile";
pub const APPROVE_PATH: &str = "reconcile/approve";

/// Reconciliation Service client (blocking).
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::blocking::Client,
    api_base: String,
}

impl ServiceClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, TransportError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("recon/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout())
            .build()
            .map_err(|e| TransportError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Client with default settings pointed at `api_base`.
    pub fn with_base_url(api_base: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(&ClientSettings::new(api_base))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Phase 1: `POST /reconcile`.
    pub fn reconcile(&self, request: &ReconRequest) -> Result<SuggestionResponse, TransportError> {
        let url = self.endpoint(RECONCILE_PATH);
        let builder = if request.has_uploads() {
            log::debug!("POST {url} (multipart)");
            self.http.post(&url).multipart(multipart_form(request)?)
        } else {
            log::debug!("POST {url}");
            self.http.post(&url).json(request)
        };
        decode(send(builder)?)
    }

    /// Phase 2: `POST /reconcile/approve`.
    pub fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse, TransportError> {
        let url = self.endpoint(APPROVE_PATH);
        log::debug!("POST {url} ({} approved)", request.approval.approved_matches.len());
        decode(send(self.http.post(&url).json(request))?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }
}

impl ReconService for ServiceClient {
    fn reconcile(&self, request: &ReconRequest) -> Result<SuggestionResponse, TransportError> {
        ServiceClient::reconcile(self, request)
    }

    fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse, TransportError> {
        ServiceClient::approve(self, request)
    }
}

// ── Internal helpers ────────────────────────────────────────────────

/// Same four fields as the JSON body, each JSON-encoded into a text part.
fn multipart_form(request: &ReconRequest) -> Result<Form, TransportError> {
    let mut form = Form::new()
        .text("dataset_a", json_text(&request.dataset_a)?)
        .text("dataset_b", json_text(&request.dataset_b)?)
        .text("thresholds", json_text(&request.thresholds)?)
        .text("entities", json_text(&request.entities)?);

    for (name, upload) in request.uploads() {
        let part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
        form = form.part(name, part);
    }
    Ok(form)
}

fn json_text<T: Serialize>(value: &T) -> Result<String, TransportError> {
    serde_json::to_string(value).map_err(|e| TransportError::Parse(e.to_string()))
}

fn send(builder: RequestBuilder) -> Result<Response, TransportError> {
    let response = builder.send().map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        log::warn!("service answered {status}");
        return Err(TransportError::Http { status: status.as_u16(), body });
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let text = response.text().map_err(|e| TransportError::Network(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| TransportError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use recon_core::{ReconForm, SourceForm, SourceKind, Thresholds};
    use recon_core::source::FileUpload;
    use serde_json::json;

    fn client(server: &MockServer) -> ServiceClient {
        ServiceClient::with_base_url(server.url("/api")).unwrap()
    }

    fn request(upload: bool) -> ReconRequest {
        let file = |path: &str| SourceForm {
            path: Some(path.into()),
            format: Some("csv".into()),
            upload: upload.then(|| FileUpload {
                file_name: path.into(),
                bytes: b"id,amount\n1,10\n".to_vec(),
            }),
            ..SourceForm::of_kind(SourceKind::File)
        };
        ReconForm {
            dataset_a: file("a.csv"),
            dataset_b: file("b.csv"),
            thresholds: Thresholds::default(),
            entities: vec![],
        }
        .build()
        .unwrap()
    }

    fn pending_body() -> serde_json::Value {
        json!({
            "status": "PENDING_APPROVAL",
            "schema_mapping": { "matches": [
                { "a_col": "id", "b_col": "id", "type": "string", "confidence": 0.9 }
            ]},
            "columns_a": ["id"],
            "columns_b": ["id"],
        })
    }

    #[test]
    fn test_reconcile_posts_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/reconcile")
                .header("content-type", "application/json")
                .json_body(json!({
                    "dataset_a": { "type": "file", "path": "a.csv", "format": "csv" },
                    "dataset_b": { "type": "file", "path": "b.csv", "format": "csv" },
                    "thresholds": { "abs": 0.01, "rel": 0.001 },
                    "entities": [],
                }));
            then.status(200).json_body(pending_body());
        });

        let resp = client(&server).reconcile(&request(false)).unwrap();
        mock.assert();
        assert_eq!(resp.status, "PENDING_APPROVAL");
        assert_eq!(resp.schema_mapping.matches.len(), 1);
    }

    #[test]
    fn test_reconcile_with_upload_is_multipart() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/reconcile")
                .header_includes("content-type", "multipart/form-data")
                .body_includes("name=\"dataset_a\"")
                .body_includes("name=\"thresholds\"")
                .body_includes("name=\"fileA\"; filename=\"a.csv\"")
                .body_includes("name=\"fileB\"; filename=\"b.csv\"")
                .body_includes("id,amount");
            then.status(200).json_body(pending_body());
        });

        client(&server).reconcile(&request(true)).unwrap();
        mock.assert();
    }

    #[test]
    fn test_http_error_keeps_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/reconcile");
            then.status(500).body("boom");
        });

        let err = client(&server).reconcile(&request(false)).unwrap_err();
        assert_eq!(err, TransportError::Http { status: 500, body: "boom".into() });
        assert_eq!(err.to_string(), "Reconcile failed: 500 boom");
    }

    #[test]
    fn test_undecodable_body_is_parse_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/reconcile");
            then.status(200).body("<html>gateway</html>");
        });

        let err = client(&server).reconcile(&request(false)).unwrap_err();
        assert!(matches!(err, TransportError::Parse(_)));
    }

    #[test]
    fn test_connection_refused_is_network_error() {
        // Nothing listens on port 9 locally.
        let client = ServiceClient::with_base_url("http://127.0.0.1:9/api").unwrap();
        let err = client.reconcile(&request(false)).unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_approve_posts_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/reconcile/approve")
                .json_body(json!({
                    "dataset_a": { "type": "file", "path": "a.csv" },
                    "dataset_b": { "type": "file", "path": "b.csv" },
                    "thresholds": { "abs": 0.01, "rel": 0.001 },
                    "entities": [],
                    "approval": { "approved_matches": [{ "a_col": "id", "b_col": "id" }] },
                }));
            then.status(200).json_body(json!({
                "status": "COMPLETED",
                "summary": { "rows": 1 },
                "result": [{ "id": "1" }],
            }));
        });

        let request = ApprovalRequest {
            dataset_a: json!({ "type": "file", "path": "a.csv" }),
            dataset_b: json!({ "type": "file", "path": "b.csv" }),
            thresholds: Thresholds::default(),
            entities: vec![],
            approval: recon_core::wire::Approval {
                approved_matches: vec![recon_core::MappingPair {
                    a_col: "id".into(),
                    b_col: "id".into(),
                }],
            },
        };
        let resp = client(&server).approve(&request).unwrap();
        mock.assert();
        assert_eq!(resp.status, "COMPLETED");
        assert_eq!(resp.result.len(), 1);
    }

    #[test]
    fn test_trailing_slash_in_base() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/reconcile");
            then.status(200).json_body(pending_body());
        });

        let client = ServiceClient::with_base_url(format!("{}/", server.url("/api"))).unwrap();
        assert!(!client.api_base().ends_with('/'));
        client.reconcile(&request(false)).unwrap();
        mock.assert_calls(1);
    }
}
