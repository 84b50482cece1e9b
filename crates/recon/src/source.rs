//! Dataset source configuration.
//!
//! [`SourceForm`] is what a user fills in (free text, comma-separated lists,
//! possibly no type yet). [`SourceForm::normalize`] turns it into a
//! [`SourceConfig`], the tagged shape the service expects. Lists are split
//! exactly once, here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetSide, ValidationError};
use crate::thresholds::Thresholds;
use crate::wire::ReconRequest;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    BigQuery,
    Oracle,
    Postgres,
    Hive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::BigQuery => "bigquery",
            Self::Oracle => "oracle",
            Self::Postgres => "postgres",
            Self::Hive => "hive",
        }
    }

    /// Port pre-filled by the source form for relational kinds.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Oracle => Some(1521),
            Self::Postgres => Some(5432),
            Self::Hive => Some(10000),
            Self::File | Self::BigQuery => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Normalized config (wire shape)
// ---------------------------------------------------------------------------

/// Raw file content attached to a file source.
///
/// Never serialized into the JSON config; its presence switches the phase-1
/// request to multipart.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSource {
    pub path: String,
    pub format: String,
    #[serde(skip)]
    pub upload: Option<FileUpload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BigQuerySource {
    pub table: String,
    /// Fully-qualified `project.dataset.table`.
    pub table_fqn: String,
    pub numeric_cols: Vec<String>,
    pub array_cols: Vec<String>,
}

/// Oracle, Postgres and Hive share one connection shape. Oracle names its
/// database a `service`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalSource {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
}

impl fmt::Debug for RelationalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalSource")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("service", &self.service)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    File(FileSource),
    BigQuery(BigQuerySource),
    Oracle(RelationalSource),
    Postgres(RelationalSource),
    Hive(RelationalSource),
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::File(_) => SourceKind::File,
            Self::BigQuery(_) => SourceKind::BigQuery,
            Self::Oracle(_) => SourceKind::Oracle,
            Self::Postgres(_) => SourceKind::Postgres,
            Self::Hive(_) => SourceKind::Hive,
        }
    }

    pub fn upload(&self) -> Option<&FileUpload> {
        match self {
            Self::File(file) => file.upload.as_ref(),
            _ => None,
        }
    }

    /// Short human label for logs and summaries. Never includes credentials.
    pub fn describe(&self) -> String {
        match self {
            Self::File(file) => match (&file.upload, file.path.is_empty()) {
                (Some(upload), _) => format!("file upload {}", upload.file_name),
                (None, false) => format!("file {}", file.path),
                (None, true) => "file (no path)".to_string(),
            },
            Self::BigQuery(bq) => format!("bigquery {}", bq.table_fqn),
            Self::Oracle(db) | Self::Postgres(db) | Self::Hive(db) => {
                format!("{} {}:{} table {}", self.kind(), db.host, db.port, db.table)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Form input
// ---------------------------------------------------------------------------

/// A list field as typed by the user: either `"a, b, c"` or a real list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListField {
    Text(String),
    Items(Vec<String>),
}

impl Default for ListField {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

impl ListField {
    /// Split on commas, trim, drop empties. Items are trimmed the same way.
    pub fn normalize(&self) -> Vec<String> {
        let trimmed = |s: &str| {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        };
        match self {
            Self::Text(text) => text.split(',').filter_map(trimmed).collect(),
            Self::Items(items) => items.iter().filter_map(|s| trimmed(s)).collect(),
        }
    }
}

/// One dataset's configuration as entered, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceForm {
    #[serde(rename = "type")]
    pub kind: Option<SourceKind>,
    pub path: Option<String>,
    pub format: Option<String>,
    pub table: Option<String>,
    pub table_fqn: Option<String>,
    pub numeric_cols: ListField,
    pub array_cols: ListField,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub service: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub columns: ListField,
    #[serde(skip)]
    pub upload: Option<FileUpload>,
}

impl SourceForm {
    pub fn of_kind(kind: SourceKind) -> Self {
        Self { kind: Some(kind), ..Self::default() }
    }

    pub fn normalize(&self, side: DatasetSide) -> Result<SourceConfig, ValidationError> {
        let kind = self.kind.ok_or(ValidationError::MissingSourceKind { side })?;
        let text = |field: &Option<String>| {
            field.as_deref().map(str::trim).unwrap_or_default().to_string()
        };

        let config = match kind {
            SourceKind::File => SourceConfig::File(FileSource {
                path: text(&self.path),
                format: text(&self.format),
                upload: self.upload.clone(),
            }),
            SourceKind::BigQuery => {
                // The form keeps `table` and `table_fqn` in lockstep.
                let fqn = match text(&self.table_fqn) {
                    fqn if fqn.is_empty() => text(&self.table),
                    fqn => fqn,
                };
                SourceConfig::BigQuery(BigQuerySource {
                    table: fqn.clone(),
                    table_fqn: fqn,
                    numeric_cols: self.numeric_cols.normalize(),
                    array_cols: self.array_cols.normalize(),
                })
            }
            SourceKind::Oracle | SourceKind::Postgres | SourceKind::Hive => {
                let relational = self.relational(kind);
                match kind {
                    SourceKind::Oracle => SourceConfig::Oracle(relational),
                    SourceKind::Postgres => SourceConfig::Postgres(relational),
                    _ => SourceConfig::Hive(relational),
                }
            }
        };

        log::debug!("{side}: normalized {}", config.describe());
        Ok(config)
    }

    fn relational(&self, kind: SourceKind) -> RelationalSource {
        let opt = |field: &Option<String>| {
            field.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
        };
        let database = match kind {
            SourceKind::Oracle => None,
            SourceKind::Hive => opt(&self.database).or_else(|| Some("default".to_string())),
            _ => opt(&self.database),
        };
        let service = match kind {
            SourceKind::Oracle => opt(&self.service),
            _ => None,
        };
        RelationalSource {
            host: opt(&self.host).unwrap_or_default(),
            port: self.port.or(kind.default_port()).unwrap_or_default(),
            database,
            service,
            user: opt(&self.user).unwrap_or_default(),
            password: self.password.clone().filter(|p| !p.is_empty()),
            table: opt(&self.table).unwrap_or_default(),
            columns: self.columns.normalize(),
        }
    }
}

/// Everything a user supplies for phase 1.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconForm {
    pub dataset_a: SourceForm,
    pub dataset_b: SourceForm,
    pub thresholds: Thresholds,
    pub entities: Vec<serde_json::Value>,
}

impl ReconForm {
    /// Normalize both sources and validate thresholds into a request snapshot.
    pub fn build(&self) -> Result<ReconRequest, ValidationError> {
        let dataset_a = self.dataset_a.normalize(DatasetSide::A)?;
        let dataset_b = self.dataset_b.normalize(DatasetSide::B)?;
        self.thresholds.validate()?;
        Ok(ReconRequest {
            dataset_a,
            dataset_b,
            thresholds: self.thresholds,
            entities: self.entities.clone(),
        })
    }
}
