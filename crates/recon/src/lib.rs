//! `recon-core`: two-phase reconciliation workflow and cell classifier.
//!
//! Pure crate: builds requests, tracks the run lifecycle, classifies result
//! cells. The HTTP transport lives behind the [`ReconService`] trait.

pub mod classify;
pub mod error;
pub mod mapping;
pub mod row;
pub mod source;
pub mod thresholds;
pub mod wire;
pub mod workflow;

pub use classify::{
    classify, classify_row, summarize, CellReport, CellStatus, CellVerdict, RowVerdicts,
    VerdictSummary,
};
pub use error::{ClassificationAnomaly, DatasetSide, TransportError, ValidationError, WorkflowError};
pub use mapping::{ColumnMapping, ColumnType, MappingPair, MappingSelection, UnmappedColumns};
pub use row::{DiffHint, ResultRow};
pub use source::{ReconForm, SourceConfig, SourceForm, SourceKind};
pub use thresholds::Thresholds;
pub use wire::{
    ApprovalRequest, ApprovalResponse, ReconRequest, SchemaMapping, SuggestionResponse, WireRow,
};
pub use workflow::{
    CompletedRun, FailedRun, PendingApproval, Phase, ReconService, RunId, RunSnapshot, Workflow,
    WorkflowState,
};
