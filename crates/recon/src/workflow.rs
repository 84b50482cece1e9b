//! Reconciliation run lifecycle.
//!
//! ```text
//! Idle --submit--> PendingApproval --approve--> Completed
//!   \                  |    ^                 \
//!    \--(failure)--> Failed  \--(phase 2 failure, approval retained)
//! ```
//!
//! A [`WorkflowState`] value is the single source of truth for display.
//! Each phase transition replaces it wholesale. At most one service call is
//! in flight at a time; anything arriving meanwhile gets
//! [`WorkflowError::Busy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::classify::{classify_row, summarize, RowVerdicts, VerdictSummary};
use crate::error::{TransportError, ValidationError, WorkflowError};
use crate::mapping::{ColumnMapping, MappingPair, MappingSelection, UnmappedColumns};
use crate::row::ResultRow;
use crate::source::{ReconForm, SourceConfig};
use crate::thresholds::Thresholds;
use crate::wire::{
    Approval, ApprovalRequest, ApprovalResponse, ReconRequest, SuggestionResponse, WireRow,
    STATUS_COMPLETED, STATUS_PENDING_APPROVAL,
};

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// The remote reconciliation service. One call per phase.
pub trait ReconService: Send + Sync {
    fn reconcile(&self, request: &ReconRequest) -> Result<SuggestionResponse, TransportError>;
    fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse, TransportError>;
}

impl<S: ReconService + ?Sized> ReconService for Arc<S> {
    fn reconcile(&self, request: &ReconRequest) -> Result<SuggestionResponse, TransportError> {
        (**self).reconcile(request)
    }

    fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse, TransportError> {
        (**self).approve(request)
    }
}

impl<S: ReconService + ?Sized> ReconService for Box<S> {
    fn reconcile(&self, request: &ReconRequest) -> Result<SuggestionResponse, TransportError> {
        (**self).reconcile(request)
    }

    fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse, TransportError> {
        (**self).approve(request)
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Suggest,
    Approve,
}

/// Everything phase 2 sends besides the approved pairs, frozen when phase 1
/// returns. Datasets are the service's own echo when it sent one (it may
/// point at server-side copies of uploads), otherwise what was submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub dataset_a: Value,
    pub dataset_b: Value,
    pub thresholds: Thresholds,
    pub entities: Vec<Value>,
}

impl RunSnapshot {
    fn capture(
        request: &ReconRequest,
        response: &SuggestionResponse,
    ) -> Result<Self, TransportError> {
        let dataset = |echo: &Option<Value>, sent: &SourceConfig| match echo {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => serde_json::to_value(sent).map_err(|e| TransportError::Parse(e.to_string())),
        };
        let thresholds = match response.thresholds {
            Some(echo) if echo.validate().is_ok() => echo,
            _ => request.thresholds,
        };
        Ok(Self {
            dataset_a: dataset(&response.dataset_a, &request.dataset_a)?,
            dataset_b: dataset(&response.dataset_b, &request.dataset_b)?,
            thresholds,
            entities: response.entities.clone().unwrap_or_else(|| request.entities.clone()),
        })
    }

    fn approval_request(&self, approved_matches: Vec<MappingPair>) -> ApprovalRequest {
        ApprovalRequest {
            dataset_a: self.dataset_a.clone(),
            dataset_b: self.dataset_b.clone(),
            thresholds: self.thresholds,
            entities: self.entities.clone(),
            approval: Approval { approved_matches },
        }
    }
}

/// Phase 1 done: suggestions are waiting for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub run_id: RunId,
    pub snapshot: Arc<RunSnapshot>,
    pub selection: MappingSelection,
    pub sample_a: Arc<Vec<WireRow>>,
    pub sample_b: Arc<Vec<WireRow>>,
    pub columns_a: Arc<Vec<String>>,
    pub columns_b: Arc<Vec<String>>,
}

impl PendingApproval {
    fn from_response(
        run_id: RunId,
        request: &ReconRequest,
        response: SuggestionResponse,
    ) -> Result<Self, TransportError> {
        if response.status != STATUS_PENDING_APPROVAL {
            return Err(TransportError::UnexpectedStatus {
                expected: STATUS_PENDING_APPROVAL,
                actual: response.status,
            });
        }
        let snapshot = RunSnapshot::capture(request, &response)?;
        Ok(Self {
            run_id,
            snapshot: Arc::new(snapshot),
            selection: MappingSelection::from_suggestions(response.schema_mapping.matches),
            sample_a: Arc::new(response.df_a_sample),
            sample_b: Arc::new(response.df_b_sample),
            columns_a: Arc::new(response.columns_a),
            columns_b: Arc::new(response.columns_b),
        })
    }

    /// Columns of either dataset the service never suggested a mapping for.
    pub fn unmapped(&self) -> UnmappedColumns {
        self.selection.unmapped(&self.columns_a, &self.columns_b)
    }
}

/// Phase 2 done.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun {
    pub run_id: RunId,
    pub status: String,
    /// Approved mappings with their types, in suggestion order.
    pub mappings: Vec<ColumnMapping>,
    pub thresholds: Thresholds,
    pub rows: Vec<ResultRow>,
    pub preview_rows: Option<Vec<WireRow>>,
    pub summary: Option<Value>,
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CompletedRun {
    fn from_response(pending: &PendingApproval, response: ApprovalResponse) -> Self {
        if response.status != STATUS_COMPLETED {
            log::warn!("run {}: approve returned status {}", pending.run_id, response.status);
        }
        let mappings = pending.selection.approved_mappings();
        let rows = response
            .result
            .iter()
            .map(|row| ResultRow::from_wire(row, &mappings))
            .collect();
        let summary = response.summary().cloned();
        Self {
            run_id: pending.run_id,
            status: response.status,
            mappings,
            thresholds: pending.snapshot.thresholds,
            rows,
            preview_rows: response.preview_rows,
            summary,
            sql: response.sql,
            explanation: response.explanation,
            completed_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    /// Per-cell verdicts for every result row, using this run's thresholds.
    pub fn verdicts(&self) -> Vec<RowVerdicts> {
        self.rows
            .iter()
            .map(|row| classify_row(&self.mappings, row, &self.thresholds))
            .collect()
    }

    pub fn verdict_summary(&self) -> VerdictSummary {
        summarize(&self.verdicts())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedRun {
    pub run_id: RunId,
    pub phase: Phase,
    pub error: TransportError,
    /// The approval to adjust and retry. Set when phase 2 failed, or when a
    /// resubmit failed while an approval was pending.
    pub retry: Option<PendingApproval>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum WorkflowState {
    #[default]
    Idle,
    PendingApproval(PendingApproval),
    Completed(Arc<CompletedRun>),
    Failed(FailedRun),
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PendingApproval(_) => "pending_approval",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::Idle => None,
            Self::PendingApproval(p) => Some(p.run_id),
            Self::Completed(c) => Some(c.run_id),
            Self::Failed(f) => Some(f.run_id),
        }
    }

    /// The approval that `approve` would act on, if any.
    pub fn pending(&self) -> Option<&PendingApproval> {
        match self {
            Self::PendingApproval(p) => Some(p),
            Self::Failed(f) => f.retry.as_ref(),
            Self::Idle | Self::Completed(_) => None,
        }
    }

    fn pending_mut(&mut self) -> Option<&mut PendingApproval> {
        match self {
            Self::PendingApproval(p) => Some(p),
            Self::Failed(f) => f.retry.as_mut(),
            Self::Idle | Self::Completed(_) => None,
        }
    }

    pub fn completed(&self) -> Option<&CompletedRun> {
        match self {
            Self::Completed(c) => Some(c),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

pub struct Workflow<S> {
    service: S,
    state: Mutex<WorkflowState>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a phase call resolves, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: ReconService> Workflow<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            state: Mutex::new(WorkflowState::Idle),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// A copy of the current state.
    pub fn state(&self) -> WorkflowState {
        self.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Phase 1: start a new run from the form.
    ///
    /// Validation errors leave the state untouched. The previous run stays in
    /// place while the call is out. Success replaces it with
    /// `PendingApproval`; failure moves to `Failed` and keeps any approval
    /// that was pending, so `approve` can still act on it.
    pub fn submit(&self, form: &ReconForm) -> Result<WorkflowState, WorkflowError> {
        let request = form.build()?;
        let _in_flight = self.begin()?;

        let run_id = Uuid::new_v4();
        log::info!(
            "run {run_id}: submitting A=[{}] B=[{}]{}",
            request.dataset_a.describe(),
            request.dataset_b.describe(),
            if request.has_uploads() { " with uploads" } else { "" },
        );

        let outcome = self
            .service
            .reconcile(&request)
            .and_then(|response| PendingApproval::from_response(run_id, &request, response));

        match outcome {
            Ok(pending) => {
                log::info!("run {run_id}: {} mapping(s) suggested", pending.selection.len());
                Ok(self.commit(WorkflowState::PendingApproval(pending)))
            }
            Err(error) => {
                log::warn!("run {run_id}: submit failed: {error}");
                let retry = self.lock().pending().cloned();
                if let Some(prior) = &retry {
                    log::info!("run {}: approval kept after failed resubmit", prior.run_id);
                }
                self.commit(WorkflowState::Failed(FailedRun {
                    run_id,
                    phase: Phase::Suggest,
                    error: error.clone(),
                    retry,
                }));
                Err(error.into())
            }
        }
    }

    /// Phase 2: run the reconciliation with the currently approved mappings.
    ///
    /// Legal from `PendingApproval`, or from `Failed` when a phase-2 failure
    /// retained the approval. Refuses an empty approval without calling the
    /// service.
    pub fn approve(&self) -> Result<WorkflowState, WorkflowError> {
        let _in_flight = self.begin()?;

        let pending = self.lock().pending().cloned().ok_or(WorkflowError::NothingPending)?;
        let approved = pending.selection.require_approved()?;
        let run_id = pending.run_id;
        log::info!("run {run_id}: approving {} mapping(s)", approved.len());

        let request = pending.snapshot.approval_request(approved);
        match self.service.approve(&request) {
            Ok(response) => {
                let completed = CompletedRun::from_response(&pending, response);
                log::info!("run {run_id}: completed with {} row(s)", completed.rows.len());
                Ok(self.commit(WorkflowState::Completed(Arc::new(completed))))
            }
            Err(error) => {
                log::warn!("run {run_id}: approve failed: {error}");
                self.commit(WorkflowState::Failed(FailedRun {
                    run_id,
                    phase: Phase::Approve,
                    error: error.clone(),
                    retry: Some(pending),
                }));
                Err(error.into())
            }
        }
    }

    /// Flip one suggestion's approval flag.
    pub fn toggle_mapping(&self, index: usize) -> Result<MappingSelection, WorkflowError> {
        self.edit_selection(|selection| selection.toggled(index))
    }

    /// Set one suggestion's approval flag.
    pub fn set_mapping(
        &self,
        index: usize,
        approved: bool,
    ) -> Result<MappingSelection, WorkflowError> {
        self.edit_selection(|selection| selection.with_flag(index, approved))
    }

    /// Drop whatever run is showing and go back to `Idle`.
    pub fn reset(&self) -> Result<(), WorkflowError> {
        let _in_flight = self.begin()?;
        self.commit(WorkflowState::Idle);
        Ok(())
    }

    fn edit_selection<F>(&self, edit: F) -> Result<MappingSelection, WorkflowError>
    where
        F: FnOnce(&MappingSelection) -> Result<MappingSelection, ValidationError>,
    {
        let mut state = self.lock();
        // Checked under the lock so an edit cannot slip in after `approve`
        // has read the selection.
        if self.is_busy() {
            return Err(WorkflowError::Busy);
        }
        let pending = state.pending_mut().ok_or(WorkflowError::NothingPending)?;
        let next = edit(&pending.selection)?;
        pending.selection = next.clone();
        Ok(next)
    }

    fn begin(&self) -> Result<InFlight<'_>, WorkflowError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkflowError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }

    fn commit(&self, next: WorkflowState) -> WorkflowState {
        let mut state = self.lock();
        *state = next;
        state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ColumnType;
    use crate::source::{SourceForm, SourceKind};
    use crate::wire::SchemaMapping;
    use serde_json::json;

    fn form() -> ReconForm {
        ReconForm {
            dataset_a: SourceForm::of_kind(SourceKind::File),
            dataset_b: SourceForm::of_kind(SourceKind::File),
            ..ReconForm::default()
        }
    }

    fn suggestion(status: &str) -> SuggestionResponse {
        SuggestionResponse {
            status: status.into(),
            schema_mapping: SchemaMapping {
                matches: vec![ColumnMapping::new("id", "id", ColumnType::String, 0.9)],
            },
            df_a_sample: vec![],
            df_b_sample: vec![],
            columns_a: vec!["id".into()],
            columns_b: vec!["id".into()],
            dataset_a: Some(json!({ "type": "file", "path": "server/a.csv", "format": "csv" })),
            dataset_b: None,
            thresholds: None,
            entities: None,
        }
    }

    #[test]
    fn snapshot_prefers_service_echo() {
        let request = form().build().unwrap();
        let snap = RunSnapshot::capture(&request, &suggestion(STATUS_PENDING_APPROVAL)).unwrap();
        assert_eq!(snap.dataset_a["path"], "server/a.csv");
        assert_eq!(snap.dataset_b, json!({ "type": "file", "path": "", "format": "" }));
        assert_eq!(snap.thresholds, Thresholds::default());
    }

    #[test]
    fn snapshot_ignores_invalid_threshold_echo() {
        let request = form().build().unwrap();
        let mut resp = suggestion(STATUS_PENDING_APPROVAL);
        resp.thresholds = Some(Thresholds { abs: -1.0, rel: 0.0 });
        let snap = RunSnapshot::capture(&request, &resp).unwrap();
        assert_eq!(snap.thresholds, request.thresholds);
    }

    #[test]
    fn unexpected_phase_one_status() {
        let request = form().build().unwrap();
        let err = PendingApproval::from_response(Uuid::new_v4(), &request, suggestion("COMPLETED"))
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::UnexpectedStatus {
                expected: STATUS_PENDING_APPROVAL,
                actual: "COMPLETED".into(),
            }
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(WorkflowState::default().name(), "idle");
        assert!(WorkflowState::Idle.pending().is_none());
        assert!(WorkflowState::Idle.run_id().is_none());
    }
}
