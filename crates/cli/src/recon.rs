//! `recon run | suggest | validate`: drive one job through the workflow.

use std::path::{Path, PathBuf};

use recon_client::{load_settings, ServiceClient};
use recon_core::{
    ColumnMapping, ColumnType, CompletedRun, PendingApproval, RowVerdicts, Thresholds,
    UnmappedColumns, VerdictSummary, WireRow, Workflow, WorkflowState,
};
use serde::Serialize;
use serde_json::Value;

use crate::exit_codes::{EXIT_ERROR, EXIT_MISMATCH, EXIT_USAGE, EXIT_VALIDATION};
use crate::job::{JobConfig, JobError};
use crate::CliError;

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SuggestionEntry<'a> {
    pub index: usize,
    pub a_col: &'a str,
    pub b_col: &'a str,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
    pub confidence: f64,
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct SuggestReport<'a> {
    pub run_id: String,
    pub suggestions: Vec<SuggestionEntry<'a>>,
    pub unmapped: UnmappedColumns,
    /// Sample rows of each dataset, to judge the suggestions against.
    pub samples_a: &'a [WireRow],
    pub samples_b: &'a [WireRow],
}

impl<'a> SuggestReport<'a> {
    pub fn new(pending: &'a PendingApproval) -> Self {
        let suggestions = pending
            .selection
            .entries()
            .enumerate()
            .map(|(index, (m, approved))| SuggestionEntry {
                index,
                a_col: &m.a_col,
                b_col: &m.b_col,
                col_type: m.col_type,
                confidence: m.confidence,
                approved,
            })
            .collect();
        Self {
            run_id: pending.run_id.to_string(),
            suggestions,
            unmapped: pending.unmapped(),
            samples_a: &pending.sample_a,
            samples_b: &pending.sample_b,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_id: String,
    pub status: &'a str,
    pub completed_at: String,
    pub thresholds: Thresholds,
    pub mappings: &'a [ColumnMapping],
    pub summary: VerdictSummary,
    /// Whatever summary block the service itself returned.
    pub service_summary: Option<&'a Value>,
    pub sql: Option<&'a str>,
    pub explanation: Option<&'a str>,
    pub rows: Vec<RowVerdicts>,
    pub preview_rows: Option<&'a [WireRow]>,
}

impl<'a> RunReport<'a> {
    pub fn new(run: &'a CompletedRun) -> Self {
        let rows = run.verdicts();
        Self {
            run_id: run.run_id.to_string(),
            status: &run.status,
            completed_at: run.completed_at.to_rfc3339(),
            thresholds: run.thresholds,
            mappings: &run.mappings,
            summary: recon_core::summarize(&rows),
            service_summary: run.summary.as_ref(),
            sql: run.sql.as_deref(),
            explanation: run.explanation.as_deref(),
            rows,
            preview_rows: run.preview_rows.as_deref(),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn job_err(err: JobError) -> CliError {
    let code = match &err {
        JobError::Io { .. } | JobError::Parse(_) => EXIT_USAGE,
        JobError::Validation(_)
        | JobError::UploadNotFile { .. }
        | JobError::UploadWithoutPath { .. }
        | JobError::ConflictingApproval { .. } => EXIT_VALIDATION,
    };
    let error = CliError { code, message: err.to_string(), hint: None };
    match err {
        JobError::UploadNotFile { .. } | JobError::UploadWithoutPath { .. } => {
            error.with_hint("upload = true needs type = \"file\" and a path next to the job file")
        }
        _ => error,
    }
}

fn load_job(path: &Path) -> Result<JobConfig, CliError> {
    JobConfig::load(path).map_err(job_err)
}

fn workflow(api_base: Option<&str>) -> Result<Workflow<ServiceClient>, CliError> {
    let mut settings = load_settings();
    if let Some(base) = api_base {
        settings.api_base = base.to_string();
    }
    log::info!("reconciliation service at {}", settings.api_base);
    let client = ServiceClient::new(&settings).map_err(|e| CliError::from_workflow(e.into()))?;
    Ok(Workflow::new(client))
}

/// Phase 1 for a job file. Leaves the workflow in `PendingApproval`.
fn suggest(
    workflow: &Workflow<ServiceClient>,
    job: &JobConfig,
    job_path: &Path,
) -> Result<PendingApproval, CliError> {
    let base_dir = job_path.parent().unwrap_or_else(|| Path::new("."));
    let form = job.to_form(base_dir).map_err(job_err)?;

    match workflow.submit(&form).map_err(CliError::from_workflow)? {
        WorkflowState::PendingApproval(pending) => Ok(pending),
        other => Err(CliError {
            code: EXIT_ERROR,
            message: format!("unexpected workflow state after submit: {}", other.name()),
            hint: None,
        }),
    }
}

fn write_json<T: Serialize>(
    value: &T,
    json_output: bool,
    output_file: Option<&Path>,
) -> Result<(), CliError> {
    let json_str = serde_json::to_string_pretty(value).map_err(|e| CliError {
        code: EXIT_ERROR,
        message: format!("JSON serialization error: {e}"),
        hint: None,
    })?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str).map_err(|e| CliError {
            code: EXIT_USAGE,
            message: format!("cannot write {}: {e}", path.display()),
            hint: None,
        })?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }
    Ok(())
}

pub fn cmd_validate(job_path: PathBuf) -> Result<(), CliError> {
    let job = load_job(&job_path)?;
    // Uploads are resolved relative to the job, not the working directory.
    let base_dir = job_path.parent().unwrap_or_else(|| Path::new("."));
    let form = job.to_form(base_dir).map_err(job_err)?;
    let request = form.build().map_err(|e| job_err(e.into()))?;

    eprintln!(
        "valid: A = {}, B = {}, thresholds abs {} rel {}, {} accept / {} reject rule(s)",
        request.dataset_a.describe(),
        request.dataset_b.describe(),
        request.thresholds.abs,
        request.thresholds.rel,
        job.approval.accept.len(),
        job.approval.reject.len(),
    );
    Ok(())
}

pub fn cmd_suggest(
    job_path: PathBuf,
    json_output: bool,
    api_base: Option<&str>,
) -> Result<(), CliError> {
    let job = load_job(&job_path)?;
    let workflow = workflow(api_base)?;
    let pending = suggest(&workflow, &job, &job_path)?;
    let report = SuggestReport::new(&pending);

    if json_output {
        write_json(&report, true, None)?;
    } else {
        for entry in &report.suggestions {
            println!(
                "[{}] {:<24} -> {:<24} {:<8} {:.2}  {}",
                if entry.approved { "x" } else { " " },
                entry.a_col,
                entry.b_col,
                entry.col_type.to_string(),
                entry.confidence,
                entry.index,
            );
        }
    }

    eprintln!(
        "sample rows: {} from A, {} from B",
        report.samples_a.len(),
        report.samples_b.len()
    );
    if !report.unmapped.a.is_empty() {
        eprintln!("unmapped in A: {}", report.unmapped.a.join(", "));
    }
    if !report.unmapped.b.is_empty() {
        eprintln!("unmapped in B: {}", report.unmapped.b.join(", "));
    }
    Ok(())
}

pub fn cmd_run(
    job_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    api_base: Option<&str>,
) -> Result<(), CliError> {
    let job = load_job(&job_path)?;
    let workflow = workflow(api_base)?;
    let pending = suggest(&workflow, &job, &job_path)?;

    let applied = job
        .apply_approval(&pending.selection)
        .map_err(|e| CliError::from_workflow(e.into()))?;
    for pair in &applied.unknown {
        eprintln!("warning: [approval] names {pair}, which was not suggested");
    }
    for (index, (_, approved)) in applied.selection.entries().enumerate() {
        if pending.selection.is_approved(index) != Some(approved) {
            workflow.set_mapping(index, approved).map_err(CliError::from_workflow)?;
        }
    }

    let state = workflow.approve().map_err(CliError::from_workflow)?;
    let Some(run) = state.completed() else {
        return Err(CliError {
            code: EXIT_ERROR,
            message: format!("unexpected workflow state after approve: {}", state.name()),
            hint: None,
        });
    };

    let report = RunReport::new(run);
    write_json(&report, json_output, output_file.as_deref())?;

    let s = &report.summary;
    eprintln!(
        "recon {}: {} row(s), {} cell(s), {} match, {} mismatch ({} row(s) affected)",
        report.status, s.rows, s.cells, s.matches, s.mismatches, s.rows_with_mismatch,
    );
    for (column, count) in &s.mismatches_by_column {
        eprintln!("  {column}: {count} mismatch(es)");
    }

    if s.mismatches > 0 {
        return Err(CliError {
            code: EXIT_MISMATCH,
            message: "mismatches found".into(),
            hint: None,
        });
    }
    Ok(())
}
