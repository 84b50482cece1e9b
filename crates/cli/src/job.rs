//! Job files: one reconciliation run described in TOML.
//!
//! ```toml
//! entities = []
//!
//! [dataset_a]
//! type = "file"
//! path = "trades_a.csv"
//! format = "csv"
//! upload = true          # attach the file bytes, resolved next to the job
//!
//! [dataset_b]
//! type = "postgres"
//! host = "db.internal"
//! table = "trades"
//! columns = "trade_id, amount"
//!
//! [thresholds]
//! abs = 0.01
//! rel = 0.001
//!
//! [approval]
//! accept = [{ a_col = "note", b_col = "memo" }]
//! reject = [{ a_col = "desk", b_col = "book" }]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use recon_core::source::FileUpload;
use recon_core::{
    DatasetSide, MappingPair, MappingSelection, ReconForm, SourceForm, SourceKind, Thresholds,
    ValidationError,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job file: {0}")]
    Parse(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{side}: upload = true needs a file source")]
    UploadNotFile { side: DatasetSide },

    #[error("{side}: upload = true needs a path")]
    UploadWithoutPath { side: DatasetSide },

    #[error("mapping {pair} is both accepted and rejected")]
    ConflictingApproval { pair: MappingPair },
}

/// One dataset section. Everything except `upload` is passed through to
/// the source form as typed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobSource {
    #[serde(flatten)]
    pub form: SourceForm,
    #[serde(default)]
    pub upload: bool,
}

/// Explicit decisions applied on top of the confidence default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApprovalRules {
    pub accept: Vec<MappingPair>,
    pub reject: Vec<MappingPair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub dataset_a: JobSource,
    pub dataset_b: JobSource,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub entities: Vec<Value>,
    #[serde(default)]
    pub approval: ApprovalRules,
}

/// Result of applying [`ApprovalRules`] to a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedApproval {
    pub selection: MappingSelection,
    /// Pairs named in the job that the service did not suggest.
    pub unknown: Vec<MappingPair>,
}

impl JobConfig {
    pub fn from_toml(input: &str) -> Result<Self, JobError> {
        let job: JobConfig = toml::from_str(input).map_err(|e| JobError::Parse(e.to_string()))?;
        job.validate()?;
        Ok(job)
    }

    pub fn load(path: &Path) -> Result<Self, JobError> {
        let input = std::fs::read_to_string(path)
            .map_err(|source| JobError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&input)
    }

    /// Everything that can be checked without reading uploads or calling
    /// the service.
    pub fn validate(&self) -> Result<(), JobError> {
        let sides = [(DatasetSide::A, &self.dataset_a), (DatasetSide::B, &self.dataset_b)];
        for (side, source) in sides {
            source.form.normalize(side)?;
            if source.upload {
                if source.form.kind != Some(SourceKind::File) {
                    return Err(JobError::UploadNotFile { side });
                }
                if source.form.path.as_deref().map_or(true, |p| p.trim().is_empty()) {
                    return Err(JobError::UploadWithoutPath { side });
                }
            }
        }
        self.thresholds.validate()?;

        let accepted: HashSet<_> = self.approval.accept.iter().collect();
        if let Some(pair) = self.approval.reject.iter().find(|p| accepted.contains(p)) {
            return Err(JobError::ConflictingApproval { pair: pair.clone() });
        }
        Ok(())
    }

    /// The run form, with uploads read from disk relative to `base_dir`.
    pub fn to_form(&self, base_dir: &Path) -> Result<ReconForm, JobError> {
        Ok(ReconForm {
            dataset_a: resolve_source(&self.dataset_a, base_dir)?,
            dataset_b: resolve_source(&self.dataset_b, base_dir)?,
            thresholds: self.thresholds,
            entities: self.entities.clone(),
        })
    }

    /// Accept and reject the named pairs. Rejection wins over the
    /// confidence default; acceptance turns on low-confidence suggestions.
    pub fn apply_approval(
        &self,
        selection: &MappingSelection,
    ) -> Result<AppliedApproval, ValidationError> {
        let mut selection = selection.clone();
        let mut unknown = Vec::new();

        let rules = self.approval.accept.iter().map(|p| (p, true));
        let rules = rules.chain(self.approval.reject.iter().map(|p| (p, false)));
        for (pair, approved) in rules {
            match selection.position(&pair.a_col, &pair.b_col) {
                Some(index) => selection = selection.with_flag(index, approved)?,
                None => unknown.push(pair.clone()),
            }
        }
        Ok(AppliedApproval { selection, unknown })
    }
}

fn resolve_source(source: &JobSource, base_dir: &Path) -> Result<SourceForm, JobError> {
    let mut form = source.form.clone();
    if !source.upload {
        return Ok(form);
    }
    let relative = form.path.as_deref().unwrap_or_default().trim();
    let path = base_dir.join(relative);
    let bytes = std::fs::read(&path).map_err(|source| JobError::Io { path: path.clone(), source })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.to_string());
    log::debug!("attaching {} ({} bytes)", path.display(), bytes.len());
    form.upload = Some(FileUpload { file_name, bytes });
    Ok(form)
}
