//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success, every compared cell matched                 |
//! | 1    | Run completed with at least one MISMATCH cell        |
//! | 2    | Usage error (bad args, unreadable or malformed job)  |
//! | 3    | Validation error (rejected before any service call)  |
//! | 4    | Transport error (network, HTTP, undecodable reply)   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into [`workflow_exit_code`] or the command that raises it

use recon_core::WorkflowError;

/// Success - command completed, nothing to report.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Reconciliation found differences.
/// Like `diff(1)`, exit 1 means "datasets differ."
pub const EXIT_MISMATCH: u8 = 1;

/// Usage error - bad arguments, job file missing or not valid TOML.
pub const EXIT_USAGE: u8 = 2;

/// Job rejected by validation (no source type, bad threshold, empty approval).
pub const EXIT_VALIDATION: u8 = 3;

/// Network, HTTP, or decode failure talking to the Reconciliation Service.
pub const EXIT_TRANSPORT: u8 = 4;

/// Map a WorkflowError to its exit code.
pub fn workflow_exit_code(err: &WorkflowError) -> u8 {
    match err {
        WorkflowError::Validation(_) => EXIT_VALIDATION,
        WorkflowError::Transport(_) => EXIT_TRANSPORT,
        // single-threaded driver; neither should surface
        WorkflowError::Busy | WorkflowError::NothingPending => EXIT_ERROR,
    }
}
