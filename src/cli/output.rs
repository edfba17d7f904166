//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, BranchError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::BranchError(BranchError::ForkEntryMissing { branch_id, .. }) => format!(
            "{}\nhint: branch {} is corrupted; delete it with `storyloom delete-branch`",
            e, branch_id
        ),
        _ => e.to_string(),
    }
}
