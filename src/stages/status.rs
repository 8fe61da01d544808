use serde::Serialize;

use crate::stages::repo::{Stage1Result, Stage2Project};

/// Stage 1 progression. Qualification is orthogonal: a completed assessment
/// may still be unqualified.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage1Status {
    NotStarted,
    InProgress,
    Completed,
}

/// Stage 2 progression. Submitted is terminal.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage2Status {
    Locked,
    Available,
    Submitted,
}

/// The single place Stage 1 status is derived from persisted state.
pub fn stage1_status(result: Option<&Stage1Result>) -> Stage1Status {
    match result {
        None => Stage1Status::NotStarted,
        Some(r) if r.completed_at.is_none() => Stage1Status::InProgress,
        Some(_) => Stage1Status::Completed,
    }
}

/// The single place Stage 2 status is derived from persisted state.
/// Locked holds whenever Stage 1 is not completed-and-qualified, regardless
/// of any project row that may exist.
pub fn stage2_status(
    stage1: Option<&Stage1Result>,
    project: Option<&Stage2Project>,
) -> Stage2Status {
    let qualified = stage1
        .map(|r| r.completed_at.is_some() && r.is_qualified)
        .unwrap_or(false);
    if !qualified {
        return Stage2Status::Locked;
    }
    match project {
        Some(p) if p.submitted_at.is_some() => Stage2Status::Submitted,
        _ => Stage2Status::Available,
    }
}
