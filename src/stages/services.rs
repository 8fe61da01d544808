use crate::error::ApiError;
use crate::stages::dto::ProjectSubmission;
use crate::stages::repo::{Stage1Result, Stage2Project};
use crate::stages::status::{stage2_status, Stage2Status};

/// Stage 2 must be in a given state for the requested transition; anything
/// else is reported before a single row is written.
pub fn ensure_stage2_state(
    stage1: Option<&Stage1Result>,
    project: Option<&Stage2Project>,
    wanted: Stage2Status,
) -> Result<(), ApiError> {
    let current = stage2_status(stage1, project);
    if current == wanted {
        return Ok(());
    }
    let msg = match current {
        Stage2Status::Locked => "stage 2 is locked until stage 1 qualification",
        Stage2Status::Submitted => "project already submitted",
        Stage2Status::Available => "stage 2 project not yet submitted",
    };
    Err(ApiError::InvalidState(msg.into()))
}

/// All mandatory submission fields must be present and non-empty.
pub fn validate_submission(submission: &ProjectSubmission) -> Result<(), ApiError> {
    let mut missing = Vec::new();
    if submission.project_title.trim().is_empty() {
        missing.push("project_title");
    }
    if submission.project_description.trim().is_empty() {
        missing.push("project_description");
    }
    if submission.github_repo_url.trim().is_empty() {
        missing.push("github_repo_url");
    }
    if submission.tech_stack.iter().all(|t| t.trim().is_empty()) {
        missing.push("tech_stack");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "missing mandatory fields: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn qualified_stage1() -> Stage1Result {
        Stage1Result {
            user_id: 1,
            mcq_score: 40.0,
            programming_score: 40.0,
            total_score: 80.0,
            rank: Some(3),
            is_qualified: true,
            started_at: OffsetDateTime::now_utc(),
            completed_at: Some(OffsetDateTime::now_utc()),
        }
    }

    fn submitted_project() -> Stage2Project {
        Stage2Project {
            user_id: 1,
            project_title: Some("orig".into()),
            project_description: Some("orig".into()),
            github_repo_url: Some("https://github.com/a/b".into()),
            live_demo_url: None,
            tech_stack: Some(serde_json::json!(["rust"])),
            submission_status: "submitted".into(),
            submitted_at: Some(OffsetDateTime::now_utc()),
            total_score: None,
            is_qualified: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn submission() -> ProjectSubmission {
        ProjectSubmission {
            project_title: "Big Boss Bot".into(),
            project_description: "A judge assistant".into(),
            github_repo_url: "https://github.com/x/y".into(),
            live_demo_url: None,
            tech_stack: vec!["rust".into(), "axum".into()],
        }
    }

    #[test]
    fn submit_rejected_before_qualification() {
        let err = ensure_stage2_state(None, None, Stage2Status::Available).unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[test]
    fn submit_allowed_when_available() {
        let s1 = qualified_stage1();
        assert!(ensure_stage2_state(Some(&s1), None, Stage2Status::Available).is_ok());
    }

    #[test]
    fn second_submission_rejected() {
        let s1 = qualified_stage1();
        let done = submitted_project();
        let err =
            ensure_stage2_state(Some(&s1), Some(&done), Stage2Status::Available).unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[test]
    fn valid_submission_passes() {
        assert!(validate_submission(&submission()).is_ok());
    }

    #[test]
    fn blank_mandatory_fields_fail_validation() {
        let mut s = submission();
        s.project_title = "   ".into();
        s.tech_stack = vec![];
        let err = validate_submission(&s).unwrap_err();
        match err {
            ApiError::Validation(msg) => {
                assert!(msg.contains("project_title"));
                assert!(msg.contains("tech_stack"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn demo_url_is_optional() {
        let mut s = submission();
        s.live_demo_url = None;
        assert!(validate_submission(&s).is_ok());
    }
}
