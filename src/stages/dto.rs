use serde::{Deserialize, Serialize};

use crate::auth::repo::User;
use crate::stages::repo::{Stage1Result, Stage2Project};
use crate::stages::status::{Stage1Status, Stage2Status};

/// Everything the dashboard needs in one response.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub user: User,
    pub stage1_status: Stage1Status,
    pub stage1_result: Option<Stage1Result>,
    pub stage2_status: Stage2Status,
    pub stage2_project: Option<Stage2Project>,
    pub notifications_count: i64,
}

#[derive(Debug, Serialize)]
pub struct Stage1StatusResponse {
    pub stage1_status: Stage1Status,
    pub stage1_result: Stage1Result,
}

/// Final project submission; all fields but the demo link are mandatory.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectSubmission {
    pub project_title: String,
    pub project_description: String,
    pub github_repo_url: String,
    pub live_demo_url: Option<String>,
    pub tech_stack: Vec<String>,
}

/// Draft edits; absent fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProjectDraftPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_demo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<Vec<String>>,
}
