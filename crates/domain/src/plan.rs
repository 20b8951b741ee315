use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::plan::PlanRepository;
use crate::util::{now_ms, uuid_v7_without_dashes};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Key under which the originally received webhook payload is kept inside
/// the opaque plan document. Rerun depends on it being present verbatim.
pub const REQUEST_PAYLOAD_KEY: &str = "request_payload";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InReview,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PlanStatus {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_review" => Ok(Self::InReview),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err("unknown plan status"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    PlanOnly,
    Execute,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanOnly => "plan_only",
            Self::Execute => "execute",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "plan_only" => Ok(Self::PlanOnly),
            "execute" => Ok(Self::Execute),
            _ => Err("unknown execution mode"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DocumentationPlan {
    pub plan_id: String,
    pub repository: String,
    pub pr_number: i64,
    pub branch: Option<String>,
    pub execution_mode: ExecutionMode,
    pub plan: Value,
    pub status: PlanStatus,
    pub review_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: Option<i64>,
}

impl DocumentationPlan {
    pub fn request_payload(&self) -> Option<&Value> {
        self.plan.get(REQUEST_PAYLOAD_KEY).filter(|v| !v.is_null())
    }
}

#[derive(Clone, Debug)]
pub struct PlanCreate {
    pub repository: String,
    pub pr_number: i64,
    pub branch: Option<String>,
    pub execution_mode: ExecutionMode,
    pub plan: Value,
}

/// Patch applied by `PlanRepository::update`; `None` fields are untouched.
#[derive(Clone, Debug, Default)]
pub struct PlanUpdate {
    pub plan: Option<Value>,
    pub execution_mode: Option<ExecutionMode>,
    pub status: Option<PlanStatus>,
    pub review_id: Option<String>,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Default)]
pub struct PlanListQuery {
    pub repository: Option<String>,
    pub status: Option<PlanStatus>,
    pub limit: usize,
}

/// Plan ids are UUIDv7 simple form: 32 lowercase hex digits.
pub fn is_valid_plan_id(value: &str) -> bool {
    value.len() == 32
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[derive(Clone)]
pub struct PlanService {
    repository: Arc<dyn PlanRepository>,
}

impl PlanService {
    pub fn new(repository: Arc<dyn PlanRepository>) -> Self {
        Self { repository }
    }

    pub async fn create(&self, input: PlanCreate) -> DomainResult<DocumentationPlan> {
        let plan = DocumentationPlan {
            plan_id: uuid_v7_without_dashes(),
            repository: input.repository,
            pr_number: input.pr_number,
            branch: input.branch,
            execution_mode: input.execution_mode,
            plan: input.plan,
            status: PlanStatus::Pending,
            review_id: None,
            created_at_ms: now_ms(),
            updated_at_ms: None,
        };
        self.repository.create(&plan).await
    }

    pub async fn list(&self, query: &PlanListQuery) -> DomainResult<Vec<DocumentationPlan>> {
        self.repository.list(query).await
    }

    pub async fn get(&self, plan_id: &str) -> DomainResult<DocumentationPlan> {
        self.repository
            .get(plan_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    /// Attaches the plan to an external review. Relinking overwrites the
    /// previous review id (last-writer-wins).
    pub async fn link_to_review(
        &self,
        plan_id: &str,
        review_id: String,
        status: Option<PlanStatus>,
    ) -> DomainResult<DocumentationPlan> {
        if review_id.is_empty() {
            return Err(DomainError::Validation("review_id must not be empty".into()));
        }
        let update = PlanUpdate {
            review_id: Some(review_id),
            status: Some(status.unwrap_or(PlanStatus::InReview)),
            updated_at_ms: now_ms(),
            ..PlanUpdate::default()
        };
        self.repository.update(plan_id, &update).await
    }

    /// Replaces the opaque plan document wholesale. Callers are responsible
    /// for carrying `request_payload` into the new document beforehand.
    pub async fn update_plan_payload(
        &self,
        plan_id: &str,
        plan: Value,
        execution_mode: Option<ExecutionMode>,
        status: Option<PlanStatus>,
    ) -> DomainResult<DocumentationPlan> {
        let update = PlanUpdate {
            plan: Some(plan),
            execution_mode,
            status,
            review_id: None,
            updated_at_ms: now_ms(),
        };
        self.repository.update(plan_id, &update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            PlanStatus::Pending,
            PlanStatus::InReview,
            PlanStatus::Completed,
            PlanStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PlanStatus>(), Ok(status));
        }
        assert!("archived".parse::<PlanStatus>().is_err());
    }

    #[test]
    fn execution_mode_round_trips() {
        assert_eq!("plan_only".parse(), Ok(ExecutionMode::PlanOnly));
        assert_eq!("execute".parse(), Ok(ExecutionMode::Execute));
        assert!("dry_run".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn plan_id_shape_is_checked() {
        assert!(is_valid_plan_id(&crate::util::uuid_v7_without_dashes()));
        assert!(!is_valid_plan_id(""));
        assert!(!is_valid_plan_id("not-a-plan-id"));
        assert!(!is_valid_plan_id(&"A".repeat(32)));
        assert!(!is_valid_plan_id(&"0".repeat(31)));
    }

    #[test]
    fn request_payload_ignores_null() {
        let mut plan = DocumentationPlan {
            plan_id: uuid_v7_without_dashes(),
            repository: "acme/widgets".into(),
            pr_number: 0,
            branch: None,
            execution_mode: ExecutionMode::PlanOnly,
            plan: serde_json::json!({ REQUEST_PAYLOAD_KEY: null }),
            status: PlanStatus::Pending,
            review_id: None,
            created_at_ms: now_ms(),
            updated_at_ms: None,
        };
        assert!(plan.request_payload().is_none());
        plan.plan = serde_json::json!({ REQUEST_PAYLOAD_KEY: {"ref": "refs/heads/main"} });
        assert!(plan.request_payload().is_some());
    }
}
