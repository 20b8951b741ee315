use serde_json::Value;

use crate::DomainResult;
use crate::ports::BoxFuture;

/// External collaborator that turns a repository event into a structured
/// documentation plan. The returned document carries at least an
/// `execution_mode` string; failures surface as `DomainError::Upstream`.
pub trait PlanGenerator: Send + Sync {
    fn generate_plan(
        &self,
        payload: &Value,
        execute_updates: bool,
    ) -> BoxFuture<'_, DomainResult<Value>>;
}
