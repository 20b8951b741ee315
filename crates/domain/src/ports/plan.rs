use crate::DomainResult;
use crate::plan::{DocumentationPlan, PlanListQuery, PlanUpdate};
use crate::ports::BoxFuture;

pub trait PlanRepository: Send + Sync {
    fn create(&self, plan: &DocumentationPlan) -> BoxFuture<'_, DomainResult<DocumentationPlan>>;

    fn get(&self, plan_id: &str) -> BoxFuture<'_, DomainResult<Option<DocumentationPlan>>>;

    fn list(&self, query: &PlanListQuery) -> BoxFuture<'_, DomainResult<Vec<DocumentationPlan>>>;

    fn update(
        &self,
        plan_id: &str,
        update: &PlanUpdate,
    ) -> BoxFuture<'_, DomainResult<DocumentationPlan>>;
}
