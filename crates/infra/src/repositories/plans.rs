use std::collections::HashMap;
use std::sync::Arc;

use docline_domain::DomainResult;
use docline_domain::error::DomainError;
use docline_domain::plan::{
    DEFAULT_LIST_LIMIT, DocumentationPlan, MAX_LIST_LIMIT, PlanListQuery, PlanUpdate,
};
use docline_domain::ports::BoxFuture;
use docline_domain::ports::plan::PlanRepository;
use tokio::sync::RwLock;

/// In-process plan store. The `PlanRepository` port is the seam where an
/// external relational store plugs in; this backend keeps the full pipeline
/// runnable without one.
#[derive(Default)]
pub struct InMemoryPlanRepository {
    plans: Arc<RwLock<HashMap<String, DocumentationPlan>>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanRepository for InMemoryPlanRepository {
    fn create(&self, plan: &DocumentationPlan) -> BoxFuture<'_, DomainResult<DocumentationPlan>> {
        let plan = plan.clone();
        let plans = self.plans.clone();
        Box::pin(async move {
            plans.write().await.insert(plan.plan_id.clone(), plan.clone());
            Ok(plan)
        })
    }

    fn get(&self, plan_id: &str) -> BoxFuture<'_, DomainResult<Option<DocumentationPlan>>> {
        let plan_id = plan_id.to_string();
        let plans = self.plans.clone();
        Box::pin(async move { Ok(plans.read().await.get(&plan_id).cloned()) })
    }

    fn list(&self, query: &PlanListQuery) -> BoxFuture<'_, DomainResult<Vec<DocumentationPlan>>> {
        let query = query.clone();
        let plans = self.plans.clone();
        Box::pin(async move {
            let guard = plans.read().await;
            let mut matched: Vec<_> = guard
                .values()
                .filter(|plan| {
                    query
                        .repository
                        .as_deref()
                        .map_or(true, |repo| plan.repository == repo)
                        && query.status.map_or(true, |status| plan.status == status)
                })
                .cloned()
                .collect();
            // Newest first; UUIDv7 plan ids are time-ordered, breaking ties
            // within the same millisecond.
            matched.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.plan_id.cmp(&a.plan_id))
            });
            let limit = if query.limit == 0 {
                DEFAULT_LIST_LIMIT
            } else {
                query.limit.min(MAX_LIST_LIMIT)
            };
            matched.truncate(limit);
            Ok(matched)
        })
    }

    fn update(
        &self,
        plan_id: &str,
        update: &PlanUpdate,
    ) -> BoxFuture<'_, DomainResult<DocumentationPlan>> {
        let plan_id = plan_id.to_string();
        let update = update.clone();
        let plans = self.plans.clone();
        Box::pin(async move {
            let mut guard = plans.write().await;
            let plan = guard.get_mut(&plan_id).ok_or(DomainError::NotFound)?;
            if let Some(document) = update.plan {
                plan.plan = document;
            }
            if let Some(mode) = update.execution_mode {
                plan.execution_mode = mode;
            }
            if let Some(status) = update.status {
                plan.status = status;
            }
            if let Some(review_id) = update.review_id {
                plan.review_id = Some(review_id);
            }
            plan.updated_at_ms = Some(update.updated_at_ms);
            Ok(plan.clone())
        })
    }
}
