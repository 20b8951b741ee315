use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::DomainResult;
use crate::error::DomainError;
use crate::plan::{
    DocumentationPlan, ExecutionMode, PlanCreate, PlanService, PlanStatus, REQUEST_PAYLOAD_KEY,
};
use crate::ports::generator::PlanGenerator;

const DOC_PATH_PREFIXES: &[&str] = &["docs/", "doc/", "documentation/"];
const DOC_FILE_SUFFIXES: &[&str] = &[".md", ".mdx", ".rst", ".adoc"];
const SOURCE_FILE_SUFFIXES: &[&str] = &[
    ".rs", ".py", ".ts", ".tsx", ".js", ".jsx", ".go", ".java", ".kt", ".rb", ".c", ".cc", ".cpp",
    ".h",
];

#[derive(Clone, Debug)]
pub struct PushEvent {
    pub repository: String,
    pub branch: Option<String>,
    pub touched_paths: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ChangeSummary {
    pub doc_paths: Vec<String>,
    pub source_paths: Vec<String>,
}

impl ChangeSummary {
    /// A change warrants documentation action when it touches documentation
    /// itself or source files whose docs may now be stale. Asset and config
    /// churn is acknowledged without further processing.
    pub fn warrants_documentation(&self) -> bool {
        !self.doc_paths.is_empty() || !self.source_paths.is_empty()
    }
}

pub fn parse_push_event(payload: &Value) -> DomainResult<PushEvent> {
    let repository = payload
        .get("repository")
        .and_then(|repo| repo.get("full_name"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DomainError::Validation("push payload missing repository.full_name".into())
        })?
        .to_string();

    let branch = payload
        .get("ref")
        .and_then(Value::as_str)
        .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r).to_string());

    let commits = payload
        .get("commits")
        .and_then(Value::as_array)
        .ok_or_else(|| DomainError::Validation("push payload commits must be an array".into()))?;

    let mut touched_paths = Vec::new();
    for commit in commits {
        for key in ["added", "modified", "removed"] {
            if let Some(paths) = commit.get(key).and_then(Value::as_array) {
                touched_paths.extend(
                    paths
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                );
            }
        }
    }

    Ok(PushEvent {
        repository,
        branch,
        touched_paths,
    })
}

pub fn classify_paths<S: AsRef<str>>(paths: &[S]) -> ChangeSummary {
    let mut summary = ChangeSummary::default();
    for path in paths {
        let path = path.as_ref();
        if is_doc_path(path) {
            summary.doc_paths.push(path.to_string());
        } else if is_source_path(path) {
            summary.source_paths.push(path.to_string());
        }
    }
    summary
}

fn is_doc_path(path: &str) -> bool {
    DOC_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
        || DOC_FILE_SUFFIXES.iter().any(|s| path.ends_with(s))
}

fn is_source_path(path: &str) -> bool {
    SOURCE_FILE_SUFFIXES.iter().any(|s| path.ends_with(s))
}

#[derive(Clone, Debug, Serialize)]
pub struct IntakeOutcome {
    pub relevant: bool,
    pub repository: String,
    pub branch: Option<String>,
    pub doc_paths: Vec<String>,
    pub source_paths: Vec<String>,
    pub plan_id: Option<String>,
}

/// Drives the webhook-intake side of the pipeline: classify the inbound
/// event, obtain a plan from the generator, persist it behind the review
/// gate. Every automatic path calls the generator with
/// `execute_updates = false`; only `rerun` forwards a caller-supplied flag,
/// because by then a reviewer has supervised the action.
#[derive(Clone)]
pub struct IntakeService {
    generator: Arc<dyn PlanGenerator>,
    plans: PlanService,
}

impl IntakeService {
    pub fn new(generator: Arc<dyn PlanGenerator>, plans: PlanService) -> Self {
        Self { generator, plans }
    }

    pub async fn handle_push(&self, payload: &Value) -> DomainResult<IntakeOutcome> {
        let event = parse_push_event(payload)?;
        let summary = classify_paths(&event.touched_paths);
        if !summary.warrants_documentation() {
            return Ok(IntakeOutcome {
                relevant: false,
                repository: event.repository,
                branch: event.branch,
                doc_paths: summary.doc_paths,
                source_paths: summary.source_paths,
                plan_id: None,
            });
        }

        let generated = self.generator.generate_plan(payload, false).await?;
        let execution_mode = execution_mode_from(&generated)?;
        let document = attach_request_payload(generated, payload);

        let plan = self
            .plans
            .create(PlanCreate {
                repository: event.repository.clone(),
                pr_number: 0,
                branch: event.branch.clone(),
                execution_mode,
                plan: document,
            })
            .await?;

        Ok(IntakeOutcome {
            relevant: true,
            repository: event.repository,
            branch: event.branch,
            doc_paths: summary.doc_paths,
            source_paths: summary.source_paths,
            plan_id: Some(plan.plan_id),
        })
    }

    /// PR automation events always compute in plan-only mode; the stored
    /// plan must pass through a reviewer before anything executes.
    pub async fn handle_actions_event(
        &self,
        payload: &Value,
    ) -> DomainResult<(Value, DocumentationPlan)> {
        let repository = actions_repository(payload)?;
        let pr_number = actions_pr_number(payload);
        let branch = payload
            .get("pull_request")
            .and_then(|pr| pr.get("base"))
            .and_then(|base| base.get("ref"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let generated = self.generator.generate_plan(payload, false).await?;
        let execution_mode = execution_mode_from(&generated)?;
        let document = attach_request_payload(generated.clone(), payload);

        let plan = self
            .plans
            .create(PlanCreate {
                repository,
                pr_number,
                branch,
                execution_mode,
                plan: document,
            })
            .await?;

        Ok((generated, plan))
    }

    /// Reviewer-triggered regeneration from the originally captured payload.
    /// Fails closed when the stored plan predates payload capture, and
    /// leaves the row untouched when the generator fails.
    pub async fn rerun(
        &self,
        plan_id: &str,
        execute_updates: bool,
    ) -> DomainResult<DocumentationPlan> {
        let plan = self.plans.get(plan_id).await?;
        let original = plan
            .request_payload()
            .cloned()
            .ok_or_else(|| {
                DomainError::Validation("plan has no captured request payload".into())
            })?;

        let generated = self
            .generator
            .generate_plan(&original, execute_updates)
            .await?;
        let execution_mode = execution_mode_from(&generated)?;
        let document = attach_request_payload(generated, &original);

        self.plans
            .update_plan_payload(
                plan_id,
                document,
                Some(execution_mode),
                Some(PlanStatus::Pending),
            )
            .await
    }
}

fn actions_repository(payload: &Value) -> DomainResult<String> {
    payload
        .get("repository")
        .and_then(|repo| repo.get("full_name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DomainError::Validation("event payload missing repository.full_name".into()))
}

fn actions_pr_number(payload: &Value) -> i64 {
    payload
        .get("pull_request")
        .and_then(|pr| pr.get("number"))
        .or_else(|| payload.get("number"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn execution_mode_from(generated: &Value) -> DomainResult<ExecutionMode> {
    let raw = generated
        .get("execution_mode")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Upstream("generator output missing execution_mode".into()))?;
    raw.parse()
        .map_err(|_| DomainError::Upstream(format!("generator returned unknown execution_mode: {raw}")))
}

fn attach_request_payload(generated: Value, original: &Value) -> Value {
    let mut document = match generated {
        Value::Object(map) => Value::Object(map),
        other => json!({ "result": other }),
    };
    document[REQUEST_PAYLOAD_KEY] = original.clone();
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_doc_and_source_paths() {
        let summary = classify_paths(&[
            "docs/api/endpoints.md",
            "src/routes/plans.rs",
            "assets/logo.png",
            "Cargo.lock",
        ]);
        assert_eq!(summary.doc_paths, vec!["docs/api/endpoints.md"]);
        assert_eq!(summary.source_paths, vec!["src/routes/plans.rs"]);
        assert!(summary.warrants_documentation());
    }

    #[test]
    fn asset_only_changes_are_not_relevant() {
        let summary = classify_paths(&["assets/logo.png", "config.yaml", "LICENSE"]);
        assert!(!summary.warrants_documentation());
    }

    #[test]
    fn markdown_outside_docs_counts_as_documentation() {
        let summary = classify_paths(&["README.md"]);
        assert_eq!(summary.doc_paths, vec!["README.md"]);
    }

    #[test]
    fn parses_push_event_fields() {
        let payload = json!({
            "ref": "refs/heads/main",
            "repository": { "full_name": "acme/widgets" },
            "commits": [
                { "added": ["docs/new.md"], "modified": ["src/lib.rs"], "removed": [] },
                { "added": [], "modified": ["docs/old.md"], "removed": ["docs/gone.md"] }
            ]
        });
        let event = parse_push_event(&payload).expect("push event");
        assert_eq!(event.repository, "acme/widgets");
        assert_eq!(event.branch.as_deref(), Some("main"));
        assert_eq!(
            event.touched_paths,
            vec!["docs/new.md", "src/lib.rs", "docs/old.md", "docs/gone.md"]
        );
    }

    #[test]
    fn push_event_requires_repository_and_commit_array() {
        let missing_repo = json!({ "ref": "refs/heads/main", "commits": [] });
        assert!(matches!(
            parse_push_event(&missing_repo),
            Err(DomainError::Validation(_))
        ));

        let bad_commits = json!({
            "repository": { "full_name": "acme/widgets" },
            "commits": "nope"
        });
        assert!(matches!(
            parse_push_event(&bad_commits),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn attach_request_payload_wraps_non_objects() {
        let document = attach_request_payload(json!(["edit-a"]), &json!({"ref": "x"}));
        assert_eq!(document["result"], json!(["edit-a"]));
        assert_eq!(document[REQUEST_PAYLOAD_KEY], json!({"ref": "x"}));
    }

    #[test]
    fn execution_mode_is_required_from_generator() {
        assert!(matches!(
            execution_mode_from(&json!({})),
            Err(DomainError::Upstream(_))
        ));
        assert!(matches!(
            execution_mode_from(&json!({"execution_mode": "warp"})),
            Err(DomainError::Upstream(_))
        ));
        assert_eq!(
            execution_mode_from(&json!({"execution_mode": "plan_only"})).unwrap(),
            ExecutionMode::PlanOnly
        );
    }
}
