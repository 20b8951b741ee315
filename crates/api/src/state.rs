use std::sync::Arc;

use anyhow::bail;
use docline_domain::intake::IntakeService;
use docline_domain::plan::PlanService;
use docline_domain::ports::generator::PlanGenerator;
use docline_domain::ports::plan::PlanRepository;
use docline_infra::config::AppConfig;
use docline_infra::generator::HttpPlanGenerator;
use docline_infra::repositories::plans::InMemoryPlanRepository;

use crate::notifications::NotificationService;
use crate::realtime::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub plan_service: PlanService,
    pub intake: IntakeService,
    pub registry: Arc<ConnectionRegistry>,
    pub notifier: NotificationService,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let generator: Arc<dyn PlanGenerator> = match config.generator_mode.as_str() {
            "http" => Arc::new(HttpPlanGenerator::from_config(&config)?),
            other => bail!("unknown generator mode: {other}"),
        };
        let repository: Arc<dyn PlanRepository> = Arc::new(InMemoryPlanRepository::new());
        Ok(Self::with_parts(config, repository, generator))
    }

    /// Assembles the state from explicit adapters; tests inject stubs here.
    pub fn with_parts(
        config: AppConfig,
        repository: Arc<dyn PlanRepository>,
        generator: Arc<dyn PlanGenerator>,
    ) -> Self {
        let plan_service = PlanService::new(repository);
        let intake = IntakeService::new(generator, plan_service.clone());
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = NotificationService::new(registry.clone());
        Self {
            config,
            plan_service,
            intake,
            registry,
            notifier,
        }
    }
}
