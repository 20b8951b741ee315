pub mod plans;

pub use plans::InMemoryPlanRepository;
