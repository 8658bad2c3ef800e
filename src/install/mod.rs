// Plugin installation workflow

mod orchestrator;

pub use orchestrator::{ActivationOutcome, InstallOrchestrator, InstallOutcome, DEFAULT_BRANCH};
