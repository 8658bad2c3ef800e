// Per-repository row state: machine, store, rendering and check queues

pub mod fsm;
pub mod queue;
pub mod render;
pub mod store;

pub use fsm::{FsmState, RowEvent, RowMachine, StatusPayload};
pub use queue::{ActivateJob, InstallJob, QueueJob, RowBackend, RowQueue, StatusCheckJob};
pub use render::{render, Pill, RowAction, RowView};
pub use store::{RequestTicket, RowStateStore};

use serde::{Deserialize, Serialize};

/// Render-ready view of one repository row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowState {
    pub repo_name: String,
    pub is_plugin: Option<bool>,
    pub is_installed: Option<bool>,
    pub is_active: Option<bool>,
    pub plugin_file: Option<String>,
    pub settings_url: Option<String>,
    pub checking: bool,
    pub installing: bool,
    pub error: Option<String>,
    pub fsm_state: FsmState,
}

impl RowState {
    /// All-unknown state of a row seen for the first time
    pub fn unknown(repo_name: &str) -> Self {
        RowMachine::new().snapshot(repo_name)
    }
}

/// Flattened row status reported by the server
///
/// All nine keys are always serialized, `null` where unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowStatus {
    pub repo_name: String,
    pub is_plugin: Option<bool>,
    pub is_installed: Option<bool>,
    pub is_active: Option<bool>,
    pub plugin_file: Option<String>,
    pub settings_url: Option<String>,
    pub checking: bool,
    pub installing: bool,
    pub error: Option<String>,
}
