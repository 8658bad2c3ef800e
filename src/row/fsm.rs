// Row state machine
//
// One machine per repository row. Every state change goes through
// `RowMachine::handle`; the render-ready `RowState` is a projection of the
// machine and converts back without loss.

use super::{RowState, RowStatus};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FsmState {
    #[default]
    Unknown,
    Checking,
    NotPlugin,
    Installable,
    Installing,
    DownloadedInactive,
    Activating,
    DownloadedActive,
    Error,
}

impl FsmState {
    /// An operation is in flight
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Checking | Self::Installing | Self::Activating)
    }
}

/// Deserialize a field so that `null` and absence stay distinguishable
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Status fields carried by a `StatusRefresh`
///
/// Outer `None` on the context fields means the key was absent, which keeps
/// the previous value; `Some(None)` clears it. A status `error` is not part
/// of the payload: the caller turns it into `CheckFail`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default)]
    pub is_plugin: Option<bool>,
    #[serde(default)]
    pub is_installed: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub plugin_file: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub settings_url: Option<Option<String>>,
}

impl StatusPayload {
    /// Target state, independent of the current one
    pub fn derive_state(&self) -> FsmState {
        let installed = self.is_installed == Some(true);
        let active = self.is_active == Some(true);

        match (installed, active, self.is_plugin) {
            (true, true, _) => FsmState::DownloadedActive,
            (true, false, _) => FsmState::DownloadedInactive,
            (false, _, Some(true)) => FsmState::Installable,
            (false, _, Some(false)) => FsmState::NotPlugin,
            (false, _, None) => FsmState::Unknown,
        }
    }
}

impl From<RowStatus> for StatusPayload {
    fn from(status: RowStatus) -> Self {
        Self {
            is_plugin: status.is_plugin,
            is_installed: status.is_installed,
            is_active: status.is_active,
            plugin_file: Some(status.plugin_file),
            settings_url: Some(status.settings_url),
        }
    }
}

/// Events driving a row machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEvent {
    Init,
    CheckStart,
    CheckSuccessPlugin,
    CheckSuccessNotPlugin,
    CheckFail { error: Option<String> },
    StatusRefresh(StatusPayload),
    InstallStart,
    InstallSuccess { activated: bool, plugin_file: Option<String> },
    InstallFail { error: Option<String> },
    ActivateStart,
    ActivateSuccess,
    ActivateFail { error: Option<String> },
    ClearError,
}

impl RowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::CheckStart => "CHECK_START",
            Self::CheckSuccessPlugin => "CHECK_SUCCESS_PLUGIN",
            Self::CheckSuccessNotPlugin => "CHECK_SUCCESS_NOT_PLUGIN",
            Self::CheckFail { .. } => "CHECK_FAIL",
            Self::StatusRefresh(_) => "STATUS_REFRESH",
            Self::InstallStart => "INSTALL_START",
            Self::InstallSuccess { .. } => "INSTALL_SUCCESS",
            Self::InstallFail { .. } => "INSTALL_FAIL",
            Self::ActivateStart => "ACTIVATE_START",
            Self::ActivateSuccess => "ACTIVATE_SUCCESS",
            Self::ActivateFail { .. } => "ACTIVATE_FAIL",
            Self::ClearError => "CLEAR_ERROR",
        }
    }
}

/// State machine of one repository row
///
/// `error` is only ever set while in `ERROR`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMachine {
    state: FsmState,
    plugin_file: Option<String>,
    settings_url: Option<String>,
    error: Option<String>,
}

impl RowMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Apply an event and return the resulting state
    pub fn handle(&mut self, event: RowEvent) -> FsmState {
        match event {
            RowEvent::Init | RowEvent::ClearError => self.enter(FsmState::Unknown),
            RowEvent::CheckStart => self.enter(FsmState::Checking),
            RowEvent::CheckSuccessPlugin => self.enter(FsmState::Installable),
            RowEvent::CheckSuccessNotPlugin => self.enter(FsmState::NotPlugin),
            RowEvent::InstallStart => self.enter(FsmState::Installing),
            RowEvent::ActivateStart => self.enter(FsmState::Activating),
            RowEvent::ActivateSuccess => self.enter(FsmState::DownloadedActive),
            RowEvent::InstallSuccess {
                activated,
                plugin_file,
            } => {
                if plugin_file.is_some() {
                    self.plugin_file = plugin_file;
                }
                self.enter(if activated {
                    FsmState::DownloadedActive
                } else {
                    FsmState::DownloadedInactive
                });
            }
            RowEvent::CheckFail { error } => self.fail(error, "check_failed"),
            RowEvent::InstallFail { error } => self.fail(error, "install_failed"),
            RowEvent::ActivateFail { error } => self.fail(error, "activate_failed"),
            RowEvent::StatusRefresh(payload) => self.refresh(payload),
        }
        self.state
    }

    fn enter(&mut self, state: FsmState) {
        self.state = state;
        self.error = None;
    }

    fn fail(&mut self, error: Option<String>, default: &str) {
        self.state = FsmState::Error;
        self.error = Some(
            error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| default.to_string()),
        );
    }

    fn refresh(&mut self, payload: StatusPayload) {
        let target = payload.derive_state();
        if let Some(plugin_file) = payload.plugin_file {
            self.plugin_file = plugin_file;
        }
        if let Some(settings_url) = payload.settings_url {
            self.settings_url = settings_url;
        }
        // Refresh targets never include ERROR, so no error survives one
        self.enter(target);
    }

    /// Project the machine onto a render-ready row state
    pub fn snapshot(&self, repo_name: &str) -> RowState {
        let (is_plugin, is_installed, is_active) = match self.state {
            FsmState::DownloadedActive => (Some(true), Some(true), Some(true)),
            FsmState::DownloadedInactive | FsmState::Activating => {
                (Some(true), Some(true), Some(false))
            }
            FsmState::Installable | FsmState::Installing => (Some(true), Some(false), Some(false)),
            FsmState::NotPlugin => (Some(false), Some(false), Some(false)),
            FsmState::Unknown | FsmState::Checking | FsmState::Error => (None, None, None),
        };

        RowState {
            repo_name: repo_name.to_string(),
            is_plugin,
            is_installed,
            is_active,
            plugin_file: self.plugin_file.clone(),
            settings_url: self.settings_url.clone(),
            checking: self.state == FsmState::Checking,
            installing: self.state == FsmState::Installing,
            error: match self.state {
                FsmState::Error => self.error.clone(),
                _ => None,
            },
            fsm_state: self.state,
        }
    }

    /// Rebuild a machine from its snapshot
    pub fn from_snapshot(snapshot: &RowState) -> Self {
        let state = snapshot.fsm_state;
        Self {
            state,
            plugin_file: snapshot.plugin_file.clone(),
            settings_url: snapshot.settings_url.clone(),
            error: match state {
                FsmState::Error => Some(
                    snapshot
                        .error
                        .clone()
                        .unwrap_or_else(|| "error".to_string()),
                ),
                _ => None,
            },
        }
    }
}
