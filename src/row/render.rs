// Pure rendering of a row state into a view description

use super::RowState;
use serde::Serialize;

/// Status pill shown for a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pill {
    Checking,
    Error { tooltip: String },
    Installed { active: bool },
    Plugin,
    NotPlugin,
    Unknown,
}

impl Pill {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Checking => "Checking…",
            Self::Error { .. } => "Error",
            Self::Installed { active: true } => "Installed (Active)",
            Self::Installed { active: false } => "Installed (Inactive)",
            Self::Plugin => "WordPress Plugin",
            Self::NotPlugin => "Not a Plugin",
            Self::Unknown => "Unknown",
        }
    }
}

/// Action offered for a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RowAction {
    /// Disabled placeholder while an install runs
    Installing,
    Activate { plugin_file: String },
    Settings { url: String },
    Install,
    Retry,
    Check,
}

impl RowAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Installing => "Installing…",
            Self::Activate { .. } => "Activate",
            Self::Settings { .. } => "Settings",
            Self::Install => "Install",
            Self::Retry => "Retry",
            Self::Check => "Check",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Installing)
    }
}

/// Everything needed to draw a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowView {
    pub pill: Pill,
    pub actions: Vec<RowAction>,
    /// Installed rows cannot be selected for batch install
    pub checkbox_disabled: bool,
}

/// Render a row state; a pure function of its input
pub fn render(state: &RowState) -> RowView {
    let installed = state.is_installed == Some(true);
    let active = state.is_active == Some(true);

    let pill = if state.checking {
        Pill::Checking
    } else if let Some(error) = &state.error {
        Pill::Error {
            tooltip: error.clone(),
        }
    } else if installed {
        Pill::Installed { active }
    } else if state.is_plugin == Some(true) {
        Pill::Plugin
    } else if state.is_plugin == Some(false) {
        Pill::NotPlugin
    } else {
        Pill::Unknown
    };

    let mut actions = Vec::new();
    if state.installing {
        actions.push(RowAction::Installing);
    } else if installed {
        if let (false, Some(plugin_file)) = (active, &state.plugin_file) {
            actions.push(RowAction::Activate {
                plugin_file: plugin_file.clone(),
            });
        }
        if let Some(url) = &state.settings_url {
            actions.push(RowAction::Settings { url: url.clone() });
        }
    } else if state.is_plugin == Some(true) {
        actions.push(RowAction::Install);
    } else if state.error.is_some() {
        actions.push(RowAction::Retry);
    } else if !state.checking {
        actions.push(RowAction::Check);
    }

    RowView {
        pill,
        actions,
        checkbox_disabled: installed,
    }
}
