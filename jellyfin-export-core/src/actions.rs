//! Action buttons of the Jellyfin Export settings screen.
//!
//! Each button wraps one remote method. A click issues exactly one call,
//! awaits it and only then produces the message shown to the operator.
//! Clicks are independent: repeated clicks queue repeated jobs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Whitelisted server procedures reachable from the settings form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteMethod {
    #[serde(rename = "jellyfin_export.api.sync_all")]
    SyncAll,
    #[serde(rename = "jellyfin_export.api.sync_library")]
    SyncLibrary,
    #[serde(rename = "jellyfin_export.api.cleanup_library")]
    CleanupLibrary,
}

impl RemoteMethod {
    pub const ALL: [RemoteMethod; 3] = [
        RemoteMethod::SyncAll,
        RemoteMethod::SyncLibrary,
        RemoteMethod::CleanupLibrary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RemoteMethod::SyncAll => "jellyfin_export.api.sync_all",
            RemoteMethod::SyncLibrary => "jellyfin_export.api.sync_library",
            RemoteMethod::CleanupLibrary => "jellyfin_export.api.cleanup_library",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }
}

impl fmt::Display for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named call with its JSON keyword arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub method: RemoteMethod,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl RemoteCall {
    pub fn sync_all() -> Self {
        Self {
            method: RemoteMethod::SyncAll,
            args: Map::new(),
        }
    }

    pub fn sync_library(library_name: &str) -> Self {
        Self::for_library(RemoteMethod::SyncLibrary, library_name)
    }

    pub fn cleanup_library(library_name: &str) -> Self {
        Self::for_library(RemoteMethod::CleanupLibrary, library_name)
    }

    fn for_library(method: RemoteMethod, library_name: &str) -> Self {
        let mut args = Map::new();
        args.insert("library_name".into(), json!(library_name));
        Self { method, args }
    }

    pub fn library_name(&self) -> Option<&str> {
        self.args.get("library_name").and_then(Value::as_str)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteCallError {
    /// The server answered and refused the call.
    #[error("{0}")]
    Rejected(String),

    /// The call never got an answer.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The opaque boundary between the form and the server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteCaller: Send + Sync {
    async fn call(&self, call: &RemoteCall) -> Result<Value, RemoteCallError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub call: RemoteCall,
    pub success_message: String,
}

impl ActionButton {
    fn new(label: &str, call: RemoteCall, success_message: &str) -> Self {
        Self {
            label: label.to_string(),
            call,
            success_message: success_message.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded { message: String },
    Failed { message: String },
}

impl ActionOutcome {
    pub fn message(&self) -> &str {
        match self {
            ActionOutcome::Succeeded { message }
            | ActionOutcome::Failed { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Succeeded { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no button labelled {0:?}")]
pub struct UnknownButton(pub String);

/// Button registry of the settings screen.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SettingsForm {
    buttons: Vec<ActionButton>,
}

impl SettingsForm {
    /// A form that already went through one refresh.
    pub fn new() -> Self {
        let mut form = Self::default();
        form.refresh();
        form
    }

    /// Register the action buttons. Runs on every render, so it replaces
    /// whatever was registered before.
    pub fn refresh(&mut self) {
        self.buttons = vec![
            ActionButton::new(
                "Sync All",
                RemoteCall::sync_all(),
                "Queued full sync.",
            ),
            ActionButton::new(
                "Sync Movies",
                RemoteCall::sync_library("Movies"),
                "Queued Movies sync.",
            ),
            ActionButton::new(
                "Sync Shows",
                RemoteCall::sync_library("Shows"),
                "Queued Shows sync.",
            ),
        ];
    }

    pub fn buttons(&self) -> &[ActionButton] {
        &self.buttons
    }

    pub fn button(&self, label: &str) -> Option<&ActionButton> {
        self.buttons.iter().find(|button| button.label == label)
    }

    /// Issue the button's call and wait for it before building the message.
    pub async fn click(
        &self,
        label: &str,
        caller: &dyn RemoteCaller,
    ) -> Result<ActionOutcome, UnknownButton> {
        let button = self
            .button(label)
            .ok_or_else(|| UnknownButton(label.to_string()))?;

        debug!(method = %button.call.method, label, "settings action clicked");
        let outcome = match caller.call(&button.call).await {
            Ok(_) => ActionOutcome::Succeeded {
                message: button.success_message.clone(),
            },
            Err(err) => {
                warn!(method = %button.call.method, error = %err, "settings action failed");
                ActionOutcome::Failed {
                    message: format!("Sync failed: {err}"),
                }
            }
        };
        Ok(outcome)
    }
}
