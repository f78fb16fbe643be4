//! Error types for loading and driving a settings form.

use thiserror::Error;

/// Failure while loading a [`SettingsForm`](crate::SettingsForm) or while
/// addressing one of its settings.
///
/// Condition parse problems never show up here: an unparsable or unresolvable
/// clause is logged and dropped.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The payload was not valid JSON or did not have the expected shape.
    #[error("invalid settings payload: {0}")]
    Payload(#[from] serde_json::Error),
    /// A descriptor named a widget that no handler is registered for.
    #[error("setting {setting} uses unknown widget '{widget}'")]
    UnknownWidget {
        /// `type.id` of the offending setting.
        setting: String,
        /// Widget name as written in the descriptor.
        widget: String,
    },
    /// A widget handler refused the descriptor's parameters.
    #[error("widget for setting {setting} could not be attached: {reason}")]
    Widget {
        /// `type.id` of the offending setting.
        setting: String,
        /// Human readable reason.
        reason: String,
    },
    /// The payload carried no save endpoint.
    #[error("payload has no save url")]
    MissingSaveUrl,
    /// A lookup named a `(type, id)` pair that is not in the registry.
    #[error("unknown setting {kind}.{id}")]
    UnknownSetting {
        /// Setting type (`hq`, `properties`, ...).
        kind: String,
        /// Setting id within the type.
        id: String,
    },
}

impl SettingsError {
    pub(crate) fn widget(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::Widget { setting: setting.into(), reason: reason.into() }
    }
}
