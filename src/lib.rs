use serde_json::Value;

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod widgets;

pub use api::{
    ContingentDefaultDescriptor, CustomProperty, OptionSet, Payload, SaveRequest, SaveResponse, SectionDescriptor,
    SettingDescriptor, SettingView, Urls, UserFlags,
};
pub use engine::{
    AppVersion, Clause, Condition, EvalMetrics, HiddenBy, ParentEnv, Reference, Registry, RequiredVersion,
    SaveDocument, Section, Setting, SettingsForm, ValueSource, VersionGate, FLOOR_VERSION,
};
pub use error::SettingsError;
pub use widgets::{
    AttachFn, BoolWidget, BuildSpecWidget, ImageUploaderWidget, NumberWidget, SelectOption, SelectWidget, Widget,
    WidgetKind, WidgetParams, WidgetRegistry,
};

// --- Internal types ---------------------------------------------------------

/// Position of a setting inside the registry.
///
/// Ids are handed out in declaration order (section by section) and stay
/// valid for the lifetime of the form that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SettingId(pub(crate) usize);

impl SettingId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// `(type, id)` identity of a setting, e.g. `hq.build_spec`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SettingKey {
    pub kind: String,
    pub id: String,
}

impl SettingKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        SettingKey { kind: kind.into(), id: id.into() }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.id)
    }
}

// --- Loose value semantics --------------------------------------------------

/// Host-page truthiness: `null`, `false`, `""`, `0` and `NaN` are falsy.
///
/// The settings page picks between a user value and a computed default with
/// `value || default`, so falsy user values fall through to the default.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `Some(value)` when `value` is truthy.
pub(crate) fn truthy_or_none(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| truthy(v))
}

/// Key under which a raw value is looked up in a string-keyed map (`since`).
///
/// Mirrors property-name coercion: strings are used as-is, booleans and
/// numbers are stringified, everything else has no key.
pub(crate) fn option_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Raw values never store `null`; a `null` write clears the value.
pub(crate) fn normalize(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
