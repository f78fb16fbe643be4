use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Configuration payload handed over by the host page.
///
/// This is the whole input of a settings form: the section layout with its
/// setting descriptors, the initial values, and the viewer's flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub sections: Vec<SectionDescriptor>,
    /// `{type: {id: value}}`, plus a `$parent` bucket of read-only values.
    #[serde(default)]
    pub values: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default, alias = "customProperties")]
    pub custom_properties: Vec<CustomProperty>,
    #[serde(default)]
    pub user: UserFlags,
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
    #[serde(default)]
    pub urls: Urls,
    #[serde(default)]
    pub warning: Option<String>,
}

impl Payload {
    /// Parse a payload from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// An ordered group of settings rendered together.
///
/// Settings stay as raw JSON until the registry is built, so that one
/// malformed descriptor only costs that descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub collapse: bool,
    #[serde(default)]
    pub always_show: Option<bool>,
    #[serde(default)]
    pub settings: Vec<Value>,
}

/// Static description of one setting, as the server emits it.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Value,
    /// Either a bare version string or a map from option value to version.
    #[serde(default)]
    pub since: Value,
    #[serde(default)]
    pub contingent_default: Option<Vec<ContingentDefaultDescriptor>>,
    #[serde(default)]
    pub disabled_default: Value,
    #[serde(default)]
    pub requires: Option<String>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub hide_if_not_enabled: Option<bool>,
    #[serde(default)]
    pub preview: Option<bool>,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub upgrade_plan: Value,
    #[serde(default)]
    pub is_inherited: Option<bool>,
    #[serde(default)]
    pub widget: Option<String>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default)]
    pub value_names: Option<Vec<String>>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    /// Version picker option sets keyed by major application version.
    #[serde(default)]
    pub options_map: Option<BTreeMap<String, OptionSet>>,
    #[serde(default)]
    pub default_app_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContingentDefaultDescriptor {
    pub condition: String,
    pub value: Value,
}

/// One entry of a version picker's `options_map`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct OptionSet {
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub value_names: Vec<String>,
    #[serde(default)]
    pub default: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFlags {
    #[serde(default)]
    pub is_previewer: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Urls {
    #[serde(default)]
    pub save: Option<String>,
}

/// Free-form `{key, value}` pair added by the user outside the registry.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomProperty {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl CustomProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        CustomProperty { key: Some(key.into()), value: Some(value.into()) }
    }
}

/// A ready-to-send save call: `POST url` with a JSON `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub url: String,
    pub body: String,
}

/// Reply of the save endpoint: text patches for unrelated page fragments.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SaveResponse {
    #[serde(default)]
    pub update: BTreeMap<String, String>,
}

impl SaveResponse {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Point-in-time projection of one setting's derived state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SettingView {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub visible: bool,
    pub enabled: bool,
    pub visible_value: Value,
    pub value_to_save: Option<Value>,
    pub has_error: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disabled_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accepts_camel_case_custom_properties() {
        let payload = Payload::from_json(
            r#"{
                "sections": [],
                "values": {"hq": {"a": "1"}, "$parent": {"doc_type": "Application"}},
                "customProperties": [{"key": "k", "value": "v"}],
                "user": {"is_previewer": true},
                "urls": {"save": "/save/"}
            }"#,
        )
        .unwrap();

        assert_eq!(payload.custom_properties, vec![CustomProperty::new("k", "v")]);
        assert!(payload.user.is_previewer);
        assert_eq!(payload.urls.save.as_deref(), Some("/save/"));
        assert_eq!(payload.values["$parent"]["doc_type"], "Application");
    }

    #[test]
    fn save_response_reads_update_map() {
        let res = SaveResponse::from_json(r#"{"update": {".variable-version": "2.53"}}"#).unwrap();
        assert_eq!(res.update[".variable-version"], "2.53");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(matches!(Payload::from_json("{\"sections\": 3}"), Err(SettingsError::Payload(_))));
    }
}
