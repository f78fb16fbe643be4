//! Setting registry.
//!
//! The registry is the *static* side of a form: every setting descriptor from
//! every section, flattened into one vector and indexed by `(type, id)`.
//! It is built once per load and never changes afterwards; all mutable state
//! lives in [`SettingsForm`](super::SettingsForm).
//!
//! ## Invariants
//!
//! - `SettingId` is an index into `Registry::settings`.
//! - Duplicate `(type, id)` pairs are kept in `settings` (both render, both
//!   serialize), but the index points at the last one declared.
//! - A descriptor that fails to deserialize is skipped with a warning; it
//!   neither aborts the build nor leaves a hole in the id sequence.
//!
//! `$parent` values (read-only facts about the enclosing document) do not
//! live in the index; they form a separate [`ParentEnv`] consulted by the
//! condition parser.

use crate::api::{SectionDescriptor, SettingDescriptor};
use crate::widgets::WidgetParams;
use crate::{SettingId, SettingKey, truthy, truthy_or_none};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Pseudo-type used by conditions to reference the parent environment.
pub(crate) const PARENT_KIND: &str = "$parent";

/// A setting's immutable descriptor, normalised from [`SettingDescriptor`].
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: SettingKey,
    pub name: String,
    pub description: Option<String>,
    pub default: Value,
    /// Option value -> minimum version; `""` holds the setting's own minimum.
    pub since: BTreeMap<String, String>,
    /// `(condition, value)` pairs in priority order.
    pub contingent_default: Vec<(String, Value)>,
    pub disabled_default: Option<Value>,
    pub requires: String,
    pub disabled: bool,
    pub hide_if_not_enabled: bool,
    pub preview: bool,
    pub permission: Option<String>,
    pub upgrade_plan: bool,
    pub is_inherited: bool,
    pub widget: Option<String>,
    pub params: WidgetParams,
}

impl Setting {
    pub(crate) fn from_descriptor(d: SettingDescriptor) -> Self {
        Setting {
            key: SettingKey::new(d.kind, d.id),
            name: d.name,
            description: d.description,
            default: d.default,
            since: normalize_since(&d.since),
            contingent_default: d
                .contingent_default
                .unwrap_or_default()
                .into_iter()
                .map(|c| (c.condition, c.value))
                .collect(),
            disabled_default: truthy_or_none(Some(&d.disabled_default)).cloned(),
            requires: d.requires.unwrap_or_default(),
            disabled: d.disabled.unwrap_or(false),
            hide_if_not_enabled: d.hide_if_not_enabled.unwrap_or(false),
            preview: d.preview.unwrap_or(false),
            permission: d.permission.filter(|p| !p.is_empty()),
            upgrade_plan: truthy(&d.upgrade_plan),
            is_inherited: d.is_inherited.unwrap_or(false),
            widget: d.widget.filter(|w| !w.is_empty()),
            params: WidgetParams {
                values: d.values,
                value_names: d.value_names,
                min_value: d.min_value,
                max_value: d.max_value,
                options_map: d.options_map,
                default_app_version: d.default_app_version,
            },
        }
    }

    /// DOM id of the setting's input element.
    pub fn input_id(&self) -> String {
        format!("{}-input", self.key.id)
    }
}

/// `since` is either a bare version (the setting's own minimum) or a map of
/// per-option minimums. Non-string versions are stringified; anything else is
/// treated as "no requirement".
fn normalize_since(since: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match since {
        Value::String(v) => {
            out.insert(String::new(), v.clone());
        }
        Value::Number(n) => {
            out.insert(String::new(), n.to_string());
        }
        Value::Object(map) => {
            for (option, version) in map {
                match version {
                    Value::String(v) => {
                        out.insert(option.clone(), v.clone());
                    }
                    Value::Number(n) => {
                        out.insert(option.clone(), n.to_string());
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    out
}

/// Read-only values describing the document that owns the settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentEnv(BTreeMap<String, Value>);

impl ParentEnv {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        ParentEnv(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// An ordered group of settings.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: String,
    pub title: String,
    /// Collapse requested by configuration.
    pub collapse: bool,
    pub always_show: Option<bool>,
    pub settings: Vec<SettingId>,
}

/// Flat `(type, id)` lookup over every declared setting.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    settings: Vec<Setting>,
    sections: Vec<Section>,
    index: HashMap<String, HashMap<String, SettingId>>,
    parent: ParentEnv,
}

impl Registry {
    /// Build the registry from section descriptors.
    ///
    /// Section order and setting order within each section are preserved.
    pub fn build(sections: &[SectionDescriptor], parent: ParentEnv) -> Self {
        let mut registry = Registry { parent, ..Registry::default() };

        for section in sections {
            let mut members = Vec::with_capacity(section.settings.len());
            for raw in &section.settings {
                let descriptor: SettingDescriptor = match serde_json::from_value(raw.clone()) {
                    Ok(d) => d,
                    Err(err) => {
                        warn!(section = %section.id, error = %err, "skipping malformed setting descriptor");
                        continue;
                    }
                };
                let setting = Setting::from_descriptor(descriptor);
                let id = SettingId(registry.settings.len());
                let previous = registry
                    .index
                    .entry(setting.key.kind.clone())
                    .or_default()
                    .insert(setting.key.id.clone(), id);
                if previous.is_some() {
                    debug!(setting = %setting.key, "duplicate setting; index now points at the later one");
                }
                registry.settings.push(setting);
                members.push(id);
            }
            registry.sections.push(Section {
                id: section.id.clone(),
                title: section.title.clone(),
                collapse: section.collapse,
                always_show: section.always_show,
                settings: members,
            });
        }

        registry
    }

    pub fn lookup(&self, kind: &str, id: &str) -> Option<SettingId> {
        self.index.get(kind).and_then(|ids| ids.get(id)).copied()
    }

    pub fn setting(&self, id: SettingId) -> &Setting {
        &self.settings[id.0]
    }

    pub fn settings(&self) -> impl Iterator<Item = (SettingId, &Setting)> {
        self.settings.iter().enumerate().map(|(i, s)| (SettingId(i), s))
    }

    pub fn ids(&self) -> impl Iterator<Item = SettingId> + use<> {
        (0..self.settings.len()).map(SettingId)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn parent(&self) -> &ParentEnv {
        &self.parent
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Setting types in first-declared order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = Vec::new();
        for setting in &self.settings {
            if !kinds.contains(&setting.key.kind.as_str()) {
                kinds.push(&setting.key.kind);
            }
        }
        kinds
    }
}
