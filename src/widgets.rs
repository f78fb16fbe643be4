//! Widget extensions.
//!
//! A setting descriptor may name a `widget`. Widgets add rendering-side state
//! (option lists, a boolean view of a two-valued domain, a logo slug) and,
//! for some kinds, a legality check that feeds the setting's `hasError`.
//!
//! Widget names are parsed into a closed [`WidgetKind`] at load time; an
//! unknown name fails the load. Each kind is attached through an [`AttachFn`]
//! looked up in a [`WidgetRegistry`], which hosts can override per kind.
//!
//! ```text
//! descriptor.widget ──"select"──▶ WidgetKind::Select ──registry──▶ attach_select
//!                                                                 └─▶ Widget::Select
//! ```

use crate::api::OptionSet;
use crate::engine::{Registry, Setting};
use crate::error::SettingsError;
use crate::{SettingId, truthy};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::warn;

/// Widget parameters carried by a setting descriptor.
#[derive(Debug, Clone, Default)]
pub struct WidgetParams {
    pub values: Option<Vec<Value>>,
    pub value_names: Option<Vec<String>>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub options_map: Option<BTreeMap<String, OptionSet>>,
    pub default_app_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Select,
    MultiSelect,
    Bool,
    BuildSpec,
    Number,
    TextInput,
    ImageUploader,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 7] = [
        WidgetKind::Select,
        WidgetKind::MultiSelect,
        WidgetKind::Bool,
        WidgetKind::BuildSpec,
        WidgetKind::Number,
        WidgetKind::TextInput,
        WidgetKind::ImageUploader,
    ];

    /// Name as written in descriptors.
    pub fn name(self) -> &'static str {
        match self {
            WidgetKind::Select => "select",
            WidgetKind::MultiSelect => "multiSelect",
            WidgetKind::Bool => "bool",
            WidgetKind::BuildSpec => "build_spec",
            WidgetKind::Number => "number",
            WidgetKind::TextInput => "text_input",
            WidgetKind::ImageUploader => "image_uploader",
        }
    }
}

impl FromStr for WidgetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WidgetKind::ALL.into_iter().find(|k| k.name() == s).ok_or_else(|| s.to_string())
    }
}

/// One entry of a dropdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

/// Pair `values` with their display names. Labels of default values get a
/// `* ` prefix.
pub(crate) fn build_options(values: &[Value], names: &[String], defaults: &[Value]) -> Vec<SelectOption> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let name = names.get(i).cloned().unwrap_or_else(|| display(value));
            let marker = if defaults.contains(value) { "* " } else { "" };
            SelectOption { label: format!("{marker}{name}"), value: value.clone() }
        })
        .collect()
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Dropdown state shared by `select`, `text_input`, `multiSelect` and the
/// version picker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectWidget {
    pub options: Vec<SelectOption>,
}

impl SelectWidget {
    /// An unset (falsy) raw value is always legal; otherwise it must be one
    /// of the options.
    pub fn value_is_legal(&self, raw: Option<&Value>) -> bool {
        match raw {
            Some(v) if truthy(v) => self.options.iter().any(|o| &o.value == v),
            _ => true,
        }
    }

    /// Every element of a multi-valued raw value must be an option.
    pub fn values_are_legal(&self, raw: Option<&Value>) -> bool {
        match raw {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.iter().all(|v| self.options.iter().any(|o| &o.value == v)),
            Some(v) => self.options.iter().any(|o| &o.value == v),
        }
    }

    pub fn selected(&self, visible: &Value) -> Option<&SelectOption> {
        self.options.iter().find(|o| &o.value == visible)
    }

    pub fn selected_many(&self, visible: &Value) -> Vec<&SelectOption> {
        match visible {
            Value::Array(items) => self.options.iter().filter(|o| items.contains(&o.value)).collect(),
            _ => Vec::new(),
        }
    }
}

/// Maps a two-valued domain (`[on, off]`) onto a checkbox.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolWidget {
    pub values: [Value; 2],
}

impl BoolWidget {
    pub fn is_on(&self, visible: &Value) -> bool {
        visible == &self.values[0]
    }

    pub fn value_for(&self, on: bool) -> Value {
        if on { self.values[0].clone() } else { self.values[1].clone() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberWidget {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberWidget {
    /// Bounds of 0 count as "no bound". Non-numeric values never compare
    /// out of range.
    pub fn value_is_legal(&self, raw: Option<&Value>) -> bool {
        let Some(value) = raw.and_then(as_number) else {
            return true;
        };
        if let Some(min) = self.min.filter(|m| *m != 0.0) {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max.filter(|m| *m != 0.0) {
            if value > max {
                return false;
            }
        }
        true
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Version picker: a dropdown whose option set follows the major version of
/// `hq.application_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSpecWidget {
    pub select: SelectWidget,
    pub options_map: BTreeMap<String, OptionSet>,
    /// Default of the currently loaded option set.
    pub default: Value,
    /// The setting whose raw value selects the option set.
    pub app_version_source: Option<SettingId>,
}

impl BuildSpecWidget {
    /// Load the option set for `app_version`'s major version.
    pub fn apply_app_version(&mut self, app_version: &str) -> Result<(), String> {
        let major = crate::engine::version_major(app_version);
        let set = self
            .options_map
            .get(major)
            .ok_or_else(|| format!("no build options for major version '{major}'"))?;
        self.select.options = build_options(&set.values, &set.value_names, std::slice::from_ref(&set.default));
        self.default = set.default.clone();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUploaderWidget {
    pub slug: String,
}

impl ImageUploaderWidget {
    pub fn href(&self) -> String {
        format!("#{}", self.slug)
    }
}

/// Widget state attached to a setting.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Select(SelectWidget),
    TextInput(SelectWidget),
    MultiSelect(SelectWidget),
    Bool(BoolWidget),
    BuildSpec(BuildSpecWidget),
    Number(NumberWidget),
    ImageUploader(ImageUploaderWidget),
}

impl Widget {
    pub fn kind(&self) -> WidgetKind {
        match self {
            Widget::Select(_) => WidgetKind::Select,
            Widget::TextInput(_) => WidgetKind::TextInput,
            Widget::MultiSelect(_) => WidgetKind::MultiSelect,
            Widget::Bool(_) => WidgetKind::Bool,
            Widget::BuildSpec(_) => WidgetKind::BuildSpec,
            Widget::Number(_) => WidgetKind::Number,
            Widget::ImageUploader(_) => WidgetKind::ImageUploader,
        }
    }

    /// Legality of the raw value; widgets without a check accept anything.
    pub fn value_is_legal(&self, raw: Option<&Value>) -> bool {
        match self {
            Widget::Select(s) | Widget::TextInput(s) => s.value_is_legal(raw),
            Widget::BuildSpec(b) => b.select.value_is_legal(raw),
            Widget::MultiSelect(s) => s.values_are_legal(raw),
            Widget::Number(n) => n.value_is_legal(raw),
            Widget::Bool(_) | Widget::ImageUploader(_) => true,
        }
    }

    pub fn options(&self) -> Option<&[SelectOption]> {
        match self {
            Widget::Select(s) | Widget::TextInput(s) | Widget::MultiSelect(s) => Some(&s.options),
            Widget::BuildSpec(b) => Some(&b.select.options),
            _ => None,
        }
    }

    /// A default that replaces the descriptor's static one.
    pub(crate) fn default_override(&self) -> Option<&Value> {
        match self {
            Widget::BuildSpec(b) => Some(&b.default),
            _ => None,
        }
    }
}

/// Builds a widget for a setting. `Err` carries a human readable reason.
pub type AttachFn = fn(&Setting, &Registry) -> Result<Widget, String>;

fn attach_select(setting: &Setting, _: &Registry) -> Result<Widget, String> {
    Ok(Widget::Select(select_from(setting, std::slice::from_ref(&setting.default))))
}

fn attach_text_input(setting: &Setting, _: &Registry) -> Result<Widget, String> {
    Ok(Widget::TextInput(select_from(setting, std::slice::from_ref(&setting.default))))
}

fn attach_multi_select(setting: &Setting, _: &Registry) -> Result<Widget, String> {
    let defaults = match &setting.default {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    Ok(Widget::MultiSelect(select_from(setting, &defaults)))
}

fn select_from(setting: &Setting, defaults: &[Value]) -> SelectWidget {
    let values = setting.params.values.as_deref().unwrap_or_default();
    let names = setting.params.value_names.as_deref().unwrap_or_default();
    SelectWidget { options: build_options(values, names, defaults) }
}

fn attach_bool(setting: &Setting, _: &Registry) -> Result<Widget, String> {
    let values = match setting.params.values.as_deref() {
        None => [Value::Bool(true), Value::Bool(false)],
        Some([on, off, ..]) => [on.clone(), off.clone()],
        Some(_) => {
            warn!(setting = %setting.key, "bool widget needs two values; using [true, false]");
            [Value::Bool(true), Value::Bool(false)]
        }
    };
    Ok(Widget::Bool(BoolWidget { values }))
}

fn attach_build_spec(setting: &Setting, registry: &Registry) -> Result<Widget, String> {
    let options_map = setting.params.options_map.clone().ok_or("build_spec widget needs an options_map")?;
    let initial = setting.params.default_app_version.as_deref().ok_or("build_spec widget needs a default_app_version")?;
    let app_version_source = registry.lookup("hq", "application_version");
    if app_version_source.is_none() {
        warn!(setting = %setting.key, "no hq.application_version setting; build options will not follow it");
    }
    let mut widget =
        BuildSpecWidget { select: SelectWidget::default(), options_map, default: Value::Null, app_version_source };
    widget.apply_app_version(initial)?;
    Ok(Widget::BuildSpec(widget))
}

fn attach_number(setting: &Setting, _: &Registry) -> Result<Widget, String> {
    Ok(Widget::Number(NumberWidget { min: setting.params.min_value, max: setting.params.max_value }))
}

fn attach_image_uploader(setting: &Setting, _: &Registry) -> Result<Widget, String> {
    Ok(Widget::ImageUploader(ImageUploaderWidget { slug: format!("hq_{}", setting.key.id) }))
}

/// `WidgetKind -> AttachFn` table.
#[derive(Debug, Clone)]
pub struct WidgetRegistry {
    handlers: HashMap<WidgetKind, AttachFn>,
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        let mut handlers: HashMap<WidgetKind, AttachFn> = HashMap::new();
        handlers.insert(WidgetKind::Select, attach_select);
        handlers.insert(WidgetKind::TextInput, attach_text_input);
        handlers.insert(WidgetKind::MultiSelect, attach_multi_select);
        handlers.insert(WidgetKind::Bool, attach_bool);
        handlers.insert(WidgetKind::BuildSpec, attach_build_spec);
        handlers.insert(WidgetKind::Number, attach_number);
        handlers.insert(WidgetKind::ImageUploader, attach_image_uploader);
        WidgetRegistry { handlers }
    }
}

impl WidgetRegistry {
    /// A registry with no handlers at all.
    pub fn empty() -> Self {
        WidgetRegistry { handlers: HashMap::new() }
    }

    /// Install (or replace) the handler for `kind`.
    pub fn register(&mut self, kind: WidgetKind, attach: AttachFn) -> &mut Self {
        self.handlers.insert(kind, attach);
        self
    }

    /// Attach the widget named by `setting.widget`, if any.
    pub fn attach(&self, setting: &Setting, registry: &Registry) -> Result<Option<Widget>, SettingsError> {
        let Some(name) = setting.widget.as_deref() else {
            return Ok(None);
        };
        let unknown = || SettingsError::UnknownWidget { setting: setting.key.to_string(), widget: name.to_string() };
        let kind: WidgetKind = name.parse().map_err(|_| unknown())?;
        let attach = self.handlers.get(&kind).ok_or_else(unknown)?;
        attach(setting, registry).map(Some).map_err(|reason| SettingsError::widget(setting.key.to_string(), reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{SectionDescriptor, SettingDescriptor};
    use crate::engine::ParentEnv;
    use serde_json::json;

    fn setting(raw: Value) -> Setting {
        let d: SettingDescriptor = serde_json::from_value(raw).unwrap();
        Setting::from_descriptor(d)
    }

    #[test]
    fn widget_names_round_trip_through_kinds() {
        for kind in WidgetKind::ALL {
            assert_eq!(kind.name().parse::<WidgetKind>(), Ok(kind));
        }
        assert!("sparkline".parse::<WidgetKind>().is_err());
    }

    #[test]
    fn select_options_mark_the_default() {
        let s = setting(json!({
            "type": "hq", "id": "s", "widget": "select", "default": "b",
            "values": ["a", "b", "c"], "value_names": ["Alpha", "Beta"]
        }));
        let widget = WidgetRegistry::default().attach(&s, &Registry::default()).unwrap().unwrap();
        let labels: Vec<&str> = widget.options().unwrap().iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Alpha", "* Beta", "c"]);
    }

    #[test]
    fn select_legality_requires_membership_when_set() {
        let w = SelectWidget { options: build_options(&[json!("a"), json!("b")], &[], &[]) };
        assert!(w.value_is_legal(None));
        assert!(w.value_is_legal(Some(&json!(""))));
        assert!(w.value_is_legal(Some(&json!("a"))));
        assert!(!w.value_is_legal(Some(&json!("z"))));
        assert_eq!(w.selected(&json!("b")).map(|o| o.label.as_str()), Some("b"));
        assert_eq!(w.selected(&json!("z")), None);
    }

    #[test]
    fn multi_select_checks_every_element() {
        let w = SelectWidget { options: build_options(&[json!("a"), json!("b")], &[], &[]) };
        assert!(w.values_are_legal(None));
        assert!(w.values_are_legal(Some(&json!(["a", "b"]))));
        assert!(!w.values_are_legal(Some(&json!(["a", "z"]))));
        assert_eq!(w.selected_many(&json!(["b"])).len(), 1);
    }

    #[test]
    fn bool_defaults_to_true_false() {
        let s = setting(json!({"type": "hq", "id": "b", "widget": "bool"}));
        let Some(Widget::Bool(w)) = WidgetRegistry::default().attach(&s, &Registry::default()).unwrap() else {
            panic!("expected bool widget");
        };
        assert!(w.is_on(&json!(true)));
        assert_eq!(w.value_for(false), json!(false));

        let s = setting(json!({"type": "hq", "id": "b", "widget": "bool", "values": ["yes", "no"]}));
        let Some(Widget::Bool(w)) = WidgetRegistry::default().attach(&s, &Registry::default()).unwrap() else {
            panic!("expected bool widget");
        };
        assert!(!w.is_on(&json!("no")));
        assert_eq!(w.value_for(true), json!("yes"));
    }

    #[test]
    fn bool_with_a_single_value_falls_back_to_true_false() {
        let s = setting(json!({"type": "hq", "id": "b", "widget": "bool", "values": ["only"]}));
        let Some(Widget::Bool(w)) = WidgetRegistry::default().attach(&s, &Registry::default()).unwrap() else {
            panic!("expected bool widget");
        };
        assert_eq!(w.values, [json!(true), json!(false)]);
    }

    #[test]
    fn number_bounds_ignore_zero() {
        let w = NumberWidget { min: Some(1.0), max: Some(10.0) };
        assert!(w.value_is_legal(Some(&json!(5))));
        assert!(w.value_is_legal(Some(&json!("5"))));
        assert!(!w.value_is_legal(Some(&json!(0.5))));
        assert!(!w.value_is_legal(Some(&json!("11"))));
        assert!(w.value_is_legal(None));

        let open = NumberWidget { min: Some(0.0), max: None };
        assert!(open.value_is_legal(Some(&json!(-3))));
    }

    #[test]
    fn unknown_widget_fails_fast() {
        let s = setting(json!({"type": "hq", "id": "x", "widget": "sparkline"}));
        let err = WidgetRegistry::default().attach(&s, &Registry::default()).unwrap_err();
        assert!(matches!(err, SettingsError::UnknownWidget { ref widget, .. } if widget == "sparkline"));

        let s = setting(json!({"type": "hq", "id": "x", "widget": "select"}));
        assert!(matches!(
            WidgetRegistry::empty().attach(&s, &Registry::default()),
            Err(SettingsError::UnknownWidget { .. })
        ));
    }

    #[test]
    fn build_spec_loads_options_for_the_initial_major_version() {
        let raw = json!({
            "type": "hq", "id": "build_spec", "widget": "build_spec",
            "default_app_version": "2.0",
            "options_map": {
                "1": {"values": ["1.3.0/latest"], "value_names": ["CommCare 1.3"], "default": "1.3.0/latest"},
                "2": {"values": ["2.52.0/latest", "2.53.0/latest"], "value_names": ["CommCare 2.52", "CommCare 2.53"],
                      "default": "2.53.0/latest"}
            }
        });
        let sections = vec![SectionDescriptor {
            settings: vec![raw.clone(), json!({"type": "hq", "id": "application_version"})],
            ..SectionDescriptor::default()
        }];
        let registry = Registry::build(&sections, ParentEnv::default());
        let Some(Widget::BuildSpec(mut w)) = WidgetRegistry::default().attach(&setting(raw), &registry).unwrap()
        else {
            panic!("expected build_spec widget");
        };
        assert_eq!(w.default, json!("2.53.0/latest"));
        assert_eq!(w.select.options.len(), 2);
        assert_eq!(w.select.options[1].label, "* CommCare 2.53");
        assert_eq!(w.app_version_source, registry.lookup("hq", "application_version"));

        w.apply_app_version("1.0").unwrap();
        assert_eq!(w.default, json!("1.3.0/latest"));
        assert!(w.apply_app_version("7.0").is_err());
    }

    #[test]
    fn image_uploader_gets_a_slug() {
        let s = setting(json!({"type": "hq", "id": "logo_web", "widget": "image_uploader"}));
        let Some(Widget::ImageUploader(w)) = WidgetRegistry::default().attach(&s, &Registry::default()).unwrap()
        else {
            panic!("expected image uploader");
        };
        assert_eq!(w.slug, "hq_logo_web");
        assert_eq!(w.href(), "#hq_logo_web");
    }
}
