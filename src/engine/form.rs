//! Settings form: the mutable half of the engine.
//!
//! A [`SettingsForm`] owns everything that changes during an editing session:
//! raw values, widget state, the running application version and the custom
//! properties. Derived reads live in `graph.rs`; this module implements
//! loading and writing.
//!
//! ## Writes
//!
//! Every raw value change goes through [`SettingsForm::set_value`], which runs
//! a depth-first cascade before returning:
//!
//! ```text
//! set_value(S2, v)
//!   └─ S2 changed ─┬─ version picker listening to S2? reload its options
//!                  ├─ version picker display changed? move the running version
//!                  └─ for each S whose contingent_default mentions S2:
//!                        S.value = S.computeDefault()     (may cascade further)
//! ```
//!
//! A step whose value is unchanged stops that branch, as does a reset of the
//! setting being written or a return to a value the cascade already wrote.
//! The cascade only follows contingent-default references; settings that
//! merely `require` the changed one are not reset, their derived state simply
//! re-evaluates on next read.

use super::condition::{Condition, ValueSource};
use super::metrics::{Counters, EvalMetrics};
use super::registry::{PARENT_KIND, ParentEnv, Registry, Section, Setting};
use super::serialize::SaveDocument;
use super::version::{VersionGate, major_minor};
use crate::api::{CustomProperty, Payload, SaveRequest, SettingView};
use crate::error::SettingsError;
use crate::widgets::{Widget, WidgetKind, WidgetRegistry};
use crate::{SettingId, normalize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Which memoised attribute an evaluation is computing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Derived {
    Enabled,
    Default,
    Visible,
}

/// Per-setting memo, valid while `revision` matches the form's.
#[derive(Debug, Clone, Default)]
pub(super) struct Memo {
    pub(super) revision: u64,
    pub(super) enabled: Option<bool>,
    pub(super) default: Option<Value>,
    pub(super) visible: Option<Value>,
}

enum Step {
    Write(SettingId, Option<Value>),
    Reset(SettingId),
}

/// A loaded settings page: registry, live values and derived state.
#[derive(Debug)]
pub struct SettingsForm {
    pub(super) registry: Registry,
    pub(super) values: Vec<Option<Value>>,
    /// Effective static default; a version picker may replace it.
    pub(super) defaults: Vec<Value>,
    pub(super) requires: Vec<Condition>,
    pub(super) contingent: Vec<Vec<(Condition, Value)>>,
    /// Changed setting -> settings whose contingent defaults reference it.
    dependents: Vec<Vec<SettingId>>,
    pub(super) widgets: Vec<Option<Widget>>,
    pub(super) version: Box<dyn VersionGate>,
    pub(super) is_previewer: bool,
    pub(super) permissions: BTreeMap<String, bool>,
    pub(super) custom_properties: Vec<CustomProperty>,
    save_url: Option<String>,
    warning: Option<String>,
    /// Last seen display value of each version picker.
    observed_builds: Vec<(SettingId, Value)>,
    last_saved: SaveDocument,
    pub(super) revision: u64,
    pub(super) memo: RefCell<Vec<Memo>>,
    pub(super) in_flight: RefCell<HashSet<(SettingId, Derived)>>,
    pub(super) counters: Counters,
}

impl SettingsForm {
    /// Load a form with the built-in widget handlers.
    pub fn load(payload: Payload, version: impl VersionGate + 'static) -> Result<Self, SettingsError> {
        Self::load_with(payload, version, &WidgetRegistry::default())
    }

    /// Load a form, attaching widgets through `widgets`.
    pub fn load_with(
        mut payload: Payload,
        version: impl VersionGate + 'static,
        widgets: &WidgetRegistry,
    ) -> Result<Self, SettingsError> {
        let parent = ParentEnv::new(payload.values.remove(PARENT_KIND).unwrap_or_default());
        let registry = Registry::build(&payload.sections, parent);

        let values: Vec<Option<Value>> = registry
            .settings()
            .map(|(_, s)| normalize(payload.values.get(&s.key.kind).and_then(|bucket| bucket.get(&s.key.id)).cloned()))
            .collect();

        let requires: Vec<Condition> =
            registry.settings().map(|(_, s)| Condition::parse(&s.requires, &registry)).collect();

        let contingent: Vec<Vec<(Condition, Value)>> = registry
            .settings()
            .map(|(_, s)| {
                s.contingent_default
                    .iter()
                    .map(|(expr, value)| (Condition::parse(expr, &registry), value.clone()))
                    .collect()
            })
            .collect();

        let mut dependents: Vec<Vec<SettingId>> = vec![Vec::new(); registry.len()];
        for (index, clauses) in contingent.iter().enumerate() {
            let dependent = SettingId(index);
            for (condition, _) in clauses {
                for source in condition.settings() {
                    let list = &mut dependents[source.0];
                    if !list.contains(&dependent) {
                        list.push(dependent);
                    }
                }
            }
        }

        let mut attached = Vec::with_capacity(registry.len());
        let mut defaults = Vec::with_capacity(registry.len());
        for (_, setting) in registry.settings() {
            let widget = widgets.attach(setting, &registry)?;
            defaults.push(widget.as_ref().and_then(Widget::default_override).cloned().unwrap_or_else(|| setting.default.clone()));
            attached.push(widget);
        }

        let mut custom_properties = payload.custom_properties;
        custom_properties.sort_by(|a, b| a.key.cmp(&b.key));

        let len = registry.len();
        let mut form = SettingsForm {
            registry,
            values,
            defaults,
            requires,
            contingent,
            dependents,
            widgets: attached,
            version: Box::new(version),
            is_previewer: payload.user.is_previewer,
            permissions: payload.permissions,
            custom_properties,
            save_url: payload.urls.save,
            warning: payload.warning,
            observed_builds: Vec::new(),
            last_saved: SaveDocument::default(),
            revision: 1,
            memo: RefCell::new(vec![Memo::default(); len]),
            in_flight: RefCell::new(HashSet::new()),
            counters: Counters::default(),
        };

        form.observed_builds = form
            .registry
            .ids()
            .filter(|id| form.widget_kind(*id) == Some(WidgetKind::BuildSpec))
            .map(|id| (id, form.visible_value(id)))
            .collect();
        form.last_saved = form.serialize();

        debug!(settings = len, sections = form.registry.sections().len(), "settings form loaded");
        Ok(form)
    }

    // --- Lookups ------------------------------------------------------------

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn setting(&self, id: SettingId) -> &Setting {
        self.registry.setting(id)
    }

    pub fn lookup(&self, kind: &str, id: &str) -> Option<SettingId> {
        self.registry.lookup(kind, id)
    }

    /// Like [`lookup`](Self::lookup), but a missing setting is an error.
    pub fn require(&self, kind: &str, id: &str) -> Result<SettingId, SettingsError> {
        self.lookup(kind, id)
            .ok_or_else(|| SettingsError::UnknownSetting { kind: kind.to_string(), id: id.to_string() })
    }

    pub fn ids(&self) -> impl Iterator<Item = SettingId> + use<> {
        self.registry.ids()
    }

    pub fn sections(&self) -> &[Section] {
        self.registry.sections()
    }

    /// The raw user-entered value.
    pub fn value(&self, id: SettingId) -> Option<&Value> {
        self.values[id.0].as_ref()
    }

    /// The effective static default (after any widget override).
    pub fn default_value(&self, id: SettingId) -> &Value {
        &self.defaults[id.0]
    }

    pub fn widget(&self, id: SettingId) -> Option<&Widget> {
        self.widgets[id.0].as_ref()
    }

    pub fn widget_kind(&self, id: SettingId) -> Option<WidgetKind> {
        self.widget(id).map(Widget::kind)
    }

    /// Running application version, if known.
    pub fn app_version(&self) -> Option<String> {
        self.version.current()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn is_previewer(&self) -> bool {
        self.is_previewer
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.get(permission).copied().unwrap_or(false)
    }

    pub fn metrics(&self) -> EvalMetrics {
        self.counters.snapshot()
    }

    // --- Writes -------------------------------------------------------------

    /// Write a raw value and run every cascade it triggers. `None` (or JSON
    /// `null`) clears the value.
    ///
    /// Within one cascade the written setting is never reset, and a setting
    /// never returns to a value the cascade already gave it; either case ends
    /// that branch. Mutually dependent contingent defaults settle on one
    /// deterministic state.
    pub fn set_value(&mut self, id: SettingId, value: Option<Value>) {
        let mut written: Vec<(SettingId, Option<Value>)> = Vec::new();
        let mut stack = vec![Step::Write(id, normalize(value))];

        while let Some(step) = stack.pop() {
            let (target, value, is_reset) = match step {
                Step::Write(target, value) => (target, value, false),
                Step::Reset(target) if target == id => {
                    debug!(setting = %self.setting(target).key, "cascade reached the written setting; keeping it");
                    continue;
                }
                Step::Reset(target) => (target, normalize(Some(self.compute_default(target))), true),
            };
            if self.values[target.0] == value {
                continue;
            }
            if written.iter().any(|(s, v)| *s == target && *v == value) {
                warn!(setting = %self.setting(target).key, ?value, "cascade returned to an earlier value; stopping branch");
                self.counters.cycle();
                continue;
            }

            debug!(setting = %self.setting(target).key, ?value, cascade = is_reset, "value changed");
            if is_reset {
                self.counters.cascade_reset();
            }
            self.counters.write();
            written.push((target, value.clone()));
            self.values[target.0] = value;
            self.revision += 1;

            for dependent in self.dependents[target.0].iter().rev() {
                stack.push(Step::Reset(*dependent));
            }
            for picker in self.follow_app_version(target).into_iter().rev() {
                stack.push(Step::Write(picker, None));
            }
            self.sync_build_versions();
        }
    }

    /// The `visibleValue` writer: sets the raw value regardless of whether
    /// the setting is enabled.
    pub fn set_visible_value(&mut self, id: SettingId, value: Value) {
        self.set_value(id, Some(value));
    }

    /// Dropdown selection; `None` leaves the value alone.
    pub fn select_option(&mut self, id: SettingId, value: Option<Value>) {
        if let Some(value) = value {
            self.set_visible_value(id, value);
        }
    }

    /// Multi-select selection.
    pub fn select_options(&mut self, id: SettingId, values: Vec<Value>) {
        self.set_visible_value(id, Value::Array(values));
    }

    /// Checkbox write: maps through a `bool` widget's value pair when the
    /// setting has one, else writes a JSON boolean.
    pub fn set_bool_value(&mut self, id: SettingId, on: bool) {
        let value = match self.widget(id) {
            Some(Widget::Bool(w)) => w.value_for(on),
            _ => Value::Bool(on),
        };
        self.set_visible_value(id, value);
    }

    /// Switch the running application version. Version pickers whose display
    /// changes as a result move it again.
    pub fn set_app_version(&mut self, version: &str) {
        if self.switch_version(version) {
            self.sync_build_versions();
        }
    }

    fn switch_version(&mut self, version: &str) -> bool {
        if self.version.current().as_deref() == Some(version) {
            return false;
        }
        debug!(version, "running version changed");
        self.version.set_current(version);
        self.revision += 1;
        true
    }

    /// Reload the option set of every version picker that listens to
    /// `changed`. Returns the pickers whose selection must be cleared.
    fn follow_app_version(&mut self, changed: SettingId) -> Vec<SettingId> {
        let app_version = self.values[changed.0].as_ref().and_then(Value::as_str).map(str::to_owned);
        let mut reset = Vec::new();
        for (index, slot) in self.widgets.iter_mut().enumerate() {
            let Some(Widget::BuildSpec(picker)) = slot else {
                continue;
            };
            if picker.app_version_source != Some(changed) {
                continue;
            }
            let Some(app_version) = app_version.as_deref() else {
                warn!(setting = %self.registry.setting(SettingId(index)).key, "application version cleared; keeping build options");
                continue;
            };
            match picker.apply_app_version(app_version) {
                Ok(()) => {
                    self.defaults[index] = picker.default.clone();
                    reset.push(SettingId(index));
                }
                Err(reason) => warn!(setting = %self.registry.setting(SettingId(index)).key, %reason, "keeping build options"),
            }
        }
        if !reset.is_empty() {
            self.revision += 1;
        }
        reset
    }

    /// Move the running version to follow any version picker whose display
    /// value changed, until no display changes. A version is taken at most
    /// once per sync.
    fn sync_build_versions(&mut self) {
        let mut visited: Vec<String> = Vec::new();
        loop {
            let mut moved = false;
            for i in 0..self.observed_builds.len() {
                let id = self.observed_builds[i].0;
                let now = self.visible_value(id);
                if now == self.observed_builds[i].1 {
                    continue;
                }
                self.observed_builds[i].1 = now.clone();
                let Some(build) = now.as_str() else {
                    continue;
                };
                let version = major_minor(build);
                if visited.contains(&version) {
                    warn!(setting = %self.setting(id).key, %version, "version picker keeps moving the running version; stopping");
                    return;
                }
                moved |= self.switch_version(&version);
                visited.push(version);
            }
            if !moved {
                break;
            }
        }
    }

    // --- Custom properties --------------------------------------------------

    pub fn custom_properties(&self) -> &[CustomProperty] {
        &self.custom_properties
    }

    pub fn add_custom_property(&mut self, property: CustomProperty) {
        self.custom_properties.push(property);
    }

    pub fn remove_custom_property(&mut self, index: usize) -> Option<CustomProperty> {
        (index < self.custom_properties.len()).then(|| self.custom_properties.remove(index))
    }

    pub fn set_custom_property(&mut self, index: usize, property: CustomProperty) -> bool {
        match self.custom_properties.get_mut(index) {
            Some(slot) => {
                *slot = property;
                true
            }
            None => false,
        }
    }

    // --- Save ---------------------------------------------------------------

    /// `POST` call for the current document.
    pub fn save_request(&self) -> Result<SaveRequest, SettingsError> {
        let url = self.save_url.clone().ok_or(SettingsError::MissingSaveUrl)?;
        let body = serde_json::to_string(&self.serialize())?;
        Ok(SaveRequest { url, body })
    }

    /// True when the document differs from the last one marked saved.
    pub fn is_dirty(&self) -> bool {
        self.serialize() != self.last_saved
    }

    pub fn mark_saved(&mut self) {
        self.last_saved = self.serialize();
    }

    // --- Views --------------------------------------------------------------

    pub fn view(&self, id: SettingId) -> SettingView {
        let setting = self.setting(id);
        SettingView {
            kind: setting.key.kind.clone(),
            id: setting.key.id.clone(),
            name: setting.name.clone(),
            visible: self.visible(id),
            enabled: self.enabled(id),
            visible_value: self.visible_value(id),
            value_to_save: self.value_to_save(id),
            has_error: self.has_error(id),
            disabled_message: self.disabled_message(id),
        }
    }

    pub fn views(&self) -> Vec<SettingView> {
        self.ids().map(|id| self.view(id)).collect()
    }
}

impl ValueSource for SettingsForm {
    fn visible_value(&self, id: SettingId) -> Value {
        SettingsForm::visible_value(self, id)
    }

    fn parent_value(&self, name: &str) -> Option<Value> {
        self.registry.parent().get(name).cloned()
    }
}
