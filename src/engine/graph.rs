//! Derived reads.
//!
//! Every attribute here is a pure function of the form's raw values, its
//! effective defaults, the running version and the viewer's flags. The three
//! attributes other settings read through conditions (`enabled`,
//! `computeDefault`, `visibleValue`) are memoised per setting:
//!
//! ```text
//! read(S, attr) ──▶ memo[S].revision == form.revision ? ──yes──▶ cached
//!                                  │ no
//!                                  ▼
//!                 reset memo[S], compute (may read other settings), store
//! ```
//!
//! A write bumps `form.revision`, which invalidates every memo at once. That
//! is coarse, but a settings page holds at most a few hundred settings.
//!
//! Re-entrant evaluation (a setting whose `requires` or contingent default
//! reaches back to itself) is cut short: the inner read falls back to the
//! static default, or `false` for `enabled`.

use super::form::{Derived, Memo, SettingsForm};
use super::version::FLOOR_VERSION;
use crate::widgets::{SelectOption, Widget};
use crate::{SettingId, option_key, truthy};
use serde_json::Value;
use tracing::{debug, warn};

bitflags::bitflags! {
    /// Reasons a setting is hidden. Empty means visible.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HiddenBy: u8 {
        /// Legacy (`disabled`) setting still at its default.
        const DISABLED_AT_DEFAULT = 1 << 0;
        /// `hide_if_not_enabled` and not enabled.
        const NOT_ENABLED         = 1 << 1;
        /// Preview setting, viewer is not a previewer.
        const PREVIEW             = 1 << 2;
        /// Viewer lacks the required permission.
        const PERMISSION          = 1 << 3;
    }
}

/// Minimum versions for the selected option and for the setting itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredVersion {
    pub option: String,
    pub setting: String,
}

impl SettingsForm {
    fn memoized<T: Clone>(
        &self,
        id: SettingId,
        which: Derived,
        read: fn(&Memo) -> Option<T>,
        write: fn(&mut Memo, T),
        compute: impl FnOnce() -> T,
        fallback: impl FnOnce() -> T,
    ) -> T {
        let revision = self.revision;
        {
            let mut memo = self.memo.borrow_mut();
            let slot = &mut memo[id.0];
            if slot.revision != revision {
                *slot = Memo { revision, ..Memo::default() };
            }
            if let Some(value) = read(slot) {
                self.counters.hit();
                return value;
            }
        }

        if !self.in_flight.borrow_mut().insert((id, which)) {
            warn!(setting = %self.setting(id).key, ?which, "evaluation cycle; using fallback");
            self.counters.cycle();
            return fallback();
        }
        self.counters.miss();
        debug!(setting = %self.setting(id).key, ?which, "memo miss");

        let value = compute();

        self.in_flight.borrow_mut().remove(&(id, which));
        write(&mut self.memo.borrow_mut()[id.0], value.clone());
        value
    }

    // --- Version gating -----------------------------------------------------

    pub fn required_version(&self, id: SettingId) -> RequiredVersion {
        let since = &self.setting(id).since;
        let non_empty = |key: &str| since.get(key).filter(|v| !v.is_empty()).cloned();

        let setting = non_empty("").unwrap_or_else(|| FLOOR_VERSION.to_string());
        let option = self
            .value(id)
            .and_then(option_key)
            .and_then(|key| non_empty(&key))
            .unwrap_or_else(|| setting.clone());
        RequiredVersion { option, setting }
    }

    /// Running version meets the setting's own minimum.
    pub fn version_ok(&self, id: SettingId) -> bool {
        self.version.check(&self.required_version(id).setting)
    }

    /// Running version meets the minimum of the currently selected option.
    pub fn option_ok(&self, id: SettingId) -> bool {
        self.version.check(&self.required_version(id).option)
    }

    // --- Enablement ---------------------------------------------------------

    pub fn enabled(&self, id: SettingId) -> bool {
        self.memoized(
            id,
            Derived::Enabled,
            |m| m.enabled,
            |m, v| m.enabled = Some(v),
            || self.version_ok(id) && self.requires[id.0].check(self),
            || false,
        )
    }

    /// Why a setting (or its selected option) is unavailable; empty when it
    /// is available.
    pub fn disabled_message(&self, id: SettingId) -> String {
        let option_ok = self.option_ok(id);
        if self.enabled(id) && option_ok {
            return String::new();
        }
        if !option_ok {
            let version = self.required_version(id).option;
            return if self.version_ok(id) {
                format!("Upgrade to CommCare {version} for this option!")
            } else {
                format!("Upgrade to CommCare {version}!")
            };
        }

        let mut names: Vec<&str> = Vec::new();
        for source in self.requires[id.0].settings() {
            let name = self.setting(source).name.as_str();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        format!("Auto-set by {}", names.join(", "))
    }

    pub fn inheritance_message(&self, id: SettingId) -> &'static str {
        if self.setting(id).is_inherited {
            "This value is currently inherited from the master app. \
             Once this page is saved, it will no longer be inherited."
        } else {
            ""
        }
    }

    // --- Values -------------------------------------------------------------

    /// First contingent default whose condition holds; else the disabled
    /// default when the version is too old; else the static default.
    pub fn compute_default(&self, id: SettingId) -> Value {
        self.memoized(
            id,
            Derived::Default,
            |m| m.default.clone(),
            |m, v| m.default = Some(v),
            || {
                for (condition, value) in &self.contingent[id.0] {
                    if condition.check(self) {
                        return value.clone();
                    }
                }
                if !self.version_ok(id) {
                    if let Some(disabled) = &self.setting(id).disabled_default {
                        return disabled.clone();
                    }
                }
                self.defaults[id.0].clone()
            },
            || self.defaults[id.0].clone(),
        )
    }

    /// Effective value shown to the user: the raw value when enabled and
    /// truthy, else the computed default.
    pub fn visible_value(&self, id: SettingId) -> Value {
        self.memoized(
            id,
            Derived::Visible,
            |m| m.visible.clone(),
            |m, v| m.visible = Some(v),
            || match self.value(id) {
                Some(raw) if truthy(raw) && self.enabled(id) => raw.clone(),
                _ => self.compute_default(id),
            },
            || self.defaults[id.0].clone(),
        )
    }

    /// The value written on save; `None` when the setting is disabled.
    pub fn value_to_save(&self, id: SettingId) -> Option<Value> {
        if !self.enabled(id) {
            return None;
        }
        let default = self.compute_default(id);
        let raw = self.value(id);
        if truthy(&default) {
            Some(raw.filter(|v| truthy(v)).cloned().unwrap_or(default))
        } else {
            raw.cloned()
        }
    }

    // --- Visibility and errors ----------------------------------------------

    pub fn hidden_by(&self, id: SettingId) -> HiddenBy {
        let setting = self.setting(id);
        let mut hidden = HiddenBy::empty();
        if setting.disabled && self.visible_value(id) == self.defaults[id.0] {
            hidden |= HiddenBy::DISABLED_AT_DEFAULT;
        }
        if setting.hide_if_not_enabled && !self.enabled(id) {
            hidden |= HiddenBy::NOT_ENABLED;
        }
        if setting.preview && !self.is_previewer {
            hidden |= HiddenBy::PREVIEW;
        }
        if let Some(permission) = &setting.permission {
            if !self.has_permission(permission) {
                hidden |= HiddenBy::PERMISSION;
            }
        }
        hidden
    }

    pub fn visible(&self, id: SettingId) -> bool {
        self.hidden_by(id).is_empty()
    }

    /// Gated behind a permission the viewer lacks, with an upgrade plan to
    /// advertise.
    pub fn show_upgrade_text(&self, id: SettingId) -> bool {
        let setting = self.setting(id);
        setting.upgrade_plan && setting.permission.as_deref().is_some_and(|p| !self.has_permission(p))
    }

    /// A legacy setting that still carries a non-default value.
    pub fn disabled_but_has_value(&self, id: SettingId) -> bool {
        self.setting(id).disabled && self.visible_value(id) != self.defaults[id.0]
    }

    pub fn value_is_legal(&self, id: SettingId) -> bool {
        self.widget(id).is_none_or(|w| w.value_is_legal(self.value(id)))
    }

    pub fn has_error(&self, id: SettingId) -> bool {
        self.disabled_but_has_value(id) || !self.value_is_legal(id)
    }

    // --- Widget reads -------------------------------------------------------

    /// Dropdown entry matching the visible value.
    pub fn selected_option(&self, id: SettingId) -> Option<SelectOption> {
        let visible = self.visible_value(id);
        match self.widget(id)? {
            Widget::Select(s) | Widget::TextInput(s) => s.selected(&visible).cloned(),
            Widget::BuildSpec(b) => b.select.selected(&visible).cloned(),
            _ => None,
        }
    }

    pub fn selected_options(&self, id: SettingId) -> Vec<SelectOption> {
        let visible = self.visible_value(id);
        match self.widget(id) {
            Some(Widget::MultiSelect(s)) => s.selected_many(&visible).into_iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Checkbox state of a `bool` widget.
    pub fn bool_value(&self, id: SettingId) -> Option<bool> {
        match self.widget(id)? {
            Widget::Bool(w) => Some(w.is_on(&self.visible_value(id))),
            _ => None,
        }
    }

    pub fn show_disabled_checkbox(&self, id: SettingId) -> bool {
        self.show_upgrade_text(id) && self.bool_value(id) == Some(false)
    }

    pub fn show_uncheck_warning(&self, id: SettingId) -> bool {
        self.show_upgrade_text(id) && self.bool_value(id) == Some(true)
    }
}
