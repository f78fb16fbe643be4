//! Section roll-ups: a section is shown when any member is, and never
//! auto-collapses while a member is in error.

use super::form::SettingsForm;
use super::registry::Section;

impl SettingsForm {
    /// Any member visible.
    pub fn section_not_empty(&self, section: &Section) -> bool {
        section.settings.iter().any(|id| self.visible(*id))
    }

    /// Any member in error.
    pub fn section_has_error(&self, section: &Section) -> bool {
        section.settings.iter().any(|id| self.has_error(*id))
    }

    /// Collapse was requested and no member is in error.
    pub fn section_really_collapse(&self, section: &Section) -> bool {
        section.collapse && !self.section_has_error(section)
    }

    pub fn section_is_visible(&self, section: &Section) -> bool {
        section.always_show != Some(false)
    }
}
