//! Save document.
//!
//! The server expects `{<type>: {<id>: value}, custom_properties: {...}}`.
//! Every setting type gets a bucket even when nothing in it is saved; a
//! setting contributes only when its `valueToSave` is present. Custom
//! properties with an empty key or value are skipped.

use super::form::SettingsForm;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Bucket holding free-form custom properties.
pub(crate) const CUSTOM_PROPERTIES: &str = "custom_properties";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveDocument {
    #[serde(flatten)]
    pub buckets: BTreeMap<String, BTreeMap<String, Value>>,
    pub custom_properties: BTreeMap<String, String>,
}

impl SaveDocument {
    pub fn get(&self, kind: &str, id: &str) -> Option<&Value> {
        self.buckets.get(kind).and_then(|bucket| bucket.get(id))
    }
}

impl SettingsForm {
    /// Project the live values into the document the save endpoint expects.
    ///
    /// Blocking a save while some setting `has_error` is the caller's job.
    pub fn serialize(&self) -> SaveDocument {
        let mut doc = SaveDocument::default();
        for id in self.ids() {
            let key = &self.setting(id).key;
            if key.kind == CUSTOM_PROPERTIES {
                continue;
            }
            let bucket = doc.buckets.entry(key.kind.clone()).or_default();
            if let Some(value) = self.value_to_save(id) {
                bucket.insert(key.id.clone(), value);
            }
        }

        for property in &self.custom_properties {
            match (property.key.as_deref(), property.value.as_deref()) {
                (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
                    doc.custom_properties.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }
        doc
    }
}
