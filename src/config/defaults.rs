//! Shared default templates for list and detail forms, and the merge that applies them.
//!
//! Scalars and lists are replaced only when unset (zero value). Maps are merged key by key:
//! a key missing (or empty) in the specific config is taken from the defaults, other keys
//! are left alone.

use crate::config::loader::read_yaml;
use crate::config::{DetailConfig, ListConfig};
use std::collections::BTreeMap;
use std::path::Path;

/// Default templates, loaded once at startup and passed by reference into the loader.
#[derive(Clone, Debug, Default)]
pub struct DefaultsRegistry {
    list: ListConfig,
    detail: DetailConfig,
}

impl DefaultsRegistry {
    pub fn new(list: ListConfig, detail: DetailConfig) -> Self {
        DefaultsRegistry { list, detail }
    }

    /// Read `list.yaml` and `detail.yaml` from `dir`. A missing or broken file leaves that template empty.
    pub fn load(dir: &Path) -> Self {
        let list = read_yaml::<ListConfig>(&dir.join("list.yaml")).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "list defaults unavailable, using empty template");
            ListConfig::default()
        });
        let detail = read_yaml::<DetailConfig>(&dir.join("detail.yaml")).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "detail defaults unavailable, using empty template");
            DetailConfig::default()
        });
        DefaultsRegistry { list, detail }
    }

    pub fn list(&self) -> &ListConfig {
        &self.list
    }

    pub fn detail(&self) -> &DetailConfig {
        &self.detail
    }
}

/// Values that have a "not set" state in documents.
trait Unset {
    fn is_unset(&self) -> bool;
}

impl Unset for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl Unset for i64 {
    fn is_unset(&self) -> bool {
        *self == 0
    }
}

impl<T> Unset for Vec<T> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

fn fill<T: Unset + Clone>(target: &mut T, default: &T) {
    if target.is_unset() {
        *target = default.clone();
    }
}

fn fill_keys(target: &mut BTreeMap<String, String>, default: &BTreeMap<String, String>) {
    for (key, value) in default {
        let slot = target.entry(key.clone()).or_default();
        if slot.is_empty() {
            *slot = value.clone();
        }
    }
}

pub trait MergeDefaults {
    fn merge_defaults(&mut self, defaults: &Self);
}

impl MergeDefaults for ListConfig {
    fn merge_defaults(&mut self, defaults: &Self) {
        fill(&mut self.title, &defaults.title);
        fill(&mut self.page_size, &defaults.page_size);
        fill(&mut self.default_sort_field, &defaults.default_sort_field);
        fill(&mut self.default_sort_order, &defaults.default_sort_order);
        fill(&mut self.page_size_options, &defaults.page_size_options);
        fill(&mut self.columns, &defaults.columns);
        fill(&mut self.searchable_fields, &defaults.searchable_fields);
        fill(&mut self.sortable_fields, &defaults.sortable_fields);
        fill_keys(&mut self.labels, &defaults.labels);
        fill_keys(&mut self.style, &defaults.style);
    }
}

impl MergeDefaults for DetailConfig {
    fn merge_defaults(&mut self, defaults: &Self) {
        fill(&mut self.title, &defaults.title);
        fill(&mut self.groups, &defaults.groups);
        fill_keys(&mut self.titles, &defaults.titles);
        fill_keys(&mut self.button_labels, &defaults.button_labels);
        fill_keys(&mut self.style, &defaults.style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list(yaml: &str) -> ListConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn unset_scalars_take_default() {
        let defaults = list("pageSize: 25\ndefaultSortOrder: desc\npageSizeOptions: [10, 25, 50]\ntitle: Records");
        let mut specific = list("pageSize: 0\ntitle: Categories");
        specific.merge_defaults(&defaults);
        assert_eq!(specific.page_size, 25);
        assert_eq!(specific.default_sort_order, "desc");
        assert_eq!(specific.page_size_options, vec![10, 25, 50]);
        assert_eq!(specific.title, "Categories");
    }

    #[test]
    fn maps_merge_per_key() {
        let defaults = list("labels:\n  new: New\n  delete: Delete\nstyle:\n  width: 90%");
        let mut specific = list("labels:\n  new: Add category\n");
        specific.merge_defaults(&defaults);
        assert_eq!(specific.labels.get("new").map(String::as_str), Some("Add category"));
        assert_eq!(specific.labels.get("delete").map(String::as_str), Some("Delete"));
        assert_eq!(specific.style.get("width").map(String::as_str), Some("90%"));
    }

    #[test]
    fn detail_groups_replaced_only_when_empty() {
        let defaults: DetailConfig =
            serde_yaml::from_str("groups:\n  - name: Main\n    fields: [name]\nbuttonLabels:\n  save: Save").unwrap();
        let mut specific: DetailConfig =
            serde_yaml::from_str("groups:\n  - name: General\n    fields: [code, label]").unwrap();
        specific.merge_defaults(&defaults);
        assert_eq!(specific.groups.len(), 1);
        assert_eq!(specific.groups[0].name, "General");
        assert_eq!(specific.button_labels.get("save").map(String::as_str), Some("Save"));
    }
}
