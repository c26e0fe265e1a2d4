//! Raw document types matching the YAML files: entity schema, defaults templates, validation sidecars.

use crate::config::{ComboConfig, PopupConfig};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One entity document: identity, flat field list, named forms.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityDocument {
    pub entity: EntitySection,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    #[serde(default)]
    pub forms: Vec<FormEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySection {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub label_plural: String,
    #[serde(default)]
    pub default_page_size: i64,
    #[serde(default)]
    pub primary_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default, alias = "readOnly")]
    pub readonly: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub display_format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub decimal_separator: Option<String>,
    #[serde(default)]
    pub thousands_separator: Option<String>,
    #[serde(default)]
    pub combo_config: Option<ComboConfig>,
    #[serde(default)]
    pub vision_config: Option<PopupConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FormEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Decoded later, once `kind` tells which shape to expect.
    #[serde(default)]
    pub config: serde_yaml::Value,
}

/// Document field-type names before any lookup payload is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldTypeName {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Datetime,
    LookupCombo,
    LookupPopup,
}

impl FieldTypeName {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "" | "string" | "text" | "textarea" => FieldTypeName::String,
            "integer" | "int" | "uint" => FieldTypeName::Integer,
            "decimal" | "number" | "float" => FieldTypeName::Decimal,
            "boolean" | "bool" => FieldTypeName::Boolean,
            "date" => FieldTypeName::Date,
            "datetime" => FieldTypeName::Datetime,
            "lookup-combo" | "combo_base" | "combo" => FieldTypeName::LookupCombo,
            "lookup-popup" | "vision" => FieldTypeName::LookupPopup,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormKind {
    List,
    Detail,
    Lookup,
}

impl FormKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Some(FormKind::List),
            "detail" | "fiche" => Some(FormKind::Detail),
            "lookup" | "vision" => Some(FormKind::Lookup),
            _ => None,
        }
    }
}

/// List form config, also the shape of the shared list defaults document.
/// Zero values (0, "", empty list) mean "unset" and are filled from the defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListConfig {
    pub title: String,
    pub page_size: i64,
    pub default_sort_field: String,
    pub default_sort_order: String,
    pub page_size_options: Vec<i64>,
    pub columns: Vec<String>,
    pub searchable_fields: Vec<String>,
    pub sortable_fields: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

/// Detail form config, also the shape of the shared detail defaults document.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailConfig {
    pub title: String,
    pub groups: Vec<GroupEntry>,
    pub titles: BTreeMap<String, String>,
    pub button_labels: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GroupEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldRefEntry>,
}

/// A detail-form field: either a bare name or an inline object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum FieldRefEntry {
    Name(String),
    Spec(Box<FieldRefSpec>),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRefSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default, alias = "readOnly")]
    pub readonly: bool,
    #[serde(default)]
    pub combo_config: Option<ComboConfig>,
    #[serde(default)]
    pub vision_config: Option<PopupConfig>,
    #[serde(default)]
    pub vision_button: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub decimal_separator: Option<String>,
    #[serde(default)]
    pub thousands_separator: Option<String>,
    #[serde(default)]
    pub align: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupFormConfig {
    pub sql: String,
    pub params: Vec<LookupParamEntry>,
    pub actions: LookupActionsEntry,
    pub columns: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub searchable_fields: Vec<String>,
    pub default_sort_field: String,
    pub default_sort_order: String,
    pub page_size: i64,
    pub page_size_options: Vec<i64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupParamEntry {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub context_field: Option<String>,
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupActionsEntry {
    pub allow_create: bool,
    pub allow_update: bool,
    pub allow_delete: bool,
    pub allow_selectable: Option<bool>,
}

/// `<detail>_code.yaml`: prefill hints and validation rules for one detail form.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormCodeDocument {
    pub form: String,
    pub prepopulate: BTreeMap<String, PrepopulateEntry>,
    pub front_validations: BTreeMap<String, FrontValidationEntry>,
    pub back_validations: BTreeMap<String, BackValidationEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrepopulateEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FrontValidationEntry {
    pub required: bool,
    pub pattern: String,
    pub title: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackValidationEntry {
    pub required: bool,
    pub required_message: String,
    pub min: usize,
    pub min_message: String,
    pub max: usize,
    pub max_message: String,
}
