//! Resolved entity model: documents decoded, merged with defaults and indexed for runtime use.
//! Built once at startup and never mutated afterwards.

use crate::error::LoadError;
use crate::sql::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Page size used when neither the list form nor the entity sets one.
pub const FALLBACK_PAGE_SIZE: i64 = 10;
/// Fixed input pattern for `date` fields.
pub const DATE_PATTERN: &str = "%Y-%m-%d";
/// Pattern datetimes are written to the store in.
pub const STORAGE_DATETIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S";
/// Primary key column when the entity does not name one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Case-insensitive `asc` / `desc`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Parameterless query feeding an inline select.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboConfig {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub key_field: String,
    #[serde(default)]
    pub display_fields: Vec<String>,
    #[serde(default)]
    pub separator: String,
}

/// On-demand modal picker ("vision field").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupConfig {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub key_field: String,
    #[serde(default)]
    pub display_fields: Vec<String>,
    #[serde(default)]
    pub return_field: Option<String>,
    #[serde(default)]
    pub return_field_display: Option<String>,
    #[serde(default)]
    pub modal_title: Option<String>,
}

/// Semantic field type. Lookup variants carry their query configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "config", rename_all = "kebab-case")]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Datetime,
    LookupCombo(ComboConfig),
    LookupPopup(PopupConfig),
}

impl FieldType {
    pub fn is_lookup(&self) -> bool {
        matches!(self, FieldType::LookupCombo(_) | FieldType::LookupPopup(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::LookupCombo(_) => "lookup-combo",
            FieldType::LookupPopup(_) => "lookup-popup",
        }
    }

    /// Cast applied to a bound placeholder so text or untyped parameters land in typed columns.
    pub fn pg_cast(&self) -> Option<&'static str> {
        match self {
            FieldType::Integer => Some("bigint"),
            FieldType::Decimal => Some("numeric"),
            FieldType::Boolean => Some("boolean"),
            FieldType::Date => Some("date"),
            FieldType::Datetime => Some("timestamp"),
            FieldType::String | FieldType::LookupCombo(_) | FieldType::LookupPopup(_) => None,
        }
    }
}

/// Fixed decimals plus separators, applied at presentation time only.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NumberFormat {
    pub decimals: u32,
    pub decimal_separator: String,
    pub thousands_separator: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub read_only: bool,
    pub required: bool,
    pub default: Option<FieldValue>,
    /// chrono pattern used to display and parse datetimes.
    pub display_format: Option<String>,
    pub max_length: Option<u32>,
    pub number_format: Option<NumberFormat>,
}

/// A field placed on the detail form. `field_type` is already resolved against the entity field.
#[derive(Clone, Debug, Serialize)]
pub struct FieldRef {
    pub name: String,
    pub field_type: FieldType,
    pub read_only: bool,
    pub vision_button: Option<String>,
    pub max_length: Option<u32>,
    pub size: Option<u32>,
    pub rows: Option<u32>,
    pub align: Option<String>,
    pub number_format: Option<NumberFormat>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldGroup {
    pub name: String,
    pub fields: Vec<FieldRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ListViewModel {
    pub route: String,
    pub title: String,
    pub page_size: i64,
    pub default_sort_field: String,
    pub default_sort_order: SortOrder,
    pub page_size_options: Vec<i64>,
    pub columns: Vec<String>,
    pub searchable_fields: Vec<String>,
    pub sortable_fields: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DetailFormModel {
    pub route: String,
    pub title: String,
    pub groups: Vec<FieldGroup>,
    pub titles: BTreeMap<String, String>,
    pub button_labels: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

impl DetailFormModel {
    /// All fields of all groups, in layout order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.groups.iter().flat_map(|g| g.fields.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum ParamSource {
    /// Value taken from the request parameter of this name.
    Context(String),
    Literal(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LookupParam {
    pub name: String,
    pub source: ParamSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupActions {
    pub allow_create: bool,
    pub allow_update: bool,
    pub allow_delete: bool,
    pub allow_selectable: bool,
}

/// Standalone parameterized list ("vision form").
#[derive(Clone, Debug, Serialize)]
pub struct LookupFormModel {
    pub name: String,
    pub sql: String,
    pub params: Vec<LookupParam>,
    pub actions: LookupActions,
    pub columns: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub searchable_fields: Vec<String>,
    pub default_sort_field: Option<String>,
    pub default_sort_order: SortOrder,
    pub page_size: i64,
    pub page_size_options: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Prepopulate {
    /// Fill with the current local time, rendered with `format`.
    Now { format: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrontRule {
    pub required: bool,
    pub pattern: Option<String>,
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldRule {
    pub required: bool,
    pub required_message: String,
    pub min_length: Option<usize>,
    pub min_message: String,
    pub max_length: Option<usize>,
    pub max_message: String,
}

/// Contents of a detail form's validation sidecar.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationSpec {
    pub form: String,
    pub prepopulate: BTreeMap<String, Prepopulate>,
    pub front: BTreeMap<String, FrontRule>,
    pub rules: BTreeMap<String, FieldRule>,
}

#[derive(Clone, Debug)]
pub struct EntityModel {
    pub name: String,
    pub table: String,
    pub label: String,
    pub label_plural: String,
    pub primary_key: String,
    pub default_page_size: i64,
    pub fields: Vec<FieldDescriptor>,
    pub list: ListViewModel,
    pub detail: DetailFormModel,
    pub lookups: BTreeMap<String, LookupFormModel>,
    pub validation: Option<ValidationSpec>,
    fields_by_name: HashMap<String, usize>,
    detail_fields_by_name: HashMap<String, (usize, usize)>,
}

impl EntityModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        table: String,
        label: String,
        label_plural: String,
        primary_key: String,
        default_page_size: i64,
        fields: Vec<FieldDescriptor>,
        list: ListViewModel,
        detail: DetailFormModel,
        lookups: BTreeMap<String, LookupFormModel>,
    ) -> Self {
        let fields_by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let detail_fields_by_name = detail
            .groups
            .iter()
            .enumerate()
            .flat_map(|(g, group)| {
                group
                    .fields
                    .iter()
                    .enumerate()
                    .map(move |(i, f)| (f.name.clone(), (g, i)))
            })
            .collect();
        EntityModel {
            name,
            table,
            label,
            label_plural,
            primary_key,
            default_page_size,
            fields,
            list,
            detail,
            lookups,
            validation: None,
            fields_by_name,
            detail_fields_by_name,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields_by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn detail_field(&self, name: &str) -> Option<&FieldRef> {
        self.detail_fields_by_name
            .get(name)
            .map(|&(g, i)| &self.detail.groups[g].fields[i])
    }

    /// Display number format: the detail form's placement wins over the entity field.
    pub fn number_format(&self, name: &str) -> Option<&NumberFormat> {
        self.detail_field(name)
            .and_then(|f| f.number_format.as_ref())
            .or_else(|| self.field(name).and_then(|f| f.number_format.as_ref()))
            .filter(|nf| !nf.decimal_separator.is_empty())
    }

    pub fn is_sortable(&self, name: &str) -> bool {
        if self.list.sortable_fields.is_empty() {
            self.field(name).is_some()
        } else {
            self.list.sortable_fields.iter().any(|f| f == name)
        }
    }

    /// Type of the primary key column; fields that are not declared are treated as text.
    pub fn primary_key_type(&self) -> &FieldType {
        self.field(&self.primary_key)
            .map(|f| &f.field_type)
            .unwrap_or(&FieldType::String)
    }
}

/// Entity lookup by route, name and lookup-form name.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    entities: Vec<EntityModel>,
    by_name: HashMap<String, usize>,
    by_list_route: HashMap<String, usize>,
    by_detail_route: HashMap<String, usize>,
    by_lookup_form: HashMap<String, usize>,
}

impl EntityRegistry {
    /// Register an entity; rejected if any of its names or routes is already taken.
    pub fn insert(&mut self, model: EntityModel) -> Result<(), LoadError> {
        if self.by_name.contains_key(&model.name) {
            return Err(LoadError::schema(&model.name, "duplicate entity name"));
        }
        if self.by_list_route.contains_key(&model.list.route) {
            return Err(LoadError::schema(
                &model.name,
                format!("list route '{}' already registered", model.list.route),
            ));
        }
        if self.by_detail_route.contains_key(&model.detail.route) {
            return Err(LoadError::schema(
                &model.name,
                format!("detail route '{}' already registered", model.detail.route),
            ));
        }
        if let Some(name) = model.lookups.keys().find(|n| self.by_lookup_form.contains_key(*n)) {
            return Err(LoadError::schema(
                &model.name,
                format!("lookup form '{name}' already registered"),
            ));
        }
        let idx = self.entities.len();
        self.by_name.insert(model.name.clone(), idx);
        self.by_list_route.insert(model.list.route.clone(), idx);
        self.by_detail_route.insert(model.detail.route.clone(), idx);
        for name in model.lookups.keys() {
            self.by_lookup_form.insert(name.clone(), idx);
        }
        self.entities.push(model);
        Ok(())
    }

    pub fn entities(&self) -> &[EntityModel] {
        &self.entities
    }

    pub fn first(&self) -> Option<&EntityModel> {
        self.entities.first()
    }

    pub fn by_name(&self, name: &str) -> Option<&EntityModel> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn by_list_route(&self, route: &str) -> Option<&EntityModel> {
        self.by_list_route.get(route).map(|&i| &self.entities[i])
    }

    pub fn by_detail_route(&self, route: &str) -> Option<&EntityModel> {
        self.by_detail_route.get(route).map(|&i| &self.entities[i])
    }

    /// Entity owning the lookup form, with the form itself.
    pub fn lookup_form(&self, name: &str) -> Option<(&EntityModel, &LookupFormModel)> {
        let model = self.by_lookup_form.get(name).map(|&i| &self.entities[i])?;
        model.lookups.get(name).map(|form| (model, form))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
