//! Load entity documents from disk into resolved models.

use crate::config::defaults::{DefaultsRegistry, MergeDefaults};
use crate::config::resolved::*;
use crate::config::types::*;
use crate::config::validate_entity;
use crate::error::LoadError;
use crate::sql::FieldValue;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read and decode one YAML file.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| LoadError::Parse {
        origin: path.display().to_string(),
        source,
    })
}

/// Load every `*.yaml` / `*.yml` entity in `dir`, in file-name order.
/// An entity that fails to load is logged and skipped; the others still load.
pub fn load_entities(
    dir: &Path,
    defaults: &DefaultsRegistry,
    form_codes_dir: &Path,
) -> Result<EntityRegistry, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut registry = EntityRegistry::default();
    for path in paths {
        let loaded = load_entity(&path, defaults, form_codes_dir).and_then(|model| {
            let name = model.name.clone();
            registry.insert(model).map(|_| name)
        });
        match loaded {
            Ok(name) => tracing::info!(entity = %name, path = %path.display(), "entity loaded"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping entity"),
        }
    }
    Ok(registry)
}

/// Load one entity document and attach its validation sidecar when present.
pub fn load_entity(
    path: &Path,
    defaults: &DefaultsRegistry,
    form_codes_dir: &Path,
) -> Result<EntityModel, LoadError> {
    let doc: EntityDocument = read_yaml(path)?;
    let mut model = resolve_entity(doc, defaults, &path.display().to_string())?;
    model.validation = load_validation_spec(form_codes_dir, &model.detail.route);
    Ok(model)
}

/// Parse an entity document held in memory. No validation sidecar is attached.
pub fn parse_entity(content: &str, defaults: &DefaultsRegistry) -> Result<EntityModel, LoadError> {
    let doc: EntityDocument = serde_yaml::from_str(content).map_err(|source| LoadError::Parse {
        origin: "entity document".into(),
        source,
    })?;
    resolve_entity(doc, defaults, "entity document")
}

/// `<dir>/<detail>_code.yaml`. Absence only disables validation for the entity.
pub fn load_validation_spec(dir: &Path, detail_route: &str) -> Option<ValidationSpec> {
    let path = dir.join(format!("{detail_route}_code.yaml"));
    if !path.exists() {
        tracing::info!(form = %detail_route, path = %path.display(), "no validation sidecar, validation skipped");
        return None;
    }
    match read_yaml::<FormCodeDocument>(&path) {
        Ok(doc) => Some(resolve_validation_spec(doc)),
        Err(e) => {
            tracing::warn!(form = %detail_route, error = %e, "validation sidecar unreadable, validation skipped");
            None
        }
    }
}

pub fn resolve_validation_spec(doc: FormCodeDocument) -> ValidationSpec {
    let mut prepopulate = BTreeMap::new();
    for (field, entry) in doc.prepopulate {
        match entry.kind.as_str() {
            "now" => {
                let format = if entry.format.is_empty() {
                    STORAGE_DATETIME_PATTERN.to_string()
                } else {
                    entry.format
                };
                prepopulate.insert(field, Prepopulate::Now { format });
            }
            other => tracing::warn!(field = %field, kind = %other, "unknown prepopulate type ignored"),
        }
    }
    let front = doc
        .front_validations
        .into_iter()
        .map(|(field, f)| {
            let rule = FrontRule {
                required: f.required,
                pattern: non_empty(f.pattern),
                title: non_empty(f.title),
            };
            (field, rule)
        })
        .collect();
    let rules = doc
        .back_validations
        .into_iter()
        .map(|(field, b)| {
            let rule = FieldRule {
                required: b.required,
                required_message: b.required_message,
                min_length: (b.min > 0).then_some(b.min),
                min_message: b.min_message,
                max_length: (b.max > 0).then_some(b.max),
                max_message: b.max_message,
            };
            (field, rule)
        })
        .collect();
    ValidationSpec {
        form: doc.form,
        prepopulate,
        front,
        rules,
    }
}

fn resolve_entity(
    doc: EntityDocument,
    defaults: &DefaultsRegistry,
    origin: &str,
) -> Result<EntityModel, LoadError> {
    let entity = doc.entity.name.clone();

    let mut fields = Vec::with_capacity(doc.fields.len());
    for f in doc.fields {
        let field_type = resolve_field_type(
            &entity,
            &f.name,
            f.type_name.as_deref(),
            f.combo_config,
            f.vision_config,
        )?;
        fields.push(FieldDescriptor {
            label: if f.label.is_empty() { f.name.clone() } else { f.label },
            name: f.name,
            field_type,
            read_only: f.readonly,
            required: f.required,
            default: f.default.as_ref().map(FieldValue::from_yaml),
            display_format: f.display_format.and_then(non_empty),
            max_length: f.max_length,
            number_format: number_format(f.decimals, f.decimal_separator, f.thousands_separator),
        });
    }

    let mut list: Option<(String, ListConfig)> = None;
    let mut detail: Option<(String, DetailConfig)> = None;
    let mut lookups = BTreeMap::new();
    for form in doc.forms {
        let form_origin = format!("{origin} form '{}'", form.name);
        match FormKind::parse(&form.kind) {
            Some(FormKind::List) => {
                if list.is_some() {
                    return Err(LoadError::schema(&entity, "more than one list form"));
                }
                let mut cfg: ListConfig = decode_form(&form, &form_origin)?;
                cfg.merge_defaults(defaults.list());
                list = Some((form.name, cfg));
            }
            Some(FormKind::Detail) => {
                if detail.is_some() {
                    return Err(LoadError::schema(&entity, "more than one detail form"));
                }
                let mut cfg: DetailConfig = decode_form(&form, &form_origin)?;
                cfg.merge_defaults(defaults.detail());
                detail = Some((form.name, cfg));
            }
            Some(FormKind::Lookup) => {
                let cfg: LookupFormConfig = decode_form(&form, &form_origin)?;
                let lookup = resolve_lookup_form(&entity, form.name.clone(), cfg)?;
                lookups.insert(form.name, lookup);
            }
            None => {
                tracing::warn!(entity = %entity, form = %form.name, kind = %form.kind, "unknown form type ignored");
            }
        }
    }

    let (list_route, list_cfg) =
        list.ok_or_else(|| LoadError::schema(&entity, "no list form declared"))?;
    let (detail_route, detail_cfg) =
        detail.ok_or_else(|| LoadError::schema(&entity, "no detail form declared"))?;

    let list = resolve_list_view(&entity, list_route, list_cfg, doc.entity.default_page_size, &fields)?;
    let detail = resolve_detail_form(&entity, detail_route, detail_cfg, &fields)?;

    let model = EntityModel::new(
        entity,
        doc.entity.table,
        doc.entity.label,
        doc.entity.label_plural,
        doc.entity
            .primary_key
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
        doc.entity.default_page_size,
        fields,
        list,
        detail,
        lookups,
    );
    validate_entity(&model)?;
    Ok(model)
}

fn decode_form<T: DeserializeOwned + Default>(form: &FormEntry, origin: &str) -> Result<T, LoadError> {
    if form.config.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(form.config.clone()).map_err(|source| LoadError::Parse {
        origin: origin.to_string(),
        source,
    })
}

/// Pick the lookup payload matching the declared type. A config present without a type implies the type.
fn resolve_field_type(
    entity: &str,
    field: &str,
    type_name: Option<&str>,
    combo: Option<ComboConfig>,
    popup: Option<PopupConfig>,
) -> Result<FieldType, LoadError> {
    let name = match type_name.map(|t| (t, FieldTypeName::parse(t))) {
        Some((_, Some(name))) => name,
        Some((raw, None)) => {
            tracing::warn!(entity = %entity, field = %field, field_type = %raw, "unknown field type, treated as string");
            FieldTypeName::String
        }
        None if combo.is_some() => FieldTypeName::LookupCombo,
        None if popup.is_some() => FieldTypeName::LookupPopup,
        None => FieldTypeName::String,
    };
    Ok(match name {
        FieldTypeName::String => FieldType::String,
        FieldTypeName::Integer => FieldType::Integer,
        FieldTypeName::Decimal => FieldType::Decimal,
        FieldTypeName::Boolean => FieldType::Boolean,
        FieldTypeName::Date => FieldType::Date,
        FieldTypeName::Datetime => FieldType::Datetime,
        FieldTypeName::LookupCombo => match combo {
            Some(cfg) if !cfg.sql.trim().is_empty() => FieldType::LookupCombo(cfg),
            _ => {
                return Err(LoadError::schema(
                    entity,
                    format!("field '{field}' is lookup-combo but has no comboConfig query"),
                ))
            }
        },
        FieldTypeName::LookupPopup => match popup {
            Some(cfg) if !cfg.sql.trim().is_empty() => FieldType::LookupPopup(cfg),
            _ => {
                return Err(LoadError::schema(
                    entity,
                    format!("field '{field}' is lookup-popup but has no visionConfig query"),
                ))
            }
        },
    })
}

fn resolve_list_view(
    entity: &str,
    route: String,
    cfg: ListConfig,
    entity_page_size: i64,
    fields: &[FieldDescriptor],
) -> Result<ListViewModel, LoadError> {
    let page_size = if cfg.page_size != 0 {
        cfg.page_size
    } else if entity_page_size != 0 {
        entity_page_size
    } else {
        FALLBACK_PAGE_SIZE
    };
    let default_sort_field = if cfg.default_sort_field.is_empty() {
        fields
            .first()
            .map(|f| f.name.clone())
            .ok_or_else(|| LoadError::schema(entity, "no fields declared"))?
    } else {
        cfg.default_sort_field
    };
    let default_sort_order = if cfg.default_sort_order.is_empty() {
        SortOrder::Asc
    } else {
        SortOrder::parse(&cfg.default_sort_order).ok_or_else(|| {
            LoadError::schema(
                entity,
                format!("invalid defaultSortOrder '{}'", cfg.default_sort_order),
            )
        })?
    };
    let columns = if cfg.columns.is_empty() {
        fields.iter().map(|f| f.name.clone()).collect()
    } else {
        cfg.columns
    };
    Ok(ListViewModel {
        route,
        title: cfg.title,
        page_size,
        default_sort_field,
        default_sort_order,
        page_size_options: cfg.page_size_options,
        columns,
        searchable_fields: cfg.searchable_fields,
        sortable_fields: cfg.sortable_fields,
        labels: cfg.labels,
        style: cfg.style,
    })
}

fn resolve_detail_form(
    entity: &str,
    route: String,
    cfg: DetailConfig,
    fields: &[FieldDescriptor],
) -> Result<DetailFormModel, LoadError> {
    let mut groups = Vec::with_capacity(cfg.groups.len());
    for group in cfg.groups {
        let mut refs = Vec::with_capacity(group.fields.len());
        for entry in group.fields {
            refs.push(resolve_field_ref(entity, entry, fields)?);
        }
        groups.push(FieldGroup {
            name: group.name,
            fields: refs,
        });
    }
    Ok(DetailFormModel {
        route,
        title: cfg.title,
        groups,
        titles: cfg.titles,
        button_labels: cfg.button_labels,
        style: cfg.style,
    })
}

/// Scalar types come from the entity field (the storage truth); lookups may be declared inline.
fn resolve_field_ref(
    entity: &str,
    entry: FieldRefEntry,
    fields: &[FieldDescriptor],
) -> Result<FieldRef, LoadError> {
    let spec = match entry {
        FieldRefEntry::Name(name) => {
            let descriptor = fields.iter().find(|f| f.name == name);
            return Ok(FieldRef {
                field_type: descriptor
                    .map(|d| d.field_type.clone())
                    .unwrap_or(FieldType::String),
                read_only: descriptor.map(|d| d.read_only).unwrap_or(false),
                max_length: descriptor.and_then(|d| d.max_length),
                name,
                vision_button: None,
                size: None,
                rows: None,
                align: None,
                number_format: None,
            });
        }
        FieldRefEntry::Spec(spec) => *spec,
    };
    let descriptor = fields.iter().find(|f| f.name == spec.name);

    // Inline lookup configuration may fall back to the entity field's own payload.
    let (combo, popup) = match descriptor.map(|d| &d.field_type) {
        Some(FieldType::LookupCombo(c)) => (spec.combo_config.or_else(|| Some(c.clone())), spec.vision_config),
        Some(FieldType::LookupPopup(p)) => (spec.combo_config, spec.vision_config.or_else(|| Some(p.clone()))),
        _ => (spec.combo_config, spec.vision_config),
    };
    let declared = resolve_field_type(entity, &spec.name, spec.type_name.as_deref(), combo, popup)?;
    let field_type = match descriptor {
        Some(d) if !declared.is_lookup() => d.field_type.clone(),
        _ => declared,
    };

    Ok(FieldRef {
        read_only: spec.readonly || descriptor.map(|d| d.read_only).unwrap_or(false),
        max_length: spec.max_length.or_else(|| descriptor.and_then(|d| d.max_length)),
        number_format: number_format(spec.decimals, spec.decimal_separator, spec.thousands_separator),
        name: spec.name,
        field_type,
        vision_button: spec.vision_button,
        size: spec.size,
        rows: spec.rows,
        align: spec.align,
    })
}

fn resolve_lookup_form(
    entity: &str,
    name: String,
    cfg: LookupFormConfig,
) -> Result<LookupFormModel, LoadError> {
    if cfg.sql.trim().is_empty() {
        return Err(LoadError::schema(entity, format!("lookup form '{name}' has no sql")));
    }
    let mut params = Vec::with_capacity(cfg.params.len());
    for p in cfg.params {
        let source = match p.source.trim().to_ascii_lowercase().as_str() {
            "context" => ParamSource::Context(
                p.context_field
                    .and_then(non_empty)
                    .unwrap_or_else(|| p.name.clone()),
            ),
            "literal" => {
                let value = p.value.as_ref().map(FieldValue::from_yaml).ok_or_else(|| {
                    LoadError::schema(
                        entity,
                        format!("lookup form '{name}' parameter '{}' has no literal value", p.name),
                    )
                })?;
                ParamSource::Literal(value.to_string())
            }
            other => {
                return Err(LoadError::schema(
                    entity,
                    format!("lookup form '{name}' parameter '{}' has unknown source '{other}'", p.name),
                ))
            }
        };
        params.push(LookupParam { name: p.name, source });
    }
    let default_sort_order = if cfg.default_sort_order.is_empty() {
        SortOrder::Asc
    } else {
        SortOrder::parse(&cfg.default_sort_order).ok_or_else(|| {
            LoadError::schema(
                entity,
                format!("lookup form '{name}' has invalid defaultSortOrder '{}'", cfg.default_sort_order),
            )
        })?
    };
    let default_sort_field = non_empty(cfg.default_sort_field).or_else(|| cfg.columns.first().cloned());
    Ok(LookupFormModel {
        sql: cfg.sql,
        params,
        actions: LookupActions {
            allow_create: cfg.actions.allow_create,
            allow_update: cfg.actions.allow_update,
            allow_delete: cfg.actions.allow_delete,
            allow_selectable: cfg.actions.allow_selectable.unwrap_or(true),
        },
        columns: cfg.columns,
        labels: cfg.labels,
        searchable_fields: cfg.searchable_fields,
        default_sort_field,
        default_sort_order,
        page_size: if cfg.page_size == 0 { FALLBACK_PAGE_SIZE } else { cfg.page_size },
        page_size_options: cfg.page_size_options,
        name,
    })
}

fn number_format(
    decimals: Option<u32>,
    decimal_separator: Option<String>,
    thousands_separator: Option<String>,
) -> Option<NumberFormat> {
    if decimals.is_none() && decimal_separator.is_none() && thousands_separator.is_none() {
        return None;
    }
    Some(NumberFormat {
        decimals: decimals.unwrap_or(0),
        decimal_separator: decimal_separator.unwrap_or_default(),
        thousands_separator: thousands_separator.unwrap_or_default(),
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PRODUCT: &str = r#"
entity:
  name: product
  table: products
  label: Product
  labelPlural: Products
  defaultPageSize: 20
fields:
  - { name: id, type: integer, readonly: true }
  - { name: code, label: Code }
  - { name: price, type: number }
  - { name: category_id, type: int }
  - { name: supplier_id, type: int }
  - { name: active, type: boolean }
forms:
  - name: products
    type: list
    config:
      columns: [id, code, price]
      searchableFields: [code]
  - name: product
    type: fiche
    config:
      groups:
        - name: General
          fields:
            - code
            - { name: price, decimals: 2, decimalSeparator: ",", thousandsSeparator: "." }
            - name: category_id
              type: combo_base
              comboConfig:
                sql: SELECT id, code, label FROM categories
                keyField: id
                displayFields: [code, label]
                separator: " - "
            - name: supplier_id
              type: lookup-popup
              visionConfig:
                sql: SELECT id, name FROM suppliers
                keyField: id
                displayFields: [name]
            - active
  - name: products_by_category
    type: vision
    config:
      sql: SELECT id, code FROM products WHERE category_id = :category
      params:
        - { name: category, source: context, contextField: category_id }
      columns: [id, code]
"#;

    #[test]
    fn resolves_forms_and_generic_defaults() {
        let model = parse_entity(PRODUCT, &DefaultsRegistry::default()).unwrap();
        assert_eq!(model.list.route, "products");
        assert_eq!(model.detail.route, "product");
        assert_eq!(model.list.page_size, 20);
        assert_eq!(model.list.default_sort_field, "id");
        assert_eq!(model.list.default_sort_order, SortOrder::Asc);
        assert_eq!(model.primary_key, "id");
        assert!(model.lookups.contains_key("products_by_category"));
    }

    #[test]
    fn bare_detail_field_inherits_entity_type() {
        let model = parse_entity(PRODUCT, &DefaultsRegistry::default()).unwrap();
        assert_eq!(model.detail_field("active").unwrap().field_type, FieldType::Boolean);
        assert_eq!(model.detail_field("code").unwrap().field_type, FieldType::String);
    }

    #[test]
    fn inline_lookup_overrides_entity_type() {
        let model = parse_entity(PRODUCT, &DefaultsRegistry::default()).unwrap();
        match &model.detail_field("category_id").unwrap().field_type {
            FieldType::LookupCombo(c) => {
                assert_eq!(c.key_field, "id");
                assert_eq!(c.separator, " - ");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            model.detail_field("supplier_id").unwrap().field_type,
            FieldType::LookupPopup(_)
        ));
        assert_eq!(model.field("category_id").unwrap().field_type, FieldType::Integer);
    }

    #[test]
    fn detail_number_format_indexed() {
        let model = parse_entity(PRODUCT, &DefaultsRegistry::default()).unwrap();
        let nf = model.number_format("price").unwrap();
        assert_eq!(nf.decimals, 2);
        assert_eq!(nf.decimal_separator, ",");
        assert!(model.number_format("code").is_none());
    }

    #[test]
    fn combo_without_query_is_schema_error() {
        let doc = PRODUCT.replace("sql: SELECT id, code, label FROM categories", "keyFieldx: id");
        let err = parse_entity(&doc, &DefaultsRegistry::default()).unwrap_err();
        assert!(matches!(err, LoadError::Schema { .. }), "{err}");
    }

    #[test]
    fn popup_without_config_is_schema_error() {
        let doc = r#"
entity: { name: t, table: t }
fields: [{ name: id, type: integer }]
forms:
  - { name: ts, type: list }
  - name: t
    type: detail
    config:
      groups: [{ name: Main, fields: [{ name: id, type: lookup-popup }] }]
"#;
        let err = parse_entity(doc, &DefaultsRegistry::default()).unwrap_err();
        assert!(err.to_string().contains("lookup-popup"), "{err}");
    }

    #[test]
    fn malformed_form_config_is_parse_error() {
        let doc = r#"
entity: { name: t, table: t }
fields: [{ name: id }]
forms:
  - { name: ts, type: list, config: { pageSize: "many" } }
  - { name: t, type: detail }
"#;
        let err = parse_entity(doc, &DefaultsRegistry::default()).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }), "{err}");
    }

    #[test]
    fn page_size_falls_back_to_ten() {
        let doc = r#"
entity: { name: t, table: t }
fields: [{ name: code }, { name: id }]
forms:
  - { name: ts, type: list }
  - { name: t, type: detail }
"#;
        let model = parse_entity(doc, &DefaultsRegistry::default()).unwrap();
        assert_eq!(model.list.page_size, FALLBACK_PAGE_SIZE);
        assert_eq!(model.list.default_sort_field, "code");
        assert_eq!(model.list.columns, vec!["code".to_string(), "id".to_string()]);
    }

    #[test]
    fn merge_runs_before_generic_fallbacks() {
        let defaults = DefaultsRegistry::new(
            serde_yaml::from_str("pageSize: 15\ndefaultSortOrder: desc").unwrap(),
            DetailConfig::default(),
        );
        let doc = r#"
entity: { name: t, table: t, defaultPageSize: 30 }
fields: [{ name: id }]
forms:
  - { name: ts, type: list }
  - { name: t, type: detail }
"#;
        let model = parse_entity(doc, &defaults).unwrap();
        assert_eq!(model.list.page_size, 15);
        assert_eq!(model.list.default_sort_order, SortOrder::Desc);
    }

    #[test]
    fn lookup_param_sources() {
        let model = parse_entity(PRODUCT, &DefaultsRegistry::default()).unwrap();
        let form = &model.lookups["products_by_category"];
        assert_eq!(
            form.params[0].source,
            ParamSource::Context("category_id".into())
        );
        assert!(form.actions.allow_selectable);
        assert_eq!(form.default_sort_field.as_deref(), Some("id"));
        assert_eq!(form.page_size, FALLBACK_PAGE_SIZE);
    }

    #[test]
    fn sidecar_rules_resolve() {
        let doc: FormCodeDocument = serde_yaml::from_str(
            r#"
form: category
prepopulate:
  created: { type: now, format: "%d/%m/%Y %H:%M" }
back_validations:
  name: { required: true, required_message: Name is required, min: 2, min_message: Too short }
"#,
        )
        .unwrap();
        let spec = resolve_validation_spec(doc);
        let rule = &spec.rules["name"];
        assert!(rule.required);
        assert_eq!(rule.min_length, Some(2));
        assert_eq!(rule.max_length, None);
        assert_eq!(
            spec.prepopulate["created"],
            Prepopulate::Now { format: "%d/%m/%Y %H:%M".into() }
        );
    }
}
