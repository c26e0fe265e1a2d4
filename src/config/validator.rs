//! Model validation: identifiers, routes and cross-references inside one entity.
//! Cross-entity collisions are checked by the registry on insert.

use crate::config::EntityModel;
use crate::error::LoadError;
use crate::sql::named_parameters;
use regex::Regex;
use std::collections::HashSet;

const IDENTIFIER: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
const TABLE: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";
const ROUTE: &str = r"^[A-Za-z0-9_-]+$";

/// Path segments owned by the router itself.
const RESERVED_ROUTES: &[&str] = &["vision", "health", "ready", "version"];

struct Patterns {
    identifier: Regex,
    table: Regex,
    route: Regex,
}

impl Patterns {
    fn compile(entity: &str) -> Result<Self, LoadError> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| LoadError::schema(entity, format!("invalid pattern {p}: {e}")))
        };
        Ok(Patterns {
            identifier: compile(IDENTIFIER)?,
            table: compile(TABLE)?,
            route: compile(ROUTE)?,
        })
    }
}

pub fn validate_entity(model: &EntityModel) -> Result<(), LoadError> {
    let entity = model.name.as_str();
    let re = Patterns::compile(entity)?;
    let fail = |message: String| Err(LoadError::schema(entity, message));

    if entity.trim().is_empty() {
        return Err(LoadError::schema("<unnamed>", "entity name is empty"));
    }
    if !re.table.is_match(&model.table) {
        return fail(format!("invalid table name '{}'", model.table));
    }
    if !re.identifier.is_match(&model.primary_key) {
        return fail(format!("invalid primary key '{}'", model.primary_key));
    }
    if model.fields.is_empty() {
        return fail("no fields declared".into());
    }

    let mut names = HashSet::new();
    for f in &model.fields {
        if !re.identifier.is_match(&f.name) {
            return fail(format!("invalid field name '{}'", f.name));
        }
        if !names.insert(f.name.as_str()) {
            return fail(format!("duplicate field '{}'", f.name));
        }
    }

    for route in [&model.list.route, &model.detail.route] {
        if !re.route.is_match(route) {
            return fail(format!("invalid route '{route}'"));
        }
        if RESERVED_ROUTES.contains(&route.as_str()) {
            return fail(format!("route '{route}' is reserved"));
        }
    }
    if model.list.route == model.detail.route {
        return fail(format!("list and detail share route '{}'", model.list.route));
    }

    let declared = |kind: &str, name: &str| {
        if names.contains(name) {
            Ok(())
        } else {
            Err(LoadError::schema(entity, format!("{kind} '{name}' is not a declared field")))
        }
    };
    for c in &model.list.columns {
        declared("list column", c)?;
    }
    for c in &model.list.searchable_fields {
        declared("searchable field", c)?;
    }
    for c in &model.list.sortable_fields {
        declared("sortable field", c)?;
    }
    declared("default sort field", &model.list.default_sort_field)?;

    for f in model.detail.fields() {
        if !re.identifier.is_match(&f.name) {
            return fail(format!("invalid detail field name '{}'", f.name));
        }
    }

    for (name, form) in &model.lookups {
        if !re.route.is_match(name) {
            return fail(format!("invalid lookup form name '{name}'"));
        }
        for c in form
            .columns
            .iter()
            .chain(&form.searchable_fields)
            .chain(form.default_sort_field.iter())
        {
            if !re.identifier.is_match(c) {
                return fail(format!("lookup form '{name}' has invalid column '{c}'"));
            }
        }
        let params: HashSet<&str> = form.params.iter().map(|p| p.name.as_str()).collect();
        for used in named_parameters(&form.sql) {
            if !params.contains(used.as_str()) {
                return fail(format!("lookup form '{name}' uses undeclared parameter '{used}'"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_entity, DefaultsRegistry};

    fn load(yaml: &str) -> Result<EntityModel, LoadError> {
        parse_entity(yaml, &DefaultsRegistry::default())
    }

    const BASE: &str = r#"
entity: { name: category, table: public.categories }
fields: [{ name: id, type: integer }, { name: name }]
forms:
  - { name: categories, type: list, config: { searchableFields: [name] } }
  - { name: category, type: detail }
"#;

    #[test]
    fn accepts_schema_qualified_table() {
        assert!(load(BASE).is_ok());
    }

    #[test]
    fn rejects_unknown_list_reference() {
        let doc = BASE.replace("searchableFields: [name]", "searchableFields: [title]");
        let err = load(&doc).unwrap_err();
        assert!(err.to_string().contains("'title'"), "{err}");
    }

    #[test]
    fn rejects_bad_identifiers() {
        let doc = BASE.replace("name: name }", "name: \"na me\" }");
        assert!(load(&doc).is_err());
        let doc = BASE.replace("public.categories", "categories; drop table x");
        assert!(load(&doc).is_err());
    }

    #[test]
    fn rejects_duplicate_field() {
        let doc = BASE.replace("{ name: name }", "{ name: id }");
        let err = load(&doc).unwrap_err();
        assert!(err.to_string().contains("duplicate field"), "{err}");
    }

    #[test]
    fn rejects_reserved_route() {
        let doc = BASE.replace("name: categories, type: list", "name: vision, type: list");
        assert!(load(&doc).is_err());
    }

    #[test]
    fn rejects_undeclared_lookup_parameter() {
        let doc = format!(
            "{BASE}  - name: by_parent\n    type: lookup\n    config:\n      sql: SELECT id FROM categories WHERE parent = :parent\n      columns: [id]\n"
        );
        let err = load(&doc).unwrap_err();
        assert!(err.to_string().contains("undeclared parameter 'parent'"), "{err}");
    }
}
