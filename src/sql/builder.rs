//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from an entity model.
//! Identifiers come from the loaded model only; request values are always parameters.

use crate::config::{EntityModel, FieldType, LookupFormModel, SortOrder};
use crate::sql::{FieldValue, Row};
use serde::Deserialize;

/// Alias of the subquery wrapping lookup SQL.
const LOOKUP_ALIAS: &str = "lookup";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `schema.table` or `table`, each part quoted.
fn qualified_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: FieldValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast when the column type asks for it.
    fn placeholder(&mut self, v: FieldValue, field_type: Option<&FieldType>) -> String {
        let n = self.push_param(v);
        match field_type.and_then(FieldType::pg_cast) {
            Some(cast) => format!("${}::{}", n, cast),
            None => format!("${}", n),
        }
    }
}

/// Raw list query-string values. Every member is optional text so malformed input never rejects the request.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListParams {
    pub page: Option<String>,
    #[serde(rename = "pageSize", alias = "page_size")]
    pub page_size: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
    pub highlight: Option<String>,
}

/// Effective list state after defaults and the sort whitelist are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ListRequest {
    pub page: i64,
    pub page_size: i64,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub search: Option<String>,
    pub highlight: Option<String>,
}

impl ListRequest {
    pub fn for_entity(model: &EntityModel, params: &ListParams) -> Self {
        let sort_field = params
            .sort
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && model.is_sortable(s))
            .unwrap_or(&model.list.default_sort_field)
            .to_string();
        Self::build(params, model.list.page_size, Some(sort_field), model.list.default_sort_order)
    }

    /// Lookup forms sort only by their declared columns.
    pub fn for_lookup(form: &LookupFormModel, params: &ListParams) -> Self {
        let sort_field = params
            .sort
            .as_deref()
            .map(str::trim)
            .filter(|s| form.columns.iter().any(|c| c == s))
            .map(str::to_string)
            .or_else(|| form.default_sort_field.clone());
        Self::build(params, form.page_size, sort_field, form.default_sort_order)
    }

    fn build(params: &ListParams, default_page_size: i64, sort_field: Option<String>, default_order: SortOrder) -> Self {
        let page = parse_i64(&params.page).filter(|p| *p >= 1).unwrap_or(1);
        let page_size = parse_i64(&params.page_size)
            .filter(|p| *p > 0)
            .unwrap_or(default_page_size);
        let sort_order = params
            .order
            .as_deref()
            .and_then(SortOrder::parse)
            .unwrap_or(default_order);
        ListRequest {
            page,
            page_size,
            sort_field,
            sort_order,
            search: params
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            highlight: params
                .highlight
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    /// No paging at all when the page size is not positive.
    fn limit_clause(&self) -> String {
        if self.page_size <= 0 {
            return String::new();
        }
        let offset = (self.page - 1).saturating_mul(self.page_size);
        format!(" LIMIT {} OFFSET {}", self.page_size, offset)
    }
}

fn parse_i64(v: &Option<String>) -> Option<i64> {
    v.as_deref().and_then(|s| s.trim().parse().ok())
}

/// `ceil(total / page_size)`, or 0 when the page size is not positive.
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    (total.max(0) + page_size - 1) / page_size
}

/// Page holding the row at 1-based `position`; page 1 when unpaged or the position is unknown.
pub fn highlight_page(position: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 1;
    }
    total_pages(position, page_size).max(1)
}

/// Row query and count query sharing one WHERE clause and parameter list.
#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    pub rows: QueryBuf,
    pub count: QueryBuf,
}

/// SELECT expression for one entity column; decimals come back as double precision.
fn select_expr(model: &EntityModel, name: &str) -> String {
    let q = quoted(name);
    match model.field(name).map(|f| &f.field_type) {
        Some(FieldType::Decimal) => format!("CAST({q} AS DOUBLE PRECISION) AS {q}"),
        _ => q,
    }
}

/// Primary key first, then `names` in order, without duplicates.
fn select_list<'a>(model: &EntityModel, names: impl Iterator<Item = &'a String>) -> String {
    let mut seen = vec![model.primary_key.as_str()];
    for n in names {
        if !seen.contains(&n.as_str()) {
            seen.push(n.as_str());
        }
    }
    seen.iter()
        .map(|n| select_expr(model, n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// ` WHERE (CAST(a AS TEXT) LIKE $n OR ...)` with a single `%term%` parameter, or nothing.
fn search_clause(q: &mut QueryBuf, fields: &[String], term: Option<&str>) -> String {
    let Some(term) = term else { return String::new() };
    if fields.is_empty() {
        return String::new();
    }
    let n = q.push_param(FieldValue::String(format!("%{term}%")));
    let parts: Vec<String> = fields
        .iter()
        .map(|f| format!("CAST({} AS TEXT) LIKE ${}", quoted(f), n))
        .collect();
    format!(" WHERE ({})", parts.join(" OR "))
}

fn order_clause(field: Option<&str>, order: SortOrder, tie_break: Option<&str>) -> String {
    let Some(field) = field else { return String::new() };
    let mut clause = format!(" ORDER BY {} {}", quoted(field), order.as_sql());
    if let Some(pk) = tie_break.filter(|pk| *pk != field) {
        clause.push_str(&format!(", {} {}", quoted(pk), order.as_sql()));
    }
    clause
}

/// Page of list rows plus the matching total count.
pub fn list_query(model: &EntityModel, req: &ListRequest) -> ListQuery {
    let table = qualified_table(&model.table);
    let mut base = QueryBuf::new();
    let where_clause = search_clause(&mut base, &model.list.searchable_fields, req.search.as_deref());

    let mut rows = base.clone();
    rows.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_list(model, model.list.columns.iter()),
        table,
        where_clause,
        order_clause(req.sort_field.as_deref(), req.sort_order, Some(&model.primary_key)),
        req.limit_clause()
    );
    let mut count = base;
    count.sql = format!("SELECT COUNT(*) AS total FROM {}{}", table, where_clause);
    ListQuery { rows, count }
}

/// Primary key value as bound: integer keys are parsed, anything else is text.
pub fn pk_value(model: &EntityModel, id: &str) -> Option<FieldValue> {
    match model.primary_key_type() {
        FieldType::Integer => id.trim().parse().ok().map(FieldValue::I64),
        _ => Some(FieldValue::String(id.to_string())),
    }
}

fn pk_predicate(model: &EntityModel, q: &mut QueryBuf, op: &str, id: FieldValue) -> String {
    let n = q.push_param(id);
    match model.primary_key_type() {
        FieldType::Integer => format!("{} {} ${}", quoted(&model.primary_key), op, n),
        _ => format!("CAST({} AS TEXT) {} ${}", quoted(&model.primary_key), op, n),
    }
}

/// SELECT every declared field of one row.
pub fn select_by_id(model: &EntityModel, id: FieldValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = select_list(model, model.fields.iter().map(|f| &f.name));
    let pred = pk_predicate(model, &mut q, "=", id);
    q.sql = format!("SELECT {} FROM {} WHERE {}", cols, qualified_table(&model.table), pred);
    q
}

/// INSERT the bound row, returning the new primary key.
pub fn insert(model: &EntityModel, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&model.table);
    let pk = quoted(&model.primary_key);
    if row.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, pk);
        return q;
    }
    let mut cols = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    for (name, value) in row {
        let ph = q.placeholder(value.clone(), model.field(name).map(|f| &f.field_type));
        cols.push(quoted(name));
        placeholders.push(ph);
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        pk
    );
    q
}

/// UPDATE the bound columns of one row. Callers skip the statement for an empty row.
pub fn update(model: &EntityModel, id: FieldValue, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(row.len());
    for (name, value) in row {
        let ph = q.placeholder(value.clone(), model.field(name).map(|f| &f.field_type));
        sets.push(format!("{} = {}", quoted(name), ph));
    }
    let pred = pk_predicate(model, &mut q, "=", id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_table(&model.table),
        sets.join(", "),
        pred
    );
    q
}

pub fn delete(model: &EntityModel, id: FieldValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pred = pk_predicate(model, &mut q, "=", id);
    q.sql = format!("DELETE FROM {} WHERE {}", qualified_table(&model.table), pred);
    q
}

/// Rows whose key sorts at or before `id`: the 1-based position used to find a new row's page.
pub fn count_up_to(model: &EntityModel, id: FieldValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pred = pk_predicate(model, &mut q, "<=", id);
    q.sql = format!("SELECT COUNT(*) AS total FROM {} WHERE {}", qualified_table(&model.table), pred);
    q
}

/// Parameterless schema SQL (combo and popup queries), one JSON object per row.
pub fn raw(sql: &str) -> QueryBuf {
    raw_search(sql, &[], None)
}

/// Parameterless schema SQL with an optional search over `fields` of its result.
pub fn raw_search(sql: &str, fields: &[String], term: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = search_clause(&mut q, fields, term);
    q.sql = format!(
        "SELECT row_to_json({a}) AS \"row\" FROM ({}) AS {a}{}",
        trim_statement(sql),
        where_clause,
        a = LOOKUP_ALIAS
    );
    q
}

fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Walk `sql`, handing each `:name` / `@name` parameter to `on_param` and splicing in what it returns.
/// Quoted text and `::` casts are left alone.
fn scan_named<E>(sql: &str, mut on_param: impl FnMut(&str) -> Result<String, E>) -> Result<String, E> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                    if chars[i - 1] == c {
                        break;
                    }
                }
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' | '@' if chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(&on_param(&name)?);
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Named parameters referenced by `sql`, in order of first use.
pub fn named_parameters(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let _ = scan_named::<()>(sql, |name| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(String::new())
    });
    names
}

/// Rewrite named parameters to positional ones, binding each through `resolve`.
/// A name used twice binds once. Fails with the first name `resolve` cannot supply.
pub fn bind_named(sql: &str, resolve: impl Fn(&str) -> Option<FieldValue>) -> Result<QueryBuf, String> {
    let mut q = QueryBuf::new();
    let mut positions: Vec<(String, u32)> = Vec::new();
    let rewritten = scan_named::<String>(sql, |name| {
        if let Some((_, n)) = positions.iter().find(|(p, _)| p == name) {
            return Ok(format!("${n}"));
        }
        let value = resolve(name).ok_or_else(|| name.to_string())?;
        let n = q.push_param(value);
        positions.push((name.to_string(), n));
        Ok(format!("${n}"))
    })?;
    q.sql = rewritten;
    Ok(q)
}

/// Page of a lookup form's bound query plus its count; search and sort apply over the wrapped result.
pub fn lookup_list_query(form: &LookupFormModel, bound: QueryBuf, req: &ListRequest) -> ListQuery {
    let inner = format!("({}) AS {}", trim_statement(&bound.sql), LOOKUP_ALIAS);
    let mut base = QueryBuf {
        sql: String::new(),
        params: bound.params,
    };
    let where_clause = search_clause(&mut base, &form.searchable_fields, req.search.as_deref());

    let mut rows = base.clone();
    rows.sql = format!(
        "SELECT row_to_json({a}) AS \"row\" FROM {}{}{}{}",
        inner,
        where_clause,
        order_clause(req.sort_field.as_deref(), req.sort_order, None),
        req.limit_clause(),
        a = LOOKUP_ALIAS
    );
    let mut count = base;
    count.sql = format!("SELECT COUNT(*) AS total FROM {}{}", inner, where_clause);
    ListQuery { rows, count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_entity, DefaultsRegistry};
    use pretty_assertions::assert_eq;

    const CATEGORY: &str = r#"
entity: { name: category, table: shop.categories, defaultPageSize: 2 }
fields:
  - { name: id, type: integer, readonly: true }
  - { name: name, required: true }
  - { name: rate, type: decimal }
  - { name: created, type: datetime, displayFormat: "%d/%m/%Y %H:%M" }
forms:
  - name: categories
    type: list
    config:
      columns: [name, rate]
      searchableFields: [name, rate]
      sortableFields: [id, name]
  - { name: category, type: detail }
  - name: by_parent
    type: lookup
    config:
      sql: "SELECT id, name FROM categories WHERE parent_id = :parent AND kind = @kind AND name <> ':x'::text;"
      params:
        - { name: parent, source: context }
        - { name: kind, source: literal, value: main }
      columns: [id, name]
      searchableFields: [name]
"#;

    fn model() -> EntityModel {
        parse_entity(CATEGORY, &DefaultsRegistry::default()).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut p = ListParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "page" => p.page = v,
                "pageSize" => p.page_size = v,
                "sort" => p.sort = v,
                "order" => p.order = v,
                "search" => p.search = v,
                "highlight" => p.highlight = v,
                _ => unreachable!(),
            }
        }
        p
    }

    #[test]
    fn new_row_lands_on_page_of_its_position() {
        assert_eq!(highlight_page(5, 2), 3);
        assert_eq!(highlight_page(4, 2), 2);
        assert_eq!(highlight_page(1, 10), 1);
        assert_eq!(highlight_page(0, 2), 1);
        assert_eq!(highlight_page(5, 0), 1);
        assert_eq!(highlight_page(5, -1), 1);
    }

    #[test]
    fn total_pages_ceiling_and_non_positive() {
        assert_eq!(total_pages(5, 2), 3);
        assert_eq!(total_pages(4, 2), 2);
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(5, 0), 0);
        assert_eq!(total_pages(5, -3), 0);
        for n in 0..50 {
            for p in 1..8 {
                let expected = (n as f64 / p as f64).ceil() as i64;
                assert_eq!(total_pages(n, p), expected);
            }
        }
    }

    #[test]
    fn third_page_of_two() {
        let m = model();
        let req = ListRequest::for_entity(&m, &params(&[("page", "3")]));
        let q = list_query(&m, &req);
        assert_eq!(
            q.rows.sql,
            r#"SELECT "id", "name", CAST("rate" AS DOUBLE PRECISION) AS "rate" FROM "shop"."categories" ORDER BY "id" ASC LIMIT 2 OFFSET 4"#
        );
        assert_eq!(q.count.sql, r#"SELECT COUNT(*) AS total FROM "shop"."categories""#);
        assert!(q.rows.params.is_empty());
    }

    #[test]
    fn search_predicate_shared_by_rows_and_count() {
        let m = model();
        let req = ListRequest::for_entity(&m, &params(&[("search", " ab ")]));
        let q = list_query(&m, &req);
        let predicate = r#" WHERE (CAST("name" AS TEXT) LIKE $1 OR CAST("rate" AS TEXT) LIKE $1)"#;
        assert!(q.rows.sql.contains(predicate), "{}", q.rows.sql);
        assert!(q.count.sql.ends_with(predicate), "{}", q.count.sql);
        assert_eq!(q.rows.params, vec![FieldValue::String("%ab%".into())]);
        assert_eq!(q.rows.params, q.count.params);
    }

    #[test]
    fn sort_outside_whitelist_uses_default() {
        let m = model();
        let req = ListRequest::for_entity(&m, &params(&[("sort", "rate\"; drop"), ("order", "sideways")]));
        assert_eq!(req.sort_field.as_deref(), Some("id"));
        assert_eq!(req.sort_order, SortOrder::Asc);
        let req = ListRequest::for_entity(&m, &params(&[("sort", "name"), ("order", "DESC")]));
        assert_eq!(req.sort_field.as_deref(), Some("name"));
        assert_eq!(req.sort_order, SortOrder::Desc);
        let q = list_query(&m, &req);
        assert!(q.rows.sql.contains(r#"ORDER BY "name" DESC, "id" DESC"#));
    }

    #[test]
    fn page_and_size_fallbacks() {
        let m = model();
        let req = ListRequest::for_entity(&m, &params(&[("page", "-4"), ("pageSize", "zero")]));
        assert_eq!((req.page, req.page_size), (1, 2));
        let req = ListRequest::for_entity(&m, &params(&[("page", "2"), ("pageSize", "0")]));
        assert_eq!((req.page, req.page_size), (2, 2));
        let req = ListRequest::for_entity(&m, &params(&[("pageSize", "25")]));
        assert_eq!(req.page_size, 25);
    }

    #[test]
    fn no_limit_when_page_size_not_positive() {
        let mut m = model();
        m.list.page_size = 0;
        let req = ListRequest::for_entity(&m, &ListParams::default());
        let q = list_query(&m, &req);
        assert!(!q.rows.sql.contains("LIMIT"));
    }

    #[test]
    fn insert_casts_by_entity_type() {
        let m = model();
        let mut row = Row::new();
        row.insert("name".into(), FieldValue::String("Books".into()));
        row.insert("created".into(), FieldValue::String("2024-01-02 10:00:00".into()));
        row.insert("rate".into(), FieldValue::Null);
        let q = insert(&m, &row);
        assert_eq!(
            q.sql,
            r#"INSERT INTO "shop"."categories" ("created", "name", "rate") VALUES ($1::timestamp, $2, $3::numeric) RETURNING "id""#
        );
        assert_eq!(q.params.len(), 3);
        assert_eq!(
            insert(&m, &Row::new()).sql,
            r#"INSERT INTO "shop"."categories" DEFAULT VALUES RETURNING "id""#
        );
    }

    #[test]
    fn update_binds_id_last() {
        let m = model();
        let mut row = Row::new();
        row.insert("name".into(), FieldValue::String("Toys".into()));
        let q = update(&m, FieldValue::I64(7), &row);
        assert_eq!(q.sql, r#"UPDATE "shop"."categories" SET "name" = $1 WHERE "id" = $2"#);
        assert_eq!(q.params, vec![FieldValue::String("Toys".into()), FieldValue::I64(7)]);
    }

    #[test]
    fn pk_value_follows_key_type() {
        let m = model();
        assert_eq!(pk_value(&m, "12"), Some(FieldValue::I64(12)));
        assert_eq!(pk_value(&m, "twelve"), None);
        let q = count_up_to(&m, FieldValue::I64(12));
        assert_eq!(q.sql, r#"SELECT COUNT(*) AS total FROM "shop"."categories" WHERE "id" <= $1"#);
    }

    #[test]
    fn named_parameters_skip_casts_and_literals() {
        let m = model();
        let sql = &m.lookups["by_parent"].sql;
        assert_eq!(named_parameters(sql), vec!["parent".to_string(), "kind".to_string()]);
    }

    #[test]
    fn bind_named_rewrites_positionally() {
        let q = bind_named("SELECT * FROM t WHERE a = :x OR b = :x AND c = @y", |name| match name {
            "x" => Some(FieldValue::String("1".into())),
            "y" => Some(FieldValue::I64(2)),
            _ => None,
        })
        .unwrap();
        assert_eq!(q.sql, "SELECT * FROM t WHERE a = $1 OR b = $1 AND c = $2");
        assert_eq!(q.params.len(), 2);
        let err = bind_named("SELECT :missing", |_| None).unwrap_err();
        assert_eq!(err, "missing");
    }

    #[test]
    fn raw_search_filters_wrapped_rows() {
        assert_eq!(
            raw("SELECT id, name FROM suppliers;").sql,
            "SELECT row_to_json(lookup) AS \"row\" FROM (SELECT id, name FROM suppliers) AS lookup"
        );
        let q = raw_search("SELECT id, name FROM suppliers", &["name".to_string()], Some("acme"));
        assert!(q.sql.ends_with(r#"AS lookup WHERE (CAST("name" AS TEXT) LIKE $1)"#), "{}", q.sql);
        assert_eq!(q.params, vec![FieldValue::String("%acme%".into())]);
    }

    #[test]
    fn lookup_query_wraps_bound_sql() {
        let m = model();
        let form = &m.lookups["by_parent"];
        let bound = bind_named(&form.sql, |n| Some(FieldValue::String(n.to_uppercase()))).unwrap();
        let req = ListRequest::for_lookup(form, &params(&[("search", "x"), ("sort", "nope")]));
        let q = lookup_list_query(form, bound, &req);
        assert_eq!(
            q.rows.sql,
            "SELECT row_to_json(lookup) AS \"row\" FROM (SELECT id, name FROM categories WHERE parent_id = $1 AND kind = $2 AND name <> ':x'::text) AS lookup WHERE (CAST(\"name\" AS TEXT) LIKE $3) ORDER BY \"id\" ASC LIMIT 10 OFFSET 0"
        );
        assert!(q.count.sql.starts_with("SELECT COUNT(*) AS total FROM (SELECT id"));
        assert_eq!(q.count.params.len(), 3);
    }
}
