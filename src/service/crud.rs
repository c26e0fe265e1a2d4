//! Entity operations against PostgreSQL: list, forms, writes and lookups.

use crate::config::{EntityModel, FieldType, LookupFormModel, ParamSource, Prepopulate};
use crate::error::AppError;
use crate::service::payload::{
    ColumnHeader, FormMode, FormPayload, ListPage, ListRow, ListState, LookupData, LookupPage,
    WriteOutcome,
};
use crate::service::present::{self, combo_options, ComboOption};
use crate::service::{FormBinder, RequestValidator, SubmittedValues};
use crate::sql::{
    bind_named, count_up_to, delete, highlight_page, insert, list_query, lookup_list_query, pk_value, raw,
    raw_search, row_from_json_column, row_from_pg, select_by_id, total_pages, update, FieldValue,
    ListParams, ListRequest, QueryBuf, Row,
};
use chrono::Local;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::{PgPool, Row as _};
use std::collections::BTreeMap;

pub struct CrudService;

impl CrudService {
    /// One page of the entity's list view.
    pub async fn list(pool: &PgPool, model: &EntityModel, params: &ListParams) -> Result<ListPage, AppError> {
        let req = ListRequest::for_entity(model, params);
        let q = list_query(model, &req);
        let rows = Self::fetch_rows(pool, &q.rows).await?;
        let total = Self::fetch_count(pool, &q.count).await?;

        let rows = rows
            .iter()
            .map(|row| ListRow {
                highlight: row
                    .get(&model.primary_key)
                    .map(|key| present::is_highlighted(key, req.highlight.as_deref()))
                    .unwrap_or(false),
                values: present::list_values(model, row),
            })
            .collect();
        let columns = model
            .list
            .columns
            .iter()
            .map(|c| ColumnHeader {
                name: c.clone(),
                label: model
                    .list
                    .labels
                    .get(c)
                    .cloned()
                    .or_else(|| model.field(c).map(|f| f.label.clone()))
                    .unwrap_or_else(|| c.clone()),
                sortable: model.is_sortable(c),
            })
            .collect();

        Ok(ListPage {
            entity: model.name.clone(),
            title: model.list.title.clone(),
            list_route: model.list.route.clone(),
            detail_route: model.detail.route.clone(),
            primary_key: model.primary_key.clone(),
            columns,
            rows,
            total_rows: total,
            total_pages: total_pages(total, req.page_size),
            state: ListState::from(&req),
            highlight: req.highlight.clone(),
            page_size_options: model.list.page_size_options.clone(),
            searchable: !model.list.searchable_fields.is_empty(),
            labels: model.list.labels.clone(),
            style: model.list.style.clone(),
        })
    }

    /// Empty detail form: field defaults, then prefill hints.
    pub async fn new_form(pool: &PgPool, model: &EntityModel, params: &ListParams) -> Result<FormPayload, AppError> {
        let mut values = Row::new();
        for f in model.detail.fields() {
            if let Some(default) = model.field(&f.name).and_then(|d| d.default.clone()) {
                values.insert(f.name.clone(), default);
            }
        }
        if let Some(spec) = &model.validation {
            let now = Local::now().naive_local();
            for (field, hint) in &spec.prepopulate {
                match hint {
                    Prepopulate::Now { format } => {
                        values.insert(field.clone(), FieldValue::String(now.format(format).to_string()));
                    }
                }
            }
        }
        let options = Self::combo_data(pool, model).await?;
        let state = ListState::from(&ListRequest::for_entity(model, params));
        Ok(FormPayload::build(model, FormMode::Create, None, values, Default::default(), options, state))
    }

    /// Validate, bind and insert; then redirect to the list page that holds the new row.
    pub async fn create(
        pool: &PgPool,
        model: &EntityModel,
        values: &SubmittedValues,
        params: &ListParams,
    ) -> Result<WriteOutcome, AppError> {
        let errors = RequestValidator::validate(model.validation.as_ref(), values);
        if !errors.is_empty() {
            tracing::debug!(entity = %model.name, errors = ?errors, "create rejected");
            let options = Self::combo_data(pool, model).await?;
            let state = ListState::from(&ListRequest::for_entity(model, params));
            let form = FormPayload::build(model, FormMode::Create, None, submitted_row(values), errors, options, state);
            return Ok(WriteOutcome::Invalid(Box::new(form)));
        }

        let row = FormBinder::bind(model, values);
        let inserted = Self::fetch_optional(pool, &insert(model, &row))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        let new_id = inserted.get(&model.primary_key).cloned().unwrap_or(FieldValue::Null);

        // Position of the new row under the default ascending key order.
        let position = Self::fetch_count(pool, &count_up_to(model, new_id.clone())).await?;
        let page_size = model.list.page_size;
        let state = ListState {
            page: highlight_page(position, page_size),
            page_size,
            sort: Some(model.list.default_sort_field.clone()),
            order: model.list.default_sort_order,
            search: None,
        };
        let id = new_id.to_string();
        tracing::info!(entity = %model.name, id = %id, "row created");
        Ok(WriteOutcome::Redirect(state.list_url(model, Some(&id))))
    }

    /// Stored row as edit-form values.
    pub async fn edit_form(
        pool: &PgPool,
        model: &EntityModel,
        id: &str,
        params: &ListParams,
    ) -> Result<FormPayload, AppError> {
        let key = Self::key(model, id)?;
        let row = Self::fetch_optional(pool, &select_by_id(model, key))
            .await?
            .ok_or_else(|| not_found(model, id))?;
        let values = present::form_values(model, &row);
        let options = Self::combo_data(pool, model).await?;
        let state = ListState::from(&ListRequest::for_entity(model, params));
        Ok(FormPayload::build(model, FormMode::Edit, Some(id.to_string()), values, Default::default(), options, state))
    }

    /// Validate, bind and update; then redirect to the caller's list page with the row highlighted.
    pub async fn update(
        pool: &PgPool,
        model: &EntityModel,
        id: &str,
        values: &SubmittedValues,
        params: &ListParams,
    ) -> Result<WriteOutcome, AppError> {
        let key = Self::key(model, id)?;
        let state = ListState::from(&ListRequest::for_entity(model, params));
        let errors = RequestValidator::validate(model.validation.as_ref(), values);
        if !errors.is_empty() {
            tracing::debug!(entity = %model.name, id = %id, errors = ?errors, "update rejected");
            let mut row = submitted_row(values);
            row.insert(model.primary_key.clone(), FieldValue::String(id.to_string()));
            let options = Self::combo_data(pool, model).await?;
            let form = FormPayload::build(model, FormMode::Edit, Some(id.to_string()), row, errors, options, state);
            return Ok(WriteOutcome::Invalid(Box::new(form)));
        }

        let row = FormBinder::bind(model, values);
        if !row.is_empty() {
            let affected = Self::execute(pool, &update(model, key, &row)).await?;
            if affected == 0 {
                return Err(not_found(model, id));
            }
            tracing::info!(entity = %model.name, id = %id, "row updated");
        }
        Ok(WriteOutcome::Redirect(state.list_url(model, Some(id))))
    }

    pub async fn delete(pool: &PgPool, model: &EntityModel, id: &str) -> Result<WriteOutcome, AppError> {
        let key = Self::key(model, id)?;
        let affected = Self::execute(pool, &delete(model, key)).await?;
        if affected == 0 {
            return Err(not_found(model, id));
        }
        tracing::info!(entity = %model.name, id = %id, "row deleted");
        Ok(WriteOutcome::Redirect(format!("/{}", model.list.route)))
    }

    /// One page of a lookup form, its parameters bound from `context` or the schema.
    pub async fn lookup_list(
        pool: &PgPool,
        model: &EntityModel,
        form: &LookupFormModel,
        context: &BTreeMap<String, String>,
        params: &ListParams,
    ) -> Result<LookupPage, AppError> {
        let mut bound_context = BTreeMap::new();
        for p in &form.params {
            if let ParamSource::Context(field) = &p.source {
                bound_context.insert(field.clone(), context.get(field).cloned().unwrap_or_default());
            }
        }
        let bound = bind_named(&form.sql, |name| {
            let param = form.params.iter().find(|p| p.name == name)?;
            Some(FieldValue::String(match &param.source {
                ParamSource::Context(field) => bound_context.get(field).cloned().unwrap_or_default(),
                ParamSource::Literal(v) => v.clone(),
            }))
        })
        .map_err(|name| {
            AppError::BadRequest(format!("lookup form '{}' uses undeclared parameter '{}'", form.name, name))
        })?;

        let req = ListRequest::for_lookup(form, params);
        let q = lookup_list_query(form, bound, &req);
        let rows = Self::fetch_json_rows(pool, &q.rows).await?;
        let total = Self::fetch_count(pool, &q.count).await?;

        let columns = form
            .columns
            .iter()
            .map(|c| ColumnHeader {
                name: c.clone(),
                label: form.labels.get(c).cloned().unwrap_or_else(|| c.clone()),
                sortable: true,
            })
            .collect();
        let return_to = context.get("return_to").filter(|r| !r.is_empty()).cloned();
        Ok(LookupPage {
            form: form.name.clone(),
            entity: model.name.clone(),
            columns,
            rows,
            total_rows: total,
            total_pages: total_pages(total, req.page_size),
            state: ListState::from(&req),
            page_size_options: form.page_size_options.clone(),
            actions: form.actions,
            context: bound_context,
            selecting: return_to.is_some() && form.actions.allow_selectable,
            return_to,
        })
    }

    /// Rows behind one lookup field of the detail form. Popup rows can be searched over their display fields.
    pub async fn lookup_data(
        pool: &PgPool,
        model: &EntityModel,
        field: &str,
        params: &ListParams,
    ) -> Result<LookupData, AppError> {
        let field_ref = model
            .detail_field(field)
            .ok_or_else(|| AppError::NotFound(format!("field '{}' is not on the {} form", field, model.name)))?;
        match &field_ref.field_type {
            FieldType::LookupCombo(cfg) => {
                let rows = Self::fetch_json_rows(pool, &raw(&cfg.sql)).await?;
                Ok(LookupData::LookupCombo {
                    field: field.to_string(),
                    options: combo_options(cfg, &rows),
                })
            }
            FieldType::LookupPopup(cfg) => {
                let search = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
                let q = raw_search(&cfg.sql, &cfg.display_fields, search);
                let rows = Self::fetch_json_rows(pool, &q).await?;
                Ok(LookupData::LookupPopup {
                    field: field.to_string(),
                    key_field: cfg.key_field.clone(),
                    display_fields: cfg.display_fields.clone(),
                    return_field: cfg.return_field.clone(),
                    return_field_display: cfg.return_field_display.clone(),
                    modal_title: cfg.modal_title.clone(),
                    rows,
                })
            }
            _ => Err(AppError::NotFound(format!("field '{}' of {} is not a lookup field", field, model.name))),
        }
    }

    /// Options of every combo field on the detail form, queried afresh.
    async fn combo_data(pool: &PgPool, model: &EntityModel) -> Result<BTreeMap<String, Vec<ComboOption>>, AppError> {
        let mut out = BTreeMap::new();
        for f in model.detail.fields() {
            if let FieldType::LookupCombo(cfg) = &f.field_type {
                let rows = Self::fetch_json_rows(pool, &raw(&cfg.sql)).await?;
                out.insert(f.name.clone(), combo_options(cfg, &rows));
            }
        }
        Ok(out)
    }

    fn key(model: &EntityModel, id: &str) -> Result<FieldValue, AppError> {
        pk_value(model, id).ok_or_else(|| not_found(model, id))
    }

    fn prepared(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        query
    }

    async fn fetch_rows(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        let rows = Self::prepared(q).fetch_all(pool).await?;
        Ok(rows.iter().map(row_from_pg).collect())
    }

    async fn fetch_json_rows(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        let rows = Self::prepared(q).fetch_all(pool).await?;
        Ok(rows.iter().map(row_from_json_column).collect())
    }

    async fn fetch_optional(pool: &PgPool, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        let row = Self::prepared(q).fetch_optional(pool).await?;
        Ok(row.as_ref().map(row_from_pg))
    }

    async fn fetch_count(pool: &PgPool, q: &QueryBuf) -> Result<i64, AppError> {
        let row = Self::prepared(q).fetch_one(pool).await?;
        Ok(row.try_get::<i64, _>("total")?)
    }

    async fn execute(pool: &PgPool, q: &QueryBuf) -> Result<u64, AppError> {
        let result = Self::prepared(q).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

/// Submitted text echoed back into a form that failed validation.
fn submitted_row(values: &SubmittedValues) -> Row {
    values
        .iter()
        .map(|(k, v)| (k.clone(), FieldValue::String(v.clone())))
        .collect()
}

fn not_found(model: &EntityModel, id: &str) -> AppError {
    AppError::NotFound(format!("{} '{}' not found", model.name, id))
}
