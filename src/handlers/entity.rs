//! Entity handlers: list, forms, writes and lookups. Entities are resolved from the path segment.

use crate::config::EntityModel;
use crate::error::AppError;
use crate::extractors::ListQueryString;
use crate::response::success_ok;
use crate::service::{CrudService, SubmittedValues, WriteOutcome};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::Uri,
    response::{IntoResponse, Redirect, Response},
    Form,
};

fn detail_model<'a>(state: &'a AppState, segment: &str) -> Result<&'a EntityModel, AppError> {
    state
        .registry
        .by_detail_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("no form '{}'", segment)))
}

/// `/` goes to the first loaded entity's list.
pub async fn root(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let model = state
        .registry
        .first()
        .ok_or_else(|| AppError::NotFound("no entities loaded".into()))?;
    Ok(Redirect::to(&format!("/{}", model.list.route)))
}

/// A list route renders the list; an entity name redirects to its list, keeping the query string.
pub async fn list(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    query: ListQueryString,
    uri: Uri,
) -> Result<Response, AppError> {
    if let Some(model) = state.registry.by_list_route(&segment) {
        let page = CrudService::list(&state.pool, model, &query.params).await?;
        return Ok(success_ok(page).into_response());
    }
    if let Some(model) = state.registry.by_name(&segment) {
        let to = match uri.query() {
            Some(q) => format!("/{}?{}", model.list.route, q),
            None => format!("/{}", model.list.route),
        };
        return Ok(Redirect::to(&to).into_response());
    }
    Err(AppError::NotFound(format!("no list '{}'", segment)))
}

pub async fn new_form(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    query: ListQueryString,
) -> Result<Response, AppError> {
    let model = detail_model(&state, &segment)?;
    let form = CrudService::new_form(&state.pool, model, &query.params).await?;
    Ok(success_ok(form).into_response())
}

pub async fn create(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    query: ListQueryString,
    Form(values): Form<SubmittedValues>,
) -> Result<WriteOutcome, AppError> {
    let model = detail_model(&state, &segment)?;
    CrudService::create(&state.pool, model, &values, &query.params).await
}

pub async fn edit_form(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    query: ListQueryString,
) -> Result<Response, AppError> {
    let model = detail_model(&state, &segment)?;
    let form = CrudService::edit_form(&state.pool, model, &id, &query.params).await?;
    Ok(success_ok(form).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    query: ListQueryString,
    Form(values): Form<SubmittedValues>,
) -> Result<WriteOutcome, AppError> {
    let model = detail_model(&state, &segment)?;
    CrudService::update(&state.pool, model, &id, &values, &query.params).await
}

pub async fn delete(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Result<WriteOutcome, AppError> {
    let model = detail_model(&state, &segment)?;
    CrudService::delete(&state.pool, model, &id).await
}

/// Options or rows behind a lookup field of the detail form.
pub async fn lookup_data(
    State(state): State<AppState>,
    Path((segment, field)): Path<(String, String)>,
    query: ListQueryString,
) -> Result<Response, AppError> {
    let model = detail_model(&state, &segment)?;
    let data = CrudService::lookup_data(&state.pool, model, &field, &query.params).await?;
    Ok(success_ok(data).into_response())
}

/// Standalone lookup form; every query pair is available as context.
pub async fn lookup_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: ListQueryString,
) -> Result<Response, AppError> {
    let (model, form) = state
        .registry
        .lookup_form(&name)
        .ok_or_else(|| AppError::NotFound(format!("no lookup form '{}'", name)))?;
    let page = CrudService::lookup_list(&state.pool, model, form, &query.pairs, &query.params).await?;
    Ok(success_ok(page).into_response())
}
