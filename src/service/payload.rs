//! Rendering payloads and write outcomes returned by the entity operations.

use crate::config::{
    EntityModel, FieldGroup, FieldType, FrontRule, LookupActions, SortOrder, ValidationSpec,
};
use crate::service::present::ComboOption;
use crate::service::FieldErrors;
use crate::sql::{ListRequest, Row};
use crate::response::success_with_status;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;
use std::collections::BTreeMap;

/// The caller's place in a list, carried through forms and redirects.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListState {
    pub page: i64,
    pub page_size: i64,
    pub sort: Option<String>,
    pub order: SortOrder,
    pub search: Option<String>,
}

impl From<&ListRequest> for ListState {
    fn from(req: &ListRequest) -> Self {
        ListState {
            page: req.page,
            page_size: req.page_size,
            sort: req.sort_field.clone(),
            order: req.sort_order,
            search: req.search.clone(),
        }
    }
}

impl ListState {
    /// Query string (without `?`) reproducing this state, plus an optional highlight.
    pub fn to_query(&self, highlight: Option<&str>) -> String {
        let page = self.page.to_string();
        let page_size = self.page_size.to_string();
        let mut pairs: Vec<(&str, &str)> = vec![("page", page.as_str()), ("pageSize", page_size.as_str())];
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.as_str()));
        }
        pairs.push(("order", self.order.as_str()));
        if let Some(search) = &self.search {
            pairs.push(("search", search.as_str()));
        }
        if let Some(h) = highlight {
            pairs.push(("highlight", h));
        }
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, NON_ALPHANUMERIC)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `/<list route>?<state>`.
    pub fn list_url(&self, model: &EntityModel, highlight: Option<&str>) -> String {
        format!("/{}?{}", model.list.route, self.to_query(highlight))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnHeader {
    pub name: String,
    pub label: String,
    pub sortable: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ListRow {
    #[serde(rename = "_highlight")]
    pub highlight: bool,
    #[serde(flatten)]
    pub values: Row,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub entity: String,
    pub title: String,
    pub list_route: String,
    pub detail_route: String,
    pub primary_key: String,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<ListRow>,
    pub total_rows: i64,
    pub total_pages: i64,
    #[serde(flatten)]
    pub state: ListState,
    pub highlight: Option<String>,
    pub page_size_options: Vec<i64>,
    pub searchable: bool,
    pub labels: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMode {
    Create,
    Edit,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupMeta {
    pub key_field: String,
    pub display_fields: Vec<String>,
    pub return_field: Option<String>,
    pub return_field_display: Option<String>,
    pub modal_title: Option<String>,
    pub data_url: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub read_only: bool,
    pub required: bool,
    pub max_length: Option<u32>,
    pub size: Option<u32>,
    pub rows: Option<u32>,
    pub align: Option<String>,
    pub vision_button: Option<String>,
    pub front: Option<FrontRule>,
    pub options: Option<Vec<ComboOption>>,
    pub popup: Option<PopupMeta>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FormGroup {
    pub name: String,
    pub fields: Vec<FormField>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPayload {
    pub entity: String,
    pub title: String,
    pub mode: FormMode,
    /// Where the form posts to.
    pub action: String,
    pub id: Option<String>,
    pub groups: Vec<FormGroup>,
    pub values: Row,
    pub errors: FieldErrors,
    pub list_state: ListState,
    pub list_url: String,
    pub titles: BTreeMap<String, String>,
    pub button_labels: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
}

impl FormPayload {
    /// Lay out the detail form around `values`, with fresh combo options per field.
    pub fn build(
        model: &EntityModel,
        mode: FormMode,
        id: Option<String>,
        values: Row,
        errors: FieldErrors,
        mut options: BTreeMap<String, Vec<ComboOption>>,
        list_state: ListState,
    ) -> Self {
        let action = match (&mode, &id) {
            (FormMode::Edit, Some(id)) => format!(
                "/{}/update/{}?{}",
                model.detail.route,
                utf8_percent_encode(id, NON_ALPHANUMERIC),
                list_state.to_query(None)
            ),
            _ => format!("/{}?{}", model.detail.route, list_state.to_query(None)),
        };
        let groups = model
            .detail
            .groups
            .iter()
            .map(|g| form_group(model, g, model.validation.as_ref(), &mut options))
            .collect();
        FormPayload {
            entity: model.name.clone(),
            title: model.detail.title.clone(),
            mode,
            action,
            id,
            groups,
            values,
            errors,
            list_url: list_state.list_url(model, None),
            list_state,
            titles: model.detail.titles.clone(),
            button_labels: model.detail.button_labels.clone(),
            style: model.detail.style.clone(),
        }
    }
}

fn form_group(
    model: &EntityModel,
    group: &FieldGroup,
    validation: Option<&ValidationSpec>,
    options: &mut BTreeMap<String, Vec<ComboOption>>,
) -> FormGroup {
    let fields = group
        .fields
        .iter()
        .map(|f| {
            let descriptor = model.field(&f.name);
            let rule_required = validation
                .and_then(|v| v.rules.get(&f.name))
                .map(|r| r.required)
                .unwrap_or(false);
            let popup = match &f.field_type {
                FieldType::LookupPopup(p) => Some(PopupMeta {
                    key_field: p.key_field.clone(),
                    display_fields: p.display_fields.clone(),
                    return_field: p.return_field.clone(),
                    return_field_display: p.return_field_display.clone(),
                    modal_title: p.modal_title.clone(),
                    data_url: format!("/{}/vision-data/{}", model.detail.route, f.name),
                }),
                _ => None,
            };
            FormField {
                name: f.name.clone(),
                label: descriptor
                    .map(|d| d.label.clone())
                    .unwrap_or_else(|| f.name.clone()),
                field_type: f.field_type.name(),
                read_only: f.read_only || f.name == model.primary_key,
                required: descriptor.map(|d| d.required).unwrap_or(false) || rule_required,
                max_length: f.max_length,
                size: f.size,
                rows: f.rows,
                align: f.align.clone(),
                vision_button: f.vision_button.clone(),
                front: validation.and_then(|v| v.front.get(&f.name)).cloned(),
                options: options.remove(&f.name),
                popup,
            }
        })
        .collect();
    FormGroup {
        name: group.name.clone(),
        fields,
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupPage {
    pub form: String,
    pub entity: String,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Row>,
    pub total_rows: i64,
    pub total_pages: i64,
    #[serde(flatten)]
    pub state: ListState,
    pub page_size_options: Vec<i64>,
    pub actions: LookupActions,
    /// Context values the query was bound with.
    pub context: BTreeMap<String, String>,
    pub return_to: Option<String>,
    /// True when the caller opened the form to pick a row.
    pub selecting: bool,
}

/// Data behind a lookup field of the detail form.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LookupData {
    #[serde(rename_all = "camelCase")]
    LookupCombo {
        field: String,
        options: Vec<ComboOption>,
    },
    #[serde(rename_all = "camelCase")]
    LookupPopup {
        field: String,
        key_field: String,
        display_fields: Vec<String>,
        return_field: Option<String>,
        return_field_display: Option<String>,
        modal_title: Option<String>,
        rows: Vec<Row>,
    },
}

/// Result of a write: go back to the list, or show the form again with its errors.
#[derive(Debug)]
pub enum WriteOutcome {
    Redirect(String),
    Invalid(Box<FormPayload>),
}

impl IntoResponse for WriteOutcome {
    fn into_response(self) -> Response {
        match self {
            WriteOutcome::Redirect(to) => Redirect::to(&to).into_response(),
            WriteOutcome::Invalid(form) => success_with_status(StatusCode::UNPROCESSABLE_ENTITY, form).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_state_query_is_encoded() {
        let state = ListState {
            page: 2,
            page_size: 10,
            sort: Some("name".into()),
            order: SortOrder::Desc,
            search: Some("a&b c".into()),
        };
        assert_eq!(
            state.to_query(Some("7")),
            "page=2&pageSize=10&sort=name&order=desc&search=a%26b%20c&highlight=7"
        );
    }

    #[test]
    fn list_row_serializes_flat() {
        let mut values = Row::new();
        values.insert("id".into(), crate::sql::FieldValue::I64(3));
        let row = ListRow { highlight: true, values };
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            serde_json::json!({"_highlight": true, "id": 3})
        );
    }
}
