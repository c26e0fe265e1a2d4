//! Entity routes. Path segments are list routes, detail routes or entity names; handlers resolve them against the registry.

use crate::handlers::entity::{
    create, delete as delete_handler, edit_form, list, lookup_data, lookup_list, new_form, root,
    update,
};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/vision/:name", get(lookup_list))
        .route("/:segment", get(list).post(create))
        .route("/:segment/new", get(new_form))
        .route("/:segment/edit/:id", get(edit_form))
        .route("/:segment/update/:id", post(update))
        .route("/:segment/delete/:id", post(delete_handler))
        .route("/:segment/vision-data/:field", get(lookup_data))
        .with_state(state)
}
