//! Lenient extraction of list query strings.

use crate::sql::ListParams;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use std::collections::BTreeMap;

/// Query string of a list-like request: the list state, plus every pair for lookup context.
/// Malformed input degrades to defaults instead of rejecting the request.
#[derive(Clone, Debug, Default)]
pub struct ListQueryString {
    pub params: ListParams,
    pub pairs: BTreeMap<String, String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ListQueryString
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let params = match Query::<ListParams>::try_from_uri(&parts.uri) {
            Ok(Query(p)) => p,
            Err(e) => {
                tracing::debug!(uri = %parts.uri, error = %e, "list parameters ignored");
                ListParams::default()
            }
        };
        let pairs = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(m)| m)
            .unwrap_or_default();
        Ok(ListQueryString { params, pairs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(uri: &str) -> ListQueryString {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        ListQueryString::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn reads_list_state_and_context() {
        let q = extract("/categories?page=2&pageSize=5&sort=name&order=desc&search=bo&parent=3").await;
        assert_eq!(q.params.page.as_deref(), Some("2"));
        assert_eq!(q.params.page_size.as_deref(), Some("5"));
        assert_eq!(q.params.order.as_deref(), Some("desc"));
        assert_eq!(q.pairs.get("parent").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn missing_query_is_default() {
        let q = extract("/categories").await;
        assert_eq!(q.params, ListParams::default());
        assert!(q.pairs.is_empty());
    }
}
