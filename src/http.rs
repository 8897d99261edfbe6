//! Thin HTTP facade, spec.md §6.1.
//!
//! Grounded on the teacher's `create_axum_router`/`health_handler`
//! (`src/server/mod.rs`): a minimal `axum::Router`, no middleware beyond
//! `tower_http`'s `cors`/`trace` layers, no auth/rate-limiting (explicitly
//! out of scope, spec.md §1). Each handler does argument extraction →
//! `classify`/`collector`/`expand` call → cache headers → JSON body.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::IrrSource;
use crate::cache::{self, MemoCache};
use crate::classify::classify;
use crate::collector::Collector;
use crate::config::AppConfig;
use crate::error::Error;
use crate::model::{MemberOf, ObjectClass, QueryCategory};

const TTL: Duration = Duration::from_secs(300);

pub struct AppState {
    pub collector: Arc<Collector>,
    pub irr: Arc<dyn IrrSource>,
    pub cache: Arc<dyn MemoCache>,
    pub config: AppConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/clean_query/*q", get(clean_query))
        .route("/prefixes/prefix/*p", get(prefixes_prefix))
        .route("/prefixes/asn/:asn", get(prefixes_asn))
        .route("/sets/member-of/:object_class/*target", get(member_of))
        .route("/sets/expand/*target", get(sets_expand))
        .route("/metadata", get(metadata))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Error::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Wraps a JSON body with `Cache-Control: public, max-age=300` and an
/// `ETag` derived from a `sha2` hash of the serialized body, matching
/// `irrexplorer/api/queries.py::add_cache_headers`.
fn cached_json<T: Serialize>(body: &T) -> Response {
    let value = serde_json::to_value(body).unwrap_or_default();
    let bytes = serde_json::to_vec(&value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let etag = format!("\"{:x}\"", hasher.finalize());

    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=300"),
    );
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response.headers_mut().insert(axum::http::header::ETAG, value);
    }
    response
}

async fn clean_query(
    State(state): State<Arc<AppState>>,
    Path(q): Path<String>,
) -> Result<Response, Error> {
    let query = classify(
        &q,
        state.config.max_query_length,
        state.config.minimum_prefix_size_ipv4,
        state.config.minimum_prefix_size_ipv6,
    )?;
    Ok(cached_json(&query))
}

async fn prefixes_prefix(
    State(state): State<Arc<AppState>>,
    Path(p): Path<String>,
) -> Result<Response, Error> {
    let query = classify(
        &p,
        state.config.max_query_length,
        state.config.minimum_prefix_size_ipv4,
        state.config.minimum_prefix_size_ipv6,
    )?;
    if query.category != QueryCategory::Prefix {
        return Err(Error::InvalidQuery(format!(
            "{p} is not a valid prefix or IP address"
        )));
    }
    let prefix: crate::model::IpNetwork = query
        .cleaned_value
        .parse()
        .map_err(|_| Error::InvalidQuery(format!("{p} is not a valid prefix or IP address")))?;

    let key = cache::cache_key("prefix", &query.cleaned_value);
    let collector = state.collector.clone();
    let summaries = cache::memoize(state.cache.clone(), &key, TTL, move || async move {
        collector.prefix_summary(prefix).await
    })
    .await?;

    Ok(cached_json(&summaries))
}

async fn prefixes_asn(
    State(state): State<Arc<AppState>>,
    Path(asn_str): Path<String>,
) -> Result<Response, Error> {
    let query = classify(
        &asn_str,
        state.config.max_query_length,
        state.config.minimum_prefix_size_ipv4,
        state.config.minimum_prefix_size_ipv6,
    )?;
    if query.category != QueryCategory::Asn {
        return Err(Error::InvalidQuery(format!("{asn_str} is not a valid ASN")));
    }
    let asn: u32 = query.cleaned_value[2..]
        .parse()
        .map_err(|_| Error::InvalidQuery(format!("{asn_str} is not a valid ASN")))?;

    // `irrexplorer/api/collectors.py::asn_summary` is `@cached(ttl=
    // ASN_SUMMARY_TTL)` -- large ASNs like AS174 touch thousands of
    // prefixes, so this result is memoized the same way.
    let key = cache::cache_key("asn", &query.cleaned_value);
    let collector = state.collector.clone();
    let summaries = cache::memoize(state.cache.clone(), &key, TTL, move || async move {
        collector.asn_summary(asn).await
    })
    .await?;
    Ok(cached_json(&summaries))
}

async fn member_of(
    State(state): State<Arc<AppState>>,
    Path((object_class, target)): Path<(String, String)>,
) -> Result<Response, Error> {
    let object_class = ObjectClass::from_str_loose(&object_class)
        .ok_or_else(|| Error::InvalidQuery(format!("unknown object class: {object_class}")))?;
    let result: MemberOf = crate::collector::member_of(state.irr.as_ref(), &target, object_class).await?;
    Ok(cached_json(&result))
}

async fn sets_expand(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
) -> Result<Response, Error> {
    let outcome = crate::expand::expand_set(
        state.irr.as_ref(),
        &target,
        state.config.set_size_limit,
        state.config.set_expansion_timeout(),
    )
    .await?;
    if let Some(warning) = &outcome.warning {
        tracing::warn!(target, %warning, "set expansion degraded");
    }
    Ok(cached_json(&outcome.results))
}

async fn metadata(State(state): State<Arc<AppState>>) -> Result<Response, Error> {
    let last_update = state.collector.metadata().await?;
    Ok(cached_json(&last_update))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_maps_invalid_query_to_400() {
        let resp = Error::InvalidQuery("bad".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_maps_source_unavailable_to_502() {
        let resp = Error::SourceUnavailable(crate::model::DataSource::Irr).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
