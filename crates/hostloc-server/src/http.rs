// Copyright (C) 2026 The hostloc Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The single HTTP surface: `GET /api/country?host=<value>`.

use crate::dns::HickoryDns;
use crate::provider::HttpProviderClient;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use hostloc_core::{ResolveError, Resolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type AppResolver = Resolver<HickoryDns, HttpProviderClient>;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<AppResolver>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/country", get(country_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct CountryQuery {
    host: Option<String>,
}

#[derive(Serialize)]
struct CountryResponse {
    host: String,
    country: String,
}

async fn country_handler(
    State(state): State<AppState>,
    Query(query): Query<CountryQuery>,
    headers: HeaderMap,
) -> Response {
    let host = match query.host.or_else(|| host_header(&headers)) {
        Some(host) if !host.is_empty() => host,
        _ => return (StatusCode::BAD_REQUEST, "missing host").into_response(),
    };

    let resolver = Arc::clone(&state.resolver);
    let host_for_task = host.clone();
    let result = tokio::task::spawn_blocking(move || resolver.resolve(&host_for_task))
        .await
        .expect("resolver task panicked");

    match result {
        Ok(country) => Json(CountryResponse { host, country }).into_response(),
        Err(err) => error_response(&err),
    }
}

fn host_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn error_response(err: &ResolveError) -> Response {
    let status = match err {
        ResolveError::LookupError { .. } => StatusCode::BAD_REQUEST,
        ResolveError::NoProviderAvailable
        | ResolveError::ProviderError { .. }
        | ResolveError::ParseError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}
