//! Local HTTP front for the search gateway.
//!
//! `GET /search?q=...` and `OPTIONS /search` are translated into
//! [`GatewayRequest`]s; the gateway's status, headers and body are returned
//! unchanged.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use site_search_core::{GatewayRequest, GatewayResponse, ParameterStore, QueryGateway, SearchBackend};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

type SharedGateway<P, B> = Arc<QueryGateway<P, B>>;

pub async fn serve<P, B>(bind: &str, gateway: SharedGateway<P, B>) -> anyhow::Result<()>
where
    P: ParameterStore + Send + Sync + 'static,
    B: SearchBackend + Send + Sync + 'static,
{
    let app = router(gateway);

    info!(bind = %bind, "search gateway listening");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router<P, B>(gateway: SharedGateway<P, B>) -> Router
where
    P: ParameterStore + Send + Sync + 'static,
    B: SearchBackend + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/search",
            get(handle_search::<P, B>).options(handle_preflight::<P, B>),
        )
        .with_state(gateway)
}

async fn handle_search<P, B>(
    State(gateway): State<SharedGateway<P, B>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response
where
    P: ParameterStore + Send + Sync + 'static,
    B: SearchBackend + Send + Sync + 'static,
{
    let request = GatewayRequest {
        method: Method::GET.to_string(),
        origin: request_origin(&headers),
        query: params.get("q").cloned(),
    };
    into_http_response(gateway.handle(&request).await)
}

async fn handle_preflight<P, B>(
    State(gateway): State<SharedGateway<P, B>>,
    headers: HeaderMap,
) -> Response
where
    P: ParameterStore + Send + Sync + 'static,
    B: SearchBackend + Send + Sync + 'static,
{
    let request = GatewayRequest {
        method: Method::OPTIONS.to_string(),
        origin: request_origin(&headers),
        query: None,
    };
    into_http_response(gateway.handle(&request).await)
}

fn request_origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn into_http_response(gateway_response: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(gateway_response.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::new(Body::from(gateway_response.body));
    *response.status_mut() = status;

    for (name, value) in gateway_response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "dropping header that is not valid HTTP"),
        }
    }

    response
}
