//! Request tagging and CORS

use crate::config::ServerConfig;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Id of the request being served, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Browsers only read history and open the game socket, so GET is enough.
/// A `*` entry (or no entry at all) opens the API to every origin.
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins = &config.allowed_origins;
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// Reuse the caller's `x-request-id` or mint one, and echo it back
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = match request.headers().get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()) {
        Some(existing) => existing.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
