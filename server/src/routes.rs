/// The single catch-all route: every request goes through the executor.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use axum::Router;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cgi::{CgiRequest, CgiResponse};
use crate::AppState;

/// Request bodies above this are refused before htmc is spawned.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Characters re-escaped when a cleaned path is sent back as a redirect.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(forward)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ANY /*
pub async fn forward(State(state): State<Arc<AppState>>, request: Request) -> Response {
    // htmc opens PATH_INFO relative to the root, so `..` never reaches it
    let path = decode_path(request.uri().path());
    let clean = clean_path(&path);
    if clean != path {
        return redirect_to_clean(&clean, request.uri().query());
    }

    let cgi_request = match to_cgi_request(request, path).await {
        Ok(r) => r,
        Err(response) => return response,
    };

    match state.executor.execute(cgi_request).await {
        Ok(response) => into_http_response(response),
        Err(e) => {
            error!("CGI forwarding failed: {}", e);
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status)
        }
    }
}

async fn to_cgi_request(request: Request, path: String) -> Result<CgiRequest, Response> {
    let (parts, body) = request.into_parts();

    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut headers = Vec::with_capacity(parts.headers.len());
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(v) => headers.push((name.as_str().to_string(), v.to_string())),
            Err(_) => warn!("Dropping non-ASCII value of header {}", name),
        }
    }

    let method = parts.method.as_str().to_string();
    let query = parts.uri.query().unwrap_or("").to_string();
    let protocol = protocol_name(parts.version).to_string();
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    // Too large is 413, a broken or aborted upload is 400
    let body = Bytes::from_request(Request::from_parts(parts, body), &())
        .await
        .map_err(|rejection| {
            warn!("Rejecting request body: {}", rejection.body_text());
            error_response(rejection.status())
        })?;

    Ok(CgiRequest {
        method,
        path,
        query,
        uri,
        protocol,
        headers,
        body: body.to_vec(),
        remote_addr,
    })
}

/// Decode `%XX` escapes. Invalid UTF-8 is replaced, bad escapes stay literal.
pub fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Lexically resolve `.`, `..` and repeated slashes in a rooted path.
///
/// `..` at the root stays at the root. A trailing slash is kept unless the
/// result is `/` itself.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut clean = format!("/{}", segments.join("/"));
    if path.ends_with('/') && clean != "/" {
        clean.push('/');
    }
    clean
}

fn redirect_to_clean(clean: &str, query: Option<&str>) -> Response {
    let mut location = utf8_percent_encode(clean, PATH).to_string();
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }
    info!("Redirecting to cleaned path {}", location);

    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(_) => error_response(StatusCode::BAD_REQUEST),
    }
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn into_http_response(cgi: CgiResponse) -> Response {
    let status = match StatusCode::from_u16(cgi.status) {
        Ok(s) => s,
        Err(_) => {
            error!("htmc answered with invalid status {}", cgi.status);
            return error_response(StatusCode::BAD_GATEWAY);
        }
    };

    let mut response = Response::new(Body::from(cgi.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in cgi.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping invalid CGI header {:?}: {:?}", name, value),
        }
    }
    response
}

fn error_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (status, format!("{} {}\n", status.as_u16(), reason)).into_response()
}
