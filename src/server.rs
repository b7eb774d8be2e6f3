//! HTTP server.
//!
//! Mounts every endpoint of an [`EndpointRegistry`] under `[server].prefix`
//! on an axum router. Handlers only translate between axum and the core
//! [`Request`]/[`Reply`] types; all endpoint logic lives in
//! [`citebridge_core::endpoints`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `{prefix}/items` | Items by selector, in any format |
//! | `GET`  | `{prefix}/search` | Quick search |
//! | `GET`  | `{prefix}/complete` | Key completion |
//! | `POST` | `{prefix}/bibliography` | Citation clusters and bibliography |
//! | `GET`  | `{prefix}/select` | Record the selection |
//! | `GET`  | `{prefix}/version` | Versions |
//! | `GET`  | `{prefix}/styles` | Installed styles |
//! | `GET`  | `{prefix}/locales` | Available locales |
//!
//! Any other method on a registered path gets `405`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based editors
//! can call the API directly.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use citebridge_core::endpoints::{Api, EndpointContext, EndpointRegistry, Method, Request};
use citebridge_core::format::Reply;
use citebridge_core::host::Host;
use citebridge_core::resolver::{ResolutionCache, Resolver};
use citebridge_core::Error;

use crate::config::Config;
use crate::sqlite_host::SqliteHost;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    api: Arc<Api>,
}

/// Wraps a core [`Reply`] so axum can send it.
struct HttpReply(Reply);

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, self.0.content_type)], self.0.body).into_response()
    }
}

/// Builds the [`Api`] for a host, with a fresh resolution cache.
pub fn build_api(config: &Config, host: Arc<dyn Host>) -> Api {
    let resolver = Resolver::new(host, Arc::new(ResolutionCache::new()));
    Api::new(
        EndpointRegistry::with_builtins(),
        EndpointContext::new(resolver, config.citation.default_style.clone()),
    )
}

/// Builds the router serving `api` under `[server].prefix`.
pub fn router(config: &Config, api: Api) -> Router {
    let base = config.server.prefix.trim_end_matches('/').to_string();
    let mut app = Router::new();
    for endpoint in api.registry().endpoints() {
        let path = format!("{}/{}", base, endpoint.path());
        let name = endpoint.path().to_string();
        debug!(method = %endpoint.method(), route = %path, "{}", endpoint.description());
        app = match endpoint.method() {
            Method::Get => app.route(
                &path,
                get(
                    move |State(state): State<AppState>,
                          Query(query): Query<HashMap<String, String>>| async move {
                        handle(state, Method::Get, name, query, Bytes::new()).await
                    },
                ),
            ),
            Method::Post => app.route(
                &path,
                post(
                    move |State(state): State<AppState>,
                          Query(query): Query<HashMap<String, String>>,
                          body: Bytes| async move {
                        handle(state, Method::Post, name, query, body).await
                    },
                ),
            ),
        };
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(cors).with_state(AppState { api: Arc::new(api) })
}

async fn handle(
    state: AppState,
    method: Method,
    path: String,
    query: HashMap<String, String>,
    body: Bytes,
) -> HttpReply {
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => {
            let err = Error::InvalidRequest(format!("Request body is not UTF-8: {}", e));
            return HttpReply(Reply::from_error(&err));
        }
    };
    let request = Request { query, body };
    HttpReply(state.api.dispatch(method, &path, &request).await)
}

/// Serves `api` on an already-bound listener until the process ends.
pub async fn serve(listener: TcpListener, config: &Config, api: Api) -> anyhow::Result<()> {
    let app = router(config, api);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Starts the server on `[server].bind`, backed by the SQLite library.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let host = SqliteHost::open(config).await?;
    let api = build_api(config, Arc::new(host));

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        prefix = %config.server.prefix,
        "citebridge listening"
    );
    serve(listener, config, api).await
}
