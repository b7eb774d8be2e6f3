//! One-shot CLI commands that go through the same endpoints as the server.

use anyhow::Result;
use std::sync::Arc;

use citebridge_core::endpoints::{Method, Request};
use citebridge_core::format::Reply;

use crate::config::Config;
use crate::server::build_api;
use crate::sqlite_host::SqliteHost;

async fn dispatch(config: &Config, path: &str, request: Request) -> Result<Reply> {
    let host = SqliteHost::open(config).await?;
    let api = build_api(config, Arc::new(host));
    Ok(api.dispatch(Method::Get, path, &request).await)
}

fn with_optional(request: Request, name: &str, value: Option<&str>) -> Request {
    match value {
        Some(value) => request.with_param(name, value),
        None => request,
    }
}

/// `items?easykey=<keys>` with the given format and style.
pub async fn run_resolve(
    config: &Config,
    keys: &str,
    format: Option<&str>,
    style: Option<&str>,
) -> Result<Reply> {
    let request = Request::new().with_param("easykey", keys);
    let request = with_optional(request, "format", format);
    let request = with_optional(request, "style", style);
    dispatch(config, "items", request).await
}

/// `search?q=<query>` with the given method and format.
pub async fn run_search(
    config: &Config,
    query: &str,
    method: Option<&str>,
    format: Option<&str>,
) -> Result<Reply> {
    let request = Request::new().with_param("q", query);
    let request = with_optional(request, "method", method);
    let request = with_optional(request, "format", format);
    dispatch(config, "search", request).await
}
