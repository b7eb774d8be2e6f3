//! Endpoint registry and dispatcher.
//!
//! Each endpoint implements [`Endpoint`] and is registered in an
//! [`EndpointRegistry`] under a path relative to the server prefix. The
//! [`Api`] looks endpoints up, runs them, and turns every error into a
//! [`Reply`]. Servers only have to translate their requests into
//! [`Request`] and the resulting [`Reply`] back.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `items` | Items by selection, collection, key, easy key, citation key, or all |
//! | `GET`  | `search` | Quick search |
//! | `GET`  | `complete` | Easy-key or citation-key completion |
//! | `POST` | `bibliography` | Render citation clusters and a bibliography |
//! | `GET`  | `select` | Record an item as the current selection |
//! | `GET`  | `version` | Plugin and host versions |
//! | `GET`  | `styles` | Installed citation styles |
//! | `GET`  | `locales` | Available locales |

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::format::{format_items, normalize_style_id, Format, Reply};
use crate::host::{CitationGroup, CitationItem, Host, Item};
use crate::query::QuickSearchMode;
use crate::resolver::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A request as seen by an endpoint: decoded query parameters and the raw body.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub query: HashMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: HashMap<String, String>) -> Self {
        Self {
            query,
            body: String::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// A parameter with a non-empty value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether a parameter is present at all, as in `?all` or `?selected=t`.
    pub fn flag(&self, name: &str) -> bool {
        self.query.contains_key(name)
    }

    /// Decodes the body as JSON.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| Error::InvalidRequest(format!("Invalid request body: {}", e)))
    }
}

/// State shared by every endpoint.
#[derive(Clone)]
pub struct EndpointContext {
    pub resolver: Resolver,
    /// Style used when a request names none.
    pub default_style: String,
}

impl EndpointContext {
    pub fn new(resolver: Resolver, default_style: impl Into<String>) -> Self {
        Self {
            resolver,
            default_style: default_style.into(),
        }
    }

    pub fn host(&self) -> &dyn Host {
        self.resolver.host().as_ref()
    }

    pub fn style_id(&self, requested: Option<&str>) -> String {
        normalize_style_id(requested, &self.default_style)
    }

    /// Formats `items` using the request's `format`, `style`, and `locale`.
    pub async fn reply(&self, request: &Request, format: &Format, items: &[Item]) -> Result<Reply> {
        let style_id = self.style_id(request.param("style"));
        format_items(self.host(), items, format, &style_id, request.param("locale")).await
    }
}

/// One HTTP endpoint.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Path relative to the server prefix, without a leading slash.
    fn path(&self) -> &str;

    fn description(&self) -> &str;

    fn method(&self) -> Method {
        Method::Get
    }

    async fn handle(&self, request: &Request, ctx: &EndpointContext) -> Result<Reply>;
}

// ============ items ============

/// `GET items`: exactly one selector, checked in a fixed order.
pub struct ItemsEndpoint;

#[async_trait]
impl Endpoint for ItemsEndpoint {
    fn path(&self) -> &str {
        "items"
    }

    fn description(&self) -> &str {
        "Items by selection, collection, key, easy key, citation key, or all"
    }

    async fn handle(&self, request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        let format = Format::parse(request.param("format"))?;
        let resolver = &ctx.resolver;
        let items = if request.flag("selected") {
            ctx.host().selected_items().await?
        } else if let Some(name) = request.param("collection") {
            ctx.host().collection_items(name).await?
        } else if let Some(keys) = request.param("key") {
            resolver.find_many_by_key(keys).await?
        } else if let Some(keys) = request.param("easykey") {
            resolver.resolve_many(keys).await?
        } else if let Some(keys) = request
            .param("citekey")
            .or_else(|| request.param("betterbibtexkey"))
        {
            resolver.find_many_by_citation_key(keys).await?
        } else if request.flag("all") {
            ctx.host().all_items(ctx.host().user_library_id()).await?
        } else {
            return Err(Error::MissingParam("No param supplied!".to_string()));
        };
        ctx.reply(request, &format, &items).await
    }
}

// ============ search ============

pub struct SearchEndpoint;

#[async_trait]
impl Endpoint for SearchEndpoint {
    fn path(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Quick search over one library or all of them"
    }

    async fn handle(&self, request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        let q = request
            .param("q")
            .ok_or_else(|| Error::MissingParam("q param required.".to_string()))?;
        let format = Format::parse(request.param("format"))?;
        let mode = match request.param("method") {
            Some(method) => method.parse::<QuickSearchMode>()?,
            None => QuickSearchMode::default(),
        };
        let library_id = match request.param("library") {
            None | Some("all") => None,
            Some(lib) => Some(lib.parse::<i64>().map_err(|_| {
                Error::InvalidRequest(format!("library must be a number or all: {}", lib))
            })?),
        };
        let items = ctx.resolver.search(q, mode, library_id).await?;
        ctx.reply(request, &format, &items).await
    }
}

// ============ complete ============

pub struct CompleteEndpoint;

#[async_trait]
impl Endpoint for CompleteEndpoint {
    fn path(&self) -> &str {
        "complete"
    }

    fn description(&self) -> &str {
        "Complete a partial easy key or citation key"
    }

    async fn handle(&self, request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        if let Some(partial) = request.param("easykey") {
            let items = ctx.resolver.complete_easy_key(partial).await?;
            format_items(ctx.host(), &items, &Format::EasyKey, "", None).await
        } else if let Some(prefix) = request.param("prefix") {
            Reply::json(&ctx.resolver.complete_citation_key(prefix).await?)
        } else {
            Err(Error::MissingParam(
                "Option easykey or prefix is required.".to_string(),
            ))
        }
    }
}

// ============ bibliography ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BibliographyRequest {
    style_id: Option<String>,
    locale: Option<String>,
    citation_groups: Vec<CitationGroupRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationGroupRequest {
    citation_items: Vec<Map<String, Value>>,
    #[serde(default)]
    properties: Value,
}

/// `POST bibliography`: resolves every citation item, then asks the host to
/// render the clusters and the bibliography.
pub struct BibliographyEndpoint;

impl BibliographyEndpoint {
    async fn citation_item(
        ctx: &EndpointContext,
        mut fields: Map<String, Value>,
    ) -> Result<CitationItem> {
        let as_key = |value: Value| match value {
            Value::String(s) => Ok(s),
            other => Err(Error::InvalidRequest(format!(
                "citation key must be a string: {}",
                other
            ))),
        };
        let item = if let Some(key) = fields.remove("easyKey") {
            ctx.resolver.resolve(&as_key(key)?).await?
        } else if let Some(key) = fields.remove("citekey") {
            ctx.resolver.find_by_citation_key(&as_key(key)?).await?
        } else if let Some(key) = fields.remove("key") {
            ctx.resolver.find_by_key(&as_key(key)?).await?
        } else {
            return Err(Error::InvalidRequest(
                "citation item needs one of easyKey, citekey, or key".to_string(),
            ));
        };
        Ok(CitationItem {
            item,
            options: fields,
        })
    }
}

#[async_trait]
impl Endpoint for BibliographyEndpoint {
    fn path(&self) -> &str {
        "bibliography"
    }

    fn description(&self) -> &str {
        "Render citation clusters and a bibliography"
    }

    fn method(&self) -> Method {
        Method::Post
    }

    async fn handle(&self, request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        let body: BibliographyRequest = request.json_body()?;
        let style_id = ctx.style_id(body.style_id.as_deref());

        let mut groups = Vec::with_capacity(body.citation_groups.len());
        for group in body.citation_groups {
            let mut citation_items = Vec::with_capacity(group.citation_items.len());
            for fields in group.citation_items {
                citation_items.push(Self::citation_item(ctx, fields).await?);
            }
            groups.push(CitationGroup {
                citation_items,
                properties: group.properties,
            });
        }

        let document = ctx
            .host()
            .render_citations(&groups, &style_id, body.locale.as_deref())
            .await?;
        Reply::json(&document)
    }
}

// ============ select ============

pub struct SelectEndpoint;

#[async_trait]
impl Endpoint for SelectEndpoint {
    fn path(&self) -> &str {
        "select"
    }

    fn description(&self) -> &str {
        "Record an item as the current selection"
    }

    async fn handle(&self, request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        let item = if let Some(key) = request.param("easykey") {
            ctx.resolver.resolve(key).await?
        } else if let Some(key) = request.param("key") {
            ctx.resolver.find_by_key(key).await?
        } else if let Some(key) = request
            .param("citekey")
            .or_else(|| request.param("betterbibtexkey"))
        {
            ctx.resolver.find_by_citation_key(key).await?
        } else {
            return Err(Error::MissingParam("No param supplied!".to_string()));
        };
        ctx.host().select_item(&item).await?;
        Reply::json("success")
    }
}

// ============ version / styles / locales ============

pub struct VersionEndpoint;

#[async_trait]
impl Endpoint for VersionEndpoint {
    fn path(&self) -> &str {
        "version"
    }

    fn description(&self) -> &str {
        "Plugin and host versions"
    }

    async fn handle(&self, _request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        Reply::json(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "host": ctx.host().version(),
        }))
    }
}

pub struct StylesEndpoint;

#[async_trait]
impl Endpoint for StylesEndpoint {
    fn path(&self) -> &str {
        "styles"
    }

    fn description(&self) -> &str {
        "Installed citation styles"
    }

    async fn handle(&self, _request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        Reply::json(&ctx.host().styles().await?)
    }
}

pub struct LocalesEndpoint;

#[async_trait]
impl Endpoint for LocalesEndpoint {
    fn path(&self) -> &str {
        "locales"
    }

    fn description(&self) -> &str {
        "Available locales"
    }

    async fn handle(&self, _request: &Request, ctx: &EndpointContext) -> Result<Reply> {
        Reply::json(&ctx.host().locales().await?)
    }
}

// ============ registry ============

/// Path-keyed endpoint table.
pub struct EndpointRegistry {
    endpoints: Vec<Box<dyn Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
        }
    }

    /// A registry holding every built-in endpoint.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ItemsEndpoint));
        registry.register(Box::new(SearchEndpoint));
        registry.register(Box::new(CompleteEndpoint));
        registry.register(Box::new(BibliographyEndpoint));
        registry.register(Box::new(SelectEndpoint));
        registry.register(Box::new(VersionEndpoint));
        registry.register(Box::new(StylesEndpoint));
        registry.register(Box::new(LocalesEndpoint));
        registry
    }

    /// Registers an endpoint. A later registration for the same path wins.
    pub fn register(&mut self, endpoint: Box<dyn Endpoint>) {
        self.endpoints.retain(|e| e.path() != endpoint.path());
        self.endpoints.push(endpoint);
    }

    pub fn endpoints(&self) -> &[Box<dyn Endpoint>] {
        &self.endpoints
    }

    pub fn find(&self, path: &str) -> Option<&dyn Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.path() == path)
            .map(|e| e.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============ dispatcher ============

/// Runs endpoints and converts their errors into replies.
pub struct Api {
    registry: EndpointRegistry,
    ctx: EndpointContext,
}

impl Api {
    pub fn new(registry: EndpointRegistry, ctx: EndpointContext) -> Self {
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn context(&self) -> &EndpointContext {
        &self.ctx
    }

    /// Dispatches a request. Never fails: errors become `4xx`/`5xx` replies.
    pub async fn dispatch(&self, method: Method, path: &str, request: &Request) -> Reply {
        let path = path.trim_start_matches('/');
        let Some(endpoint) = self.registry.find(path) else {
            return Reply::text(404, format!("No endpoint {}", path));
        };
        if endpoint.method() != method {
            return Reply::text(405, format!("{} does not accept {}", path, method));
        }

        match endpoint.handle(request, &self.ctx).await {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_client_error() {
                    debug!(endpoint = path, kind = err.kind(), "{}", err);
                } else {
                    error!(endpoint = path, "{:#}", err);
                }
                Reply::from_error(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryHost, NewItem};
    use crate::resolver::ResolutionCache;
    use std::sync::Arc;

    fn api(host: Arc<MemoryHost>) -> Api {
        let resolver = Resolver::new(host, Arc::new(ResolutionCache::new()));
        Api::new(
            EndpointRegistry::with_builtins(),
            EndpointContext::new(resolver, "chicago-note-bibliography"),
        )
    }

    #[test]
    fn test_builtin_registry() {
        let registry = EndpointRegistry::with_builtins();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.find("bibliography").unwrap().method(), Method::Post);
        assert!(registry.find("tools").is_none());
    }

    #[test]
    fn test_every_builtin_is_described() {
        let registry = EndpointRegistry::with_builtins();
        assert!(registry.endpoints().iter().all(|e| !e.description().is_empty()));
        assert_eq!(
            registry.find("select").unwrap().description(),
            "Record an item as the current selection"
        );
    }

    #[test]
    fn test_request_param_and_flag() {
        let request = Request::new().with_param("all", "").with_param("q", "doe");
        assert!(request.flag("all"));
        assert_eq!(request.param("all"), None);
        assert_eq!(request.param("q"), Some("doe"));
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let api = api(Arc::new(MemoryHost::new(1)));
        let reply = api.dispatch(Method::Get, "nope", &Request::new()).await;
        assert_eq!(reply.status, 404);
        let reply = api.dispatch(Method::Get, "bibliography", &Request::new()).await;
        assert_eq!(reply.status, 405);
    }

    #[tokio::test]
    async fn test_items_without_selector() {
        let api = api(Arc::new(MemoryHost::new(1)));
        let reply = api.dispatch(Method::Get, "items", &Request::new()).await;
        assert_eq!(reply.status, 400);
        assert_eq!(reply.body, "No param supplied!");
    }

    #[tokio::test]
    async fn test_select_records_selection() {
        let host = Arc::new(MemoryHost::new(1));
        let item = host.add(NewItem::regular(1).key("ZBZQ4KMP"));
        let api = api(host.clone());
        let reply = api
            .dispatch(Method::Get, "select", &Request::new().with_param("key", "1_ZBZQ4KMP"))
            .await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "\"success\"");
        assert_eq!(host.selected_items().await.unwrap(), vec![item]);
    }

    #[tokio::test]
    async fn test_invalid_bibliography_body() {
        let api = api(Arc::new(MemoryHost::new(1)));
        let request = Request::new().with_body("{not json");
        let reply = api.dispatch(Method::Post, "/bibliography", &request).await;
        assert_eq!(reply.status, 400);
        assert!(reply.body.starts_with("Invalid request body"));
    }
}
