//! Route registry and per-request dispatch.
//!
//! [`Router::setup`] consumes a method → path → [`Endpoint`] table once and
//! freezes it. From then on the router is read-only and shared across every
//! connection without locking.
//!
//! Each registered route is served by the same wrapper:
//!
//! ```text
//! HSTS (TLS only) → Matcher ─no──▶ 400 "route does not match", error log
//!                      │yes
//!                      ▼
//!        InstrumentedWriter + CORS/security headers
//!                      ▼
//!                  handler(req) → write response → info log
//! ```
//!
//! Routing, matchers and path parameters all work on the percent-decoded
//! path, so `/items/%34%32` is `/items/42`. Request bodies are read up to a
//! limit ([`DEFAULT_BODY_LIMIT`] unless set with [`Router::body_limit`]);
//! anything longer is answered with `413`.
//!
//! `OPTIONS` is never registered by callers. One `OPTIONS` route per distinct
//! path is synthesised from the registered methods. Unknown paths get `404`,
//! known paths under the wrong method `405`; both bypass the wrapper.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ALLOW, HeaderValue, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    X_XSS_PROTECTION,
};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::access_log::{self, Outcome};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::matcher::Matcher;
use crate::reply;
use crate::request::{Params, Request};
use crate::writer::{BufferedWriter, InstrumentedWriter, ResponseWriter};

const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept, X-Session-Token";
const HSTS: &str = "max-age=31536000; includeSubDomains";
const ROUTE_MISMATCH: &str = "route does not match";

/// Request bodies longer than this are refused with `413` unless the router
/// is configured otherwise.
pub const DEFAULT_BODY_LIMIT: usize = 1 << 20;

// ── Registration input ────────────────────────────────────────────────────────

/// A handler plus the per-segment patterns its requests must satisfy.
pub struct Endpoint {
    handler: BoxedHandler,
    matcher: Matcher,
}

impl Endpoint {
    /// An endpoint with no path constraint.
    pub fn new<H, A>(handler: H) -> Self
    where
        H: Handler<A>,
    {
        Self { handler: handler.into_boxed_handler(), matcher: Matcher::any() }
    }

    /// Constrains the path segments after the route's leading segment.
    /// See [`Matcher`] for the rules.
    pub fn with_matcher<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.matcher = Matcher::new(patterns);
        self
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint").field("matcher", &self.matcher).finish_non_exhaustive()
    }
}

/// The route table handed to [`Router::setup`].
///
/// Built either fluently with [`Routes::on`], which keeps registration order,
/// or from a nested `HashMap<Method, HashMap<path, Endpoint>>`, whose order is
/// whatever the map yields.
///
/// Paths use `:name` for a single-segment parameter and `*name` for a
/// trailing catch-all; `{name}` / `{*name}` are accepted too.
#[derive(Debug, Default)]
pub struct Routes {
    entries: Vec<(Method, String, Endpoint)>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one method + path registration. Returns `self` for chaining.
    ///
    /// ```rust
    /// # use http::Method;
    /// # use tessera::{Endpoint, Request, Response, Routes};
    /// # async fn get_item(_: Request) -> Response { Response::text("") }
    /// # async fn put_item(_: Request) -> Response { Response::text("") }
    /// Routes::new()
    ///     .on(Method::GET, "/items/:id", Endpoint::new(get_item).with_matcher(["^[0-9]+$"]))
    ///     .on(Method::PUT, "/items/:id", Endpoint::new(put_item));
    /// ```
    pub fn on(mut self, method: Method, path: impl Into<String>, endpoint: Endpoint) -> Self {
        self.entries.push((method, path.into(), endpoint));
        self
    }
}

impl<S: Into<String>> From<HashMap<Method, HashMap<S, Endpoint>>> for Routes {
    fn from(map: HashMap<Method, HashMap<S, Endpoint>>) -> Self {
        let entries = map
            .into_iter()
            .flat_map(|(method, paths)| {
                paths.into_iter().map(move |(path, ep)| (method.clone(), path.into(), ep))
            })
            .collect();
        Self { entries }
    }
}

// ── Frozen table ──────────────────────────────────────────────────────────────

/// Everything the wrapper for one method + path needs, captured at setup.
struct Route {
    method: Method,
    pattern: String,
    matcher: Matcher,
    handler: BoxedHandler,
    allow_methods: HeaderValue,
}

/// The synthesised `OPTIONS` answer for one path.
struct Preflight {
    pattern: String,
    allow_methods: HeaderValue,
}

/// The application router.
///
/// Build it once with [`Router::setup`]; pass it to
/// [`Server::serve`](crate::Server::serve), or call [`Router::dispatch`]
/// directly.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
    preflight: MatchitRouter<Arc<Preflight>>,
    options_mapping: HashMap<String, Vec<Method>>,
    secure: bool,
    body_limit: usize,
}

impl Router {
    /// Builds the frozen handler table.
    ///
    /// Fails when a route is registered under `OPTIONS`, when two routes
    /// collide, or when a path is not valid router syntax.
    pub fn setup(routes: impl Into<Routes>) -> Result<Self, Error> {
        let entries = routes.into().entries;

        // path → methods, in registration order
        let mut paths: Vec<&str> = Vec::new();
        let mut options_mapping: HashMap<String, Vec<Method>> = HashMap::new();
        for (method, path, _) in &entries {
            if *method == Method::OPTIONS {
                return Err(Error::Route(format!(
                    "`OPTIONS {path}`: OPTIONS routes are synthesised and cannot be registered"
                )));
            }
            let methods = options_mapping.entry(path.clone()).or_insert_with(|| {
                paths.push(path);
                Vec::new()
            });
            if !methods.contains(method) {
                methods.push(method.clone());
            }
        }

        let mut allow: HashMap<&str, HeaderValue> = HashMap::new();
        for (path, methods) in &options_mapping {
            allow.insert(path.as_str(), allow_methods_header(methods)?);
        }

        let mut table: HashMap<Method, MatchitRouter<Arc<Route>>> = HashMap::new();
        for (method, path, endpoint) in &entries {
            let matchers = endpoint.matcher.sources().collect::<Vec<_>>().join(",");
            for (pattern, reason) in endpoint.matcher.invalid() {
                warn!(
                    source = "rest",
                    method = %method,
                    route = path.as_str(),
                    pattern,
                    error = reason,
                    "matcher pattern does not compile, route will reject every request"
                );
            }

            let route = Arc::new(Route {
                method: method.clone(),
                pattern: path.clone(),
                matcher: endpoint.matcher.clone(),
                handler: Arc::clone(&endpoint.handler),
                allow_methods: allow[path.as_str()].clone(),
            });
            table
                .entry(method.clone())
                .or_default()
                .insert(to_router_syntax(path), route)
                .map_err(|e| Error::Route(format!("invalid route `{method} {path}`: {e}")))?;

            access_log::route_added(method.as_str(), path, &matchers);
        }

        let mut preflight = MatchitRouter::new();
        for path in paths {
            let entry = Arc::new(Preflight {
                pattern: path.to_owned(),
                allow_methods: allow[path].clone(),
            });
            preflight
                .insert(to_router_syntax(path), entry)
                .map_err(|e| Error::Route(format!("invalid route `{path}`: {e}")))?;

            access_log::route_added(Method::OPTIONS.as_str(), path, "");
        }

        Ok(Self {
            routes: table,
            preflight,
            options_mapping,
            secure: false,
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    /// Marks the router as served over TLS, which adds
    /// `Strict-Transport-Security` to every routed response. The server sets
    /// this itself when TLS material is configured.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Largest request body, in bytes, read before a handler runs.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Methods registered for `path` (as registered, e.g. `/items/:id`),
    /// excluding the synthesised `OPTIONS`.
    pub fn allowed_methods(&self, path: &str) -> Option<&[Method]> {
        self.options_mapping.get(path).map(Vec::as_slice)
    }

    /// Routes one request and produces one response. Never fails: every
    /// outcome, including unreadable bodies, becomes an HTTP response.
    pub async fn dispatch<B>(
        &self,
        req: http::Request<B>,
        remote: SocketAddr,
    ) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let started = Instant::now();
        let path = decode_path(req.uri().path());

        if *req.method() == Method::OPTIONS {
            if let Ok(matched) = self.preflight.at(&path) {
                let preflight = Arc::clone(matched.value);
                return self.serve_preflight(&preflight, &req, remote, started);
            }
            return fallback(&req, remote, started, None);
        }

        let found = self
            .routes
            .get(req.method())
            .and_then(|tree| tree.at(&path).ok())
            .map(|m| (Arc::clone(m.value), m.params.iter().collect::<Params>()));

        match found {
            Some((route, params)) => {
                self.serve_route(&route, req, &path, params, remote, started).await
            }
            None => {
                let allow = self.preflight.at(&path).ok().map(|m| m.value.allow_methods.clone());
                fallback(&req, remote, started, allow)
            }
        }
    }

    async fn serve_route<B>(
        &self,
        route: &Route,
        req: http::Request<B>,
        path: &str,
        params: Params,
        remote: SocketAddr,
        started: Instant,
    ) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let uri = request_uri(&req);
        let mut sink = BufferedWriter::new();
        self.write_hsts(&mut sink);

        if !route.matcher.matches(path) {
            reply::bad_request(ROUTE_MISMATCH).write_to(&mut sink);
            route.outcome(&uri, remote, StatusCode::BAD_REQUEST.as_u16(), 0, started, true).log();
            return sink.into_response();
        }

        let mut w = InstrumentedWriter::new(sink);
        write_headers(&mut w, &route.allow_methods);

        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let rejection = if e.downcast_ref::<LengthLimitError>().is_some() {
                    reply::error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        &format!("request body exceeds {} bytes", self.body_limit),
                    )
                } else {
                    debug!(source = "rest", route = route.pattern.as_str(), error = %e, "request body read failed");
                    reply::bad_request("unreadable request body")
                };
                rejection.write_to(&mut w);
                route.outcome(&uri, remote, w.status(), w.size(), started, true).log();
                return w.into_inner().into_response();
            }
        };

        let response = route.handler.call(Request::new(parts, body, remote), params).await;
        response.write_to(&mut w);

        route.outcome(&uri, remote, w.status(), w.size(), started, false).log();
        w.into_inner().into_response()
    }

    fn serve_preflight<B>(
        &self,
        preflight: &Preflight,
        req: &http::Request<B>,
        remote: SocketAddr,
        started: Instant,
    ) -> http::Response<Full<Bytes>> {
        let mut sink = BufferedWriter::new();
        self.write_hsts(&mut sink);

        let mut w = InstrumentedWriter::new(sink);
        write_headers(&mut w, &preflight.allow_methods);
        w.write_header(StatusCode::OK);

        let uri = request_uri(req);
        Outcome {
            method: Method::OPTIONS.as_str(),
            route: &preflight.pattern,
            uri: &uri,
            remote,
            status: w.status(),
            size: w.size(),
            elapsed: started.elapsed(),
            failed: false,
        }
        .log();
        w.into_inner().into_response()
    }

    fn write_hsts(&self, w: &mut impl ResponseWriter) {
        if self.secure {
            w.headers_mut().append(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("options_mapping", &self.options_mapping)
            .field("secure", &self.secure)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

impl Route {
    fn outcome<'a>(
        &'a self,
        uri: &'a str,
        remote: SocketAddr,
        status: u16,
        size: usize,
        started: Instant,
        failed: bool,
    ) -> Outcome<'a> {
        Outcome {
            method: self.method.as_str(),
            route: &self.pattern,
            uri,
            remote,
            status,
            size,
            elapsed: started.elapsed(),
            failed,
        }
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

/// 404 when nothing is registered at the path, 405 (with `Allow`) when other
/// methods are. Logged with the raw URI as route.
fn fallback<B>(
    req: &http::Request<B>,
    remote: SocketAddr,
    started: Instant,
    allow: Option<HeaderValue>,
) -> http::Response<Full<Bytes>> {
    let mut sink = BufferedWriter::new();
    let status = match allow {
        Some(allow) => {
            sink.headers_mut().insert(ALLOW, allow);
            reply::not_allowed().write_to(&mut sink)
        }
        None => reply::not_found().write_to(&mut sink),
    };

    let uri = request_uri(req);
    Outcome {
        method: req.method().as_str(),
        route: &uri,
        uri: &uri,
        remote,
        status: status.as_u16(),
        size: 0,
        elapsed: started.elapsed(),
        failed: false,
    }
    .log();
    sink.into_response()
}

fn write_headers(w: &mut impl ResponseWriter, allow_methods: &HeaderValue) {
    let headers = w.headers_mut();
    headers.append(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.append(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.append(ACCESS_CONTROL_ALLOW_METHODS, allow_methods.clone());
    headers.append(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.append(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.append(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
}

fn allow_methods_header(methods: &[Method]) -> Result<HeaderValue, Error> {
    let joined = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    HeaderValue::try_from(format!("OPTIONS, {joined}"))
        .map_err(|e| Error::Route(format!("invalid method name in `{joined}`: {e}")))
}

/// The request target as sent: path plus query.
fn request_uri<B>(req: &http::Request<B>) -> String {
    req.uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_owned(), |pq| pq.as_str().to_owned())
}

/// Percent-decodes a request path. Invalid UTF-8 is replaced, not rejected.
fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// `/users/:id/*rest` → `/users/{id}/{*rest}`. Braced segments pass through.
fn to_router_syntax(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
