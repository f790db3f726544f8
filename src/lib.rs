//! # tessera
//!
//! Route registration and dispatch for JSON HTTP APIs.
//!
//! You hand tessera a table of method → path → [`Endpoint`]. It freezes the
//! table and wraps every handler with the same cross-cutting behaviour:
//!
//! - CORS and security headers on every routed response, HSTS under TLS
//! - per-segment path validation with regular expressions ([`Matcher`])
//! - status and byte-count capture ([`writer::InstrumentedWriter`])
//! - one structured access-log record per request ([`access_log`])
//! - synthesised `OPTIONS` answers, `404` and `405` with JSON envelopes
//!
//! Handler failures are a closed set ([`ApiError`]) normalised to statuses
//! and a uniform JSON error body by [`reply`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use tessera::{ApiError, Endpoint, Request, Response, Router, Routes, Server, reply};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tessera::Error> {
//!     let router = Router::setup(
//!         Routes::new()
//!             .on(Method::GET,  "/items/:id", Endpoint::new(get_item).with_matcher(["^[0-9]+$"]))
//!             .on(Method::POST, "/items",     Endpoint::new(create_item)),
//!     )?;
//!
//!     Server::bind("0.0.0.0:3000").serve(router).await
//! }
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Item { id: u64, name: String }
//!
//! async fn get_item(req: Request) -> Response {
//!     match req.param("id").and_then(|id| id.parse::<u64>().ok()) {
//!         Some(42) => reply::respond(Some(&Item { id: 42, name: "lamp".into() }), None, StatusCode::OK, None),
//!         _ => reply::error(ApiError::NotFound),
//!     }
//! }
//!
//! async fn create_item(req: Request) -> Response {
//!     let Ok(item) = req.json::<Item>() else {
//!         return reply::bad_request("body is not an item");
//!     };
//!     let location = reply::location(&["/items", &item.id.to_string()]);
//!     reply::respond(Some(&item), None, StatusCode::CREATED, Some(&location))
//! }
//! ```

mod error;
mod handler;
mod matcher;
mod request;
mod response;
mod router;
mod server;

pub mod access_log;
pub mod config;
pub mod logging;
pub mod reply;
pub mod tls;
pub mod writer;

pub use config::ServerConfig;
pub use error::{ApiError, Error};
pub use handler::Handler;
pub use matcher::Matcher;
pub use request::{Params, Request};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{DEFAULT_BODY_LIMIT, Endpoint, Router, Routes};
pub use server::{Server, ShutdownHandle};
pub use tls::TlsConfig;
