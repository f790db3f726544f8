//! Structured access logging.
//!
//! One record per dispatched request, emitted through `tracing`. Successful
//! dispatches log at `info`, rejected ones at `error`. Whatever subscriber is
//! installed decides where the record goes; a failing sink never reaches the
//! client.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{error, info};

/// What happened to one request, ready to be logged.
#[derive(Debug, Clone)]
pub struct Outcome<'a> {
    pub method: &'a str,
    /// The registered route pattern, or the raw URI when nothing matched.
    pub route: &'a str,
    pub uri: &'a str,
    pub remote: SocketAddr,
    /// Recorded status; `0` if the handler never wrote one.
    pub status: u16,
    pub size: usize,
    pub elapsed: Duration,
    pub failed: bool,
}

impl Outcome<'_> {
    pub fn log(&self) {
        let duration_ms = self.elapsed.as_secs_f64() * 1000.0;
        if self.failed {
            error!(
                source = "rest",
                method = self.method,
                route = self.route,
                uri = self.uri,
                remote = %self.remote,
                code = self.status,
                size = self.size,
                duration_ms,
                "hit"
            );
        } else {
            info!(
                source = "rest",
                method = self.method,
                route = self.route,
                uri = self.uri,
                remote = %self.remote,
                code = self.status,
                size = self.size,
                duration_ms,
                "hit"
            );
        }
    }
}

/// Logged once per installed route.
pub(crate) fn route_added(method: &str, route: &str, matchers: &str) {
    info!(source = "rest", method, route, matchers, "HTTP route added");
}
