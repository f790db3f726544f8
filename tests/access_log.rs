use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use serde_json::Value;
use tessera::{ApiError, Endpoint, Request, Response, Router, Routes, reply};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for JSON log lines.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Capture {
    fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn records(&self) -> Vec<Value> {
        let raw = self.0.lock().unwrap();
        String::from_utf8_lossy(&raw)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn with_message(&self, message: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["fields"]["message"] == message)
            .collect()
    }
}

fn remote() -> SocketAddr {
    "192.0.2.1:4000".parse().unwrap()
}

fn request(method: Method, uri: &str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn get_item(req: Request) -> Response {
    let id = req.param("id").unwrap_or_default();
    Response::builder().status(StatusCode::ACCEPTED).text(format!("item {id}"))
}

async fn broken(_req: Request) -> ApiError {
    ApiError::other("cache exploded")
}

fn router() -> Router {
    Router::setup(
        Routes::new()
            .on(Method::GET, "/items/:id", Endpoint::new(get_item).with_matcher(["^[0-9]+$"]))
            .on(Method::GET, "/broken", Endpoint::new(broken)),
    )
    .unwrap()
}

#[tokio::test]
async fn matched_request_logs_info_hit() {
    let capture = Capture::default();
    let _guard = capture.install();

    let res = router().dispatch(request(Method::GET, "/items/42?verbose=1"), remote()).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let hits = capture.with_message("hit");
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit["level"], "INFO");
    assert_eq!(hit["fields"]["source"], "rest");
    assert_eq!(hit["fields"]["method"], "GET");
    assert_eq!(hit["fields"]["route"], "/items/:id");
    assert_eq!(hit["fields"]["uri"], "/items/42?verbose=1");
    assert_eq!(hit["fields"]["remote"], "192.0.2.1:4000");
    assert_eq!(hit["fields"]["code"], 202);
    assert_eq!(hit["fields"]["size"], "item 42".len());
    assert!(hit["fields"]["duration_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn rejected_request_logs_error_hit() {
    let capture = Capture::default();
    let _guard = capture.install();

    let res = router().dispatch(request(Method::GET, "/items/abc"), remote()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let hits = capture.with_message("hit");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["level"], "ERROR");
    assert_eq!(hits[0]["fields"]["route"], "/items/:id");
    assert_eq!(hits[0]["fields"]["code"], 400);
    assert_eq!(hits[0]["fields"]["size"], 0);
}

#[tokio::test]
async fn oversized_body_logs_error_hit() {
    let capture = Capture::default();
    let _guard = capture.install();

    let req = http::Request::builder()
        .method(Method::GET)
        .uri("/items/42")
        .body(Full::new(Bytes::from(vec![b'x'; 64])))
        .unwrap();
    let res = router().body_limit(16).dispatch(req, remote()).await;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let hits = capture.with_message("hit");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["level"], "ERROR");
    assert_eq!(hits[0]["fields"]["code"], 413);
}

#[tokio::test]
async fn fallbacks_and_options_are_logged() {
    let capture = Capture::default();
    let _guard = capture.install();
    let router = router();

    router.dispatch(request(Method::GET, "/missing"), remote()).await;
    router.dispatch(request(Method::POST, "/broken"), remote()).await;
    router.dispatch(request(Method::OPTIONS, "/items/7"), remote()).await;

    let hits = capture.with_message("hit");
    let codes: Vec<_> = hits.iter().map(|h| h["fields"]["code"].as_u64().unwrap()).collect();
    assert_eq!(codes, [404, 405, 200]);
    assert_eq!(hits[0]["fields"]["route"], "/missing");
    assert_eq!(hits[2]["fields"]["method"], "OPTIONS");
    assert_eq!(hits[2]["fields"]["route"], "/items/:id");
    assert!(hits.iter().all(|h| h["level"] == "INFO"));
}

#[tokio::test]
async fn unrecognized_error_is_logged_distinctly() {
    let capture = Capture::default();
    let _guard = capture.install();

    let res = router().dispatch(request(Method::GET, "/broken"), remote()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let records = capture.with_message("unrecognized handler error");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["level"], "ERROR");
    assert_eq!(records[0]["fields"]["error"], "cache exploded");

    // The dispatch itself still completed normally.
    let hits = capture.with_message("hit");
    assert_eq!(hits[0]["level"], "INFO");
    assert_eq!(hits[0]["fields"]["code"], 500);
}

#[test]
fn registration_logs_every_route_once() {
    let capture = Capture::default();
    let _guard = capture.install();

    router();

    let added = capture.with_message("HTTP route added");
    let mut seen: Vec<(String, String)> = added
        .iter()
        .map(|r| {
            (
                r["fields"]["method"].as_str().unwrap().to_owned(),
                r["fields"]["route"].as_str().unwrap().to_owned(),
            )
        })
        .collect();
    seen.sort();
    assert_eq!(
        seen,
        [
            ("GET".to_owned(), "/broken".to_owned()),
            ("GET".to_owned(), "/items/:id".to_owned()),
            ("OPTIONS".to_owned(), "/broken".to_owned()),
            ("OPTIONS".to_owned(), "/items/:id".to_owned()),
        ]
    );
    let items = added.iter().find(|r| r["fields"]["route"] == "/items/:id").unwrap();
    assert_eq!(items["fields"]["matchers"], "^[0-9]+$");
}

#[test]
fn invalid_pattern_warns_at_registration() {
    let capture = Capture::default();
    let _guard = capture.install();

    Router::setup(
        Routes::new().on(Method::GET, "/x/:id", Endpoint::new(|_req: Request| async { reply::not_found() }).with_matcher(["[z-a]"])),
    )
    .unwrap();

    let warnings: Vec<_> = capture.records().into_iter().filter(|r| r["level"] == "WARN").collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["fields"]["pattern"], "[z-a]");
}
