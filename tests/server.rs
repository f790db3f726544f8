use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tessera::{Endpoint, Request, Response, Router, Routes, Server, TlsConfig};
use tokio::net::TcpListener;

async fn hello(req: Request) -> Response {
    Response::text(format!("hello {}", req.param("name").unwrap_or("?")))
}

async fn slow(_req: Request) -> &'static str {
    tokio::time::sleep(Duration::from_millis(300)).await;
    "done"
}

fn router() -> Router {
    Router::setup(
        Routes::new()
            .on(Method::GET, "/hello/:name", Endpoint::new(hello).with_matcher(["^[a-z]+$"]))
            .on(Method::GET, "/slow", Endpoint::new(slow)),
    )
    .unwrap()
}

#[tokio::test]
async fn serves_over_tcp_and_drains_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Server::bind("127.0.0.1:0");
    let handle = server.shutdown_handle();
    let serving = tokio::spawn(server.serve_listener(listener, router(), std::future::pending()));

    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

    let res = client
        .get(format!("http://{addr}/hello/world").parse().unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello world");

    let res = client
        .get(format!("http://{addr}/hello/W0rld").parse().unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // A request still running when shutdown starts must complete.
    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move {
            let res = client.get(format!("http://{addr}/slow").parse().unwrap()).await.unwrap();
            let status = res.status();
            let body = res.into_body().collect().await.unwrap().to_bytes();
            (status, body)
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown did not finish draining");

    let (status, body) = in_flight.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"done");

    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn invalid_listen_address_fails_startup() {
    let err = Server::bind("not-an-address")
        .serve_with_shutdown(router(), async {})
        .await
        .unwrap_err();
    assert!(matches!(err, tessera::Error::Config(_)));
}

#[tokio::test]
async fn bad_tls_material_fails_startup() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = Server::bind("127.0.0.1:0")
        .tls(TlsConfig::new(b"nope".to_vec(), b"nope".to_vec()))
        .serve_listener(listener, router(), std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, tessera::Error::Tls(_)));
}

#[tokio::test]
async fn shutdown_handle_resolves_after_failed_start() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::bind("127.0.0.1:0").tls(TlsConfig::new(b"x".to_vec(), b"x".to_vec()));
    let handle = server.shutdown_handle();

    assert!(server.serve_listener(listener, router(), std::future::pending()).await.is_err());
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown hung after a failed start");

    let server = Server::bind("not-an-address");
    let handle = server.shutdown_handle();
    assert!(server.serve_with_shutdown(router(), std::future::pending()).await.is_err());
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown hung after a bad listen address");
}

#[tokio::test]
async fn shutdown_handle_resolves_when_server_is_dropped_unserved() {
    let server = Server::bind("127.0.0.1:0");
    let handle = server.shutdown_handle();
    drop(server);

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown hung for a server that never ran");
}

#[tokio::test]
async fn config_body_limit_reaches_the_router() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = tessera::ServerConfig { max_body_bytes: 4, ..Default::default() };
    let server = Server::from_config(&config).unwrap();
    let handle = server.shutdown_handle();
    let serving = tokio::spawn(server.serve_listener(listener, router(), std::future::pending()));

    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let req = http::Request::builder()
        .method(Method::GET)
        .uri(format!("http://{addr}/slow"))
        .body(Full::new(Bytes::from_static(b"too long")))
        .unwrap();
    let res = client.request(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await.unwrap();
    serving.await.unwrap().unwrap();
}
