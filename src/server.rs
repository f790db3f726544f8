//! HTTP(S) server and graceful shutdown.
//!
//! The server owns the listener and hands every request to
//! [`Router::dispatch`]. It never inspects requests itself.
//!
//! # Shutdown
//!
//! On SIGTERM / Ctrl-C (or a custom signal, or [`ShutdownHandle::shutdown`]):
//! 1. The listener is dropped; no new connections are accepted.
//! 2. Every open connection is told to finish its in-flight request and close.
//!    Idle keep-alive connections close immediately.
//! 3. [`Server::serve`] returns once all of them are gone.
//!
//! There is no built-in deadline; bound the wait from the outside, e.g. with
//! `tokio::time::timeout(config.shutdown_timeout(), handle.shutdown())`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::config::{self, ServerConfig};
use crate::error::Error;
use crate::router::Router;
use crate::tls::TlsConfig;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: String,
    tls: Option<TlsConfig>,
    body_limit: Option<usize>,
    shutdown: Arc<ShutdownState>,
}

#[derive(Debug)]
struct ShutdownState {
    trigger: Notify,
    done: watch::Sender<bool>,
}

/// Stops a running [`Server`] from another task.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
}

impl ShutdownHandle {
    /// Asks the server to stop accepting and resolves once every in-flight
    /// request has finished. Safe to call before the server starts; it will
    /// stop right after binding. Also resolves when serving failed to start
    /// or the [`Server`] was dropped without serving.
    pub async fn shutdown(&self) {
        self.state.trigger.notify_one();
        let mut done = self.state.done.subscribe();
        let _ = done.wait_for(|stopped| *stopped).await;
    }
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when served.
    /// The address is parsed when serving starts.
    ///
    /// ```rust
    /// use tessera::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self {
            addr: addr.to_owned(),
            tls: None,
            body_limit: None,
            shutdown: Arc::new(ShutdownState {
                trigger: Notify::new(),
                done: watch::channel(false).0,
            }),
        }
    }

    /// Builds a server from configuration, reading TLS material from disk.
    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        let mut server = Self::bind(&config.listen).body_limit(config.max_body_bytes);
        if let Some(files) = &config.tls {
            server = server.tls(files.load()?);
        }
        Ok(server)
    }

    /// Serves HTTPS with the given material instead of plain HTTP.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Overrides the router's request body limit for everything this server
    /// dispatches.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { state: Arc::clone(&self.shutdown) }
    }

    /// Serves until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = config::parse_listen(&self.addr)?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, router, signal).await
    }

    /// Serves on an already-bound listener until `signal` resolves.
    ///
    /// TLS material is validated before the first connection is accepted;
    /// a bad certificate fails here rather than per connection.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let acceptor = match &self.tls {
            Some(tls) => Some(TlsAcceptor::from(tls.build()?)),
            None => None,
        };
        let local = listener.local_addr()?;
        let mut router = router.secure(acceptor.is_some());
        if let Some(limit) = self.body_limit {
            router = router.body_limit(limit);
        }
        let router = Arc::new(router);

        info!(source = "rest", addr = %local, tls = acceptor.is_some(), "listening");

        let (drain_tx, drain_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;

                () = &mut signal => break,
                () = self.shutdown.trigger.notified() => break,

                res = listener.accept() => {
                    let (stream, remote) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(source = "rest", error = %e, "accept failed");
                            continue;
                        }
                    };
                    tasks.spawn(serve_connection(
                        stream,
                        remote,
                        Arc::clone(&router),
                        acceptor.clone(),
                        drain_rx.clone(),
                    ));
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        info!(source = "rest", in_flight = tasks.len(), "shutting down, draining connections");
        let _ = drain_tx.send(true);
        while tasks.join_next().await.is_some() {}

        info!(source = "rest", "stopped");
        Ok(())
    }
}

impl Drop for Server {
    // Every exit path ends here: drained, failed to start, or never served.
    fn drop(&mut self) {
        self.shutdown.done.send_replace(true);
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    router: Arc<Router>,
    acceptor: Option<TlsAcceptor>,
    drain: watch::Receiver<bool>,
) {
    match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => drive(tls, remote, router, drain).await,
            Err(e) => warn!(source = "rest", peer = %remote, error = %e, "tls handshake failed"),
        },
        None => drive(stream, remote, router, drain).await,
    }
}

/// Runs HTTP/1.1 or HTTP/2 (whatever the client speaks) on one connection
/// until it closes or draining starts.
async fn drive<I>(io: I, remote: SocketAddr, router: Arc<Router>, mut drain: watch::Receiver<bool>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let svc = service_fn(move |req: hyper::Request<Incoming>| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(router.dispatch(req, remote).await) }
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(io), svc);
    tokio::pin!(conn);

    let draining = async {
        let _ = drain.wait_for(|d| *d).await;
    };

    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                warn!(source = "rest", peer = %remote, error = %e, "connection error");
            }
        }
        () = draining => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                warn!(source = "rest", peer = %remote, error = %e, "connection error while draining");
            }
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM (Unix) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
