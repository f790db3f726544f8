//! Endpoint handlers and their type erasure.
//!
//! A handler is an async function in one of two shapes:
//!
//! ```text
//! async fn get_item(req: Request) -> impl IntoResponse
//! async fn get_item(req: Request, params: Params) -> impl IntoResponse
//! ```
//!
//! The dispatcher always hands over the decoded path parameters separately
//! from the request. Single-argument handlers find them on the request
//! instead ([`Request::param`]).
//!
//! The route table stores every endpoint behind one `Arc<dyn ErasedHandler>`,
//! so the `Args` marker on [`Handler`] exists only to keep the two blanket
//! impls apart; it is resolved at registration and never seen again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::{Params, Request};
use crate::response::{IntoResponse, Response};

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, req: Request, params: Params) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Implemented for every function that can serve an [`Endpoint`](crate::Endpoint).
///
/// Sealed: only the shapes listed in the module docs qualify.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed<Args> {}
}

struct RequestOnly<F>(F);
struct WithParams<F>(F);

impl<F, Fut, R> private::Sealed<(Request,)> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
}

impl<F, Fut, R> Handler<(Request,)> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(RequestOnly(self))
    }
}

impl<F, Fut, R> ErasedHandler for RequestOnly<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, req: Request, params: Params) -> BoxFuture {
        let fut = (self.0)(req.with_params(params));
        Box::pin(async move { fut.await.into_response() })
    }
}

impl<F, Fut, R> private::Sealed<(Request, Params)> for F
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
}

impl<F, Fut, R> Handler<(Request, Params)> for F
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(WithParams(self))
    }
}

impl<F, Fut, R> ErasedHandler for WithParams<F>
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, req: Request, params: Params) -> BoxFuture {
        let fut = (self.0)(req.with_params(params.clone()), params);
        Box::pin(async move { fut.await.into_response() })
    }
}
