//! Tower middleware that puts an [`AdmissionEngine`] in front of a service.
//!
//! The layer is transport-agnostic: an [`IdentityExtractor`] pulls the network
//! address and optional API token out of each request, and rejections surface
//! as [`GuardError::Rejected`]. Mapping that to a protocol status (for example
//! HTTP 429) is left to the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower_layer::Layer;
use tower_service::Service;

use crate::engine::AdmissionEngine;
use crate::error::GuardError;

/// Pulls the identifying values out of a request.
pub trait IdentityExtractor<Req>: Send + Sync {
    /// `(address, token)` for `req`. An empty or missing token means none.
    fn extract(&self, req: &Req) -> (String, Option<String>);
}

impl<Req, F> IdentityExtractor<Req> for F
where
    F: Fn(&Req) -> (String, Option<String>) + Send + Sync,
{
    fn extract(&self, req: &Req) -> (String, Option<String>) {
        self(req)
    }
}

/// A layer that enforces admission decisions using a shared [`AdmissionEngine`].
#[derive(Debug)]
pub struct AdmissionLayer<X> {
    engine: Arc<AdmissionEngine>,
    extractor: Arc<X>,
}

impl<X> Clone for AdmissionLayer<X> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone(), extractor: self.extractor.clone() }
    }
}

impl<X> AdmissionLayer<X> {
    /// Create a new admission layer.
    pub fn new(engine: Arc<AdmissionEngine>, extractor: X) -> Self {
        Self { engine, extractor: Arc::new(extractor) }
    }
}

impl<S, X> Layer<S> for AdmissionLayer<X> {
    type Service = AdmissionService<S, X>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService {
            inner: service,
            engine: self.engine.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

/// Middleware service that admits or rejects each request.
#[derive(Debug)]
pub struct AdmissionService<S, X> {
    inner: S,
    engine: Arc<AdmissionEngine>,
    extractor: Arc<X>,
}

impl<S: Clone, X> Clone for AdmissionService<S, X> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            engine: self.engine.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, X, Req> Service<Req> for AdmissionService<S, X>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    X: IdentityExtractor<Req> + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = GuardError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GuardError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let engine = self.engine.clone();
        // Take the readied service; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let (address, token) = self.extractor.extract(&req);

        Box::pin(async move {
            match engine.allow(&address, token.as_deref()).await {
                Ok(true) => inner.call(req).await.map_err(GuardError::Inner),
                Ok(false) => {
                    let identity = engine.resolve(&address, token.as_deref());
                    Err(GuardError::Rejected { identity: identity.id, kind: identity.kind })
                }
                Err(e) => Err(GuardError::Unavailable(e)),
            }
        })
    }
}
