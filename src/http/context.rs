//! Per-request correlation context.
//!
//! # Responsibilities
//! - Propagate `x-correlation-id` or mint a new one, and echo it back
//! - Derive the caller identity (`role/name`) from the client certificate
//! - Make both available to inner layers and to service handlers
//!
//! Callers without a client certificate are `guest/<peer-ip>`.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;
use uuid::Uuid;

use crate::net::acceptor::PeerCertificates;
use crate::net::tls::CertificateInfo;

/// Header carrying the correlation identifier.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Role assigned to callers without a client certificate.
pub const GUEST_ROLE: &str = "guest";

const MAX_CORRELATION_ID_LEN: usize = 64;

/// Maps a verified client certificate to a caller identity.
pub type IdentityMapper = Arc<dyn Fn(&CertificateInfo) -> Identity + Send + Sync>;

/// Who is calling: a role and a name within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    role: String,
    name: String,
}

impl Identity {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn guest(name: impl Into<String>) -> Self {
        Self::new(GUEST_ROLE, name)
    }

    /// Default certificate mapping: the organizational unit is the role,
    /// the common name is the name. Without an OU the name doubles as role.
    pub fn from_certificate(info: &CertificateInfo) -> Self {
        let name = info
            .common_name
            .clone()
            .unwrap_or_else(|| info.subject.clone());
        let role = info
            .organizational_unit
            .clone()
            .unwrap_or_else(|| name.clone());
        Self::new(role, name)
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_guest(&self) -> bool {
        self.role == GUEST_ROLE
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.name)
    }
}

/// Correlation identifier and caller identity for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    correlation_id: String,
    identity: Identity,
}

impl RequestContext {
    pub fn new(identity: Identity, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            identity,
        }
    }

    /// Process-level context used for work not tied to a request.
    pub fn for_role(role: &str, name: &str) -> Self {
        Self::new(Identity::new(role, name), new_correlation_id())
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Generate a fresh correlation identifier.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Accessors for the context attached by [`context_middleware`].
pub trait RequestContextExt {
    fn request_context(&self) -> Option<&RequestContext>;

    fn correlation_id(&self) -> Option<&str> {
        self.request_context().map(RequestContext::correlation_id)
    }
}

impl<B> RequestContextExt for Request<B> {
    fn request_context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }
}

/// Role of the caller, as resolved by the context layer.
pub fn role_from_request(req: &Request<Body>) -> String {
    req.request_context()
        .map_or_else(|| GUEST_ROLE.to_string(), |ctx| ctx.identity().role().to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::new(Identity::guest("unknown"), new_correlation_id())))
    }
}

/// State for [`context_middleware`].
#[derive(Clone)]
pub struct ContextLayer {
    mapper: IdentityMapper,
    dispatch: Dispatch,
}

impl ContextLayer {
    pub fn new(mapper: IdentityMapper, dispatch: Dispatch) -> Self {
        Self { mapper, dispatch }
    }

    fn identify<B>(&self, req: &Request<B>) -> Identity {
        let leaf = req
            .extensions()
            .get::<PeerCertificates>()
            .and_then(PeerCertificates::leaf);

        if let Some(der) = leaf {
            match CertificateInfo::from_der(der) {
                Ok(info) => return (self.mapper)(&info),
                Err(e) => tracing::debug!(error = %e, "Unparsable client certificate"),
            }
        }

        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
        Identity::guest(peer)
    }
}

fn incoming_correlation_id<B>(req: &Request<B>) -> Option<String> {
    let value = req.headers().get(X_CORRELATION_ID)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.chars().take(MAX_CORRELATION_ID_LEN).collect())
}

/// Outermost pipeline layer: resolve the context, run the rest of the
/// pipeline under the injected dispatcher, echo the correlation id.
pub async fn context_middleware(
    State(layer): State<ContextLayer>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let correlation_id = incoming_correlation_id(&req).unwrap_or_else(new_correlation_id);
    let identity = layer.identify(&req);
    req.extensions_mut()
        .insert(RequestContext::new(identity, correlation_id.clone()));

    let mut response = next.run(req).with_subscriber(layer.dispatch.clone()).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(X_CORRELATION_ID, value);
    }
    response
}
