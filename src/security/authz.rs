//! Authorization collaborator.
//!
//! # Responsibilities
//! - Define the [`Authz`] seam the pipeline wraps around dispatch
//! - Provide [`PathAuthz`], a path-prefix allow list keyed by role
//!
//! # Rules
//! ```text
//! allow          = ["/v1/admin:admin,ops"]  only the listed roles
//! allow_any      = ["/v1/status"]           every caller, guests included
//! allow_any_role = ["/v1/data"]             every caller with a certificate
//! ```
//! The longest matching prefix decides. Unmatched paths are rejected.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::config::AuthzConfig;
use crate::http::context::{RequestContextExt, GUEST_ROLE};
use crate::http::response::ApiError;

/// Extracts the caller's role from a request.
pub type RoleMapper = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;

/// Errors raised while building an authorization handler.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Invalid authorization rule '{0}': expected /path:role1,role2")]
    InvalidRule(String),

    #[error("No role mapper set")]
    NoRoleMapper,
}

/// Wraps dispatch with an authorization check.
pub trait Authz: Send + Sync {
    /// Set how the caller's role is extracted from a request.
    fn set_role_mapper(&self, mapper: RoleMapper);

    /// Wrap `inner` so unauthorized requests never reach it.
    fn new_handler(&self, inner: Router) -> Result<Router, AuthzError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Access {
    Any,
    AnyRole,
    Roles(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    access: Access,
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.trim_end_matches('/')) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn permits(&self, role: &str) -> bool {
        match &self.access {
            Access::Any => true,
            Access::AnyRole => role != GUEST_ROLE,
            Access::Roles(roles) => roles.contains(role),
        }
    }
}

fn parse_allow(entry: &str) -> Result<Rule, AuthzError> {
    let invalid = || AuthzError::InvalidRule(entry.to_string());
    let (prefix, roles) = entry.split_once(':').ok_or_else(invalid)?;
    if !prefix.starts_with('/') {
        return Err(invalid());
    }
    let roles: HashSet<String> = roles
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    if roles.is_empty() {
        return Err(invalid());
    }
    Ok(Rule {
        prefix: prefix.to_string(),
        access: Access::Roles(roles),
    })
}

fn parse_prefix(entry: &str, access: Access) -> Result<Rule, AuthzError> {
    if !entry.starts_with('/') {
        return Err(AuthzError::InvalidRule(entry.to_string()));
    }
    Ok(Rule {
        prefix: entry.to_string(),
        access,
    })
}

#[derive(Debug)]
struct RuleSet {
    // Longest prefix first.
    rules: Vec<Rule>,
}

impl RuleSet {
    fn from_config(config: &AuthzConfig) -> Result<Self, AuthzError> {
        let mut rules = Vec::new();
        for entry in &config.allow {
            rules.push(parse_allow(entry)?);
        }
        for entry in &config.allow_any {
            rules.push(parse_prefix(entry, Access::Any)?);
        }
        for entry in &config.allow_any_role {
            rules.push(parse_prefix(entry, Access::AnyRole)?);
        }
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { rules })
    }

    fn is_allowed(&self, path: &str, role: &str) -> bool {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .is_some_and(|rule| rule.permits(role))
    }
}

/// Path-prefix authorization built from `[authz]`.
pub struct PathAuthz {
    rules: Arc<RuleSet>,
    mapper: Mutex<Option<RoleMapper>>,
}

impl PathAuthz {
    pub fn new(config: &AuthzConfig) -> Result<Self, AuthzError> {
        Ok(Self {
            rules: Arc::new(RuleSet::from_config(config)?),
            mapper: Mutex::new(None),
        })
    }

    /// Whether `role` may call `path`.
    pub fn is_allowed(&self, path: &str, role: &str) -> bool {
        self.rules.is_allowed(path, role)
    }
}

impl std::fmt::Debug for PathAuthz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathAuthz").field("rules", &self.rules).finish()
    }
}

#[derive(Clone)]
struct Enforcer {
    rules: Arc<RuleSet>,
    mapper: RoleMapper,
}

impl Authz for PathAuthz {
    fn set_role_mapper(&self, mapper: RoleMapper) {
        *self.mapper.lock().unwrap_or_else(PoisonError::into_inner) = Some(mapper);
    }

    fn new_handler(&self, inner: Router) -> Result<Router, AuthzError> {
        let mapper = self
            .mapper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AuthzError::NoRoleMapper)?;
        let enforcer = Enforcer {
            rules: Arc::clone(&self.rules),
            mapper,
        };
        tracing::info!(rules = self.rules.rules.len(), "Path authorization enabled");
        Ok(inner.layer(from_fn_with_state(enforcer, enforce)))
    }
}

async fn enforce(State(enforcer): State<Enforcer>, req: Request<Body>, next: Next) -> Response {
    let role = (enforcer.mapper)(&req);
    if enforcer.rules.is_allowed(req.uri().path(), &role) {
        return next.run(req).await;
    }

    tracing::warn!(
        path = %req.uri().path(),
        role = %role,
        correlation_id = req.correlation_id().unwrap_or_default(),
        "Request not authorized"
    );
    ApiError::forbidden(format!("role '{role}' is not allowed to access {}", req.uri().path()))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    fn config() -> AuthzConfig {
        AuthzConfig {
            allow: vec!["/v1/admin:admin,ops".into(), "/v1/admin/audit:auditor".into()],
            allow_any: vec!["/v1/status".into()],
            allow_any_role: vec!["/v1/data".into()],
        }
    }

    #[test]
    fn longest_prefix_decides() {
        let authz = PathAuthz::new(&config()).unwrap();
        assert!(authz.is_allowed("/v1/admin/users", "ops"));
        assert!(!authz.is_allowed("/v1/admin/audit/log", "ops"));
        assert!(authz.is_allowed("/v1/admin/audit/log", "auditor"));
        assert!(!authz.is_allowed("/v1/administrator", "admin"));
    }

    #[test]
    fn open_and_certificate_only_paths() {
        let authz = PathAuthz::new(&config()).unwrap();
        assert!(authz.is_allowed("/v1/status/server", GUEST_ROLE));
        assert!(authz.is_allowed("/v1/data/x", "anyone"));
        assert!(!authz.is_allowed("/v1/data/x", GUEST_ROLE));
        assert!(!authz.is_allowed("/v1/unlisted", "admin"));
    }

    #[test]
    fn malformed_rules_rejected() {
        let mut bad = config();
        bad.allow.push("/v1/x".into());
        assert!(matches!(PathAuthz::new(&bad), Err(AuthzError::InvalidRule(_))));

        let mut bad = config();
        bad.allow_any.push("v1".into());
        assert!(PathAuthz::new(&bad).is_err());
    }

    #[test]
    fn handler_requires_role_mapper() {
        let authz = PathAuthz::new(&config()).unwrap();
        assert!(matches!(
            authz.new_handler(Router::new()),
            Err(AuthzError::NoRoleMapper)
        ));
    }

    #[tokio::test]
    async fn rejected_request_is_forbidden() {
        let authz = PathAuthz::new(&config()).unwrap();
        authz.set_role_mapper(Arc::new(|req: &Request<Body>| {
            req.headers()
                .get("x-role")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(GUEST_ROLE)
                .to_string()
        }));
        let app = authz
            .new_handler(Router::new().route("/v1/admin/users", get(|| async { "ok" })))
            .unwrap();

        let denied = app
            .clone()
            .oneshot(Request::get("/v1/admin/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = app
            .oneshot(
                Request::get("/v1/admin/users")
                    .header("x-role", "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
