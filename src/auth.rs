//! Access gate for the HTTP surface.
//!
//! Every request must carry the session token in the `X-API-TOKEN` header, except
//! requests to exempt paths (the liveness route).

use crate::error::AgentError;
use crate::session::{SessionToken, mask_token};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Header carrying the session token.
pub const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-api-token");

/// Path exempt from authentication so monitors need no secret.
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone)]
pub struct AccessGate {
    token: SessionToken,
    exempt_paths: HashSet<String>,
}

impl AccessGate {
    /// Gate on `token`, exempting only the liveness route.
    pub fn new(token: SessionToken) -> Self {
        Self {
            token,
            exempt_paths: HashSet::from([HEALTH_PATH.to_string()]),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    /// Decide on a presented header value (None when the header is absent).
    pub fn check(&self, presented: Option<&str>) -> Result<(), AgentError> {
        match presented {
            Some(token) if self.token.matches(token) => Ok(()),
            Some(token) => {
                warn!(token_prefix = %mask_token(token), "Authentication failed: invalid token");
                Err(AgentError::Unauthorized)
            }
            None => {
                warn!("Authentication failed: missing {} header", TOKEN_HEADER);
                Err(AgentError::Unauthorized)
            }
        }
    }
}

/// Authentication middleware for HTTP requests.
pub async fn auth_middleware(
    State(gate): State<Arc<AccessGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    // A header with non-visible-ASCII bytes can never equal the token
    let presented = request
        .headers()
        .get(&TOKEN_HEADER)
        .map(|value| value.to_str().unwrap_or_default());

    match gate.check(presented) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
