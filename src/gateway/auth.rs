//! Bearer-token middleware for the command gateway.

use crate::config::GatewayConfig;
use crate::error::Error;
use crate::gateway::actix_error::ApiError;

use actix_web::{
    Error as ActixError,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::future::{LocalBoxFuture, Ready, ready};
use std::sync::Arc;

/// Authentication middleware factory.
///
/// Without a configured token every request passes.
#[derive(Clone)]
pub struct Authentication {
    token: Option<Arc<str>>,
}

impl Authentication {
    /// Requires `Authorization: Bearer <token>` when `token` is set.
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(Arc::from),
        }
    }

    /// Builds the middleware from the gateway's `authenticate` section.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let token = config
            .authenticate
            .as_ref()
            .and_then(|auth| auth.bearer.as_ref())
            .map(|bearer| bearer.token.as_str());
        Self::new(token)
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = AuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service,
            token: self.token.clone(),
        }))
    }
}

/// Authentication middleware implementation.
pub struct AuthenticationMiddleware<S> {
    service: S,
    token: Option<Arc<str>>,
}

impl<S> AuthenticationMiddleware<S> {
    fn authorized(&self, req: &ServiceRequest) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        // CORS preflight never carries credentials
        if req.method() == "OPTIONS" {
            return true;
        }
        req.headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected.as_ref())
    }
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.authorized(&req) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        tracing::warn!(path = %req.path(), "Authentication failed: Invalid or missing bearer token");
        Box::pin(async move {
            Err(ApiError::from(Error::Unauthorized(
                "Invalid or missing bearer token".to_string(),
            ))
            .into())
        })
    }
}
