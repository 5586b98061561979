//! Caller identity taken from request headers.
//!
//! Authentication happens upstream; these headers carry its result.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{TenantId, UserId};

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// Tenant the request acts within.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub TenantId);

/// Shopper making the request.
#[derive(Debug, Clone, Copy)]
pub struct User(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_id(parts, TENANT_HEADER).map(Tenant)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for User {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_id(parts, USER_HEADER).map(User)
    }
}

fn header_id<T: FromStr>(parts: &Parts, name: &str) -> Result<T, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {name} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {name} header")))
}
