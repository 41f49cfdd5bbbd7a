//! Caller identity extraction.
//!
//! Authentication terminates in front of this service; the authenticated
//! principal is forwarded in the `x-principal` header. A missing or
//! unreadable header means the anonymous principal.

use crate::models::Principal;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const PRINCIPAL_HEADER: &str = "x-principal";

#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Principal::new)
            .unwrap_or_else(Principal::anonymous);
        Ok(Caller(principal))
    }
}
