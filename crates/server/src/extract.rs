use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use utils::htmx::is_htmx;

/// Whether the request came from htmx (`HX-Request: true`).
#[derive(Debug, Clone, Copy)]
pub struct Htmx(pub bool);

impl<S> FromRequestParts<S> for Htmx
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Htmx(is_htmx(&parts.headers)))
    }
}
