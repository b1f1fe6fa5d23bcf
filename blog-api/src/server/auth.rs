use crate::{
    server::{Result, ServerError},
    service::AuthHeaders,
};
use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderName, HeaderValue, header::AUTHORIZATION, request::Parts,
    },
};
use blog_common::model::auth::TokenPair;
use std::convert::Infallible;

pub static REFRESH_TOKEN: HeaderName = HeaderName::from_static("refresh-token");

/// Never rejects. Missing headers are reported by the service that needs them.
impl<S> FromRequestParts<S> for AuthHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            authorization: header_string(&parts.headers, &AUTHORIZATION),
            refresh_token: header_string(&parts.headers, &REFRESH_TOKEN),
        })
    }
}

fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// The response headers that hand a fresh token pair to the client.
pub fn token_headers(pair: &TokenPair) -> Result<[(HeaderName, HeaderValue); 2], ServerError> {
    Ok([
        (AUTHORIZATION, HeaderValue::try_from(&pair.access_token)?),
        (
            REFRESH_TOKEN.clone(),
            HeaderValue::try_from(&pair.refresh_token)?,
        ),
    ])
}
