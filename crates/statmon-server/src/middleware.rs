use crate::api::failure;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use statmon_common::crypto;
use std::net::IpAddr;

/// Encrypted payloads are tiny (RSA-OAEP caps them well below this), so a
/// small read limit is enough.
const MAX_ENCRYPTED_BODY: usize = 1024 * 1024;

/// Restricts metric submission to the configured trusted subnet, checked
/// against the `X-Real-IP` header. Pass-through when no subnet is set.
pub async fn trusted_subnet(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let client_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<IpAddr>().ok());

    match client_ip {
        Some(ip) if subnet.contains(&ip) => next.run(req).await,
        Some(ip) => {
            tracing::warn!(client_ip = %ip, "submission from outside the trusted subnet");
            failure(
                StatusCode::FORBIDDEN,
                "client address is not in the trusted subnet",
            )
        }
        None => failure(StatusCode::FORBIDDEN, "missing or invalid X-Real-IP header"),
    }
}

/// Decrypts the batch body with the configured private key before the JSON
/// handler runs. Pass-through when no key is configured.
pub async fn rsa_decrypt(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.private_key.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let ciphertext = match axum::body::to_bytes(body, MAX_ENCRYPTED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return failure(StatusCode::BAD_REQUEST, "failed to read request body"),
    };

    match crypto::decrypt(&ciphertext, &key) {
        Ok(plaintext) => {
            let req = Request::from_parts(parts, Body::from(plaintext));
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejecting undecryptable payload");
            failure(StatusCode::BAD_REQUEST, "payload decryption failed")
        }
    }
}
