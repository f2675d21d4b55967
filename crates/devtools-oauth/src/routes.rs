//! HTTP surface: discovery documents, the key-set document and dynamic
//! client registration

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::error::{ErrorCode, OAuth2Error};
use crate::metadata::{AUTHORIZATION_SERVER_PATH, JWKS_PATH, PROTECTED_RESOURCE_PATH, REGISTRATION_PATH};
use crate::registration::{ClientRegistrar, RegistrationError, RegistrationRequest};
use crate::server::ResourceServer;

/// Discovery documents are static for the life of the process
const METADATA_CACHE_CONTROL: &str = "public, max-age=3600";

pub(crate) fn router(server: ResourceServer) -> Router {
    let mut router = Router::new()
        .route(AUTHORIZATION_SERVER_PATH, get(authorization_server_metadata))
        .route(PROTECTED_RESOURCE_PATH, get(protected_resource_metadata))
        .route(JWKS_PATH, get(jwks));

    if server.registrar().is_some() {
        router = router.route(REGISTRATION_PATH, post(register));
    }

    router.with_state(server)
}

fn cached_json<T: serde::Serialize>(body: T) -> Response {
    let mut response = Json(body).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(METADATA_CACHE_CONTROL),
    );
    response
}

async fn authorization_server_metadata(State(server): State<ResourceServer>) -> Response {
    cached_json(server.metadata().authorization_server_metadata())
}

async fn protected_resource_metadata(State(server): State<ResourceServer>) -> Response {
    cached_json(server.metadata().protected_resource_metadata())
}

async fn jwks(State(server): State<ResourceServer>) -> Response {
    match server.key_set().await {
        Ok(keys) => Json(keys.as_ref()).into_response(),
        Err(e) => {
            error!(error = %e, "Key set unavailable for JWKS document");
            OAuth2Error::new(ErrorCode::ServerError, "Key set unavailable")
                .into_response_with(StatusCode::BAD_GATEWAY, None)
        }
    }
}

async fn register(State(server): State<ResourceServer>, body: Bytes) -> Response {
    let Some(registrar) = server.registrar() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let request: RegistrationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Registration body is not valid JSON");
            return OAuth2Error::new(ErrorCode::InvalidRequest, "Invalid JSON in request body")
                .into_response();
        }
    };

    match registrar.register(request).await {
        Ok(client) => {
            info!(client_id = %client.client_id, "Client registered via endpoint");
            let mut response = (StatusCode::CREATED, Json(client)).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            response
        }
        Err(e) => match e.error_code() {
            ErrorCode::ServerError => registration_failure(&e),
            code => {
                warn!(error = %e, "Registration rejected");
                OAuth2Error::new(code, e.to_string()).into_response()
            }
        },
    }
}

fn registration_failure(e: &RegistrationError) -> Response {
    error!(error = %e, "Registration failed");
    OAuth2Error::new(ErrorCode::ServerError, "Failed to register client").into_response()
}
