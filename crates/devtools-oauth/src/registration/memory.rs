use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::{
    ClientRegistrar, RegistrarConfig, RegistrationError, RegistrationRequest, RegistrationResponse,
};
use crate::credentials;

/// Stored client: the public record plus the secret it was issued
struct ClientRecord {
    info: RegistrationResponse,
    secret: Option<SecretString>,
}

/// In-memory [`ClientRegistrar`]
///
/// All clients live in one map behind a single reader/writer lock.
pub struct InMemoryRegistrar {
    config: RegistrarConfig,
    clients: RwLock<HashMap<String, ClientRecord>>,
}

impl std::fmt::Debug for InMemoryRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRegistrar")
            .field("config", &self.config)
            .field("clients", &self.clients.read().len())
            .finish()
    }
}

impl Default for InMemoryRegistrar {
    fn default() -> Self {
        Self::new(RegistrarConfig::default())
    }
}

impl InMemoryRegistrar {
    pub fn new(config: RegistrarConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Check a presented client secret in constant time
    ///
    /// # Errors
    ///
    /// Fails if the client is unknown, is a public client, presents the wrong
    /// secret, or holds an expired secret.
    pub fn authenticate_client(&self, client_id: &str, secret: &str) -> Result<(), RegistrationError> {
        let clients = self.clients.read();
        let record = clients
            .get(client_id)
            .ok_or_else(|| RegistrationError::ClientNotFound(client_id.to_string()))?;

        let stored = record
            .secret
            .as_ref()
            .ok_or(RegistrationError::InvalidClientSecret)?;
        let matches: bool = stored
            .expose_secret()
            .as_bytes()
            .ct_eq(secret.as_bytes())
            .into();
        if !matches {
            return Err(RegistrationError::InvalidClientSecret);
        }

        if record.info.is_secret_expired() {
            return Err(RegistrationError::ClientSecretExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl ClientRegistrar for InMemoryRegistrar {
    async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationResponse, RegistrationError> {
        self.config.validate(&request)?;

        let auth_method = request
            .token_endpoint_auth_method
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "client_secret_basic".to_string());

        let now = Utc::now();
        let (secret, secret_expires_at) = if auth_method == "none" {
            (None, 0)
        } else {
            let secret = credentials::generate_client_secret()?;
            (Some(secret), (now + self.config.client_secret_ttl).timestamp())
        };

        let grant_types = if request.grant_types.is_empty() {
            self.config.default_grant_types.clone()
        } else {
            request.grant_types
        };
        let response_types = if request.response_types.is_empty() {
            self.config.default_response_types.clone()
        } else {
            request.response_types
        };
        let scope = request
            .scope
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_scope.clone());

        let mut info = RegistrationResponse {
            client_id: String::new(),
            client_secret: None,
            client_id_issued_at: now.timestamp(),
            client_secret_expires_at: secret_expires_at,
            redirect_uris: request.redirect_uris,
            token_endpoint_auth_method: auth_method,
            grant_types,
            response_types,
            client_name: request.client_name,
            client_uri: request.client_uri,
            logo_uri: request.logo_uri,
            scope,
            contacts: request.contacts,
            tos_uri: request.tos_uri,
            policy_uri: request.policy_uri,
            jwks_uri: request.jwks_uri,
            software_id: request.software_id,
            software_version: request.software_version,
        };

        {
            let mut clients = self.clients.write();
            loop {
                let client_id = credentials::generate_client_id()?;
                if let Entry::Vacant(slot) = clients.entry(client_id.clone()) {
                    info.client_id = client_id;
                    slot.insert(ClientRecord {
                        info: info.clone(),
                        secret: secret.clone().map(SecretString::new),
                    });
                    break;
                }
            }
        }

        info!(
            client_id = %info.client_id,
            client_name = info.client_name.as_deref().unwrap_or_default(),
            grant_types = ?info.grant_types,
            "Registered new OAuth client"
        );

        info.client_secret = secret;
        Ok(info)
    }

    async fn get(&self, client_id: &str) -> Result<RegistrationResponse, RegistrationError> {
        let clients = self.clients.read();
        let record = clients
            .get(client_id)
            .ok_or_else(|| RegistrationError::ClientNotFound(client_id.to_string()))?;

        if record.info.is_secret_expired() {
            warn!(client_id = %client_id, "Client secret has expired");
        }

        Ok(record.info.clone())
    }

    async fn update(
        &self,
        client_id: &str,
        request: RegistrationRequest,
    ) -> Result<RegistrationResponse, RegistrationError> {
        let mut clients = self.clients.write();
        let record = clients
            .get_mut(client_id)
            .ok_or_else(|| RegistrationError::ClientNotFound(client_id.to_string()))?;

        self.config.validate(&request)?;

        let info = &mut record.info;
        if !request.redirect_uris.is_empty() {
            info.redirect_uris = request.redirect_uris;
        }
        if !request.contacts.is_empty() {
            info.contacts = request.contacts;
        }
        if let Some(scope) = request.scope.filter(|s| !s.is_empty()) {
            info.scope = scope;
        }
        for (field, value) in [
            (&mut info.client_name, request.client_name),
            (&mut info.client_uri, request.client_uri),
            (&mut info.logo_uri, request.logo_uri),
            (&mut info.tos_uri, request.tos_uri),
            (&mut info.policy_uri, request.policy_uri),
            (&mut info.jwks_uri, request.jwks_uri),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                *field = Some(value);
            }
        }

        info!(client_id = %client_id, "Updated OAuth client");
        Ok(info.clone())
    }

    async fn delete(&self, client_id: &str) -> Result<(), RegistrationError> {
        if self.clients.write().remove(client_id).is_none() {
            return Err(RegistrationError::ClientNotFound(client_id.to_string()));
        }
        info!(client_id = %client_id, "Deleted OAuth client");
        Ok(())
    }
}
