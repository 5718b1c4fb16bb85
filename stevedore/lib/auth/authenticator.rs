use std::{collections::HashMap, sync::Mutex, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use getset::Getters;
use reqwest::Method;
use serde::Deserialize;

use crate::{
    http::{Payload, Transport},
    oci::{Reference, DEFAULT_ENDPOINT},
    StevedoreError, StevedoreResult,
};

use super::{Scope, TokenCache};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Docker Hub's token endpoint.
pub const DOCKER_AUTH_REALM: &str = "https://auth.docker.io/token";

/// The service name Docker Hub tokens are scoped to.
pub const DOCKER_AUTH_SERVICE: &str = "registry.docker.io";

/// Token lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A username/password pair.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Credential {
    /// The username.
    username: String,

    /// The password or access token.
    password: String,
}

/// The bearer challenge a registry advertises in `WWW-Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct AuthChallenge {
    /// The token endpoint URL.
    realm: String,

    /// The service the token must be scoped to.
    service: String,
}

/// The body returned by a token endpoint. Some registries answer with
/// `token`, some with `access_token`, Docker Hub with both.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Produces `Authorization` header values for registry operations.
///
/// Holds per-domain basic credentials, the optional Docker Hub credential,
/// the bearer challenge installed by the scheme probe, and a one-entry token
/// cache keyed by the whole requested scope set. Basic credentials
/// short-circuit the token exchange entirely.
#[derive(Debug)]
pub struct Authenticator {
    transport: Transport,
    challenge: Mutex<Option<AuthChallenge>>,
    basic: Mutex<HashMap<String, Credential>>,
    docker_hub: Mutex<Option<Credential>>,
    tokens: TokenCache,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Credential {
    /// Creates a new credential.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Renders the credential as a `Basic` authorization value.
    pub fn basic_header(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", encoded)
    }
}

impl AuthChallenge {
    /// Parses a `WWW-Authenticate: Bearer realm="...",service="..."` value.
    /// Returns `None` for non-bearer challenges or a missing realm.
    pub fn from_www_authenticate(header: &str) -> Option<Self> {
        let params = header.strip_prefix("Bearer ")?;

        let mut realm = None;
        let mut service = None;
        for part in params.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                let value = value.trim_matches('"').to_string();
                match key {
                    "realm" => realm = Some(value),
                    "service" => service = Some(value),
                    _ => {}
                }
            }
        }

        Some(Self {
            realm: realm?,
            service: service.unwrap_or_default(),
        })
    }

    /// Builds the token request URL for a set of scope strings.
    pub fn token_url(&self, scopes: &[String]) -> String {
        let mut url = format!("{}?service={}", self.realm, self.service);
        for scope in scopes {
            url.push_str("&scope=");
            url.push_str(scope);
        }
        url
    }
}

impl Authenticator {
    /// Creates an authenticator with no credentials and no challenge.
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            challenge: Mutex::new(None),
            basic: Mutex::new(HashMap::new()),
            docker_hub: Mutex::new(None),
            tokens: TokenCache::new(1),
        }
    }

    /// Installs the bearer challenge discovered by probing `/v2/`.
    pub fn set_challenge(&self, challenge: AuthChallenge) -> StevedoreResult<()> {
        *self
            .challenge
            .lock()
            .map_err(|_| StevedoreError::LockPoisoned)? = Some(challenge);
        Ok(())
    }

    /// Registers a basic credential for a registry domain.
    pub fn add_basic(
        &self,
        domain: impl AsRef<str>,
        credential: Credential,
    ) -> StevedoreResult<()> {
        self.basic
            .lock()
            .map_err(|_| StevedoreError::LockPoisoned)?
            .insert(normalize_domain(domain.as_ref()), credential);
        Ok(())
    }

    /// Sets the Docker Hub credential used during token exchange.
    pub fn set_docker_hub(&self, credential: Credential) -> StevedoreResult<()> {
        *self
            .docker_hub
            .lock()
            .map_err(|_| StevedoreError::LockPoisoned)? = Some(credential);
        Ok(())
    }

    /// Produces the `Authorization` value for an operation touching the
    /// given repositories with the given scopes.
    ///
    /// A basic credential registered for the endpoint's domain wins outright.
    /// Otherwise, with no installed challenge the registry needs no auth and
    /// `None` is returned. Otherwise a bearer token covering the whole scope
    /// set is taken from the cache or fetched from the token endpoint.
    pub async fn get_token(
        &self,
        requests: &[(Scope, &Reference)],
    ) -> StevedoreResult<Option<String>> {
        let domain = match requests.first() {
            Some((_, reference)) => normalize_domain(reference.endpoint()),
            None => return Ok(None),
        };

        {
            let basic = self.basic.lock().map_err(|_| StevedoreError::LockPoisoned)?;
            if let Some(credential) = basic.get(&domain) {
                return Ok(Some(credential.basic_header()));
            }
        }

        let challenge = {
            let guard = self
                .challenge
                .lock()
                .map_err(|_| StevedoreError::LockPoisoned)?;
            match guard.as_ref() {
                Some(challenge) => challenge.clone(),
                None => return Ok(None),
            }
        };

        let scopes: Vec<String> = requests
            .iter()
            .filter(|(scope, _)| *scope != Scope::None)
            .map(|(scope, reference)| {
                format!("repository:{}:{}", reference.name(), scope.as_str())
            })
            .collect();
        let key = scopes.join(" ");

        if let Some(cached) = self.tokens.get(&key)? {
            return Ok(Some(cached));
        }

        let url = challenge.token_url(&scopes);
        let hub_basic = if domain == DEFAULT_ENDPOINT {
            let guard = self
                .docker_hub
                .lock()
                .map_err(|_| StevedoreError::LockPoisoned)?;
            guard.as_ref().map(|credential| credential.basic_header())
        } else {
            None
        };

        tracing::debug!(%url, "requesting registry token");

        let response = self
            .transport
            .execute(Method::GET, &url, hub_basic.as_deref(), &[], Payload::Empty)
            .await?;
        if !response.status().is_success() {
            return Err(StevedoreError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response.json().await?;
        let token = body
            .token
            .or(body.access_token)
            .ok_or_else(|| StevedoreError::Auth("token endpoint returned no token".into()))?;
        let ttl = body
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        let value = format!("Bearer {}", token);
        self.tokens.put(key, value.clone(), Some(ttl))?;
        Ok(Some(value))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reduces an endpoint or URL to its bare `host[:port]` domain.
pub fn normalize_domain(endpoint: &str) -> String {
    let stripped = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    match stripped.find('/') {
        Some(idx) => stripped[..idx].to_string(),
        None => stripped.to_string(),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
