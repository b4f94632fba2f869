//! OCI distribution v2 transport over `ureq`
//!
//! Credentials are sent up front (Basic or a static Bearer token). A 401
//! carrying a `WWW-Authenticate: Bearer realm=...` challenge triggers the
//! token exchange: the configured basic credentials (or none, for anonymous
//! pulls) are presented at the realm and the request is retried once with the
//! issued token. The token is reused until the registry challenges again.

use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use floe_oci::{Digest, OCI_MANIFEST_MEDIA_TYPE};
use serde::Deserialize;

use crate::config::RegistryAuth;

use super::transport::{RegistryTransport, TransportError};

/// Largest manifest we are willing to read
const MAX_MANIFEST_BYTES: u64 = 4 * 1024 * 1024;

/// Largest blob we are willing to read
const MAX_BLOB_BYTES: u64 = 1024 * 1024 * 1024;

type Response = ureq::http::Response<ureq::Body>;

/// HTTP(S) registry transport
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    repository: String,
    auth: RegistryAuth,
    /// Token issued by the last challenge exchange
    bearer: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Head,
    Get,
    Post,
    Put,
}

/// One registry request, replayable for the challenge retry
struct Call<'a> {
    method: Method,
    url: &'a str,
    headers: &'a [(&'a str, &'a str)],
    body: Option<&'a [u8]>,
}

impl<'a> Call<'a> {
    fn new(method: Method, url: &'a str) -> Self {
        Self {
            method,
            url,
            headers: &[],
            body: None,
        }
    }

    fn headers(mut self, headers: &'a [(&'a str, &'a str)]) -> Self {
        self.headers = headers;
        self
    }

    fn body(mut self, body: &'a [u8]) -> Self {
        self.body = Some(body);
        self
    }
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        repository: impl Into<String>,
        auth: &RegistryAuth,
        tls_verify: bool,
        timeout: Duration,
    ) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!tls_verify)
            .build();
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .tls_config(tls)
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            auth: auth.clone(),
            bearer: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}/{}", self.base_url, self.repository, path)
    }

    /// Resolve a possibly relative upload `Location` against the registry
    fn absolute(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else if location.starts_with('/') {
            format!("{}{}", self.base_url, location)
        } else {
            format!("{}/{}", self.base_url, location)
        }
    }

    /// Authorization for the next request: an exchanged token wins
    fn authorization(&self) -> Option<String> {
        let exchanged = self
            .bearer
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .map(|token| format!("Bearer {}", token));
        exchanged.or_else(|| authorization_header(&self.auth))
    }

    /// Send `call`, answering one bearer challenge; non-2xx is an error
    fn execute(&self, call: &Call<'_>, reference: &str) -> Result<Response, TransportError> {
        let authorization = self.authorization();
        let mut response = self
            .send(call, authorization.as_deref())
            .map_err(|e| map_ureq_error(call.url, reference, &e))?;

        if response.status().as_u16() == 401 {
            let challenge = response
                .headers()
                .get("WWW-Authenticate")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_challenge);
            if let Some(challenge) = challenge {
                let token = self.exchange_token(&challenge)?;
                let authorization = format!("Bearer {}", token);
                if let Ok(mut guard) = self.bearer.lock() {
                    *guard = Some(token);
                }
                response = self
                    .send(call, Some(&authorization))
                    .map_err(|e| map_ureq_error(call.url, reference, &e))?;
            }
        }

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(map_status(call.url, reference, status));
        }
        Ok(response)
    }

    fn send(&self, call: &Call<'_>, authorization: Option<&str>) -> Result<Response, ureq::Error> {
        match call.method {
            Method::Head | Method::Get => {
                let mut request = match call.method {
                    Method::Head => self.agent.head(call.url),
                    _ => self.agent.get(call.url),
                };
                for (name, value) in call.headers {
                    request = request.header(*name, *value);
                }
                if let Some(value) = authorization {
                    request = request.header("Authorization", value);
                }
                request.call()
            }
            Method::Post | Method::Put => {
                let mut request = match call.method {
                    Method::Post => self.agent.post(call.url),
                    _ => self.agent.put(call.url),
                };
                for (name, value) in call.headers {
                    request = request.header(*name, *value);
                }
                if let Some(value) = authorization {
                    request = request.header("Authorization", value);
                }
                match call.body {
                    Some(bytes) => request.send(bytes),
                    None => request.send_empty(),
                }
            }
        }
    }

    /// Trade credentials for a registry token at the challenge realm
    fn exchange_token(&self, challenge: &BearerChallenge) -> Result<String, TransportError> {
        let mut request = self.agent.get(&challenge.realm);
        if let Some(service) = &challenge.service {
            request = request.query("service", service);
        }
        if let Some(scope) = &challenge.scope {
            request = request.query("scope", scope);
        }
        match &self.auth {
            RegistryAuth::Basic { .. } => {
                if let Some(value) = authorization_header(&self.auth) {
                    request = request.header("Authorization", value);
                }
            }
            // A static token that drew a challenge has been rejected
            RegistryAuth::Token { .. } => {
                return Err(TransportError::Authentication(format!(
                    "registry token rejected by {}",
                    self.base_url
                )));
            }
            RegistryAuth::Anonymous => {}
        }

        let realm = challenge.realm.as_str();
        let response = request
            .call()
            .map_err(|e| map_ureq_error(realm, realm, &e))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(match status {
                401 | 403 => TransportError::Authentication(format!(
                    "token service {} rejected credentials (HTTP {})",
                    realm, status
                )),
                _ => map_status(realm, realm, status),
            });
        }

        let body = response
            .into_body()
            .with_config()
            .limit(MAX_MANIFEST_BYTES)
            .read_to_vec()
            .map_err(|e| map_ureq_error(realm, realm, &e))?;
        let issued: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            TransportError::Protocol(format!("invalid token response from {}: {}", realm, e))
        })?;
        tracing::debug!(realm, scope = ?challenge.scope, "exchanged registry token");
        issued
            .token
            .or(issued.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TransportError::Protocol(format!("token service {} issued no token", realm)))
    }
}

impl RegistryTransport for HttpTransport {
    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransportError> {
        let url = self.url(&format!("blobs/{}", digest));
        match self.execute(&Call::new(Method::Head, &url), digest.as_str()) {
            Ok(_) => Ok(true),
            Err(TransportError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn put_blob(&self, digest: &Digest, bytes: &[u8]) -> Result<(), TransportError> {
        let start_url = self.url("blobs/uploads/");
        let response = self.execute(&Call::new(Method::Post, &start_url), digest.as_str())?;

        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                TransportError::Protocol(format!("upload session at {} returned no Location", start_url))
            })?;

        let mut upload_url = self.absolute(location);
        upload_url.push(if upload_url.contains('?') { '&' } else { '?' });
        upload_url.push_str("digest=");
        upload_url.push_str(digest.as_str());

        self.execute(
            &Call::new(Method::Put, &upload_url)
                .headers(&[("Content-Type", "application/octet-stream")])
                .body(bytes),
            digest.as_str(),
        )?;

        tracing::debug!(%digest, size = bytes.len(), "uploaded blob");
        Ok(())
    }

    fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>, TransportError> {
        let url = self.url(&format!("blobs/{}", digest));
        let response = self.execute(&Call::new(Method::Get, &url), digest.as_str())?;

        response
            .into_body()
            .with_config()
            .limit(MAX_BLOB_BYTES)
            .read_to_vec()
            .map_err(|e| map_ureq_error(&url, digest.as_str(), &e))
    }

    fn put_manifest(&self, reference: &str, bytes: &[u8]) -> Result<Digest, TransportError> {
        let url = self.url(&format!("manifests/{}", reference));
        let response = self.execute(
            &Call::new(Method::Put, &url)
                .headers(&[("Content-Type", OCI_MANIFEST_MEDIA_TYPE)])
                .body(bytes),
            reference,
        )?;

        Ok(content_digest(response.headers(), bytes))
    }

    fn get_manifest(&self, reference: &str) -> Result<(Vec<u8>, Digest), TransportError> {
        let url = self.url(&format!("manifests/{}", reference));
        let response = self.execute(
            &Call::new(Method::Get, &url).headers(&[("Accept", OCI_MANIFEST_MEDIA_TYPE)]),
            reference,
        )?;

        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .with_config()
            .limit(MAX_MANIFEST_BYTES)
            .read_to_vec()
            .map_err(|e| map_ureq_error(&url, reference, &e))?;

        let digest = content_digest(&headers, &bytes);
        Ok((bytes, digest))
    }

    fn list_tags(&self) -> Result<Vec<String>, TransportError> {
        let url = self.url("tags/list");
        let response = match self.execute(&Call::new(Method::Get, &url), &self.repository) {
            Ok(response) => response,
            // Repository without any pushes yet
            Err(TransportError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let body = response
            .into_body()
            .with_config()
            .limit(MAX_MANIFEST_BYTES)
            .read_to_vec()
            .map_err(|e| map_ureq_error(&url, &self.repository, &e))?;
        let list: TagList = serde_json::from_slice(&body)
            .map_err(|e| TransportError::Protocol(format!("invalid tag list from {}: {}", url, e)))?;

        Ok(list.tags.unwrap_or_default())
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.base_url, self.repository)
    }
}

fn authorization_header(auth: &RegistryAuth) -> Option<String> {
    match auth {
        RegistryAuth::Anonymous => None,
        RegistryAuth::Basic { username, password } => Some(format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", username, password))
        )),
        RegistryAuth::Token { token } => Some(format!("Bearer {}", token)),
    }
}

/// Parse a `Bearer` challenge; quoted values may contain commas
fn parse_challenge(header: &str) -> Option<BearerChallenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let key = key.trim().trim_start_matches(',').trim();
        let after_key = after_key.trim_start();
        let (value, remainder) = match after_key.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"')?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            },
        };
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value.to_string()),
            "service" => service = Some(value.to_string()),
            "scope" => scope = Some(value.to_string()),
            _ => {}
        }
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

/// Map a non-success HTTP status to a [`TransportError`]
fn map_status(url: &str, reference: &str, status: u16) -> TransportError {
    match status {
        404 => TransportError::NotFound(reference.to_string()),
        401 | 403 => TransportError::Authentication(format!("HTTP {} from {}", status, url)),
        _ => TransportError::Protocol(format!("HTTP {} from {}", status, url)),
    }
}

/// Prefer the registry's `Docker-Content-Digest`, fall back to hashing
fn content_digest(headers: &ureq::http::HeaderMap, bytes: &[u8]) -> Digest {
    headers
        .get("Docker-Content-Digest")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Digest::parse(v).ok())
        .unwrap_or_else(|| Digest::compute(bytes))
}

/// Map a ureq error to a [`TransportError`]
fn map_ureq_error(url: &str, reference: &str, err: &ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(code) => map_status(url, reference, *code),
        ureq::Error::Timeout(_) => TransportError::Timeout(url.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connection(format!("{} is unreachable", url))
        }
        ureq::Error::Tls(reason) => TransportError::Tls(format!("{}: {}", url, reason)),
        ureq::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::TimedOut => TransportError::Timeout(url.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => {
                TransportError::Connection(format!("{} is unreachable: {}", url, io))
            }
            _ => TransportError::Connection(format!("{}: {}", url, io)),
        },
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("certificate") || message.contains("tls") {
                TransportError::Tls(format!("{}: {}", url, message))
            } else {
                TransportError::Protocol(format!("{}: {}", url, message))
            }
        }
    }
}
