//! `reqwest` clients for the signer, persistence and notification services.

use std::{
    fmt,
    time::Duration,
};

use crate::{
    card::ClaimSignature,
    error::{
        PersistenceError,
        SignatureError,
    },
    ports::{
        ClaimRecord,
        PersistenceService,
        SignatureRequest,
        SignatureService,
        TrackScratch,
        WinNotice,
        WinNotifier,
    },
};
use reqwest::StatusCode;
use serde::Serialize;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
struct Endpoint {
    base_url: String,
    http: reqwest::Client,
}

impl Endpoint {
    fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

/// Status plus body of a non-2xx response.
struct Failure {
    status: StatusCode,
    body: String,
}

async fn send<B: Serialize>(
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<Result<Vec<u8>, Failure>, reqwest::Error> {
    let res = request.json(body).send().await?;
    let status = res.status();
    let bytes = res.bytes().await?;
    if !status.is_success() {
        return Ok(Err(Failure {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }));
    }
    Ok(Ok(bytes.to_vec()))
}

#[derive(Clone)]
pub struct HttpSigner {
    endpoint: Endpoint,
}

impl HttpSigner {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, timeout)?,
        })
    }
}

impl fmt::Display for HttpSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.endpoint.fmt(f)
    }
}

/// Parses a signer response body, rejecting payloads that could never be
/// submitted.
pub fn parse_signature(bytes: &[u8]) -> Result<ClaimSignature, SignatureError> {
    let signature: ClaimSignature = serde_json::from_slice(bytes)
        .map_err(|err| SignatureError::InvalidShape(err.to_string()))?;
    if signature.signature.is_empty() {
        return Err(SignatureError::InvalidShape("empty signature".into()));
    }
    Ok(signature)
}

impl SignatureService for HttpSigner {
    async fn claim_signature(
        &self,
        request: SignatureRequest,
    ) -> Result<ClaimSignature, SignatureError> {
        let url = self.endpoint.url("claim-signature");
        tracing::debug!(%url, token_id = request.token_id, "requesting claim signature");
        let body = send(self.endpoint.http.post(url), &request)
            .await
            .map_err(|err| SignatureError::Unreachable(err.to_string()))?
            .map_err(|failure| SignatureError::Rejected {
                status: failure.status.as_u16(),
                body: failure.body,
            })?;
        parse_signature(&body)
    }
}

#[derive(Clone)]
pub struct HttpPersistence {
    endpoint: Endpoint,
}

impl HttpPersistence {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, DEFAULT_TIMEOUT)?,
        })
    }

    pub fn track_scratch_url(&self, token_id: u64) -> String {
        self.endpoint.url(&format!("cards/{token_id}/track-scratch"))
    }

    pub fn claim_url(&self, token_id: u64) -> String {
        self.endpoint.url(&format!("cards/{token_id}/claim"))
    }

    async fn patch<B: Serialize>(&self, url: String, body: &B) -> Result<(), PersistenceError> {
        send(self.endpoint.http.patch(url), body)
            .await
            .map_err(|err| PersistenceError::Unreachable(err.to_string()))?
            .map_err(|failure| PersistenceError::Rejected {
                status: failure.status.as_u16(),
                body: failure.body,
            })?;
        Ok(())
    }
}

impl fmt::Display for HttpPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.endpoint.fmt(f)
    }
}

impl PersistenceService for HttpPersistence {
    async fn track_scratch(&self, token_id: u64, body: TrackScratch) -> Result<(), PersistenceError> {
        self.patch(self.track_scratch_url(token_id), &body).await
    }

    async fn record_claim(&self, token_id: u64, body: ClaimRecord) -> Result<(), PersistenceError> {
        self.patch(self.claim_url(token_id), &body).await
    }
}

#[derive(Clone)]
pub struct HttpNotifier {
    endpoint: Endpoint,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, DEFAULT_TIMEOUT)?,
        })
    }
}

impl WinNotifier for HttpNotifier {
    async fn notify_win(&self, notice: WinNotice) -> Result<(), String> {
        let url = self.endpoint.url("notifications/win");
        match send(self.endpoint.http.post(url), &notice).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(failure)) => Err(format!(
                "notifier responded with {}: {}",
                failure.status, failure.body
            )),
            Err(err) => Err(err.to_string()),
        }
    }
}
