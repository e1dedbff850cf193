//! HTTP implementation of [`GameApi`].
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so any library
//! (reqwest, ureq, hyper) or an in-process loopback can carry the requests.

use crate::api::GameApi;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{ClientError, ClientResult};
use gambit_protocol::{
    decode_body, encode_body, ApiFailure, ChallengeDecision, ChallengeId, Endpoint, GameSnapshot,
    HttpRequest, HttpResponse, JoinQueueResponse, MessageResponse, Method, MoveNotation,
    ParticipantId, PendingChallenge, QueueStatusResponse, RefreshResponse,
    RespondChallengeResponse, RespondDrawRequest, SendChallengeRequest, SendChallengeResponse,
    SessionId,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// HTTP client abstraction.
///
/// Returns `Err` only when no response was received.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// [`GameApi`] over HTTP with JSON bodies and bearer authentication.
///
/// A 401 answer triggers one token refresh and one retry. The refreshed token
/// is stored in the [`CredentialStore`], which lets a watching
/// [`ConnectionManager`](crate::ConnectionManager) swap its channel.
pub struct HttpGameApi<C: HttpClient> {
    config: ClientConfig,
    client: C,
    credentials: Arc<CredentialStore>,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpGameApi<C> {
    /// Creates an API client.
    pub fn new(config: ClientConfig, client: C, credentials: Arc<CredentialStore>) -> Self {
        Self {
            config,
            client,
            credentials,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Exchanges the refresh token for a new access token and stores it.
    ///
    /// A refused refresh clears the credential store, so watchers drop the
    /// channel and any session state; the caller has to log in again. A
    /// transport failure leaves the credential in place.
    pub fn refresh_credential(&self) -> ClientResult<String> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            return Err(self.expire_credential());
        };
        let request = HttpRequest::new(Method::Post, self.config.api_url(&self.config.refresh_path))
            .with_bearer(refresh_token)
            .with_timeout(self.config.request_timeout);
        let response = self.transmit(request)?;
        if !response.is_success() {
            warn!(status = response.status, "token refresh refused");
            return Err(self.expire_credential());
        }
        let refreshed: RefreshResponse = decode_body(&response.body)?;
        if !self.credentials.rotate_access_token(refreshed.access_token.clone()) {
            return Err(ClientError::CredentialExpired);
        }
        info!("access token refreshed");
        Ok(refreshed.access_token)
    }

    fn expire_credential(&self) -> ClientError {
        self.credentials.clear();
        ClientError::CredentialExpired
    }

    fn transmit(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        match self.client.send(request) {
            Ok(response) => {
                *self.last_error.write() = None;
                Ok(response)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(ClientError::transport_retryable(e))
            }
        }
    }

    fn request(&self, endpoint: &Endpoint, body: Option<Vec<u8>>) -> HttpRequest {
        let mut request = HttpRequest::new(endpoint.method(), self.config.api_url(&endpoint.path()))
            .with_timeout(self.config.request_timeout);
        if let Some(token) = self.credentials.access_token() {
            request = request.with_bearer(token);
        }
        if let Some(body) = body {
            request = request.with_body(body);
        }
        request
    }

    fn call(&self, endpoint: Endpoint, body: Option<Vec<u8>>) -> ClientResult<Vec<u8>> {
        debug!(method = %endpoint.method(), path = %endpoint.path(), "request");
        let mut response = self.transmit(self.request(&endpoint, body.clone()))?;

        if response.status == 401 && self.config.refresh_on_unauthorized {
            self.refresh_credential()?;
            response = self.transmit(self.request(&endpoint, body))?;
        }

        if !response.is_success() {
            let failure = Self::failure(&response);
            debug!(status = failure.status, message = %failure.message, "request rejected");
            return Err(ClientError::Rejected(failure));
        }
        Ok(response.body)
    }

    fn call_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: Option<Vec<u8>>,
    ) -> ClientResult<T> {
        let bytes = self.call(endpoint, body)?;
        Ok(decode_body(&bytes)?)
    }

    fn failure(response: &HttpResponse) -> ApiFailure {
        let message = match decode_body::<MessageResponse>(&response.body) {
            Ok(body) => body.message,
            Err(_) => String::from_utf8_lossy(&response.body).into_owned(),
        };
        ApiFailure::new(response.status, message)
    }
}

impl<C: HttpClient> GameApi for HttpGameApi<C> {
    fn fetch_session(&self, session: SessionId) -> ClientResult<GameSnapshot> {
        self.call_json(Endpoint::Snapshot(session), None)
    }

    fn submit_move(
        &self,
        session: SessionId,
        notation: &MoveNotation,
    ) -> ClientResult<GameSnapshot> {
        self.call_json(Endpoint::SubmitMove(session, notation.clone()), None)
    }

    fn resign(&self, session: SessionId) -> ClientResult<()> {
        self.call(Endpoint::Resign(session), None).map(|_| ())
    }

    fn offer_draw(&self, session: SessionId) -> ClientResult<()> {
        self.call(Endpoint::OfferDraw(session), None).map(|_| ())
    }

    fn respond_draw(&self, session: SessionId, accepted: bool) -> ClientResult<()> {
        let body = encode_body(&RespondDrawRequest { accepted })?;
        self.call(Endpoint::RespondDraw(session), Some(body))
            .map(|_| ())
    }

    fn claim_timeout(&self, session: SessionId) -> ClientResult<()> {
        self.call(Endpoint::ClaimTimeout(session), None).map(|_| ())
    }

    fn join_queue(&self) -> ClientResult<JoinQueueResponse> {
        self.call_json(Endpoint::JoinQueue, None)
    }

    fn leave_queue(&self) -> ClientResult<()> {
        self.call(Endpoint::LeaveQueue, None).map(|_| ())
    }

    fn queue_status(&self) -> ClientResult<QueueStatusResponse> {
        self.call_json(Endpoint::QueueStatus, None)
    }

    fn send_challenge(
        &self,
        from: ParticipantId,
        to: ParticipantId,
    ) -> ClientResult<SendChallengeResponse> {
        let body = encode_body(&SendChallengeRequest {
            user1_id: from,
            user2_id: to,
        })?;
        self.call_json(Endpoint::SendChallenge, Some(body))
    }

    fn cancel_challenge(&self) -> ClientResult<()> {
        self.call(Endpoint::CancelChallenge, None).map(|_| ())
    }

    fn pending_challenges(&self) -> ClientResult<Vec<PendingChallenge>> {
        self.call_json(Endpoint::PendingChallenges, None)
    }

    fn respond_challenge(
        &self,
        challenge: ChallengeId,
        decision: ChallengeDecision,
    ) -> ClientResult<RespondChallengeResponse> {
        self.call_json(Endpoint::RespondChallenge(challenge, decision), None)
    }
}
