/*
    taste-mixer | Rust CLI to mix your Spotify tastes into personal playlists.
    Copyright (C) 2025  Taste Mixer contributors

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::storage::KeyValueStore;
use crate::token::TokenStore;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

pub const AUTH_STATE_KEY: &str = "spotify_auth_state";

const STATE_LENGTH: usize = 16;

/// Scopes requested at login: profile, email, top items, and playlist
/// modification.
pub const SCOPES: [&str; 5] = [
    "user-read-private",
    "user-read-email",
    "user-top-read",
    "playlist-modify-public",
    "playlist-modify-private",
];

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Spotify returned an error during authorization: {0}")]
    Provider(String),
    #[error("callback state does not match the stored login attempt")]
    StateMismatch,
    #[error("no authorization code in the callback")]
    MissingCode,
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("invalid callback URL: {0}")]
    InvalidCallbackUrl(#[from] url::ParseError),
}

/// Tokens granted by a successful authorization-code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// The collaborator that trades an authorization code for tokens.
/// The client secret never lives on this side of the seam unless the
/// direct exchanger is chosen explicitly.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<TokenGrant, AuthError>;
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
}

/// Drives the OAuth authorization-code flow: builds the authorize URL with
/// a CSRF nonce, verifies the callback, and stores the granted tokens.
pub struct AuthFlow {
    config: AuthConfig,
    session: Arc<dyn KeyValueStore>,
    tokens: TokenStore,
    exchanger: Arc<dyn TokenExchanger>,
}

impl AuthFlow {
    pub fn new(
        config: AuthConfig,
        session: Arc<dyn KeyValueStore>,
        tokens: TokenStore,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Self {
        Self {
            config,
            session,
            tokens,
            exchanger,
        }
    }

    /// Builds the Spotify authorize URL for a fresh login attempt.
    ///
    /// Stores the generated nonce under [`AUTH_STATE_KEY`], replacing any
    /// previous one: only a single login attempt is in flight per session.
    pub fn build_authorization_url(&self) -> Url {
        let state = generate_state(STATE_LENGTH);
        if let Err(e) = self.session.set(AUTH_STATE_KEY, &state) {
            warn!("failed to persist auth state nonce: {}", e);
        }

        let scope = SCOPES.join(" ");
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("state", state.as_str()),
        ];

        // The base is a constant, so parsing cannot fail.
        Url::parse_with_params(AUTHORIZE_URL, &params)
            .expect("authorize endpoint URL is valid")
    }

    /// Completes the flow with the parameters Spotify sent to the redirect
    /// URI. On success the granted tokens are stored and the nonce is
    /// cleared; on any failure the stored tokens are left untouched.
    pub async fn handle_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(e) = error {
            return Err(AuthError::Provider(e.to_string()));
        }

        let stored = self.session.get(AUTH_STATE_KEY);
        let matches = match (state, stored.as_deref()) {
            (Some(received), Some(saved)) => received == saved,
            _ => false,
        };
        if !matches {
            // A stale nonce is useless after a mismatch.
            self.session.remove(AUTH_STATE_KEY);
            return Err(AuthError::StateMismatch);
        }

        let code = code.ok_or(AuthError::MissingCode)?;

        let grant = self.exchanger.exchange(code).await?;
        self.tokens
            .save_tokens(&grant.access_token, &grant.refresh_token, grant.expires_in);
        self.session.remove(AUTH_STATE_KEY);
        info!("authorization-code exchange complete");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    pub fn logout(&self) {
        self.tokens.clear();
    }
}

/// Query parameters Spotify appends to the redirect URI.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Extracts `code`, `state` and `error` from a pasted redirect URL.
pub fn parse_callback_url(callback_url: &str) -> Result<CallbackParams, AuthError> {
    let url = Url::parse(callback_url)?;
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}

fn generate_state(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

impl RelayResponse {
    fn into_grant(self) -> Result<TokenGrant, AuthError> {
        if let Some(e) = self.error {
            return Err(AuthError::ExchangeFailed(e));
        }
        match (self.access_token, self.refresh_token, self.expires_in) {
            (Some(access_token), Some(refresh_token), Some(expires_in)) => Ok(TokenGrant {
                access_token,
                refresh_token,
                expires_in,
            }),
            _ => Err(AuthError::ExchangeFailed(
                "incomplete token response".to_string(),
            )),
        }
    }
}

/// Exchanges the code through a backend relay that holds the client
/// secret. The relay accepts `{"code"}` and answers with the token fields
/// or `{"error"}`.
pub struct RelayExchanger {
    http: reqwest::Client,
    relay_url: String,
}

impl RelayExchanger {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url: relay_url.into(),
        }
    }
}

#[async_trait]
impl TokenExchanger for RelayExchanger {
    async fn exchange(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(&self.relay_url)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        let body: RelayResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("{}: {}", status, e)))?;
        body.into_grant()
    }
}

/// Talks to `accounts.spotify.com/api/token` directly with Basic auth.
/// Only for setups where keeping the client secret locally is acceptable.
pub struct DirectExchanger {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DirectExchanger {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }
}

#[async_trait]
impl TokenExchanger for DirectExchanger {
    async fn exchange(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        let body: RelayResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("{}: {}", status, e)))?;
        body.into_grant()
    }
}
