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
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

use crate::storage::KeyValueStore;

pub const ACCESS_TOKEN_KEY: &str = "spotify_token";
pub const REFRESH_TOKEN_KEY: &str = "spotify_refresh_token";
pub const EXPIRATION_KEY: &str = "spotify_token_expiration";

pub(crate) fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Holds the Spotify access/refresh tokens in an injected key-value store.
///
/// Tokens are written on a successful authorization-code exchange,
/// overwritten by the next exchange, and cleared on logout. There is no
/// silent refresh: once the expiration passes the user logs in again.
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persists a fresh token set. `expires_in_secs` is the provider's
    /// relative lifetime; the stored value is an absolute epoch-ms instant.
    pub fn save_tokens(&self, access_token: &str, refresh_token: &str, expires_in_secs: u64) {
        let expires_at = now_epoch_ms() + expires_in_secs * 1000;
        self.write(ACCESS_TOKEN_KEY, access_token);
        self.write(REFRESH_TOKEN_KEY, refresh_token);
        self.write(EXPIRATION_KEY, &expires_at.to_string());
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    pub fn expires_at_epoch_ms(&self) -> Option<u64> {
        self.store.get(EXPIRATION_KEY)?.trim().parse().ok()
    }

    /// True iff both tokens are present and the expiration is strictly in
    /// the future.
    pub fn is_authenticated(&self) -> bool {
        if self.access_token().is_none() || self.refresh_token().is_none() {
            return false;
        }
        match self.expires_at_epoch_ms() {
            Some(expires_at) => now_epoch_ms() < expires_at,
            None => false,
        }
    }

    /// Drops all three token fields. Never fails.
    pub fn clear(&self) {
        self.store.remove(ACCESS_TOKEN_KEY);
        self.store.remove(REFRESH_TOKEN_KEY);
        self.store.remove(EXPIRATION_KEY);
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("failed to persist {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store_pair() -> (Arc<MemoryStore>, TokenStore) {
        let kv = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new(kv.clone());
        (kv, tokens)
    }

    #[test]
    fn test_not_authenticated_when_empty() {
        let (_, tokens) = store_pair();
        assert!(!tokens.is_authenticated());
    }

    #[test]
    fn test_authenticated_when_expiration_in_future() {
        let (_, tokens) = store_pair();
        tokens.save_tokens("access", "refresh", 3600);
        assert!(tokens.is_authenticated());
        assert_eq!(tokens.access_token().as_deref(), Some("access"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("refresh"));
    }

    #[test]
    fn test_not_authenticated_when_expiration_in_past() {
        let (kv, tokens) = store_pair();
        tokens.save_tokens("access", "refresh", 3600);
        let past = now_epoch_ms() - 1000;
        kv.set(EXPIRATION_KEY, &past.to_string()).unwrap();
        assert!(!tokens.is_authenticated());
    }

    #[test]
    fn test_not_authenticated_when_a_token_field_is_absent() {
        let (kv, tokens) = store_pair();
        tokens.save_tokens("access", "refresh", 3600);

        kv.remove(ACCESS_TOKEN_KEY);
        assert!(!tokens.is_authenticated());

        tokens.save_tokens("access", "refresh", 3600);
        kv.remove(REFRESH_TOKEN_KEY);
        assert!(!tokens.is_authenticated());

        tokens.save_tokens("access", "refresh", 3600);
        kv.remove(EXPIRATION_KEY);
        assert!(!tokens.is_authenticated());
    }

    #[test]
    fn test_clear_removes_everything() {
        let (_, tokens) = store_pair();
        tokens.save_tokens("access", "refresh", 3600);
        tokens.clear();
        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.refresh_token(), None);
        assert_eq!(tokens.expires_at_epoch_ms(), None);
        assert!(!tokens.is_authenticated());
    }

    #[test]
    fn test_save_overwrites_previous_tokens() {
        let (_, tokens) = store_pair();
        tokens.save_tokens("first", "r1", 3600);
        tokens.save_tokens("second", "r2", 3600);
        assert_eq!(tokens.access_token().as_deref(), Some("second"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("r2"));
    }
}
