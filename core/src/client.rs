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

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Image, Track, UserProfile};

const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Spotify API transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Spotify API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// A playlist as listed by `GET /v1/me/playlists`. Tracks are not inlined;
/// Spotify hands back an href to fetch them from.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<Image>,
    pub tracks: TracksRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracksRef {
    pub href: String,
    #[serde(default)]
    pub total: u32,
}

// No `default` on `items`: serde's derive would demand `T: Default`, and
// Spotify always sends the field.
#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<Page<Track>>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

/// One entry of a playlist's track listing. The payload is kept raw
/// because Spotify nulls out removed tracks and ships local files without
/// an id; both must be dropped without failing the page.
#[derive(Debug, Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    track: Option<serde_json::Value>,
}

fn resolvable_tracks(items: Vec<PlaylistItem>) -> Vec<Track> {
    items
        .into_iter()
        .filter_map(|item| item.track)
        .filter_map(|raw| match serde_json::from_value::<Track>(raw) {
            Ok(track) => Some(track),
            Err(e) => {
                debug!("skipping unresolvable playlist entry: {}", e);
                None
            }
        })
        .collect()
}

/// Thin bearer-token wrapper over the Spotify Web API. All endpoints are
/// treated as opaque JSON sources; no retries, no backoff.
pub struct SpotifyClient {
    http: reqwest::Client,
    access_token: String,
    market: String,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            market: market.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response.json().await?)
    }

    /// `GET /v1/me`
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.get_json(&format!("{}/me", API_BASE), &[]).await
    }

    /// `GET /v1/search?q=&type=track&limit=&market=`
    pub async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
        let response: SearchResponse = self
            .get_json(
                &format!("{}/search", API_BASE),
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                    ("market", self.market.clone()),
                ],
            )
            .await?;
        Ok(response.tracks.map(|page| page.items).unwrap_or_default())
    }

    /// `GET /v1/me/playlists`, following pagination.
    pub async fn current_user_playlists(&self) -> Result<Vec<RemotePlaylist>, ApiError> {
        let mut playlists = Vec::new();
        let mut url = format!("{}/me/playlists?limit=50", API_BASE);
        loop {
            let page: Page<RemotePlaylist> = self.get_json(&url, &[]).await?;
            playlists.extend(page.items);
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(playlists)
    }

    /// Fetches a playlist's tracks through the href Spotify provided,
    /// following pagination and dropping unresolvable entries.
    pub async fn playlist_tracks(&self, tracks_href: &str) -> Result<Vec<Track>, ApiError> {
        let mut tracks = Vec::new();
        let mut url = tracks_href.to_string();
        loop {
            let page: Page<PlaylistItem> = self.get_json(&url, &[]).await?;
            tracks.extend(resolvable_tracks(page.items));
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(tracks)
    }

    /// `GET /v1/artists/{id}/top-tracks?market=`
    pub async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<Track>, ApiError> {
        let response: TopTracksResponse = self
            .get_json(
                &format!("{}/artists/{}/top-tracks", API_BASE, artist_id),
                &[("market", self.market.clone())],
            )
            .await?;
        Ok(response.tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolvable_tracks_drops_null_and_idless_entries() {
        let json = r#"[
            {"track": {"id": "t1", "name": "Good One"}},
            {"track": null},
            {},
            {"track": {"id": null, "name": "Local File", "is_local": true}},
            {"track": {"id": "t2", "name": "Another"}}
        ]"#;
        let items: Vec<PlaylistItem> = serde_json::from_str(json).unwrap();
        let tracks = resolvable_tracks(items);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "t1");
        assert_eq!(tracks[1].id, "t2");
    }

    #[test]
    fn test_search_response_parses_without_tracks_block() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.tracks.is_none());
    }

    #[test]
    fn test_search_response_parses_a_track_page() {
        let json = r#"{
            "tracks": {
                "items": [
                    {"id": "t1", "name": "First"},
                    {"id": "t2", "name": "Second"}
                ],
                "next": "https://api.spotify.com/v1/search?offset=2"
            }
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let page = response.tracks.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "t1");
        assert!(page.next.is_some());
    }

    #[test]
    fn test_playlist_page_parses_items_and_next() {
        let json = r#"{
            "items": [{"track": {"id": "t1", "name": "Kept"}}, {"track": null}],
            "next": null
        }"#;
        let page: Page<PlaylistItem> = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next.is_none());
        assert_eq!(resolvable_tracks(page.items).len(), 1);
    }

    #[test]
    fn test_remote_playlist_parses_listing_shape() {
        let json = r#"{
            "id": "37i9dQZF1DXcBWIGoYBM5M",
            "name": "Mix",
            "description": "a mix",
            "images": [{"url": "https://i.scdn.co/image/cover"}],
            "tracks": {"href": "https://api.spotify.com/v1/playlists/x/tracks", "total": 3}
        }"#;
        let playlist: RemotePlaylist = serde_json::from_str(json).unwrap();
        assert_eq!(playlist.name, "Mix");
        assert_eq!(playlist.tracks.total, 3);
        assert!(playlist.tracks.href.ends_with("/tracks"));
    }
}
