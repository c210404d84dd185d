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

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One artist entry on a track, as Spotify returns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AlbumRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Immutable track snapshot copied from a Spotify API response.
/// Identity is `id`; the field names match the wire format so responses
/// deserialize directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: AlbumRef,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: u8,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

impl Track {
    /// Comma-separated artist names, "unknown" when Spotify sent none.
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            return "unknown".to_string();
        }
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<&str>>()
            .join(", ")
    }

    pub fn cover_image_url(&self) -> Option<&str> {
        self.album.images.first().map(|i| i.url.as_str())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({}) [pop {}]",
            self.name,
            self.artist_line(),
            format_duration_ms(self.duration_ms),
            self.popularity
        )
    }
}

/// Where a locally stored playlist came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistSource {
    Local,
    Spotify,
}

/// A playlist owned by the local collection store. Ids are allocated
/// locally; track order is insertion order and doubles as display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
    pub created_at: String,
    pub source: PlaylistSource,
    #[serde(default)]
    pub cover_image: Option<String>,
}

impl Playlist {
    pub fn contains_track(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|t| t.id == track_id)
    }
}

/// Result of a Spotify-to-local import run.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    /// Remote playlists turned into local ones.
    pub imported: u32,
    /// Remote playlists skipped (no resolvable tracks, or fetch failed).
    pub skipped: u32,
}

/// The signed-in user, from `GET /v1/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Renders a track duration as `m:ss`.
pub fn format_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(0), "0:00");
        assert_eq!(format_duration_ms(59_000), "0:59");
        assert_eq!(format_duration_ms(215_000), "3:35");
        assert_eq!(format_duration_ms(3_600_000), "60:00");
    }

    #[test]
    fn test_artist_line() {
        let mut t = Track {
            id: "t1".to_string(),
            name: "Song A".to_string(),
            artists: vec![ArtistRef {
                id: "a1".to_string(),
                name: "Some Artist".to_string(),
            }],
            album: AlbumRef::default(),
            duration_ms: 0,
            popularity: 0,
            uri: String::new(),
            external_urls: HashMap::new(),
        };
        assert_eq!(t.artist_line(), "Some Artist");

        t.artists.push(ArtistRef {
            id: "a2".to_string(),
            name: "Guest".to_string(),
        });
        assert_eq!(t.artist_line(), "Some Artist, Guest");

        t.artists.clear();
        assert_eq!(t.artist_line(), "unknown");
    }

    #[test]
    fn test_track_deserializes_from_wire_shape() {
        let json = r#"{
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "artists": [{"id": "0gxyHStUsqpMadRV0Di1Qt", "name": "Rick Astley"}],
            "album": {"name": "Whenever You Need Somebody",
                      "images": [{"url": "https://i.scdn.co/image/abc", "width": 640, "height": 640}]},
            "duration_ms": 213573,
            "popularity": 81,
            "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
            "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"}
        }"#;

        let t: Track = serde_json::from_str(json).unwrap();
        assert_eq!(t.name, "Never Gonna Give You Up");
        assert_eq!(t.artists[0].name, "Rick Astley");
        assert_eq!(t.popularity, 81);
        assert_eq!(t.cover_image_url(), Some("https://i.scdn.co/image/abc"));
    }

    #[test]
    fn test_track_deserializes_with_missing_optional_fields() {
        // Playlist items sometimes arrive without popularity or album art.
        let json = r#"{"id": "x", "name": "Bare"}"#;
        let t: Track = serde_json::from_str(json).unwrap();
        assert_eq!(t.popularity, 0);
        assert!(t.album.images.is_empty());
        assert_eq!(t.cover_image_url(), None);
    }

    #[test]
    fn test_playlist_source_serialization() {
        assert_eq!(
            serde_json::to_string(&PlaylistSource::Local).unwrap(),
            "\"local\""
        );
        assert_eq!(
            serde_json::to_string(&PlaylistSource::Spotify).unwrap(),
            "\"spotify\""
        );
    }
}
