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

use std::collections::HashSet;

use futures::future::join_all;
use log::warn;

use crate::client::{ApiError, SpotifyClient};
use crate::models::Track;

/// Fallback search when the user picked nothing at all.
pub const DEFAULT_QUERY: &str = "genre:pop";

/// The filter groups a user can pick from before generating a playlist.
/// Artists are ids, resolved through per-artist top-track lookups instead
/// of the search query.
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    pub decades: Vec<String>,
    pub genres: Vec<String>,
    pub tracks: Vec<String>,
    pub artists: Vec<String>,
    pub popularity: Option<(u8, u8)>,
}

/// Composes the Spotify search query from the selected filter groups.
///
/// Values within a group are disjoined with OR inside parentheses; groups
/// are conjoined by juxtaposition (Spotify's implicit AND). With no groups
/// selected the result is [`DEFAULT_QUERY`], unless artists were picked,
/// in which case the query is empty and the artist lookups carry the run.
pub fn build_search_query(prefs: &Preferences) -> String {
    let mut groups = Vec::new();

    if let Some(group) = or_group(&prefs.decades, |d| format!("year:{}", d)) {
        groups.push(group);
    }
    if let Some(group) = or_group(&prefs.genres, |g| format!("genre:\"{}\"", g)) {
        groups.push(group);
    }
    if let Some(group) = or_group(&prefs.tracks, |t| format!("track:\"{}\"", t)) {
        groups.push(group);
    }

    if groups.is_empty() {
        if prefs.artists.is_empty() {
            return DEFAULT_QUERY.to_string();
        }
        return String::new();
    }
    groups.join(" ")
}

fn or_group(values: &[String], clause: impl Fn(&str) -> String) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let clauses: Vec<String> = values.iter().map(|v| clause(v)).collect();
    Some(format!("({})", clauses.join(" OR ")))
}

/// Assembles a candidate track list from the search query plus the
/// selected artists' top tracks, deduplicated by id in first-seen order
/// and filtered to the inclusive popularity range.
///
/// Per-artist lookups run concurrently; one failing lookup is logged and
/// skipped without failing the run.
pub async fn generate_playlist(
    client: &SpotifyClient,
    prefs: &Preferences,
    limit: u32,
) -> Result<Vec<Track>, ApiError> {
    let query = build_search_query(prefs);
    let mut tracks = Vec::new();

    if !query.is_empty() {
        tracks.extend(client.search_tracks(&query, limit).await?);
    }

    let lookups = prefs.artists.iter().map(|id| client.artist_top_tracks(id));
    for (artist_id, result) in prefs.artists.iter().zip(join_all(lookups).await) {
        match result {
            Ok(top) => tracks.extend(top),
            Err(e) => warn!("skipping artist {}: top-tracks fetch failed: {}", artist_id, e),
        }
    }

    let mut seen = HashSet::new();
    tracks.retain(|t| seen.insert(t.id.clone()));

    if let Some((low, high)) = prefs.popularity {
        tracks.retain(|t| t.popularity >= low && t.popularity <= high);
    }

    Ok(tracks)
}

/// Display orderings for an assembled track list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Insertion order, unchanged.
    #[default]
    Added,
    /// Most popular first.
    Popularity,
    /// Longest first.
    Duration,
    /// First artist name, A to Z.
    Artist,
}

pub fn sort_tracks(tracks: &mut [Track], sort: SortBy) {
    match sort {
        SortBy::Added => {}
        SortBy::Popularity => tracks.sort_by(|a, b| b.popularity.cmp(&a.popularity)),
        SortBy::Duration => tracks.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms)),
        SortBy::Artist => tracks.sort_by(|a, b| {
            let a_name = a.artists.first().map(|x| x.name.to_lowercase()).unwrap_or_default();
            let b_name = b.artists.first().map(|x| x.name.to_lowercase()).unwrap_or_default();
            a_name.cmp(&b_name)
        }),
    }
}

/// Case-insensitive substring filter over track name and first artist.
pub fn filter_tracks(tracks: &[Track], text: &str) -> Vec<Track> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return tracks.to_vec();
    }
    tracks
        .iter()
        .filter(|t| {
            t.name.to_lowercase().contains(&needle)
                || t.artists
                    .first()
                    .map(|a| a.name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .cloned()
        .collect()
}
