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

use futures::future::join_all;
use log::{info, warn};

use crate::client::{ApiError, SpotifyClient};
use crate::collections::CollectionStore;
use crate::models::{ImportSummary, PlaylistSource, Track};

/// A remote playlist with its track listing already resolved, ready to be
/// copied into the local collection store.
#[derive(Debug, Clone)]
pub struct RemoteImport {
    pub name: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub tracks: Vec<Track>,
}

/// Copies remote playlists into the local store.
///
/// Each remote playlist with at least one resolvable track becomes a local
/// playlist with `source = spotify`, carrying name, description and cover;
/// tracks keep their original order and go through the usual dedup rule.
/// Playlists with zero tracks are skipped, not imported.
pub fn import_playlists(
    collections: &mut CollectionStore,
    remotes: Vec<RemoteImport>,
) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for remote in remotes {
        if remote.tracks.is_empty() {
            summary.skipped += 1;
            continue;
        }

        let Some(playlist) = collections.create_playlist_with_source(
            &remote.name,
            &remote.description,
            PlaylistSource::Spotify,
            remote.cover_image,
        ) else {
            warn!("skipping remote playlist with unusable name");
            summary.skipped += 1;
            continue;
        };

        for track in remote.tracks {
            collections.add_track_to_playlist(&playlist.id, track);
        }
        summary.imported += 1;
    }

    summary
}

/// Fetches the user's Spotify playlists and imports them.
///
/// Track listings are fetched concurrently, one request chain per
/// playlist. A playlist whose fetch fails is skipped with a log line; the
/// rest of the batch continues.
pub async fn import_from_spotify(
    client: &SpotifyClient,
    collections: &mut CollectionStore,
) -> Result<ImportSummary, ApiError> {
    let remote_playlists = client.current_user_playlists().await?;
    info!("found {} Spotify playlists to import", remote_playlists.len());

    let fetches = remote_playlists
        .iter()
        .map(|p| client.playlist_tracks(&p.tracks.href));
    let results = join_all(fetches).await;

    let mut failed = 0u32;
    let mut resolved = Vec::new();
    for (playlist, result) in remote_playlists.into_iter().zip(results) {
        match result {
            Ok(tracks) => resolved.push(RemoteImport {
                name: playlist.name,
                description: playlist.description,
                cover_image: playlist.images.first().map(|i| i.url.clone()),
                tracks,
            }),
            Err(e) => {
                warn!("skipping playlist '{}': track fetch failed: {}", playlist.name, e);
                failed += 1;
            }
        }
    }

    let mut summary = import_playlists(collections, resolved);
    summary.skipped += failed;
    Ok(summary)
}
