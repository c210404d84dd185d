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

use chrono::Utc;
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Playlist, PlaylistSource, Track};
use crate::storage::KeyValueStore;
use crate::token::now_epoch_ms;

pub const PLAYLISTS_KEY: &str = "spotify_playlists";
pub const FAVORITES_KEY: &str = "spotify_favorite_tracks";

/// Fields that `update_playlist` may merge into an existing playlist.
#[derive(Debug, Default, Clone)]
pub struct PlaylistUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
}

/// Local persistence for playlists and favorites.
///
/// Both collections share one discipline: deserialize on init, re-serialize
/// the whole collection on every mutation, last writer wins. A missing or
/// corrupt record loads as an empty collection and is logged, never
/// surfaced. Mutations that reference a missing id are silent no-ops, and
/// duplicate track adds are idempotent.
pub struct CollectionStore {
    store: Arc<dyn KeyValueStore>,
    playlists: Vec<Playlist>,
    favorites: Vec<Track>,
    last_allocated_id: u64,
}

impl CollectionStore {
    /// Loads both collections from the backing store.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let playlists = read_collection(store.as_ref(), PLAYLISTS_KEY);
        let favorites = read_collection(store.as_ref(), FAVORITES_KEY);
        Self {
            store,
            playlists,
            favorites,
            last_allocated_id: 0,
        }
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn favorites(&self) -> &[Track] {
        &self.favorites
    }

    pub fn playlist(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    /// Creates a playlist with no tracks. Returns `None` (and logs) when
    /// the name trims to empty.
    pub fn create_playlist(&mut self, name: &str, description: &str) -> Option<Playlist> {
        self.create_playlist_with_source(name, description, PlaylistSource::Local, None)
    }

    pub(crate) fn create_playlist_with_source(
        &mut self,
        name: &str,
        description: &str,
        source: PlaylistSource,
        cover_image: Option<String>,
    ) -> Option<Playlist> {
        let name = name.trim();
        if name.is_empty() {
            warn!("refusing to create a playlist with an empty name");
            return None;
        }

        let playlist = Playlist {
            id: self.allocate_id(),
            name: name.to_string(),
            description: description.to_string(),
            tracks: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
            source,
            cover_image,
        };
        self.playlists.push(playlist.clone());
        self.persist_playlists();
        Some(playlist)
    }

    /// Merges the provided fields into the matching playlist. Missing id
    /// is a no-op.
    pub fn update_playlist(&mut self, id: &str, update: PlaylistUpdate) {
        let Some(playlist) = self.playlists.iter_mut().find(|p| p.id == id) else {
            debug!("update_playlist: no playlist with id {}", id);
            return;
        };
        if let Some(name) = update.name {
            playlist.name = name;
        }
        if let Some(description) = update.description {
            playlist.description = description;
        }
        if let Some(cover_image) = update.cover_image {
            playlist.cover_image = Some(cover_image);
        }
        self.persist_playlists();
    }

    /// Removes the matching playlist. Missing id is a no-op.
    pub fn delete_playlist(&mut self, id: &str) {
        let before = self.playlists.len();
        self.playlists.retain(|p| p.id != id);
        if self.playlists.len() == before {
            debug!("delete_playlist: no playlist with id {}", id);
            return;
        }
        self.persist_playlists();
    }

    /// Appends the track to the playlist's sequence. Idempotent: a track
    /// id already present keeps its original position and nothing is
    /// written.
    pub fn add_track_to_playlist(&mut self, playlist_id: &str, track: Track) {
        let Some(playlist) = self.playlists.iter_mut().find(|p| p.id == playlist_id) else {
            debug!("add_track_to_playlist: no playlist with id {}", playlist_id);
            return;
        };
        if playlist.contains_track(&track.id) {
            return;
        }
        playlist.tracks.push(track);
        self.persist_playlists();
    }

    /// Removes the matching track. Missing playlist or track is a no-op.
    pub fn remove_track_from_playlist(&mut self, playlist_id: &str, track_id: &str) {
        let Some(playlist) = self.playlists.iter_mut().find(|p| p.id == playlist_id) else {
            debug!("remove_track_from_playlist: no playlist with id {}", playlist_id);
            return;
        };
        let before = playlist.tracks.len();
        playlist.tracks.retain(|t| t.id != track_id);
        if playlist.tracks.len() == before {
            return;
        }
        self.persist_playlists();
    }

    /// Adds the track to favorites. Idempotent by track id.
    pub fn add_favorite(&mut self, track: Track) {
        if self.is_favorite(&track.id) {
            return;
        }
        self.favorites.push(track);
        self.persist_favorites();
    }

    /// Removes the matching track from favorites. Missing id is a no-op.
    pub fn remove_favorite(&mut self, track_id: &str) {
        let before = self.favorites.len();
        self.favorites.retain(|t| t.id != track_id);
        if self.favorites.len() == before {
            return;
        }
        self.persist_favorites();
    }

    pub fn is_favorite(&self, track_id: &str) -> bool {
        self.favorites.iter().any(|t| t.id == track_id)
    }

    /// Time-derived id, bumped past the previous one so that two
    /// allocations in the same millisecond still differ.
    fn allocate_id(&mut self) -> String {
        let mut id = now_epoch_ms();
        if id <= self.last_allocated_id {
            id = self.last_allocated_id + 1;
        }
        self.last_allocated_id = id;
        id.to_string()
    }

    fn persist_playlists(&self) {
        write_collection(self.store.as_ref(), PLAYLISTS_KEY, &self.playlists);
    }

    fn persist_favorites(&self) {
        write_collection(self.store.as_ref(), FAVORITES_KEY, &self.favorites);
    }
}

fn read_collection<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let Some(raw) = store.get(key) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            warn!("discarding corrupt record under '{}': {}", key, e);
            Vec::new()
        }
    }
}

fn write_collection<T: Serialize>(store: &dyn KeyValueStore, key: &str, items: &[T]) {
    match serde_json::to_string(items) {
        Ok(raw) => {
            if let Err(e) = store.set(key, &raw) {
                error!("failed to persist '{}': {}", key, e);
            }
        }
        Err(e) => error!("failed to serialize '{}': {}", key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlbumRef, ArtistRef};
    use crate::storage::MemoryStore;
    use std::collections::HashMap;

    fn track(id: &str, name: &str) -> Track {
        Track {
            id: id.to_string(),
            name: name.to_string(),
            artists: vec![ArtistRef {
                id: format!("artist-{}", id),
                name: "Artist".to_string(),
            }],
            album: AlbumRef::default(),
            duration_ms: 200_000,
            popularity: 50,
            uri: format!("spotify:track:{}", id),
            external_urls: HashMap::new(),
        }
    }

    fn fresh() -> (Arc<MemoryStore>, CollectionStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = CollectionStore::load(kv.clone());
        (kv, store)
    }

    #[test]
    fn test_create_playlist_persists_and_returns_record() {
        let (kv, mut store) = fresh();
        let playlist = store.create_playlist("Road Trip", "for the car").unwrap();

        assert_eq!(playlist.name, "Road Trip");
        assert_eq!(playlist.description, "for the car");
        assert!(playlist.tracks.is_empty());
        assert_eq!(playlist.source, PlaylistSource::Local);

        // A second store over the same backing data sees the playlist.
        let reloaded = CollectionStore::load(kv);
        assert_eq!(reloaded.playlists().len(), 1);
        assert_eq!(reloaded.playlists()[0].name, "Road Trip");
    }

    #[test]
    fn test_create_playlist_rejects_empty_name() {
        let (_, mut store) = fresh();
        assert!(store.create_playlist("", "x").is_none());
        assert!(store.create_playlist("   ", "x").is_none());
        assert!(store.playlists().is_empty());
    }

    #[test]
    fn test_created_ids_are_unique_within_a_session() {
        let (_, mut store) = fresh();
        let a = store.create_playlist("A", "").unwrap();
        let b = store.create_playlist("B", "").unwrap();
        let c = store.create_playlist("C", "").unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
    }

    #[test]
    fn test_update_playlist_merges_fields() {
        let (_, mut store) = fresh();
        let playlist = store.create_playlist("Old Name", "old desc").unwrap();

        store.update_playlist(
            &playlist.id,
            PlaylistUpdate {
                name: Some("New Name".to_string()),
                ..Default::default()
            },
        );

        let updated = store.playlist(&playlist.id).unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.description, "old desc");
    }

    #[test]
    fn test_update_missing_playlist_is_noop() {
        let (_, mut store) = fresh();
        store.create_playlist("Keep", "").unwrap();
        store.update_playlist(
            "no-such-id",
            PlaylistUpdate {
                name: Some("x".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(store.playlists()[0].name, "Keep");
    }

    #[test]
    fn test_delete_playlist() {
        let (kv, mut store) = fresh();
        let playlist = store.create_playlist("Doomed", "").unwrap();
        store.delete_playlist(&playlist.id);
        assert!(store.playlists().is_empty());

        store.delete_playlist("no-such-id");

        let reloaded = CollectionStore::load(kv);
        assert!(reloaded.playlists().is_empty());
    }

    #[test]
    fn test_add_track_twice_keeps_one_copy_in_place() {
        let (_, mut store) = fresh();
        let playlist = store.create_playlist("Road Trip", "").unwrap();

        store.add_track_to_playlist(&playlist.id, track("t1", "Song A"));
        store.add_track_to_playlist(&playlist.id, track("t2", "Song B"));
        store.add_track_to_playlist(&playlist.id, track("t1", "Song A"));

        let tracks = &store.playlist(&playlist.id).unwrap().tracks;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "t1");
        assert_eq!(tracks[1].id, "t2");
    }

    #[test]
    fn test_add_track_to_missing_playlist_is_noop() {
        let (_, mut store) = fresh();
        store.add_track_to_playlist("ghost", track("t1", "Song A"));
        assert!(store.playlists().is_empty());
    }

    #[test]
    fn test_remove_track_from_playlist() {
        let (_, mut store) = fresh();
        let playlist = store.create_playlist("P", "").unwrap();
        store.add_track_to_playlist(&playlist.id, track("t1", "Song A"));
        store.add_track_to_playlist(&playlist.id, track("t2", "Song B"));

        store.remove_track_from_playlist(&playlist.id, "t1");
        let tracks = &store.playlist(&playlist.id).unwrap().tracks;
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "t2");

        // Absent track and absent playlist are both silent.
        store.remove_track_from_playlist(&playlist.id, "t1");
        store.remove_track_from_playlist("ghost", "t2");
    }

    #[test]
    fn test_add_favorite_is_idempotent() {
        let (_, mut store) = fresh();
        store.add_favorite(track("t1", "Song A"));
        store.add_favorite(track("t1", "Song A"));
        assert_eq!(store.favorites().len(), 1);
        assert_eq!(store.favorites()[0].id, "t1");
        assert!(store.is_favorite("t1"));
    }

    #[test]
    fn test_remove_favorite() {
        let (kv, mut store) = fresh();
        store.add_favorite(track("t1", "Song A"));
        store.add_favorite(track("t2", "Song B"));

        store.remove_favorite("t1");
        assert!(!store.is_favorite("t1"));
        assert!(store.is_favorite("t2"));

        store.remove_favorite("never-added");
        assert_eq!(store.favorites().len(), 1);

        let reloaded = CollectionStore::load(kv);
        assert_eq!(reloaded.favorites().len(), 1);
    }

    #[test]
    fn test_favorites_and_playlists_have_independent_lifecycles() {
        let (_, mut store) = fresh();
        let playlist = store.create_playlist("P", "").unwrap();
        store.add_track_to_playlist(&playlist.id, track("t1", "Song A"));
        store.add_favorite(track("t1", "Song A"));

        store.delete_playlist(&playlist.id);
        assert!(store.is_favorite("t1"));

        store.remove_favorite("t1");
        assert!(store.favorites().is_empty());
    }

    #[test]
    fn test_corrupt_record_loads_as_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(PLAYLISTS_KEY, "{not json").unwrap();
        kv.set(FAVORITES_KEY, "42").unwrap();

        let store = CollectionStore::load(kv);
        assert!(store.playlists().is_empty());
        assert!(store.favorites().is_empty());
    }

    #[test]
    fn test_every_mutation_rewrites_the_collection() {
        let (kv, mut store) = fresh();
        let playlist = store.create_playlist("P", "").unwrap();

        store.add_track_to_playlist(&playlist.id, track("t1", "Song A"));
        let after_add = kv.get(PLAYLISTS_KEY).unwrap();
        assert!(after_add.contains("Song A"));

        store.remove_track_from_playlist(&playlist.id, "t1");
        let after_remove = kv.get(PLAYLISTS_KEY).unwrap();
        assert!(!after_remove.contains("Song A"));
    }
}
