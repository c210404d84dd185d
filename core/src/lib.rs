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

pub mod auth;
pub mod client;
pub mod collections;
pub mod import;
pub mod models;
pub mod query;
pub mod storage;
pub mod token;

// Re-export key items for convenience
pub use auth::{AuthConfig, AuthError, AuthFlow, DirectExchanger, RelayExchanger, TokenExchanger};
pub use client::{ApiError, SpotifyClient};
pub use collections::{CollectionStore, PlaylistUpdate};
pub use import::{import_from_spotify, import_playlists, RemoteImport};
pub use models::{ImportSummary, Playlist, PlaylistSource, Track, UserProfile};
pub use query::{build_search_query, generate_playlist, Preferences, SortBy};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token::TokenStore;
