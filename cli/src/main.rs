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

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;

use mixer_core::auth::parse_callback_url;
use mixer_core::query::{filter_tracks, sort_tracks};
use mixer_core::{
    generate_playlist, import_from_spotify, AuthConfig, AuthFlow, CollectionStore, DirectExchanger,
    FileStore, Playlist, PlaylistUpdate, Preferences, RelayExchanger, SortBy, SpotifyClient,
    TokenExchanger, TokenStore, Track,
};

#[derive(Parser)]
#[command(name = "taste-mixer")]
#[command(about = "Mix your Spotify tastes into personal playlists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Added,
    Popularity,
    Duration,
    Artist,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Added => SortBy::Added,
            SortArg::Popularity => SortBy::Popularity,
            SortArg::Duration => SortBy::Duration,
            SortArg::Artist => SortBy::Artist,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the Spotify authorization URL to open in a browser
    Login,
    /// Completes the login with the redirect URL Spotify sent you to
    Callback {
        /// The full URL from the browser's address bar after authorizing
        #[arg(value_name = "REDIRECT_URL")]
        redirect_url: String,
    },
    /// Forgets the stored tokens
    Logout,
    /// Shows whether you are signed in, and as whom
    Status,
    /// Searches Spotify for tracks
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Generates a track list from decade/genre/track/artist filters
    Generate {
        /// Decade start year, e.g. 1980 (repeatable)
        #[arg(long = "decade")]
        decades: Vec<String>,
        /// Genre name (repeatable)
        #[arg(long = "genre")]
        genres: Vec<String>,
        /// Track name (repeatable)
        #[arg(long = "track")]
        tracks: Vec<String>,
        /// Spotify artist ID, resolved via its top tracks (repeatable)
        #[arg(long = "artist")]
        artists: Vec<String>,
        #[arg(long, default_value_t = 0)]
        min_popularity: u8,
        #[arg(long, default_value_t = 100)]
        max_popularity: u8,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, value_enum, default_value = "added")]
        sort: SortArg,
        /// Save the generated list as a local playlist with this name
        #[arg(long)]
        save: Option<String>,
        /// Output the generated tracks to a JSON file (e.g., --json=mix.json)
        #[arg(long)]
        json: Option<String>,
    },
    /// Lists your local playlists
    Playlists,
    /// Shows one local playlist's tracks
    Show {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
        #[arg(long, value_enum, default_value = "added")]
        sort: SortArg,
        /// Only show tracks whose name or artist contains this text
        #[arg(long)]
        filter: Option<String>,
    },
    /// Creates an empty local playlist
    Create {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Renames a local playlist
    Rename {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
        #[arg(value_name = "NEW_NAME")]
        name: String,
    },
    /// Deletes a local playlist
    Delete {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
    },
    /// Searches Spotify and adds the top hit to a local playlist
    Add {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Removes a track from a local playlist
    Remove {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
        #[arg(value_name = "TRACK_ID")]
        track_id: String,
    },
    /// Lists your favorite tracks
    Favorites,
    /// Searches Spotify and favorites the top hit
    Fav {
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Removes a track from favorites
    Unfav {
        #[arg(value_name = "TRACK_ID")]
        track_id: String,
    },
    /// Imports your Spotify playlists into the local store
    Import,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // Silently ignore
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Login => handle_login(),
        Commands::Callback { redirect_url } => handle_callback(&redirect_url).await,
        Commands::Logout => handle_logout(),
        Commands::Status => handle_status().await,
        Commands::Search { query, limit } => handle_search(&query, limit).await,
        Commands::Generate {
            decades,
            genres,
            tracks,
            artists,
            min_popularity,
            max_popularity,
            limit,
            sort,
            save,
            json,
        } => {
            let prefs = Preferences {
                decades,
                genres,
                tracks,
                artists,
                popularity: Some((min_popularity, max_popularity)),
            };
            handle_generate(prefs, limit, sort.into(), save.as_deref(), json.as_deref()).await
        }
        Commands::Playlists => handle_playlists(),
        Commands::Show {
            playlist_id,
            sort,
            filter,
        } => handle_show(&playlist_id, sort.into(), filter.as_deref()),
        Commands::Create { name, description } => handle_create(&name, &description),
        Commands::Rename { playlist_id, name } => handle_rename(&playlist_id, &name),
        Commands::Delete { playlist_id } => handle_delete(&playlist_id),
        Commands::Add { playlist_id, query } => handle_add(&playlist_id, &query).await,
        Commands::Remove {
            playlist_id,
            track_id,
        } => handle_remove(&playlist_id, &track_id),
        Commands::Favorites => handle_favorites(),
        Commands::Fav { query } => handle_fav(&query).await,
        Commands::Unfav { track_id } => handle_unfav(&track_id),
        Commands::Import => handle_import().await,
    }
}

fn open_store() -> Result<Arc<FileStore>> {
    let dir = env::var("TASTE_MIXER_DATA_DIR").unwrap_or_else(|_| ".taste-mixer".to_string());
    let store = FileStore::open(&dir).with_context(|| format!("cannot open data dir '{}'", dir))?;
    Ok(Arc::new(store))
}

fn market() -> String {
    env::var("SPOTIFY_MARKET").unwrap_or_else(|_| "ES".to_string())
}

fn auth_flow(store: Arc<FileStore>) -> Result<AuthFlow> {
    let client_id =
        env::var("SPOTIFY_CLIENT_ID").context("SPOTIFY_CLIENT_ID is not set")?;
    let redirect_uri =
        env::var("SPOTIFY_REDIRECT_URI").context("SPOTIFY_REDIRECT_URI is not set")?;

    let exchanger: Arc<dyn TokenExchanger> = if let Ok(secret) = env::var("SPOTIFY_CLIENT_SECRET") {
        Arc::new(DirectExchanger::new(
            client_id.clone(),
            secret,
            redirect_uri.clone(),
        ))
    } else if let Ok(relay_url) = env::var("TASTE_MIXER_RELAY_URL") {
        Arc::new(RelayExchanger::new(relay_url))
    } else {
        bail!("set SPOTIFY_CLIENT_SECRET or TASTE_MIXER_RELAY_URL to exchange tokens");
    };

    Ok(AuthFlow::new(
        AuthConfig {
            client_id,
            redirect_uri,
        },
        store.clone(),
        TokenStore::new(store),
        exchanger,
    ))
}

fn api_client(store: Arc<FileStore>) -> Result<SpotifyClient> {
    let tokens = TokenStore::new(store);
    if !tokens.is_authenticated() {
        bail!("not signed in (or the session expired); run 'taste-mixer login'");
    }
    let access_token = tokens
        .access_token()
        .context("no access token in the store")?;
    Ok(SpotifyClient::new(access_token, market()))
}

fn handle_login() -> Result<()> {
    let store = open_store()?;
    let flow = auth_flow(store)?;
    let url = flow.build_authorization_url();

    println!("Open this URL in your browser and authorize the app:");
    println!();
    println!("{}", url);
    println!();
    println!("Then finish with: taste-mixer callback \"<URL you were redirected to>\"");
    Ok(())
}

async fn handle_callback(redirect_url: &str) -> Result<()> {
    let store = open_store()?;
    let flow = auth_flow(store)?;

    let params = parse_callback_url(redirect_url)?;
    flow.handle_callback(
        params.code.as_deref(),
        params.state.as_deref(),
        params.error.as_deref(),
    )
    .await?;

    println!("[OK] Signed in. Tokens stored.");
    Ok(())
}

fn handle_logout() -> Result<()> {
    let store = open_store()?;
    TokenStore::new(store).clear();
    println!("Signed out.");
    Ok(())
}

async fn handle_status() -> Result<()> {
    let store = open_store()?;
    let tokens = TokenStore::new(store.clone());

    if !tokens.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }

    let client = api_client(store)?;
    match client.me().await {
        Ok(profile) => {
            println!(
                "Signed in as {} ({})",
                profile.display_name.unwrap_or_else(|| profile.id.clone()),
                profile.email.unwrap_or_else(|| "no email".to_string())
            );
        }
        Err(e) => {
            println!("Token stored but the profile fetch failed: {}", e);
        }
    }
    Ok(())
}

async fn handle_search(query: &str, limit: u32) -> Result<()> {
    let store = open_store()?;
    let client = api_client(store)?;

    let tracks = client.search_tracks(query, limit).await?;
    if tracks.is_empty() {
        println!("No tracks found for '{}'.", query);
        return Ok(());
    }
    print_tracks(&tracks);
    Ok(())
}

async fn handle_generate(
    prefs: Preferences,
    limit: u32,
    sort: SortBy,
    save: Option<&str>,
    json_path: Option<&str>,
) -> Result<()> {
    let store = open_store()?;
    let client = api_client(store.clone())?;

    println!("Generating from your filters...");
    let mut tracks = generate_playlist(&client, &prefs, limit).await?;
    sort_tracks(&mut tracks, sort);

    if tracks.is_empty() {
        println!("Nothing matched those filters.");
        return Ok(());
    }

    println!();
    println!("Generated {} tracks:", tracks.len());
    print_tracks(&tracks);

    if let Some(path) = json_path {
        let json_content = serde_json::to_string_pretty(&tracks)
            .context("failed to serialize the track list")?;
        std::fs::write(path, json_content)
            .with_context(|| format!("failed to write track list to '{}'", path))?;
        println!();
        println!("[SAVED] Track list saved to: {}", path);
    }

    if let Some(name) = save {
        let mut collections = CollectionStore::load(store);
        match collections.create_playlist(name, "Generated with taste-mixer") {
            Some(playlist) => {
                let count = tracks.len();
                for track in tracks {
                    collections.add_track_to_playlist(&playlist.id, track);
                }
                println!();
                println!("[SAVED] {} tracks into playlist '{}' ({})", count, playlist.name, playlist.id);
            }
            None => println!("Could not save: the playlist name is empty."),
        }
    }
    Ok(())
}

fn handle_playlists() -> Result<()> {
    let store = open_store()?;
    let collections = CollectionStore::load(store);

    let playlists = collections.playlists();
    if playlists.is_empty() {
        println!("No local playlists yet. Try 'create' or 'import'.");
        return Ok(());
    }

    println!(
        "{:<16} | {:<30} | {:<7} | {:<8}",
        "ID", "Name", "Tracks", "Source"
    );
    println!("{:-<16}-+-{:-<30}-+-{:-<7}-+-{:-<8}", "", "", "", "");
    for pl in playlists {
        let name = truncate_label(&pl.name, 28);
        println!(
            "{:<16} | {:<30} | {:<7} | {:<8}",
            pl.id,
            name,
            pl.tracks.len(),
            source_label(pl)
        );
    }
    Ok(())
}

fn handle_show(playlist_id: &str, sort: SortBy, filter: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let collections = CollectionStore::load(store);

    let Some(playlist) = collections.playlist(playlist_id) else {
        bail!("no local playlist with id '{}'", playlist_id);
    };

    println!("{} ({})", playlist.name, source_label(playlist));
    if !playlist.description.is_empty() {
        println!("{}", playlist.description);
    }
    println!("Created: {}", playlist.created_at);
    println!();

    let mut tracks = match filter {
        Some(text) => filter_tracks(&playlist.tracks, text),
        None => playlist.tracks.clone(),
    };
    sort_tracks(&mut tracks, sort);

    if tracks.is_empty() {
        println!("No tracks.");
        return Ok(());
    }
    print_tracks(&tracks);
    Ok(())
}

fn handle_create(name: &str, description: &str) -> Result<()> {
    let store = open_store()?;
    let mut collections = CollectionStore::load(store);

    match collections.create_playlist(name, description) {
        Some(playlist) => {
            println!("Created playlist '{}' with id {}", playlist.name, playlist.id);
            Ok(())
        }
        None => bail!("the playlist name must not be empty"),
    }
}

fn handle_rename(playlist_id: &str, name: &str) -> Result<()> {
    let store = open_store()?;
    let mut collections = CollectionStore::load(store);

    if collections.playlist(playlist_id).is_none() {
        bail!("no local playlist with id '{}'", playlist_id);
    }
    collections.update_playlist(
        playlist_id,
        PlaylistUpdate {
            name: Some(name.to_string()),
            ..Default::default()
        },
    );
    println!("Renamed playlist {} to '{}'", playlist_id, name);
    Ok(())
}

fn handle_delete(playlist_id: &str) -> Result<()> {
    let store = open_store()?;
    let mut collections = CollectionStore::load(store);
    collections.delete_playlist(playlist_id);
    println!("Deleted playlist {} (if it existed).", playlist_id);
    Ok(())
}

async fn handle_add(playlist_id: &str, query: &str) -> Result<()> {
    let store = open_store()?;
    let client = api_client(store.clone())?;

    let mut collections = CollectionStore::load(store);
    if collections.playlist(playlist_id).is_none() {
        bail!("no local playlist with id '{}'", playlist_id);
    }

    let track = top_hit(&client, query).await?;
    println!("Top hit: {}", track);
    collections.add_track_to_playlist(playlist_id, track);
    println!("Added to playlist {}.", playlist_id);
    Ok(())
}

fn handle_remove(playlist_id: &str, track_id: &str) -> Result<()> {
    let store = open_store()?;
    let mut collections = CollectionStore::load(store);
    collections.remove_track_from_playlist(playlist_id, track_id);
    println!("Removed {} from playlist {} (if present).", track_id, playlist_id);
    Ok(())
}

fn handle_favorites() -> Result<()> {
    let store = open_store()?;
    let collections = CollectionStore::load(store);

    if collections.favorites().is_empty() {
        println!("No favorite tracks yet. Try 'fav <query>'.");
        return Ok(());
    }
    print_tracks(collections.favorites());
    Ok(())
}

async fn handle_fav(query: &str) -> Result<()> {
    let store = open_store()?;
    let client = api_client(store.clone())?;

    let track = top_hit(&client, query).await?;
    println!("Top hit: {}", track);

    let mut collections = CollectionStore::load(store);
    collections.add_favorite(track);
    println!("Added to favorites.");
    Ok(())
}

fn handle_unfav(track_id: &str) -> Result<()> {
    let store = open_store()?;
    let mut collections = CollectionStore::load(store);
    collections.remove_favorite(track_id);
    println!("Removed {} from favorites (if present).", track_id);
    Ok(())
}

async fn handle_import() -> Result<()> {
    let store = open_store()?;
    let client = api_client(store.clone())?;
    let mut collections = CollectionStore::load(store);

    println!("Importing your Spotify playlists...");
    let summary = import_from_spotify(&client, &mut collections).await?;

    println!();
    println!("---------------------------------------------------");
    println!("IMPORT COMPLETE");
    println!("---------------------------------------------------");
    println!("Playlists imported: {}", summary.imported);
    println!("Playlists skipped:  {}", summary.skipped);
    println!("---------------------------------------------------");
    Ok(())
}

async fn top_hit(client: &SpotifyClient, query: &str) -> Result<Track> {
    let tracks = client.search_tracks(query, 1).await?;
    tracks
        .into_iter()
        .next()
        .with_context(|| format!("no track found for '{}'", query))
}

fn source_label(playlist: &Playlist) -> &'static str {
    match playlist.source {
        mixer_core::PlaylistSource::Local => "local",
        mixer_core::PlaylistSource::Spotify => "spotify",
    }
}

fn print_tracks(tracks: &[Track]) {
    for (i, track) in tracks.iter().enumerate() {
        println!("{:>3}. [{}] {}", i + 1, track.id, track);
    }
}

/// Shortens a label to `max_chars` characters. Counts chars, not bytes:
/// playlist names are arbitrary user text, accents included.
fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}..", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_label_keeps_short_names() {
        assert_eq!(truncate_label("Road Trip", 28), "Road Trip");
    }

    #[test]
    fn test_truncate_label_shortens_long_names() {
        let long = "a".repeat(40);
        let shown = truncate_label(&long, 28);
        assert_eq!(shown.chars().count(), 30);
        assert!(shown.ends_with(".."));
    }

    #[test]
    fn test_truncate_label_handles_multibyte_names() {
        // 27 ASCII chars followed by accented ones: byte 28 lands inside
        // a multi-byte character.
        let name = format!("{}éé", "a".repeat(27));
        assert_eq!(truncate_label(&name, 28), format!("{}é..", "a".repeat(27)));

        let spanish = "Canción de cumpleaños para mamá y papá";
        let shown = truncate_label(spanish, 28);
        assert!(shown.ends_with(".."));
        assert_eq!(shown.chars().count(), 30);
    }
}
