//! One-shot library commands: listing, favorites and playlists.

use std::sync::Arc;

use anyhow::{ bail, Context, Result };

use tunedeck_core::media::filter_by_name;
use tunedeck_core::{
    fetch_all, format_time, DirectoryIndex, LibraryStore, MediaIndex, Playlist, StoreError,
    TrackId, TrackRef,
};

use crate::cli::{ FavoritesAction, PlaylistAction };


/// Everything a command needs to reach the library.
#[derive( Clone )]
pub struct Library {
    pub index: Arc<DirectoryIndex>,
    pub store: LibraryStore,
    pub page_size: usize,
}


impl Library {
    /// Resolves a track id through the media index.
    pub async fn track( &self, id: &str ) -> Result<TrackRef> {
        self.index.lookup( &TrackId::from( id ) ).await?
            .with_context( || format!( "No track with id {}", id ) )
    }


    /// Finds a playlist by id, or else by name ignoring case.
    pub async fn playlist( &self, key: &str ) -> Result<Playlist> {
        match self.store.playlist( key ).await {
            Ok( playlist ) => Ok( playlist ),
            Err( StoreError::NotFound( _ ) ) => {
                let wanted = key.to_lowercase();
                self.store.playlists().await
                    .into_iter()
                    .find( |p| p.name.to_lowercase() == wanted )
                    .with_context( || format!( "No playlist named or with id {:?}", key ) )
            }
            Err( e ) => Err( e.into() ),
        }
    }
}


/// Formats one track listing line.
pub fn track_line( track: &TrackRef ) -> String {
    format!( "{}  {:>6}  {}", track.id, format_time( track.duration ), track.name )
}


pub async fn tracks( library: &Library, album: Option<&str>, search: Option<&str> ) -> Result<()> {
    let tracks = fetch_all( library.index.as_ref(), album, library.page_size ).await;
    let shown = match search {
        Some( query ) => filter_by_name( &tracks, query ),
        None => tracks.iter().collect(),
    };

    for track in &shown {
        println!( "{}", track_line( track ) );
    }
    println!( "{} tracks", shown.len() );
    Ok(())
}


pub async fn albums( library: &Library ) -> Result<()> {
    let albums = library.index.albums().await?;
    for album in &albums {
        println!( "{}  {:>4}  {}", album.id, album.track_count, album.title );
    }
    println!( "{} albums", albums.len() );
    Ok(())
}


pub async fn favorites( library: &Library, action: FavoritesAction ) -> Result<()> {
    let store = &library.store;

    match action {
        FavoritesAction::List => {
            let favorites = store.favorites().await;
            for track in &favorites {
                println!( "{}", track_line( track ) );
            }
            println!( "{} favorites", favorites.len() );
        }
        FavoritesAction::Add { track } => {
            let track = library.track( &track ).await?;
            if store.add_track_to_favorites( &track ).await? {
                println!( "Added {} to favorites", track.name );
            } else {
                println!( "{} is already a favorite", track.name );
            }
        }
        FavoritesAction::Remove { track } => {
            if store.remove_track_from_favorites( &TrackId::from( track.as_str() ) ).await? {
                println!( "Removed {} from favorites", track );
            } else {
                println!( "{} was not a favorite", track );
            }
        }
        FavoritesAction::Toggle { track } => {
            let track = library.track( &track ).await?;
            if store.toggle_favorite( &track ).await? {
                println!( "Added {} to favorites", track.name );
            } else {
                println!( "Removed {} from favorites", track.name );
            }
        }
    }

    Ok(())
}


pub async fn playlist( library: &Library, action: PlaylistAction ) -> Result<()> {
    let store = &library.store;

    match action {
        PlaylistAction::List => {
            let playlists = store.playlists().await;
            for p in &playlists {
                println!(
                    "{}  {:>4} tracks  {:>7}  {}",
                    p.id, p.tracks.len(), format_time( p.total_duration() ), p.name
                );
            }
            println!( "{} playlists", playlists.len() );
        }
        PlaylistAction::Show { playlist } => {
            let playlist = library.playlist( &playlist ).await?;
            println!( "{} ({})", playlist.name, playlist.id );
            for ( i, track ) in playlist.tracks.iter().enumerate() {
                println!( "{:>3}. {}", i + 1, track_line( track ) );
            }
        }
        PlaylistAction::Create { name } => {
            let playlist = store.create_playlist( &name ).await?;
            println!( "Created {} ({})", playlist.name, playlist.id );
        }
        PlaylistAction::Rename { playlist, name } => {
            let id = library.playlist( &playlist ).await?.id;
            let renamed = store.rename_playlist( &id, &name ).await?;
            println!( "Renamed to {}", renamed.name );
        }
        PlaylistAction::Delete { playlist } => {
            let found = library.playlist( &playlist ).await?;
            store.delete_playlist( &found.id ).await?;
            println!( "Deleted {}", found.name );
        }
        PlaylistAction::Add { playlist, tracks } => {
            let id = library.playlist( &playlist ).await?.id;
            let mut resolved = Vec::with_capacity( tracks.len() );
            for track in &tracks {
                resolved.push( library.track( track ).await? );
            }
            let before = store.playlist( &id ).await?.tracks.len();
            let updated = store.add_tracks_to_playlist( &id, &resolved ).await?;
            println!( "Added {} tracks to {}", updated.tracks.len() - before, updated.name );
        }
        PlaylistAction::Remove { playlist, track } => {
            let id = library.playlist( &playlist ).await?.id;
            let track_id = TrackId::from( track.as_str() );
            let updated = store.remove_track_from_playlist( &id, &track_id ).await?;
            println!( "{} now has {} tracks", updated.name, updated.tracks.len() );
        }
        PlaylistAction::QuickAdd { track } => {
            let track = library.track( &track ).await?;
            let updated = store.quick_add_to_playlist( &track ).await?;
            println!( "Added {} to {}", track.name, updated.name );
        }
    }

    Ok(())
}


/// Builds the track list for a listening session.
pub async fn session_tracks(
    library: &Library,
    playlist: Option<&str>,
    album: Option<&str>,
) -> Result<Vec<TrackRef>> {
    let tracks = match ( playlist, album ) {
        ( Some( playlist ), _ ) => library.playlist( playlist ).await?.tracks,
        ( None, Some( album ) ) => fetch_all( library.index.as_ref(), Some( album ), library.page_size ).await,
        ( None, None ) => fetch_all( library.index.as_ref(), None, library.page_size ).await,
    };

    if tracks.is_empty() {
        bail!( "Nothing to play" );
    }
    Ok( tracks )
}


#[cfg( test )]
mod tests {
    use super::*;

    use tunedeck_core::MemoryStorage;


    fn library( dir: &tempfile::TempDir ) -> Library {
        for name in [ "one.mp3", "two.mp3" ] {
            std::fs::write( dir.path().join( name ), b"x" ).unwrap();
        }
        Library {
            index: Arc::new( DirectoryIndex::with_roots( [ dir.path().to_path_buf() ] ).without_probing() ),
            store: LibraryStore::new( Arc::new( MemoryStorage::new() ) ),
            page_size: 1,
        }
    }


    #[tokio::test]
    async fn test_playlist_found_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let library = library( &dir );
        let created = library.store.create_playlist( "Road Trip" ).await.unwrap();

        assert_eq!( library.playlist( "road trip" ).await.unwrap().id, created.id );
        assert_eq!( library.playlist( &created.id ).await.unwrap().name, "Road Trip" );
        assert!( library.playlist( "missing" ).await.is_err() );
    }


    #[tokio::test]
    async fn test_session_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let library = library( &dir );

        let all = session_tracks( &library, None, None ).await.unwrap();
        assert_eq!( all.len(), 2 );
        assert!( session_tracks( &library, None, Some( "nope" ) ).await.is_err() );

        let p = library.store.create_playlist( "Empty" ).await.unwrap();
        assert!( session_tracks( &library, Some( &p.id ), None ).await.is_err() );
    }


    #[tokio::test]
    async fn test_unknown_track() {
        let dir = tempfile::tempdir().unwrap();
        let library = library( &dir );
        assert!( library.track( "nope" ).await.is_err() );
        assert!( favorites( &library, FavoritesAction::Add { track: "nope".into() } ).await.is_err() );
    }
}
