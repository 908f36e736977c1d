//! Filesystem media index
//!
//! Discovers audio files under a set of root directories. Each file becomes
//! a track whose id is derived from its path, so ids stay stable across
//! scans. The directory holding a file is its album.

use std::path::{ Path, PathBuf };
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use crate::media::{ Album, MediaIndex, MediaIndexError, Page, PageRequest };
use crate::probe::probe_duration;
use crate::track::{ MediaKind, TrackId, TrackRef };


/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma", "aiff", "alac",
];


/// A scanned audio file.
#[derive( Debug, Clone )]
pub struct ScannedTrack {
    pub path: PathBuf,
    pub track: TrackRef,
    pub album_id: String,
    pub album_title: String,
}


/// Media index over local directories.
pub struct DirectoryIndex {
    roots: Vec<PathBuf>,
    probe: bool,
    entries: RwLock<Option<Arc<Vec<ScannedTrack>>>>,
}


impl DirectoryIndex {
    /// Creates an index with no root directories.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            probe: true,
            entries: RwLock::new( None ),
        }
    }


    /// Creates an index over the given roots.
    pub fn with_roots( roots: impl IntoIterator<Item = PathBuf> ) -> Self {
        let mut index = Self::new();
        for root in roots {
            index.add_root( root );
        }
        index
    }


    /// Skips reading durations from the files. Tracks report duration 0.
    pub fn without_probing( mut self ) -> Self {
        self.probe = false;
        self
    }


    /// Adds a root directory to scan.
    pub fn add_root( &mut self, path: PathBuf ) {
        if !self.roots.contains( &path ) {
            self.roots.push( path );
            self.entries.get_mut().take();
        }
    }


    /// Removes a root directory.
    pub fn remove_root( &mut self, path: &Path ) -> bool {
        if let Some( pos ) = self.roots.iter().position( |p| p == path ) {
            self.roots.remove( pos );
            self.entries.get_mut().take();
            true
        } else {
            false
        }
    }


    /// Gets all root directories.
    pub fn roots( &self ) -> &[PathBuf] {
        &self.roots
    }


    /// Rescans all roots.
    ///
    /// @returns The number of tracks found
    pub async fn refresh( &self ) -> Result<usize, MediaIndexError> {
        let roots = self.roots.clone();
        let probe = self.probe;
        let scanned = tokio::task::spawn_blocking( move || scan( &roots, probe ) )
            .await
            .map_err( |e| MediaIndexError::Io( std::io::Error::other( e ) ) )??;

        let count = scanned.len();
        *self.entries.write().await = Some( Arc::new( scanned ) );
        Ok( count )
    }


    async fn entries( &self ) -> Result<Arc<Vec<ScannedTrack>>, MediaIndexError> {
        if let Some( entries ) = self.entries.read().await.as_ref() {
            return Ok( Arc::clone( entries ) );
        }
        self.refresh().await?;
        Ok( self.entries.read().await.as_ref().map( Arc::clone ).unwrap_or_default() )
    }
}


impl Default for DirectoryIndex {
    fn default() -> Self {
        Self::new()
    }
}


#[async_trait]
impl MediaIndex for DirectoryIndex {
    async fn page( &self, request: PageRequest ) -> Result<Page, MediaIndexError> {
        let entries = self.entries().await?;
        let matching: Vec<&ScannedTrack> = entries.iter()
            .filter( |e| request.album.as_ref().map_or( true, |a| *a == e.album_id ) )
            .collect();

        let start = match &request.after {
            Some( cursor ) => cursor.parse::<usize>()
                .ok()
                .filter( |offset| *offset <= matching.len() )
                .ok_or_else( || MediaIndexError::InvalidCursor( cursor.clone() ) )?,
            None => 0,
        };
        let end = start.saturating_add( request.first ).min( matching.len() );

        Ok( Page {
            items: matching[ start..end ].iter().map( |e| e.track.clone() ).collect(),
            end_cursor: ( end > start ).then( || end.to_string() ),
            has_next_page: end < matching.len(),
        })
    }


    async fn lookup( &self, id: &TrackId ) -> Result<Option<TrackRef>, MediaIndexError> {
        let entries = self.entries().await?;
        Ok( entries.iter().find( |e| e.track.id == *id ).map( |e| e.track.clone() ) )
    }


    async fn albums( &self ) -> Result<Vec<Album>, MediaIndexError> {
        let entries = self.entries().await?;
        let mut albums: Vec<Album> = Vec::new();

        for entry in entries.iter() {
            match albums.iter_mut().find( |a| a.id == entry.album_id ) {
                Some( album ) => album.track_count += 1,
                None => albums.push( Album {
                    id: entry.album_id.clone(),
                    title: entry.album_title.clone(),
                    track_count: 1,
                }),
            }
        }

        Ok( albums )
    }
}


/// Scans the roots and returns discovered audio files sorted by path.
pub fn scan( roots: &[PathBuf], probe: bool ) -> Result<Vec<ScannedTrack>, MediaIndexError> {
    let mut tracks = Vec::new();

    for root in roots {
        tracing::info!( "Scanning: {:?}", root );
        scan_recursive( root, probe, &mut tracks )?;
    }

    tracks.sort_by( |a, b| a.path.cmp( &b.path ) );
    tracing::info!( "Found {} tracks", tracks.len() );
    Ok( tracks )
}


fn scan_recursive(
    dir: &Path,
    probe: bool,
    tracks: &mut Vec<ScannedTrack>,
) -> Result<(), MediaIndexError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!( "Access denied: {:?}", dir );
            return Ok(());
        }
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err( MediaIndexError::NotFound( dir.to_path_buf() ) );
        }
        Err( e ) => return Err( MediaIndexError::Io( e ) ),
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            scan_recursive( &path, probe, tracks )?;
        } else if is_audio_file( &path ) {
            tracks.push( scanned_track( path, probe ) );
        }
    }

    Ok(())
}


fn scanned_track( path: PathBuf, probe: bool ) -> ScannedTrack {
    let path = path.canonicalize().unwrap_or( path );
    let parent = path.parent().map( Path::to_path_buf ).unwrap_or_default();

    let duration = if probe {
        match probe_duration( &path ) {
            Ok( duration ) => duration.unwrap_or( 0.0 ),
            Err( e ) => {
                tracing::debug!( "Could not probe {:?}: {}", path, e );
                0.0
            }
        }
    } else {
        0.0
    };

    let track = TrackRef {
        id: TrackId::new( stable_id( &path ) ),
        name: file_name( &path ),
        duration,
        locator: Url::from_file_path( &path ).map( String::from ).unwrap_or_default(),
        kind: MediaKind::Audio,
    };

    ScannedTrack {
        album_id: stable_id( &parent ),
        album_title: file_name( &parent ),
        path,
        track,
    }
}


fn stable_id( path: &Path ) -> String {
    Uuid::new_v5( &Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes() ).to_string()
}


fn file_name( path: &Path ) -> String {
    path.file_name()
        .map( |n| n.to_string_lossy().into_owned() )
        .unwrap_or_else( || "Unknown Album".to_string() )
}


/// Checks if a file has a supported audio extension.
fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::media::fetch_all;


    fn library() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let rock = dir.path().join( "Rock" );
        let jazz = dir.path().join( "Jazz" );
        std::fs::create_dir_all( &rock ).unwrap();
        std::fs::create_dir_all( &jazz ).unwrap();
        for name in [ "a.mp3", "b.FLAC", "cover.jpg" ] {
            std::fs::write( rock.join( name ), b"x" ).unwrap();
        }
        for name in [ "c.ogg", "notes.txt" ] {
            std::fs::write( jazz.join( name ), b"x" ).unwrap();
        }
        dir
    }


    fn index_for( dir: &tempfile::TempDir ) -> DirectoryIndex {
        DirectoryIndex::with_roots( [ dir.path().to_path_buf() ] ).without_probing()
    }


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "song.MP3" ) ) );
        assert!( !is_audio_file( Path::new( "cover.jpg" ) ) );
        assert!( !is_audio_file( Path::new( "README" ) ) );
    }


    #[tokio::test]
    async fn test_scan_finds_audio_only() {
        let dir = library();
        let index = index_for( &dir );
        let tracks = fetch_all( &index, None, 2 ).await;

        let names: Vec<_> = tracks.iter().map( |t| t.name.as_str() ).collect();
        assert_eq!( names, vec![ "c.ogg", "a.mp3", "b.FLAC" ] );
        assert!( tracks.iter().all( |t| t.locator.starts_with( "file://" ) ) );
    }


    #[tokio::test]
    async fn test_ids_are_stable_across_scans() {
        let dir = library();
        let first = fetch_all( &index_for( &dir ), None, 10 ).await;
        let second = fetch_all( &index_for( &dir ), None, 10 ).await;
        assert_eq!( first, second );
    }


    #[tokio::test]
    async fn test_lookup_and_albums() {
        let dir = library();
        let index = index_for( &dir );

        let albums = index.albums().await.unwrap();
        assert_eq!( albums.len(), 2 );
        let rock = albums.iter().find( |a| a.title == "Rock" ).unwrap();
        assert_eq!( rock.track_count, 2 );

        let rock_tracks = fetch_all( &index, Some( &rock.id ), 10 ).await;
        assert_eq!( rock_tracks.len(), 2 );

        let found = index.lookup( &rock_tracks[ 0 ].id ).await.unwrap();
        assert_eq!( found.as_ref(), Some( &rock_tracks[ 0 ] ) );
        assert_eq!( index.lookup( &TrackId::from( "missing" ) ).await.unwrap(), None );
    }


    #[tokio::test]
    async fn test_missing_root_is_error() {
        let index = DirectoryIndex::with_roots( [ PathBuf::from( "/definitely/not/here" ) ] );
        let result = index.page( PageRequest { first: 10, ..Default::default() } ).await;
        assert!( matches!( result, Err( MediaIndexError::NotFound( _ ) ) ) );
        assert!( fetch_all( &index, None, 10 ).await.is_empty() );
    }


    #[tokio::test]
    async fn test_invalid_cursor() {
        let dir = library();
        let index = index_for( &dir );
        let request = PageRequest { first: 10, after: Some( "abc".into() ), album: None };
        assert!( matches!( index.page( request ).await, Err( MediaIndexError::InvalidCursor( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_refresh_sees_new_files() {
        let dir = library();
        let index = index_for( &dir );
        assert_eq!( index.refresh().await.unwrap(), 3 );

        std::fs::write( dir.path().join( "Jazz" ).join( "d.wav" ), b"x" ).unwrap();
        assert_eq!( fetch_all( &index, None, 10 ).await.len(), 3 );
        assert_eq!( index.refresh().await.unwrap(), 4 );
    }
}
