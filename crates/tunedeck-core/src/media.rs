//! Device media index
//!
//! The index enumerates playable tracks page by page and resolves track ids
//! back to full references. Screens and the playback machine only see this
//! trait; [`crate::library::DirectoryIndex`] is the filesystem implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::track::{ TrackId, TrackRef };


/// Page size used when walking a whole listing.
pub const DEFAULT_PAGE_SIZE: usize = 300;


/// Errors that can occur while querying the media index.
#[derive( Debug, Error )]
pub enum MediaIndexError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "Invalid page cursor: {0}" )]
    InvalidCursor( String ),
}


/// A group of tracks, e.g. a directory of files.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
pub struct Album {
    pub id: String,
    pub title: String,
    pub track_count: usize,
}


/// Page request.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct PageRequest {
    /// Maximum number of items to return.
    pub first: usize,

    /// Cursor returned as `end_cursor` by the previous page.
    pub after: Option<String>,

    /// Restrict the listing to one album.
    pub album: Option<String>,
}


/// One page of a listing.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct Page {
    pub items: Vec<TrackRef>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}


/// The device media index.
#[async_trait]
pub trait MediaIndex: Send + Sync {
    /// Returns one page of tracks.
    async fn page( &self, request: PageRequest ) -> Result<Page, MediaIndexError>;

    /// Resolves a track id.
    async fn lookup( &self, id: &TrackId ) -> Result<Option<TrackRef>, MediaIndexError>;

    /// Lists albums.
    async fn albums( &self ) -> Result<Vec<Album>, MediaIndexError>;
}


/// Walks every page of a listing.
///
/// Failures degrade to an empty list; an app without a readable library must
/// still work.
pub async fn fetch_all(
    index: &dyn MediaIndex,
    album: Option<&str>,
    page_size: usize,
) -> Vec<TrackRef> {
    let mut all = Vec::new();
    let mut after = None;

    loop {
        let request = PageRequest {
            first: page_size.max( 1 ),
            after: after.take(),
            album: album.map( str::to_string ),
        };

        let page = match index.page( request ).await {
            Ok( page ) => page,
            Err( e ) => {
                tracing::warn!( "Listing tracks failed, showing none: {}", e );
                return Vec::new();
            }
        };

        all.extend( page.items );

        match page.end_cursor {
            Some( cursor ) if page.has_next_page => after = Some( cursor ),
            _ => break,
        }
    }

    tracing::debug!( "Fetched {} tracks", all.len() );
    all
}


/// Keeps tracks whose name contains `query`, ignoring case.
pub fn filter_by_name<'a>( tracks: &'a [TrackRef], query: &str ) -> Vec<&'a TrackRef> {
    let query = query.to_lowercase();
    tracks.iter()
        .filter( |t| t.name.to_lowercase().contains( &query ) )
        .collect()
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::sync::atomic::{ AtomicUsize, Ordering };


    /// Index over a fixed list using numeric offsets as cursors.
    struct ListIndex {
        tracks: Vec<TrackRef>,
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }


    impl ListIndex {
        fn new( n: usize ) -> Self {
            let tracks = ( 0..n )
                .map( |i| TrackRef::new( format!( "{}", i ), format!( "Song {}.mp3", i ), format!( "file:///{}.mp3", i ) ) )
                .collect();
            Self { tracks, calls: AtomicUsize::new( 0 ), fail_after: None }
        }
    }


    #[async_trait]
    impl MediaIndex for ListIndex {
        async fn page( &self, request: PageRequest ) -> Result<Page, MediaIndexError> {
            let call = self.calls.fetch_add( 1, Ordering::SeqCst );
            if self.fail_after.is_some_and( |n| call >= n ) {
                return Err( MediaIndexError::InvalidCursor( "boom".into() ) );
            }

            let start = match request.after {
                Some( c ) => c.parse().map_err( |_| MediaIndexError::InvalidCursor( c ) )?,
                None => 0,
            };
            let end = ( start + request.first ).min( self.tracks.len() );
            Ok( Page {
                items: self.tracks[ start..end ].to_vec(),
                end_cursor: Some( end.to_string() ),
                has_next_page: end < self.tracks.len(),
            })
        }


        async fn lookup( &self, id: &TrackId ) -> Result<Option<TrackRef>, MediaIndexError> {
            Ok( self.tracks.iter().find( |t| t.id == *id ).cloned() )
        }


        async fn albums( &self ) -> Result<Vec<Album>, MediaIndexError> {
            Ok( Vec::new() )
        }
    }


    #[tokio::test]
    async fn test_fetch_all_walks_pages() {
        let index = ListIndex::new( 25 );
        let all = fetch_all( &index, None, 10 ).await;
        assert_eq!( all.len(), 25 );
        assert_eq!( index.calls.load( Ordering::SeqCst ), 3 );
        assert_eq!( all[ 24 ].id, TrackId::from( "24" ) );
    }


    #[tokio::test]
    async fn test_fetch_all_degrades_on_failure() {
        let mut index = ListIndex::new( 25 );
        index.fail_after = Some( 1 );
        assert!( fetch_all( &index, None, 10 ).await.is_empty() );
    }


    #[tokio::test]
    async fn test_fetch_all_empty_library() {
        let index = ListIndex::new( 0 );
        assert!( fetch_all( &index, None, DEFAULT_PAGE_SIZE ).await.is_empty() );
    }


    #[test]
    fn test_filter_by_name() {
        let tracks = vec![
            TrackRef::new( "1", "Blue Monday.mp3", "file:///1" ),
            TrackRef::new( "2", "Yellow.flac", "file:///2" ),
            TrackRef::new( "3", "BLUE train.ogg", "file:///3" ),
        ];
        let hits = filter_by_name( &tracks, "blue" );
        assert_eq!( hits.len(), 2 );
        assert_eq!( filter_by_name( &tracks, "" ).len(), 3 );
    }
}
