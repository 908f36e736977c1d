//! Library store
//!
//! Favorites and playlists persisted through [`KeyValueStorage`]. Every
//! mutation runs load → transform → persist and only writes if the stored
//! payload is still the one it read, retrying otherwise. Concurrent callers
//! can never overwrite each other's changes, whether they share a store,
//! build their own over the same storage, or run in another process.
//!
//! Payloads are stored as a versioned envelope:
//!
//! ```text
//! {"version": 1, "revision": 7, "items": [ ... ]}
//! ```
//!
//! A bare JSON array is the legacy shape and is read as version 0.

use std::sync::Arc;

use chrono::{ DateTime, Utc };
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::{ KeyValueStorage, StorageError };
use crate::track::{ TrackId, TrackRef };


/// Current envelope schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Name given to the playlist created by a quick add into an empty library.
pub const DEFAULT_PLAYLIST_NAME: &str = "My Playlist";

/// Attempts at a mutation before giving up on a contended collection.
const MUTATE_ATTEMPTS: u32 = 64;


/// Errors that can occur with library store operations.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "Stored {key} payload is corrupt: {reason}" )]
    StorageCorrupt { key: &'static str, reason: String },

    #[error( "Not found: {0}" )]
    NotFound( String ),

    #[error( "Playlist name must not be empty" )]
    InvalidName,

    #[error( "Storage error: {0}" )]
    Storage( #[from] StorageError ),

    #[error( "Gave up on {0} after repeated concurrent changes" )]
    Contended( &'static str ),

    #[error( "Failed to encode payload: {0}" )]
    Encode( #[from] serde_json::Error ),
}


/// Persistent collections managed by the store.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum Collection {
    Favorites,
    Playlists,
}


impl Collection {
    /// Storage key of the collection.
    pub fn key( self ) -> &'static str {
        match self {
            Collection::Favorites => "favorites",
            Collection::Playlists => "playlists",
        }
    }
}


/// An item type stored in one of the collections.
pub trait CollectionItem: Serialize + DeserializeOwned + Clone + PartialEq + Send {
    const COLLECTION: Collection;
}


impl CollectionItem for TrackRef {
    const COLLECTION: Collection = Collection::Favorites;
}


/// A user playlist.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
pub struct Playlist {
    #[serde( default = "new_playlist_id" )]
    pub id: String,

    pub name: String,

    #[serde( default = "unix_epoch", alias = "createdAt" )]
    pub created_at: DateTime<Utc>,

    #[serde( default, alias = "songs" )]
    pub tracks: Vec<TrackRef>,
}


impl CollectionItem for Playlist {
    const COLLECTION: Collection = Collection::Playlists;
}


impl Playlist {
    /// Creates an empty playlist with a fresh id.
    pub fn new( name: &str ) -> Self {
        Self {
            id: new_playlist_id(),
            name: name.to_string(),
            created_at: Utc::now(),
            tracks: Vec::new(),
        }
    }


    /// Returns true if the playlist contains the track.
    pub fn contains( &self, id: &TrackId ) -> bool {
        self.tracks.iter().any( |t| t.id == *id )
    }


    /// Appends tracks whose ids are not yet present.
    ///
    /// @returns The number of tracks added
    pub fn add_tracks( &mut self, tracks: &[TrackRef] ) -> usize {
        let before = self.tracks.len();
        for track in tracks {
            if !self.contains( &track.id ) {
                self.tracks.push( track.clone() );
            }
        }
        self.tracks.len() - before
    }


    /// Removes a track by id. Returns true if it was present.
    pub fn remove_track( &mut self, id: &TrackId ) -> bool {
        let before = self.tracks.len();
        self.tracks.retain( |t| t.id != *id );
        self.tracks.len() != before
    }


    /// Total duration of the known track durations, in seconds.
    pub fn total_duration( &self ) -> f64 {
        self.tracks.iter().map( |t| t.duration.max( 0.0 ) ).sum()
    }
}


fn new_playlist_id() -> String {
    Uuid::new_v4().to_string()
}


// Default for DateTime<Utc> is the Unix epoch
fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}


/// Result of reading a collection.
#[derive( Debug, Clone, PartialEq )]
pub enum Loaded<T> {
    /// Nothing has ever been written under the key.
    Uninitialized,

    Present {
        version: u32,
        revision: u64,
        items: Vec<T>,
    },
}


impl<T> Loaded<T> {
    /// Gets the items, empty when uninitialized.
    pub fn into_items( self ) -> Vec<T> {
        match self {
            Loaded::Uninitialized => Vec::new(),
            Loaded::Present { items, .. } => items,
        }
    }


    fn revision( &self ) -> u64 {
        match self {
            Loaded::Uninitialized => 0,
            Loaded::Present { revision, .. } => *revision,
        }
    }


    fn is_current( &self ) -> bool {
        matches!( self, Loaded::Present { version, .. } if *version == SCHEMA_VERSION )
    }
}


#[derive( Serialize )]
struct Envelope<'a, T> {
    version: u32,
    revision: u64,
    items: &'a [T],
}


/// Decodes a stored payload, accepting the current envelope and the legacy
/// bare array.
fn decode<T: DeserializeOwned>( key: &'static str, raw: &str ) -> Result<Loaded<T>, StoreError> {
    let corrupt = |reason: String| StoreError::StorageCorrupt { key, reason };

    let value: Value = serde_json::from_str( raw ).map_err( |e| corrupt( e.to_string() ) )?;

    match value {
        Value::Array( items ) => {
            let items = serde_json::from_value( Value::Array( items ) ).map_err( |e| corrupt( e.to_string() ) )?;
            Ok( Loaded::Present { version: 0, revision: 0, items } )
        }
        Value::Object( mut map ) => {
            let version = map.get( "version" )
                .and_then( Value::as_u64 )
                .ok_or_else( || corrupt( "missing schema version".into() ) )?;
            if version != u64::from( SCHEMA_VERSION ) {
                return Err( corrupt( format!( "unsupported schema version {}", version ) ) );
            }
            let revision = map.get( "revision" ).and_then( Value::as_u64 ).unwrap_or( 0 );
            let items = map.remove( "items" )
                .ok_or_else( || corrupt( "missing items".into() ) )?;
            let items = serde_json::from_value( items ).map_err( |e| corrupt( e.to_string() ) )?;
            Ok( Loaded::Present { version: SCHEMA_VERSION, revision, items } )
        }
        _ => Err( corrupt( "expected an array or an envelope object".into() ) ),
    }
}


struct Inner {
    storage: Arc<dyn KeyValueStorage>,
    favorites_lock: Mutex<()>,
    playlists_lock: Mutex<()>,
}


/// Store for favorites and playlists.
///
/// Cloning is cheap. Clones share local write locks, which only cut down on
/// retries; correctness comes from the storage's compare-and-set.
#[derive( Clone )]
pub struct LibraryStore {
    inner: Arc<Inner>,
}


impl LibraryStore {
    /// Creates a store over the given storage backend.
    pub fn new( storage: Arc<dyn KeyValueStorage> ) -> Self {
        Self {
            inner: Arc::new( Inner {
                storage,
                favorites_lock: Mutex::new( () ),
                playlists_lock: Mutex::new( () ),
            }),
        }
    }


    fn lock_for( &self, collection: Collection ) -> &Mutex<()> {
        match collection {
            Collection::Favorites => &self.inner.favorites_lock,
            Collection::Playlists => &self.inner.playlists_lock,
        }
    }


    /// Reads a collection, reporting corruption as an error.
    pub async fn load<T: CollectionItem>( &self ) -> Result<Loaded<T>, StoreError> {
        let key = T::COLLECTION.key();
        match self.inner.storage.get( key ).await? {
            None => Ok( Loaded::Uninitialized ),
            Some( raw ) => decode( key, &raw ),
        }
    }


    /// Reads all items of a collection.
    ///
    /// Corrupt or unreadable payloads degrade to an empty list.
    pub async fn get_all<T: CollectionItem>( &self ) -> Vec<T> {
        let key = T::COLLECTION.key();
        match self.load::<T>().await {
            Ok( Loaded::Uninitialized ) => {
                tracing::debug!( "{} not initialized yet", key );
                Vec::new()
            }
            Ok( loaded ) => loaded.into_items(),
            Err( e ) => {
                tracing::warn!( "Reading {} failed, using empty list: {}", key, e );
                Vec::new()
            }
        }
    }


    /// Atomically applies `update` to a collection and persists the result.
    ///
    /// The write only lands if the stored payload is unchanged since it was
    /// read. Otherwise the collection is read again and `update` reruns on
    /// the fresh items. If `update` fails nothing is written. Unchanged
    /// collections already in the current schema are not rewritten.
    pub async fn mutate<T, R, F>( &self, mut update: F ) -> Result<R, StoreError>
    where
        T: CollectionItem,
        F: FnMut( &mut Vec<T> ) -> Result<R, StoreError>,
    {
        let key = T::COLLECTION.key();
        let _guard = self.lock_for( T::COLLECTION ).lock().await;

        for attempt in 1..=MUTATE_ATTEMPTS {
            let raw = self.inner.storage.get( key ).await?;
            let loaded = match raw.as_deref().map( |raw| decode::<T>( key, raw ) ) {
                None => Loaded::Uninitialized,
                Some( Ok( loaded ) ) => loaded,
                Some( Err( e ) ) => {
                    tracing::warn!( "{}; starting {} from empty", e, key );
                    Loaded::Uninitialized
                }
            };

            let revision = loaded.revision();
            let is_current = loaded.is_current();
            let before = loaded.into_items();
            let mut items = before.clone();

            let result = update( &mut items )?;

            if is_current && items == before {
                return Ok( result );
            }

            let payload = serde_json::to_string( &Envelope {
                version: SCHEMA_VERSION,
                revision: revision + 1,
                items: &items,
            })?;
            if self.inner.storage.compare_and_set( key, raw.as_deref(), &payload ).await? {
                tracing::debug!( "Saved {} revision {} ({} items)", key, revision + 1, items.len() );
                return Ok( result );
            }
            tracing::debug!( "{} changed underneath attempt {}, retrying", key, attempt );
        }

        Err( StoreError::Contended( key ) )
    }


    // Favorites


    /// Gets all favorite tracks.
    pub async fn favorites( &self ) -> Vec<TrackRef> {
        self.get_all().await
    }


    /// Adds a track to favorites. Returns false if it was already there.
    pub async fn add_track_to_favorites( &self, track: &TrackRef ) -> Result<bool, StoreError> {
        self.mutate( |favorites: &mut Vec<TrackRef>| {
            if favorites.iter().any( |t| t.id == track.id ) {
                return Ok( false );
            }
            favorites.push( track.clone() );
            Ok( true )
        }).await
    }


    /// Removes a track from favorites. Returns false if it was not there.
    pub async fn remove_track_from_favorites( &self, id: &TrackId ) -> Result<bool, StoreError> {
        self.mutate( |favorites: &mut Vec<TrackRef>| {
            let before = favorites.len();
            favorites.retain( |t| t.id != *id );
            Ok( favorites.len() != before )
        }).await
    }


    /// Flips favorite membership. Returns the new membership.
    pub async fn toggle_favorite( &self, track: &TrackRef ) -> Result<bool, StoreError> {
        self.mutate( |favorites: &mut Vec<TrackRef>| {
            if let Some( pos ) = favorites.iter().position( |t| t.id == track.id ) {
                favorites.remove( pos );
                Ok( false )
            } else {
                favorites.push( track.clone() );
                Ok( true )
            }
        }).await
    }


    /// Returns true if the track is a favorite.
    pub async fn is_favorite( &self, id: &TrackId ) -> bool {
        self.favorites().await.iter().any( |t| t.id == *id )
    }


    // Playlists


    /// Gets all playlists in creation order.
    pub async fn playlists( &self ) -> Vec<Playlist> {
        self.get_all().await
    }


    /// Gets a playlist by id.
    pub async fn playlist( &self, id: &str ) -> Result<Playlist, StoreError> {
        self.playlists().await
            .into_iter()
            .find( |p| p.id == id )
            .ok_or_else( || StoreError::NotFound( format!( "playlist {}", id ) ) )
    }


    /// Gets the playlists containing a track.
    pub async fn playlists_containing( &self, id: &TrackId ) -> Vec<Playlist> {
        self.playlists().await
            .into_iter()
            .filter( |p| p.contains( id ) )
            .collect()
    }


    /// Creates a new empty playlist.
    pub async fn create_playlist( &self, name: &str ) -> Result<Playlist, StoreError> {
        let name = validate_name( name )?;
        let playlist = Playlist::new( name );

        self.mutate( |playlists: &mut Vec<Playlist>| {
            playlists.push( playlist.clone() );
            Ok(())
        }).await?;

        tracing::info!( "Created playlist {:?} ({})", playlist.name, playlist.id );
        Ok( playlist )
    }


    /// Renames a playlist.
    pub async fn rename_playlist( &self, id: &str, name: &str ) -> Result<Playlist, StoreError> {
        let name = validate_name( name )?;
        self.update_playlist( id, |playlist| {
            playlist.name = name.to_string();
        }).await
    }


    /// Adds tracks to a playlist, skipping ids already present.
    pub async fn add_tracks_to_playlist(
        &self,
        id: &str,
        tracks: &[TrackRef],
    ) -> Result<Playlist, StoreError> {
        self.update_playlist( id, |playlist| {
            let added = playlist.add_tracks( tracks );
            tracing::debug!( "Added {} of {} tracks to {}", added, tracks.len(), id );
        }).await
    }


    /// Removes a track from a playlist. An absent track is a no-op.
    pub async fn remove_track_from_playlist(
        &self,
        id: &str,
        track_id: &TrackId,
    ) -> Result<Playlist, StoreError> {
        self.update_playlist( id, |playlist| {
            playlist.remove_track( track_id );
        }).await
    }


    /// Deletes a playlist. Returns false if it did not exist.
    pub async fn delete_playlist( &self, id: &str ) -> Result<bool, StoreError> {
        self.mutate( |playlists: &mut Vec<Playlist>| {
            let before = playlists.len();
            playlists.retain( |p| p.id != id );
            Ok( playlists.len() != before )
        }).await
    }


    /// Adds a track to the first playlist, creating a default playlist if
    /// there is none.
    pub async fn quick_add_to_playlist( &self, track: &TrackRef ) -> Result<Playlist, StoreError> {
        self.mutate( |playlists: &mut Vec<Playlist>| {
            if playlists.is_empty() {
                playlists.push( Playlist::new( DEFAULT_PLAYLIST_NAME ) );
            }
            let first = &mut playlists[ 0 ];
            first.add_tracks( std::slice::from_ref( track ) );
            Ok( first.clone() )
        }).await
    }


    async fn update_playlist<F>( &self, id: &str, mut update: F ) -> Result<Playlist, StoreError>
    where
        F: FnMut( &mut Playlist ),
    {
        self.mutate( |playlists: &mut Vec<Playlist>| {
            let playlist = playlists.iter_mut()
                .find( |p| p.id == id )
                .ok_or_else( || StoreError::NotFound( format!( "playlist {}", id ) ) )?;
            update( playlist );
            Ok( playlist.clone() )
        }).await
    }
}


fn validate_name( name: &str ) -> Result<&str, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err( StoreError::InvalidName )
    } else {
        Ok( trimmed )
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;

    use crate::storage::{ FileStorage, MemoryStorage };


    fn track( id: &str ) -> TrackRef {
        TrackRef::new( id, format!( "{}.mp3", id ), format!( "file:///music/{}.mp3", id ) )
            .with_duration( 180.0 )
    }


    fn memory_store() -> ( LibraryStore, Arc<MemoryStorage> ) {
        let storage = Arc::new( MemoryStorage::new() );
        ( LibraryStore::new( storage.clone() ), storage )
    }


    /// Storage that stalls between operations so unsynchronized
    /// read-modify-write cycles would interleave.
    struct SlowStorage {
        inner: MemoryStorage,
    }


    #[async_trait]
    impl KeyValueStorage for SlowStorage {
        async fn get( &self, key: &str ) -> Result<Option<String>, StorageError> {
            let value = self.inner.get( key ).await;
            tokio::time::sleep( Duration::from_millis( 2 ) ).await;
            value
        }


        async fn set( &self, key: &str, value: &str ) -> Result<(), StorageError> {
            tokio::time::sleep( Duration::from_millis( 2 ) ).await;
            self.inner.set( key, value ).await
        }


        async fn compare_and_set(
            &self,
            key: &str,
            expected: Option<&str>,
            value: &str,
        ) -> Result<bool, StorageError> {
            tokio::time::sleep( Duration::from_millis( 2 ) ).await;
            self.inner.compare_and_set( key, expected, value ).await
        }
    }


    #[tokio::test( flavor = "multi_thread", worker_threads = 4 )]
    async fn test_concurrent_mutations_are_not_lost() {
        let store = LibraryStore::new( Arc::new( SlowStorage { inner: MemoryStorage::new() } ) );
        let n = 32;

        let handles: Vec<_> = ( 0..n )
            .map( |i| {
                let store = store.clone();
                tokio::spawn( async move {
                    store.add_track_to_favorites( &track( &format!( "t{}", i ) ) ).await
                })
            })
            .collect();

        for handle in handles {
            assert!( handle.await.unwrap().unwrap() );
        }

        let favorites = store.favorites().await;
        assert_eq!( favorites.len(), n );
        for i in 0..n {
            assert!( store.is_favorite( &TrackId::new( format!( "t{}", i ) ) ).await );
        }

        match store.load::<TrackRef>().await.unwrap() {
            Loaded::Present { revision, .. } => assert_eq!( revision, n as u64 ),
            other => panic!( "unexpected {:?}", other ),
        }
    }


    #[tokio::test( flavor = "multi_thread", worker_threads = 4 )]
    async fn test_independent_stores_do_not_lose_updates() {
        let storage = Arc::new( SlowStorage { inner: MemoryStorage::new() } );
        let n = 16;

        let handles: Vec<_> = ( 0..n )
            .map( |i| {
                let store = LibraryStore::new( storage.clone() );
                tokio::spawn( async move {
                    store.add_track_to_favorites( &track( &format!( "t{}", i ) ) ).await
                })
            })
            .collect();

        for handle in handles {
            assert!( handle.await.unwrap().unwrap() );
        }

        let store = LibraryStore::new( storage );
        assert_eq!( store.favorites().await.len(), n );
        match store.load::<TrackRef>().await.unwrap() {
            Loaded::Present { revision, .. } => assert_eq!( revision, n as u64 ),
            other => panic!( "unexpected {:?}", other ),
        }
    }


    #[tokio::test( flavor = "multi_thread", worker_threads = 4 )]
    async fn test_stores_over_separate_file_handles_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let n = 12;

        let handles: Vec<_> = ( 0..n )
            .map( |i| {
                let store = LibraryStore::new( Arc::new( FileStorage::new( dir.path() ) ) );
                tokio::spawn( async move {
                    let playlist = store.quick_add_to_playlist( &track( &format!( "t{}", i ) ) ).await?;
                    store.add_track_to_favorites( &track( &format!( "t{}", i ) ) ).await?;
                    Ok::<_, StoreError>( playlist )
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let store = LibraryStore::new( Arc::new( FileStorage::new( dir.path() ) ) );
        let playlists = store.playlists().await;
        assert_eq!( playlists.len(), 1 );
        assert_eq!( playlists[ 0 ].tracks.len(), n );
        assert_eq!( store.favorites().await.len(), n );
    }


    #[tokio::test( flavor = "multi_thread", worker_threads = 4 )]
    async fn test_concurrent_playlist_adds_are_not_lost() {
        let store = LibraryStore::new( Arc::new( SlowStorage { inner: MemoryStorage::new() } ) );
        let playlist = store.create_playlist( "Road trip" ).await.unwrap();

        let handles: Vec<_> = ( 0..16 )
            .map( |i| {
                let store = store.clone();
                let id = playlist.id.clone();
                tokio::spawn( async move {
                    store.add_tracks_to_playlist( &id, &[ track( &format!( "t{}", i ) ) ] ).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!( store.playlist( &playlist.id ).await.unwrap().tracks.len(), 16 );
    }


    #[tokio::test]
    async fn test_add_favorite_is_idempotent() {
        let ( store, _ ) = memory_store();
        assert!( store.add_track_to_favorites( &track( "a" ) ).await.unwrap() );
        assert!( store.add_track_to_favorites( &track( "b" ) ).await.unwrap() );
        let before = store.favorites().await;

        assert!( !store.add_track_to_favorites( &track( "a" ) ).await.unwrap() );
        assert_eq!( store.favorites().await, before );
    }


    #[tokio::test]
    async fn test_remove_absent_favorite_is_noop() {
        let ( store, _ ) = memory_store();
        store.add_track_to_favorites( &track( "a" ) ).await.unwrap();
        assert!( !store.remove_track_from_favorites( &TrackId::from( "zzz" ) ).await.unwrap() );
        assert_eq!( store.favorites().await.len(), 1 );
        assert!( store.remove_track_from_favorites( &TrackId::from( "a" ) ).await.unwrap() );
        assert!( !store.is_favorite( &TrackId::from( "a" ) ).await );
    }


    #[tokio::test]
    async fn test_toggle_favorite() {
        let ( store, _ ) = memory_store();
        assert!( store.toggle_favorite( &track( "a" ) ).await.unwrap() );
        assert!( store.is_favorite( &TrackId::from( "a" ) ).await );
        assert!( !store.toggle_favorite( &track( "a" ) ).await.unwrap() );
        assert!( !store.is_favorite( &TrackId::from( "a" ) ).await );
    }


    #[tokio::test]
    async fn test_uninitialized_vs_corrupt() {
        let ( store, storage ) = memory_store();
        assert_eq!( store.load::<TrackRef>().await.unwrap(), Loaded::Uninitialized );

        storage.set( "favorites", "{not json" ).await.unwrap();
        assert!( matches!(
            store.load::<TrackRef>().await,
            Err( StoreError::StorageCorrupt { key: "favorites", .. } )
        ));
        assert!( store.favorites().await.is_empty() );
    }


    #[tokio::test]
    async fn test_unknown_schema_version_is_corrupt() {
        let ( store, storage ) = memory_store();
        storage.set( "playlists", r#"{"version":9,"revision":1,"items":[]}"# ).await.unwrap();
        assert!( matches!(
            store.load::<Playlist>().await,
            Err( StoreError::StorageCorrupt { .. } )
        ));
        assert!( store.playlists().await.is_empty() );
    }


    #[tokio::test]
    async fn test_mutate_recovers_from_corruption() {
        let ( store, storage ) = memory_store();
        storage.set( "favorites", "42" ).await.unwrap();
        store.add_track_to_favorites( &track( "a" ) ).await.unwrap();
        assert_eq!( store.favorites().await.len(), 1 );
    }


    #[tokio::test]
    async fn test_legacy_payload_is_upgraded() {
        let ( store, storage ) = memory_store();
        let legacy = r#"[
            {"id":"1700000000000","name":"Old","createdAt":"2024-05-01T10:00:00.000Z",
             "songs":[{"id":"9","filename":"nine.mp3","uri":"file:///nine.mp3","duration":12.5,
                       "mediaType":"audio","width":0,"height":0}]}
        ]"#;
        storage.set( "playlists", legacy ).await.unwrap();

        let playlists = store.playlists().await;
        assert_eq!( playlists.len(), 1 );
        assert_eq!( playlists[ 0 ].id, "1700000000000" );
        assert_eq!( playlists[ 0 ].tracks[ 0 ].name, "nine.mp3" );

        store.add_tracks_to_playlist( "1700000000000", &[ track( "10" ) ] ).await.unwrap();
        let raw = storage.get( "playlists" ).await.unwrap().unwrap();
        let value: Value = serde_json::from_str( &raw ).unwrap();
        assert_eq!( value[ "version" ], SCHEMA_VERSION );
        assert_eq!( value[ "items" ][ 0 ][ "tracks" ].as_array().unwrap().len(), 2 );
    }


    #[tokio::test]
    async fn test_legacy_playlist_without_id() {
        let ( store, storage ) = memory_store();
        storage.set( "playlists", r#"[{"name":"Bare","songs":[]}]"# ).await.unwrap();
        let playlists = store.playlists().await;
        assert_eq!( playlists[ 0 ].name, "Bare" );
        assert!( !playlists[ 0 ].id.is_empty() );
        assert_eq!( playlists[ 0 ].created_at.timestamp(), 0 );
    }


    #[tokio::test]
    async fn test_create_playlist_rejects_blank_name() {
        let ( store, _ ) = memory_store();
        assert!( matches!( store.create_playlist( "   " ).await, Err( StoreError::InvalidName ) ) );
        assert!( store.playlists().await.is_empty() );
    }


    #[tokio::test]
    async fn test_create_playlist_trims_name() {
        let ( store, _ ) = memory_store();
        let playlist = store.create_playlist( "  Chill  " ).await.unwrap();
        assert_eq!( playlist.name, "Chill" );
        assert_eq!( store.playlist( &playlist.id ).await.unwrap(), playlist );
    }


    #[tokio::test]
    async fn test_add_tracks_skips_present_ids() {
        let ( store, _ ) = memory_store();
        let playlist = store.create_playlist( "Mix" ).await.unwrap();

        store.add_tracks_to_playlist( &playlist.id, &[ track( "a" ), track( "b" ) ] ).await.unwrap();
        let updated = store
            .add_tracks_to_playlist( &playlist.id, &[ track( "b" ), track( "a" ), track( "c" ) ] )
            .await
            .unwrap();

        let order: Vec<_> = updated.tracks.iter().map( |t| t.id.as_str() ).collect();
        assert_eq!( order, vec![ "a", "b", "c" ] );
    }


    #[tokio::test]
    async fn test_add_tracks_to_unknown_playlist() {
        let ( store, _ ) = memory_store();
        let result = store.add_tracks_to_playlist( "nope", &[ track( "a" ) ] ).await;
        assert!( matches!( result, Err( StoreError::NotFound( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_remove_track_and_delete_playlist() {
        let ( store, _ ) = memory_store();
        let playlist = store.create_playlist( "Mix" ).await.unwrap();
        store.add_tracks_to_playlist( &playlist.id, &[ track( "a" ), track( "b" ) ] ).await.unwrap();

        let updated = store.remove_track_from_playlist( &playlist.id, &TrackId::from( "a" ) ).await.unwrap();
        assert_eq!( updated.tracks.len(), 1 );
        let again = store.remove_track_from_playlist( &playlist.id, &TrackId::from( "a" ) ).await.unwrap();
        assert_eq!( again, updated );

        assert!( store.delete_playlist( &playlist.id ).await.unwrap() );
        assert!( !store.delete_playlist( &playlist.id ).await.unwrap() );
        assert!( matches!(
            store.remove_track_from_playlist( &playlist.id, &TrackId::from( "b" ) ).await,
            Err( StoreError::NotFound( _ ) )
        ));
    }


    #[tokio::test]
    async fn test_rename_playlist() {
        let ( store, _ ) = memory_store();
        let playlist = store.create_playlist( "Mix" ).await.unwrap();
        let renamed = store.rename_playlist( &playlist.id, " Gym " ).await.unwrap();
        assert_eq!( renamed.name, "Gym" );
        assert!( matches!( store.rename_playlist( &playlist.id, "" ).await, Err( StoreError::InvalidName ) ) );
    }


    #[tokio::test]
    async fn test_quick_add_creates_default_playlist() {
        let ( store, _ ) = memory_store();
        let first = store.quick_add_to_playlist( &track( "a" ) ).await.unwrap();
        assert_eq!( first.name, DEFAULT_PLAYLIST_NAME );

        let second = store.quick_add_to_playlist( &track( "a" ) ).await.unwrap();
        assert_eq!( second.id, first.id );
        assert_eq!( second.tracks.len(), 1 );
        assert_eq!( store.playlists().await.len(), 1 );

        let containing = store.playlists_containing( &TrackId::from( "a" ) ).await;
        assert_eq!( containing.len(), 1 );
    }


    #[tokio::test]
    async fn test_noop_mutation_does_not_rewrite() {
        let ( store, _ ) = memory_store();
        store.add_track_to_favorites( &track( "a" ) ).await.unwrap();
        store.add_track_to_favorites( &track( "a" ) ).await.unwrap();

        match store.load::<TrackRef>().await.unwrap() {
            Loaded::Present { revision, .. } => assert_eq!( revision, 1 ),
            other => panic!( "unexpected {:?}", other ),
        }
    }


    #[tokio::test]
    async fn test_file_backed_store_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let store = LibraryStore::new( Arc::new( crate::storage::FileStorage::new( dir.path() ) ) );
        let playlist = store.create_playlist( "Saved" ).await.unwrap();
        store.add_track_to_favorites( &track( "a" ) ).await.unwrap();

        let reopened = LibraryStore::new( Arc::new( crate::storage::FileStorage::new( dir.path() ) ) );
        assert_eq!( reopened.playlist( &playlist.id ).await.unwrap().name, "Saved" );
        assert!( reopened.is_favorite( &TrackId::from( "a" ) ).await );
    }
}
