//! Persistent key-value storage
//!
//! String-keyed storage of serialized collections. Only the library store
//! talks to this layer.

use std::collections::HashMap;
use std::path::{ Path, PathBuf };
use std::time::{ Duration, SystemTime };

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;


/// Delay between attempts to take a key's lock file.
const LOCK_RETRY: Duration = Duration::from_millis( 5 );

/// Attempts before giving up on a held lock file.
const LOCK_ATTEMPTS: u32 = 2000;

/// Lock files older than this were left behind by a crashed writer.
const LOCK_STALE_AFTER: Duration = Duration::from_secs( 30 );


/// Errors that can occur with key-value storage.
#[derive( Debug, Error )]
pub enum StorageError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid storage key: {0:?}" )]
    InvalidKey( String ),

    #[error( "Timed out waiting for the lock on {0}" )]
    Locked( String ),
}


/// String-keyed persistent storage.
///
/// Writes must not return until the value is durable. `compare_and_set`
/// must be atomic against every other writer of the same backing store,
/// including other instances and other processes.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Reads the value stored under `key`, or None if it was never written.
    async fn get( &self, key: &str ) -> Result<Option<String>, StorageError>;

    /// Replaces the value stored under `key`.
    async fn set( &self, key: &str, value: &str ) -> Result<(), StorageError>;

    /// Writes `value` only if the stored value still equals `expected`.
    ///
    /// @param expected The value read before, None if the key was unset
    /// @returns False if another writer changed the key in between
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StorageError>;
}


/// In-memory storage, for tests and throwaway sessions.
#[derive( Debug, Default )]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}


impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}


#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get( &self, key: &str ) -> Result<Option<String>, StorageError> {
        Ok( self.values.read().await.get( key ).cloned() )
    }


    async fn set( &self, key: &str, value: &str ) -> Result<(), StorageError> {
        self.values.write().await.insert( key.to_string(), value.to_string() );
        Ok(())
    }


    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StorageError> {
        let mut values = self.values.write().await;
        if values.get( key ).map( String::as_str ) != expected {
            return Ok( false );
        }
        values.insert( key.to_string(), value.to_string() );
        Ok( true )
    }
}


/// File-backed storage: one `<key>.json` file per key inside a directory.
///
/// Writes go to a temporary file which is synced and then renamed over the
/// target, and the directory is synced after the rename, so a crash leaves
/// either the old or the new value. Writers serialize on a `<key>.lock` file
/// created exclusively, which also holds across processes.
#[derive( Debug, Clone )]
pub struct FileStorage {
    dir: PathBuf,
}


impl FileStorage {
    /// Creates storage rooted at `dir`. The directory is created on first write.
    pub fn new( dir: impl Into<PathBuf> ) -> Self {
        Self { dir: dir.into() }
    }


    /// Gets the default data directory (`~/.local/share/tunedeck` on Linux).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "tunedeck" ) )
    }


    /// Gets the storage directory.
    pub fn dir( &self ) -> &Path {
        &self.dir
    }


    fn path_for( &self, key: &str ) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key.chars().all( |c| c.is_ascii_alphanumeric() || c == '-' || c == '_' );
        if !valid {
            return Err( StorageError::InvalidKey( key.to_string() ) );
        }
        Ok( self.dir.join( format!( "{}.json", key ) ) )
    }


    async fn read( path: &Path ) -> Result<Option<String>, StorageError> {
        match fs::read_to_string( path ).await {
            Ok( contents ) => Ok( Some( contents ) ),
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => Ok( None ),
            Err( e ) => Err( StorageError::Io( e ) ),
        }
    }


    async fn write( &self, key: &str, path: &Path, value: &str ) -> Result<(), StorageError> {
        let tmp_path = path.with_extension( "json.tmp" );
        let mut file = fs::File::create( &tmp_path ).await?;
        file.write_all( value.as_bytes() ).await?;
        file.sync_all().await?;
        drop( file );

        fs::rename( &tmp_path, path ).await?;
        sync_dir( &self.dir ).await?;
        tracing::trace!( "Persisted {} ({} bytes)", key, value.len() );
        Ok(())
    }


    /// Takes the lock file for a key, waiting while another writer holds it.
    async fn lock( &self, key: &str ) -> Result<LockFile, StorageError> {
        fs::create_dir_all( &self.dir ).await?;
        let path = self.dir.join( format!( "{}.lock", key ) );

        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new().write( true ).create_new( true ).open( &path ).await {
                Ok( _ ) => return Ok( LockFile { path } ),
                Err( e ) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale( &path ).await {
                        tracing::warn!( "Removing stale lock {:?}", path );
                        let _ = fs::remove_file( &path ).await;
                        continue;
                    }
                    tokio::time::sleep( LOCK_RETRY ).await;
                }
                Err( e ) => return Err( StorageError::Io( e ) ),
            }
        }

        Err( StorageError::Locked( key.to_string() ) )
    }
}


/// A held `<key>.lock` file, removed on drop.
struct LockFile {
    path: PathBuf,
}


impl Drop for LockFile {
    fn drop( &mut self ) {
        if let Err( e ) = std::fs::remove_file( &self.path ) {
            tracing::warn!( "Failed to release lock {:?}: {}", self.path, e );
        }
    }
}


async fn is_stale( path: &Path ) -> bool {
    let Ok( modified ) = fs::metadata( path ).await.and_then( |m| m.modified() ) else {
        return false;
    };
    SystemTime::now()
        .duration_since( modified )
        .map_or( false, |age| age > LOCK_STALE_AFTER )
}


/// Syncs a directory so a rename inside it survives a crash.
#[cfg( unix )]
async fn sync_dir( dir: &Path ) -> std::io::Result<()> {
    fs::File::open( dir ).await?.sync_all().await
}


// Directories cannot be opened for syncing on this platform
#[cfg( not( unix ) )]
async fn sync_dir( _dir: &Path ) -> std::io::Result<()> {
    Ok(())
}


#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get( &self, key: &str ) -> Result<Option<String>, StorageError> {
        let path = self.path_for( key )?;
        Self::read( &path ).await
    }


    async fn set( &self, key: &str, value: &str ) -> Result<(), StorageError> {
        let path = self.path_for( key )?;
        let _lock = self.lock( key ).await?;
        self.write( key, &path, value ).await
    }


    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StorageError> {
        let path = self.path_for( key )?;
        let _lock = self.lock( key ).await?;

        if Self::read( &path ).await?.as_deref() != expected {
            return Ok( false );
        }
        self.write( key, &path, value ).await?;
        Ok( true )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test]
    async fn test_memory_get_missing() {
        let storage = MemoryStorage::new();
        assert_eq!( storage.get( "favorites" ).await.unwrap(), None );
    }


    #[tokio::test]
    async fn test_memory_set_get() {
        let storage = MemoryStorage::new();
        storage.set( "favorites", "[]" ).await.unwrap();
        assert_eq!( storage.get( "favorites" ).await.unwrap().as_deref(), Some( "[]" ) );
    }


    #[tokio::test]
    async fn test_file_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new( dir.path().join( "data" ) );
        storage.set( "playlists", r#"{"a":1}"# ).await.unwrap();

        let reopened = FileStorage::new( dir.path().join( "data" ) );
        assert_eq!(
            reopened.get( "playlists" ).await.unwrap().as_deref(),
            Some( r#"{"a":1}"# )
        );
        assert!( !dir.path().join( "data" ).join( "playlists.json.tmp" ).exists() );
    }


    #[tokio::test]
    async fn test_file_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new( dir.path() );
        assert_eq!( storage.get( "favorites" ).await.unwrap(), None );
    }


    #[tokio::test]
    async fn test_memory_compare_and_set() {
        let storage = MemoryStorage::new();
        assert!( storage.compare_and_set( "favorites", None, "[1]" ).await.unwrap() );
        assert!( !storage.compare_and_set( "favorites", None, "[2]" ).await.unwrap() );
        assert!( !storage.compare_and_set( "favorites", Some( "[]" ), "[2]" ).await.unwrap() );
        assert!( storage.compare_and_set( "favorites", Some( "[1]" ), "[2]" ).await.unwrap() );
        assert_eq!( storage.get( "favorites" ).await.unwrap().as_deref(), Some( "[2]" ) );
    }


    #[tokio::test]
    async fn test_file_compare_and_set_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStorage::new( dir.path() );
        let second = FileStorage::new( dir.path() );

        assert!( first.compare_and_set( "playlists", None, "[]" ).await.unwrap() );
        assert!( !second.compare_and_set( "playlists", None, "[1]" ).await.unwrap() );
        assert!( second.compare_and_set( "playlists", Some( "[]" ), "[1]" ).await.unwrap() );
        assert_eq!( first.get( "playlists" ).await.unwrap().as_deref(), Some( "[1]" ) );
        assert!( !dir.path().join( "playlists.lock" ).exists() );
    }


    #[tokio::test]
    async fn test_file_waits_for_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new( dir.path() );
        let lock_path = dir.path().join( "favorites.lock" );
        std::fs::write( &lock_path, b"" ).unwrap();

        let writer = {
            let storage = storage.clone();
            tokio::spawn( async move { storage.set( "favorites", "[]" ).await } )
        };
        tokio::time::sleep( Duration::from_millis( 30 ) ).await;
        assert!( !dir.path().join( "favorites.json" ).exists() );

        std::fs::remove_file( &lock_path ).unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!( storage.get( "favorites" ).await.unwrap().as_deref(), Some( "[]" ) );
    }


    #[tokio::test]
    async fn test_file_write_syncs_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join( "a" ).join( "b" );
        let storage = FileStorage::new( &nested );

        storage.set( "favorites", "[]" ).await.unwrap();
        sync_dir( &nested ).await.unwrap();
        assert!( nested.join( "favorites.json" ).exists() );
        assert!( !nested.join( "favorites.json.tmp" ).exists() );
    }


    #[tokio::test]
    async fn test_file_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new( dir.path() );
        let result = storage.set( "../escape", "x" ).await;
        assert!( matches!( result, Err( StorageError::InvalidKey( _ ) ) ) );
    }
}
