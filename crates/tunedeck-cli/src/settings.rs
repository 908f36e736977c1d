//! Application settings management
//!
//! Handles persistent settings: where the music lives, where the library
//! data is kept and how the player session behaves.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };

use tunedeck_core::media::DEFAULT_PAGE_SIZE;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Directories scanned for music
    pub library_roots: Vec<PathBuf>,

    /// Directory holding favorites and playlists. Platform default if unset
    pub data_dir: Option<PathBuf>,

    /// Tracks requested per media index page
    pub page_size: usize,

    /// Interval between position updates while playing
    pub tick_interval_ms: u64,

    /// Seconds moved by forward/back
    pub seek_step_secs: f64,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            library_roots: dirs::audio_dir().into_iter().collect(),
            data_dir: None,
            page_size: DEFAULT_PAGE_SIZE,
            tick_interval_ms: 100,
            seek_step_secs: 10.0,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "tunedeck" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Self::default(),
        }
    }


    /// Loads settings from a specific file.
    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_else( |e| {
                    tracing::warn!( "Ignoring unreadable settings {:?}: {}", path, e );
                    Self::default()
                })
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        if let Some( path ) = Self::settings_path() {
            self.save_to( &path );
        }
    }


    /// Saves settings to a specific file.
    pub fn save_to( &self, path: &Path ) {
        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Adds a library root. Returns false if it was already present.
    pub fn add_root( &mut self, path: PathBuf ) -> bool {
        if self.library_roots.contains( &path ) {
            return false;
        }
        self.library_roots.push( path );
        true
    }


    /// Removes a library root. Returns false if it was not present.
    pub fn remove_root( &mut self, path: &Path ) -> bool {
        let before = self.library_roots.len();
        self.library_roots.retain( |p| p != path );
        self.library_roots.len() != before
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );

        let mut settings = Settings::default();
        settings.library_roots = vec![ PathBuf::from( "/music" ) ];
        settings.seek_step_secs = 5.0;
        settings.save_to( &path );

        assert_eq!( Settings::load_from( &path ), settings );
    }


    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "page_size": 50 }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.page_size, 50 );
        assert_eq!( settings.tick_interval_ms, 100 );
    }


    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();
        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }


    #[test]
    fn test_roots() {
        let mut settings = Settings { library_roots: Vec::new(), ..Settings::default() };
        assert!( settings.add_root( PathBuf::from( "/a" ) ) );
        assert!( !settings.add_root( PathBuf::from( "/a" ) ) );
        assert!( settings.remove_root( Path::new( "/a" ) ) );
        assert!( !settings.remove_root( Path::new( "/a" ) ) );
    }
}
