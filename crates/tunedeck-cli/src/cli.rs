//! Command-line argument parsing for Tunedeck.

use std::path::PathBuf;

use clap::{ Parser, Subcommand };

use tunedeck_core::RepeatMode;


/// Tunedeck - Music library, playlists and a headless player.
#[derive( Parser, Debug )]
#[command( name = "tunedeck" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Music directory to index. Overrides the configured roots; repeatable.
    #[arg( short, long = "root", global = true )]
    pub roots: Vec<PathBuf>,

    /// Directory holding favorites and playlists.
    #[arg( short, long, global = true )]
    pub data_dir: Option<PathBuf>,

    #[command( subcommand )]
    pub command: Commands,
}


#[derive( Subcommand, Debug )]
pub enum Commands {
    /// List tracks in the library
    Tracks {
        /// Only tracks from this album
        #[arg( short, long )]
        album: Option<String>,

        /// Only tracks whose name contains this text
        #[arg( short, long )]
        search: Option<String>,
    },

    /// List albums
    Albums,

    /// Manage favorite tracks
    Favorites {
        #[command( subcommand )]
        action: FavoritesAction,
    },

    /// Manage playlists
    Playlist {
        #[command( subcommand )]
        action: PlaylistAction,
    },

    /// Start an interactive listening session
    Play {
        /// Track to start with
        track: Option<String>,

        /// Queue a playlist (id or name)
        #[arg( short, long, conflicts_with = "album" )]
        playlist: Option<String>,

        /// Queue an album
        #[arg( short, long )]
        album: Option<String>,

        /// Shuffle the queue
        #[arg( long )]
        shuffle: bool,

        /// Repeat mode: off, one or all
        #[arg( long )]
        repeat: Option<RepeatMode>,
    },

    /// Show or change settings
    Config {
        #[command( subcommand )]
        action: ConfigAction,
    },
}


#[derive( Subcommand, Debug )]
pub enum FavoritesAction {
    /// List favorite tracks
    List,
    /// Add a track to favorites
    Add { track: String },
    /// Remove a track from favorites
    Remove { track: String },
    /// Add or remove a track
    Toggle { track: String },
}


#[derive( Subcommand, Debug )]
pub enum PlaylistAction {
    /// List playlists
    List,
    /// Show the tracks of a playlist
    Show { playlist: String },
    /// Create an empty playlist
    Create { name: String },
    /// Rename a playlist
    Rename { playlist: String, name: String },
    /// Delete a playlist
    Delete { playlist: String },
    /// Add tracks to a playlist
    Add {
        playlist: String,
        #[arg( required = true )]
        tracks: Vec<String>,
    },
    /// Remove a track from a playlist
    Remove { playlist: String, track: String },
    /// Add a track to the first playlist, creating one if needed
    QuickAdd { track: String },
}


#[derive( Subcommand, Debug )]
pub enum ConfigAction {
    /// Print the current settings
    Show,
    /// Add a library root
    AddRoot { path: PathBuf },
    /// Remove a library root
    RemoveRoot { path: PathBuf },
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play_flags() {
        let args = Args::try_parse_from( [
            "tunedeck", "play", "--playlist", "Road trip", "--shuffle", "--repeat", "all",
        ]).unwrap();

        match args.command {
            Commands::Play { track, playlist, shuffle, repeat, .. } => {
                assert_eq!( track, None );
                assert_eq!( playlist.as_deref(), Some( "Road trip" ) );
                assert!( shuffle );
                assert_eq!( repeat, Some( RepeatMode::All ) );
            }
            other => panic!( "unexpected {:?}", other ),
        }
    }


    #[test]
    fn test_playlist_conflicts_with_album() {
        let result = Args::try_parse_from( [ "tunedeck", "play", "--playlist", "a", "--album", "b" ] );
        assert!( result.is_err() );
    }


    #[test]
    fn test_global_roots() {
        let args = Args::try_parse_from( [ "tunedeck", "albums", "-r", "/music", "--root", "/more" ] ).unwrap();
        assert_eq!( args.roots, vec![ PathBuf::from( "/music" ), PathBuf::from( "/more" ) ] );
    }


    #[test]
    fn test_playlist_add_requires_tracks() {
        assert!( Args::try_parse_from( [ "tunedeck", "playlist", "add", "p" ] ).is_err() );
        assert!( Args::try_parse_from( [ "tunedeck", "playlist", "quick-add", "t1" ] ).is_ok() );
    }
}
