//! Track references
//!
//! Immutable descriptors of playable media items as handed out by the
//! media index. Everything else in the crate refers to tracks by id.

use std::fmt;

use serde::{ Deserialize, Serialize };


/// Stable identifier of a device media item.
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize )]
#[serde( transparent )]
pub struct TrackId( String );


impl TrackId {
    pub fn new( id: impl Into<String> ) -> Self {
        Self( id.into() )
    }


    pub fn as_str( &self ) -> &str {
        &self.0
    }
}


impl fmt::Display for TrackId {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( &self.0 )
    }
}


impl From<&str> for TrackId {
    fn from( s: &str ) -> Self {
        Self( s.to_string() )
    }
}


impl From<String> for TrackId {
    fn from( s: String ) -> Self {
        Self( s )
    }
}


/// Kind of media behind a track reference.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
#[serde( rename_all = "lowercase" )]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
    #[serde( other )]
    Unknown,
}


/// A playable media item.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
pub struct TrackRef {
    pub id: TrackId,

    /// Display name (the file name on most devices).
    #[serde( alias = "filename" )]
    pub name: String,

    /// Duration in seconds, 0 when unknown.
    #[serde( default )]
    pub duration: f64,

    /// Opaque playable URI. Empty means the track cannot be played.
    #[serde( default, alias = "uri" )]
    pub locator: String,

    #[serde( default, alias = "mediaType" )]
    pub kind: MediaKind,
}


impl TrackRef {
    pub fn new( id: impl Into<TrackId>, name: impl Into<String>, locator: impl Into<String> ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration: 0.0,
            locator: locator.into(),
            kind: MediaKind::Audio,
        }
    }


    /// Sets the duration in seconds.
    pub fn with_duration( mut self, seconds: f64 ) -> Self {
        self.duration = seconds;
        self
    }


    /// Returns true if the track has a locator the engine can open.
    pub fn is_playable( &self ) -> bool {
        !self.locator.trim().is_empty()
    }
}


/// Progress through a track as a percentage.
///
/// Unknown or non-positive durations yield 0.
pub fn progress_percent( position: f64, duration: f64 ) -> f64 {
    if !( duration > 0.0 ) || !position.is_finite() {
        return 0.0;
    }
    ( position / duration * 100.0 ).clamp( 0.0, 100.0 )
}


/// Formats seconds as `m:ss`.
pub fn format_time( seconds: f64 ) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!( "{}:{:02}", total / 60, total % 60 )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_progress_zero_duration() {
        assert_eq!( progress_percent( 42.0, 0.0 ), 0.0 );
        assert_eq!( progress_percent( 42.0, -1.0 ), 0.0 );
    }


    #[test]
    fn test_progress_half() {
        assert_eq!( progress_percent( 100.0, 200.0 ), 50.0 );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 61.9 ), "1:01" );
        assert_eq!( format_time( 600.0 ), "10:00" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }


    #[test]
    fn test_playable() {
        assert!( TrackRef::new( "1", "a.mp3", "file:///a.mp3" ).is_playable() );
        assert!( !TrackRef::new( "1", "a.mp3", "  " ).is_playable() );
    }


    #[test]
    fn test_decode_media_library_record() {
        let raw = r#"{"id":"42","filename":"song.mp3","uri":"file:///song.mp3","duration":180.5,"mediaType":"audio"}"#;
        let track: TrackRef = serde_json::from_str( raw ).unwrap();
        assert_eq!( track.id, TrackId::from( "42" ) );
        assert_eq!( track.name, "song.mp3" );
        assert_eq!( track.locator, "file:///song.mp3" );
        assert_eq!( track.kind, MediaKind::Audio );
    }


    #[test]
    fn test_unknown_media_kind() {
        let raw = r#"{"id":"1","name":"x","kind":"photo"}"#;
        let track: TrackRef = serde_json::from_str( raw ).unwrap();
        assert_eq!( track.kind, MediaKind::Unknown );
        assert!( !track.is_playable() );
    }
}
