//! Test doubles shared by the integration tests.

#![allow( dead_code )]

use std::sync::Arc;

use async_trait::async_trait;

use tunedeck_core::{
    AudioEngine, Album, EngineError, EngineEvent, MediaIndex, MediaIndexError, Page,
    PageRequest, PlaybackMachine, PositionTick, TrackId, TrackRef,
};


/// A command the engine received.
#[derive( Debug, Clone, PartialEq )]
pub enum Call {
    Load( TrackId ),
    Play,
    Pause,
    SeekTo( f64 ),
}


/// Engine that records commands and can be told to reject them.
#[derive( Debug, Default )]
pub struct MockEngine {
    pub calls: Vec<Call>,
    pub reject_load: bool,
    pub reject_play: bool,
    pub reject_seek: bool,
}


#[async_trait]
impl AudioEngine for MockEngine {
    async fn load( &mut self, track: &TrackRef ) -> Result<(), EngineError> {
        if self.reject_load {
            return Err( EngineError( format!( "cannot open {}", track.name ) ) );
        }
        self.calls.push( Call::Load( track.id.clone() ) );
        Ok(())
    }


    async fn play( &mut self ) -> Result<(), EngineError> {
        if self.reject_play {
            return Err( EngineError( "audio focus denied".into() ) );
        }
        self.calls.push( Call::Play );
        Ok(())
    }


    async fn pause( &mut self ) -> Result<(), EngineError> {
        self.calls.push( Call::Pause );
        Ok(())
    }


    async fn seek_to( &mut self, seconds: f64 ) -> Result<(), EngineError> {
        if self.reject_seek {
            return Err( EngineError( "stream not seekable".into() ) );
        }
        self.calls.push( Call::SeekTo( seconds ) );
        Ok(())
    }
}


/// Media index over a fixed list of tracks.
pub struct ListIndex( pub Vec<TrackRef> );


#[async_trait]
impl MediaIndex for ListIndex {
    async fn page( &self, request: PageRequest ) -> Result<Page, MediaIndexError> {
        let start = match request.after {
            Some( c ) => c.parse().map_err( |_| MediaIndexError::InvalidCursor( c ) )?,
            None => 0,
        };
        let end = ( start + request.first ).min( self.0.len() );
        Ok( Page {
            items: self.0[ start..end ].to_vec(),
            end_cursor: Some( end.to_string() ),
            has_next_page: end < self.0.len(),
        })
    }


    async fn lookup( &self, id: &TrackId ) -> Result<Option<TrackRef>, MediaIndexError> {
        Ok( self.0.iter().find( |t| t.id == *id ).cloned() )
    }


    async fn albums( &self ) -> Result<Vec<Album>, MediaIndexError> {
        Ok( Vec::new() )
    }
}


pub fn track( id: &str, duration: f64 ) -> TrackRef {
    TrackRef::new( id, format!( "{}.mp3", id ), format!( "file:///music/{}.mp3", id ) )
        .with_duration( duration )
}


/// Machine over a mock engine and a library of tracks "a", "b" and "c".
pub fn machine() -> PlaybackMachine<MockEngine> {
    let library = vec![ track( "a", 200.0 ), track( "b", 180.0 ), track( "c", 90.0 ) ];
    PlaybackMachine::new( MockEngine::default(), Arc::new( ListIndex( library ) ) )
}


pub fn ready( id: &str, duration: f64 ) -> EngineEvent {
    EngineEvent::Ready { track_id: TrackId::from( id ), duration }
}


pub fn tick( id: &str, position: f64 ) -> EngineEvent {
    EngineEvent::Position( PositionTick::new( TrackId::from( id ), position ) )
}
