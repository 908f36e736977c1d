//! Seek bar gesture handling
//!
//! Turns a drag along a seek bar of some width into seek calls on the
//! playback machine: grant begins the seek, moves update the preview and
//! release commits.

use crate::engine::AudioEngine;
use crate::player::{ PlaybackMachine, PlayerError };


/// One seek bar and the gesture currently on it.
#[derive( Debug, Clone, Default )]
pub struct SeekGesture {
    width: f64,
    active: bool,
}


impl SeekGesture {
    pub fn new( width: f64 ) -> Self {
        Self { width, active: false }
    }


    /// Updates the bar width after a layout change.
    pub fn set_width( &mut self, width: f64 ) {
        self.width = width;
    }


    pub fn width( &self ) -> f64 {
        self.width
    }


    /// Whether a gesture has been granted and not yet released.
    pub fn is_active( &self ) -> bool {
        self.active
    }


    /// Maps a coordinate on the bar to a fraction in `[0, 1]`.
    ///
    /// A bar without usable width always maps to 0.
    pub fn fraction( &self, x: f64 ) -> f64 {
        if !( self.width.is_finite() && self.width > 0.0 ) || !x.is_finite() {
            return 0.0;
        }
        ( x / self.width ).clamp( 0.0, 1.0 )
    }


    /// Starts a gesture at `x` and previews that position.
    ///
    /// @returns false if the machine cannot seek right now
    pub fn grant<E: AudioEngine>( &mut self, machine: &mut PlaybackMachine<E>, x: f64 ) -> bool {
        self.active = machine.begin_seek();
        if self.active {
            machine.update_seek_preview( self.target( machine, x ) );
        }
        self.active
    }


    /// Follows the gesture to `x`.
    pub fn moved<E: AudioEngine>( &mut self, machine: &mut PlaybackMachine<E>, x: f64 ) {
        if self.active {
            machine.update_seek_preview( self.target( machine, x ) );
        }
    }


    /// Ends the gesture at `x` and commits the seek.
    ///
    /// @returns The committed position, or None if nothing was committed
    pub async fn release<E: AudioEngine>(
        &mut self,
        machine: &mut PlaybackMachine<E>,
        x: f64,
    ) -> Result<Option<f64>, PlayerError> {
        if !std::mem::take( &mut self.active ) {
            return Ok( None );
        }

        let target = self.target( machine, x );
        if machine.commit_seek( target ).await? {
            Ok( Some( machine.position() ) )
        } else {
            Ok( None )
        }
    }


    fn target<E: AudioEngine>( &self, machine: &PlaybackMachine<E>, x: f64 ) -> f64 {
        self.fraction( x ) * machine.duration()
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::engine::{ EngineError, EngineEvent };
    use crate::media::{ Album, MediaIndex, MediaIndexError, Page, PageRequest };
    use crate::player::TransportState;
    use crate::track::{ TrackId, TrackRef };


    struct NullEngine;


    #[async_trait]
    impl AudioEngine for NullEngine {
        async fn load( &mut self, _track: &TrackRef ) -> Result<(), EngineError> { Ok(()) }
        async fn play( &mut self ) -> Result<(), EngineError> { Ok(()) }
        async fn pause( &mut self ) -> Result<(), EngineError> { Ok(()) }
        async fn seek_to( &mut self, _seconds: f64 ) -> Result<(), EngineError> { Ok(()) }
    }


    struct EmptyIndex;


    #[async_trait]
    impl MediaIndex for EmptyIndex {
        async fn page( &self, _request: PageRequest ) -> Result<Page, MediaIndexError> {
            Ok( Page::default() )
        }

        async fn lookup( &self, _id: &TrackId ) -> Result<Option<TrackRef>, MediaIndexError> {
            Ok( None )
        }

        async fn albums( &self ) -> Result<Vec<Album>, MediaIndexError> {
            Ok( Vec::new() )
        }
    }


    async fn ready_machine( duration: f64 ) -> PlaybackMachine<NullEngine> {
        let mut machine = PlaybackMachine::new( NullEngine, Arc::new( EmptyIndex ) );
        let track = TrackRef::new( "a", "a.mp3", "file:///a.mp3" );
        machine.load( &track ).await.unwrap();
        machine.handle_event( EngineEvent::Ready { track_id: track.id.clone(), duration } ).await.unwrap();
        machine
    }


    #[test]
    fn test_fraction_clamps() {
        let bar = SeekGesture::new( 200.0 );
        assert_eq!( bar.fraction( 50.0 ), 0.25 );
        assert_eq!( bar.fraction( -10.0 ), 0.0 );
        assert_eq!( bar.fraction( 900.0 ), 1.0 );
        assert_eq!( bar.fraction( f64::NAN ), 0.0 );
    }


    #[test]
    fn test_zero_width() {
        let mut bar = SeekGesture::new( 0.0 );
        assert_eq!( bar.fraction( 10.0 ), 0.0 );
        bar.set_width( 100.0 );
        assert_eq!( bar.fraction( 10.0 ), 0.1 );
    }


    #[tokio::test]
    async fn test_drag_commits_position() {
        let mut machine = ready_machine( 200.0 ).await;
        let mut bar = SeekGesture::new( 400.0 );

        assert!( bar.grant( &mut machine, 100.0 ) );
        assert_eq!( machine.state(), TransportState::Seeking );
        assert_eq!( machine.position(), 50.0 );

        bar.moved( &mut machine, 300.0 );
        assert_eq!( machine.position(), 150.0 );

        assert_eq!( bar.release( &mut machine, 300.0 ).await, Ok( Some( 150.0 ) ) );
        assert!( !bar.is_active() );
        assert_eq!( machine.state(), TransportState::Paused );
    }


    #[tokio::test]
    async fn test_release_without_grant() {
        let mut machine = ready_machine( 200.0 ).await;
        let mut bar = SeekGesture::new( 400.0 );

        bar.moved( &mut machine, 300.0 );
        assert_eq!( bar.release( &mut machine, 300.0 ).await, Ok( None ) );
        assert_eq!( machine.position(), 0.0 );
    }


    #[tokio::test]
    async fn test_grant_refused_while_idle() {
        let mut machine = PlaybackMachine::new( NullEngine, Arc::new( EmptyIndex ) );
        let mut bar = SeekGesture::new( 400.0 );

        assert!( !bar.grant( &mut machine, 100.0 ) );
        assert_eq!( bar.release( &mut machine, 100.0 ).await, Ok( None ) );
        assert_eq!( machine.state(), TransportState::Idle );
    }
}
