//! Playback state machine
//!
//! The `PlaybackMachine` owns the engine handle for one listening session and
//! is the only thing allowed to change transport state. Two producers feed it:
//! user commands (play, seek gestures, skips) and engine events (readiness,
//! position ticks). The `Seeking` state decides which of them wins.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use crate::engine::{ AudioEngine, EngineError, EngineEvent, PositionTick };
use crate::media::MediaIndex;
use crate::queue::{ Queue, RepeatMode };
use crate::track::{ format_time, progress_percent, TrackId, TrackRef };


/// Errors that can occur during playback.
#[derive( Debug, Clone, PartialEq, Error )]
pub enum PlayerError {
    #[error( "Track {0} has no playable location" )]
    InvalidTrack( TrackId ),

    #[error( "Audio engine error: {0}" )]
    EngineFault( String ),

    #[error( "No track loaded" )]
    NoTrack,
}


impl From<EngineError> for PlayerError {
    fn from( e: EngineError ) -> Self {
        PlayerError::EngineFault( e.0 )
    }
}


/// Current transport state.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum TransportState {
    /// No track loaded.
    #[default]
    Idle,
    /// Track assigned, engine not ready yet.
    Loading,
    Paused,
    Playing,
    /// A seek gesture is in progress.
    Seeking,
    /// The engine failed. Cleared by loading another track.
    Error,
}


#[derive( Debug, Clone, Copy, PartialEq, Eq )]
enum Direction {
    Next,
    Previous,
    To( usize ),
}


/// Playback session over one engine.
pub struct PlaybackMachine<E: AudioEngine> {
    engine: E,
    index: Arc<dyn MediaIndex>,
    queue: Option<Queue>,
    state: TransportState,
    track: Option<TrackRef>,
    position: f64,
    duration: f64,
    /// State to return to when a seek ends
    resume: TransportState,
    /// Position before the seek began, restored if the engine rejects it
    seek_origin: f64,
    /// `play` was requested while loading
    play_pending: bool,
    /// Ticks sampled before this instant are stale
    ticks_after: Option<Instant>,
    last_error: Option<String>,
}


impl<E: AudioEngine> PlaybackMachine<E> {
    /// Creates an idle machine.
    ///
    /// @param engine - Engine the machine drives
    /// @param index - Media index used to resolve queued track ids
    pub fn new( engine: E, index: Arc<dyn MediaIndex> ) -> Self {
        Self {
            engine,
            index,
            queue: None,
            state: TransportState::Idle,
            track: None,
            position: 0.0,
            duration: 0.0,
            resume: TransportState::Paused,
            seek_origin: 0.0,
            play_pending: false,
            ticks_after: None,
            last_error: None,
        }
    }


    /// Gets the transport state.
    pub fn state( &self ) -> TransportState {
        self.state
    }


    /// Gets the loaded track, if any.
    pub fn current_track( &self ) -> Option<&TrackRef> {
        self.track.as_ref()
    }


    /// Gets the last known position in seconds.
    pub fn position( &self ) -> f64 {
        self.position
    }


    /// Gets the duration in seconds. 0 means unknown.
    pub fn duration( &self ) -> f64 {
        self.duration
    }


    /// Gets progress through the track as a percentage.
    pub fn progress( &self ) -> f64 {
        progress_percent( self.position, self.duration )
    }


    /// Formats position and duration as `m:ss / m:ss`.
    pub fn formatted_position( &self ) -> String {
        format!( "{} / {}", format_time( self.position ), format_time( self.duration ) )
    }


    pub fn is_seeking( &self ) -> bool {
        self.state == TransportState::Seeking
    }


    /// Whether the session intends to be playing, counting a pending play
    /// and the state a seek will return to.
    pub fn wants_playback( &self ) -> bool {
        match self.state {
            TransportState::Playing => true,
            TransportState::Loading => self.play_pending,
            TransportState::Seeking => self.resume == TransportState::Playing,
            _ => false,
        }
    }


    /// Reason for the last engine failure.
    pub fn last_error( &self ) -> Option<&str> {
        self.last_error.as_deref()
    }


    pub fn engine( &self ) -> &E {
        &self.engine
    }


    pub fn engine_mut( &mut self ) -> &mut E {
        &mut self.engine
    }


    /// Attaches a queue, returning the previous one. Nothing is loaded.
    pub fn set_queue( &mut self, queue: Queue ) -> Option<Queue> {
        self.queue.replace( queue )
    }


    pub fn queue( &self ) -> Option<&Queue> {
        self.queue.as_ref()
    }


    pub fn queue_mut( &mut self ) -> Option<&mut Queue> {
        self.queue.as_mut()
    }


    /// Repeat mode of the attached queue, off without one.
    pub fn repeat( &self ) -> RepeatMode {
        self.queue.as_ref().map( Queue::repeat ).unwrap_or_default()
    }


    /// Attaches a queue and loads its current entry.
    ///
    /// @returns Ok(true) if a track was loaded, Ok(false) if the queue is
    /// empty or its current id could not be resolved
    pub async fn start_queue( &mut self, queue: Queue, autoplay: bool ) -> Result<bool, PlayerError> {
        let current = queue.current().cloned();
        self.queue = Some( queue );

        let Some( id ) = current else {
            return Ok( false );
        };
        let Some( track ) = self.resolve( &id ).await else {
            return Ok( false );
        };

        self.load_with_intent( &track, autoplay ).await?;
        Ok( true )
    }


    /// Loads a track, abandoning whatever was loading or playing before.
    ///
    /// Position resets to 0 and duration to unknown. The machine waits in
    /// `Loading` until the engine reports ready.
    pub async fn load( &mut self, track: &TrackRef ) -> Result<(), PlayerError> {
        self.load_with_intent( track, false ).await
    }


    async fn load_with_intent( &mut self, track: &TrackRef, play: bool ) -> Result<(), PlayerError> {
        if !track.is_playable() {
            return Err( PlayerError::InvalidTrack( track.id.clone() ) );
        }

        tracing::info!( "Loading: {} ({})", track.name, track.id );
        self.track = Some( track.clone() );
        self.position = 0.0;
        self.duration = 0.0;
        self.play_pending = false;
        self.resume = TransportState::Paused;
        self.last_error = None;
        self.set_state( TransportState::Loading );

        if let Err( e ) = self.engine.load( track ).await {
            return Err( self.fail( e.0 ) );
        }

        self.ticks_after = Some( Instant::now() );
        self.play_pending = play;
        Ok(())
    }


    /// Starts or resumes playback.
    ///
    /// While loading, playback starts once the engine is ready. During a seek
    /// the machine resumes playing when the seek ends.
    pub async fn play( &mut self ) -> Result<(), PlayerError> {
        match self.state {
            TransportState::Playing => Ok(()),
            TransportState::Loading => {
                self.play_pending = true;
                Ok(())
            }
            TransportState::Seeking => {
                self.resume = TransportState::Playing;
                Ok(())
            }
            TransportState::Paused => {
                if self.duration > 0.0 && self.position >= self.duration {
                    self.seek_engine( 0.0 ).await?;
                }
                self.engine.play().await.map_err( Self::rejected )?;
                self.set_state( TransportState::Playing );
                Ok(())
            }
            TransportState::Idle => Err( PlayerError::NoTrack ),
            TransportState::Error => Err( PlayerError::EngineFault(
                self.last_error.clone().unwrap_or_else( || "engine failed".into() )
            )),
        }
    }


    /// Pauses playback. Does nothing unless playing or about to play.
    pub async fn pause( &mut self ) -> Result<(), PlayerError> {
        match self.state {
            TransportState::Playing => {
                self.engine.pause().await.map_err( Self::rejected )?;
                self.set_state( TransportState::Paused );
            }
            TransportState::Loading => self.play_pending = false,
            TransportState::Seeking => self.resume = TransportState::Paused,
            _ => {}
        }
        Ok(())
    }


    /// Toggles between playing and paused.
    pub async fn toggle_play( &mut self ) -> Result<(), PlayerError> {
        if self.wants_playback() {
            self.pause().await
        } else {
            self.play().await
        }
    }


    /// Pauses and rewinds to the start.
    pub async fn stop( &mut self ) -> Result<(), PlayerError> {
        match self.state {
            TransportState::Playing | TransportState::Paused => {
                self.pause().await?;
                self.seek_engine( 0.0 ).await
            }
            TransportState::Loading => {
                self.play_pending = false;
                Ok(())
            }
            _ => Ok(()),
        }
    }


    /// Seeks straight to a position, outside of any gesture.
    pub async fn seek_to( &mut self, seconds: f64 ) -> Result<(), PlayerError> {
        match self.state {
            TransportState::Playing | TransportState::Paused => {
                let target = self.clamp( seconds );
                self.seek_engine( target ).await
            }
            TransportState::Idle => Err( PlayerError::NoTrack ),
            _ => Ok(()),
        }
    }


    /// Seeks relative to the current position.
    pub async fn seek_relative( &mut self, delta: f64 ) -> Result<(), PlayerError> {
        let delta = if delta.is_finite() { delta } else { 0.0 };
        self.seek_to( self.position + delta ).await
    }


    /// Enters `Seeking` from `Playing` or `Paused`.
    ///
    /// @returns true if a seek is now in progress
    pub fn begin_seek( &mut self ) -> bool {
        match self.state {
            TransportState::Seeking => true,
            TransportState::Playing | TransportState::Paused => {
                self.resume = self.state;
                self.seek_origin = self.position;
                self.set_state( TransportState::Seeking );
                true
            }
            _ => false,
        }
    }


    /// Shows a gesture position while seeking.
    pub fn update_seek_preview( &mut self, seconds: f64 ) -> bool {
        if self.state != TransportState::Seeking {
            return false;
        }
        self.position = self.clamp( seconds );
        true
    }


    /// Ends a seek by moving the engine to `seconds`.
    ///
    /// Resolves once the engine has acknowledged the seek, then returns to
    /// the state held before the seek began. A rejected seek also puts the
    /// position back where it was. Without a seek in progress nothing
    /// happens.
    ///
    /// @returns Ok(true) if a seek was committed
    pub async fn commit_seek( &mut self, seconds: f64 ) -> Result<bool, PlayerError> {
        if self.state != TransportState::Seeking {
            tracing::debug!( "Ignoring seek commit while {:?}", self.state );
            return Ok( false );
        }

        let target = self.clamp( seconds );
        self.position = target;

        let result = self.engine.seek_to( target ).await;
        let resume = self.resume;
        self.set_state( resume );

        match result {
            Ok(()) => {
                self.ticks_after = Some( Instant::now() );
                tracing::debug!( "Seek committed at {:.2}s", target );
                Ok( true )
            }
            Err( e ) => {
                self.position = self.seek_origin;
                Err( Self::rejected( e ) )
            }
        }
    }


    /// Skips to the next queued track.
    ///
    /// @returns Ok(true) if a new track was loaded, Ok(false) if there is
    /// nothing to skip to
    pub async fn skip_to_next( &mut self ) -> Result<bool, PlayerError> {
        let intent = self.wants_playback();
        self.skip( Direction::Next, intent ).await
    }


    /// Skips to the previous queued track.
    pub async fn skip_to_previous( &mut self ) -> Result<bool, PlayerError> {
        let intent = self.wants_playback();
        self.skip( Direction::Previous, intent ).await
    }


    /// Jumps to a queue entry.
    pub async fn skip_to_index( &mut self, index: usize ) -> Result<bool, PlayerError> {
        let intent = self.wants_playback();
        self.skip( Direction::To( index ), intent ).await
    }


    /// Advances after the current track finished.
    ///
    /// With repeat one the same track starts over. Without a successor the
    /// session rests paused at the end.
    pub async fn on_track_ended( &mut self ) -> Result<bool, PlayerError> {
        if self.duration > 0.0 {
            self.position = self.duration;
        }
        if matches!( self.state, TransportState::Playing | TransportState::Seeking ) {
            self.set_state( TransportState::Paused );
        }

        let advanced = self.skip( Direction::Next, true ).await?;
        if !advanced {
            tracing::info!( "Reached the end of the queue" );
        }
        Ok( advanced )
    }


    async fn skip( &mut self, direction: Direction, play: bool ) -> Result<bool, PlayerError> {
        let Some( queue ) = self.queue.as_mut() else {
            return Ok( false );
        };

        let before = queue.clone();
        let next = match direction {
            Direction::Next => queue.next(),
            Direction::Previous => queue.previous(),
            Direction::To( index ) => queue.jump_to( index ).cloned(),
        };
        let Some( id ) = next else {
            return Ok( false );
        };

        let Some( track ) = self.resolve( &id ).await else {
            self.queue = Some( before );
            return Ok( false );
        };

        match self.load_with_intent( &track, play ).await {
            Ok(()) => Ok( true ),
            Err( e @ PlayerError::InvalidTrack( _ ) ) => {
                self.queue = Some( before );
                Err( e )
            }
            // The failed track stays current so the next skip moves past it
            Err( e ) => Err( e ),
        }
    }


    async fn resolve( &self, id: &TrackId ) -> Option<TrackRef> {
        match self.index.lookup( id ).await {
            Ok( Some( track ) ) => Some( track ),
            Ok( None ) => {
                tracing::warn!( "Queued track {} is not in the library", id );
                None
            }
            Err( e ) => {
                tracing::warn!( "Could not resolve queued track {}: {}", id, e );
                None
            }
        }
    }


    /// Applies an engine notification.
    ///
    /// Events for any track other than the current one are dropped. An
    /// engine error, or a rejected deferred play, is returned to the caller.
    pub async fn handle_event( &mut self, event: EngineEvent ) -> Result<(), PlayerError> {
        let current = self.track.as_ref().map( |t| &t.id );
        if current != Some( event.track_id() ) {
            tracing::debug!( "Dropping event for {}: not the current track", event.track_id() );
            return Ok(());
        }

        match event {
            EngineEvent::Ready { duration, .. } => self.on_engine_ready( duration ).await,
            EngineEvent::Position( tick ) => {
                self.on_position_tick( tick );
                Ok(())
            }
            EngineEvent::Ended { .. } => self.on_track_ended().await.map( |_| () ),
            EngineEvent::Error { reason, .. } => Err( self.on_engine_error( reason ) ),
        }
    }


    async fn on_engine_ready( &mut self, duration: f64 ) -> Result<(), PlayerError> {
        if self.state != TransportState::Loading {
            return Ok(());
        }

        let fallback = self.track.as_ref().map( |t| t.duration ).unwrap_or( 0.0 );
        self.duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else if fallback.is_finite() && fallback > 0.0 {
            fallback
        } else {
            0.0
        };
        self.set_state( TransportState::Paused );

        if std::mem::take( &mut self.play_pending ) {
            self.play().await?;
        }
        Ok(())
    }


    /// Records a position reported by the engine.
    ///
    /// Ignored while seeking, when sampled before the last seek or load
    /// completed, and when it would move the position backwards.
    pub fn on_position_tick( &mut self, tick: PositionTick ) {
        if !matches!( self.state, TransportState::Playing | TransportState::Paused ) {
            tracing::trace!( "Dropping tick while {:?}", self.state );
            return;
        }
        if self.track.as_ref().map( |t| &t.id ) != Some( &tick.track_id ) {
            return;
        }
        if self.ticks_after.is_some_and( |gate| tick.at < gate ) {
            tracing::trace!( "Dropping tick sampled before the last seek" );
            return;
        }
        if !tick.position.is_finite() {
            return;
        }

        let position = self.clamp( tick.position );
        if position < self.position {
            tracing::trace!( "Dropping backwards tick {:.2} < {:.2}", position, self.position );
            return;
        }
        self.position = position;
    }


    /// Moves to `Error` after the engine reports a failure.
    pub fn on_engine_error( &mut self, reason: String ) -> PlayerError {
        self.fail( reason )
    }


    fn fail( &mut self, reason: String ) -> PlayerError {
        tracing::error!( "Audio engine failed: {}", reason );
        self.play_pending = false;
        self.last_error = Some( reason.clone() );
        self.set_state( TransportState::Error );
        PlayerError::EngineFault( reason )
    }


    // A rejected command leaves the state alone but still surfaces
    fn rejected( e: EngineError ) -> PlayerError {
        tracing::error!( "Audio engine rejected command: {}", e );
        PlayerError::from( e )
    }


    async fn seek_engine( &mut self, target: f64 ) -> Result<(), PlayerError> {
        self.engine.seek_to( target ).await.map_err( Self::rejected )?;
        self.position = target;
        self.ticks_after = Some( Instant::now() );
        Ok(())
    }


    fn clamp( &self, seconds: f64 ) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max( 0.0 ) } else { 0.0 };
        if self.duration > 0.0 { seconds.min( self.duration ) } else { seconds }
    }


    fn set_state( &mut self, state: TransportState ) {
        if self.state != state {
            tracing::debug!( "Transport {:?} -> {:?}", self.state, state );
            self.state = state;
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::media::{ Album, MediaIndexError, Page, PageRequest };


    #[derive( Default )]
    struct RecordingEngine {
        calls: Vec<String>,
        reject_play: bool,
    }


    #[async_trait]
    impl AudioEngine for RecordingEngine {
        async fn load( &mut self, track: &TrackRef ) -> Result<(), EngineError> {
            self.calls.push( format!( "load {}", track.id ) );
            Ok(())
        }

        async fn play( &mut self ) -> Result<(), EngineError> {
            if self.reject_play {
                return Err( EngineError( "device busy".into() ) );
            }
            self.calls.push( "play".into() );
            Ok(())
        }

        async fn pause( &mut self ) -> Result<(), EngineError> {
            self.calls.push( "pause".into() );
            Ok(())
        }

        async fn seek_to( &mut self, seconds: f64 ) -> Result<(), EngineError> {
            self.calls.push( format!( "seek {}", seconds ) );
            Ok(())
        }
    }


    struct Tracks( Vec<TrackRef> );


    #[async_trait]
    impl MediaIndex for Tracks {
        async fn page( &self, _request: PageRequest ) -> Result<Page, MediaIndexError> {
            Ok( Page { items: self.0.clone(), end_cursor: None, has_next_page: false } )
        }

        async fn lookup( &self, id: &TrackId ) -> Result<Option<TrackRef>, MediaIndexError> {
            Ok( self.0.iter().find( |t| t.id == *id ).cloned() )
        }

        async fn albums( &self ) -> Result<Vec<Album>, MediaIndexError> {
            Ok( Vec::new() )
        }
    }


    fn track( id: &str, duration: f64 ) -> TrackRef {
        TrackRef::new( id, format!( "{}.mp3", id ), format!( "file:///music/{}.mp3", id ) )
            .with_duration( duration )
    }


    fn machine() -> PlaybackMachine<RecordingEngine> {
        let index = Tracks( vec![ track( "a", 200.0 ), track( "b", 100.0 ), track( "c", 50.0 ) ] );
        PlaybackMachine::new( RecordingEngine::default(), Arc::new( index ) )
    }


    fn ready( id: &str, duration: f64 ) -> EngineEvent {
        EngineEvent::Ready { track_id: TrackId::from( id ), duration }
    }


    fn tick( id: &str, position: f64 ) -> EngineEvent {
        EngineEvent::Position( PositionTick::new( TrackId::from( id ), position ) )
    }


    #[tokio::test]
    async fn test_starts_idle() {
        let mut m = machine();
        assert_eq!( m.state(), TransportState::Idle );
        assert_eq!( m.play().await, Err( PlayerError::NoTrack ) );
        assert_eq!( m.progress(), 0.0 );
    }


    #[tokio::test]
    async fn test_load_then_ready() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Loading );
        assert_eq!( m.duration(), 0.0 );

        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Paused );
        assert_eq!( m.duration(), 200.0 );
    }


    #[tokio::test]
    async fn test_unplayable_track_is_rejected() {
        let mut m = machine();
        let silent = TrackRef::new( "x", "x.mp3", "" );
        assert_eq!( m.load( &silent ).await, Err( PlayerError::InvalidTrack( TrackId::from( "x" ) ) ) );
        assert_eq!( m.state(), TransportState::Idle );
        assert!( m.engine().calls.is_empty() );
    }


    #[tokio::test]
    async fn test_play_while_loading_is_deferred() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.play().await.unwrap();
        assert_eq!( m.state(), TransportState::Loading );
        assert_eq!( m.engine().calls, vec![ "load a" ] );

        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Playing );
        assert_eq!( m.engine().calls, vec![ "load a", "play" ] );
    }


    #[tokio::test]
    async fn test_pause_cancels_deferred_play() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.play().await.unwrap();
        m.pause().await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Paused );
    }


    #[tokio::test]
    async fn test_rejected_play_surfaces() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        m.engine_mut().reject_play = true;

        let err = m.play().await.unwrap_err();
        assert_eq!( err, PlayerError::EngineFault( "device busy".into() ) );
        assert_eq!( m.state(), TransportState::Paused );
    }


    #[tokio::test]
    async fn test_ticks_are_monotonic() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        m.play().await.unwrap();

        m.handle_event( tick( "a", 10.0 ) ).await.unwrap();
        m.handle_event( tick( "a", 9.5 ) ).await.unwrap();
        assert_eq!( m.position(), 10.0 );
        m.handle_event( tick( "a", 500.0 ) ).await.unwrap();
        assert_eq!( m.position(), 200.0 );
    }


    #[tokio::test]
    async fn test_commit_without_begin_is_noop() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

        assert_eq!( m.commit_seek( 50.0 ).await, Ok( false ) );
        assert!( !m.update_seek_preview( 50.0 ) );
        assert_eq!( m.position(), 0.0 );
        assert_eq!( m.engine().calls, vec![ "load a" ] );
    }


    #[tokio::test]
    async fn test_seek_returns_to_paused() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

        assert!( m.begin_seek() );
        assert!( m.update_seek_preview( 80.0 ) );
        assert_eq!( m.commit_seek( 80.0 ).await, Ok( true ) );
        assert_eq!( m.state(), TransportState::Paused );
        assert_eq!( m.position(), 80.0 );
    }


    #[tokio::test]
    async fn test_stop_rewinds() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        m.play().await.unwrap();
        m.handle_event( tick( "a", 42.0 ) ).await.unwrap();

        m.stop().await.unwrap();
        assert_eq!( m.state(), TransportState::Paused );
        assert_eq!( m.position(), 0.0 );
        assert_eq!( m.engine().calls, vec![ "load a", "play", "pause", "seek 0" ] );
    }


    #[tokio::test]
    async fn test_seek_relative_clamps() {
        let mut m = machine();
        m.load( &track( "b", 100.0 ) ).await.unwrap();
        m.handle_event( ready( "b", 100.0 ) ).await.unwrap();

        m.seek_relative( -10.0 ).await.unwrap();
        assert_eq!( m.position(), 0.0 );
        m.seek_relative( 95.0 ).await.unwrap();
        m.seek_relative( 10.0 ).await.unwrap();
        assert_eq!( m.position(), 100.0 );
        assert_eq!( m.formatted_position(), "1:40 / 1:40" );
    }


    #[tokio::test]
    async fn test_toggle_play() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

        m.toggle_play().await.unwrap();
        assert_eq!( m.state(), TransportState::Playing );
        m.toggle_play().await.unwrap();
        assert_eq!( m.state(), TransportState::Paused );
    }


    #[tokio::test]
    async fn test_ended_advances_queue() {
        let mut m = machine();
        let queue = Queue::from_ids( [ "a", "b" ].map( TrackId::from ), 0 );
        assert!( m.start_queue( queue, true ).await.unwrap() );
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Playing );

        m.handle_event( EngineEvent::Ended { track_id: TrackId::from( "a" ) } ).await.unwrap();
        assert_eq!( m.current_track().map( |t| t.id.as_str() ), Some( "b" ) );
        m.handle_event( ready( "b", 100.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Playing );

        // Last track: rest at the end
        m.handle_event( EngineEvent::Ended { track_id: TrackId::from( "b" ) } ).await.unwrap();
        assert_eq!( m.state(), TransportState::Paused );
        assert_eq!( m.position(), 100.0 );
    }


    #[tokio::test]
    async fn test_play_at_end_restarts() {
        let mut m = machine();
        m.load( &track( "c", 50.0 ) ).await.unwrap();
        m.handle_event( ready( "c", 50.0 ) ).await.unwrap();
        m.play().await.unwrap();
        m.handle_event( EngineEvent::Ended { track_id: TrackId::from( "c" ) } ).await.unwrap();
        assert_eq!( m.position(), 50.0 );

        m.play().await.unwrap();
        assert_eq!( m.position(), 0.0 );
        assert_eq!( m.state(), TransportState::Playing );
    }


    #[tokio::test]
    async fn test_repeat_one_restarts_on_end() {
        let mut m = machine();
        let mut queue = Queue::from_ids( [ "a", "b" ].map( TrackId::from ), 0 );
        queue.set_repeat( RepeatMode::One );
        m.start_queue( queue, true ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

        m.handle_event( EngineEvent::Ended { track_id: TrackId::from( "a" ) } ).await.unwrap();
        assert_eq!( m.current_track().map( |t| t.id.as_str() ), Some( "a" ) );
        assert_eq!( m.state(), TransportState::Loading );
        assert_eq!( m.repeat(), RepeatMode::One );
    }


    #[tokio::test]
    async fn test_unknown_queued_id_keeps_cursor() {
        let mut m = machine();
        let queue = Queue::from_ids( [ "a", "ghost", "b" ].map( TrackId::from ), 0 );
        m.start_queue( queue, false ).await.unwrap();

        assert_eq!( m.skip_to_next().await, Ok( false ) );
        assert_eq!( m.queue().unwrap().cursor(), 0 );
        assert_eq!( m.current_track().map( |t| t.id.as_str() ), Some( "a" ) );
    }


    #[tokio::test]
    async fn test_skip_to_index_keeps_intent() {
        let mut m = machine();
        let queue = Queue::from_ids( [ "a", "b", "c" ].map( TrackId::from ), 0 );
        m.start_queue( queue, true ).await.unwrap();
        m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

        assert_eq!( m.skip_to_index( 2 ).await, Ok( true ) );
        assert_eq!( m.queue().unwrap().cursor(), 2 );
        m.handle_event( ready( "c", 50.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Playing );

        assert_eq!( m.skip_to_index( 7 ).await, Ok( false ) );
        assert_eq!( m.queue().unwrap().cursor(), 2 );
    }


    #[tokio::test]
    async fn test_engine_error_event() {
        let mut m = machine();
        m.load( &track( "a", 200.0 ) ).await.unwrap();
        let err = m.handle_event( EngineEvent::Error {
            track_id: TrackId::from( "a" ),
            reason: "decoder crashed".into(),
        }).await;

        assert_eq!( err, Err( PlayerError::EngineFault( "decoder crashed".into() ) ) );
        assert_eq!( m.state(), TransportState::Error );
        assert_eq!( m.last_error(), Some( "decoder crashed" ) );
        assert!( m.play().await.is_err() );

        m.load( &track( "b", 100.0 ) ).await.unwrap();
        assert_eq!( m.state(), TransportState::Loading );
        assert_eq!( m.last_error(), None );
    }
}
