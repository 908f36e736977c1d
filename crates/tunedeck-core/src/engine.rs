//! Audio engine handle
//!
//! The engine that actually produces sound lives outside this crate. The
//! playback machine drives it through [`AudioEngine`] and hears back through
//! [`EngineEvent`]s sent over an unbounded channel, so the tick source never
//! waits on the machine.
//!
//! [`ClockEngine`] is a headless engine: it tracks position against the
//! clock and emits ticks, but outputs nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::{ self, UnboundedReceiver, UnboundedSender };
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::track::{ TrackId, TrackRef };


/// Default interval between position ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis( 100 );


/// A command rejected by the engine.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
#[error( "{0}" )]
pub struct EngineError( pub String );


/// Position sample reported by the engine.
#[derive( Debug, Clone, PartialEq )]
pub struct PositionTick {
    pub track_id: TrackId,
    pub position: f64,

    /// When the engine sampled the position.
    pub at: Instant,
}


impl PositionTick {
    /// Creates a tick sampled now.
    pub fn new( track_id: TrackId, position: f64 ) -> Self {
        Self { track_id, position, at: Instant::now() }
    }
}


/// Notifications from the engine.
#[derive( Debug, Clone, PartialEq )]
pub enum EngineEvent {
    /// The loaded source can play. Duration 0 means unknown.
    Ready { track_id: TrackId, duration: f64 },
    Position( PositionTick ),
    /// Playback reached the end of the track.
    Ended { track_id: TrackId },
    Error { track_id: TrackId, reason: String },
}


impl EngineEvent {
    /// Track the event refers to.
    pub fn track_id( &self ) -> &TrackId {
        match self {
            EngineEvent::Ready { track_id, .. }
            | EngineEvent::Ended { track_id }
            | EngineEvent::Error { track_id, .. } => track_id,
            EngineEvent::Position( tick ) => &tick.track_id,
        }
    }
}


/// Creates the channel engines report events on.
pub fn event_channel() -> ( UnboundedSender<EngineEvent>, UnboundedReceiver<EngineEvent> ) {
    mpsc::unbounded_channel()
}


/// Commands understood by an audio engine.
///
/// Every command resolves once the engine has acknowledged it.
#[async_trait]
pub trait AudioEngine: Send {
    /// Replaces the current source. Readiness is reported with
    /// [`EngineEvent::Ready`].
    async fn load( &mut self, track: &TrackRef ) -> Result<(), EngineError>;

    async fn play( &mut self ) -> Result<(), EngineError>;

    async fn pause( &mut self ) -> Result<(), EngineError>;

    /// Seeks to a position in seconds.
    async fn seek_to( &mut self, seconds: f64 ) -> Result<(), EngineError>;
}


#[derive( Debug, Default )]
struct Clock {
    track: Option<TrackId>,
    duration: f64,
    // Position when the clock was last started, paused or moved
    base: f64,
    started_at: Option<Instant>,
}


impl Clock {
    fn position( &self, now: Instant ) -> f64 {
        let running = self.started_at
            .map( |t| now.saturating_duration_since( t ).as_secs_f64() )
            .unwrap_or( 0.0 );
        let position = self.base + running;
        if self.duration > 0.0 { position.min( self.duration ) } else { position }
    }
}


/// Engine that advances position with wall-clock time and emits a tick
/// every interval while playing.
pub struct ClockEngine {
    events: UnboundedSender<EngineEvent>,
    tick_interval: Duration,
    clock: Arc<Mutex<Clock>>,
    ticker: Option<JoinHandle<()>>,
}


impl ClockEngine {
    pub fn new( events: UnboundedSender<EngineEvent> ) -> Self {
        Self::with_tick_interval( events, DEFAULT_TICK_INTERVAL )
    }


    pub fn with_tick_interval( events: UnboundedSender<EngineEvent>, tick_interval: Duration ) -> Self {
        Self {
            events,
            tick_interval,
            clock: Arc::new( Mutex::new( Clock::default() ) ),
            ticker: None,
        }
    }


    fn spawn_ticker( &mut self ) {
        if self.ticker.as_ref().is_some_and( |t| !t.is_finished() ) {
            return;
        }

        let clock = Arc::clone( &self.clock );
        let events = self.events.clone();
        let period = self.tick_interval;

        self.ticker = Some( tokio::spawn( async move {
            let mut interval = tokio::time::interval( period );
            loop {
                interval.tick().await;
                let now = Instant::now();
                let mut clock = clock.lock().await;
                let Some( track_id ) = clock.track.clone() else { continue };
                if clock.started_at.is_none() {
                    continue;
                }

                let position = clock.position( now );
                let tick = PositionTick { track_id: track_id.clone(), position, at: now };
                if events.send( EngineEvent::Position( tick ) ).is_err() {
                    break;
                }

                if clock.duration > 0.0 && position >= clock.duration {
                    clock.base = clock.duration;
                    clock.started_at = None;
                    let _ = events.send( EngineEvent::Ended { track_id } );
                }
            }
        }));
    }
}


#[async_trait]
impl AudioEngine for ClockEngine {
    async fn load( &mut self, track: &TrackRef ) -> Result<(), EngineError> {
        let url = Url::parse( &track.locator )
            .map_err( |e| EngineError( format!( "Bad locator {:?}: {}", track.locator, e ) ) )?;
        if url.scheme() == "file" {
            let path = url.to_file_path()
                .map_err( |_| EngineError( format!( "Bad file locator {:?}", track.locator ) ) )?;
            if !path.exists() {
                return Err( EngineError( format!( "File not found: {}", path.display() ) ) );
            }
        }

        {
            let mut clock = self.clock.lock().await;
            *clock = Clock {
                track: Some( track.id.clone() ),
                duration: track.duration.max( 0.0 ),
                base: 0.0,
                started_at: None,
            };
        }

        tracing::debug!( "Clock engine loaded {}", track.id );
        let _ = self.events.send( EngineEvent::Ready {
            track_id: track.id.clone(),
            duration: track.duration.max( 0.0 ),
        });
        self.spawn_ticker();
        Ok(())
    }


    async fn play( &mut self ) -> Result<(), EngineError> {
        let mut clock = self.clock.lock().await;
        if clock.track.is_none() {
            return Err( EngineError( "No source loaded".into() ) );
        }
        if clock.started_at.is_none() {
            if clock.duration > 0.0 && clock.base >= clock.duration {
                clock.base = 0.0;
            }
            clock.started_at = Some( Instant::now() );
        }
        Ok(())
    }


    async fn pause( &mut self ) -> Result<(), EngineError> {
        let mut clock = self.clock.lock().await;
        clock.base = clock.position( Instant::now() );
        clock.started_at = None;
        Ok(())
    }


    async fn seek_to( &mut self, seconds: f64 ) -> Result<(), EngineError> {
        let mut clock = self.clock.lock().await;
        if clock.track.is_none() {
            return Err( EngineError( "No source loaded".into() ) );
        }
        let mut target = seconds.max( 0.0 );
        if clock.duration > 0.0 {
            target = target.min( clock.duration );
        }
        clock.base = target;
        if clock.started_at.is_some() {
            clock.started_at = Some( Instant::now() );
        }
        Ok(())
    }
}


impl Drop for ClockEngine {
    fn drop( &mut self ) {
        if let Some( ticker ) = self.ticker.take() {
            ticker.abort();
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn track( duration: f64 ) -> TrackRef {
        // `data:` locators skip the file existence check
        TrackRef::new( "a", "a.mp3", "data:audio/mpeg,x" ).with_duration( duration )
    }


    #[tokio::test( start_paused = true )]
    async fn test_load_reports_ready() {
        let ( tx, mut rx ) = event_channel();
        let mut engine = ClockEngine::new( tx );
        engine.load( &track( 3.0 ) ).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some( EngineEvent::Ready { track_id: TrackId::from( "a" ), duration: 3.0 } )
        );
    }


    #[tokio::test( start_paused = true )]
    async fn test_ticks_advance_and_end() {
        let ( tx, mut rx ) = event_channel();
        let mut engine = ClockEngine::with_tick_interval( tx, Duration::from_millis( 500 ) );
        engine.load( &track( 1.2 ) ).await.unwrap();
        engine.play().await.unwrap();

        let mut last = 0.0;
        loop {
            match rx.recv().await.unwrap() {
                EngineEvent::Position( tick ) => {
                    assert!( tick.position >= last );
                    last = tick.position;
                }
                EngineEvent::Ended { track_id } => {
                    assert_eq!( track_id, TrackId::from( "a" ) );
                    break;
                }
                EngineEvent::Ready { .. } => {}
                other => panic!( "unexpected {:?}", other ),
            }
        }
        assert!( ( last - 1.2 ).abs() < 1e-9 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_seek_moves_clock() {
        let ( tx, _rx ) = event_channel();
        let mut engine = ClockEngine::new( tx );
        engine.load( &track( 100.0 ) ).await.unwrap();
        engine.seek_to( 40.0 ).await.unwrap();
        engine.seek_to( 400.0 ).await.unwrap();
        assert_eq!( engine.clock.lock().await.base, 100.0 );
    }


    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let ( tx, _rx ) = event_channel();
        let mut engine = ClockEngine::new( tx );
        let missing = TrackRef::new( "x", "x.mp3", "file:///definitely/not/here.mp3" );
        assert!( engine.load( &missing ).await.is_err() );
        assert!( engine.play().await.is_err() );
    }
}
