mod common;

use std::time::Duration;

use common::{ machine, ready, tick, track, Call };
use tunedeck_core::{
    EngineEvent, PlayerError, PositionTick, Queue, RepeatMode, SeekGesture, TrackId,
    TransportState,
};


fn ids( names: &[&str] ) -> Vec<TrackId> {
    names.iter().map( |n| TrackId::from( *n ) ).collect()
}


#[tokio::test]
async fn seek_gesture_wins_over_ticks() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    m.play().await.unwrap();
    m.handle_event( tick( "a", 50.0 ) ).await.unwrap();
    assert_eq!( m.position(), 50.0 );

    assert!( m.begin_seek() );
    assert!( m.update_seek_preview( 150.0 ) );
    m.handle_event( tick( "a", 51.0 ) ).await.unwrap();
    assert_eq!( m.position(), 150.0 );

    assert_eq!( m.commit_seek( 150.0 ).await, Ok( true ) );
    assert_eq!( m.state(), TransportState::Playing );
    assert_eq!( m.position(), 150.0 );
    assert_eq!( m.engine().calls, vec![
        Call::Load( TrackId::from( "a" ) ),
        Call::Play,
        Call::SeekTo( 150.0 ),
    ]);
}


#[tokio::test( start_paused = true )]
async fn tick_sampled_before_commit_is_stale() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    m.play().await.unwrap();
    m.handle_event( tick( "a", 100.0 ) ).await.unwrap();

    // Sampled while the drag back to 20s was still in flight
    m.begin_seek();
    let in_flight = PositionTick::new( TrackId::from( "a" ), 100.1 );
    tokio::time::advance( Duration::from_millis( 5 ) ).await;
    m.commit_seek( 20.0 ).await.unwrap();

    m.handle_event( EngineEvent::Position( in_flight ) ).await.unwrap();
    assert_eq!( m.position(), 20.0 );

    tokio::time::advance( Duration::from_millis( 100 ) ).await;
    m.handle_event( tick( "a", 20.1 ) ).await.unwrap();
    assert_eq!( m.position(), 20.1 );
}


#[tokio::test]
async fn gesture_drives_machine() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    m.play().await.unwrap();

    let mut bar = SeekGesture::new( 320.0 );
    assert!( bar.grant( &mut m, 80.0 ) );
    m.handle_event( tick( "a", 3.0 ) ).await.unwrap();
    assert_eq!( m.position(), 50.0 );

    bar.moved( &mut m, 1000.0 );
    assert_eq!( m.position(), 200.0 );
    assert_eq!( bar.release( &mut m, 160.0 ).await, Ok( Some( 100.0 ) ) );
    assert_eq!( m.state(), TransportState::Playing );
}


#[tokio::test]
async fn empty_queue_skip_is_noop() {
    let mut queue = Queue::new();
    assert_eq!( queue.next(), None );

    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.set_queue( queue );

    assert_eq!( m.skip_to_next().await, Ok( false ) );
    assert_eq!( m.skip_to_previous().await, Ok( false ) );
    assert_eq!( m.current_track().map( |t| t.id.as_str() ), Some( "a" ) );
    assert_eq!( m.engine().calls, vec![ Call::Load( TrackId::from( "a" ) ) ] );
}


#[tokio::test]
async fn zero_duration_has_zero_progress() {
    let mut m = machine();
    m.load( &track( "live", 0.0 ) ).await.unwrap();
    m.handle_event( ready( "live", 0.0 ) ).await.unwrap();
    m.play().await.unwrap();
    m.handle_event( tick( "live", 30.0 ) ).await.unwrap();

    assert_eq!( m.position(), 30.0 );
    assert_eq!( m.duration(), 0.0 );
    assert_eq!( m.progress(), 0.0 );
}


#[tokio::test]
async fn skip_ignores_events_for_previous_track() {
    let mut m = machine();
    m.start_queue( Queue::from_ids( ids( &[ "a", "b" ] ), 0 ), true ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Playing );

    assert_eq!( m.skip_to_next().await, Ok( true ) );
    assert_eq!( m.state(), TransportState::Loading );

    m.handle_event( tick( "a", 120.0 ) ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Loading );
    assert_eq!( m.position(), 0.0 );

    m.handle_event( ready( "b", 180.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Playing );
    m.handle_event( tick( "b", 1.0 ) ).await.unwrap();
    assert_eq!( m.position(), 1.0 );
}


#[tokio::test]
async fn second_load_abandons_first() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.load( &track( "b", 180.0 ) ).await.unwrap();

    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Loading );
    assert_eq!( m.duration(), 0.0 );

    m.handle_event( ready( "b", 180.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Paused );
    assert_eq!( m.duration(), 180.0 );
}


#[tokio::test]
async fn skip_keeps_paused_intent() {
    let mut m = machine();
    m.start_queue( Queue::from_ids( ids( &[ "a", "b", "c" ] ), 0 ), false ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

    assert_eq!( m.skip_to_next().await, Ok( true ) );
    m.handle_event( ready( "b", 180.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Paused );
    assert!( !m.engine().calls.contains( &Call::Play ) );
}


#[tokio::test]
async fn previous_at_start_without_repeat() {
    let mut m = machine();
    m.start_queue( Queue::from_ids( ids( &[ "a", "b" ] ), 0 ), false ).await.unwrap();

    assert_eq!( m.skip_to_previous().await, Ok( false ) );
    assert_eq!( m.queue().map( Queue::cursor ), Some( 0 ) );

    m.queue_mut().unwrap().set_repeat( RepeatMode::All );
    assert_eq!( m.skip_to_previous().await, Ok( true ) );
    assert_eq!( m.current_track().map( |t| t.id.as_str() ), Some( "b" ) );
}


#[tokio::test]
async fn rejected_load_enters_error() {
    let mut m = machine();
    m.engine_mut().reject_load = true;

    let err = m.load( &track( "a", 200.0 ) ).await.unwrap_err();
    assert!( matches!( err, PlayerError::EngineFault( _ ) ) );
    assert_eq!( m.state(), TransportState::Error );

    m.engine_mut().reject_load = false;
    m.load( &track( "b", 180.0 ) ).await.unwrap();
    assert_eq!( m.state(), TransportState::Loading );
}


#[tokio::test]
async fn rejected_deferred_play_surfaces_on_ready() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.play().await.unwrap();
    m.engine_mut().reject_play = true;

    let result = m.handle_event( ready( "a", 200.0 ) ).await;
    assert_eq!( result, Err( PlayerError::EngineFault( "audio focus denied".into() ) ) );
    assert_eq!( m.state(), TransportState::Paused );
}


#[tokio::test]
async fn rejected_seek_restores_transport() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();
    m.play().await.unwrap();
    m.handle_event( tick( "a", 50.0 ) ).await.unwrap();
    m.engine_mut().reject_seek = true;

    assert!( m.begin_seek() );
    assert!( m.update_seek_preview( 120.0 ) );
    assert!( m.commit_seek( 150.0 ).await.is_err() );
    assert_eq!( m.state(), TransportState::Playing );
    assert_eq!( m.position(), 50.0 );

    // Playback keeps reporting from where the engine really is
    m.handle_event( tick( "a", 51.0 ) ).await.unwrap();
    m.handle_event( tick( "a", 60.0 ) ).await.unwrap();
    assert_eq!( m.position(), 60.0 );
}


#[tokio::test]
async fn engine_error_event_is_reported() {
    let mut m = machine();
    m.load( &track( "a", 200.0 ) ).await.unwrap();
    m.handle_event( ready( "a", 200.0 ) ).await.unwrap();

    let stale = m.handle_event( EngineEvent::Error {
        track_id: TrackId::from( "z" ),
        reason: "old stream".into(),
    }).await;
    assert_eq!( stale, Ok(()) );

    let result = m.handle_event( EngineEvent::Error {
        track_id: TrackId::from( "a" ),
        reason: "device unplugged".into(),
    }).await;
    assert_eq!( result, Err( PlayerError::EngineFault( "device unplugged".into() ) ) );
    assert_eq!( m.state(), TransportState::Error );
}


#[tokio::test]
async fn shuffled_queue_plays_each_track_once() {
    let mut m = machine();
    let mut queue = Queue::from_ids( ids( &[ "a", "b", "c" ] ), 0 );
    queue.set_shuffle( true );
    m.start_queue( queue, true ).await.unwrap();

    let mut played = vec![ "a".to_string() ];
    while m.skip_to_next().await.unwrap() {
        played.push( m.current_track().unwrap().id.to_string() );
    }
    played.sort();
    assert_eq!( played, vec![ "a", "b", "c" ] );
}
