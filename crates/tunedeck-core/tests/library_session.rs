use std::path::Path;
use std::sync::Arc;

use tunedeck_core::engine::event_channel;
use tunedeck_core::media::DEFAULT_PAGE_SIZE;
use tunedeck_core::{
    fetch_all, ClockEngine, DirectoryIndex, EngineEvent, FileStorage, LibraryStore,
    MediaIndex, PlaybackMachine, Queue, TrackId, TransportState,
};


/// Writes a silent 16-bit mono WAV file of `frames` samples at 8 kHz.
fn write_wav( path: &Path, frames: u32 ) {
    let sample_rate: u32 = 8000;
    let data_len = frames * 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice( b"RIFF" );
    bytes.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
    bytes.extend_from_slice( b"WAVEfmt " );
    bytes.extend_from_slice( &16u32.to_le_bytes() );
    bytes.extend_from_slice( &1u16.to_le_bytes() );
    bytes.extend_from_slice( &1u16.to_le_bytes() );
    bytes.extend_from_slice( &sample_rate.to_le_bytes() );
    bytes.extend_from_slice( &( sample_rate * 2 ).to_le_bytes() );
    bytes.extend_from_slice( &2u16.to_le_bytes() );
    bytes.extend_from_slice( &16u16.to_le_bytes() );
    bytes.extend_from_slice( b"data" );
    bytes.extend_from_slice( &data_len.to_le_bytes() );
    bytes.resize( bytes.len() + data_len as usize, 0 );
    std::fs::write( path, bytes ).unwrap();
}


#[tokio::test]
async fn playlist_survives_restart() {
    let music = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    for name in [ "one.wav", "two.wav", "three.wav" ] {
        write_wav( &music.path().join( name ), 800 );
    }

    let index = DirectoryIndex::with_roots( [ music.path().to_path_buf() ] );
    let tracks = fetch_all( &index, None, DEFAULT_PAGE_SIZE ).await;
    assert_eq!( tracks.len(), 3 );
    assert!( tracks.iter().all( |t| ( t.duration - 0.1 ).abs() < 1e-6 ) );

    let playlist_id = {
        let store = LibraryStore::new( Arc::new( FileStorage::new( data.path() ) ) );
        let playlist = store.create_playlist( "Road trip" ).await.unwrap();
        store.add_tracks_to_playlist( &playlist.id, &tracks ).await.unwrap();
        store.add_track_to_favorites( &tracks[ 1 ] ).await.unwrap();
        playlist.id
    };

    let store = LibraryStore::new( Arc::new( FileStorage::new( data.path() ) ) );
    let playlist = store.playlist( &playlist_id ).await.unwrap();
    assert_eq!( playlist.name, "Road trip" );
    assert_eq!( playlist.tracks, tracks );
    assert!( store.is_favorite( &tracks[ 1 ].id ).await );

    for track in &playlist.tracks {
        let found = index.lookup( &track.id ).await.unwrap();
        assert_eq!( found.as_ref(), Some( track ) );
    }
}


#[tokio::test( start_paused = true )]
async fn queue_plays_through_on_clock_engine() {
    let music = tempfile::tempdir().unwrap();
    write_wav( &music.path().join( "a.wav" ), 4000 );
    write_wav( &music.path().join( "b.wav" ), 2000 );

    let index = Arc::new( DirectoryIndex::with_roots( [ music.path().to_path_buf() ] ) );
    let tracks = fetch_all( index.as_ref(), None, DEFAULT_PAGE_SIZE ).await;
    let ids: Vec<TrackId> = tracks.iter().map( |t| t.id.clone() ).collect();

    let ( tx, mut rx ) = event_channel();
    let mut machine = PlaybackMachine::new( ClockEngine::new( tx ), index );
    assert!( machine.start_queue( Queue::from_ids( ids.clone(), 0 ), true ).await.unwrap() );

    let mut ended = Vec::new();
    while let Some( event ) = rx.recv().await {
        if let EngineEvent::Ended { track_id } = &event {
            ended.push( track_id.clone() );
        }
        machine.handle_event( event ).await.unwrap();
        if ended.len() == ids.len() {
            break;
        }
    }

    assert_eq!( ended, ids );
    assert_eq!( machine.state(), TransportState::Paused );
    assert_eq!( machine.current_track().map( |t| &t.id ), ids.last() );
    assert_eq!( machine.progress(), 100.0 );
}
