//! Interactive listening session.
//!
//! Owns the playback machine for the lifetime of `tunedeck play` and feeds it
//! from two sources: slash commands read from stdin and events from the
//! engine. Both arrive through one `select!` loop so the machine is only ever
//! touched from one place.

use std::fmt::Write as _;

use anyhow::Result;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::mpsc::UnboundedReceiver;

use tunedeck_core::command::help_text;
use tunedeck_core::{
    AudioEngine, Command, EngineEvent, PlaybackMachine, Queue, RepeatMode, TrackId,
    TrackRef, TransportState,
};

use crate::commands::Library;


/// What the session has to say after a command.
#[derive( Debug, Clone, PartialEq )]
pub enum Reply {
    Say( String ),
    Quiet,
    Quit,
}


pub struct Session<E: AudioEngine> {
    machine: PlaybackMachine<E>,
    library: Library,
    seek_step: f64,
    announced: Option<TrackId>,
}


impl<E: AudioEngine> Session<E> {
    pub fn new( machine: PlaybackMachine<E>, library: Library, seek_step: f64 ) -> Self {
        Self { machine, library, seek_step, announced: None }
    }


    pub fn machine( &self ) -> &PlaybackMachine<E> {
        &self.machine
    }


    /// Plays one track on its own. Next and previous then skip within it.
    pub async fn start_single( &mut self, track: &TrackRef ) -> Result<()> {
        self.machine.load( track ).await?;
        self.machine.play().await?;
        Ok(())
    }


    /// Queues tracks and starts playing at `first`, or the top.
    pub async fn start_queue(
        &mut self,
        tracks: &[TrackRef],
        first: Option<&str>,
        shuffle: bool,
        repeat: Option<RepeatMode>,
    ) -> Result<bool> {
        let start = first
            .and_then( |id| tracks.iter().position( |t| t.id.as_str() == id ) )
            .unwrap_or( 0 );
        let mut queue = Queue::from_ids( tracks.iter().map( |t| t.id.clone() ), start );
        queue.set_mode( Some( shuffle ), repeat );

        Ok( self.machine.start_queue( queue, true ).await? )
    }


    /// Runs until `/quit` or end of input.
    pub async fn run( mut self, mut events: UnboundedReceiver<EngineEvent> ) -> Result<()> {
        let mut lines = BufReader::new( tokio::io::stdin() ).lines();
        println!( "Type /help for commands." );
        self.print_announcement();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some( line ) = line? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match self.execute( &line ).await {
                        Reply::Say( text ) => println!( "{}", text ),
                        Reply::Quiet => {}
                        Reply::Quit => break,
                    }
                }
                Some( event ) = events.recv() => {
                    if let Some( text ) = self.on_event( event ).await {
                        println!( "{}", text );
                    }
                }
            }
            self.print_announcement();
        }

        tracing::info!( "Session ended" );
        Ok(())
    }


    fn print_announcement( &mut self ) {
        if let Some( text ) = self.announce() {
            println!( "{}", text );
        }
    }


    /// Reports a change of track once.
    pub fn announce( &mut self ) -> Option<String> {
        let current = self.machine.current_track()?;
        if self.announced.as_ref() == Some( &current.id ) {
            return None;
        }
        self.announced = Some( current.id.clone() );
        Some( format!( "Now playing: {}", current.name ) )
    }


    /// Applies an engine event, returning anything worth telling the user.
    pub async fn on_event( &mut self, event: EngineEvent ) -> Option<String> {
        let ended = matches!( event, EngineEvent::Ended { .. } );
        match self.machine.handle_event( event ).await {
            Err( e ) => Some( format!( "! {}", e ) ),
            Ok(()) if ended && self.machine.state() == TransportState::Paused => {
                Some( "End of queue".to_string() )
            }
            Ok(()) => None,
        }
    }


    /// Parses and runs one command line.
    pub async fn execute( &mut self, line: &str ) -> Reply {
        let command = match Command::parse( line ) {
            Ok( command ) => command,
            Err( e ) => return Reply::Say( format!( "{} (try /help)", e ) ),
        };

        match self.run_command( command ).await {
            Ok( reply ) => reply,
            Err( e ) => Reply::Say( format!( "! {}", e ) ),
        }
    }


    async fn run_command( &mut self, command: Command ) -> Result<Reply> {
        let machine = &mut self.machine;

        let reply = match command {
            Command::Queue => Reply::Say( self.queue_listing().await ),
            Command::Jump { index } => {
                if !machine.skip_to_index( index ).await? {
                    return Ok( Reply::Say( format!( "No entry {}", index + 1 ) ) );
                }
                Reply::Quiet
            }
            Command::Remove { index } => {
                let queue = machine.queue_mut().ok_or_else( || anyhow::anyhow!( "No queue" ) )?;
                let removed = queue.remove( index )?;
                Reply::Say( format!( "Removed {}", removed ) )
            }
            Command::Dedup => {
                let removed = machine.queue_mut().map( Queue::dedup ).unwrap_or( 0 );
                Reply::Say( format!( "Removed {} duplicates", removed ) )
            }
            Command::Shuffle => match machine.queue_mut() {
                Some( queue ) => {
                    let shuffle = !queue.shuffle();
                    queue.set_shuffle( shuffle );
                    Reply::Say( format!( "Shuffle {}", if shuffle { "on" } else { "off" } ) )
                }
                None => Reply::Say( "No queue".to_string() ),
            },
            Command::Repeat { mode } => match machine.queue_mut() {
                Some( queue ) => {
                    let mode = mode.unwrap_or_else( || queue.repeat().cycle() );
                    queue.set_repeat( mode );
                    Reply::Say( format!( "Repeat {:?}", mode ).to_lowercase() )
                }
                None => Reply::Say( "No queue".to_string() ),
            },
            Command::Save { name } => {
                let ids: Vec<TrackId> = machine.queue().map( |q| q.ids().to_vec() ).unwrap_or_default();
                let ids = if ids.is_empty() {
                    machine.current_track().map( |t| vec![ t.id.clone() ] ).unwrap_or_default()
                } else {
                    ids
                };

                let mut tracks = Vec::with_capacity( ids.len() );
                for id in &ids {
                    tracks.push( self.library.track( id.as_str() ).await? );
                }
                let playlist = self.library.store.create_playlist( &name ).await?;
                let playlist = self.library.store.add_tracks_to_playlist( &playlist.id, &tracks ).await?;
                Reply::Say( format!( "Saved {} tracks to {}", playlist.tracks.len(), playlist.name ) )
            }
            Command::Load { name } => {
                let playlist = self.library.playlist( &name ).await?;
                let ( shuffle, repeat ) = machine.queue()
                    .map( |q| ( q.shuffle(), q.repeat() ) )
                    .unwrap_or_default();
                if !self.start_queue( &playlist.tracks, None, shuffle, Some( repeat ) ).await? {
                    return Ok( Reply::Say( format!( "Nothing to play in {}", playlist.name ) ) );
                }
                Reply::Quiet
            }

            Command::Play => {
                machine.play().await?;
                Reply::Quiet
            }
            Command::Pause => {
                machine.pause().await?;
                Reply::Quiet
            }
            Command::Toggle => {
                machine.toggle_play().await?;
                Reply::Quiet
            }
            Command::Stop => {
                machine.stop().await?;
                Reply::Quiet
            }
            Command::Next => {
                // Without a queue next and previous nudge the position
                if machine.queue().is_none() {
                    machine.seek_relative( self.seek_step ).await?;
                } else if !machine.skip_to_next().await? {
                    return Ok( Reply::Say( "No next track".to_string() ) );
                }
                Reply::Quiet
            }
            Command::Prev => {
                if machine.queue().is_none() {
                    machine.seek_relative( -self.seek_step ).await?;
                } else if !machine.skip_to_previous().await? {
                    return Ok( Reply::Say( "No previous track".to_string() ) );
                }
                Reply::Quiet
            }
            Command::Seek { seconds } => {
                machine.seek_to( seconds ).await?;
                Reply::Say( machine.formatted_position() )
            }
            Command::Forward { seconds } => {
                machine.seek_relative( seconds.unwrap_or( self.seek_step ) ).await?;
                Reply::Say( machine.formatted_position() )
            }
            Command::Back { seconds } => {
                machine.seek_relative( -seconds.unwrap_or( self.seek_step ) ).await?;
                Reply::Say( machine.formatted_position() )
            }

            Command::Fav => {
                let track = machine.current_track().cloned()
                    .ok_or_else( || anyhow::anyhow!( "Nothing is playing" ) )?;
                if self.library.store.toggle_favorite( &track ).await? {
                    Reply::Say( format!( "Added {} to favorites", track.name ) )
                } else {
                    Reply::Say( format!( "Removed {} from favorites", track.name ) )
                }
            }

            Command::Status => Reply::Say( self.status().await ),
            Command::Help => Reply::Say( help_text().to_string() ),
            Command::Quit => Reply::Quit,
        };

        Ok( reply )
    }


    /// Describes what is playing.
    pub async fn status( &self ) -> String {
        let machine = &self.machine;
        let Some( track ) = machine.current_track() else {
            return "Nothing loaded".to_string();
        };

        let mut out = format!(
            "{:?}  {}  {}  ({:.0}%)",
            machine.state(), track.name, machine.formatted_position(), machine.progress()
        );
        if let Some( queue ) = machine.queue() {
            let _ = write!(
                out,
                "  [{}/{}] shuffle {} repeat {:?}",
                queue.cursor() + 1,
                queue.len(),
                if queue.shuffle() { "on" } else { "off" },
                queue.repeat(),
            );
        }
        if self.library.store.is_favorite( &track.id ).await {
            out.push_str( "  *" );
        }
        if let Some( reason ) = machine.last_error() {
            let _ = write!( out, "\n! {}", reason );
        }
        out
    }


    async fn queue_listing( &self ) -> String {
        let Some( queue ) = self.machine.queue().filter( |q| !q.is_empty() ) else {
            return "Queue is empty".to_string();
        };

        let mut out = String::new();
        for ( i, id ) in queue.ids().iter().enumerate() {
            let marker = if i == queue.cursor() { '>' } else { ' ' };
            let name = match self.library.track( id.as_str() ).await {
                Ok( track ) => track.name,
                Err( _ ) => id.to_string(),
            };
            let _ = writeln!( out, "{} {:>3}. {}", marker, i + 1, name );
        }
        out.pop();
        out
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tunedeck_core::engine::event_channel;
    use tunedeck_core::{ fetch_all, ClockEngine, DirectoryIndex, LibraryStore, MemoryStorage };


    struct Fixture {
        _dir: tempfile::TempDir,
        session: Session<ClockEngine>,
        events: UnboundedReceiver<EngineEvent>,
        tracks: Vec<TrackRef>,
    }


    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for name in [ "a.mp3", "b.mp3", "c.mp3" ] {
            std::fs::write( dir.path().join( name ), b"x" ).unwrap();
        }

        let index = Arc::new( DirectoryIndex::with_roots( [ dir.path().to_path_buf() ] ).without_probing() );
        let library = Library {
            index: Arc::clone( &index ),
            store: LibraryStore::new( Arc::new( MemoryStorage::new() ) ),
            page_size: 10,
        };
        let tracks = fetch_all( index.as_ref(), None, 10 ).await;

        let ( tx, events ) = event_channel();
        let machine = PlaybackMachine::new( ClockEngine::new( tx ), index );
        Fixture { _dir: dir, session: Session::new( machine, library, 10.0 ), events, tracks }
    }


    async fn drain( f: &mut Fixture ) {
        while let Ok( event ) = f.events.try_recv() {
            f.session.on_event( event ).await;
        }
    }


    #[tokio::test( start_paused = true )]
    async fn test_queue_session() {
        let mut f = fixture().await;
        let tracks = f.tracks.clone();
        assert!( f.session.start_queue( &tracks, Some( tracks[ 1 ].id.as_str() ), false, None ).await.unwrap() );
        assert_eq!( f.session.announce(), Some( "Now playing: b.mp3".to_string() ) );
        assert_eq!( f.session.announce(), None );

        drain( &mut f ).await;
        assert_eq!( f.session.machine().state(), TransportState::Playing );

        assert_eq!( f.session.execute( "/next" ).await, Reply::Quiet );
        assert_eq!( f.session.announce(), Some( "Now playing: c.mp3".to_string() ) );
        assert_eq!( f.session.execute( "/next" ).await, Reply::Say( "No next track".to_string() ) );

        assert_eq!( f.session.execute( "/jump 1" ).await, Reply::Quiet );
        assert_eq!( f.session.machine().current_track().unwrap().name, "a.mp3" );

        let listing = f.session.execute( "/queue" ).await;
        assert_eq!( listing, Reply::Say( ">   1. a.mp3\n    2. b.mp3\n    3. c.mp3".to_string() ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_fav_and_save() {
        let mut f = fixture().await;
        let tracks = f.tracks.clone();
        f.session.start_queue( &tracks, None, false, Some( RepeatMode::All ) ).await.unwrap();

        assert_eq!( f.session.execute( "/fav" ).await, Reply::Say( "Added a.mp3 to favorites".to_string() ) );
        assert!( f.session.library.store.is_favorite( &tracks[ 0 ].id ).await );
        assert!( f.session.status().await.ends_with( "*" ) );

        assert_eq!(
            f.session.execute( "/save Mix" ).await,
            Reply::Say( "Saved 3 tracks to Mix".to_string() )
        );
        let saved = f.session.library.playlist( "mix" ).await.unwrap();
        assert_eq!( saved.tracks, tracks );
    }


    #[tokio::test( start_paused = true )]
    async fn test_single_track_steps() {
        let mut f = fixture().await;
        let track = f.tracks[ 0 ].clone().with_duration( 100.0 );
        f.session.start_single( &track ).await.unwrap();
        drain( &mut f ).await;

        assert_eq!( f.session.execute( "next" ).await, Reply::Quiet );
        assert_eq!( f.session.machine().position(), 10.0 );
        assert_eq!( f.session.execute( "back 30" ).await, Reply::Say( "0:00 / 1:40".to_string() ) );
    }


    #[tokio::test]
    async fn test_bad_input() {
        let mut f = fixture().await;
        assert!( matches!( f.session.execute( "/bogus" ).await, Reply::Say( _ ) ) );
        assert_eq!( f.session.execute( "/status" ).await, Reply::Say( "Nothing loaded".to_string() ) );
        assert!( matches!( f.session.execute( "/play" ).await, Reply::Say( t ) if t.starts_with( "! " ) ) );
        assert_eq!( f.session.execute( "/quit" ).await, Reply::Quit );
    }
}
