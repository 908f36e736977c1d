//! Tunedeck CLI - Music library and headless player

mod cli;
mod commands;
mod session;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ Context, Result };
use clap::Parser;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

use tunedeck_core::engine::event_channel;
use tunedeck_core::{ ClockEngine, DirectoryIndex, FileStorage, LibraryStore, PlaybackMachine };

use cli::{ Args, Commands, ConfigAction };
use commands::Library;
use session::Session;
use settings::Settings;


#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else( |_| "tunedeck=info,tunedeck_core=info,warn".into() ),
        )
        .with( tracing_subscriber::fmt::layer().with_writer( std::io::stderr ) )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load();

    let command = match args.command {
        Commands::Config { action } => return config( &mut settings, action ),
        other => other,
    };

    let roots = if args.roots.is_empty() { settings.library_roots.clone() } else { args.roots.clone() };
    if roots.is_empty() {
        tracing::warn!( "No library roots configured; use --root or `tunedeck config add-root`" );
    }

    let data_dir = args.data_dir.clone()
        .or_else( || settings.data_dir.clone() )
        .or_else( FileStorage::default_dir )
        .context( "Could not determine a data directory; pass --data-dir" )?;
    tracing::debug!( "Library data in {:?}", data_dir );

    let library = Library {
        index: Arc::new( DirectoryIndex::with_roots( roots ) ),
        store: LibraryStore::new( Arc::new( FileStorage::new( data_dir ) ) ),
        page_size: settings.page_size,
    };

    match command {
        Commands::Tracks { album, search } => {
            commands::tracks( &library, album.as_deref(), search.as_deref() ).await?;
        }
        Commands::Albums => commands::albums( &library ).await?,
        Commands::Favorites { action } => commands::favorites( &library, action ).await?,
        Commands::Playlist { action } => commands::playlist( &library, action ).await?,
        Commands::Play { track, playlist, album, shuffle, repeat } => {
            let ( tx, rx ) = event_channel();
            let engine = ClockEngine::with_tick_interval(
                tx,
                Duration::from_millis( settings.tick_interval_ms.max( 10 ) ),
            );
            let machine = PlaybackMachine::new( engine, library.index.clone() );
            let mut session = Session::new( machine, library.clone(), settings.seek_step_secs );

            match ( track.as_deref(), playlist.is_some() || album.is_some() ) {
                ( Some( id ), false ) => {
                    let track = library.track( id ).await?;
                    session.start_single( &track ).await?;
                }
                ( first, _ ) => {
                    let tracks = commands::session_tracks(
                        &library,
                        playlist.as_deref(),
                        album.as_deref(),
                    ).await?;
                    if !session.start_queue( &tracks, first, shuffle, repeat ).await? {
                        anyhow::bail!( "Could not start playback" );
                    }
                }
            }

            session.run( rx ).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}


fn config( settings: &mut Settings, action: ConfigAction ) -> Result<()> {
    match action {
        ConfigAction::Show => {
            if let Some( path ) = Settings::settings_path() {
                println!( "# {}", path.display() );
            }
            println!( "{}", serde_json::to_string_pretty( settings )? );
        }
        ConfigAction::AddRoot { path } => {
            let path = path.canonicalize()
                .with_context( || format!( "Cannot use {:?} as a library root", path ) )?;
            if settings.add_root( path.clone() ) {
                settings.save();
                println!( "Added {}", path.display() );
            } else {
                println!( "{} is already a library root", path.display() );
            }
        }
        ConfigAction::RemoveRoot { path } => {
            let resolved = path.canonicalize().unwrap_or_else( |_| path.clone() );
            if settings.remove_root( &resolved ) || settings.remove_root( &path ) {
                settings.save();
                println!( "Removed {}", path.display() );
            } else {
                println!( "{} was not a library root", path.display() );
            }
        }
    }
    Ok(())
}
