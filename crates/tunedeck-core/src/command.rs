//! Slash command parsing.
//!
//! Commands typed into a listening session, parsed from user input. The
//! session loop executes them against the playback machine and the library
//! store.

use std::str::FromStr;

use thiserror::Error;

use crate::queue::RepeatMode;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Queue commands
    Queue,
    Jump { index: usize },
    Remove { index: usize },
    Dedup,
    Shuffle,
    Repeat { mode: Option<RepeatMode> },
    Save { name: String },
    Load { name: String },

    // Playback commands
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    Seek { seconds: f64 },
    Forward { seconds: Option<f64> },
    Back { seconds: Option<f64> },

    // Library commands
    Fav,

    // Session commands
    Status,
    Help,
    Quit,
}


impl FromStr for RepeatMode {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Ok( RepeatMode::Off ),
            "one" | "1" => Ok( RepeatMode::One ),
            "all" | "2" => Ok( RepeatMode::All ),
            _ => Err( CommandError::InvalidArgument(
                format!( "Invalid repeat mode: '{}'. Use 'off', 'one', or 'all'", s )
            )),
        }
    }
}


impl Command {
    /// Parses a command string, with or without the leading `/`.
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let input = input.strip_prefix( '/' ).unwrap_or( input );
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Queue commands
            "queue" | "ls" => Ok( Command::Queue ),
            "jump" | "j" => {
                let index = parse_position( args )?;
                Ok( Command::Jump { index } )
            }
            "remove" | "rm" | "del" => {
                let index = parse_position( args )?;
                Ok( Command::Remove { index } )
            }
            "dedup" | "dedupe" | "unique" => Ok( Command::Dedup ),
            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => {
                let mode = args.map( |s| s.parse() ).transpose()?;
                Ok( Command::Repeat { mode } )
            }
            "save" => {
                let name = args
                    .ok_or_else( || CommandError::MissingArgument( "playlist name".into() ) )?;
                Ok( Command::Save { name: name.to_string() } )
            }
            "load" => {
                let name = args
                    .ok_or_else( || CommandError::MissingArgument( "playlist name".into() ) )?;
                Ok( Command::Load { name: name.to_string() } )
            }

            // Playback commands
            "play" | "p" => Ok( Command::Play ),
            "pause" | "pa" => Ok( Command::Pause ),
            "toggle" | "t" => Ok( Command::Toggle ),
            "stop" | "st" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let seconds = parse_time( time_str )?;
                Ok( Command::Seek { seconds } )
            }
            "fwd" | "ff" | "forward" => {
                let seconds = args.map( parse_time ).transpose()?;
                Ok( Command::Forward { seconds } )
            }
            "back" | "rew" | "rewind" => {
                let seconds = args.map( parse_time ).transpose()?;
                Ok( Command::Back { seconds } )
            }

            // Library commands
            "fav" | "favorite" | "like" => Ok( Command::Fav ),

            // Session commands
            "status" | "s" => Ok( Command::Status ),
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Queue => "Show the queue",
            Command::Jump { .. } => "Play queue entry",
            Command::Remove { .. } => "Remove queue entry",
            Command::Dedup => "Remove duplicate tracks",
            Command::Shuffle => "Toggle shuffle",
            Command::Repeat { .. } => "Set repeat mode",
            Command::Save { .. } => "Save queue as playlist",
            Command::Load { .. } => "Queue a playlist",
            Command::Play => "Start playback",
            Command::Pause => "Pause playback",
            Command::Toggle => "Toggle play/pause",
            Command::Stop => "Stop and rewind",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Seek { .. } => "Seek to position",
            Command::Forward { .. } => "Skip forward",
            Command::Back { .. } => "Skip back",
            Command::Fav => "Toggle favorite",
            Command::Status => "Show playback status",
            Command::Help => "Show help",
            Command::Quit => "Quit session",
        }
    }
}


/// Parses a 1-based queue position into an index.
fn parse_position( arg: Option<&str> ) -> Result<usize, CommandError> {
    let arg = arg.ok_or_else( || CommandError::MissingArgument( "queue position".into() ) )?;
    match arg.parse::<usize>() {
        Ok( n ) if n > 0 => Ok( n - 1 ),
        _ => Err( CommandError::InvalidArgument( format!( "Invalid queue position: {}", arg ) ) ),
    }
}


/// Parses a time string like "1:30" or "90" into seconds.
///
/// @param s - Time string in format "MM:SS", "M:SS", or just seconds
///
/// @returns Seconds or error
pub fn parse_time( s: &str ) -> Result<f64, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        let total = minutes.checked_mul( 60 )
            .and_then( |m| m.checked_add( seconds ) )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Time out of range: {}", s ) ) )?;
        Ok( total as f64 )
    } else {
        let seconds: f64 = s.parse()
            .ok()
            .filter( |v: &f64| v.is_finite() && *v >= 0.0 )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( seconds )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Queue Commands:
  /queue          Show the queue
  /jump <n>       Play queue entry n
  /remove <n>     Remove queue entry n
  /dedup          Remove duplicate tracks
  /shuffle        Toggle shuffle mode
  /repeat [mode]  Set repeat (off/one/all)
  /save <name>    Save queue as playlist
  /load <name>    Queue a saved playlist

Playback Commands:
  /play           Start playback
  /pause          Pause playback
  /toggle         Toggle play/pause
  /stop           Stop and rewind
  /next           Next track
  /prev           Previous track
  /seek <time>    Seek to position (e.g., 1:30)
  /fwd [secs]     Skip forward
  /back [secs]    Skip back

Other Commands:
  /fav            Toggle favorite for this track
  /status         Show what's playing
  /help           Show this help
  /quit           End the session"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_with_slash() {
        assert_eq!( Command::parse( "/play" ).unwrap(), Command::Play );
        assert_eq!( Command::parse( "  t " ).unwrap(), Command::Toggle );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { seconds: 90.0 } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "seek 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { seconds: 45.0 } );
        assert!( Command::parse( "seek -4" ).is_err() );
    }


    #[test]
    fn test_parse_time_out_of_range() {
        assert!( matches!(
            parse_time( "307445734561825861:0" ),
            Err( CommandError::InvalidArgument( _ ) )
        ));
        assert!( matches!(
            Command::parse( "/seek 307445734561825860:59999999999" ),
            Err( CommandError::InvalidArgument( _ ) )
        ));
        assert_eq!( parse_time( "2:05" ).unwrap(), 125.0 );
    }


    #[test]
    fn test_parse_skip_amounts() {
        assert_eq!( Command::parse( "fwd" ).unwrap(), Command::Forward { seconds: None } );
        assert_eq!( Command::parse( "back 30" ).unwrap(), Command::Back { seconds: Some( 30.0 ) } );
    }


    #[test]
    fn test_parse_repeat_with_mode() {
        let cmd = Command::parse( "repeat all" ).unwrap();
        assert_eq!( cmd, Command::Repeat { mode: Some( RepeatMode::All ) } );
    }


    #[test]
    fn test_parse_repeat_toggle() {
        let cmd = Command::parse( "repeat" ).unwrap();
        assert_eq!( cmd, Command::Repeat { mode: None } );
        assert!( Command::parse( "repeat sometimes" ).is_err() );
    }


    #[test]
    fn test_parse_queue_positions() {
        assert_eq!( Command::parse( "jump 3" ).unwrap(), Command::Jump { index: 2 } );
        assert!( matches!( Command::parse( "rm 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "jump" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "save" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
