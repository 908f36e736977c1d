//! Audio file probing via Symphonia
//!
//! Reads just enough of a file to learn its duration. No decoding happens
//! here.

use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;


/// Errors that can occur while probing.
#[derive( Debug, Error )]
pub enum ProbeError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,
}


/// Returns the duration of an audio file in seconds, if the container
/// declares one.
pub fn probe_duration( path: &Path ) -> Result<Option<f64>, ProbeError> {
    let file = File::open( path )?;
    let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions::default() );

    let mut hint = Hint::new();
    if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
        hint.with_extension( ext );
    }

    let probed = symphonia::default::get_probe()
        .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
        .map_err( |_| ProbeError::UnsupportedFormat )?;

    let track = probed.format
        .tracks()
        .iter()
        .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
        .ok_or( ProbeError::NoAudioTrack )?;

    let params = &track.codec_params;
    let duration = match ( params.n_frames, params.time_base, params.sample_rate ) {
        ( Some( frames ), Some( time_base ), _ ) => {
            let time = time_base.calc_time( frames );
            Some( time.seconds as f64 + time.frac )
        }
        ( Some( frames ), None, Some( rate ) ) if rate > 0 => Some( frames as f64 / rate as f64 ),
        _ => None,
    };

    tracing::trace!( "Probed {:?}: duration {:?}s", path, duration );
    Ok( duration )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::io::Write;


    /// Writes a minimal 16-bit mono PCM WAV file.
    fn write_wav( path: &Path, sample_rate: u32, frames: u32 ) {
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

        let mut file = File::create( path ).unwrap();
        file.write_all( &bytes ).unwrap();
    }


    #[test]
    fn test_probe_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 16000 );

        let duration = probe_duration( &path ).unwrap().unwrap();
        assert!( ( duration - 2.0 ).abs() < 1e-6, "duration was {}", duration );
    }


    #[test]
    fn test_probe_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "noise.mp3" );
        std::fs::write( &path, b"definitely not audio" ).unwrap();
        assert!( probe_duration( &path ).is_err() );
    }


    #[test]
    fn test_probe_missing_file() {
        let result = probe_duration( Path::new( "/nonexistent/file.flac" ) );
        assert!( matches!( result, Err( ProbeError::FileOpen( _ ) ) ) );
    }
}
