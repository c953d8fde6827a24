//! Duration probing with symphonia
//!
//! Reads container headers only; no samples are decoded.

use crate::error::{Error, Result};
use crate::store::AudioBlob;
use std::io::Cursor;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Duration of an in-memory payload in seconds
pub fn probe_duration(blob: &AudioBlob) -> Result<f64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(blob.bytes.clone())), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(&blob.media_type);
    if let Some(ext) = extension_for(&blob.media_type) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Engine(format!("unsupported audio payload: {}", e)))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| Error::Engine("no audio track found".to_string()))?;
    let params = &track.codec_params;

    let n_frames = params
        .n_frames
        .ok_or_else(|| Error::Engine("payload does not declare its length".to_string()))?;

    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(n_frames);
        return Ok(time.seconds as f64 + time.frac);
    }
    match params.sample_rate {
        Some(rate) if rate > 0 => Ok(n_frames as f64 / rate as f64),
        _ => Err(Error::Engine("payload has no sample rate".to_string())),
    }
}

fn extension_for(media_type: &str) -> Option<&'static str> {
    match media_type.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/ogg" | "audio/vorbis" => Some("ogg"),
        "audio/mp4" | "audio/aac" | "audio/x-m4a" => Some("m4a"),
        _ => None,
    }
}
