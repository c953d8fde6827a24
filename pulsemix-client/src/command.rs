//! Interactive session commands

use crate::error::Result;
use crate::tempo::TempoOption;
use pulsemix_common::{Direction, Error as CommonError, VersionId};
use std::path::PathBuf;

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set the heartbeat cue file
    Cue(PathBuf),
    /// Select the background track (also the preview target)
    Select(String),
    Tracks,
    Generate,
    Play(VersionId),
    Toggle,
    /// Drag-and-release seek to a fraction of the duration
    Seek(f64),
    Skip(Direction),
    Rate(f32),
    Volume(f32),
    Tempo(TempoOption),
    Adjust,
    Download,
    /// Toggle preview, optionally selecting a track first
    Preview(Option<String>),
    Close,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  cue <path>         heartbeat cue to upload
  select <track>     background track for mixing and preview
  tracks             list background tracks on the server
  generate           mix the cue with the selected track
  play <v1..v4>      play a ready version
  toggle             pause or resume
  seek <0..1>        jump to a fraction of the version
  next | prev        skip to the next or previous ready version
  rate <x>           playback rate
  volume <0..1>      playback volume
  tempo <option>     tempo for adjust (0.8, 0.9, 1.1, 1.25, all)
  adjust             save the active version at the chosen tempo
  download           save the active version
  preview [track]    start or stop a track preview
  close              close the player
  status             show session state
  quit";

/// Parse one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "cue" => Command::Cue(PathBuf::from(required(word, rest)?)),
        "select" => Command::Select(required(word, rest)?.to_string()),
        "tracks" => Command::Tracks,
        "generate" | "mix" => Command::Generate,
        "play" => Command::Play(required(word, rest)?.parse()?),
        "toggle" | "pause" | "resume" => Command::Toggle,
        "seek" => Command::Seek(number(word, rest)?),
        "next" => Command::Skip(Direction::Next),
        "prev" | "previous" => Command::Skip(Direction::Previous),
        "rate" => Command::Rate(number(word, rest)? as f32),
        "volume" | "vol" => Command::Volume(number(word, rest)? as f32),
        "tempo" => Command::Tempo(required(word, rest)?.parse()?),
        "adjust" => Command::Adjust,
        "download" | "save" => Command::Download,
        "preview" => Command::Preview(if rest.is_empty() { None } else { Some(rest.to_string()) }),
        "close" | "stop" => Command::Close,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => {
            return Err(CommonError::InvalidInput(format!(
                "Unknown command {:?}; type help for a list",
                other
            ))
            .into())
        }
    };
    Ok(Some(command))
}

fn required<'a>(word: &str, rest: &'a str) -> Result<&'a str> {
    if rest.is_empty() {
        return Err(CommonError::InvalidInput(format!("{} needs an argument", word)).into());
    }
    Ok(rest)
}

fn number(word: &str, rest: &str) -> Result<f64> {
    let value: f64 = required(word, rest)?
        .parse()
        .map_err(|_| CommonError::InvalidInput(format!("{} needs a number, got {:?}", word, rest)))?;
    if !value.is_finite() {
        return Err(CommonError::InvalidInput(format!("{} needs a finite number", word)).into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_with_arguments() {
        assert_eq!(parse_command("play v3").unwrap(), Some(Command::Play(VersionId::V3)));
        assert_eq!(parse_command("  seek 0.5 ").unwrap(), Some(Command::Seek(0.5)));
        assert_eq!(
            parse_command("select Night Drive").unwrap(),
            Some(Command::Select("Night Drive".to_string()))
        );
        assert_eq!(parse_command("tempo 1.25").unwrap(), Some(Command::Tempo(TempoOption::Faster25)));
        assert_eq!(parse_command("PREV").unwrap(), Some(Command::Skip(Direction::Previous)));
        assert_eq!(parse_command("preview").unwrap(), Some(Command::Preview(None)));
    }

    #[test]
    fn test_blank_line_is_nothing() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_bad_input_is_rejected() {
        assert!(parse_command("play").is_err());
        assert!(parse_command("play v9").is_err());
        assert!(parse_command("seek half").is_err());
        assert!(parse_command("rate NaN").is_err());
        assert!(parse_command("dance").is_err());
    }
}
