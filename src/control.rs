//! Command surface exposed to the UI collaborator
//!
//! Transport-independent codec and dispatcher for the engine's control
//! protocol. The IPC transport itself lives outside the core; whatever
//! carries the bytes hands complete lines to [`parse`] and writes the
//! dispatcher's reply back. Commands accept both `CMD DATA` and `CMD:DATA`
//! framings.

use thiserror::Error;

use crate::config::Config;
use crate::pipeline::PipelineHandle;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument for {command}: {detail}")]
    InvalidArgument {
        command: &'static str,
        detail: String,
    },
}

/// A parsed control command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `BYPASS <0|1>`
    Bypass(bool),
    /// `PRESET <podcast|meeting|streaming>`
    Preset(String),
    /// `CONFIG <json>`
    Config(Box<Config>),
    /// `PING`
    Ping,
    /// `GET_STATUS`
    GetStatus,
}

/// Parse one protocol line into a [`Command`].
pub fn parse(line: &str) -> Result<Command, ControlError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ControlError::Empty);
    }

    let (command, data) = match line.split_once(|c: char| c == ':' || c.is_whitespace()) {
        Some((command, data)) => (command, data.trim()),
        None => (line, ""),
    };

    match command {
        "PING" => Ok(Command::Ping),
        "GET_STATUS" => Ok(Command::GetStatus),
        "BYPASS" => match data {
            "0" => Ok(Command::Bypass(false)),
            "1" => Ok(Command::Bypass(true)),
            "" => Err(ControlError::MissingArgument("BYPASS")),
            other => Err(ControlError::InvalidArgument {
                command: "BYPASS",
                detail: format!("expected 0 or 1, got {other}"),
            }),
        },
        "PRESET" => {
            if data.is_empty() {
                Err(ControlError::MissingArgument("PRESET"))
            } else {
                Ok(Command::Preset(data.to_string()))
            }
        }
        "CONFIG" => {
            if data.is_empty() {
                return Err(ControlError::MissingArgument("CONFIG"));
            }
            let config =
                serde_json::from_str::<Config>(data).map_err(|e| ControlError::InvalidArgument {
                    command: "CONFIG",
                    detail: e.to_string(),
                })?;
            Ok(Command::Config(Box::new(config)))
        }
        other => Err(ControlError::UnknownCommand(other.to_string())),
    }
}

/// Execute a command against the pipeline and produce the protocol reply.
pub fn dispatch(pipeline: &PipelineHandle, command: Command) -> String {
    match command {
        Command::Ping => "PONG".to_string(),
        Command::GetStatus => "STATUS:OK".to_string(),
        Command::Bypass(value) => {
            pipeline.set_bypass(value);
            "OK".to_string()
        }
        Command::Preset(name) => match pipeline.apply_preset(&name) {
            Ok(()) => "OK".to_string(),
            Err(e) => format!("ERR:{e}"),
        },
        Command::Config(config) => {
            pipeline.apply_config(*config);
            "OK".to_string()
        }
    }
}

/// Format the meter push line: `METERS:<peak>,<rms>,<gain_reduction>`.
pub fn format_meters(peak_db: f32, rms_db: f32, gain_reduction_db: f32) -> String {
    format!("METERS:{peak_db:.2},{rms_db:.2},{gain_reduction_db:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping_and_status() {
        assert_eq!(parse("PING").unwrap(), Command::Ping);
        assert_eq!(parse("GET_STATUS").unwrap(), Command::GetStatus);
    }

    #[test]
    fn test_parse_bypass_both_framings() {
        assert_eq!(parse("BYPASS 1").unwrap(), Command::Bypass(true));
        assert_eq!(parse("BYPASS:0").unwrap(), Command::Bypass(false));
        assert!(parse("BYPASS").is_err());
        assert!(parse("BYPASS 2").is_err());
    }

    #[test]
    fn test_parse_preset() {
        assert_eq!(
            parse("PRESET podcast").unwrap(),
            Command::Preset("podcast".to_string())
        );
        assert_eq!(
            parse("PRESET:streaming").unwrap(),
            Command::Preset("streaming".to_string())
        );
    }

    #[test]
    fn test_parse_config_json() {
        let command = parse(r#"CONFIG {"compressor": {"threshold": -22.0}}"#).unwrap();
        match command {
            Command::Config(config) => assert_eq!(config.compressor.threshold, -22.0),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse(""), Err(ControlError::Empty)));
        assert!(matches!(
            parse("VOLUME 11"),
            Err(ControlError::UnknownCommand(_))
        ));
        assert!(parse("CONFIG not-json").is_err());
    }

    #[test]
    fn test_dispatch_against_pipeline() {
        let pipeline = crate::pipeline::Pipeline::new();
        let handle = pipeline.handle();

        assert_eq!(dispatch(&handle, Command::Ping), "PONG");
        assert_eq!(dispatch(&handle, Command::GetStatus), "STATUS:OK");

        assert_eq!(dispatch(&handle, Command::Bypass(true)), "OK");
        assert!(pipeline.is_bypassed());

        assert_eq!(
            dispatch(&handle, Command::Preset("meeting".to_string())),
            "OK"
        );
        assert_eq!(pipeline.current_config().compressor.threshold, -20.0);

        let reply = dispatch(&handle, Command::Preset("opera".to_string()));
        assert!(reply.starts_with("ERR:"));
    }

    #[test]
    fn test_meter_line_format() {
        assert_eq!(
            format_meters(-12.0, -18.5, 2.25),
            "METERS:-12.00,-18.50,2.25"
        );
    }
}
