//! Launch command-line parser
//!
//! A small state machine over raw tokens:
//!
//! ```text
//! ExpectSwitch --(-e|-i|-n)--> ExpectValue --value--> ExpectSwitch
//! ExpectSwitch --(-f)--> CollectingAdditional --(switch)--> ...
//! any --(-a|--args|--)--> CollectingPassthrough (terminal, takes everything)
//! ```
//!
//! Ending in `ExpectValue` is an error, never an empty value.

use thiserror::Error;

use crate::core::LaunchRequest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("missing value for '{0}'")]
    MissingValue(String),

    #[error("unknown switch '{0}'")]
    UnknownSwitch(String),

    #[error("unexpected argument '{0}'")]
    UnexpectedToken(String),

    #[error("'{0}' given more than once")]
    Duplicate(String),

    #[error("no engine given (use --engine NAME)")]
    MissingEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueSwitch {
    Engine,
    Base,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Switch {
    Value(ValueSwitch),
    Files,
    Passthrough,
    NoCleanup,
}

impl Switch {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "-e" | "--engine" => Self::Value(ValueSwitch::Engine),
            "-i" | "--base" => Self::Value(ValueSwitch::Base),
            "-n" | "--name" => Self::Value(ValueSwitch::Name),
            "-f" | "--files" => Self::Files,
            "-a" | "--args" | "--" => Self::Passthrough,
            "--no-cleanup" => Self::NoCleanup,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    ExpectSwitch,
    /// Waiting for the value of a switch; carries the token as typed for errors
    ExpectValue(ValueSwitch, String),
    CollectingAdditional,
    CollectingPassthrough,
}

fn looks_like_switch(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-')
}

/// Parse the tokens following `launch` into a request
pub fn parse_launch_args<I, S>(tokens: I) -> Result<LaunchRequest, ArgsError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut request = LaunchRequest::default();
    let mut engine: Option<String> = None;
    let mut state = State::ExpectSwitch;

    for token in tokens {
        let token: String = token.into();

        state = match state {
            State::CollectingPassthrough => {
                request.passthrough.push(token);
                State::CollectingPassthrough
            }
            State::ExpectValue(switch, typed) => {
                if Switch::parse(&token).is_some() {
                    return Err(ArgsError::MissingValue(typed));
                }
                let slot = match switch {
                    ValueSwitch::Engine => &mut engine,
                    ValueSwitch::Base => &mut request.base,
                    ValueSwitch::Name => &mut request.preset_name,
                };
                if slot.is_some() {
                    return Err(ArgsError::Duplicate(typed));
                }
                *slot = Some(token);
                State::ExpectSwitch
            }
            current @ (State::ExpectSwitch | State::CollectingAdditional) => {
                match Switch::parse(&token) {
                    Some(Switch::Value(switch)) => State::ExpectValue(switch, token),
                    Some(Switch::Files) => State::CollectingAdditional,
                    Some(Switch::Passthrough) => State::CollectingPassthrough,
                    Some(Switch::NoCleanup) => {
                        request.skip_cleanup = true;
                        State::ExpectSwitch
                    }
                    None if looks_like_switch(&token) => {
                        return Err(ArgsError::UnknownSwitch(token));
                    }
                    None if current == State::CollectingAdditional => {
                        request.additional.push(token);
                        State::CollectingAdditional
                    }
                    None => return Err(ArgsError::UnexpectedToken(token)),
                }
            }
        };
    }

    if let State::ExpectValue(_, typed) = state {
        return Err(ArgsError::MissingValue(typed));
    }

    request.engine = engine.ok_or(ArgsError::MissingEngine)?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_command_line() {
        let request = parse_launch_args([
            "-e", "gzdoom", "-i", "doom2", "-f", "sigil", "brutal", "--no-cleanup", "-n", "run",
            "--", "+map", "MAP01", "-f", "--engine",
        ])
        .unwrap();

        assert_eq!(request.engine, "gzdoom");
        assert_eq!(request.base.as_deref(), Some("doom2"));
        assert_eq!(request.additional, vec!["sigil", "brutal"]);
        assert_eq!(request.preset_name.as_deref(), Some("run"));
        assert!(request.skip_cleanup);
        assert_eq!(request.passthrough, vec!["+map", "MAP01", "-f", "--engine"]);
    }

    #[test]
    fn files_switch_can_repeat() {
        let request =
            parse_launch_args(["-f", "a", "--engine", "e", "--files", "b", "c"]).unwrap();
        assert_eq!(request.additional, vec!["a", "b", "c"]);
    }

    #[test]
    fn dangling_switch_is_an_error() {
        assert_eq!(
            parse_launch_args(["-e", "gzdoom", "-i"]),
            Err(ArgsError::MissingValue("-i".into()))
        );
        assert_eq!(
            parse_launch_args(["--engine", "-f", "x"]),
            Err(ArgsError::MissingValue("--engine".into()))
        );
    }

    #[test]
    fn empty_file_list_is_fine() {
        let request = parse_launch_args(["-e", "gzdoom", "-f"]).unwrap();
        assert!(request.additional.is_empty());
    }

    #[test]
    fn rejects_stray_and_unknown_tokens() {
        assert_eq!(
            parse_launch_args(["gzdoom"]),
            Err(ArgsError::UnexpectedToken("gzdoom".into()))
        );
        assert_eq!(
            parse_launch_args(["-e", "gzdoom", "-x"]),
            Err(ArgsError::UnknownSwitch("-x".into()))
        );
        assert_eq!(
            parse_launch_args(["-e", "a", "-e", "b"]),
            Err(ArgsError::Duplicate("-e".into()))
        );
    }

    #[test]
    fn engine_is_required() {
        assert_eq!(
            parse_launch_args(["-i", "doom2"]),
            Err(ArgsError::MissingEngine)
        );
        assert_eq!(
            parse_launch_args(Vec::<String>::new()),
            Err(ArgsError::MissingEngine)
        );
    }

    #[test]
    fn passthrough_is_verbatim() {
        let request = parse_launch_args(["-e", "gzdoom", "-a", "$HOME", "*.wad", ""]).unwrap();
        assert_eq!(request.passthrough, vec!["$HOME", "*.wad", ""]);
    }
}
