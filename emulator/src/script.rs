//! Line-oriented script language driving an emulated device.
//!
//! ```text
//! acquire
//! configure info.bin power.bin init.bin
//! start
//! read gyro.bin 12 stamp
//! dump 0x0100 4
//! release
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::fmt;

use winnow::ascii::{dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, delimited, eof, fail, opt, preceded, separated, terminated};
use winnow::prelude::*;
use winnow::token::take_till;

/// One parsed script line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptCommand<'s> {
    Acquire,
    Configure(Vec<&'s str>),
    Start,
    Stop,
    Mode(&'s str),
    Time(&'s str),
    Read {
        settings: &'s str,
        len: usize,
        stamp: bool,
    },
    Release,
    Status,
    Dump {
        address: u32,
        len: usize,
    },
    /// Fails the next `count` bus accesses with a transport reset.
    Resets(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptError {
    pub line: String,
    pub offset: usize,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at column {} in `{}`", self.offset + 1, self.line)
    }
}

impl std::error::Error for ScriptError {}

/// Parses one line; `Ok(None)` for blanks and comments.
pub fn parse_line(line: &str) -> Result<Option<ScriptCommand<'_>>, ScriptError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    delimited(space0, command, terminated(space0, eof))
        .parse(trimmed)
        .map(Some)
        .map_err(|err| ScriptError {
            line: trimmed.to_owned(),
            offset: err.offset(),
        })
}

fn word<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_till(1.., |c: char| c.is_ascii_whitespace()).parse_next(input)
}

fn argument<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    preceded(space1, word).parse_next(input)
}

fn count(input: &mut &str) -> ModalResult<usize> {
    preceded(space1, dec_uint).parse_next(input)
}

fn address(input: &mut &str) -> ModalResult<u32> {
    preceded(
        space1,
        alt((preceded(alt(("0x", "0X")), hex_uint), dec_uint)),
    )
    .parse_next(input)
}

fn command<'s>(input: &mut &'s str) -> ModalResult<ScriptCommand<'s>> {
    let keyword = word.parse_next(input)?;
    match keyword.to_ascii_lowercase().as_str() {
        "acquire" => Ok(ScriptCommand::Acquire),
        "configure" => preceded(space1, separated(1.., word, space1))
            .map(ScriptCommand::Configure)
            .parse_next(input),
        "start" => Ok(ScriptCommand::Start),
        "stop" => Ok(ScriptCommand::Stop),
        "mode" => argument.map(ScriptCommand::Mode).parse_next(input),
        "time" => argument.map(ScriptCommand::Time).parse_next(input),
        "read" => {
            let settings = argument.parse_next(input)?;
            let len = count.parse_next(input)?;
            let stamp = opt(preceded(space1, "stamp")).parse_next(input)?;
            Ok(ScriptCommand::Read {
                settings,
                len,
                stamp: stamp.is_some(),
            })
        }
        "release" => Ok(ScriptCommand::Release),
        "status" => Ok(ScriptCommand::Status),
        "dump" => {
            let address = address.parse_next(input)?;
            let len = count.parse_next(input)?;
            Ok(ScriptCommand::Dump { address, len })
        }
        "resets" => count.map(ScriptCommand::Resets).parse_next(input),
        _ => fail.parse_next(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_without_arguments() {
        assert_eq!(parse_line("acquire"), Ok(Some(ScriptCommand::Acquire)));
        assert_eq!(parse_line("  START  "), Ok(Some(ScriptCommand::Start)));
        assert_eq!(parse_line("status"), Ok(Some(ScriptCommand::Status)));
    }

    #[test]
    fn configure_takes_one_or_more_files() {
        assert_eq!(
            parse_line("configure info.bin  init.bin"),
            Ok(Some(ScriptCommand::Configure(vec!["info.bin", "init.bin"])))
        );
        assert!(parse_line("configure").is_err());
    }

    #[test]
    fn read_with_optional_stamp() {
        assert_eq!(
            parse_line("read gyro.bin 12"),
            Ok(Some(ScriptCommand::Read {
                settings: "gyro.bin",
                len: 12,
                stamp: false
            }))
        );
        assert_eq!(
            parse_line("read gyro.bin 12 stamp"),
            Ok(Some(ScriptCommand::Read {
                settings: "gyro.bin",
                len: 12,
                stamp: true
            }))
        );
    }

    #[test]
    fn dump_accepts_hex_and_decimal() {
        assert_eq!(
            parse_line("dump 0x100 4"),
            Ok(Some(ScriptCommand::Dump {
                address: 0x100,
                len: 4
            }))
        );
        assert_eq!(
            parse_line("dump 256 4"),
            Ok(Some(ScriptCommand::Dump {
                address: 256,
                len: 4
            }))
        );
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   # power rails"), Ok(None));
    }

    #[test]
    fn unknown_or_trailing_input_is_rejected() {
        assert!(parse_line("reboot").is_err());
        assert!(parse_line("start now").is_err());
        assert!(parse_line("read gyro.bin twelve").is_err());
    }
}
