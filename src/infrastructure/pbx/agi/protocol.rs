//! The PBX's inline-script protocol
//!
//! The PBX opens a TCP connection, sends a preamble of `agi_<name>: <value>`
//! lines terminated by a blank line, then accepts one command per line and
//! returns one response line per command. A response beginning with `520`
//! is a syntax error; `200 result=<n>` carries the command's result code.

use std::collections::HashMap;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::domain::shared::{EngineError, Result};

/// A digit read from `WAIT FOR DIGIT`: a keypad character, `*`/`#`, or a
/// timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitResult {
    Timeout,
    Digit(char),
}

impl DigitResult {
    pub fn from_ascii_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DigitResult::Timeout),
            48..=57 => Some(DigitResult::Digit((code as u8) as char)),
            42 => Some(DigitResult::Digit('*')),
            35 => Some(DigitResult::Digit('#')),
            _ => None,
        }
    }
}

pub struct AgiSession {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    pub preamble: HashMap<String, String>,
}

impl AgiSession {
    /// Reads the preamble (`agi_<name>: <value>` lines then a blank line)
    /// off a freshly accepted connection.
    pub async fn accept(stream: TcpStream) -> Result<Self> {
        let (read_half, writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut preamble = HashMap::new();

        loop {
            let mut line = String::new();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| EngineError::Io(e))?;
            if n == 0 {
                return Err(EngineError::ProtocolViolation(
                    "connection closed during agi preamble".to_string(),
                ));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                preamble.insert(
                    k.trim().trim_start_matches("agi_").to_string(),
                    v.trim().to_string(),
                );
            }
        }

        Ok(Self {
            reader,
            writer,
            preamble,
        })
    }

    async fn send_command(&mut self, command: &str) -> Result<String> {
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(EngineError::Io)?;

        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(EngineError::Io)?;
        if n == 0 {
            return Err(EngineError::ProtocolViolation(
                "connection closed awaiting command response".to_string(),
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.starts_with("520") {
            return Err(EngineError::ProtocolViolation(format!(
                "syntax error response: {line}"
            )));
        }
        Ok(line)
    }

    fn parse_result(line: &str) -> Result<i32> {
        line.split("result=")
            .nth(1)
            .and_then(|rest| {
                rest.split(|c: char| !c.is_ascii_digit() && c != '-')
                    .next()
            })
            .and_then(|num| num.parse().ok())
            .ok_or_else(|| EngineError::ProtocolViolation(format!("unparseable result in: {line}")))
    }

    pub async fn answer(&mut self) -> Result<bool> {
        let line = self.send_command("ANSWER").await?;
        Ok(Self::parse_result(&line)? >= 0)
    }

    pub async fn hangup(&mut self) -> Result<()> {
        self.send_command("HANGUP").await?;
        Ok(())
    }

    pub async fn verbose(&mut self, message: &str) -> Result<()> {
        self.send_command(&format!("VERBOSE \"{message}\" 1")).await?;
        Ok(())
    }

    pub async fn get_variable(&mut self, name: &str) -> Result<Option<String>> {
        let line = self.send_command(&format!("GET VARIABLE {name}")).await?;
        let result = Self::parse_result(&line)?;
        if result == 0 {
            return Ok(None);
        }
        let value = line
            .split_once('(')
            .and_then(|(_, rest)| rest.strip_suffix(')'))
            .map(str::to_string);
        Ok(value)
    }

    pub async fn set_variable(&mut self, name: &str, value: &str) -> Result<()> {
        self.send_command(&format!("SET VARIABLE {name} \"{value}\"")).await?;
        Ok(())
    }

    pub async fn stream_file(&mut self, filename: &str) -> Result<i32> {
        let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
        let line = self.send_command(&format!("STREAM FILE {stem} \"\"")).await?;
        Self::parse_result(&line)
    }

    pub async fn wait_for_digit(&mut self, timeout_ms: u64) -> Result<DigitResult> {
        let line = self.send_command(&format!("WAIT FOR DIGIT {timeout_ms}")).await?;
        let code = Self::parse_result(&line)?;
        DigitResult::from_ascii_code(code)
            .ok_or_else(|| EngineError::ProtocolViolation(format!("unexpected digit code {code}")))
    }

    /// Invokes an application (used for answering-machine detection and
    /// other dialplan apps) with numeric, pipe-joined parameters.
    pub async fn exec(&mut self, app: &str, params: &str) -> Result<i32> {
        let line = self.send_command(&format!("EXEC {app} \"{params}\"")).await?;
        Self::parse_result(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_digit_results() {
        assert_eq!(DigitResult::from_ascii_code(0), Some(DigitResult::Timeout));
        assert_eq!(DigitResult::from_ascii_code(49), Some(DigitResult::Digit('1')));
        assert_eq!(DigitResult::from_ascii_code(42), Some(DigitResult::Digit('*')));
        assert_eq!(DigitResult::from_ascii_code(35), Some(DigitResult::Digit('#')));
        assert_eq!(DigitResult::from_ascii_code(7), None);
    }

    #[test]
    fn parses_result_code_from_response_line() {
        assert_eq!(AgiSession::parse_result("200 result=1").unwrap(), 1);
        assert_eq!(AgiSession::parse_result("200 result=0 (timeout)").unwrap(), 0);
        assert_eq!(AgiSession::parse_result("200 result=-1").unwrap(), -1);
        assert!(AgiSession::parse_result("520 invalid command").is_err());
    }

    #[test]
    fn strips_extension_for_stream_file() {
        let stem = "welcome.wav".rsplit_once('.').map(|(s, _)| s).unwrap_or("welcome.wav");
        assert_eq!(stem, "welcome");
    }
}
