//! Line-oriented prompting on the controlling terminal

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};

use tracing::debug;

/// Source of operator responses for the selection loop.
pub trait LinePrompt {
    /// Display `prompt` and read one whitespace-trimmed line.
    ///
    /// `Ok(None)` signals end of input: the stream is closed and no further
    /// answer will ever arrive.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Prompts on `/dev/tty`, falling back to stderr/stdin when no controlling
/// terminal can be opened.
///
/// Going through `/dev/tty` keeps the prompt working when stdin or stdout
/// are redirected, the normal case for a tool whose stdout is captured by
/// scripts.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl LinePrompt for TerminalPrompt {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match tty_round_trip(prompt) {
            Ok(answer) => Ok(answer),
            Err(err) => {
                debug!("cannot prompt via /dev/tty ({err}), falling back to stdin");
                stdin_round_trip(prompt)
            }
        }
    }
}

/// One prompt/response exchange on the controlling terminal device.
fn tty_round_trip(prompt: &str) -> io::Result<Option<String>> {
    let mut tty_out = OpenOptions::new().write(true).open("/dev/tty")?;
    tty_out.write_all(prompt.as_bytes())?;
    tty_out.flush()?;
    let tty_in = BufReader::new(File::open("/dev/tty")?);
    read_trimmed_line(tty_in)
}

/// Fallback exchange over stderr/stdin.
fn stdin_round_trip(prompt: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr().lock();
    stderr.write_all(prompt.as_bytes())?;
    stderr.flush()?;
    read_trimmed_line(io::stdin().lock())
}

/// Read one line, `None` at end of input.
fn read_trimmed_line(mut reader: impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
