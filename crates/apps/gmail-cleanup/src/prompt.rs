//! Typed confirmation prompts

use std::io::{self, BufRead, Write};

/// Print `message` and read one line from stdin, without the line ending
///
/// End of input reads as an empty answer.
pub fn ask(message: &str) -> io::Result<String> {
    let stdin = io::stdin();
    ask_with(message, &mut stdin.lock(), &mut io::stdout())
}

pub fn ask_with<R: BufRead, W: Write>(message: &str, input: &mut R, out: &mut W) -> io::Result<String> {
    write!(out, "{message}: ")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
