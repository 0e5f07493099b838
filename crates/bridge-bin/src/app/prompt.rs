//! Interactive startup prompts, used when flags are omitted.

use std::io::{self, BufRead, Write};

/// Ask for the port identifier on stdin.
pub fn prompt_port() -> io::Result<String> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    read_port(&mut stdin.lock(), &mut stdout.lock())
}

/// Ask for the acquisition window on stdin.
pub fn prompt_duration_ms() -> io::Result<u64> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    read_duration_ms(&mut stdin.lock(), &mut stdout.lock())
}

fn read_port<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<String> {
    loop {
        let answer = ask(input, output, "Enter the port identifier: ")?;
        if !answer.is_empty() {
            return Ok(answer);
        }
    }
}

fn read_duration_ms<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<u64> {
    loop {
        let answer = ask(input, output, "Enter the acquisition time (ms): ")?;
        match answer.parse::<u64>() {
            Ok(ms) => return Ok(ms),
            Err(_) => writeln!(output, "Not a whole number of milliseconds: {answer:?}")?,
        }
    }
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{question}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "standard input closed before an answer was given",
        ));
    }
    Ok(line.trim().to_string())
}
