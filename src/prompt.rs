//! Blocking operator prompts.
//!
//! All configuration is interactive: the tester asks, the operator types.
//! Prompts run over an injected reader/writer pair so the whole flow is
//! testable without a terminal. Invalid input re-prompts; answers are
//! case-insensitive and returned upper-cased.

use crate::error::{AppResult, TesterError};
use std::io::{BufRead, Stdin, Stdout, Write};

pub struct Prompt<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl Prompt<std::io::BufReader<Stdin>, Stdout> {
    /// Prompt over the process stdin/stdout.
    pub fn stdio() -> Self {
        Prompt::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> AppResult<String> {
        self.output.flush()?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            return Err(TesterError::PromptEof);
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, text: &str) -> AppResult<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    /// Ask until the answer matches one of `options` (case-insensitive).
    /// The empty string in `options` means plain 'enter' is accepted.
    /// Returns the matched option upper-cased.
    pub fn choice(&mut self, text: &str, options: &[&str]) -> AppResult<String> {
        let valid: Vec<String> = options.iter().map(|o| o.to_uppercase()).collect();
        loop {
            self.say(text)?;
            let answer = self.read_line()?.to_uppercase();
            if valid.iter().any(|v| *v == answer) {
                return Ok(answer);
            }
            self.say("Error: please enter a valid response")?;
        }
    }

    /// Ask until a non-empty answer arrives. Returned as typed (not
    /// upper-cased: array IDs are case-sensitive).
    pub fn non_empty(&mut self, text: &str) -> AppResult<String> {
        loop {
            self.say(text)?;
            let answer = self.read_line()?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            self.say("Error: response can't be blank")?;
        }
    }

    /// Y/N question.
    pub fn yes_no(&mut self, text: &str) -> AppResult<bool> {
        let answer = self.choice(&format!("{} 'Y' or 'N':", text), &["Y", "N"])?;
        Ok(answer == "Y")
    }

    /// Numeric menu choice limited to `valid` digits.
    pub fn digit(&mut self, text: &str, valid: &[u8]) -> AppResult<u8> {
        loop {
            self.say(text)?;
            let answer = self.read_line()?;
            if let Ok(value) = answer.parse::<u8>() {
                if valid.contains(&value) {
                    return Ok(value);
                }
            }
            self.say("Error: please enter a valid response")?;
        }
    }
}
