//! Terminal collaborators, used when no other input or output is injected.

use std::io::{self, BufRead, Write};
use tracing::info;

use super::{InputProvider, OutputSink, ServiceError};

/// Reads one line per utterance from standard input.
#[derive(Debug, Default)]
pub struct StdinInput {
    prompt: Option<String>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

impl InputProvider for StdinInput {
    fn get_utterance(&mut self) -> Result<String, ServiceError> {
        if let Some(ref prompt) = self.prompt {
            let mut stdout = io::stdout();
            write!(stdout, "{}", prompt)?;
            stdout.flush()?;
        }

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(ServiceError::InputClosed);
        }
        Ok(line.trim().to_string())
    }
}

/// Prints messages to standard output. Media sources are announced rather
/// than played.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str, _style: Option<&str>) -> Result<(), ServiceError> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", text)?;
        Ok(())
    }

    fn play(&mut self, source: &str) -> Result<(), ServiceError> {
        info!(source, "playing media");
        let mut stdout = io::stdout();
        writeln!(stdout, "[playing {}]", source)?;
        Ok(())
    }
}
