use super::command::Command;
use miette::Diagnostic;
use std::io::BufRead;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ReadError {
    #[error("failed to read command stream")]
    #[diagnostic(code(commands::io))]
    Io(#[from] std::io::Error),
    #[error("malformed command on line {line}")]
    #[diagnostic(code(commands::parse))]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads one JSON command per line. Blank lines are skipped.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses the stream; a malformed line yields an error and the
    /// iterator moves on to the next line.
    pub fn commands(self) -> impl Iterator<Item = Result<Command, ReadError>> {
        self.source
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|(idx, line)| -> Result<Command, ReadError> {
                let line = line?;
                serde_json::from_str(&line).map_err(|source| ReadError::Parse {
                    line: idx + 1,
                    source,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_skips_blank_and_reports_bad_lines() {
        let data = "{\"op\":\"sweep\"}\n\n{not json}\n{\"op\":\"list_by_user\",\"user_id\":\"u1\"}\n";
        let results: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Ok(Command::Sweep)));
        assert!(matches!(results[1], Err(ReadError::Parse { line: 3, .. })));
        assert!(matches!(results[2], Ok(Command::ListByUser { .. })));
    }
}
