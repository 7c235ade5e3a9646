use crate::error::OrderError;
use serde_json::{Value, json};
use std::io::{self, Write};

/// Writes one JSON outcome per line: `{"ok": ...}` or
/// `{"error": {"reason": ..., "message": ...}}`.
pub struct OutcomeWriter<W: Write> {
    writer: W,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, outcome: &Result<Value, OrderError>) -> io::Result<()> {
        let line = match outcome {
            Ok(value) => json!({ "ok": value }),
            Err(e) => json!({ "error": { "reason": e.reason(), "message": e.to_string() } }),
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
