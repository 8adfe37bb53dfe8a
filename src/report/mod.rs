//! Newline-delimited JSON output

use std::io::Write;

use serde::Serialize;

use crate::error::Result;

/// Writes one JSON document per line, or indented documents when `indent`
/// is set. Each record is independently parseable.
pub struct JsonPrinter<W: Write> {
    w: W,
    indent: bool,
}

impl<W: Write> JsonPrinter<W> {
    pub fn new(w: W, indent: bool) -> Self {
        Self { w, indent }
    }

    /// Print `data` if `show` is set.
    pub fn print<T: Serialize + ?Sized>(&mut self, data: &T, show: bool) -> Result<()> {
        if !show {
            return Ok(());
        }
        if self.indent {
            serde_json::to_writer_pretty(&mut self.w, data)?;
        } else {
            serde_json::to_writer(&mut self.w, data)?;
        }
        self.w.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}
