//! Line-oriented metric output.
//!
//! Format, one observation per line:
//!
//! ```text
//! <prefix>.<name> <unix_timestamp> <value> schema=<name> [<tag>=<value> ...]
//! ```
//!
//! The `schema` tag always comes first, remaining tags follow in key order.
//! Every line is flushed as soon as it is written so a downstream reader sees
//! complete lines only.

use std::io::{self, Write};

use crate::model::{Observation, SCHEMA_TAG};

/// Writes observations to an output stream in the telemetry line format.
pub struct MetricWriter<W: Write> {
    out: W,
    prefix: String,
    lines_written: u64,
}

impl<W: Write> MetricWriter<W> {
    /// Creates a writer. An empty `prefix` writes names unqualified.
    pub fn new(out: W, prefix: impl Into<String>) -> Self {
        Self {
            out,
            prefix: prefix.into(),
            lines_written: 0,
        }
    }

    /// Formats a single observation (without trailing newline).
    pub fn format(&self, obs: &Observation) -> String {
        let mut line = String::with_capacity(64);
        if !self.prefix.is_empty() {
            line.push_str(&self.prefix);
            line.push('.');
        }
        line.push_str(&obs.name);
        line.push(' ');
        line.push_str(&obs.timestamp.to_string());
        line.push(' ');
        line.push_str(&obs.value.to_string());

        line.push(' ');
        line.push_str(SCHEMA_TAG);
        line.push('=');
        line.push_str(obs.schema());

        for (key, value) in obs.tags.iter().filter(|(k, _)| k.as_str() != SCHEMA_TAG) {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }

    /// Writes and flushes one observation.
    pub fn write(&mut self, obs: &Observation) -> io::Result<()> {
        let line = self.format(obs);
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        self.lines_written += 1;
        Ok(())
    }

    /// Writes every observation from `observations`, stopping at the first error.
    pub fn write_all<I>(&mut self, observations: I) -> io::Result<usize>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut count = 0;
        for obs in observations {
            self.write(&obs)?;
            count += 1;
        }
        Ok(count)
    }

    /// Total number of lines written so far.
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
