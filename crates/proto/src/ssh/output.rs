//! Line-oriented collection of command output.
//!
//! Data frames do not respect line boundaries, so each stream keeps the
//! bytes after its last newline until more data (or the end) arrives.

/// Prefix for lines that came from stderr.
pub const STDERR_PREFIX: &str = "[stderr] ";

/// Ordered stdout/stderr lines for one command.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    lines: Vec<String>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn drain_lines(partial: &mut Vec<u8>, prefix: &str, lines: &mut Vec<String>) {
    while let Some(pos) = partial.iter().position(|&b| b == b'\n') {
        let rest = partial.split_off(pos + 1);
        let line = std::mem::replace(partial, rest);
        lines.push(format!("{}{}", prefix, decode(&line[..pos])));
    }
}

impl OutputBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends stdout bytes.
    pub fn push_stdout(&mut self, data: &[u8]) {
        self.stdout.extend_from_slice(data);
        drain_lines(&mut self.stdout, "", &mut self.lines);
    }

    /// Appends stderr bytes; completed lines get [`STDERR_PREFIX`].
    pub fn push_stderr(&mut self, data: &[u8]) {
        self.stderr.extend_from_slice(data);
        drain_lines(&mut self.stderr, STDERR_PREFIX, &mut self.lines);
    }

    /// Appends a complete line of our own.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Completed lines so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Flushes unterminated lines and trims trailing blank lines.
    pub fn finish(mut self) -> Vec<String> {
        if !self.stdout.is_empty() {
            let line = decode(&self.stdout);
            self.lines.push(line);
        }
        if !self.stderr.is_empty() {
            let line = format!("{}{}", STDERR_PREFIX, decode(&self.stderr));
            self.lines.push(line);
        }
        while self
            .lines
            .last()
            .map_or(false, |line| line.trim().is_empty())
        {
            self.lines.pop();
        }
        self.lines
    }
}
