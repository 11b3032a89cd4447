//! Canonical Go formatting through an external `gofmt`

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::error::{DocError, DocResult};

/// Pipes source text through `<program>` and reads the formatted result
/// from its standard output.
///
/// A program that cannot be started is reported once; after that the
/// formatter stays quiet and callers keep their own output.
#[derive(Debug, Clone, Default)]
pub struct SourceFormatter {
    program: Option<String>,
    unavailable: Arc<AtomicBool>,
}

impl SourceFormatter {
    /// An empty program name disables formatting
    pub fn new(program: &str) -> Self {
        SourceFormatter {
            program: (!program.is_empty()).then(|| program.to_string()),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn disabled() -> Self {
        SourceFormatter::default()
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    /// Format `source`.
    ///
    /// Returns `Ok(None)` when formatting is disabled or the program is not
    /// available, and an error when the program rejects the source.
    pub fn format(&self, source: &str) -> DocResult<Option<String>> {
        let Some(program) = self.program.as_deref() else {
            return Ok(None);
        };
        if self.unavailable.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let mut child = match Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                if !self.unavailable.swap(true, Ordering::Relaxed) {
                    warn!("{} unavailable, writing sources unformatted: {}", program, e);
                }
                return Ok(None);
            }
        };

        let writer = child.stdin.take().map(|mut stdin| {
            let input = source.as_bytes().to_vec();
            std::thread::spawn(move || stdin.write_all(&input))
        });
        let output = child
            .wait_with_output()
            .map_err(|e| DocError::Format(format!("{}: {}", program, e)))?;
        let written = writer.map(|handle| handle.join());

        if !output.status.success() {
            return Err(DocError::Format(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if let Some(Ok(Err(e))) = written {
            return Err(DocError::Format(format!("{}: {}", program, e)));
        }
        String::from_utf8(output.stdout)
            .map(Some)
            .map_err(|e| DocError::Format(format!("{} wrote invalid UTF-8: {}", program, e)))
    }
}
