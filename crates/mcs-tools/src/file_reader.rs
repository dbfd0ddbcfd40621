// crates/mcs-tools/src/file_reader.rs
// ============================================================================
// Module: File Reader Tool
// Description: Streams a local text file line by line.
// Purpose: Expose local files as lazily produced text output.
// Dependencies: mcs-core, serde
// ============================================================================

//! ## Overview
//! `file_reader {path}` opens the file on the first pull and yields one
//! `LINE: <text>` item per line, trimmed of surrounding whitespace. A missing file, a read error, or invalid
//! UTF-8 ends the sequence with a runtime fault. When `root` is configured the
//! resolved path must stay inside it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use mcs_core::NativeToolSource;
use mcs_core::OutputItem;
use mcs_core::OutputStream;
use mcs_core::ToolArguments;
use mcs_core::ToolFault;
use mcs_core::ToolOutput;
use mcs_core::tool::failed;
use serde::Deserialize;

use crate::ToolBuildError;
use crate::config::FILE_READER;
use crate::config::require_nonzero;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// File reader settings (`[tools.file_reader]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileReaderConfig {
    /// Optional directory that confines all reads.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Maximum bytes accepted for a single line.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for FileReaderConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl FileReaderConfig {
    /// Validates limits.
    pub(crate) fn validate(&self) -> Result<(), ToolBuildError> {
        require_nonzero(
            "tools.file_reader.max_line_bytes",
            u64::try_from(self.max_line_bytes).unwrap_or(u64::MAX),
        )
    }
}

/// Default per-line limit (64 KiB).
const fn default_max_line_bytes() -> usize {
    64 * 1024
}

// ============================================================================
// SECTION: Tool
// ============================================================================

/// Streams local text files.
#[derive(Debug, Clone)]
pub struct FileReader {
    /// Tool settings.
    config: FileReaderConfig,
}

impl FileReader {
    /// Builds the tool.
    #[must_use]
    pub const fn new(config: FileReaderConfig) -> Self {
        Self {
            config,
        }
    }

    /// Starts streaming the file named by the `path` argument.
    #[must_use]
    pub fn run(&self, arguments: &ToolArguments) -> OutputStream {
        let requested = match arguments.required_str("path") {
            Ok(path) => path.to_string(),
            Err(fault) => return failed(fault),
        };
        Box::new(FileLines {
            state: LinesState::Pending {
                root: self.config.root.clone(),
            },
            display: requested,
            max_line_bytes: self.config.max_line_bytes,
        })
    }

    /// Wraps the tool as a registry source.
    #[must_use]
    pub fn into_source(self) -> NativeToolSource {
        let tool = Arc::new(self);
        NativeToolSource::new(
            FILE_READER,
            "Reads a local text file and streams it back line by line.",
            move |arguments| tool.run(&arguments),
        )
    }
}

// ============================================================================
// SECTION: Line Iterator
// ============================================================================

/// Lazy line producer.
struct FileLines {
    /// Current reader state.
    state: LinesState,
    /// Path as supplied by the caller, used in messages.
    display: String,
    /// Per-line byte cap.
    max_line_bytes: usize,
}

/// Reader lifecycle.
enum LinesState {
    /// Not opened yet.
    Pending {
        /// Optional confinement root.
        root: Option<PathBuf>,
    },
    /// Open and yielding lines.
    Reading(BufReader<File>),
    /// Exhausted or failed.
    Done,
}

impl Iterator for FileLines {
    type Item = ToolOutput;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, LinesState::Done) {
                LinesState::Done => return None,
                LinesState::Pending {
                    root,
                } => match open_file(&self.display, root.as_deref()) {
                    Ok(file) => self.state = LinesState::Reading(BufReader::new(file)),
                    Err(fault) => return Some(Err(fault)),
                },
                LinesState::Reading(mut reader) => {
                    return match read_line(&mut reader, self.max_line_bytes, &self.display) {
                        Ok(Some(line)) => {
                            self.state = LinesState::Reading(reader);
                            Some(Ok(OutputItem::text(format!("LINE: {}", line.trim()))))
                        }
                        Ok(None) => None,
                        Err(fault) => Some(Err(fault)),
                    };
                }
            }
        }
    }
}

/// Resolves and opens the requested file.
fn open_file(requested: &str, root: Option<&Path>) -> Result<File, ToolFault> {
    let path = match root {
        Some(root) => confine(root, requested)?,
        None => PathBuf::from(requested),
    };
    File::open(&path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => not_found(requested),
        _ => ToolFault::runtime(format!("Failed to open '{requested}': {err}")),
    })
}

/// Joins `requested` under `root` and rejects escapes.
fn confine(root: &Path, requested: &str) -> Result<PathBuf, ToolFault> {
    let root = root
        .canonicalize()
        .map_err(|err| ToolFault::runtime(format!("File root unavailable: {err}")))?;
    let candidate = root.join(requested);
    let resolved = candidate.canonicalize().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => not_found(requested),
        _ => ToolFault::runtime(format!("Failed to resolve '{requested}': {err}")),
    })?;
    if !resolved.starts_with(&root) {
        return Err(ToolFault::invalid_argument(format!(
            "Path '{requested}' is outside the readable root."
        )));
    }
    Ok(resolved)
}

/// Reads one line, stripping the trailing line terminator.
fn read_line(
    reader: &mut BufReader<File>,
    max_line_bytes: usize,
    display: &str,
) -> Result<Option<String>, ToolFault> {
    let mut buf = Vec::new();
    let limit = u64::try_from(max_line_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let read = reader
        .by_ref()
        .take(limit)
        .read_until(b'\n', &mut buf)
        .map_err(|err| ToolFault::runtime(format!("Failed to read '{display}': {err}")))?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_line_bytes {
        return Err(ToolFault::runtime(format!(
            "Line in '{display}' exceeds {max_line_bytes} bytes."
        )));
    }
    String::from_utf8(buf).map(Some).map_err(|_| {
        ToolFault::runtime(format!("File at '{display}' is not valid UTF-8 text."))
    })
}

/// Builds the not-found fault.
fn not_found(requested: &str) -> ToolFault {
    ToolFault::runtime(format!("File not found at '{requested}'."))
}
