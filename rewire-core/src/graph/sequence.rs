//! Sequential edge containers.
//!
//! The engine touches the edge list only through forward passes, so the
//! container contract is a write-then-read stream: `push` appends while the
//! sequence is being built, `consume` seals it for reading, and `rewind`
//! restarts a pass. [`MemEdgeSequence`] keeps everything in RAM;
//! [`FileEdgeSequence`] stores little-endian `(i64, i64)` records in an
//! anonymous temporary file and is the out-of-core representation.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
};

use thiserror::Error;

use crate::em::Record;

use super::edge::Edge;

/// An error produced by an [`EdgeSequence`] operation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SequenceError {
    /// An operation was attempted in the wrong stream mode.
    #[error("`{operation}` is not valid while the sequence is {mode}")]
    WrongMode {
        /// The rejected operation.
        operation: &'static str,
        /// The mode the sequence was in.
        mode: &'static str,
    },
    /// The backing storage failed.
    #[error("edge sequence I/O failed")]
    Io {
        #[source]
        source: io::Error,
    },
}

impl From<io::Error> for SequenceError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

/// Convenient alias for results returned by sequence operations.
pub type Result<T> = std::result::Result<T, SequenceError>;

/// A sequential container of edges with a write phase and repeatable read
/// passes.
pub trait EdgeSequence {
    /// Number of edges stored.
    fn len(&self) -> u64;

    /// Returns `true` when no edges are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends an edge. Only valid while writing.
    fn push(&mut self, edge: Edge) -> Result<()>;

    /// Seals the write phase and positions the read cursor at the start.
    fn consume(&mut self) -> Result<()>;

    /// Returns the edge under the read cursor, or `None` when the pass is
    /// complete.
    fn peek(&self) -> Option<Edge>;

    /// Moves the read cursor forward by one edge.
    fn advance(&mut self) -> Result<()>;

    /// Restarts the read pass from the first edge.
    fn rewind(&mut self) -> Result<()>;

    /// Creates an empty sequence with the same backing as `self`, ready for
    /// writing. Used when the engine rewrites the edge list.
    fn fresh(&self) -> Result<Self>
    where
        Self: Sized;

    /// Drains the remaining read pass into a vector and rewinds.
    ///
    /// # Errors
    /// Propagates backing-storage failures.
    fn drain_to_vec(&mut self) -> Result<Vec<Edge>> {
        self.rewind()?;
        let mut out = Vec::new();
        while let Some(edge) = self.peek() {
            out.push(edge);
            self.advance()?;
        }
        self.rewind()?;
        Ok(out)
    }
}

/// An in-memory edge sequence.
///
/// # Examples
/// ```
/// use rewire_core::{Edge, EdgeSequence, MemEdgeSequence};
///
/// let mut seq = MemEdgeSequence::from_edges(vec![Edge::new(1, 2), Edge::new(3, 4)]);
/// assert_eq!(seq.len(), 2);
/// assert_eq!(seq.peek(), Some(Edge::new(1, 2)));
/// ```
#[derive(Debug, Default)]
pub struct MemEdgeSequence {
    edges: Vec<Edge>,
    cursor: usize,
    writing: bool,
}

impl MemEdgeSequence {
    /// Creates an empty sequence in the write phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            edges: Vec::new(),
            cursor: 0,
            writing: true,
        }
    }

    /// Creates a sealed sequence from existing edges, ready for reading.
    #[must_use]
    pub fn from_edges(edges: Vec<Edge>) -> Self {
        Self {
            edges,
            cursor: 0,
            writing: false,
        }
    }
}

impl EdgeSequence for MemEdgeSequence {
    fn len(&self) -> u64 {
        self.edges.len() as u64
    }

    fn push(&mut self, edge: Edge) -> Result<()> {
        if !self.writing {
            return Err(SequenceError::WrongMode {
                operation: "push",
                mode: "reading",
            });
        }
        self.edges.push(edge);
        Ok(())
    }

    fn consume(&mut self) -> Result<()> {
        self.writing = false;
        self.cursor = 0;
        Ok(())
    }

    fn peek(&self) -> Option<Edge> {
        if self.writing {
            return None;
        }
        self.edges.get(self.cursor).copied()
    }

    fn advance(&mut self) -> Result<()> {
        self.cursor += 1;
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        if self.writing {
            return Err(SequenceError::WrongMode {
                operation: "rewind",
                mode: "writing",
            });
        }
        self.cursor = 0;
        Ok(())
    }

    fn fresh(&self) -> Result<Self> {
        Ok(Self::new())
    }
}

enum FileState {
    Writing(BufWriter<File>),
    Reading {
        reader: BufReader<File>,
        current: Option<Edge>,
        remaining: u64,
    },
}

/// A temporary-file-backed edge sequence.
pub struct FileEdgeSequence {
    state: FileState,
    len: u64,
}

impl FileEdgeSequence {
    /// Creates an empty file-backed sequence in the write phase.
    ///
    /// # Errors
    /// Fails when the temporary file cannot be created.
    pub fn new() -> Result<Self> {
        let file = tempfile::tempfile()?;
        Ok(Self {
            state: FileState::Writing(BufWriter::new(file)),
            len: 0,
        })
    }

    /// Creates a sealed file-backed sequence from existing edges.
    ///
    /// # Errors
    /// Fails when the temporary file cannot be created or written.
    pub fn from_edges(edges: impl IntoIterator<Item = Edge>) -> Result<Self> {
        let mut seq = Self::new()?;
        for edge in edges {
            seq.push(edge)?;
        }
        seq.consume()?;
        Ok(seq)
    }

    fn fetch(reader: &mut BufReader<File>, remaining: &mut u64) -> Result<Option<Edge>> {
        if *remaining == 0 {
            return Ok(None);
        }
        let mut buf = [0u8; Edge::BYTES];
        reader.read_exact(&mut buf)?;
        *remaining -= 1;
        Ok(Some(Edge::read_bytes(&buf)))
    }

    fn start_reading(file: File, len: u64) -> Result<FileState> {
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;
        let mut remaining = len;
        let current = Self::fetch(&mut reader, &mut remaining)?;
        Ok(FileState::Reading {
            reader,
            current,
            remaining,
        })
    }
}

impl EdgeSequence for FileEdgeSequence {
    fn len(&self) -> u64 {
        self.len
    }

    fn push(&mut self, edge: Edge) -> Result<()> {
        match &mut self.state {
            FileState::Writing(writer) => {
                let mut buf = [0u8; Edge::BYTES];
                edge.write_bytes(&mut buf);
                writer.write_all(&buf)?;
                self.len += 1;
                Ok(())
            }
            FileState::Reading { .. } => Err(SequenceError::WrongMode {
                operation: "push",
                mode: "reading",
            }),
        }
    }

    fn consume(&mut self) -> Result<()> {
        // Replace the state with a cheap placeholder while the writer is
        // dismantled; any failure leaves an empty readable sequence.
        let state = std::mem::replace(
            &mut self.state,
            FileState::Reading {
                reader: BufReader::new(tempfile::tempfile()?),
                current: None,
                remaining: 0,
            },
        );
        match state {
            FileState::Writing(writer) => {
                let file = writer.into_inner().map_err(|e| SequenceError::Io {
                    source: e.into_error(),
                })?;
                self.state = Self::start_reading(file, self.len)?;
                Ok(())
            }
            FileState::Reading { reader, .. } => {
                self.state = Self::start_reading(reader.into_inner(), self.len)?;
                Ok(())
            }
        }
    }

    fn peek(&self) -> Option<Edge> {
        match &self.state {
            FileState::Reading { current, .. } => *current,
            FileState::Writing(_) => None,
        }
    }

    fn advance(&mut self) -> Result<()> {
        match &mut self.state {
            FileState::Reading {
                reader,
                current,
                remaining,
            } => {
                *current = Self::fetch(reader, remaining)?;
                Ok(())
            }
            FileState::Writing(_) => Err(SequenceError::WrongMode {
                operation: "advance",
                mode: "writing",
            }),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match &mut self.state {
            FileState::Reading {
                reader,
                current,
                remaining,
            } => {
                reader.seek(SeekFrom::Start(0))?;
                *remaining = self.len;
                *current = Self::fetch(reader, remaining)?;
                Ok(())
            }
            FileState::Writing(_) => Err(SequenceError::WrongMode {
                operation: "rewind",
                mode: "writing",
            }),
        }
    }

    fn fresh(&self) -> Result<Self> {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Edge, EdgeSequence, FileEdgeSequence, MemEdgeSequence, SequenceError};

    fn edges() -> Vec<Edge> {
        vec![Edge::new(1, 2), Edge::new(-3, 5), Edge::new(4, 4)]
    }

    #[test]
    fn mem_sequence_streams_and_rewinds() {
        let mut seq = MemEdgeSequence::from_edges(edges());
        assert_eq!(seq.drain_to_vec().expect("drain"), edges());
        // drain rewinds, so a second pass sees the same records
        assert_eq!(seq.peek(), Some(Edge::new(1, 2)));
    }

    #[test]
    fn mem_sequence_rejects_push_after_consume() {
        let mut seq = MemEdgeSequence::new();
        seq.push(Edge::new(0, 1)).expect("push while writing");
        seq.consume().expect("consume");
        assert!(matches!(
            seq.push(Edge::new(2, 3)),
            Err(SequenceError::WrongMode { .. })
        ));
    }

    #[test]
    fn file_sequence_round_trips() {
        let mut seq = FileEdgeSequence::from_edges(edges()).expect("build");
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.drain_to_vec().expect("drain"), edges());
    }

    #[test]
    fn file_sequence_rewind_mid_pass() {
        let mut seq = FileEdgeSequence::from_edges(edges()).expect("build");
        seq.advance().expect("advance");
        seq.rewind().expect("rewind");
        assert_eq!(seq.peek(), Some(Edge::new(1, 2)));
    }

    #[test]
    fn fresh_sequence_is_writable() {
        let seq = FileEdgeSequence::from_edges(edges()).expect("build");
        let mut other = seq.fresh().expect("fresh");
        other.push(Edge::new(8, 9)).expect("push");
        other.consume().expect("consume");
        assert_eq!(other.drain_to_vec().expect("drain"), vec![Edge::new(8, 9)]);
    }
}
