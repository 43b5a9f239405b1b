//! Sorted runs: spilling, streaming readers and k-way merging.
//!
//! A run is a sorted batch of records written once to an anonymous temporary
//! file. The [`RunsMerger`] streams the union of any number of runs in
//! comparator order; the [`RunsCreator`] moves run writing onto a background
//! thread so worker threads only pay for an in-memory sort and a bounded
//! channel send.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    fs::File,
    io::{self, BufWriter, Read, Seek, SeekFrom, Write},
    sync::mpsc::{Receiver, SyncSender, sync_channel},
    thread::JoinHandle,
};

use super::{EmError, Record};

/// Records fetched from a run file per refill.
const READ_CHUNK: usize = 4096;

/// Pending sorted batches the background writer may hold.
const WRITER_QUEUE_DEPTH: usize = 2;

/// A sorted batch of records persisted to its own temporary file.
pub(crate) struct SortedRun {
    file: File,
    len: u64,
}

/// Writes `records` (already sorted by the caller) to a fresh temporary file.
pub(crate) fn spill_run<T: Record>(records: &[T]) -> io::Result<SortedRun> {
    let mut writer = BufWriter::new(tempfile::tempfile()?);
    let mut buf = vec![0u8; T::BYTES];
    for record in records {
        record.write_bytes(&mut buf);
        writer.write_all(&buf)?;
    }
    let mut file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(SortedRun {
        file,
        len: records.len() as u64,
    })
}

struct RunReader<T> {
    file: File,
    total: u64,
    fetched: u64,
    buf: Vec<T>,
    pos: usize,
}

impl<T: Record> RunReader<T> {
    fn new(run: SortedRun) -> Self {
        Self {
            file: run.file,
            total: run.len,
            fetched: 0,
            buf: Vec::new(),
            pos: 0,
        }
    }

    fn reset(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.fetched = 0;
        self.buf.clear();
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> io::Result<Option<T>> {
        if self.pos == self.buf.len() {
            let want = (self.total - self.fetched).min(READ_CHUNK as u64) as usize;
            if want == 0 {
                return Ok(None);
            }
            let mut bytes = vec![0u8; want * T::BYTES];
            self.file.read_exact(&mut bytes)?;
            self.buf.clear();
            self.buf
                .extend(bytes.chunks_exact(T::BYTES).map(T::read_bytes));
            self.fetched += want as u64;
            self.pos = 0;
        }
        let record = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(record))
    }
}

struct HeapEntry<T> {
    record: T,
    run: usize,
}

impl<T: Ord> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for HeapEntry<T> {}

impl<T: Ord> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the smallest record first. Equal
        // records are indistinguishable, so the run tiebreak only keeps the
        // order total.
        other
            .record
            .cmp(&self.record)
            .then_with(|| other.run.cmp(&self.run))
    }
}

/// Streams the k-way merge of a set of sorted runs.
pub struct RunsMerger<T> {
    readers: Vec<RunReader<T>>,
    heap: BinaryHeap<HeapEntry<T>>,
    len: u64,
}

impl<T: Record + Ord> RunsMerger<T> {
    pub(crate) fn new(runs: Vec<SortedRun>) -> Result<Self, EmError> {
        let len = runs.iter().map(|r| r.len).sum();
        let mut merger = Self {
            readers: runs.into_iter().map(RunReader::new).collect(),
            heap: BinaryHeap::new(),
            len,
        };
        merger.prime()?;
        Ok(merger)
    }

    fn prime(&mut self) -> Result<(), EmError> {
        self.heap.clear();
        for (run, reader) in self.readers.iter_mut().enumerate() {
            if let Some(record) = reader.next()? {
                self.heap.push(HeapEntry { record, run });
            }
        }
        Ok(())
    }

    /// Total number of records across all runs.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the smallest unconsumed record.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.heap.peek().map(|entry| entry.record)
    }

    /// Consumes the smallest record and refills from its run.
    ///
    /// # Errors
    /// Propagates read failures from the spill files.
    pub fn advance(&mut self) -> Result<(), EmError> {
        if let Some(entry) = self.heap.pop() {
            if let Some(record) = self.readers[entry.run].next()? {
                self.heap.push(HeapEntry { record, run: entry.run });
            }
        }
        Ok(())
    }

    /// Restarts the merged stream from the first record.
    ///
    /// # Errors
    /// Propagates seek/read failures from the spill files.
    pub fn rewind(&mut self) -> Result<(), EmError> {
        for reader in &mut self.readers {
            reader.reset()?;
        }
        self.prime()
    }
}

/// Background writer turning pre-sorted batches into spilled runs.
///
/// Worker threads sort locally, then hand the batch over a bounded channel;
/// the writer thread owns all file I/O. [`RunsCreator::finish`] joins the
/// writer and returns the merger over everything submitted. I/O failures are
/// reported there.
pub struct RunsCreator<T: Record> {
    tx: Option<SyncSender<Vec<T>>>,
    handle: Option<JoinHandle<io::Result<Vec<SortedRun>>>>,
}

impl<T: Record + Ord + Send + 'static> RunsCreator<T> {
    /// Spawns the background writer.
    ///
    /// # Errors
    /// Fails when the OS refuses to spawn the thread.
    pub fn new() -> Result<Self, EmError> {
        let (tx, rx): (SyncSender<Vec<T>>, Receiver<Vec<T>>) = sync_channel(WRITER_QUEUE_DEPTH);
        let handle = std::thread::Builder::new()
            .name("rewire-runs-writer".into())
            .spawn(move || {
                let mut runs = Vec::new();
                while let Ok(batch) = rx.recv() {
                    runs.push(spill_run(&batch)?);
                }
                Ok(runs)
            })
            .map_err(|source| EmError::Io { source })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Creates a submission buffer feeding this creator.
    ///
    /// `capacity` is the record count at which a full buffer is sorted and
    /// shipped automatically.
    #[must_use]
    pub fn buffer(&self, capacity: usize) -> RunsBuffer<T> {
        RunsBuffer {
            tx: self.tx.as_ref().expect("creator is live until finish").clone(),
            records: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Joins the writer and merges all submitted runs.
    ///
    /// # Errors
    /// Surfaces any spill failure encountered by the background writer.
    pub fn finish(mut self) -> Result<RunsMerger<T>, EmError> {
        drop(self.tx.take());
        let handle = self.handle.take().expect("finish is called once");
        let runs = handle.join().map_err(|_| EmError::WorkerLost)??;
        RunsMerger::new(runs)
    }
}

impl<T: Record> Drop for RunsCreator<T> {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Per-worker staging buffer for a [`RunsCreator`].
pub struct RunsBuffer<T: Record> {
    tx: SyncSender<Vec<T>>,
    records: Vec<T>,
    capacity: usize,
}

impl<T: Record + Ord> RunsBuffer<T> {
    /// Stages a record, shipping the buffer when it reaches capacity.
    ///
    /// # Errors
    /// Fails when the background writer has terminated.
    pub fn push(&mut self, record: T) -> Result<(), EmError> {
        self.records.push(record);
        if self.records.len() >= self.capacity {
            self.submit()?;
        }
        Ok(())
    }

    /// Sorts and ships the staged records as one run.
    ///
    /// # Errors
    /// Fails when the background writer has terminated.
    pub fn submit(&mut self) -> Result<(), EmError> {
        if self.records.is_empty() {
            return Ok(());
        }
        self.records.sort_unstable();
        let batch = std::mem::take(&mut self.records);
        self.tx.send(batch).map_err(|_| EmError::WorkerLost)
    }
}

#[cfg(test)]
mod tests {
    use super::{RunsCreator, RunsMerger, spill_run};

    #[test]
    fn merger_interleaves_runs_in_order() {
        let a = spill_run(&[1u64, 4, 9]).expect("spill");
        let b = spill_run(&[2u64, 3, 10]).expect("spill");
        let mut merger = RunsMerger::new(vec![a, b]).expect("merge");
        let mut out = Vec::new();
        while let Some(x) = merger.peek() {
            out.push(x);
            merger.advance().expect("advance");
        }
        assert_eq!(out, vec![1, 2, 3, 4, 9, 10]);

        merger.rewind().expect("rewind");
        assert_eq!(merger.peek(), Some(1));
        assert_eq!(merger.len(), 6);
    }

    #[test]
    fn creator_collects_runs_from_buffers() {
        let creator = RunsCreator::<u64>::new().expect("spawn");
        let mut buf = creator.buffer(2);
        for x in [5u64, 1, 3, 2, 4] {
            buf.push(x).expect("push");
        }
        buf.submit().expect("tail submit");
        drop(buf);
        let mut merger = creator.finish().expect("finish");
        let mut out = Vec::new();
        while let Some(x) = merger.peek() {
            out.push(x);
            merger.advance().expect("advance");
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_creator_yields_empty_merger() {
        let creator = RunsCreator::<u64>::new().expect("spawn");
        let merger = creator.finish().expect("finish");
        assert!(merger.is_empty());
        assert_eq!(merger.peek(), None);
    }
}
