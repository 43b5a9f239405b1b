//! Prefetching wrapper that overlaps stream reads with consumer work.
//!
//! A producer thread fills a small ring of recycled buffers while the
//! consumer drains them through the usual `peek`/`advance` surface. The ring
//! is a pair of bounded channels: emptied buffers travel back to the producer
//! on the free list, filled ones to the consumer. Producer-side failures are
//! delivered in-band and surface on the consumer's next `advance`.

use std::{
    sync::mpsc::{Receiver, SyncSender, sync_channel},
    thread::Scope,
};

/// Minimum number of ring buffers; fewer would serialise the two sides.
const MIN_BUFFERS: usize = 3;

/// A prefetched stream of records of type `T` with producer error type `E`.
pub struct AsyncStream<T, E> {
    filled: Receiver<Result<Vec<T>, E>>,
    free: SyncSender<Vec<T>>,
    current: Vec<T>,
    pos: usize,
    done: bool,
}

impl<T, E> AsyncStream<T, E>
where
    T: Copy + Send,
    E: Send,
{
    /// Spawns the producer inside `scope` and returns the consumer handle.
    ///
    /// `fill` appends records to the supplied buffer until it reaches its
    /// capacity (`buffer_len`), returning `Ok(false)` once the source is
    /// exhausted. The producer exits as soon as the consumer hangs up.
    ///
    /// # Errors
    /// Returns the first producer error if it occurs before any buffer is
    /// delivered.
    pub fn spawn<'scope, 'env, F>(
        scope: &'scope Scope<'scope, 'env>,
        mut fill: F,
        buffers: usize,
        buffer_len: usize,
    ) -> Result<Self, E>
    where
        T: 'scope,
        E: 'scope,
        F: FnMut(&mut Vec<T>) -> Result<bool, E> + Send + 'scope,
    {
        let buffers = buffers.max(MIN_BUFFERS);
        let (free_tx, free_rx) = sync_channel::<Vec<T>>(buffers);
        let (filled_tx, filled_rx) = sync_channel::<Result<Vec<T>, E>>(buffers);

        for _ in 0..buffers {
            free_tx
                .send(Vec::with_capacity(buffer_len.max(1)))
                .expect("free list has room for every seeded buffer");
        }

        scope.spawn(move || {
            while let Ok(mut buf) = free_rx.recv() {
                buf.clear();
                match fill(&mut buf) {
                    Ok(more) => {
                        if !buf.is_empty() && filled_tx.send(Ok(buf)).is_err() {
                            return;
                        }
                        if !more {
                            return;
                        }
                    }
                    Err(error) => {
                        let _ = filled_tx.send(Err(error));
                        return;
                    }
                }
            }
        });

        let mut stream = Self {
            filled: filled_rx,
            free: free_tx,
            current: Vec::new(),
            pos: 0,
            done: false,
        };
        stream.fetch()?;
        Ok(stream)
    }

    fn fetch(&mut self) -> Result<(), E> {
        let used = std::mem::take(&mut self.current);
        self.pos = 0;
        if used.capacity() > 0 {
            // Recycle; if the producer is gone the buffer is simply dropped.
            let _ = self.free.send(used);
        }
        match self.filled.recv() {
            Ok(Ok(buf)) => self.current = buf,
            Ok(Err(error)) => {
                self.done = true;
                return Err(error);
            }
            Err(_) => self.done = true,
        }
        Ok(())
    }

    /// Returns the record under the cursor, or `None` at end of stream.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.current.get(self.pos).copied()
    }

    /// Moves the cursor forward, blocking on the producer when the current
    /// buffer is exhausted.
    ///
    /// # Errors
    /// Surfaces a pending producer failure.
    pub fn advance(&mut self) -> Result<(), E> {
        self.pos += 1;
        if self.pos >= self.current.len() && !self.done {
            self.fetch()?;
        }
        Ok(())
    }
}
