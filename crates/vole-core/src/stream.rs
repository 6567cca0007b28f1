// Stream — Ordered execution queue for primitives
//
// A stream runs primitives in submission order. Two kinds exist:
//
//   Eager — `submit` runs each primitive on the caller's thread before
//           returning. Failures are still reported by `wait`.
//
//   Lazy  — `submit` only enqueues. A dedicated worker thread drains a
//           channel in FIFO order, so `submit` returns immediately and
//           `wait` blocks until the worker has caught up.
//
// `wait` is the single synchronization point. It returns the first failure
// recorded since the previous `wait`; once a primitive fails, the ones
// queued after it are skipped (they would read a half-written output)
// but still counted as completed so `wait` can return.
//
// Parallelism inside a primitive (rayon) is the primitive's own business;
// the stream never runs two of its primitives at the same time.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::primitive::Primitive;

/// How a stream executes submitted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamKind {
    /// Execute at submission on the caller's thread.
    Eager,
    /// Queue for a background worker; execute in FIFO order.
    #[default]
    Lazy,
}

#[derive(Default)]
struct QueueState {
    submitted: u64,
    completed: u64,
    first_error: Option<Error>,
}

/// Shared between the stream handle and its worker.
#[derive(Default)]
struct Tracker {
    state: Mutex<QueueState>,
    done: Condvar,
}

impl Tracker {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, primitive: &Primitive) {
        let skip = self.lock().first_error.is_some();
        let outcome = if skip {
            log::debug!("skipping {} after earlier failure", primitive.name());
            Ok(())
        } else {
            execute_guarded(primitive)
        };

        let mut state = self.lock();
        state.completed += 1;
        if let Err(e) = outcome {
            log::error!("{}", e);
            if state.first_error.is_none() {
                state.first_error = Some(e);
            }
        }
        drop(state);
        self.done.notify_all();
    }
}

fn execute_guarded(primitive: &Primitive) -> Result<()> {
    let name = primitive.name().to_string();
    match panic::catch_unwind(AssertUnwindSafe(|| primitive.execute())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::ExecutionFailed {
            primitive: name,
            reason: e.to_string(),
        }),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            Err(Error::ExecutionFailed {
                primitive: name,
                reason,
            })
        }
    }
}

/// An ordered execution queue.
pub struct Stream {
    kind: StreamKind,
    tracker: Arc<Tracker>,
    queue: Option<mpsc::Sender<Primitive>>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// Create a stream. Lazy streams start their worker thread here.
    pub fn new(kind: StreamKind) -> Result<Self> {
        let tracker = Arc::new(Tracker::default());
        let (queue, worker) = match kind {
            StreamKind::Eager => (None, None),
            StreamKind::Lazy => {
                let (tx, rx) = mpsc::channel::<Primitive>();
                let worker_tracker = Arc::clone(&tracker);
                let handle = thread::Builder::new()
                    .name("vole-stream".into())
                    .spawn(move || {
                        for primitive in rx {
                            worker_tracker.run(&primitive);
                        }
                    })
                    .map_err(|e| Error::msg(format!("failed to start stream worker: {}", e)))?;
                (Some(tx), Some(handle))
            }
        };
        Ok(Stream {
            kind,
            tracker,
            queue,
            worker,
        })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Submit primitives in order. Returns `self` so calls chain into `wait`.
    pub fn submit<I>(&self, primitives: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Primitive>,
    {
        for primitive in primitives {
            log::debug!(
                "submit {} on {} ({:?} stream)",
                primitive.name(),
                primitive.engine(),
                self.kind
            );
            self.tracker.lock().submitted += 1;
            match &self.queue {
                None => self.tracker.run(&primitive),
                Some(tx) => {
                    if tx.send(primitive).is_err() {
                        self.tracker.lock().submitted -= 1;
                        return Err(Error::msg("stream worker has stopped"));
                    }
                }
            }
        }
        Ok(self)
    }

    /// Block until everything submitted so far has completed.
    ///
    /// Returns the first failure since the previous `wait`, if any.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.tracker.lock();
        while state.completed < state.submitted {
            state = self
                .tracker
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match state.first_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of submitted primitives that have not completed yet.
    pub fn pending(&self) -> usize {
        let state = self.tracker.lock();
        (state.submitted - state.completed) as usize
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the queue drains.
        self.queue.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stream(kind={:?}, pending={})", self.kind, self.pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::memory::Memory;
    use crate::primitive::Execute;
    use std::time::Duration;

    #[derive(Debug)]
    struct Record {
        id: usize,
        log: Arc<Mutex<Vec<usize>>>,
        fail: bool,
        delay_ms: u64,
        engine: Engine,
    }

    impl Record {
        fn primitive(id: usize, log: &Arc<Mutex<Vec<usize>>>, fail: bool, delay_ms: u64) -> Primitive {
            Primitive::new(Record {
                id,
                log: Arc::clone(log),
                fail,
                delay_ms,
                engine: Engine::cpu(),
            })
        }
    }

    impl Execute for Record {
        fn name(&self) -> &str {
            "record"
        }

        fn engine(&self) -> &Engine {
            &self.engine
        }

        fn outputs(&self) -> Vec<&Memory> {
            Vec::new()
        }

        fn execute(&self) -> Result<()> {
            thread::sleep(Duration::from_millis(self.delay_ms));
            if self.fail {
                return Err(Error::msg(format!("record {} failed", self.id)));
            }
            self.log.lock().unwrap().push(self.id);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Panics(Engine);

    impl Execute for Panics {
        fn name(&self) -> &str {
            "panics"
        }
        fn engine(&self) -> &Engine {
            &self.0
        }
        fn outputs(&self) -> Vec<&Memory> {
            Vec::new()
        }
        fn execute(&self) -> Result<()> {
            panic!("kernel exploded")
        }
    }

    #[test]
    fn test_lazy_fifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stream = Stream::new(StreamKind::Lazy).unwrap();
        // Earlier primitives are slower; order must still hold.
        let prims = (0..5).map(|i| Record::primitive(i, &log, false, (5 - i) as u64));
        stream.submit(prims).unwrap().wait().unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_eager_runs_on_submit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stream = Stream::new(StreamKind::Eager).unwrap();
        stream.submit(vec![Record::primitive(7, &log, false, 0)]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![7]);
        stream.wait().unwrap();
    }

    #[test]
    fn test_first_failure_surfaces_and_rest_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stream = Stream::new(StreamKind::Lazy).unwrap();
        let prims = vec![
            Record::primitive(0, &log, false, 0),
            Record::primitive(1, &log, true, 0),
            Record::primitive(2, &log, true, 0),
            Record::primitive(3, &log, false, 0),
        ];
        let err = stream.submit(prims).unwrap().wait().unwrap_err();
        assert!(err.to_string().contains("record 1 failed"));
        assert_eq!(*log.lock().unwrap(), vec![0]);

        // The failure is reported once; the stream keeps working.
        stream
            .submit(vec![Record::primitive(4, &log, false, 0)])
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 4]);
    }

    #[test]
    fn test_panic_becomes_error() {
        let stream = Stream::new(StreamKind::Lazy).unwrap();
        let err = stream
            .submit(vec![Primitive::new(Panics(Engine::cpu()))])
            .unwrap()
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed { .. }));
        assert!(err.to_string().contains("kernel exploded"));
    }

    #[test]
    fn test_wait_on_empty_stream() {
        let stream = Stream::new(StreamKind::default()).unwrap();
        assert_eq!(stream.kind(), StreamKind::Lazy);
        stream.wait().unwrap();
    }
}
