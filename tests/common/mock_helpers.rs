//! Recording workers for lifecycle tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rtt_plot::error::Result;
use rtt_plot::shutdown::ShutdownFlag;
use rtt_plot::worker::{LoopExit, Role, Worker};

/// Ordered log of lifecycle events shared between threads
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Worker that idles until interrupted and records its lifecycle
pub struct RecordingWorker {
    pub role: Role,
    pub journal: Journal,
}

impl RecordingWorker {
    pub fn new(role: Role, journal: &Journal) -> Self {
        Self {
            role,
            journal: journal.clone(),
        }
    }
}

impl Worker for RecordingWorker {
    fn role(&self) -> Role {
        self.role
    }

    fn open_transmit(&mut self) -> Result<()> {
        self.journal.push(format!("{} open_transmit", self.role));
        Ok(())
    }

    fn run(&mut self, shutdown: &ShutdownFlag) -> Result<LoopExit> {
        self.journal.push(format!("{} run", self.role));
        while !shutdown.sleep(std::time::Duration::from_millis(10)) {}
        Ok(LoopExit::Interrupted)
    }

    fn close(&mut self) {
        self.journal.push(format!("{} close", self.role));
    }
}

/// Wraps a real worker and counts its closes
pub struct Counted<W: Worker> {
    inner: W,
    closes: Arc<AtomicUsize>,
}

impl<W: Worker> Counted<W> {
    pub fn new(inner: W, closes: &Arc<AtomicUsize>) -> Self {
        Self {
            inner,
            closes: Arc::clone(closes),
        }
    }
}

impl<W: Worker> Worker for Counted<W> {
    fn role(&self) -> Role {
        self.inner.role()
    }

    fn open_transmit(&mut self) -> Result<()> {
        self.inner.open_transmit()
    }

    fn run(&mut self, shutdown: &ShutdownFlag) -> Result<LoopExit> {
        self.inner.run(shutdown)
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}
