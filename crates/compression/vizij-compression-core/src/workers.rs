//! Worker pool for asynchronous builds.
//!
//! Closures are sent over a crossbeam channel and run on named threads. Dropping
//! the pool closes the channel and joins the threads after queued work drains.

use std::thread;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Workers {
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Workers {
    /// Spawn `num_threads` threads named `<name>-<n>`.
    pub fn new(num_threads: usize, name: &str) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(num_threads);

        for worker_id in 0..num_threads {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .spawn(move || {
                    debug!("Worker {} started", worker_id);
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                    debug!("Worker {} stopped", worker_id);
                })?;
            handles.push(handle);
        }

        debug!("Workers initialized: {} threads", num_threads);
        Ok(Self {
            sender: Some(tx),
            handles,
        })
    }

    /// Run `f` on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.send(Box::new(f)) {
                    error!("Failed to enqueue job: {}", e);
                }
            }
            None => error!("Failed to enqueue job: worker pool is shut down"),
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
    }
}
