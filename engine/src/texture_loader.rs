//! Background texture loading.
//!
//! Requests go to one worker thread over a channel; the worker performs
//! the host's blocking load and posts the result to a completion channel.
//! Results only become visible on the main thread, in
//! `process_completed_loads`, which marks the texture ready and runs the
//! callbacks registered for it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::error::{EngineError, Result};
use crate::host::Host;

/// Runs on the main thread with the load outcome.
pub type TextureCallback = Box<dyn FnOnce(bool) + Send + 'static>;

enum Job {
    Load(String),
    Stop,
}

struct LoadResult {
    path: String,
    success: bool,
}

/// Loads queued but not yet posted to the completion channel.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn reset(&self) {
        *self.count.lock() = 0;
        self.idle.notify_all();
    }
}

struct Worker {
    host: Arc<dyn Host>,
    jobs: Receiver<Job>,
    completed: Sender<LoadResult>,
    in_flight: Arc<InFlight>,
}

impl Worker {
    fn run(self) {
        for job in self.jobs.iter() {
            let path = match job {
                Job::Load(path) => path,
                Job::Stop => break,
            };
            let started = Instant::now();
            let success = self.host.load_texture(&path);
            trace!(
                "texture loader: {} {} in {:?}",
                path,
                if success { "loaded" } else { "failed" },
                started.elapsed()
            );
            if self.completed.send(LoadResult { path, success }).is_err() {
                break;
            }
            self.in_flight.finish();
        }
        debug!("texture loader: worker exiting");
    }
}

#[derive(Default)]
struct LoaderState {
    cache: HashSet<String>,
    pending: HashSet<String>,
    callbacks: HashMap<String, Vec<TextureCallback>>,
}

pub struct TextureLoader {
    host: Arc<dyn Host>,
    jobs: (Sender<Job>, Receiver<Job>),
    completed: (Sender<LoadResult>, Receiver<LoadResult>),
    state: Mutex<LoaderState>,
    in_flight: Arc<InFlight>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TextureLoader {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            jobs: unbounded(),
            completed: unbounded(),
            state: Mutex::new(LoaderState::default()),
            in_flight: Arc::new(InFlight::default()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("texture loader: already running");
            return Ok(());
        }
        let worker = Worker {
            host: Arc::clone(&self.host),
            jobs: self.jobs.1.clone(),
            completed: self.completed.0.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        let handle = thread::Builder::new()
            .name("texture-loader".to_string())
            .spawn(move || worker.run())
            .map_err(|e| EngineError::Host(format!("texture loader thread spawn: {e}")))?;
        *self.worker.lock() = Some(handle);
        info!("texture loader: worker started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the worker. Queued requests that never ran are dropped along
    /// with their callbacks.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.jobs.0.send(Job::Stop).is_err() {
            warn!("texture loader: job channel closed before shutdown");
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("texture loader: worker panicked");
            }
        }
        let dropped = self.jobs.1.try_iter().count();
        let mut state = self.state.lock();
        state.pending.clear();
        state.callbacks.clear();
        self.in_flight.reset();
        info!("texture loader: shut down ({} queued requests dropped)", dropped);
    }

    /// Queue a load. Returns true when the texture is already ready, in
    /// which case `callback` runs immediately.
    pub fn request_texture(&self, path: &str, callback: Option<TextureCallback>) -> bool {
        let mut state = self.state.lock();
        if state.cache.contains(path) {
            drop(state);
            if let Some(callback) = callback {
                callback(true);
            }
            return true;
        }
        if let Some(callback) = callback {
            state.callbacks.entry(path.to_string()).or_default().push(callback);
        }
        if !state.pending.insert(path.to_string()) {
            return false;
        }
        drop(state);

        self.in_flight.add();
        if self.jobs.0.send(Job::Load(path.to_string())).is_err() {
            error!("texture loader: job channel closed, dropping {}", path);
            self.state.lock().pending.remove(path);
            self.in_flight.finish();
            return false;
        }
        trace!("texture loader: queued {}", path);
        false
    }

    pub fn preload_textures<S: AsRef<str>>(&self, paths: &[S]) {
        for path in paths {
            self.request_texture(path.as_ref(), None);
        }
    }

    pub fn is_texture_ready(&self, path: &str) -> bool {
        self.state.lock().cache.contains(path)
    }

    /// Queued, loading, or loaded but not yet drained.
    pub fn is_texture_loading(&self, path: &str) -> bool {
        self.state.lock().pending.contains(path)
    }

    /// Main thread: publish finished loads and run their callbacks.
    pub fn process_completed_loads(&self) -> usize {
        let results: Vec<LoadResult> = self.completed.1.try_iter().collect();
        for result in &results {
            let callbacks = {
                let mut state = self.state.lock();
                state.pending.remove(&result.path);
                if result.success {
                    state.cache.insert(result.path.clone());
                }
                state.callbacks.remove(&result.path).unwrap_or_default()
            };
            if !result.success {
                error!("texture loader: failed to load {}", result.path);
            }
            for callback in callbacks {
                callback(result.success);
            }
        }
        results.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Finished loads waiting for `process_completed_loads`.
    pub fn completed_count(&self) -> usize {
        self.completed.1.len()
    }

    pub fn cache_size(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        debug!("texture loader: clearing {} cached textures", state.cache.len());
        state.cache.clear();
    }

    /// Block until the worker has finished every queued load or `timeout`
    /// passes. Returns whether the worker went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if !self.is_running() {
            return *self.in_flight.count.lock() == 0;
        }
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            if self.in_flight.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

impl Drop for TextureLoader {
    fn drop(&mut self) {
        if self.is_running() && self.jobs.0.send(Job::Stop).is_err() {
            debug!("texture loader: worker already gone at drop");
        }
    }
}
