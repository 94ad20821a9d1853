//! Iterative non-rigid alignment of an image stack.
//!
//! An [`Alignment`] is created from a [`Stack`] and an [`AlignConfig`], then
//! either run to completion on the calling thread with [`Alignment::run`] or
//! moved onto a worker thread with [`Alignment::start`]. Either way the
//! preparation phase (normalization, reference, worker pool) happens on the
//! caller's thread, so configuration errors are returned before any work is
//! spawned.
//!
//! While a run is in progress, a [`Monitor`] gives copies of the current
//! fields and aligned images, the error series, and lets another thread
//! change the step size and regularizer sigma or cancel the run.

mod driver;
mod monitor;
mod result;
mod step;


use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use monitor::{Monitor, Progress};
pub use result::{AlignmentResult, StopCriteria};

use crate::config::AlignConfig;
use crate::error::{Error, Result};
use crate::image::Stack;
use crate::reference::Reference;
use driver::Driver;
use monitor::Shared;

const WORKER_THREAD_NAME: &str = "nonrigid-align";

/// A configured, not yet started alignment run.
#[derive(Debug)]
pub struct Alignment {
    stack: Stack,
    config: AlignConfig,
    shared: Arc<Shared>,
}

impl Alignment {
    /// Validates `config` against `stack`.
    ///
    /// Fails with [`Error::Config`] on bad parameters, a reference index out
    /// of range, a single image aligned to itself, or initial fields that do
    /// not match the stack, and with [`Error::Shape`] when an external
    /// reference differs in size from the images.
    pub fn new(stack: Stack, config: AlignConfig) -> Result<Self> {
        config.validate()?;

        let count = stack.len();
        let shape = stack.image_shape();
        match &config.reference {
            Reference::Index(index) if *index >= count => {
                return Err(Error::config(format!(
                    "reference index {} out of range for {} images",
                    index, count
                )));
            }
            Reference::External(image) if image.shape() != shape => {
                return Err(Error::shape(format!(
                    "external reference is {}x{}, images are {}x{}",
                    image.height(),
                    image.width(),
                    shape.0,
                    shape.1
                )));
            }
            Reference::External(_) => {}
            _ if count == 1 => {
                return Err(Error::config(
                    "a single image cannot be aligned to a reference derived from itself",
                ));
            }
            _ => {}
        }
        config.initial_field.validate(count, shape)?;

        let shared = Arc::new(Shared::new(config.step, config.regularizer_sigma));
        Ok(Self {
            stack,
            config,
            shared,
        })
    }

    /// Monitor for this run. Can be taken before the run starts.
    pub fn monitor(&self) -> Monitor {
        Monitor::new(Arc::clone(&self.shared))
    }

    /// Prepares on the calling thread, then iterates on a named worker thread.
    pub fn start(self) -> Result<AlignmentHandle> {
        let monitor = self.monitor();
        let (driver, guard) = self.prepare()?;

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                driver.run()
            })
            .map_err(|err| Error::Worker(format!("failed to spawn worker thread: {}", err)))?;

        Ok(AlignmentHandle { monitor, thread })
    }

    /// Prepares and iterates on the calling thread, blocking until done.
    pub fn run(self) -> Result<AlignmentResult> {
        let (driver, _guard) = self.prepare()?;
        Ok(driver.run())
    }

    fn prepare(self) -> Result<(Driver, FinishGuard)> {
        let guard = FinishGuard {
            shared: Arc::clone(&self.shared),
        };
        let driver = Driver::prepare(self.stack.into_images(), self.config, self.shared)?;
        guard.shared.prepared.set();
        Ok((driver, guard))
    }
}

/// Releases both latches however the run ends, so waiters never hang.
struct FinishGuard {
    shared: Arc<Shared>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.shared.prepared.set();
        self.shared.finished.set();
    }
}

/// A run in progress on its worker thread.
#[derive(Debug)]
pub struct AlignmentHandle {
    monitor: Monitor,
    thread: JoinHandle<AlignmentResult>,
}

impl AlignmentHandle {
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn cancel(&self) {
        self.monitor.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Returns `true` if the run finished within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.monitor.wait_finished_timeout(timeout)
    }

    /// Waits for the worker and returns its result. A panic on the worker
    /// becomes [`Error::Worker`].
    pub fn join(self) -> Result<AlignmentResult> {
        self.thread.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Alignment worker panicked: {}", message);
            Error::Worker(message)
        })
    }
}
