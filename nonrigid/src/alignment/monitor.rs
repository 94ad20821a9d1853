//! Live view into a running alignment.
//!
//! The worker publishes each image's field and aligned image under one
//! mutex, so a snapshot never pairs a new field with an old image. Step size
//! and regularizer sigma are atomic cells the worker reads once per
//! per-image update.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{AtomicF64, Latch};
use parking_lot::Mutex;

use crate::alignment::result::StopCriteria;
use crate::error::{Error, Result};
use crate::image::{Field, Image};

/// State visible to monitors, written by the worker.
#[derive(Debug)]
pub(crate) struct State {
    pub aligned: Vec<Image>,
    pub fields: Vec<Field>,
    pub reference: Option<Image>,
    pub iteration: usize,
    pub error: f64,
    pub error_delta: f64,
    pub error_series: Vec<f64>,
    pub error_delta_series: Vec<f64>,
    pub field_magnitude_series: Vec<Vec<f64>>,
    pub criteria: StopCriteria,
}

impl State {
    fn new() -> Self {
        Self {
            aligned: Vec::new(),
            fields: Vec::new(),
            reference: None,
            iteration: 0,
            error: f64::NAN,
            error_delta: f64::NAN,
            error_series: Vec::new(),
            error_delta_series: Vec::new(),
            field_magnitude_series: Vec::new(),
            criteria: StopCriteria::default(),
        }
    }
}

/// Everything shared between the worker, the handle and monitors.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: Mutex<State>,
    pub step: AtomicF64,
    pub regularizer_sigma: AtomicF64,
    pub cancel: AtomicBool,
    pub prepared: Latch,
    pub finished: Latch,
}

impl Shared {
    pub fn new(step: f64, regularizer_sigma: f64) -> Self {
        Self {
            state: Mutex::new(State::new()),
            step: AtomicF64::new(step),
            regularizer_sigma: AtomicF64::new(regularizer_sigma),
            cancel: AtomicBool::new(false),
            prepared: Latch::new(),
            finished: Latch::new(),
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Error summary of the latest completed iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Completed outer iterations.
    pub iteration: usize,
    /// Aggregated error; NaN before the first iteration.
    pub error: f64,
    /// Previous minus current aggregated error; NaN until two iterations ran.
    pub error_delta: f64,
    pub error_series: Vec<f64>,
    pub error_delta_series: Vec<f64>,
    pub criteria: StopCriteria,
}

/// Cloneable handle for polling and steering a run from another thread.
///
/// All snapshots are copies; nothing here blocks the worker for longer than
/// a clone.
#[derive(Debug, Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
}

impl Monitor {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Current normalized aligned image `index`, or `None` before prepare
    /// or when out of range.
    pub fn aligned_image(&self, index: usize) -> Option<Image> {
        self.shared.state.lock().aligned.get(index).cloned()
    }

    pub fn field(&self, index: usize) -> Option<Field> {
        self.shared.state.lock().fields.get(index).cloned()
    }

    /// Field and aligned image of `index` from the same update.
    pub fn snapshot(&self, index: usize) -> Option<(Field, Image)> {
        let state = self.shared.state.lock();
        let field = state.fields.get(index)?.clone();
        let aligned = state.aligned.get(index)?.clone();
        Some((field, aligned))
    }

    /// Reference in use (normalized units).
    pub fn reference(&self) -> Option<Image> {
        self.shared.state.lock().reference.clone()
    }

    pub fn progress(&self) -> Progress {
        let state = self.shared.state.lock();
        Progress {
            iteration: state.iteration,
            error: state.error,
            error_delta: state.error_delta,
            error_series: state.error_series.clone(),
            error_delta_series: state.error_delta_series.clone(),
            criteria: state.criteria,
        }
    }

    /// Completed iterations, without copying the series.
    pub fn iteration(&self) -> usize {
        self.shared.state.lock().iteration
    }

    pub fn field_magnitude_series(&self, index: usize) -> Option<Vec<f64>> {
        self.shared
            .state
            .lock()
            .field_magnitude_series
            .get(index)
            .cloned()
    }

    /// Changes the step size for every update that starts after this call.
    pub fn set_step(&self, step: f64) -> Result<()> {
        if !(step.is_finite() && step > 0.0) {
            return Err(Error::config(format!(
                "step must be positive and finite, got {}",
                step
            )));
        }
        self.shared.step.store(step);
        Ok(())
    }

    pub fn step(&self) -> f64 {
        self.shared.step.load()
    }

    /// Changes the regularizer sigma for every update that starts after this call.
    pub fn set_regularizer_sigma(&self, sigma: f64) -> Result<()> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(Error::config(format!(
                "regularizer sigma must be finite and >= 0, got {}",
                sigma
            )));
        }
        self.shared.regularizer_sigma.store(sigma);
        Ok(())
    }

    pub fn regularizer_sigma(&self) -> f64 {
        self.shared.regularizer_sigma.load()
    }

    /// Asks the worker to stop at the start of its next iteration.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
    }

    /// Cleared again by the worker once it leaves the loop.
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.is_cancel_requested()
    }

    /// Blocks until preparation is over. Also released when preparation
    /// fails, in which case `is_finished` is already true.
    pub fn wait_prepared(&self) {
        self.shared.prepared.wait();
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.prepared.is_set()
    }

    pub fn wait_finished(&self) {
        self.shared.finished.wait();
    }

    /// Returns `true` if the run finished within `timeout`.
    pub fn wait_finished_timeout(&self, timeout: Duration) -> bool {
        self.shared.finished.wait_timeout(timeout)
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.is_set()
    }
}
