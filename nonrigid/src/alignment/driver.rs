//! Outer iteration loop: reference refresh, per-image fan-out, error
//! bookkeeping and the stop test.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{FanOut, worker_count};

use crate::alignment::monitor::Shared;
use crate::alignment::result::{AlignmentResult, StopCriteria};
use crate::alignment::step::{StepInput, StepShared, update_image};
use crate::config::AlignConfig;
use crate::error::Result;
use crate::gradient::gradient;
use crate::image::{Field, Image};
use crate::normalize::{normalize, normalize_within};
use crate::reference::{PixelStatistic, Reference, statistic_row};
use crate::warp::warp_image_with_shift;

const POOL_THREAD_NAME: &str = "nonrigid-fanout";

/// Owns the working copies of the run. Monitors see published copies in
/// [`Shared`].
pub(crate) struct Driver {
    shared: Arc<Shared>,
    config: AlignConfig,
    fan_out: FanOut,
    originals: Vec<Image>,
    normalized: Vec<Image>,
    aligned: Vec<Image>,
    fields: Vec<Field>,
    reference: Image,
    reference_gradient: Field,
    iteration: usize,
    prev_error: f64,
    numeric_warnings: usize,
}

impl Driver {
    /// Normalizes the stack, applies the initial field, builds the reference
    /// and the worker pool. Runs on the caller's thread.
    pub fn prepare(originals: Vec<Image>, config: AlignConfig, shared: Arc<Shared>) -> Result<Self> {
        let count = originals.len();
        let shape = originals[0].shape();

        let workers = if count == 1 {
            1
        } else {
            worker_count(config.threads, count)
        };
        let fan_out = FanOut::new(workers, POOL_THREAD_NAME)?;

        let fields = config.initial_field.resolve(count, shape)?;
        // Percentiles are taken where the external reference is defined.
        let domain = match &config.reference {
            Reference::External(image) => Some(image),
            _ => None,
        };
        let normalized = fan_out
            .map(count, |j| match domain {
                Some(domain) => normalize_within(&originals[j], config.percentile, domain),
                None => normalize(&originals[j], config.percentile),
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        let aligned = fan_out.map(count, |j| {
            warp_image_with_shift(&normalized[j], &fields[j], 0.0, config.intensity_shift)
        });

        let reference = match &config.reference {
            Reference::Mean => pixel_statistic(&fan_out, &aligned, PixelStatistic::Mean),
            Reference::Median => pixel_statistic(&fan_out, &aligned, PixelStatistic::Median),
            Reference::Index(index) => normalized[*index].clone(),
            Reference::External(image) => normalize(image, config.percentile)?,
        };
        let reference_gradient = gradient(&reference, config.gradient_sigma);

        {
            let mut state = shared.state.lock();
            state.aligned = aligned.clone();
            state.fields = fields.clone();
            state.reference = Some(reference.clone());
            state.field_magnitude_series = vec![Vec::new(); count];
        }

        tracing::info!(
            "Prepared alignment of {} images ({}x{}), reference {:?}, {} worker(s)",
            count,
            shape.0,
            shape.1,
            ReferenceLabel(&config.reference),
            fan_out.workers()
        );

        Ok(Self {
            shared,
            config,
            fan_out,
            originals,
            normalized,
            aligned,
            fields,
            reference,
            reference_gradient,
            iteration: 0,
            prev_error: f64::NAN,
            numeric_warnings: 0,
        })
    }

    /// Iterates until a stop condition holds or cancellation is requested,
    /// then produces the final outputs.
    pub fn run(mut self) -> AlignmentResult {
        let mut cancelled = false;
        let mut criteria = StopCriteria::default();

        loop {
            if self.shared.is_cancel_requested() {
                tracing::info!("Alignment cancelled after {} iterations", self.iteration);
                cancelled = true;
                break;
            }
            criteria = self.iterate();
            if criteria.any() {
                break;
            }
        }

        self.shared.cancel.store(false, Ordering::Release);
        self.finish(cancelled, criteria)
    }

    /// One outer iteration over every image.
    fn iterate(&mut self) -> StopCriteria {
        if let Some(statistic) = self.config.reference.statistic() {
            self.reference = pixel_statistic(&self.fan_out, &self.aligned, statistic);
            self.reference_gradient = gradient(&self.reference, self.config.gradient_sigma);
            self.shared.state.lock().reference = Some(self.reference.clone());
        }

        let count = self.aligned.len();
        let gradient_sigma = self.config.gradient_sigma;
        let gradients = self
            .fan_out
            .map(count, |j| gradient(&self.aligned[j], gradient_sigma));

        let step_shared = StepShared {
            reference: &self.reference,
            reference_gradient: &self.reference_gradient,
            increment_clip: self.config.increment_clip,
            regularizer: &self.config.regularizer,
            intensity_shift: self.config.intensity_shift,
        };
        let shared = &self.shared;
        let outputs = self.fan_out.map(count, |j| {
            let step = shared.step.load();
            let sigma = shared.regularizer_sigma.load();
            let output = update_image(
                &StepInput {
                    source: &self.normalized[j],
                    aligned: &self.aligned[j],
                    gradient: &gradients[j],
                    field: &self.fields[j],
                },
                &step_shared,
                step,
                sigma,
            );

            let mut state = shared.state.lock();
            state.fields[j] = output.field.clone();
            state.aligned[j] = output.aligned.clone();
            drop(state);

            output
        });

        let mut errors = Vec::with_capacity(count);
        for (j, output) in outputs.into_iter().enumerate() {
            if output.aligned.is_all_nan() {
                self.numeric_warnings += 1;
                tracing::warn!(
                    "Aligned image {} is entirely NaN after iteration {}",
                    j,
                    self.iteration + 1
                );
            }
            errors.push(output.error);
            self.fields[j] = output.field;
            self.aligned[j] = output.aligned;
        }

        let error = self.config.aggregate.apply(&errors);
        let error_delta = self.prev_error - error;
        self.prev_error = error;
        self.iteration += 1;

        let criteria = StopCriteria::evaluate(
            self.iteration,
            error,
            error_delta,
            self.config.max_iterations,
            self.config.min_error,
            self.config.min_error_delta,
        );

        {
            let mut state = self.shared.state.lock();
            state.iteration = self.iteration;
            state.error = error;
            state.error_delta = error_delta;
            state.error_series.push(error);
            state.error_delta_series.push(error_delta);
            for (series, field) in state.field_magnitude_series.iter_mut().zip(&self.fields) {
                series.push(field.mean_magnitude());
            }
            state.criteria = criteria;
        }

        self.log_progress(error, error_delta, &criteria);
        criteria
    }

    fn log_progress(&self, error: f64, error_delta: f64, criteria: &StopCriteria) {
        if self.config.log_progress {
            tracing::info!(
                "iter {:>4}  err {:.6e}  derr {:+.3e}  stop [iters: {}, err: {}, derr: {}]",
                self.iteration,
                error,
                error_delta,
                criteria.max_iterations,
                criteria.min_error,
                criteria.min_error_delta
            );
        } else {
            tracing::debug!(
                "iter {:>4}  err {:.6e}  derr {:+.3e}  stop [iters: {}, err: {}, derr: {}]",
                self.iteration,
                error,
                error_delta,
                criteria.max_iterations,
                criteria.min_error,
                criteria.min_error_delta
            );
        }
    }

    /// Warps the original images by the final fields and collects the outputs.
    fn finish(mut self, cancelled: bool, criteria: StopCriteria) -> AlignmentResult {
        if let Some(statistic) = self.config.reference.statistic() {
            self.reference = pixel_statistic(&self.fan_out, &self.aligned, statistic);
        }

        let fill = self.config.fill;
        let intensity_shift = self.config.intensity_shift;
        let images_aligned = self.fan_out.map(self.originals.len(), |j| {
            warp_image_with_shift(&self.originals[j], &self.fields[j], fill, intensity_shift)
        });
        for (j, image) in images_aligned.iter().enumerate() {
            if image.is_all_nan() {
                self.numeric_warnings += 1;
                tracing::warn!("Output image {} is entirely NaN", j);
            }
        }

        let (error_history, error_delta_history, field_magnitude_history) = {
            let mut state = self.shared.state.lock();
            state.reference = Some(self.reference.clone());
            (
                state.error_series.clone(),
                state.error_delta_series.clone(),
                state.field_magnitude_series.clone(),
            )
        };

        tracing::info!(
            "Alignment finished after {} iterations, error {:.6e}{}",
            self.iteration,
            self.prev_error,
            if cancelled { " (cancelled)" } else { "" }
        );

        let result = AlignmentResult {
            images_aligned,
            fields: self.fields,
            error_history,
            error_delta_history,
            field_magnitude_history,
            criteria,
            iterations: self.iteration,
            cancelled,
            reference: self.reference,
            numeric_warnings: self.numeric_warnings,
        };
        self.shared.finished.set();
        result
    }
}

/// Per-pixel mean or median of `images`, one fan-out task per row.
fn pixel_statistic(fan_out: &FanOut, images: &[Image], statistic: PixelStatistic) -> Image {
    let (height, width) = images[0].shape();
    let rows = fan_out.map(height, |y| statistic_row(images, y, statistic));
    Image::new(height, width, rows.concat())
}

/// Short reference description for logs, without dumping external pixels.
struct ReferenceLabel<'a>(&'a Reference);

impl std::fmt::Debug for ReferenceLabel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Reference::Mean => write!(f, "mean"),
            Reference::Median => write!(f, "median"),
            Reference::Index(index) => write!(f, "image {}", index),
            Reference::External(image) => {
                write!(f, "external {}x{}", image.height(), image.width())
            }
        }
    }
}
