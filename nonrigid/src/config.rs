//! Alignment configuration.
//!
//! `AlignConfig` is fixed once a run starts, except for the step size and
//! the regularizer sigma, which a [`Monitor`](crate::alignment::Monitor)
//! can change while the run is in progress.

use crate::error::{Error, Result};
use crate::image::Field;
use crate::metrics::Aggregate;
use crate::normalize::Percentile;
use crate::reference::Reference;
use crate::regularize::Regularizer;

// =============================================================================
// Initial displacement
// =============================================================================

/// Starting displacement field of every image.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitialField {
    #[default]
    Zero,
    /// One field copied to every image.
    Shared(Field),
    /// One field per image, in stack order.
    PerImage(Vec<Field>),
}

impl InitialField {
    /// Checks field count and shapes against a stack of `count` images.
    pub(crate) fn validate(&self, count: usize, shape: (usize, usize)) -> Result<()> {
        match self {
            InitialField::Zero => Ok(()),
            InitialField::Shared(field) => {
                if field.shape() != shape {
                    return Err(Error::config(format!(
                        "initial field is {:?}, images are {:?}",
                        field.shape(),
                        shape
                    )));
                }
                Ok(())
            }
            InitialField::PerImage(fields) => {
                if fields.len() != count {
                    return Err(Error::config(format!(
                        "{} initial fields for {} images",
                        fields.len(),
                        count
                    )));
                }
                if let Some((index, field)) =
                    fields.iter().enumerate().find(|(_, f)| f.shape() != shape)
                {
                    return Err(Error::config(format!(
                        "initial field {} is {:?}, images are {:?}",
                        index,
                        field.shape(),
                        shape
                    )));
                }
                Ok(())
            }
        }
    }

    /// Expands to one field per image, checking shapes against the stack.
    pub(crate) fn resolve(&self, count: usize, shape: (usize, usize)) -> Result<Vec<Field>> {
        self.validate(count, shape)?;
        let (height, width) = shape;
        Ok(match self {
            InitialField::Zero => vec![Field::zeros(height, width); count],
            InitialField::Shared(field) => vec![field.clone(); count],
            InitialField::PerImage(fields) => fields.clone(),
        })
    }
}

// =============================================================================
// Alignment configuration
// =============================================================================

/// Parameters of one alignment run.
///
/// Defaults suit stacks normalized to `[0, 1]` with features a few pixels
/// wide and misalignments up to a couple of pixels.
#[derive(Debug, Clone)]
pub struct AlignConfig {
    /// Percentile clip applied to every image (and an external reference).
    /// `None` skips normalization.
    pub percentile: Option<Percentile>,
    /// Derivative-of-Gaussian sigma for image gradients; 0 uses plain finite differences.
    pub gradient_sigma: f64,
    pub regularizer: Regularizer,
    /// Initial regularizer sigma. Live-tunable.
    pub regularizer_sigma: f64,
    /// Clamp of the raw increment before regularization. `None` disables clamping.
    pub increment_clip: Option<f64>,
    /// Gradient-descent step size. Live-tunable.
    pub step: f64,
    pub max_iterations: usize,
    /// Stop once the aggregated error falls below this.
    pub min_error: f64,
    /// Stop once the aggregated error changes by less than this between iterations.
    pub min_error_delta: f64,
    pub aggregate: Aggregate,
    pub reference: Reference,
    pub initial_field: InitialField,
    /// Value for samples outside the source image in the final output.
    /// The iteration itself always fills with 0.
    pub fill: f64,
    /// Multiply warped intensities by `1 + div(D)`.
    pub intensity_shift: bool,
    /// Worker threads for the per-image fan-out, used as given (capped at the
    /// image count). `None` uses all CPUs but one.
    pub threads: Option<usize>,
    /// Log one progress row per iteration at `info` instead of `debug`.
    pub log_progress: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            percentile: Some(Percentile::default()),
            gradient_sigma: 1.0,
            regularizer: Regularizer::Gaussian,
            regularizer_sigma: 8.0,
            increment_clip: Some(0.05),
            step: 100.0,
            max_iterations: 200,
            min_error: 1e-4,
            min_error_delta: 1e-6,
            aggregate: Aggregate::Mean,
            reference: Reference::Mean,
            initial_field: InitialField::Zero,
            fill: 0.0,
            intensity_shift: false,
            threads: None,
            log_progress: true,
        }
    }
}

impl AlignConfig {
    /// Checks the scalar parameters. Stack-dependent checks (reference index,
    /// field shapes) happen when the alignment is created.
    pub fn validate(&self) -> Result<()> {
        if let Some(pct) = self.percentile {
            pct.validate()?;
        }
        non_negative("gradient_sigma", self.gradient_sigma)?;
        non_negative("regularizer_sigma", self.regularizer_sigma)?;
        if let Some(clip) = self.increment_clip {
            if clip.is_nan() || clip <= 0.0 {
                return Err(Error::config(format!(
                    "increment_clip must be positive, got {}",
                    clip
                )));
            }
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(Error::config(format!(
                "step must be positive and finite, got {}",
                self.step
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        non_negative("min_error", self.min_error)?;
        non_negative("min_error_delta", self.min_error_delta)?;
        if self.threads == Some(0) {
            return Err(Error::config("threads must be at least 1"));
        }
        Ok(())
    }

    // Builder-style setters for the common knobs.

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.regularizer = regularizer;
        self
    }

    pub fn with_initial_field(mut self, initial_field: InitialField) -> Self {
        self.initial_field = initial_field;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{} must be finite and >= 0, got {}",
            name, value
        )))
    }
}
