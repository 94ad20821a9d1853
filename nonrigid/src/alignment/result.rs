//! Outputs of a finished alignment run.

use crate::image::{Field, Image};

/// Which stop conditions held after the latest iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopCriteria {
    /// The iteration cap was reached.
    pub max_iterations: bool,
    /// The aggregated error fell below the error floor.
    pub min_error: bool,
    /// The aggregated error changed by less than the delta floor.
    pub min_error_delta: bool,
}

impl StopCriteria {
    /// NaN errors never satisfy the error or delta tests.
    pub fn evaluate(
        iteration: usize,
        error: f64,
        error_delta: f64,
        max_iterations: usize,
        min_error: f64,
        min_error_delta: f64,
    ) -> Self {
        Self {
            max_iterations: iteration >= max_iterations,
            min_error: error < min_error,
            min_error_delta: error_delta.abs() < min_error_delta,
        }
    }

    pub fn any(&self) -> bool {
        self.max_iterations || self.min_error || self.min_error_delta
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// Original (unnormalized) images warped by the final fields with the
    /// configured fill and intensity correction.
    pub images_aligned: Vec<Image>,
    pub fields: Vec<Field>,
    /// Aggregated error after each iteration.
    pub error_history: Vec<f64>,
    /// Previous minus current aggregated error, per iteration. The first
    /// entry is NaN.
    pub error_delta_history: Vec<f64>,
    /// Per image, mean displacement length after each iteration.
    pub field_magnitude_history: Vec<Vec<f64>>,
    /// Stop conditions at the last iteration.
    pub criteria: StopCriteria,
    pub iterations: usize,
    /// The run ended because of a cancellation request.
    pub cancelled: bool,
    /// Final reference in normalized units. Dynamic references are
    /// recomputed from the final aligned stack.
    pub reference: Image,
    /// Iterations or outputs that produced an all-NaN image.
    pub numeric_warnings: usize,
}

impl AlignmentResult {
    /// Aggregated error after the last iteration, if any ran.
    pub fn final_error(&self) -> Option<f64> {
        self.error_history.last().copied()
    }
}
