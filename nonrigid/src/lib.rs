//! Nonrigid - iterative non-rigid registration of image stacks.
//!
//! Every image in a stack gets a dense displacement field that is refined by
//! gradient descent on the squared difference to a reference image. The
//! reference is either fixed (a stack member or an external image) or the
//! per-pixel mean/median of the currently aligned stack.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nonrigid::{AlignConfig, Alignment, Reference, Stack};
//!
//! let stack = Stack::new(images)?;
//! let config = AlignConfig::default().with_reference(Reference::Median);
//!
//! // Blocking run on the current thread.
//! let result = Alignment::new(stack, config)?.run()?;
//! println!("error {:?} after {} iterations", result.final_error(), result.iterations);
//! ```
//!
//! Use [`Alignment::start`] instead to iterate on a worker thread and watch
//! the run through a [`Monitor`].

pub mod alignment;
pub mod config;
pub mod error;
pub mod filter;
pub mod gradient;
pub mod image;
pub mod metrics;
pub mod normalize;
pub mod reference;
pub mod regularize;
pub mod warp;

#[cfg(any(test, feature = "bench"))]
pub mod testing;

// ============================================================================
// Core types
// ============================================================================

pub use error::{Error, Result};
pub use image::{Axis, Field, Image, Stack};

// ============================================================================
// Alignment
// ============================================================================

pub use alignment::{
    Alignment, AlignmentHandle, AlignmentResult, Monitor, Progress, StopCriteria,
};
pub use config::{AlignConfig, InitialField};
pub use metrics::Aggregate;
pub use normalize::Percentile;
pub use reference::Reference;
pub use regularize::{ChannelFilter, Regularizer, RegularizerContext, RegularizerMode};

// ============================================================================
// Building blocks
// ============================================================================

pub use gradient::{gradient, gradient_stack};
pub use metrics::{nrmse, nrmse_nan};
pub use normalize::{normalize, normalize_array, normalize_stack};
pub use reference::{mean_image, median_image};
pub use warp::{warp_image, warp_stack};
