//! Smoothing of the per-iteration displacement increment.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::filter::gaussian_smooth;
use crate::image::{Axis, Field, Image};

/// Values handed to a [`ChannelFilter`] for each channel it filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularizerContext {
    /// Current (live) regularizer sigma.
    pub sigma: f64,
    /// Which displacement channel is being filtered.
    pub axis: Axis,
    pub height: usize,
    pub width: usize,
}

/// User-supplied in-place filter for one displacement channel.
///
/// The channel is a row-major slice of `ctx.height * ctx.width` pixels, so a
/// filter can change values but never the channel's shape.
///
/// Implemented for any `Fn(&mut [f64], &RegularizerContext)` closure.
pub trait ChannelFilter: Send + Sync {
    fn apply(&self, channel: &mut [f64], ctx: &RegularizerContext);
}

impl<F> ChannelFilter for F
where
    F: Fn(&mut [f64], &RegularizerContext) + Send + Sync,
{
    fn apply(&self, channel: &mut [f64], ctx: &RegularizerContext) {
        self(channel, ctx)
    }
}

/// Named regularizer modes accepted from strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RegularizerMode {
    Gaussian,
    None,
}

#[derive(Clone, Default)]
pub enum Regularizer {
    /// Separable Gaussian with the live sigma on each channel.
    #[default]
    Gaussian,
    /// Leaves the increment untouched.
    None,
    /// One filter applied to both channels.
    Filter(Arc<dyn ChannelFilter>),
    /// Separate filters for the y and x channels.
    FilterPair(Arc<dyn ChannelFilter>, Arc<dyn ChannelFilter>),
}

impl fmt::Debug for Regularizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regularizer::Gaussian => f.write_str("Gaussian"),
            Regularizer::None => f.write_str("None"),
            Regularizer::Filter(_) => f.write_str("Filter(..)"),
            Regularizer::FilterPair(_, _) => f.write_str("FilterPair(..)"),
        }
    }
}

impl From<RegularizerMode> for Regularizer {
    fn from(mode: RegularizerMode) -> Self {
        match mode {
            RegularizerMode::Gaussian => Regularizer::Gaussian,
            RegularizerMode::None => Regularizer::None,
        }
    }
}

impl FromStr for Regularizer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<RegularizerMode>()
            .map(Regularizer::from)
            .map_err(|_| Error::config(format!("unknown regularizer '{}'", s)))
    }
}

impl Regularizer {
    pub fn filter<F: ChannelFilter + 'static>(filter: F) -> Self {
        Regularizer::Filter(Arc::new(filter))
    }

    pub fn filter_pair<Fy, Fx>(y: Fy, x: Fx) -> Self
    where
        Fy: ChannelFilter + 'static,
        Fx: ChannelFilter + 'static,
    {
        Regularizer::FilterPair(Arc::new(y), Arc::new(x))
    }

    /// One filter for both channels, or one per channel (y first).
    pub fn from_filters(mut filters: Vec<Arc<dyn ChannelFilter>>) -> Result<Self> {
        match filters.len() {
            1 => Ok(Regularizer::Filter(filters.remove(0))),
            2 => {
                let x = filters.remove(1);
                let y = filters.remove(0);
                Ok(Regularizer::FilterPair(y, x))
            }
            n => Err(Error::config(format!(
                "regularizer takes 1 or 2 filters, got {}",
                n
            ))),
        }
    }

    /// Smooths `increment` in place with the given live sigma.
    ///
    /// Gaussian with `sigma == 0` leaves the increment bit-exact.
    pub fn apply(&self, increment: &mut Field, sigma: f64) {
        match self {
            Regularizer::Gaussian => {
                if sigma > 0.0 {
                    for axis in Axis::BOTH {
                        let smoothed = gaussian_smooth(increment.channel(axis), sigma);
                        *increment.channel_mut(axis) = smoothed;
                    }
                }
            }
            Regularizer::None => {}
            Regularizer::Filter(filter) => {
                for axis in Axis::BOTH {
                    filter_channel(filter.as_ref(), increment.channel_mut(axis), sigma, axis);
                }
            }
            Regularizer::FilterPair(fy, fx) => {
                filter_channel(fy.as_ref(), increment.channel_mut(Axis::Y), sigma, Axis::Y);
                filter_channel(fx.as_ref(), increment.channel_mut(Axis::X), sigma, Axis::X);
            }
        }
    }
}

fn filter_channel(filter: &dyn ChannelFilter, channel: &mut Image, sigma: f64, axis: Axis) {
    let ctx = RegularizerContext {
        sigma,
        axis,
        height: channel.height(),
        width: channel.width(),
    };
    filter.apply(channel.pixels_mut(), &ctx);
}
