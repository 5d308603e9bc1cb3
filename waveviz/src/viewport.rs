// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Maps simulation time to horizontal pixel positions and back.

use crate::arith::{bounded_add, bounded_mul, div, saturate};
use crate::signals::Time;
use std::fmt::{Debug, Display, Formatter};
use std::num::{NonZeroI64, NonZeroU64};

pub type Pixel = u64;

/// Zoom level. A positive value `n` means `n` pixels per time unit, a negative value `-n`
/// means `n` time units per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Scale(NonZeroI64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleRegime {
    PixelsPerUnit(NonZeroU64),
    UnitsPerPixel(NonZeroU64),
}

impl Scale {
    pub const ONE: Scale = match NonZeroI64::new(1) {
        Some(one) => Scale(one),
        None => unreachable!(),
    };

    /// Returns `None` for zero. `-1` and `1` are the same zoom level and both map to `1`.
    pub fn new(value: i64) -> Option<Self> {
        let value = if value == -1 { 1 } else { value };
        NonZeroI64::new(value).map(Scale)
    }

    pub fn pixels_per_unit(pixels: u64) -> Option<Self> {
        i64::try_from(pixels).ok().and_then(Self::new)
    }

    pub fn units_per_pixel(units: u64) -> Option<Self> {
        i64::try_from(units).ok().and_then(|u| Self::new(-u))
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.get()
    }

    #[inline]
    pub fn regime(&self) -> ScaleRegime {
        if self.0.get() > 0 {
            ScaleRegime::PixelsPerUnit(self.0.unsigned_abs())
        } else {
            ScaleRegime::UnitsPerPixel(self.0.unsigned_abs())
        }
    }
}

impl Display for Scale {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.regime() {
            ScaleRegime::PixelsPerUnit(n) => write!(f, "{n} px/unit"),
            ScaleRegime::UnitsPerPixel(n) => write!(f, "{n} units/px"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewportOptions {
    /// Scale before [`Viewport::fit`], see [`Scale`] for the encoding.
    pub initial_scale: i64,
    /// Zooming in stops at this many pixels per time unit.
    pub max_pixels_per_unit: u64,
    /// Zooming out never shrinks the whole trace below this width.
    pub min_whole_width: Pixel,
    /// Factor by which a single zoom step changes the scale. At least 2.
    pub zoom_step: u64,
    /// Largest pixel coordinate that can be rendered.
    pub max_width: Pixel,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            initial_scale: 40,
            max_pixels_per_unit: 1000,
            min_whole_width: 100,
            zoom_step: 10,
            max_width: i32::MAX as Pixel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("waveform is too large to display")]
pub struct TraceTooLarge;

/// Gets told about every change of the zoom level together with the new width of the whole trace.
pub trait ScaleObserver {
    fn scale_changed(&mut self, scale: Scale, total_width: Option<Pixel>);
}

impl<F> ScaleObserver for F
where
    F: FnMut(Scale, Option<Pixel>),
{
    fn scale_changed(&mut self, scale: Scale, total_width: Option<Pixel>) {
        self(scale, total_width)
    }
}

/// Time <-> pixel mapping for a trace that spans `origin..=end`.
///
/// Pixel 0 is the origin. Every conversion is bounds checked: the `checked_*` functions
/// return `None` where the plain ones return `Pixel::MAX` or `Time::MAX`.
/// In the [`ScaleRegime::UnitsPerPixel`] regime a pixel covers several time units and
/// [`Viewport::time_from_pixel`] returns the first of them.
pub struct Viewport {
    origin: Time,
    end: Time,
    scale: Scale,
    options: ViewportOptions,
    observers: Vec<Box<dyn ScaleObserver>>,
}

impl Debug for Viewport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Viewport({}..={} @ {}, {} observers)",
            self.origin,
            self.end,
            self.scale,
            self.observers.len()
        )
    }
}

impl Viewport {
    pub fn new(start: Time, end: Time, options: ViewportOptions) -> Self {
        let options = ViewportOptions {
            max_pixels_per_unit: options.max_pixels_per_unit.clamp(1, i64::MAX as u64),
            zoom_step: options.zoom_step.max(2),
            ..options
        };
        let scale = match Scale::new(options.initial_scale) {
            Some(scale) if scale.get() > options.max_pixels_per_unit as i64 => {
                Scale::pixels_per_unit(options.max_pixels_per_unit).unwrap_or(Scale::ONE)
            }
            Some(scale) => scale,
            None => Scale::ONE,
        };
        Self {
            origin: start.min(end),
            end: start.max(end),
            scale,
            options,
            observers: Vec::new(),
        }
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn origin(&self) -> Time {
        self.origin
    }

    pub fn end(&self) -> Time {
        self.end
    }

    pub fn options(&self) -> &ViewportOptions {
        &self.options
    }

    pub fn add_observer(&mut self, observer: Box<dyn ScaleObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    fn pixel_at(&self, scale: Scale, time: Time) -> Option<Pixel> {
        // times before the origin are clamped to it
        let offset = time.saturating_sub(self.origin);
        match scale.regime() {
            ScaleRegime::PixelsPerUnit(pixels) => {
                bounded_mul(offset, pixels.get(), self.options.max_width)
            }
            ScaleRegime::UnitsPerPixel(units) => {
                Some(div(offset, units)).filter(|x| *x <= self.options.max_width)
            }
        }
    }

    pub fn checked_pixel_from_time(&self, time: Time) -> Option<Pixel> {
        self.pixel_at(self.scale, time)
    }

    pub fn pixel_from_time(&self, time: Time) -> Pixel {
        saturate(self.checked_pixel_from_time(time))
    }

    pub fn checked_time_from_pixel(&self, x: Pixel) -> Option<Time> {
        let offset = match self.scale.regime() {
            ScaleRegime::PixelsPerUnit(pixels) => Some(div(x, pixels)),
            ScaleRegime::UnitsPerPixel(units) => bounded_mul(x, units.get(), Time::MAX),
        }?;
        bounded_add(self.origin, offset, Time::MAX)
    }

    pub fn time_from_pixel(&self, x: Pixel) -> Time {
        saturate(self.checked_time_from_pixel(x))
    }

    /// Width of the whole trace in pixels, `None` if it cannot be rendered at the current scale.
    pub fn total_width(&self) -> Option<Pixel> {
        self.pixel_at(self.scale, self.end)
    }

    /// Zooms out until the whole trace can be rendered.
    pub fn fit(&mut self) -> Result<(), TraceTooLarge> {
        let before = self.scale;
        while self.total_width().is_none() {
            self.scale = self.zoomed_out().ok_or(TraceTooLarge)?;
        }
        if self.scale != before {
            log::debug!("zoomed out from {before} to {} to fit the trace", self.scale);
            self.notify();
        }
        Ok(())
    }

    fn zoomed_in(&self) -> Option<Scale> {
        let step = self.options.zoom_step;
        match self.scale.regime() {
            ScaleRegime::PixelsPerUnit(pixels) => {
                let max = self.options.max_pixels_per_unit;
                if pixels.get() >= max {
                    None
                } else {
                    Scale::pixels_per_unit(pixels.get().saturating_mul(step).min(max))
                }
            }
            ScaleRegime::UnitsPerPixel(units) => {
                let units = units.get() / step;
                if units <= 1 {
                    Some(Scale::ONE)
                } else {
                    Scale::units_per_pixel(units)
                }
            }
        }
    }

    fn zoomed_out(&self) -> Option<Scale> {
        let step = self.options.zoom_step;
        match self.scale.regime() {
            ScaleRegime::PixelsPerUnit(pixels) => {
                let pixels = pixels.get() / step;
                if pixels < 1 {
                    Scale::units_per_pixel(step)
                } else {
                    Scale::pixels_per_unit(pixels)
                }
            }
            // no further zooming out once the divisor overflows
            ScaleRegime::UnitsPerPixel(units) => units
                .get()
                .checked_mul(step)
                .and_then(Scale::units_per_pixel),
        }
    }

    /// Returns `false` if we are already at the maximum number of pixels per time unit.
    pub fn zoom_in(&mut self) -> bool {
        match self.zoomed_in() {
            Some(next) => {
                self.apply(next);
                true
            }
            None => false,
        }
    }

    /// Returns `false` if zooming out would make the whole trace narrower than
    /// [`ViewportOptions::min_whole_width`] or if the scale cannot grow any further.
    pub fn zoom_out(&mut self) -> bool {
        let Some(next) = self.zoomed_out() else {
            return false;
        };
        match self.pixel_at(next, self.end) {
            Some(width) if width < self.options.min_whole_width => false,
            _ => {
                self.apply(next);
                true
            }
        }
    }

    fn apply(&mut self, scale: Scale) {
        if scale != self.scale {
            self.scale = scale;
            self.notify();
        }
    }

    fn notify(&mut self) {
        let scale = self.scale;
        let width = self.total_width();
        for observer in self.observers.iter_mut() {
            observer.scale_changed(scale, width);
        }
    }

    /// Number of time units between two ruler labels that are at least `min_label_px` apart.
    pub fn label_interval(&self, min_label_px: Pixel) -> Time {
        let min_label_px = min_label_px.max(1);
        let interval = match self.scale.regime() {
            ScaleRegime::PixelsPerUnit(pixels) => div(min_label_px, pixels),
            ScaleRegime::UnitsPerPixel(units) => min_label_px.saturating_mul(units.get()),
        };
        interval.max(1)
    }

    /// Ruler ticks in the pixel range `x_start..x_end`, as (pixel, time) pairs.
    /// Tick times are multiples of [`Viewport::label_interval`].
    pub fn ticks(&self, x_start: Pixel, x_end: Pixel, min_label_px: Pixel) -> Vec<(Pixel, Time)> {
        let interval = self.label_interval(min_label_px);
        let mut ticks = Vec::new();
        let Some(mut time) = self
            .checked_time_from_pixel(x_start)
            .and_then(|t| t.checked_next_multiple_of(interval))
        else {
            return ticks;
        };
        while let Some(x) = self.checked_pixel_from_time(time) {
            if x >= x_end {
                break;
            }
            ticks.push((x, time));
            match time.checked_add(interval) {
                Some(next) => time = next,
                None => break,
            }
        }
        ticks
    }
}
