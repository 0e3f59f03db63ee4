// src/patterns.rs
//! Reference patterns shipped with the binary.
//!
//! Real installations plug in their own `FrameGenerator`s; these two keep
//! the pump useful out of the box and double as a smoke test for a layout.

use crate::color::{remap, Rgb};
use crate::generator::{FrameContext, FrameGenerator};
use anyhow::{bail, Result};

/// Names accepted by [`by_name`].
pub const PATTERN_NAMES: &[&str] = &["rainbow", "solid"];

/// Builds a pattern from its command-line name.
pub fn by_name(name: &str) -> Result<Box<dyn FrameGenerator>> {
    match name {
        "rainbow" => Ok(Box::new(Rainbow::default())),
        "solid" => Ok(Box::new(Solid)),
        other => bail!(
            "Unknown pattern '{}' (available: {})",
            other,
            PATTERN_NAMES.join(", ")
        ),
    }
}

/// Hue sweep along the x axis that drifts over time.
///
/// Knob 0 sets brightness, knob 1 the drift speed (centered knob is still,
/// the ends drift one cycle per second either way). Holding any key washes
/// the colors toward white by its velocity.
#[derive(Debug, Clone)]
pub struct Rainbow {
    /// Hue cycles spanned by the layout's width.
    pub bands: f64,
}

impl Default for Rainbow {
    fn default() -> Self {
        Self { bands: 1.0 }
    }
}

impl FrameGenerator for Rainbow {
    fn name(&self) -> &str {
        "rainbow"
    }

    fn fill(&mut self, ctx: &FrameContext<'_>, frame: &mut [u8]) {
        let brightness = ctx.input.knob(0, 1.0);
        let speed = remap(ctx.input.knob(1, 0.55), 0.0, 1.0, -1.0, 1.0);
        let offset = ctx.elapsed.as_secs_f64() * speed;
        let wash = ctx.input.keys.iter().copied().fold(0.0, f64::max);

        for (point, pixel) in ctx.coords.iter().zip(frame.chunks_exact_mut(3)) {
            let n = ctx.bounds.normalize(*point);
            Rgb::from_hsv(n.x * self.bands + offset, 1.0 - wash, 1.0)
                .scale(brightness)
                .write_to(pixel);
        }
    }
}

/// Every pixel the same color, taken from knobs 0..=2 (white without a controller).
#[derive(Debug, Clone, Copy, Default)]
pub struct Solid;

impl FrameGenerator for Solid {
    fn name(&self) -> &str {
        "solid"
    }

    fn fill(&mut self, ctx: &FrameContext<'_>, frame: &mut [u8]) {
        let color = Rgb::new(
            ctx.input.knob(0, Rgb::WHITE.r),
            ctx.input.knob(1, Rgb::WHITE.g),
            ctx.input.knob(2, Rgb::WHITE.b),
        );
        for pixel in frame.chunks_exact_mut(3) {
            color.write_to(pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ControlSnapshot;
    use crate::layout::{CoordinateTable, Point};
    use std::time::Duration;

    fn table() -> CoordinateTable {
        CoordinateTable::new(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.5, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
        ])
    }

    #[test]
    fn it_should_overwrite_every_byte_with_solid() {
        let coords = table();
        let bounds = coords.bounds().unwrap();
        let input = ControlSnapshot {
            knobs: vec![1.0, 0.0, 0.5],
            ..ControlSnapshot::default()
        };
        let ctx = FrameContext {
            coords: &coords,
            bounds: &bounds,
            elapsed: Duration::ZERO,
            frame: 0,
            input: &input,
        };
        let mut frame = vec![7u8; coords.frame_len()];

        Solid.fill(&ctx, &mut frame);

        assert_eq!(frame, vec![255, 0, 128, 255, 0, 128, 255, 0, 128]);
    }

    #[test]
    fn it_should_sweep_hue_across_x_with_rainbow() {
        let coords = table();
        let bounds = coords.bounds().unwrap();
        let input = ControlSnapshot::default();
        let ctx = FrameContext {
            coords: &coords,
            bounds: &bounds,
            elapsed: Duration::ZERO,
            frame: 0,
            input: &input,
        };
        let mut frame = vec![0u8; coords.frame_len()];

        Rainbow::default().fill(&ctx, &mut frame);

        // x=0 is red, x=0.5 is cyan, x=1 wraps back to red.
        assert_eq!(&frame[0..3], &[255, 0, 0]);
        assert_eq!(&frame[3..6], &[0, 255, 255]);
        assert_eq!(&frame[6..9], &[255, 0, 0]);
    }

    #[test]
    fn it_should_wash_rainbow_to_white_while_a_key_is_held() {
        let coords = table();
        let bounds = coords.bounds().unwrap();
        let mut input = ControlSnapshot {
            knobs: vec![0.5, 1.0],
            ..ControlSnapshot::default()
        };
        input.keys[60] = 1.0;
        let ctx = FrameContext {
            coords: &coords,
            bounds: &bounds,
            elapsed: Duration::from_millis(250),
            frame: 10,
            input: &input,
        };
        let mut frame = vec![0u8; coords.frame_len()];

        Rainbow::default().fill(&ctx, &mut frame);

        // Fully desaturated at half brightness, whatever the hue drifted to.
        assert_eq!(frame, vec![128; 9]);
    }

    #[test]
    fn it_should_reject_unknown_pattern_names() {
        assert!(by_name("rainbow").is_ok());
        assert!(by_name("solid").is_ok());
        let err = by_name("plaid").err().unwrap();
        assert!(err.to_string().contains("Unknown pattern 'plaid'"));
    }
}
