//! Immutable flamechart layers.

use cinder_gfx::math::{Rect, Vec2};

use crate::error::ModelError;

/// Narrowest viewport is the chart width divided by this.
const MAX_ZOOM: f64 = 1_099_511_627_776.0; // 2^40

/// Largest color bucket a frame can carry.
///
/// The rect-info texture stores `bucket + 1` in an 8-bit channel and keeps
/// zero for "nothing drawn", so buckets cover `0..=254`. Charts clamp larger
/// values when they are built.
pub const MAX_COLOR_BUCKET: u8 = 254;

/// One interval in a layer, `[start, end)` in config space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlamechartFrame {
    pub start: f64,
    pub end: f64,
    /// At most [`MAX_COLOR_BUCKET`].
    pub color_bucket: u8,
}

impl FlamechartFrame {
    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Per-depth frame lists. Layer 0 holds the root frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Flamechart {
    layers: Vec<Vec<FlamechartFrame>>,
    total_weight: f64,
    min_frame_width: f64,
}

impl Flamechart {
    /// Builds a chart from precomputed layers. Frames within a layer are
    /// expected in ascending, non-overlapping order. Color buckets above
    /// [`MAX_COLOR_BUCKET`] are clamped to it.
    pub fn from_layers(total_weight: f64, mut layers: Vec<Vec<FlamechartFrame>>) -> Self {
        for frame in layers.iter_mut().flatten() {
            frame.color_bucket = frame.color_bucket.min(MAX_COLOR_BUCKET);
        }
        let min_frame_width = layers
            .iter()
            .flatten()
            .map(FlamechartFrame::width)
            .fold(f64::INFINITY, f64::min);
        Self {
            layers,
            total_weight,
            min_frame_width: if min_frame_width.is_finite() {
                min_frame_width
            } else {
                1.0
            },
        }
    }

    pub fn layers(&self) -> &[Vec<FlamechartFrame>] {
        &self.layers
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn min_frame_width(&self) -> f64 {
        self.min_frame_width
    }

    /// `width` limited to the chart width and to a narrowest viewport of
    /// three times the narrowest frame, but never narrower than the chart
    /// width over 2^40.
    pub fn clamped_viewport_width(&self, width: f64) -> f64 {
        let min_width = (3.0 * self.min_frame_width)
            .max(self.total_weight / MAX_ZOOM)
            .min(self.total_weight);
        width.max(min_width).min(self.total_weight)
    }

    /// Keeps a config-space viewport inside the chart.
    ///
    /// Non-inverted charts leave one empty row of headroom above the roots,
    /// so the origin may go down to `y = -1`.
    pub fn clamped_config_space_viewport_rect(&self, rect: &Rect, inverted: bool) -> Rect {
        let size = Vec2::new(self.clamped_viewport_width(rect.width()), rect.height());
        let extent = Vec2::new(self.total_weight, self.layers.len() as f64);
        let min = Vec2::new(0.0, if inverted { 0.0 } else { -1.0 });
        let max = (extent - size + Vec2::new(0.0, 1.0)).max(Vec2::ZERO);
        Rect::new(rect.origin.clamp(min, max), size)
    }
}

/// Assembles a [`Flamechart`] from a depth-first open/close sequence.
#[derive(Debug)]
pub struct FlamechartBuilder {
    total_weight: f64,
    stack: Vec<(u8, f64)>,
    layers: Vec<Vec<FlamechartFrame>>,
}

impl FlamechartBuilder {
    pub fn new(total_weight: f64) -> Self {
        Self {
            total_weight,
            stack: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn open_frame(&mut self, color_bucket: u8, value: f64) -> &mut Self {
        self.stack.push((color_bucket, value));
        self
    }

    /// Closes the innermost open frame. Zero-width frames are dropped.
    pub fn close_frame(&mut self, value: f64) -> Result<&mut Self, ModelError> {
        let (color_bucket, start) = self
            .stack
            .pop()
            .ok_or(ModelError::UnbalancedClose { value })?;
        if value == start {
            return Ok(self);
        }

        let depth = self.stack.len();
        if self.layers.len() <= depth {
            self.layers.resize_with(depth + 1, Vec::new);
        }
        self.layers[depth].push(FlamechartFrame {
            start,
            end: value,
            color_bucket,
        });
        Ok(self)
    }

    pub fn build(self) -> Result<Flamechart, ModelError> {
        if !self.stack.is_empty() {
            return Err(ModelError::UnclosedFrames {
                count: self.stack.len(),
            });
        }
        Ok(Flamechart::from_layers(self.total_weight, self.layers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_frames() -> Flamechart {
        let mut builder = FlamechartBuilder::new(60.0);
        builder
            .open_frame(1, 0.0)
            .close_frame(10.0)
            .unwrap()
            .open_frame(2, 10.0)
            .close_frame(30.0)
            .unwrap()
            .open_frame(3, 30.0)
            .close_frame(60.0)
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn color_buckets_are_clamped_to_the_encodable_range() {
        let mut builder = FlamechartBuilder::new(10.0);
        builder
            .open_frame(u8::MAX, 0.0)
            .close_frame(5.0)
            .unwrap()
            .open_frame(MAX_COLOR_BUCKET, 5.0)
            .close_frame(10.0)
            .unwrap();
        let chart = builder.build().unwrap();

        let buckets: Vec<u8> = chart.layers()[0].iter().map(|f| f.color_bucket).collect();
        assert_eq!(buckets, vec![MAX_COLOR_BUCKET, MAX_COLOR_BUCKET]);
    }

    #[test]
    fn frames_land_in_their_stack_depth() {
        let mut builder = FlamechartBuilder::new(10.0);
        builder
            .open_frame(0, 0.0)
            .open_frame(1, 2.0)
            .close_frame(4.0)
            .unwrap()
            .close_frame(10.0)
            .unwrap();
        let chart = builder.build().unwrap();

        assert_eq!(chart.layers().len(), 2);
        assert_eq!(
            chart.layers()[0],
            vec![FlamechartFrame {
                start: 0.0,
                end: 10.0,
                color_bucket: 0
            }]
        );
        assert_eq!(chart.layers()[1][0].width(), 2.0);
        assert_eq!(chart.min_frame_width(), 2.0);
    }

    #[test]
    fn zero_width_frames_are_dropped() {
        let mut builder = FlamechartBuilder::new(5.0);
        builder.open_frame(0, 5.0).close_frame(5.0).unwrap();
        let chart = builder.build().unwrap();
        assert!(chart.layers().is_empty());
        assert_eq!(chart.min_frame_width(), 1.0);
    }

    #[test]
    fn unbalanced_sequences_are_rejected() {
        let mut builder = FlamechartBuilder::new(1.0);
        assert_eq!(
            builder.close_frame(1.0).err(),
            Some(ModelError::UnbalancedClose { value: 1.0 })
        );

        builder.open_frame(0, 0.0);
        assert_eq!(
            builder.build().err(),
            Some(ModelError::UnclosedFrames { count: 1 })
        );
    }

    #[test]
    fn viewport_width_is_clamped_to_chart_and_narrowest_frame() {
        let chart = three_frames();
        assert_eq!(chart.clamped_viewport_width(1000.0), 60.0);
        assert_eq!(chart.clamped_viewport_width(1.0), 30.0);
        assert_eq!(chart.clamped_viewport_width(45.0), 45.0);
    }

    #[test]
    fn viewport_rect_stays_inside_the_chart() {
        let chart = three_frames();
        let rect = Rect::from_xywh(50.0, -5.0, 40.0, 1.0);

        let clamped = chart.clamped_config_space_viewport_rect(&rect, false);
        assert_eq!(clamped, Rect::from_xywh(20.0, -1.0, 40.0, 1.0));

        let inverted = chart.clamped_config_space_viewport_rect(&rect, true);
        assert_eq!(inverted.origin, Vec2::new(20.0, 0.0));
    }
}
