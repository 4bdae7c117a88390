//! Random but reproducible call trees.

use cinder_flamechart::{Flamechart, FlamechartBuilder, MAX_COLOR_BUCKET, ModelError};
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub struct SyntheticProfile {
    pub seed: u64,
    pub root_frames: usize,
    pub max_depth: usize,
}

impl SyntheticProfile {
    pub fn generate(&self) -> Result<Flamechart, ModelError> {
        let mut rng = rand_pcg::Pcg64::seed_from_u64(self.seed);
        let weights: Vec<f64> = (0..self.root_frames)
            .map(|_| rng.random_range(20.0..200.0f64).round())
            .collect();
        let mut builder = FlamechartBuilder::new(weights.iter().sum());

        let mut start = 0.0;
        for weight in weights {
            self.call(&mut builder, &mut rng, 0, start, start + weight)?;
            start += weight;
        }
        builder.build()
    }

    /// Emits one frame spanning `start..end` and recurses into callees that
    /// cover random sub-intervals of it.
    fn call(
        &self,
        builder: &mut FlamechartBuilder,
        rng: &mut impl Rng,
        depth: usize,
        start: f64,
        end: f64,
    ) -> Result<(), ModelError> {
        builder.open_frame(rng.random_range(0..=MAX_COLOR_BUCKET), start);

        if depth + 1 < self.max_depth && end - start >= 2.0 {
            let callees = rng.random_range(0..=4);
            let mut cursor = start;
            for _ in 0..callees {
                let remaining = end - cursor;
                if remaining < 2.0 {
                    break;
                }
                let gap = (rng.random::<f64>() * remaining * 0.2).floor();
                let width = (rng.random_range(0.2..0.8) * (remaining - gap)).max(1.0).floor();
                self.call(builder, rng, depth + 1, cursor + gap, cursor + gap + width)?;
                cursor += gap + width;
            }
        }

        builder.close_frame(end)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(seed: u64) -> SyntheticProfile {
        SyntheticProfile {
            seed,
            root_frames: 8,
            max_depth: 6,
        }
    }

    #[test]
    fn generation_is_reproducible() {
        assert_eq!(profile(7).generate().unwrap(), profile(7).generate().unwrap());
    }

    #[test]
    fn depth_is_bounded_and_roots_fill_the_chart() {
        let chart = profile(11).generate().unwrap();
        assert!(!chart.layers().is_empty());
        assert!(chart.layers().len() <= 6);

        let roots = &chart.layers()[0];
        assert_eq!(roots.len(), 8);
        assert_eq!(roots.first().map(|frame| frame.start), Some(0.0));
        assert_eq!(roots.last().map(|frame| frame.end), Some(chart.total_weight()));
    }

    #[test]
    fn callees_stay_inside_their_callers() {
        let chart = profile(3).generate().unwrap();
        for pair in chart.layers().windows(2) {
            for callee in &pair[1] {
                assert!(
                    pair[0]
                        .iter()
                        .any(|caller| caller.start <= callee.start && callee.end <= caller.end),
                    "{callee:?} has no caller"
                );
            }
        }
    }
}
