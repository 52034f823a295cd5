//! Batch: 3-D sample container emitted on data ports
//!
//! Shape is always `(batch = 1, time, channels)`, matching what downstream
//! pipeline nodes expect from a data source.

use crate::error::{PluxError, PluxResult};
use ndarray::{Array3, ArrayView3};

/// Half of the 16-bit plux range (2^15)
pub const PLUX_HALF_RANGE: f64 = 32768.0;

/// Map a raw plux sample into roughly [-1, 1)
#[inline]
pub fn normalize_sample(raw: f64) -> f64 {
    raw / PLUX_HALF_RANGE - 1.0
}

/// Stacked samples ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    data: Array3<f64>,
}

impl Batch {
    /// Wrap an existing array
    pub fn new(data: Array3<f64>) -> Self {
        Self { data }
    }

    /// Stack buffered frames into a `(1, frames, channels)` batch
    ///
    /// Every frame must carry the same number of channels.
    pub fn from_frames(frames: &[Vec<i32>]) -> PluxResult<Self> {
        let channels = frames.first().map(Vec::len).unwrap_or(0);

        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.len() != channels)
        {
            return Err(PluxError::Shape {
                reason: format!(
                    "frame {} has {} channels, expected {}",
                    index,
                    frame.len(),
                    channels
                ),
            });
        }

        let data = Array3::from_shape_fn((1, frames.len(), channels), |(_, t, ch)| {
            frames[t][ch] as f64
        });

        Ok(Self { data })
    }

    /// Build a single-sample `(1, 1, n)` batch
    pub fn single_sample(values: &[f64]) -> Self {
        let data = Array3::from_shape_fn((1, 1, values.len()), |(_, _, ch)| values[ch]);
        Self { data }
    }

    /// Apply `x / 2^15 - 1` element-wise, keeping the shape
    pub fn normalized(&self) -> Self {
        Self {
            data: self.data.mapv(normalize_sample),
        }
    }

    /// `(batch, time, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of samples along the time axis
    pub fn time_len(&self) -> usize {
        self.data.dim().1
    }

    pub fn channel_count(&self) -> usize {
        self.data.dim().2
    }

    /// Value at a time index and channel of the first batch entry
    pub fn sample(&self, time: usize, channel: usize) -> Option<f64> {
        self.data.get((0, time, channel)).copied()
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }
}

impl From<Array3<f64>> for Batch {
    fn from(data: Array3<f64>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frames_shape() {
        let frames = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let batch = Batch::from_frames(&frames).unwrap();

        assert_eq!(batch.shape(), (1, 2, 3));
        assert_eq!(batch.sample(0, 0), Some(1.0));
        assert_eq!(batch.sample(1, 2), Some(6.0));
        assert_eq!(batch.sample(2, 0), None);
    }

    #[test]
    fn test_ragged_frames_rejected() {
        let frames = vec![vec![1, 2], vec![3]];
        let err = Batch::from_frames(&frames).unwrap_err();
        assert!(err.to_string().contains("frame 1 has 1 channels"));
    }

    #[test]
    fn test_normalization_range() {
        let frames = vec![vec![0, 32768, 65535]];
        let batch = Batch::from_frames(&frames).unwrap().normalized();

        assert_eq!(batch.sample(0, 0), Some(-1.0));
        assert_eq!(batch.sample(0, 1), Some(0.0));
        let top = batch.sample(0, 2).unwrap();
        assert!(top < 1.0 && top > 0.999);
    }

    #[test]
    fn test_single_sample() {
        let batch = Batch::single_sample(&[0.5, -0.25]);
        assert_eq!(batch.shape(), (1, 1, 2));
        assert_eq!(batch.sample(0, 1), Some(-0.25));
    }

    #[test]
    fn test_empty_frames() {
        let batch = Batch::from_frames(&[]).unwrap();
        assert_eq!(batch.shape(), (1, 0, 0));
    }
}
