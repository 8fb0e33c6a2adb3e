use serde::{Deserialize, Serialize};

/// One captured angle of a measurement session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturedSample {
    /// 0-based position within the session.
    pub discrete_index: i64,
    /// Pitch after zero offset and user offset (degrees).
    pub angle: f32,
    pub sampling_interval_ms: i64,
    pub timestamp_ms: i64,
}

/// Captured samples as parallel columns, the shape handed to persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementColumns {
    pub discrete_indices: Vec<i64>,
    pub angles: Vec<f32>,
    pub sampling_intervals_ms: Vec<i64>,
    pub timestamps_ms: Vec<i64>,
}

impl MeasurementColumns {
    pub fn from_samples(samples: &[CapturedSample]) -> Self {
        let mut columns = Self {
            discrete_indices: Vec::with_capacity(samples.len()),
            angles: Vec::with_capacity(samples.len()),
            sampling_intervals_ms: Vec::with_capacity(samples.len()),
            timestamps_ms: Vec::with_capacity(samples.len()),
        };
        for s in samples {
            columns.discrete_indices.push(s.discrete_index);
            columns.angles.push(s.angle);
            columns.sampling_intervals_ms.push(s.sampling_interval_ms);
            columns.timestamps_ms.push(s.timestamp_ms);
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.discrete_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discrete_indices.is_empty()
    }
}

/// Append a sample with the next discrete index.
pub fn append(
    samples: &mut Vec<CapturedSample>,
    angle: f32,
    sampling_interval_ms: i64,
    timestamp_ms: i64,
) -> CapturedSample {
    let sample = CapturedSample {
        discrete_index: samples.len() as i64,
        angle,
        sampling_interval_ms,
        timestamp_ms,
    };
    samples.push(sample);
    sample
}
