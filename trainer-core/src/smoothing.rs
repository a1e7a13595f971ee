//! # Pitch Stream Smoothing
//!
//! A bounded rolling history of per-frame pitch estimates with a
//! sliding-window median for display, plus the attack gate that hides
//! the unstable first frames of every new sound.
//!
//! Gaps (`None`) are part of the history. They are never interpolated
//! across: a gap frame always smooths to `None` and the median window
//! never reaches back past a gap, so two sung phrases separated by a
//! breath never appear joined.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of pitch estimates.
#[derive(Debug, Clone)]
pub struct PitchHistory {
    entries: VecDeque<Option<f32>>,
    capacity: usize,
    window: usize,
}

/// A run of consecutive smoothed values with no gap in between.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// History index of the first value.
    pub start: usize,
    pub values: Vec<f32>,
}

impl PitchHistory {
    /// # Arguments
    /// * `capacity` - Maximum number of frames kept (oldest are dropped)
    /// * `window` - Number of trailing frames the median looks at
    pub fn new(capacity: usize, window: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            window: window.max(1),
        }
    }

    pub fn push(&mut self, estimate: Option<f32>) {
        self.entries.push_back(estimate);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Raw estimates, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = Option<f32>> + '_ {
        self.entries.iter().copied()
    }

    /// Median of the latest run of valid estimates, at most `window`
    /// frames long. `None` when the newest frame is a gap.
    pub fn current_smoothed(&self) -> Option<f32> {
        if self.entries.is_empty() {
            return None;
        }
        self.smoothed_at(self.entries.len() - 1)
    }

    /// Smoothed value for every position of the history, using a
    /// trailing window that ends at that position.
    pub fn smoothed_series(&self) -> Vec<Option<f32>> {
        (0..self.entries.len()).map(|i| self.smoothed_at(i)).collect()
    }

    /// Splits the smoothed series into disjoint runs; every `None`
    /// ends the current run.
    pub fn segments(&self) -> Vec<Segment> {
        split_segments(&self.smoothed_series())
    }

    fn smoothed_at(&self, index: usize) -> Option<f32> {
        let start = (index + 1).saturating_sub(self.window);
        let mut run = Vec::with_capacity(self.window);
        for entry in self.entries.range(start..=index).rev() {
            match entry {
                Some(p) => run.push(*p),
                None => break,
            }
        }
        median(&mut run)
    }
}

/// Upper median: for an even count the higher of the two middle values.
/// Returns `None` for an empty slice.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    Some(values[values.len() / 2])
}

/// Groups consecutive `Some` values; `None` is a hard break.
pub fn split_segments(series: &[Option<f32>]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Option<Segment> = None;

    for (i, value) in series.iter().enumerate() {
        match (value, current.as_mut()) {
            (Some(v), Some(segment)) => segment.values.push(*v),
            (Some(v), None) => {
                current = Some(Segment {
                    start: i,
                    values: vec![*v],
                })
            }
            (None, _) => {
                if let Some(segment) = current.take() {
                    segments.push(segment);
                }
            }
        }
    }
    if let Some(segment) = current {
        segments.push(segment);
    }
    segments
}

/// Suppresses the first frames after every silence-to-sound transition
/// so breath noise and the attack transient are neither drawn nor
/// scored.
///
/// Transitions are detected on the raw pitch, so suppressed frames
/// still count as sound and do not retrigger the gate.
#[derive(Debug, Clone)]
pub struct AttackGate {
    ignore_frames: usize,
    remaining: usize,
    last_raw: Option<f32>,
}

impl AttackGate {
    pub fn new(ignore_frames: usize) -> Self {
        Self {
            ignore_frames,
            remaining: 0,
            last_raw: None,
        }
    }

    pub fn filter(&mut self, raw: Option<f32>) -> Option<f32> {
        if self.last_raw.is_none() && raw.is_some() {
            self.remaining = self.ignore_frames;
        }
        self.last_raw = raw;

        if self.remaining > 0 {
            self.remaining -= 1;
            None
        } else {
            raw
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0;
        self.last_raw = None;
    }
}
