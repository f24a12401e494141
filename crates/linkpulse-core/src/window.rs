//! Fixed-capacity sample window.
//!
//! The window is a FIFO of [`WindowSlot`]s that is always exactly
//! `capacity` long: it starts full of gaps and every push evicts the oldest
//! slot. Two producers append to it: the periodic tick pushes a gap, an
//! admitted sample pushes the sample. The tick keeps the time axis moving
//! while the link is silent.

use std::collections::VecDeque;

use crate::sample::Sample;

/// Default number of slots (≈96 s at one gap per 32 ms tick).
pub const DEFAULT_CAPACITY: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowSlot {
    Sample(Sample),
    Gap,
}

impl WindowSlot {
    pub fn as_sample(&self) -> Option<&Sample> {
        match self {
            WindowSlot::Sample(s) => Some(s),
            WindowSlot::Gap => None,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, WindowSlot::Gap)
    }
}

#[derive(Debug, PartialEq)]
pub struct SampleWindow {
    slots: VecDeque<WindowSlot>,
    capacity: usize,
    samples: usize,
    revision: u64,
}

impl SampleWindow {
    /// A window of `capacity` gaps. Capacity is at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = VecDeque::with_capacity(capacity);
        slots.resize(capacity, WindowSlot::Gap);
        SampleWindow {
            slots,
            capacity,
            samples: 0,
            revision: 0,
        }
    }

    /// Append a gap (one tick with no data).
    pub fn push_gap(&mut self) -> Option<WindowSlot> {
        self.push(WindowSlot::Gap)
    }

    pub fn push_sample(&mut self, sample: Sample) -> Option<WindowSlot> {
        self.push(WindowSlot::Sample(sample))
    }

    /// Append a slot, returning the one evicted to make room.
    pub fn push(&mut self, slot: WindowSlot) -> Option<WindowSlot> {
        let evicted = if self.slots.len() == self.capacity {
            self.slots.pop_front()
        } else {
            None
        };
        if let Some(WindowSlot::Sample(_)) = evicted {
            self.samples -= 1;
        }
        if !slot.is_gap() {
            self.samples += 1;
        }
        self.slots.push_back(slot);
        self.revision += 1;
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of pushes since creation; changes whenever the contents do.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of non-gap slots currently held.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Slots oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &WindowSlot> + ExactSizeIterator {
        self.slots.iter()
    }

    /// Only the samples, oldest first.
    pub fn samples(&self) -> impl DoubleEndedIterator<Item = &Sample> {
        self.slots.iter().filter_map(WindowSlot::as_sample)
    }

    pub fn latest_sample(&self) -> Option<&Sample> {
        self.samples().next_back()
    }

    pub fn to_vec(&self) -> Vec<WindowSlot> {
        self.slots.iter().copied().collect()
    }
}

// `clone_from` reuses the destination's slots; the runtime republishes into
// the same watch value every tick.
impl Clone for SampleWindow {
    fn clone(&self) -> Self {
        SampleWindow {
            slots: self.slots.clone(),
            capacity: self.capacity,
            samples: self.samples,
            revision: self.revision,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.slots.clone_from(&source.slots);
        self.capacity = source.capacity;
        self.samples = source.samples;
        self.revision = source.revision;
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64) -> Sample {
        Sample {
            timestamp_ms: ts,
            stats: None,
        }
    }

    #[test]
    fn starts_full_of_gaps() {
        let w = SampleWindow::default();
        assert_eq!(w.len(), DEFAULT_CAPACITY);
        assert!(w.iter().all(WindowSlot::is_gap));
        assert_eq!(w.sample_count(), 0);
        assert!(w.latest_sample().is_none());
    }

    #[test]
    fn push_evicts_oldest() {
        let mut w = SampleWindow::new(3);
        assert_eq!(w.push_sample(sample(1)), Some(WindowSlot::Gap));
        w.push_gap();
        w.push_sample(sample(2));
        assert_eq!(w.push_gap(), Some(WindowSlot::Sample(sample(1))));
        assert_eq!(w.len(), 3);
        assert_eq!(
            w.to_vec(),
            vec![WindowSlot::Gap, WindowSlot::Sample(sample(2)), WindowSlot::Gap]
        );
    }

    #[test]
    fn sample_count_tracks_evictions() {
        let mut w = SampleWindow::new(4);
        for ts in 0..6 {
            w.push_sample(sample(ts));
        }
        assert_eq!(w.sample_count(), 4);
        w.push_gap();
        w.push_gap();
        assert_eq!(w.sample_count(), 2);
        assert_eq!(w.samples().map(|s| s.timestamp_ms).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn latest_sample_skips_trailing_gaps() {
        let mut w = SampleWindow::new(10);
        w.push_sample(sample(7));
        w.push_sample(sample(8));
        w.push_gap();
        w.push_gap();
        assert_eq!(w.latest_sample().map(|s| s.timestamp_ms), Some(8));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut w = SampleWindow::new(0);
        assert_eq!(w.capacity(), 1);
        w.push_sample(sample(1));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn clone_from_copies_contents() {
        let mut src = SampleWindow::new(5);
        src.push_sample(sample(3));
        let mut dst = SampleWindow::new(5);
        dst.clone_from(&src);
        assert_eq!(dst, src);
        assert_eq!(dst.sample_count(), 1);
        assert_eq!(dst.revision(), 1);
    }
}
