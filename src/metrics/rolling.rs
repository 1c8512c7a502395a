//! Time-weighted rolling window over irregular samples.
//!
//! The first entry of a window is a reference point. Every later entry
//! contributes `value * (time - previous_time)`, so averages are weighted by
//! how long each value was held. Gaps longer than `max_gap` become pads that
//! hold no value and do not count toward active time; gaps over an hour are
//! collapsed into a single [`SampleValue::Break`].
//!
//! Extra statistics (such as Normalized Power) plug in through the
//! [`Accumulation`] trait instead of subclassing the window.

use std::collections::VecDeque;
use std::fmt::Debug;

/// Gaps larger than this many ideal gaps are soft-padded with the incoming value.
const SOFT_PAD_RATIO: f64 = 1.61803;

/// Gaps larger than this are collapsed into a break.
const BREAK_GAP: f64 = 3600.0;

/// Value of one committed window entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    /// A measured (or soft-padded) value
    Sample(f64),
    /// Filler for a pause; holds no value and is never active
    Pad,
    /// Stands in for this many elided seconds of a very long pause
    Break(f64),
}

impl SampleValue {
    /// Numeric value, zero for pads and breaks.
    pub fn value(&self) -> f64 {
        match self {
            SampleValue::Sample(v) => *v,
            SampleValue::Pad | SampleValue::Break(_) => 0.0,
        }
    }

    /// True for pads and breaks.
    pub fn is_pad(&self) -> bool {
        !matches!(self, SampleValue::Sample(_))
    }
}

/// Pluggable statistic maintained alongside the window's mean.
///
/// `push` is called for each committed entry and returns whatever must be
/// remembered to undo that entry later; `evict` receives it back when the
/// entry leaves the front of the window.
pub trait Accumulation: Clone + Debug {
    type Saved: Clone + Debug;

    /// Fresh state for a window with the given ideal sample gap.
    fn new(ideal_gap: f64) -> Self;

    /// Fold in an entry. `index` counts every entry ever committed to this
    /// window; `size` is the number of entries in the window including this one.
    fn push(&mut self, time: f64, value: &SampleValue, index: u64, size: usize) -> Self::Saved;

    /// Undo an entry leaving the front of the window.
    fn evict(&mut self, value: &SampleValue, saved: &Self::Saved);
}

/// Plain time-weighted mean with no extra state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Accumulation for Mean {
    type Saved = ();

    fn new(_ideal_gap: f64) -> Self {
        Mean
    }

    fn push(&mut self, _time: f64, _value: &SampleValue, _index: u64, _size: usize) {}

    fn evict(&mut self, _value: &SampleValue, _saved: &()) {}
}

/// Window configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowOptions {
    /// Window length in seconds; `None` keeps everything
    pub period: Option<f64>,
    /// Nominal sample spacing in seconds
    pub ideal_gap: f64,
    /// Gaps longer than this are recorded as pauses
    pub max_gap: f64,
    /// Measure average and fullness over active time instead of elapsed time
    pub active: bool,
    /// Zero values do not count as active
    pub ignore_zeros: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            period: None,
            ideal_gap: 1.0,
            max_gap: 15.0,
            active: true,
            ignore_zeros: false,
        }
    }
}

impl WindowOptions {
    /// Same options with a different period.
    pub fn with_period(self, period: f64) -> Self {
        Self {
            period: Some(period),
            ..self
        }
    }
}

/// Coalesces samples arriving faster than the ideal gap into one mean value.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    start: Option<f64>,
    end: f64,
    sum: f64,
    count: u32,
}

impl SampleBuffer {
    /// Offer a sample. Returns the previously buffered point once the buffer
    /// spans at least `ideal_gap`.
    pub fn offer(&mut self, time: f64, value: f64, ideal_gap: f64) -> Option<(f64, f64)> {
        let mut flushed = None;
        match self.start {
            Some(start) if time - start >= ideal_gap => {
                flushed = self.take();
                self.start = Some(time);
            }
            None => self.start = Some(time),
            Some(_) => {}
        }
        self.end = time;
        self.sum += value;
        self.count += 1;
        flushed
    }

    /// Take the buffered point, if any, as `(end_time, mean)`.
    pub fn take(&mut self) -> Option<(f64, f64)> {
        if self.count == 0 {
            return None;
        }
        let point = (self.end, self.sum / self.count as f64);
        self.sum = 0.0;
        self.count = 0;
        Some(point)
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone)]
struct Entry<S> {
    time: f64,
    value: SampleValue,
    saved: S,
}

/// Rolling window parameterized by an accumulation strategy.
#[derive(Debug, Clone)]
pub struct RollingWindow<A: Accumulation = Mean> {
    options: WindowOptions,
    entries: VecDeque<Entry<A::Saved>>,
    buffer: SampleBuffer,
    committed: u64,
    active_acc: f64,
    values_acc: f64,
    acc: A,
}

impl<A: Accumulation> RollingWindow<A> {
    /// Create an empty window.
    pub fn new(options: WindowOptions) -> Self {
        Self {
            options,
            entries: VecDeque::new(),
            buffer: SampleBuffer::default(),
            committed: 0,
            active_acc: 0.0,
            values_acc: 0.0,
            acc: A::new(options.ideal_gap),
        }
    }

    /// Window configuration.
    pub fn options(&self) -> &WindowOptions {
        &self.options
    }

    /// Accumulation strategy state.
    pub fn accumulation(&self) -> &A {
        &self.acc
    }

    /// Buffer a raw sample, committing the coalesced mean of earlier samples
    /// once they span the ideal gap. Returns the number of entries committed.
    pub fn add(&mut self, time: f64, value: f64) -> usize {
        match self.buffer.offer(time, value, self.options.ideal_gap) {
            Some((t, v)) => self.commit(t, SampleValue::Sample(v)),
            None => 0,
        }
    }

    /// Commit whatever is buffered.
    pub fn flush_buffered(&mut self) -> usize {
        match self.buffer.take() {
            Some((t, v)) => self.commit(t, SampleValue::Sample(v)),
            None => 0,
        }
    }

    /// Commit an entry directly, padding any gap since the previous entry.
    /// Entries older than the last one are ignored. Returns the number of
    /// entries committed, pads included.
    pub fn commit(&mut self, time: f64, value: SampleValue) -> usize {
        let Some(prev) = self.last_time() else {
            self.push(time, value);
            return 1;
        };
        let gap = time - prev;
        if gap < 0.0 {
            return 0;
        }
        let ideal = self.options.ideal_gap;
        let mut count = 0;
        if gap > self.options.max_gap {
            if gap > BREAK_GAP {
                let book_end = (BREAK_GAP / 2.0).floor() - ideal;
                count += self.pad_range(prev, ideal, book_end, SampleValue::Pad);
                self.push(prev + book_end, SampleValue::Break(gap - book_end * 2.0));
                count += 1;
                count += self.pad_range(prev, gap - book_end, gap, SampleValue::Pad);
            } else {
                count += self.pad_range(prev, ideal, gap, SampleValue::Pad);
            }
        } else if gap > ideal * SOFT_PAD_RATIO {
            // A zero soft pad carries nothing and must not count as active.
            let pad = match value {
                SampleValue::Sample(v) if v == 0.0 => SampleValue::Pad,
                other => other,
            };
            count += self.pad_range(prev, ideal, gap, pad);
        }
        self.push(time, value);
        count + 1
    }

    /// Push `value` at `base + offset` for each ideal step in `[from, to)`.
    fn pad_range(&mut self, base: f64, from: f64, to: f64, value: SampleValue) -> usize {
        let ideal = self.options.ideal_gap;
        let mut count = 0;
        let mut offset = from;
        while offset < to {
            self.push(base + offset, value);
            count += 1;
            offset = from + ideal * count as f64;
        }
        count
    }

    fn push(&mut self, time: f64, value: SampleValue) {
        if let Some(prev) = self.last_time() {
            if self.is_active_value(&value) {
                let gap = time - prev;
                self.active_acc += gap;
                self.values_acc += value.value() * gap;
            }
        }
        let saved = self
            .acc
            .push(time, &value, self.committed, self.entries.len() + 1);
        self.entries.push_back(Entry { time, value, saved });
        self.committed += 1;
        if self.options.period.is_some() {
            while self.full_after_shift() {
                self.shift();
            }
        }
    }

    /// Drop the reference entry; the next entry becomes the reference and
    /// stops contributing.
    fn shift(&mut self) {
        let Some(old) = self.entries.pop_front() else {
            return;
        };
        self.acc.evict(&old.value, &old.saved);
        if let Some(front) = self.entries.front() {
            if self.is_active_value(&front.value) {
                let gap = front.time - old.time;
                self.active_acc -= gap;
                self.values_acc -= front.value.value() * gap;
            }
        }
    }

    /// Whether the window would still be full without its reference entry.
    fn full_after_shift(&self) -> bool {
        let Some(period) = self.options.period else {
            return false;
        };
        if self.entries.len() < 2 {
            return false;
        }
        let measure = if self.options.active {
            let (first, second) = (&self.entries[0], &self.entries[1]);
            if self.is_active_value(&second.value) {
                self.active_acc - (second.time - first.time)
            } else {
                self.active_acc
            }
        } else {
            self.entries[self.entries.len() - 1].time - self.entries[1].time
        };
        measure >= period
    }

    /// Evict entries that fell out of an elapsed-time window by wall clock
    /// `now`, without a new sample.
    ///
    /// Active-time windows are a no-op: their length is measured in riding
    /// time, and wall clock passing without samples adds none, so nothing
    /// can age out until new active time is committed.
    pub fn resize(&mut self, now: f64) {
        let Some(period) = self.options.period else {
            return;
        };
        if self.options.active {
            return;
        }
        while self.entries.len() >= 2 && now - self.entries[1].time >= period {
            self.shift();
        }
    }

    fn is_active_value(&self, value: &SampleValue) -> bool {
        match value {
            SampleValue::Sample(v) => *v != 0.0 || !self.options.ignore_zeros,
            SampleValue::Pad | SampleValue::Break(_) => false,
        }
    }

    /// Seconds of active (contributing) time in the window.
    pub fn active(&self) -> f64 {
        self.active_acc
    }

    /// Seconds between the first and last entry.
    pub fn elapsed(&self) -> f64 {
        match (self.entries.front(), self.entries.back()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }

    /// Sum of `value * duration` over the window. For power this is joules.
    pub fn values_sum(&self) -> f64 {
        self.values_acc
    }

    /// Time-weighted average using the configured time base.
    pub fn avg(&self) -> Option<f64> {
        self.avg_over(self.options.active)
    }

    /// Time-weighted average over active time (`true`) or elapsed time.
    pub fn avg_over(&self, active: bool) -> Option<f64> {
        let time = if active { self.active() } else { self.elapsed() };
        if time > 0.0 {
            Some(self.values_acc / time)
        } else {
            None
        }
    }

    /// Whether the window spans its full period.
    pub fn full(&self) -> bool {
        let Some(period) = self.options.period else {
            return false;
        };
        let time = if self.options.active {
            self.active()
        } else {
            self.elapsed()
        };
        time >= period
    }

    /// Independent copy. With `reset` the copy is empty and keeps only the
    /// configuration; otherwise it continues from the current state.
    pub fn fork(&self, reset: bool) -> Self {
        if reset {
            Self::new(self.options)
        } else {
            self.clone()
        }
    }

    /// Number of entries, reference point included.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.entries.front().map(|e| e.time)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.entries.back().map(|e| e.time)
    }

    pub fn last_value(&self) -> Option<SampleValue> {
        self.entries.back().map(|e| e.value)
    }

    /// Iterate `(time, value)` from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = (f64, SampleValue)> + '_ {
        self.entries.iter().map(|e| (e.time, e.value))
    }
}
