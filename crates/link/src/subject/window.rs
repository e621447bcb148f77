use std::collections::VecDeque;
use std::time::Duration;

use crate::net::PoseFrame;

/// How many recently accepted sequence numbers are remembered per subject
/// for duplicate suppression.
const DUPLICATE_WINDOW: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Frame entered the window; `evicted` frames were dropped to make room
    /// or because they aged out.
    Accepted { evicted: usize },
    /// Sequence number was already seen for this subject; the frame was
    /// silently dropped.
    Duplicate,
}

/// Result of sampling the window at a point in time.
#[derive(Debug)]
pub enum Sample<'a> {
    /// Two frames straddle the sample time; interpolate between them. The
    /// pair degenerates to `before == after` on an exact timestamp hit (or
    /// when the sample time precedes the whole window), in which case the
    /// frame is served as-is.
    Bracketed {
        before: &'a PoseFrame,
        after: &'a PoseFrame,
    },
    /// Only older frames exist; serve the newest one, flagged as held.
    Hold(&'a PoseFrame),
    /// Nothing buffered within `max_frame_age` of the sample time.
    Empty,
}

/// Bounded, timestamp-ordered store of recent frames for one subject.
///
/// Frames are kept sorted by capture timestamp, not arrival order, since UDP
/// makes no ordering guarantee. Sequence numbers feed duplicate suppression
/// only and never override timestamp order.
#[derive(Debug)]
pub struct FrameWindow {
    frames: VecDeque<PoseFrame>,
    recent_sequences: VecDeque<u32>,
    max_frames: usize,
    max_age_us: u64,
}

impl FrameWindow {
    pub fn new(max_frames: usize, max_frame_age: Duration) -> Self {
        Self {
            frames: VecDeque::with_capacity(max_frames),
            recent_sequences: VecDeque::with_capacity(DUPLICATE_WINDOW),
            max_frames,
            max_age_us: max_frame_age.as_micros() as u64,
        }
    }

    pub fn insert(&mut self, frame: PoseFrame) -> InsertOutcome {
        if self.recent_sequences.contains(&frame.sequence) {
            return InsertOutcome::Duplicate;
        }
        if self.recent_sequences.len() >= DUPLICATE_WINDOW {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(frame.sequence);

        let pos = self
            .frames
            .iter()
            .position(|f| f.timestamp_us > frame.timestamp_us)
            .unwrap_or(self.frames.len());
        self.frames.insert(pos, frame);

        let mut evicted = 0;
        while self.frames.len() > self.max_frames {
            self.frames.pop_front();
            evicted += 1;
        }
        if let Some(newest) = self.frames.back().map(|f| f.timestamp_us) {
            while self
                .frames
                .front()
                .is_some_and(|f| newest.saturating_sub(f.timestamp_us) > self.max_age_us)
            {
                self.frames.pop_front();
                evicted += 1;
            }
        }

        InsertOutcome::Accepted { evicted }
    }

    pub fn sample_at(&self, t_us: u64) -> Sample<'_> {
        let newest = match self.frames.back() {
            Some(frame) => frame,
            None => return Sample::Empty,
        };

        if t_us > newest.timestamp_us {
            if t_us - newest.timestamp_us > self.max_age_us {
                return Sample::Empty;
            }
            return Sample::Hold(newest);
        }

        let oldest = self.frames.front().expect("non-empty window");
        if t_us <= oldest.timestamp_us {
            return Sample::Bracketed {
                before: oldest,
                after: oldest,
            };
        }

        for (earlier, later) in self.frames.iter().zip(self.frames.iter().skip(1)) {
            if earlier.timestamp_us < t_us && t_us <= later.timestamp_us {
                if later.timestamp_us == t_us {
                    return Sample::Bracketed {
                        before: later,
                        after: later,
                    };
                }
                return Sample::Bracketed {
                    before: earlier,
                    after: later,
                };
            }
        }

        // oldest < t_us <= newest, so the scan above always brackets.
        Sample::Hold(newest)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.recent_sequences.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn latest_timestamp(&self) -> Option<u64> {
        self.frames.back().map(|f| f.timestamp_us)
    }

    #[cfg(test)]
    pub fn timestamps(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.timestamp_us).collect()
    }
}
