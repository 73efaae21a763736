//! Frame cadence control.

/// Outcome of offering one frame to the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDecision {
    /// Process this frame under the given index.
    Accept(u64),
    /// Drop this frame; the index is still consumed.
    Skip(u64),
}

impl SampleDecision {
    pub fn frame_index(self) -> u64 {
        match self {
            SampleDecision::Accept(index) | SampleDecision::Skip(index) => index,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, SampleDecision::Accept(_))
    }
}

/// Picks one frame out of every `pick_every_n` delivered.
///
/// The counter advances on every delivered frame, accepted or not, so the
/// cadence follows frame arrival and not processing speed. Indices start at 1
/// and a frame is accepted when its index is a multiple of `pick_every_n`.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    pick_every_n: u32,
    counter: u64,
}

impl FrameSampler {
    /// `pick_every_n` of 0 is treated as 1.
    pub fn new(pick_every_n: u32) -> Self {
        Self {
            pick_every_n: pick_every_n.max(1),
            counter: 0,
        }
    }

    /// Count one incoming frame and decide whether it is processed.
    pub fn observe(&mut self) -> SampleDecision {
        self.counter += 1;
        if self.counter % u64::from(self.pick_every_n) == 0 {
            SampleDecision::Accept(self.counter)
        } else {
            SampleDecision::Skip(self.counter)
        }
    }

    /// Frames seen so far in this session.
    pub fn frames_seen(&self) -> u64 {
        self.counter
    }

    pub fn pick_every_n(&self) -> u32 {
        self.pick_every_n
    }
}
