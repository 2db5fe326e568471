/// Opaque id of one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId(u64);

/// Cooperative single-threaded frame scheduler. At most one frame is pending
/// at a time: requesting while one is pending returns the pending id.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Option<FrameId>,
    fired: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) -> FrameId {
        if let Some(pending) = self.pending {
            return pending;
        }
        self.next_id += 1;
        let id = FrameId(self.next_id);
        self.pending = Some(id);
        id
    }

    /// Cancels the pending frame; it will never be returned by `take_due`.
    pub fn cancel(&mut self) -> Option<FrameId> {
        self.pending.take()
    }

    /// Called by the driver at a frame boundary.
    pub fn take_due(&mut self) -> Option<FrameId> {
        let due = self.pending.take();
        if due.is_some() {
            self.fired += 1;
        }
        due
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn frames_fired(&self) -> u64 {
        self.fired
    }
}
