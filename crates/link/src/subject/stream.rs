use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::window::{FrameWindow, InsertOutcome};
use crate::net::{PoseFrame, RigDescriptor, sequence_greater_than};

/// Liveness of a subject. A subject that has never sent anything simply does
/// not exist in the registry, so there is no explicit `Unknown` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectStatus {
    /// Fresh data within the stale timeout.
    Connected,
    /// No accepted traffic for a while; held frames are still served.
    Stale,
    /// Silent past the lost timeout; buffered state has been cleared and
    /// publishing reports the subject unavailable until traffic resumes.
    Lost,
}

/// Per-subject state: frame window, rig topology, liveness.
#[derive(Debug)]
pub struct SubjectStream {
    subject_id: u32,
    window: FrameWindow,
    rig: Option<RigDescriptor>,
    last_seen: Instant,
    status: SubjectStatus,
}

impl SubjectStream {
    pub(crate) fn new(
        subject_id: u32,
        max_frames: usize,
        max_frame_age: Duration,
        now: Instant,
    ) -> Self {
        log::info!("subject {} connected", subject_id);
        Self {
            subject_id,
            window: FrameWindow::new(max_frames, max_frame_age),
            rig: None,
            last_seen: now,
            status: SubjectStatus::Connected,
        }
    }

    pub fn subject_id(&self) -> u32 {
        self.subject_id
    }

    pub fn status(&self) -> SubjectStatus {
        self.status
    }

    pub fn window(&self) -> &FrameWindow {
        &self.window
    }

    pub fn rig(&self) -> Option<&RigDescriptor> {
        self.rig.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.rig.as_ref().map(|rig| rig.name.as_str())
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub(crate) fn accept_frame(&mut self, frame: PoseFrame, now: Instant) -> InsertOutcome {
        let outcome = self.window.insert(frame);
        if let InsertOutcome::Accepted { .. } = outcome {
            self.touch(now);
        }
        outcome
    }

    /// Rig announcements count as liveness traffic. A rig older than the one
    /// already held (reordered resend) does not replace it.
    pub(crate) fn set_rig(&mut self, rig: RigDescriptor, now: Instant) {
        self.touch(now);
        let replace = match &self.rig {
            Some(current) => sequence_greater_than(rig.sequence, current.sequence),
            None => true,
        };
        if replace {
            self.rig = Some(rig);
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_seen = now;
        if self.status != SubjectStatus::Connected {
            log::info!(
                "subject {} reconnected (was {:?})",
                self.subject_id,
                self.status
            );
            self.status = SubjectStatus::Connected;
        }
    }

    /// Drives the liveness state machine from wall-clock silence. Called on
    /// the receive loop's cadence so transitions fire even when the sender
    /// is completely quiet.
    pub(crate) fn tick(
        &mut self,
        now: Instant,
        stale_timeout: Duration,
        lost_timeout: Duration,
    ) -> SubjectStatus {
        let silent = self.silent_for(now);

        if self.status == SubjectStatus::Connected && silent >= stale_timeout {
            log::debug!("subject {} stale after {:?}", self.subject_id, silent);
            self.status = SubjectStatus::Stale;
        }
        if self.status == SubjectStatus::Stale && silent >= lost_timeout {
            log::info!("subject {} lost after {:?}", self.subject_id, silent);
            self.status = SubjectStatus::Lost;
            // A later reconnect is a fresh subject: no stale frames, no
            // stale sequence tracking, no assumed topology.
            self.window.clear();
            self.rig = None;
        }

        self.status
    }
}
