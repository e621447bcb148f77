use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::stream::{SubjectStatus, SubjectStream};
use super::window::InsertOutcome;
use crate::config::SourceConfig;
use crate::net::{PoseFrame, RigDescriptor};

/// Discovery entry for one live subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub subject_id: u32,
    pub name: Option<String>,
    pub status: SubjectStatus,
    pub buffered_frames: usize,
}

/// Shared map of subject streams. This is the only state shared between the
/// ingestion path and the publish path: the outer lock is held just long
/// enough to look up or insert an `Arc`, and all frame work happens under
/// the per-subject mutex, so traffic on one subject never stalls sampling
/// of another.
pub struct SubjectRegistry {
    subjects: RwLock<HashMap<u32, Arc<Mutex<SubjectStream>>>>,
    max_frames: usize,
    max_frame_age: Duration,
    stale_timeout: Duration,
    lost_timeout: Duration,
}

impl SubjectRegistry {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
            max_frames: config.max_buffered_frames,
            max_frame_age: config.max_frame_age,
            stale_timeout: config.stale_timeout,
            lost_timeout: config.lost_timeout,
        }
    }

    fn stream_or_create(&self, subject_id: u32, now: Instant) -> Arc<Mutex<SubjectStream>> {
        if let Some(stream) = self.subjects.read().get(&subject_id) {
            return Arc::clone(stream);
        }

        let mut subjects = self.subjects.write();
        Arc::clone(subjects.entry(subject_id).or_insert_with(|| {
            Arc::new(Mutex::new(SubjectStream::new(
                subject_id,
                self.max_frames,
                self.max_frame_age,
                now,
            )))
        }))
    }

    fn stream(&self, subject_id: u32) -> Option<Arc<Mutex<SubjectStream>>> {
        self.subjects.read().get(&subject_id).map(Arc::clone)
    }

    pub fn insert_frame(&self, frame: PoseFrame, now: Instant) -> InsertOutcome {
        let stream = self.stream_or_create(frame.subject_id, now);
        let mut stream = stream.lock();
        stream.accept_frame(frame, now)
    }

    pub fn set_rig(&self, rig: RigDescriptor, now: Instant) {
        let stream = self.stream_or_create(rig.subject_id, now);
        let mut stream = stream.lock();
        stream.set_rig(rig, now);
    }

    /// Runs `f` against the subject's stream under its lock.
    pub fn with_stream<R>(&self, subject_id: u32, f: impl FnOnce(&SubjectStream) -> R) -> Option<R> {
        let stream = self.stream(subject_id)?;
        let stream = stream.lock();
        Some(f(&stream))
    }

    pub fn subject_status(&self, subject_id: u32) -> Option<SubjectStatus> {
        self.with_stream(subject_id, |stream| stream.status())
    }

    pub fn contains(&self, subject_id: u32) -> bool {
        self.subjects.read().contains_key(&subject_id)
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.read().len()
    }

    /// Advances every subject's liveness state machine and forgets subjects
    /// that have stayed `Lost` for another full lost-timeout. Only `Lost`
    /// subjects are ever destroyed.
    pub fn tick(&self, now: Instant) {
        let streams: Vec<(u32, Arc<Mutex<SubjectStream>>)> = self
            .subjects
            .read()
            .iter()
            .map(|(&id, stream)| (id, Arc::clone(stream)))
            .collect();

        let mut forget = Vec::new();
        for (subject_id, stream) in streams {
            let mut stream = stream.lock();
            let status = stream.tick(now, self.stale_timeout, self.lost_timeout);
            if status == SubjectStatus::Lost && stream.silent_for(now) >= self.lost_timeout * 2 {
                forget.push(subject_id);
            }
        }

        if !forget.is_empty() {
            let mut subjects = self.subjects.write();
            for subject_id in forget {
                subjects.remove(&subject_id);
                log::info!("forgetting lost subject {}", subject_id);
            }
        }
    }

    /// Subjects currently worth showing to a consumer: `Connected` and
    /// `Stale` streams, sorted by id. `Lost` subjects are omitted.
    pub fn list_active(&self) -> Vec<SubjectInfo> {
        let streams: Vec<Arc<Mutex<SubjectStream>>> =
            self.subjects.read().values().map(Arc::clone).collect();

        let mut infos: Vec<SubjectInfo> = streams
            .iter()
            .filter_map(|stream| {
                let stream = stream.lock();
                if stream.status() == SubjectStatus::Lost {
                    return None;
                }
                Some(SubjectInfo {
                    subject_id: stream.subject_id(),
                    name: stream.name().map(str::to_owned),
                    status: stream.status(),
                    buffered_frames: stream.window().len(),
                })
            })
            .collect();
        infos.sort_by_key(|info| info.subject_id);
        infos
    }
}
