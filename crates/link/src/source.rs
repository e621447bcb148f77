use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{ConfigError, SourceConfig};
use crate::net::{ReceiverCounters, ReceiverEndpoint, ReceiverStats};
use crate::publish::{PublishedFrame, publish_from};
use crate::subject::{SubjectInfo, SubjectRegistry, SubjectStatus};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[source] io::Error),
}

/// The live-link source: binds the configured UDP endpoint, runs the
/// ingestion loop on its own thread, and exposes the pull-based publish
/// surface a host animation runtime samples each tick.
///
/// The receive thread owns the socket; the consumer side only touches the
/// subject registry and the shared counters, so publishing never blocks on
/// network I/O.
pub struct DragonSource {
    registry: Arc<SubjectRegistry>,
    counters: Arc<ReceiverCounters>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DragonSource {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let mut endpoint =
            ReceiverEndpoint::bind(addr, config.recv_timeout).map_err(SourceError::Bind)?;
        let counters = endpoint.counters();
        let local_addr = endpoint.local_addr();
        let registry = Arc::new(SubjectRegistry::new(&config));
        let running = Arc::new(AtomicBool::new(true));

        let thread_registry = Arc::clone(&registry);
        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("dragonlink-recv".to_owned())
            .spawn(move || {
                log::info!("listening on {}", local_addr);
                while thread_running.load(Ordering::SeqCst) {
                    if let Err(err) = endpoint.recv_once(&thread_registry) {
                        log::warn!("socket receive error: {}", err);
                        thread::sleep(Duration::from_millis(50));
                    }
                    thread_registry.tick(Instant::now());
                }
                log::info!("receive loop stopped");
            })
            .map_err(SourceError::Spawn)?;

        Ok(Self {
            registry,
            counters,
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Best-estimate frame for `subject_id` at `sample_time_us` (sender
    /// clock, microseconds). `None` means the subject is unknown, lost, or
    /// has no usable data near the sample time; it is the expected outcome
    /// for a silent subject, not a failure.
    pub fn publish(&self, subject_id: u32, sample_time_us: u64) -> Option<PublishedFrame> {
        self.registry
            .with_stream(subject_id, |stream| publish_from(stream, sample_time_us))
            .flatten()
    }

    pub fn list_active_subjects(&self) -> Vec<SubjectInfo> {
        self.registry.list_active()
    }

    pub fn subject_status(&self, subject_id: u32) -> Option<SubjectStatus> {
        self.registry.subject_status(subject_id)
    }

    pub fn stats(&self) -> ReceiverStats {
        self.counters.snapshot()
    }

    /// Stops the receive loop and joins the thread. Idempotent; also runs
    /// on drop. The socket read timeout bounds how long this blocks.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::warn!("receive thread panicked during shutdown");
            }
        }
    }
}

impl Drop for DragonSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}
