//! Real-time pose ingestion over UDP.
//!
//! `dragonlink` receives binary pose/rig packets on a UDP socket, buffers
//! them per subject in timestamp order, and serves interpolated
//! best-estimate frames to a host animation runtime through a pull-based
//! publish API. Packet loss, reordering, and duplication are expected and
//! absorbed; a silent sender degrades the subject through stale to lost
//! rather than erroring.

pub mod config;
pub mod net;
pub mod publish;
pub mod source;
pub mod subject;

pub use config::{ConfigError, SourceConfig};
pub use net::{
    BoneTransform, DEFAULT_PORT, DecodeError, FrameFlags, MAX_BONES, MAX_PACKET_SIZE,
    PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PoseFrame, ReceiverStats, RigDescriptor,
    sequence_greater_than,
};
pub use publish::{PublishedFrame, interpolate_bone};
pub use source::{DragonSource, SourceError};
pub use subject::{InsertOutcome, SubjectInfo, SubjectStatus};
