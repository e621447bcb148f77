mod protocol;
mod receiver;

pub use protocol::{
    BoneTransform, DEFAULT_PORT, DecodeError, FrameFlags, HEADER_SIZE, MAX_BONES, MAX_NAME_LEN,
    MAX_PACKET_SIZE, PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketKind, PoseFrame,
    RigDescriptor, sequence_greater_than,
};
pub use receiver::{ReceiverCounters, ReceiverEndpoint, ReceiverStats};
