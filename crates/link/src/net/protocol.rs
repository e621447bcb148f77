//! Binary wire format for pose and rig packets.
//!
//! All multi-byte fields are big-endian (network byte order). Every packet
//! starts with a fixed 24-byte header:
//!
//! - Bytes 0-3: magic `0x44524C4B` ("DRLK")
//! - Byte 4: protocol version
//! - Byte 5: packet kind (0 = pose, 1 = rig)
//! - Byte 6: flags
//! - Byte 7: reserved, must be 0
//! - Bytes 8-11: subject id
//! - Bytes 12-15: sequence number
//! - Bytes 16-23: capture timestamp (microseconds, sender clock)
//!
//! A pose body is a u32 bone count followed by `bone_count` fixed-size
//! records: translation 3xf32, rotation quaternion 4xf32 (x, y, z, w), and,
//! only when `FrameFlags::HAS_SCALE` is set, scale 3xf32. A rig body is a
//! length-prefixed subject name, a u32 bone count, and one length-prefixed
//! UTF-8 name per bone.

use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};
use glam::{Quat, Vec3};

pub const PROTOCOL_MAGIC: u32 = 0x44524C4B;
pub const PROTOCOL_VERSION: u8 = 1;
pub const DEFAULT_PORT: u16 = 55555;
pub const MAX_PACKET_SIZE: usize = 1200;
pub const HEADER_SIZE: usize = 24;

/// Upper bound on the bone count a packet may declare. Checked before any
/// allocation so a corrupt length field cannot drive heap growth.
pub const MAX_BONES: usize = 256;

/// Upper bound on subject and bone name lengths in rig packets.
pub const MAX_NAME_LEN: usize = 63;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

const TRANSFORM_SIZE: usize = 28;
const TRANSFORM_SIZE_SCALED: usize = 40;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        const HAS_SCALE = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Pose = 0,
    Rig = 1,
}

impl PacketKind {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Pose),
            1 => Some(PacketKind::Rig),
            _ => None,
        }
    }
}

/// One named-bone rigid transform. Rotations are carried exactly as the
/// sender encoded them; renormalization happens at publish time, not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// One decoded pose snapshot for a subject at a sender timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    pub subject_id: u32,
    pub sequence: u32,
    pub timestamp_us: u64,
    pub flags: FrameFlags,
    pub transforms: Vec<BoneTransform>,
}

impl PoseFrame {
    pub fn new(subject_id: u32, sequence: u32, timestamp_us: u64) -> Self {
        Self {
            subject_id,
            sequence,
            timestamp_us,
            flags: FrameFlags::empty(),
            transforms: Vec::new(),
        }
    }

    fn transform_size(&self) -> usize {
        if self.flags.contains(FrameFlags::HAS_SCALE) {
            TRANSFORM_SIZE_SCALED
        } else {
            TRANSFORM_SIZE
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(
            HEADER_SIZE + 4 + self.transforms.len() * self.transform_size(),
        );
        put_header(
            &mut buf,
            PacketKind::Pose,
            self.flags,
            self.subject_id,
            self.sequence,
            self.timestamp_us,
        );
        buf.put_u32(self.transforms.len() as u32);

        let with_scale = self.flags.contains(FrameFlags::HAS_SCALE);
        for bone in &self.transforms {
            buf.put_f32(bone.translation.x);
            buf.put_f32(bone.translation.y);
            buf.put_f32(bone.translation.z);
            buf.put_f32(bone.rotation.x);
            buf.put_f32(bone.rotation.y);
            buf.put_f32(bone.rotation.z);
            buf.put_f32(bone.rotation.w);
            if with_scale {
                buf.put_f32(bone.scale.x);
                buf.put_f32(bone.scale.y);
                buf.put_f32(bone.scale.z);
            }
        }

        buf.to_vec()
    }
}

/// Skeleton topology announcement: names the subject and its bones. Sent by
/// the peer ahead of (and periodically alongside) pose traffic so pose
/// packets never have to carry bone identity themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigDescriptor {
    pub subject_id: u32,
    pub sequence: u32,
    pub timestamp_us: u64,
    pub name: String,
    pub bone_names: Vec<String>,
}

impl RigDescriptor {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + 64);
        put_header(
            &mut buf,
            PacketKind::Rig,
            FrameFlags::empty(),
            self.subject_id,
            self.sequence,
            self.timestamp_us,
        );
        put_name(&mut buf, &self.name);
        buf.put_u32(self.bone_names.len() as u32);
        for name in &self.bone_names {
            put_name(&mut buf, name);
        }
        buf.to_vec()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Pose(PoseFrame),
    Rig(RigDescriptor),
}

impl Packet {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut buf = data;

        let magic = buf.get_u32();
        if magic != PROTOCOL_MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let kind =
            PacketKind::from_byte(buf.get_u8()).ok_or_else(|| DecodeError::UnknownKind(data[5]))?;
        let flags = FrameFlags::from_bits_truncate(buf.get_u8());
        buf.advance(1); // reserved
        let subject_id = buf.get_u32();
        let sequence = buf.get_u32();
        let timestamp_us = buf.get_u64();

        match kind {
            PacketKind::Pose => {
                decode_pose_body(buf, subject_id, sequence, timestamp_us, flags).map(Packet::Pose)
            }
            PacketKind::Rig => {
                decode_rig_body(buf, subject_id, sequence, timestamp_us).map(Packet::Rig)
            }
        }
    }

    pub fn subject_id(&self) -> u32 {
        match self {
            Packet::Pose(frame) => frame.subject_id,
            Packet::Rig(rig) => rig.subject_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("packet truncated: {actual} bytes, need at least {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("declared bone count {0} exceeds limit of {MAX_BONES}")]
    BoneCountExceeded(usize),
    #[error("body length mismatch: header declares {expected} bytes, payload has {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("name field exceeds {MAX_NAME_LEN} bytes or is not valid UTF-8")]
    InvalidName,
}

fn put_header(
    buf: &mut BytesMut,
    kind: PacketKind,
    flags: FrameFlags,
    subject_id: u32,
    sequence: u32,
    timestamp_us: u64,
) {
    buf.put_u32(PROTOCOL_MAGIC);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(kind as u8);
    buf.put_u8(flags.bits());
    buf.put_u8(0);
    buf.put_u32(subject_id);
    buf.put_u32(sequence);
    buf.put_u64(timestamp_us);
}

fn put_name(buf: &mut BytesMut, name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_NAME_LEN);
    buf.put_u8(len as u8);
    buf.put_slice(&bytes[..len]);
}

fn decode_pose_body(
    mut buf: &[u8],
    subject_id: u32,
    sequence: u32,
    timestamp_us: u64,
    flags: FrameFlags,
) -> Result<PoseFrame, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated {
            expected: HEADER_SIZE + 4,
            actual: HEADER_SIZE + buf.remaining(),
        });
    }

    let bone_count = buf.get_u32() as usize;
    if bone_count > MAX_BONES {
        return Err(DecodeError::BoneCountExceeded(bone_count));
    }

    let transform_size = if flags.contains(FrameFlags::HAS_SCALE) {
        TRANSFORM_SIZE_SCALED
    } else {
        TRANSFORM_SIZE
    };
    let expected = bone_count * transform_size;
    if buf.remaining() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: buf.remaining(),
        });
    }

    let with_scale = flags.contains(FrameFlags::HAS_SCALE);
    let mut transforms = Vec::with_capacity(bone_count);
    for _ in 0..bone_count {
        let translation = Vec3::new(buf.get_f32(), buf.get_f32(), buf.get_f32());
        let rotation = Quat::from_xyzw(buf.get_f32(), buf.get_f32(), buf.get_f32(), buf.get_f32());
        let scale = if with_scale {
            Vec3::new(buf.get_f32(), buf.get_f32(), buf.get_f32())
        } else {
            Vec3::ONE
        };
        transforms.push(BoneTransform {
            translation,
            rotation,
            scale,
        });
    }

    Ok(PoseFrame {
        subject_id,
        sequence,
        timestamp_us,
        flags,
        transforms,
    })
}

fn decode_rig_body(
    mut buf: &[u8],
    subject_id: u32,
    sequence: u32,
    timestamp_us: u64,
) -> Result<RigDescriptor, DecodeError> {
    let name = get_name(&mut buf)?;

    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated {
            expected: 4,
            actual: buf.remaining(),
        });
    }
    let bone_count = buf.get_u32() as usize;
    if bone_count > MAX_BONES {
        return Err(DecodeError::BoneCountExceeded(bone_count));
    }

    let mut bone_names = Vec::with_capacity(bone_count);
    for _ in 0..bone_count {
        bone_names.push(get_name(&mut buf)?);
    }

    if buf.has_remaining() {
        return Err(DecodeError::LengthMismatch {
            expected: 0,
            actual: buf.remaining(),
        });
    }

    Ok(RigDescriptor {
        subject_id,
        sequence,
        timestamp_us,
        name,
        bone_names,
    })
}

fn get_name(buf: &mut &[u8]) -> Result<String, DecodeError> {
    if buf.remaining() < 1 {
        return Err(DecodeError::Truncated {
            expected: 1,
            actual: 0,
        });
    }
    let len = buf.get_u8() as usize;
    if len > MAX_NAME_LEN {
        return Err(DecodeError::InvalidName);
    }
    if buf.remaining() < len {
        return Err(DecodeError::Truncated {
            expected: len,
            actual: buf.remaining(),
        });
    }
    let name =
        std::str::from_utf8(&buf[..len]).map_err(|_| DecodeError::InvalidName)?.to_owned();
    buf.advance(len);
    Ok(name)
}
