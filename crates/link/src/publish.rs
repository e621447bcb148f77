//! Turns buffered frames into a single best-estimate pose at an arbitrary
//! sample time: linear interpolation for translation and scale, spherical
//! interpolation for rotation.

use crate::net::{BoneTransform, PoseFrame};
use crate::subject::{Sample, SubjectStatus, SubjectStream};

/// The publisher's output: one resolved pose for a subject at the consumer's
/// sample time. Produced fresh on every publish call and owned by the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedFrame {
    pub subject_id: u32,
    pub sample_time_us: u64,
    /// Rig names when the sender announced them, `bone_N` placeholders
    /// otherwise.
    pub bone_names: Vec<String>,
    pub transforms: Vec<BoneTransform>,
    /// True when the frame is a held last-known pose rather than fresh or
    /// interpolated data; the consumer may fade or ignore it.
    pub extrapolated: bool,
}

/// Samples the stream at `sample_time_us`. `None` is the ordinary
/// "subject unavailable" outcome, never an error.
pub(crate) fn publish_from(
    stream: &SubjectStream,
    sample_time_us: u64,
) -> Option<PublishedFrame> {
    if stream.status() == SubjectStatus::Lost {
        return None;
    }

    let (transforms, extrapolated) = match stream.window().sample_at(sample_time_us) {
        Sample::Empty => return None,
        Sample::Hold(frame) => (frame.transforms.clone(), true),
        Sample::Bracketed { before, after } => {
            if before.timestamp_us == after.timestamp_us {
                // Exact hit (or clamp to the window edge): serve the frame
                // as the sender shipped it.
                (before.transforms.clone(), false)
            } else if before.transforms.len() != after.transforms.len() {
                // Topology changed between the two frames; blending bone i
                // of one against bone i of the other would be nonsense.
                (nearer(before, after, sample_time_us).transforms.clone(), false)
            } else {
                let t = (sample_time_us - before.timestamp_us) as f32
                    / (after.timestamp_us - before.timestamp_us) as f32;
                let blended = before
                    .transforms
                    .iter()
                    .zip(&after.transforms)
                    .map(|(a, b)| interpolate_bone(a, b, t))
                    .collect();
                (blended, false)
            }
        }
    };

    let bone_names = resolve_bone_names(stream, transforms.len());

    Some(PublishedFrame {
        subject_id: stream.subject_id(),
        sample_time_us,
        bone_names,
        transforms,
        extrapolated,
    })
}

fn nearer<'a>(before: &'a PoseFrame, after: &'a PoseFrame, t_us: u64) -> &'a PoseFrame {
    if t_us - before.timestamp_us <= after.timestamp_us - t_us {
        before
    } else {
        after
    }
}

/// Blends two bone transforms at `t` in [0, 1]. Rotations are normalized
/// here (the codec passes them through untouched) and slerped along the
/// shorter arc.
pub fn interpolate_bone(from: &BoneTransform, to: &BoneTransform, t: f32) -> BoneTransform {
    let translation = from.translation.lerp(to.translation, t);
    let scale = from.scale.lerp(to.scale, t);

    let from_rot = from.rotation.normalize();
    let to_rot = to.rotation.normalize();
    let rotation = if from_rot.dot(to_rot) < 0.0 {
        from_rot.slerp(-to_rot, t)
    } else {
        from_rot.slerp(to_rot, t)
    };

    BoneTransform {
        translation,
        rotation,
        scale,
    }
}

fn resolve_bone_names(stream: &SubjectStream, bone_count: usize) -> Vec<String> {
    if let Some(rig) = stream.rig() {
        if rig.bone_names.len() == bone_count {
            return rig.bone_names.clone();
        }
        log::debug!(
            "subject {} rig names {} bones but frame has {}",
            stream.subject_id(),
            rig.bone_names.len(),
            bone_count
        );
    }
    (0..bone_count).map(|i| format!("bone_{}", i)).collect()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use glam::{Quat, Vec3};

    use super::*;
    use crate::net::RigDescriptor;

    fn stream() -> SubjectStream {
        SubjectStream::new(1, 64, Duration::from_secs(1), Instant::now())
    }

    fn frame_with_bone(sequence: u32, timestamp_us: u64, bone: BoneTransform) -> PoseFrame {
        let mut frame = PoseFrame::new(1, sequence, timestamp_us);
        frame.transforms.push(bone);
        frame
    }

    fn insert(stream: &mut SubjectStream, frame: PoseFrame) {
        stream.accept_frame(frame, Instant::now());
    }

    #[test]
    fn midpoint_is_arithmetic_and_spherical_mean() {
        let mut s = stream();
        insert(
            &mut s,
            frame_with_bone(1, 0, BoneTransform {
                translation: Vec3::new(0.0, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            }),
        );
        insert(
            &mut s,
            frame_with_bone(2, 100_000, BoneTransform {
                translation: Vec3::new(10.0, 20.0, 30.0),
                rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
                scale: Vec3::ONE,
            }),
        );

        let published = publish_from(&s, 50_000).unwrap();
        assert!(!published.extrapolated);

        let bone = &published.transforms[0];
        assert!((bone.translation - Vec3::new(5.0, 10.0, 15.0)).length() < 1e-4);

        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(bone.rotation.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn exact_timestamp_returns_frame_unmodified() {
        // Deliberately unnormalized rotation: an exact hit must pass it
        // through untouched.
        let raw = BoneTransform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_xyzw(0.0, 2.0, 0.0, 0.0),
            scale: Vec3::ONE,
        };
        let mut s = stream();
        insert(&mut s, frame_with_bone(1, 0, BoneTransform::default()));
        insert(&mut s, frame_with_bone(2, 100_000, raw));
        insert(&mut s, frame_with_bone(3, 200_000, BoneTransform::default()));

        let published = publish_from(&s, 100_000).unwrap();
        assert!(!published.extrapolated);
        assert_eq!(published.transforms[0], raw);
    }

    #[test]
    fn slerp_takes_the_shorter_arc() {
        let target = Quat::from_rotation_y(0.5);
        let mut s = stream();
        insert(
            &mut s,
            frame_with_bone(1, 0, BoneTransform {
                rotation: Quat::IDENTITY,
                ..BoneTransform::default()
            }),
        );
        // Same orientation as `target`, opposite sign: the blend must not
        // swing the long way around.
        insert(
            &mut s,
            frame_with_bone(2, 100_000, BoneTransform {
                rotation: -target,
                ..BoneTransform::default()
            }),
        );

        let published = publish_from(&s, 50_000).unwrap();
        let expected = Quat::from_rotation_y(0.25);
        assert!(published.transforms[0].rotation.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn hold_frame_is_flagged_extrapolated() {
        let mut s = stream();
        insert(&mut s, frame_with_bone(1, 0, BoneTransform::default()));

        let published = publish_from(&s, 400_000).unwrap();
        assert!(published.extrapolated);
        assert_eq!(published.transforms[0], BoneTransform::default());
    }

    #[test]
    fn empty_window_is_unavailable() {
        let s = stream();
        assert!(publish_from(&s, 0).is_none());
    }

    #[test]
    fn mismatched_bone_counts_fall_back_to_nearer_frame() {
        let mut small = PoseFrame::new(1, 1, 0);
        small.transforms.push(BoneTransform::default());

        let mut big = PoseFrame::new(1, 2, 100_000);
        big.transforms.push(BoneTransform::default());
        big.transforms.push(BoneTransform::default());

        let mut s = stream();
        insert(&mut s, small);
        insert(&mut s, big);

        let published = publish_from(&s, 30_000).unwrap();
        assert_eq!(published.transforms.len(), 1);

        let published = publish_from(&s, 70_000).unwrap();
        assert_eq!(published.transforms.len(), 2);
    }

    #[test]
    fn rig_names_are_resolved_when_counts_match() {
        let mut s = stream();
        s.set_rig(
            RigDescriptor {
                subject_id: 1,
                sequence: 0,
                timestamp_us: 0,
                name: "Hero".to_owned(),
                bone_names: vec!["root".to_owned()],
            },
            Instant::now(),
        );
        insert(&mut s, frame_with_bone(1, 0, BoneTransform::default()));

        let published = publish_from(&s, 0).unwrap();
        assert_eq!(published.bone_names, vec!["root".to_owned()]);
    }

    #[test]
    fn missing_rig_yields_indexed_names() {
        let mut s = stream();
        insert(&mut s, frame_with_bone(1, 0, BoneTransform::default()));

        let published = publish_from(&s, 0).unwrap();
        assert_eq!(published.bone_names, vec!["bone_0".to_owned()]);
    }
}
