//! End-to-end pipeline tests: real loopback sockets feeding the receive
//! thread, sampled through the publish API.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

use dragonlink::{
    BoneTransform, DragonSource, PoseFrame, RigDescriptor, SourceConfig, SubjectStatus,
};

fn test_config() -> SourceConfig {
    SourceConfig {
        bind_addr: "127.0.0.1".to_owned(),
        port: 0,
        recv_timeout: Duration::from_millis(10),
        ..SourceConfig::default()
    }
}

fn start_source(config: SourceConfig) -> (DragonSource, UdpSocket) {
    let source = DragonSource::new(config).unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.connect(source.local_addr()).unwrap();
    (source, sender)
}

fn wait_for(mut condition: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn frame(subject_id: u32, sequence: u32, timestamp_us: u64, x: f32) -> PoseFrame {
    let mut frame = PoseFrame::new(subject_id, sequence, timestamp_us);
    frame.transforms.push(BoneTransform {
        translation: Vec3::new(x, 0.0, 0.0),
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    });
    frame
}

#[test]
fn out_of_order_arrival_interpolates_correctly() {
    let (source, sender) = start_source(test_config());

    // Timestamps 0, 0.1s, 0.2s delivered as 0.2, 0.0, 0.1.
    for &(sequence, timestamp_us) in &[(3u32, 200_000u64), (1, 0), (2, 100_000)] {
        let x = timestamp_us as f32 / 1000.0;
        sender.send(&frame(1, sequence, timestamp_us, x).encode()).unwrap();
    }

    assert!(wait_for(|| source.stats().frames_accepted == 3, 1000));

    let published = source.publish(1, 150_000).expect("subject should be available");
    assert!(!published.extrapolated);
    assert!((published.transforms[0].translation.x - 150.0).abs() < 1e-3);

    // Unknown subjects are simply unavailable.
    assert!(source.publish(99, 150_000).is_none());
}

#[test]
fn malformed_packets_are_dropped_without_poisoning_the_stream() {
    let (source, sender) = start_source(test_config());

    // Eight bytes of noise.
    sender.send(&[0u8; 8]).unwrap();

    // Valid header declaring 100000 bones with no body behind it.
    let mut absurd = PoseFrame::new(1, 50, 0).encode();
    absurd[24..28].copy_from_slice(&100_000u32.to_be_bytes());
    sender.send(&absurd).unwrap();

    sender.send(&frame(1, 1, 1000, 5.0).encode()).unwrap();

    assert!(wait_for(|| source.stats().packets_received == 3, 1000));
    let stats = source.stats();
    assert_eq!(stats.malformed_packets, 2);
    assert_eq!(stats.frames_accepted, 1);

    let published = source.publish(1, 1000).unwrap();
    assert!((published.transforms[0].translation.x - 5.0).abs() < 1e-6);
}

#[test]
fn duplicate_frames_are_suppressed() {
    let (source, sender) = start_source(test_config());

    let bytes = frame(1, 7, 1000, 1.0).encode();
    sender.send(&bytes).unwrap();
    sender.send(&bytes).unwrap();

    assert!(wait_for(|| source.stats().packets_received == 2, 1000));
    let stats = source.stats();
    assert_eq!(stats.frames_accepted, 1);
    assert_eq!(stats.duplicates_dropped, 1);
}

#[test]
fn rig_announcement_names_published_bones() {
    let (source, sender) = start_source(test_config());

    let rig = RigDescriptor {
        subject_id: 1,
        sequence: 0,
        timestamp_us: 0,
        name: "Hero".to_owned(),
        bone_names: vec!["root".to_owned()],
    };
    sender.send(&rig.encode()).unwrap();
    sender.send(&frame(1, 1, 1000, 0.0).encode()).unwrap();

    assert!(wait_for(|| source.stats().frames_accepted == 1, 1000));

    let published = source.publish(1, 1000).unwrap();
    assert_eq!(published.bone_names, vec!["root".to_owned()]);

    let subjects = source.list_active_subjects();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].name.as_deref(), Some("Hero"));
    assert_eq!(subjects[0].status, SubjectStatus::Connected);
}

#[test]
fn silent_subject_decays_to_lost_and_recovers() {
    let config = SourceConfig {
        stale_timeout: Duration::from_millis(50),
        lost_timeout: Duration::from_millis(150),
        ..test_config()
    };
    let (source, sender) = start_source(config);

    sender.send(&frame(1, 1, 0, 0.0).encode()).unwrap();
    assert!(wait_for(|| source.stats().frames_accepted == 1, 1000));
    assert_eq!(source.subject_status(1), Some(SubjectStatus::Connected));

    // Silence drives stale, then lost; once lost, publishing reports the
    // subject unavailable.
    assert!(wait_for(
        || source.subject_status(1) == Some(SubjectStatus::Lost),
        2000
    ));
    assert!(source.publish(1, 0).is_none());
    assert!(source.list_active_subjects().is_empty());

    // And after another lost-timeout of silence the subject is forgotten
    // entirely.
    assert!(wait_for(|| source.subject_status(1).is_none(), 2000));

    // Resumed traffic brings it straight back.
    sender.send(&frame(1, 2, 500_000, 3.0).encode()).unwrap();
    assert!(wait_for(
        || source.subject_status(1) == Some(SubjectStatus::Connected),
        1000
    ));
    assert!(source.publish(1, 500_000).is_some());
}

#[test]
fn shutdown_is_prompt_and_idempotent() {
    let (mut source, _sender) = start_source(test_config());

    let start = Instant::now();
    source.shutdown();
    source.shutdown();
    assert!(start.elapsed() < Duration::from_secs(1));
}
