//! Synthetic-rig UDP test client. Announces a named rig, then streams
//! procedurally animated pose frames at a fixed rate so the receiver,
//! codec, and buffer can be exercised without a live capture rig. Optional
//! switches inject packet loss and reordering.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::{Quat, Vec3};

use dragonlink::{BoneTransform, FrameFlags, PoseFrame, RigDescriptor};

/// Interval between rig re-announcements, so a receiver started late still
/// learns bone names.
const RIG_RESEND_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "dragonlink-testclient")]
#[command(about = "Synthetic pose stream generator for dragonlink")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    target: String,

    #[arg(short, long, default_value_t = dragonlink::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 1)]
    subject_id: u32,

    #[arg(long, default_value = "TestRig")]
    subject_name: String,

    #[arg(short, long, default_value_t = 24)]
    bones: usize,

    #[arg(short, long, default_value_t = 60.0, help = "Frames per second")]
    rate: f32,

    #[arg(short, long, default_value_t = 0.0, help = "Seconds to run (0 = until interrupted)")]
    duration: f32,

    #[arg(long, help = "Include per-bone scale in pose packets")]
    with_scale: bool,

    #[arg(long, default_value_t = 0.0, help = "Percentage of frames to drop (0-100)")]
    drop_percent: f32,

    #[arg(long, help = "Hold every other packet back one send slot to force reordering")]
    shuffle: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.bones == 0 || args.bones > dragonlink::MAX_BONES {
        anyhow::bail!("bone count must be in 1..={}", dragonlink::MAX_BONES);
    }
    if args.rate <= 0.0 {
        anyhow::bail!("rate must be positive");
    }

    let target = format!("{}:{}", args.target, args.port);
    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind local socket")?;
    socket
        .connect(&target)
        .with_context(|| format!("failed to resolve target {}", target))?;

    let rig = build_rig(&args);
    let frame_interval = Duration::from_secs_f32(1.0 / args.rate);
    let run_for = (args.duration > 0.0).then(|| Duration::from_secs_f32(args.duration));

    log::info!(
        "streaming subject {} ({} bones) to {} at {} Hz",
        args.subject_id,
        args.bones,
        target,
        args.rate
    );

    let start = Instant::now();
    let mut sequence: u32 = 0;
    let mut sent: u64 = 0;
    let mut dropped: u64 = 0;
    let mut last_rig_sent: Option<Instant> = None;
    let mut held_back: Option<Vec<u8>> = None;

    loop {
        let elapsed = start.elapsed();
        if let Some(limit) = run_for {
            if elapsed >= limit {
                break;
            }
        }

        if last_rig_sent.is_none_or(|at| at.elapsed() >= RIG_RESEND_INTERVAL) {
            let mut announce = rig.clone();
            announce.sequence = sequence;
            announce.timestamp_us = elapsed.as_micros() as u64;
            sequence = sequence.wrapping_add(1);
            socket.send(&announce.encode()).context("send failed")?;
            last_rig_sent = Some(Instant::now());
        }

        let frame = synth_frame(&args, sequence, elapsed);
        sequence = sequence.wrapping_add(1);

        if args.drop_percent > 0.0 && rand_percent() * 100.0 < args.drop_percent {
            dropped += 1;
        } else if args.shuffle {
            let encoded = frame.encode();
            match held_back.take() {
                // Newer packet goes out first, then the held one: adjacent
                // frames arrive swapped.
                Some(older) => {
                    socket.send(&encoded).context("send failed")?;
                    socket.send(&older).context("send failed")?;
                    sent += 2;
                }
                None => held_back = Some(encoded),
            }
        } else {
            socket.send(&frame.encode()).context("send failed")?;
            sent += 1;
        }

        std::thread::sleep(frame_interval);
    }

    if let Some(older) = held_back.take() {
        socket.send(&older).context("send failed")?;
        sent += 1;
    }

    log::info!("done: {} frames sent, {} dropped locally", sent, dropped);
    Ok(())
}

fn build_rig(args: &Args) -> RigDescriptor {
    let mut bone_names = Vec::with_capacity(args.bones);
    bone_names.push("root".to_owned());
    for i in 1..args.bones {
        bone_names.push(format!("bone_{:02}", i));
    }
    RigDescriptor {
        subject_id: args.subject_id,
        sequence: 0,
        timestamp_us: 0,
        name: args.subject_name.clone(),
        bone_names,
    }
}

/// Procedural animation: each bone sways on a phase-offset sine and spins
/// slowly about the vertical axis.
fn synth_frame(args: &Args, sequence: u32, elapsed: Duration) -> PoseFrame {
    let t = elapsed.as_secs_f32();
    let mut frame = PoseFrame::new(args.subject_id, sequence, elapsed.as_micros() as u64);
    if args.with_scale {
        frame.flags |= FrameFlags::HAS_SCALE;
    }

    for i in 0..args.bones {
        let phase = i as f32 * 0.4;
        let translation = Vec3::new(
            (t * 1.3 + phase).sin() * 10.0,
            i as f32 * 5.0,
            (t * 0.7 + phase).cos() * 10.0,
        );
        let rotation = Quat::from_rotation_y(t * 0.5 + phase);
        let scale = if args.with_scale {
            Vec3::splat(1.0 + 0.1 * (t + phase).sin())
        } else {
            Vec3::ONE
        };
        frame.transforms.push(BoneTransform {
            translation,
            rotation,
            scale,
        });
    }

    frame
}

fn rand_percent() -> f32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64,
    );
    (hasher.finish() % 10000) as f32 / 10000.0
}
