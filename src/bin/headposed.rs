//! headposed - head-pose streaming host
//!
//! This daemon:
//! 1. Captures frames from the configured camera (synthetic `stub://` sources only)
//! 2. Runs the first-stage face detector on previews
//! 3. Pairs previews with detections and runs head-pose estimation per face
//! 4. Correlates frames, detections and poses into render bundles
//! 5. Logs one overlay line per face until Ctrl-C or the frame limit

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use headpose_sync::config::HeadposeConfig;
use headpose_sync::{
    camera_config, detector_config, CameraSource, LogSink, Pipeline, RunOptions,
    StubFaceDetector, StubPoseEstimator,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stop after this many captures (runs until Ctrl-C when omitted).
    #[arg(long)]
    frames: Option<u64>,
    /// Capture rate of the synthetic camera.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Seed of the synthetic face detector.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Report spatial (depth) coordinates, overriding the config.
    #[arg(long)]
    stereo: bool,
    /// Upper bound of synthetic faces per frame.
    #[arg(long, default_value_t = 3)]
    max_faces: usize,
    /// Make the detector skip every n-th preview.
    #[arg(long)]
    skip_every: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let mut cfg = HeadposeConfig::load()?;
    if args.stereo {
        cfg.detector.stereo = true;
    }
    if cfg.detector.stereo {
        log::info!("spatial detector enabled, overlays will carry depth");
    } else {
        log::info!("mono detector, overlays carry no depth");
    }

    let mut source = CameraSource::new(camera_config(&cfg))?;
    source.connect()?;
    let detector = StubFaceDetector::new(detector_config(&cfg, args.seed, args.max_faces));

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "headposed running. camera={} capacity={} crop={}x{} margin={}",
        cfg.camera.url,
        cfg.sync.capacity,
        cfg.sync.crop_size.0,
        cfg.sync.crop_size.1,
        cfg.sync.crop_margin
    );

    let options = RunOptions {
        frames: args.frames,
        fps: Some(args.fps),
        detector_skip_every: args.skip_every,
    };
    let mut sink = LogSink::new();
    let report = Pipeline::new(cfg.sync.clone(), source, detector, StubPoseEstimator::new())
        .run(options, stop, &mut sink)?;

    log::info!(
        "shutdown: captured={} rendered={} faces={} queue_drops={}",
        report.frames_captured,
        report.frames_rendered,
        report.faces_rendered,
        report.queue_drops
    );
    log::info!("stage 1 sync: {:?}", report.stage1);
    log::info!("stage 2 sync: {:?}", report.stage2);
    Ok(())
}
