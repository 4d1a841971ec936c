//! Two-stage head-pose pipeline.
//!
//! Threads:
//! - camera:   captures preview + frame per tick
//! - detector: face detection on previews (first stage)
//! - script:   pairs previews with detections, crops, runs pose estimation (second stage)
//! - host:     the calling thread; correlates frame + detections + poses and renders
//!
//! Stages talk over bounded `mpsc` queues (`SyncSettings::queue_depth`).
//! Producers only `try_send`: a full queue drops the message instead of
//! blocking or growing. The correlating loops only ever `try_recv`, so an
//! empty or stalled queue never blocks them either.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::config::SyncSettings;
use crate::detect::{FaceDetector, PoseEstimator};
use crate::ingest::FrameSource;
use crate::render::{self, RenderSink};
use crate::sync::{
    Correlator, CorrelatorStats, CropBundle, PairCorrelator, Payload, SequencedMessage, StreamId,
    TripleCorrelator, MAX_UNMATCHED_RECOGNITIONS,
};

struct Input {
    stream: StreamId,
    rx: Receiver<SequencedMessage>,
    connected: bool,
}

/// Non-blocking control loop around one correlator.
///
/// Each iteration takes at most one message from every input queue, pushes
/// it, then polls the correlator once.
pub struct HostLoop<C> {
    correlator: C,
    inputs: Vec<Input>,
    poll_interval: Duration,
}

impl<C: Correlator> HostLoop<C> {
    pub fn new(correlator: C, poll_interval: Duration) -> Self {
        Self {
            correlator,
            inputs: Vec::new(),
            poll_interval,
        }
    }

    /// Register an input queue. `stream` names it in logs.
    pub fn add_input(&mut self, stream: StreamId, rx: Receiver<SequencedMessage>) {
        self.inputs.push(Input {
            stream,
            rx,
            connected: true,
        });
    }

    pub fn correlator(&self) -> &C {
        &self.correlator
    }

    /// True once every input queue is drained and disconnected.
    pub fn is_finished(&self) -> bool {
        self.inputs.iter().all(|input| !input.connected)
    }

    /// One iteration: receive what is available, then poll once.
    pub fn run_once(&mut self) -> Option<C::Bundle> {
        self.pump();
        self.correlator.poll()
    }

    /// Loop until `stop` is set or every input is finished, handing each
    /// bundle to `on_bundle`. Returns the number of bundles emitted.
    pub fn run<F>(&mut self, stop: &AtomicBool, mut on_bundle: F) -> Result<u64>
    where
        F: FnMut(C::Bundle) -> Result<()>,
    {
        let mut emitted = 0u64;
        while !stop.load(Ordering::SeqCst) {
            let received = self.pump();
            if let Some(bundle) = self.correlator.poll() {
                emitted += 1;
                on_bundle(bundle)?;
                continue;
            }
            if self.is_finished() {
                break;
            }
            if received == 0 {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(emitted)
    }

    fn pump(&mut self) -> usize {
        let mut received = 0;
        for input in self.inputs.iter_mut().filter(|input| input.connected) {
            match input.rx.try_recv() {
                Ok(message) => {
                    if message.stream != input.stream {
                        log::debug!(
                            "{} message arrived on the {} queue",
                            message.stream,
                            input.stream
                        );
                    }
                    self.correlator.push(message);
                    received += 1;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    log::debug!("{} queue closed", input.stream);
                    input.connected = false;
                }
            }
        }
        received
    }
}

/// Result of a non-blocking hand-off to the next stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Forward {
    Sent,
    /// Queue full; the message was dropped and counted.
    Dropped,
    /// Receiving stage is gone.
    Closed,
}

/// Send without blocking. A full queue drops `message` and bumps `drops`.
pub fn forward(
    tx: &SyncSender<SequencedMessage>,
    message: SequencedMessage,
    drops: &AtomicU64,
) -> Forward {
    match tx.try_send(message) {
        Ok(()) => Forward::Sent,
        Err(TrySendError::Full(message)) => {
            drops.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "{} queue full, dropping seq {}",
                message.stream,
                message.seq
            );
            Forward::Dropped
        }
        Err(TrySendError::Disconnected(_)) => Forward::Closed,
    }
}

/// Second-stage driver: turns each crop bundle into one recognition message
/// per face, tagged with the frame's sequence number.
pub struct ScriptStage<E> {
    estimator: E,
    out: SyncSender<SequencedMessage>,
    drops: Arc<AtomicU64>,
}

impl<E: PoseEstimator> ScriptStage<E> {
    pub fn new(estimator: E, out: SyncSender<SequencedMessage>, drops: Arc<AtomicU64>) -> Self {
        Self {
            estimator,
            out,
            drops,
        }
    }

    /// Run the estimator on every crop, in detection order.
    ///
    /// A closed output queue means the host went away; results are dropped.
    pub fn handle(&mut self, bundle: CropBundle) -> Result<()> {
        for crop in &bundle.crops {
            let recognition = self
                .estimator
                .estimate(&bundle.frame, crop)
                .with_context(|| format!("{} on seq {}", self.estimator.name(), bundle.seq))?;
            let message = SequencedMessage::recognition(bundle.seq, recognition);
            if forward(&self.out, message, &self.drops) == Forward::Closed {
                log::debug!("recognition queue closed, dropping seq {}", bundle.seq);
                break;
            }
        }
        Ok(())
    }
}

/// Output queues of the first-stage detector.
pub struct DetectorLinks {
    pub script_preview: SyncSender<SequencedMessage>,
    pub script_detections: SyncSender<SequencedMessage>,
    pub host_detections: SyncSender<SequencedMessage>,
    pub drops: Arc<AtomicU64>,
}

/// First-stage loop: detect on every preview and fan the batch out, tagged
/// with the passthrough seq. With `skip_every = Some(n)` every n-th preview
/// is passed on without detections. Stops when the previews run out or a
/// downstream queue closes. Returns the number of previews handled.
pub fn run_detector<D: FaceDetector>(
    detector: &mut D,
    previews: Receiver<SequencedMessage>,
    links: &DetectorLinks,
    skip_every: Option<u64>,
) -> Result<u64> {
    let mut handled = 0u64;
    // Blocking receive: the detector is paced by the camera.
    for message in previews {
        let seq = message.seq;
        let Payload::Frame(preview) = message.payload else {
            continue;
        };
        handled += 1;
        if skip_every.is_some_and(|n| seq % n == n - 1) {
            log::debug!("detector: skipping seq {}", seq);
            let sent = forward(
                &links.script_preview,
                SequencedMessage::preview(seq, preview),
                &links.drops,
            );
            if sent == Forward::Closed {
                break;
            }
            continue;
        }
        let batch = detector.detect(&preview)?;
        // Passthrough seq: the frame the detector actually ran on.
        let passthrough_seq = preview.seq;
        let outcomes = [
            forward(
                &links.script_preview,
                SequencedMessage::preview(seq, preview),
                &links.drops,
            ),
            forward(
                &links.script_detections,
                SequencedMessage::detections(passthrough_seq, batch.clone()),
                &links.drops,
            ),
            forward(
                &links.host_detections,
                SequencedMessage::detections(passthrough_seq, batch),
                &links.drops,
            ),
        ];
        if outcomes.contains(&Forward::Closed) {
            break;
        }
    }
    Ok(handled)
}

/// Limits of a pipeline run.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Stop after this many captures. `None` runs until stopped.
    pub frames: Option<u64>,
    /// Capture rate. `None` captures back to back; whatever the next stage
    /// cannot take is dropped at its queue.
    pub fps: Option<u32>,
    /// The detector skips every n-th preview (simulates a detector that
    /// cannot keep up).
    pub detector_skip_every: Option<u64>,
}

/// What a finished run did.
#[derive(Clone, Debug, Default)]
pub struct PipelineReport {
    pub frames_captured: u64,
    pub frames_rendered: u64,
    pub faces_rendered: u64,
    /// Messages dropped at a full stage queue.
    pub queue_drops: u64,
    pub stage1: CorrelatorStats,
    pub stage2: CorrelatorStats,
}

/// Full two-stage pipeline over pluggable camera, detector and estimator.
pub struct Pipeline<S, D, E> {
    sync: SyncSettings,
    source: S,
    detector: D,
    estimator: E,
}

impl<S, D, E> Pipeline<S, D, E>
where
    S: FrameSource + 'static,
    D: FaceDetector + 'static,
    E: PoseEstimator + 'static,
{
    pub fn new(sync: SyncSettings, source: S, detector: D, estimator: E) -> Self {
        Self {
            sync,
            source,
            detector,
            estimator,
        }
    }

    /// Run until `stop` is set or the source is exhausted. Rendered frames go
    /// to `sink` on the calling thread.
    pub fn run(
        self,
        options: RunOptions,
        stop: Arc<AtomicBool>,
        sink: &mut dyn RenderSink,
    ) -> Result<PipelineReport> {
        let Self {
            sync,
            mut source,
            mut detector,
            estimator,
        } = self;

        let depth = sync.queue_depth.max(1);
        let (preview_tx, preview_rx) = mpsc::sync_channel::<SequencedMessage>(depth);
        let (frame_tx, frame_rx) = mpsc::sync_channel(depth);
        let (script_preview_tx, script_preview_rx) = mpsc::sync_channel(depth);
        let (script_det_tx, script_det_rx) = mpsc::sync_channel(depth);
        let (host_det_tx, host_det_rx) = mpsc::sync_channel(depth);
        // One result per face: room for a full frame's worth of poses.
        let (recognition_tx, recognition_rx) =
            mpsc::sync_channel(depth * MAX_UNMATCHED_RECOGNITIONS);
        let drops = Arc::new(AtomicU64::new(0));

        detector.warm_up()?;
        log::info!(
            "pipeline: detector={} spatial={} estimator={} capacity={}",
            detector.name(),
            detector.is_spatial(),
            estimator.name(),
            sync.capacity
        );

        let frame_limit = options.frames;
        let interval = options
            .fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps as f64));
        let camera_stop = Arc::clone(&stop);
        let camera_drops = Arc::clone(&drops);
        let camera = thread::Builder::new()
            .name("camera".into())
            .spawn(move || -> Result<u64> {
                let mut captured = 0u64;
                while !camera_stop.load(Ordering::SeqCst)
                    && frame_limit.map_or(true, |limit| captured < limit)
                {
                    let capture = source.next_capture()?;
                    captured += 1;
                    let to_host = forward(
                        &frame_tx,
                        SequencedMessage::frame(capture.seq, capture.frame),
                        &camera_drops,
                    );
                    let to_detector = forward(
                        &preview_tx,
                        SequencedMessage::preview(capture.seq, capture.preview),
                        &camera_drops,
                    );
                    if to_host == Forward::Closed || to_detector == Forward::Closed {
                        break;
                    }
                    if let Some(interval) = interval {
                        thread::sleep(interval);
                    }
                }
                Ok(captured)
            })
            .context("spawn camera thread")?;

        let links = DetectorLinks {
            script_preview: script_preview_tx,
            script_detections: script_det_tx,
            host_detections: host_det_tx,
            drops: Arc::clone(&drops),
        };
        let skip_every = options.detector_skip_every.filter(|n| *n > 0);
        let detector_thread = thread::Builder::new()
            .name("detector".into())
            .spawn(move || -> Result<()> {
                run_detector(&mut detector, preview_rx, &links, skip_every)?;
                Ok(())
            })
            .context("spawn detector thread")?;

        let script_stop = Arc::clone(&stop);
        let script_drops = Arc::clone(&drops);
        let script_sync = sync.clone();
        let script = thread::Builder::new()
            .name("script".into())
            .spawn(move || -> Result<CorrelatorStats> {
                let pair = PairCorrelator::new(script_sync.capacity)
                    .with_crop(script_sync.crop_margin, script_sync.crop_size);
                let mut control = HostLoop::new(pair, script_sync.poll_interval);
                control.add_input(StreamId::Preview, script_preview_rx);
                control.add_input(StreamId::Detections, script_det_rx);
                let mut stage = ScriptStage::new(estimator, recognition_tx, script_drops);
                control.run(&script_stop, |bundle| stage.handle(bundle))?;
                Ok(control.correlator().stats())
            })
            .context("spawn script thread")?;

        let mut host = HostLoop::new(TripleCorrelator::new(sync.capacity), sync.poll_interval);
        host.add_input(StreamId::Frame, frame_rx);
        host.add_input(StreamId::Detections, host_det_rx);
        host.add_input(StreamId::Recognition, recognition_rx);

        let mut report = PipelineReport::default();
        let host_result = host.run(&stop, |bundle| {
            let rendered = render::overlay(&bundle);
            report.frames_rendered += 1;
            report.faces_rendered += rendered.faces.len() as u64;
            sink.render(&rendered)
        });
        report.stage2 = host.correlator().stats();

        // Unblock producers whether the host finished or failed.
        stop.store(true, Ordering::SeqCst);
        drop(host);

        report.frames_captured = join(camera, "camera")?;
        join(detector_thread, "detector")?;
        report.stage1 = join(script, "script")?;
        report.queue_drops = drops.load(Ordering::Relaxed);
        host_result?;

        log::info!(
            "pipeline finished: captured={} rendered={} faces={} queue_drops={} evicted={}/{} superseded={}/{}",
            report.frames_captured,
            report.frames_rendered,
            report.faces_rendered,
            report.queue_drops,
            report.stage1.evicted,
            report.stage2.evicted,
            report.stage1.superseded,
            report.stage2.superseded
        );
        Ok(report)
    }
}

fn join<T>(handle: thread::JoinHandle<Result<T>>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{} thread panicked", name))?
        .with_context(|| format!("{} thread failed", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectionBatch, Recognition, StubPoseEstimator};
    use crate::frame::Frame;

    #[test]
    fn host_loop_try_receives_and_polls() {
        let (frame_tx, frame_rx) = mpsc::channel();
        let (det_tx, det_rx) = mpsc::channel();
        let (rec_tx, rec_rx) = mpsc::channel();
        let mut host = HostLoop::new(TripleCorrelator::default(), Duration::from_millis(1));
        host.add_input(StreamId::Frame, frame_rx);
        host.add_input(StreamId::Detections, det_rx);
        host.add_input(StreamId::Recognition, rec_rx);

        assert!(host.run_once().is_none());

        frame_tx
            .send(SequencedMessage::frame(0, Frame::empty(0, 10, 10)))
            .unwrap();
        det_tx
            .send(SequencedMessage::detections(
                0,
                DetectionBatch::new(vec![Detection::new(0.1, 0.1, 0.2, 0.2)]),
            ))
            .unwrap();
        assert!(host.run_once().is_none());

        rec_tx
            .send(SequencedMessage::recognition(0, Recognition::new(1.0, 2.0, 3.0)))
            .unwrap();
        let bundle = host.run_once().expect("bundle");
        assert_eq!(bundle.seq, 0);
        assert_eq!(bundle.recognitions.len(), 1);
        assert!(!host.is_finished());

        drop((frame_tx, det_tx, rec_tx));
        assert!(host.run_once().is_none());
        assert!(host.is_finished());
    }

    #[test]
    fn host_loop_run_stops_when_inputs_close() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let (det_tx, det_rx) = mpsc::channel();
        let mut host = HostLoop::new(PairCorrelator::default(), Duration::from_millis(1));
        host.add_input(StreamId::Preview, rx);
        host.add_input(StreamId::Detections, det_rx);

        for seq in 0..3 {
            tx.send(SequencedMessage::preview(seq, Frame::empty(seq, 4, 4)))?;
            det_tx.send(SequencedMessage::detections(seq, DetectionBatch::default()))?;
        }
        drop((tx, det_tx));

        let stop = AtomicBool::new(false);
        let mut seqs = Vec::new();
        let emitted = host.run(&stop, |bundle| {
            seqs.push(bundle.seq);
            Ok(())
        })?;
        assert_eq!(emitted, 3);
        assert_eq!(seqs, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn script_stage_emits_one_recognition_per_crop() -> Result<()> {
        let mut pair = PairCorrelator::default();
        pair.on_preview(7, Frame::new(7, 8, 8, vec![3u8; 192]));
        pair.on_detections(
            7,
            DetectionBatch::new(vec![
                Detection::new(0.1, 0.1, 0.2, 0.2),
                Detection::new(0.6, 0.6, 0.8, 0.8),
            ]),
        );
        let bundle: CropBundle = pair.poll().expect("crop bundle");

        let (tx, rx) = mpsc::sync_channel(4);
        let mut stage = ScriptStage::new(StubPoseEstimator::new(), tx, Arc::default());
        stage.handle(bundle)?;
        drop(stage);

        let out: Vec<SequencedMessage> = rx.iter().collect();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.seq == 7 && m.stream == StreamId::Recognition));
        Ok(())
    }

    #[test]
    fn forward_drops_on_full_queue_without_blocking() {
        let (tx, rx) = mpsc::sync_channel(2);
        let drops = AtomicU64::new(0);
        for seq in 0..5 {
            forward(&tx, SequencedMessage::frame(seq, Frame::empty(seq, 2, 2)), &drops);
        }
        assert_eq!(drops.load(Ordering::Relaxed), 3);

        let kept: Vec<u64> = rx.try_iter().map(|m| m.seq).collect();
        assert_eq!(kept, vec![0, 1]);

        drop(rx);
        let outcome = forward(&tx, SequencedMessage::frame(9, Frame::empty(9, 2, 2)), &drops);
        assert_eq!(outcome, Forward::Closed);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn script_stage_stops_when_host_is_gone() -> Result<()> {
        let mut pair = PairCorrelator::default();
        pair.on_preview(1, Frame::new(1, 8, 8, vec![3u8; 192]));
        pair.on_detections(1, DetectionBatch::new(vec![Detection::new(0.1, 0.1, 0.2, 0.2); 3]));
        let bundle = pair.poll().expect("crop bundle");

        let (tx, rx) = mpsc::sync_channel(4);
        drop(rx);
        let drops = Arc::new(AtomicU64::new(0));
        let mut stage = ScriptStage::new(StubPoseEstimator::new(), tx, Arc::clone(&drops));
        stage.handle(bundle)?;
        assert_eq!(drops.load(Ordering::Relaxed), 0);
        Ok(())
    }

    #[test]
    fn detector_stops_on_closed_script_queue_while_skipping() -> Result<()> {
        let (preview_tx, preview_rx) = mpsc::sync_channel(8);
        let (script_preview, script_preview_rx) = mpsc::sync_channel(8);
        let (script_detections, _script_det_rx) = mpsc::sync_channel(8);
        let (host_detections, _host_det_rx) = mpsc::sync_channel(8);
        drop(script_preview_rx);

        for seq in 0..3 {
            preview_tx.send(SequencedMessage::preview(seq, Frame::empty(seq, 4, 4)))?;
        }
        drop(preview_tx);

        let links = DetectorLinks {
            script_preview,
            script_detections,
            host_detections,
            drops: Arc::default(),
        };
        let mut detector = crate::detect::StubFaceDetector::default();
        let handled = run_detector(&mut detector, preview_rx, &links, Some(1))?;
        assert_eq!(handled, 1);
        Ok(())
    }

    #[test]
    fn detector_fans_out_with_passthrough_seq() -> Result<()> {
        let (preview_tx, preview_rx) = mpsc::sync_channel(8);
        let (script_preview, script_preview_rx) = mpsc::sync_channel(8);
        let (script_detections, script_det_rx) = mpsc::sync_channel(8);
        let (host_detections, host_det_rx) = mpsc::sync_channel(8);
        for seq in 0..4 {
            preview_tx.send(SequencedMessage::preview(seq, Frame::empty(seq, 4, 4)))?;
        }
        drop(preview_tx);

        let links = DetectorLinks {
            script_preview,
            script_detections,
            host_detections,
            drops: Arc::default(),
        };
        let mut detector = crate::detect::StubFaceDetector::default();
        assert_eq!(run_detector(&mut detector, preview_rx, &links, Some(2))?, 4);

        let previews: Vec<u64> = script_preview_rx.try_iter().map(|m| m.seq).collect();
        let script: Vec<u64> = script_det_rx.try_iter().map(|m| m.seq).collect();
        let host: Vec<u64> = host_det_rx.try_iter().map(|m| m.seq).collect();
        assert_eq!(previews, vec![0, 1, 2, 3]);
        assert_eq!(script, vec![0, 2]);
        assert_eq!(host, vec![0, 2]);
        Ok(())
    }
}
