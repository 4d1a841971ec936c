use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use headpose_sync::{
    BoundedSequenceBuffer, Correlator, Detection, DetectionBatch, Fill, Frame, PairCorrelator,
    Payload, Recognition, SequencedMessage, SharedCorrelator, StreamId, TripleCorrelator,
};
use headpose_sync::sync::TripleSlots;

fn batch(n: usize) -> DetectionBatch {
    DetectionBatch::new(
        (0..n)
            .map(|i| {
                let x = 0.1 + 0.2 * i as f32;
                Detection::new(x, 0.2, x + 0.1, 0.4)
            })
            .collect(),
    )
}

fn messages_for(seq: u64, faces: usize) -> Vec<SequencedMessage> {
    let mut out = vec![
        SequencedMessage::frame(seq, Frame::empty(seq, 16, 9)),
        SequencedMessage::detections(seq, batch(faces)),
    ];
    for i in 0..faces {
        out.push(SequencedMessage::recognition(
            seq,
            Recognition::new(i as f32, 0.0, 0.0),
        ));
    }
    out
}

#[test]
fn preview_and_detections_yield_ordered_crops() {
    let mut pair = PairCorrelator::new(15);
    let a = Detection::new(0.10, 0.10, 0.30, 0.30);
    let b = Detection::new(0.50, 0.40, 0.70, 0.80);

    assert_eq!(pair.on_preview(5, Frame::empty(5, 400, 400)), Fill::Filled);
    assert_eq!(
        pair.on_detections(5, DetectionBatch::new(vec![a, b])),
        Fill::Filled
    );

    let bundle = pair.poll().expect("crop bundle");
    assert_eq!(bundle.seq, 5);
    assert_eq!(bundle.crops.len(), 2);
    assert_eq!(bundle.crops[0].detection_index, 0);
    assert_eq!(bundle.crops[1].detection_index, 1);
    assert!(bundle.crops[0].region.xmin < bundle.crops[1].region.xmin);
    assert!(bundle.crops.iter().all(|crop| crop.frame_seq == 5));
    assert!(pair.poll().is_none());
}

#[test]
fn sixteenth_seq_evicts_only_the_first() {
    let mut buffer = BoundedSequenceBuffer::<TripleSlots>::new(15);
    let seqs: Vec<u64> = (100..116).collect();
    for &seq in &seqs {
        let fill = buffer.insert(
            seq,
            StreamId::Frame,
            Payload::Frame(Frame::empty(seq, 2, 2)),
        );
        assert_eq!(fill, Fill::Filled);
        assert!(buffer.len() <= 15);
    }

    assert_eq!(buffer.evicted(), 1);
    assert!(!buffer.contains(100));
    assert_eq!(buffer.seqs(), (101..116).collect::<Vec<_>>());
}

#[test]
fn triple_waits_for_every_recognition() {
    let mut triple = TripleCorrelator::new(15);
    triple.on_frame(3, Frame::empty(3, 1920, 1080));
    triple.on_detections(3, batch(2));
    triple.on_recognition(3, Recognition::new(10.0, 1.0, 2.0));
    assert!(triple.poll().is_none());

    triple.on_recognition(3, Recognition::new(-20.0, 3.0, 4.0));
    let bundle = triple.poll().expect("render bundle");
    assert_eq!(bundle.seq, 3);
    assert_eq!(
        bundle.recognitions,
        vec![
            Recognition::new(10.0, 1.0, 2.0),
            Recognition::new(-20.0, 3.0, 4.0)
        ]
    );
    assert!(triple.poll().is_none());
    assert_eq!(triple.pending(), 0);
}

#[test]
fn border_box_is_clamped_inside_the_image() {
    let mut pair = PairCorrelator::new(15);
    pair.on_preview(9, Frame::empty(9, 400, 400));
    pair.on_detections(
        9,
        DetectionBatch::new(vec![Detection::new(-0.01, 0.2, 0.98, 0.6)]),
    );

    let bundle = pair.poll().expect("crop bundle");
    let region = bundle.crops[0].region;
    assert!((region.xmin - 0.001).abs() < 1e-6);
    assert!((region.xmax - 0.999).abs() < 1e-6);
    assert!((region.ymin - 0.17).abs() < 1e-5);
    assert!((region.ymax - 0.63).abs() < 1e-5);
}

#[test]
fn shuffled_arrivals_emit_in_increasing_order() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let mut messages: Vec<SequencedMessage> = (0..40u64)
            .flat_map(|seq| messages_for(seq, (seq % 4) as usize))
            .collect();
        messages.shuffle(&mut rng);

        let mut triple = TripleCorrelator::new(15);
        let mut emitted = Vec::new();
        for message in messages {
            triple.push(message);
            assert!(triple.pending() <= 15);
            while let Some(bundle) = triple.poll() {
                assert_eq!(bundle.recognitions.len(), bundle.detections.len());
                emitted.push(bundle.seq);
            }
        }

        assert!(emitted.windows(2).all(|pair| pair[0] < pair[1]));
        let stats = triple.stats();
        assert_eq!(stats.emitted, emitted.len() as u64);
    }
}

#[test]
fn shared_correlator_across_producer_threads() -> anyhow::Result<()> {
    const SEQS: u64 = 10;
    let shared = SharedCorrelator::new(TripleCorrelator::new(15));

    let mut producers = Vec::new();
    for stream in [StreamId::Frame, StreamId::Detections, StreamId::Recognition] {
        let handle = shared.clone();
        producers.push(thread::spawn(move || -> anyhow::Result<()> {
            for seq in 0..SEQS {
                let messages = messages_for(seq, 2)
                    .into_iter()
                    .filter(|message| message.stream == stream);
                for message in messages {
                    handle.push(message)?;
                }
            }
            Ok(())
        }));
    }

    let mut emitted = Vec::new();
    loop {
        let done = producers.iter().all(|p| p.is_finished());
        while let Some(bundle) = shared.poll()? {
            emitted.push(bundle.seq);
        }
        if done {
            break;
        }
        thread::yield_now();
    }
    for producer in producers {
        producer.join().expect("producer panicked")?;
    }
    while let Some(bundle) = shared.poll()? {
        emitted.push(bundle.seq);
    }

    assert!(emitted.windows(2).all(|pair| pair[0] < pair[1]));
    let stats = shared.stats()?;
    assert_eq!(stats.evicted, 0);
    assert_eq!(stats.emitted + stats.superseded, SEQS);
    assert_eq!(shared.pending()?, 0);
    Ok(())
}
