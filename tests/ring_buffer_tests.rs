//! Ring buffer tests: cross-thread SPSC ordering and a model-based property test

use proptest::prelude::*;
use std::collections::VecDeque;
use std::thread;

use radio_audio_streamer::audio::ring_buffer;

/// Small deterministic generator for burst sizes
struct XorShift(u32);

impl XorShift {
    fn next_in(&mut self, min: usize, max: usize) -> usize {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        min + (self.0 as usize % (max - min + 1))
    }
}

#[test]
fn test_spsc_sequence_is_gapless_across_threads() {
    const TOTAL: usize = 200_000;
    let (mut writer, mut reader) = ring_buffer(257).unwrap();

    let producer = thread::spawn(move || {
        let mut rng = XorShift(0x1234_5678);
        let mut next = 0usize;
        let mut burst = Vec::with_capacity(32);
        while next < TOTAL {
            let len = rng.next_in(1, 32).min(TOTAL - next);
            burst.clear();
            burst.extend((next..next + len).map(|v| v as f32));
            while !writer.write(&burst) {
                thread::yield_now();
            }
            next += len;
        }
    });

    let consumer = thread::spawn(move || {
        let mut rng = XorShift(0x9e37_79b9);
        let mut expected = 0usize;
        let mut chunk = vec![0.0f32; 48];
        while expected < TOTAL {
            let len = rng.next_in(1, 48).min(TOTAL - expected);
            if !reader.read(&mut chunk[..len]) {
                thread::yield_now();
                continue;
            }
            for sample in &chunk[..len] {
                assert_eq!(*sample as usize, expected, "gap or duplicate in stream");
                expected += 1;
            }
        }
        expected
    });

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), TOTAL);
}

#[derive(Debug, Clone)]
enum Op {
    Write(usize),
    Read(usize),
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..12).prop_map(Op::Write),
        4 => (0usize..12).prop_map(Op::Read),
        1 => Just(Op::Reset),
    ]
}

proptest! {
    /// Any interleaving of transfers behaves like a bounded FIFO queue.
    #[test]
    fn prop_matches_bounded_queue(capacity in 2usize..24, ops in prop::collection::vec(op(), 1..200)) {
        let (mut writer, mut reader) = ring_buffer(capacity).unwrap();
        let mut model: VecDeque<f32> = VecDeque::new();
        let mut counter = 0.0f32;

        for op in ops {
            match op {
                Op::Write(len) => {
                    let span: Vec<f32> = (0..len).map(|i| counter + i as f32).collect();
                    let fits = model.len() + len <= capacity - 1;
                    prop_assert_eq!(writer.write(&span), fits);
                    if fits {
                        model.extend(span);
                        counter += len as f32;
                    }
                }
                Op::Read(len) => {
                    let mut out = vec![-1.0; len];
                    let enough = model.len() >= len;
                    prop_assert_eq!(reader.read(&mut out), enough);
                    if enough {
                        let expected: Vec<f32> = model.drain(..len).collect();
                        prop_assert_eq!(out, expected);
                    } else {
                        prop_assert!(out.iter().all(|s| *s == -1.0));
                    }
                }
                Op::Reset => {
                    reader.ring().reset();
                    model.clear();
                }
            }

            prop_assert_eq!(writer.read_available(), model.len());
            prop_assert_eq!(writer.write_available(), capacity - 1 - model.len());
        }
    }
}
