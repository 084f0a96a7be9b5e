//! Timing behaviour of the decoder task under a paused clock.

use pigate_hardware::mock::MockPulseInput;
use pigate_keypad::{BitSender, DecoderConfig, KeypadReader, spawn_pulse_sampler};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn offer_keys(bits: &BitSender, keys: &[u8]) {
    for &key in keys {
        for shift in (0..4).rev() {
            assert!(bits.offer((key >> shift) & 1));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_five_keys_emit_without_waiting() {
    let (bits, mut codes, _task) =
        KeypadReader::start(&DecoderConfig::default(), CancellationToken::new()).unwrap();
    let start = Instant::now();

    offer_keys(&bits, &[1, 2, 3, 4, 5]);

    assert_eq!(codes.recv().await.as_deref(), Some("12345"));
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_short_code_after_inter_key_timeout() {
    let (bits, mut codes, _task) =
        KeypadReader::start(&DecoderConfig::default(), CancellationToken::new()).unwrap();
    let start = Instant::now();

    offer_keys(&bits, &[9, 8]);

    let early = tokio::time::timeout(Duration::from_millis(2_900), codes.recv()).await;
    assert!(early.is_err(), "code emitted before the inter-key timeout");

    assert_eq!(codes.recv().await.as_deref(), Some("98"));
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_mid_key_gap_discards_only_partial_key() {
    let (bits, mut codes, _task) =
        KeypadReader::start(&DecoderConfig::default(), CancellationToken::new()).unwrap();

    offer_keys(&bits, &[1, 2]);
    bits.offer(1);
    bits.offer(1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    offer_keys(&bits, &[3, 4, 5]);

    assert_eq!(codes.recv().await.as_deref(), Some("12345"));
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_drops_newest_bits() {
    let config = DecoderConfig::default().queue_capacity(4);
    let (bits, _codes, _task) = KeypadReader::start(&config, CancellationToken::new()).unwrap();

    let accepted = (0..10).filter(|_| bits.offer(1)).count();

    assert_eq!(accepted, 4);
    assert_eq!(bits.dropped(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_ends_code_stream() {
    let shutdown = CancellationToken::new();
    let (_bits, mut codes, task) =
        KeypadReader::start(&DecoderConfig::default(), shutdown.clone()).unwrap();

    shutdown.cancel();
    task.await.unwrap();

    assert_eq!(codes.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_pulse_sampler_feeds_decoder() {
    let shutdown = CancellationToken::new();
    let (bits, mut codes, _task) =
        KeypadReader::start(&DecoderConfig::default(), shutdown.clone()).unwrap();
    let (input, handle) = MockPulseInput::new();
    let sampler = spawn_pulse_sampler(input, bits, shutdown.clone());

    handle.send_keys("2468*").await.unwrap();

    assert_eq!(codes.recv().await.as_deref(), Some("2468*"));

    drop(handle);
    sampler.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_badge_frame_through_reader() {
    let (bits, mut codes, _task) =
        KeypadReader::start(&DecoderConfig::wiegand26(), CancellationToken::new()).unwrap();

    // parity, 0x00 facility, 0x0007 card, parity
    let mut frame = vec![1u8];
    frame.extend([0u8; 8]);
    frame.extend((0..16).rev().map(|i| ((7u16 >> i) & 1) as u8));
    frame.push(0);

    for bit in frame {
        bits.offer(bit);
    }

    assert_eq!(codes.recv().await.as_deref(), Some("7"));
}
