use nes_apu::memory::OpenBus;
use nes_apu::{ApuConfig, NesApuError, NesSound, RegisterLog, RegisterWrite};

const FRAME: i64 = 29_830;

fn sound() -> NesSound {
    NesSound::initialize(OpenBus(0), ApuConfig::ntsc(44_100)).unwrap()
}

/// Pulse 1 at period 0x0FD, 50% duty, constant volume 15.
fn pulse_log(frames: usize) -> RegisterLog {
    let mut log = RegisterLog::new();
    log.push_frame(
        FRAME as u32,
        vec![
            RegisterWrite::new(0, 0x4015, 0x01),
            RegisterWrite::new(0, 0x4000, 0xBF),
            RegisterWrite::new(0, 0x4002, 0xFD),
            RegisterWrite::new(0, 0x4003, 0x00),
            RegisterWrite::new(9_000, 0x4004, 0x3F),
        ],
    );
    for _ in 1..frames {
        log.push_frame(FRAME as u32, Vec::new());
    }
    log
}

/// Writes on every channel, some landing right on sequencer steps.
fn busy_log() -> RegisterLog {
    let mut log = RegisterLog::new();
    log.push_frame(
        FRAME as u32,
        vec![
            RegisterWrite::new(0, 0x4015, 0x0F),
            RegisterWrite::new(0, 0x4000, 0x84),
            RegisterWrite::new(0, 0x4001, 0x9A),
            RegisterWrite::new(0, 0x4002, 0x40),
            RegisterWrite::new(0, 0x4003, 0x01),
            RegisterWrite::new(1_000, 0x4004, 0x5F),
            RegisterWrite::new(1_000, 0x4006, 0x80),
            RegisterWrite::new(1_000, 0x4007, 0x00),
            RegisterWrite::new(7_459, 0x4008, 0xC0),
            RegisterWrite::new(7_459, 0x400A, 0x30),
            RegisterWrite::new(7_459, 0x400B, 0x02),
            RegisterWrite::new(14_915, 0x400C, 0x02),
            RegisterWrite::new(14_915, 0x400E, 0x85),
            RegisterWrite::new(14_915, 0x400F, 0x10),
        ],
    );
    log.push_frame(
        FRAME as u32,
        vec![
            RegisterWrite::new(500, 0x4017, 0x80),
            RegisterWrite::new(20_000, 0x4002, 0x20),
        ],
    );
    log.push_frame(FRAME as u32, vec![RegisterWrite::new(100, 0x4015, 0x00)]);
    log
}

#[test]
fn reset_twice_matches_reset_once() {
    let log = busy_log();

    let mut once = sound();
    once.reset();
    let a = log.play(&mut once).unwrap();

    let mut twice = sound();
    twice.reset();
    twice.reset();
    let b = log.play(&mut twice).unwrap();

    assert_eq!(a, b);
}

#[test]
fn reset_after_use_matches_fresh_instance() {
    let log = busy_log();

    let mut fresh = sound();
    let expected = log.play(&mut fresh).unwrap();

    let mut used = sound();
    pulse_log(3).play(&mut used).unwrap();
    used.reset();
    assert_eq!(log.play(&mut used).unwrap(), expected);
}

#[test]
fn replay_is_deterministic() {
    let log = busy_log();
    let a = log.play(&mut sound()).unwrap();
    let b = log.play(&mut sound()).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn untouched_chip_is_silent() {
    let mut sound = sound();
    let mut pcm = vec![0i16; 4096];
    for _ in 0..5 {
        let count = sound.run_frame(FRAME, &mut pcm).unwrap();
        assert!(count > 0);
        assert!(pcm[..count].iter().all(|&s| s == pcm[0]));
        assert_eq!(pcm[0], 0);
    }
}

#[test]
fn split_frame_matches_whole_frame() {
    let writes = [
        (0, 0x4015, 0x0F),
        (0, 0x4000, 0xBF),
        (0, 0x4002, 0x7F),
        (0, 0x4003, 0x08),
        (0, 0x400C, 0x3A),
        (0, 0x400E, 0x04),
        (0, 0x400F, 0x08),
        (12_345, 0x4008, 0xFF),
        (12_345, 0x400A, 0x55),
        (12_345, 0x400B, 0x08),
        (31_000, 0x4002, 0xC0),
        (45_000, 0x4017, 0x80),
        (52_001, 0x4000, 0x7F),
    ];
    let split_at = FRAME;

    let mut whole = sound();
    for &(time, addr, value) in &writes {
        whole.write_register(time, addr, value).unwrap();
    }
    let mut whole_pcm = vec![0i16; 4096];
    let count = whole.run_frame(2 * split_at, &mut whole_pcm).unwrap();
    whole_pcm.truncate(count);

    let mut split = sound();
    let mut split_pcm = Vec::new();
    let mut block = vec![0i16; 4096];
    for &(time, addr, value) in writes.iter().filter(|w| w.0 < split_at) {
        split.write_register(time, addr, value).unwrap();
    }
    let count = split.run_frame(split_at, &mut block).unwrap();
    split_pcm.extend_from_slice(&block[..count]);
    for &(time, addr, value) in writes.iter().filter(|w| w.0 >= split_at) {
        split.write_register(time - split_at, addr, value).unwrap();
    }
    let count = split.run_frame(split_at, &mut block).unwrap();
    split_pcm.extend_from_slice(&block[..count]);

    assert_eq!(whole_pcm.len(), split_pcm.len());
    assert_eq!(whole_pcm, split_pcm);
}

#[test]
fn truncated_extraction_keeps_remainder() {
    let log = pulse_log(1);
    let reference = log.play(&mut sound()).unwrap();

    let mut sound = sound();
    for write in &log.frames[0].writes {
        sound
            .write_register(i64::from(write.time), write.addr, write.value)
            .unwrap();
    }
    let mut small = vec![0i16; 100];
    assert_eq!(sound.run_frame(FRAME, &mut small).unwrap(), 100);

    let mut rest = vec![0i16; 4096];
    let count = sound.read_samples(&mut rest);
    assert_eq!(100 + count, reference.len());
    assert_eq!(&small[..], &reference[..100]);
    assert_eq!(&rest[..count], &reference[100..]);
    assert_eq!(sound.read_samples(&mut rest), 0);
}

#[test]
fn status_read_clears_frame_irq() {
    let mut sound = sound();
    let status = sound.read_status(29_900).unwrap();
    assert_eq!(status & 0x40, 0x40);
    assert_eq!(sound.read_status(29_900).unwrap() & 0x40, 0);
}

#[test]
fn status_reports_active_channels() {
    let mut sound = sound();
    sound.write_register(0, 0x4015, 0x0F).unwrap();
    sound.write_register(0, 0x4003, 0x08).unwrap();
    sound.write_register(0, 0x400F, 0x08).unwrap();
    assert_eq!(sound.read_status(10).unwrap() & 0x1F, 0x09);
}

#[test]
fn pulse_scenario_sample_count_and_pitch() {
    let mut sound = sound();
    for write in &pulse_log(1).frames[0].writes {
        sound
            .write_register(i64::from(write.time), write.addr, write.value)
            .unwrap();
    }
    let mut pcm = vec![0i16; 4096];
    let count = sound.run_frame(FRAME, &mut pcm).unwrap();
    assert!((733..=737).contains(&count), "got {count} samples");

    // Rising zero crossings with hysteresis so kernel ringing is ignored.
    let peak = pcm[..count].iter().map(|s| i32::from(*s).abs()).max().unwrap();
    let threshold = peak / 20;
    let mut armed = false;
    let mut crossings = Vec::new();
    for (i, &s) in pcm[..count].iter().enumerate().skip(200) {
        let s = i32::from(s);
        if s < -threshold {
            armed = true;
        } else if armed && s >= 0 {
            crossings.push(i);
            armed = false;
        }
    }
    assert!(crossings.len() >= 4, "crossings {crossings:?}");

    let spacing = (crossings[crossings.len() - 1] - crossings[0]) as f64
        / (crossings.len() - 1) as f64;
    // 1789773 / (16 * (0x0FD + 1)) Hz at 44100 Hz
    let expected = 44_100.0 * 16.0 * 254.0 / 1_789_773.0;
    assert!(
        (spacing - expected).abs() < 1.0,
        "spacing {spacing:.2}, expected {expected:.2}"
    );
}

#[test]
fn time_regression_is_rejected() {
    let mut sound = sound();
    sound.write_register(1_000, 0x4015, 0x01).unwrap();
    let err = sound.write_register(999, 0x4015, 0x00).unwrap_err();
    assert!(matches!(
        err,
        NesApuError::TimeRegression {
            time: 999,
            last: 1_000
        }
    ));
    // The instance stays usable.
    sound.write_register(1_000, 0x4015, 0x00).unwrap();
    assert!(sound.read_status(1_001).is_ok());
}

#[test]
fn time_beyond_horizon_is_rejected() {
    let mut sound = sound();
    let capacity = sound.buffer().frame_capacity();
    let err = sound.write_register(capacity + 1, 0x4015, 0x01).unwrap_err();
    assert!(matches!(err, NesApuError::FrameOverflow { .. }));
    let mut pcm = vec![0i16; 4096];
    assert!(sound.run_frame(FRAME, &mut pcm).is_ok());
}

#[test]
fn frame_times_restart_at_zero() {
    let mut sound = sound();
    let mut pcm = vec![0i16; 4096];
    sound.write_register(20_000, 0x4015, 0x01).unwrap();
    sound.run_frame(FRAME, &mut pcm).unwrap();
    sound.write_register(0, 0x4015, 0x00).unwrap();
}
