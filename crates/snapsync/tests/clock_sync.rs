use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use snapsync::interpolation::{insert_and_adjust, step, step_time};
use snapsync::{
    CatchupParams, Clock, LinkConditions, ManualClock, MemoryTransport, Peer, SnapshotBuffer,
    SnapshotSettings, TimeSnapshot, TimelineState,
};

const SEND_RATE: u32 = 30;

fn settings() -> SnapshotSettings {
    SnapshotSettings {
        server_send_rate_hz: SEND_RATE,
        client_send_rate_hz: SEND_RATE,
        dynamic_adjustment: false,
        ..Default::default()
    }
}

#[test]
fn test_timeline_converges_under_jitter() {
    let settings = settings();
    let send_interval = settings.server_send_interval();
    let buffer_time = send_interval * settings.buffer_time_multiplier;
    let params = CatchupParams::new(&settings, send_interval, buffer_time);

    let mut rng = StdRng::seed_from_u64(42);
    let mut buffer = SnapshotBuffer::new();
    let mut state = TimelineState::from_settings(&settings, SEND_RATE);
    let mut last_local = None;

    for i in 0..120 {
        let remote = 100.0 + i as f64 * send_interval;
        let local = remote + 0.08 + rng.random_range(-0.005..=0.005);

        if let Some(last) = last_local {
            step_time(local - last, &mut state.timeline, state.timescale);
        }
        last_local = Some(local);

        assert!(insert_and_adjust(
            &mut buffer,
            TimeSnapshot::new(remote, local),
            &mut state,
            &params,
        ));
        assert!((0.95..=1.05).contains(&state.timescale));
    }

    assert!(state.drift_ema.standard_deviation() < 0.02);
    assert!((state.drift_ema.value() - buffer_time).abs() < send_interval);
    assert_eq!(state.timescale, 1.0);
}

#[test]
fn test_stalled_timeline_catches_up() {
    let settings = settings();
    let send_interval = settings.server_send_interval();
    let buffer_time = send_interval * settings.buffer_time_multiplier;
    let params = CatchupParams::new(&settings, send_interval, buffer_time);

    let mut buffer = SnapshotBuffer::new();
    let mut state = TimelineState::from_settings(&settings, SEND_RATE);

    // Snapshots keep arriving but the local timeline is not advanced, as if
    // the host froze for a while.
    for i in 0..30 {
        let time = i as f64 * send_interval;
        insert_and_adjust(&mut buffer, TimeSnapshot::new(time, time), &mut state, &params);
    }
    assert_eq!(state.timescale, settings.catchup_speed);

    // Never further behind than two buffer times.
    let latest = 29.0 * send_interval;
    assert!(latest - state.timeline <= 2.0 * buffer_time + 1e-9);

    // Resume normal stepping; the faster timescale closes the gap.
    let mut now = latest;
    for i in 30..200 {
        let time = i as f64 * send_interval;
        let delta = time - now;
        now = time;
        step(&mut buffer, delta, &mut state.timeline, state.timescale);
        insert_and_adjust(&mut buffer, TimeSnapshot::new(time, time), &mut state, &params);
    }
    assert_eq!(state.timescale, 1.0);
    assert!((now - state.timeline - buffer_time).abs() < send_interval);
}

#[test]
fn test_peer_clock_sync_over_jittery_link() {
    let clock = ManualClock::new(0.0);
    let conditions = LinkConditions {
        latency_ms: 40.0,
        jitter_ms: 5.0,
        loss_percent: 0.0,
    };
    let (mut server_link, mut client_link) = MemoryTransport::pair(clock.clone(), conditions, 5);

    let mut server = Peer::server(SnapshotSettings::default());
    let mut client = Peer::client(SnapshotSettings::default());
    server.connect(&mut server_link);
    client.connect(&mut client_link);

    let frame = 1.0 / 120.0;
    for _ in 0..(120 * 4) {
        clock.advance(frame);
        let now = clock.now();

        server.early_update(&mut server_link, now).unwrap();
        server.begin_send(now).unwrap();
        server.flush(&mut server_link).unwrap();

        client.early_update(&mut client_link, now).unwrap();
        client.begin_send(now).unwrap();
        client.flush(&mut client_link).unwrap();
    }

    let now = clock.now();
    assert!((0.95..=1.05).contains(&client.timescale()));
    assert!(client.buffer_time_multiplier() >= 1.0);
    assert!(client.delivery_time_ema().standard_deviation() < 0.02);

    // Timeline trails real time by latency plus buffer time, give or take a
    // send interval.
    let lag = now - client.timeline();
    let expected = 0.04 + client.buffer_time();
    assert!(
        (lag - expected).abs() < 2.0 * client.remote_send_interval(),
        "lag {lag}, expected about {expected}"
    );

    // The time buffer never grows: stepping trims what is behind the timeline.
    assert!(client.time_buffer().len() <= 8);
    assert!(!server.time_buffer().is_empty());
}
