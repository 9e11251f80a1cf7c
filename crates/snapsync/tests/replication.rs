use glam::{Quat, Vec3};

use snapsync::net::{TransformSnapshotDeltaMessage, TransformSnapshotMessage};
use snapsync::{
    Channel, Clock, LinkConditions, ManualClock, MemoryTransport, NetMessage, Peer, PeerError,
    ProtocolError, ReceiveTiming, ReplicationMode, SnapshotSettings, SyncFlags, Transform,
    TransformReceiver, TransformSender, TransformSyncConfig, Transport,
};

const SEND_INTERVAL: f64 = 1.0 / 30.0;

fn timing(remote_timestamp: f64) -> ReceiveTiming {
    ReceiveTiming {
        remote_timestamp,
        local_time: remote_timestamp + 0.05,
        buffer_time: 2.0 * SEND_INTERVAL,
    }
}

#[test]
fn test_sub_precision_motion_sends_nothing() {
    let mut sender = TransformSender::new(TransformSyncConfig::default());
    let mut transform = Transform::from_position(Vec3::new(0.5, 0.0, 0.0));

    assert!(sender.tick(&transform).is_some());

    let mut sent = 0;
    for i in 0..100 {
        let wobble = if i % 2 == 0 { 0.001 } else { -0.001 };
        transform.position.x = 0.5 + wobble;
        if sender.tick(&transform).is_some() {
            sent += 1;
        }
    }
    assert_eq!(sent, 0);
}

#[test]
fn test_supra_precision_motion_sends_every_delta() {
    let config = TransformSyncConfig::default();
    let mut sender = TransformSender::new(config.clone());
    let mut receiver = TransformReceiver::new(config, SEND_INTERVAL);

    let mut transform = Transform::from_position(Vec3::new(0.5, 0.0, 0.0));
    let mut remote = Transform::default();

    let first = sender.tick(&transform).unwrap();
    receiver
        .on_message(&first.message, timing(0.0), &mut remote)
        .unwrap();

    let mut deltas = 0;
    for i in 1..=100 {
        transform.position.x += 0.05;
        let outgoing = sender.tick(&transform).expect("every move crosses the lattice");
        assert_eq!(outgoing.channel, Channel::Reliable);
        if matches!(outgoing.message, NetMessage::TransformSnapshotDelta(_)) {
            deltas += 1;
        }
        receiver
            .on_message(&outgoing.message, timing(i as f64 * SEND_INTERVAL), &mut remote)
            .unwrap();
    }
    assert_eq!(deltas, 100);

    // The receiver's reconstruction stays on the sender's lattice.
    let latest = receiver.buffer().latest().unwrap();
    assert!((latest.position.x - transform.position.x).abs() <= 0.005 + 1e-4);
}

#[test]
fn test_resume_after_idle_rewrites_history() {
    let config = TransformSyncConfig::default();
    let mut receiver = TransformReceiver::new(config, SEND_INTERVAL);
    let mut transform = Transform::default();

    let full = TransformSnapshotMessage {
        entity_id: None,
        position: Some([1.0, 0.0, 0.0]),
        rotation: None,
        scale: None,
    };
    receiver
        .on_message(&NetMessage::TransformSnapshot(full), timing(1.0), &mut transform)
        .unwrap();
    assert!(receiver.update(5.0, &mut transform));
    assert_eq!(receiver.buffer().len(), 1);

    // The entity rested for two seconds, then starts moving again.
    let delta = TransformSnapshotDeltaMessage {
        entity_id: None,
        delta_position: Some([10, 0, 0]),
        rotation: None,
        delta_scale: None,
    };
    receiver
        .on_message(
            &NetMessage::TransformSnapshotDelta(delta),
            timing(3.0),
            &mut transform,
        )
        .unwrap();

    let keys: Vec<f64> = receiver.buffer().keys().collect();
    assert_eq!(keys.len(), 2);
    assert!((keys[1] - keys[0] - SEND_INTERVAL).abs() < 1e-12);
    assert_eq!(keys[1], 3.0);

    let seeded = receiver.buffer().first().unwrap();
    assert_eq!(seeded.position, transform.position);
    let latest = receiver.buffer().latest().unwrap();
    assert!((latest.position.x - 1.1).abs() < 1e-5);
}

#[test]
fn test_exhausted_buffer_holds_last_pose() {
    let config = TransformSyncConfig {
        sync: SyncFlags::POSITION | SyncFlags::ROTATION,
        only_sync_on_change: false,
        ..Default::default()
    };
    let mut sender = TransformSender::new(config.clone());
    let mut receiver = TransformReceiver::new(config, SEND_INTERVAL);

    let mut transform = Transform::default();
    let mut remote = Transform::default();
    for i in 0..3 {
        transform.position.x = i as f32;
        transform.rotation = Quat::from_rotation_y(i as f32 * 0.1);
        let outgoing = sender.tick(&transform).unwrap();
        receiver
            .on_message(&outgoing.message, timing(i as f64), &mut remote)
            .unwrap();
    }

    // Well past the newest snapshot: no extrapolation.
    for timeline in [2.5, 4.0, 10.0] {
        assert!(receiver.update(timeline, &mut remote));
        assert!(remote.position.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 0.01));
        assert!(remote.rotation.angle_between(transform.rotation) < 1e-2);
    }
    assert_eq!(receiver.buffer().len(), 1);
}

/// Server and client sharing one simulated link.
struct Session {
    clock: ManualClock,
    server: Peer,
    server_link: MemoryTransport,
    client: Peer,
    client_link: MemoryTransport,
    sender: TransformSender,
    receiver: TransformReceiver,
    server_transform: Transform,
    client_transform: Transform,
}

impl Session {
    fn new(mode: ReplicationMode, conditions: LinkConditions) -> Self {
        let config = TransformSyncConfig {
            mode,
            ..Default::default()
        };
        Self::with_config(config, conditions, 17)
    }

    fn with_config(config: TransformSyncConfig, conditions: LinkConditions, seed: u64) -> Self {
        let clock = ManualClock::new(0.0);
        let (mut server_link, mut client_link) =
            MemoryTransport::pair(clock.clone(), conditions, seed);

        let settings = SnapshotSettings::default();
        let mut server = Peer::server(settings.clone());
        let mut client = Peer::client(settings.clone());
        server.connect(&mut server_link);
        client.connect(&mut client_link);

        Self {
            clock,
            server,
            server_link,
            client,
            client_link,
            sender: TransformSender::new(config.clone()).with_entity_id(1),
            receiver: TransformReceiver::new(config, settings.server_send_interval()),
            server_transform: Transform::default(),
            client_transform: Transform::default(),
        }
    }

    fn frame(&mut self, dt: f64, speed: f32) {
        self.frame_to(dt, |now| now as f32 * speed);
    }

    /// Advances one frame with the server entity at `x(now)`.
    fn frame_to(&mut self, dt: f64, x: impl FnOnce(f64) -> f32) {
        self.clock.advance(dt);
        let now = self.clock.now();

        self.server.early_update(&mut self.server_link, now).unwrap();
        self.server_transform.position.x = x(now);
        if self.server.begin_send(now).unwrap() {
            if let Some(outgoing) = self.sender.tick(&self.server_transform) {
                self.server
                    .send(&outgoing.message, outgoing.channel, now)
                    .unwrap();
            }
        }
        self.server.flush(&mut self.server_link).unwrap();

        if self.client.is_connected() {
            for received in self.client.early_update(&mut self.client_link, now).unwrap() {
                self.receiver
                    .on_message(&received.message, received.timing, &mut self.client_transform)
                    .unwrap();
            }
            self.receiver
                .update(self.client.timeline(), &mut self.client_transform);
            self.client.begin_send(now).unwrap();
            self.client.flush(&mut self.client_link).unwrap();
        }
    }
}

#[test]
fn test_end_to_end_replication() {
    for mode in [ReplicationMode::DeltaCompressed, ReplicationMode::FullOnly] {
        let conditions = LinkConditions {
            latency_ms: 50.0,
            jitter_ms: 5.0,
            loss_percent: 0.0,
        };
        let mut session = Session::new(mode, conditions);

        let mut previous = f32::NEG_INFINITY;
        for _ in 0..(120 * 3) {
            session.frame(1.0 / 120.0, 1.0);

            let x = session.client_transform.position.x;
            assert!(x >= previous - 0.05, "{mode:?}: {x} went back from {previous}");
            previous = previous.max(x);
        }

        let lag = session.server_transform.position.x - session.client_transform.position.x;
        assert!(
            lag > 0.05 && lag < 0.4,
            "{mode:?}: client trails by {lag}"
        );
    }
}

#[test]
fn test_full_only_settles_on_rest_pose_over_lossy_link() {
    let conditions = LinkConditions {
        latency_ms: 30.0,
        jitter_ms: 5.0,
        loss_percent: 30.0,
    };

    for seed in 0..10 {
        let config = TransformSyncConfig {
            mode: ReplicationMode::FullOnly,
            rebaseline_interval: Some(15),
            ..Default::default()
        };
        let mut session = Session::with_config(config, conditions, seed);

        // Moves for one second, then rests for five.
        for _ in 0..(60 * 6) {
            session.frame_to(1.0 / 60.0, |now| now.min(1.0) as f32);
        }

        let server = session.server_transform.position.x;
        let client = session.client_transform.position.x;
        assert_eq!(server, 1.0);
        assert!(
            (client - server).abs() < 1e-3,
            "seed {seed}: client rests at {client}, server at {server}"
        );
    }
}

#[test]
fn test_reconnect_resumes_from_full_snapshot() {
    let mut session = Session::new(ReplicationMode::DeltaCompressed, LinkConditions::default());
    for _ in 0..60 {
        session.frame(1.0 / 60.0, 1.0);
    }
    assert!(session.receiver.has_baseline());

    session.client.disconnect(&mut session.client_link);
    session.client.disconnect(&mut session.client_link);
    session.receiver.reset();
    for _ in 0..30 {
        session.frame(1.0 / 60.0, 1.0);
    }
    assert!(!session.client.is_connected());

    session.client.connect(&mut session.client_link);
    session.sender.reset();
    for _ in 0..60 {
        session.frame(1.0 / 60.0, 1.0);
    }

    let lag = session.server_transform.position.x - session.client_transform.position.x;
    assert!(lag > 0.0 && lag < 0.4, "client trails by {lag}");
}

#[test]
fn test_protocol_error_disconnects_only_that_peer() {
    let clock = ManualClock::new(1.0);
    let settings = SnapshotSettings::default();

    let (mut server_link_a, mut client_link_a) =
        MemoryTransport::pair(clock.clone(), LinkConditions::default(), 1);
    let (mut server_link_b, mut client_link_b) =
        MemoryTransport::pair(clock.clone(), LinkConditions::default(), 2);

    let mut server_a = Peer::server(settings.clone());
    let mut server_b = Peer::server(settings.clone());
    let mut client_a = Peer::client(settings.clone());
    let mut client_b = Peer::client(settings);
    server_a.connect(&mut server_link_a);
    server_b.connect(&mut server_link_b);
    client_a.connect(&mut client_link_a);
    client_b.connect(&mut client_link_b);

    // A well-formed batch header followed by a message that is not rkyv data.
    let mut garbage = 1.0f64.to_le_bytes().to_vec();
    garbage.extend_from_slice(&4u32.to_le_bytes());
    garbage.extend_from_slice(&[0xFF; 4]);
    server_link_a.send(Channel::Reliable, &garbage).unwrap();

    server_b.begin_send(clock.now()).unwrap();
    server_b.flush(&mut server_link_b).unwrap();

    let result = client_a.early_update(&mut client_link_a, clock.now());
    assert!(matches!(
        result,
        Err(PeerError::Protocol(ProtocolError::Packet(_)))
    ));
    assert!(!client_a.is_connected());
    assert!(!client_link_a.is_connected());

    assert!(client_b.early_update(&mut client_link_b, clock.now()).is_ok());
    assert!(client_b.is_connected());
    assert_eq!(client_b.time_buffer().len(), 1);
    assert!(server_a.is_connected());
    assert!(server_link_a.is_connected());
}
