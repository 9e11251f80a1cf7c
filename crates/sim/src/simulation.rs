use glam::{Quat, Vec3};

use snapsync::net::TransportStats;
use snapsync::{
    Clock, ManualClock, MemoryTransport, Peer, Transform, TransformReceiver, TransformSender,
};

use crate::config::SimConfig;

/// Pose of the replicated entity at server time `time`.
pub fn trajectory(time: f64, radius: f32, angular_speed: f32) -> Transform {
    let angle = time as f32 * angular_speed;
    let (sin, cos) = angle.sin_cos();
    Transform {
        position: Vec3::new(cos * radius, 0.0, sin * radius),
        rotation: Quat::from_rotation_y(-angle),
        scale: Vec3::ONE,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub frames: u64,
    pub messages_sent: u64,
    pub server_link: TransportStats,
    pub client_link: TransportStats,
    pub timescale: f64,
    pub buffer_time: f64,
    pub buffer_time_multiplier: f64,
    pub drift_std_dev: f64,
    pub delivery_std_dev: f64,
    pub mean_error: f64,
    pub max_error: f64,
    pub sync_errors: u64,
}

/// One server replicating one entity to one client over a simulated link.
pub struct Simulation {
    config: SimConfig,
    clock: ManualClock,
    server: Peer,
    server_link: MemoryTransport,
    client: Peer,
    client_link: MemoryTransport,
    sender: TransformSender,
    receiver: TransformReceiver,
    server_transform: Transform,
    client_transform: Transform,
    report: Report,
    error_sum: f64,
    error_samples: u64,
}

impl Simulation {
    pub fn new(config: SimConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let clock = ManualClock::new(0.0);
        let (mut server_link, mut client_link) =
            MemoryTransport::pair(clock.clone(), config.link, config.seed);

        let mut server = Peer::server(config.settings.clone());
        let mut client = Peer::client(config.settings.clone());
        server.connect(&mut server_link);
        client.connect(&mut client_link);

        let sender = TransformSender::new(config.transform.clone()).with_entity_id(0);
        let receiver = TransformReceiver::new(
            config.transform.clone(),
            config.settings.server_send_interval(),
        )
        .with_buffer_limit(config.settings.buffer_limit);

        Ok(Self {
            server_transform: trajectory(0.0, config.radius, config.angular_speed),
            client_transform: Transform::default(),
            report: Report::default(),
            error_sum: 0.0,
            error_samples: 0,
            clock,
            server,
            server_link,
            client,
            client_link,
            sender,
            receiver,
            config,
        })
    }

    pub fn step(&mut self) -> anyhow::Result<()> {
        self.clock.advance(self.config.frame_time());
        let now = self.clock.now();

        self.server.early_update(&mut self.server_link, now)?;
        self.server_transform = trajectory(now, self.config.radius, self.config.angular_speed);
        if self.server.begin_send(now)? {
            if let Some(outgoing) = self.sender.tick(&self.server_transform) {
                self.server.send(&outgoing.message, outgoing.channel, now)?;
                self.report.messages_sent += 1;
            }
        }
        self.server.flush(&mut self.server_link)?;

        if !self.client.is_connected() {
            return Ok(());
        }

        for received in self.client.early_update(&mut self.client_link, now)? {
            if let Err(err) =
                self.receiver
                    .on_message(&received.message, received.timing, &mut self.client_transform)
            {
                log::warn!("entity sync error: {err}");
                self.report.sync_errors += 1;
                self.sender.force_full();
            }
        }

        let timeline = self.client.timeline();
        if self.receiver.update(timeline, &mut self.client_transform) {
            let expected = trajectory(timeline, self.config.radius, self.config.angular_speed);
            let error = expected.position.distance(self.client_transform.position) as f64;
            self.error_sum += error;
            self.error_samples += 1;
            self.report.max_error = self.report.max_error.max(error);
        }

        self.client.begin_send(now)?;
        self.client.flush(&mut self.client_link)?;
        Ok(())
    }

    pub fn run(mut self) -> anyhow::Result<Report> {
        let frames = self.config.frames();
        let log_every = u64::from(self.config.frame_rate.max(1));

        for frame in 1..=frames {
            self.step()?;
            if frame % log_every == 0 {
                log::info!(
                    "t={:.1}s timescale={:.2} buffer={:.3}s buffered={}",
                    self.clock.now(),
                    self.client.timescale(),
                    self.client.buffer_time(),
                    self.receiver.buffer().len()
                );
            }
        }

        self.report.frames = frames;
        Ok(self.finish())
    }

    fn finish(self) -> Report {
        Report {
            server_link: self.server_link.stats(),
            client_link: self.client_link.stats(),
            timescale: self.client.timescale(),
            buffer_time: self.client.buffer_time(),
            buffer_time_multiplier: self.client.buffer_time_multiplier(),
            drift_std_dev: self.client.drift_ema().standard_deviation(),
            delivery_std_dev: self.client.delivery_time_ema().standard_deviation(),
            mean_error: if self.error_samples == 0 {
                0.0
            } else {
                self.error_sum / self.error_samples as f64
            },
            ..self.report
        }
    }
}
