mod config;
mod simulation;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use config::SimConfig;
use simulation::Simulation;
use snapsync::{LinkConditions, ReplicationMode, SnapshotSettings, TransformSyncConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Full,
    Delta,
}

impl From<Mode> for ReplicationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => ReplicationMode::FullOnly,
            Mode::Delta => ReplicationMode::DeltaCompressed,
        }
    }
}

#[derive(Parser)]
#[command(name = "snapsync-sim")]
#[command(about = "Replicates a moving entity over a simulated link and reports sync quality")]
struct Args {
    #[arg(short, long, default_value_t = 30, help = "Server and client send rate in Hz")]
    send_rate: u32,

    #[arg(long, default_value_t = 120, help = "Simulated frames per second")]
    frame_rate: u32,

    #[arg(short, long, default_value_t = 10.0, help = "Simulated seconds")]
    duration: f64,

    #[arg(long, default_value_t = 0.0, help = "One-way latency in ms")]
    latency: f64,

    #[arg(long, default_value_t = 0.0, help = "Jitter in ms")]
    jitter: f64,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f64,

    #[arg(short, long, value_enum, default_value_t = Mode::Delta)]
    mode: Mode,

    #[arg(long, default_value_t = 2.0, help = "Initial buffer time in send intervals")]
    buffer_multiplier: f64,

    #[arg(long, help = "Keep the buffer time fixed instead of following jitter")]
    no_dynamic_adjustment: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn into_config(self) -> SimConfig {
        SimConfig {
            settings: SnapshotSettings {
                server_send_rate_hz: self.send_rate,
                client_send_rate_hz: self.send_rate,
                buffer_time_multiplier: self.buffer_multiplier,
                dynamic_adjustment: !self.no_dynamic_adjustment,
                ..Default::default()
            },
            transform: TransformSyncConfig {
                mode: self.mode.into(),
                ..Default::default()
            },
            link: LinkConditions {
                latency_ms: self.latency,
                jitter_ms: self.jitter,
                loss_percent: self.loss_percent,
            },
            frame_rate: self.frame_rate,
            duration_secs: self.duration,
            seed: self.seed,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    log::info!(
        "Simulating {:.1}s at {} Hz, {:?} over {:?}",
        config.duration_secs,
        config.settings.server_send_rate_hz,
        config.transform.mode,
        config.link
    );

    let report = Simulation::new(config)?.run()?;

    log::info!(
        "{} frames, {} transform messages, {} packets / {} bytes sent, {} lost",
        report.frames,
        report.messages_sent,
        report.server_link.packets_sent,
        report.server_link.bytes_sent,
        report.server_link.packets_lost
    );
    log::info!(
        "client sent {} packets, received {}",
        report.client_link.packets_sent,
        report.client_link.packets_received
    );
    log::info!(
        "timescale {:.3}, buffer time {:.3}s (x{}), drift std {:.4}s, delivery std {:.4}s",
        report.timescale,
        report.buffer_time,
        report.buffer_time_multiplier,
        report.drift_std_dev,
        report.delivery_std_dev
    );
    log::info!(
        "position error mean {:.4} max {:.4}, {} sync errors",
        report.mean_error,
        report.max_error,
        report.sync_errors
    );

    Ok(())
}
