//! One side of one connection.
//!
//! A [`Peer`] owns the per-connection clock synchronization: the buffer of
//! received time snapshots, the local timeline chasing the remote clock, and
//! the batchers for outgoing traffic. The host drives it once per frame:
//!
//! 1. [`Peer::early_update`] drains the transport, feeds clock samples into
//!    the timeline and hands entity messages back to the caller.
//! 2. [`Peer::begin_send`] tells the caller when a send interval elapsed.
//! 3. [`Peer::send`] and [`Peer::flush`] batch and transmit.

use crate::config::SnapshotSettings;
use crate::interpolation::{
    self, CatchupParams, TimelineState, dynamic_adjustment, insert_and_adjust,
};
use crate::math::ExponentialMovingAverage;
use crate::snapshot::{SnapshotBuffer, TimeSnapshot};

use super::batch::{BatchError, Batcher, Unbatcher};
use super::clock::IntervalTimer;
use super::protocol::{Channel, MAX_PACKET_SIZE, NetMessage, PacketError};
use super::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("failed to encode message: {0}")]
    Encode(#[source] PacketError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// When a message was sent and received, and how far behind it will be
/// shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiveTiming {
    pub remote_timestamp: f64,
    pub local_time: f64,
    pub buffer_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub channel: Channel,
    pub timing: ReceiveTiming,
    pub message: NetMessage,
}

#[derive(Debug)]
pub struct Peer {
    settings: SnapshotSettings,
    remote_send_rate_hz: u32,
    remote_send_interval: f64,
    send_timer: IntervalTimer,
    reliable: Batcher,
    unreliable: Batcher,
    time_buffer: SnapshotBuffer<TimeSnapshot>,
    timeline: TimelineState,
    buffer_time_multiplier: f64,
    last_update: Option<f64>,
    state: ConnectionState,
}

impl Peer {
    /// `local_send_rate_hz` paces our own sends, `remote_send_rate_hz` is
    /// the rate the other side sends at.
    pub fn new(
        settings: SnapshotSettings,
        local_send_rate_hz: u32,
        remote_send_rate_hz: u32,
    ) -> Self {
        let remote_send_rate_hz = remote_send_rate_hz.max(1);
        Self {
            timeline: TimelineState::from_settings(&settings, remote_send_rate_hz),
            time_buffer: SnapshotBuffer::with_limit(settings.buffer_limit),
            buffer_time_multiplier: settings.buffer_time_multiplier,
            remote_send_rate_hz,
            remote_send_interval: 1.0 / remote_send_rate_hz as f64,
            send_timer: IntervalTimer::new(1.0 / local_send_rate_hz.max(1) as f64),
            reliable: Batcher::new(MAX_PACKET_SIZE),
            unreliable: Batcher::new(MAX_PACKET_SIZE),
            last_update: None,
            state: ConnectionState::Disconnected,
            settings,
        }
    }

    /// The server side of a connection: sends at the server rate, receives
    /// at the client rate.
    pub fn server(settings: SnapshotSettings) -> Self {
        let (local, remote) = (settings.server_send_rate_hz, settings.client_send_rate_hz);
        Self::new(settings, local, remote)
    }

    pub fn client(settings: SnapshotSettings) -> Self {
        let (local, remote) = (settings.client_send_rate_hz, settings.server_send_rate_hz);
        Self::new(settings, local, remote)
    }

    pub fn connect(&mut self, transport: &mut impl Transport) {
        transport.connect();
        self.reliable
            .set_threshold(transport.max_packet_size(Channel::Reliable));
        self.unreliable
            .set_threshold(transport.max_packet_size(Channel::Unreliable));
        if self.state != ConnectionState::Connected {
            log::info!("peer connected");
        }
        self.state = ConnectionState::Connected;
    }

    pub fn disconnect(&mut self, transport: &mut impl Transport) {
        transport.disconnect();
        if self.state != ConnectionState::Disconnected {
            log::info!("peer disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.reset();
    }

    /// Clears all per-connection state. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.reliable.clear();
        self.unreliable.clear();
        self.time_buffer.clear();
        self.timeline.reset();
        self.buffer_time_multiplier = self.settings.buffer_time_multiplier;
        self.send_timer.reset();
        self.last_update = None;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn settings(&self) -> &SnapshotSettings {
        &self.settings
    }

    pub fn timeline(&self) -> f64 {
        self.timeline.timeline
    }

    pub fn timescale(&self) -> f64 {
        self.timeline.timescale
    }

    pub fn drift_ema(&self) -> &ExponentialMovingAverage {
        &self.timeline.drift_ema
    }

    pub fn delivery_time_ema(&self) -> &ExponentialMovingAverage {
        &self.timeline.delivery_time_ema
    }

    pub fn buffer_time_multiplier(&self) -> f64 {
        self.buffer_time_multiplier
    }

    pub fn remote_send_interval(&self) -> f64 {
        self.remote_send_interval
    }

    pub fn send_interval(&self) -> f64 {
        self.send_timer.interval()
    }

    /// How far the timeline trails the newest remote time.
    pub fn buffer_time(&self) -> f64 {
        self.remote_send_interval * self.buffer_time_multiplier
    }

    pub fn time_buffer(&self) -> &SnapshotBuffer<TimeSnapshot> {
        &self.time_buffer
    }

    /// Drains the transport and advances the timeline to `now`.
    ///
    /// Clock samples are consumed here; everything else is returned. Any
    /// malformed batch disconnects the peer.
    pub fn early_update(
        &mut self,
        transport: &mut impl Transport,
        now: f64,
    ) -> Result<Vec<Received>, PeerError> {
        let mut received = Vec::new();
        if !self.is_connected() {
            return Ok(received);
        }

        while let Some((channel, batch)) = transport.poll() {
            if let Err(err) = self.process_batch(channel, &batch, now, &mut received) {
                log::warn!("dropping peer after malformed {channel:?} batch: {err}");
                self.disconnect(transport);
                return Err(err.into());
            }
        }

        self.update_timeline(now);
        Ok(received)
    }

    fn process_batch(
        &mut self,
        channel: Channel,
        batch: &[u8],
        now: f64,
        received: &mut Vec<Received>,
    ) -> Result<(), ProtocolError> {
        let unbatcher = Unbatcher::new(batch)?;
        let remote_timestamp = unbatcher.remote_timestamp();

        for message in unbatcher {
            match NetMessage::deserialize(message?)? {
                NetMessage::TimeSnapshot => self.on_time_snapshot(remote_timestamp, now),
                message => received.push(Received {
                    channel,
                    timing: ReceiveTiming {
                        remote_timestamp,
                        local_time: now,
                        buffer_time: self.buffer_time(),
                    },
                    message,
                }),
            }
        }
        Ok(())
    }

    fn on_time_snapshot(&mut self, remote_timestamp: f64, local_time: f64) {
        if self.settings.dynamic_adjustment {
            let multiplier = dynamic_adjustment(
                self.remote_send_rate_hz as f64,
                self.timeline.delivery_time_ema.standard_deviation(),
                self.settings.dynamic_adjustment_tolerance,
            );
            if multiplier != self.buffer_time_multiplier {
                log::debug!(
                    "buffer time multiplier {} -> {}",
                    self.buffer_time_multiplier,
                    multiplier
                );
            }
            self.buffer_time_multiplier = multiplier;
        }

        let params = CatchupParams::new(
            &self.settings,
            self.remote_send_interval,
            self.buffer_time(),
        );
        insert_and_adjust(
            &mut self.time_buffer,
            TimeSnapshot::new(remote_timestamp, local_time),
            &mut self.timeline,
            &params,
        );
    }

    fn update_timeline(&mut self, now: f64) {
        let delta = self.last_update.map_or(0.0, |last| (now - last).max(0.0));
        self.last_update = Some(now);

        if self.time_buffer.is_empty() {
            return;
        }
        interpolation::step(
            &mut self.time_buffer,
            delta,
            &mut self.timeline.timeline,
            self.timeline.timescale,
        );
    }

    /// True once per send interval; queues a clock sample when it fires.
    pub fn begin_send(&mut self, now: f64) -> Result<bool, PeerError> {
        if !self.is_connected() || !self.send_timer.elapsed(now) {
            return Ok(false);
        }
        self.send(&NetMessage::TimeSnapshot, Channel::Unreliable, now)?;
        Ok(true)
    }

    pub fn send(
        &mut self,
        message: &NetMessage,
        channel: Channel,
        now: f64,
    ) -> Result<(), PeerError> {
        let bytes = message.serialize().map_err(PeerError::Encode)?;
        let batcher = match channel {
            Channel::Reliable => &mut self.reliable,
            Channel::Unreliable => &mut self.unreliable,
        };
        batcher.add_message(&bytes, now);
        Ok(())
    }

    pub fn flush(&mut self, transport: &mut impl Transport) -> Result<(), PeerError> {
        if !self.is_connected() {
            self.reliable.clear();
            self.unreliable.clear();
            return Ok(());
        }

        for channel in Channel::ALL {
            let batcher = match channel {
                Channel::Reliable => &mut self.reliable,
                Channel::Unreliable => &mut self.unreliable,
            };
            while let Some(batch) = batcher.take_batch() {
                transport.send(channel, &batch)?;
            }
        }
        Ok(())
    }
}
