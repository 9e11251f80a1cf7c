use std::cell::RefCell;
use std::rc::Rc;

use super::clock::{Clock, ManualClock};
use super::protocol::{Channel, MAX_PACKET_SIZE};
use super::simulator::{LinkConditions, NetworkSimulator};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("packet of {size} bytes exceeds the {max} byte limit of the {channel:?} channel")]
    PacketTooLarge {
        channel: Channel,
        size: usize,
        max: usize,
    },
}

/// Packet transport between two peers.
///
/// Reliable delivery is ordered and lossless; unreliable may drop, delay and
/// reorder.
pub trait Transport {
    fn connect(&mut self);
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn send(&mut self, channel: Channel, payload: &[u8]) -> Result<(), TransportError>;
    fn poll(&mut self) -> Option<(Channel, Vec<u8>)>;
    fn max_packet_size(&self, channel: Channel) -> usize;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug)]
struct Inbox {
    reliable: NetworkSimulator<Vec<u8>>,
    unreliable: NetworkSimulator<Vec<u8>>,
}

impl Inbox {
    fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            reliable: NetworkSimulator::new(conditions.reliable(), seed).ordered(),
            unreliable: NetworkSimulator::new(conditions, seed.wrapping_add(1)),
        }
    }

    fn clear(&mut self) {
        self.reliable.clear();
        self.unreliable.clear();
    }
}

#[derive(Debug)]
struct Link {
    inboxes: [Inbox; 2],
    connected: [bool; 2],
    stats: [TransportStats; 2],
}

/// One end of an in-process link.
///
/// Both ends share the link and observe the same clock, so delivery is
/// driven entirely by simulated time.
#[derive(Debug)]
pub struct MemoryTransport<C: Clock = ManualClock> {
    side: usize,
    link: Rc<RefCell<Link>>,
    clock: C,
    max_packet_size: usize,
}

impl<C: Clock + Clone> MemoryTransport<C> {
    /// Connected pair sharing `clock`. Each direction gets its own RNG
    /// stream derived from `seed`.
    pub fn pair(clock: C, conditions: LinkConditions, seed: u64) -> (Self, Self) {
        let link = Rc::new(RefCell::new(Link {
            inboxes: [
                Inbox::new(conditions, seed),
                Inbox::new(conditions, seed.wrapping_add(0x9E37_79B9)),
            ],
            connected: [true, true],
            stats: [TransportStats::default(); 2],
        }));

        let end = |side| Self {
            side,
            link: Rc::clone(&link),
            clock: clock.clone(),
            max_packet_size: MAX_PACKET_SIZE,
        };
        (end(0), end(1))
    }
}

impl<C: Clock> MemoryTransport<C> {
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn stats(&self) -> TransportStats {
        self.link.borrow().stats[self.side]
    }

    fn remote(&self) -> usize {
        1 - self.side
    }
}

impl<C: Clock> Transport for MemoryTransport<C> {
    fn connect(&mut self) {
        self.link.borrow_mut().connected[self.side] = true;
    }

    fn disconnect(&mut self) {
        let mut link = self.link.borrow_mut();
        link.connected[self.side] = false;
        link.inboxes[self.side].clear();
    }

    fn is_connected(&self) -> bool {
        self.link.borrow().connected[self.side]
    }

    fn send(&mut self, channel: Channel, payload: &[u8]) -> Result<(), TransportError> {
        let max = self.max_packet_size(channel);
        if payload.len() > max {
            return Err(TransportError::PacketTooLarge {
                channel,
                size: payload.len(),
                max,
            });
        }

        let now = self.clock.now();
        let remote = self.remote();
        let mut link = self.link.borrow_mut();
        if !link.connected[self.side] {
            return Err(TransportError::NotConnected);
        }

        let stats = &mut link.stats[self.side];
        stats.packets_sent += 1;
        stats.bytes_sent += payload.len() as u64;

        // A disconnected remote silently swallows packets, like a dead socket.
        if !link.connected[remote] {
            return Ok(());
        }

        let inbox = &mut link.inboxes[remote];
        let delivered = match channel {
            Channel::Reliable => inbox.reliable.enqueue(payload.to_vec(), now),
            Channel::Unreliable => inbox.unreliable.enqueue(payload.to_vec(), now),
        };
        if !delivered {
            link.stats[self.side].packets_lost += 1;
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<(Channel, Vec<u8>)> {
        let now = self.clock.now();
        let mut link = self.link.borrow_mut();
        if !link.connected[self.side] {
            return None;
        }

        let inbox = &mut link.inboxes[self.side];
        let packet = inbox
            .reliable
            .pop_ready(now)
            .map(|payload| (Channel::Reliable, payload))
            .or_else(|| {
                inbox
                    .unreliable
                    .pop_ready(now)
                    .map(|payload| (Channel::Unreliable, payload))
            })?;

        let stats = &mut link.stats[self.side];
        stats.packets_received += 1;
        stats.bytes_received += packet.1.len() as u64;
        Some(packet)
    }

    fn max_packet_size(&self, _channel: Channel) -> usize {
        self.max_packet_size
    }
}
