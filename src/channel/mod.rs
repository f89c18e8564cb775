//! Per-feed streaming result channel.
//!
//! A `ChannelConnector` opens one channel per live feed and returns a
//! `ChannelHandle`. Producers call `send`; inbound traffic is delivered to
//! the subscriber callback given at connect time.
//!
//! Outbound delivery is a single slot: a frame that has not been written
//! yet is replaced by the next one. Nothing is queued while the channel is
//! not open; `send` simply reports the message as not accepted.

pub mod memory;
pub mod protocol;
pub mod ws;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::feed::FeedId;

pub use memory::{MemoryChannel, MemoryConnector};
pub use protocol::{parse_inbound, reply_for, AlertConfig, InboundMessage, OutboundMessage};
pub use ws::{websocket_url, WsConnector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Connecting,
            1 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ChannelState::Connecting => 0,
            ChannelState::Open => 1,
            ChannelState::Closed => 2,
        }
    }
}

/// Notifications delivered to a channel subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Message(InboundMessage),
    /// `reason` is `None` for a requested close.
    Closed { reason: Option<String> },
}

pub type Subscriber = Box<dyn FnMut(ChannelEvent) + Send>;

/// Opens streaming channels.
pub trait ChannelConnector: Send + Sync {
    /// Begin connecting a channel for `feed`. Connection progress and
    /// failure are reported through `subscriber`.
    fn connect(&self, feed: &FeedId, subscriber: Subscriber) -> Result<ChannelHandle>;
}

struct ChannelShared {
    state: AtomicU8,
    close_requested: AtomicBool,
    outbox: Mutex<Option<OutboundMessage>>,
    signal: Condvar,
    accepted: AtomicU64,
    replaced: AtomicU64,
}

/// Cloneable handle to one channel.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<ChannelShared>,
}

impl Default for ChannelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                state: AtomicU8::new(ChannelState::Connecting.as_u8()),
                close_requested: AtomicBool::new(false),
                outbox: Mutex::new(None),
                signal: Condvar::new(),
                accepted: AtomicU64::new(0),
                replaced: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Offer a message for delivery. Returns false when the channel is not
    /// open. An undelivered earlier message is replaced.
    pub fn send(&self, message: OutboundMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        let mut slot = match self.shared.outbox.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.replace(message).is_some() {
            self.shared.replaced.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.accepted.fetch_add(1, Ordering::Relaxed);
        self.shared.signal.notify_all();
        true
    }

    /// Ask the transport to close. The subscriber sees `Closed` once it has.
    pub fn close(&self) {
        self.shared.close_requested.store(true, Ordering::SeqCst);
        self.shared.signal.notify_all();
    }

    pub fn close_requested(&self) -> bool {
        self.shared.close_requested.load(Ordering::SeqCst)
    }

    /// Messages accepted by `send`.
    pub fn accepted(&self) -> u64 {
        self.shared.accepted.load(Ordering::Relaxed)
    }

    /// Messages overwritten before the transport picked them up.
    pub fn replaced(&self) -> u64 {
        self.shared.replaced.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_open(&self) {
        self.set_state(ChannelState::Open);
    }

    pub(crate) fn mark_closed(&self) {
        self.set_state(ChannelState::Closed);
        let mut slot = match self.shared.outbox.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take();
    }

    /// Transport side: take the pending message, waiting up to `wait`.
    pub(crate) fn take_outbound(&self, wait: Duration) -> Option<OutboundMessage> {
        let slot = match self.shared.outbox.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut slot = if slot.is_none() && !wait.is_zero() && !self.close_requested() {
            match self.shared.signal.wait_timeout(slot, wait) {
                Ok((slot, _)) => slot,
                Err(poisoned) => poisoned.into_inner().0,
            }
        } else {
            slot
        };
        slot.take()
    }

    fn set_state(&self, state: ChannelState) {
        self.shared.state.store(state.as_u8(), Ordering::SeqCst);
    }
}
