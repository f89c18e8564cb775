//! In-process channel transport.
//!
//! Channels open immediately. The peer side is driven by hand through a
//! `MemoryChannel`: inject inbound messages, collect what the client sent,
//! or close from the remote end. Used by tests and the offline CLI demo.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::protocol::{reply_for, InboundMessage, OutboundMessage};
use super::{ChannelConnector, ChannelEvent, ChannelHandle, Subscriber};
use crate::feed::FeedId;

/// Peer side of one in-memory channel.
#[derive(Clone)]
pub struct MemoryChannel {
    handle: ChannelHandle,
    subscriber: Arc<Mutex<Subscriber>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MemoryChannel {
    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    /// Deliver a message as if the service sent it.
    pub fn inject(&self, message: InboundMessage) {
        if !self.handle.is_open() {
            return;
        }
        if let Some(reply) = reply_for(&message) {
            self.record_sent(reply);
            return;
        }
        if matches!(message, InboundMessage::Pong | InboundMessage::Unknown(_)) {
            return;
        }
        self.notify(ChannelEvent::Message(message));
    }

    /// Move whatever the client has queued into the sent log and return the log.
    pub fn drain_sent(&self) -> Vec<OutboundMessage> {
        if let Some(message) = self.handle.take_outbound(Duration::ZERO) {
            self.record_sent(message);
        }
        let mut sent = lock(&self.sent);
        std::mem::take(&mut *sent)
    }

    /// Wait up to `wait` for the client to queue a message.
    pub fn recv_sent(&self, wait: Duration) -> Option<OutboundMessage> {
        self.handle.take_outbound(wait)
    }

    /// Close from the service side.
    pub fn close_remote(&self, reason: Option<&str>) {
        if self.handle.is_open() {
            self.handle.mark_closed();
            self.notify(ChannelEvent::Closed {
                reason: reason.map(str::to_string),
            });
        }
    }

    /// Complete a close requested by the client.
    fn finish_requested_close(&self) {
        if self.handle.close_requested() && self.handle.is_open() {
            self.handle.mark_closed();
            self.notify(ChannelEvent::Closed { reason: None });
        }
    }

    fn record_sent(&self, message: OutboundMessage) {
        lock(&self.sent).push(message);
    }

    fn notify(&self, event: ChannelEvent) {
        let mut subscriber = lock(&self.subscriber);
        (*subscriber)(event);
    }
}

#[derive(Default)]
struct MemoryState {
    channels: HashMap<FeedId, MemoryChannel>,
    refuse: bool,
}

/// Connector handing out `MemoryChannel`s.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose connects fail, as if the service were unreachable.
    pub fn refusing() -> Self {
        let connector = Self::default();
        lock(&connector.state).refuse = true;
        connector
    }

    /// Peer side of the most recent channel for `feed`.
    pub fn channel(&self, feed: &FeedId) -> Option<MemoryChannel> {
        lock(&self.state).channels.get(feed).cloned()
    }

    /// Complete any client-requested closes. The WebSocket transport does
    /// this on its worker thread; here the test drives it.
    pub fn settle(&self) {
        let channels: Vec<MemoryChannel> = lock(&self.state).channels.values().cloned().collect();
        for channel in channels {
            channel.finish_requested_close();
        }
    }
}

impl ChannelConnector for MemoryConnector {
    fn connect(&self, feed: &FeedId, mut subscriber: Subscriber) -> Result<ChannelHandle> {
        if lock(&self.state).refuse {
            return Err(anyhow!("connection refused"));
        }
        let handle = ChannelHandle::new();
        handle.mark_open();
        subscriber(ChannelEvent::Opened);
        let channel = MemoryChannel {
            handle: handle.clone(),
            subscriber: Arc::new(Mutex::new(subscriber)),
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        lock(&self.state).channels.insert(feed.clone(), channel);
        Ok(handle)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FrameResult;
    use std::sync::mpsc;

    fn connect(connector: &MemoryConnector) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
        let (tx, rx) = mpsc::channel();
        let handle = connector
            .connect(
                &FeedId::new("feed1"),
                Box::new(move |event| {
                    let _ = tx.send(event);
                }),
            )
            .unwrap();
        (handle, rx)
    }

    #[test]
    fn delivers_inbound_and_answers_ping() {
        let connector = MemoryConnector::new();
        let (handle, rx) = connect(&connector);
        assert!(handle.is_open());
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Opened);

        let peer = connector.channel(&FeedId::new("feed1")).unwrap();
        peer.inject(InboundMessage::Ping);
        assert_eq!(peer.drain_sent(), vec![OutboundMessage::Pong]);
        assert!(rx.try_recv().is_err());

        peer.inject(InboundMessage::DetectionResult(FrameResult::default()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ChannelEvent::Message(InboundMessage::DetectionResult(_))
        ));
    }

    #[test]
    fn requested_close_completes_on_settle() {
        let connector = MemoryConnector::new();
        let (handle, rx) = connect(&connector);
        let _ = rx.try_recv();
        handle.close();
        connector.settle();
        assert!(!handle.is_open());
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Closed { reason: None });
    }

    #[test]
    fn refusing_connector_fails() {
        let connector = MemoryConnector::refusing();
        let result = connector.connect(&FeedId::new("feed1"), Box::new(|_| {}));
        assert!(result.is_err());
    }
}
