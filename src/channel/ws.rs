//! WebSocket transport for the result channel.
//!
//! Each channel runs on its own worker thread which owns the socket: it
//! connects, writes whatever sits in the outbound slot, reads inbound
//! messages with a short timeout, and answers pings. There is no
//! reconnect; once closed the channel stays closed.

use anyhow::{anyhow, Context, Result};
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::protocol::{parse_inbound, reply_for, InboundMessage, OutboundMessage};
use super::{ChannelConnector, ChannelEvent, ChannelHandle, Subscriber};
use crate::feed::FeedId;

const DETECT_PATH: &str = "ws/detect";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Derive `{base}/ws/detect` with the scheme rewritten http→ws, https→wss.
pub fn websocket_url(api_base: &str) -> Result<Url> {
    let mut url = Url::parse(api_base).with_context(|| format!("parse api base {}", api_base))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported api scheme '{}'", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot rewrite scheme of {}", api_base))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.join(DETECT_PATH)
        .with_context(|| format!("build websocket url from {}", api_base))
}

pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(api_base: &str) -> Result<Self> {
        Ok(Self {
            url: websocket_url(api_base)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ChannelConnector for WsConnector {
    fn connect(&self, feed: &FeedId, subscriber: Subscriber) -> Result<ChannelHandle> {
        let handle = ChannelHandle::new();
        let worker_handle = handle.clone();
        let url = self.url.clone();
        let feed = feed.clone();
        std::thread::Builder::new()
            .name(format!("ws-{}", feed))
            .spawn(move || run_channel(url, feed, worker_handle, subscriber))
            .context("spawn websocket worker")?;
        Ok(handle)
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn run_channel(url: Url, feed: FeedId, handle: ChannelHandle, mut subscriber: Subscriber) {
    let mut socket = match open_socket(&url) {
        Ok(socket) => socket,
        Err(err) => {
            log::warn!("WsChannel[{}]: connect to {} failed: {:#}", feed, url, err);
            handle.mark_closed();
            subscriber(ChannelEvent::Closed {
                reason: Some(format!("{:#}", err)),
            });
            return;
        }
    };
    if handle.close_requested() {
        let _ = socket.close(None);
        handle.mark_closed();
        subscriber(ChannelEvent::Closed { reason: None });
        return;
    }
    handle.mark_open();
    log::info!("WsChannel[{}]: connected to {}", feed, url);
    subscriber(ChannelEvent::Opened);

    let reason = pump(&mut socket, &feed, &handle, &mut subscriber);
    handle.mark_closed();
    match &reason {
        Some(reason) => log::warn!("WsChannel[{}]: closed: {}", feed, reason),
        None => log::info!("WsChannel[{}]: closed", feed),
    }
    subscriber(ChannelEvent::Closed { reason });
}

fn open_socket(url: &Url) -> Result<Socket> {
    let (socket, _response) = tungstenite::connect(url.as_str()).context("websocket handshake")?;
    set_read_timeout(&socket, Some(POLL_INTERVAL))?;
    Ok(socket)
}

fn set_read_timeout(socket: &Socket, timeout: Option<Duration>) -> Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream
            .set_read_timeout(timeout)
            .context("set websocket read timeout")?,
        #[cfg(feature = "tls")]
        MaybeTlsStream::Rustls(stream) => stream
            .get_ref()
            .set_read_timeout(timeout)
            .context("set websocket read timeout")?,
        _ => {}
    }
    Ok(())
}

/// Drive the socket until it closes. Returns the failure reason, or `None`
/// when the close was requested locally or by the peer.
fn pump(
    socket: &mut Socket,
    feed: &FeedId,
    handle: &ChannelHandle,
    subscriber: &mut Subscriber,
) -> Option<String> {
    loop {
        if handle.close_requested() {
            let _ = socket.close(None);
            let _ = socket.flush();
            return None;
        }

        if let Some(message) = handle.take_outbound(Duration::ZERO) {
            if let Err(err) = write_message(socket, &message) {
                return Some(format!("{:#}", err));
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => match parse_inbound(&text) {
                Ok(message) => {
                    if let Some(reply) = reply_for(&message) {
                        if let Err(err) = write_message(socket, &reply) {
                            return Some(format!("{:#}", err));
                        }
                        continue;
                    }
                    match message {
                        InboundMessage::Pong => {}
                        InboundMessage::Unknown(kind) => {
                            log::debug!("WsChannel[{}]: ignoring message type '{}'", feed, kind)
                        }
                        other => subscriber(ChannelEvent::Message(other)),
                    }
                }
                Err(err) => log::warn!("WsChannel[{}]: bad message: {:#}", feed, err),
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return None
            }
            Err(err) => return Some(err.to_string()),
        }
    }
}

fn write_message(socket: &mut Socket, message: &OutboundMessage) -> Result<()> {
    let text = message.to_json()?;
    socket
        .send(Message::Text(text))
        .context("write websocket message")
}
