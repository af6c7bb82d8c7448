//! Background websocket client.
//!
//! The client owns a tokio task that connects to the subscriber service,
//! flushes pending messages, answers pings and reconnects after a fixed
//! delay whenever the connection fails or the server closes it.

use crate::config::Settings;
use crate::model::changelog::ChangelogEntry;
use crate::websocket::message::{messages_for, ServerMessage};
use crate::websocket::NotifierError;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

enum Command {
    Send(Vec<ServerMessage>),
    Stop,
}

enum SessionEnd {
    Disconnected,
    Stopped,
}

/// Handle to the notification task.
#[derive(Debug)]
pub struct ChangeNotificationClient {
    url: Url,
    commands: UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(messages) => write!(f, "Send({})", messages.len()),
            Self::Stop => write!(f, "Stop"),
        }
    }
}

impl ChangeNotificationClient {
    /// Spawns the connection task on the current tokio runtime.
    ///
    /// # Errors
    /// - [`NotifierError::NoRuntime`] when called outside a runtime.
    pub fn start(url: Url) -> Result<Self, NotifierError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| NotifierError::NoRuntime)?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = runtime.spawn(run(url.clone(), receiver));
        info!(
            "event=notifier_start module=websocket status=ok url={}",
            url
        );
        Ok(Self {
            url,
            commands,
            task,
        })
    }

    /// Starts a client when a websocket URL is configured.
    ///
    /// Returns `Ok(None)` when notifications are disabled.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, NotifierError> {
        match settings.ws_url.clone() {
            Some(url) => Self::start(url).map(Some),
            None => {
                info!("event=notifier_start module=websocket status=disabled reason=no_url");
                Ok(None)
            }
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Queues events for the given entries. Returns immediately.
    pub fn send_messages<'a, I>(&self, entries: I)
    where
        I: IntoIterator<Item = &'a ChangelogEntry>,
    {
        let messages: Vec<ServerMessage> = entries.into_iter().flat_map(messages_for).collect();
        if messages.is_empty() {
            return;
        }
        let count = messages.len();
        if self.commands.send(Command::Send(messages)).is_err() {
            warn!(
                "event=notifier_queue module=websocket status=error reason=worker_gone dropped={}",
                count
            );
        }
    }

    /// Closes the connection and waits for the task to finish.
    pub async fn stop(self) -> Result<(), NotifierError> {
        let _ = self.commands.send(Command::Stop);
        self.task
            .await
            .map_err(|err| NotifierError::Worker(err.to_string()))?;
        info!("event=notifier_stop module=websocket status=ok url={}", self.url);
        Ok(())
    }
}

async fn run(url: Url, mut commands: UnboundedReceiver<Command>) {
    let mut pending = BTreeSet::new();
    loop {
        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = queue_until_stop(&mut commands, &mut pending) => return,
        };
        match connected {
            Ok((stream, _response)) => {
                info!("event=notifier_connect module=websocket status=ok url={}", url);
                if let SessionEnd::Stopped = session(stream, &mut commands, &mut pending).await {
                    return;
                }
            }
            Err(err) => {
                warn!(
                    "event=notifier_connect module=websocket status=error url={} pending={} error={}",
                    url,
                    pending.len(),
                    err
                );
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = queue_until_stop(&mut commands, &mut pending) => return,
        }
    }
}

/// Buffers incoming messages; completes only on stop or when every handle
/// is gone.
async fn queue_until_stop(
    commands: &mut UnboundedReceiver<Command>,
    pending: &mut BTreeSet<ServerMessage>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Send(messages) => pending.extend(messages),
            Command::Stop => return,
        }
    }
}

async fn session(
    stream: WsStream,
    commands: &mut UnboundedReceiver<Command>,
    pending: &mut BTreeSet<ServerMessage>,
) -> SessionEnd {
    let (mut sink, mut incoming) = stream.split();
    if flush(&mut sink, pending).await.is_err() {
        return SessionEnd::Disconnected;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(messages)) => {
                    pending.extend(messages);
                    if flush(&mut sink, pending).await.is_err() {
                        return SessionEnd::Disconnected;
                    }
                }
                Some(Command::Stop) | None => {
                    if let Err(err) = sink.send(WsMessage::Close(None)).await {
                        debug!("event=notifier_close module=websocket status=error error={}", err);
                    }
                    return SessionEnd::Stopped;
                }
            },
            frame = incoming.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("event=notifier_receive module=websocket status=ok text={}", text.as_str());
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    if let Err(err) = sink.send(WsMessage::Pong(payload)).await {
                        warn!("event=notifier_pong module=websocket status=error error={}", err);
                        return SessionEnd::Disconnected;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    error!(
                        "event=notifier_closed module=websocket status=error frame={:?}",
                        frame
                    );
                    return SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("event=notifier_receive module=websocket status=error error={}", err);
                    return SessionEnd::Disconnected;
                }
                None => return SessionEnd::Disconnected,
            },
        }
    }
}

/// Sends every pending message; a message leaves `pending` only once sent.
async fn flush(sink: &mut WsSink, pending: &mut BTreeSet<ServerMessage>) -> Result<(), WsError> {
    let queued: Vec<ServerMessage> = pending.iter().cloned().collect();
    for message in queued {
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                error!("event=notifier_send module=websocket status=error error={}", err);
                pending.remove(&message);
                continue;
            }
        };
        if let Err(err) = sink.send(WsMessage::Text(text.into())).await {
            warn!(
                "event=notifier_send module=websocket status=error pending={} error={}",
                pending.len(),
                err
            );
            return Err(err);
        }
        debug!(
            "event=notifier_send module=websocket status=ok event_name={} resource={}",
            message.event, message.resource
        );
        pending.remove(&message);
    }
    Ok(())
}
