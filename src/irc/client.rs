//! IRC client.
//!
//! Split in two halves, the way the relay needs them:
//! - [`IrcHandle`] is shared. It implements [`LocalNetwork`], queues
//!   outgoing lines and owns the local event bus.
//! - [`IrcConnection`] owns the socket side and is driven by one task that
//!   reconnects until shutdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::bridge::LocalNetwork;
use crate::common::error::{IrcError, IrcResult};
use crate::common::{LocalEvent, LocalMessage, Origin};
use crate::config::IrcConfig;

use super::codec::IrcCodec;
use super::format::strip_formatting;
use super::message::IrcMessage;

/// Capacity of the local event bus.
const EVENT_BUS_CAPACITY: usize = 256;

const QUIT_REASON: &str = "Shutting down";

/// Shared side of the IRC client.
pub struct IrcHandle {
    config: IrcConfig,
    outgoing_tx: mpsc::UnboundedSender<IrcMessage>,
    events_tx: broadcast::Sender<LocalEvent>,
    joined: watch::Sender<HashSet<String>>,
    nick: watch::Sender<String>,
}

/// Socket side of the IRC client.
pub struct IrcConnection {
    handle: Arc<IrcHandle>,
    outgoing_rx: mpsc::UnboundedReceiver<IrcMessage>,
}

/// Create both halves of an IRC client for `config`.
pub fn new_client(config: IrcConfig) -> (Arc<IrcHandle>, IrcConnection) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (events_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
    let (joined, _) = watch::channel(HashSet::new());
    let (nick, _) = watch::channel(config.nick.clone());

    let handle = Arc::new(IrcHandle {
        config,
        outgoing_tx,
        events_tx,
        joined,
        nick,
    });
    let connection = IrcConnection {
        handle: handle.clone(),
        outgoing_rx,
    };
    (handle, connection)
}

impl IrcHandle {
    /// Subscribe to channel messages and topic changes.
    pub fn subscribe(&self) -> broadcast::Receiver<LocalEvent> {
        self.events_tx.subscribe()
    }

    /// Nick currently in use (may differ from the configured one).
    pub fn current_nick(&self) -> String {
        self.nick.borrow().clone()
    }

    fn publish(&self, event: LocalEvent) {
        // No subscribers is fine: nothing is forwarding yet
        if self.events_tx.send(event).is_err() {
            debug!("No local event subscribers");
        }
    }

    fn is_own_nick(&self, nick: &str) -> bool {
        self.nick.borrow().eq_ignore_ascii_case(nick)
    }
}

impl LocalNetwork for IrcHandle {
    fn feed_incoming(&self, channel: &str, author: &str, text: &str, origin: Origin) {
        self.publish(LocalEvent::Message(
            LocalMessage::privmsg(channel, author, text).with_origin(origin),
        ));
    }

    /// Queue a PRIVMSG. Servers do not echo our own lines, so nothing is
    /// published on the bus whatever the origin.
    fn enqueue_outgoing(&self, channel: &str, text: &str, origin: Origin) {
        if self
            .outgoing_tx
            .send(IrcMessage::privmsg(channel, text))
            .is_err()
        {
            warn!(channel, ?origin, "IRC connection task is gone, dropping line");
        }
    }

    fn channels_joined(&self) -> HashSet<String> {
        self.joined.borrow().clone()
    }

    fn configured_chat_id(&self, channel: &str) -> i64 {
        self.config.chat_id_for(channel)
    }
}

/// Reconnect backoff: 2s initial, 5min max, doubling, with jitter, unlimited retries.
fn reconnect_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(2))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build()
}

fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

impl IrcConnection {
    /// Connect, run the session and reconnect with backoff until shutdown.
    pub async fn run_forever(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let host = self.handle.config.host.clone();
        let port = self.handle.config.port;
        let mut backoff = reconnect_backoff();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            info!("Connecting to IRC server {}:{}...", host, port);
            let connect = tokio::select! {
                result = TcpStream::connect((host.as_str(), port)) => result,
                _ = shutdown_rx.changed() => break,
            };

            match connect {
                Ok(stream) => {
                    info!("Connected to {}:{}", host, port);
                    backoff = reconnect_backoff();

                    match self.run(stream, &mut shutdown_rx).await {
                        Ok(()) => info!("IRC session closed"),
                        Err(e) => error!("IRC connection error: {}", e),
                    }
                }
                Err(source) => {
                    let e = IrcError::ConnectFailed {
                        host: host.clone(),
                        port,
                        source,
                    };
                    error!("{}", e);
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            let delay = backoff.next().unwrap_or(Duration::from_secs(300));
            info!("Reconnecting to IRC in {:.1} seconds...", delay.as_secs_f64());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("IRC client stopped");
    }

    /// Run one session over an established stream.
    ///
    /// Returns `Ok(())` after a clean QUIT on shutdown; any other end of the
    /// session is an error. The joined set is cleared either way.
    pub async fn run<S>(&mut self, stream: S, shutdown_rx: &mut watch::Receiver<bool>) -> IrcResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, IrcCodec);
        let result = self.session(&mut framed, shutdown_rx).await;
        self.handle.joined.send_replace(HashSet::new());
        result
    }

    async fn session<S>(
        &mut self,
        framed: &mut Framed<S, IrcCodec>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IrcResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.handle.config;
        self.handle.nick.send_replace(config.nick.clone());
        framed.send(IrcMessage::nick_cmd(&config.nick)).await?;
        framed
            .send(IrcMessage::user(config.user(), config.realname()))
            .await?;

        let mut registered = false;
        loop {
            tokio::select! {
                incoming = framed.next() => {
                    let message = match incoming {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(e),
                        None => return Err(IrcError::ConnectionClosed),
                    };
                    for reply in self.dispatch(&message, &mut registered)? {
                        framed.send(reply).await?;
                    }
                }
                Some(line) = self.outgoing_rx.recv(), if registered => {
                    framed.send(line).await?;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Leaving IRC");
                        framed.send(IrcMessage::quit(QUIT_REASON)).await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// React to one server line. Returns the lines to send back.
    fn dispatch(&self, message: &IrcMessage, registered: &mut bool) -> IrcResult<Vec<IrcMessage>> {
        let handle = &self.handle;
        let sender = message.nick().unwrap_or_default();

        match message.command.as_str() {
            "PING" => return Ok(vec![IrcMessage::pong(message.params.clone())]),
            "001" => {
                *registered = true;
                info!("Registered as {}", handle.current_nick());
                return Ok(handle
                    .config
                    .channel_names()
                    .iter()
                    .map(|channel| IrcMessage::join(channel))
                    .collect());
            }
            "433" if !*registered => {
                let nick = format!("{}_", handle.current_nick());
                warn!("Nick in use, trying {}", nick);
                handle.nick.send_replace(nick.clone());
                return Ok(vec![IrcMessage::nick_cmd(&nick)]);
            }
            "NICK" if handle.is_own_nick(sender) => {
                if let Some(nick) = message.param(0) {
                    info!("Nick changed to {}", nick);
                    handle.nick.send_replace(nick.to_string());
                }
            }
            "JOIN" if handle.is_own_nick(sender) => {
                if let Some(channel) = message.param(0) {
                    info!(channel, "Joined channel");
                    handle.joined.send_modify(|joined| {
                        joined.insert(channel.to_string());
                    });
                }
            }
            "PART" if handle.is_own_nick(sender) => {
                if let Some(channel) = message.param(0) {
                    info!(channel, "Left channel");
                    handle.joined.send_modify(|joined| {
                        joined.retain(|c| !c.eq_ignore_ascii_case(channel));
                    });
                }
            }
            "KICK" => {
                if let (Some(channel), Some(kicked)) = (message.param(0), message.param(1)) {
                    if handle.is_own_nick(kicked) {
                        warn!(channel, by = sender, "Kicked from channel");
                        handle.joined.send_modify(|joined| {
                            joined.retain(|c| !c.eq_ignore_ascii_case(channel));
                        });
                    }
                }
            }
            "PRIVMSG" | "NOTICE" => {
                if let (Some(target), Some(text)) = (message.param(0), message.param(1)) {
                    let from_server = message.is_from_server();
                    // User notices are not chat; server ones are system messages
                    if is_channel(target) && (message.command == "PRIVMSG" || from_server) {
                        let mut local = match IrcMessage::action_text(text) {
                            Some(action) => {
                                LocalMessage::action(target, sender, strip_formatting(action))
                            }
                            None => LocalMessage::privmsg(target, sender, strip_formatting(text)),
                        };
                        local.error = from_server;
                        handle.publish(LocalEvent::Message(local));
                    }
                }
            }
            "TOPIC" if message.params.len() == 2 => {
                handle.publish(LocalEvent::Topic {
                    channel: message.params[0].clone(),
                    topic: strip_formatting(&message.params[1]),
                });
            }
            "ERROR" => {
                return Err(IrcError::Server {
                    message: message.param(0).unwrap_or_default().to_string(),
                });
            }
            _ => {}
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    type Server = Framed<DuplexStream, IrcCodec>;

    fn test_config() -> IrcConfig {
        IrcConfig {
            host: "irc.example.org".to_string(),
            port: 6667,
            nick: "tgbridge".to_string(),
            user: None,
            realname: Some("Telegram bridge".to_string()),
            color_nicks: false,
            channels: vec![
                ChannelConfig {
                    name: "#general".to_string(),
                    chat_id: Some(42),
                },
                ChannelConfig {
                    name: "#dev".to_string(),
                    chat_id: None,
                },
            ],
        }
    }

    fn line(raw: &str) -> IrcMessage {
        IrcMessage::parse(raw).unwrap()
    }

    async fn expect_line(server: &mut Server) -> String {
        tokio::time::timeout(Duration::from_secs(1), server.next())
            .await
            .expect("timed out waiting for client line")
            .unwrap()
            .unwrap()
            .to_string()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met");
    }

    async fn next_event(events: &mut broadcast::Receiver<LocalEvent>) -> LocalEvent {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    struct Session {
        handle: Arc<IrcHandle>,
        server: Server,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<IrcResult<()>>,
    }

    fn start() -> Session {
        let (handle, mut connection) = new_client(test_config());
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { connection.run(client_io, &mut shutdown_rx).await });
        Session {
            handle,
            server: Framed::new(server_io, IrcCodec),
            shutdown_tx,
            task,
        }
    }

    /// Drive registration until both channels are joined.
    async fn register(s: &mut Session) {
        assert_eq!(expect_line(&mut s.server).await, "NICK tgbridge");
        assert_eq!(
            expect_line(&mut s.server).await,
            "USER tgbridge 0 * :Telegram bridge"
        );
        s.server.send(line(":srv 001 tgbridge :Welcome")).await.unwrap();
        assert_eq!(expect_line(&mut s.server).await, "JOIN #general");
        assert_eq!(expect_line(&mut s.server).await, "JOIN #dev");
        s.server.send(line(":tgbridge!u@h JOIN #general")).await.unwrap();
        s.server.send(line(":tgbridge!u@h JOIN #dev")).await.unwrap();
        let handle = s.handle.clone();
        wait_for(|| handle.channels_joined().len() == 2).await;
    }

    #[tokio::test]
    async fn test_register_join_and_quit() {
        let mut s = start();
        register(&mut s).await;

        s.server.send(line("PING :srv")).await.unwrap();
        assert_eq!(expect_line(&mut s.server).await, "PONG srv");

        s.shutdown_tx.send(true).unwrap();
        assert_eq!(expect_line(&mut s.server).await, "QUIT :Shutting down");
        assert!(s.task.await.unwrap().is_ok());
        assert!(s.handle.channels_joined().is_empty());
    }

    #[tokio::test]
    async fn test_nick_in_use_appends_underscore() {
        let mut s = start();
        expect_line(&mut s.server).await;
        expect_line(&mut s.server).await;

        s.server
            .send(line(":srv 433 * tgbridge :Nickname is already in use"))
            .await
            .unwrap();
        assert_eq!(expect_line(&mut s.server).await, "NICK tgbridge_");
        assert_eq!(s.handle.current_nick(), "tgbridge_");
    }

    #[tokio::test]
    async fn test_channel_messages_published() {
        let mut s = start();
        let mut events = s.handle.subscribe();
        register(&mut s).await;

        s.server
            .send(line(":alice!a@h PRIVMSG #general :\x02hello\x02"))
            .await
            .unwrap();
        s.server
            .send(line(":alice!a@h PRIVMSG #general :\x01ACTION waves\x01"))
            .await
            .unwrap();
        s.server
            .send(line(":alice!a@h PRIVMSG tgbridge :private"))
            .await
            .unwrap();
        s.server
            .send(line(":op!o@h TOPIC #dev :Sprint 12"))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            LocalEvent::Message(LocalMessage::privmsg("#general", "alice", "hello"))
        );
        assert_eq!(
            next_event(&mut events).await,
            LocalEvent::Message(LocalMessage::action("#general", "alice", "waves"))
        );
        assert_eq!(
            next_event(&mut events).await,
            LocalEvent::Topic {
                channel: "#dev".to_string(),
                topic: "Sprint 12".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_outgoing_lines_sent_after_registration() {
        let mut s = start();
        let mut events = s.handle.subscribe();

        s.handle.enqueue_outgoing("#general", "bob> hi", Origin::Relay);
        register(&mut s).await;
        assert_eq!(
            expect_line(&mut s.server).await,
            "PRIVMSG #general :bob> hi"
        );

        // Relay lines are not mirrored onto the bus
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_outgoing_lines_never_published() {
        let (handle, _connection) = new_client(test_config());
        let mut events = handle.subscribe();

        handle.enqueue_outgoing("#general", "hello", Origin::Local);
        handle.enqueue_outgoing("#general", "bob> hi", Origin::Relay);

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_server_notices_marked_as_system() {
        let mut s = start();
        let mut events = s.handle.subscribe();
        register(&mut s).await;

        s.server
            .send(line(":irc.example.org NOTICE #general :Server restarting in 5 minutes"))
            .await
            .unwrap();
        s.server
            .send(line(":alice!a@h NOTICE #general :psst"))
            .await
            .unwrap();
        s.server
            .send(line(":alice!a@h PRIVMSG #general :hi"))
            .await
            .unwrap();

        match next_event(&mut events).await {
            LocalEvent::Message(msg) => {
                assert_eq!(msg.nick, "irc.example.org");
                assert!(msg.error);
            }
            other => panic!("unexpected event {:?}", other),
        }
        // The user notice is skipped
        match next_event(&mut events).await {
            LocalEvent::Message(msg) => {
                assert_eq!(msg.text, "hi");
                assert!(!msg.error);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_feed_incoming_publishes_with_origin() {
        let (handle, _connection) = new_client(test_config());
        let mut events = handle.subscribe();

        handle.feed_incoming("#general", "bob", "|weather London", Origin::Relay);

        match events.try_recv().unwrap() {
            LocalEvent::Message(msg) => {
                assert_eq!(msg.nick, "bob");
                assert_eq!(msg.text, "|weather London");
                assert_eq!(msg.origin, Origin::Relay);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_kick_and_part_leave_channel() {
        let mut s = start();
        register(&mut s).await;

        s.server
            .send(line(":op!o@h KICK #general tgbridge :bye"))
            .await
            .unwrap();
        s.server.send(line(":tgbridge!u@h PART #dev")).await.unwrap();

        let handle = s.handle.clone();
        wait_for(|| handle.channels_joined().is_empty()).await;
    }

    #[tokio::test]
    async fn test_configured_chat_id() {
        let (handle, _connection) = new_client(test_config());
        assert_eq!(handle.configured_chat_id("#GENERAL"), 42);
        assert_eq!(handle.configured_chat_id("#dev"), 0);
        assert_eq!(handle.configured_chat_id("#other"), 0);
    }

    #[tokio::test]
    async fn test_server_error_ends_session() {
        let mut s = start();
        register(&mut s).await;

        s.server
            .send(line("ERROR :Closing Link: (Ping timeout)"))
            .await
            .unwrap();

        let result = s.task.await.unwrap();
        assert!(matches!(result, Err(IrcError::Server { .. })));
        assert!(s.handle.channels_joined().is_empty());
    }

    #[tokio::test]
    async fn test_error_before_registration() {
        let stream = tokio_test::io::Builder::new()
            .write(b"NICK tgbridge\r\n")
            .write(b"USER tgbridge 0 * :Telegram bridge\r\n")
            .read(b"ERROR :Closing Link: banned\r\n")
            .build();
        let (_handle, mut connection) = new_client(test_config());
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let result = connection.run(stream, &mut shutdown_rx).await;

        match result {
            Err(IrcError::Server { message }) => assert_eq!(message, "Closing Link: banned"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_stream_is_error() {
        let mut s = start();
        expect_line(&mut s.server).await;
        drop(s.server);

        let result = s.task.await.unwrap();
        assert!(matches!(
            result,
            Err(IrcError::ConnectionClosed) | Err(IrcError::Io(_))
        ));
    }
}
