//! Bot handle and lifecycle.
//!
//! [`Bot`] is a cheap, cloneable handle. `start` negotiates a session and
//! spawns a supervisor that runs the connection reader and the scheduler
//! side by side; when either the gateway hangs up or [`Bot::stop`] is
//! called, the supervisor tears both down, fails every outstanding
//! request and releases the session.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::NaiveDateTime;
use gatebot_core::{
    Connector, HandlerResult, HandshakeProvider, Identity, Session, SessionKey, Transport,
};
use gatebot_schedule::{Clock, Scheduler, SystemClock, TimedTask};
use gatebot_session::{
    CorrelationTable, Established, PendingResult, RequestError, SessionManager,
};
use gatebot_transport::OutboundFrame;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    BotConfig, BotError, Category, Context, DispatchError, Handler, HandlerRegistry, Predicate,
    dispatch, handler_fn,
};

/// How the supervisor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    ConnectionClosed,
}

struct Live {
    session: Session,
    transport: Arc<dyn Transport>,
}

struct BotInner {
    config: BotConfig,
    registry: HandlerRegistry,
    scheduler: Scheduler<Bot>,
    correlation: CorrelationTable,
    live: RwLock<Option<Live>>,
    started: AtomicBool,
    stopped: AtomicBool,
    cancel: CancellationToken,
    exit: watch::Sender<Option<Exit>>,
}

/// Handle to a running (or not yet started) bot.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("identity", &self.identity())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Create a bot on the system clock.
    #[must_use]
    pub fn new(config: BotConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a bot whose scheduler reads time from `clock`.
    #[must_use]
    pub fn with_clock(config: BotConfig, clock: Arc<dyn Clock>) -> Self {
        let correlation = CorrelationTable::with_limits(
            config.request_ttl(),
            config.request_capacity,
            config.reserved_sync_id,
        );
        let scheduler = Scheduler::with_clock(clock, config.tick());
        let (exit, _) = watch::channel(None);

        Self {
            inner: Arc::new(BotInner {
                config,
                registry: HandlerRegistry::new(),
                scheduler,
                correlation,
                live: RwLock::new(None),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                exit,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.inner.config.session.identity
    }

    /// Key of the current session, if connected.
    #[must_use]
    pub fn session_key(&self) -> Option<SessionKey> {
        self.inner.live.read().as_ref().map(|l| l.session.key.clone())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.live.read().is_some()
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.correlation.len()
    }

    pub(crate) fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub(crate) fn correlation(&self) -> &CorrelationTable {
        &self.inner.correlation
    }

    /// Register a handler. Allowed before and after `start`.
    pub fn register(
        &self,
        category: Category,
        name: impl Into<String>,
        predicate: Option<Predicate>,
        handler: impl Handler,
    ) {
        self.inner
            .registry
            .register(category, name, predicate, handler);
    }

    /// Register an async handler for one concrete kind.
    pub fn on<F, Fut>(&self, kind: &str, name: impl Into<String>, predicate: Option<Predicate>, f: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(Category::kind(kind), name, predicate, handler_fn(f));
    }

    /// Register an async handler for every message.
    pub fn on_message<F, Fut>(&self, name: impl Into<String>, predicate: Option<Predicate>, f: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(Category::AnyMessage, name, predicate, handler_fn(f));
    }

    /// Register an async handler for every event.
    pub fn on_event<F, Fut>(&self, name: impl Into<String>, predicate: Option<Predicate>, f: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(Category::AnyEvent, name, predicate, handler_fn(f));
    }

    /// Add a timed task. Returns its first fire time.
    pub fn schedule(&self, task: TimedTask<Self>) -> Option<NaiveDateTime> {
        self.inner.scheduler.schedule(task)
    }

    /// Negotiate a session and start the reader and scheduler loops.
    ///
    /// Returns once the loops are running; use [`wait`](Self::wait) to block
    /// until they end.
    ///
    /// # Errors
    /// Returns [`BotError::Session`] if the handshake fails (the bot may be
    /// started again), [`BotError::AlreadyStarted`] or [`BotError::Stopped`]
    /// otherwise.
    pub async fn start<C, H>(&self, connector: C, handshake: H) -> Result<(), BotError>
    where
        C: Connector + 'static,
        H: HandshakeProvider + 'static,
    {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(BotError::Stopped);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(BotError::AlreadyStarted);
        }
        tracing::info!("Bot start: identity={}", self.identity());

        let manager = SessionManager::new(connector, handshake, self.inner.config.session.clone());
        let Established { session, transport } = match manager.connect().await {
            Ok(established) => established,
            Err(e) => {
                self.inner.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let transport: Arc<dyn Transport> = Arc::new(transport);
        *self.inner.live.write() = Some(Live {
            session: session.clone(),
            transport: Arc::clone(&transport),
        });

        tokio::spawn(supervise(self.clone(), manager, session, transport));
        Ok(())
    }

    /// Wait until both loops have ended and the session is released.
    ///
    /// # Errors
    /// Returns [`BotError::ConnectionClosed`] if the gateway closed the
    /// connection, or [`BotError::NotStarted`] if there is nothing to wait
    /// for.
    pub async fn wait(&self) -> Result<(), BotError> {
        let mut rx = self.inner.exit.subscribe();
        let current = *rx.borrow();
        let exit = match current {
            Some(exit) => exit,
            None if !self.inner.started.load(Ordering::SeqCst) => {
                return Err(BotError::NotStarted);
            }
            None => rx
                .wait_for(Option::is_some)
                .await
                .map_or(Exit::Stopped, |exit| (*exit).unwrap_or(Exit::Stopped)),
        };
        match exit {
            Exit::Stopped => Ok(()),
            Exit::ConnectionClosed => Err(BotError::ConnectionClosed),
        }
    }

    /// Stop the bot.
    ///
    /// Cancels both loops and fails every outstanding request with
    /// [`RequestError::ConnectionClosed`]. Returns `false` if the bot was
    /// already stopped.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Bot already stopped");
            return false;
        }
        tracing::info!("Bot stop: identity={}", self.identity());

        self.inner.cancel.cancel();
        self.inner.scheduler.stop();
        let failed = self.inner.correlation.close_all();
        if failed > 0 {
            tracing::debug!("Failed {failed} pending request(s)");
        }
        if !self.inner.started.load(Ordering::SeqCst) {
            self.inner.exit.send_replace(Some(Exit::Stopped));
        }
        true
    }

    /// Send a command to the gateway.
    ///
    /// The session key is added to `content` and the frame is sent on a
    /// spawned task; the returned result resolves with the gateway's reply.
    /// Must be called inside a tokio runtime.
    pub fn request(
        &self,
        command: &str,
        sub_command: Option<&str>,
        content: Value,
    ) -> PendingResult {
        let (sync_id, pending) = self.inner.correlation.allocate();
        if self.inner.correlation.is_closed() {
            return pending;
        }

        let live = self
            .inner
            .live
            .read()
            .as_ref()
            .map(|l| (l.session.key.clone(), Arc::clone(&l.transport)));
        let Some((key, transport)) = live else {
            tracing::warn!("Request {command} while not connected");
            self.inner
                .correlation
                .fail(sync_id, RequestError::NotConnected);
            return pending;
        };

        let mut content = match content {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("content".to_string(), other);
                map
            }
        };
        content.insert("sessionKey".to_string(), Value::String(key.as_str().to_string()));
        let frame = OutboundFrame::new(
            sync_id,
            command,
            sub_command.map(str::to_string),
            Value::Object(content),
        );
        tracing::debug!("Request {command} syncId={sync_id}");

        let bot = self.clone();
        tokio::spawn(async move {
            let sent = match frame.encode() {
                Ok(bytes) => transport.send(bytes).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = sent {
                tracing::warn!("Failed to send {} syncId={sync_id}: {e}", frame.command);
                bot.inner.correlation.fail(sync_id, RequestError::Send(e));
            }
        });

        pending
    }
}

async fn supervise<C, H>(
    bot: Bot,
    manager: SessionManager<C, H>,
    session: Session,
    transport: Arc<dyn Transport>,
) where
    C: Connector,
    H: HandshakeProvider,
{
    let cancel = bot.inner.cancel.clone();

    let reader = tokio::spawn({
        let bot = bot.clone();
        let transport = Arc::clone(&transport);
        async move {
            let result = dispatch::read_loop(&bot, transport.as_ref(), &cancel).await;
            // Either way the scheduler goes down with the reader.
            cancel.cancel();
            bot.inner.scheduler.stop();
            result
        }
    });

    let scheduler = tokio::spawn({
        let bot = bot.clone();
        async move { bot.inner.scheduler.run(bot.clone()).await }
    });

    let exit = match reader.await {
        Ok(Ok(())) => Exit::Stopped,
        Ok(Err(DispatchError::ConnectionClosed)) => Exit::ConnectionClosed,
        Err(e) => {
            tracing::error!("Reader task failed: {e}");
            Exit::ConnectionClosed
        }
    };
    match scheduler.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Scheduler did not run: {e}"),
        Err(e) => tracing::error!("Scheduler task failed: {e}"),
    }

    bot.inner.stopped.store(true, Ordering::SeqCst);
    let failed = bot.inner.correlation.close_all();
    if failed > 0 {
        tracing::debug!("Failed {failed} pending request(s) on teardown");
    }
    *bot.inner.live.write() = None;

    if let Err(e) = transport.close().await {
        tracing::debug!("Failed to close transport: {e}");
    }
    manager.disconnect(&session).await;

    match exit {
        Exit::Stopped => tracing::info!("Bot exit: identity={}", bot.identity()),
        Exit::ConnectionClosed => tracing::error!("Bot lost connection: identity={}", bot.identity()),
    }
    bot.inner.exit.send_replace(Some(exit));
}
