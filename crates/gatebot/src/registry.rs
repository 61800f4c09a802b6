//! Handler registry.
//!
//! Handlers are grouped by [`Category`]. A push runs the handlers
//! registered for its concrete kind first, then the wildcard handlers for
//! its class, each list in registration order. All handlers for one push
//! share a task, so they start in that order on any runtime flavor.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use gatebot_core::{HandlerResult, Outcome, Push, PushClass, run_isolated};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::{Bot, Context, Predicate};

/// What a handler listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    /// One concrete kind, e.g. `GroupMessage`.
    Kind(String),
    /// Every message.
    AnyMessage,
    /// Every event.
    AnyEvent,
}

impl Category {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self::Kind(kind.into())
    }

    const fn wildcard(class: PushClass) -> Self {
        match class {
            PushClass::Message => Self::AnyMessage,
            PushClass::Event => Self::AnyEvent,
        }
    }
}

/// Async push handler.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, ctx: Context) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: Context) -> HandlerResult {
        (self.0)(ctx).await
    }
}

struct SyncFnHandler<F>(F);

#[async_trait]
impl<F> Handler for SyncFnHandler<F>
where
    F: Fn(Context) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, ctx: Context) -> HandlerResult {
        (self.0)(ctx)
    }
}

/// Adapt an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> impl Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

/// Adapt a synchronous closure into a [`Handler`].
pub fn sync_handler_fn<F>(f: F) -> impl Handler
where
    F: Fn(Context) -> HandlerResult + Send + Sync + 'static,
{
    SyncFnHandler(f)
}

/// A registered handler.
pub struct HandlerEntry {
    name: String,
    predicate: Option<Predicate>,
    handler: Box<dyn Handler>,
}

impl HandlerEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: Context) -> HandlerResult {
        if let Some(predicate) = &self.predicate {
            if !predicate.test(ctx.bot(), ctx.payload()) {
                return Ok(());
            }
        }
        self.handler.handle(ctx).await
    }
}

/// Handlers by category.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<HashMap<Category, Vec<Arc<HandlerEntry>>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler at the end of its category's list.
    pub fn register(
        &self,
        category: Category,
        name: impl Into<String>,
        predicate: Option<Predicate>,
        handler: impl Handler,
    ) {
        let entry = Arc::new(HandlerEntry {
            name: name.into(),
            predicate,
            handler: Box::new(handler),
        });
        tracing::debug!("Register handler {} for {category:?}", entry.name);
        self.entries.write().entry(category).or_default().push(entry);
    }

    /// Handlers for `push`, in invocation order.
    #[must_use]
    pub fn matching(&self, push: &Push) -> Vec<Arc<HandlerEntry>> {
        let entries = self.entries.read();
        let concrete = entries.get(&Category::kind(push.payload().kind()));
        let wildcard = entries.get(&Category::wildcard(push.class()));
        concrete
            .into_iter()
            .chain(wildcard)
            .flatten()
            .cloned()
            .collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every matching handler for `push` on one spawned task.
    ///
    /// Handlers start in [`matching`](Self::matching) order and then run
    /// concurrently; each one is isolated from the others' errors and
    /// panics. Returns `None` when nothing matches. The handle is only
    /// useful to callers that want to wait for the handlers.
    pub fn dispatch(&self, bot: &Bot, push: Push) -> Option<JoinHandle<Vec<Outcome>>> {
        let handlers = self.matching(&push);
        if handlers.is_empty() {
            tracing::debug!("No handler for {}", push.payload().kind());
            return None;
        }

        let bot = bot.clone();
        let push = Arc::new(push);
        Some(tokio::spawn(async move {
            let runs = handlers.iter().map(|entry| {
                let ctx = Context::new(bot.clone(), Arc::clone(&push));
                run_isolated(entry.name(), &push, entry.invoke(ctx))
            });
            futures::future::join_all(runs).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gatebot_core::Identity;
    use gatebot_session::SessionConfig;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::{BotConfig, predicate::text_eq};

    fn bot() -> Bot {
        Bot::new(BotConfig::new(SessionConfig::new(Identity(1), "key")))
    }

    fn friend_message() -> Push {
        Push::decode(json!({
            "type": "FriendMessage",
            "sender": {"id": 2, "nickname": "n"},
            "messageChain": [{"type": "Plain", "text": "hi"}]
        }))
        .unwrap()
    }

    fn noop() -> impl Handler {
        sync_handler_fn(|_| Ok(()))
    }

    #[test]
    fn test_concrete_kind_before_wildcard() {
        let registry = HandlerRegistry::new();
        registry.register(Category::AnyMessage, "any-1", None, noop());
        registry.register(Category::kind("FriendMessage"), "friend", None, noop());
        registry.register(Category::AnyMessage, "any-2", None, noop());
        registry.register(Category::kind("GroupMessage"), "group", None, noop());
        registry.register(Category::AnyEvent, "event", None, noop());

        let names: Vec<_> = registry
            .matching(&friend_message())
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["friend", "any-1", "any-2"]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_event_matches_event_wildcard() {
        let registry = HandlerRegistry::new();
        registry.register(Category::AnyMessage, "message", None, noop());
        registry.register(Category::AnyEvent, "event", None, noop());

        let push = Push::decode(json!({"type": "BotOnlineEvent", "qq": 1})).unwrap();
        let names: Vec<_> = registry
            .matching(&push)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["event"]);
    }

    #[tokio::test]
    async fn test_predicate_gates_handler() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        registry.register(
            Category::kind("ping"),
            "ping",
            Some(text_eq("ping")),
            handler_fn(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            }),
        );

        let bot = bot();
        for text in ["ping", "pong"] {
            let push = Push::decode(json!({"type": "ping", "text": text})).unwrap();
            let outcomes = registry.dispatch(&bot, push).unwrap().await.unwrap();
            assert_eq!(outcomes, [Outcome::Completed]);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        registry.register(
            Category::AnyMessage,
            "fails",
            None,
            handler_fn(|_| async { Err::<(), _>(anyhow::anyhow!("nope")) }),
        );
        registry.register(
            Category::AnyMessage,
            "panics",
            None,
            sync_handler_fn(|_| {
                let explode = true;
                assert!(!explode, "handler exploded");
                Ok(())
            }),
        );
        let log = Arc::clone(&seen);
        registry.register(
            Category::AnyMessage,
            "records",
            None,
            sync_handler_fn(move |ctx| {
                log.lock().push(ctx.payload().text());
                Ok(())
            }),
        );

        let outcomes = registry
            .dispatch(&bot(), friend_message())
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcomes[0], Outcome::Failed("nope".to_string()));
        assert!(matches!(outcomes[1], Outcome::Panicked(ref m) if m == "handler exploded"));
        assert_eq!(outcomes[2], Outcome::Completed);
        assert_eq!(*seen.lock(), ["hi"]);
    }

    #[test]
    fn test_no_handler_dispatches_nothing() {
        let registry = HandlerRegistry::new();
        registry.register(Category::AnyEvent, "event", None, noop());
        assert!(registry.dispatch(&bot(), friend_message()).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handlers_start_in_registration_order() {
        let registry = Arc::new(HandlerRegistry::new());
        let started = Arc::new(Mutex::new(Vec::new()));
        // More than a handful, so the ordered path of `join_all` is covered too.
        let names: Vec<String> = (0..40).map(|i| format!("handler-{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            let log = Arc::clone(&started);
            let label = name.clone();
            let category = if i % 2 == 0 {
                Category::kind("ping")
            } else {
                Category::AnyEvent
            };
            registry.register(
                category,
                name.clone(),
                None,
                sync_handler_fn(move |_| {
                    log.lock().push(label.clone());
                    Ok(())
                }),
            );
        }

        let expected: Vec<String> = names
            .iter()
            .step_by(2)
            .chain(names.iter().skip(1).step_by(2))
            .cloned()
            .collect();

        for _ in 0..20 {
            started.lock().clear();
            let registry = Arc::clone(&registry);
            // Dispatch from a worker thread, where a fresh spawn would
            // otherwise jump the queue.
            let outcomes = tokio::spawn(async move {
                let push = Push::decode(json!({"type": "ping", "text": "ping"})).unwrap();
                registry.dispatch(&bot(), push).unwrap().await.unwrap()
            })
            .await
            .unwrap();
            assert_eq!(outcomes.len(), 40);
            assert_eq!(*started.lock(), expected);
        }
    }
}
