//! Isolated invocation of user callbacks.
//!
//! Both the dispatcher and the scheduler run user code through
//! [`spawn_isolated`]: the callback runs on its own task, and whatever it
//! does (return an error, panic) ends up in the log instead of in the loop
//! that triggered it.

use std::{any::Any, fmt, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use tokio::task::JoinHandle;

/// Result type returned by handlers and timed tasks.
pub type HandlerResult = anyhow::Result<()>;

/// Boxed future returned by type-erased callbacks.
pub type BoxFuture<T> = futures::future::BoxFuture<'static, T>;

/// How an isolated invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Panicked(String),
}

/// Spawn `fut` on its own task, catching errors and panics.
///
/// `name` identifies the callback and `trigger` describes what caused the
/// invocation; both are only formatted when the callback fails.
pub fn spawn_isolated<F, D>(name: impl Into<String>, trigger: D, fut: F) -> JoinHandle<Outcome>
where
    F: Future<Output = HandlerResult> + Send + 'static,
    D: fmt::Debug + Send + Sync + 'static,
{
    let name = name.into();
    tokio::spawn(async move { run_isolated(&name, &trigger, fut).await })
}

/// Drive `fut` on the current task, catching errors and panics.
///
/// Several of these can share one task (e.g. under `join_all`) and still
/// fail independently.
pub async fn run_isolated<F, D>(name: &str, trigger: &D, fut: F) -> Outcome
where
    F: Future<Output = HandlerResult>,
    D: fmt::Debug + ?Sized,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(e)) => {
            tracing::error!(handler = %name, "Handler failed: {e:#}\n trigger={trigger:?}");
            Outcome::Failed(format!("{e:#}"))
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            tracing::error!(handler = %name, "Handler panicked: {msg}\n trigger={trigger:?}");
            Outcome::Panicked(msg)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completed_invocation() {
        let outcome = spawn_isolated("ok", "trigger", async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
    }

    #[tokio::test]
    async fn test_error_is_caught() {
        let outcome = spawn_isolated("err", 1, async { Err(anyhow::anyhow!("boom")) })
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failed("boom".to_string()));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let explode = true;
        let outcome = spawn_isolated("panic", (), async move {
            assert!(!explode, "kaboom");
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Panicked("kaboom".to_string()));
    }

    #[tokio::test]
    async fn test_run_in_place_keeps_siblings_alive() {
        async fn explode() -> HandlerResult {
            let explode = true;
            assert!(!explode, "first");
            Ok(())
        }
        async fn fine() -> HandlerResult {
            Ok(())
        }

        let (first, second) =
            futures::join!(run_isolated("a", "t", explode()), run_isolated("b", "t", fine()));
        assert_eq!(first, Outcome::Panicked("first".to_string()));
        assert_eq!(second, Outcome::Completed);
    }

    #[tokio::test]
    async fn test_formatted_panic_is_caught() {
        let value = 3;
        let outcome = spawn_isolated("panic", (), async move {
            if value > 0 {
                panic!("bad value {value}");
            }
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Panicked("bad value 3".to_string()));
    }
}
