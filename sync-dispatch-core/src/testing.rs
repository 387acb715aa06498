//! Test utilities for sync-dispatch applications
//!
//! - [`MockTransport`]: scripted backend that records every command it receives
//! - [`event_channel`]: a hand-driven source of backend events
//! - [`TestHarness`]: action channel with helpers for draining what handlers emitted
//! - Assertion macros for verifying emitted actions
//!
//! # Example
//!
//! ```ignore
//! use sync_dispatch::testing::{event_channel, MockTransport};
//!
//! let transport = MockTransport::new();
//! transport.reply("add_to_queue", Ok(json!([])));
//!
//! let (events, source) = event_channel();
//! let session = Session::start(transport.clone(), source).await?;
//! events.send(RawEvent::new("queue_update", json!([])))?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bridge::RawEvent;
use crate::command::{Transport, TransportError};
use crate::{Action, ActionCategory};

/// Create a sender and the matching event stream for an [`EventBridge`](crate::EventBridge).
pub fn event_channel() -> (mpsc::UnboundedSender<RawEvent>, UnboundedReceiverStream<RawEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

struct Scripted {
    result: Result<Value, TransportError>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct MockInner {
    replies: HashMap<&'static str, VecDeque<Scripted>>,
    calls: Vec<(&'static str, Value)>,
}

/// Scripted [`Transport`].
///
/// Replies are queued per command name and consumed in order. A command with
/// nothing queued answers `null`. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the next reply for `command`.
    pub fn reply(&self, command: &'static str, result: Result<Value, TransportError>) -> &Self {
        self.push(command, result, None)
    }

    /// Queue a reply that arrives only after `delay`.
    pub fn reply_after(
        &self,
        command: &'static str,
        delay: Duration,
        result: Result<Value, TransportError>,
    ) -> &Self {
        self.push(command, result, Some(delay))
    }

    fn push(
        &self,
        command: &'static str,
        result: Result<Value, TransportError>,
        delay: Option<Duration>,
    ) -> &Self {
        self.lock()
            .replies
            .entry(command)
            .or_default()
            .push_back(Scripted { result, delay });
        self
    }

    /// Every command received so far, in arrival order.
    pub fn calls(&self) -> Vec<(&'static str, Value)> {
        self.lock().calls.clone()
    }

    /// Arguments of every call to `command`.
    pub fn calls_to(&self, command: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| *name == command)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn invoke(&self, command: &'static str, args: Value) -> Result<Value, TransportError> {
        let scripted = {
            let mut inner = self.lock();
            inner.calls.push((command, args));
            inner
                .replies
                .get_mut(command)
                .and_then(VecDeque::pop_front)
        };

        match scripted {
            Some(Scripted { result, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(Value::Null),
        }
    }
}

/// Generic test harness with an action channel.
///
/// # Example
///
/// ```ignore
/// let mut harness = TestHarness::<QueueState, Action>::new(QueueState::default());
///
/// // Hand the sender to a bridge handler
/// let tx = harness.sender();
///
/// let actions = harness.drain_emitted();
/// assert_emitted!(actions, Action::Backend(_));
/// ```
pub struct TestHarness<S, A: Action> {
    /// The application state under test
    pub state: S,
    tx: mpsc::UnboundedSender<A>,
    rx: mpsc::UnboundedReceiver<A>,
}

impl<S, A: Action> TestHarness<S, A> {
    pub fn new(state: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { state, tx, rx }
    }

    /// Get a clone of the action sender for passing to handlers.
    pub fn sender(&self) -> mpsc::UnboundedSender<A> {
        self.tx.clone()
    }

    pub fn emit(&self, action: A) {
        let _ = self.tx.send(action);
    }

    /// Drain all emitted actions from the channel.
    pub fn drain_emitted(&mut self) -> Vec<A> {
        let mut actions = Vec::new();
        while let Ok(action) = self.rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    /// Wait up to `timeout` for the next emitted action.
    pub async fn next_emitted(&mut self, timeout: Duration) -> Option<A> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}

impl<S: Default, A: Action> Default for TestHarness<S, A> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S, A: ActionCategory> TestHarness<S, A> {
    /// Drain emitted actions of one category, leaving the rest queued.
    pub fn drain_category(&mut self, category: &str) -> Vec<A> {
        let (matching, rest): (Vec<A>, Vec<A>) = self
            .drain_emitted()
            .into_iter()
            .partition(|action| action.category() == Some(category));

        for action in rest {
            let _ = self.tx.send(action);
        }

        matching
    }
}

/// Assert that a specific action was emitted.
///
/// ```ignore
/// let actions = harness.drain_emitted();
/// assert_emitted!(actions, Action::QueueDidRemove { id: 7 });
/// ```
#[macro_export]
macro_rules! assert_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` to be emitted, but got: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Assert that a specific action was NOT emitted.
#[macro_export]
macro_rules! assert_not_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` NOT to be emitted, but it was: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Count how many actions match a pattern.
#[macro_export]
macro_rules! count_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().filter(|a| matches!(a, $pattern $(if $guard)?)).count()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Foo,
        Bar(i32),
    }

    impl Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Foo => "Foo",
                TestAction::Bar(_) => "Bar",
            }
        }
    }

    impl ActionCategory for TestAction {
        fn category(&self) -> Option<&'static str> {
            match self {
                TestAction::Foo => None,
                TestAction::Bar(_) => Some("bar"),
            }
        }
    }

    #[test]
    fn test_harness_emit_and_drain() {
        let mut harness = TestHarness::<(), TestAction>::new(());

        harness.emit(TestAction::Foo);
        harness.emit(TestAction::Bar(42));

        let actions = harness.drain_emitted();
        assert_eq!(actions, vec![TestAction::Foo, TestAction::Bar(42)]);
        assert!(harness.drain_emitted().is_empty());
    }

    #[test]
    fn test_drain_category_keeps_the_rest() {
        let mut harness = TestHarness::<(), TestAction>::new(());
        harness.emit(TestAction::Foo);
        harness.emit(TestAction::Bar(1));

        assert_eq!(harness.drain_category("bar"), vec![TestAction::Bar(1)]);
        assert_eq!(harness.drain_emitted(), vec![TestAction::Foo]);
    }

    #[test]
    fn test_assert_macros() {
        let actions = vec![TestAction::Foo, TestAction::Bar(42)];

        assert_emitted!(actions, TestAction::Foo);
        assert_emitted!(actions, TestAction::Bar(n) if *n == 42);
        assert_not_emitted!(actions, TestAction::Bar(99));
        assert_eq!(count_emitted!(actions, TestAction::Bar(_)), 1);
    }

    #[tokio::test]
    async fn test_mock_transport_replays_in_order() {
        let transport = MockTransport::new();
        transport
            .reply("get", Ok(json!(1)))
            .reply("get", Err(TransportError::Rejected("no".into())));

        assert_eq!(transport.invoke("get", json!({})).await, Ok(json!(1)));
        assert!(transport.invoke("get", json!({})).await.is_err());
        assert_eq!(transport.invoke("get", json!({})).await, Ok(Value::Null));
        assert_eq!(transport.calls_to("get").len(), 3);
    }

    #[tokio::test]
    async fn test_event_channel_feeds_stream() {
        use tokio_stream::StreamExt;

        let (tx, mut stream) = event_channel();
        tx.send(RawEvent::new("queue_update", json!([]))).unwrap();
        drop(tx);

        assert_eq!(stream.next().await.map(|e| e.name), Some("queue_update".into()));
        assert!(stream.next().await.is_none());
    }
}
