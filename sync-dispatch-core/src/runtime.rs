//! The action loop that owns the stores.
//!
//! Actions arrive on one channel from three places: callers issuing intents,
//! command tasks reporting results, and bridge handlers forwarding backend
//! events. The loop applies them one at a time, so the stores only ever see
//! a single writer, then hands every effect the reducers returned to the
//! application's effect handler.

use std::marker::PhantomData;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::effect::{EffectReducer, EffectStore, EffectStoreLike};
use crate::store::{Middleware, NoopMiddleware};
use crate::tasks::TaskManager;
use crate::Action;

/// Context passed to effect handlers.
pub struct EffectContext<'a, A: Action> {
    action_tx: &'a mpsc::UnboundedSender<A>,
    tasks: &'a mut TaskManager<A>,
}

impl<'a, A: Action> EffectContext<'a, A> {
    /// Send an action directly. It is applied after the current one.
    pub fn emit(&self, action: A) {
        let _ = self.action_tx.send(action);
    }

    /// Access the action sender.
    pub fn action_tx(&self) -> &mpsc::UnboundedSender<A> {
        self.action_tx
    }

    /// Access the task manager.
    pub fn tasks(&mut self) -> &mut TaskManager<A> {
        self.tasks
    }
}

/// Runtime helper for effect-based stores.
pub struct EffectRuntime<A, E, St, M = NoopMiddleware>
where
    A: Action,
    St: EffectStoreLike<A, E>,
    M: Middleware<A>,
{
    store: St,
    middleware: M,
    action_tx: mpsc::UnboundedSender<A>,
    action_rx: mpsc::UnboundedReceiver<A>,
    tasks: TaskManager<A>,
    _effect: PhantomData<fn() -> E>,
}

impl<S, A: Action, E> EffectRuntime<A, E, EffectStore<S, A, E>> {
    /// Create a runtime from state + effect reducer.
    pub fn new(state: S, reducer: EffectReducer<S, A, E>) -> Self {
        Self::from_store(EffectStore::new(state, reducer))
    }
}

impl<A: Action, E, St: EffectStoreLike<A, E>> EffectRuntime<A, E, St> {
    /// Create a runtime from an existing effect store.
    pub fn from_store(store: St) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let tasks = TaskManager::new(action_tx.clone());

        Self {
            store,
            middleware: NoopMiddleware,
            action_tx,
            action_rx,
            tasks,
            _effect: PhantomData,
        }
    }
}

impl<A, E, St, M> EffectRuntime<A, E, St, M>
where
    A: Action,
    St: EffectStoreLike<A, E>,
    M: Middleware<A>,
{
    /// Replace the middleware.
    pub fn with_middleware<M2: Middleware<A>>(self, middleware: M2) -> EffectRuntime<A, E, St, M2> {
        EffectRuntime {
            store: self.store,
            middleware,
            action_tx: self.action_tx,
            action_rx: self.action_rx,
            tasks: self.tasks,
            _effect: PhantomData,
        }
    }

    /// Send an action into the runtime queue.
    pub fn enqueue(&self, action: A) {
        let _ = self.action_tx.send(action);
    }

    /// Clone the action sender.
    pub fn action_tx(&self) -> mpsc::UnboundedSender<A> {
        self.action_tx.clone()
    }

    /// Access the store.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Access the task manager.
    pub fn tasks(&mut self) -> &mut TaskManager<A> {
        &mut self.tasks
    }

    /// Apply one action: middleware, reducers, then effects.
    pub fn step<F>(&mut self, action: A, handle_effect: &mut F) -> bool
    where
        F: FnMut(E, &mut EffectContext<A>),
    {
        self.middleware.before(&action);
        let result = self.store.dispatch(action.clone());
        self.middleware.after(&action, result.changed);

        if result.has_effects() {
            let mut ctx = EffectContext {
                action_tx: &self.action_tx,
                tasks: &mut self.tasks,
            };
            for effect in result.effects {
                handle_effect(effect, &mut ctx);
            }
        }
        self.tasks.reap();

        result.changed
    }

    /// Run the action loop until `cancel` fires.
    ///
    /// In-flight command tasks are aborted on exit; their results are never
    /// applied.
    pub async fn run<F>(&mut self, cancel: CancellationToken, mut handle_effect: F)
    where
        F: FnMut(E, &mut EffectContext<A>),
    {
        info!("Action loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                action = self.action_rx.recv() => match action {
                    Some(action) => {
                        self.step(action, &mut handle_effect);
                    }
                    None => break,
                },
            }
        }

        debug!(in_flight = self.tasks.len(), "Cancelling command tasks");
        self.tasks.cancel_all();
        info!("Action loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::DispatchResult;
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Fetch,
        DidFetch(u32),
        Note(&'static str),
    }

    impl Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Fetch => "Fetch",
                TestAction::DidFetch(_) => "DidFetch",
                TestAction::Note(_) => "Note",
            }
        }
    }

    enum TestEffect {
        Fetch,
        Announce(&'static str),
    }

    #[derive(Default, Clone, Debug, PartialEq)]
    struct TestState {
        value: Option<u32>,
        notes: Vec<&'static str>,
    }

    fn reducer(state: &mut TestState, action: TestAction) -> DispatchResult<TestEffect> {
        match action {
            TestAction::Fetch => DispatchResult::effect(TestEffect::Fetch),
            TestAction::DidFetch(v) => {
                state.value = Some(v);
                DispatchResult::changed_with(TestEffect::Announce("fetched"))
            }
            TestAction::Note(note) => {
                state.notes.push(note);
                DispatchResult::changed()
            }
        }
    }

    fn handle(effect: TestEffect, ctx: &mut EffectContext<TestAction>) {
        match effect {
            TestEffect::Fetch => {
                let key = ctx.tasks().next_key("fetch");
                ctx.tasks().spawn(key, async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    TestAction::DidFetch(7)
                });
            }
            TestEffect::Announce(note) => ctx.emit(TestAction::Note(note)),
        }
    }

    async fn settle(rx: &mut watch::Receiver<TestState>, pred: impl FnMut(&TestState) -> bool) {
        tokio::time::timeout(Duration::from_millis(500), rx.wait_for(pred))
            .await
            .expect("timeout")
            .expect("store dropped");
    }

    #[tokio::test]
    async fn test_effects_round_trip_through_tasks() {
        let mut runtime = EffectRuntime::new(TestState::default(), reducer);
        let mut rx = runtime.store().subscribe();
        let cancel = CancellationToken::new();

        runtime.enqueue(TestAction::Fetch);
        let loop_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            runtime.run(loop_cancel, handle).await;
        });

        settle(&mut rx, |s| s.value == Some(7) && s.notes == vec!["fetched"]).await;

        cancel.cancel();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_step_applies_synchronously() {
        let mut runtime = EffectRuntime::new(TestState::default(), reducer);

        assert!(runtime.step(TestAction::Note("a"), &mut handle));
        assert!(!runtime.step(TestAction::Fetch, &mut handle));

        assert_eq!(runtime.store().state().notes, vec!["a"]);
        assert_eq!(runtime.tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_tasks() {
        let mut runtime = EffectRuntime::new(TestState::default(), reducer);
        let rx = runtime.store().subscribe();
        let cancel = CancellationToken::new();

        runtime.step(TestAction::Fetch, &mut handle);
        assert_eq!(runtime.tasks().len(), 1);

        cancel.cancel();
        runtime.run(cancel, handle).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(runtime.tasks().is_empty());
        assert_eq!(rx.borrow().value, None);
    }
}
