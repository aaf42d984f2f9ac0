//! Owner-scoped handler registry and event dispatch.
//!
//! One [`Dispatcher`] exists per account. It holds two tables:
//!
//! - **listeners**: event type → ordered listeners, plus a wildcard chain
//!   under [`WILDCARD`] that runs after the typed one.
//! - **command handlers**: command id (active syntax or passive name) →
//!   ordered handlers.
//!
//! Each entry remembers the owner that registered it so a stopped plugin can
//! be unhooked with [`Dispatcher::remove_owner`].
//!
//! # Dispatch order
//!
//! 1. The chain of the matched active command, if any.
//! 2. The chains of matched passive commands, in composite order.
//! 3. Typed listeners, then wildcard listeners.
//!
//! `CommandResult::StopCommand` ends only the current command chain;
//! `CommandResult::StopAll` ends everything that follows. `Propagation::Stop`
//! ends the listener phase, wildcard chain included.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Instrument, Level, debug, span, trace};
use weft_core::{Client, Event};

use crate::command::{Matches, PassiveMatch};
use crate::context::EventContext;
use crate::handler::{
    BoxedCommandHandler, BoxedListener, CommandHandler, CommandResult, Listener, Propagation,
};

/// Event type key of the catch-all listener chain.
pub const WILDCARD: &str = "*";

struct Entry<H> {
    owner: Arc<str>,
    handler: H,
}

type Table<H> = RwLock<HashMap<String, Vec<Entry<H>>>>;

/// Summary of one dispatched event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of handlers and listeners that were invoked.
    pub invoked: usize,
    /// Whether a handler ended dispatch early with `StopAll`.
    pub stopped: bool,
}

/// Handler registry of one account.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Table<BoxedListener>,
    commands: Table<BoxedCommandHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener for `event_type` (or [`WILDCARD`]).
    pub fn add_listener(&self, owner: &str, event_type: &str, listener: impl Listener) {
        self.add_boxed_listener(owner, event_type, Arc::new(listener));
    }

    pub fn add_boxed_listener(&self, owner: &str, event_type: &str, listener: BoxedListener) {
        debug!(owner, event_type, "Adding listener");
        self.listeners
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(Entry {
                owner: owner.into(),
                handler: listener,
            });
    }

    /// Appends a handler for the command identified by `command`.
    pub fn add_command_handler(&self, owner: &str, command: &str, handler: impl CommandHandler) {
        self.add_boxed_command_handler(owner, command, Arc::new(handler));
    }

    pub fn add_boxed_command_handler(
        &self,
        owner: &str,
        command: &str,
        handler: BoxedCommandHandler,
    ) {
        debug!(owner, command, "Adding command handler");
        self.commands
            .write()
            .entry(command.to_string())
            .or_default()
            .push(Entry {
                owner: owner.into(),
                handler,
            });
    }

    /// Removes every listener and command handler registered by `owner`.
    ///
    /// Returns how many entries were removed.
    pub fn remove_owner(&self, owner: &str) -> usize {
        fn purge<H>(table: &Table<H>, owner: &str) -> usize {
            let mut table = table.write();
            let mut removed = 0;
            table.retain(|_, chain| {
                let before = chain.len();
                chain.retain(|entry| &*entry.owner != owner);
                removed += before - chain.len();
                !chain.is_empty()
            });
            removed
        }

        let removed = purge(&self.listeners, owner) + purge(&self.commands, owner);
        debug!(owner, removed, "Removed owner handlers");
        removed
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.read().get(event_type).map_or(0, Vec::len)
    }

    pub fn command_handler_count(&self, command: &str) -> usize {
        self.commands.read().get(command).map_or(0, Vec::len)
    }

    fn command_chain(&self, command: &str) -> Vec<BoxedCommandHandler> {
        self.commands
            .read()
            .get(command)
            .map(|chain| chain.iter().map(|e| Arc::clone(&e.handler)).collect())
            .unwrap_or_default()
    }

    fn listener_chain(&self, event_type: &str) -> Vec<BoxedListener> {
        let table = self.listeners.read();
        let typed = table.get(event_type).into_iter().flatten();
        let wildcard = table.get(WILDCARD).into_iter().flatten();
        typed
            .chain(wildcard)
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    /// Dispatches one event whose composite matches are already known.
    pub async fn dispatch(
        &self,
        event: Arc<Event>,
        client: Client,
        matches: Matches,
    ) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            event_type = %event.event_type,
            event_id = %event.event_id,
            room_id = %event.room_id,
        );
        self.dispatch_inner(EventContext::new(event, client, matches))
            .instrument(span)
            .await
    }

    async fn dispatch_inner(&self, ctx: EventContext) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        if let Some(command) = ctx.command() {
            let id = command.command.clone();
            if self.run_command_chain(&id, &ctx, &mut outcome).await {
                return outcome;
            }
        }

        let passive: Vec<String> = ctx
            .passive_matches()
            .iter()
            .map(|m: &PassiveMatch| m.name.clone())
            .collect();
        for name in passive {
            if self.run_command_chain(&name, &ctx, &mut outcome).await {
                return outcome;
            }
        }

        // Snapshot before awaiting so handlers may register more handlers.
        for listener in self.listener_chain(&ctx.event().event_type) {
            outcome.invoked += 1;
            if listener.call(ctx.clone()).await == Propagation::Stop {
                trace!("Listener stopped propagation");
                break;
            }
        }

        outcome
    }

    /// Runs one command chain. Returns `true` if dispatch must end.
    async fn run_command_chain(
        &self,
        command: &str,
        ctx: &EventContext,
        outcome: &mut DispatchOutcome,
    ) -> bool {
        let chain = self.command_chain(command);
        if chain.is_empty() {
            debug!(command, "Matched command has no handler");
            return false;
        }

        for handler in chain {
            outcome.invoked += 1;
            match handler.call(ctx.clone()).await {
                CommandResult::Continue => {}
                CommandResult::StopCommand => {
                    trace!(command, "Handler stopped command chain");
                    break;
                }
                CommandResult::StopAll => {
                    debug!(command, "Handler stopped event dispatch");
                    outcome.stopped = true;
                    return true;
                }
            }
        }
        false
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listener_types", &self.listeners.read().len())
            .field("commands", &self.commands.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandMatch, PassiveMatch};
    use crate::test_support::{MockTransport, message};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client() -> Client {
        Client::new("@bot:hs", Arc::new(MockTransport::default()))
    }

    fn command_match(id: &str) -> Matches {
        Matches {
            command: Some(CommandMatch {
                command: id.to_string(),
                arguments: BTreeMap::new(),
            }),
            passive: Vec::new(),
        }
    }

    type Log = Arc<parking_lot::Mutex<Vec<&'static str>>>;

    fn recording(log: &Log, tag: &'static str, result: CommandResult) -> impl CommandHandler {
        let log = Arc::clone(log);
        move |_ctx: EventContext| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(tag);
                result
            }
        }
    }

    #[tokio::test]
    async fn test_stop_command_halts_only_that_chain() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let chains = [
            ("ping", "ping-1", CommandResult::StopCommand),
            ("ping", "ping-2", CommandResult::Continue),
            ("issue", "issue-1", CommandResult::Continue),
        ];
        for (command, tag, result) in chains {
            dispatcher.add_command_handler("p", command, recording(&log, tag, result));
        }

        let mut matches = command_match("ping");
        matches.passive.push(PassiveMatch {
            name: "issue".into(),
            captures: vec![vec!["#1".into()]],
        });

        let outcome = dispatcher
            .dispatch(Arc::new(message("ping")), client(), matches)
            .await;

        assert_eq!(*log.lock(), ["ping-1", "issue-1"]);
        assert!(!outcome.stopped);
    }

    #[tokio::test]
    async fn test_stop_all_halts_dispatch() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let listened = Arc::new(AtomicUsize::new(0));

        let stop = recording(&log, "ping", CommandResult::StopAll);
        dispatcher.add_command_handler("p", "ping", stop);
        let counter = Arc::clone(&listened);
        dispatcher.add_listener("p", "m.room.message", move |_ctx: EventContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Propagation::Continue }
        });

        let outcome = dispatcher
            .dispatch(Arc::new(message("ping")), client(), command_match("ping"))
            .await;

        assert!(outcome.stopped);
        assert_eq!(listened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unhandled_command_continues_to_listeners() {
        let dispatcher = Dispatcher::new();
        let listened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&listened);
        dispatcher.add_listener("p", WILDCARD, move |_ctx: EventContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Propagation::Continue }
        });

        let outcome = dispatcher
            .dispatch(Arc::new(message("ping")), client(), command_match("ping"))
            .await;

        assert_eq!(outcome.invoked, 1);
        assert_eq!(listened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_stop_skips_wildcard() {
        let dispatcher = Dispatcher::new();
        let listened = Arc::new(AtomicUsize::new(0));

        dispatcher.add_listener("p", "m.room.message", |_ctx: EventContext| async {
            Propagation::Stop
        });
        let counter = Arc::clone(&listened);
        dispatcher.add_listener("p", WILDCARD, move |_ctx: EventContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Propagation::Continue }
        });

        let outcome = dispatcher
            .dispatch(Arc::new(message("hi")), client(), Matches::default())
            .await;
        assert_eq!(outcome.invoked, 1);
        assert_eq!(listened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_owner() {
        let dispatcher = Dispatcher::new();
        dispatcher.add_listener("a", "m.room.message", |_ctx: EventContext| async {
            Propagation::Continue
        });
        dispatcher.add_listener("b", "m.room.message", |_ctx: EventContext| async {
            Propagation::Continue
        });
        dispatcher.add_command_handler("a", "ping", |_ctx: EventContext| async {
            CommandResult::Continue
        });

        assert_eq!(dispatcher.remove_owner("a"), 2);
        assert_eq!(dispatcher.listener_count("m.room.message"), 1);
        assert_eq!(dispatcher.command_handler_count("ping"), 0);
    }
}
