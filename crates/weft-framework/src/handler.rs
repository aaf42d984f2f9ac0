//! Listener and command-handler traits.
//!
//! Both are implemented for plain async closures, so registration reads:
//!
//! ```rust,ignore
//! proxy.add_listener("m.room.member", |ctx: EventContext| async move {
//!     tracing::info!(sender = %ctx.event().sender, "Membership changed");
//!     Propagation::Continue
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::EventContext;

/// What a listener wants to happen to the rest of its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Continue,
    /// Skip all remaining listeners for this event.
    Stop,
}

/// What a command handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandResult {
    #[default]
    Continue,
    /// Skip the remaining handlers of this command only.
    StopCommand,
    /// Skip everything else this event would have triggered.
    StopAll,
}

/// A raw-event listener.
pub trait Listener: Send + Sync + 'static {
    fn call(&self, ctx: EventContext) -> BoxFuture<'static, Propagation>;
}

impl<F, Fut> Listener for F
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Propagation> + Send + 'static,
{
    fn call(&self, ctx: EventContext) -> BoxFuture<'static, Propagation> {
        self(ctx).boxed()
    }
}

/// A handler for one active or passive command.
pub trait CommandHandler: Send + Sync + 'static {
    fn call(&self, ctx: EventContext) -> BoxFuture<'static, CommandResult>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CommandResult> + Send + 'static,
{
    fn call(&self, ctx: EventContext) -> BoxFuture<'static, CommandResult> {
        self(ctx).boxed()
    }
}

pub type BoxedListener = Arc<dyn Listener>;
pub type BoxedCommandHandler = Arc<dyn CommandHandler>;

// ============================================================================
// Self-sender filter
// ============================================================================

/// Wraps a handler so it never sees events the account sent itself.
pub(crate) struct IgnoreOwn<H> {
    user_id: Arc<str>,
    inner: H,
}

impl<H> IgnoreOwn<H> {
    pub(crate) fn new(user_id: impl Into<Arc<str>>, inner: H) -> Self {
        Self {
            user_id: user_id.into(),
            inner,
        }
    }

    fn is_own(&self, ctx: &EventContext) -> bool {
        ctx.event().sender == *self.user_id
    }
}

impl<H: Listener> Listener for IgnoreOwn<H> {
    fn call(&self, ctx: EventContext) -> BoxFuture<'static, Propagation> {
        if self.is_own(&ctx) {
            return futures::future::ready(Propagation::Continue).boxed();
        }
        self.inner.call(ctx)
    }
}

impl<H: CommandHandler> CommandHandler for IgnoreOwn<H> {
    fn call(&self, ctx: EventContext) -> BoxFuture<'static, CommandResult> {
        if self.is_own(&ctx) {
            return futures::future::ready(CommandResult::Continue).boxed();
        }
        self.inner.call(ctx)
    }
}
