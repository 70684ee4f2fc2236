//! Future adapter that installs a context stack for the duration of each poll.

use super::{ContextFrame, ContextStack};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Future returned by [`ContextStack::scope`].
#[must_use = "futures do nothing unless polled"]
pub struct Scoped<F> {
    stack: Arc<ContextStack>,
    frames: Vec<ContextFrame>,
    inner: Pin<Box<F>>,
}

impl<F> Scoped<F> {
    pub(super) fn new(stack: Arc<ContextStack>, frames: Vec<ContextFrame>, inner: F) -> Self {
        Self {
            stack,
            frames,
            inner: Box::pin(inner),
        }
    }
}

/// Puts the caller's frames back when a poll ends, including by unwinding.
struct Restore<'a> {
    stack: &'a ContextStack,
    caller: Option<Vec<ContextFrame>>,
    captured: &'a mut Vec<ContextFrame>,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        if let Some(caller) = self.caller.take() {
            *self.captured = self.stack.swap(caller);
        }
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Scoped {
            stack,
            frames,
            inner,
        } = self.get_mut();
        let caller = stack.swap(std::mem::take(frames));
        let _restore = Restore {
            stack,
            caller: Some(caller),
            captured: frames,
        };
        inner.as_mut().poll(cx)
    }
}
