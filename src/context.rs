//! Context Stack
//!
//! Ambient record of which loader, within which navigation, is currently executing. Nested
//! loader calls read the top frame to find their navigation and parent without the caller
//! threading anything through.
//!
//! An async body does not keep a call stack across suspension, so frames are installed per
//! poll: [`ContextStack::scope`] wraps a future, swaps its captured frames in before every
//! poll and puts the caller's frames back when the poll returns. Frames live in a slot of the
//! polling thread, keyed by stack, so futures polled concurrently on other worker threads
//! never see each other's frames.

use crate::error::ContextError;
use crate::navigation::{NavigationScope, NavigationTarget};
use crate::types::{LoaderId, NavigationId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mod scoped;

pub use scoped::Scoped;

/// Identifies the loader a piece of code is running as.
#[derive(Debug, Clone)]
pub struct ContextFrame {
    pub navigation_id: NavigationId,
    pub loader_id: LoaderId,
    pub navigation: Arc<NavigationScope>,
    /// Frames that were active when this one was pushed, outermost first.
    pub parent_frames: Vec<ContextFrame>,
}

impl ContextFrame {
    pub fn new(
        navigation: Arc<NavigationScope>,
        loader_id: LoaderId,
        parent_frames: Vec<ContextFrame>,
    ) -> Self {
        Self {
            navigation_id: navigation.id(),
            loader_id,
            navigation,
            parent_frames,
        }
    }

    pub fn target(&self) -> &Arc<NavigationTarget> {
        self.navigation.target()
    }

    pub fn is_nested(&self) -> bool {
        !self.parent_frames.is_empty()
    }
}

impl PartialEq for ContextFrame {
    fn eq(&self, other: &Self) -> bool {
        self.navigation_id == other.navigation_id
            && self.loader_id == other.loader_id
            && self.parent_frames == other.parent_frames
    }
}

/// Captured stack contents, see [`ContextStack::snapshot`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot(Vec<ContextFrame>);

impl ContextSnapshot {
    pub fn frames(&self) -> &[ContextFrame] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

thread_local! {
    /// Frames of every stack on this thread, by stack id. Empty stacks have no slot.
    static FRAMES: RefCell<HashMap<u64, Vec<ContextFrame>>> = RefCell::new(HashMap::new());
}

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct ContextStack {
    id: u64,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self {
            id: NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn with_frames<R>(&self, f: impl FnOnce(&mut Vec<ContextFrame>) -> R) -> R {
        FRAMES.with(|slots| {
            let mut slots = slots.borrow_mut();
            let frames = slots.entry(self.id).or_default();
            let result = f(frames);
            if frames.is_empty() {
                slots.remove(&self.id);
            }
            result
        })
    }

    fn read<R>(&self, f: impl FnOnce(&[ContextFrame]) -> R) -> R {
        FRAMES.with(|slots| match slots.borrow().get(&self.id) {
            Some(frames) => f(frames),
            None => f(&[]),
        })
    }

    pub fn push(&self, frame: ContextFrame) {
        self.with_frames(|frames| frames.push(frame));
    }

    pub fn pop(&self) -> Option<ContextFrame> {
        self.with_frames(|frames| frames.pop())
    }

    /// Full ambient stack, outermost first. Empty outside any loader.
    pub fn current(&self) -> Vec<ContextFrame> {
        self.read(|frames| frames.to_vec())
    }

    /// Innermost frame. Calling this outside a loader is a programming error.
    pub fn top(&self) -> Result<ContextFrame, ContextError> {
        self.read(|frames| frames.last().cloned())
            .ok_or(ContextError::NoActiveLoader)
    }

    pub fn depth(&self) -> usize {
        self.read(|frames| frames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Loader ids on the stack, outermost first.
    pub fn loader_chain(&self) -> Vec<LoaderId> {
        self.read(|frames| frames.iter().map(|frame| frame.loader_id.clone()).collect())
    }

    pub fn contains_loader(&self, loader_id: &LoaderId) -> bool {
        self.read(|frames| frames.iter().any(|frame| &frame.loader_id == loader_id))
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot(self.current())
    }

    pub fn restore(&self, snapshot: ContextSnapshot) {
        self.swap(snapshot.0);
    }

    /// Drop every frame on the calling thread. For test isolation only.
    pub fn reset(&self) {
        self.swap(Vec::new());
    }

    fn swap(&self, frames: Vec<ContextFrame>) -> Vec<ContextFrame> {
        self.with_frames(|current| std::mem::replace(current, frames))
    }

    /// Run `future` as `frame`, nested under whatever is on the stack right now.
    pub fn scope<F: Future>(self: &Arc<Self>, frame: ContextFrame, future: F) -> Scoped<F> {
        let mut frames = self.current();
        frames.push(frame);
        Scoped::new(self.clone(), frames, future)
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        let _ = FRAMES.try_with(|slots| slots.borrow_mut().remove(&self.id));
    }
}
