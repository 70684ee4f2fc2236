//! Navigation: targets, per-navigation scope, guards and the coordinator.

mod coordinator;
mod guard;
mod record;
mod scope;
mod target;

pub use coordinator::NavigationCoordinator;
pub use guard::{guard_fn, GuardDecision, GuardFn, NavigationGuard};
pub use record::{NavigationRecord, NavigationState, RollbackReason};
pub use scope::NavigationScope;
pub use target::{NavigationTarget, RouteRecord};
