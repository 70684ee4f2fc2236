//! Navloader: navigation-synchronized data loaders
//!
//! Loaders fetch the data a route needs while a navigation is resolving. Results live in a
//! shared, key-addressed query cache that deduplicates concurrent fetches, keeps data fresh
//! for a configurable window and can be serialized on one side and hydrated on the other.
//! A navigation either commits the views of every loader it touched or rolls all of them
//! back, and loaders can call other loaders from inside their bodies through an ambient
//! context stack.

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod dependencies;
pub mod error;
pub mod key;
pub mod layer;
pub mod loader;
pub mod logging;
pub mod navigation;
pub mod reactive;
pub mod types;

pub use cache::{CacheEntry, HydrationSnapshot, QueryCache, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigLoader, LoaderSettings};
pub use context::{ContextFrame, ContextStack};
pub use error::{CacheError, ContextError, FetchError, LoaderError, SetupError};
pub use key::{CacheKey, KeyFilter, KeyPart};
pub use layer::DataLayer;
pub use loader::{DataLoader, LoadOutcome, LoaderDefinition, RouteLoader};
pub use navigation::{
    guard_fn, GuardDecision, NavigationCoordinator, NavigationGuard, NavigationRecord,
    NavigationState, NavigationTarget, RollbackReason, RouteRecord,
};
pub use reactive::Cell;
pub use types::{LoaderId, NavigationId};
