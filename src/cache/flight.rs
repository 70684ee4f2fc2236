//! In-flight fetch markers.

use crate::error::FetchError;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;

/// Outcome shared by every caller attached to one fetch.
pub type FlightOutcome = Result<Value, FetchError>;

pub(crate) type SharedFlight = Shared<BoxFuture<'static, FlightOutcome>>;

/// Marker stored per key while a fetch is outstanding.
pub(crate) struct Flight {
    pub(crate) id: u64,
    pub(crate) future: SharedFlight,
}

/// Handle on an in-flight fetch, either freshly started or joined.
#[must_use = "a flight only makes progress while someone awaits it"]
pub struct FlightHandle {
    future: SharedFlight,
    flight_id: u64,
    attached: bool,
}

impl FlightHandle {
    pub(crate) fn new(future: SharedFlight, flight_id: u64, attached: bool) -> Self {
        Self {
            future,
            flight_id,
            attached,
        }
    }

    /// True when this handle joined a fetch started by someone else.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn flight_id(&self) -> u64 {
        self.flight_id
    }

    /// Wait for the fetch to settle. The cache has been updated when this resolves.
    pub async fn wait(self) -> FlightOutcome {
        self.future.await
    }
}
