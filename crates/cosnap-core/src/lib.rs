//! Booking, messaging and review logic on top of the Cosnap document store.
//!
//! Each registry takes the store handle in its constructor and enforces the
//! invariants of its records; the store only persists and announces changes.

pub mod bookings;
pub mod error;
pub mod messaging;
pub mod reviews;
pub mod slots;

use std::sync::Arc;

use cosnap_db::Database;

pub use error::{ServiceError, ServiceResult};

/// Every registry wired to one store.
#[derive(Clone)]
pub struct Services {
    pub slots: slots::TimeSlotRegistry,
    pub bookings: bookings::BookingWorkflow,
    pub messaging: messaging::MessagingRegistry,
    pub reviews: reviews::ReviewAggregator,
}

impl Services {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            slots: slots::TimeSlotRegistry::new(db.clone()),
            bookings: bookings::BookingWorkflow::new(db.clone()),
            messaging: messaging::MessagingRegistry::new(db.clone()),
            reviews: reviews::ReviewAggregator::new(db),
        }
    }
}
