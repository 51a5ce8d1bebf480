use std::sync::Arc;

use tracing::{info, warn};

use cosnap_db::queries::bookings::{self, BookingKey};
use cosnap_db::queries::{new_id, now, slots};
use cosnap_db::{Change, Connection, Database};
use cosnap_types::models::{BookingRequest, BookingStatus, PaymentStatus, SlotStatus};

use crate::error::{ServiceError, ServiceResult};

/// A cosplayer's request as submitted.
#[derive(Debug, Clone)]
pub struct NewBookingRequest {
    pub time_slot_id: String,
    pub photographer_id: String,
    pub cosplayer_id: String,
    pub message: Option<String>,
    pub cosplay_character: String,
    pub cosplay_reference: Option<String>,
}

/// Who may drive a given transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Photographer,
    EitherParty,
}

/// Request lifecycle: `pending` moves to exactly one of `accepted`,
/// `rejected` or `cancelled`, all terminal.
///
/// Requests never lock a slot; only acceptance books it. Any number of
/// pending requests may target one slot until one of them is accepted.
#[derive(Clone)]
pub struct BookingWorkflow {
    db: Arc<Database>,
}

impl BookingWorkflow {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn announce(&self, request: &BookingRequest) {
        self.db.publish(Change::BookingRequest {
            id: request.id.clone(),
            time_slot_id: request.time_slot_id.clone(),
        });
    }

    pub fn create_booking_request(&self, new: NewBookingRequest) -> ServiceResult<BookingRequest> {
        let character = new.cosplay_character.trim();
        if character.is_empty() {
            return Err(ServiceError::validation("cosplay character is required"));
        }
        if new.cosplayer_id == new.photographer_id {
            return Err(ServiceError::validation("photographers cannot request their own slots"));
        }

        let request = BookingRequest {
            id: new_id(),
            time_slot_id: new.time_slot_id,
            photographer_id: new.photographer_id,
            cosplayer_id: new.cosplayer_id,
            requested_at: now(),
            status: BookingStatus::Pending,
            message: new.message.filter(|m| !m.trim().is_empty()),
            cosplay_character: character.to_string(),
            cosplay_reference: new.cosplay_reference.filter(|r| !r.trim().is_empty()),
            payment_status: PaymentStatus::Unpaid,
            responded_at: None,
        };

        self.db.with_tx(|tx| {
            let slot = slots::get(tx, &request.time_slot_id)?
                .ok_or_else(|| ServiceError::not_found(format!("time slot {}", request.time_slot_id)))?;

            if slot.photographer_id != request.photographer_id {
                return Err(ServiceError::validation("slot belongs to a different photographer").into());
            }
            if !matches!(slot.status, SlotStatus::Available | SlotStatus::Pending) {
                return Err(ServiceError::conflict(format!("slot {} is no longer available", slot.id)).into());
            }

            let already_pending = bookings::list(tx, BookingKey::TimeSlot(&slot.id))?
                .iter()
                .any(|r| r.cosplayer_id == request.cosplayer_id && r.status == BookingStatus::Pending);
            if already_pending {
                return Err(ServiceError::conflict("a pending request for this slot already exists").into());
            }

            bookings::insert(tx, &request)
        })?;

        self.announce(&request);
        info!(
            "Cosplayer {} requested slot {} ({})",
            request.cosplayer_id, request.time_slot_id, request.id
        );
        Ok(request)
    }

    /// Accept a pending request and book its slot in one transaction.
    /// Fails with `Conflict` if the request is no longer pending or the slot
    /// is already taken, which keeps at most one accepted request per slot.
    pub fn accept_booking_request(&self, id: &str, caller_id: &str) -> ServiceResult<BookingRequest> {
        let accepted = self.db.with_tx(|tx| {
            let request = load_pending(tx, id, caller_id, Actor::Photographer)?;

            let slot = slots::get(tx, &request.time_slot_id)?
                .ok_or_else(|| ServiceError::not_found(format!("time slot {}", request.time_slot_id)))?;
            if !matches!(slot.status, SlotStatus::Available | SlotStatus::Pending) {
                return Err(ServiceError::conflict(format!("slot {} is already booked", slot.id)).into());
            }

            let at = now();
            slots::mark_booked(tx, &slot.id, &request.cosplayer_id, None, &at)?;
            bookings::set_status(tx, id, BookingStatus::Accepted, Some(&at))?;

            Ok(BookingRequest {
                status: BookingStatus::Accepted,
                responded_at: Some(at),
                ..request
            })
        })?;

        self.announce(&accepted);
        self.db.publish(Change::TimeSlot {
            id: accepted.time_slot_id.clone(),
            photographer_id: accepted.photographer_id.clone(),
        });

        info!(
            "Request {} accepted; slot {} booked for {}",
            accepted.id, accepted.time_slot_id, accepted.cosplayer_id
        );
        Ok(accepted)
    }

    /// Decline a pending request. The slot stays open for other requests.
    pub fn reject_booking_request(&self, id: &str, caller_id: &str) -> ServiceResult<BookingRequest> {
        self.finish(id, caller_id, Actor::Photographer, BookingStatus::Rejected)
    }

    /// Withdraw a pending request, by either the cosplayer or the photographer.
    pub fn cancel_booking_request(&self, id: &str, caller_id: &str) -> ServiceResult<BookingRequest> {
        self.finish(id, caller_id, Actor::EitherParty, BookingStatus::Cancelled)
    }

    fn finish(&self, id: &str, caller_id: &str, actor: Actor, to: BookingStatus) -> ServiceResult<BookingRequest> {
        let updated = self.db.with_tx(|tx| {
            let request = load_pending(tx, id, caller_id, actor)?;
            let at = now();
            bookings::set_status(tx, id, to, Some(&at))?;
            Ok(BookingRequest {
                status: to,
                responded_at: Some(at),
                ..request
            })
        })?;

        self.announce(&updated);
        info!("Request {} {} by {}", updated.id, to, caller_id);
        Ok(updated)
    }

    pub fn get_booking_request(&self, id: &str) -> ServiceResult<BookingRequest> {
        self.db
            .with_conn(|conn| bookings::get(conn, id))?
            .ok_or_else(|| ServiceError::not_found(format!("booking request {id}")))
    }

    /// Newest first.
    pub fn list_for_photographer(&self, photographer_id: &str) -> ServiceResult<Vec<BookingRequest>> {
        Ok(self
            .db
            .with_conn(|conn| bookings::list(conn, BookingKey::Photographer(photographer_id)))?)
    }

    /// Newest first.
    pub fn list_for_cosplayer(&self, cosplayer_id: &str) -> ServiceResult<Vec<BookingRequest>> {
        Ok(self
            .db
            .with_conn(|conn| bookings::list(conn, BookingKey::Cosplayer(cosplayer_id)))?)
    }

    /// Newest first.
    pub fn list_for_slot(&self, time_slot_id: &str) -> ServiceResult<Vec<BookingRequest>> {
        Ok(self
            .db
            .with_conn(|conn| bookings::list(conn, BookingKey::TimeSlot(time_slot_id)))?)
    }

    /// Repair a request left pending although its slot is already booked by
    /// the same cosplayer (an interrupted accept). Any other state is returned
    /// unchanged.
    pub fn reconcile(&self, id: &str) -> ServiceResult<BookingRequest> {
        let (request, repaired) = self.db.with_tx(|tx| {
            let request = bookings::get(tx, id)?
                .ok_or_else(|| ServiceError::not_found(format!("booking request {id}")))?;
            if request.status.is_terminal() {
                return Ok((request, false));
            }

            let Some(slot) = slots::get(tx, &request.time_slot_id)? else {
                return Ok((request, false));
            };
            let booked_by_requester = slot.status == SlotStatus::Booked
                && slot.booked_by.as_deref() == Some(request.cosplayer_id.as_str());
            if !booked_by_requester {
                return Ok((request, false));
            }

            let at = slot.booked_at.unwrap_or_else(now);
            bookings::set_status(tx, id, BookingStatus::Accepted, Some(&at))?;
            Ok((
                BookingRequest {
                    status: BookingStatus::Accepted,
                    responded_at: Some(at),
                    ..request
                },
                true,
            ))
        })?;

        if repaired {
            warn!(
                "Request {} was pending while slot {} was booked by its cosplayer; marked accepted",
                request.id, request.time_slot_id
            );
            self.announce(&request);
        }
        Ok(request)
    }
}

/// Load a request and check that `caller_id` may move it out of `pending`.
fn load_pending(
    conn: &Connection,
    id: &str,
    caller_id: &str,
    actor: Actor,
) -> anyhow::Result<BookingRequest> {
    let request = bookings::get(conn, id)?
        .ok_or_else(|| ServiceError::not_found(format!("booking request {id}")))?;

    let allowed = match actor {
        Actor::Photographer => request.photographer_id == caller_id,
        Actor::EitherParty => request.photographer_id == caller_id || request.cosplayer_id == caller_id,
    };
    if !allowed {
        let message = match actor {
            Actor::Photographer => "only the photographer can respond to this request",
            Actor::EitherParty => "only the parties to this request can cancel it",
        };
        return Err(ServiceError::permission(message).into());
    }

    if request.status.is_terminal() {
        return Err(ServiceError::conflict(format!(
            "request {} is already {}",
            request.id, request.status
        ))
        .into());
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::TimeSlotRegistry;
    use crate::slots::tests::new_slot;
    use cosnap_types::models::TimeSlot;

    struct Fixture {
        slots: TimeSlotRegistry,
        workflow: BookingWorkflow,
        db: Arc<Database>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Fixture {
            slots: TimeSlotRegistry::new(db.clone()),
            workflow: BookingWorkflow::new(db.clone()),
            db,
        }
    }

    fn request_for(slot: &TimeSlot, cosplayer: &str) -> NewBookingRequest {
        NewBookingRequest {
            time_slot_id: slot.id.clone(),
            photographer_id: slot.photographer_id.clone(),
            cosplayer_id: cosplayer.to_string(),
            message: Some("Outdoor if possible".into()),
            cosplay_character: "Marin Kitagawa".into(),
            cosplay_reference: None,
        }
    }

    #[test]
    fn request_does_not_lock_the_slot() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();

        let first = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();
        let second = f.workflow.create_booking_request(request_for(&slot, "c2")).unwrap();
        assert_eq!(first.status, BookingStatus::Pending);
        assert_eq!(second.status, BookingStatus::Pending);
        assert_eq!(first.payment_status, PaymentStatus::Unpaid);

        let slot_now = f.slots.get_time_slot(&slot.id).unwrap();
        assert_eq!(slot_now.status, SlotStatus::Available);
        assert_eq!(f.workflow.list_for_slot(&slot.id).unwrap().len(), 2);
    }

    #[test]
    fn request_validation() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();

        let mut blank = request_for(&slot, "c1");
        blank.cosplay_character = "   ".into();
        assert!(matches!(f.workflow.create_booking_request(blank), Err(ServiceError::Validation(_))));

        let mut missing = request_for(&slot, "c1");
        missing.time_slot_id = "nope".into();
        assert!(matches!(f.workflow.create_booking_request(missing), Err(ServiceError::NotFound(_))));

        let mut wrong_owner = request_for(&slot, "c1");
        wrong_owner.photographer_id = "p2".into();
        assert!(matches!(
            f.workflow.create_booking_request(wrong_owner),
            Err(ServiceError::Validation(_))
        ));

        f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();
        assert!(matches!(
            f.workflow.create_booking_request(request_for(&slot, "c1")),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn double_accept_conflicts() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let request = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();

        let accepted = f.workflow.accept_booking_request(&request.id, "p1").unwrap();
        assert_eq!(accepted.status, BookingStatus::Accepted);
        assert!(accepted.responded_at.is_some());

        let err = f.workflow.accept_booking_request(&request.id, "p1").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let slot_now = f.slots.get_time_slot(&slot.id).unwrap();
        assert_eq!(slot_now.status, SlotStatus::Booked);
        assert_eq!(slot_now.booked_by.as_deref(), Some("c1"));

        let accepted_count = f
            .workflow
            .list_for_slot(&slot.id)
            .unwrap()
            .iter()
            .filter(|r| r.status == BookingStatus::Accepted)
            .count();
        assert_eq!(accepted_count, 1);
    }

    #[test]
    fn second_request_cannot_be_accepted_once_slot_is_booked() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let first = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();
        let second = f.workflow.create_booking_request(request_for(&slot, "c2")).unwrap();

        f.workflow.accept_booking_request(&first.id, "p1").unwrap();
        let err = f.workflow.accept_booking_request(&second.id, "p1").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // sibling stays pending; it is not auto-rejected
        let sibling = f.workflow.get_booking_request(&second.id).unwrap();
        assert_eq!(sibling.status, BookingStatus::Pending);

        // and no new request can be filed against the booked slot
        assert!(matches!(
            f.workflow.create_booking_request(request_for(&slot, "c3")),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn only_the_photographer_responds() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let request = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();

        assert!(matches!(
            f.workflow.accept_booking_request(&request.id, "c1"),
            Err(ServiceError::Permission(_))
        ));
        assert!(matches!(
            f.workflow.reject_booking_request(&request.id, "p2"),
            Err(ServiceError::Permission(_))
        ));
        assert!(matches!(
            f.workflow.accept_booking_request("missing", "p1"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn reject_leaves_slot_available() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let request = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();

        let rejected = f.workflow.reject_booking_request(&request.id, "p1").unwrap();
        assert_eq!(rejected.status, BookingStatus::Rejected);
        assert_eq!(f.slots.get_time_slot(&slot.id).unwrap().status, SlotStatus::Available);

        assert!(matches!(
            f.workflow.reject_booking_request(&request.id, "p1"),
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            f.workflow.accept_booking_request(&request.id, "p1"),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn either_party_cancels() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let by_cosplayer = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();
        let by_photographer = f.workflow.create_booking_request(request_for(&slot, "c2")).unwrap();

        assert!(matches!(
            f.workflow.cancel_booking_request(&by_cosplayer.id, "c2"),
            Err(ServiceError::Permission(_))
        ));
        let cancelled = f.workflow.cancel_booking_request(&by_cosplayer.id, "c1").unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let cancelled = f.workflow.cancel_booking_request(&by_photographer.id, "p1").unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
    }

    #[test]
    fn accepted_slot_cannot_be_cancelled_directly_or_deleted() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let request = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();
        f.workflow.accept_booking_request(&request.id, "p1").unwrap();

        assert!(matches!(f.slots.cancel_booking(&slot.id, "p1"), Err(ServiceError::Conflict(_))));
        assert!(matches!(f.slots.delete_time_slot(&slot.id, "p1"), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn deleting_a_slot_cancels_its_pending_requests() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let request = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();

        f.slots.delete_time_slot(&slot.id, "p1").unwrap();
        let after = f.workflow.get_booking_request(&request.id).unwrap();
        assert_eq!(after.status, BookingStatus::Cancelled);
    }

    #[test]
    fn reconcile_repairs_interrupted_accept() {
        let f = fixture();
        let slot = f.slots.create_time_slot(new_slot("p1", "2099-07-01", "10:00", "11:00")).unwrap();
        let request = f.workflow.create_booking_request(request_for(&slot, "c1")).unwrap();
        let other = f.workflow.create_booking_request(request_for(&slot, "c2")).unwrap();

        // Simulate a crash after the slot write but before the request write
        f.db
            .with_conn(|conn| slots::mark_booked(conn, &slot.id, "c1", None, &now()))
            .unwrap();

        let repaired = f.workflow.reconcile(&request.id).unwrap();
        assert_eq!(repaired.status, BookingStatus::Accepted);
        assert_eq!(f.workflow.get_booking_request(&request.id).unwrap().status, BookingStatus::Accepted);

        let untouched = f.workflow.reconcile(&other.id).unwrap();
        assert_eq!(untouched.status, BookingStatus::Pending);
    }
}
