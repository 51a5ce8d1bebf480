use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::info;

use cosnap_db::queries::{bookings, new_id, now, slots};
use cosnap_db::{Change, Database, SlotFilter};
use cosnap_types::models::{SlotStatus, SlotTime, TimeSlot};

use crate::error::{ServiceError, ServiceResult};

/// A slot as submitted by a photographer, before it is stored.
#[derive(Debug, Clone)]
pub struct NewTimeSlot {
    pub photographer_id: String,
    pub convention_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub price: f64,
    pub location: String,
    pub description: Option<String>,
}

impl NewTimeSlot {
    fn validate(&self, today: NaiveDate) -> ServiceResult<()> {
        if self.photographer_id.trim().is_empty() {
            return Err(ServiceError::validation("photographer id is required"));
        }
        if self.start_time >= self.end_time {
            return Err(ServiceError::validation(format!(
                "start time {} must be before end time {}",
                self.start_time, self.end_time
            )));
        }
        if self.date < today {
            return Err(ServiceError::validation(format!("date {} is in the past", self.date)));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ServiceError::validation("price must be a non-negative amount"));
        }
        if self.location.trim().is_empty() {
            return Err(ServiceError::validation("location is required"));
        }
        Ok(())
    }

    fn into_slot(self) -> TimeSlot {
        TimeSlot {
            id: new_id(),
            photographer_id: self.photographer_id,
            convention_id: self.convention_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: SlotStatus::Available,
            price: self.price,
            location: self.location.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            booked_by: None,
            booked_by_name: None,
            booked_at: None,
            created_at: now(),
        }
    }
}

/// Lifecycle of bookable slots offered by photographers.
#[derive(Clone)]
pub struct TimeSlotRegistry {
    db: Arc<Database>,
}

impl TimeSlotRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    fn announce(&self, slot: &TimeSlot) {
        self.db.publish(Change::TimeSlot {
            id: slot.id.clone(),
            photographer_id: slot.photographer_id.clone(),
        });
    }

    pub fn create_time_slot(&self, new: NewTimeSlot) -> ServiceResult<TimeSlot> {
        new.validate(Self::today())?;
        let slot = new.into_slot();

        self.db.with_conn(|conn| slots::insert(conn, &slot))?;
        self.announce(&slot);

        info!(
            "Photographer {} opened slot {} on {} {}-{}",
            slot.photographer_id, slot.id, slot.date, slot.start_time, slot.end_time
        );
        Ok(slot)
    }

    /// Create several slots from one submission. Either all are stored or none.
    pub fn create_time_slots(&self, batch: Vec<NewTimeSlot>) -> ServiceResult<Vec<TimeSlot>> {
        if batch.is_empty() {
            return Err(ServiceError::validation("at least one slot is required"));
        }

        let today = Self::today();
        for new in &batch {
            new.validate(today)?;
        }

        let created: Vec<TimeSlot> = batch.into_iter().map(NewTimeSlot::into_slot).collect();
        self.db.with_tx(|tx| {
            for slot in &created {
                slots::insert(tx, slot)?;
            }
            Ok(())
        })?;

        for slot in &created {
            self.announce(slot);
        }
        info!("Created {} slots in one submission", created.len());
        Ok(created)
    }

    pub fn get_time_slot(&self, id: &str) -> ServiceResult<TimeSlot> {
        self.db
            .with_conn(|conn| slots::get(conn, id))?
            .ok_or_else(|| ServiceError::not_found(format!("time slot {id}")))
    }

    /// A photographer's slots, sorted by date then start time.
    pub fn list_time_slots(&self, photographer_id: &str, filter: &SlotFilter) -> ServiceResult<Vec<TimeSlot>> {
        let mut listed = self
            .db
            .with_conn(|conn| slots::list_by_photographer(conn, photographer_id, filter))?;

        listed.sort_by(|a, b| (a.date, &a.start_time).cmp(&(b.date, &b.start_time)));
        Ok(listed)
    }

    /// Remove an available slot. Pending requests against it are cancelled.
    pub fn delete_time_slot(&self, id: &str, caller_id: &str) -> ServiceResult<()> {
        let (slot, cancelled) = self.db.with_tx(|tx| {
            let slot = slots::get(tx, id)?
                .ok_or_else(|| ServiceError::not_found(format!("time slot {id}")))?;

            if slot.photographer_id != caller_id {
                return Err(ServiceError::permission("only the owning photographer can delete a slot").into());
            }
            if slot.status != SlotStatus::Available {
                return Err(ServiceError::conflict(format!(
                    "slot {} is {} and cannot be deleted",
                    slot.id, slot.status
                ))
                .into());
            }

            let cancelled = bookings::cancel_pending_for_slot(tx, id, &now())?;
            slots::delete(tx, id)?;
            Ok((slot, cancelled))
        })?;

        self.announce(&slot);
        for request_id in cancelled {
            self.db.publish(Change::BookingRequest {
                id: request_id,
                time_slot_id: slot.id.clone(),
            });
        }

        info!("Deleted slot {}", slot.id);
        Ok(())
    }

    /// Direct booking: occupy an available slot without a request.
    pub fn book_time_slot(&self, id: &str, cosplayer_id: &str, cosplayer_name: &str) -> ServiceResult<TimeSlot> {
        let slot = self.db.with_tx(|tx| {
            let slot = slots::get(tx, id)?
                .ok_or_else(|| ServiceError::not_found(format!("time slot {id}")))?;

            if slot.status != SlotStatus::Available {
                return Err(ServiceError::conflict(format!("slot {} is no longer available", slot.id)).into());
            }
            if slot.photographer_id == cosplayer_id {
                return Err(ServiceError::validation("photographers cannot book their own slots").into());
            }

            slots::mark_booked(tx, id, cosplayer_id, Some(cosplayer_name), &now())?;
            slots::get(tx, id)?.ok_or_else(|| anyhow::anyhow!("slot {} vanished mid-transaction", id))
        })?;

        self.announce(&slot);
        info!("Slot {} booked directly by {}", slot.id, cosplayer_id);
        Ok(slot)
    }

    /// Undo a direct booking. Slots held by an accepted booking request are
    /// owned by the request workflow and refused here.
    pub fn cancel_booking(&self, id: &str, caller_id: &str) -> ServiceResult<TimeSlot> {
        let slot = self.db.with_tx(|tx| {
            let slot = slots::get(tx, id)?
                .ok_or_else(|| ServiceError::not_found(format!("time slot {id}")))?;

            if slot.status != SlotStatus::Booked {
                return Err(ServiceError::conflict(format!("slot {} is not booked", slot.id)).into());
            }
            let is_owner = slot.photographer_id == caller_id;
            let is_occupant = slot.booked_by.as_deref() == Some(caller_id);
            if !is_owner && !is_occupant {
                return Err(ServiceError::permission("only the photographer or the booker can cancel").into());
            }
            if bookings::accepted_for_slot(tx, id)?.is_some() {
                return Err(ServiceError::conflict(format!(
                    "slot {} is held by an accepted booking request",
                    slot.id
                ))
                .into());
            }

            slots::mark_available(tx, id)?;
            slots::get(tx, id)?.ok_or_else(|| anyhow::anyhow!("slot {} vanished mid-transaction", id))
        })?;

        self.announce(&slot);
        info!("Booking on slot {} cancelled by {}", slot.id, caller_id);
        Ok(slot)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_slot(photographer: &str, date: &str, start: &str, end: &str) -> NewTimeSlot {
        NewTimeSlot {
            photographer_id: photographer.to_string(),
            convention_id: None,
            date: date.parse().unwrap(),
            start_time: SlotTime::parse(start).unwrap(),
            end_time: SlotTime::parse(end).unwrap(),
            price: 50.0,
            location: "Convention center, hall 2".into(),
            description: None,
        }
    }

    fn registry() -> TimeSlotRegistry {
        TimeSlotRegistry::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn start_must_precede_end() {
        let reg = registry();
        let err = reg
            .create_time_slot(new_slot("p1", "2099-06-01", "11:00", "10:00"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = reg
            .create_time_slot(new_slot("p1", "2099-06-01", "10:00", "10:00"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn past_dates_and_bad_prices_are_rejected() {
        let reg = registry();
        let err = reg
            .create_time_slot(new_slot("p1", "2000-01-01", "10:00", "11:00"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut negative = new_slot("p1", "2099-06-01", "10:00", "11:00");
        negative.price = -1.0;
        assert!(matches!(reg.create_time_slot(negative), Err(ServiceError::Validation(_))));

        let mut nowhere = new_slot("p1", "2099-06-01", "10:00", "11:00");
        nowhere.location = "  ".into();
        assert!(matches!(reg.create_time_slot(nowhere), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn today_is_accepted() {
        let reg = registry();
        let today = Local::now().date_naive().to_string();
        let slot = reg.create_time_slot(new_slot("p1", &today, "22:00", "23:00")).unwrap();
        assert_eq!(slot.status, SlotStatus::Available);
    }

    #[test]
    fn listing_is_sorted_by_date_then_start() {
        let reg = registry();
        reg.create_time_slot(new_slot("p1", "2099-06-02", "09:00", "10:00")).unwrap();
        reg.create_time_slot(new_slot("p1", "2099-06-01", "14:00", "15:00")).unwrap();
        reg.create_time_slot(new_slot("p1", "2099-06-01", "09:30", "10:30")).unwrap();

        let listed = reg.list_time_slots("p1", &SlotFilter::default()).unwrap();
        let keys: Vec<(String, String)> = listed
            .iter()
            .map(|s| (s.date.to_string(), s.start_time.to_string()))
            .collect();
        assert_eq!(
            keys,
            [
                ("2099-06-01".to_string(), "09:30".to_string()),
                ("2099-06-01".to_string(), "14:00".to_string()),
                ("2099-06-02".to_string(), "09:00".to_string()),
            ]
        );
    }

    #[test]
    fn batch_creation_is_all_or_nothing() {
        let reg = registry();
        let err = reg
            .create_time_slots(vec![
                new_slot("p1", "2099-06-01", "09:00", "10:00"),
                new_slot("p1", "2099-06-01", "12:00", "11:00"),
            ])
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(reg.list_time_slots("p1", &SlotFilter::default()).unwrap().is_empty());

        let created = reg
            .create_time_slots(vec![
                new_slot("p1", "2099-06-01", "09:00", "10:00"),
                new_slot("p1", "2099-06-01", "10:00", "11:00"),
            ])
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(matches!(reg.create_time_slots(vec![]), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn delete_requires_available_status() {
        let reg = registry();
        let booked = reg.create_time_slot(new_slot("p1", "2099-06-01", "09:00", "10:00")).unwrap();
        let free = reg.create_time_slot(new_slot("p1", "2099-06-01", "11:00", "12:00")).unwrap();
        reg.book_time_slot(&booked.id, "c1", "Rin").unwrap();

        let err = reg.delete_time_slot(&booked.id, "p1").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = reg.delete_time_slot(&free.id, "someone-else").unwrap_err();
        assert!(matches!(err, ServiceError::Permission(_)));

        reg.delete_time_slot(&free.id, "p1").unwrap();
        let remaining = reg.list_time_slots("p1", &SlotFilter::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, booked.id);

        assert!(matches!(reg.delete_time_slot(&free.id, "p1"), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn direct_booking_and_cancellation() {
        let reg = registry();
        let slot = reg.create_time_slot(new_slot("p1", "2099-06-01", "09:00", "10:00")).unwrap();

        let booked = reg.book_time_slot(&slot.id, "c1", "Rin").unwrap();
        assert_eq!(booked.status, SlotStatus::Booked);
        assert_eq!(booked.booked_by.as_deref(), Some("c1"));
        assert_eq!(booked.booked_by_name.as_deref(), Some("Rin"));
        assert!(booked.booked_at.is_some());

        let err = reg.book_time_slot(&slot.id, "c2", "Kai").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = reg.cancel_booking(&slot.id, "c2").unwrap_err();
        assert!(matches!(err, ServiceError::Permission(_)));

        let freed = reg.cancel_booking(&slot.id, "c1").unwrap();
        assert_eq!(freed.status, SlotStatus::Available);
        assert!(freed.booked_by.is_none() && freed.booked_by_name.is_none() && freed.booked_at.is_none());

        let err = reg.cancel_booking(&slot.id, "p1").unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
