use crate::domain::counter::{CounterDelta, CounterKey};
use crate::domain::history::{StatusHistory, StatusHistoryEntry};
use crate::domain::lifecycle::{
    LifecycleStatus, Party, Plan, check_transition, non_blank, party_of, require_vendor,
};
use crate::domain::money::Amount;
use crate::domain::notification::{Related, RelatedType};
use crate::domain::payment::{Payable, PaymentFlow, PaymentInfo, ensure_cancellable};
use crate::domain::ports::{Filter, Record, RecordMeta};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Requested,
    VendorAccepted,
    PaymentSubmitted,
    PaymentConfirmed,
    PaymentRejected,
    InProgress,
    Completed,
    Declined,
    Cancelled,
}

const ALL_BOOKING_STATUSES: [BookingStatus; 9] = [
    BookingStatus::Requested,
    BookingStatus::VendorAccepted,
    BookingStatus::PaymentSubmitted,
    BookingStatus::PaymentConfirmed,
    BookingStatus::PaymentRejected,
    BookingStatus::InProgress,
    BookingStatus::Completed,
    BookingStatus::Declined,
    BookingStatus::Cancelled,
];

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::VendorAccepted => "vendor_accepted",
            Self::PaymentSubmitted => "payment_submitted",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::PaymentRejected => "payment_rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a booking in this status occupies its slot on the vendor's
    /// calendar.
    pub fn holds_slot(&self) -> bool {
        matches!(
            self,
            Self::VendorAccepted
                | Self::PaymentSubmitted
                | Self::PaymentConfirmed
                | Self::PaymentRejected
                | Self::InProgress
        )
    }
}

impl LifecycleStatus for BookingStatus {
    fn next_states(self) -> &'static [Self] {
        use BookingStatus::*;
        match self {
            Requested => &[VendorAccepted, Declined, Cancelled],
            VendorAccepted => &[PaymentSubmitted, InProgress, Cancelled],
            PaymentSubmitted => &[PaymentSubmitted, PaymentConfirmed, PaymentRejected, Cancelled],
            PaymentRejected => &[PaymentSubmitted, Cancelled],
            PaymentConfirmed => &[InProgress],
            InProgress => &[Completed],
            Completed | Declined | Cancelled => &[],
        }
    }
}

impl PaymentFlow for BookingStatus {
    const SUBMITTED: Self = Self::PaymentSubmitted;
    const CONFIRMED: Self = Self::PaymentConfirmed;
    const REJECTED: Self = Self::PaymentRejected;
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        ALL_BOOKING_STATUSES
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| MarketError::ValidationError(format!("unknown booking status: {s}")))
    }
}

/// Longest slot a single booking may hold.
pub const MAX_BOOKING_MINUTES: u32 = 24 * 60;

/// Reservation request from the customer app.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: String,
    pub vendor_id: String,
    pub service_id: String,
    pub service_name: String,
    pub price: Amount,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    /// Falls back to the configured default when absent.
    pub duration_minutes: Option<u32>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl NewBooking {
    pub fn validate(&self) -> Result<()> {
        if self.customer_id.trim().is_empty() || self.vendor_id.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "customer and vendor are required".into(),
            ));
        }
        if self.customer_id == self.vendor_id {
            return Err(MarketError::ValidationError(
                "a vendor cannot book their own service".into(),
            ));
        }
        if self.service_id.trim().is_empty() {
            return Err(MarketError::ValidationError("service is required".into()));
        }
        if self.duration_minutes == Some(0) {
            return Err(MarketError::ValidationError(
                "booking duration must be positive".into(),
            ));
        }
        let minutes = self.duration_minutes.unwrap_or(MAX_BOOKING_MINUTES);
        if minutes > MAX_BOOKING_MINUTES {
            return Err(MarketError::ValidationError(format!(
                "booking duration must not exceed {MAX_BOOKING_MINUTES} minutes"
            )));
        }
        self.scheduled_date
            .and_time(self.scheduled_time)
            .checked_add_signed(Duration::minutes(i64::from(minutes)))
            .ok_or_else(|| {
                MarketError::ValidationError(format!(
                    "slot on {} ends past the last supported date",
                    self.scheduled_date
                ))
            })?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub booking_number: String,
    pub customer_id: String,
    pub vendor_id: String,
    pub service_id: String,
    pub service_name: String,
    pub price: Amount,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_minutes: u32,
    pub payment: PaymentInfo,
    pub status: BookingStatus,
    pub status_history: StatusHistory<BookingStatus>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingUpdate {
    Transition(StatusHistoryEntry<BookingStatus>),
    Receipt {
        url: String,
        method: String,
        submitted_at: DateTime<Utc>,
    },
    PaymentVerified {
        by: String,
        at: DateTime<Utc>,
    },
}

impl Booking {
    pub fn request(
        request: NewBooking,
        booking_number: String,
        default_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let entry = StatusHistoryEntry::new(
            BookingStatus::Requested,
            now,
            request.customer_id.as_str(),
            Some("Booking requested".to_string()),
        );
        Self {
            meta: RecordMeta::default(),
            booking_number,
            customer_id: request.customer_id,
            vendor_id: request.vendor_id,
            service_id: request.service_id,
            service_name: request.service_name,
            price: request.price,
            scheduled_date: request.scheduled_date,
            scheduled_time: request.scheduled_time,
            duration_minutes: request.duration_minutes.unwrap_or(default_minutes),
            payment: PaymentInfo::with_method(non_blank(request.payment_method.as_deref())),
            status: BookingStatus::Requested,
            status_history: StatusHistory::starting_with(entry),
            notes: non_blank(request.notes.as_deref()),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn involves(&self, party_id: &str) -> bool {
        self.customer_id == party_id || self.vendor_id == party_id
    }

    pub fn for_party(party_id: impl Into<String>) -> Filter<Booking> {
        let party_id = party_id.into();
        Filter::new(move |booking: &Booking| booking.involves(&party_id))
    }

    /// Bookings of `vendor_id` that currently hold a calendar slot.
    pub fn holding_slot_for(vendor_id: impl Into<String>) -> Filter<Booking> {
        let vendor_id = vendor_id.into();
        Filter::new(move |booking: &Booking| {
            booking.vendor_id == vendor_id && booking.status.holds_slot()
        })
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.scheduled_time)
    }

    /// Saturates at the end of the calendar.
    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at()
            .checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Half-open interval overlap of the two scheduled slots.
    pub fn overlaps(&self, other: &Booking) -> bool {
        self.starts_at() < other.ends_at() && other.starts_at() < self.ends_at()
    }

    /// Vendor accepts, provided no slot-holding booking overlaps this one.
    pub fn plan_accept(
        &self,
        vendor_id: &str,
        holding: &[Booking],
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Plan<BookingUpdate>> {
        require_vendor(vendor_id, &self.vendor_id)?;
        check_transition(self.status, BookingStatus::VendorAccepted)?;
        if let Some(clash) = holding
            .iter()
            .find(|other| other.id() != self.id() && other.overlaps(self))
        {
            return Err(MarketError::InvalidTransition(format!(
                "slot {} overlaps accepted booking {}",
                self.starts_at(),
                clash.booking_number
            )));
        }
        let entry = StatusHistoryEntry::new(
            BookingStatus::VendorAccepted,
            now,
            vendor_id,
            non_blank(notes),
        );
        Ok(Plan::apply(vec![BookingUpdate::Transition(entry)]))
    }

    pub fn plan_decline(
        &self,
        vendor_id: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Plan<BookingUpdate>> {
        require_vendor(vendor_id, &self.vendor_id)?;
        check_transition(self.status, BookingStatus::Declined)?;
        let entry = StatusHistoryEntry::new(
            BookingStatus::Declined,
            now,
            vendor_id,
            Some(non_blank(reason).unwrap_or_else(|| "Declined by vendor".to_string())),
        );
        Ok(Plan::apply(vec![BookingUpdate::Transition(entry)]))
    }

    /// Service start/finish or cancellation.
    pub fn plan_status_change(
        &self,
        to: BookingStatus,
        actor_id: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Plan<BookingUpdate>> {
        let party = party_of(actor_id, &self.customer_id, &self.vendor_id)?;
        match to {
            BookingStatus::InProgress | BookingStatus::Completed => {
                require_vendor(actor_id, &self.vendor_id)?;
            }
            BookingStatus::Cancelled => ensure_cancellable(&self.payment)?,
            BookingStatus::VendorAccepted | BookingStatus::Declined => {
                return Err(MarketError::InvalidTransition(format!(
                    "{to} is reached by accepting or declining the booking"
                )));
            }
            BookingStatus::Requested
            | BookingStatus::PaymentSubmitted
            | BookingStatus::PaymentConfirmed
            | BookingStatus::PaymentRejected => {
                return Err(MarketError::InvalidTransition(format!(
                    "{to} is reached through the payment workflow, not a status update"
                )));
            }
        }
        check_transition(self.status, to)?;

        let notes = non_blank(notes).or_else(|| match (to, party) {
            (BookingStatus::Cancelled, Party::Customer) => Some("Cancelled by customer".into()),
            (BookingStatus::Cancelled, Party::Vendor) => Some("Cancelled by vendor".into()),
            _ => None,
        });
        let entry = StatusHistoryEntry::new(to, now, actor_id, notes);
        Ok(Plan::apply(vec![BookingUpdate::Transition(entry)]).with_counters(self.side_effects(to)))
    }

    pub fn side_effects(&self, to: BookingStatus) -> Vec<CounterDelta> {
        if to != BookingStatus::Completed {
            return Vec::new();
        }
        vec![
            CounterDelta::new(
                CounterKey::VendorTotalSales {
                    vendor_id: self.vendor_id.clone(),
                },
                1,
            ),
            CounterDelta::new(
                CounterKey::VendorTotalRevenue {
                    vendor_id: self.vendor_id.clone(),
                },
                self.price.value(),
            ),
            CounterDelta::new(
                CounterKey::ServiceTotalBookings {
                    service_id: self.service_id.clone(),
                },
                1,
            ),
        ]
    }
}

impl Record for Booking {
    const COLLECTION: &'static str = "bookings";
    const ENTITY: &'static str = "booking";
    type Update = BookingUpdate;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn apply(&mut self, update: BookingUpdate) {
        match update {
            BookingUpdate::Transition(entry) => {
                self.status = entry.status;
                self.updated_at = entry.timestamp;
                if entry.status == BookingStatus::Completed {
                    self.completed_at = Some(entry.timestamp);
                }
                self.status_history.append(entry);
            }
            BookingUpdate::Receipt {
                url,
                method,
                submitted_at,
            } => {
                self.payment.receipt_url = Some(url);
                self.payment.method = Some(method);
                self.payment.submitted_at = Some(submitted_at);
                self.updated_at = submitted_at;
            }
            BookingUpdate::PaymentVerified { by, at } => {
                self.payment.verified = true;
                self.payment.verified_by = Some(by);
                self.payment.verified_at = Some(at);
                self.updated_at = at;
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.booking_number.clone())
    }
}

impl Payable for Booking {
    type Status = BookingStatus;

    fn status(&self) -> BookingStatus {
        self.status
    }

    fn payment(&self) -> &PaymentInfo {
        &self.payment
    }

    fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    fn amount_due(&self) -> Amount {
        self.price
    }

    fn related(&self) -> Related {
        Related {
            id: self.meta.id.clone(),
            number: self.booking_number.clone(),
            kind: RelatedType::Booking,
        }
    }

    fn transition(entry: StatusHistoryEntry<BookingStatus>) -> BookingUpdate {
        BookingUpdate::Transition(entry)
    }

    fn receipt(url: String, method: String, submitted_at: DateTime<Utc>) -> BookingUpdate {
        BookingUpdate::Receipt {
            url,
            method,
            submitted_at,
        }
    }

    fn verified(by: String, at: DateTime<Utc>) -> BookingUpdate {
        BookingUpdate::PaymentVerified { by, at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{plan_receipt, plan_verification};
    use rust_decimal_macros::dec;

    fn booking_at(id: &str, hour: u32, minutes: u32) -> Booking {
        let request = NewBooking {
            customer_id: "cust".into(),
            vendor_id: "vend".into(),
            service_id: "svc".into(),
            service_name: "Haircut".into(),
            price: Amount::new(dec!(500)).unwrap(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(hour, minutes, 0).unwrap(),
            duration_minutes: Some(60),
            payment_method: None,
            notes: None,
        };
        let mut booking = Booking::request(request, format!("BKG-20260314-{id}"), 60, Utc::now());
        booking.meta.id = id.to_string();
        booking
    }

    fn run(booking: &mut Booking, plan: Plan<BookingUpdate>) {
        if let Plan::Apply { updates, .. } = plan {
            for update in updates {
                booking.apply(update);
            }
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let nine = booking_at("a", 9, 0);
        let nine_thirty = booking_at("b", 9, 30);
        let ten = booking_at("c", 10, 0);
        assert!(nine.overlaps(&nine_thirty));
        assert!(!nine.overlaps(&ten));
    }

    #[test]
    fn test_slot_length_is_bounded() {
        let mut request = NewBooking {
            customer_id: "cust".into(),
            vendor_id: "vend".into(),
            service_id: "svc".into(),
            service_name: "Retreat".into(),
            price: Amount::new(dec!(500)).unwrap(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: Some(MAX_BOOKING_MINUTES),
            payment_method: None,
            notes: None,
        };
        assert!(request.validate().is_ok());

        request.duration_minutes = Some(u32::MAX);
        assert!(matches!(
            request.validate(),
            Err(MarketError::ValidationError(msg)) if msg.contains("exceed")
        ));

        request.duration_minutes = Some(60);
        request.scheduled_date = NaiveDate::MAX;
        request.scheduled_time = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        assert!(matches!(
            request.validate(),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn test_slot_end_saturates_at_calendar_end() {
        let mut booking = booking_at("a", 23, 30);
        booking.scheduled_date = NaiveDate::MAX;
        booking.duration_minutes = u32::MAX;
        assert_eq!(booking.ends_at(), NaiveDateTime::MAX);
        assert!(booking.overlaps(&booking.clone()));
    }

    #[test]
    fn test_accept_rejects_conflicting_slot() {
        let mut accepted = booking_at("a", 9, 0);
        let plan = accepted.plan_accept("vend", &[], None, Utc::now()).unwrap();
        run(&mut accepted, plan);
        assert_eq!(accepted.status, BookingStatus::VendorAccepted);

        let clash = booking_at("b", 9, 30);
        assert!(matches!(
            clash.plan_accept("vend", &[accepted.clone()], None, Utc::now()),
            Err(MarketError::InvalidTransition(_))
        ));

        let later = booking_at("c", 10, 0);
        assert!(later.plan_accept("vend", &[accepted], None, Utc::now()).is_ok());
    }

    #[test]
    fn test_only_vendor_accepts_or_declines() {
        let booking = booking_at("a", 9, 0);
        assert!(matches!(
            booking.plan_accept("cust", &[], None, Utc::now()),
            Err(MarketError::InvalidTransition(_))
        ));
        assert!(matches!(
            booking.plan_decline("cust", None, Utc::now()),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_decline_records_reason_and_is_terminal() {
        let mut booking = booking_at("a", 9, 0);
        let plan = booking.plan_decline("vend", None, Utc::now()).unwrap();
        run(&mut booking, plan);
        assert_eq!(booking.status, BookingStatus::Declined);
        assert_eq!(
            booking.status_history.last().unwrap().notes.as_deref(),
            Some("Declined by vendor")
        );
        assert!(booking.plan_accept("vend", &[], None, Utc::now()).is_err());
    }

    #[test]
    fn test_payment_nests_after_acceptance() {
        let mut booking = booking_at("a", 9, 0);
        let now = Utc::now();
        assert!(plan_receipt(&booking, "cust", "https://r/1", "gcash", now).is_err());

        let plan = booking.plan_accept("vend", &[], None, now).unwrap();
        run(&mut booking, plan);
        let plan = plan_receipt(&booking, "cust", "https://r/1", "gcash", now).unwrap();
        run(&mut booking, plan);
        let plan = plan_verification(&booking, "vend", true, None, now).unwrap();
        run(&mut booking, plan);
        assert_eq!(booking.status, BookingStatus::PaymentConfirmed);

        assert!(matches!(
            booking.plan_status_change(BookingStatus::Cancelled, "cust", None, now),
            Err(MarketError::InvalidTransition(_))
        ));
        for next in [BookingStatus::InProgress, BookingStatus::Completed] {
            let plan = booking.plan_status_change(next, "vend", None, now).unwrap();
            run(&mut booking, plan);
        }
        assert!(booking.completed_at.is_some());
        assert_eq!(booking.status_history.current_status(), Some(BookingStatus::Completed));
    }

    #[test]
    fn test_cannot_cancel_after_service_started() {
        let mut booking = booking_at("a", 9, 0);
        let now = Utc::now();
        let plan = booking.plan_accept("vend", &[], None, now).unwrap();
        run(&mut booking, plan);
        let plan = booking
            .plan_status_change(BookingStatus::InProgress, "vend", None, now)
            .unwrap();
        run(&mut booking, plan);

        assert!(matches!(
            booking.plan_status_change(BookingStatus::Cancelled, "cust", None, now),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_completion_books_sale_and_service_count() {
        let booking = booking_at("a", 9, 0);
        let deltas = booking.side_effects(BookingStatus::Completed);
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[1].delta, dec!(500));
        assert!(booking.side_effects(BookingStatus::InProgress).is_empty());
    }
}
