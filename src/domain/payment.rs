//! Manual payment verification.
//!
//! Customers pay by bank transfer and upload a receipt; the vendor checks
//! their bank app, compares the amount, and either confirms or rejects. No
//! gateway is involved, so the engine's job is to make the human decision
//! safe: attestation is mandatory, the outcome is recorded on the history,
//! and a confirmed payment can never be confirmed twice or rejected later.
//!
//! The planners below are shared by orders and bookings through [`Payable`].

use crate::domain::history::StatusHistoryEntry;
use crate::domain::lifecycle::{
    LifecycleStatus, Plan, check_transition, non_blank, require_customer, require_vendor,
};
use crate::domain::money::Amount;
use crate::domain::notification::Related;
use crate::domain::ports::Record;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment fields carried by orders and bookings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: Option<String>,
    pub receipt_url: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
}

impl PaymentInfo {
    pub fn with_method(method: Option<String>) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }
}

/// Status enums that embed the payment sub-states.
pub trait PaymentFlow: LifecycleStatus {
    const SUBMITTED: Self;
    const CONFIRMED: Self;
    const REJECTED: Self;
}

/// A record whose payment goes through manual verification.
pub trait Payable: Record {
    type Status: PaymentFlow;

    fn status(&self) -> Self::Status;
    fn payment(&self) -> &PaymentInfo;
    fn customer_id(&self) -> &str;
    fn vendor_id(&self) -> &str;
    fn amount_due(&self) -> Amount;
    fn related(&self) -> Related;

    /// Update that appends `entry` to the history and sets the status.
    fn transition(entry: StatusHistoryEntry<Self::Status>) -> Self::Update;
    fn receipt(url: String, method: String, submitted_at: DateTime<Utc>) -> Self::Update;
    fn verified(by: String, at: DateTime<Utc>) -> Self::Update;
}

/// Customer attaches (or replaces) a transfer receipt.
///
/// Re-sending the receipt already on file is a no-op, so a flaky client
/// retrying the upload never duplicates history entries.
pub fn plan_receipt<P: Payable>(
    record: &P,
    actor_id: &str,
    receipt_url: &str,
    method: &str,
    now: DateTime<Utc>,
) -> Result<Plan<P::Update>> {
    let url = non_blank(Some(receipt_url))
        .ok_or_else(|| MarketError::ValidationError("receipt URL must not be empty".into()))?;
    let method = non_blank(Some(method))
        .ok_or_else(|| MarketError::ValidationError("payment method must not be empty".into()))?;
    require_customer(actor_id, record.customer_id())?;

    let payment = record.payment();
    let status = record.status();
    if status == P::Status::SUBMITTED
        && payment.receipt_url.as_deref() == Some(url.as_str())
        && payment.method.as_deref() == Some(method.as_str())
    {
        return Ok(Plan::Unchanged);
    }
    if payment.verified {
        return Err(MarketError::InvalidTransition(
            "payment is already verified".into(),
        ));
    }
    check_transition(status, P::Status::SUBMITTED)?;

    let notes = if status == P::Status::SUBMITTED {
        "Payment receipt replaced"
    } else {
        "Payment receipt submitted"
    };
    Ok(Plan::apply(vec![
        P::receipt(url, method, now),
        P::transition(StatusHistoryEntry::new(
            P::Status::SUBMITTED,
            now,
            actor_id,
            Some(notes.to_string()),
        )),
    ]))
}

/// Vendor confirms the transfer after checking their bank records.
///
/// `attested` is the vendor's statement that they looked at the actual bank
/// transaction; without it nothing is confirmed. Once verified, further
/// calls are no-ops.
pub fn plan_verification<P: Payable>(
    record: &P,
    vendor_id: &str,
    attested: bool,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Plan<P::Update>> {
    require_vendor(vendor_id, record.vendor_id())?;
    if record.payment().verified {
        return Ok(Plan::Unchanged);
    }
    if !attested {
        return Err(MarketError::InvalidTransition(
            "payment can only be verified after the vendor attests to checking the bank transfer"
                .into(),
        ));
    }
    check_transition(record.status(), P::Status::CONFIRMED)?;

    let notes = non_blank(notes).unwrap_or_else(|| {
        format!(
            "Transfer of {} matched bank records",
            record.amount_due()
        )
    });
    Ok(Plan::apply(vec![
        P::verified(vendor_id.to_string(), now),
        P::transition(StatusHistoryEntry::new(
            P::Status::CONFIRMED,
            now,
            vendor_id,
            Some(notes),
        )),
    ]))
}

/// Vendor rejects a receipt that does not match a real transfer.
pub fn plan_rejection<P: Payable>(
    record: &P,
    vendor_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Plan<P::Update>> {
    require_vendor(vendor_id, record.vendor_id())?;
    if record.payment().verified {
        return Err(MarketError::InvalidTransition(
            "payment is already verified and can no longer be rejected".into(),
        ));
    }
    let reason = non_blank(Some(reason))
        .ok_or_else(|| MarketError::ValidationError("a rejection reason is required".into()))?;
    check_transition(record.status(), P::Status::REJECTED)?;

    Ok(Plan::apply(vec![P::transition(StatusHistoryEntry::new(
        P::Status::REJECTED,
        now,
        vendor_id,
        Some(reason),
    ))]))
}

/// Cancelling after a verified payment needs a refund, which is not a
/// status flip.
pub fn ensure_cancellable(payment: &PaymentInfo) -> Result<()> {
    if payment.verified {
        Err(MarketError::InvalidTransition(
            "payment already verified; cancellation requires a refund".into(),
        ))
    } else {
        Ok(())
    }
}
