//! Notifications produced from lifecycle events.
//!
//! Each committed event maps to at most one notification per affected user.
//! The mapping is pure; storing and pushing happen in the dispatcher.

use crate::domain::booking::BookingStatus;
use crate::domain::money::Amount;
use crate::domain::order::OrderStatus;
use crate::domain::ports::{Filter, Record, RecordMeta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Order,
    Booking,
    Payment,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedType {
    Order,
    Booking,
    Chat,
}

impl RelatedType {
    fn label(&self) -> &'static str {
        match self {
            Self::Order => "Order",
            Self::Booking => "Booking",
            Self::Chat => "Chat",
        }
    }
}

/// The transaction an event is about.
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    pub id: String,
    pub number: String,
    pub kind: RelatedType,
}

impl fmt::Display for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: String,
    pub related_type: RelatedType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationUpdate {
    MarkRead,
}

impl Notification {
    pub fn from_draft(draft: NotificationDraft, now: DateTime<Utc>) -> Self {
        Self {
            meta: RecordMeta::default(),
            user_id: draft.user_id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            related_id: draft.related_id,
            related_type: draft.related_type,
            is_read: false,
            created_at: now,
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Filter<Notification> {
        let user_id = user_id.into();
        Filter::new(move |notification: &Notification| notification.user_id == user_id)
    }

    pub fn unread_for(user_id: impl Into<String>) -> Filter<Notification> {
        let user_id = user_id.into();
        Filter::new(move |notification: &Notification| {
            notification.user_id == user_id && !notification.is_read
        })
    }
}

impl Record for Notification {
    const COLLECTION: &'static str = "notifications";
    const ENTITY: &'static str = "notification";
    type Update = NotificationUpdate;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn apply(&mut self, update: NotificationUpdate) {
        match update {
            NotificationUpdate::MarkRead => self.is_read = true,
        }
    }
}

/// A notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: String,
    pub related_type: RelatedType,
}

impl NotificationDraft {
    fn about(
        related: &Related,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            message,
            related_id: related.id.clone(),
            related_type: related.kind,
        }
    }
}

/// Something that happened to a transaction, reported after commit.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    OrderPlaced {
        order: Related,
        vendor_id: String,
        total: Amount,
    },
    ReceiptSubmitted {
        related: Related,
        vendor_id: String,
    },
    PaymentVerified {
        related: Related,
        customer_id: String,
    },
    PaymentRejected {
        related: Related,
        customer_id: String,
        reason: String,
    },
    OrderStatusChanged {
        order: Related,
        customer_id: String,
        vendor_id: String,
        actor_id: String,
        status: OrderStatus,
    },
    BookingRequested {
        booking: Related,
        vendor_id: String,
        service_name: String,
    },
    BookingAccepted {
        booking: Related,
        customer_id: String,
        service_name: String,
    },
    BookingDeclined {
        booking: Related,
        customer_id: String,
        reason: Option<String>,
    },
    BookingStatusChanged {
        booking: Related,
        customer_id: String,
        vendor_id: String,
        actor_id: String,
        status: BookingStatus,
    },
    MessageSent {
        chat_id: String,
        recipient_id: String,
        sender_name: String,
        text: String,
    },
}

impl LifecycleEvent {
    /// Notifications for this event, at most one per user.
    pub fn drafts(&self, preview_chars: usize) -> Vec<NotificationDraft> {
        let mut drafts = match self {
            Self::OrderPlaced {
                order,
                vendor_id,
                total,
            } => vec![NotificationDraft::about(
                order,
                vendor_id,
                NotificationKind::Order,
                "New order",
                format!("{order} was placed for {total}"),
            )],
            Self::ReceiptSubmitted { related, vendor_id } => vec![NotificationDraft::about(
                related,
                vendor_id,
                NotificationKind::Payment,
                "Payment receipt submitted",
                format!("A payment receipt for {related} is waiting for your review"),
            )],
            Self::PaymentVerified {
                related,
                customer_id,
            } => vec![NotificationDraft::about(
                related,
                customer_id,
                NotificationKind::Payment,
                "Payment verified",
                format!("Your payment for {related} has been verified"),
            )],
            Self::PaymentRejected {
                related,
                customer_id,
                reason,
            } => vec![NotificationDraft::about(
                related,
                customer_id,
                NotificationKind::Payment,
                "Payment rejected",
                format!("Your payment for {related} was rejected: {reason}"),
            )],
            Self::OrderStatusChanged {
                order,
                customer_id,
                vendor_id,
                actor_id,
                status,
            } => {
                let mut drafts = vec![NotificationDraft::about(
                    order,
                    customer_id,
                    NotificationKind::Order,
                    "Order update",
                    format!("{order} is now {status}"),
                )];
                if *status == OrderStatus::Cancelled && actor_id == customer_id {
                    drafts.push(NotificationDraft::about(
                        order,
                        vendor_id,
                        NotificationKind::Order,
                        "Order cancelled",
                        format!("{order} was cancelled by the customer"),
                    ));
                }
                drafts
            }
            Self::BookingRequested {
                booking,
                vendor_id,
                service_name,
            } => vec![NotificationDraft::about(
                booking,
                vendor_id,
                NotificationKind::Booking,
                "New booking request",
                format!("{booking} requested for {service_name}"),
            )],
            Self::BookingAccepted {
                booking,
                customer_id,
                service_name,
            } => vec![NotificationDraft::about(
                booking,
                customer_id,
                NotificationKind::Booking,
                "Booking accepted",
                format!("{booking} for {service_name} was accepted"),
            )],
            Self::BookingDeclined {
                booking,
                customer_id,
                reason,
            } => {
                let message = match reason {
                    Some(reason) => format!("{booking} was declined: {reason}"),
                    None => format!("{booking} was declined"),
                };
                vec![NotificationDraft::about(
                    booking,
                    customer_id,
                    NotificationKind::Booking,
                    "Booking declined",
                    message,
                )]
            }
            Self::BookingStatusChanged {
                booking,
                customer_id,
                vendor_id,
                actor_id,
                status,
            } => {
                let mut drafts = vec![NotificationDraft::about(
                    booking,
                    customer_id,
                    NotificationKind::Booking,
                    "Booking update",
                    format!("{booking} is now {status}"),
                )];
                if *status == BookingStatus::Cancelled && actor_id == customer_id {
                    drafts.push(NotificationDraft::about(
                        booking,
                        vendor_id,
                        NotificationKind::Booking,
                        "Booking cancelled",
                        format!("{booking} was cancelled by the customer"),
                    ));
                }
                drafts
            }
            Self::MessageSent {
                chat_id,
                recipient_id,
                sender_name,
                text,
            } => vec![NotificationDraft {
                user_id: recipient_id.clone(),
                kind: NotificationKind::Message,
                title: format!("New message from {sender_name}"),
                message: preview(text, preview_chars),
                related_id: chat_id.clone(),
                related_type: RelatedType::Chat,
            }],
        };

        let mut seen = HashSet::new();
        drafts.retain(|draft| seen.insert(draft.user_id.clone()));
        drafts
    }
}

/// First `limit` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
