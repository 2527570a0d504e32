use crate::domain::booking::Booking;
use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Flat summary line shared by orders and bookings.
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    kind: &'static str,
    id: &'a str,
    number: &'a str,
    status: &'static str,
    total: String,
    verified: bool,
    history_len: usize,
}

impl<'a> From<&'a Order> for SummaryRow<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            kind: "order",
            id: &order.meta.id,
            number: &order.order_number,
            status: order.status.as_str(),
            total: order.total_amount.to_string(),
            verified: order.payment.verified,
            history_len: order.status_history.len(),
        }
    }
}

impl<'a> From<&'a Booking> for SummaryRow<'a> {
    fn from(booking: &'a Booking) -> Self {
        Self {
            kind: "booking",
            id: &booking.meta.id,
            number: &booking.booking_number,
            status: booking.status.as_str(),
            total: booking.price.to_string(),
            verified: booking.payment.verified,
            history_len: booking.status_history.len(),
        }
    }
}

/// Writes order and booking summaries as CSV
/// (`kind,id,number,status,total,verified,history_len`).
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records(&mut self, orders: &[Order], bookings: &[Booking]) -> Result<()> {
        for order in orders {
            self.writer.serialize(SummaryRow::from(order))?;
        }
        for booking in bookings {
            self.writer.serialize(SummaryRow::from(booking))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| std::io::Error::other(err.to_string()).into())
    }
}
