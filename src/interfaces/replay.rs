use crate::application::engine::MarketEngine;
use crate::domain::booking::{BookingStatus, NewBooking};
use crate::domain::order::{NewOrder, OrderStatus};
use crate::error::{MarketError, Result};
use crate::interfaces::csv::command_reader::LifecycleCommand;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Order,
    Booking,
    Chat,
}

/// Applies parsed commands to an engine, one at a time.
///
/// Creating commands bind their `target` to the id the store assigned, so
/// later lines can name records by a stable reference. A reference that was
/// never bound is treated as a raw record id.
pub struct Replayer {
    engine: MarketEngine,
    references: HashMap<String, (Kind, String)>,
}

impl Replayer {
    pub fn new(engine: MarketEngine) -> Self {
        Self {
            engine,
            references: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &MarketEngine {
        &self.engine
    }

    fn bind(&mut self, reference: String, kind: Kind, id: &str) {
        self.references.insert(reference, (kind, id.to_string()));
    }

    async fn resolve(&self, reference: &str) -> Result<(Kind, String)> {
        if let Some(bound) = self.references.get(reference) {
            return Ok(bound.clone());
        }
        match self.engine.orders.get_order(reference).await {
            Ok(order) => return Ok((Kind::Order, order.meta.id)),
            Err(MarketError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        match self.engine.bookings.get_booking(reference).await {
            Ok(booking) => Ok((Kind::Booking, booking.meta.id)),
            Err(MarketError::NotFound { .. }) => {
                Err(MarketError::not_found("order or booking", reference))
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_chat(&self, reference: &str) -> Result<String> {
        match self.references.get(reference) {
            Some((Kind::Chat, id)) => Ok(id.clone()),
            Some(_) => Err(MarketError::ValidationError(format!(
                "{reference} is not a chat"
            ))),
            None => Ok(reference.to_string()),
        }
    }

    pub async fn apply(&mut self, command: LifecycleCommand) -> Result<()> {
        let engine = self.engine.clone();
        match command {
            LifecycleCommand::Restock {
                product_id,
                quantity,
            } => {
                engine.counters.restock(&product_id, quantity).await?;
            }
            LifecycleCommand::ViewProduct { product_id } => {
                engine.counters.record_product_view(&product_id).await?;
            }
            LifecycleCommand::CreateOrder {
                customer_id,
                reference,
                vendor_id,
                items,
                payment_method,
            } => {
                let order = engine
                    .orders
                    .create_order(NewOrder {
                        customer_id,
                        vendor_id,
                        items,
                        payment_method,
                        shipping_address: None,
                        notes: None,
                    })
                    .await?;
                self.bind(reference, Kind::Order, &order.meta.id);
            }
            LifecycleCommand::CreateBooking {
                customer_id,
                reference,
                vendor_id,
                service,
                slot,
            } => {
                let booking = engine
                    .bookings
                    .create_booking(NewBooking {
                        customer_id,
                        vendor_id,
                        service_id: service.service_id,
                        service_name: service.service_name,
                        price: service.price,
                        scheduled_date: slot.date,
                        scheduled_time: slot.time,
                        duration_minutes: slot.duration_minutes,
                        payment_method: None,
                        notes: None,
                    })
                    .await?;
                self.bind(reference, Kind::Booking, &booking.meta.id);
            }
            LifecycleCommand::Accept {
                vendor_id,
                reference,
                notes,
            } => {
                let id = self.booking_id(&reference).await?;
                engine
                    .bookings
                    .accept_booking(&id, &vendor_id, notes.as_deref())
                    .await?;
            }
            LifecycleCommand::Decline {
                vendor_id,
                reference,
                reason,
            } => {
                let id = self.booking_id(&reference).await?;
                engine
                    .bookings
                    .decline_booking(&id, &vendor_id, reason.as_deref())
                    .await?;
            }
            LifecycleCommand::SubmitReceipt {
                customer_id,
                reference,
                receipt_url,
                method,
            } => match self.resolve(&reference).await? {
                (Kind::Booking, id) => {
                    engine
                        .bookings
                        .submit_payment_receipt(&id, &customer_id, &receipt_url, &method)
                        .await?;
                }
                (_, id) => {
                    engine
                        .orders
                        .submit_payment_receipt(&id, &customer_id, &receipt_url, &method)
                        .await?;
                }
            },
            LifecycleCommand::Verify {
                vendor_id,
                reference,
                attested,
                notes,
            } => match self.resolve(&reference).await? {
                (Kind::Booking, id) => {
                    engine
                        .bookings
                        .verify_payment(&id, &vendor_id, attested, notes.as_deref())
                        .await?;
                }
                (_, id) => {
                    engine
                        .orders
                        .verify_payment(&id, &vendor_id, attested, notes.as_deref())
                        .await?;
                }
            },
            LifecycleCommand::Reject {
                vendor_id,
                reference,
                reason,
            } => match self.resolve(&reference).await? {
                (Kind::Booking, id) => {
                    engine.bookings.reject_payment(&id, &vendor_id, &reason).await?;
                }
                (_, id) => {
                    engine.orders.reject_payment(&id, &vendor_id, &reason).await?;
                }
            },
            LifecycleCommand::UpdateStatus {
                actor_id,
                reference,
                status,
                notes,
            } => match self.resolve(&reference).await? {
                (Kind::Booking, id) => {
                    let status: BookingStatus = status.parse()?;
                    engine
                        .bookings
                        .update_booking_status(&id, status, &actor_id, notes.as_deref())
                        .await?;
                }
                (_, id) => {
                    let status: OrderStatus = status.parse()?;
                    engine
                        .orders
                        .update_order_status(&id, status, &actor_id, notes.as_deref())
                        .await?;
                }
            },
            LifecycleCommand::Cancel {
                actor_id,
                reference,
                reason,
            } => match self.resolve(&reference).await? {
                (Kind::Booking, id) => {
                    engine
                        .bookings
                        .cancel_booking(&id, &actor_id, reason.as_deref())
                        .await?;
                }
                (_, id) => {
                    engine
                        .orders
                        .cancel_order(&id, &actor_id, reason.as_deref())
                        .await?;
                }
            },
            LifecycleCommand::OpenChat {
                user_id,
                reference,
                other_id,
            } => {
                let chat = engine.chat.open_chat(&user_id, &other_id).await?;
                self.bind(reference, Kind::Chat, &chat.meta.id);
            }
            LifecycleCommand::SendMessage {
                sender_id,
                reference,
                text,
                sender_name,
            } => {
                let chat_id = self.resolve_chat(&reference).await?;
                let sender_name = sender_name.unwrap_or_else(|| sender_id.clone());
                engine
                    .chat
                    .send_message(&chat_id, &sender_id, &sender_name, &text)
                    .await?;
            }
            LifecycleCommand::ReadChat {
                reader_id,
                reference,
            } => {
                let chat_id = self.resolve_chat(&reference).await?;
                engine.chat.mark_read(&chat_id, &reader_id).await?;
            }
            LifecycleCommand::Review {
                customer_id,
                reference,
                rating,
                comment,
            } => {
                let (_, id) = self.resolve(&reference).await?;
                engine
                    .reviews
                    .submit_review(&customer_id, &id, rating, comment.as_deref())
                    .await?;
            }
        }
        Ok(())
    }

    async fn booking_id(&self, reference: &str) -> Result<String> {
        match self.resolve(reference).await? {
            (Kind::Booking, id) => Ok(id),
            _ => Err(MarketError::ValidationError(format!(
                "{reference} is not a booking"
            ))),
        }
    }
}
