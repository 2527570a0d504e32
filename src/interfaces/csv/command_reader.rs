use crate::domain::money::Amount;
use crate::domain::order::LineItem;
use crate::error::{MarketError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One raw line of a command file: `action, actor, target, arg1, arg2, arg3`.
///
/// `target` names the record the command acts on. Creating commands use it
/// to introduce a reference that later lines can point at.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRow {
    pub action: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub arg1: Option<String>,
    #[serde(default)]
    pub arg2: Option<String>,
    #[serde(default)]
    pub arg3: Option<String>,
}

/// Service slot of a booking request: `service_id:name:price`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub service_id: String,
    pub service_name: String,
    pub price: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotSpec {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    Restock {
        product_id: String,
        quantity: u32,
    },
    ViewProduct {
        product_id: String,
    },
    CreateOrder {
        customer_id: String,
        reference: String,
        vendor_id: String,
        items: Vec<LineItem>,
        payment_method: Option<String>,
    },
    CreateBooking {
        customer_id: String,
        reference: String,
        vendor_id: String,
        service: ServiceSpec,
        slot: SlotSpec,
    },
    Accept {
        vendor_id: String,
        reference: String,
        notes: Option<String>,
    },
    Decline {
        vendor_id: String,
        reference: String,
        reason: Option<String>,
    },
    SubmitReceipt {
        customer_id: String,
        reference: String,
        receipt_url: String,
        method: String,
    },
    Verify {
        vendor_id: String,
        reference: String,
        attested: bool,
        notes: Option<String>,
    },
    Reject {
        vendor_id: String,
        reference: String,
        reason: String,
    },
    UpdateStatus {
        actor_id: String,
        reference: String,
        status: String,
        notes: Option<String>,
    },
    Cancel {
        actor_id: String,
        reference: String,
        reason: Option<String>,
    },
    OpenChat {
        user_id: String,
        reference: String,
        other_id: String,
    },
    SendMessage {
        sender_id: String,
        reference: String,
        text: String,
        sender_name: Option<String>,
    },
    ReadChat {
        reader_id: String,
        reference: String,
    },
    Review {
        customer_id: String,
        reference: String,
        rating: u8,
        comment: Option<String>,
    },
}

fn required(field: Option<String>, name: &str, action: &str) -> Result<String> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MarketError::ValidationError(format!("{action}: {name} is required")))
}

fn optional(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

fn parse<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| MarketError::ValidationError(format!("invalid {what}: '{raw}'")))
}

/// The vendor's statement that they checked the receipt against their
/// account. A blank column means no statement was made.
fn parse_attestation(raw: Option<String>) -> Result<bool> {
    match optional(raw).map(|value| value.to_ascii_lowercase()).as_deref() {
        None | Some("no" | "false" | "unattested") => Ok(false),
        Some("yes" | "true" | "attested") => Ok(true),
        Some(other) => Err(MarketError::ValidationError(format!(
            "invalid attestation: '{other}' (expected yes or no)"
        ))),
    }
}

/// `product:quantity:unit_price`, items separated by `;`. The product id
/// doubles as its display name.
fn parse_items(raw: &str) -> Result<Vec<LineItem>> {
    raw.split(';')
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            let parts: Vec<&str> = item.split(':').map(str::trim).collect();
            let [product, quantity, price] = parts.as_slice() else {
                return Err(MarketError::ValidationError(format!(
                    "line item must be product:quantity:price, got '{item}'"
                )));
            };
            let price = Amount::new(parse::<Decimal>(price, "unit price")?)?;
            Ok(LineItem::new(
                *product,
                *product,
                parse(quantity, "quantity")?,
                price,
            ))
        })
        .collect()
}

fn parse_service(raw: &str) -> Result<ServiceSpec> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    let [service_id, service_name, price] = parts.as_slice() else {
        return Err(MarketError::ValidationError(format!(
            "service must be id:name:price, got '{raw}'"
        )));
    };
    Ok(ServiceSpec {
        service_id: service_id.to_string(),
        service_name: service_name.to_string(),
        price: Amount::new(parse::<Decimal>(price, "service price")?)?,
    })
}

/// `YYYY-MM-DDTHH:MM` with an optional `/minutes` suffix.
fn parse_slot(raw: &str) -> Result<SlotSpec> {
    let (start, minutes) = match raw.split_once('/') {
        Some((start, minutes)) => (start, Some(parse(minutes, "duration")?)),
        None => (raw, None),
    };
    let start = NaiveDateTime::parse_from_str(start.trim(), "%Y-%m-%dT%H:%M")
        .map_err(|_| MarketError::ValidationError(format!("invalid slot start: '{start}'")))?;
    Ok(SlotSpec {
        date: start.date(),
        time: start.time(),
        duration_minutes: minutes,
    })
}

impl TryFrom<CommandRow> for LifecycleCommand {
    type Error = MarketError;

    fn try_from(row: CommandRow) -> Result<Self> {
        let action = row.action.to_ascii_lowercase();
        let actor = row.actor;
        let reference = row.target;
        if reference.is_empty() {
            return Err(MarketError::ValidationError(format!(
                "{action}: target is required"
            )));
        }

        let command = match action.as_str() {
            "restock" => Self::Restock {
                quantity: parse(&required(row.arg1, "quantity", &action)?, "quantity")?,
                product_id: reference,
            },
            "view" => Self::ViewProduct {
                product_id: reference,
            },
            "create_order" => Self::CreateOrder {
                customer_id: actor,
                reference,
                vendor_id: required(row.arg1, "vendor", &action)?,
                items: parse_items(&required(row.arg2, "items", &action)?)?,
                payment_method: optional(row.arg3),
            },
            "create_booking" => Self::CreateBooking {
                customer_id: actor,
                reference,
                vendor_id: required(row.arg1, "vendor", &action)?,
                service: parse_service(&required(row.arg2, "service", &action)?)?,
                slot: parse_slot(&required(row.arg3, "slot", &action)?)?,
            },
            "accept" => Self::Accept {
                vendor_id: actor,
                reference,
                notes: optional(row.arg1),
            },
            "decline" => Self::Decline {
                vendor_id: actor,
                reference,
                reason: optional(row.arg1),
            },
            "submit_receipt" => Self::SubmitReceipt {
                customer_id: actor,
                reference,
                receipt_url: required(row.arg1, "receipt url", &action)?,
                method: optional(row.arg2).unwrap_or_else(|| "bank_transfer".to_string()),
            },
            "verify" => Self::Verify {
                vendor_id: actor,
                reference,
                attested: parse_attestation(row.arg1)?,
                notes: optional(row.arg2),
            },
            "reject" => Self::Reject {
                vendor_id: actor,
                reference,
                reason: required(row.arg1, "reason", &action)?,
            },
            "update_status" => Self::UpdateStatus {
                actor_id: actor,
                reference,
                status: required(row.arg1, "status", &action)?,
                notes: optional(row.arg2),
            },
            "cancel" => Self::Cancel {
                actor_id: actor,
                reference,
                reason: optional(row.arg1),
            },
            "open_chat" => Self::OpenChat {
                user_id: actor,
                reference,
                other_id: required(row.arg1, "participant", &action)?,
            },
            "send_message" => Self::SendMessage {
                sender_id: actor,
                reference,
                text: required(row.arg1, "text", &action)?,
                sender_name: optional(row.arg2),
            },
            "read_chat" => Self::ReadChat {
                reader_id: actor,
                reference,
            },
            "review" => Self::Review {
                customer_id: actor,
                reference,
                rating: parse(&required(row.arg1, "rating", &action)?, "rating")?,
                comment: optional(row.arg2),
            },
            other => {
                return Err(MarketError::ValidationError(format!(
                    "unknown action '{other}'"
                )));
            }
        };
        Ok(command)
    }
}

/// Reads lifecycle commands from a CSV source.
///
/// Whitespace is trimmed and trailing argument columns may be left out.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily parses each line; a bad line yields an error without ending
    /// the stream.
    pub fn commands(self) -> impl Iterator<Item = Result<LifecycleCommand>> {
        self.reader.into_deserialize().map(|result| {
            let row: CommandRow = result.map_err(MarketError::from)?;
            LifecycleCommand::try_from(row)
        })
    }
}
