//! Billing event types
//!
//! Strongly-typed representations of the provider's webhook events.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::tenant::{BillingPeriod, SubscriptionStatus};

/// Event kinds the reconciler handles
///
/// A closed enumeration with an explicit catch-all: dispatch is an
/// exhaustive `match`, and a kind the provider adds tomorrow lands on
/// [`BillingEventKind::Unknown`] instead of failing the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingEventKind {
    /// New identity-provider user
    #[serde(rename = "user.created")]
    UserCreated,

    /// User removed at the identity provider
    #[serde(rename = "user.deleted")]
    UserDeleted,

    /// New subscription
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,

    /// Subscription changed (plan, status, cadence)
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated,

    /// Subscription ended
    #[serde(rename = "subscription.canceled")]
    SubscriptionCanceled,

    /// Invoice settled
    #[serde(rename = "invoice.paid")]
    InvoicePaid,

    /// Invoice charge attempt failed
    #[serde(rename = "invoice.payment_failed")]
    InvoicePaymentFailed,

    /// Catch-all for kinds this worker does not handle
    #[serde(other)]
    Unknown,
}

impl FromStr for BillingEventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "user.created" => Self::UserCreated,
            "user.deleted" => Self::UserDeleted,
            "subscription.created" => Self::SubscriptionCreated,
            "subscription.updated" => Self::SubscriptionUpdated,
            "subscription.canceled" => Self::SubscriptionCanceled,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            _ => Self::Unknown,
        })
    }
}

impl BillingEventKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user.created",
            Self::UserDeleted => "user.deleted",
            Self::SubscriptionCreated => "subscription.created",
            Self::SubscriptionUpdated => "subscription.updated",
            Self::SubscriptionCanceled => "subscription.canceled",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Check if this is a handled event kind
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Subscription status as the provider reports it
///
/// Wider than the tenant-facing standing: providers emit states this worker
/// does not track individually, which deserialize to
/// [`SubscriptionState::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Paid up
    Active,
    /// Payment overdue, provider retrying
    PastDue,
    /// Ended
    Canceled,
    /// Any provider state this worker does not track
    #[serde(other)]
    Other,
}

impl SubscriptionState {
    /// The tenant-facing standing this provider state maps to
    ///
    /// `active` and `past_due` carry over; everything else reads as
    /// `canceled` from the tenant's point of view.
    pub fn tenant_status(&self) -> SubscriptionStatus {
        match self {
            SubscriptionState::Active => SubscriptionStatus::Active,
            SubscriptionState::PastDue => SubscriptionStatus::PastDue,
            SubscriptionState::Canceled | SubscriptionState::Other => {
                SubscriptionStatus::Canceled
            }
        }
    }

    /// Whether the subscriber count includes this state
    ///
    /// Everything short of an outright cancellation still counts; only
    /// `subscription.canceled` removes a subscriber.
    pub fn counts_as_subscriber(&self) -> bool {
        !matches!(self, SubscriptionState::Canceled)
    }
}

/// Tagged webhook envelope delivered by the billing provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    /// Type tag, e.g. `subscription.created`
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload; its shape depends on the type tag
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BillingEvent {
    /// Parse an envelope from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BillingError> {
        serde_json::from_slice(bytes).map_err(|e| BillingError::MalformedEnvelope(e.to_string()))
    }

    /// The typed event kind
    pub fn kind(&self) -> BillingEventKind {
        self.event_type.parse().unwrap_or(BillingEventKind::Unknown)
    }

    /// Extract the user payload from a user lifecycle event
    pub fn as_user(&self) -> Result<UserPayload, BillingError> {
        match self.kind() {
            BillingEventKind::UserCreated | BillingEventKind::UserDeleted => {
                serde_json::from_value(self.data.clone())
                    .map_err(|e| BillingError::InvalidPayload(e.to_string()))
            }
            _ => Err(BillingError::InvalidPayload(format!(
                "event {} is not a user event",
                self.event_type
            ))),
        }
    }

    /// Extract the subscription payload from a subscription lifecycle event
    pub fn as_subscription(&self) -> Result<SubscriptionPayload, BillingError> {
        match self.kind() {
            BillingEventKind::SubscriptionCreated
            | BillingEventKind::SubscriptionUpdated
            | BillingEventKind::SubscriptionCanceled => serde_json::from_value(self.data.clone())
                .map_err(|e| BillingError::InvalidPayload(e.to_string())),
            _ => Err(BillingError::InvalidPayload(format!(
                "event {} is not a subscription event",
                self.event_type
            ))),
        }
    }

    /// Extract the invoice payload from an `invoice.paid` event
    pub fn as_invoice(&self) -> Result<InvoicePayload, BillingError> {
        match self.kind() {
            BillingEventKind::InvoicePaid => serde_json::from_value(self.data.clone())
                .map_err(|e| BillingError::InvalidPayload(e.to_string())),
            _ => Err(BillingError::InvalidPayload(format!(
                "event {} is not a paid-invoice event",
                self.event_type
            ))),
        }
    }

    /// Extract the failure payload from an `invoice.payment_failed` event
    pub fn as_payment_failure(&self) -> Result<PaymentFailure, BillingError> {
        match self.kind() {
            BillingEventKind::InvoicePaymentFailed => serde_json::from_value(self.data.clone())
                .map_err(|e| BillingError::InvalidPayload(e.to_string())),
            _ => Err(BillingError::InvalidPayload(format!(
                "event {} is not a payment-failure event",
                self.event_type
            ))),
        }
    }
}

/// Payload of `user.created` / `user.deleted`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    /// External identity id
    pub id: String,
    /// Contact email, when the provider shares it
    #[serde(default)]
    pub email: Option<String>,
}

/// Payload of the subscription lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    /// Provider subscription id
    #[serde(default)]
    pub id: Option<String>,
    /// Owning user
    pub user_id: String,
    /// Provider-reported status; `subscription.created` defaults to active
    #[serde(default)]
    pub status: Option<SubscriptionState>,
    /// Provider plan/price id
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Billing cadence
    #[serde(default)]
    pub billing_period: Option<BillingPeriod>,
    /// Charge amount per period
    #[serde(default)]
    pub amount: Option<f64>,
    /// End of the current billing period
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Payload of `invoice.paid`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    /// Provider invoice id
    pub id: String,
    /// User the invoice was charged to
    pub user_id: String,
    /// Settled amount
    pub amount: f64,
    /// ISO currency code
    #[serde(default)]
    pub currency: Option<String>,
}

/// Payload of `invoice.payment_failed`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
    /// User whose charge failed
    pub user_id: String,
    /// Provider invoice id, when present
    #[serde(default)]
    pub id: Option<String>,
}
