//! Stored billing records
//!
//! The durable shapes the reconciler writes: users and subscriptions mutate
//! in place, invoices are append-only. All of them serialize with camelCase
//! field names to match the rest of the stored JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::billing::event::{InvoicePayload, SubscriptionPayload, SubscriptionState};
use crate::tenant::BillingPeriod;

/// Invoice status for settled invoices
pub const INVOICE_STATUS_PAID: &str = "paid";

/// Identity-provider user, mirrored locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// External identity id
    pub id: String,
    /// Contact email, when the provider shared it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When the `user.created` event arrived
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Build a record from a `user.created` payload
    pub fn new(id: String, email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email,
            created_at: now,
        }
    }
}

/// Subscription as last reported by the biller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    /// Provider subscription id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider-reported status
    pub status: SubscriptionState,
    /// Provider plan/price id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Billing cadence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_period: Option<BillingPeriod>,
    /// Charge amount per period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// When this record was first written
    pub created_at: DateTime<Utc>,
    /// End of the current billing period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    /// When the subscription was canceled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    /// Build a record for a subscription first seen via `subscription.created`
    ///
    /// A created event without an explicit status starts out active.
    pub fn from_payload(payload: &SubscriptionPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: payload.id.clone(),
            status: payload.status.unwrap_or(SubscriptionState::Active),
            plan_id: payload.plan_id.clone(),
            billing_period: payload.billing_period,
            amount: payload.amount,
            created_at: now,
            current_period_end: payload.current_period_end,
            canceled_at: None,
        }
    }

    /// Fold an update payload onto this record
    ///
    /// Fields the payload omits keep their stored values.
    pub fn merge(&mut self, payload: &SubscriptionPayload) {
        if let Some(id) = &payload.id {
            self.id = Some(id.clone());
        }
        if let Some(status) = payload.status {
            self.status = status;
        }
        if let Some(plan_id) = &payload.plan_id {
            self.plan_id = Some(plan_id.clone());
        }
        if let Some(period) = payload.billing_period {
            self.billing_period = Some(period);
        }
        if let Some(amount) = payload.amount {
            self.amount = Some(amount);
        }
        if let Some(end) = payload.current_period_end {
            self.current_period_end = Some(end);
        }
    }

    /// Mark the subscription canceled as of `now`
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionState::Canceled;
        self.canceled_at = Some(now);
    }
}

/// Paid invoice, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    /// Provider invoice id
    pub id: String,
    /// User the invoice was charged to
    pub user_id: String,
    /// Settled amount
    pub amount: f64,
    /// ISO currency code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// When the `invoice.paid` event arrived
    pub paid_at: DateTime<Utc>,
    /// Always `paid`; only settled invoices are recorded
    pub status: String,
}

impl InvoiceRecord {
    /// Build a record from an `invoice.paid` payload
    pub fn paid(payload: &InvoicePayload, now: DateTime<Utc>) -> Self {
        Self {
            id: payload.id.clone(),
            user_id: payload.user_id.clone(),
            amount: payload.amount,
            currency: payload.currency.clone(),
            paid_at: now,
            status: INVOICE_STATUS_PAID.to_string(),
        }
    }
}
