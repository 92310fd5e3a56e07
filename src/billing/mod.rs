//! Billing webhook reconciliation
//!
//! This module consumes the billing provider's webhook stream and folds it
//! into tenant state, subscription/invoice records, the monthly revenue
//! ledger, and the materialized aggregate stats.
//!
//! # Architecture
//!
//! ```text
//! POST <webhook path>
//!       |
//!       v
//! [Verify Signature]  -- secret configured? header checked : skipped
//!       |
//!       v
//! [Parse Envelope {type, data}]
//!       |
//!       v
//! [Dispatch on BillingEventKind]  -- Unknown? log + 200
//!       |
//!       v
//! [Apply: records, tenant status, revenue ledger]
//!       |
//!       v
//! [Recompute aggregate stats]
//! ```
//!
//! Unknown event kinds are acknowledged with 200 and no state change: the
//! provider retries on non-2xx, so a new event type must never wedge the
//! delivery queue.

pub mod event;
pub mod reconciler;
pub mod record;
pub mod signature;

// Re-export commonly used items
pub use event::{
    BillingEvent, BillingEventKind, InvoicePayload, PaymentFailure, SubscriptionPayload,
    SubscriptionState, UserPayload,
};
pub use reconciler::{BillingReconciler, EventOutcome};
pub use record::{InvoiceRecord, SubscriptionRecord, UserRecord};
pub use signature::{SignatureHeader, WebhookVerifier};
