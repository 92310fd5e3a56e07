//! Billing event reconciliation
//!
//! Applies each webhook event's effects to the namespace: user and
//! subscription records, the tenant standing they imply, the monthly revenue
//! ledger, and finally a stats rebuild. Dispatch is an exhaustive match over
//! [`BillingEventKind`], so adding a kind without wiring its handler is a
//! compile error, while kinds this worker has never heard of land on
//! `Unknown` and are acknowledged without effect.
//!
//! Nothing here is transactional. A fault mid-event surfaces as an error
//! (the provider retries the delivery), and the next successful event for
//! the same user re-derives the affected state.

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::billing::event::{
    BillingEvent, BillingEventKind, InvoicePayload, PaymentFailure, SubscriptionPayload,
    UserPayload,
};
use crate::billing::record::{InvoiceRecord, SubscriptionRecord, UserRecord};
use crate::error::Error;
use crate::stats::{round_cents, StatsView};
use crate::store::{keys, Namespace};
use crate::tenant::{BillingPeriod, SubscriptionStatus, Tenant};

/// What [`BillingReconciler::apply`] did with a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Recognized kind; its effects were applied
    Applied(BillingEventKind),
    /// Unhandled kind; acknowledged without effect
    Ignored {
        /// Raw type tag, for the caller's log line
        event_type: String,
    },
}

/// Applies billing events to one deployment namespace
pub struct BillingReconciler {
    ns: Namespace,
    stats: StatsView,
}

impl BillingReconciler {
    /// Bind the reconciler to a namespace and its stats view
    pub fn new(ns: Namespace, stats: StatsView) -> Self {
        Self { ns, stats }
    }

    /// Apply one event envelope
    ///
    /// Known kinds write their records, propagate tenant standing, and
    /// rebuild the stats view. Unknown kinds return
    /// [`EventOutcome::Ignored`]: the provider retries on non-2xx, so a kind
    /// this worker does not handle must still be acknowledged.
    ///
    /// # Errors
    ///
    /// A payload that does not match its type tag, or any storage fault,
    /// aborts the event. Nothing applied so far is rolled back.
    pub async fn apply(&self, event: &BillingEvent) -> Result<EventOutcome, Error> {
        let kind = event.kind();
        match kind {
            BillingEventKind::UserCreated => self.on_user_created(event.as_user()?).await?,
            BillingEventKind::UserDeleted => self.on_user_deleted(event.as_user()?).await?,
            BillingEventKind::SubscriptionCreated => {
                self.on_subscription_created(event.as_subscription()?).await?
            }
            BillingEventKind::SubscriptionUpdated => {
                self.on_subscription_updated(event.as_subscription()?).await?
            }
            BillingEventKind::SubscriptionCanceled => {
                self.on_subscription_canceled(event.as_subscription()?).await?
            }
            BillingEventKind::InvoicePaid => self.on_invoice_paid(event.as_invoice()?).await?,
            BillingEventKind::InvoicePaymentFailed => {
                self.on_payment_failed(event.as_payment_failure()?).await?
            }
            BillingEventKind::Unknown => {
                debug!(event_type = %event.event_type, "ignoring unhandled billing event");
                counter!("edgehost_billing_events_total", "kind" => "unknown").increment(1);
                return Ok(EventOutcome::Ignored {
                    event_type: event.event_type.clone(),
                });
            }
        }
        counter!("edgehost_billing_events_total", "kind" => kind.as_str()).increment(1);

        // the invoice ledger feeds no stats key; everything else does
        if kind != BillingEventKind::InvoicePaid {
            self.stats.recompute().await?;
        }
        Ok(EventOutcome::Applied(kind))
    }

    async fn on_user_created(&self, user: UserPayload) -> Result<(), Error> {
        let record = UserRecord::new(user.id.clone(), user.email.clone(), Utc::now());
        self.ns.put_json(&keys::user(&user.id), &record).await?;
        self.ns.index_append(keys::USER_INDEX, &user.id).await?;
        info!(user_id = %user.id, "user recorded");
        Ok(())
    }

    async fn on_user_deleted(&self, user: UserPayload) -> Result<(), Error> {
        self.ns.delete(&keys::user(&user.id)).await?;
        self.ns.index_remove(keys::USER_INDEX, &user.id).await?;
        info!(user_id = %user.id, "user removed");
        Ok(())
    }

    async fn on_subscription_created(&self, payload: SubscriptionPayload) -> Result<(), Error> {
        let now = Utc::now();
        let record = SubscriptionRecord::from_payload(&payload, now);
        self.ns
            .put_json(&keys::subscription(&payload.user_id), &record)
            .await?;
        self.ns
            .index_append(keys::SUBSCRIPTION_INDEX, &payload.user_id)
            .await?;
        self.update_owned_tenants(
            &payload.user_id,
            record.status.tenant_status(),
            record.billing_period,
            now,
        )
        .await?;
        info!(
            user_id = %payload.user_id,
            subscription_id = ?record.id,
            status = ?record.status,
            "subscription created"
        );
        Ok(())
    }

    async fn on_subscription_updated(&self, payload: SubscriptionPayload) -> Result<(), Error> {
        let now = Utc::now();
        let key = keys::subscription(&payload.user_id);

        // merge onto the stored record; an update for a subscription this
        // worker never saw created becomes a create
        let record = match self.ns.get_json::<SubscriptionRecord>(&key).await? {
            Some(mut existing) => {
                existing.merge(&payload);
                existing
            }
            None => SubscriptionRecord::from_payload(&payload, now),
        };
        self.ns.put_json(&key, &record).await?;
        self.ns
            .index_append(keys::SUBSCRIPTION_INDEX, &payload.user_id)
            .await?;
        self.update_owned_tenants(
            &payload.user_id,
            record.status.tenant_status(),
            record.billing_period,
            now,
        )
        .await?;
        info!(
            user_id = %payload.user_id,
            status = ?record.status,
            "subscription updated"
        );
        Ok(())
    }

    async fn on_subscription_canceled(&self, payload: SubscriptionPayload) -> Result<(), Error> {
        let now = Utc::now();
        let key = keys::subscription(&payload.user_id);

        let mut record = match self.ns.get_json::<SubscriptionRecord>(&key).await? {
            Some(existing) => existing,
            None => SubscriptionRecord::from_payload(&payload, now),
        };
        record.cancel(now);
        self.ns.put_json(&key, &record).await?;
        self.ns
            .index_append(keys::SUBSCRIPTION_INDEX, &payload.user_id)
            .await?;
        self.update_owned_tenants(&payload.user_id, SubscriptionStatus::Canceled, None, now)
            .await?;
        info!(user_id = %payload.user_id, "subscription canceled");
        Ok(())
    }

    /// Record the invoice and fold its amount into the month's revenue
    ///
    /// The invoice record doubles as the idempotency marker: only the
    /// delivery that claims `invoice:<id>` adds to the ledger, so a retried
    /// delivery cannot double-count revenue.
    async fn on_invoice_paid(&self, invoice: InvoicePayload) -> Result<(), Error> {
        let now = Utc::now();
        let record = InvoiceRecord::paid(&invoice, now);
        let first_delivery = self
            .ns
            .put_json_if_absent(&keys::invoice(&invoice.id), &record)
            .await?;
        if !first_delivery {
            debug!(invoice_id = %invoice.id, "invoice already recorded, skipping revenue fold");
            return Ok(());
        }

        let month = now.format("%Y-%m").to_string();
        let ledger_key = keys::revenue(&month);
        let total = self.ns.get_f64_or(&ledger_key, 0.0).await? + invoice.amount;
        self.ns
            .put_raw(&ledger_key, round_cents(total).to_string())
            .await?;
        info!(
            invoice_id = %invoice.id,
            user_id = %invoice.user_id,
            amount = invoice.amount,
            month = %month,
            "invoice recorded"
        );
        Ok(())
    }

    async fn on_payment_failed(&self, failure: PaymentFailure) -> Result<(), Error> {
        self.update_owned_tenants(
            &failure.user_id,
            SubscriptionStatus::PastDue,
            None,
            Utc::now(),
        )
        .await?;
        warn!(
            user_id = %failure.user_id,
            invoice_id = ?failure.id,
            "payment failed, tenant standing set past_due"
        );
        Ok(())
    }

    /// Propagate a billing standing onto every tenant the user owns
    ///
    /// Resolution goes through the `owner:<userId>` index rather than a scan
    /// of the Tenant Index. Entries that no longer match a live record with
    /// this owner are skipped; a billing event for a user with no registered
    /// tenants is a valid no-op.
    async fn update_owned_tenants(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        period: Option<BillingPeriod>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let owned: Vec<String> = self
            .ns
            .get_json(&keys::owner(user_id))
            .await?
            .unwrap_or_default();
        if owned.is_empty() {
            debug!(user_id = %user_id, "billing event for user with no registered tenants");
            return Ok(());
        }

        for subdomain in &owned {
            let key = keys::tenant(subdomain);
            let Some(mut tenant) = self.ns.get_json::<Tenant>(&key).await? else {
                debug!(subdomain = %subdomain, "owner index names a missing tenant, skipping");
                continue;
            };
            if tenant.user_id != user_id {
                debug!(subdomain = %subdomain, "owner index entry is stale, skipping");
                continue;
            }

            tenant.subscription_status = Some(status);
            if period.is_some() {
                tenant.billing_period = period;
            }
            tenant.subscription_updated_at = Some(now);
            self.ns.put_json(&key, &tenant).await?;
            debug!(subdomain = %subdomain, standing = %status, "tenant standing updated");
        }
        Ok(())
    }
}
