//! Materialized aggregate statistics
//!
//! The four counters behind `GET /api/stats` are stored as their own keys so
//! a stats request is four point reads, not a scan. The keys are a view, not
//! a ledger: [`StatsView::recompute`] rebuilds every counter from the indexes
//! and records after each mutation, instead of incrementing and decrementing
//! in place. A derived count can never drift below zero or out of step with
//! the records it summarizes, whatever order events arrive in.

use serde::Serialize;
use tracing::debug;

use crate::billing::record::SubscriptionRecord;
use crate::config::Pricing;
use crate::error::StoreError;
use crate::store::{keys, Namespace};
use crate::tenant::{self, BillingPeriod, Tenant};

/// The counters exposed by `GET /api/stats`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    /// Registered subdomains (Tenant Index length)
    pub tenant_count: u64,
    /// Identities seen via `user.created` (User Index length)
    pub user_count: u64,
    /// Subscriptions not in the canceled state
    pub subscriber_count: u64,
    /// Monthly Recurring Revenue, rounded to cents
    pub mrr: f64,
}

/// Reader and rebuilder for the materialized stats keys
#[derive(Debug, Clone)]
pub struct StatsView {
    ns: Namespace,
    pricing: Pricing,
}

impl StatsView {
    /// Bind the view to a namespace and price points
    pub fn new(ns: Namespace, pricing: Pricing) -> Self {
        Self { ns, pricing }
    }

    /// Read the four counters in parallel
    ///
    /// A key that is absent or holds unparsable text reads as zero, so a
    /// stats request succeeds even before the view has ever been built.
    pub async fn read(&self) -> Result<AggregateStats, StoreError> {
        let (tenant_count, user_count, subscriber_count, mrr) = tokio::try_join!(
            self.ns.get_u64_or(keys::STATS_TENANT_COUNT, 0),
            self.ns.get_u64_or(keys::STATS_USER_COUNT, 0),
            self.ns.get_u64_or(keys::STATS_SUBSCRIBER_COUNT, 0),
            self.ns.get_f64_or(keys::STATS_MRR, 0.0),
        )?;
        Ok(AggregateStats {
            tenant_count,
            user_count,
            subscriber_count,
            mrr,
        })
    }

    /// Rebuild every counter from the indexes and records, then store them
    ///
    /// Tenant and user counts are index lengths; the subscriber count is a
    /// scan over subscription records; MRR sums the active tenants. The
    /// tenant count deliberately counts index entries rather than loadable
    /// records, so a tenant whose record is damaged still holds its slot.
    pub async fn recompute(&self) -> Result<AggregateStats, StoreError> {
        let (tenant_index, user_index) = tokio::try_join!(
            self.ns.get_json::<Vec<String>>(keys::TENANT_INDEX),
            self.ns.get_json::<Vec<String>>(keys::USER_INDEX),
        )?;
        let tenant_index = tenant_index.unwrap_or_default();
        let user_index = user_index.unwrap_or_default();

        let (tenants, subscriber_count) = tokio::try_join!(
            tenant::load_tenants_named(&self.ns, &tenant_index),
            self.count_subscribers(),
        )?;

        let stats = AggregateStats {
            tenant_count: tenant_index.len() as u64,
            user_count: user_index.len() as u64,
            subscriber_count,
            mrr: compute_mrr(&tenants, &self.pricing),
        };
        self.write(&stats).await?;

        debug!(
            tenants = stats.tenant_count,
            users = stats.user_count,
            subscribers = stats.subscriber_count,
            mrr = stats.mrr,
            "stats view rebuilt"
        );
        Ok(stats)
    }

    /// Count subscription records that are not canceled
    ///
    /// Index entries whose record is missing or undecodable are skipped, same
    /// as the tenant loader; a backend read fault propagates.
    async fn count_subscribers(&self) -> Result<u64, StoreError> {
        let index: Vec<String> = self
            .ns
            .get_json(keys::SUBSCRIPTION_INDEX)
            .await?
            .unwrap_or_default();

        let fetches = index.iter().map(|user_id| async move {
            match self
                .ns
                .get_json::<SubscriptionRecord>(&keys::subscription(user_id))
                .await
            {
                Ok(Some(record)) if record.status.counts_as_subscriber() => Ok(1),
                Ok(Some(_)) | Ok(None) => Ok(0),
                Err(e @ StoreError::Codec { .. }) => {
                    debug!(user_id = %user_id, error = %e, "subscription record undecodable, skipping");
                    Ok(0)
                }
                Err(e) => Err(e),
            }
        });

        let counts = futures::future::try_join_all(fetches).await?;
        Ok(counts.into_iter().sum())
    }

    async fn write(&self, stats: &AggregateStats) -> Result<(), StoreError> {
        tokio::try_join!(
            self.ns
                .put_raw(keys::STATS_TENANT_COUNT, stats.tenant_count.to_string()),
            self.ns
                .put_raw(keys::STATS_USER_COUNT, stats.user_count.to_string()),
            self.ns.put_raw(
                keys::STATS_SUBSCRIBER_COUNT,
                stats.subscriber_count.to_string(),
            ),
            self.ns.put_raw(keys::STATS_MRR, stats.mrr.to_string()),
        )?;
        Ok(())
    }
}

/// Monthly Recurring Revenue for a set of tenants
///
/// Each active subscriber contributes the monthly price, or the yearly price
/// spread over twelve months. The total is rounded to cents.
pub fn compute_mrr(tenants: &[Tenant], pricing: &Pricing) -> f64 {
    let total: f64 = tenants
        .iter()
        .filter(|t| t.is_active_subscriber())
        .map(|t| match t.billing_period {
            Some(BillingPeriod::Yearly) => pricing.yearly / 12.0,
            _ => pricing.monthly,
        })
        .sum();
    round_cents(total)
}

/// Round to two decimal places, the resolution of the revenue ledger
pub fn round_cents(value: f64) -> f64 {
    // adding zero collapses the -0.0 an empty sum produces
    (value * 100.0).round() / 100.0 + 0.0
}
