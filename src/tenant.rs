//! Tenant model
//!
//! The record types shared by the registry, the billing reconciler, and the
//! stats view, plus subdomain validation and the index fan-out loader.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{keys, Namespace};

/// Plan assigned when registration omits one
pub const DEFAULT_PLAN: &str = "pro";

/// Lifecycle status assigned at creation
pub const DEFAULT_STATUS: &str = "active";

/// One lowercase DNS label: 1-63 chars, alphanumeric, interior hyphens only
const SUBDOMAIN_PATTERN: &str = "^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$";

static SUBDOMAIN_RE: OnceLock<Regex> = OnceLock::new();

/// Whether `candidate` is acceptable as a subdomain claim
pub fn is_valid_subdomain(candidate: &str) -> bool {
    let re = SUBDOMAIN_RE
        .get_or_init(|| Regex::new(SUBDOMAIN_PATTERN).expect("subdomain pattern is valid"));
    re.is_match(candidate)
}

/// Billing-derived tenant standing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription in good standing
    Active,
    /// Last payment failed; the biller is retrying
    PastDue,
    /// Subscription ended
    Canceled,
}

impl SubscriptionStatus {
    /// Wire representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing cadence of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    /// Billed every month at the monthly price
    Monthly,
    /// Billed once a year; contributes price/12 to MRR
    Yearly,
}

/// One registered subdomain and its owning identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Claimed subdomain, the record key within a namespace
    pub subdomain: String,
    /// Owner identity from the external identity provider
    pub user_id: String,
    /// Contact email, first-write-wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Commercial plan tag
    pub plan: String,
    /// Lifecycle marker
    pub status: String,
    /// Billing standing, absent until a billing event arrives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
    /// Billing cadence reported by the biller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_period: Option<BillingPeriod>,
    /// First successful registration time
    pub created_at: DateTime<Utc>,
    /// Refreshed on every re-registration by the owner
    pub last_visit: DateTime<Utc>,
    /// Time of the last billing event that touched this tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_updated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Build a fresh record for a first-time claim
    pub fn new(
        subdomain: String,
        user_id: String,
        email: Option<String>,
        plan: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            subdomain,
            user_id,
            email,
            plan: plan.unwrap_or_else(|| DEFAULT_PLAN.to_string()),
            status: DEFAULT_STATUS.to_string(),
            subscription_status: None,
            billing_period: None,
            created_at: now,
            last_visit: now,
            subscription_updated_at: None,
        }
    }

    /// Whether the MRR formula counts this tenant
    pub fn is_active_subscriber(&self) -> bool {
        self.subscription_status == Some(SubscriptionStatus::Active)
    }
}

/// Load every tenant the index names, concurrently
///
/// Index entries whose record is missing or undecodable are skipped: index
/// and record drift is tolerated here, not repaired. A backend read fault is
/// not drift and propagates to the caller.
pub async fn load_tenants(ns: &Namespace) -> Result<Vec<Tenant>, StoreError> {
    let index: Vec<String> = ns.get_json(keys::TENANT_INDEX).await?.unwrap_or_default();
    load_tenants_named(ns, &index).await
}

/// Load the named tenant records, concurrently, skipping any that are
/// missing or undecodable
pub async fn load_tenants_named(
    ns: &Namespace,
    subdomains: &[String],
) -> Result<Vec<Tenant>, StoreError> {
    let fetches = subdomains.iter().map(|subdomain| async move {
        match ns.get_json::<Tenant>(&keys::tenant(subdomain)).await {
            Ok(Some(tenant)) => Ok(Some(tenant)),
            Ok(None) => {
                debug!(subdomain = %subdomain, "indexed tenant record missing, skipping");
                Ok(None)
            }
            Err(e @ StoreError::Codec { .. }) => {
                debug!(subdomain = %subdomain, error = %e, "indexed tenant record undecodable, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    });

    let records = futures::future::try_join_all(fetches).await?;
    Ok(records.into_iter().flatten().collect())
}
