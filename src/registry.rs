//! Tenant registry
//!
//! Registration-or-upsert for subdomain claims, plus the tenant listing. The
//! ownership rule is enforced here: the first user to claim a subdomain owns
//! it permanently, re-registration by the owner is an update, and anyone
//! else gets a conflict.
//!
//! First-time claims go through the store's create-if-absent primitive, so
//! two concurrent registrations for the same new subdomain resolve to one
//! winner; the loser re-reads the stored record and is handled as either an
//! update or a conflict, exactly as if it had arrived second.

use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, RegistrationError, StoreError};
use crate::stats::StatsView;
use crate::store::{keys, Namespace};
use crate::tenant::{is_valid_subdomain, load_tenants, Tenant};

/// Body of `POST /api/tenants/register`
///
/// Everything is optional at the parse layer; presence of `subdomain` and
/// `userId` is validated explicitly so the caller gets a structured 400
/// instead of a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Subdomain to claim
    #[serde(default)]
    pub subdomain: Option<String>,
    /// Claiming identity
    #[serde(default)]
    pub user_id: Option<String>,
    /// Contact email; stored on create, backfilled on update if absent
    #[serde(default)]
    pub email: Option<String>,
    /// Plan tag; defaults on create, never changed on update
    #[serde(default)]
    pub plan: Option<String>,
}

/// How a registration resolved
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    /// First successful claim of the subdomain
    Created(Tenant),
    /// Re-registration by the existing owner
    Updated(Tenant),
}

impl RegistrationOutcome {
    /// The stored tenant record after this registration
    pub fn tenant(&self) -> &Tenant {
        match self {
            RegistrationOutcome::Created(t) | RegistrationOutcome::Updated(t) => t,
        }
    }

    /// Whether this registration created the record
    pub fn was_created(&self) -> bool {
        matches!(self, RegistrationOutcome::Created(_))
    }
}

/// Registration and listing operations over one deployment namespace
pub struct TenantRegistry {
    ns: Namespace,
    stats: StatsView,
}

impl TenantRegistry {
    /// Bind the registry to a namespace and its stats view
    pub fn new(ns: Namespace, stats: StatsView) -> Self {
        Self { ns, stats }
    }

    /// Every registered tenant, in index order
    ///
    /// Index entries whose record is missing or unreadable are skipped.
    pub async fn list(&self) -> Result<Vec<Tenant>, Error> {
        let tenants = load_tenants(&self.ns).await?;
        debug!(count = tenants.len(), "tenants listed");
        Ok(tenants)
    }

    /// Register a subdomain, or refresh it for its existing owner
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::MissingField`] when `subdomain` or `userId` is
    ///   absent or empty
    /// - [`RegistrationError::InvalidSubdomain`] when the claim is not a
    ///   lowercase DNS label
    /// - [`RegistrationError::SubdomainTaken`] when a different user owns it
    pub async fn register(&self, req: RegisterRequest) -> Result<RegistrationOutcome, Error> {
        let (subdomain, user_id) = validate(&req)?;
        let key = keys::tenant(&subdomain);

        if let Some(existing) = self.ns.get_json::<Tenant>(&key).await? {
            return self.resolve_existing(existing, &user_id, req.email).await;
        }

        let tenant = Tenant::new(
            subdomain.clone(),
            user_id.clone(),
            req.email.clone(),
            req.plan.clone(),
        );
        let claimed = self.ns.put_json_if_absent(&key, &tenant).await?;
        if !claimed {
            // lost a concurrent first-claim race; whoever won is now the
            // stored owner and this request resolves against their record
            debug!(subdomain = %subdomain, "create race lost, resolving against stored record");
            return match self.ns.get_json::<Tenant>(&key).await? {
                Some(existing) => self.resolve_existing(existing, &user_id, req.email).await,
                None => Err(StoreError::backend(
                    "create-if-absent reported a conflict but no record exists",
                )
                .into()),
            };
        }

        self.ns.index_append(keys::TENANT_INDEX, &subdomain).await?;
        self.ns
            .index_append(&keys::owner(&user_id), &subdomain)
            .await?;
        self.stats.recompute().await?;

        info!(subdomain = %subdomain, user_id = %user_id, plan = %tenant.plan, "tenant registered");
        counter!("edgehost_registrations_total", "outcome" => "created").increment(1);
        Ok(RegistrationOutcome::Created(tenant))
    }

    /// Apply the update-or-conflict rules against a stored record
    async fn resolve_existing(
        &self,
        mut tenant: Tenant,
        user_id: &str,
        email: Option<String>,
    ) -> Result<RegistrationOutcome, Error> {
        if tenant.user_id != user_id {
            warn!(
                subdomain = %tenant.subdomain,
                owner = %tenant.user_id,
                claimant = %user_id,
                "registration rejected, subdomain already owned"
            );
            counter!("edgehost_registrations_total", "outcome" => "conflict").increment(1);
            return Err(RegistrationError::SubdomainTaken(tenant.subdomain).into());
        }

        tenant.last_visit = Utc::now();
        if tenant.email.is_none() {
            // first-write-wins: an email is backfilled, never replaced
            tenant.email = email;
        }
        self.ns
            .put_json(&keys::tenant(&tenant.subdomain), &tenant)
            .await?;

        // heal index entries for records that predate them or drifted
        let index_changed = self
            .ns
            .index_append(keys::TENANT_INDEX, &tenant.subdomain)
            .await?;
        let owner_changed = self
            .ns
            .index_append(&keys::owner(user_id), &tenant.subdomain)
            .await?;
        if index_changed || owner_changed {
            self.stats.recompute().await?;
        }

        info!(subdomain = %tenant.subdomain, user_id = %user_id, "tenant re-registered");
        counter!("edgehost_registrations_total", "outcome" => "updated").increment(1);
        Ok(RegistrationOutcome::Updated(tenant))
    }
}

fn validate(req: &RegisterRequest) -> Result<(String, String), RegistrationError> {
    let subdomain = req
        .subdomain
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(RegistrationError::MissingField("subdomain"))?;
    let user_id = req
        .user_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(RegistrationError::MissingField("userId"))?;

    if !is_valid_subdomain(subdomain) {
        return Err(RegistrationError::InvalidSubdomain(subdomain.to_string()));
    }
    Ok((subdomain.to_string(), user_id.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::Pricing;
    use crate::store::InMemoryStore;

    fn registry() -> TenantRegistry {
        let ns = Namespace::new(Arc::new(InMemoryStore::new()), "demo.example");
        let stats = StatsView::new(ns.clone(), Pricing::default());
        TenantRegistry::new(ns, stats)
    }

    fn request(subdomain: &str, user_id: &str) -> RegisterRequest {
        RegisterRequest {
            subdomain: Some(subdomain.to_string()),
            user_id: Some(user_id.to_string()),
            ..RegisterRequest::default()
        }
    }

    async fn tenant_index(reg: &TenantRegistry) -> Vec<String> {
        reg.ns
            .get_json(keys::TENANT_INDEX)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    // ==================== Validation Tests ====================

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let reg = registry();

        let err = reg.register(RegisterRequest::default()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Registration(RegistrationError::MissingField("subdomain"))
        ));

        let err = reg
            .register(RegisterRequest {
                subdomain: Some("alice".to_string()),
                ..RegisterRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registration(RegistrationError::MissingField("userId"))
        ));

        // empty strings count as missing
        let err = reg
            .register(RegisterRequest {
                subdomain: Some(String::new()),
                user_id: Some("u1".to_string()),
                ..RegisterRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registration(RegistrationError::MissingField("subdomain"))
        ));
    }

    #[tokio::test]
    async fn malformed_subdomains_are_rejected() {
        let reg = registry();
        for bad in ["Alice", "al ice", "-alice", "al.ice"] {
            let err = reg.register(request(bad, "u1")).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    Error::Registration(RegistrationError::InvalidSubdomain(_))
                ),
                "'{bad}' should be rejected"
            );
        }
    }

    // ==================== Create Path Tests ====================

    #[tokio::test]
    async fn first_registration_creates_with_defaults() {
        let reg = registry();
        let outcome = reg.register(request("alice", "u1")).await.unwrap();

        assert!(outcome.was_created());
        let tenant = outcome.tenant();
        assert_eq!(tenant.subdomain, "alice");
        assert_eq!(tenant.user_id, "u1");
        assert_eq!(tenant.plan, "pro");
        assert_eq!(tenant.status, "active");

        assert_eq!(tenant_index(&reg).await, vec!["alice".to_string()]);
        let owned: Vec<String> = reg.ns.get_json(&keys::owner("u1")).await.unwrap().unwrap();
        assert_eq!(owned, vec!["alice".to_string()]);

        assert_eq!(reg.stats.read().await.unwrap().tenant_count, 1);
    }

    #[tokio::test]
    async fn supplied_email_and_plan_are_stored() {
        let reg = registry();
        let outcome = reg
            .register(RegisterRequest {
                subdomain: Some("alice".to_string()),
                user_id: Some("u1".to_string()),
                email: Some("a@example.com".to_string()),
                plan: Some("enterprise".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.tenant().email.as_deref(), Some("a@example.com"));
        assert_eq!(outcome.tenant().plan, "enterprise");
    }

    // ==================== Ownership Tests ====================

    #[tokio::test]
    async fn foreign_claim_conflicts_and_owner_is_unchanged() {
        let reg = registry();
        reg.register(request("alice", "u1")).await.unwrap();

        let err = reg.register(request("alice", "u2")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Registration(RegistrationError::SubdomainTaken(_))
        ));

        let stored: Tenant = reg
            .ns
            .get_json(&keys::tenant("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_id, "u1");
        assert_eq!(tenant_index(&reg).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_claims_produce_one_owner() {
        let reg = Arc::new(registry());

        let attempts = (0..8).map(|i| {
            let reg = reg.clone();
            async move { reg.register(request("alice", &format!("u{i}"))).await }
        });
        let results = futures::future::join_all(attempts).await;

        let created = results
            .iter()
            .filter(|r| matches!(r, Ok(o) if o.was_created()))
            .count();
        let conflicts = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(Error::Registration(RegistrationError::SubdomainTaken(_)))
                )
            })
            .count();

        assert_eq!(created, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(tenant_index(&reg).await.len(), 1);
    }

    // ==================== Update Path Tests ====================

    #[tokio::test]
    async fn reregistration_updates_without_duplicating_the_index() {
        let reg = registry();
        let first = reg.register(request("alice", "u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = reg.register(request("alice", "u1")).await.unwrap();
        assert!(!second.was_created());
        assert!(second.tenant().last_visit > first.tenant().last_visit);
        assert_eq!(second.tenant().created_at, first.tenant().created_at);

        assert_eq!(tenant_index(&reg).await, vec!["alice".to_string()]);
        assert_eq!(reg.stats.read().await.unwrap().tenant_count, 1);
    }

    #[tokio::test]
    async fn email_is_backfilled_but_never_overwritten() {
        let reg = registry();
        reg.register(request("alice", "u1")).await.unwrap();

        // backfill onto a record that has no email yet
        let outcome = reg
            .register(RegisterRequest {
                email: Some("first@example.com".to_string()),
                ..request("alice", "u1")
            })
            .await
            .unwrap();
        assert_eq!(
            outcome.tenant().email.as_deref(),
            Some("first@example.com")
        );

        // a later email does not replace the stored one
        let outcome = reg
            .register(RegisterRequest {
                email: Some("second@example.com".to_string()),
                ..request("alice", "u1")
            })
            .await
            .unwrap();
        assert_eq!(
            outcome.tenant().email.as_deref(),
            Some("first@example.com")
        );
    }

    #[tokio::test]
    async fn update_keeps_plan_and_subscription_state() {
        let reg = registry();
        reg.register(RegisterRequest {
            plan: Some("enterprise".to_string()),
            ..request("alice", "u1")
        })
        .await
        .unwrap();

        // plan on a re-registration is ignored; the stored plan stands
        let outcome = reg
            .register(RegisterRequest {
                plan: Some("free".to_string()),
                ..request("alice", "u1")
            })
            .await
            .unwrap();
        assert_eq!(outcome.tenant().plan, "enterprise");
    }

    // ==================== Listing Tests ====================

    #[tokio::test]
    async fn list_returns_tenants_in_registration_order() {
        let reg = registry();
        reg.register(request("alice", "u1")).await.unwrap();
        reg.register(request("bob", "u2")).await.unwrap();

        let names: Vec<String> = reg
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.subdomain)
            .collect();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn list_of_empty_namespace_is_empty() {
        let reg = registry();
        assert!(reg.list().await.unwrap().is_empty());
    }
}
