//! Property-based tests for worker domain types
//!
//! Covers subdomain validation, logical key construction, billing event
//! classification, webhook signature parsing, and MRR arithmetic with
//! generated inputs rather than hand-picked fixtures.

use proptest::prelude::*;
use std::collections::HashSet;

use edgehost::billing::{BillingEvent, BillingEventKind, SignatureHeader, WebhookVerifier};
use edgehost::config::Pricing;
use edgehost::stats::{compute_mrr, round_cents};
use edgehost::store::keys;
use edgehost::tenant::{is_valid_subdomain, BillingPeriod, SubscriptionStatus, Tenant};

// ============================================================================
// ARBITRARY IMPLEMENTATIONS FOR TENANT TYPES
// ============================================================================

/// Generate subdomains that satisfy the registration rules
pub fn arb_subdomain() -> impl Strategy<Value = String> {
    "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?"
}

/// Generate labels that violate at least one registration rule
pub fn arb_invalid_subdomain() -> impl Strategy<Value = String> {
    prop_oneof![
        // uppercase anywhere
        "[A-Z][a-zA-Z0-9]{0,10}",
        // leading or trailing hyphen
        "-[a-z0-9]{1,10}",
        "[a-z0-9]{1,10}-",
        // separators that never belong in a label
        "[a-z0-9]{1,5}\\.[a-z0-9]{1,5}",
        "[a-z0-9]{1,5}_[a-z0-9]{1,5}",
        // longer than a DNS label allows
        "[a-z0-9]{64,80}",
    ]
}

pub fn arb_subscription_status() -> impl Strategy<Value = SubscriptionStatus> {
    prop_oneof![
        Just(SubscriptionStatus::Active),
        Just(SubscriptionStatus::PastDue),
        Just(SubscriptionStatus::Canceled),
    ]
}

pub fn arb_billing_period() -> impl Strategy<Value = BillingPeriod> {
    prop_oneof![Just(BillingPeriod::Monthly), Just(BillingPeriod::Yearly)]
}

/// Generate a tenant record with arbitrary subscription standing
pub fn arb_tenant() -> impl Strategy<Value = Tenant> {
    (
        arb_subdomain(),
        "[a-z0-9]{1,8}",
        proptest::option::of(arb_subscription_status()),
        proptest::option::of(arb_billing_period()),
    )
        .prop_map(|(subdomain, user_id, status, period)| {
            let mut tenant = Tenant::new(subdomain, user_id, None, None);
            tenant.subscription_status = status;
            tenant.billing_period = period;
            tenant
        })
}

/// Generate a tenant that must not contribute to MRR
pub fn arb_inactive_tenant() -> impl Strategy<Value = Tenant> {
    (
        arb_subdomain(),
        "[a-z0-9]{1,8}",
        proptest::option::of(prop_oneof![
            Just(SubscriptionStatus::PastDue),
            Just(SubscriptionStatus::Canceled),
        ]),
        proptest::option::of(arb_billing_period()),
    )
        .prop_map(|(subdomain, user_id, status, period)| {
            let mut tenant = Tenant::new(subdomain, user_id, None, None);
            tenant.subscription_status = status;
            tenant.billing_period = period;
            tenant
        })
}

fn active_tenant(label: String, period: BillingPeriod) -> Tenant {
    let mut tenant = Tenant::new(label, "u1".to_string(), None, None);
    tenant.subscription_status = Some(SubscriptionStatus::Active);
    tenant.billing_period = Some(period);
    tenant
}

// ============================================================================
// ARBITRARY IMPLEMENTATIONS FOR BILLING EVENTS
// ============================================================================

/// Generate the event type strings the reconciler handles
pub fn arb_known_event_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("user.created".to_string()),
        Just("user.deleted".to_string()),
        Just("subscription.created".to_string()),
        Just("subscription.updated".to_string()),
        Just("subscription.canceled".to_string()),
        Just("invoice.paid".to_string()),
        Just("invoice.payment_failed".to_string()),
    ]
}

/// Generate event type strings outside the handled families
pub fn arb_unknown_event_type() -> impl Strategy<Value = String> {
    "(payout|charge|refund|transfer)\\.[a-z_]{2,12}"
}

/// Generate small JSON objects to stand in for event payloads
pub fn arb_payload_object() -> impl Strategy<Value = serde_json::Value> {
    proptest::collection::btree_map("[a-z]{1,6}", any::<u32>(), 0..4)
        .prop_map(|fields| serde_json::json!(fields))
}

// ============================================================================
// ARBITRARY IMPLEMENTATIONS FOR PRICING
// ============================================================================

/// Generate prices aligned to whole cents, the way plans are configured
pub fn arb_cent_price() -> impl Strategy<Value = f64> {
    (0u32..100_000).prop_map(|cents| f64::from(cents) / 100.0)
}

pub fn arb_pricing() -> impl Strategy<Value = Pricing> {
    (arb_cent_price(), arb_cent_price()).prop_map(|(monthly, yearly)| Pricing { monthly, yearly })
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // ========================================================================
    // Subdomain Validation Invariants
    // ========================================================================

    #[test]
    fn prop_generated_valid_subdomains_accepted(subdomain in arb_subdomain()) {
        prop_assert!(is_valid_subdomain(&subdomain),
            "rule-conforming label rejected: {subdomain:?}");
    }

    #[test]
    fn prop_generated_invalid_subdomains_rejected(subdomain in arb_invalid_subdomain()) {
        prop_assert!(!is_valid_subdomain(&subdomain),
            "rule-violating label accepted: {subdomain:?}");
    }

    #[test]
    fn prop_accepted_subdomains_are_lowercase_labels(candidate in "[a-zA-Z0-9_.-]{0,70}") {
        if is_valid_subdomain(&candidate) {
            prop_assert!(!candidate.is_empty());
            prop_assert!(candidate.len() <= 63);
            prop_assert_eq!(candidate.clone(), candidate.to_ascii_lowercase());
            prop_assert!(!candidate.starts_with('-'));
            prop_assert!(!candidate.ends_with('-'));
        }
    }

    // ========================================================================
    // Logical Key Invariants
    // ========================================================================

    #[test]
    fn prop_record_keys_never_collide_across_types(id in "[a-z0-9_.-]{1,16}") {
        let all = [
            keys::tenant(&id),
            keys::user(&id),
            keys::subscription(&id),
            keys::invoice(&id),
            keys::owner(&id),
            keys::revenue(&id),
        ];
        let distinct: HashSet<&String> = all.iter().collect();
        prop_assert_eq!(distinct.len(), all.len(),
            "two record families mapped id {:?} to the same key", id);
    }

    #[test]
    fn prop_record_keys_are_injective(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
        prop_assert_eq!(keys::tenant(&a) == keys::tenant(&b), a == b);
        prop_assert_eq!(keys::owner(&a) == keys::owner(&b), a == b);
    }

    // ========================================================================
    // Billing Event Classification
    // ========================================================================

    #[test]
    fn prop_known_event_kinds_roundtrip(event_type in arb_known_event_type()) {
        let kind: BillingEventKind = event_type.parse().unwrap();
        prop_assert!(kind.is_known());
        prop_assert_eq!(kind.as_str(), event_type);
    }

    #[test]
    fn prop_unhandled_event_types_collapse_to_unknown(event_type in arb_unknown_event_type()) {
        let kind: BillingEventKind = event_type.parse().unwrap();
        prop_assert_eq!(kind, BillingEventKind::Unknown);
        prop_assert!(!kind.is_known());
    }

    #[test]
    fn prop_envelope_kind_matches_type_string(
        event_type in prop_oneof![arb_known_event_type(), arb_unknown_event_type()],
        data in arb_payload_object(),
    ) {
        let raw = serde_json::json!({ "type": event_type, "data": data }).to_string();
        let event = BillingEvent::from_bytes(raw.as_bytes()).unwrap();
        let expected: BillingEventKind = event_type.parse().unwrap();
        prop_assert_eq!(event.kind(), expected);
    }

    // ========================================================================
    // Webhook Signature Parsing
    // ========================================================================

    #[test]
    fn prop_signature_header_roundtrips(timestamp in any::<i64>(), hex_sig in "[0-9a-f]{64}") {
        let header = SignatureHeader::parse(&format!("t={timestamp},v1={hex_sig}")).unwrap();
        prop_assert_eq!(header.timestamp, timestamp);
        prop_assert_eq!(header.signature, hex_sig);
    }

    #[test]
    fn prop_signature_parse_never_accepts_incomplete_headers(raw in "[ -~]{0,40}") {
        if SignatureHeader::parse(&raw).is_ok() {
            prop_assert!(raw.contains("t="));
            prop_assert!(raw.contains("v1="));
        }
    }

    #[test]
    fn prop_fresh_signatures_verify_only_with_their_secret(
        secret in "[a-zA-Z0-9]{8,32}",
        suffix in "[a-z]{1,4}",
        body in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let timestamp = chrono::Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(&body);
        let header = format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()));

        let verifier = WebhookVerifier::new(secret.clone());
        prop_assert!(verifier.verify(&header, &body).is_ok());

        let other = WebhookVerifier::new(format!("{secret}{suffix}"));
        prop_assert!(other.verify(&header, &body).is_err(),
            "signature accepted under a different secret");
    }

    // ========================================================================
    // MRR Arithmetic
    // ========================================================================

    #[test]
    fn prop_round_cents_is_idempotent(value in -1_000_000.0f64..1_000_000.0) {
        let once = round_cents(value);
        prop_assert_eq!(round_cents(once), once);
    }

    #[test]
    fn prop_round_cents_stays_within_half_a_cent(value in -1_000_000.0f64..1_000_000.0) {
        prop_assert!((round_cents(value) - value).abs() <= 0.0051);
    }

    #[test]
    fn prop_mrr_of_no_tenants_is_zero(pricing in arb_pricing()) {
        let mrr = compute_mrr(&[], &pricing);
        prop_assert_eq!(mrr, 0.0);
        prop_assert!(mrr.is_sign_positive(), "empty sum must not serve -0.0");
    }

    #[test]
    fn prop_mrr_never_negative(
        tenants in proptest::collection::vec(arb_tenant(), 0..10),
        pricing in arb_pricing(),
    ) {
        let mrr = compute_mrr(&tenants, &pricing);
        prop_assert!(mrr >= 0.0);
        prop_assert!(mrr.is_sign_positive(), "mrr must not serve -0.0");
    }

    #[test]
    fn prop_inactive_tenants_contribute_nothing(
        tenants in proptest::collection::vec(arb_inactive_tenant(), 0..10),
        pricing in arb_pricing(),
    ) {
        let mrr = compute_mrr(&tenants, &pricing);
        prop_assert_eq!(mrr, 0.0);
        prop_assert!(mrr.is_sign_positive(), "filtered-out tenants must not serve -0.0");
    }

    #[test]
    fn prop_monthly_subscribers_sum_exactly(count in 0usize..12, pricing in arb_pricing()) {
        let tenants: Vec<Tenant> = (0..count)
            .map(|i| active_tenant(format!("t{i}"), BillingPeriod::Monthly))
            .collect();
        let total = count as f64 * pricing.monthly;
        prop_assert_eq!(compute_mrr(&tenants, &pricing), round_cents(total));
    }

    #[test]
    fn prop_yearly_subscribers_amortize_over_twelve_months(
        count in 0usize..12,
        pricing in arb_pricing(),
    ) {
        let tenants: Vec<Tenant> = (0..count)
            .map(|i| active_tenant(format!("t{i}"), BillingPeriod::Yearly))
            .collect();
        let expected = count as f64 * (pricing.yearly / 12.0);
        prop_assert!((compute_mrr(&tenants, &pricing) - expected).abs() < 0.011);
    }

    // ========================================================================
    // Tenant Wire Format
    // ========================================================================

    #[test]
    fn prop_tenant_wire_format_uses_camel_case(tenant in arb_tenant()) {
        let value = serde_json::to_value(&tenant).unwrap();
        prop_assert!(value.get("subdomain").is_some());
        prop_assert!(value.get("userId").is_some());
        prop_assert!(value.get("createdAt").is_some());
        prop_assert!(value.get("lastVisit").is_some());
        prop_assert!(value.get("user_id").is_none(),
            "snake_case leaked into the wire format");
        // optional fields are omitted, never null
        if tenant.email.is_none() {
            prop_assert!(value.get("email").is_none());
        }
        if tenant.subscription_status.is_none() {
            prop_assert!(value.get("subscriptionStatus").is_none());
        }
    }

    #[test]
    fn prop_tenant_roundtrips_through_json(tenant in arb_tenant()) {
        let raw = serde_json::to_string(&tenant).unwrap();
        let parsed: Tenant = serde_json::from_str(&raw).unwrap();
        prop_assert_eq!(parsed.subdomain, tenant.subdomain);
        prop_assert_eq!(parsed.user_id, tenant.user_id);
        prop_assert_eq!(parsed.subscription_status, tenant.subscription_status);
        prop_assert_eq!(parsed.billing_period, tenant.billing_period);
    }
}
