//! Billing webhook
//!
//! Subscription events arrive signed with HMAC-SHA256 (hex) over the raw
//! body. Nothing in the payload is trusted before the signature checks out.
//! Verified plan changes go through the [`PlanDirectory`], which invalidates
//! the cached tier.

use crate::error::BillingError;
use crate::plans::PlanDirectory;
use hmac::{Hmac, Mac};
use motion_ledger::{OwnerId, PlanTier};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Verified subscription event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub event: String,
    pub subscription_id: Option<String>,
    pub plan_id: Option<String>,
    pub owner_id: Option<OwnerId>,
}

/// Result of handling a verified event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    PlanChanged { owner_id: OwnerId, tier: PlanTier },
    Ignored { event: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    payload: RawPayload,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    subscription: Option<RawWrapper>,
}

#[derive(Debug, Deserialize)]
struct RawWrapper {
    entity: RawSubscription,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: Option<String>,
    plan_id: Option<String>,
    #[serde(default)]
    notes: HashMap<String, serde_json::Value>,
}

enum PlanAction {
    Activate,
    Downgrade,
}

fn action_for(event: &str) -> Option<PlanAction> {
    match event {
        "subscription.activated" | "subscription.charged" | "subscription.resumed" => Some(PlanAction::Activate),
        "subscription.cancelled" | "subscription.halted" | "subscription.completed" => Some(PlanAction::Downgrade),
        _ => None,
    }
}

/// Hex HMAC-SHA256 of `body`
///
/// # Errors
/// Returns `MissingSecret` for an empty secret
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Result<String, BillingError> {
    let mut mac = new_mac(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` (hex) against `body` in constant time
///
/// # Errors
/// - `MissingSecret` for an empty secret
/// - `InvalidSignature` on mismatch or non-hex input
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> Result<(), BillingError> {
    let expected = hex::decode(signature.trim()).map_err(|_| BillingError::InvalidSignature)?;
    let mut mac = new_mac(secret)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| BillingError::InvalidSignature)
}

fn new_mac(secret: &[u8]) -> Result<HmacSha256, BillingError> {
    if secret.is_empty() {
        return Err(BillingError::MissingSecret);
    }
    HmacSha256::new_from_slice(secret).map_err(|_| BillingError::MissingSecret)
}

/// Parse a verified body
///
/// # Errors
/// Returns `MalformedPayload` if the JSON shape is wrong, `InvalidOwner` if
/// `notes.uid` is not a valid owner id
pub fn parse_event(body: &[u8]) -> Result<BillingEvent, BillingError> {
    let raw: RawEvent = serde_json::from_slice(body).map_err(|e| BillingError::MalformedPayload(e.to_string()))?;
    let subscription = raw.payload.subscription.map(|s| s.entity);

    let owner_id = subscription
        .as_ref()
        .and_then(|s| s.notes.get("uid"))
        .and_then(serde_json::Value::as_str)
        .map(OwnerId::parse)
        .transpose()?;

    Ok(BillingEvent {
        event: raw.event,
        subscription_id: subscription.as_ref().and_then(|s| s.id.clone()),
        plan_id: subscription.and_then(|s| s.plan_id),
        owner_id,
    })
}

/// Verifies and applies subscription events
#[derive(Debug, Clone)]
pub struct BillingWebhook {
    secret: Option<Vec<u8>>,
    plan_ids: HashMap<String, PlanTier>,
    directory: PlanDirectory,
}

impl BillingWebhook {
    #[must_use]
    pub fn new(secret: Option<String>, plan_ids: HashMap<String, PlanTier>, directory: PlanDirectory) -> Self {
        Self {
            secret: secret.map(String::into_bytes),
            plan_ids,
            directory,
        }
    }

    /// Verify signature and parse, without side effects
    ///
    /// # Errors
    /// See [`verify_signature`] and [`parse_event`]
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<BillingEvent, BillingError> {
        let secret = self.secret.as_deref().ok_or(BillingError::MissingSecret)?;
        verify_signature(secret, body, signature)?;
        parse_event(body)
    }

    /// Verify, then apply a plan change if the event calls for one
    ///
    /// # Errors
    /// - signature and payload errors from [`Self::verify`]
    /// - `MissingOwner` for a plan event without `notes.uid`
    /// - `Store` if the plan cannot be persisted
    pub async fn handle(&self, body: &[u8], signature: &str) -> Result<WebhookOutcome, BillingError> {
        let event = self.verify(body, signature)?;

        let Some(action) = action_for(&event.event) else {
            tracing::debug!("Ignoring billing event {}", event.event);
            return Ok(WebhookOutcome::Ignored {
                reason: "event does not affect plans".to_string(),
                event: event.event,
            });
        };
        let owner_id = event.owner_id.clone().ok_or(BillingError::MissingOwner)?;

        let tier = match action {
            PlanAction::Downgrade => PlanTier::Free,
            PlanAction::Activate => {
                let mapped = event.plan_id.as_deref().and_then(|p| self.plan_ids.get(p)).copied();
                let Some(tier) = mapped else {
                    tracing::warn!(
                        "Billing event {} for {} has unmapped plan {:?}",
                        event.event,
                        owner_id,
                        event.plan_id
                    );
                    return Ok(WebhookOutcome::Ignored {
                        event: event.event,
                        reason: "unknown plan id".to_string(),
                    });
                };
                tier
            }
        };

        self.directory.set_tier(&owner_id, tier).await?;
        Ok(WebhookOutcome::PlanChanged { owner_id, tier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::InMemoryPlanStore;
    use std::sync::Arc;
    use std::time::Duration;

    const SECRET: &str = "whsec_test";

    fn event(name: &str, plan_id: &str, uid: &str) -> Vec<u8> {
        serde_json::json!({
            "event": name,
            "payload": { "subscription": { "entity": {
                "id": "sub_1",
                "plan_id": plan_id,
                "notes": { "uid": uid }
            }}}
        })
        .to_string()
        .into_bytes()
    }

    fn webhook() -> BillingWebhook {
        let directory = PlanDirectory::new(Arc::new(InMemoryPlanStore::new()), 100, Duration::from_secs(60));
        BillingWebhook::new(
            Some(SECRET.to_string()),
            HashMap::from([("plan_pro".to_string(), PlanTier::Pro), ("plan_plus".to_string(), PlanTier::Plus)]),
            directory,
        )
    }

    #[test]
    fn signature_round_trip() {
        let body = b"{\"event\":\"ping\"}";
        let sig = sign_payload(SECRET.as_bytes(), body).unwrap();
        assert_eq!(sig.len(), 64);
        verify_signature(SECRET.as_bytes(), body, &sig).unwrap();
        assert!(matches!(
            verify_signature(SECRET.as_bytes(), b"{\"event\":\"pong\"}", &sig),
            Err(BillingError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature(SECRET.as_bytes(), body, "not-hex"),
            Err(BillingError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn activation_upgrades_and_cancellation_downgrades() {
        let hook = webhook();
        let alice = OwnerId::parse("alice").unwrap();

        let body = event("subscription.activated", "plan_pro", "alice");
        let sig = sign_payload(SECRET.as_bytes(), &body).unwrap();
        let outcome = hook.handle(&body, &sig).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::PlanChanged { owner_id: alice.clone(), tier: PlanTier::Pro });
        assert_eq!(hook.directory.tier_of(&alice).await.unwrap(), PlanTier::Pro);

        let body = event("subscription.cancelled", "plan_pro", "alice");
        let sig = sign_payload(SECRET.as_bytes(), &body).unwrap();
        hook.handle(&body, &sig).await.unwrap();
        assert_eq!(hook.directory.tier_of(&alice).await.unwrap(), PlanTier::Free);
    }

    #[tokio::test]
    async fn forged_event_changes_nothing() {
        let hook = webhook();
        let body = event("subscription.activated", "plan_pro", "mallory");
        let sig = sign_payload(b"wrong-secret", &body).unwrap();

        assert!(matches!(hook.handle(&body, &sig).await, Err(BillingError::InvalidSignature)));
        let tier = hook.directory.tier_of(&OwnerId::parse("mallory").unwrap()).await.unwrap();
        assert_eq!(tier, PlanTier::Free);
    }

    #[tokio::test]
    async fn unrelated_and_unmapped_events_are_ignored() {
        let hook = webhook();

        let body = event("payment.captured", "plan_pro", "alice");
        let sig = sign_payload(SECRET.as_bytes(), &body).unwrap();
        assert!(matches!(hook.handle(&body, &sig).await.unwrap(), WebhookOutcome::Ignored { .. }));

        let body = event("subscription.charged", "plan_gold", "alice");
        let sig = sign_payload(SECRET.as_bytes(), &body).unwrap();
        assert!(matches!(hook.handle(&body, &sig).await.unwrap(), WebhookOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn missing_secret_rejects_everything() {
        let directory = PlanDirectory::new(Arc::new(InMemoryPlanStore::new()), 10, Duration::from_secs(60));
        let hook = BillingWebhook::new(None, HashMap::new(), directory);
        assert!(matches!(hook.handle(b"{}", "00").await, Err(BillingError::MissingSecret)));
    }

    #[test]
    fn plan_event_without_owner_is_parsed_as_ownerless() {
        let body = br#"{"event":"subscription.activated","payload":{"subscription":{"entity":{"plan_id":"plan_pro"}}}}"#;
        let parsed = parse_event(body).unwrap();
        assert_eq!(parsed.owner_id, None);
        assert_eq!(parsed.plan_id.as_deref(), Some("plan_pro"));
    }
}
