//! Gateway callback events.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use studypass_core::{AccountType, BillingPatch, BillingStatus, PaymentMethod, PlanTier, UserId};

use super::GatewayError;

/// Event types the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionCompleted,
    PaymentSucceeded,
    PaymentFailed,
}

impl EventKind {
    /// Map a wire event type, `None` for types we ignore.
    #[must_use]
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" => Some(Self::SessionCompleted),
            "payment.succeeded" => Some(Self::PaymentSucceeded),
            "payment.failed" => Some(Self::PaymentFailed),
            _ => None,
        }
    }
}

/// A signed callback from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds at which the gateway created the event.
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

/// The session or payment the event is about.
#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

/// Metadata attached at checkout and echoed back on every event.
///
/// Gateways stringify metadata values, so numbers may arrive either way.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub duration_days: Option<Value>,
}

impl GatewayEvent {
    /// Parse an event from a verified request body.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidPayload` if the body is not an event.
    pub fn from_slice(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
    }

    /// The event kind, `None` for event types that carry no billing change.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_type(&self.event_type)
    }

    /// Translate the event into a billing merge for one user.
    ///
    /// Returns `Ok(None)` for ignored event types. Unrecognized plan or
    /// method values are left out of the patch, so they can never trigger a
    /// promotion. The paid period is measured from the event's own creation
    /// time, which keeps redelivered events producing identical patches.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidPayload` if the metadata has no usable
    /// user id or the creation time is out of range.
    pub fn to_billing_patch(&self) -> Result<Option<(UserId, BillingPatch)>, GatewayError> {
        let Some(kind) = self.kind() else {
            return Ok(None);
        };

        let object = &self.data.object;
        let metadata = &object.metadata;

        let user_id = metadata
            .user_id
            .as_ref()
            .and_then(int_value)
            .and_then(|id| i32::try_from(id).ok())
            .map(UserId::new)
            .ok_or_else(|| {
                GatewayError::InvalidPayload(format!("event {} has no valid userId", self.id))
            })?;

        let created = DateTime::<Utc>::from_timestamp(self.created, 0).ok_or_else(|| {
            GatewayError::InvalidPayload(format!("event {} has invalid created time", self.id))
        })?;

        let plan = metadata.plan.as_deref().and_then(|raw| {
            let parsed = raw.parse::<PlanTier>().ok();
            if parsed.is_none() {
                warn!(event_id = %self.id, plan = raw, "Unknown plan in event");
            }
            parsed
        });
        let method = metadata.method.as_deref().and_then(|raw| {
            let parsed = raw.parse::<PaymentMethod>().ok();
            if parsed.is_none() {
                warn!(event_id = %self.id, method = raw, "Unknown method in event");
            }
            parsed
        });
        let period_end = metadata
            .duration_days
            .as_ref()
            .and_then(int_value)
            .filter(|days| *days > 0)
            .and_then(Duration::try_days)
            .and_then(|span| created.checked_add_signed(span));

        let patch = match kind {
            EventKind::SessionCompleted => {
                let paid = object.payment_status.as_deref() == Some("paid");
                BillingPatch {
                    method,
                    status: Some(if paid {
                        BillingStatus::Active
                    } else {
                        BillingStatus::Pending
                    }),
                    current_plan: plan,
                    current_period_end: period_end.filter(|_| paid),
                    provider_session_id: Some(object.id.clone()),
                    provider_payment_id: object.payment_intent.clone(),
                    ..Default::default()
                }
            }
            EventKind::PaymentSucceeded => BillingPatch {
                account_type: Some(AccountType::Premium),
                method,
                status: Some(BillingStatus::Active),
                current_plan: plan,
                current_period_end: period_end,
                provider_payment_id: Some(object.id.clone()),
                ..Default::default()
            },
            EventKind::PaymentFailed => BillingPatch {
                status: Some(BillingStatus::PastDue),
                provider_payment_id: Some(object.id.clone()),
                ..Default::default()
            },
        };

        Ok(Some((user_id, patch)))
    }
}

fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
