//! Notification dispatcher.
//!
//! Delivers the per-subscriber decisions of one alert run. All deliveries
//! run concurrently and are independent: a failure for one subscriber is
//! recorded and never stops the others.
//!
//! | Push service answer | Outcome   | Side effect                    |
//! |---------------------|-----------|--------------------------------|
//! | accepted            | `Sent`    | none                           |
//! | 404 / 410           | `Expired` | subscriber marked inactive     |
//! | anything else       | `Failed`  | none, retried on the next run  |
//! | (no alert / cooldown) | `Skipped` | none                         |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alerting::{PushPayload, SubscriberDecision};
use crate::model::{AlertType, Subscriber};
use crate::storage::Storage;

/// Why a push could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The push service no longer knows this subscription.
    #[error("subscription gone (HTTP {status})")]
    Gone { status: u16 },

    #[error("push delivery failed: {0}")]
    Transient(String),
}

/// Delivers a payload to one subscriber's push endpoint.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscriber: &Subscriber, payload: &PushPayload) -> Result<(), PushError>;
}

/// Push delivery through an HTTP relay that holds the VAPID keys and performs
/// the Web Push encryption.
///
/// Each delivery is a `POST` of `{"subscription": .., "payload": ..}`. The
/// relay answers with the push service's status code.
#[derive(Clone)]
pub struct RelayPushSender {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl RelayPushSender {
    pub fn new(url: &str, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            token,
        })
    }
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    subscription: &'a serde_json::Value,
    payload: &'a PushPayload,
}

#[async_trait]
impl PushSender for RelayPushSender {
    async fn send(&self, subscriber: &Subscriber, payload: &PushPayload) -> Result<(), PushError> {
        let mut request = self.client.post(&self.url).json(&RelayRequest {
            subscription: &subscriber.credentials,
            payload,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Transient(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => Ok(()),
            404 | 410 => Err(PushError::Gone {
                status: status.as_u16(),
            }),
            code => Err(PushError::Transient(format!("HTTP {code}"))),
        }
    }
}

/// What happened for a single subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent(AlertType),
    Skipped,
    Expired,
    Failed,
}

/// Counts for one run. `alert_type` is the highest-priority type that was
/// actually sent, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total: u32,
    pub sent: u32,
    pub skipped: u32,
    pub expired: u32,
    pub failed: u32,
    #[serde(skip)]
    pub alert_type: Option<AlertType>,
}

impl DispatchSummary {
    pub fn from_outcomes(outcomes: &[DeliveryOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.total += 1;
            match outcome {
                DeliveryOutcome::Sent(kind) => {
                    summary.sent += 1;
                    if summary
                        .alert_type
                        .is_none_or(|current| kind.priority() < current.priority())
                    {
                        summary.alert_type = Some(*kind);
                    }
                }
                DeliveryOutcome::Skipped => summary.skipped += 1,
                DeliveryOutcome::Expired => summary.expired += 1,
                DeliveryOutcome::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

async fn deliver(
    storage: &Storage,
    push: &dyn PushSender,
    subscriber: &Subscriber,
    decision: &SubscriberDecision,
    now: DateTime<Utc>,
) -> DeliveryOutcome {
    let alert = match decision {
        SubscriberDecision::Send(alert) => alert,
        SubscriberDecision::NoAlert => return DeliveryOutcome::Skipped,
        SubscriberDecision::CooledDown(kind) => {
            debug!(subscriber_id = subscriber.id, alert_type = kind.as_str(), "Alert in cooldown");
            return DeliveryOutcome::Skipped;
        }
    };

    match push.send(subscriber, &alert.payload()).await {
        Ok(()) => DeliveryOutcome::Sent(alert.alert_type),
        Err(PushError::Gone { status }) => {
            info!(subscriber_id = subscriber.id, status, "Push subscription expired");
            if let Err(e) = storage.deactivate_subscriber(subscriber.id, now).await {
                warn!(
                    subscriber_id = subscriber.id,
                    error = %e,
                    "Failed to deactivate expired subscription"
                );
            }
            DeliveryOutcome::Expired
        }
        Err(e) => {
            warn!(subscriber_id = subscriber.id, error = %e, "Push delivery failed");
            DeliveryOutcome::Failed
        }
    }
}

/// Deliver every decision concurrently and tally the outcomes.
pub async fn dispatch(
    storage: &Storage,
    push: &dyn PushSender,
    decisions: &[(Subscriber, SubscriberDecision)],
    now: DateTime<Utc>,
) -> DispatchSummary {
    let deliveries = decisions
        .iter()
        .map(|(subscriber, decision)| deliver(storage, push, subscriber, decision, now));
    let outcomes = join_all(deliveries).await;

    DispatchSummary::from_outcomes(&outcomes)
}
