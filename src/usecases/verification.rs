//! Three independent lookups of one message id.
//!
//! - direct: by id
//! - history: `offset_id = id + 1`, limit 3
//! - range: `min_id = id - 1`, `max_id = id + 1`
//!
//! A lookup agrees when it returns the id with the reference UTC date.
//! A failed request aborts the whole check.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::reports::{
    BoundaryCheck, MethodResult, TripleStatus, TripleVerification, VerificationMethod,
};
use crate::domain::{ChannelRef, DomainError, Message};
use crate::ports::{ChatGateway, HistoryQuery};

const HISTORY_LOOKUP_LIMIT: usize = 3;
const RANGE_LOOKUP_LIMIT: usize = 10;

async fn lookup(
    gateway: &dyn ChatGateway,
    channel: &ChannelRef,
    method: VerificationMethod,
    message_id: i32,
) -> Result<Option<Message>, DomainError> {
    match method {
        VerificationMethod::Direct => gateway.get_message(channel, message_id).await,
        VerificationMethod::History => Ok(gateway
            .get_history(channel, HistoryQuery::before(message_id + 1, HISTORY_LOOKUP_LIMIT))
            .await?
            .into_iter()
            .find(|m| m.id == message_id)),
        VerificationMethod::Range => Ok(gateway
            .get_history(
                channel,
                HistoryQuery::between(message_id - 1, message_id + 1, RANGE_LOOKUP_LIMIT),
            )
            .await?
            .into_iter()
            .find(|m| m.id == message_id)),
    }
}

/// Run all three lookups. The message found directly (if any) is returned
/// alongside the per-method results.
pub async fn lookup_all(
    gateway: &dyn ChatGateway,
    channel: &ChannelRef,
    message_id: i32,
    expected_date: Option<DateTime<Utc>>,
) -> Result<(Vec<MethodResult>, Option<Message>), DomainError> {
    let mut found: Vec<(VerificationMethod, Option<Message>)> = Vec::with_capacity(3);
    for method in [
        VerificationMethod::Direct,
        VerificationMethod::History,
        VerificationMethod::Range,
    ] {
        found.push((method, lookup(gateway, channel, method, message_id).await?));
    }

    // Without a cached date the first live answer is the reference.
    let reference = expected_date.or_else(|| {
        found
            .iter()
            .find_map(|(_, m)| m.as_ref().map(|m| m.date_utc))
    });

    let results = found
        .iter()
        .map(|(method, m)| {
            let found_id = m.as_ref().map(|m| m.id);
            let date_utc = m.as_ref().map(|m| m.date_utc);
            MethodResult {
                method: *method,
                found_id,
                date_utc,
                agrees: found_id == Some(message_id) && date_utc.is_some() && date_utc == reference,
            }
        })
        .collect();

    let direct = found
        .into_iter()
        .find(|(method, _)| *method == VerificationMethod::Direct)
        .and_then(|(_, m)| m);
    Ok((results, direct))
}

/// Check a cached boundary message against the live API.
pub async fn check_boundary(
    gateway: &dyn ChatGateway,
    channel: &ChannelRef,
    message: &Message,
) -> Result<BoundaryCheck, DomainError> {
    let (methods, _) = lookup_all(gateway, channel, message.id, Some(message.date_utc)).await?;
    let agreeing = methods.iter().filter(|m| m.agrees).count();
    let confidence = agreeing as f64 / methods.len() as f64;
    debug!(message_id = message.id, agreeing, "boundary checked");
    Ok(BoundaryCheck {
        message_id: message.id,
        date_msk: message.date_msk.clone(),
        verified: agreeing * 2 > methods.len(),
        agreeing,
        confidence,
        methods,
    })
}

/// Verify a live message id with no cached reference.
pub async fn triple_verify(
    gateway: &dyn ChatGateway,
    channel: &ChannelRef,
    message_id: i32,
) -> Result<TripleVerification, DomainError> {
    let (methods, direct) = lookup_all(gateway, channel, message_id, None).await?;
    let methods_successful = methods.iter().filter(|m| m.agrees).count();
    let methods_total = methods.len();
    let status = match methods_successful {
        n if n == methods_total => TripleStatus::Verified,
        n if n * 2 > methods_total => TripleStatus::Partial,
        _ => TripleStatus::Failed,
    };
    Ok(TripleVerification {
        message_id,
        methods_successful,
        methods_total,
        verification_score: methods_successful as f64 / methods_total as f64,
        status,
        message: direct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockGateway, message_at};

    fn gateway() -> MockGateway {
        MockGateway::new(
            "@aiclub",
            vec![
                message_at(12, "2025-09-15 10:00:00", "c"),
                message_at(11, "2025-09-15 09:00:00", "b"),
                message_at(10, "2025-09-15 08:00:00", "a"),
            ],
        )
    }

    #[tokio::test]
    async fn test_unchanged_message_fully_agrees() {
        let gw = gateway();
        let channel = gw.resolve_channel("@aiclub").await.unwrap();
        let cached = message_at(11, "2025-09-15 09:00:00", "b");
        let check = check_boundary(&gw, &channel, &cached).await.unwrap();
        assert_eq!(check.agreeing, 3);
        assert_eq!(check.confidence, 1.0);
        assert!(check.verified);
    }

    #[tokio::test]
    async fn test_date_drift_disagrees() {
        let gw = gateway();
        let channel = gw.resolve_channel("@aiclub").await.unwrap();
        let cached = message_at(11, "2025-09-15 07:00:00", "b");
        let check = check_boundary(&gw, &channel, &cached).await.unwrap();
        assert_eq!(check.agreeing, 0);
        assert!(!check.verified);
    }

    #[tokio::test]
    async fn test_deleted_message() {
        let gw = gateway();
        let channel = gw.resolve_channel("@aiclub").await.unwrap();
        gw.remove(10);
        let v = triple_verify(&gw, &channel, 10).await.unwrap();
        assert_eq!(v.status, TripleStatus::Failed);
        assert_eq!(v.methods_successful, 0);
        assert!(v.message.is_none());

        let v = triple_verify(&gw, &channel, 12).await.unwrap();
        assert_eq!(v.status, TripleStatus::Verified);
        assert_eq!(v.verification_score, 1.0);
        assert_eq!(v.message.unwrap().id, 12);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_an_error() {
        let gw = gateway();
        let channel = gw.resolve_channel("@aiclub").await.unwrap();
        gw.fail_requests(true);

        let cached = message_at(11, "2025-09-15 09:00:00", "b");
        let res = check_boundary(&gw, &channel, &cached).await;
        assert!(matches!(res, Err(DomainError::Gateway(_))));

        let res = triple_verify(&gw, &channel, 12).await;
        assert!(matches!(res, Err(DomainError::Gateway(_))));
    }
}
