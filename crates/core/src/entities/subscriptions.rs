use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::sync::{parse_sync_data, SyncData, SyncEntity, SyncPayload};
use crate::utils::time_utils::deserialize_optional_datetime;

use super::validation::{collect_missing, non_blank, non_negative, one_of};

pub const BILLING_CYCLES: [&str; 4] = ["weekly", "monthly", "quarterly", "yearly"];

/// Recurring paid subscription (streaming, software, memberships).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    pub provider: Option<String>,
    pub plan_name: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub billing_cycle: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub next_billing_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub cancel_url: Option<String>,
    pub notes: Option<String>,
}

impl SyncPayload for SubscriptionPayload {
    const ENTITY: SyncEntity = SyncEntity::Subscription;

    fn from_sync_data(data: &SyncData) -> Result<Self> {
        let mut payload: SubscriptionPayload = parse_sync_data(Self::ENTITY, data)?;
        non_blank("provider", &payload.provider)?;
        non_blank("planName", &payload.plan_name)?;
        non_negative("price", &payload.price)?;
        one_of("billingCycle", &payload.billing_cycle, &BILLING_CYCLES)?;

        if let Some(currency) = payload.currency.take() {
            let code = currency.trim().to_ascii_uppercase();
            if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err(Error::validation("currency must be a 3-letter code"));
            }
            payload.currency = Some(code);
        }
        Ok(payload)
    }

    fn missing_required(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("provider", self.provider.is_some()),
            ("planName", self.plan_name.is_some()),
            ("price", self.price.is_some()),
            ("billingCycle", self.billing_cycle.is_some()),
            ("nextBillingDate", self.next_billing_date.is_some()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn currency_is_normalized_to_upper_case() {
        let data = json!({ "currency": "rsd", "billingCycle": "monthly" });
        let payload = SubscriptionPayload::from_sync_data(data.as_object().unwrap()).unwrap();
        assert_eq!(payload.currency.as_deref(), Some("RSD"));
    }

    #[test]
    fn bad_currency_and_cycle_are_rejected() {
        for data in [json!({ "currency": "dinar" }), json!({ "billingCycle": "daily" })] {
            assert!(SubscriptionPayload::from_sync_data(data.as_object().unwrap()).is_err());
        }
    }
}
