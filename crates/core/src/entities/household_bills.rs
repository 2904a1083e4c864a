use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::sync::{parse_sync_data, SyncData, SyncEntity, SyncPayload};
use crate::utils::time_utils::deserialize_optional_datetime;

use super::validation::{collect_missing, non_blank, non_negative, one_of};

pub const PAYMENT_STATUSES: [&str; 3] = ["pending", "paid", "overdue"];

/// Utility or household bill (electricity, water, internet, ...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdBillPayload {
    pub bill_type: Option<String>,
    pub provider: Option<String>,
    pub account_number: Option<String>,
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub billing_period_start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub billing_period_end: Option<DateTime<Utc>>,
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub payment_date: Option<DateTime<Utc>>,
    /// Meter readings and units, kept as an opaque JSON object.
    pub consumption: Option<Value>,
    pub notes: Option<String>,
}

impl SyncPayload for HouseholdBillPayload {
    const ENTITY: SyncEntity = SyncEntity::HouseholdBill;

    fn from_sync_data(data: &SyncData) -> Result<Self> {
        let payload: HouseholdBillPayload = parse_sync_data(Self::ENTITY, data)?;
        non_blank("billType", &payload.bill_type)?;
        non_blank("provider", &payload.provider)?;
        non_negative("amount", &payload.amount)?;
        one_of("paymentStatus", &payload.payment_status, &PAYMENT_STATUSES)?;

        if let (Some(start), Some(end)) = (payload.billing_period_start, payload.billing_period_end)
        {
            if start > end {
                return Err(Error::validation(
                    "billingPeriodStart must not be after billingPeriodEnd",
                ));
            }
        }
        if let Some(consumption) = &payload.consumption {
            if !consumption.is_object() {
                return Err(Error::validation("consumption must be an object"));
            }
        }
        Ok(payload)
    }

    fn missing_required(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("billType", self.bill_type.is_some()),
            ("provider", self.provider.is_some()),
            ("amount", self.amount.is_some()),
            ("dueDate", self.due_date.is_some()),
        ])
    }
}
