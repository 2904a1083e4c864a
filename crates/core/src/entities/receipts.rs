use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::sync::{parse_sync_data, SyncData, SyncEntity, SyncPayload};
use crate::utils::time_utils::deserialize_optional_datetime;

use super::validation::{collect_missing, non_blank, non_negative};

/// Fiscal receipt as captured by scan or manual entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub merchant_name: Option<String>,
    /// Merchant tax identification number.
    pub pib: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    /// Line items, kept as an opaque JSON array.
    pub items: Option<Value>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub qr_link: Option<String>,
    pub image_url: Option<String>,
}

impl SyncPayload for ReceiptPayload {
    const ENTITY: SyncEntity = SyncEntity::Receipt;

    fn from_sync_data(data: &SyncData) -> Result<Self> {
        let payload: ReceiptPayload = parse_sync_data(Self::ENTITY, data)?;
        non_blank("merchantName", &payload.merchant_name)?;
        non_negative("totalAmount", &payload.total_amount)?;
        non_negative("vatAmount", &payload.vat_amount)?;
        if let (Some(total), Some(vat)) = (payload.total_amount, payload.vat_amount) {
            if vat > total {
                return Err(Error::validation("vatAmount must not exceed totalAmount"));
            }
        }
        if let Some(items) = &payload.items {
            if !items.is_array() {
                return Err(Error::validation("items must be an array"));
            }
        }
        Ok(payload)
    }

    fn missing_required(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("merchantName", self.merchant_name.is_some()),
            ("totalAmount", self.total_amount.is_some()),
        ])
    }
}
