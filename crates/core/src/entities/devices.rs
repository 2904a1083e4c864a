use chrono::{DateTime, Months, Utc};
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::sync::{parse_sync_data, SyncData, SyncEntity, SyncPayload};
use crate::utils::time_utils::deserialize_optional_datetime;

use super::validation::{collect_missing, non_blank, one_of};

pub const DEVICE_STATUSES: [&str; 3] = ["active", "expired", "in-service"];

/// A purchased device under warranty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    pub receipt_id: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub serial_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub purchase_date: Option<DateTime<Utc>>,
    pub warranty_duration_months: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub service_center_name: Option<String>,
    pub notes: Option<String>,
}

impl DevicePayload {
    /// Purchase date plus warranty duration, when both are known.
    pub fn derived_warranty_expiry(&self) -> Option<DateTime<Utc>> {
        let purchased = self.purchase_date?;
        let months = u32::try_from(self.warranty_duration_months?).ok()?;
        purchased.checked_add_months(Months::new(months))
    }
}

impl SyncPayload for DevicePayload {
    const ENTITY: SyncEntity = SyncEntity::Device;

    fn from_sync_data(data: &SyncData) -> Result<Self> {
        let mut payload: DevicePayload = parse_sync_data(Self::ENTITY, data)?;
        non_blank("brand", &payload.brand)?;
        non_blank("model", &payload.model)?;
        one_of("status", &payload.status, &DEVICE_STATUSES)?;

        if let Some(months) = payload.warranty_duration_months {
            if months < 0 {
                return Err(Error::validation(
                    "warrantyDurationMonths must not be negative",
                ));
            }
        }

        if payload.warranty_expiry.is_none() {
            payload.warranty_expiry = payload.derived_warranty_expiry();
        }

        if let (Some(purchased), Some(expiry)) = (payload.purchase_date, payload.warranty_expiry) {
            if expiry < purchased {
                return Err(Error::validation(
                    "warrantyExpiry must not precede purchaseDate",
                ));
            }
        }

        Ok(payload)
    }

    /// A stored expiry is dropped when the update changes what it was derived
    /// from without naming a new expiry, so it is derived again.
    fn merge_update(mut stored: SyncData, incoming: &SyncData) -> SyncData {
        let derivation_changed = ["purchaseDate", "warrantyDurationMonths"]
            .iter()
            .any(|key| incoming.contains_key(*key));
        if derivation_changed && !incoming.contains_key("warrantyExpiry") {
            stored.remove("warrantyExpiry");
        }
        for (key, value) in incoming {
            stored.insert(key.clone(), value.clone());
        }
        stored
    }

    fn missing_required(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("brand", self.brand.is_some()),
            ("model", self.model.is_some()),
            ("purchaseDate", self.purchase_date.is_some()),
            (
                "warrantyDurationMonths",
                self.warranty_duration_months.is_some(),
            ),
        ])
    }
}
