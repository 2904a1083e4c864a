use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::Result;
use crate::sync::{parse_sync_data, SyncData, SyncEntity, SyncPayload};
use crate::utils::time_utils::deserialize_optional_datetime;

use super::validation::{collect_missing, non_blank, one_of};

pub const REMINDER_STATUSES: [&str; 3] = ["pending", "sent", "dismissed"];

/// Warranty or bill reminder. Reminders tied to a device go away with it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub device_id: Option<String>,
    pub reminder_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub reminder_date: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl SyncPayload for ReminderPayload {
    const ENTITY: SyncEntity = SyncEntity::Reminder;

    fn from_sync_data(data: &SyncData) -> Result<Self> {
        let payload: ReminderPayload = parse_sync_data(Self::ENTITY, data)?;
        non_blank("reminderType", &payload.reminder_type)?;
        non_blank("deviceId", &payload.device_id)?;
        one_of("status", &payload.status, &REMINDER_STATUSES)?;
        Ok(payload)
    }

    fn missing_required(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("reminderType", self.reminder_type.is_some()),
            ("reminderDate", self.reminder_date.is_some()),
        ])
    }
}
