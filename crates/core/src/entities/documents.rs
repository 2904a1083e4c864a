use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::sync::{parse_sync_data, SyncData, SyncEntity, SyncPayload};
use crate::utils::time_utils::deserialize_optional_datetime;

use super::validation::{collect_missing, non_blank};

/// Stored document metadata (warranty card, manual, invoice scan).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub name: Option<String>,
    pub document_type: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub device_id: Option<String>,
    pub receipt_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl SyncPayload for DocumentPayload {
    const ENTITY: SyncEntity = SyncEntity::Document;

    fn from_sync_data(data: &SyncData) -> Result<Self> {
        let payload: DocumentPayload = parse_sync_data(Self::ENTITY, data)?;
        non_blank("name", &payload.name)?;
        non_blank("documentType", &payload.document_type)?;
        if payload.file_size.is_some_and(|size| size < 0) {
            return Err(Error::validation("fileSize must not be negative"));
        }
        Ok(payload)
    }

    fn missing_required(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("name", self.name.is_some()),
            ("documentType", self.document_type.is_some()),
        ])
    }
}
