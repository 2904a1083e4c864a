use diesel::prelude::*;
use serde_json::{json, Value};

use ledgerbox_core::entities::DocumentPayload;

use crate::sync::timestamp_text;

#[derive(Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentFieldsDB {
    pub name: Option<String>,
    pub document_type: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub device_id: Option<String>,
    pub receipt_id: Option<String>,
    pub expiry_date: Option<String>,
    pub notes: Option<String>,
}

impl From<DocumentPayload> for DocumentFieldsDB {
    fn from(payload: DocumentPayload) -> Self {
        Self {
            name: payload.name,
            document_type: payload.document_type,
            file_url: payload.file_url,
            mime_type: payload.mime_type,
            file_size: payload.file_size,
            device_id: payload.device_id,
            receipt_id: payload.receipt_id,
            expiry_date: timestamp_text(payload.expiry_date),
            notes: payload.notes,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewDocumentDB {
    pub id: String,
    pub user_id: String,
    #[diesel(embed)]
    pub fields: DocumentFieldsDB,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentDB {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub document_type: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub device_id: Option<String>,
    pub receipt_id: Option<String>,
    pub expiry_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl DocumentDB {
    pub fn to_data(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "documentType": self.document_type,
            "fileUrl": self.file_url,
            "mimeType": self.mime_type,
            "fileSize": self.file_size,
            "deviceId": self.device_id,
            "receiptId": self.receipt_id,
            "expiryDate": self.expiry_date,
            "notes": self.notes,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
