//! Database models for devices.

use diesel::prelude::*;
use serde_json::{json, Value};

use ledgerbox_core::entities::DevicePayload;

use crate::sync::timestamp_text;

#[derive(Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::devices)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeviceFieldsDB {
    pub receipt_id: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<String>,
    pub warranty_duration_months: Option<i32>,
    pub warranty_expiry: Option<String>,
    pub status: Option<String>,
    pub service_center_name: Option<String>,
    pub notes: Option<String>,
}

impl From<DevicePayload> for DeviceFieldsDB {
    fn from(payload: DevicePayload) -> Self {
        Self {
            receipt_id: payload.receipt_id,
            brand: payload.brand,
            model: payload.model,
            category: payload.category,
            serial_number: payload.serial_number,
            purchase_date: timestamp_text(payload.purchase_date),
            warranty_duration_months: payload.warranty_duration_months,
            warranty_expiry: timestamp_text(payload.warranty_expiry),
            status: payload.status,
            service_center_name: payload.service_center_name,
            notes: payload.notes,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewDeviceDB {
    pub id: String,
    pub user_id: String,
    #[diesel(embed)]
    pub fields: DeviceFieldsDB,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeviceDB {
    pub id: String,
    pub user_id: String,
    pub receipt_id: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<String>,
    pub warranty_duration_months: Option<i32>,
    pub warranty_expiry: Option<String>,
    pub status: Option<String>,
    pub service_center_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl DeviceDB {
    pub fn to_data(&self) -> Value {
        json!({
            "id": self.id,
            "receiptId": self.receipt_id,
            "brand": self.brand,
            "model": self.model,
            "category": self.category,
            "serialNumber": self.serial_number,
            "purchaseDate": self.purchase_date,
            "warrantyDurationMonths": self.warranty_duration_months,
            "warrantyExpiry": self.warranty_expiry,
            "status": self.status,
            "serviceCenterName": self.service_center_name,
            "notes": self.notes,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
