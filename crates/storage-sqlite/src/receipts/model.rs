//! Database models for receipts.

use diesel::prelude::*;
use serde_json::{json, Value};

use ledgerbox_core::entities::ReceiptPayload;

use crate::sync::{decimal_json, decimal_text, json_text, timestamp_text};

/// Client-writable receipt columns. `None` leaves the stored value untouched.
#[derive(Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::receipts)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReceiptFieldsDB {
    pub merchant_name: Option<String>,
    pub pib: Option<String>,
    pub date: Option<String>,
    pub total_amount: Option<String>,
    pub vat_amount: Option<String>,
    pub items: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub qr_link: Option<String>,
    pub image_url: Option<String>,
}

impl From<ReceiptPayload> for ReceiptFieldsDB {
    fn from(payload: ReceiptPayload) -> Self {
        Self {
            merchant_name: payload.merchant_name,
            pib: payload.pib,
            date: timestamp_text(payload.date),
            total_amount: decimal_text(payload.total_amount),
            vat_amount: decimal_text(payload.vat_amount),
            items: payload.items.map(|items| items.to_string()),
            category: payload.category,
            notes: payload.notes,
            qr_link: payload.qr_link,
            image_url: payload.image_url,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::receipts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewReceiptDB {
    pub id: String,
    pub user_id: String,
    #[diesel(embed)]
    pub fields: ReceiptFieldsDB,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::receipts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReceiptDB {
    pub id: String,
    pub user_id: String,
    pub merchant_name: Option<String>,
    pub pib: Option<String>,
    pub date: Option<String>,
    pub total_amount: Option<String>,
    pub vat_amount: Option<String>,
    pub items: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub qr_link: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl ReceiptDB {
    pub fn to_data(&self) -> Value {
        json!({
            "id": self.id,
            "merchantName": self.merchant_name,
            "pib": self.pib,
            "date": self.date,
            "totalAmount": decimal_json(self.total_amount.as_deref()),
            "vatAmount": decimal_json(self.vat_amount.as_deref()),
            "items": json_text(self.items.as_deref()),
            "category": self.category,
            "notes": self.notes,
            "qrLink": self.qr_link,
            "imageUrl": self.image_url,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
