use diesel::prelude::*;
use serde_json::{json, Value};

use ledgerbox_core::entities::ReminderPayload;

use crate::sync::timestamp_text;

#[derive(Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::reminders)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReminderFieldsDB {
    pub device_id: Option<String>,
    pub reminder_type: Option<String>,
    pub reminder_date: Option<String>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl From<ReminderPayload> for ReminderFieldsDB {
    fn from(payload: ReminderPayload) -> Self {
        Self {
            device_id: payload.device_id,
            reminder_type: payload.reminder_type,
            reminder_date: timestamp_text(payload.reminder_date),
            message: payload.message,
            status: payload.status,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::reminders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewReminderDB {
    pub id: String,
    pub user_id: String,
    #[diesel(embed)]
    pub fields: ReminderFieldsDB,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::reminders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReminderDB {
    pub id: String,
    pub user_id: String,
    pub device_id: Option<String>,
    pub reminder_type: Option<String>,
    pub reminder_date: Option<String>,
    pub message: Option<String>,
    pub status: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl ReminderDB {
    pub fn to_data(&self) -> Value {
        json!({
            "id": self.id,
            "deviceId": self.device_id,
            "reminderType": self.reminder_type,
            "reminderDate": self.reminder_date,
            "message": self.message,
            "status": self.status,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
