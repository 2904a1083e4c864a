use diesel::prelude::*;
use serde_json::{json, Value};

use ledgerbox_core::entities::HouseholdBillPayload;

use crate::sync::{decimal_json, decimal_text, json_text, timestamp_text};

#[derive(Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::household_bills)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HouseholdBillFieldsDB {
    pub bill_type: Option<String>,
    pub provider: Option<String>,
    pub account_number: Option<String>,
    pub amount: Option<String>,
    pub due_date: Option<String>,
    pub billing_period_start: Option<String>,
    pub billing_period_end: Option<String>,
    pub payment_status: Option<String>,
    pub payment_date: Option<String>,
    pub consumption: Option<String>,
    pub notes: Option<String>,
}

impl From<HouseholdBillPayload> for HouseholdBillFieldsDB {
    fn from(payload: HouseholdBillPayload) -> Self {
        Self {
            bill_type: payload.bill_type,
            provider: payload.provider,
            account_number: payload.account_number,
            amount: decimal_text(payload.amount),
            due_date: timestamp_text(payload.due_date),
            billing_period_start: timestamp_text(payload.billing_period_start),
            billing_period_end: timestamp_text(payload.billing_period_end),
            payment_status: payload.payment_status,
            payment_date: timestamp_text(payload.payment_date),
            consumption: payload.consumption.map(|value| value.to_string()),
            notes: payload.notes,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::household_bills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewHouseholdBillDB {
    pub id: String,
    pub user_id: String,
    #[diesel(embed)]
    pub fields: HouseholdBillFieldsDB,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::household_bills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HouseholdBillDB {
    pub id: String,
    pub user_id: String,
    pub bill_type: Option<String>,
    pub provider: Option<String>,
    pub account_number: Option<String>,
    pub amount: Option<String>,
    pub due_date: Option<String>,
    pub billing_period_start: Option<String>,
    pub billing_period_end: Option<String>,
    pub payment_status: Option<String>,
    pub payment_date: Option<String>,
    pub consumption: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl HouseholdBillDB {
    pub fn to_data(&self) -> Value {
        json!({
            "id": self.id,
            "billType": self.bill_type,
            "provider": self.provider,
            "accountNumber": self.account_number,
            "amount": decimal_json(self.amount.as_deref()),
            "dueDate": self.due_date,
            "billingPeriodStart": self.billing_period_start,
            "billingPeriodEnd": self.billing_period_end,
            "paymentStatus": self.payment_status,
            "paymentDate": self.payment_date,
            "consumption": json_text(self.consumption.as_deref()),
            "notes": self.notes,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
