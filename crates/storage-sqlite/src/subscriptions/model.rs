use diesel::prelude::*;
use serde_json::{json, Value};

use ledgerbox_core::entities::SubscriptionPayload;

use crate::sync::{decimal_json, decimal_text, timestamp_text};

#[derive(Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SubscriptionFieldsDB {
    pub provider: Option<String>,
    pub plan_name: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub billing_cycle: Option<String>,
    pub next_billing_date: Option<String>,
    pub is_active: Option<bool>,
    pub cancel_url: Option<String>,
    pub notes: Option<String>,
}

impl From<SubscriptionPayload> for SubscriptionFieldsDB {
    fn from(payload: SubscriptionPayload) -> Self {
        Self {
            provider: payload.provider,
            plan_name: payload.plan_name,
            price: decimal_text(payload.price),
            currency: payload.currency,
            billing_cycle: payload.billing_cycle,
            next_billing_date: timestamp_text(payload.next_billing_date),
            is_active: payload.is_active,
            cancel_url: payload.cancel_url,
            notes: payload.notes,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewSubscriptionDB {
    pub id: String,
    pub user_id: String,
    #[diesel(embed)]
    pub fields: SubscriptionFieldsDB,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SubscriptionDB {
    pub id: String,
    pub user_id: String,
    pub provider: Option<String>,
    pub plan_name: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub billing_cycle: Option<String>,
    pub next_billing_date: Option<String>,
    pub is_active: Option<bool>,
    pub cancel_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl SubscriptionDB {
    pub fn to_data(&self) -> Value {
        json!({
            "id": self.id,
            "provider": self.provider,
            "planName": self.plan_name,
            "price": decimal_json(self.price.as_deref()),
            "currency": self.currency,
            "billingCycle": self.billing_cycle,
            "nextBillingDate": self.next_billing_date,
            "isActive": self.is_active,
            "cancelUrl": self.cancel_url,
            "notes": self.notes,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
