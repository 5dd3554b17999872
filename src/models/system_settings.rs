use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

use super::user::bson_datetime_as_chrono;

/// Generic settings row. Pricing lives here under the `default_pricing`
/// key as a single serialized blob; the typed shape is parsed and
/// validated by the pricing service on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSetting {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub key: String,
    pub category: String,
    pub value: Document,
    #[serde(rename = "updatedBy", skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}
