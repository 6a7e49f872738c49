//! Core data models used throughout MotoCare.
//!
//! Row types map one-to-one onto the SQLite tables created by
//! [`migrate`](crate::migrate). Timestamps are stored as Unix seconds and
//! serialized as RFC 3339 UTC strings; calendar dates (`service_date`,
//! `date`) are kept as `YYYY-MM-DD` text.

use serde::{Serialize, Serializer};
use sqlx::FromRow;

/// Serialize a Unix timestamp as an RFC 3339 string.
pub fn serialize_ts<S: Serializer>(ts: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_ts_iso(*ts))
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Public view of a registered account. The password hash never leaves the database layer.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Bike {
    pub bike_id: i64,
    pub user_id: i64,
    pub brand: String,
    pub model: String,
    pub year: i64,
    pub plate_number: Option<String>,
    pub engine_cc: Option<i64>,
    pub current_mileage: i64,
    pub photo: Option<String>,
    #[serde(serialize_with = "serialize_ts")]
    pub created_at: i64,
}

/// A logged maintenance event.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceRecord {
    pub service_id: i64,
    pub bike_id: i64,
    pub service_type: String,
    pub description: Option<String>,
    pub service_date: String,
    pub mileage_at_service: i64,
    pub cost: f64,
    pub shop_name: Option<String>,
    #[serde(serialize_with = "serialize_ts")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MileageLog {
    pub log_id: i64,
    pub bike_id: i64,
    pub date: String,
    pub mileage: i64,
    #[serde(serialize_with = "serialize_ts")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Expense {
    pub expense_id: i64,
    pub bike_id: i64,
    pub category: String,
    pub amount: f64,
    pub date: String,
    pub notes: Option<String>,
    #[serde(serialize_with = "serialize_ts")]
    pub created_at: i64,
}

/// A maintenance paragraph with its decoded embedding, ready for scoring.
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub id: i64,
    pub topic: Option<String>,
    pub source: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
}
