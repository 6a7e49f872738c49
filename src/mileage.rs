//! Odometer log: one reading per bike per day.
//!
//! Logging a reading upserts on `(bike_id, date)` and moves the bike's
//! `current_mileage` to the logged value in the same transaction.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::bikes::ensure_bike_owned;
use crate::error::{bad_request, not_found, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::fields::{lenient_number, non_blank, parse_date};
use crate::models::MileageLog;
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/bikes/{bike_id}/mileage",
            get(list_mileage).post(log_mileage),
        )
        .route("/api/bikes/{bike_id}/mileage/{log_id}", delete(delete_mileage))
}

async fn list_mileage(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<MileageLog>>> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let rows: Vec<MileageLog> =
        sqlx::query_as("SELECT * FROM mileage_logs WHERE bike_id = ? ORDER BY date DESC")
            .bind(bike_id)
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct MileageInput {
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub mileage: Option<i64>,
}

async fn log_mileage(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
    ApiJson(input): ApiJson<MileageInput>,
) -> ApiResult<(StatusCode, Json<MileageLog>)> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let (Some(date), Some(mileage)) = (non_blank(input.date.as_deref()), input.mileage) else {
        return Err(bad_request("Date and mileage are required"));
    };
    if mileage < 0 {
        return Err(bad_request("Invalid mileage"));
    }
    let date = parse_date(&date)?;

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO mileage_logs (bike_id, date, mileage, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(bike_id, date) DO UPDATE SET mileage = excluded.mileage
        "#,
    )
    .bind(bike_id)
    .bind(&date)
    .bind(mileage)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE bikes SET current_mileage = ? WHERE bike_id = ?")
        .bind(mileage)
        .bind(bike_id)
        .execute(&mut *tx)
        .await?;

    let log: MileageLog =
        sqlx::query_as("SELECT * FROM mileage_logs WHERE bike_id = ? AND date = ?")
            .bind(bike_id)
            .bind(&date)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    tracing::debug!(bike_id, mileage, %date, "mileage logged");
    Ok((StatusCode::CREATED, Json(log)))
}

async fn delete_mileage(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((bike_id, log_id)): ApiPath<(i64, i64)>,
) -> ApiResult<StatusCode> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let result = sqlx::query("DELETE FROM mileage_logs WHERE log_id = ? AND bike_id = ?")
        .bind(log_id)
        .bind(bike_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Mileage log not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
