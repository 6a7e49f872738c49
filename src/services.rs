//! Service history: maintenance events logged against a bike.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::bikes::ensure_bike_owned;
use crate::error::{bad_request, not_found, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::fields::{lenient_number, non_blank, parse_date};
use crate::models::ServiceRecord;
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/bikes/{bike_id}/services",
            get(list_services).post(create_service),
        )
        .route(
            "/api/bikes/{bike_id}/services/{service_id}",
            put(update_service).delete(delete_service),
        )
}

async fn fetch_service(
    state: &AppState,
    bike_id: i64,
    service_id: i64,
) -> ApiResult<Option<ServiceRecord>> {
    let row = sqlx::query_as("SELECT * FROM services WHERE service_id = ? AND bike_id = ?")
        .bind(service_id)
        .bind(bike_id)
        .fetch_optional(&state.pool)
        .await?;
    Ok(row)
}

async fn list_services(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<ServiceRecord>>> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let rows: Vec<ServiceRecord> = sqlx::query_as(
        "SELECT * FROM services WHERE bike_id = ? ORDER BY service_date DESC, service_id DESC",
    )
    .bind(bike_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceInput {
    pub service_type: Option<String>,
    pub description: Option<String>,
    pub service_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub mileage_at_service: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub cost: Option<f64>,
    pub shop_name: Option<String>,
}

fn validate_amounts(input: &ServiceInput) -> ApiResult<()> {
    if input.mileage_at_service.is_some_and(|m| m < 0) {
        return Err(bad_request("Invalid mileage"));
    }
    if input.cost.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(bad_request("Invalid cost"));
    }
    Ok(())
}

async fn create_service(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
    ApiJson(input): ApiJson<ServiceInput>,
) -> ApiResult<(StatusCode, Json<ServiceRecord>)> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let service_type = non_blank(input.service_type.as_deref());
    let service_date = non_blank(input.service_date.as_deref());
    let (Some(service_type), Some(service_date)) = (service_type, service_date) else {
        return Err(bad_request("Service type and date are required"));
    };
    let service_date = parse_date(&service_date)?;
    validate_amounts(&input)?;

    let result = sqlx::query(
        r#"
        INSERT INTO services (bike_id, service_type, description, service_date, mileage_at_service, cost, shop_name, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(bike_id)
    .bind(&service_type)
    .bind(non_blank(input.description.as_deref()))
    .bind(&service_date)
    .bind(input.mileage_at_service.unwrap_or(0))
    .bind(input.cost.unwrap_or(0.0))
    .bind(non_blank(input.shop_name.as_deref()))
    .bind(chrono::Utc::now().timestamp())
    .execute(&state.pool)
    .await?;

    let record = fetch_service(&state, bike_id, result.last_insert_rowid())
        .await?
        .ok_or_else(|| not_found("Service not found"))?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Each provided field replaces the stored value; absent fields are kept.
async fn update_service(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((bike_id, service_id)): ApiPath<(i64, i64)>,
    ApiJson(input): ApiJson<ServiceInput>,
) -> ApiResult<Json<ServiceRecord>> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;
    validate_amounts(&input)?;

    let mut record = fetch_service(&state, bike_id, service_id)
        .await?
        .ok_or_else(|| not_found("Service not found"))?;

    if let Some(service_type) = input.service_type.as_deref() {
        record.service_type =
            non_blank(Some(service_type)).ok_or_else(|| bad_request("Service type must not be empty"))?;
    }
    if let Some(description) = input.description.as_deref() {
        record.description = Some(description.trim().to_string());
    }
    if let Some(date) = input.service_date.as_deref() {
        record.service_date = parse_date(date)?;
    }
    if let Some(mileage) = input.mileage_at_service {
        record.mileage_at_service = mileage;
    }
    if let Some(cost) = input.cost {
        record.cost = cost;
    }
    if let Some(shop) = input.shop_name.as_deref() {
        record.shop_name = Some(shop.trim().to_string());
    }

    sqlx::query(
        r#"
        UPDATE services
        SET service_type = ?, description = ?, service_date = ?, mileage_at_service = ?,
            cost = ?, shop_name = ?
        WHERE service_id = ? AND bike_id = ?
        "#,
    )
    .bind(&record.service_type)
    .bind(&record.description)
    .bind(&record.service_date)
    .bind(record.mileage_at_service)
    .bind(record.cost)
    .bind(&record.shop_name)
    .bind(service_id)
    .bind(bike_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(record))
}

async fn delete_service(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((bike_id, service_id)): ApiPath<(i64, i64)>,
) -> ApiResult<StatusCode> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let result = sqlx::query("DELETE FROM services WHERE service_id = ? AND bike_id = ?")
        .bind(service_id)
        .bind(bike_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Service not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amounts() {
        assert!(validate_amounts(&ServiceInput::default()).is_ok());

        let negative_cost = ServiceInput {
            cost: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(validate_amounts(&negative_cost).unwrap_err().message, "Invalid cost");

        let negative_mileage = ServiceInput {
            mileage_at_service: Some(-10),
            ..Default::default()
        };
        assert!(validate_amounts(&negative_mileage).is_err());
    }
}
