//! Bike registry: per-user CRUD plus photo upload.
//!
//! Every query is scoped by the authenticated user's id, so a bike owned by
//! someone else is indistinguishable from a missing one (404).

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path as FsPath;

use crate::auth::AuthUser;
use crate::error::{bad_request, not_found, payload_too_large, ApiResult, AppError};
use crate::extract::{ApiJson, ApiPath};
use crate::fields::{double_option, lenient_nullable_number, lenient_number, non_blank};
use crate::models::Bike;
use crate::server::AppState;

const BIKE_COLUMNS: &str = "bike_id, user_id, brand, model, year, plate_number, engine_cc, current_mileage, photo, created_at";

const PHOTO_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bikes", get(list_bikes).post(create_bike))
        .route(
            "/api/bikes/{bike_id}",
            get(get_bike).put(update_bike).delete(delete_bike),
        )
        .route("/api/bikes/{bike_id}/photo", post(upload_photo))
}

/// Fetch a bike only if it belongs to `user_id`.
pub async fn find_owned_bike(
    pool: &SqlitePool,
    bike_id: i64,
    user_id: i64,
) -> Result<Option<Bike>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {} FROM bikes WHERE bike_id = ? AND user_id = ?",
        BIKE_COLUMNS
    ))
    .bind(bike_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Ownership guard for nested routes: 404 `Bike not found` unless owned.
pub async fn ensure_bike_owned(pool: &SqlitePool, bike_id: i64, user_id: i64) -> ApiResult<Bike> {
    find_owned_bike(pool, bike_id, user_id)
        .await?
        .ok_or_else(|| not_found("Bike not found"))
}

fn validate_year(year: i64) -> ApiResult<i64> {
    let max_year = chrono::Utc::now().year() as i64 + 1;
    if (1900..=max_year).contains(&year) {
        Ok(year)
    } else {
        Err(bad_request("Invalid year"))
    }
}

fn validate_mileage(mileage: i64) -> ApiResult<i64> {
    if mileage < 0 {
        return Err(bad_request("Invalid mileage"));
    }
    Ok(mileage)
}

// ============ Handlers ============

async fn list_bikes(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<Bike>>> {
    let bikes: Vec<Bike> = sqlx::query_as(&format!(
        "SELECT {} FROM bikes WHERE user_id = ? ORDER BY created_at DESC, bike_id DESC",
        BIKE_COLUMNS
    ))
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(bikes))
}

async fn get_bike(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
) -> ApiResult<Json<Bike>> {
    ensure_bike_owned(&state.pool, bike_id, user.id)
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
pub struct CreateBikeRequest {
    pub brand: Option<String>,
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub year: Option<i64>,
    pub plate_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub engine_cc: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub current_mileage: Option<i64>,
}

async fn create_bike(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateBikeRequest>,
) -> ApiResult<(StatusCode, Json<Bike>)> {
    let brand = non_blank(req.brand.as_deref());
    let model = non_blank(req.model.as_deref());
    let (Some(brand), Some(model), Some(year)) = (brand, model, req.year) else {
        return Err(bad_request("Brand, model and year are required"));
    };
    let year = validate_year(year)?;
    let current_mileage = validate_mileage(req.current_mileage.unwrap_or(0))?;

    let result = sqlx::query(
        r#"
        INSERT INTO bikes (user_id, brand, model, year, plate_number, engine_cc, current_mileage, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(&brand)
    .bind(&model)
    .bind(year)
    .bind(non_blank(req.plate_number.as_deref()))
    .bind(req.engine_cc)
    .bind(current_mileage)
    .bind(chrono::Utc::now().timestamp())
    .execute(&state.pool)
    .await?;

    let bike = ensure_bike_owned(&state.pool, result.last_insert_rowid(), user.id).await?;
    tracing::info!(bike_id = bike.bike_id, user_id = user.id, "bike created");
    Ok((StatusCode::CREATED, Json(bike)))
}

/// Partial update. Absent fields are left alone; `plate_number`,
/// `engine_cc` and `photo` accept an explicit `null` to clear them.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBikeRequest {
    pub brand: Option<String>,
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub year: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub plate_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient_nullable_number")]
    pub engine_cc: Option<Option<i64>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub current_mileage: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub photo: Option<Option<String>>,
}

impl UpdateBikeRequest {
    /// Apply the patch onto a stored bike, validating each provided value.
    pub fn apply(self, mut bike: Bike) -> ApiResult<Bike> {
        if let Some(brand) = self.brand {
            bike.brand = non_blank(Some(&brand))
                .ok_or_else(|| bad_request("Brand must not be empty"))?;
        }
        if let Some(model) = self.model {
            bike.model = non_blank(Some(&model))
                .ok_or_else(|| bad_request("Model must not be empty"))?;
        }
        if let Some(year) = self.year {
            bike.year = validate_year(year)?;
        }
        if let Some(plate) = self.plate_number {
            bike.plate_number = non_blank(plate.as_deref());
        }
        if let Some(cc) = self.engine_cc {
            bike.engine_cc = cc;
        }
        if let Some(mileage) = self.current_mileage {
            bike.current_mileage = validate_mileage(mileage)?;
        }
        if let Some(photo) = self.photo {
            bike.photo = non_blank(photo.as_deref());
        }
        Ok(bike)
    }
}

async fn update_bike(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateBikeRequest>,
) -> ApiResult<Json<Bike>> {
    let existing = ensure_bike_owned(&state.pool, bike_id, user.id).await?;
    let bike = req.apply(existing)?;

    sqlx::query(
        r#"
        UPDATE bikes
        SET brand = ?, model = ?, year = ?, plate_number = ?, engine_cc = ?,
            current_mileage = ?, photo = ?
        WHERE bike_id = ? AND user_id = ?
        "#,
    )
    .bind(&bike.brand)
    .bind(&bike.model)
    .bind(bike.year)
    .bind(&bike.plate_number)
    .bind(bike.engine_cc)
    .bind(bike.current_mileage)
    .bind(&bike.photo)
    .bind(bike_id)
    .bind(user.id)
    .execute(&state.pool)
    .await?;

    Ok(Json(bike))
}

async fn delete_bike(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let bike = ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    sqlx::query("DELETE FROM bikes WHERE bike_id = ? AND user_id = ?")
        .bind(bike_id)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    if let Some(photo) = bike.photo.as_deref() {
        remove_stored_photo(&state.config.server.uploads_dir, photo).await;
    }

    tracing::info!(bike_id, user_id = user.id, "bike deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /api/bikes/{bike_id}/photo ============

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub bike_id: i64,
    pub photo: String,
}

/// Lower-cased extension of an uploaded file name, if it is an accepted image type.
pub fn photo_extension(file_name: &str) -> Option<String> {
    let ext = FsPath::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    PHOTO_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large("Photo exceeds the upload size limit")
    } else {
        bad_request(err.body_text())
    }
}

async fn upload_photo(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
    mut multipart: Multipart,
) -> ApiResult<Json<PhotoResponse>> {
    let bike = ensure_bike_owned(&state.pool, bike_id, user.id).await?;
    let max_bytes = state.config.server.max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let ext = photo_extension(&file_name)
            .ok_or_else(|| bad_request("Only image files are allowed"))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((ext, bytes));
        break;
    }

    let Some((ext, bytes)) = upload.filter(|(_, b)| !b.is_empty()) else {
        return Err(bad_request("No photo file uploaded"));
    };
    if bytes.len() > max_bytes {
        return Err(payload_too_large("Photo exceeds the upload size limit"));
    }

    let uploads_dir = &state.config.server.uploads_dir;
    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(anyhow::Error::from)?;
    let file_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
    tokio::fs::write(uploads_dir.join(&file_name), &bytes)
        .await
        .map_err(anyhow::Error::from)?;

    let photo = format!("/uploads/{}", file_name);
    sqlx::query("UPDATE bikes SET photo = ? WHERE bike_id = ? AND user_id = ?")
        .bind(&photo)
        .bind(bike_id)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    if let Some(previous) = bike.photo.as_deref() {
        remove_stored_photo(uploads_dir, previous).await;
    }

    tracing::info!(bike_id, bytes = bytes.len(), "bike photo stored");
    Ok(Json(PhotoResponse { bike_id, photo }))
}

/// Best-effort removal of a file previously served under `/uploads/`.
async fn remove_stored_photo(uploads_dir: &FsPath, photo: &str) {
    let Some(name) = photo.strip_prefix("/uploads/") else {
        return;
    };
    if name.contains('/') || name.contains("..") {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(uploads_dir.join(name)).await {
        tracing::debug!("could not remove old photo {}: {}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bike() -> Bike {
        Bike {
            bike_id: 1,
            user_id: 1,
            brand: "Honda".to_string(),
            model: "CB500X".to_string(),
            year: 2021,
            plate_number: Some("AB-123".to_string()),
            engine_cc: Some(471),
            current_mileage: 12000,
            photo: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_photo_extension() {
        assert_eq!(photo_extension("bike.JPG").as_deref(), Some("jpg"));
        assert_eq!(photo_extension("a.b.webp").as_deref(), Some("webp"));
        assert_eq!(photo_extension("notes.txt"), None);
        assert_eq!(photo_extension("no_extension"), None);
    }

    #[test]
    fn test_validate_year_bounds() {
        assert!(validate_year(1900).is_ok());
        assert!(validate_year(1899).is_err());
        let next = chrono::Utc::now().year() as i64 + 1;
        assert!(validate_year(next).is_ok());
        assert!(validate_year(next + 1).is_err());
    }

    #[test]
    fn test_patch_leaves_absent_fields() {
        let patch: UpdateBikeRequest = serde_json::from_str(r#"{"current_mileage": 15000}"#).unwrap();
        let updated = patch.apply(bike()).unwrap();
        assert_eq!(updated.current_mileage, 15000);
        assert_eq!(updated.plate_number.as_deref(), Some("AB-123"));
        assert_eq!(updated.engine_cc, Some(471));
    }

    #[test]
    fn test_patch_null_clears_nullable_fields() {
        let patch: UpdateBikeRequest =
            serde_json::from_str(r#"{"plate_number": null, "engine_cc": null}"#).unwrap();
        let updated = patch.apply(bike()).unwrap();
        assert_eq!(updated.plate_number, None);
        assert_eq!(updated.engine_cc, None);
    }

    #[test]
    fn test_patch_rejects_invalid_values() {
        let patch: UpdateBikeRequest = serde_json::from_str(r#"{"year": 1800}"#).unwrap();
        assert_eq!(patch.apply(bike()).unwrap_err().message, "Invalid year");

        let patch: UpdateBikeRequest = serde_json::from_str(r#"{"brand": "  "}"#).unwrap();
        assert!(patch.apply(bike()).is_err());

        let patch: UpdateBikeRequest = serde_json::from_str(r#"{"current_mileage": -5}"#).unwrap();
        assert_eq!(patch.apply(bike()).unwrap_err().message, "Invalid mileage");
    }
}
