//! Expense ledger per bike.

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
use crate::fields::{double_option, lenient_number, non_blank, parse_date};
use crate::models::Expense;
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/bikes/{bike_id}/expenses",
            get(list_expenses).post(create_expense),
        )
        .route(
            "/api/bikes/{bike_id}/expenses/{expense_id}",
            put(update_expense).delete(delete_expense),
        )
}

async fn fetch_expense(
    state: &AppState,
    bike_id: i64,
    expense_id: i64,
) -> ApiResult<Option<Expense>> {
    let row = sqlx::query_as("SELECT * FROM expenses WHERE expense_id = ? AND bike_id = ?")
        .bind(expense_id)
        .bind(bike_id)
        .fetch_optional(&state.pool)
        .await?;
    Ok(row)
}

async fn list_expenses(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Expense>>> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let rows: Vec<Expense> = sqlx::query_as(
        "SELECT * FROM expenses WHERE bike_id = ? ORDER BY date DESC, expense_id DESC",
    )
    .bind(bike_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub notes: Option<String>,
}

async fn create_expense(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(bike_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateExpenseRequest>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let category = non_blank(req.category.as_deref());
    let date = non_blank(req.date.as_deref());
    let (Some(category), Some(amount), Some(date)) = (category, req.amount, date) else {
        return Err(bad_request("Category, amount and date are required"));
    };
    if !amount.is_finite() {
        return Err(bad_request("Invalid amount"));
    }
    let date = parse_date(&date)?;

    let result = sqlx::query(
        "INSERT INTO expenses (bike_id, category, amount, date, notes, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(bike_id)
    .bind(&category)
    .bind(amount)
    .bind(&date)
    .bind(non_blank(req.notes.as_deref()))
    .bind(chrono::Utc::now().timestamp())
    .execute(&state.pool)
    .await?;

    let expense = fetch_expense(&state, bike_id, result.last_insert_rowid())
        .await?
        .ok_or_else(|| not_found("Expense not found"))?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateExpenseRequest {
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub amount: Option<f64>,
    pub date: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

impl UpdateExpenseRequest {
    pub fn apply(self, mut expense: Expense) -> ApiResult<Expense> {
        if let Some(category) = self.category {
            expense.category = non_blank(Some(&category))
                .ok_or_else(|| bad_request("Category must not be empty"))?;
        }
        if let Some(amount) = self.amount {
            if !amount.is_finite() {
                return Err(bad_request("Invalid amount"));
            }
            expense.amount = amount;
        }
        if let Some(date) = self.date {
            expense.date = parse_date(&date)?;
        }
        if let Some(notes) = self.notes {
            expense.notes = non_blank(notes.as_deref());
        }
        Ok(expense)
    }
}

async fn update_expense(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((bike_id, expense_id)): ApiPath<(i64, i64)>,
    ApiJson(req): ApiJson<UpdateExpenseRequest>,
) -> ApiResult<Json<Expense>> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let existing = fetch_expense(&state, bike_id, expense_id)
        .await?
        .ok_or_else(|| not_found("Expense not found"))?;
    let expense = req.apply(existing)?;

    sqlx::query(
        "UPDATE expenses SET category = ?, amount = ?, date = ?, notes = ? WHERE expense_id = ? AND bike_id = ?",
    )
    .bind(&expense.category)
    .bind(expense.amount)
    .bind(&expense.date)
    .bind(&expense.notes)
    .bind(expense_id)
    .bind(bike_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(expense))
}

async fn delete_expense(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((bike_id, expense_id)): ApiPath<(i64, i64)>,
) -> ApiResult<StatusCode> {
    ensure_bike_owned(&state.pool, bike_id, user.id).await?;

    let result = sqlx::query("DELETE FROM expenses WHERE expense_id = ? AND bike_id = ?")
        .bind(expense_id)
        .bind(bike_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Expense not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense() -> Expense {
        Expense {
            expense_id: 1,
            bike_id: 1,
            category: "Fuel".to_string(),
            amount: 40.0,
            date: "2024-05-01".to_string(),
            notes: Some("full tank".to_string()),
            created_at: 0,
        }
    }

    #[test]
    fn test_apply_partial_update() {
        let patch: UpdateExpenseRequest = serde_json::from_str(r#"{"amount": 42.5}"#).unwrap();
        let updated = patch.apply(expense()).unwrap();
        assert_eq!(updated.amount, 42.5);
        assert_eq!(updated.category, "Fuel");
        assert_eq!(updated.notes.as_deref(), Some("full tank"));
    }

    #[test]
    fn test_apply_clears_notes_on_null() {
        let patch: UpdateExpenseRequest = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        assert_eq!(patch.apply(expense()).unwrap().notes, None);
    }

    #[test]
    fn test_apply_rejects_bad_date() {
        let patch: UpdateExpenseRequest = serde_json::from_str(r#"{"date": "05/01/2024"}"#).unwrap();
        assert_eq!(patch.apply(expense()).unwrap_err().message, "Invalid date");
    }
}
