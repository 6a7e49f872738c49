//! Per-user dashboard: spending totals, recent activity, mileage history.

use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlx::FromRow;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::server::AppState;

const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BikeSummary {
    pub bike_id: i64,
    pub brand: String,
    pub model: String,
    pub current_mileage: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceSummary {
    pub bike_id: i64,
    pub service_date: String,
    pub cost: f64,
    pub service_type: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ExpenseSummary {
    pub bike_id: i64,
    pub date: String,
    pub amount: f64,
    pub category: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct MileageRow {
    pub bike_id: i64,
    pub date: String,
    pub mileage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MileagePoint {
    pub date: String,
    pub mileage: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_spending: f64,
    pub monthly_cost: f64,
    pub service_count: usize,
    pub bike_count: usize,
    pub services: Vec<ServiceSummary>,
    pub expenses: Vec<ExpenseSummary>,
    pub mileage_by_bike: BTreeMap<i64, Vec<MileagePoint>>,
    pub bikes: Vec<BikeSummary>,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate the dashboard from already-fetched rows.
///
/// `services` and `expenses` are expected newest first and `mileage` oldest
/// first; `month` is a `YYYY-MM` prefix matched against record dates.
pub fn summarize(
    bikes: Vec<BikeSummary>,
    services: Vec<ServiceSummary>,
    expenses: Vec<ExpenseSummary>,
    mileage: Vec<MileageRow>,
    month: &str,
) -> DashboardStats {
    let total: f64 =
        expenses.iter().map(|e| e.amount).sum::<f64>() + services.iter().map(|s| s.cost).sum::<f64>();

    let monthly: f64 = expenses
        .iter()
        .filter(|e| e.date.starts_with(month))
        .map(|e| e.amount)
        .sum::<f64>()
        + services
            .iter()
            .filter(|s| s.service_date.starts_with(month))
            .map(|s| s.cost)
            .sum::<f64>();

    let mut mileage_by_bike: BTreeMap<i64, Vec<MileagePoint>> =
        bikes.iter().map(|b| (b.bike_id, Vec::new())).collect();
    for row in mileage {
        if let Some(points) = mileage_by_bike.get_mut(&row.bike_id) {
            points.push(MileagePoint {
                date: row.date,
                mileage: row.mileage,
            });
        }
    }

    let service_count = services.len();
    DashboardStats {
        total_spending: round_cents(total),
        monthly_cost: round_cents(monthly),
        service_count,
        bike_count: bikes.len(),
        services: services.into_iter().take(RECENT_LIMIT).collect(),
        expenses: expenses.into_iter().take(RECENT_LIMIT).collect(),
        mileage_by_bike,
        bikes,
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(dashboard_stats))
}

async fn dashboard_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<DashboardStats>> {
    let pool = &state.pool;

    let bikes: Vec<BikeSummary> = sqlx::query_as(
        "SELECT bike_id, brand, model, current_mileage FROM bikes WHERE user_id = ? ORDER BY bike_id",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let services: Vec<ServiceSummary> = sqlx::query_as(
        r#"
        SELECT s.bike_id, s.service_date, s.cost, s.service_type
        FROM services s JOIN bikes b ON s.bike_id = b.bike_id
        WHERE b.user_id = ?
        ORDER BY s.service_date DESC, s.service_id DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let expenses: Vec<ExpenseSummary> = sqlx::query_as(
        r#"
        SELECT e.bike_id, e.date, e.amount, e.category
        FROM expenses e JOIN bikes b ON e.bike_id = b.bike_id
        WHERE b.user_id = ?
        ORDER BY e.date DESC, e.expense_id DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let mileage: Vec<MileageRow> = sqlx::query_as(
        r#"
        SELECT m.bike_id, m.date, m.mileage
        FROM mileage_logs m JOIN bikes b ON m.bike_id = b.bike_id
        WHERE b.user_id = ?
        ORDER BY m.date ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let month = chrono::Utc::now().format("%Y-%m").to_string();
    Ok(Json(summarize(bikes, services, expenses, mileage, &month)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bike(id: i64) -> BikeSummary {
        BikeSummary {
            bike_id: id,
            brand: "Honda".to_string(),
            model: "CB500F".to_string(),
            current_mileage: 0,
        }
    }

    fn service(date: &str, cost: f64) -> ServiceSummary {
        ServiceSummary {
            bike_id: 1,
            service_date: date.to_string(),
            cost,
            service_type: "Oil change".to_string(),
        }
    }

    fn expense(date: &str, amount: f64) -> ExpenseSummary {
        ExpenseSummary {
            bike_id: 1,
            date: date.to_string(),
            amount,
            category: "Fuel".to_string(),
        }
    }

    #[test]
    fn test_totals_round_to_cents() {
        let stats = summarize(
            vec![bike(1)],
            vec![service("2024-05-02", 10.123), service("2024-04-01", 20.0)],
            vec![expense("2024-05-10", 0.1), expense("2023-12-31", 0.2)],
            vec![],
            "2024-05",
        );
        assert_eq!(stats.total_spending, 30.42);
        assert_eq!(stats.monthly_cost, 10.22);
        assert_eq!(stats.service_count, 2);
        assert_eq!(stats.bike_count, 1);
    }

    #[test]
    fn test_recent_lists_capped_at_ten() {
        let services: Vec<_> = (0..12).map(|i| service(&format!("2024-01-{:02}", 20 - i), 1.0)).collect();
        let stats = summarize(vec![bike(1)], services, vec![], vec![], "2024-01");
        assert_eq!(stats.services.len(), 10);
        assert_eq!(stats.service_count, 12);
        assert_eq!(stats.services[0].service_date, "2024-01-20");
    }

    #[test]
    fn test_mileage_grouped_per_bike() {
        let mileage = vec![
            MileageRow {
                bike_id: 1,
                date: "2024-01-01".to_string(),
                mileage: 100,
            },
            MileageRow {
                bike_id: 1,
                date: "2024-02-01".to_string(),
                mileage: 250,
            },
            MileageRow {
                bike_id: 9,
                date: "2024-02-01".to_string(),
                mileage: 5,
            },
        ];
        let stats = summarize(vec![bike(1), bike(2)], vec![], vec![], mileage, "2024-02");

        assert_eq!(stats.mileage_by_bike.len(), 2);
        assert_eq!(stats.mileage_by_bike[&1].len(), 2);
        assert_eq!(stats.mileage_by_bike[&1][1].mileage, 250);
        assert!(stats.mileage_by_bike[&2].is_empty());
    }

    #[test]
    fn test_serializes_camel_case_keys() {
        let stats = summarize(vec![bike(3)], vec![], vec![], vec![], "2024-01");
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalSpending"], 0.0);
        assert!(json["mileageByBike"]["3"].as_array().unwrap().is_empty());
        assert_eq!(json["bikeCount"], 1);
    }
}
