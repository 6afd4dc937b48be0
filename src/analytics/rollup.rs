use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};

use crate::error::AppResult;

/// One month's revenue bucket for the dashboard chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyTotal {
    pub month: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

/// Read-only monthly rollup over the statement ledger.
///
/// Consumes committed ledger state with plain reads on the pool; it takes no
/// locks and never blocks (or is blocked by) ledger writers.
pub struct AnalyticsRollup {
    pub pool: PgPool,
}

impl AnalyticsRollup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Revenue per month for one year, optionally restricted to statements
    /// attributable to one instructor. Always returns twelve buckets.
    pub async fn revenue_by_month(
        &self,
        instructor_id: Option<i64>,
        year: i32,
    ) -> AppResult<Vec<MonthlyTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT EXTRACT(MONTH FROM s.created_at)::INT AS month, SUM(s.amount) AS total
            FROM statements s
            LEFT JOIN courses c ON s.course_id = c.id
            LEFT JOIN bundles b ON s.bundle_id = b.id
            WHERE EXTRACT(YEAR FROM s.created_at)::INT = $2
              AND ($1::BIGINT IS NULL OR c.instructor_id = $1 OR b.instructor_id = $1)
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(instructor_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            let month: i32 = row.try_get("month")?;
            let total: Decimal = row.try_get("total")?;
            totals.push((month, total));
        }

        Ok(fill_months(&totals))
    }
}

/// Expand sparse (month, total) rows into twelve zero-filled buckets.
fn fill_months(rows: &[(i32, Decimal)]) -> Vec<MonthlyTotal> {
    (1..=12u32)
        .map(|month| MonthlyTotal {
            month,
            total: rows
                .iter()
                .find(|(m, _)| *m == month as i32)
                .map(|(_, total)| *total)
                .unwrap_or(Decimal::ZERO),
        })
        .collect()
}
