//! Case catalogue (read-only at runtime)

use caseai_common::{Case, Result};
use sqlx::SqlitePool;

type CaseRow = (i64, String, String, String);

fn to_case((case_id, title, description, content): CaseRow) -> Case {
    Case {
        case_id,
        title,
        description,
        content,
    }
}

pub async fn list_cases(pool: &SqlitePool) -> Result<Vec<Case>> {
    let rows: Vec<CaseRow> = sqlx::query_as(
        "SELECT case_id, title, description, content FROM cases ORDER BY case_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(to_case).collect())
}

pub async fn get_case(pool: &SqlitePool, case_id: i64) -> Result<Option<Case>> {
    let row: Option<CaseRow> = sqlx::query_as(
        "SELECT case_id, title, description, content FROM cases WHERE case_id = ?",
    )
    .bind(case_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(to_case))
}
