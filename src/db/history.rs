use anyhow::Result;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;

use super::row_helpers::map_history_row;

const SELECT_HISTORY: &str = r#"
    SELECT id, actor, link_kind, source_kind, source_id, source_port,
           target_kind, target_id, target_port, action, old_values, new_values,
           created_at
    FROM connection_history
"#;

/// Audit trail operations. Records are only ever inserted, inside the same
/// transaction as the mutation they describe.
pub struct HistoryRepo;

impl HistoryRepo {
    pub async fn list(
        pool: &Pool<Sqlite>,
        query: &HistoryQuery,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<ConnectionHistory>> {
        let mut sql = format!("{} WHERE 1=1", SELECT_HISTORY);
        if query.source_kind.is_some() {
            sql.push_str(" AND source_kind = ?");
        }
        if query.source_id.is_some() {
            sql.push_str(" AND source_id = ?");
        }
        if query.source_port.is_some() {
            sql.push_str(" AND source_port = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql);
        if let Some(kind) = &query.source_kind {
            q = q.bind(kind);
        }
        if let Some(id) = query.source_id {
            q = q.bind(id);
        }
        if let Some(port) = query.source_port {
            q = q.bind(port);
        }
        let rows = q.bind(limit).bind(offset).fetch_all(pool).await?;

        Ok(rows.iter().map(map_history_row).collect())
    }

    /// Insert one audit record on the caller's transaction
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn record(
        conn: &mut SqliteConnection,
        actor: &str,
        link_kind: &str,
        source: (&str, i64, i64),
        target: (&str, i64, i64),
        action: &str,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Result<()> {
        let now = chrono::Utc::now();
        sqlx::query(
            r#"
            INSERT INTO connection_history (actor, link_kind, source_kind, source_id, source_port,
                target_kind, target_id, target_port, action, old_values, new_values, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(actor)
        .bind(link_kind)
        .bind(source.0)
        .bind(source.1)
        .bind(source.2)
        .bind(target.0)
        .bind(target.1)
        .bind(target.2)
        .bind(action)
        .bind(old_values.map(|v| v.to_string()))
        .bind(new_values.map(|v| v.to_string()))
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }
}
