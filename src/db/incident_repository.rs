use crate::models::incident::{
    Incident, IncidentDetail, IncidentImpact, IncidentStatus, IncidentUpdate,
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

pub struct IncidentRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> IncidentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        title: &str,
        status: IncidentStatus,
        impact: IncidentImpact,
        message: Option<&str>,
        started_at: i64,
        monitor_ids: &[i64],
    ) -> Result<i64, sqlx::Error> {
        tracing::info!("Creating incident '{}' linking {} monitors", title, monitor_ids.len());

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO incidents (title, status, impact, message, started_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(status.as_str())
        .bind(impact.as_str())
        .bind(message)
        .bind(started_at)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for monitor_id in monitor_ids {
            sqlx::query("INSERT OR IGNORE INTO incident_monitors (incident_id, monitor_id) VALUES (?, ?)")
                .bind(id)
                .bind(monitor_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Incident>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, title, status, impact, message, started_at, resolved_at FROM incidents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_incident(&r)).transpose()
    }

    pub async fn get_detail(&self, id: i64) -> Result<Option<IncidentDetail>, sqlx::Error> {
        let Some(incident) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let mut details = self.attach_details(vec![incident]).await?;
        Ok(details.pop())
    }

    /// Unresolved incidents, newest started first, with updates and links.
    pub async fn get_unresolved(&self, limit: i64) -> Result<Vec<IncidentDetail>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, status, impact, message, started_at, resolved_at
            FROM incidents
            WHERE status != 'resolved'
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        let incidents: Result<Vec<_>, _> = rows.iter().map(map_incident).collect();
        self.attach_details(incidents?).await
    }

    /// Paginated listing: active incidents first, then resolved by id
    /// descending. The keyset cursor walks the resolved tail.
    pub async fn get_page(
        &self,
        limit: i64,
        cursor: Option<i64>,
        resolved_only: bool,
    ) -> Result<Vec<IncidentDetail>, sqlx::Error> {
        let mut incidents: Vec<Incident> = Vec::new();

        if cursor.is_none() && !resolved_only {
            let active = sqlx::query(
                r#"
                SELECT id, title, status, impact, message, started_at, resolved_at
                FROM incidents WHERE status != 'resolved'
                ORDER BY id DESC LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
            for row in &active {
                incidents.push(map_incident(row)?);
            }
        }

        let remaining = limit - incidents.len() as i64;
        if remaining > 0 {
            let resolved = sqlx::query(
                r#"
                SELECT id, title, status, impact, message, started_at, resolved_at
                FROM incidents WHERE status = 'resolved' AND id < ?
                ORDER BY id DESC LIMIT ?
                "#,
            )
            .bind(cursor.unwrap_or(i64::MAX))
            .bind(remaining)
            .fetch_all(self.pool)
            .await?;
            for row in &resolved {
                incidents.push(map_incident(row)?);
            }
        }

        self.attach_details(incidents).await
    }

    /// Append an update, optionally advancing the incident status.
    pub async fn add_update(
        &self,
        incident_id: i64,
        status: Option<IncidentStatus>,
        message: &str,
        now: i64,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO incident_updates (incident_id, status, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(incident_id)
        .bind(status.map(|s| s.as_str()))
        .bind(message)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(status) = status {
            sqlx::query("UPDATE incidents SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(incident_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    /// Resolve an incident. Returns `(resolved_at, already_resolved)`;
    /// resolving twice never moves the original timestamp.
    pub async fn resolve(&self, id: i64, now: i64) -> Result<Option<(i64, bool)>, sqlx::Error> {
        let Some(incident) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(resolved_at) = incident.resolved_at {
            return Ok(Some((resolved_at, true)));
        }

        sqlx::query("UPDATE incidents SET status = 'resolved', resolved_at = ? WHERE id = ? AND resolved_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(Some((now, false)))
    }

    pub async fn delete(&self, id: i64) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM incident_updates WHERE incident_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM incident_monitors WHERE incident_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM incidents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn attach_details(
        &self,
        incidents: Vec<Incident>,
    ) -> Result<Vec<IncidentDetail>, sqlx::Error> {
        let mut details = Vec::with_capacity(incidents.len());

        for incident in incidents {
            let update_rows = sqlx::query(
                r#"
                SELECT id, incident_id, status, message, created_at
                FROM incident_updates WHERE incident_id = ?
                ORDER BY created_at ASC, id ASC
                "#,
            )
            .bind(incident.id)
            .fetch_all(self.pool)
            .await?;

            let updates: Result<Vec<_>, _> = update_rows.iter().map(map_update).collect();

            let link_rows = sqlx::query(
                "SELECT monitor_id FROM incident_monitors WHERE incident_id = ? ORDER BY monitor_id",
            )
            .bind(incident.id)
            .fetch_all(self.pool)
            .await?;

            let monitor_ids: Result<Vec<i64>, _> =
                link_rows.iter().map(|r| r.try_get("monitor_id")).collect();

            details.push(IncidentDetail {
                incident,
                updates: updates?,
                monitor_ids: monitor_ids?,
            });
        }

        Ok(details)
    }
}

fn map_incident(row: &SqliteRow) -> Result<Incident, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let impact: String = row.try_get("impact")?;
    Ok(Incident {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        status: IncidentStatus::parse(&status).unwrap_or(IncidentStatus::Investigating),
        impact: IncidentImpact::parse(&impact).unwrap_or(IncidentImpact::None),
        message: row.try_get("message")?,
        started_at: row.try_get("started_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn map_update(row: &SqliteRow) -> Result<IncidentUpdate, sqlx::Error> {
    let status: Option<String> = row.try_get("status")?;
    Ok(IncidentUpdate {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        status: status.as_deref().and_then(IncidentStatus::parse),
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let pool = test_pool().await;
        let repo = IncidentRepository::new(&pool);

        let id = repo
            .create("API degraded", IncidentStatus::Investigating, IncidentImpact::Minor, None, 100, &[1])
            .await
            .unwrap();

        let (first, already) = repo.resolve(id, 500).await.unwrap().unwrap();
        assert_eq!(first, 500);
        assert!(!already);

        let (second, already) = repo.resolve(id, 900).await.unwrap().unwrap();
        assert_eq!(second, 500);
        assert!(already);
    }

    #[tokio::test]
    async fn test_page_lists_active_before_resolved() {
        let pool = test_pool().await;
        let repo = IncidentRepository::new(&pool);

        let resolved = repo
            .create("old", IncidentStatus::Investigating, IncidentImpact::None, None, 100, &[1])
            .await
            .unwrap();
        repo.resolve(resolved, 200).await.unwrap();
        let active = repo
            .create("new", IncidentStatus::Identified, IncidentImpact::Major, None, 300, &[2])
            .await
            .unwrap();

        let page = repo.get_page(10, None, false).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|d| d.incident.id).collect();
        assert_eq!(ids, vec![active, resolved]);
    }

    #[tokio::test]
    async fn test_update_advances_status() {
        let pool = test_pool().await;
        let repo = IncidentRepository::new(&pool);

        let id = repo
            .create("x", IncidentStatus::Investigating, IncidentImpact::None, None, 100, &[1])
            .await
            .unwrap();
        repo.add_update(id, Some(IncidentStatus::Monitoring), "mitigated", 150)
            .await
            .unwrap();

        let detail = repo.get_detail(id).await.unwrap().unwrap();
        assert_eq!(detail.incident.status, IncidentStatus::Monitoring);
        assert_eq!(detail.updates.len(), 1);
        assert_eq!(detail.monitor_ids, vec![1]);
    }
}
