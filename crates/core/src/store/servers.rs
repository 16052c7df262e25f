//! Server and instance identity rows.

use sqlx::{Row, SqliteConnection};

use crate::error::Result;
use crate::model::InstanceRecord;

pub async fn upsert_server(conn: &mut SqliteConnection, hostname: &str) -> Result<i64> {
    let existing = sqlx::query("SELECT id FROM servers WHERE hostname = ?")
        .bind(hostname)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = existing {
        return Ok(row.get("id"));
    }
    let result = sqlx::query("INSERT INTO servers (hostname) VALUES (?)")
        .bind(hostname)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn upsert_instance(
    conn: &mut SqliteConnection,
    server_id: i64,
    instance_name: &str,
    port: Option<u16>,
) -> Result<i64> {
    let existing =
        sqlx::query("SELECT id FROM instances WHERE server_id = ? AND instance_name = ?")
            .bind(server_id)
            .bind(instance_name)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some(row) = existing {
        return Ok(row.get("id"));
    }
    let result = sqlx::query("INSERT INTO instances (server_id, instance_name, port) VALUES (?, ?, ?)")
        .bind(server_id)
        .bind(instance_name)
        .bind(port.map(|p| p as i64))
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_instances(conn: &mut SqliteConnection) -> Result<Vec<InstanceRecord>> {
    let rows = sqlx::query("SELECT id, server_id, instance_name, port FROM instances ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| InstanceRecord {
            id: row.get("id"),
            server_id: row.get("server_id"),
            instance_name: row.get("instance_name"),
            port: row.get::<Option<i64>, _>("port").map(|p| p as u16),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn upserts_are_stable() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let s1 = upsert_server(&mut conn, "srv1").await.unwrap();
        let s1_again = upsert_server(&mut conn, "srv1").await.unwrap();
        assert_eq!(s1, s1_again);

        let i1 = upsert_instance(&mut conn, s1, "DEFAULT", Some(1433)).await.unwrap();
        let i1_again = upsert_instance(&mut conn, s1, "DEFAULT", Some(1433)).await.unwrap();
        assert_eq!(i1, i1_again);

        let i2 = upsert_instance(&mut conn, s1, "PORT1533", Some(1533)).await.unwrap();
        assert_ne!(i1, i2);
    }
}
