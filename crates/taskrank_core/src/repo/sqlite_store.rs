//! SQLite implementation of the rank store.
//!
//! # Responsibility
//! - Map `tasks` rows to `Task` and back.
//! - Run units of work inside `BEGIN IMMEDIATE` transactions.
//!
//! # Invariants
//! - Group listing is deterministic: `rank ASC, created_at ASC, uuid ASC`.
//! - Lock contention on begin/commit is retried wholesale, never partially.
//! - Deleting a task cascades to its subtasks through the `parent_uuid`
//!   foreign key.

use crate::db::migrations::latest_version;
use crate::model::task::{now_epoch_ms, GroupKey, Task, TaskId};
use crate::repo::rank_store::{RankStore, RankTx, StoreError, StoreResult};
use log::{debug, warn};
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const DEFAULT_MAX_TX_ATTEMPTS: u32 = 3;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    description,
    deadline,
    parent_uuid,
    rank,
    is_completed,
    completed_at,
    created_at,
    updated_at
FROM tasks";

const TASK_COLUMNS: [&str; 10] = [
    "uuid",
    "title",
    "description",
    "deadline",
    "parent_uuid",
    "rank",
    "is_completed",
    "completed_at",
    "created_at",
    "updated_at",
];

/// SQLite-backed rank store.
pub struct SqliteRankStore<'conn> {
    conn: &'conn Connection,
    max_attempts: u32,
}

impl<'conn> SqliteRankStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_task_connection_ready(conn)?;
        Ok(Self {
            conn,
            max_attempts: DEFAULT_MAX_TX_ATTEMPTS,
        })
    }

    /// Sets how many times a contended transaction is attempted in total.
    /// Values below one are treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

impl RankStore for SqliteRankStore<'_> {
    fn run_atomic<T, E, F>(&self, mut work: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RankTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let tx = match Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate) {
                Ok(tx) => tx,
                Err(err) if is_contention(&err) && attempt < self.max_attempts => {
                    warn!("event=tx_retry module=store status=retry phase=begin attempt={attempt} error={err}");
                    continue;
                }
                Err(err) => return Err(transaction_error(attempt, &err).into()),
            };

            // Dropping `tx` without commit rolls the unit back.
            let value = work(&mut SqliteUnit { conn: &tx })?;

            match tx.commit() {
                Ok(()) => {
                    debug!("event=tx_commit module=store status=ok attempt={attempt}");
                    return Ok(value);
                }
                Err(err) if is_contention(&err) && attempt < self.max_attempts => {
                    warn!("event=tx_retry module=store status=retry phase=commit attempt={attempt} error={err}");
                }
                Err(err) => return Err(transaction_error(attempt, &err).into()),
            }
        }
    }
}

struct SqliteUnit<'a> {
    conn: &'a Connection,
}

impl RankTx for SqliteUnit<'_> {
    fn list_group(&self, group: GroupKey, include_completed: bool) -> StoreResult<Vec<Task>> {
        let completion_filter = if include_completed {
            ""
        } else {
            " AND is_completed = 0"
        };
        let order = " ORDER BY is_completed ASC, rank ASC, created_at ASC, uuid ASC;";

        let mut tasks = Vec::new();
        match group {
            Some(parent) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{TASK_SELECT_SQL} WHERE parent_uuid = ?1{completion_filter}{order}"
                ))?;
                let mut rows = stmt.query([parent.to_string()])?;
                while let Some(row) = rows.next()? {
                    tasks.push(parse_task_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{TASK_SELECT_SQL} WHERE parent_uuid IS NULL{completion_filter}{order}"
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    tasks.push(parse_task_row(row)?);
                }
            }
        }
        Ok(tasks)
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn insert_task(&mut self, task: &Task) -> StoreResult<()> {
        task.validate()?;
        if self.get_task(task.id)?.is_some() {
            return Err(StoreError::DuplicateId(task.id));
        }
        if let Some(parent) = task.group_key {
            if self.get_task(parent)?.is_none() {
                return Err(StoreError::MissingParent(parent));
            }
        }

        self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                title,
                description,
                deadline,
                parent_uuid,
                rank,
                is_completed,
                completed_at,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                task.id.to_string(),
                task.title.as_str(),
                task.description.as_deref(),
                task.deadline,
                task.group_key.map(|value| value.to_string()),
                task.rank,
                bool_to_int(task.completed),
                task.completed_at,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update_task(&mut self, task: &Task) -> StoreResult<()> {
        task.validate()?;
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                title = ?2,
                description = ?3,
                deadline = ?4,
                parent_uuid = ?5,
                rank = ?6,
                is_completed = ?7,
                completed_at = ?8,
                updated_at = ?9
             WHERE uuid = ?1;",
            params![
                task.id.to_string(),
                task.title.as_str(),
                task.description.as_deref(),
                task.deadline,
                task.group_key.map(|value| value.to_string()),
                task.rank,
                bool_to_int(task.completed),
                task.completed_at,
                task.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingTask(task.id));
        }
        Ok(())
    }

    fn delete_task(&mut self, id: TaskId) -> StoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE uuid = ?1;", [id.to_string()])?;
        Ok(changed > 0)
    }

    fn bulk_reassign_ranks(&mut self, updates: &[(TaskId, i64)]) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let updated_at = now_epoch_ms();
        let mut stmt = self.conn.prepare_cached(
            "UPDATE tasks
             SET rank = ?2,
                 updated_at = ?3
             WHERE uuid = ?1;",
        )?;
        for (id, rank) in updates {
            if *rank < 0 {
                return Err(StoreError::InvalidData(format!(
                    "negative rank {rank} assigned to task {id}"
                )));
            }
            let changed = stmt.execute(params![id.to_string(), rank, updated_at])?;
            if changed == 0 {
                return Err(StoreError::MissingTask(*id));
            }
        }
        Ok(())
    }
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn transaction_error(attempts: u32, err: &rusqlite::Error) -> StoreError {
    StoreError::Transaction {
        attempts,
        reason: err.to_string(),
    }
}

fn parse_task_row(row: &Row<'_>) -> StoreResult<Task> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "tasks.uuid")?;

    let group_key = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "tasks.parent_uuid"))
        .transpose()?;

    let completed = match row.get::<_, i64>("is_completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_completed value `{other}` in tasks.is_completed"
            )));
        }
    };

    let task = Task {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        deadline: row.get("deadline")?,
        group_key,
        rank: row.get("rank")?,
        completed,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    task.validate()
        .map_err(|err| StoreError::InvalidData(format!("task {id}: {err}")))?;
    Ok(task)
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_task_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "tasks")? {
        return Err(StoreError::MissingRequiredTable("tasks"));
    }
    for column in TASK_COLUMNS {
        if !table_has_column(conn, "tasks", column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: "tasks",
                column,
            });
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::SqliteRankStore;
    use crate::db::open_db_in_memory;
    use crate::model::task::{NewTask, Task};
    use crate::repo::rank_store::{RankStore, StoreError};
    use rusqlite::Connection;

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteRankStore::try_new(&conn).err().unwrap();
        assert!(matches!(
            err,
            StoreError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn failed_unit_leaves_no_rows_behind() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteRankStore::try_new(&conn).unwrap();
        let task = Task::from_draft(NewTask::new("draft"), 0);

        let result: Result<(), StoreError> = store.run_atomic(|tx| {
            tx.insert_task(&task)?;
            Err(StoreError::InvalidData("forced".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get_task(task.id).unwrap().is_none());
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteRankStore::try_new(&conn).unwrap();
        let task = Task::from_draft(NewTask::new("once"), 0);

        store
            .run_atomic(|tx| tx.insert_task(&task))
            .unwrap();
        let err = store.run_atomic(|tx| tx.insert_task(&task)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == task.id));
    }
}
