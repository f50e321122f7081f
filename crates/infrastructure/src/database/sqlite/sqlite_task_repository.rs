use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cronlease_core::{config::models::DatabaseConfig, SchedulerError, SchedulerResult};
use cronlease_domain::{
    entities::{Lease, ScheduleSnapshot, Task, TaskFilter, TaskStatusUpdate},
    repositories::TaskRepository,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::database::{manager::DatabaseManager, mapping::MappingHelpers};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

const TASK_COLUMNS: &str = "id, name, status, schedule_type, schedule_value, next_execution_date, \
     locked_at, lock_expires, test_type, experiment_type, notification_emails, created_at";

/// 到期、未失败且未持有有效租约。租约到期时刻本身即可被重新认领。
/// 失败的任务不会自动重试，需经API重新编排。
const DUE_UNLOCKED_PREDICATE: &str = "next_execution_date IS NOT NULL \
     AND next_execution_date <= ?1 \
     AND status <> 'Failed' \
     AND (locked_at IS NULL OR lock_expires <= ?2)";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 按配置连接数据库并初始化表结构
    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let manager = DatabaseManager::new(config)
            .await
            .map_err(|e| SchedulerError::StoreUnavailable(format!("{e:#}")))?;
        let pool = manager.pool().clone();
        Self::run_migrations(&pool).await?;
        debug!("SQLite任务仓库已就绪: {}", config.url);
        Ok(Self { pool })
    }

    /// 创建嵌入式SQLite任务仓库，自动初始化数据库
    pub async fn new_embedded(database_url: &str) -> SchedulerResult<Self> {
        let config = DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        };
        Self::connect(&config).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 运行数据库迁移
    pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Scheduled',
                schedule_type TEXT NOT NULL,
                schedule_value TEXT NOT NULL,
                next_execution_date INTEGER,
                locked_at INTEGER,
                lock_expires INTEGER,
                test_type TEXT NOT NULL DEFAULT 'null',
                experiment_type TEXT NOT NULL DEFAULT 'null',
                notification_emails TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_tasks_next_execution_date ON tasks(next_execution_date)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        let id: String = row.try_get("id")?;
        let id = Uuid::from_str(&id)
            .map_err(|e| SchedulerError::Serialization(format!("无效的任务ID {id}: {e}")))?;

        Ok(Task {
            id,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            schedule_type: row.try_get("schedule_type")?,
            schedule_value: row.try_get("schedule_value")?,
            next_execution_date: MappingHelpers::parse_optional_instant(
                row,
                "next_execution_date",
            )?,
            locked_at: MappingHelpers::parse_optional_instant(row, "locked_at")?,
            lock_expires: MappingHelpers::parse_optional_instant(row, "lock_expires")?,
            test_type: MappingHelpers::parse_json(row, "test_type")?,
            experiment_type: MappingHelpers::parse_json(row, "experiment_type")?,
            notification_emails: MappingHelpers::parse_emails(row, "notification_emails")?,
            created_at: MappingHelpers::parse_instant(row, "created_at")?,
        })
    }

    async fn select_due_unlocked(
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> Result<Vec<SqliteRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {DUE_UNLOCKED_PREDICATE} \
             ORDER BY next_execution_date, created_at"
        );
        sqlx::query(&sql)
            .bind(MappingHelpers::to_millis(now + lookahead))
            .bind(MappingHelpers::to_millis(now))
            .fetch_all(conn)
            .await
    }

    /// 条件写入：仅当任务未失败且仍未锁定或租约已过期时加锁
    async fn try_lock(
        conn: &mut SqliteConnection,
        id: Uuid,
        lease: &Lease,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET locked_at = ?1, lock_expires = ?2 \
             WHERE id = ?3 AND status <> 'Failed' \
             AND (locked_at IS NULL OR lock_expires <= ?1)",
        )
        .bind(MappingHelpers::to_millis(lease.locked_at))
        .bind(MappingHelpers::to_millis(lease.expires))
        .bind(id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name))]
    async fn create(&self, task: &Task) -> SchedulerResult<Task> {
        let sql = format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(task.id.to_string())
            .bind(&task.name)
            .bind(task.status)
            .bind(task.schedule_type)
            .bind(&task.schedule_value)
            .bind(MappingHelpers::to_millis_opt(task.next_execution_date))
            .bind(MappingHelpers::to_millis_opt(task.locked_at))
            .bind(MappingHelpers::to_millis_opt(task.lock_expires))
            .bind(serde_json::to_string(&task.test_type)?)
            .bind(serde_json::to_string(&task.experiment_type)?)
            .bind(serde_json::to_string(&task.notification_emails)?)
            .bind(MappingHelpers::to_millis(task.created_at))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(RepositoryOperation::Create, Some(task.id), e)
            })?;

        let created_task = Self::row_to_task(&row)?;
        RepositoryErrorHelpers::log_operation_success(
            RepositoryOperation::Create,
            &created_task.entity_description(),
        );
        Ok(created_task)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn read_task(&self, id: Uuid) -> SchedulerResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(RepositoryOperation::Read, Some(id), e)
            })?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => {
                debug!("查询任务不存在: ID {}", id);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.schedule_type.is_some() {
            sql.push_str(" AND schedule_type = ?");
        }
        if filter.name_contains.is_some() {
            sql.push_str(" AND instr(name, ?) > 0");
        }
        sql.push_str(" ORDER BY created_at, id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(schedule_type) = filter.schedule_type {
            query = query.bind(schedule_type);
        }
        if let Some(pattern) = &filter.name_contains {
            query = query.bind(pattern.clone());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            RepositoryErrorHelpers::database_error(RepositoryOperation::Query, None, e)
        })?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name))]
    async fn update(&self, task: &Task, observed: &ScheduleSnapshot) -> SchedulerResult<Task> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET name = ?2, status = ?3, schedule_type = ?4, schedule_value = ?5,
                next_execution_date = ?6, test_type = ?7, experiment_type = ?8,
                notification_emails = ?9
            WHERE id = ?1 AND status = ?10 AND next_execution_date IS ?11
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.name)
        .bind(task.status)
        .bind(task.schedule_type)
        .bind(&task.schedule_value)
        .bind(MappingHelpers::to_millis_opt(task.next_execution_date))
        .bind(serde_json::to_string(&task.test_type)?)
        .bind(serde_json::to_string(&task.experiment_type)?)
        .bind(serde_json::to_string(&task.notification_emails)?)
        .bind(observed.status)
        .bind(MappingHelpers::to_millis_opt(observed.next_execution_date))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(RepositoryOperation::Update, Some(task.id), e)
        })?;

        if result.rows_affected() == 0 {
            return match self.read_task(task.id).await? {
                Some(_) => Err(SchedulerError::ConcurrentModification { id: task.id }),
                None => Err(SchedulerError::TaskNotFound { id: task.id }),
            };
        }

        RepositoryErrorHelpers::log_operation_success(
            RepositoryOperation::Update,
            &task.entity_description(),
        );
        self.read_task(task.id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id: task.id })
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn delete(&self, id: Uuid) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(RepositoryOperation::Delete, Some(id), e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_due_unlocked(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> SchedulerResult<Vec<Task>> {
        let mut conn = self.pool.acquire().await.map_err(SchedulerError::from_store)?;
        let rows = Self::select_due_unlocked(&mut conn, now, lookahead)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(RepositoryOperation::Query, None, e)
            })?;
        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn lock_tasks(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let lease = Lease::new(now, lease_duration);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(RepositoryErrorHelpers::claim_error)?;

        let mut locked = Vec::with_capacity(ids.len());
        for &id in ids {
            if Self::try_lock(&mut tx, id, &lease)
                .await
                .map_err(RepositoryErrorHelpers::claim_error)?
            {
                locked.push(id);
            }
        }

        tx.commit().await.map_err(RepositoryErrorHelpers::claim_error)?;
        Ok(locked)
    }

    #[instrument(skip(self))]
    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        lease_duration: Duration,
    ) -> SchedulerResult<Vec<Task>> {
        let lease = Lease::new(now, lease_duration);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(RepositoryErrorHelpers::claim_error)?;

        let rows = Self::select_due_unlocked(&mut tx, now, lookahead)
            .await
            .map_err(RepositoryErrorHelpers::claim_error)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let task = Self::row_to_task(row)?;
            if Self::try_lock(&mut tx, task.id, &lease)
                .await
                .map_err(RepositoryErrorHelpers::claim_error)?
            {
                claimed.push(task);
            }
        }

        tx.commit().await.map_err(RepositoryErrorHelpers::claim_error)?;

        if !claimed.is_empty() {
            debug!("本次认领{}个任务，租约到期时间: {}", claimed.len(), lease.expires);
        }
        Ok(claimed)
    }

    #[instrument(skip(self, update), fields(task_id = %id, status = %update.status))]
    async fn write_task_status(&self, id: Uuid, update: &TaskStatusUpdate) -> SchedulerResult<()> {
        let lease = update.lease.value();
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?1,
                locked_at = CASE WHEN ?2 THEN ?3 ELSE locked_at END,
                lock_expires = CASE WHEN ?2 THEN ?4 ELSE lock_expires END,
                next_execution_date = CASE WHEN ?5 THEN ?6 ELSE next_execution_date END
            WHERE id = ?7
            "#,
        )
        .bind(update.status)
        .bind(update.lease.is_change())
        .bind(lease.map(|l| MappingHelpers::to_millis(l.locked_at)))
        .bind(lease.map(|l| MappingHelpers::to_millis(l.expires)))
        .bind(update.next_execution_date.is_change())
        .bind(
            update
                .next_execution_date
                .value()
                .map(|next| MappingHelpers::to_millis(*next)),
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(RepositoryOperation::StatusWrite, Some(id), e)
        })?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }
        Ok(())
    }
}
