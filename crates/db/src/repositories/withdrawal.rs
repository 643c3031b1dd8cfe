use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use repairflow_core::domain::material::CatalogItemId;
use repairflow_core::domain::repair::RepairId;
use repairflow_core::domain::withdrawal::{
    LineKey, WithdrawalTask, WithdrawalTaskId, WithdrawalTaskState,
};
use repairflow_core::errors::StoreError;
use repairflow_core::store::WithdrawalQueueStore;

use super::{db_err, decode_err, parse_ts};
use crate::DbPool;

pub struct SqlWithdrawalQueueRepository {
    pool: DbPool,
}

impl SqlWithdrawalQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "id, repair_id, catalog_item_id, quantity, purpose, note, line_key,
    state, retry_count, max_retries, available_at, last_error, withdrawal_request_id,
    state_version, created_at, updated_at";

fn task_from_row(row: &SqliteRow) -> Result<WithdrawalTask, StoreError> {
    let state_raw: String = row.try_get("state").map_err(db_err)?;
    let state = WithdrawalTaskState::parse(&state_raw)
        .ok_or_else(|| decode_err(format!("unknown withdrawal task state `{state_raw}`")))?;

    let quantity: i64 = row.try_get("quantity").map_err(db_err)?;
    let retry_count: i64 = row.try_get("retry_count").map_err(db_err)?;
    let max_retries: i64 = row.try_get("max_retries").map_err(db_err)?;
    let state_version: i64 = row.try_get("state_version").map_err(db_err)?;
    let available_at_raw: String = row.try_get("available_at").map_err(db_err)?;
    let created_at_raw: String = row.try_get("created_at").map_err(db_err)?;
    let updated_at_raw: String = row.try_get("updated_at").map_err(db_err)?;

    Ok(WithdrawalTask {
        id: WithdrawalTaskId(row.try_get("id").map_err(db_err)?),
        repair_id: RepairId(row.try_get("repair_id").map_err(db_err)?),
        catalog_item_id: CatalogItemId(row.try_get("catalog_item_id").map_err(db_err)?),
        quantity: u32::try_from(quantity)
            .map_err(|_| decode_err(format!("bad quantity {quantity}")))?,
        purpose: row.try_get("purpose").map_err(db_err)?,
        note: row.try_get("note").map_err(db_err)?,
        line_key: LineKey(row.try_get("line_key").map_err(db_err)?),
        state,
        retry_count: u32::try_from(retry_count)
            .map_err(|_| decode_err(format!("bad retry count {retry_count}")))?,
        max_retries: u32::try_from(max_retries)
            .map_err(|_| decode_err(format!("bad max retries {max_retries}")))?,
        available_at: parse_ts(&available_at_raw)?,
        last_error: row.try_get("last_error").map_err(db_err)?,
        withdrawal_request_id: row.try_get("withdrawal_request_id").map_err(db_err)?,
        state_version: u32::try_from(state_version)
            .map_err(|_| decode_err(format!("bad state version {state_version}")))?,
        created_at: parse_ts(&created_at_raw)?,
        updated_at: parse_ts(&updated_at_raw)?,
    })
}

#[async_trait::async_trait]
impl WithdrawalQueueStore for SqlWithdrawalQueueRepository {
    async fn find_by_id(
        &self,
        id: &WithdrawalTaskId,
    ) -> Result<Option<WithdrawalTask>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM withdrawal_task WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn find_by_line_key(
        &self,
        key: &LineKey,
    ) -> Result<Option<WithdrawalTask>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM withdrawal_task WHERE line_key = ?"
        ))
        .bind(&key.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn list_for_repair(
        &self,
        repair_id: &RepairId,
    ) -> Result<Vec<WithdrawalTask>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM withdrawal_task
             WHERE repair_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&repair_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(task_from_row).collect()
    }

    async fn save(&self, task: &WithdrawalTask) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO withdrawal_task (
                id, repair_id, catalog_item_id, quantity, purpose, note, line_key,
                state, retry_count, max_retries, available_at, last_error,
                withdrawal_request_id, state_version, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                available_at = excluded.available_at,
                last_error = excluded.last_error,
                withdrawal_request_id = excluded.withdrawal_request_id,
                state_version = excluded.state_version,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(&task.repair_id.0)
        .bind(&task.catalog_item_id.0)
        .bind(i64::from(task.quantity))
        .bind(&task.purpose)
        .bind(task.note.as_deref())
        .bind(&task.line_key.0)
        .bind(task.state.as_str())
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(task.available_at.to_rfc3339())
        .bind(task.last_error.as_deref())
        .bind(task.withdrawal_request_id.as_deref())
        .bind(i64::from(task.state_version))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
