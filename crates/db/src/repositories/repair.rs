use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use repairflow_core::domain::phase::{
    AcceptancePhase, InspectionPhase, RequestPhase, RequestStatus, ReviewStatus,
};
use repairflow_core::domain::repair::{DepartmentId, DeviceId, Repair, RepairId, UserId};
use repairflow_core::errors::StoreError;
use repairflow_core::store::{revision_mismatch, RepairStore, SavedRevision};

use super::{db_err, decode_err, from_json, opt_from_json, opt_parse_ts, opt_to_json, parse_ts, to_json};
use crate::DbPool;

/// The aggregate is one row-group: a `repair` row plus at most one
/// `inspection_phase` and one `acceptance_phase` row. Saves run in a
/// single transaction guarded by the aggregate revision.
pub struct SqlRepairRepository {
    pool: DbPool,
}

impl SqlRepairRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn request_from_row(row: &SqliteRow) -> Result<RequestPhase, StoreError> {
    let status_raw: String = row.try_get("request_status").map_err(db_err)?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("unknown request status `{status_raw}`")))?;

    Ok(RequestPhase {
        status,
        tech_signoff: opt_from_json(row.try_get("request_tech_signoff").map_err(db_err)?)?,
        team_lead_signoff: opt_from_json(
            row.try_get("request_team_lead_signoff").map_err(db_err)?,
        )?,
        director_signoff: opt_from_json(
            row.try_get("request_director_signoff").map_err(db_err)?,
        )?,
        completed_at: opt_parse_ts(row.try_get("request_completed_at").map_err(db_err)?)?,
        rejection: opt_from_json(row.try_get("request_rejection").map_err(db_err)?)?,
    })
}

fn repair_from_rows(
    row: &SqliteRow,
    inspection: Option<InspectionPhase>,
    acceptance: Option<AcceptancePhase>,
) -> Result<Repair, StoreError> {
    let created_at_raw: String = row.try_get("created_at").map_err(db_err)?;
    let revision: i64 = row.try_get("revision").map_err(db_err)?;

    Ok(Repair {
        id: RepairId(row.try_get("id").map_err(db_err)?),
        device_id: DeviceId(row.try_get("device_id").map_err(db_err)?),
        department_id: DepartmentId(row.try_get("department_id").map_err(db_err)?),
        issue: row.try_get("issue").map_err(db_err)?,
        recommendation: row.try_get("recommendation").map_err(db_err)?,
        created_by: UserId(row.try_get("created_by").map_err(db_err)?),
        created_at: parse_ts(&created_at_raw)?,
        canceled: row.try_get::<i64, _>("canceled").map_err(db_err)? != 0,
        canceled_at: opt_parse_ts(row.try_get("canceled_at").map_err(db_err)?)?,
        process_completed_at: opt_parse_ts(
            row.try_get("process_completed_at").map_err(db_err)?,
        )?,
        revision: u32::try_from(revision)
            .map_err(|_| decode_err(format!("bad revision {revision}")))?,
        request: request_from_row(row)?,
        inspection,
        acceptance,
    })
}

fn inspection_from_row(row: &SqliteRow) -> Result<InspectionPhase, StoreError> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = ReviewStatus::decode("inspection", &status_raw)
        .ok_or_else(|| decode_err(format!("unknown inspection status `{status_raw}`")))?;
    let created_at_raw: String = row.try_get("created_at").map_err(db_err)?;
    let committee_raw: String = row.try_get("committee_json").map_err(db_err)?;
    let findings_raw: String = row.try_get("findings_json").map_err(db_err)?;
    let replacements_raw: String = row.try_get("replacements_json").map_err(db_err)?;

    Ok(InspectionPhase {
        status,
        committee: from_json(&committee_raw)?,
        findings: from_json(&findings_raw)?,
        replacements: from_json(&replacements_raw)?,
        created_by: UserId(row.try_get("created_by").map_err(db_err)?),
        created_at: parse_ts(&created_at_raw)?,
        manager_signoff: opt_from_json(row.try_get("manager_signoff").map_err(db_err)?)?,
        admin_signoff: opt_from_json(row.try_get("admin_signoff").map_err(db_err)?)?,
        approved_at: opt_parse_ts(row.try_get("approved_at").map_err(db_err)?)?,
        duration_minutes: row.try_get("duration_minutes").map_err(db_err)?,
        rejection: opt_from_json(row.try_get("rejection_json").map_err(db_err)?)?,
    })
}

fn acceptance_from_row(row: &SqliteRow) -> Result<AcceptancePhase, StoreError> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = ReviewStatus::decode("acceptance", &status_raw)
        .ok_or_else(|| decode_err(format!("unknown acceptance status `{status_raw}`")))?;
    let created_at_raw: String = row.try_get("created_at").map_err(db_err)?;
    let committee_raw: String = row.try_get("committee_json").map_err(db_err)?;
    let recovered_raw: String = row.try_get("recovered_json").map_err(db_err)?;
    let scrap_raw: String = row.try_get("scrap_json").map_err(db_err)?;

    Ok(AcceptancePhase {
        status,
        committee: from_json(&committee_raw)?,
        failure_description: row.try_get("failure_description").map_err(db_err)?,
        failure_cause: row.try_get("failure_cause").map_err(db_err)?,
        recovered: from_json(&recovered_raw)?,
        scrap: from_json(&scrap_raw)?,
        conclusion: row.try_get("conclusion").map_err(db_err)?,
        other_opinions: row.try_get("other_opinions").map_err(db_err)?,
        created_by: UserId(row.try_get("created_by").map_err(db_err)?),
        created_at: parse_ts(&created_at_raw)?,
        manager_signoff: opt_from_json(row.try_get("manager_signoff").map_err(db_err)?)?,
        admin_signoff: opt_from_json(row.try_get("admin_signoff").map_err(db_err)?)?,
        approved_at: opt_parse_ts(row.try_get("approved_at").map_err(db_err)?)?,
        duration_minutes: row.try_get("duration_minutes").map_err(db_err)?,
        rejection: opt_from_json(row.try_get("rejection_json").map_err(db_err)?)?,
    })
}

#[async_trait::async_trait]
impl RepairStore for SqlRepairRepository {
    async fn load(&self, id: &RepairId) -> Result<Option<Repair>, StoreError> {
        let Some(repair_row) = sqlx::query("SELECT * FROM repair WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let inspection = sqlx::query("SELECT * FROM inspection_phase WHERE repair_id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(inspection_from_row)
            .transpose()?;

        let acceptance = sqlx::query("SELECT * FROM acceptance_phase WHERE repair_id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(acceptance_from_row)
            .transpose()?;

        Ok(Some(repair_from_rows(&repair_row, inspection, acceptance)?))
    }

    async fn save(&self, repair: &Repair) -> Result<SavedRevision, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let found: u32 = sqlx::query("SELECT revision FROM repair WHERE id = ?")
            .bind(&repair.id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .map(|row| row.try_get::<i64, _>("revision").map_err(db_err))
            .transpose()?
            .map(|revision| {
                u32::try_from(revision)
                    .map_err(|_| decode_err(format!("bad revision {revision}")))
            })
            .transpose()?
            .unwrap_or(0);

        if found != repair.revision {
            return Err(revision_mismatch(repair, found));
        }
        let next = repair.revision + 1;

        sqlx::query(
            "INSERT INTO repair (
                id, device_id, department_id, issue, recommendation, created_by,
                created_at, canceled, canceled_at, process_completed_at, revision,
                request_status, request_tech_signoff, request_team_lead_signoff,
                request_director_signoff, request_completed_at, request_rejection
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                issue = excluded.issue,
                recommendation = excluded.recommendation,
                canceled = excluded.canceled,
                canceled_at = excluded.canceled_at,
                process_completed_at = excluded.process_completed_at,
                revision = excluded.revision,
                request_status = excluded.request_status,
                request_tech_signoff = excluded.request_tech_signoff,
                request_team_lead_signoff = excluded.request_team_lead_signoff,
                request_director_signoff = excluded.request_director_signoff,
                request_completed_at = excluded.request_completed_at,
                request_rejection = excluded.request_rejection",
        )
        .bind(&repair.id.0)
        .bind(&repair.device_id.0)
        .bind(&repair.department_id.0)
        .bind(&repair.issue)
        .bind(&repair.recommendation)
        .bind(&repair.created_by.0)
        .bind(repair.created_at.to_rfc3339())
        .bind(i64::from(repair.canceled))
        .bind(repair.canceled_at.map(|value| value.to_rfc3339()))
        .bind(repair.process_completed_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(next))
        .bind(repair.request.status.as_str())
        .bind(opt_to_json(&repair.request.tech_signoff)?)
        .bind(opt_to_json(&repair.request.team_lead_signoff)?)
        .bind(opt_to_json(&repair.request.director_signoff)?)
        .bind(repair.request.completed_at.map(|value| value.to_rfc3339()))
        .bind(opt_to_json(&repair.request.rejection)?)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        match &repair.inspection {
            Some(phase) => {
                sqlx::query(
                    "INSERT INTO inspection_phase (
                        repair_id, status, committee_json, findings_json,
                        replacements_json, created_by, created_at, manager_signoff,
                        admin_signoff, approved_at, duration_minutes, rejection_json
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(repair_id) DO UPDATE SET
                        status = excluded.status,
                        committee_json = excluded.committee_json,
                        findings_json = excluded.findings_json,
                        replacements_json = excluded.replacements_json,
                        manager_signoff = excluded.manager_signoff,
                        admin_signoff = excluded.admin_signoff,
                        approved_at = excluded.approved_at,
                        duration_minutes = excluded.duration_minutes,
                        rejection_json = excluded.rejection_json",
                )
                .bind(&repair.id.0)
                .bind(phase.status.encode("inspection"))
                .bind(to_json(&phase.committee)?)
                .bind(to_json(&phase.findings)?)
                .bind(to_json(&phase.replacements)?)
                .bind(&phase.created_by.0)
                .bind(phase.created_at.to_rfc3339())
                .bind(opt_to_json(&phase.manager_signoff)?)
                .bind(opt_to_json(&phase.admin_signoff)?)
                .bind(phase.approved_at.map(|value| value.to_rfc3339()))
                .bind(phase.duration_minutes)
                .bind(opt_to_json(&phase.rejection)?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            None => {
                sqlx::query("DELETE FROM inspection_phase WHERE repair_id = ?")
                    .bind(&repair.id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        match &repair.acceptance {
            Some(phase) => {
                sqlx::query(
                    "INSERT INTO acceptance_phase (
                        repair_id, status, committee_json, failure_description,
                        failure_cause, recovered_json, scrap_json, conclusion,
                        other_opinions, created_by, created_at, manager_signoff,
                        admin_signoff, approved_at, duration_minutes, rejection_json
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(repair_id) DO UPDATE SET
                        status = excluded.status,
                        committee_json = excluded.committee_json,
                        failure_description = excluded.failure_description,
                        failure_cause = excluded.failure_cause,
                        recovered_json = excluded.recovered_json,
                        scrap_json = excluded.scrap_json,
                        conclusion = excluded.conclusion,
                        other_opinions = excluded.other_opinions,
                        manager_signoff = excluded.manager_signoff,
                        admin_signoff = excluded.admin_signoff,
                        approved_at = excluded.approved_at,
                        duration_minutes = excluded.duration_minutes,
                        rejection_json = excluded.rejection_json",
                )
                .bind(&repair.id.0)
                .bind(phase.status.encode("acceptance"))
                .bind(to_json(&phase.committee)?)
                .bind(&phase.failure_description)
                .bind(&phase.failure_cause)
                .bind(to_json(&phase.recovered)?)
                .bind(to_json(&phase.scrap)?)
                .bind(&phase.conclusion)
                .bind(phase.other_opinions.as_deref())
                .bind(&phase.created_by.0)
                .bind(phase.created_at.to_rfc3339())
                .bind(opt_to_json(&phase.manager_signoff)?)
                .bind(opt_to_json(&phase.admin_signoff)?)
                .bind(phase.approved_at.map(|value| value.to_rfc3339()))
                .bind(phase.duration_minutes)
                .bind(opt_to_json(&phase.rejection)?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            None => {
                sqlx::query("DELETE FROM acceptance_phase WHERE repair_id = ?")
                    .bind(&repair.id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(next)
    }
}
