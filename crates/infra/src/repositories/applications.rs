use std::sync::Arc;

use dernek_domain::applications::{AidApplication, HistoryEntry, Priority};
use dernek_domain::ports::BoxFuture;
use dernek_domain::ports::applications::{ApplicationStore, StoreError, TransitionWrite};
use dernek_domain::util::{format_ms_rfc3339, parse_rfc3339_ms};
use dernek_domain::workflow::WorkflowStage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::db::{self, DbConfig};

const SELECT_APPLICATION: &str = "SELECT application_id, applicant_name, aid_type, \
        requested_amount, notes, stage, history, assigned_to, due_date, priority, \
        created_by, <string>created_at AS created_at, <string>updated_at AS updated_at \
     FROM aid_application";

/// Guards on the stage the history replays to, which is the stage readers
/// see, so a record whose `stage` field drifted still accepts transitions.
/// Absent assignment fields keep their stored values.
const APPLY_TRANSITION: &str = "UPDATE aid_application SET \
        stage = $stage, \
        history += $entry, \
        assigned_to = $assigned_to ?? assigned_to, \
        due_date = $due_date ?? due_date, \
        priority = $priority ?? priority, \
        updated_at = <datetime>$updated_at \
     WHERE application_id = $application_id \
        AND (array::last(history).to_stage ?? stage) = $expected_stage \
     RETURN application_id;";

/// Applications as single documents in SurrealDB. Stage and history live
/// in the same record, so one `UPDATE` moves both.
#[derive(Clone)]
pub struct SurrealApplicationStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealApplicationStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        let client = db::connect(db_config).await?;
        let store = Self::with_client(Arc::new(client));
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS aid_application_id ON TABLE aid_application \
                    FIELDS application_id UNIQUE; \
                 DEFINE INDEX IF NOT EXISTS aid_application_stage ON TABLE aid_application \
                    FIELDS stage;",
            )
            .await?
            .check()?;
        Ok(())
    }

    async fn fetch(&self, application_id: String) -> Result<Option<AidApplication>, StoreError> {
        let mut response = self
            .client
            .query(format!(
                "{SELECT_APPLICATION} WHERE application_id = $application_id LIMIT 1"
            ))
            .bind(("application_id", application_id))
            .await
            .map_err(map_surreal_error)?;
        let rows: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
        let mut applications = decode_rows(rows)?;
        Ok(applications.pop())
    }

    /// Stage after reconciling with history, matching the update guard.
    async fn stored_stage(&self, application_id: String) -> Result<Option<WorkflowStage>, StoreError> {
        Ok(self
            .fetch(application_id)
            .await?
            .map(|application| application.stage))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealApplicationRow {
    application_id: String,
    applicant_name: String,
    aid_type: String,
    #[serde(default)]
    requested_amount: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
    stage: String,
    #[serde(default)]
    history: Vec<Value>,
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    priority: Option<Priority>,
    created_by: String,
    created_at: String,
    updated_at: String,
}

fn parse_stage(value: &str) -> Result<WorkflowStage, StoreError> {
    WorkflowStage::parse(value)
        .ok_or_else(|| StoreError::Operation(format!("unknown stored stage '{value}'")))
}

fn parse_timestamp(value: &str) -> Result<i64, StoreError> {
    parse_rfc3339_ms(value)
        .ok_or_else(|| StoreError::Operation(format!("invalid stored timestamp '{value}'")))
}

fn decode_row(row: Value) -> Result<AidApplication, StoreError> {
    let row: SurrealApplicationRow = serde_json::from_value(row)
        .map_err(|err| StoreError::Operation(format!("invalid application row: {err}")))?;
    let history = row
        .history
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<HistoryEntry>(entry)
                .map_err(|err| StoreError::Operation(format!("invalid history entry: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut application = AidApplication {
        application_id: row.application_id,
        applicant_name: row.applicant_name,
        aid_type: row.aid_type,
        requested_amount: row.requested_amount,
        notes: row.notes,
        stage: parse_stage(&row.stage)?,
        history,
        assigned_to: row.assigned_to,
        due_date: row.due_date,
        priority: row.priority,
        created_by: row.created_by,
        created_at_ms: parse_timestamp(&row.created_at)?,
        updated_at_ms: parse_timestamp(&row.updated_at)?,
    };

    // History is authoritative when a record has any.
    if !application.history.is_empty() {
        let replayed = application.replayed_stage();
        if replayed != application.stage {
            tracing::warn!(
                application_id = %application.application_id,
                stored = %application.stage,
                replayed = %replayed,
                "stored stage disagrees with history; using history"
            );
            application.stage = replayed;
        }
    }
    Ok(application)
}

fn decode_rows(rows: Vec<Value>) -> Result<Vec<AidApplication>, StoreError> {
    rows.into_iter().map(decode_row).collect()
}

fn map_surreal_error(err: surrealdb::Error) -> StoreError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("already exists")
        || lowered.contains("already contains")
        || lowered.contains("duplicate")
    {
        return StoreError::Conflict(message);
    }
    if lowered.contains("connection") || lowered.contains("websocket") || lowered.contains("closed")
    {
        return StoreError::Unavailable(message);
    }
    StoreError::Operation(message)
}

fn encode_entry(entry: &HistoryEntry) -> Result<Value, StoreError> {
    serde_json::to_value(entry)
        .map_err(|err| StoreError::Operation(format!("failed to encode history entry: {err}")))
}

impl ApplicationStore for SurrealApplicationStore {
    fn create(
        &self,
        application: &AidApplication,
    ) -> BoxFuture<'_, Result<AidApplication, StoreError>> {
        let application = application.clone();
        Box::pin(async move {
            let history = application
                .history
                .iter()
                .map(encode_entry)
                .collect::<Result<Vec<_>, _>>()?;
            self.client
                .query(
                    "CREATE aid_application SET \
                        application_id = $application_id, \
                        applicant_name = $applicant_name, \
                        aid_type = $aid_type, \
                        requested_amount = $requested_amount, \
                        notes = $notes, \
                        stage = $stage, \
                        history = $history, \
                        assigned_to = $assigned_to, \
                        due_date = $due_date, \
                        priority = $priority, \
                        created_by = $created_by, \
                        created_at = <datetime>$created_at, \
                        updated_at = <datetime>$updated_at;",
                )
                .bind(("application_id", application.application_id.clone()))
                .bind(("applicant_name", application.applicant_name.clone()))
                .bind(("aid_type", application.aid_type.clone()))
                .bind(("requested_amount", application.requested_amount))
                .bind(("notes", application.notes.clone()))
                .bind(("stage", application.stage.as_str()))
                .bind(("history", history))
                .bind(("assigned_to", application.assigned_to.clone()))
                .bind(("due_date", application.due_date.clone()))
                .bind(("priority", application.priority.map(Priority::as_str)))
                .bind(("created_by", application.created_by.clone()))
                .bind(("created_at", format_ms_rfc3339(application.created_at_ms)))
                .bind(("updated_at", format_ms_rfc3339(application.updated_at_ms)))
                .await
                .map_err(map_surreal_error)?
                .check()
                .map_err(map_surreal_error)?;

            self.fetch(application.application_id.clone())
                .await?
                .ok_or_else(|| StoreError::Operation("create returned no row".into()))
        })
    }

    fn get(
        &self,
        application_id: &str,
    ) -> BoxFuture<'_, Result<Option<AidApplication>, StoreError>> {
        let application_id = application_id.to_string();
        Box::pin(self.fetch(application_id))
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<AidApplication>, StoreError>> {
        Box::pin(async move {
            let mut response = self
                .client
                .query(format!(
                    "{SELECT_APPLICATION} ORDER BY created_at ASC, application_id ASC"
                ))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
            decode_rows(rows)
        })
    }

    fn apply_transition(
        &self,
        application_id: &str,
        write: &TransitionWrite,
    ) -> BoxFuture<'_, Result<AidApplication, StoreError>> {
        let application_id = application_id.to_string();
        let write = write.clone();
        Box::pin(async move {
            let entry = encode_entry(&write.entry)?;
            let mut response = self
                .client
                .query(APPLY_TRANSITION)
                .bind(("stage", write.stage.as_str()))
                .bind(("entry", entry))
                .bind(("assigned_to", write.assignment.assigned_to.clone()))
                .bind(("due_date", write.assignment.due_date.clone()))
                .bind(("priority", write.assignment.priority.map(Priority::as_str)))
                .bind(("updated_at", format_ms_rfc3339(write.entry.occurred_at_ms)))
                .bind(("application_id", application_id.clone()))
                .bind(("expected_stage", write.expected_stage.as_str()))
                .await
                .map_err(map_surreal_error)?;
            let updated: Vec<Value> = response.take(0).map_err(map_surreal_error)?;

            if updated.is_empty() {
                return match self.stored_stage(application_id.clone()).await? {
                    None => Err(StoreError::NotFound(application_id)),
                    Some(actual) => Err(StoreError::StaleStage {
                        expected: write.expected_stage,
                        actual,
                    }),
                };
            }

            self.fetch(application_id.clone())
                .await?
                .ok_or(StoreError::NotFound(application_id))
        })
    }
}
