//! AssistSync: runs detect, build, generate, parse and commit for each trigger.
//!
//! Generation and parse failures never escape: they leave the derived fields
//! as they were, flag the case stale, and come back as warnings. Only a failed
//! derived-state write is reported as an error.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::committer::commit_derived_state;
use super::detector::cases_to_sync;
use super::error::AssistError;
use super::traits::CaseStore;
use super::types::*;
use crate::pipeline::llm::{LlmClient, LlmError};

pub struct AssistSync {
    llm: Arc<dyn LlmClient>,
    store: Box<dyn CaseStore>,
}

impl AssistSync {
    pub fn new(llm: Arc<dyn LlmClient>, store: Box<dyn CaseStore>) -> Self {
        Self { llm, store }
    }

    /// Entry point for the edit layer, called after a watched field write commits.
    ///
    /// Returns one report per triggered case; an empty list means no trigger
    /// was needed. `Err` only when the affected cases could not be determined.
    pub fn on_field_write(
        &self,
        conn: &Connection,
        write: &FieldWrite,
    ) -> Result<Vec<SyncReport>, AssistError> {
        let case_ids = cases_to_sync(self.store.as_ref(), conn, write)?;
        if case_ids.is_empty() {
            tracing::debug!(
                field = write.field.as_str(),
                owner_id = %write.owner_id,
                "No derived-state sync needed"
            );
            return Ok(Vec::new());
        }

        let mut reports = Vec::with_capacity(case_ids.len());
        for case_id in case_ids {
            let outcome = match self.synchronize_case(conn, &case_id) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(case_id = %case_id, error = %e, "Derived-state sync failed");
                    SyncOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
            reports.push(SyncReport { case_id, outcome });
        }
        Ok(reports)
    }

    /// Regenerate one case's derived state from its current source text.
    pub fn synchronize_case(
        &self,
        conn: &Connection,
        case_id: &Uuid,
    ) -> Result<SyncOutcome, AssistError> {
        let Some(seq) = self.store.begin_sync(conn, case_id)? else {
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::CaseClosed,
            });
        };

        let result = self.run_sync(conn, case_id, seq);
        if let Err(AssistError::Persistence(_)) = &result {
            // Leave the case stale, never pending, when the pipeline dies mid-way.
            if let Err(e) = self.store.mark_sync_failed(conn, case_id, seq) {
                tracing::warn!(case_id = %case_id, error = %e, "Could not mark derived state stale");
            }
        }
        result
    }

    fn run_sync(&self, conn: &Connection, case_id: &Uuid, seq: i64) -> Result<SyncOutcome, AssistError> {
        // Sources are read after the trigger is registered, so any later edit
        // carries a newer sequence number.
        let case = self.store.read_case(conn, case_id)?;
        let history = self.store.read_patient_history(conn, &case.patient_id)?;
        let request = GenerationRequest::from_fields(history.as_deref(), case.progress_note.as_deref());

        let start = Instant::now();
        let assist = match self.generate(&request) {
            Ok(assist) => assist,
            Err(e) => return self.isolate_failure(conn, case_id, seq, e),
        };

        let committed_at = Utc::now();
        match commit_derived_state(self.store.as_ref(), conn, case_id, &assist, seq, committed_at)? {
            Some(status) => {
                tracing::info!(
                    case_id = %case_id,
                    status = status.as_str(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Derived clinical state updated"
                );
                Ok(SyncOutcome::Updated {
                    updated_at: committed_at,
                    status,
                })
            }
            None => {
                tracing::info!(case_id = %case_id, "Case closed during generation, result dropped");
                Ok(SyncOutcome::Skipped {
                    reason: SkipReason::CaseClosed,
                })
            }
        }
    }

    fn generate(&self, request: &GenerationRequest) -> Result<ClinicalAssist, AssistError> {
        let raw = self.llm.generate(
            self.llm.default_model(),
            &request.render_prompt(),
            ASSIST_SYSTEM_PROMPT,
        )?;
        GenerationResult::from_reply(raw).into_parsed()
    }

    fn isolate_failure(
        &self,
        conn: &Connection,
        case_id: &Uuid,
        seq: i64,
        error: AssistError,
    ) -> Result<SyncOutcome, AssistError> {
        if !error.is_recoverable() {
            return Err(error);
        }

        let kind = match &error {
            AssistError::MalformedResponse { raw, .. } => {
                tracing::debug!(case_id = %case_id, raw = %raw, "Unparsable generation reply");
                WarningKind::MalformedResponse
            }
            _ => WarningKind::BackendFailure,
        };
        if matches!(&error, AssistError::Backend(LlmError::Timeout(_))) {
            tracing::warn!(case_id = %case_id, error = %error, "Generation timed out, derived state left stale");
        } else {
            tracing::warn!(case_id = %case_id, error = %error, "Generation failed, derived state left stale");
        }

        self.store.mark_sync_failed(conn, case_id, seq)?;
        Ok(SyncOutcome::Warning {
            kind,
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use crate::db::repository::{
        close_case, get_case, insert_case, insert_patient, update_patient_history,
        update_progress_note,
    };
    use crate::db::sqlite::open_memory_database;
    use crate::db::DatabaseError;
    use crate::models::{Case, DerivedClinicalState, DerivedStatus, Patient};
    use crate::pipeline::assist::SqliteCaseStore;
    use crate::pipeline::llm::MockLlmClient;

    const ASTHMA_REPLY: &str = "<think>Paciente asmático con disnea.</think>
Sugerencia:
```json
{
  \"differential_diagnosis\": [\"Crisis asmática\", \"Neumonía\"],
  \"manejo_sugerido\": \"Iniciar salbutamol\",
  \"proxima_accion\": \"Control gasométrico\",
  \"alertas\": []
}
```";

    struct Fixture {
        conn: Connection,
        patient: Patient,
        case: Case,
    }

    fn fixture() -> Fixture {
        let conn = open_memory_database().unwrap();
        let patient = Patient::new("12345678-9", None, None, Some("Asma diagnosticada 2019".into()));
        insert_patient(&conn, &patient).unwrap();
        let case = Case::open(patient.id, Some("Disnea leve, SpO2 94%".into()));
        insert_case(&conn, &case).unwrap();
        Fixture { conn, patient, case }
    }

    fn sync_with(llm: Arc<MockLlmClient>) -> AssistSync {
        AssistSync::new(llm, Box::new(SqliteCaseStore::new()))
    }

    fn derived(conn: &Connection, case_id: &Uuid) -> DerivedClinicalState {
        get_case(conn, case_id).unwrap().unwrap().derived
    }

    #[test]
    fn asthma_scenario_commits_joined_fields() {
        let f = fixture();
        let llm = Arc::new(MockLlmClient::new(ASTHMA_REPLY));
        let sync = sync_with(llm.clone());

        let before = Utc::now();
        let outcome = sync.synchronize_case(&f.conn, &f.case.id).unwrap();
        let after = Utc::now();

        let stored = derived(&f.conn, &f.case.id);
        assert_eq!(stored.differential_diagnosis, "Crisis asmática\nNeumonía");
        assert_eq!(stored.suggested_management, "Iniciar salbutamol");
        assert_eq!(stored.next_action, "Control gasométrico");
        assert_eq!(stored.alerts, "");
        assert_eq!(stored.status, DerivedStatus::Current);
        let updated_at: DateTime<Utc> = stored.updated_at.unwrap();
        assert!(before <= updated_at && updated_at <= after);

        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                updated_at,
                status: DerivedStatus::Current
            }
        );

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("Asma diagnosticada 2019"));
        assert!(prompt.contains("Disnea leve, SpO2 94%"));
    }

    #[test]
    fn reply_without_fence_leaves_fields_and_warns() {
        let f = fixture();
        let sync = sync_with(Arc::new(MockLlmClient::new(
            "Diagnóstico probable: crisis asmática. Iniciar salbutamol.",
        )));

        let outcome = sync.synchronize_case(&f.conn, &f.case.id).unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Warning {
                kind: WarningKind::MalformedResponse,
                ..
            }
        ));

        let stored = derived(&f.conn, &f.case.id);
        assert!(stored.same_fields(&DerivedClinicalState::default()));
        assert!(stored.updated_at.is_none());
        assert_eq!(stored.status, DerivedStatus::Stale);
    }

    #[test]
    fn timeout_keeps_primary_edit_and_previous_fields() {
        let f = fixture();
        let good = sync_with(Arc::new(MockLlmClient::new(ASTHMA_REPLY)));
        good.synchronize_case(&f.conn, &f.case.id).unwrap();
        let before = derived(&f.conn, &f.case.id);

        let previous = update_progress_note(&f.conn, &f.case.id, Some("SpO2 90%")).unwrap();
        let failing = sync_with(Arc::new(MockLlmClient::timing_out()));
        let reports = failing
            .on_field_write(
                &f.conn,
                &FieldWrite::progress_note(f.case.id, previous, Some("SpO2 90%".into())),
            )
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].outcome,
            SyncOutcome::Warning {
                kind: WarningKind::BackendFailure,
                ..
            }
        ));
        assert!(reports[0].outcome.needs_notice());

        let case = get_case(&f.conn, &f.case.id).unwrap().unwrap();
        assert_eq!(case.progress_note.as_deref(), Some("SpO2 90%"));
        assert!(case.derived.same_fields(&before));
        assert_eq!(case.derived.updated_at, before.updated_at);
        assert_eq!(case.derived.status, DerivedStatus::Stale);
    }

    #[test]
    fn unchanged_value_makes_no_call() {
        let f = fixture();
        let llm = Arc::new(MockLlmClient::new(ASTHMA_REPLY));
        let sync = sync_with(llm.clone());

        let write = FieldWrite::history(
            f.patient.id,
            Some("Asma diagnosticada 2019".into()),
            Some("Asma diagnosticada 2019".into()),
        );
        assert!(sync.on_field_write(&f.conn, &write).unwrap().is_empty());

        let write = FieldWrite::progress_note(f.case.id, None, Some(String::new()));
        assert!(sync.on_field_write(&f.conn, &write).unwrap().is_empty());

        assert_eq!(llm.call_count(), 0);
        assert_eq!(derived(&f.conn, &f.case.id).status, DerivedStatus::Empty);
    }

    #[test]
    fn history_edit_triggers_once_per_active_case() {
        let f = fixture();
        let second = Case::open(f.patient.id, None);
        let closed = Case::open(f.patient.id, None);
        insert_case(&f.conn, &second).unwrap();
        insert_case(&f.conn, &closed).unwrap();
        close_case(&f.conn, &closed.id, &Utc::now()).unwrap();

        let llm = Arc::new(MockLlmClient::new(ASTHMA_REPLY));
        let sync = sync_with(llm.clone());

        let previous = update_patient_history(&f.conn, &f.patient.id, Some("Asma, HTA")).unwrap();
        let reports = sync
            .on_field_write(
                &f.conn,
                &FieldWrite::history(f.patient.id, previous, Some("Asma, HTA".into())),
            )
            .unwrap();

        assert_eq!(llm.call_count(), 2);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| matches!(r.outcome, SyncOutcome::Updated { .. })));
        assert!(reports.iter().all(|r| r.case_id != closed.id));
        assert_eq!(derived(&f.conn, &closed.id).status, DerivedStatus::Empty);
    }

    #[test]
    fn closed_case_is_skipped_without_call() {
        let f = fixture();
        close_case(&f.conn, &f.case.id, &Utc::now()).unwrap();
        let llm = Arc::new(MockLlmClient::new(ASTHMA_REPLY));
        let sync = sync_with(llm.clone());

        let outcome = sync.synchronize_case(&f.conn, &f.case.id).unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Skipped {
                reason: SkipReason::CaseClosed
            }
        );
        assert_eq!(llm.call_count(), 0);
    }

    /// Delegates to SQLite but refuses derived-state writes.
    struct ReadOnlyStore(SqliteCaseStore);

    impl CaseStore for ReadOnlyStore {
        fn read_case(&self, conn: &Connection, id: &Uuid) -> Result<Case, DatabaseError> {
            self.0.read_case(conn, id)
        }
        fn read_patient_history(&self, conn: &Connection, id: &Uuid) -> Result<Option<String>, DatabaseError> {
            self.0.read_patient_history(conn, id)
        }
        fn is_case_active(&self, conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
            self.0.is_case_active(conn, id)
        }
        fn active_case_ids_for_patient(&self, conn: &Connection, id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
            self.0.active_case_ids_for_patient(conn, id)
        }
        fn begin_sync(&self, conn: &Connection, id: &Uuid) -> Result<Option<i64>, DatabaseError> {
            self.0.begin_sync(conn, id)
        }
        fn write_derived_state(
            &self,
            _conn: &Connection,
            _id: &Uuid,
            _record: &DerivedRecord,
            _at: &chrono::DateTime<Utc>,
            _seq: i64,
        ) -> Result<Option<DerivedStatus>, DatabaseError> {
            Err(DatabaseError::ConstraintViolation("storage unavailable".into()))
        }
        fn mark_sync_failed(&self, conn: &Connection, id: &Uuid, seq: i64) -> Result<(), DatabaseError> {
            self.0.mark_sync_failed(conn, id, seq)
        }
    }

    #[test]
    fn persistence_failure_is_an_error_not_a_warning() {
        let f = fixture();
        let sync = AssistSync::new(
            Arc::new(MockLlmClient::new(ASTHMA_REPLY)),
            Box::new(ReadOnlyStore(SqliteCaseStore::new())),
        );

        let err = sync.synchronize_case(&f.conn, &f.case.id).unwrap_err();
        assert!(matches!(err, AssistError::Persistence(_)));

        let reports = sync
            .on_field_write(
                &f.conn,
                &FieldWrite::progress_note(f.case.id, None, Some("nuevo".into())),
            )
            .unwrap();
        assert!(matches!(reports[0].outcome, SyncOutcome::Failed { .. }));
        assert!(reports[0].outcome.needs_notice());
    }

    #[test]
    fn persistence_failure_leaves_case_stale_not_pending() {
        let f = fixture();
        let sync = AssistSync::new(
            Arc::new(MockLlmClient::new(ASTHMA_REPLY)),
            Box::new(ReadOnlyStore(SqliteCaseStore::new())),
        );

        let previous = update_progress_note(&f.conn, &f.case.id, Some("SpO2 91%")).unwrap();
        let reports = sync
            .on_field_write(
                &f.conn,
                &FieldWrite::progress_note(f.case.id, previous, Some("SpO2 91%".into())),
            )
            .unwrap();
        assert!(matches!(reports[0].outcome, SyncOutcome::Failed { .. }));

        let stored = derived(&f.conn, &f.case.id);
        assert_eq!(stored.status, DerivedStatus::Stale);
        assert!(stored.same_fields(&DerivedClinicalState::default()));
        assert!(stored.updated_at.is_none());
    }

    #[test]
    fn malformed_reply_keeps_reasoning_in_raw() {
        let f = fixture();
        let reply = "<think>dudas sobre el cuadro</think>Sin formato";
        let sync = sync_with(Arc::new(MockLlmClient::new(reply)));

        let request = GenerationRequest::from_fields(Some("Asma"), Some("Disnea"));
        match sync.generate(&request) {
            Err(AssistError::MalformedResponse { raw, .. }) => assert_eq!(raw, reply),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
        let outcome = sync.synchronize_case(&f.conn, &f.case.id).unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Warning {
                kind: WarningKind::MalformedResponse,
                ..
            }
        ));
    }
}
