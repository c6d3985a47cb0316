use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::traits::CaseStore;
use super::types::{ClinicalAssist, DerivedRecord};
use crate::db::DatabaseError;
use crate::models::DerivedStatus;

/// Write a parsed record onto its case.
///
/// Lists are newline-joined and all four fields land in one statement with
/// `committed_at`. Returns `None` when the case closed before the write.
pub fn commit_derived_state(
    store: &dyn CaseStore,
    conn: &Connection,
    case_id: &Uuid,
    assist: &ClinicalAssist,
    seq: i64,
    committed_at: DateTime<Utc>,
) -> Result<Option<DerivedStatus>, DatabaseError> {
    let record = DerivedRecord::from(assist);
    store.write_derived_state(conn, case_id, &record, &committed_at, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{get_case, insert_case, insert_patient};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Case, Patient};
    use crate::pipeline::assist::SqliteCaseStore;

    fn setup() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let patient = Patient::new("12345678-9", None, None, None);
        insert_patient(&conn, &patient).unwrap();
        let case = Case::open(patient.id, None);
        insert_case(&conn, &case).unwrap();
        (conn, case.id)
    }

    fn assist(dx: &[&str], alerts: &[&str]) -> ClinicalAssist {
        ClinicalAssist {
            differential_diagnosis: dx.iter().map(|s| s.to_string()).collect(),
            suggested_management: "Iniciar salbutamol".into(),
            next_action: "Control gasométrico".into(),
            alerts: alerts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn committed_lists_read_back_exactly() {
        let store = SqliteCaseStore::new();
        for (dx, alerts) in [
            (vec!["Crisis asmática"], vec![]),
            (vec!["Crisis asmática", "Neumonía"], vec!["SpO2 < 92%"]),
            (vec!["a", "", "b"], vec!["", "alerta"]),
        ] {
            let (conn, case_id) = setup();
            let record = assist(&dx, &alerts);
            let seq = store.begin_sync(&conn, &case_id).unwrap().unwrap();
            commit_derived_state(&store, &conn, &case_id, &record, seq, Utc::now()).unwrap();

            let derived = get_case(&conn, &case_id).unwrap().unwrap().derived;
            assert_eq!(derived.diagnoses(), record.differential_diagnosis);
            assert_eq!(derived.alert_list(), record.alerts);
            assert_eq!(derived.suggested_management, record.suggested_management);
            assert_eq!(derived.next_action, record.next_action);
        }
    }

    #[test]
    fn recommitting_same_record_only_moves_timestamp() {
        let store = SqliteCaseStore::new();
        let (conn, case_id) = setup();
        let record = assist(&["Crisis asmática"], &[]);

        let seq = store.begin_sync(&conn, &case_id).unwrap().unwrap();
        let first_at = Utc::now();
        commit_derived_state(&store, &conn, &case_id, &record, seq, first_at).unwrap();
        let first = get_case(&conn, &case_id).unwrap().unwrap().derived;

        let later_at = first_at + chrono::Duration::seconds(5);
        commit_derived_state(&store, &conn, &case_id, &record, seq, later_at).unwrap();
        let second = get_case(&conn, &case_id).unwrap().unwrap().derived;

        assert!(first.same_fields(&second));
        assert_eq!(second.updated_at, Some(later_at));
        assert!(second.updated_at > first.updated_at);
    }
}
