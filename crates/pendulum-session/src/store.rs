use crate::capture::MeasurementColumns;
use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Persistence collaborator for measurement sessions.
pub trait SessionStore: Send + Sync {
    /// Record a new session and return its id.
    fn create_session(&self, experiment_id: i64, start_time_ms: i64) -> Result<i64>;
    fn update_session_end_time(&self, session_id: i64, end_time_ms: i64) -> Result<()>;
    /// Store the captured columns of a finished session. Called at most once per session.
    fn save_measurement(&self, session_id: i64, columns: &MeasurementColumns) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: i64,
    pub experiment_id: i64,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub id: i64,
    pub session_id: i64,
    pub columns: MeasurementColumns,
}

#[derive(Default)]
struct Tables {
    sessions: Vec<SessionRecord>,
    measurements: Vec<MeasurementRecord>,
    next_session_id: i64,
    next_measurement_id: i64,
}

/// Session store kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }

    pub fn session(&self, session_id: i64) -> Option<SessionRecord> {
        let tables = self.tables().ok()?;
        let session = tables.sessions.iter().find(|s| s.id == session_id).cloned();
        session
    }

    pub fn sessions_for_experiment(&self, experiment_id: i64) -> Vec<SessionRecord> {
        let Ok(tables) = self.tables() else {
            return Vec::new();
        };
        let sessions = tables
            .sessions
            .iter()
            .filter(|s| s.experiment_id == experiment_id)
            .cloned()
            .collect();
        sessions
    }

    pub fn measurements_for_session(&self, session_id: i64) -> Vec<MeasurementRecord> {
        let Ok(tables) = self.tables() else {
            return Vec::new();
        };
        let measurements = tables
            .measurements
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        measurements
    }
}

impl SessionStore for MemoryStore {
    fn create_session(&self, experiment_id: i64, start_time_ms: i64) -> Result<i64> {
        let mut tables = self.tables()?;
        tables.next_session_id += 1;
        let id = tables.next_session_id;
        tables.sessions.push(SessionRecord {
            id,
            experiment_id,
            start_time_ms,
            end_time_ms: None,
        });
        debug!(session_id = id, experiment_id, "Session created");
        Ok(id)
    }

    fn update_session_end_time(&self, session_id: i64, end_time_ms: i64) -> Result<()> {
        let mut tables = self.tables()?;
        let session = tables
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| anyhow!("Unknown session {session_id}"))?;
        session.end_time_ms = Some(end_time_ms);
        Ok(())
    }

    fn save_measurement(&self, session_id: i64, columns: &MeasurementColumns) -> Result<()> {
        let mut tables = self.tables()?;
        if !tables.sessions.iter().any(|s| s.id == session_id) {
            return Err(anyhow!("Unknown session {session_id}"));
        }
        tables.next_measurement_id += 1;
        let id = tables.next_measurement_id;
        tables.measurements.push(MeasurementRecord {
            id,
            session_id,
            columns: columns.clone(),
        });
        debug!(session_id, samples = columns.len(), "Measurement saved");
        Ok(())
    }
}
