//! Per-team, per-process artifact ID counter.
//!
//! The ledger is a JSON sidecar at `<artifacts_root>/.artifact_id.json`
//! mapping `team -> process -> integer`. Writes are best-effort with no
//! locking; under contention the last writer wins and duplicate IDs are
//! tolerated by the framework.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::Result;
use crate::workspace::PantheonWorkspace;

pub struct ArtifactIdCounter {
    workspace: Arc<PantheonWorkspace>,
}

impl ArtifactIdCounter {
    pub fn new(workspace: Arc<PantheonWorkspace>) -> Self {
        Self { workspace }
    }

    /// Issues the next ID for `(active team, process)`, starting from 1.
    ///
    /// Empty or corrupt ledger content is silently reinitialized; a corrupt
    /// team entry is reinitialized for that team only.
    pub fn get_next(&self, process_name: &str) -> Result<u64> {
        let team = {
            let team = self.workspace.active_team();
            if team.is_empty() {
                warn!("no active_team configured, using 'default'");
                "default".to_owned()
            } else {
                team.to_owned()
            }
        };

        let content = self.workspace.read_artifact_id()?;
        let mut ledger: JsonMap<String, JsonValue> = if content.trim().is_empty() {
            JsonMap::new()
        } else {
            match serde_json::from_str::<JsonValue>(&content) {
                Ok(JsonValue::Object(map)) => map,
                Ok(_) => {
                    warn!("artifact ID ledger is not an object, reinitializing");
                    JsonMap::new()
                }
                Err(err) => {
                    warn!(%err, "artifact ID ledger contains invalid JSON, reinitializing");
                    JsonMap::new()
                }
            }
        };

        let team_entry = ledger
            .entry(team.clone())
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
        if !team_entry.is_object() {
            warn!(team = team.as_str(), "team ledger entry corrupted, reinitializing");
            *team_entry = JsonValue::Object(JsonMap::new());
        }
        let processes = team_entry.as_object_mut().expect("just ensured object");

        let current = processes
            .get(process_name)
            .and_then(JsonValue::as_u64)
            .unwrap_or(0);
        let next = current + 1;
        processes.insert(process_name.to_owned(), JsonValue::from(next));

        let serialized = serde_json::to_string_pretty(&JsonValue::Object(ledger))?;
        self.workspace.save_artifact_id(&serialized)?;

        debug!(team = team.as_str(), process = process_name, id = next, "issued artifact id");
        Ok(next)
    }
}
