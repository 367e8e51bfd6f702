//! JSON export of per-round snapshots for external visualizers.

use crate::runner::ScenarioResult;

use amoebot_core::SystemSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Complete simulation export: one snapshot per committed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Per-round snapshots
    pub frames: Vec<SystemSnapshot>,

    /// Final verdict
    pub passed: bool,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Builds an export from a finished scenario run.
    pub fn from_result(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            frames: result.frames.clone(),
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
