//! Pipeline report: the aggregated, persisted outcome of one run.
//!
//! The report always lists every device with its terminal status and, for
//! failures, enough detail (which phase, which error kind) to decide
//! between retry and rollback. Rollback is offered as an explicit
//! follow-up action, never performed automatically.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use netfleet_core::ConfigDiff;
use serde::{Deserialize, Serialize};

use crate::executor::{DeployStatus, DeploymentResult};
use crate::validator::{CheckStatus, ValidationResult};

/// Outcome of one device's generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub device: String,
    pub generated: bool,
    /// Content digest of the rendered text when generation succeeded.
    pub digest: Option<String>,
    pub error: Option<String>,
}

/// Outcome of one device's diff preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRecord {
    pub device: String,
    pub diff: Option<ConfigDiff>,
    pub error: Option<String>,
}

/// Aggregated outcome of a full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,

    /// Phase the pipeline aborted at, if it did not run to completion.
    pub aborted_at: Option<String>,
    pub abort_reason: Option<String>,

    pub generation: Vec<GenerationRecord>,
    pub pre_validation: Vec<ValidationResult>,
    pub preview: Vec<PreviewRecord>,
    pub deployment: Vec<DeploymentResult>,
    pub post_validation: Vec<ValidationResult>,

    /// Zero failed deployments, zero post-phase validation failures and
    /// no abort.
    pub success: bool,
}

impl PipelineReport {
    pub fn deployed_count(&self) -> usize {
        self.deployment
            .iter()
            .filter(|r| r.status == DeployStatus::Applied)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.deployment
            .iter()
            .filter(|r| r.status == DeployStatus::Failed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.deployment
            .iter()
            .filter(|r| r.status == DeployStatus::Skipped)
            .count()
    }

    fn validation_counts(results: &[ValidationResult]) -> (usize, usize, usize) {
        let pass = results.iter().filter(|r| r.status == CheckStatus::Pass).count();
        let fail = results.iter().filter(|r| r.status == CheckStatus::Fail).count();
        let skip = results.iter().filter(|r| r.status == CheckStatus::Skip).count();
        (pass, fail, skip)
    }

    /// Render the operator-facing text summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("pipeline run {}\n", self.run_id));
        out.push_str(&format!(
            "mode: {}\n",
            if self.dry_run { "dry run" } else { "live" }
        ));
        out.push_str(&format!("duration: {}ms\n", self.duration_ms));

        let generated = self.generation.iter().filter(|g| g.generated).count();
        out.push_str(&format!(
            "generate: {}/{} rendered\n",
            generated,
            self.generation.len()
        ));
        for record in self.generation.iter().filter(|g| !g.generated) {
            out.push_str(&format!(
                "  skipped {}: {}\n",
                record.device,
                record.error.as_deref().unwrap_or("unknown")
            ));
        }

        let (pass, fail, skip) = Self::validation_counts(&self.pre_validation);
        out.push_str(&format!(
            "pre-validation: {} pass / {} fail / {} skip\n",
            pass, fail, skip
        ));

        for record in &self.preview {
            if let Some(diff) = &record.diff {
                out.push_str(&format!("  diff {}: {}\n", record.device, diff.summary()));
            } else if let Some(error) = &record.error {
                out.push_str(&format!("  diff {}: unavailable ({})\n", record.device, error));
            }
        }

        out.push_str(&format!(
            "deploy: {} applied / {} failed / {} skipped\n",
            self.deployed_count(),
            self.failed_count(),
            self.skipped_count()
        ));
        for result in &self.deployment {
            if result.status != DeployStatus::Applied {
                out.push_str(&format!(
                    "  {} {}: {}\n",
                    match result.status {
                        DeployStatus::Failed => "failed",
                        DeployStatus::Skipped => "skipped",
                        DeployStatus::Applied => unreachable!(),
                    },
                    result.device,
                    result.error.as_deref().unwrap_or("")
                ));
            }
        }

        let (pass, fail, skip) = Self::validation_counts(&self.post_validation);
        out.push_str(&format!(
            "post-validation: {} pass / {} fail / {} skip\n",
            pass, fail, skip
        ));
        for result in self.post_validation.iter().filter(|r| r.is_fail()) {
            out.push_str(&format!(
                "  fail [{}] {}: {}\n",
                result.device,
                result.check.name(),
                result.detail
            ));
        }

        if let Some(phase) = &self.aborted_at {
            out.push_str(&format!(
                "aborted at {}: {}\n",
                phase,
                self.abort_reason.as_deref().unwrap_or("declined")
            ));
        }

        out.push_str(&format!(
            "result: {}\n",
            if self.success { "SUCCESS" } else { "FAILED" }
        ));
        if !self.success && self.failed_count() > 0 {
            out.push_str("to roll back a device: netfleet rollback <DEVICE>\n");
        }
        out
    }

    /// Write the report artifact as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("serialize pipeline report")?;
        std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_report() -> PipelineReport {
        PipelineReport {
            run_id: "run123".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1200,
            dry_run: false,
            aborted_at: None,
            abort_reason: None,
            generation: vec![GenerationRecord {
                device: "CORE1".to_string(),
                generated: true,
                digest: Some("abc123".to_string()),
                error: None,
            }],
            pre_validation: vec![],
            preview: vec![],
            deployment: vec![],
            post_validation: vec![],
            success: true,
        }
    }

    #[test]
    fn test_render_mentions_result() {
        let report = base_report();
        let text = report.render();
        assert!(text.contains("run123"));
        assert!(text.contains("result: SUCCESS"));
    }

    #[test]
    fn test_failed_deploy_offers_rollback() {
        let mut report = base_report();
        report.success = false;
        report.deployment.push(DeploymentResult::skipped("PE1", "halted"));
        report.deployment.push({
            let mut r = DeploymentResult::skipped("AGG1", "x");
            r.status = DeployStatus::Failed;
            r.error = Some("device AGG1 rejected configuration".to_string());
            r
        });
        let text = report.render();
        assert!(text.contains("failed AGG1"));
        assert!(text.contains("netfleet rollback"));
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = base_report();
        report.write_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: PipelineReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert!(parsed.success);
    }
}
