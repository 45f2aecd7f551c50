//! End-to-end pipeline orchestration.
//!
//! Phase sequence: generate, pre-validate, preview, deploy, post-validate,
//! report, with a terminal aborted state reachable from any step. Render
//! and validation fan out across devices; the deploy phase is deliberately
//! single-threaded and sequential so "halt on first failure" is
//! well-defined and rollback ordering is unambiguous.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use netfleet_core::{
    diff_configs, ConfigRenderer, DeviceSession, GeneratedConfig, IntentRepository, OutputParser,
    SessionProvider,
};
use netfleet_store::ConfigStore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::executor::{DeploymentExecutor, DeploymentResult};
use crate::gate::ConfirmationGate;
use crate::planner::DeploymentPlanner;
use crate::report::{GenerationRecord, PipelineReport, PreviewRecord};
use crate::validator::{ValidationPhase, ValidationRunner};

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Diff-only applies: backups and diffs are produced, nothing is
    /// mutated and no gate is consulted before the deploy phase.
    pub dry_run: bool,

    /// Restrict the run to these devices; `None` means the whole fleet.
    pub devices: Option<Vec<String>>,
}

/// Drives the full reconciliation pipeline and aggregates the report.
pub struct DeployPipeline {
    repo: Arc<IntentRepository>,
    renderer: Arc<ConfigRenderer>,
    store: Arc<dyn ConfigStore>,
    sessions: Arc<dyn SessionProvider>,
    gate: Arc<dyn ConfirmationGate>,
    executor: DeploymentExecutor,
    validator: ValidationRunner,
    op_timeout: Duration,
}

impl DeployPipeline {
    pub fn new(
        repo: Arc<IntentRepository>,
        renderer: Arc<ConfigRenderer>,
        store: Arc<dyn ConfigStore>,
        sessions: Arc<dyn SessionProvider>,
        parser: Arc<dyn OutputParser>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        let executor = DeploymentExecutor::new(sessions.clone(), store.clone());
        let validator = ValidationRunner::new(parser, repo.clone());
        Self {
            repo,
            renderer,
            store,
            sessions,
            gate,
            executor,
            validator,
            op_timeout: Duration::from_secs(30),
        }
    }

    /// Per-operation timeout for every session interaction in the run.
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.executor = self.executor.with_timeout(op_timeout);
        self.validator = self.validator.with_timeout(op_timeout);
        self.op_timeout = op_timeout;
        self
    }

    /// Run the pipeline to completion (or abort) and return the report.
    pub async fn run(&self, options: &PipelineOptions) -> PipelineReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(run_id = %run_id, dry_run = options.dry_run, "starting pipeline");

        let mut report = PipelineReport {
            run_id,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            dry_run: options.dry_run,
            aborted_at: None,
            abort_reason: None,
            generation: Vec::new(),
            pre_validation: Vec::new(),
            preview: Vec::new(),
            deployment: Vec::new(),
            post_validation: Vec::new(),
            success: false,
        };

        let device_names = match &options.devices {
            Some(list) => list.clone(),
            None => self.repo.device_names(),
        };

        // GENERATE: all devices in parallel; a per-device template error
        // marks that device skipped for the rest of the run.
        let (generation, texts) = self.generate(&device_names).await;
        report.generation = generation;
        let generated_ok: Vec<String> = report
            .generation
            .iter()
            .filter(|g| g.generated)
            .map(|g| g.device.clone())
            .collect();
        info!(
            generated = generated_ok.len(),
            total = device_names.len(),
            "generation complete"
        );

        // PRE_VALIDATE: failures are reported but do not block on their
        // own; the gate decides whether to continue.
        report.pre_validation = self
            .validator
            .run_checks(&device_names, ValidationPhase::Pre)
            .await;
        let pre_failures = report.pre_validation.iter().filter(|r| r.is_fail()).count();
        if pre_failures > 0 {
            warn!(failures = pre_failures, "pre-deployment validation reported failures");
            let prompt = format!(
                "pre-deployment validation reported {} failure(s); continue?",
                pre_failures
            );
            if !self.gate.confirm(&prompt).await {
                return self.finalize(report, started, Some(("pre_validate", prompt)));
            }
        }

        // PREVIEW: read-only diff of every generated device.
        report.preview = self.preview(&generated_ok, &texts).await;

        // PREVIEW -> DEPLOY gate, live mode only.
        if !options.dry_run {
            let prompt = format!(
                "proceed with deployment to {} device(s)?",
                generated_ok.len()
            );
            if !self.gate.confirm(&prompt).await {
                return self.finalize(report, started, Some(("deploy", prompt)));
            }
        }

        // DEPLOY: plan order, strictly sequential, halt on first live
        // failure so a partially-broken topology receives no more changes.
        let plan = match DeploymentPlanner::plan(&self.repo, Some(&generated_ok)) {
            Ok(plan) => plan,
            Err(e) => {
                return self.finalize(report, started, Some(("deploy", e.to_string())));
            }
        };

        for name in &device_names {
            if !generated_ok.contains(name) {
                report
                    .deployment
                    .push(DeploymentResult::skipped(name, "no generated config"));
            }
        }

        let mut halted_after: Option<String> = None;
        for device in &plan.order {
            if let Some(failed_device) = &halted_after {
                report.deployment.push(DeploymentResult::skipped(
                    device,
                    &format!("halted after failure of {}", failed_device),
                ));
                continue;
            }

            let desired = texts.get(device).expect("generated device has text");
            let result = self.executor.apply(device, desired, options.dry_run).await;
            let failed = result.is_failed();
            report.deployment.push(result);

            if failed && !options.dry_run {
                warn!(device = %device, "deployment failed, halting remaining devices");
                halted_after = Some(device.clone());
            }
        }

        // POST_VALIDATE: only meaningful after a live deploy phase.
        if !options.dry_run {
            report.post_validation = self
                .validator
                .run_checks(&device_names, ValidationPhase::Post)
                .await;
        }

        self.finalize(report, started, None)
    }

    async fn generate(
        &self,
        devices: &[String],
    ) -> (Vec<GenerationRecord>, HashMap<String, String>) {
        let tasks = devices.iter().map(|device| {
            let repo = self.repo.clone();
            let renderer = self.renderer.clone();
            let store = self.store.clone();
            let device = device.clone();
            tokio::spawn(async move {
                let rendered = repo
                    .get(&device)
                    .and_then(|intent| renderer.render(&repo, intent));
                match rendered {
                    Ok(text) => {
                        let config = GeneratedConfig::new(device.clone(), text);
                        if let Err(e) = store.save_generated(&device, &config.text).await {
                            return (
                                GenerationRecord {
                                    device,
                                    generated: false,
                                    digest: None,
                                    error: Some(e.to_string()),
                                },
                                None,
                            );
                        }
                        (
                            GenerationRecord {
                                device,
                                generated: true,
                                digest: Some(config.digest),
                                error: None,
                            },
                            Some(config.text),
                        )
                    }
                    Err(e) => {
                        warn!(device = %device, error = %e, "generation skipped");
                        (
                            GenerationRecord {
                                device,
                                generated: false,
                                digest: None,
                                error: Some(e.to_string()),
                            },
                            None,
                        )
                    }
                }
            })
        });

        let mut records = Vec::new();
        let mut texts = HashMap::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((record, text)) => {
                    if let Some(text) = text {
                        texts.insert(record.device.clone(), text);
                    }
                    records.push(record);
                }
                Err(e) => warn!(error = %e, "generation task aborted"),
            }
        }
        records.sort_by(|a, b| a.device.cmp(&b.device));
        (records, texts)
    }

    /// Capture each device and diff against its rendered config. Never
    /// mutates anything; capture errors are per-device records.
    async fn preview(
        &self,
        devices: &[String],
        texts: &HashMap<String, String>,
    ) -> Vec<PreviewRecord> {
        let mut records = Vec::new();
        for device in devices {
            let Some(desired) = texts.get(device) else { continue };
            let live = async {
                let mut session = self.sessions.connect(device).await?;
                let text = session.capture().await;
                let _ = session.disconnect().await;
                text
            };
            let live = match tokio::time::timeout(self.op_timeout, live).await {
                Ok(result) => result,
                Err(_) => Err(netfleet_core::NetfleetError::timeout(
                    device,
                    "capture",
                    self.op_timeout.as_secs(),
                )),
            };
            match live {
                Ok(live) => records.push(PreviewRecord {
                    device: device.clone(),
                    diff: Some(diff_configs(&live, desired)),
                    error: None,
                }),
                Err(e) => records.push(PreviewRecord {
                    device: device.clone(),
                    diff: None,
                    error: Some(e.to_string()),
                }),
            }
        }
        records
    }

    fn finalize(
        &self,
        mut report: PipelineReport,
        started: Instant,
        aborted: Option<(&str, String)>,
    ) -> PipelineReport {
        if let Some((phase, reason)) = aborted {
            warn!(phase, "pipeline aborted");
            report.aborted_at = Some(phase.to_string());
            report.abort_reason = Some(reason);
        }

        report.finished_at = Utc::now();
        report.duration_ms = started.elapsed().as_millis() as u64;

        let post_failures = report.post_validation.iter().filter(|r| r.is_fail()).count();
        report.success =
            report.aborted_at.is_none() && report.failed_count() == 0 && post_failures == 0;

        info!(
            success = report.success,
            applied = report.deployed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "pipeline finished"
        );
        report
    }
}
