//! Read-only health and protocol validation.
//!
//! Checks run before and after deployment against the external output
//! parser. Classification policy: a check that cannot even find the
//! relevant feature configured is a `skip`, not a `fail`, so the same
//! check runs meaningfully both before a feature exists and after it is
//! deployed. A feature that is present but not converged is a `fail`.
//! All device checks in a phase run concurrently; they are read-only and
//! independent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use netfleet_core::{
    CheckCategory, IntentRepository, NetfleetError, OutputParser, ProtocolState,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which side of the deployment a validation run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPhase {
    Pre,
    Post,
}

impl ValidationPhase {
    /// Checks run in this phase. Pre-deployment only asserts the fleet is
    /// healthy enough to touch; post-deployment asserts convergence of
    /// everything the intent declares.
    pub fn categories(&self) -> &'static [CheckCategory] {
        match self {
            ValidationPhase::Pre => &[CheckCategory::Reachability, CheckCategory::Interfaces],
            ValidationPhase::Post => &[
                CheckCategory::Reachability,
                CheckCategory::Interfaces,
                CheckCategory::RoutingPeers,
                CheckCategory::Partitions,
            ],
        }
    }
}

impl fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationPhase::Pre => write!(f, "pre"),
            ValidationPhase::Post => write!(f, "post"),
        }
    }
}

/// Classification of one check on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skip,
}

/// One check's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub check: CheckCategory,
    pub device: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl ValidationResult {
    pub fn is_fail(&self) -> bool {
        self.status == CheckStatus::Fail
    }
}

/// Runs the check suite for a phase across a set of devices.
pub struct ValidationRunner {
    parser: Arc<dyn OutputParser>,
    repo: Arc<IntentRepository>,
    op_timeout: Duration,
}

impl ValidationRunner {
    pub fn new(parser: Arc<dyn OutputParser>, repo: Arc<IntentRepository>) -> Self {
        Self {
            parser,
            repo,
            op_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Run all checks for `phase` on every device, concurrently.
    pub async fn run_checks(
        &self,
        devices: &[String],
        phase: ValidationPhase,
    ) -> Vec<ValidationResult> {
        info!(devices = devices.len(), phase = %phase, "running validation checks");

        let tasks = devices.iter().map(|device| {
            let parser = self.parser.clone();
            let repo = self.repo.clone();
            let device = device.clone();
            let op_timeout = self.op_timeout;
            tokio::spawn(async move {
                let mut results = Vec::new();
                for category in phase.categories() {
                    results.push(
                        check_device(&*parser, &repo, &device, *category, op_timeout).await,
                    );
                }
                results
            })
        });

        let mut results = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok(device_results) => results.extend(device_results),
                Err(e) => debug!(error = %e, "validation task aborted"),
            }
        }
        results
    }
}

/// Run one category on one device, bounded by the per-operation timeout.
async fn check_device(
    parser: &dyn OutputParser,
    repo: &IntentRepository,
    device: &str,
    category: CheckCategory,
    op_timeout: Duration,
) -> ValidationResult {
    let parsed = match tokio::time::timeout(op_timeout, parser.parse(device, category)).await {
        Ok(result) => result,
        Err(_) => Err(NetfleetError::timeout(
            device,
            category.name(),
            op_timeout.as_secs(),
        )),
    };

    let (status, detail) = match parsed {
        Ok(state) => classify(repo, device, state),
        Err(NetfleetError::ParseUnavailable { .. }) => (
            CheckStatus::Skip,
            "not configured".to_string(),
        ),
        Err(e) => (CheckStatus::Fail, e.to_string()),
    };

    ValidationResult {
        check: category,
        device: device.to_string(),
        status,
        detail,
    }
}

fn classify(
    repo: &IntentRepository,
    device: &str,
    state: ProtocolState,
) -> (CheckStatus, String) {
    match state {
        ProtocolState::Reachability { reachable, detail } => {
            if reachable {
                (CheckStatus::Pass, detail)
            } else {
                (CheckStatus::Fail, detail)
            }
        }
        ProtocolState::Interfaces { interfaces } => {
            let down: Vec<String> = interfaces
                .iter()
                .filter(|intf| !intf.is_up())
                .map(|intf| format!("{} ({}/{})", intf.name, intf.status, intf.protocol))
                .collect();
            if down.is_empty() {
                (
                    CheckStatus::Pass,
                    format!("{} interfaces up/up", interfaces.len()),
                )
            } else {
                (CheckStatus::Fail, format!("down: {}", down.join(", ")))
            }
        }
        ProtocolState::RoutingPeers { peers } => {
            let stuck: Vec<String> = peers
                .iter()
                .filter(|peer| !peer.converged())
                .map(|peer| format!("{} ({})", peer.id, peer.state))
                .collect();
            if stuck.is_empty() {
                (
                    CheckStatus::Pass,
                    format!("{} peers converged", peers.len()),
                )
            } else {
                (CheckStatus::Fail, format!("not converged: {}", stuck.join(", ")))
            }
        }
        ProtocolState::Partitions { names } => {
            let declared = match repo.get(device) {
                Ok(intent) => intent.vrfs.clone(),
                // Device outside the fleet: nothing declared to verify.
                Err(_) => return (CheckStatus::Skip, "device not in intent".to_string()),
            };
            if declared.is_empty() {
                return (CheckStatus::Skip, "no partitions declared".to_string());
            }
            let missing: Vec<&String> = declared
                .iter()
                .filter(|name| !names.contains(name))
                .collect();
            if missing.is_empty() {
                (
                    CheckStatus::Pass,
                    format!("{} partitions present", declared.len()),
                )
            } else {
                (
                    CheckStatus::Fail,
                    format!(
                        "missing: {}",
                        missing
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netfleet_core::fakes::ScriptedParser;
    use netfleet_core::{
        DeviceIntent, EnterpriseSettings, FleetIntent, InterfaceState, PeerState,
    };
    use std::collections::BTreeMap;

    fn repo() -> Arc<IntentRepository> {
        let mut devices = BTreeMap::new();
        devices.insert(
            "PE1".to_string(),
            DeviceIntent {
                name: "PE1".to_string(),
                role: "pe".to_string(),
                tier: 2,
                template: "pe_router.j2".to_string(),
                mgmt_ip: "192.168.68.209".to_string(),
                loopback_ip: "10.255.1.11".to_string(),
                asn: "65100".to_string(),
                route_reflector: false,
                rr_cluster_id: None,
                interfaces: vec![],
                peers: vec![],
                vrfs: vec!["STUDENT-NET".to_string(), "STAFF-NET".to_string()],
                depends_on: vec![],
            },
        );
        Arc::new(IntentRepository::from_fleet(FleetIntent {
            enterprise: EnterpriseSettings {
                domain_name: "euniv.edu".to_string(),
                dns_servers: vec![],
                ntp_servers: vec![],
                snmp_community: "ro".to_string(),
                snmp_location: "dc".to_string(),
                snmp_contact: "noc".to_string(),
                default_gateway: "192.168.68.1".to_string(),
                mgmt_mask: "255.255.252.0".to_string(),
            },
            vrfs: BTreeMap::new(),
            devices,
        }))
    }

    fn result_for<'a>(
        results: &'a [ValidationResult],
        category: CheckCategory,
    ) -> &'a ValidationResult {
        results
            .iter()
            .find(|r| r.check == category)
            .expect("check ran")
    }

    #[tokio::test]
    async fn test_pre_phase_runs_reachability_and_interfaces_only() {
        let parser = ScriptedParser::new().with_state(
            "PE1",
            CheckCategory::Reachability,
            ProtocolState::Reachability {
                reachable: true,
                detail: "ok".to_string(),
            },
        );
        let runner = ValidationRunner::new(Arc::new(parser), repo());
        let results = runner
            .run_checks(&["PE1".to_string()], ValidationPhase::Pre)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(
            result_for(&results, CheckCategory::Reachability).status,
            CheckStatus::Pass
        );
        // Interfaces unscripted: not configured yet, a skip rather than a
        // fail so the pre-check is meaningful on a bare fleet.
        assert_eq!(
            result_for(&results, CheckCategory::Interfaces).status,
            CheckStatus::Skip
        );
    }

    #[tokio::test]
    async fn test_post_phase_fails_on_unconverged_peer() {
        let parser = ScriptedParser::new()
            .with_state(
                "PE1",
                CheckCategory::Reachability,
                ProtocolState::Reachability {
                    reachable: true,
                    detail: "ok".to_string(),
                },
            )
            .with_state(
                "PE1",
                CheckCategory::RoutingPeers,
                ProtocolState::RoutingPeers {
                    peers: vec![
                        PeerState {
                            id: "10.255.1.1".to_string(),
                            state: "Established".to_string(),
                        },
                        PeerState {
                            id: "10.255.1.2".to_string(),
                            state: "Idle".to_string(),
                        },
                    ],
                },
            );
        let runner = ValidationRunner::new(Arc::new(parser), repo());
        let results = runner
            .run_checks(&["PE1".to_string()], ValidationPhase::Post)
            .await;

        let peers = result_for(&results, CheckCategory::RoutingPeers);
        assert_eq!(peers.status, CheckStatus::Fail);
        assert!(peers.detail.contains("10.255.1.2"));
    }

    #[tokio::test]
    async fn test_missing_partition_fails_and_present_passes() {
        let parser = ScriptedParser::new().with_state(
            "PE1",
            CheckCategory::Partitions,
            ProtocolState::Partitions {
                names: vec!["STUDENT-NET".to_string()],
            },
        );
        let runner = ValidationRunner::new(Arc::new(parser), repo());
        let results = runner
            .run_checks(&["PE1".to_string()], ValidationPhase::Post)
            .await;

        let partitions = result_for(&results, CheckCategory::Partitions);
        assert_eq!(partitions.status, CheckStatus::Fail);
        assert!(partitions.detail.contains("STAFF-NET"));
    }

    #[tokio::test]
    async fn test_down_interface_fails() {
        let parser = ScriptedParser::new().with_state(
            "PE1",
            CheckCategory::Interfaces,
            ProtocolState::Interfaces {
                interfaces: vec![
                    InterfaceState {
                        name: "GigabitEthernet2".to_string(),
                        status: "up".to_string(),
                        protocol: "up".to_string(),
                    },
                    InterfaceState {
                        name: "GigabitEthernet3".to_string(),
                        status: "down".to_string(),
                        protocol: "down".to_string(),
                    },
                ],
            },
        );
        let runner = ValidationRunner::new(Arc::new(parser), repo());
        let results = runner
            .run_checks(&["PE1".to_string()], ValidationPhase::Pre)
            .await;

        let interfaces = result_for(&results, CheckCategory::Interfaces);
        assert_eq!(interfaces.status, CheckStatus::Fail);
        assert!(interfaces.detail.contains("GigabitEthernet3"));
    }

    #[tokio::test]
    async fn test_unreachable_device_fails_reachability_only() {
        let parser = ScriptedParser::new().with_state(
            "PE1",
            CheckCategory::Reachability,
            ProtocolState::Reachability {
                reachable: false,
                detail: "connection refused".to_string(),
            },
        );
        let runner = ValidationRunner::new(Arc::new(parser), repo());
        let results = runner
            .run_checks(&["PE1".to_string()], ValidationPhase::Pre)
            .await;

        assert_eq!(
            result_for(&results, CheckCategory::Reachability).status,
            CheckStatus::Fail
        );
        assert_eq!(
            result_for(&results, CheckCategory::Interfaces).status,
            CheckStatus::Skip
        );
    }
}
