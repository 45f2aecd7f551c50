//! Deterministic config rendering from device intent.
//!
//! The renderer is a pure function of intent: identical intent always
//! yields byte-identical text. Multi-valued fields are sorted before they
//! reach the template (interfaces by name, peers by address) so diffs stay
//! stable across repeated runs. Timestamps and digests live on
//! [`GeneratedConfig`] as metadata and are never embedded in the text.

use std::path::Path;

use chrono::{DateTime, Utc};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

use crate::error::{NetfleetError, Result};
use crate::intent::{DeviceIntent, IntentRepository, InterfaceIntent, PeerIntent};

/// Templates compiled into the binary, mirroring the fleet's stock roles.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("core_router.j2", include_str!("../templates/core_router.j2")),
    (
        "aggregation_router.j2",
        include_str!("../templates/aggregation_router.j2"),
    ),
    ("pe_router.j2", include_str!("../templates/pe_router.j2")),
];

/// SHA-256 content digest of a rendered config, lowercase hex.
pub fn content_digest(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// One device's rendered configuration plus generation metadata.
///
/// Exactly one current `GeneratedConfig` exists per device per run; it is
/// overwritten on regeneration. Versioning is the backup store's job.
#[derive(Debug, Clone)]
pub struct GeneratedConfig {
    pub device: String,
    pub text: String,
    pub generated_at: DateTime<Utc>,
    pub digest: String,
}

impl GeneratedConfig {
    pub fn new(device: impl Into<String>, text: String) -> Self {
        let digest = content_digest(&text);
        Self {
            device: device.into(),
            text,
            generated_at: Utc::now(),
            digest,
        }
    }
}

#[derive(Serialize)]
struct ResolvedVrf<'a> {
    name: &'a str,
    rd_suffix: &'a str,
    route_target: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct RenderContext<'a> {
    hostname: &'a str,
    role: &'a str,
    asn: &'a str,
    mgmt_ip: &'a str,
    loopback_ip: &'a str,
    route_reflector: bool,
    rr_cluster_id: Option<&'a str>,
    domain_name: &'a str,
    dns_servers: &'a [String],
    ntp_servers: &'a [String],
    snmp_community: &'a str,
    snmp_location: &'a str,
    snmp_contact: &'a str,
    default_gateway: &'a str,
    mgmt_mask: &'a str,
    interfaces: Vec<&'a InterfaceIntent>,
    peers: Vec<&'a PeerIntent>,
    vrfs: Vec<ResolvedVrf<'a>>,
}

/// Renders device intent into CLI configuration text.
pub struct ConfigRenderer {
    env: Environment<'static>,
}

impl ConfigRenderer {
    /// Renderer backed by the built-in role templates.
    pub fn builtin() -> Self {
        let mut env = Environment::new();
        for (name, source) in BUILTIN_TEMPLATES {
            env.add_template(name, source)
                .expect("builtin templates are valid");
        }
        Self { env }
    }

    /// Renderer backed by `*.j2` files in a directory. Built-in templates
    /// remain available for names the directory does not provide.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut renderer = Self::builtin();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("j2") {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let source = std::fs::read_to_string(&path)?;
            renderer
                .env
                .add_template_owned(name.clone(), source)
                .map_err(|e| NetfleetError::TemplateError {
                    template: name,
                    detail: e.to_string(),
                })?;
        }
        Ok(renderer)
    }

    /// Render one device's configuration.
    ///
    /// Fails with `TemplateError` when the intent names a template that
    /// does not exist or references a partition missing from the fleet VRF
    /// table. Both are authoring errors that abort only this device's
    /// generation.
    pub fn render(&self, repo: &IntentRepository, device: &DeviceIntent) -> Result<String> {
        let template =
            self.env
                .get_template(&device.template)
                .map_err(|_| NetfleetError::TemplateError {
                    template: device.template.clone(),
                    detail: "template not found".to_string(),
                })?;

        let enterprise = repo.enterprise();

        let mut interfaces: Vec<&InterfaceIntent> = device.interfaces.iter().collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        let mut peers: Vec<&PeerIntent> = device.peers.iter().collect();
        peers.sort_by(|a, b| a.ip.cmp(&b.ip));

        let mut vrfs = Vec::with_capacity(device.vrfs.len());
        for name in &device.vrfs {
            let def = repo
                .vrf(name)
                .ok_or_else(|| NetfleetError::TemplateError {
                    template: device.template.clone(),
                    detail: format!("unknown vrf '{}' referenced by {}", name, device.name),
                })?;
            vrfs.push(ResolvedVrf {
                name,
                rd_suffix: &def.rd_suffix,
                route_target: &def.route_target,
                description: &def.description,
            });
        }

        let context = RenderContext {
            hostname: &device.name,
            role: &device.role,
            asn: &device.asn,
            mgmt_ip: &device.mgmt_ip,
            loopback_ip: &device.loopback_ip,
            route_reflector: device.route_reflector,
            rr_cluster_id: device.rr_cluster_id.as_deref(),
            domain_name: &enterprise.domain_name,
            dns_servers: &enterprise.dns_servers,
            ntp_servers: &enterprise.ntp_servers,
            snmp_community: &enterprise.snmp_community,
            snmp_location: &enterprise.snmp_location,
            snmp_contact: &enterprise.snmp_contact,
            default_gateway: &enterprise.default_gateway,
            mgmt_mask: &enterprise.mgmt_mask,
            interfaces,
            peers,
            vrfs,
        };

        let text = template
            .render(&context)
            .map_err(|e| NetfleetError::TemplateError {
                template: device.template.clone(),
                detail: e.to_string(),
            })?;

        debug!(device = %device.name, template = %device.template, "rendered config");
        Ok(text)
    }
}

impl Default for ConfigRenderer {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{
        DeviceIntent, EnterpriseSettings, FleetIntent, VrfDefinition,
    };
    use std::collections::BTreeMap;

    fn enterprise() -> EnterpriseSettings {
        EnterpriseSettings {
            domain_name: "euniv.edu".to_string(),
            dns_servers: vec!["10.255.255.1".to_string(), "10.255.255.2".to_string()],
            ntp_servers: vec!["10.255.255.10".to_string()],
            snmp_community: "euniv-mon-ro".to_string(),
            snmp_location: "E University Data Center".to_string(),
            snmp_contact: "noc@euniv.edu".to_string(),
            default_gateway: "192.168.68.1".to_string(),
            mgmt_mask: "255.255.252.0".to_string(),
        }
    }

    fn vrf_table() -> BTreeMap<String, VrfDefinition> {
        let mut vrfs = BTreeMap::new();
        vrfs.insert(
            "STUDENT-NET".to_string(),
            VrfDefinition {
                rd_suffix: "100".to_string(),
                route_target: "65000:100".to_string(),
                description: "Student residential network".to_string(),
            },
        );
        vrfs.insert(
            "STAFF-NET".to_string(),
            VrfDefinition {
                rd_suffix: "200".to_string(),
                route_target: "65000:200".to_string(),
                description: "Staff and faculty network".to_string(),
            },
        );
        vrfs
    }

    fn core_device() -> DeviceIntent {
        DeviceIntent {
            name: "EUNIV-CORE1".to_string(),
            role: "core".to_string(),
            tier: 0,
            template: "core_router.j2".to_string(),
            mgmt_ip: "192.168.68.200".to_string(),
            loopback_ip: "10.255.0.1".to_string(),
            asn: "65000".to_string(),
            route_reflector: true,
            rr_cluster_id: Some("10.255.0.12".to_string()),
            interfaces: vec![
                InterfaceIntent {
                    name: "GigabitEthernet3".to_string(),
                    ip: "10.0.0.18".to_string(),
                    mask: "255.255.255.252".to_string(),
                    description: "To EUNIV-CORE5".to_string(),
                },
                InterfaceIntent {
                    name: "GigabitEthernet2".to_string(),
                    ip: "10.0.0.1".to_string(),
                    mask: "255.255.255.252".to_string(),
                    description: "To EUNIV-CORE2".to_string(),
                },
            ],
            peers: vec![PeerIntent {
                ip: "10.255.0.2".to_string(),
                remote_as: "65000".to_string(),
                description: "EUNIV-CORE2".to_string(),
            }],
            vrfs: vec![],
            depends_on: vec![],
        }
    }

    fn pe_device() -> DeviceIntent {
        DeviceIntent {
            name: "EUNIV-MAIN-PE1".to_string(),
            role: "pe".to_string(),
            tier: 2,
            template: "pe_router.j2".to_string(),
            mgmt_ip: "192.168.68.209".to_string(),
            loopback_ip: "10.255.1.11".to_string(),
            asn: "65100".to_string(),
            route_reflector: false,
            rr_cluster_id: None,
            interfaces: vec![],
            peers: vec![PeerIntent {
                ip: "10.255.1.1".to_string(),
                remote_as: "65100".to_string(),
                description: "EUNIV-MAIN-AGG1".to_string(),
            }],
            vrfs: vec!["STUDENT-NET".to_string(), "STAFF-NET".to_string()],
            depends_on: vec![],
        }
    }

    fn repo_with(devices: Vec<DeviceIntent>) -> IntentRepository {
        let mut map = BTreeMap::new();
        for d in devices {
            map.insert(d.name.clone(), d);
        }
        IntentRepository::from_fleet(FleetIntent {
            enterprise: enterprise(),
            vrfs: vrf_table(),
            devices: map,
        })
    }

    #[test]
    fn test_render_is_deterministic() {
        let repo = repo_with(vec![core_device()]);
        let renderer = ConfigRenderer::builtin();
        let device = repo.get("EUNIV-CORE1").unwrap();
        let first = renderer.render(&repo, device).unwrap();
        let second = renderer.render(&repo, device).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_contains_hostname_and_router_id() {
        let repo = repo_with(vec![core_device()]);
        let renderer = ConfigRenderer::builtin();
        let text = renderer
            .render(&repo, repo.get("EUNIV-CORE1").unwrap())
            .unwrap();
        assert!(text.contains("hostname EUNIV-CORE1"));
        assert!(text.contains("router-id 10.255.0.1"));
        assert!(text.contains("bgp cluster-id 10.255.0.12"));
        assert!(text.contains("neighbor 10.255.0.2 route-reflector-client"));
    }

    #[test]
    fn test_interfaces_render_in_name_order() {
        let repo = repo_with(vec![core_device()]);
        let renderer = ConfigRenderer::builtin();
        let text = renderer
            .render(&repo, repo.get("EUNIV-CORE1").unwrap())
            .unwrap();
        let g2 = text.find("interface GigabitEthernet2").unwrap();
        let g3 = text.find("interface GigabitEthernet3").unwrap();
        assert!(g2 < g3, "interfaces must be sorted by name");
    }

    #[test]
    fn test_two_partitions_render_two_vrf_blocks() {
        let repo = repo_with(vec![pe_device()]);
        let renderer = ConfigRenderer::builtin();
        let text = renderer
            .render(&repo, repo.get("EUNIV-MAIN-PE1").unwrap())
            .unwrap();

        assert_eq!(text.matches("vrf definition ").count(), 2);
        assert!(text.contains("vrf definition STUDENT-NET"));
        assert!(text.contains("vrf definition STAFF-NET"));
        assert!(text.contains("rd 10.255.1.11:100"));
        assert!(text.contains("route-target import 65000:100"));
        assert!(text.contains("route-target export 65000:100"));
        assert!(text.contains("route-target import 65000:200"));
        assert!(text.contains("route-target export 65000:200"));
        assert!(text.contains("address-family ipv4 vrf STUDENT-NET"));
    }

    #[test]
    fn test_partition_rollout_diff_adds_both_blocks() {
        use crate::diff::diff_configs;

        let repo = repo_with(vec![pe_device()]);
        let renderer = ConfigRenderer::builtin();
        let desired = renderer
            .render(&repo, repo.get("EUNIV-MAIN-PE1").unwrap())
            .unwrap();

        // Live config predates both partitions: drop every vrf-related
        // line from the rendered text.
        let live: String = desired
            .lines()
            .filter(|line| {
                let t = line.trim_start();
                !(t.starts_with("vrf definition")
                    || t.starts_with("rd ")
                    || t.starts_with("route-target")
                    || t.starts_with("address-family ipv4 vrf")
                    || t.starts_with("redistribute connected")
                    || t.starts_with("description Student")
                    || t.starts_with("description Staff"))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let diff = diff_configs(&live, &desired);
        assert!(diff.to_remove.is_empty());
        let added: Vec<&str> = diff.to_add.iter().map(|s| s.as_str()).collect();
        assert!(added.iter().any(|l| l.contains("vrf definition STUDENT-NET")));
        assert!(added.iter().any(|l| l.contains("vrf definition STAFF-NET")));
        assert!(added.iter().any(|l| l.contains("route-target import 65000:100")));
        assert!(added.iter().any(|l| l.contains("route-target export 65000:100")));
        assert!(added.iter().any(|l| l.contains("route-target import 65000:200")));
        assert!(added.iter().any(|l| l.contains("route-target export 65000:200")));
        assert!(added.iter().any(|l| l.contains("address-family ipv4 vrf STUDENT-NET")));
        assert!(added.iter().any(|l| l.contains("address-family ipv4 vrf STAFF-NET")));
    }

    #[test]
    fn test_unknown_template_is_template_error() {
        let mut device = core_device();
        device.template = "spine_switch.j2".to_string();
        let repo = repo_with(vec![device]);
        let renderer = ConfigRenderer::builtin();
        match renderer.render(&repo, repo.get("EUNIV-CORE1").unwrap()) {
            Err(NetfleetError::TemplateError { template, .. }) => {
                assert_eq!(template, "spine_switch.j2")
            }
            other => panic!("expected TemplateError, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_vrf_is_template_error() {
        let mut device = pe_device();
        device.vrfs.push("GHOST-NET".to_string());
        let repo = repo_with(vec![device]);
        let renderer = ConfigRenderer::builtin();
        assert!(matches!(
            renderer.render(&repo, repo.get("EUNIV-MAIN-PE1").unwrap()),
            Err(NetfleetError::TemplateError { .. })
        ));
    }

    #[test]
    fn test_template_dir_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("core_router.j2"),
            "hostname {{ hostname }}\n",
        )
        .unwrap();
        let repo = repo_with(vec![core_device()]);
        let renderer = ConfigRenderer::from_dir(dir.path()).unwrap();
        let text = renderer
            .render(&repo, repo.get("EUNIV-CORE1").unwrap())
            .unwrap();
        assert_eq!(text, "hostname EUNIV-CORE1");
    }

    #[test]
    fn test_generated_config_digest_tracks_text() {
        let a = GeneratedConfig::new("A", "hostname A\n".to_string());
        let b = GeneratedConfig::new("A", "hostname A\n".to_string());
        let c = GeneratedConfig::new("A", "hostname B\n".to_string());
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }
}
