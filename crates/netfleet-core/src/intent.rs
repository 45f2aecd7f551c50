//! Declarative fleet intent: the source of truth for device configurations.
//!
//! Intent is loaded once per run into an immutable [`IntentRepository`] and
//! passed by reference into every component; no component reads ambient
//! state. In production the fleet document would be exported from an
//! inventory system; here it is authored as YAML.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetfleetError, Result};

/// Enterprise-wide settings rendered into every device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseSettings {
    /// DNS domain name.
    pub domain_name: String,

    /// DNS resolvers.
    #[serde(default)]
    pub dns_servers: Vec<String>,

    /// NTP servers.
    #[serde(default)]
    pub ntp_servers: Vec<String>,

    /// Read-only SNMP community string.
    pub snmp_community: String,

    /// SNMP sysLocation.
    pub snmp_location: String,

    /// SNMP sysContact.
    pub snmp_contact: String,

    /// Default gateway for the management network.
    pub default_gateway: String,

    /// Netmask of the management network.
    pub mgmt_mask: String,
}

/// A logical partition (VRF) definition shared across the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrfDefinition {
    /// Route-distinguisher suffix, combined with the device loopback.
    pub rd_suffix: String,

    /// Import/export route-target.
    pub route_target: String,

    /// Human-readable description.
    pub description: String,
}

/// A logical interface declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceIntent {
    pub name: String,
    pub ip: String,
    pub mask: String,
    pub description: String,
}

/// A routing-peer declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIntent {
    pub ip: String,
    pub remote_as: String,
    #[serde(default)]
    pub description: String,
}

/// The full declarative record for one device.
///
/// Immutable once loaded for a run. The `tier` drives deployment ordering:
/// lower tiers (core/transit) are touched before higher tiers (edge)
/// depending on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIntent {
    /// Device name; also the key in the fleet document.
    #[serde(default)]
    pub name: String,

    /// Role tag, e.g. "core", "aggregation", "pe".
    pub role: String,

    /// Dependency tier. Tier 0 is deployed first.
    pub tier: u8,

    /// Rendering template name, e.g. "core_router.j2".
    pub template: String,

    /// Management address.
    pub mgmt_ip: String,

    /// Loopback address, used as router-id and BGP source.
    pub loopback_ip: String,

    /// Autonomous system number.
    pub asn: String,

    /// Whether this device acts as a route reflector.
    #[serde(default)]
    pub route_reflector: bool,

    /// Route-reflector cluster id, when `route_reflector` is set.
    #[serde(default)]
    pub rr_cluster_id: Option<String>,

    #[serde(default)]
    pub interfaces: Vec<InterfaceIntent>,

    #[serde(default)]
    pub peers: Vec<PeerIntent>,

    /// Names of logical partitions (VRFs) provisioned on this device,
    /// resolved against the fleet-level VRF table.
    #[serde(default)]
    pub vrfs: Vec<String>,

    /// Devices this one depends on. Tier ordering already dominates the
    /// deployment plan; this exists to detect contradictory assignments.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// The on-disk fleet document: enterprise settings, the VRF table and all
/// device intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetIntent {
    pub enterprise: EnterpriseSettings,

    /// BTreeMap so iteration order is deterministic.
    #[serde(default)]
    pub vrfs: BTreeMap<String, VrfDefinition>,

    #[serde(default)]
    pub devices: BTreeMap<String, DeviceIntent>,
}

/// Immutable repository of fleet intent, constructed once at process start.
#[derive(Debug, Clone)]
pub struct IntentRepository {
    fleet: FleetIntent,
}

impl IntentRepository {
    /// Load the fleet document from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let fleet: FleetIntent = serde_yaml::from_str(&raw)
            .map_err(|e| NetfleetError::IntentLoad(e.to_string()))?;
        Ok(Self::from_fleet(fleet))
    }

    /// Build a repository from an in-memory fleet document.
    ///
    /// Device names are filled in from the map keys so a device always
    /// knows its own name regardless of how the document was authored.
    pub fn from_fleet(mut fleet: FleetIntent) -> Self {
        for (name, device) in fleet.devices.iter_mut() {
            device.name = name.clone();
        }
        Self { fleet }
    }

    /// Look up one device's intent.
    pub fn get(&self, name: &str) -> Result<&DeviceIntent> {
        self.fleet
            .devices
            .get(name)
            .ok_or_else(|| NetfleetError::IntentNotFound(name.to_string()))
    }

    /// All device names, sorted.
    pub fn device_names(&self) -> Vec<String> {
        self.fleet.devices.keys().cloned().collect()
    }

    /// All device intents, in name order.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceIntent> {
        self.fleet.devices.values()
    }

    /// Enterprise-wide settings.
    pub fn enterprise(&self) -> &EnterpriseSettings {
        &self.fleet.enterprise
    }

    /// Look up a VRF definition by partition name.
    pub fn vrf(&self, name: &str) -> Option<&VrfDefinition> {
        self.fleet.vrfs.get(name)
    }

    /// Number of devices in the fleet.
    pub fn len(&self) -> usize {
        self.fleet.devices.len()
    }

    /// Whether the fleet is empty.
    pub fn is_empty(&self) -> bool {
        self.fleet.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
enterprise:
  domain_name: euniv.edu
  dns_servers: ["10.255.255.1", "10.255.255.2"]
  ntp_servers: ["10.255.255.10"]
  snmp_community: euniv-mon-ro
  snmp_location: E University Data Center
  snmp_contact: noc@euniv.edu
  default_gateway: 192.168.68.1
  mgmt_mask: 255.255.252.0
vrfs:
  STUDENT-NET:
    rd_suffix: "100"
    route_target: "65000:100"
    description: Student residential network
devices:
  EUNIV-CORE1:
    role: core
    tier: 0
    template: core_router.j2
    mgmt_ip: 192.168.68.200
    loopback_ip: 10.255.0.1
    asn: "65000"
    route_reflector: true
    rr_cluster_id: 10.255.0.12
    interfaces:
      - name: GigabitEthernet2
        ip: 10.0.0.1
        mask: 255.255.255.252
        description: To EUNIV-CORE2
    peers:
      - ip: 10.255.0.2
        remote_as: "65000"
        description: EUNIV-CORE2
  EUNIV-MAIN-PE1:
    role: pe
    tier: 2
    template: pe_router.j2
    mgmt_ip: 192.168.68.209
    loopback_ip: 10.255.1.11
    asn: "65100"
    vrfs: [STUDENT-NET]
    depends_on: [EUNIV-CORE1]
"#
    }

    fn sample_repo() -> IntentRepository {
        let fleet: FleetIntent = serde_yaml::from_str(sample_yaml()).unwrap();
        IntentRepository::from_fleet(fleet)
    }

    #[test]
    fn test_load_fills_device_names_from_keys() {
        let repo = sample_repo();
        let core = repo.get("EUNIV-CORE1").unwrap();
        assert_eq!(core.name, "EUNIV-CORE1");
        assert_eq!(core.tier, 0);
        assert!(core.route_reflector);
    }

    #[test]
    fn test_missing_device_is_intent_not_found() {
        let repo = sample_repo();
        match repo.get("EUNIV-GONE") {
            Err(NetfleetError::IntentNotFound(name)) => assert_eq!(name, "EUNIV-GONE"),
            other => panic!("expected IntentNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_device_names_are_sorted() {
        let repo = sample_repo();
        let names = repo.device_names();
        assert_eq!(names, vec!["EUNIV-CORE1", "EUNIV-MAIN-PE1"]);
    }

    #[test]
    fn test_vrf_table_lookup() {
        let repo = sample_repo();
        let vrf = repo.vrf("STUDENT-NET").unwrap();
        assert_eq!(vrf.route_target, "65000:100");
        assert!(repo.vrf("NOPE").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.yaml");
        std::fs::write(&path, sample_yaml()).unwrap();
        let repo = IntentRepository::load(&path).unwrap();
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_malformed_yaml_is_intent_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.yaml");
        std::fs::write(&path, "devices: [not, a, map]").unwrap();
        match IntentRepository::load(&path) {
            Err(NetfleetError::IntentLoad(_)) => {}
            other => panic!("expected IntentLoad, got {other:?}"),
        }
    }
}
