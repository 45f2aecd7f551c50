//! Dependency-ordered deployment planning.
//!
//! Devices are grouped into numbered tiers reflecting topological
//! dependency: transit/core tiers are touched before the aggregation and
//! edge tiers that depend on them. Changing an edge device before its
//! transit path is safe in isolation; changing the transit path first
//! while edges still expect old behaviour risks a larger blast radius.
//! Rollback order is the exact reverse of apply order.

use std::collections::{BTreeMap, HashMap, HashSet};

use netfleet_core::{IntentRepository, NetfleetError, Result};
use tracing::debug;

/// A total apply order over the planned devices.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// Devices in apply order: ascending tier, name order within a tier.
    pub order: Vec<String>,

    /// Tier membership, ascending.
    pub tiers: BTreeMap<u8, Vec<String>>,
}

impl DeploymentPlan {
    /// Rollback order: the reverse of the apply order.
    pub fn rollback_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Plans the device apply order from fleet intent.
pub struct DeploymentPlanner;

impl DeploymentPlanner {
    /// Compute the plan for the whole fleet, or for `subset` when given.
    ///
    /// Within a tier the order is stable (name order) but otherwise
    /// unconstrained. Fails with `CyclicDependency` only when the
    /// `depends_on` graph is contradictory, i.e. devices depend back on
    /// each other; references to unknown devices are ignored since tier
    /// ordering already dominates.
    pub fn plan(repo: &IntentRepository, subset: Option<&[String]>) -> Result<DeploymentPlan> {
        let names: Vec<String> = match subset {
            Some(names) => names.to_vec(),
            None => repo.device_names(),
        };

        let mut tiers: BTreeMap<u8, Vec<String>> = BTreeMap::new();
        for name in &names {
            let device = repo.get(name)?;
            tiers.entry(device.tier).or_default().push(name.clone());
        }
        for members in tiers.values_mut() {
            members.sort();
        }

        Self::check_cycles(repo, &names)?;

        let order: Vec<String> = tiers.values().flatten().cloned().collect();
        debug!(devices = order.len(), tiers = tiers.len(), "deployment plan computed");
        Ok(DeploymentPlan { order, tiers })
    }

    /// Depth-first cycle detection over the `depends_on` graph.
    fn check_cycles(repo: &IntentRepository, names: &[String]) -> Result<()> {
        let in_scope: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut state: HashMap<&str, VisitState> = HashMap::new();

        for name in names {
            let mut path = Vec::new();
            Self::visit(repo, &in_scope, name, &mut state, &mut path)?;
        }
        Ok(())
    }

    fn visit<'a>(
        repo: &'a IntentRepository,
        in_scope: &HashSet<&str>,
        name: &'a str,
        state: &mut HashMap<&'a str, VisitState>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match state.get(name) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                let cycle_start = path.iter().position(|d| *d == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[cycle_start..].to_vec();
                cycle.push(name);
                return Err(NetfleetError::CyclicDependency(cycle.join(" -> ")));
            }
            None => {}
        }

        state.insert(name, VisitState::InProgress);
        path.push(name);

        let device = repo.get(name)?;
        for dep in &device.depends_on {
            if in_scope.contains(dep.as_str()) {
                Self::visit(repo, in_scope, dep, state, path)?;
            }
        }

        path.pop();
        state.insert(name, VisitState::Done);
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum VisitState {
    InProgress,
    Done,
}
