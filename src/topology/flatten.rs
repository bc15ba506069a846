//! Topology flattening.
//!
//! # Responsibilities
//! - Walk every network's group tree, children before the group itself
//! - Emit one `cidr → [ip, ...]` entry per group with a CIDR and hosts
//! - Validate the assembled spec before it is published
//!
//! When two groups declare the same CIDR the one visited later wins. Within
//! a network that means a parent overwrites its children, and a network
//! later in the document overwrites an earlier one.

use serde_json::Value;

use crate::topology::model::{HostGroup, RouteSpec, TopologyDocument};
use crate::topology::sanity::validate_route_spec;
use crate::topology::TopologyError;

/// Groups nested deeper than this are not descended into.
pub const MAX_GROUP_DEPTH: usize = 64;

/// Decode raw store bytes and flatten them.
pub fn parse_and_flatten(raw: &[u8]) -> Result<(Value, RouteSpec), TopologyError> {
    let doc: Value = serde_json::from_slice(raw)?;
    let spec = flatten(&doc)?;
    Ok((doc, spec))
}

/// Flatten a decoded topology document into a route spec.
pub fn flatten(doc: &Value) -> Result<RouteSpec, TopologyError> {
    let topology =
        TopologyDocument::from_value(doc, MAX_GROUP_DEPTH).ok_or(TopologyError::MissingNetworks)?;

    let mut route_spec = RouteSpec::new();
    for (net_name, network) in &topology.networks {
        if let Some(root) = &network.root {
            collect_group(net_name, root, &mut route_spec);
        }
    }

    validate_route_spec(&route_spec)?;
    Ok(route_spec)
}

fn collect_group(net_name: &str, group: &HostGroup, route_spec: &mut RouteSpec) {
    for child in &group.groups {
        collect_group(net_name, child, route_spec);
    }

    if group.truncated {
        tracing::warn!(
            network = %net_name,
            cidr = group.cidr.as_deref().unwrap_or("-"),
            max_depth = MAX_GROUP_DEPTH,
            "Topology groups nested too deeply, ignoring deeper groups"
        );
    }

    let Some(cidr) = &group.cidr else {
        return;
    };
    if group.hosts.is_empty() {
        return;
    }

    let skipped = group.hosts.iter().filter(|h| h.ip.is_none()).count();
    if skipped > 0 {
        tracing::warn!(
            network = %net_name,
            cidr = %cidr,
            skipped,
            "Ignoring host entries without an 'ip' field"
        );
    }

    let host_ips = group.host_ips();
    if !host_ips.is_empty() {
        route_spec.insert(cidr.clone(), host_ips);
    }
}
