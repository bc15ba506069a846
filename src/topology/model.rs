//! Topology data model.
//!
//! The topology document is maintained by an external IPAM system and its
//! schema drifts between versions, so the typed view is built from a
//! `serde_json::Value` leniently: a field with an unexpected JSON type is
//! treated as absent and unknown keys are ignored.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Flattened routing table: CIDR → host IPs in traversal order.
///
/// Sorted by CIDR so that two equal specs serialise identically.
pub type RouteSpec = BTreeMap<String, Vec<String>>;

/// The decoded topology document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyDocument {
    /// Networks in document order.
    pub networks: Vec<(String, NetworkEntry)>,
}

/// A single network and its root host group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkEntry {
    pub cidr: Option<String>,
    pub name: Option<String>,
    pub root: Option<HostGroup>,
}

/// One node of the recursive group tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostGroup {
    pub cidr: Option<String>,
    pub hosts: Vec<HostEntry>,
    pub groups: Vec<HostGroup>,
    /// Set when children were dropped because the tree was too deep.
    pub truncated: bool,
}

/// A host routing for a group's CIDR.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntry {
    /// `None` when the entry has no string `ip` field.
    pub ip: Option<String>,
}

impl TopologyDocument {
    /// Build the typed view. Returns `None` when `networks` is missing or
    /// is not an object.
    pub fn from_value(doc: &Value, max_depth: usize) -> Option<Self> {
        let networks = doc.as_object()?.get("networks")?.as_object()?;

        let networks = networks
            .iter()
            .filter_map(|(name, entry)| {
                let entry = entry.as_object()?;
                Some((name.clone(), NetworkEntry::from_map(entry, max_depth)))
            })
            .collect();

        Some(Self { networks })
    }
}

impl NetworkEntry {
    fn from_map(entry: &Map<String, Value>, max_depth: usize) -> Self {
        // Older topology schemas keep the root group under `groups`.
        let root = entry
            .get("host_groups")
            .and_then(Value::as_object)
            .or_else(|| entry.get("groups").and_then(Value::as_object))
            .map(|group| HostGroup::from_map(group, 1, max_depth));

        Self {
            cidr: string_field(entry, "cidr"),
            name: string_field(entry, "name"),
            root,
        }
    }
}

impl HostGroup {
    fn from_map(group: &Map<String, Value>, depth: usize, max_depth: usize) -> Self {
        let hosts = group
            .get("hosts")
            .and_then(Value::as_array)
            .map(|hosts| hosts.iter().map(HostEntry::from_value).collect())
            .unwrap_or_default();

        let children = group
            .get("groups")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let truncated = depth >= max_depth && !children.is_empty();
        let groups = if truncated {
            Vec::new()
        } else {
            children
                .iter()
                .filter_map(Value::as_object)
                .map(|child| HostGroup::from_map(child, depth + 1, max_depth))
                .collect()
        };

        Self {
            cidr: string_field(group, "cidr"),
            hosts,
            groups,
            truncated,
        }
    }

    /// The host IPs this group routes for, skipping entries without an IP.
    pub fn host_ips(&self) -> Vec<String> {
        self.hosts.iter().filter_map(|h| h.ip.clone()).collect()
    }
}

impl HostEntry {
    fn from_value(host: &Value) -> Self {
        Self {
            ip: host.get("ip").and_then(Value::as_str).map(str::to_owned),
        }
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrong_types_are_treated_as_absent() {
        let doc = json!({
            "networks": {
                "net1": {
                    "cidr": 10,
                    "host_groups": {
                        "cidr": "10.0.0.0/8",
                        "hosts": "not-a-list",
                        "groups": {"cidr": "10.1.0.0/16"}
                    }
                },
                "broken": "not-an-object"
            }
        });

        let topo = TopologyDocument::from_value(&doc, 64).unwrap();
        assert_eq!(topo.networks.len(), 1);
        let (name, net) = &topo.networks[0];
        assert_eq!(name, "net1");
        assert_eq!(net.cidr, None);
        let root = net.root.as_ref().unwrap();
        assert_eq!(root.cidr.as_deref(), Some("10.0.0.0/8"));
        assert!(root.hosts.is_empty());
        assert!(root.groups.is_empty());
    }

    #[test]
    fn test_legacy_groups_location() {
        let doc = json!({
            "networks": {
                "net1": {
                    "groups": {"cidr": "10.0.0.0/8", "hosts": [{"ip": "192.168.0.1"}]}
                }
            }
        });

        let topo = TopologyDocument::from_value(&doc, 64).unwrap();
        let root = topo.networks[0].1.root.as_ref().unwrap();
        assert_eq!(root.host_ips(), vec!["192.168.0.1".to_string()]);
    }

    #[test]
    fn test_missing_networks() {
        assert!(TopologyDocument::from_value(&json!({}), 64).is_none());
        assert!(TopologyDocument::from_value(&json!({"networks": []}), 64).is_none());
        assert!(TopologyDocument::from_value(&json!([1, 2]), 64).is_none());
    }

    #[test]
    fn test_depth_limit_truncates() {
        let doc = json!({
            "networks": {
                "net1": {
                    "host_groups": {
                        "cidr": "10.0.0.0/8",
                        "groups": [{
                            "cidr": "10.1.0.0/16",
                            "groups": [{"cidr": "10.1.1.0/24"}]
                        }]
                    }
                }
            }
        });

        let topo = TopologyDocument::from_value(&doc, 2).unwrap();
        let root = topo.networks[0].1.root.as_ref().unwrap();
        assert!(!root.truncated);
        assert_eq!(root.groups.len(), 1);
        assert!(root.groups[0].truncated);
        assert!(root.groups[0].groups.is_empty());
    }
}
