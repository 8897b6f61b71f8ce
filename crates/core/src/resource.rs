// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meters and peer groups as stored in the lock table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Network address of a meter; the unique key of its lock row
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Tag shared by meters that must be locked together
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerGroup(pub String);

impl PeerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for PeerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a meter is part of the candidate pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    #[default]
    Active,
    Inactive,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ResourceStatus::Active),
            "inactive" => Ok(ResourceStatus::Inactive),
            other => Err(format!("unknown meter status: {}", other)),
        }
    }
}

/// One row of the lock table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub address: Address,
    pub busy: bool,
    pub owner_host: Option<String>,
    /// Incremented on every successful lock
    pub busy_change_count: i64,
    pub last_busy_change: Option<DateTime<Utc>>,
    pub peer_group: Option<PeerGroup>,
    pub status: ResourceStatus,
}

impl Resource {
    /// A free, active meter with no history
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            busy: false,
            owner_host: None,
            busy_change_count: 0,
            last_busy_change: None,
            peer_group: None,
            status: ResourceStatus::Active,
        }
    }

    pub fn with_peer_group(mut self, group: impl Into<String>) -> Self {
        self.peer_group = Some(PeerGroup::new(group));
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Meters that are locked and released as a unit
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: PeerGroup,
    pub members: Vec<Address>,
}

impl ResourceGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// How peer-group membership filters a listing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerFilter {
    #[default]
    Any,
    /// Only meters without a peer group
    Ungrouped,
    /// Only meters that belong to some peer group
    Grouped,
}

/// Selection criteria for `list_resources`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub status: Option<ResourceStatus>,
    #[serde(default)]
    pub peer: PeerFilter,
    /// When non-empty, only these addresses
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl ResourceFilter {
    /// Active meters, any grouping
    pub fn active() -> Self {
        Self {
            status: Some(ResourceStatus::Active),
            ..Self::default()
        }
    }

    pub fn with_peer(mut self, peer: PeerFilter) -> Self {
        self.peer = peer;
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(status) = self.status {
            if resource.status != status {
                return false;
            }
        }
        let peer_ok = match self.peer {
            PeerFilter::Any => true,
            PeerFilter::Ungrouped => resource.peer_group.is_none(),
            PeerFilter::Grouped => resource.peer_group.is_some(),
        };
        peer_ok && (self.addresses.is_empty() || self.addresses.contains(&resource.address))
    }
}

/// Build lockable groups from meters that carry a peer group.
///
/// Groups are returned sorted by name with members in input order. A group
/// with a single member cannot host peer-to-peer work and is returned in the
/// second list instead.
pub fn group_by_peer(resources: &[Resource]) -> (Vec<ResourceGroup>, Vec<ResourceGroup>) {
    let mut by_name: BTreeMap<&PeerGroup, Vec<Address>> = BTreeMap::new();
    for resource in resources {
        if let Some(group) = &resource.peer_group {
            by_name
                .entry(group)
                .or_default()
                .push(resource.address.clone());
        }
    }

    let mut groups = Vec::new();
    let mut rejected = Vec::new();
    for (name, members) in by_name {
        let group = ResourceGroup {
            name: name.clone(),
            members,
        };
        if group.len() > 1 {
            groups.push(group);
        } else {
            rejected.push(group);
        }
    }
    (groups, rejected)
}
