// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator-side record of meters held by this session
//!
//! The lock table is authoritative; the ledger is what the coordinator
//! believes it holds. Counters are kept alongside the maps and
//! cross-checked after every mutation.

use crate::resource::{Address, PeerGroup, ResourceGroup};
use crate::worker::WorkerId;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger inconsistent: {0}")]
    Inconsistent(String),
    #[error("{0} is already held")]
    AlreadyHeld(Address),
}

/// Meters released from the ledger in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Holding {
    Single(Address),
    Group { name: PeerGroup, members: Vec<Address> },
}

impl Holding {
    pub fn addresses(&self) -> Vec<Address> {
        match self {
            Holding::Single(addr) => vec![addr.clone()],
            Holding::Group { members, .. } => members.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeldGroup {
    members: Vec<Address>,
    worker: WorkerId,
}

#[derive(Debug, Default)]
pub struct HeldLockLedger {
    singles: BTreeMap<Address, WorkerId>,
    groups: BTreeMap<PeerGroup, HeldGroup>,
    cur_singles: usize,
    cur_multi: usize,
}

impl HeldLockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_single(&mut self, address: Address, worker: WorkerId) -> Result<(), LedgerError> {
        if self.is_held(&address) {
            return Err(LedgerError::AlreadyHeld(address));
        }
        self.singles.insert(address, worker);
        self.cur_singles += 1;
        self.check()
    }

    pub fn record_group(&mut self, group: &ResourceGroup, worker: WorkerId) -> Result<(), LedgerError> {
        if let Some(addr) = group.members.iter().find(|a| self.is_held(a)) {
            return Err(LedgerError::AlreadyHeld(addr.clone()));
        }
        self.groups.insert(
            group.name.clone(),
            HeldGroup {
                members: group.members.clone(),
                worker,
            },
        );
        self.cur_multi += group.members.len();
        self.check()
    }

    /// Remove whatever the worker holds
    pub fn release_worker(&mut self, worker: &WorkerId) -> Result<Option<Holding>, LedgerError> {
        let single = self
            .singles
            .iter()
            .find(|(_, w)| *w == worker)
            .map(|(a, _)| a.clone());
        if let Some(addr) = single {
            self.singles.remove(&addr);
            self.cur_singles = self.cur_singles.saturating_sub(1);
            self.check()?;
            return Ok(Some(Holding::Single(addr)));
        }

        let group = self
            .groups
            .iter()
            .find(|(_, g)| g.worker == *worker)
            .map(|(n, _)| n.clone());
        if let Some(name) = group {
            if let Some(held) = self.groups.remove(&name) {
                self.cur_multi = self.cur_multi.saturating_sub(held.members.len());
                self.check()?;
                return Ok(Some(Holding::Group {
                    name,
                    members: held.members,
                }));
            }
        }
        Ok(None)
    }

    /// Empty the ledger, returning everything it held
    pub fn drain(&mut self) -> Vec<Holding> {
        let mut out: Vec<Holding> = std::mem::take(&mut self.singles)
            .into_keys()
            .map(Holding::Single)
            .collect();
        out.extend(
            std::mem::take(&mut self.groups)
                .into_iter()
                .map(|(name, g)| Holding::Group {
                    name,
                    members: g.members,
                }),
        );
        self.cur_singles = 0;
        self.cur_multi = 0;
        out
    }

    pub fn holder_of(&self, address: &Address) -> Option<&WorkerId> {
        self.singles.get(address).or_else(|| {
            self.groups
                .values()
                .find(|g| g.members.contains(address))
                .map(|g| &g.worker)
        })
    }

    pub fn is_held(&self, address: &Address) -> bool {
        self.holder_of(address).is_some()
    }

    pub fn holds_group(&self, name: &PeerGroup) -> bool {
        self.groups.contains_key(name)
    }

    pub fn single_count(&self) -> usize {
        self.cur_singles
    }

    pub fn multi_count(&self) -> usize {
        self.cur_multi
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Meters held across both categories
    pub fn total_held(&self) -> usize {
        self.cur_singles + self.cur_multi
    }

    pub fn addresses(&self) -> Vec<Address> {
        let mut all: Vec<Address> = self.singles.keys().cloned().collect();
        all.extend(self.groups.values().flat_map(|g| g.members.iter().cloned()));
        all.sort();
        all
    }

    pub fn check(&self) -> Result<(), LedgerError> {
        if self.cur_singles != self.singles.len() {
            return Err(LedgerError::Inconsistent(format!(
                "{} singles counted, {} tracked",
                self.cur_singles,
                self.singles.len()
            )));
        }
        let members: usize = self.groups.values().map(|g| g.members.len()).sum();
        if self.cur_multi != members {
            return Err(LedgerError::Inconsistent(format!(
                "{} group members counted, {} tracked",
                self.cur_multi, members
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, members: &[&str]) -> ResourceGroup {
        ResourceGroup {
            name: PeerGroup::new(name),
            members: members.iter().map(|m| Address::from(*m)).collect(),
        }
    }

    #[test]
    fn counters_follow_records() {
        let mut ledger = HeldLockLedger::new();
        ledger.record_single(Address::from("10.0.0.1"), WorkerId::new("m0")).unwrap();
        ledger
            .record_group(&group("p1", &["10.0.1.1", "10.0.1.2"]), WorkerId::new("p0"))
            .unwrap();

        assert_eq!(ledger.single_count(), 1);
        assert_eq!(ledger.multi_count(), 2);
        assert_eq!(ledger.total_held(), 3);
        assert_eq!(ledger.holder_of(&Address::from("10.0.1.2")), Some(&WorkerId::new("p0")));
    }

    #[test]
    fn double_record_is_rejected() {
        let mut ledger = HeldLockLedger::new();
        ledger.record_single(Address::from("a"), WorkerId::new("m0")).unwrap();
        assert_eq!(
            ledger.record_single(Address::from("a"), WorkerId::new("m1")),
            Err(LedgerError::AlreadyHeld(Address::from("a")))
        );
        assert_eq!(
            ledger.record_group(&group("p", &["b", "a"]), WorkerId::new("p0")),
            Err(LedgerError::AlreadyHeld(Address::from("a")))
        );
    }

    #[test]
    fn release_worker_returns_its_holding_once() {
        let mut ledger = HeldLockLedger::new();
        ledger.record_group(&group("p1", &["x", "y"]), WorkerId::new("p0")).unwrap();

        let released = ledger.release_worker(&WorkerId::new("p0")).unwrap();
        assert_eq!(
            released,
            Some(Holding::Group {
                name: PeerGroup::new("p1"),
                members: vec![Address::from("x"), Address::from("y")]
            })
        );
        assert_eq!(ledger.release_worker(&WorkerId::new("p0")).unwrap(), None);
        assert_eq!(ledger.total_held(), 0);
    }

    #[test]
    fn drain_empties_everything() {
        let mut ledger = HeldLockLedger::new();
        ledger.record_single(Address::from("a"), WorkerId::new("m0")).unwrap();
        ledger.record_group(&group("p1", &["x", "y"]), WorkerId::new("p0")).unwrap();

        let drained = ledger.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(ledger.total_held(), 0);
        assert!(ledger.addresses().is_empty());
        ledger.check().unwrap();
    }

    #[test]
    fn check_detects_divergence() {
        let mut ledger = HeldLockLedger::new();
        ledger.cur_singles = 2;
        assert!(matches!(ledger.check(), Err(LedgerError::Inconsistent(_))));
    }
}
