//! In-memory views the engine reasons over
//!
//! Both collections are an arena plus an id index: entries are pushed once
//! and referenced by id everywhere else.

use attest_domain::{Claim, ClaimId, DefeatTarget, Defeater, DefeaterId, EvidenceId};
use std::collections::{BTreeSet, HashMap};

/// Claims materialised from the ledger, with their dependency edges
#[derive(Debug, Clone, Default)]
pub struct ClaimBoard {
    claims: Vec<Claim>,
    index: HashMap<ClaimId, usize>,
    by_entry: HashMap<EvidenceId, ClaimId>,
    dependencies: HashMap<ClaimId, BTreeSet<ClaimId>>,
    dependents: HashMap<ClaimId, BTreeSet<ClaimId>>,
}

impl ClaimBoard {
    /// Empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim; returns false if its id is already present
    pub fn insert(&mut self, claim: Claim) -> bool {
        if self.index.contains_key(&claim.id) {
            return false;
        }
        if let Some(entry) = &claim.evidence {
            self.by_entry.insert(entry.clone(), claim.id);
        }
        self.index.insert(claim.id, self.claims.len());
        self.claims.push(claim);
        true
    }

    /// Look up a claim
    pub fn get(&self, id: &ClaimId) -> Option<&Claim> {
        self.index.get(id).map(|&i| &self.claims[i])
    }

    /// Look up a claim for mutation
    pub fn get_mut(&mut self, id: &ClaimId) -> Option<&mut Claim> {
        self.index.get(id).map(|&i| &mut self.claims[i])
    }

    /// Claim recorded by a ledger entry
    pub fn by_entry(&self, entry: &EvidenceId) -> Option<ClaimId> {
        self.by_entry.get(entry).copied()
    }

    /// Claims in the order they were recorded
    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    /// Claim ids in the order they were recorded
    pub fn ids(&self) -> Vec<ClaimId> {
        self.claims.iter().map(|c| c.id).collect()
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the board is empty
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Record that `dependent` depends on (or assumes) `dependency`
    ///
    /// Either side may not be on the board yet; self-edges are ignored.
    pub fn add_dependency(&mut self, dependent: ClaimId, dependency: ClaimId) {
        if dependent == dependency {
            return;
        }
        self.dependencies
            .entry(dependent)
            .or_default()
            .insert(dependency);
        self.dependents
            .entry(dependency)
            .or_default()
            .insert(dependent);
    }

    /// Claims `id` depends on
    pub fn dependencies_of(&self, id: &ClaimId) -> impl Iterator<Item = &ClaimId> {
        self.dependencies.get(id).into_iter().flatten()
    }

    /// Claims that depend on `id`
    pub fn dependents_of(&self, id: &ClaimId) -> impl Iterator<Item = &ClaimId> {
        self.dependents.get(id).into_iter().flatten()
    }
}

/// Every defeater the engine knows about, resolved or not
#[derive(Debug, Clone, Default)]
pub struct DefeaterRegistry {
    defeaters: Vec<Defeater>,
    index: HashMap<DefeaterId, usize>,
}

impl DefeaterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a defeater
    ///
    /// A known id merges the incoming `defeated_by` links and returns false.
    /// Meta-defeaters are also linked into their target's `defeated_by`.
    pub fn insert(&mut self, defeater: Defeater) -> bool {
        if let DefeatTarget::Defeater(target) = &defeater.target {
            if let Some(&i) = self.index.get(target) {
                self.defeaters[i].add_defeated_by(defeater.id.clone());
            }
        }

        if let Some(&i) = self.index.get(&defeater.id) {
            let existing = &mut self.defeaters[i];
            for attacker in defeater.defeated_by {
                existing.add_defeated_by(attacker);
            }
            return false;
        }

        // attackers registered before this defeater
        let attackers: Vec<DefeaterId> = self
            .defeaters
            .iter()
            .filter(|d| d.target_defeater() == Some(&defeater.id))
            .map(|d| d.id.clone())
            .collect();

        let mut defeater = defeater;
        for attacker in attackers {
            defeater.add_defeated_by(attacker);
        }
        self.index.insert(defeater.id.clone(), self.defeaters.len());
        self.defeaters.push(defeater);
        true
    }

    /// Look up a defeater
    pub fn get(&self, id: &DefeaterId) -> Option<&Defeater> {
        self.index.get(id).map(|&i| &self.defeaters[i])
    }

    /// Look up a defeater for mutation
    pub fn get_mut(&mut self, id: &DefeaterId) -> Option<&mut Defeater> {
        self.index.get(id).map(|&i| &mut self.defeaters[i])
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &DefeaterId) -> bool {
        self.index.contains_key(id)
    }

    /// All defeaters in registration order
    pub fn as_slice(&self) -> &[Defeater] {
        &self.defeaters
    }

    /// Defeaters attacking `claim` directly
    pub fn for_claim(&self, claim: ClaimId) -> impl Iterator<Item = &Defeater> {
        self.defeaters
            .iter()
            .filter(move |d| d.target_claim() == Some(claim))
    }

    /// Number of registered defeaters
    pub fn len(&self) -> usize {
        self.defeaters.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.defeaters.is_empty()
    }

    /// Claim at the bottom of a chain of meta-defeaters
    ///
    /// Returns `None` when the chain ends at an unknown defeater or loops.
    pub fn root_claim(&self, id: &DefeaterId) -> Option<ClaimId> {
        let mut seen = BTreeSet::new();
        let mut current = self.get(id)?;
        loop {
            match &current.target {
                DefeatTarget::Claim(claim) => return Some(*claim),
                DefeatTarget::Defeater(next) => {
                    if !seen.insert(next.clone()) {
                        return None;
                    }
                    current = self.get(next)?;
                }
            }
        }
    }
}
