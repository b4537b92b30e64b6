//! Pattern instances and their lifecycle.
//!
//! Status machine: `Active → {Tested | Filled | Swept} → Expired`.
//! Exactly one resolving transition may fire per instance; `Expired` is
//! reachable from any status once the instance ages out. Only `Active`
//! instances feed signal generation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::PatternId;

/// Directional bias of a pattern or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    FairValueGap,
    OrderBlock,
    LiquidityZone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternStatus {
    Active,
    Tested,
    Filled,
    Swept,
    Expired,
}

impl PatternStatus {
    pub fn is_active(self) -> bool {
        matches!(self, PatternStatus::Active)
    }
}

/// A detected pattern with price levels `[lower, upper]`.
///
/// For a fair-value gap the levels are the gap boundaries, for an order block
/// the middle candle's body, for a liquidity zone the buffered swing extreme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInstance {
    pub id: PatternId,
    pub kind: PatternKind,
    pub direction: Direction,
    pub formed_at: NaiveDateTime,
    pub upper: f64,
    pub lower: f64,
    /// Strength / significance score in [0, 100].
    pub strength: f64,
    /// Bars processed since formation.
    pub age: usize,
    pub status: PatternStatus,
    /// Times price revisited the zone without resolving it.
    pub touches: u32,
}

impl PatternInstance {
    pub fn new(
        kind: PatternKind,
        direction: Direction,
        formed_at: NaiveDateTime,
        lower: f64,
        upper: f64,
        strength: f64,
    ) -> Self {
        Self {
            id: PatternId(0),
            kind,
            direction,
            formed_at,
            upper: upper.max(lower),
            lower: lower.min(upper),
            strength: strength.clamp(0.0, 100.0),
            age: 0,
            status: PatternStatus::Active,
            touches: 0,
        }
    }

    pub fn size(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn mid(&self) -> f64 {
        self.lower + self.size() / 2.0
    }

    /// True if `[low, high]` overlaps the instance's levels.
    pub fn overlaps(&self, low: f64, high: f64) -> bool {
        low <= self.upper && high >= self.lower
    }

    /// Apply the single resolving transition. Returns false (and changes
    /// nothing) if the instance has already left `Active`.
    pub fn resolve(&mut self, status: PatternStatus) -> bool {
        debug_assert!(
            !matches!(status, PatternStatus::Active | PatternStatus::Expired),
            "resolve target must be Tested, Filled or Swept"
        );
        if !self.status.is_active() {
            return false;
        }
        self.status = status;
        true
    }

    pub fn expire(&mut self) {
        self.status = PatternStatus::Expired;
    }
}

/// Instance list owned by exactly one detector.
///
/// Removal never shifts elements while iterating: `prune` rebuilds the list
/// with `retain` once per cycle, after all status updates ran.
#[derive(Debug, Clone, Default)]
pub struct PatternBook {
    instances: Vec<PatternInstance>,
    next_id: u64,
}

impl PatternBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new instance and return its id.
    pub fn insert(&mut self, mut instance: PatternInstance) -> PatternId {
        self.next_id += 1;
        let id = PatternId(self.next_id);
        instance.id = id;
        self.instances.push(instance);
        id
    }

    /// Age every instance by one bar; instances reaching `max_age` expire.
    pub fn advance(&mut self, max_age: usize) {
        for inst in &mut self.instances {
            inst.age += 1;
            if inst.age >= max_age {
                inst.expire();
            }
        }
    }

    /// Drop every instance older than `max_age`, regardless of status.
    pub fn prune(&mut self, max_age: usize) -> usize {
        let before = self.instances.len();
        self.instances.retain(|inst| inst.age <= max_age);
        before - self.instances.len()
    }

    /// True if an instance of `kind`/`direction` with the same levels exists.
    pub fn contains_level(
        &self,
        kind: PatternKind,
        direction: Direction,
        lower: f64,
        upper: f64,
    ) -> bool {
        const EPS: f64 = 1e-12;
        self.instances.iter().any(|i| {
            i.kind == kind
                && i.direction == direction
                && (i.lower - lower).abs() < EPS
                && (i.upper - upper).abs() < EPS
        })
    }

    pub fn get(&self, id: PatternId) -> Option<&PatternInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternInstance> + '_ {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PatternInstance> + '_ {
        self.instances.iter_mut()
    }

    /// Instances still eligible for signal generation.
    pub fn active(&self) -> impl Iterator<Item = &PatternInstance> + '_ {
        self.instances.iter().filter(|i| i.status.is_active())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
