//! Weapons and the interning weapon pool

use crate::model::rules::RuleId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_WEAPON_RULES: usize = 8;

/// Stable handle into a `WeaponPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeaponIndex(pub u32);

/// Immutable weapon profile. `range == 0` means melee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub attacks: u8,
    pub range: u8,
    pub ap: u8,
    /// Ordered `(rule, value)` pairs; valueless rules carry 0.
    pub rules: Vec<(RuleId, u8)>,
}

impl Weapon {
    pub fn new(name: impl Into<String>, attacks: u8, range: u8, ap: u8) -> Self {
        Self {
            name: name.into(),
            attacks,
            range,
            ap,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, id: RuleId, value: u8) -> Self {
        self.rules.push((id, value));
        self
    }

    pub fn is_melee(&self) -> bool {
        self.range == 0
    }

    pub fn rule_value(&self, id: RuleId) -> Option<u8> {
        self.rules.iter().find(|(r, _)| *r == id).map(|(_, v)| *v)
    }

    pub fn has_rule(&self, id: RuleId) -> bool {
        self.rule_value(id).is_some()
    }
}

/// Interning table mapping `WeaponIndex` to `Weapon`. Append-only after
/// catalog construction; shared read-only with every worker.
#[derive(Debug, Default)]
pub struct WeaponPool {
    weapons: Vec<Weapon>,
    interned: HashMap<Weapon, WeaponIndex>,
}

impl WeaponPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a weapon, returning the existing handle for an identical
    /// profile.
    pub fn add(&mut self, weapon: Weapon) -> WeaponIndex {
        if let Some(index) = self.interned.get(&weapon) {
            return *index;
        }
        let index = WeaponIndex(self.weapons.len() as u32);
        self.weapons.push(weapon.clone());
        self.interned.insert(weapon, index);
        index
    }

    pub fn get(&self, index: WeaponIndex) -> &Weapon {
        &self.weapons[index.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_weapons_intern_to_one_handle() {
        let mut pool = WeaponPool::new();
        let a = pool.add(Weapon::new("Rifle", 1, 24, 0));
        let b = pool.add(Weapon::new("Rifle", 1, 24, 0));
        let c = pool.add(Weapon::new("Rifle", 1, 24, 1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn rule_lookup_distinguishes_value_and_presence() {
        let weapon = Weapon::new("Launcher", 1, 48, 1).with_rule(RuleId::Blast, 3);
        assert_eq!(weapon.rule_value(RuleId::Blast), Some(3));
        assert!(!weapon.has_rule(RuleId::Deadly));
    }
}
