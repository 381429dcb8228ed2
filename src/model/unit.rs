//! Models, units, and the parsed catalog

use crate::model::rules::RuleId;
use crate::model::weapon::{WeaponIndex, WeaponPool};
use serde::{Deserialize, Serialize};

pub const MAX_MODELS_PER_UNIT: usize = 32;
pub const MAX_UNIT_RULES: usize = 16;
pub const MAX_MODEL_WEAPONS: usize = 8;

/// Tactical posture inferred from a unit's weapon mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiType {
    Melee,
    Shooting,
    Hybrid,
}

/// One figure inside a unit. The per-game wound pool lives in the game
/// state; `tough` is the pool size a fresh model starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    /// Quality: a d6 must reach this to succeed. Lower is better.
    pub quality: u8,
    /// Defense: a d6 must reach this to save. Lower is better.
    pub defense: u8,
    /// Wounds before the model dies.
    pub tough: u8,
    pub weapons: Vec<WeaponIndex>,
}

impl Model {
    pub fn new(name: impl Into<String>, quality: u8, defense: u8, tough: u8) -> Self {
        Self {
            name: name.into(),
            quality,
            defense,
            tough: tough.max(1),
            weapons: Vec::new(),
        }
    }

    pub fn add_weapon(&mut self, index: WeaponIndex) {
        if self.weapons.len() < MAX_MODEL_WEAPONS {
            self.weapons.push(index);
        }
    }
}

/// An ordered collection of up to 32 models plus unit-level rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub faction: String,
    pub points_cost: u32,
    pub models: Vec<Model>,
    /// Unit-level `(rule, value)` pairs.
    pub rules: Vec<(RuleId, u8)>,
    pub ai_type: AiType,
    /// Cached totals across all models, filled by `cache_attack_totals`.
    pub melee_attacks: u32,
    pub ranged_attacks: u32,
}

impl Unit {
    pub fn new(name: impl Into<String>, points_cost: u32) -> Self {
        Self {
            name: name.into(),
            faction: String::new(),
            points_cost,
            models: Vec::new(),
            rules: Vec::new(),
            ai_type: AiType::Hybrid,
            melee_attacks: 0,
            ranged_attacks: 0,
        }
    }

    pub fn add_model(&mut self, model: Model) {
        if self.models.len() < MAX_MODELS_PER_UNIT {
            self.models.push(model);
        }
    }

    pub fn add_rule(&mut self, id: RuleId, value: u8) {
        if self.rules.len() < MAX_UNIT_RULES {
            self.rules.push((id, value));
        }
    }

    pub fn rule_value(&self, id: RuleId) -> Option<u8> {
        self.rules.iter().find(|(r, _)| *r == id).map(|(_, v)| *v)
    }

    pub fn has_rule(&self, id: RuleId) -> bool {
        self.rule_value(id).is_some()
    }

    /// Total wounds a fresh copy of this unit brings to the table.
    pub fn initial_wounds(&self) -> u32 {
        self.models.iter().map(|m| u32::from(m.tough)).sum()
    }

    /// Best (lowest) quality among all models; morale rolls against this.
    pub fn best_quality(&self) -> u8 {
        self.models.iter().map(|m| m.quality).min().unwrap_or(6)
    }

    /// Longest weapon range across all models, in inches.
    pub fn max_weapon_range(&self, pool: &WeaponPool) -> u8 {
        self.models
            .iter()
            .flat_map(|m| m.weapons.iter())
            .map(|w| pool.get(*w).range)
            .max()
            .unwrap_or(0)
    }

    /// Fill the cached melee/ranged attack totals from the weapon pool.
    pub fn cache_attack_totals(&mut self, pool: &WeaponPool) {
        let mut melee = 0u32;
        let mut ranged = 0u32;
        for model in &self.models {
            for index in &model.weapons {
                let weapon = pool.get(*index);
                if weapon.is_melee() {
                    melee += u32::from(weapon.attacks);
                } else {
                    ranged += u32::from(weapon.attacks);
                }
            }
        }
        self.melee_attacks = melee;
        self.ranged_attacks = ranged;
    }
}

/// The parsed catalog: units plus the weapon pool their handles point into.
#[derive(Debug, Default)]
pub struct UnitCatalog {
    pub units: Vec<Unit>,
    pub weapons: WeaponPool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::weapon::Weapon;

    #[test]
    fn attack_totals_split_by_weapon_range() {
        let mut pool = WeaponPool::new();
        let sword = pool.add(Weapon::new("Sword", 2, 0, 0));
        let rifle = pool.add(Weapon::new("Rifle", 1, 24, 0));

        let mut unit = Unit::new("Squad", 100);
        for _ in 0..3 {
            let mut model = Model::new("Trooper", 4, 4, 1);
            model.add_weapon(sword);
            model.add_weapon(rifle);
            unit.add_model(model);
        }
        unit.cache_attack_totals(&pool);

        assert_eq!(unit.melee_attacks, 6);
        assert_eq!(unit.ranged_attacks, 3);
        assert_eq!(unit.max_weapon_range(&pool), 24);
    }

    #[test]
    fn tough_floors_at_one() {
        let model = Model::new("Grot", 5, 6, 0);
        assert_eq!(model.tough, 1);
    }
}
