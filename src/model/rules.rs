//! Special-rule vocabulary and the faction rule registry
//!
//! The rule set is a closed enumeration; combat dispatches on the enum tag
//! directly, and the registry carries the per-rule metadata (where a rule
//! may legally appear, and the descriptor the resolver consults). Rules the
//! engine does not act on are still valid catalog vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed set of special-rule tags understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    Ambush,
    Ap,
    Banner,
    Blast,
    Caster,
    Counter,
    Deadly,
    Devout,
    Entrenched,
    Fast,
    Fear,
    Fearless,
    Flying,
    Furious,
    Hero,
    Immobile,
    Impact,
    Indirect,
    Lethal,
    Limited,
    LockOn,
    Musician,
    Piercing,
    Poison,
    Regeneration,
    Relentless,
    Reliable,
    Rending,
    Scout,
    Shielded,
    Slayer,
    Slow,
    Sniper,
    Stealth,
    Strider,
    Tear,
    Tough,
    Transport,
    Veteran,
    WarChant,
}

impl RuleId {
    /// Parse a catalog rule name. Names follow the printed army-book forms
    /// ("Lock-On", "War Chant").
    pub fn from_name(name: &str) -> Option<RuleId> {
        let id = match name {
            "Ambush" => RuleId::Ambush,
            "AP" => RuleId::Ap,
            "Banner" => RuleId::Banner,
            "Blast" => RuleId::Blast,
            "Caster" => RuleId::Caster,
            "Counter" => RuleId::Counter,
            "Deadly" => RuleId::Deadly,
            "Devout" => RuleId::Devout,
            "Entrenched" => RuleId::Entrenched,
            "Fast" => RuleId::Fast,
            "Fear" => RuleId::Fear,
            "Fearless" => RuleId::Fearless,
            "Flying" => RuleId::Flying,
            "Furious" => RuleId::Furious,
            "Hero" => RuleId::Hero,
            "Immobile" => RuleId::Immobile,
            "Impact" => RuleId::Impact,
            "Indirect" => RuleId::Indirect,
            "Lethal" => RuleId::Lethal,
            "Limited" => RuleId::Limited,
            "Lock-On" => RuleId::LockOn,
            "Musician" => RuleId::Musician,
            "Piercing" | "Piercing Assault" => RuleId::Piercing,
            "Poison" => RuleId::Poison,
            "Regeneration" => RuleId::Regeneration,
            "Relentless" => RuleId::Relentless,
            "Reliable" => RuleId::Reliable,
            "Rending" => RuleId::Rending,
            "Scout" => RuleId::Scout,
            "Shielded" => RuleId::Shielded,
            "Slayer" => RuleId::Slayer,
            "Slow" => RuleId::Slow,
            "Sniper" => RuleId::Sniper,
            "Stealth" => RuleId::Stealth,
            "Strider" => RuleId::Strider,
            "Tear" => RuleId::Tear,
            "Tough" => RuleId::Tough,
            "Transport" => RuleId::Transport,
            "Veteran" => RuleId::Veteran,
            "War Chant" => RuleId::WarChant,
            _ => return None,
        };
        Some(id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RuleId::Ambush => "Ambush",
            RuleId::Ap => "AP",
            RuleId::Banner => "Banner",
            RuleId::Blast => "Blast",
            RuleId::Caster => "Caster",
            RuleId::Counter => "Counter",
            RuleId::Deadly => "Deadly",
            RuleId::Devout => "Devout",
            RuleId::Entrenched => "Entrenched",
            RuleId::Fast => "Fast",
            RuleId::Fear => "Fear",
            RuleId::Fearless => "Fearless",
            RuleId::Flying => "Flying",
            RuleId::Furious => "Furious",
            RuleId::Hero => "Hero",
            RuleId::Immobile => "Immobile",
            RuleId::Impact => "Impact",
            RuleId::Indirect => "Indirect",
            RuleId::Lethal => "Lethal",
            RuleId::Limited => "Limited",
            RuleId::LockOn => "Lock-On",
            RuleId::Musician => "Musician",
            RuleId::Piercing => "Piercing",
            RuleId::Poison => "Poison",
            RuleId::Regeneration => "Regeneration",
            RuleId::Relentless => "Relentless",
            RuleId::Reliable => "Reliable",
            RuleId::Rending => "Rending",
            RuleId::Scout => "Scout",
            RuleId::Shielded => "Shielded",
            RuleId::Slayer => "Slayer",
            RuleId::Slow => "Slow",
            RuleId::Sniper => "Sniper",
            RuleId::Stealth => "Stealth",
            RuleId::Strider => "Strider",
            RuleId::Tear => "Tear",
            RuleId::Tough => "Tough",
            RuleId::Transport => "Transport",
            RuleId::Veteran => "Veteran",
            RuleId::WarChant => "War Chant",
        }
    }
}

/// Where a rule may legally appear in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    Weapon,
    Unit,
    Both,
}

/// Combat-relevant channels of one rule. A rule the resolver does not act
/// on keeps the zero descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombatEffect {
    /// Re-roll natural 1s on the hit roll (Reliable, Devout).
    pub reroll_hit_ones: bool,
    /// Extra AP applied to hits from natural sixes (Rending).
    pub ap_on_six: u8,
    /// Natural sixes bypass the save entirely (Lethal).
    pub unsavable_on_six: bool,
    /// Hits are multiplied against squads of at least the rule value (Blast).
    pub multiplies_hits: bool,
    /// Each failed save inflicts the rule value in wounds (Deadly).
    pub wounds_per_fail: bool,
    /// Excess wounds from a kill spill onto the next model (Tear).
    pub carries_over: bool,
    /// Defender re-rolls successful saves (Poison).
    pub rerolls_saves: bool,
    /// Defender re-rolls failed saves (Regeneration).
    pub rerolls_failed_saves: bool,
    /// Attacker allocates wounds to a model of its choice (Sniper).
    pub picks_target_model: bool,
    /// Cover modifiers are ignored (Lock-On, Indirect).
    pub ignores_cover: bool,
    /// +1 melee attack per model when charging (Furious).
    pub charge_bonus_attack: bool,
    /// Automatic hits equal to the rule value when charging (Impact).
    pub charge_auto_hits: bool,
    /// Failed morale tests recover on a 4+ (Fearless).
    pub morale_recovery: bool,
    /// Enemies in melee take the rule value as a morale penalty (Fear).
    pub enemy_morale_penalty: bool,
    /// Movement adjustment in inches (Fast +2, Slow -2).
    pub move_bonus: i8,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleDescriptor {
    pub applies_to: RuleTarget,
    pub effect: CombatEffect,
}

const ZERO_DESCRIPTOR: RuleDescriptor = RuleDescriptor {
    applies_to: RuleTarget::Both,
    effect: CombatEffect {
        reroll_hit_ones: false,
        ap_on_six: 0,
        unsavable_on_six: false,
        multiplies_hits: false,
        wounds_per_fail: false,
        carries_over: false,
        rerolls_saves: false,
        rerolls_failed_saves: false,
        picks_target_model: false,
        ignores_cover: false,
        charge_bonus_attack: false,
        charge_auto_hits: false,
        morale_recovery: false,
        enemy_morale_penalty: false,
        move_bonus: 0,
    },
};

/// Immutable rule-id -> descriptor table, built once before any worker
/// starts and shared read-only afterwards.
#[derive(Debug)]
pub struct RuleRegistry {
    descriptors: HashMap<RuleId, RuleDescriptor>,
}

impl RuleRegistry {
    /// Build the faction rule table.
    pub fn initialize_faction_rules() -> Self {
        let mut descriptors = HashMap::new();
        let mut insert = |id: RuleId, applies_to: RuleTarget, effect: CombatEffect| {
            descriptors.insert(id, RuleDescriptor { applies_to, effect });
        };

        insert(
            RuleId::Blast,
            RuleTarget::Weapon,
            CombatEffect {
                multiplies_hits: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Rending,
            RuleTarget::Weapon,
            CombatEffect {
                ap_on_six: 4,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Lethal,
            RuleTarget::Weapon,
            CombatEffect {
                unsavable_on_six: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Reliable,
            RuleTarget::Weapon,
            CombatEffect {
                reroll_hit_ones: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Devout,
            RuleTarget::Unit,
            CombatEffect {
                reroll_hit_ones: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Deadly,
            RuleTarget::Weapon,
            CombatEffect {
                wounds_per_fail: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Tear,
            RuleTarget::Weapon,
            CombatEffect {
                carries_over: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Poison,
            RuleTarget::Weapon,
            CombatEffect {
                rerolls_saves: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Regeneration,
            RuleTarget::Unit,
            CombatEffect {
                rerolls_failed_saves: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Sniper,
            RuleTarget::Weapon,
            CombatEffect {
                picks_target_model: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::LockOn,
            RuleTarget::Weapon,
            CombatEffect {
                ignores_cover: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Indirect,
            RuleTarget::Weapon,
            CombatEffect {
                ignores_cover: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Furious,
            RuleTarget::Unit,
            CombatEffect {
                charge_bonus_attack: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Impact,
            RuleTarget::Unit,
            CombatEffect {
                charge_auto_hits: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Fearless,
            RuleTarget::Unit,
            CombatEffect {
                morale_recovery: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Fear,
            RuleTarget::Unit,
            CombatEffect {
                enemy_morale_penalty: true,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Fast,
            RuleTarget::Unit,
            CombatEffect {
                move_bonus: 2,
                ..CombatEffect::default()
            },
        );
        insert(
            RuleId::Slow,
            RuleTarget::Unit,
            CombatEffect {
                move_bonus: -2,
                ..CombatEffect::default()
            },
        );
        insert(RuleId::Tough, RuleTarget::Both, CombatEffect::default());
        insert(RuleId::Ap, RuleTarget::Weapon, CombatEffect::default());

        Self { descriptors }
    }

    /// Descriptor for a rule; absent rules yield the zero descriptor.
    pub fn descriptor(&self, id: RuleId) -> RuleDescriptor {
        self.descriptors.get(&id).copied().unwrap_or(ZERO_DESCRIPTOR)
    }

    /// Whether the rule may appear on a weapon line.
    pub fn valid_on_weapon(&self, id: RuleId) -> bool {
        !matches!(self.descriptor(id).applies_to, RuleTarget::Unit)
    }
}
