//! Combat resolution: one attack profile set against one target unit
//!
//! `resolve_attack` walks the seven fixed steps of the rules system: gather
//! profiles, scale attacks, hit roll, fold the wound step into hits, defense
//! roll, allocate wounds, total up. Profile gathering iterates models and
//! weapons in declaration order so the dice consumption order is fully
//! deterministic for a given stream.

use crate::model::{RuleId, RuleRegistry, Unit, WeaponIndex, WeaponPool};
use crate::rng::DiceStream;

/// Which half of the turn an attack happens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Shooting,
    Melee,
}

/// Field context for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct CombatContext {
    pub phase: Phase,
    /// Attacker charged into this melee round.
    pub charging: bool,
    /// Hit-roll modifier from terrain (cover, elevation); usually <= 0.
    pub field_modifier: i8,
    /// Distance to the defender; shooting profiles must reach it.
    pub distance: f32,
}

impl CombatContext {
    pub fn shooting() -> Self {
        Self {
            phase: Phase::Shooting,
            charging: false,
            field_modifier: 0,
            distance: 0.0,
        }
    }

    pub fn shooting_at(distance: f32) -> Self {
        Self {
            distance,
            ..Self::shooting()
        }
    }

    pub fn melee(charging: bool) -> Self {
        Self {
            phase: Phase::Melee,
            charging,
            field_modifier: 0,
            distance: 0.0,
        }
    }
}

/// Totals from one resolution. Ephemeral.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombatResult {
    pub total_hits: u32,
    pub total_wounds: u32,
    pub defender_models_killed: u32,
    pub sixes_rolled: u32,
}

/// Per-game wound pools for one unit, parallel to `unit.models`.
#[derive(Debug, Clone)]
pub struct RosterState {
    pub wounds: Vec<u8>,
}

impl RosterState {
    pub fn new(unit: &Unit) -> Self {
        Self {
            wounds: unit.models.iter().map(|m| m.tough).collect(),
        }
    }

    pub fn alive_count(&self) -> u32 {
        self.wounds.iter().filter(|w| **w > 0).count() as u32
    }

    pub fn is_alive(&self) -> bool {
        self.wounds.iter().any(|w| *w > 0)
    }

    pub fn total_wounds_remaining(&self) -> u32 {
        self.wounds.iter().map(|w| u32::from(*w)).sum()
    }

    pub fn strength_fraction(&self) -> f32 {
        if self.wounds.is_empty() {
            return 0.0;
        }
        self.alive_count() as f32 / self.wounds.len() as f32
    }

    /// Kill the `n` weakest living models outright (morale rout).
    pub fn rout_models(&mut self, n: u32) -> u32 {
        let mut removed = 0;
        for _ in 0..n {
            match self.weakest_living() {
                Some(index) => {
                    self.wounds[index] = 0;
                    removed += 1;
                }
                None => break,
            }
        }
        removed
    }

    fn weakest_living(&self) -> Option<usize> {
        self.wounds
            .iter()
            .enumerate()
            .filter(|(_, w)| **w > 0)
            .min_by_key(|(_, w)| **w)
            .map(|(index, _)| index)
    }
}

struct AttackProfile {
    weapon: WeaponIndex,
    attacks: u32,
    quality: u8,
}

pub struct CombatResolver<'a> {
    pool: &'a WeaponPool,
    registry: &'a RuleRegistry,
}

impl<'a> CombatResolver<'a> {
    pub fn new(pool: &'a WeaponPool, registry: &'a RuleRegistry) -> Self {
        Self { pool, registry }
    }

    /// Resolve every eligible attack profile of `attacker` against
    /// `defender`, mutating the defender's wound pools.
    pub fn resolve_attack(
        &self,
        attacker: &Unit,
        attacker_state: &RosterState,
        defender: &Unit,
        defender_state: &mut RosterState,
        ctx: CombatContext,
        dice: &mut DiceStream,
    ) -> CombatResult {
        let mut result = CombatResult::default();
        if !defender_state.is_alive() {
            return result;
        }

        let profiles = self.gather_profiles(attacker, attacker_state, ctx);

        // Impact hits are unit-level, resolved before weapon profiles.
        if ctx.charging && ctx.phase == Phase::Melee {
            if let Some(impact) = attacker.rule_value(RuleId::Impact) {
                if impact > 0 {
                    result.total_hits += u32::from(impact);
                    let failed = dice.roll_defense_test(
                        u32::from(impact),
                        defender_save_target(defender),
                        0,
                        defender.has_rule(RuleId::Regeneration),
                        false,
                    );
                    let (wounds, kills) =
                        allocate_wounds(defender, defender_state, failed, 1, false, false);
                    result.total_wounds += wounds;
                    result.defender_models_killed += kills;
                }
            }
        }

        for profile in profiles {
            if !defender_state.is_alive() {
                break;
            }
            let outcome = self.resolve_profile(
                &profile,
                attacker,
                defender,
                defender_state,
                ctx,
                dice,
            );
            result.total_hits += outcome.total_hits;
            result.total_wounds += outcome.total_wounds;
            result.defender_models_killed += outcome.defender_models_killed;
            result.sixes_rolled += outcome.sixes_rolled;
        }

        result
    }

    fn resolve_profile(
        &self,
        profile: &AttackProfile,
        attacker: &Unit,
        defender: &Unit,
        defender_state: &mut RosterState,
        ctx: CombatContext,
        dice: &mut DiceStream,
    ) -> CombatResult {
        let mut result = CombatResult::default();
        let weapon = self.pool.get(profile.weapon);

        // Hit roll with field modifiers; Lock-On class weapons shrug cover.
        let ignores_cover = weapon
            .rules
            .iter()
            .any(|(id, _)| self.registry.descriptor(*id).effect.ignores_cover);
        let modifier = if ignores_cover {
            ctx.field_modifier.max(0)
        } else {
            ctx.field_modifier
        };

        let reroll_ones = weapon.has_rule(RuleId::Reliable) || attacker.has_rule(RuleId::Devout);
        let (mut hits, sixes) = if reroll_ones {
            dice.roll_quality_test_rerolling_ones(profile.attacks, profile.quality, modifier)
        } else {
            dice.roll_quality_test(profile.attacks, profile.quality, modifier)
        };
        result.sixes_rolled = sixes;

        // Blast multiplies hits, never attacks, and only against squads of
        // at least the blast value. Melee blast is rejected at ingestion.
        if ctx.phase == Phase::Shooting {
            if let Some(blast) = weapon.rule_value(RuleId::Blast) {
                if blast > 0 && defender_state.alive_count() >= u32::from(blast) {
                    hits *= u32::from(blast);
                }
            }
        }
        result.total_hits = hits;
        if hits == 0 {
            return result;
        }

        // Every hit is a wound attempt; split the save pool by six-procs.
        let lethal = weapon.has_rule(RuleId::Lethal);
        let rending_ap = weapon
            .rules
            .iter()
            .map(|(id, _)| self.registry.descriptor(*id).effect.ap_on_six)
            .max()
            .unwrap_or(0);
        let proc_sixes = if lethal || rending_ap > 0 {
            sixes.min(hits)
        } else {
            0
        };
        let normal_hits = hits - proc_sixes;

        let defense = defender_save_target(defender);
        let poisoned = weapon.has_rule(RuleId::Poison);
        let regen = defender.has_rule(RuleId::Regeneration);

        let mut failed = dice.roll_defense_test(normal_hits, defense, weapon.ap, regen, poisoned);
        if lethal {
            failed += proc_sixes;
        } else if proc_sixes > 0 {
            failed += dice.roll_defense_test(
                proc_sixes,
                defense,
                weapon.ap.saturating_add(rending_ap),
                regen,
                poisoned,
            );
        }

        let deadly = weapon.rule_value(RuleId::Deadly).unwrap_or(1).max(1);
        let sniper = weapon.has_rule(RuleId::Sniper);
        let tear = weapon.has_rule(RuleId::Tear);
        let (wounds, kills) =
            allocate_wounds(defender, defender_state, failed, deadly, tear, sniper);
        result.total_wounds = wounds;
        result.defender_models_killed = kills;
        result
    }

    /// Step 1: one profile per distinct weapon carried by living models,
    /// in declaration order, with attacks summed across carriers.
    fn gather_profiles(
        &self,
        attacker: &Unit,
        attacker_state: &RosterState,
        ctx: CombatContext,
    ) -> Vec<AttackProfile> {
        let mut profiles: Vec<AttackProfile> = Vec::new();
        let furious = ctx.charging
            && ctx.phase == Phase::Melee
            && attacker.has_rule(RuleId::Furious);

        for (index, model) in attacker.models.iter().enumerate() {
            if attacker_state.wounds[index] == 0 {
                continue;
            }
            let mut first_melee = true;
            for weapon_index in &model.weapons {
                let weapon = self.pool.get(*weapon_index);
                let wanted = match ctx.phase {
                    Phase::Shooting => !weapon.is_melee() && f32::from(weapon.range) >= ctx.distance,
                    Phase::Melee => weapon.is_melee(),
                };
                if !wanted || weapon.attacks == 0 {
                    continue;
                }
                let mut attacks = u32::from(weapon.attacks);
                if furious && weapon.is_melee() && first_melee {
                    attacks += 1;
                    first_melee = false;
                }
                match profiles.iter_mut().find(|p| p.weapon == *weapon_index) {
                    Some(profile) => profile.attacks += attacks,
                    None => profiles.push(AttackProfile {
                        weapon: *weapon_index,
                        attacks,
                        quality: model.quality,
                    }),
                }
            }
        }
        profiles
    }
}

fn defender_save_target(defender: &Unit) -> u8 {
    defender
        .models
        .iter()
        .map(|m| m.defense)
        .min()
        .unwrap_or(6)
}

/// Step 6: apply `failed` save failures as `wound_packet`-sized packets in
/// deterministic order. Without `carry_over` (Tear), excess damage on a
/// kill is lost. Sniper packets go to the toughest living model; everything
/// else lands on the model with the least wounds remaining.
fn allocate_wounds(
    defender: &Unit,
    state: &mut RosterState,
    failed: u32,
    wound_packet: u8,
    carry_over: bool,
    sniper: bool,
) -> (u32, u32) {
    let mut dealt = 0u32;
    let mut kills = 0u32;

    for _ in 0..failed {
        let mut packet = u32::from(wound_packet);
        while packet > 0 {
            let target = if sniper {
                toughest_living(defender, state)
            } else {
                least_wounded_living(state)
            };
            let Some(index) = target else {
                return (dealt, kills);
            };
            let remaining = u32::from(state.wounds[index]);
            let applied = packet.min(remaining);
            state.wounds[index] = (remaining - applied) as u8;
            dealt += applied;
            if state.wounds[index] == 0 {
                kills += 1;
            }
            if !carry_over {
                break;
            }
            packet -= applied;
        }
    }

    (dealt, kills)
}

fn least_wounded_living(state: &RosterState) -> Option<usize> {
    state
        .wounds
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .min_by_key(|(_, w)| **w)
        .map(|(index, _)| index)
}

fn toughest_living(defender: &Unit, state: &RosterState) -> Option<usize> {
    state
        .wounds
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .max_by_key(|(index, _)| defender.models[*index].tough)
        .map(|(index, _)| index)
}
