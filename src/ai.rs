//! Tactical AI: unit classification and per-round movement decisions
//!
//! Stateless by design. Classification looks only at the cached attack
//! totals; the per-round decision is a pure function of the unit and a
//! small snapshot of the game state, so identical snapshots always produce
//! identical orders.

use crate::model::{AiType, Unit};

/// Movement order for one unit in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOrder {
    /// Hold position; fire in the shooting phase if anything is in range.
    Stand,
    /// Full-speed move toward the enemy; no shooting this round.
    Advance,
    /// Charge into melee; strikes first this round.
    Charge,
    /// Move toward the central objective instead of engaging.
    SeizeObjective,
}

/// Game-state snapshot the AI decides from.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    /// Distance to the enemy unit in inches.
    pub distance: f32,
    /// Longest weapon range of the deciding unit.
    pub max_weapon_range: f32,
    /// Charge reach after movement-rule adjustments.
    pub charge_range: f32,
    pub round: u8,
    pub max_rounds: u8,
    /// Living models / starting models.
    pub strength_fraction: f32,
    /// Whether the unit already controls the central objective.
    pub on_objective: bool,
}

/// Classify a unit from its weapon mix: 1.5x dominance either way, Hybrid
/// otherwise.
pub fn classify(unit: &Unit) -> AiType {
    let melee = unit.melee_attacks as f32;
    let ranged = unit.ranged_attacks as f32;
    if melee > ranged * 1.5 {
        AiType::Melee
    } else if ranged > melee * 1.5 {
        AiType::Shooting
    } else {
        AiType::Hybrid
    }
}

/// Choose a movement order. The objective policy overrides engagement once
/// the unit is healthy enough and the game is half over; ties between two
/// units contesting the objective resolve to the lower unit index, which
/// the game runner enforces by evaluating side A first.
pub fn decide(unit: &Unit, ctx: &DecisionContext) -> MoveOrder {
    if prefers_objective(ctx) {
        if ctx.on_objective {
            return MoveOrder::Stand;
        }
        return MoveOrder::SeizeObjective;
    }

    match unit.ai_type {
        AiType::Melee => {
            if ctx.distance > ctx.charge_range {
                MoveOrder::Advance
            } else {
                MoveOrder::Charge
            }
        }
        AiType::Shooting => {
            if ctx.distance <= ctx.max_weapon_range {
                MoveOrder::Stand
            } else {
                MoveOrder::Advance
            }
        }
        AiType::Hybrid => {
            if ctx.distance <= ctx.charge_range {
                MoveOrder::Charge
            } else if ctx.distance <= ctx.max_weapon_range {
                MoveOrder::Stand
            } else {
                MoveOrder::Advance
            }
        }
    }
}

fn prefers_objective(ctx: &DecisionContext) -> bool {
    ctx.strength_fraction >= 0.5 && ctx.round >= ctx.max_rounds / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, Unit, Weapon, WeaponPool};

    fn unit_with(melee_attacks: u8, ranged_attacks: u8) -> Unit {
        let mut pool = WeaponPool::new();
        let mut unit = Unit::new("Test", 100);
        let mut model = Model::new("Test", 4, 4, 1);
        if melee_attacks > 0 {
            model.add_weapon(pool.add(Weapon::new("Claw", melee_attacks, 0, 0)));
        }
        if ranged_attacks > 0 {
            model.add_weapon(pool.add(Weapon::new("Gun", ranged_attacks, 24, 0)));
        }
        unit.add_model(model);
        unit.cache_attack_totals(&pool);
        unit.ai_type = classify(&unit);
        unit
    }

    fn ctx(distance: f32) -> DecisionContext {
        DecisionContext {
            distance,
            max_weapon_range: 24.0,
            charge_range: 12.0,
            round: 1,
            max_rounds: 4,
            strength_fraction: 1.0,
            on_objective: false,
        }
    }

    #[test]
    fn classification_uses_ratio_threshold() {
        assert_eq!(unit_with(4, 2).ai_type, AiType::Melee);
        assert_eq!(unit_with(2, 4).ai_type, AiType::Shooting);
        assert_eq!(unit_with(3, 3).ai_type, AiType::Hybrid);
    }

    #[test]
    fn melee_unit_advances_until_charge_range() {
        let unit = unit_with(4, 0);
        assert_eq!(decide(&unit, &ctx(20.0)), MoveOrder::Advance);
        assert_eq!(decide(&unit, &ctx(10.0)), MoveOrder::Charge);
    }

    #[test]
    fn shooting_unit_stands_inside_range() {
        let unit = unit_with(0, 4);
        assert_eq!(decide(&unit, &ctx(20.0)), MoveOrder::Stand);
        assert_eq!(decide(&unit, &ctx(30.0)), MoveOrder::Advance);
    }

    #[test]
    fn late_rounds_pull_healthy_units_to_the_objective() {
        let unit = unit_with(4, 0);
        let mut late = ctx(10.0);
        late.round = 3;
        assert_eq!(decide(&unit, &late), MoveOrder::SeizeObjective);
        late.on_objective = true;
        assert_eq!(decide(&unit, &late), MoveOrder::Stand);
    }

    #[test]
    fn broken_units_keep_fighting_instead_of_capping() {
        let unit = unit_with(4, 0);
        let mut late = ctx(10.0);
        late.round = 3;
        late.strength_fraction = 0.4;
        assert_eq!(decide(&unit, &late), MoveOrder::Charge);
    }
}
