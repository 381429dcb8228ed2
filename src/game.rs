//! Full game simulation between two units
//!
//! A match is `games_per_match` games; each game walks the fixed phase
//! sequence (Deployment, then rounds of Movement, Shooting, Melee, Morale,
//! Objective) on a one-dimensional battlefield with the objective at the
//! midpoint. The simulation is total: every input pair produces a defined
//! result, and all accumulators are wide enough that a single game cannot
//! overflow them.

use crate::ai::{self, DecisionContext, MoveOrder};
use crate::combat::{CombatContext, CombatResolver, RosterState};
use crate::config::SimulationConfig;
use crate::model::{RuleId, RuleRegistry, Unit, WeaponPool};
use crate::rng::DiceStream;

/// Melee lock distance in inches.
const MELEE_RANGE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameWinner {
    UnitA,
    UnitB,
    Draw,
}

/// Totals for one game.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameOutcome {
    pub winner: Option<GameWinner>,
    pub rounds: u8,
    pub wounds_dealt_a: u32,
    pub wounds_dealt_b: u32,
    pub models_killed_a: u32,
    pub models_killed_b: u32,
    pub rounds_holding_a: u8,
    pub rounds_holding_b: u8,
    pub a_wiped: bool,
    pub b_wiped: bool,
}

/// Accumulated totals for one match.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchResult {
    pub games_won_a: u16,
    pub games_won_b: u16,
    pub draws: u16,
    pub total_wounds_dealt_a: u32,
    pub total_wounds_dealt_b: u32,
    pub total_models_killed_a: u32,
    pub total_models_killed_b: u32,
    pub total_rounds_holding_a: u16,
    pub total_rounds_holding_b: u16,
    pub total_rounds: u16,
    pub a_wiped: bool,
    pub b_wiped: bool,
}

impl MatchResult {
    pub fn overall_winner(&self) -> GameWinner {
        if self.games_won_a > self.games_won_b {
            GameWinner::UnitA
        } else if self.games_won_b > self.games_won_a {
            GameWinner::UnitB
        } else {
            GameWinner::Draw
        }
    }
}

/// Per-side bookkeeping inside one game.
struct Side<'a> {
    unit: &'a Unit,
    state: RosterState,
    position: f32,
    order: MoveOrder,
    charged: bool,
    morale_failures: u8,
}

impl<'a> Side<'a> {
    fn new(unit: &'a Unit, position: f32) -> Self {
        Self {
            unit,
            state: RosterState::new(unit),
            position,
            order: MoveOrder::Stand,
            charged: false,
            morale_failures: 0,
        }
    }

    fn move_adjust(&self) -> f32 {
        self.unit
            .rules
            .iter()
            .filter_map(|(id, _)| match id {
                RuleId::Fast => Some(2.0),
                RuleId::Slow => Some(-2.0),
                _ => None,
            })
            .sum()
    }
}

pub struct GameRunner<'a> {
    pool: &'a WeaponPool,
    registry: &'a RuleRegistry,
    config: &'a SimulationConfig,
    resolver: CombatResolver<'a>,
}

impl<'a> GameRunner<'a> {
    pub fn new(
        pool: &'a WeaponPool,
        registry: &'a RuleRegistry,
        config: &'a SimulationConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            config,
            resolver: CombatResolver::new(pool, registry),
        }
    }

    /// Run a full match and accumulate its games.
    pub fn run_match(&self, a: &Unit, b: &Unit, dice: &mut DiceStream) -> MatchResult {
        let mut result = MatchResult::default();
        for _ in 0..self.config.games_per_match {
            let game = self.run_game(a, b, dice);
            match game.winner {
                Some(GameWinner::UnitA) => result.games_won_a += 1,
                Some(GameWinner::UnitB) => result.games_won_b += 1,
                _ => result.draws += 1,
            }
            result.total_wounds_dealt_a += game.wounds_dealt_a;
            result.total_wounds_dealt_b += game.wounds_dealt_b;
            result.total_models_killed_a += game.models_killed_a;
            result.total_models_killed_b += game.models_killed_b;
            result.total_rounds_holding_a += u16::from(game.rounds_holding_a);
            result.total_rounds_holding_b += u16::from(game.rounds_holding_b);
            result.total_rounds += u16::from(game.rounds);
            result.a_wiped |= game.a_wiped;
            result.b_wiped |= game.b_wiped;
        }
        result
    }

    /// One game from deployment to the end-of-game state.
    pub fn run_game(&self, unit_a: &Unit, unit_b: &Unit, dice: &mut DiceStream) -> GameOutcome {
        let objective = self.config.deployment_distance / 2.0;
        let mut a = Side::new(unit_a, 0.0);
        let mut b = Side::new(unit_b, self.config.deployment_distance);
        let mut outcome = GameOutcome::default();

        // Activation and shooting order are each randomized once per game;
        // every other tie resolves to the prioritized side.
        let a_acts_first = dice.roll_d6() <= 3;
        let a_shoots_first = dice.roll_d6() <= 3;

        for round in 1..=self.config.max_rounds {
            outcome.rounds = round;
            let strength_a_at_start = a.state.alive_count();
            let strength_b_at_start = b.state.alive_count();

            self.movement_phase(&mut a, &mut b, a_acts_first, round, objective);
            log::trace!(
                "round {}: {} at {:.1}, {} at {:.1}",
                round,
                a.unit.name,
                a.position,
                b.unit.name,
                b.position
            );

            if a_shoots_first {
                self.shooting_phase(&mut a, &mut b, &mut outcome, true, dice);
                self.shooting_phase(&mut b, &mut a, &mut outcome, false, dice);
            } else {
                self.shooting_phase(&mut b, &mut a, &mut outcome, false, dice);
                self.shooting_phase(&mut a, &mut b, &mut outcome, true, dice);
            }

            self.melee_phase(&mut a, &mut b, a_acts_first, &mut outcome, dice);

            self.morale_phase(&mut a, &b, strength_a_at_start, dice);
            self.morale_phase(&mut b, &a, strength_b_at_start, dice);

            self.objective_phase(&a, &b, objective, &mut outcome);

            a.charged = false;
            b.charged = false;

            if !a.state.is_alive() || !b.state.is_alive() {
                break;
            }
        }

        outcome.a_wiped = !a.state.is_alive();
        outcome.b_wiped = !b.state.is_alive();
        outcome.winner = Some(self.decide_winner(&a, &b, &outcome));
        outcome
    }

    /// Phase 1: both sides issue and execute movement orders in priority
    /// order.
    fn movement_phase<'b>(
        &self,
        a: &mut Side<'b>,
        b: &mut Side<'b>,
        a_acts_first: bool,
        round: u8,
        objective: f32,
    ) {
        for a_moves in if a_acts_first { [true, false] } else { [false, true] } {
            let (side, other_pos) = if a_moves {
                let pos = b.position;
                (&mut *a, pos)
            } else {
                let pos = a.position;
                (&mut *b, pos)
            };

            let distance = (other_pos - side.position).abs();
            if distance <= MELEE_RANGE {
                // Locked in melee; no movement.
                side.order = MoveOrder::Charge;
                continue;
            }

            let adjust = side.move_adjust();
            let ctx = DecisionContext {
                distance,
                max_weapon_range: f32::from(side.unit.max_weapon_range(self.pool)),
                charge_range: self.config.charge_distance + adjust * 2.0,
                round,
                max_rounds: self.config.max_rounds,
                strength_fraction: side.state.strength_fraction(),
                on_objective: (side.position - objective).abs()
                    <= self.config.objective_control_distance,
            };
            side.order = ai::decide(side.unit, &ctx);

            match side.order {
                MoveOrder::Stand => {}
                MoveOrder::Advance => {
                    let step = (self.config.advance_distance + adjust * 2.0).max(0.0);
                    side.position = move_toward(side.position, other_pos, step);
                }
                MoveOrder::Charge => {
                    side.position = other_pos;
                    side.charged = true;
                }
                MoveOrder::SeizeObjective => {
                    let step = (self.config.move_distance + adjust).max(0.0);
                    side.position = move_toward(side.position, objective, step);
                }
            }
        }
    }

    /// Phase 2: each side that stood still fires at the enemy.
    fn shooting_phase(
        &self,
        shooter: &mut Side,
        target: &mut Side,
        outcome: &mut GameOutcome,
        shooter_is_a: bool,
        dice: &mut DiceStream,
    ) {
        if shooter.order != MoveOrder::Stand || !shooter.state.is_alive() {
            return;
        }
        let distance = (shooter.position - target.position).abs();
        if distance <= MELEE_RANGE {
            return;
        }
        let result = self.resolver.resolve_attack(
            shooter.unit,
            &shooter.state,
            target.unit,
            &mut target.state,
            CombatContext::shooting_at(distance),
            dice,
        );
        credit(outcome, shooter_is_a, result.total_wounds, result.defender_models_killed);
    }

    /// Phase 3: melee, charger first, survivors strike back.
    fn melee_phase<'b>(
        &self,
        a: &mut Side<'b>,
        b: &mut Side<'b>,
        a_acts_first: bool,
        outcome: &mut GameOutcome,
        dice: &mut DiceStream,
    ) {
        let distance = (a.position - b.position).abs();
        if distance > MELEE_RANGE {
            return;
        }

        let a_first = if a.charged == b.charged {
            a_acts_first
        } else {
            a.charged
        };
        for a_strikes in if a_first { [true, false] } else { [false, true] } {
            let (attacker, defender) = if a_strikes {
                (&mut *a, &mut *b)
            } else {
                (&mut *b, &mut *a)
            };
            if !attacker.state.is_alive() || !defender.state.is_alive() {
                continue;
            }
            let result = self.resolver.resolve_attack(
                attacker.unit,
                &attacker.state,
                defender.unit,
                &mut defender.state,
                CombatContext::melee(attacker.charged),
                dice,
            );
            credit(outcome, a_strikes, result.total_wounds, result.defender_models_killed);
        }
    }

    /// Phase 4: a side that lost half its round-start strength tests
    /// morale. A failure routs half the survivors; a second failure in the
    /// same game breaks the unit entirely.
    fn morale_phase(
        &self,
        side: &mut Side,
        enemy: &Side,
        strength_at_start: u32,
        dice: &mut DiceStream,
    ) {
        let alive = side.state.alive_count();
        if alive == 0 || strength_at_start == 0 {
            return;
        }
        let lost = strength_at_start.saturating_sub(alive);
        if lost * 2 < strength_at_start {
            return;
        }

        let in_melee = (side.position - enemy.position).abs() <= MELEE_RANGE;
        let mut modifier = 0i8;
        if in_melee {
            if let Some(fear) = enemy.unit.rule_value(RuleId::Fear) {
                modifier -= fear as i8;
            }
        }

        let mut passed = dice.roll_morale(side.unit.best_quality(), modifier);
        if !passed && side.unit.has_rule(RuleId::Fearless) {
            // Fearless recovers a failed test on 4+.
            passed = dice.roll_d6() >= 4;
        }
        if passed {
            return;
        }

        side.morale_failures += 1;
        if side.morale_failures >= 2 {
            side.state.wounds.iter_mut().for_each(|w| *w = 0);
            log::trace!("{} breaks and is removed", side.unit.name);
            return;
        }
        let routed = alive.div_ceil(2);
        side.state.rout_models(routed);
    }

    /// Phase 5: a side alone within control distance of the objective
    /// scores the round.
    fn objective_phase(&self, a: &Side, b: &Side, objective: f32, outcome: &mut GameOutcome) {
        let a_holds = a.state.is_alive()
            && (a.position - objective).abs() <= self.config.objective_control_distance;
        let b_holds = b.state.is_alive()
            && (b.position - objective).abs() <= self.config.objective_control_distance;
        if a_holds && !b_holds {
            outcome.rounds_holding_a += 1;
        } else if b_holds && !a_holds {
            outcome.rounds_holding_b += 1;
        }
    }

    /// Winner rule: objective rounds, then surviving strength ratio, then
    /// wounds inflicted; otherwise a draw.
    fn decide_winner(&self, a: &Side, b: &Side, outcome: &GameOutcome) -> GameWinner {
        if outcome.rounds_holding_a != outcome.rounds_holding_b {
            return if outcome.rounds_holding_a > outcome.rounds_holding_b {
                GameWinner::UnitA
            } else {
                GameWinner::UnitB
            };
        }

        let ratio_a = a.state.strength_fraction();
        let ratio_b = b.state.strength_fraction();
        if (ratio_a - ratio_b).abs() > f32::EPSILON {
            return if ratio_a > ratio_b {
                GameWinner::UnitA
            } else {
                GameWinner::UnitB
            };
        }

        if outcome.wounds_dealt_a != outcome.wounds_dealt_b {
            return if outcome.wounds_dealt_a > outcome.wounds_dealt_b {
                GameWinner::UnitA
            } else {
                GameWinner::UnitB
            };
        }

        GameWinner::Draw
    }
}

fn credit(outcome: &mut GameOutcome, by_a: bool, wounds: u32, kills: u32) {
    if by_a {
        outcome.wounds_dealt_a += wounds;
        outcome.models_killed_a += kills;
    } else {
        outcome.wounds_dealt_b += wounds;
        outcome.models_killed_b += kills;
    }
}

fn move_toward(position: f32, target: f32, step: f32) -> f32 {
    if (target - position).abs() <= step {
        target
    } else if target > position {
        position + step
    } else {
        position - step
    }
}
