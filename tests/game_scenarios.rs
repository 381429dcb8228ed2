//! End-to-end game scenarios from the rules system.

use grimdark_sim::game::{GameRunner, GameWinner};
use grimdark_sim::model::{Model, RuleRegistry, Unit, Weapon, WeaponPool};
use grimdark_sim::rng::DiceStream;
use grimdark_sim::SimulationConfig;

fn melee_squad(name: &str, models: u8, quality: u8, defense: u8, pool: &mut WeaponPool) -> Unit {
    let sword = pool.add(Weapon::new("Sword", 2, 0, 0));
    let mut unit = Unit::new(name, 100);
    for _ in 0..models {
        let mut model = Model::new(name, quality, defense, 1);
        model.add_weapon(sword);
        unit.add_model(model);
    }
    unit.cache_attack_totals(pool);
    unit.ai_type = grimdark_sim::ai::classify(&unit);
    unit
}

/// Two identical 5-model Q4+ D4+ melee units over 10 000 games: the win
/// rate stays within three points of even.
#[test]
fn mirror_match_win_rate_is_symmetric() {
    let mut pool = WeaponPool::new();
    let unit = melee_squad("Mirror", 5, 4, 4, &mut pool);
    let registry = RuleRegistry::initialize_faction_rules();
    let config = SimulationConfig::default();
    let runner = GameRunner::new(&pool, &registry, &config);
    let mut dice = DiceStream::new(42);

    let mut wins_a = 0u32;
    const GAMES: u32 = 10_000;
    for _ in 0..GAMES {
        if runner.run_match(&unit, &unit, &mut dice).overall_winner() == GameWinner::UnitA {
            wins_a += 1;
        }
    }

    let rate = f64::from(wins_a) / f64::from(GAMES);
    assert!(
        (rate - 0.5).abs() < 0.03,
        "side A won {:.3} of mirror games",
        rate
    );
}

/// Elite Q3+ D3+ against basic Q4+ D5+: the elite unit dominates.
#[test]
fn elite_unit_beats_basic_unit() {
    let mut pool = WeaponPool::new();
    let elite = melee_squad("Elite", 5, 3, 3, &mut pool);
    let basic = melee_squad("Basic", 5, 4, 5, &mut pool);
    let registry = RuleRegistry::initialize_faction_rules();
    let config = SimulationConfig::default();
    let runner = GameRunner::new(&pool, &registry, &config);
    let mut dice = DiceStream::new(42);

    let mut elite_wins = 0u32;
    const GAMES: u32 = 10_000;
    for _ in 0..GAMES {
        if runner.run_match(&elite, &basic, &mut dice).overall_winner() == GameWinner::UnitA {
            elite_wins += 1;
        }
    }

    let rate = f64::from(elite_wins) / f64::from(GAMES);
    assert!(rate > 0.75, "elite win rate {:.3}", rate);
}

/// The same seed replays the same match, game by game.
#[test]
fn matches_replay_deterministically() {
    let mut pool = WeaponPool::new();
    let a = melee_squad("A", 5, 4, 4, &mut pool);
    let b = melee_squad("B", 3, 3, 4, &mut pool);
    let registry = RuleRegistry::initialize_faction_rules();
    let config = SimulationConfig {
        games_per_match: 3,
        ..SimulationConfig::default()
    };
    let runner = GameRunner::new(&pool, &registry, &config);

    let mut first = DiceStream::new(777);
    let mut second = DiceStream::new(777);
    for _ in 0..50 {
        let x = runner.run_match(&a, &b, &mut first);
        let y = runner.run_match(&a, &b, &mut second);
        assert_eq!(x.games_won_a, y.games_won_a);
        assert_eq!(x.total_wounds_dealt_a, y.total_wounds_dealt_a);
        assert_eq!(x.total_rounds, y.total_rounds);
    }
}

/// `games_per_match` is an explicit knob; every game is accounted for.
#[test]
fn games_per_match_is_honored() {
    let mut pool = WeaponPool::new();
    let a = melee_squad("A", 5, 4, 4, &mut pool);
    let b = melee_squad("B", 5, 4, 4, &mut pool);
    let registry = RuleRegistry::initialize_faction_rules();
    let config = SimulationConfig {
        games_per_match: 5,
        ..SimulationConfig::default()
    };
    let runner = GameRunner::new(&pool, &registry, &config);
    let mut dice = DiceStream::new(1);

    let result = runner.run_match(&a, &b, &mut dice);
    assert_eq!(result.games_won_a + result.games_won_b + result.draws, 5);
}
