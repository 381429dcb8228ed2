//! Combat-resolver scenarios over many trials.

use grimdark_sim::combat::{CombatContext, CombatResolver, RosterState};
use grimdark_sim::model::{Model, RuleId, RuleRegistry, Unit, Weapon, WeaponPool};
use grimdark_sim::rng::DiceStream;

fn squad(name: &str, models: u8, quality: u8, defense: u8, tough: u8) -> Unit {
    let mut unit = Unit::new(name, 100);
    for _ in 0..models {
        unit.add_model(Model::new(name, quality, defense, tough));
    }
    unit
}

#[test]
fn basic_melee_attack_produces_hits_and_wounds() {
    let mut pool = WeaponPool::new();
    let sword = pool.add(Weapon::new("Sword", 2, 0, 0));
    let mut attacker = squad("Attacker", 5, 4, 4, 1);
    for model in &mut attacker.models {
        model.add_weapon(sword);
    }
    let defender = squad("Defender", 5, 4, 4, 1);
    let registry = RuleRegistry::initialize_faction_rules();
    let resolver = CombatResolver::new(&pool, &registry);
    let mut dice = DiceStream::new(42);

    let mut total_hits = 0u32;
    let mut total_wounds = 0u32;
    for _ in 0..1000 {
        let attacker_state = RosterState::new(&attacker);
        let mut defender_state = RosterState::new(&defender);
        let result = resolver.resolve_attack(
            &attacker,
            &attacker_state,
            &defender,
            &mut defender_state,
            CombatContext::melee(false),
            &mut dice,
        );
        total_hits += result.total_hits;
        total_wounds += result.total_wounds;
    }

    // 10 attacks at Q4+ average 5 hits; half of those fail a D4+ save.
    let mean_hits = f64::from(total_hits) / 1000.0;
    let mean_wounds = f64::from(total_wounds) / 1000.0;
    assert!((4.5..5.5).contains(&mean_hits), "mean hits {}", mean_hits);
    assert!((2.1..2.9).contains(&mean_wounds), "mean wounds {}", mean_wounds);
}

#[test]
fn blast_triples_expected_hits_against_a_squad() {
    let mut pool = WeaponPool::new();
    let plain = pool.add(Weapon::new("Rifle", 1, 18, 0));
    let blast = pool.add(Weapon::new("Launcher", 1, 18, 0).with_rule(RuleId::Blast, 3));
    let registry = RuleRegistry::initialize_faction_rules();
    let resolver = CombatResolver::new(&pool, &registry);

    let mean_hits = |weapon| {
        let mut attacker = squad("Gunner", 1, 4, 4, 1);
        attacker.models[0].add_weapon(weapon);
        let defender = squad("Squad", 5, 4, 4, 1);
        let mut dice = DiceStream::new(4242);
        let mut hits = 0u32;
        for _ in 0..10_000 {
            let attacker_state = RosterState::new(&attacker);
            let mut defender_state = RosterState::new(&defender);
            let result = resolver.resolve_attack(
                &attacker,
                &attacker_state,
                &defender,
                &mut defender_state,
                CombatContext::shooting(),
                &mut dice,
            );
            hits += result.total_hits;
        }
        f64::from(hits) / 10_000.0
    };

    let plain_mean = mean_hits(plain);
    let blast_mean = mean_hits(blast);
    let ratio = blast_mean / plain_mean;
    assert!(
        (2.8..3.2).contains(&ratio),
        "blast ratio {} (plain {}, blast {})",
        ratio,
        plain_mean,
        blast_mean
    );
}

#[test]
fn tough_models_absorb_wounds_before_dying() {
    let mut pool = WeaponPool::new();
    let cannon = pool.add(Weapon::new("Cannon", 4, 0, 2));
    let mut attacker = squad("Killer", 1, 4, 4, 1);
    attacker.models[0].add_weapon(cannon);
    let defender = squad("Tank", 1, 4, 3, 3);
    let registry = RuleRegistry::initialize_faction_rules();
    let resolver = CombatResolver::new(&pool, &registry);
    let mut dice = DiceStream::new(456);

    let mut total_wounds = 0u64;
    let mut total_kills = 0u64;
    for _ in 0..10_000 {
        let attacker_state = RosterState::new(&attacker);
        let mut defender_state = RosterState::new(&defender);
        let result = resolver.resolve_attack(
            &attacker,
            &attacker_state,
            &defender,
            &mut defender_state,
            CombatContext::melee(false),
            &mut dice,
        );
        total_wounds += u64::from(result.total_wounds);
        total_kills += u64::from(result.defender_models_killed);
    }

    // A Tough(3) model costs three wounds; kills can never outpace that.
    let wounds_per_game = total_wounds as f64 / 10_000.0;
    let kills_per_game = total_kills as f64 / 10_000.0;
    assert!(
        kills_per_game < wounds_per_game / 3.0 + 0.05,
        "kills {} vs wounds {}",
        kills_per_game,
        wounds_per_game
    );
    assert!(total_kills > 0, "AP(2) should finish some Tough(3) models");
}

#[test]
fn rending_outperforms_plain_claws_into_heavy_armor() {
    let mut pool = WeaponPool::new();
    let plain = pool.add(Weapon::new("Claw", 6, 0, 0));
    let rending = pool.add(Weapon::new("Rending Claw", 6, 0, 0).with_rule(RuleId::Rending, 0));
    let registry = RuleRegistry::initialize_faction_rules();
    let resolver = CombatResolver::new(&pool, &registry);

    let mean_wounds = |weapon| {
        let mut attacker = squad("Beast", 1, 4, 4, 1);
        attacker.models[0].add_weapon(weapon);
        let defender = squad("Knight", 1, 4, 2, 6);
        let mut dice = DiceStream::new(77);
        let mut wounds = 0u32;
        for _ in 0..10_000 {
            let attacker_state = RosterState::new(&attacker);
            let mut defender_state = RosterState::new(&defender);
            let result = resolver.resolve_attack(
                &attacker,
                &attacker_state,
                &defender,
                &mut defender_state,
                CombatContext::melee(false),
                &mut dice,
            );
            wounds += result.total_wounds;
        }
        f64::from(wounds) / 10_000.0
    };

    let plain_mean = mean_wounds(plain);
    let rending_mean = mean_wounds(rending);
    assert!(
        rending_mean > plain_mean * 1.2,
        "rending {} vs plain {}",
        rending_mean,
        plain_mean
    );
}
