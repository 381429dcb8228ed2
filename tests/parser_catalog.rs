//! Catalog parser: grammar coverage and snapshot checks.

use grimdark_sim::model::{AiType, RuleId, RuleRegistry};
use grimdark_sim::parser::UnitParser;

fn registry() -> RuleRegistry {
    RuleRegistry::initialize_faction_rules()
}

#[test]
fn parses_the_reference_catalog() {
    let text = "\
Assault Walker [1] Q4+ D2+ | 350pts | Devout, Fear(2), Fearless, Regeneration, Tough(9)
Stomp (A3, AP(1)), Heavy Claw (A4, AP(1), Rending), Light Chainsaw (A1, AP(2), Deadly(3))

Battle Sisters [5] Q4+ D4+ | 100pts | Devout
5x CCWs (A2), 5x 24\" Rifles (A1)

APC [1] Q4+ D2+ | 175pts | Impact(3), Strider, Tough(6)
24\" Storm Rifle (A3, AP(1))
";
    let outcome = UnitParser::parse_str(text, "Blessed Sisters", &registry());
    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.catalog.units.len(), 3);
    assert_eq!(outcome.lines_processed, 8);

    let walker = &outcome.catalog.units[0];
    assert_eq!(walker.faction, "Blessed Sisters");
    assert_eq!(walker.models[0].tough, 9);
    assert_eq!(walker.ai_type, AiType::Melee);

    let sisters = &outcome.catalog.units[1];
    assert_eq!(sisters.models.len(), 5);
    assert_eq!(sisters.ai_type, AiType::Melee);

    let apc = &outcome.catalog.units[2];
    assert_eq!(apc.ai_type, AiType::Shooting);
    assert_eq!(apc.rule_value(RuleId::Impact), Some(3));
    assert_eq!(apc.max_weapon_range(&outcome.catalog.weapons), 24);
}

#[test]
fn weapon_profiles_snapshot() {
    let text = "\
Snipers [2] Q3+ D4+ | 140pts |
2x 30\" Long Rifles (A1, AP(1), Sniper)
";
    let outcome = UnitParser::parse_str(text, "Test", &registry());
    assert!(outcome.errors.is_empty());
    let unit = &outcome.catalog.units[0];
    let weapon = outcome.catalog.weapons.get(unit.models[0].weapons[0]);

    insta::assert_debug_snapshot!(weapon, @r###"
    Weapon {
        name: "Long Rifles",
        attacks: 1,
        range: 30,
        ap: 1,
        rules: [
            (
                Sniper,
                0,
            ),
        ],
    }
    "###);
}

#[test]
fn stanza_errors_snapshot() {
    let text = "\
Broken [3] Q4+ D4+ | 60pts | Vorpal
Clubs (A1)

Grenadiers [3] Q4+ D4+ | 90pts |
Fists (A2, Blast(3))

Fine [2] Q4+ D4+ | 40pts |
Knives (A1)
";
    let outcome = UnitParser::parse_str(text, "Test", &registry());
    assert_eq!(outcome.catalog.units.len(), 1);
    assert_eq!(outcome.catalog.units[0].name, "Fine");

    insta::assert_debug_snapshot!(outcome.errors, @r###"
    [
        "line 1: unknown rule \"Vorpal\"",
        "line 4: Blast is not allowed on melee weapon 'Fists'",
    ]
    "###);
}

#[test]
fn units_without_weapons_are_allowed() {
    let text = "Objective Markers [3] Q6+ D6+ | 0pts |\n";
    let outcome = UnitParser::parse_str(text, "Test", &registry());
    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    let unit = &outcome.catalog.units[0];
    assert_eq!(unit.melee_attacks, 0);
    assert_eq!(unit.ranged_attacks, 0);
}
