//! Unit catalog text parser
//!
//! Catalogs are two-line stanzas separated by blank lines:
//!
//! ```text
//! Battle Sisters [5] Q4+ D4+ | 100pts | Devout, Tough(1)
//! 5x CCWs (A2), 5x 24" Rifles (A1)
//! ```
//!
//! The first line is the unit profile, the second the weapon list. Parse
//! errors are collected per stanza and reported as non-fatal warnings; a
//! bad stanza is skipped and parsing continues.

use crate::ai;
use crate::error::{SimError, SimResult};
use crate::model::{Model, RuleId, RuleRegistry, Unit, UnitCatalog, Weapon};
use std::path::Path;

/// Result of parsing one catalog.
#[derive(Debug)]
pub struct ParseOutcome {
    pub catalog: UnitCatalog,
    /// Non-fatal per-stanza errors ("line 7: unknown rule 'Vorpal'").
    pub errors: Vec<String>,
    pub lines_processed: usize,
}

pub struct UnitParser;

impl UnitParser {
    pub fn parse_file(path: impl AsRef<Path>, registry: &RuleRegistry) -> SimResult<ParseOutcome> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::Input(format!("cannot read {}: {}", path.display(), e)))?;
        let faction = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::parse_str(&text, &faction, registry))
    }

    pub fn parse_str(text: &str, faction: &str, registry: &RuleRegistry) -> ParseOutcome {
        let mut outcome = ParseOutcome {
            catalog: UnitCatalog::default(),
            errors: Vec::new(),
            lines_processed: 0,
        };

        let lines: Vec<&str> = text.lines().collect();
        outcome.lines_processed = lines.len();

        let mut i = 0;
        while i < lines.len() {
            if lines[i].trim().is_empty() {
                i += 1;
                continue;
            }
            let profile_line = lines[i];
            let profile_no = i + 1;
            let weapon_line = if i + 1 < lines.len() && !lines[i + 1].trim().is_empty() {
                i += 1;
                Some(lines[i])
            } else {
                None
            };
            i += 1;

            match parse_stanza(profile_line, weapon_line, faction, registry, &mut outcome) {
                Ok(unit) => outcome.catalog.units.push(unit),
                Err(message) => {
                    log::warn!("skipping stanza at line {}: {}", profile_no, message);
                    outcome.errors.push(format!("line {}: {}", profile_no, message));
                }
            }
        }

        outcome
    }
}

fn parse_stanza(
    profile_line: &str,
    weapon_line: Option<&str>,
    faction: &str,
    registry: &RuleRegistry,
    outcome: &mut ParseOutcome,
) -> Result<Unit, String> {
    let (name, model_count, quality, defense, points, rules) = parse_profile(profile_line)?;

    let mut unit = Unit::new(name, points);
    unit.faction = faction.to_string();

    let mut tough = 1u8;
    for (id, value) in rules {
        if id == RuleId::Tough {
            tough = value.max(1);
        }
        unit.add_rule(id, value);
    }

    for _ in 0..model_count {
        unit.add_model(Model::new(unit.name.clone(), quality, defense, tough));
    }

    if let Some(line) = weapon_line {
        for entry in split_top_level(line) {
            match parse_weapon_entry(entry.trim(), registry) {
                Ok((count, weapon)) => {
                    if weapon.is_melee() && weapon.has_rule(RuleId::Blast) {
                        return Err(format!("Blast is not allowed on melee weapon '{}'", weapon.name));
                    }
                    let index = outcome.catalog.weapons.add(weapon);
                    let carriers = match count {
                        Some(n) => (n as usize).min(unit.models.len()),
                        None => unit.models.len(),
                    };
                    for model in unit.models.iter_mut().take(carriers) {
                        model.add_weapon(index);
                    }
                }
                Err(message) => return Err(message),
            }
        }
    }

    unit.cache_attack_totals(&outcome.catalog.weapons);
    unit.ai_type = ai::classify(&unit);
    Ok(unit)
}

type Profile = (String, u8, u8, u8, u32, Vec<(RuleId, u8)>);

/// Parse `Name [count] Q4+ D2+ | 350pts | Rule, Rule(n), ...`.
fn parse_profile(line: &str) -> Result<Profile, String> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 2 {
        return Err("profile line needs at least name and points sections".to_string());
    }

    let header = parts[0].trim();
    let open = header.find('[').ok_or("missing model count '[n]'")?;
    let close = header.find(']').ok_or("missing model count '[n]'")?;
    if close <= open {
        return Err("malformed model count".to_string());
    }
    let name = header[..open].trim().to_string();
    if name.is_empty() {
        return Err("empty unit name".to_string());
    }
    let model_count: u8 = header[open + 1..close]
        .trim()
        .parse()
        .map_err(|_| "model count is not a number".to_string())?;
    if model_count == 0 || model_count as usize > crate::model::unit::MAX_MODELS_PER_UNIT {
        return Err(format!("model count {} out of range", model_count));
    }

    let mut quality = None;
    let mut defense = None;
    for token in header[close + 1..].split_whitespace() {
        let token = token.trim_end_matches('+');
        if let Some(rest) = token.strip_prefix('Q') {
            quality = rest.parse::<u8>().ok();
        } else if let Some(rest) = token.strip_prefix('D') {
            defense = rest.parse::<u8>().ok();
        }
    }
    let quality = quality.ok_or("missing quality 'Qn+'")?;
    let defense = defense.ok_or("missing defense 'Dn+'")?;
    if !(2..=6).contains(&quality) || !(2..=6).contains(&defense) {
        return Err("quality and defense must be in 2..6".to_string());
    }

    let points_text = parts[1].trim();
    let points: u32 = points_text
        .strip_suffix("pts")
        .unwrap_or(points_text)
        .trim()
        .parse()
        .map_err(|_| format!("bad points value {:?}", points_text))?;

    let mut rules = Vec::new();
    if parts.len() > 2 {
        for raw in parts[2].split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            rules.push(parse_rule(raw)?);
        }
    }

    Ok((name, model_count, quality, defense, points, rules))
}

/// Parse one weapon entry: `[Kx ][R" ]Name (A3, AP(1), Rending, Deadly(3))`.
fn parse_weapon_entry(entry: &str, registry: &RuleRegistry) -> Result<(Option<u8>, Weapon), String> {
    let mut rest = entry;

    let mut count = None;
    if let Some(pos) = rest.find("x ") {
        if rest[..pos].chars().all(|c| c.is_ascii_digit()) && pos > 0 {
            count = Some(
                rest[..pos]
                    .parse::<u8>()
                    .map_err(|_| "bad weapon count prefix".to_string())?,
            );
            rest = rest[pos + 2..].trim_start();
        }
    }

    let mut range = 0u8;
    if let Some(pos) = rest.find('"') {
        if rest[..pos].chars().all(|c| c.is_ascii_digit()) && pos > 0 {
            range = rest[..pos]
                .parse::<u8>()
                .map_err(|_| "bad range prefix".to_string())?;
            rest = rest[pos + 1..].trim_start();
        }
    }

    let open = rest
        .find('(')
        .ok_or_else(|| format!("weapon '{}' is missing its attribute list", rest))?;
    let close = rest
        .rfind(')')
        .ok_or_else(|| format!("weapon '{}' has an unclosed attribute list", rest))?;
    let name = rest[..open].trim();
    if name.is_empty() {
        return Err("empty weapon name".to_string());
    }

    let mut weapon = Weapon::new(name, 0, range, 0);
    for attr in split_top_level(&rest[open + 1..close]) {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        if let Some(n) = attr.strip_prefix('A') {
            if let Ok(attacks) = n.parse::<u8>() {
                weapon.attacks = attacks;
                continue;
            }
        }
        let (id, value) = parse_rule(attr)?;
        if id == RuleId::Ap {
            weapon.ap = value;
        } else if !registry.valid_on_weapon(id) {
            return Err(format!("rule '{}' is not valid on a weapon", id.name()));
        } else if weapon.rules.len() < crate::model::weapon::MAX_WEAPON_RULES {
            weapon.rules.push((id, value));
        }
    }

    if weapon.attacks == 0 {
        return Err(format!("weapon '{}' has no attacks attribute", name));
    }
    Ok((count, weapon))
}

/// Parse `Name` or `Name(value)` into a rule pair.
fn parse_rule(raw: &str) -> Result<(RuleId, u8), String> {
    let (name, value) = match raw.find('(') {
        Some(open) => {
            let close = raw
                .rfind(')')
                .ok_or_else(|| format!("unclosed rule value in {:?}", raw))?;
            let value = raw[open + 1..close]
                .trim()
                .parse::<u8>()
                .map_err(|_| format!("bad rule value in {:?}", raw))?;
            (raw[..open].trim(), value)
        }
        None => (raw, 0),
    };
    let id = RuleId::from_name(name).ok_or_else(|| format!("unknown rule {:?}", name))?;
    Ok((id, value))
}

/// Split on commas that are not inside parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (pos, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AiType;

    fn registry() -> RuleRegistry {
        RuleRegistry::initialize_faction_rules()
    }

    const SAMPLE: &str = "\
Assault Walker [1] Q4+ D2+ | 350pts | Devout, Fear(2), Fearless, Regeneration, Tough(9)
Stomp (A3, AP(1)), Heavy Claw (A4, AP(1), Rending), Light Chainsaw (A1, AP(2), Deadly(3))

Battle Sisters [5] Q4+ D4+ | 100pts | Devout
5x CCWs (A2), 5x 24\" Rifles (A1)
";

    #[test]
    fn parses_sample_catalog() {
        let outcome = UnitParser::parse_str(SAMPLE, "Blessed Sisters", &registry());
        assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
        assert_eq!(outcome.catalog.units.len(), 2);

        let walker = &outcome.catalog.units[0];
        assert_eq!(walker.models.len(), 1);
        assert_eq!(walker.models[0].tough, 9);
        assert_eq!(walker.points_cost, 350);
        assert_eq!(walker.ai_type, AiType::Melee);
        assert!(walker.has_rule(RuleId::Fearless));
        assert_eq!(walker.rule_value(RuleId::Fear), Some(2));

        let sisters = &outcome.catalog.units[1];
        assert_eq!(sisters.models.len(), 5);
        assert_eq!(sisters.melee_attacks, 10);
        assert_eq!(sisters.ranged_attacks, 5);
        assert_eq!(sisters.max_weapon_range(&outcome.catalog.weapons), 24);
    }

    #[test]
    fn blast_on_melee_weapon_is_a_stanza_error() {
        let text = "Grenadiers [3] Q4+ D4+ | 90pts |\nFists (A2, Blast(3))\n";
        let outcome = UnitParser::parse_str(text, "Test", &registry());
        assert!(outcome.catalog.units.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("Blast"));
    }

    #[test]
    fn unknown_rule_reports_line_number() {
        let text = "Oddballs [2] Q4+ D4+ | 50pts | Vorpal\nClubs (A1)\n";
        let outcome = UnitParser::parse_str(text, "Test", &registry());
        assert!(outcome.catalog.units.is_empty());
        assert!(outcome.errors[0].starts_with("line 1:"));
    }

    #[test]
    fn weapon_count_prefix_limits_carriers() {
        let text = "Squad [4] Q4+ D4+ | 80pts |\n2x Pistols (A1), Knives (A1)\n";
        let outcome = UnitParser::parse_str(text, "Test", &registry());
        let unit = &outcome.catalog.units[0];
        let with_pistol = unit.models.iter().filter(|m| m.weapons.len() == 2).count();
        assert_eq!(with_pistol, 2);
    }
}
