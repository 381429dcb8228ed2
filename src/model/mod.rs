//! Data model: weapons, models, units, special rules

pub mod rules;
pub mod unit;
pub mod weapon;

pub use rules::{CombatEffect, RuleDescriptor, RuleId, RuleRegistry, RuleTarget};
pub use unit::{AiType, Model, Unit, UnitCatalog};
pub use weapon::{Weapon, WeaponIndex, WeaponPool};
