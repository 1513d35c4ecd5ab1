//! Standard weapon catalog.
//!
//! Contains the 2024 weapon table with mastery properties so callers can
//! equip combatants by id instead of building stat blocks by hand.

use crate::world::{DamageType, MasteryProperty, Weapon, WeaponProperty};

/// Get a standard weapon by id or display name (case-insensitive).
pub fn get_weapon(name: &str) -> Option<Weapon> {
    let name_lower = name.to_lowercase();
    WEAPONS
        .iter()
        .find(|w| w.id == name_lower || w.name.to_lowercase() == name_lower)
        .cloned()
}

/// All weapon ids in the catalog.
pub fn weapon_ids() -> impl Iterator<Item = &'static str> {
    WEAPONS.iter().map(|w| w.id.as_str())
}

// ============================================================================
// Weapons
// ============================================================================

lazy_static::lazy_static! {
    /// Standard weapons with their mastery properties.
    pub static ref WEAPONS: Vec<Weapon> = vec![
        // Simple Melee Weapons
        Weapon::new("club", "Club", "1d4", DamageType::Bludgeoning)
            .with_properties(vec![WeaponProperty::Light])
            .with_mastery(MasteryProperty::Slow),
        Weapon::new("dagger", "Dagger", "1d4", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Finesse, WeaponProperty::Light, WeaponProperty::Thrown])
            .with_range(20, 60)
            .with_mastery(MasteryProperty::Nick),
        Weapon::new("greatclub", "Greatclub", "1d8", DamageType::Bludgeoning)
            .with_properties(vec![WeaponProperty::TwoHanded])
            .with_mastery(MasteryProperty::Push),
        Weapon::new("handaxe", "Handaxe", "1d6", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Light, WeaponProperty::Thrown])
            .with_range(20, 60)
            .with_mastery(MasteryProperty::Vex),
        Weapon::new("javelin", "Javelin", "1d6", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Thrown])
            .with_range(30, 120)
            .with_mastery(MasteryProperty::Slow),
        Weapon::new("light-hammer", "Light Hammer", "1d4", DamageType::Bludgeoning)
            .with_properties(vec![WeaponProperty::Light, WeaponProperty::Thrown])
            .with_range(20, 60)
            .with_mastery(MasteryProperty::Nick),
        Weapon::new("mace", "Mace", "1d6", DamageType::Bludgeoning)
            .with_mastery(MasteryProperty::Sap),
        Weapon::new("quarterstaff", "Quarterstaff", "1d6", DamageType::Bludgeoning)
            .with_properties(vec![WeaponProperty::Versatile("1d8".to_string())])
            .with_mastery(MasteryProperty::Topple),
        Weapon::new("sickle", "Sickle", "1d4", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Light])
            .with_mastery(MasteryProperty::Nick),
        Weapon::new("spear", "Spear", "1d6", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Thrown, WeaponProperty::Versatile("1d8".to_string())])
            .with_range(20, 60)
            .with_mastery(MasteryProperty::Sap),

        // Simple Ranged Weapons
        Weapon::new("light-crossbow", "Light Crossbow", "1d8", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Ammunition, WeaponProperty::Loading, WeaponProperty::TwoHanded])
            .with_range(80, 320)
            .with_mastery(MasteryProperty::Slow),
        Weapon::new("shortbow", "Shortbow", "1d6", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Ammunition, WeaponProperty::TwoHanded])
            .with_range(80, 320)
            .with_mastery(MasteryProperty::Vex),

        // Martial Melee Weapons
        Weapon::new("battleaxe", "Battleaxe", "1d8", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Versatile("1d10".to_string())])
            .with_mastery(MasteryProperty::Topple),
        Weapon::new("glaive", "Glaive", "1d10", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::Reach, WeaponProperty::TwoHanded])
            .with_mastery(MasteryProperty::Graze),
        Weapon::new("greataxe", "Greataxe", "1d12", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded])
            .with_mastery(MasteryProperty::Cleave),
        Weapon::new("greatsword", "Greatsword", "2d6", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded])
            .with_mastery(MasteryProperty::Graze),
        Weapon::new("halberd", "Halberd", "1d10", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::Reach, WeaponProperty::TwoHanded])
            .with_mastery(MasteryProperty::Cleave),
        Weapon::new("longsword", "Longsword", "1d8", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Versatile("1d10".to_string())])
            .with_mastery(MasteryProperty::Sap),
        Weapon::new("maul", "Maul", "2d6", DamageType::Bludgeoning)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded])
            .with_mastery(MasteryProperty::Topple),
        Weapon::new("rapier", "Rapier", "1d8", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Finesse])
            .with_mastery(MasteryProperty::Vex),
        Weapon::new("scimitar", "Scimitar", "1d6", DamageType::Slashing)
            .with_properties(vec![WeaponProperty::Finesse, WeaponProperty::Light])
            .with_mastery(MasteryProperty::Nick),
        Weapon::new("shortsword", "Shortsword", "1d6", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Finesse, WeaponProperty::Light])
            .with_mastery(MasteryProperty::Vex),
        Weapon::new("warhammer", "Warhammer", "1d8", DamageType::Bludgeoning)
            .with_properties(vec![WeaponProperty::Versatile("1d10".to_string())])
            .with_mastery(MasteryProperty::Push),

        // Martial Ranged Weapons
        Weapon::new("heavy-crossbow", "Heavy Crossbow", "1d10", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Ammunition, WeaponProperty::Heavy, WeaponProperty::Loading, WeaponProperty::TwoHanded])
            .with_range(100, 400)
            .with_mastery(MasteryProperty::Push),
        Weapon::new("longbow", "Longbow", "1d8", DamageType::Piercing)
            .with_properties(vec![WeaponProperty::Ammunition, WeaponProperty::Heavy, WeaponProperty::TwoHanded])
            .with_range(150, 600)
            .with_mastery(MasteryProperty::Slow),
    ];
}
