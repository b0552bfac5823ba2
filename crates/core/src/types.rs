//! Core type definitions shared across crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent modeling scope with its own item-id space and model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Food,
    Drink,
}

const FOOD_CATEGORIES: &[&str] = &["Subcontractor", "Food", "Retail"];

const DRINK_CATEGORIES: &[&str] = &[
    "Beer - Packaged",
    "N/A Beverage",
    "Beer - Draft",
    "Liquor",
    "Mixers,Soda Flavor",
    "Mixers",
    "Wine",
];

impl Partition {
    /// All partitions in training order
    pub const ALL: [Partition; 2] = [Partition::Food, Partition::Drink];

    /// Map a point-of-sale menu category to its partition
    ///
    /// Returns `None` for categories outside the accepted set (modifiers such
    /// as "No Salsa" and other non-purchase rows).
    pub fn from_category(category: &str) -> Option<Self> {
        if FOOD_CATEGORIES.contains(&category) {
            Some(Partition::Food)
        } else if DRINK_CATEGORIES.contains(&category) {
            Some(Partition::Drink)
        } else {
            None
        }
    }

    /// Menu categories mapped to this partition
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            Partition::Food => FOOD_CATEGORIES,
            Partition::Drink => DRINK_CATEGORIES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Food => "food",
            Partition::Drink => "drink",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(Partition::from_category("Food"), Some(Partition::Food));
        assert_eq!(Partition::from_category("Retail"), Some(Partition::Food));
        assert_eq!(Partition::from_category("Beer - Draft"), Some(Partition::Drink));
        assert_eq!(
            Partition::from_category("Mixers,Soda Flavor"),
            Some(Partition::Drink)
        );
        assert_eq!(Partition::from_category("Modifiers"), None);
        assert_eq!(Partition::from_category("food"), None);
    }

    #[test]
    fn test_categories_are_disjoint() {
        for category in Partition::Food.categories() {
            assert!(!Partition::Drink.categories().contains(category));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Partition::Drink.to_string(), "drink");
        assert_eq!(Partition::ALL.map(|p| p.as_str()), ["food", "drink"]);
    }
}
