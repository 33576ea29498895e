//! Content catalog
//!
//! Immutable descriptors for point categories, badges, trophies, levels, and
//! known event types. The catalog is assembled once at startup and never
//! mutated during a run; rules and the reward applier resolve descriptors
//! through it by id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How point awards combine with the user's existing balance in a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Award adds to the running total
    #[default]
    Sum,
    /// Balance becomes the maximum of itself and the award
    Max,
    /// Balance becomes the award value
    Last,
}

/// Point category descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub negative_balance_allowed: bool,
    #[serde(default)]
    pub is_spendable: bool,
}

/// Badge descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Image reference for the admin UI
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// Trophy descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrophyDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// Level descriptor
///
/// A user's level in category C is the level with the highest `min_points`
/// not exceeding the user's points in C; ties break on id lexical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDescriptor {
    pub id: String,
    pub category_id: String,
    pub min_points: i64,
    pub name: String,
}

/// Known event-type descriptor served by the events catalog endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeDescriptor {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Optional payload-schema hints; attributes are not enforced against it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_schema: Option<serde_json::Value>,
}

fn default_visible() -> bool {
    true
}

/// Immutable descriptor catalog
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: HashMap<String, PointCategory>,
    badges: HashMap<String, BadgeDescriptor>,
    trophies: HashMap<String, TrophyDescriptor>,
    /// Per-category levels, kept sorted by (min_points, id)
    levels: HashMap<String, Vec<LevelDescriptor>>,
    event_types: Vec<EventTypeDescriptor>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Catalog with the stock `xp` category (spendable, non-negative, summed)
    pub fn standard() -> Self {
        Self::builder()
            .category(PointCategory {
                id: "xp".to_string(),
                name: "Experience".to_string(),
                aggregation: Aggregation::Sum,
                negative_balance_allowed: false,
                is_spendable: true,
            })
            .build()
    }

    pub fn category(&self, id: &str) -> Option<&PointCategory> {
        self.categories.get(id)
    }

    pub fn badge(&self, id: &str) -> Option<&BadgeDescriptor> {
        self.badges.get(id)
    }

    pub fn trophy(&self, id: &str) -> Option<&TrophyDescriptor> {
        self.trophies.get(id)
    }

    pub fn levels_for(&self, category_id: &str) -> &[LevelDescriptor] {
        self.levels
            .get(category_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn event_types(&self) -> &[EventTypeDescriptor] {
        &self.event_types
    }

    pub fn categories(&self) -> impl Iterator<Item = &PointCategory> {
        self.categories.values()
    }

    /// Resolve the level id for a point total in a category.
    ///
    /// Highest `min_points <= points` wins; among equal thresholds the
    /// lexically greatest id wins.
    pub fn level_for_points(&self, category_id: &str, points: i64) -> Option<&LevelDescriptor> {
        self.levels_for(category_id)
            .iter()
            .filter(|level| level.min_points <= points)
            .last()
    }
}

/// Builder used by the composition root and by tests
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    categories: Vec<PointCategory>,
    badges: Vec<BadgeDescriptor>,
    trophies: Vec<TrophyDescriptor>,
    levels: Vec<LevelDescriptor>,
    event_types: Vec<EventTypeDescriptor>,
}

impl CatalogBuilder {
    pub fn category(mut self, category: PointCategory) -> Self {
        self.categories.push(category);
        self
    }

    pub fn badge(mut self, badge: BadgeDescriptor) -> Self {
        self.badges.push(badge);
        self
    }

    pub fn trophy(mut self, trophy: TrophyDescriptor) -> Self {
        self.trophies.push(trophy);
        self
    }

    pub fn level(mut self, level: LevelDescriptor) -> Self {
        self.levels.push(level);
        self
    }

    pub fn event_type(mut self, descriptor: EventTypeDescriptor) -> Self {
        self.event_types.push(descriptor);
        self
    }

    pub fn build(self) -> Catalog {
        let mut levels: HashMap<String, Vec<LevelDescriptor>> = HashMap::new();
        for level in self.levels {
            levels.entry(level.category_id.clone()).or_default().push(level);
        }
        for per_category in levels.values_mut() {
            per_category.sort_by(|a, b| {
                a.min_points
                    .cmp(&b.min_points)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        Catalog {
            categories: self
                .categories
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            badges: self.badges.into_iter().map(|b| (b.id.clone(), b)).collect(),
            trophies: self
                .trophies
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            levels,
            event_types: self.event_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: &str, min_points: i64) -> LevelDescriptor {
        LevelDescriptor {
            id: id.to_string(),
            category_id: "xp".to_string(),
            min_points,
            name: id.to_string(),
        }
    }

    #[test]
    fn test_level_resolution() {
        let catalog = Catalog::builder()
            .level(level("bronze", 0))
            .level(level("silver", 100))
            .level(level("gold", 500))
            .build();

        assert_eq!(catalog.level_for_points("xp", 0).unwrap().id, "bronze");
        assert_eq!(catalog.level_for_points("xp", 99).unwrap().id, "bronze");
        assert_eq!(catalog.level_for_points("xp", 100).unwrap().id, "silver");
        assert_eq!(catalog.level_for_points("xp", 9_999).unwrap().id, "gold");
    }

    #[test]
    fn test_level_tie_breaks_on_id() {
        let catalog = Catalog::builder()
            .level(level("adept", 100))
            .level(level("veteran", 100))
            .build();

        // Equal thresholds resolve to the lexically greatest id
        assert_eq!(catalog.level_for_points("xp", 150).unwrap().id, "veteran");
    }

    #[test]
    fn test_level_below_all_thresholds() {
        let catalog = Catalog::builder().level(level("bronze", 10)).build();
        assert!(catalog.level_for_points("xp", 5).is_none());
        assert!(catalog.level_for_points("unknown", 5).is_none());
    }
}
