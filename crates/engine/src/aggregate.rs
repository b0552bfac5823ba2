//! Interaction aggregation
//!
//! Collapses cleaned point-of-sale rows into per-(user, item) purchase counts
//! and assigns dense ids. Ids come from [`IdMap`], which enumerates distinct
//! keys in lexicographic order, so the same input always yields the same ids.
//! User ids are shared by every partition; item ids are scoped to one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use venue_recs_core::Partition;

/// Cleaned transaction row delivered by ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    /// Opaque, stable customer identifier
    pub user_key: String,
    /// Point-of-sale menu category
    pub item_category: String,
    /// Normalized item name
    pub item_name: String,
}

impl TransactionRow {
    pub fn new(
        user_key: impl Into<String>,
        item_category: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Self {
            user_key: user_key.into(),
            item_category: item_category.into(),
            item_name: item_name.into(),
        }
    }
}

/// Arena-style id table: dense ids in stable (sorted) insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl IdMap {
    /// Build a map over the distinct keys, ids assigned in lexicographic order
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let distinct: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let keys: Vec<String> = distinct.into_iter().collect();
        let index = keys
            .iter()
            .enumerate()
            .map(|(id, key)| (key.clone(), id))
            .collect();

        Self { keys, index }
    }

    pub fn id_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key_of(&self, id: usize) -> Option<&str> {
        self.keys.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(id, key)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.keys.iter().enumerate().map(|(id, key)| (id, key.as_str()))
    }
}

/// Aggregated purchase count for one (user, category, item) group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: usize,
    /// Raw menu category the purchases were recorded under
    pub item_type: String,
    pub item_id: usize,
    pub item_name: String,
    pub count: u32,
}

/// Aggregated records and item ids for one partition
#[derive(Debug, Clone)]
pub struct PartitionTable {
    pub partition: Partition,
    pub items: Arc<IdMap>,
    pub records: Vec<InteractionRecord>,
}

impl PartitionTable {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total number of purchases in the partition
    pub fn total_count(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.count)).sum()
    }

    /// Largest user id with at least one purchase here
    pub fn max_user_id(&self) -> Option<usize> {
        self.records.iter().map(|r| r.user_id).max()
    }
}

/// Output of [`aggregate`]: shared user ids plus one table per partition
#[derive(Debug, Clone)]
pub struct AggregatedInteractions {
    pub users: Arc<IdMap>,
    pub food: PartitionTable,
    pub drink: PartitionTable,
    /// Rows dropped because their category maps to no partition
    pub rejected_rows: usize,
}

impl AggregatedInteractions {
    pub fn partition(&self, partition: Partition) -> &PartitionTable {
        match partition {
            Partition::Food => &self.food,
            Partition::Drink => &self.drink,
        }
    }
}

type GroupKey<'a> = (&'a str, &'a str, &'a str);

/// Group rows by (user, category, item) and assign dense ids
///
/// Rows whose category is outside the accepted set are counted in
/// `rejected_rows` and otherwise ignored.
pub fn aggregate(rows: &[TransactionRow]) -> AggregatedInteractions {
    let mut groups: [BTreeMap<GroupKey<'_>, u32>; 2] = [BTreeMap::new(), BTreeMap::new()];
    let mut rejected_rows = 0usize;

    for row in rows {
        let Some(partition) = Partition::from_category(&row.item_category) else {
            rejected_rows += 1;
            continue;
        };
        *groups[slot(partition)]
            .entry((
                row.user_key.as_str(),
                row.item_category.as_str(),
                row.item_name.as_str(),
            ))
            .or_insert(0) += 1;
    }

    if rejected_rows > 0 {
        warn!(
            rejected_rows,
            "Dropped rows with categories outside the food and drink partitions"
        );
    }

    let users = Arc::new(IdMap::from_keys(
        groups
            .iter()
            .flat_map(|g| g.keys().map(|(user, _, _)| *user)),
    ));

    let [food_groups, drink_groups] = groups;
    let food = build_table(Partition::Food, &food_groups, &users);
    let drink = build_table(Partition::Drink, &drink_groups, &users);

    info!(
        rows = rows.len(),
        users = users.len(),
        food_items = food.items.len(),
        drink_items = drink.items.len(),
        "Aggregated interactions"
    );

    AggregatedInteractions {
        users,
        food,
        drink,
        rejected_rows,
    }
}

fn slot(partition: Partition) -> usize {
    match partition {
        Partition::Food => 0,
        Partition::Drink => 1,
    }
}

fn build_table(
    partition: Partition,
    groups: &BTreeMap<GroupKey<'_>, u32>,
    users: &IdMap,
) -> PartitionTable {
    let items = Arc::new(IdMap::from_keys(groups.keys().map(|(_, _, item)| *item)));

    let records: Vec<InteractionRecord> = groups
        .iter()
        .filter_map(|(&(user_key, category, item_name), &count)| {
            Some(InteractionRecord {
                user_id: users.id_of(user_key)?,
                item_type: category.to_string(),
                item_id: items.id_of(item_name)?,
                item_name: item_name.to_string(),
                count,
            })
        })
        .collect();

    debug!(
        %partition,
        records = records.len(),
        items = items.len(),
        "Built partition table"
    );

    PartitionTable {
        partition,
        items,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<TransactionRow> {
        vec![
            TransactionRow::new("u-bob", "Food", "Nachos"),
            TransactionRow::new("u-bob", "Food", "Nachos"),
            TransactionRow::new("u-amy", "Food", "Hot Dog"),
            TransactionRow::new("u-amy", "Beer - Draft", "IPA"),
            TransactionRow::new("u-cat", "Wine", "Merlot"),
            TransactionRow::new("u-cat", "Modifiers", "No Salsa"),
        ]
    }

    #[test]
    fn test_id_map_is_sorted_and_deduplicated() {
        let map = IdMap::from_keys(["pretzel", "burger", "pretzel", "fries"]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.id_of("burger"), Some(0));
        assert_eq!(map.id_of("fries"), Some(1));
        assert_eq!(map.id_of("pretzel"), Some(2));
        assert_eq!(map.key_of(2), Some("pretzel"));
        assert_eq!(map.key_of(3), None);
        assert_eq!(map.id_of("salad"), None);
    }

    #[test]
    fn test_aggregate_counts_groups() {
        let aggregated = aggregate(&rows());

        assert_eq!(aggregated.rejected_rows, 1);
        assert_eq!(aggregated.food.records.len(), 2);
        assert_eq!(aggregated.food.total_count(), 3);

        let bob = aggregated.users.id_of("u-bob").unwrap();
        let nachos = aggregated
            .food
            .records
            .iter()
            .find(|r| r.user_id == bob)
            .unwrap();
        assert_eq!(nachos.item_name, "Nachos");
        assert_eq!(nachos.count, 2);
    }

    #[test]
    fn test_user_ids_are_shared_across_partitions() {
        let aggregated = aggregate(&rows());

        // u-cat only bought a rejected modifier and a drink; still one shared id space
        assert_eq!(aggregated.users.len(), 3);
        let amy = aggregated.users.id_of("u-amy").unwrap();
        assert!(aggregated.food.records.iter().any(|r| r.user_id == amy));
        assert!(aggregated.drink.records.iter().any(|r| r.user_id == amy));
    }

    #[test]
    fn test_item_ids_are_scoped_per_partition() {
        let aggregated = aggregate(&rows());

        assert_eq!(aggregated.food.items.id_of("Hot Dog"), Some(0));
        assert_eq!(aggregated.food.items.id_of("Nachos"), Some(1));
        assert_eq!(aggregated.drink.items.id_of("IPA"), Some(0));
        assert_eq!(aggregated.drink.items.id_of("Merlot"), Some(1));
        assert_eq!(aggregated.food.items.id_of("IPA"), None);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let mut shuffled = rows();
        shuffled.reverse();

        let a = aggregate(&rows());
        let b = aggregate(&shuffled);

        assert_eq!(a.users, b.users);
        assert_eq!(a.food.records, b.food.records);
        assert_eq!(a.drink.records, b.drink.records);
    }

    #[test]
    fn test_aggregate_empty_input() {
        let aggregated = aggregate(&[]);
        assert!(aggregated.users.is_empty());
        assert!(aggregated.food.is_empty());
        assert!(aggregated.drink.is_empty());
        assert_eq!(aggregated.food.max_user_id(), None);
    }
}
