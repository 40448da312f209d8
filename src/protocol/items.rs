//! Heal items: the host spawns them, either peer may collect them.
//!
//! Removal is idempotent. An item collected locally and then reported
//! collected by the peer (or the other way round) is removed once, and a late
//! SPAWN_ITEM for an id that is already gone does not bring it back.

use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use crate::common::config::MatchRules;
use crate::common::messages::ItemId;

/// One heal item on the arena floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealItem {
    pub id: ItemId,
    pub x: i32,
    pub y: i32,
    pub spawned_at: Instant,
}

/// The items this peer currently shows.
#[derive(Debug)]
pub struct ItemBoard {
    live: BTreeMap<ItemId, HealItem>,
    retired: HashSet<ItemId>,
    next_id: u32,
    lifetime: Duration,
}

impl ItemBoard {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            live: BTreeMap::new(),
            retired: HashSet::new(),
            next_id: 1,
            lifetime,
        }
    }

    /// Host side: place a new item at a random spot inside the spawn area.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        rules: &MatchRules,
        rng: &mut R,
        now: Instant,
    ) -> HealItem {
        let id = ItemId(self.next_id);
        self.next_id += 1;

        let item = HealItem {
            id,
            x: rng.gen_range(rules.spawn_x_min..=rules.spawn_x_max.max(rules.spawn_x_min)),
            y: rng.gen_range(rules.spawn_y_min..=rules.spawn_y_max.max(rules.spawn_y_min)),
            spawned_at: now,
        };
        self.live.insert(id, item.clone());
        item
    }

    /// Client side: mirror an item the host spawned.
    ///
    /// Returns `None` for an id that is already live or already gone.
    pub fn insert_remote(&mut self, id: ItemId, x: i32, y: i32, now: Instant) -> Option<HealItem> {
        if self.retired.contains(&id) || self.live.contains_key(&id) {
            return None;
        }
        let item = HealItem {
            id,
            x,
            y,
            spawned_at: now,
        };
        self.live.insert(id, item.clone());
        Some(item)
    }

    /// Remove an item; `None` if it was not live.
    pub fn remove(&mut self, id: ItemId) -> Option<HealItem> {
        self.retired.insert(id);
        self.live.remove(&id)
    }

    /// Drop every item older than the configured lifetime.
    pub fn expire(&mut self, now: Instant) -> Vec<ItemId> {
        let expired: Vec<ItemId> = self
            .live
            .values()
            .filter(|item| now.saturating_duration_since(item.spawned_at) >= self.lifetime)
            .map(|item| item.id)
            .collect();

        for id in &expired {
            self.remove(*id);
        }
        expired
    }

    pub fn get(&self, id: ItemId) -> Option<&HealItem> {
        self.live.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HealItem> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Forget every item for a fresh round.
    ///
    /// Ids keep counting up and old ones stay retired, so a straggler message
    /// from an earlier round can never match or revive an item.
    pub fn clear(&mut self) {
        self.retired.extend(self.live.keys().copied());
        self.live.clear();
    }
}

/// Fixed-interval spawn timer, armed by its first tick.
#[derive(Debug)]
pub struct Spawner {
    interval: Duration,
    next_at: Option<Instant>,
}

impl Spawner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_at: None,
        }
    }

    /// Whether an item is due at `now`. At most one per call.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_at {
            None => {
                self.next_at = Some(now + self.interval);
                false
            }
            Some(at) if now >= at => {
                self.next_at = Some(now + self.interval);
                true
            }
            Some(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.next_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn board() -> ItemBoard {
        ItemBoard::new(Duration::from_secs(5))
    }

    #[test]
    fn test_spawn_stays_inside_spawn_area() {
        let rules = MatchRules::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut items = board();
        let now = Instant::now();

        for expected in 1..=20 {
            let item = items.spawn(&rules, &mut rng, now);
            assert_eq!(item.id, ItemId(expected));
            assert!((rules.spawn_x_min..=rules.spawn_x_max).contains(&item.x));
            assert!((rules.spawn_y_min..=rules.spawn_y_max).contains(&item.y));
        }
        assert_eq!(items.len(), 20);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut items = board();
        let now = Instant::now();
        items.insert_remote(ItemId(4), 200, 400, now);

        assert!(items.remove(ItemId(4)).is_some());
        assert!(items.remove(ItemId(4)).is_none());
        assert!(items.remove(ItemId(99)).is_none());
        assert!(items.is_empty());
    }

    #[test]
    fn test_late_spawn_of_collected_item_is_ignored() {
        let mut items = board();
        let now = Instant::now();

        // ITEM_COLLECTED overtook SPAWN_ITEM.
        assert!(items.remove(ItemId(2)).is_none());
        assert!(items.insert_remote(ItemId(2), 500, 300, now).is_none());
        assert!(items.get(ItemId(2)).is_none());
    }

    #[test]
    fn test_duplicate_spawn_is_ignored() {
        let mut items = board();
        let now = Instant::now();

        assert!(items.insert_remote(ItemId(1), 100, 300, now).is_some());
        assert!(items.insert_remote(ItemId(1), 100, 300, now).is_none());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused_across_rounds() {
        let rules = MatchRules::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut items = board();
        let now = Instant::now();

        let first = items.spawn(&rules, &mut rng, now);
        items.clear();
        let second = items.spawn(&rules, &mut rng, now);

        assert_ne!(first.id, second.id);
        // A late collect from the previous round leaves the new item alone.
        assert!(items.remove(first.id).is_none());
        assert!(items.get(second.id).is_some());
        // Nor does a late spawn bring the old item back.
        assert!(items.insert_remote(first.id, 100, 300, now).is_none());
    }

    #[test]
    fn test_items_expire_after_lifetime() {
        let mut items = board();
        let start = Instant::now();
        items.insert_remote(ItemId(1), 100, 300, start);
        items.insert_remote(ItemId(2), 100, 300, start + Duration::from_secs(3));

        assert!(items.expire(start + Duration::from_secs(4)).is_empty());
        assert_eq!(items.expire(start + Duration::from_secs(5)), vec![ItemId(1)]);
        assert_eq!(items.expire(start + Duration::from_secs(8)), vec![ItemId(2)]);
        assert!(items.is_empty());
    }

    #[test]
    fn test_spawner_fires_once_per_interval() {
        let mut spawner = Spawner::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(!spawner.due(start));
        assert!(!spawner.due(start + Duration::from_secs(9)));
        assert!(spawner.due(start + Duration::from_secs(10)));
        assert!(!spawner.due(start + Duration::from_secs(11)));
        assert!(spawner.due(start + Duration::from_secs(20)));
    }
}
