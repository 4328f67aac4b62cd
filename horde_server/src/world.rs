//! Zombie world simulation.
//!
//! Holds every published row in one table keyed by a single id sequence, so
//! ids are unique across categories. Each mutation appends the matching
//! change-feed message to a pending list that the server drains and
//! broadcasts after every step.
//!
//! Determinism notes:
//! - Time only moves through `step`; the wall clock is never read here.
//! - Rows are iterated in id order.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use horde_shared::{
    entity::{EntityAttrs, EntityCategory, EntityId, RemoteEntitySnapshot},
    math::Vec3,
    net::FeedMsg,
};
use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info};

/// Seconds between spawn attempts.
pub const SPAWN_INTERVAL: f64 = 0.5;
/// No spawns once this many regular zombies exist. Spitters are not counted.
pub const MAX_ZOMBIES: usize = 100;
/// Chance that a spawn is a spitter.
pub const SPITTER_SPAWN_CHANCE: f64 = 0.1;
/// Walking speed, units per second.
pub const ZOMBIE_SPEED: f64 = 3.0;
/// Zombies stop this close to their target.
pub const ZOMBIE_REACH: f64 = 1.5;
/// Zombies only bite a target this close, so a resting zombie waits for the
/// player to step in.
pub const ZOMBIE_ATTACK_RANGE: f64 = 1.0;
pub const ZOMBIE_COOLDOWN_MS: i64 = 1_000;
/// Spitters stop this far from their target.
pub const SPITTER_STANDOFF: f64 = 8.0;
pub const SPITTER_ATTACK_RANGE: f64 = 10.0;
pub const SPITTER_COOLDOWN_MS: i64 = 3_000;
/// How long an acid pool stays on the ground.
pub const AOE_LIFETIME_MS: i64 = 3_000;

/// Where new zombies appear.
pub const SPAWN_POINTS: [Vec3; 4] = [
    Vec3::new(0.0, 0.0, -50.0),
    Vec3::new(-16.0, 0.0, 0.0),
    Vec3::new(44.0, 0.0, 2.0),
    Vec3::new(0.0, 0.0, 40.0),
];

/// The authoritative dataset plus its pending change-feed.
#[derive(Debug)]
pub struct HordeWorld {
    rows: BTreeMap<EntityId, RemoteEntitySnapshot>,
    next_id: u64,
    clock: DateTime<Utc>,
    /// Server-private: earliest time each zombie may attack again.
    next_attack: HashMap<EntityId, DateTime<Utc>>,
    spawn_accum: f64,
    spawning: bool,
    changes: Vec<FeedMsg>,
}

impl HordeWorld {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            clock: start,
            next_attack: HashMap::new(),
            spawn_accum: 0.0,
            spawning: true,
            changes: Vec::new(),
        }
    }

    /// Turns the periodic spawner on or off.
    pub fn set_spawning(&mut self, enabled: bool) {
        self.spawning = enabled;
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    // ─── Table access ───

    /// Inserts a new row and returns its id.
    pub fn insert(
        &mut self,
        category: EntityCategory,
        position: Vec3,
        attrs: EntityAttrs,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        let row = RemoteEntitySnapshot {
            id,
            category,
            position,
            attrs,
        };
        debug!(id = %id, category = %category, position = %position, "Row inserted");
        self.changes.push(FeedMsg::Insert(row.clone()));
        self.rows.insert(id, row);
        id
    }

    /// Applies `f` to a row; publishes an update if anything changed.
    pub fn update<F>(&mut self, id: EntityId, f: F) -> bool
    where
        F: FnOnce(&mut RemoteEntitySnapshot),
    {
        let Some(row) = self.rows.get_mut(&id) else {
            return false;
        };
        let old = row.clone();
        f(row);
        row.id = old.id;
        row.category = old.category;
        if *row == old {
            return false;
        }
        self.changes.push(FeedMsg::Update {
            old,
            new: row.clone(),
        });
        true
    }

    /// Removes a row, publishing the delete.
    pub fn delete(&mut self, id: EntityId) -> Option<RemoteEntitySnapshot> {
        let row = self.rows.remove(&id)?;
        self.next_attack.remove(&id);
        debug!(id = %id, category = %row.category, "Row deleted");
        self.changes.push(FeedMsg::Delete(row.clone()));
        Some(row)
    }

    pub fn get(&self, id: EntityId) -> Option<&RemoteEntitySnapshot> {
        self.rows.get(&id)
    }

    /// Every row, in id order.
    pub fn rows(&self) -> impl Iterator<Item = &RemoteEntitySnapshot> {
        self.rows.values()
    }

    /// Rows of the given tables, in id order.
    pub fn rows_in<'a>(
        &'a self,
        tables: &'a HashSet<EntityCategory>,
    ) -> impl Iterator<Item = &'a RemoteEntitySnapshot> + 'a {
        self.rows.values().filter(|r| tables.contains(&r.category))
    }

    pub fn count(&self, category: EntityCategory) -> usize {
        self.rows.values().filter(|r| r.category == category).count()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Takes every change published since the last drain.
    pub fn drain_changes(&mut self) -> Vec<FeedMsg> {
        std::mem::take(&mut self.changes)
    }

    // ─── Players ───

    pub fn add_player(&mut self, name: &str) -> EntityId {
        let id = self.insert(
            EntityCategory::Player,
            Vec3::ZERO,
            EntityAttrs {
                name: Some(name.to_string()),
                ..Default::default()
            },
        );
        info!(player = %id, name = %name, "Player joined");
        id
    }

    pub fn move_player(&mut self, id: EntityId, position: Vec3) -> bool {
        if self.get(id).map(|r| r.category) != Some(EntityCategory::Player) {
            return false;
        }
        self.update(id, |row| row.position = position)
    }

    /// Removes a player. The last player leaving wipes the world.
    pub fn remove_player(&mut self, id: EntityId) {
        if self.delete(id).is_none() {
            return;
        }
        info!(player = %id, "Player left");
        if self.count(EntityCategory::Player) == 0 {
            self.clear();
        }
    }

    /// Deletes every row.
    pub fn clear(&mut self) {
        let ids: Vec<EntityId> = self.rows.keys().copied().collect();
        for id in ids {
            self.delete(id);
        }
        self.spawn_accum = 0.0;
    }

    // ─── Simulation ───

    /// Advances the world by `dt` seconds.
    pub fn step<R: Rng>(&mut self, dt: f64, rng: &mut R) {
        self.clock += chrono::Duration::microseconds((dt * 1_000_000.0) as i64);
        self.expire_aoes();
        self.run_spawner(dt, rng);
        self.run_zombies(dt, rng);
    }

    fn expire_aoes(&mut self) {
        let now = self.clock;
        let expired: Vec<EntityId> = self
            .rows
            .values()
            .filter(|r| r.category == EntityCategory::SpitterAoe)
            .filter(|r| r.attrs.expires_at.is_some_and(|at| at <= now))
            .map(|r| r.id)
            .collect();
        for id in expired {
            self.delete(id);
        }
    }

    fn run_spawner<R: Rng>(&mut self, dt: f64, rng: &mut R) {
        if !self.spawning {
            return;
        }
        self.spawn_accum += dt;
        while self.spawn_accum >= SPAWN_INTERVAL {
            self.spawn_accum -= SPAWN_INTERVAL;
            if self.count(EntityCategory::Zombie) >= MAX_ZOMBIES
                || self.count(EntityCategory::Player) == 0
            {
                continue;
            }
            let Some(&point) = SPAWN_POINTS.choose(rng) else {
                continue;
            };
            let category = if rng.gen::<f64>() <= SPITTER_SPAWN_CHANCE {
                EntityCategory::SpitterZombie
            } else {
                EntityCategory::Zombie
            };
            self.insert(category, point, EntityAttrs::default());
        }
    }

    fn run_zombies<R: Rng>(&mut self, dt: f64, rng: &mut R) {
        let players: Vec<(u64, Vec3)> = self
            .rows
            .values()
            .filter(|r| r.category == EntityCategory::Player)
            .map(|r| (r.id.0, r.position))
            .collect();
        let zombies: Vec<EntityId> = self
            .rows
            .values()
            .filter(|r| r.category.is_zombie())
            .map(|r| r.id)
            .collect();

        for id in zombies {
            self.run_zombie(id, &players, dt, rng);
        }
    }

    fn run_zombie<R: Rng>(&mut self, id: EntityId, players: &[(u64, Vec3)], dt: f64, rng: &mut R) {
        let Some(row) = self.rows.get(&id) else {
            return;
        };
        let category = row.category;
        let position = row.position;

        // Keep the current target while it exists, otherwise pick anyone.
        let target = row
            .attrs
            .target_player
            .and_then(|t| players.iter().find(|(pid, _)| *pid == t))
            .or_else(|| players.choose(rng))
            .copied();
        let Some((target_id, target_pos)) = target else {
            self.update(id, |row| {
                row.attrs.target_player = None;
                row.attrs.is_attacking = false;
            });
            return;
        };

        let (standoff, range, cooldown_ms) = match category {
            EntityCategory::SpitterZombie => {
                (SPITTER_STANDOFF, SPITTER_ATTACK_RANGE, SPITTER_COOLDOWN_MS)
            }
            _ => (ZOMBIE_REACH, ZOMBIE_ATTACK_RANGE, ZOMBIE_COOLDOWN_MS),
        };

        let to_target = target_pos - position;
        let dist = to_target.len();
        let new_position = if dist > standoff {
            position + to_target.clamp_len((ZOMBIE_SPEED * dt).min(dist - standoff))
        } else {
            position
        };

        let now = self.clock;
        let ready = self.next_attack.get(&id).map_or(true, |at| now >= *at);
        let attacking = ready && new_position.distance(target_pos) <= range;
        if attacking {
            self.next_attack
                .insert(id, now + chrono::Duration::milliseconds(cooldown_ms));
        }

        self.update(id, |row| {
            row.position = new_position;
            row.attrs.target_player = Some(target_id);
            row.attrs.is_attacking = attacking;
        });

        if attacking && category == EntityCategory::SpitterZombie {
            let expires_at = now + chrono::Duration::milliseconds(AOE_LIFETIME_MS);
            self.insert(
                EntityCategory::SpitterAoe,
                target_pos,
                EntityAttrs {
                    expires_at: Some(expires_at),
                    ..Default::default()
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{rngs::StdRng, SeedableRng};

    fn world() -> HordeWorld {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        HordeWorld::new(start)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn ids_are_unique_across_tables() {
        let mut w = world();
        let a = w.insert(EntityCategory::Zombie, Vec3::ZERO, EntityAttrs::default());
        let b = w.insert(EntityCategory::SpitterAoe, Vec3::ZERO, EntityAttrs::default());
        assert_ne!(a, b);
        assert_eq!(w.drain_changes().len(), 2);
        assert!(w.drain_changes().is_empty());
    }

    #[test]
    fn unchanged_update_is_not_published() {
        let mut w = world();
        let id = w.insert(EntityCategory::Zombie, Vec3::ZERO, EntityAttrs::default());
        w.drain_changes();
        assert!(!w.update(id, |row| row.position = Vec3::ZERO));
        assert!(w.update(id, |row| row.position = Vec3::new(1.0, 0.0, 0.0)));
        match w.drain_changes().as_slice() {
            [FeedMsg::Update { old, new }] => {
                assert_eq!(old.position, Vec3::ZERO);
                assert_eq!(new.position.x, 1.0);
            }
            other => panic!("unexpected changes: {other:?}"),
        }
    }

    #[test]
    fn no_spawns_without_players() {
        let mut w = world();
        let mut rng = rng();
        for _ in 0..20 {
            w.step(0.1, &mut rng);
        }
        assert!(w.is_empty());
    }

    #[test]
    fn spawner_fills_spawn_points_while_players_exist() {
        let mut w = world();
        let mut rng = rng();
        w.add_player("p");
        for _ in 0..10 {
            w.step(0.1, &mut rng);
        }
        let zombies = w.count(EntityCategory::Zombie) + w.count(EntityCategory::SpitterZombie);
        assert_eq!(zombies, 2);
    }

    #[test]
    fn zombie_walks_towards_player_and_stops_at_reach() {
        let mut w = world();
        w.set_spawning(false);
        let mut rng = rng();
        let player = w.add_player("p");
        let z = w.insert(
            EntityCategory::Zombie,
            Vec3::new(10.0, 0.0, 0.0),
            EntityAttrs::default(),
        );

        w.step(1.0, &mut rng);
        let row = w.get(z).unwrap();
        assert!((row.position.x - 7.0).abs() < 1e-9);
        assert_eq!(row.attrs.target_player, Some(player.0));

        for _ in 0..10 {
            w.step(1.0, &mut rng);
        }
        let row = w.get(z).unwrap();
        assert!((row.position.distance(Vec3::ZERO) - ZOMBIE_REACH).abs() < 1e-9);
    }

    #[test]
    fn spitters_do_not_count_towards_the_cap() {
        let mut w = world();
        let mut rng = rng();
        w.add_player("p");
        for _ in 0..MAX_ZOMBIES {
            w.insert(EntityCategory::SpitterZombie, Vec3::ZERO, EntityAttrs::default());
        }
        let walkers =
            |w: &HordeWorld| w.count(EntityCategory::Zombie) + w.count(EntityCategory::SpitterZombie);

        let before = walkers(&w);
        w.step(SPAWN_INTERVAL, &mut rng);
        assert_eq!(walkers(&w), before + 1);

        for _ in 0..MAX_ZOMBIES {
            w.insert(EntityCategory::Zombie, Vec3::ZERO, EntityAttrs::default());
        }
        let before = walkers(&w);
        w.step(SPAWN_INTERVAL, &mut rng);
        assert_eq!(walkers(&w), before);
    }

    #[test]
    fn zombie_bites_only_within_attack_range() {
        let mut w = world();
        w.set_spawning(false);
        let mut rng = rng();
        let player = w.add_player("p");
        let z = w.insert(
            EntityCategory::Zombie,
            Vec3::new(ZOMBIE_REACH, 0.0, 0.0),
            EntityAttrs::default(),
        );

        // Resting at reach is too far to bite.
        w.step(0.1, &mut rng);
        assert!(!w.get(z).unwrap().attrs.is_attacking);

        w.move_player(player, Vec3::new(ZOMBIE_REACH - 0.8, 0.0, 0.0));
        w.step(0.1, &mut rng);
        assert!(w.get(z).unwrap().attrs.is_attacking);
    }

    #[test]
    fn spitter_attack_drops_expiring_aoe() {
        let mut w = world();
        w.set_spawning(false);
        let mut rng = rng();
        let player = w.add_player("p");
        w.move_player(player, Vec3::new(0.0, 0.0, 5.0));
        let s = w.insert(
            EntityCategory::SpitterZombie,
            Vec3::ZERO,
            EntityAttrs::default(),
        );

        w.step(0.1, &mut rng);
        assert!(w.get(s).unwrap().attrs.is_attacking);
        assert_eq!(w.count(EntityCategory::SpitterAoe), 1);
        let pool = w
            .rows()
            .find(|r| r.category == EntityCategory::SpitterAoe)
            .unwrap();
        assert_eq!(
            pool.attrs.expires_at,
            Some(w.clock() + chrono::Duration::milliseconds(AOE_LIFETIME_MS))
        );

        // Cooldown holds off a second pool.
        w.step(0.1, &mut rng);
        assert!(!w.get(s).unwrap().attrs.is_attacking);
        assert_eq!(w.count(EntityCategory::SpitterAoe), 1);

        for _ in 0..30 {
            w.step(0.1, &mut rng);
        }
        let deletes = w
            .drain_changes()
            .into_iter()
            .filter(|c| matches!(c, FeedMsg::Delete(r) if r.category == EntityCategory::SpitterAoe))
            .count();
        assert!(deletes >= 1);
    }

    #[test]
    fn last_player_leaving_clears_world() {
        let mut w = world();
        let mut rng = rng();
        let a = w.add_player("a");
        let b = w.add_player("b");
        for _ in 0..5 {
            w.step(0.5, &mut rng);
        }
        w.remove_player(a);
        assert!(!w.is_empty());
        w.remove_player(b);
        assert!(w.is_empty());
    }

    #[test]
    fn move_player_ignores_non_players() {
        let mut w = world();
        let z = w.insert(EntityCategory::Zombie, Vec3::ZERO, EntityAttrs::default());
        assert!(!w.move_player(z, Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(w.get(z).unwrap().position, Vec3::ZERO);
    }
}
