//! Field state and the single-mutator field task.
//!
//! A field is one world partition: its entity indices, the per-player cast
//! registries, the list of pending area skills, and the authoritative tick
//! counter. All of it is owned by one task; sessions reach it exclusively
//! through the [`FieldCommand`] queue, so after a splash registration the
//! tick loop is the sole mutator of any cast and no per-cast locking exists.

use crate::broadcast::ObserverBroadcaster;
use crate::cast::{EntityHandle, TargetCategory};
use crate::handler::{self, HandlerContext};
use crate::metadata::{SkillTable, TargetPolicy};
use crate::registry::CastRegistry;
use crate::targeting;
use log::{debug, info, warn};
use shared::{Packet, SkillCommand, Vec3};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// An entity addressable by the targeting layer.
#[derive(Debug, Clone)]
pub struct FieldEntity {
    pub target_id: i32,
    pub object_uid: i64,
    pub position: Vec3,
}

/// Per-category entity indices a target identifier is resolved against.
#[derive(Default)]
pub struct FieldIndices {
    hostiles: HashMap<i32, FieldEntity>,
    players: HashMap<i32, FieldEntity>,
    scavengers: HashMap<i32, FieldEntity>,
}

impl FieldIndices {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, category: TargetCategory) -> &HashMap<i32, FieldEntity> {
        match category {
            TargetCategory::Hostile => &self.hostiles,
            TargetCategory::Friendly => &self.players,
            TargetCategory::Scavenger => &self.scavengers,
        }
    }

    fn index_mut(&mut self, category: TargetCategory) -> &mut HashMap<i32, FieldEntity> {
        match category {
            TargetCategory::Hostile => &mut self.hostiles,
            TargetCategory::Friendly => &mut self.players,
            TargetCategory::Scavenger => &mut self.scavengers,
        }
    }

    fn category_for(policy: TargetPolicy) -> TargetCategory {
        match policy {
            TargetPolicy::Hostile => TargetCategory::Hostile,
            TargetPolicy::Friendly => TargetCategory::Friendly,
            TargetPolicy::ScavengerPool => TargetCategory::Scavenger,
        }
    }

    pub fn insert(&mut self, category: TargetCategory, entity: FieldEntity) {
        self.index_mut(category).insert(entity.target_id, entity);
    }

    pub fn remove(&mut self, category: TargetCategory, target_id: i32) -> Option<FieldEntity> {
        self.index_mut(category).remove(&target_id)
    }

    /// Looks a reported identifier up in the index the attack's policy
    /// selects. `None` means the entity is unknown there; the resolver
    /// skips it rather than erroring.
    pub fn resolve(&self, policy: TargetPolicy, target_id: i32) -> Option<EntityHandle> {
        let category = Self::category_for(policy);
        self.index(category).get(&target_id).map(|entity| EntityHandle {
            category,
            object_uid: entity.object_uid,
        })
    }

    /// Entities of the policy's category inside `radius` of `center`.
    pub fn within_radius(
        &self,
        policy: TargetPolicy,
        center: Vec3,
        radius: f32,
    ) -> Vec<(i32, EntityHandle)> {
        let category = Self::category_for(policy);
        let radius_squared = radius * radius;
        self.index(category)
            .values()
            .filter(|entity| entity.position.distance_squared(&center) <= radius_squared)
            .map(|entity| {
                (
                    entity.target_id,
                    EntityHandle {
                        category,
                        object_uid: entity.object_uid,
                    },
                )
            })
            .collect()
    }

    pub fn len(&self, category: TargetCategory) -> usize {
        self.index(category).len()
    }
}

/// Everything the field tracks about one player in it.
pub struct PlayerContext {
    pub session_id: u32,
    pub addr: SocketAddr,
    pub registry: CastRegistry,
    pub position: Vec3,
    /// Sequence name of the animation the player is currently playing,
    /// compared against armed motions by tick-sync desync detection.
    pub current_sequence: Option<String>,
}

/// A splash registration awaiting deferred resolution on a later tick.
#[derive(Debug, Clone)]
pub struct AreaSkill {
    pub owner: u32,
    pub cast_uid: i64,
    pub attack_point: u8,
    pub position: Vec3,
    pub rotation: Vec3,
    pub resolve_tick: i32,
}

/// Commands routed into the field task.
#[derive(Debug)]
pub enum FieldCommand {
    Join { session_id: u32, addr: SocketAddr },
    Leave { session_id: u32 },
    Skill { session_id: u32, command: SkillCommand },
}

pub struct Field {
    field_id: u32,
    tick: i32,
    table: Arc<SkillTable>,
    players: HashMap<u32, PlayerContext>,
    indices: FieldIndices,
    area_skills: Vec<AreaSkill>,
    broadcaster: ObserverBroadcaster,
}

impl Field {
    pub fn new(field_id: u32, table: Arc<SkillTable>, broadcaster: ObserverBroadcaster) -> Self {
        Self {
            field_id,
            tick: 0,
            table,
            players: HashMap::new(),
            indices: FieldIndices::new(),
            area_skills: Vec::new(),
            broadcaster,
        }
    }

    pub fn field_id(&self) -> u32 {
        self.field_id
    }

    pub fn tick_count(&self) -> i32 {
        self.tick
    }

    pub fn player(&self, session_id: u32) -> Option<&PlayerContext> {
        self.players.get(&session_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn pending_area_skills(&self) -> usize {
        self.area_skills.len()
    }

    pub fn insert_entity(&mut self, category: TargetCategory, entity: FieldEntity) {
        self.indices.insert(category, entity);
    }

    pub fn remove_entity(&mut self, category: TargetCategory, target_id: i32) {
        self.indices.remove(category, target_id);
    }

    pub fn observer_addrs(&self) -> Vec<SocketAddr> {
        self.players.values().map(|player| player.addr).collect()
    }

    pub fn apply(&mut self, command: FieldCommand) {
        match command {
            FieldCommand::Join { session_id, addr } => self.join(session_id, addr),
            FieldCommand::Leave { session_id } => self.leave(session_id),
            FieldCommand::Skill {
                session_id,
                command,
            } => self.handle_skill(session_id, command),
        }
    }

    fn join(&mut self, session_id: u32, addr: SocketAddr) {
        info!("session {} joined field {}", session_id, self.field_id);
        self.players.insert(
            session_id,
            PlayerContext {
                session_id,
                addr,
                registry: CastRegistry::new(),
                position: Vec3::default(),
                current_sequence: None,
            },
        );
        // Players are addressable by friendly-policy attacks.
        self.indices.insert(
            TargetCategory::Friendly,
            FieldEntity {
                target_id: session_id as i32,
                object_uid: session_id as i64,
                position: Vec3::default(),
            },
        );
    }

    fn leave(&mut self, session_id: u32) {
        let Some(mut player) = self.players.remove(&session_id) else {
            return;
        };
        let dropped = player.registry.drain();
        if !dropped.is_empty() {
            debug!(
                "session {} left field {} with {} casts in flight",
                session_id,
                self.field_id,
                dropped.len()
            );
        }
        self.indices.remove(TargetCategory::Friendly, session_id as i32);
        self.area_skills.retain(|area| area.owner != session_id);
        info!("session {} left field {}", session_id, self.field_id);
    }

    fn handle_skill(&mut self, session_id: u32, command: SkillCommand) {
        let observers = self.observer_addrs();
        let Field {
            players,
            indices,
            area_skills,
            broadcaster,
            table,
            tick,
            ..
        } = self;
        let Some(player) = players.get_mut(&session_id) else {
            warn!(
                "skill command from session {} which is not in the field",
                session_id
            );
            return;
        };
        let mut env = HandlerContext {
            table: table.as_ref(),
            indices,
            area_skills,
            broadcaster,
            observers: &observers,
            server_tick: *tick,
        };
        handler::handle_command(&mut env, player, command);
    }

    /// Advances the field one tick: pending area skills whose deadline has
    /// arrived resolve now, and held casts past their state deadline advance
    /// their phase.
    pub fn tick(&mut self) {
        self.tick += 1;
        self.resolve_area_skills();
        self.advance_state_skills();

        if self.tick % 100 == 0 && !self.players.is_empty() {
            debug!(
                "field {}: tick {}, {} players, {} pending area skills",
                self.field_id,
                self.tick,
                self.players.len(),
                self.area_skills.len()
            );
        }
    }

    fn resolve_area_skills(&mut self) {
        if self.area_skills.is_empty() {
            return;
        }
        let tick = self.tick;
        let observers = self.observer_addrs();
        let due: Vec<AreaSkill> = {
            let (due, pending) = self
                .area_skills
                .drain(..)
                .partition(|area| area.resolve_tick <= tick);
            self.area_skills = pending;
            due
        };

        for area in due {
            // Owner or cast may be gone by the time the deadline arrives;
            // both are dropped with the same silence as a stale packet.
            let Some(player) = self.players.get_mut(&area.owner) else {
                continue;
            };
            let Some(cast) = player.registry.get_mut(area.cast_uid) else {
                continue;
            };
            let Some(attack) = cast.attack().cloned() else {
                continue;
            };

            let targets = targeting::resolve_area(&attack, area.position, &self.indices, cast);
            cast.complete();
            player.registry.end(area.cast_uid);

            debug!(
                "field {}: cast {} splash resolved {} targets at tick {}",
                self.field_id,
                area.cast_uid,
                targets.len(),
                tick
            );
            self.broadcaster.broadcast(
                Packet::SkillDamage {
                    caster: area.owner,
                    cast_uid: area.cast_uid,
                    attack_point: area.attack_point,
                    targets,
                },
                &observers,
                None,
            );
        }
    }

    fn advance_state_skills(&mut self) {
        let tick = self.tick;
        let due: Vec<(u32, i64)> = self
            .players
            .iter()
            .flat_map(|(session_id, player)| {
                player
                    .registry
                    .due_state_casts(tick)
                    .into_iter()
                    .map(move |cast_uid| (*session_id, cast_uid))
            })
            .collect();

        if due.is_empty() {
            return;
        }
        let observers = self.observer_addrs();

        for (session_id, cast_uid) in due {
            let Some(player) = self.players.get_mut(&session_id) else {
                continue;
            };
            let Some(cast) = player.registry.get_mut(cast_uid) else {
                continue;
            };

            let phase = cast.advance_state_phase();
            let definition = cast.definition().clone();
            if phase as usize >= definition.motions.len() {
                // Past the last motion the held cast resolves naturally.
                cast.complete();
                player.registry.end(cast_uid);
                debug!(
                    "field {}: cast {} state phase ran out, resolved",
                    self.field_id, cast_uid
                );
                continue;
            }

            let position = cast.position();
            let direction = cast.direction();
            self.broadcaster.broadcast(
                Packet::SkillUse {
                    caster: session_id,
                    cast_uid,
                    skill_id: definition.skill_id,
                    level: definition.level,
                    motion_point: phase,
                    position,
                    direction,
                },
                &observers,
                None,
            );
        }
    }
}

/// Runs a field to completion: applies queued commands as they arrive and
/// fires the tick at a fixed rate. The task owns the field; dropping the
/// command sender stops it.
pub async fn run_field(
    mut field: Field,
    mut commands: mpsc::UnboundedReceiver<FieldCommand>,
    tick_duration: Duration,
) {
    let mut tick_interval = interval(tick_duration);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the first tick since it fires immediately.
    tick_interval.tick().await;

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(command) => field.apply(command),
                    None => {
                        info!("field {} command channel closed, stopping", field.field_id());
                        break;
                    }
                }
            }
            _ = tick_interval.tick() => {
                field.tick();
            }
        }
    }
}
