//! Per-cast state machine.
//!
//! A `SkillCast` holds the server-validated view of one in-flight skill use:
//! which motion and attack the client has legitimately reached, the last
//! reported pose, and the accumulating set of resolved targets. The motion
//! and attack indices are independent tracks (held and combo skills arm the
//! attack track without ever passing through a motion report), and each may
//! be set at most once per cast, idempotently re-reportable with the same
//! value.

use crate::metadata::{Attack, Motion, SkillDefinition};
use shared::Vec3;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastState {
    Initiated,
    MotionArmed,
    AttackArmed,
    Resolved,
    Cancelled,
}

/// Entity category an index lookup resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetCategory {
    Hostile,
    Friendly,
    Scavenger,
}

/// Handle to an entity in one of the field's category indices.
///
/// Entities leave the field independently of any cast that recorded them, so
/// the handle is re-validated against the index when it is consumed; a
/// departed entity simply fails the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHandle {
    pub category: TargetCategory,
    pub object_uid: i64,
}

#[derive(Debug)]
pub struct SkillCast {
    cast_uid: i64,
    definition: Arc<SkillDefinition>,
    state: CastState,
    motion_index: Option<u8>,
    attack_index: Option<u8>,
    server_tick: i32,
    position: Vec3,
    direction: Vec3,
    rotation: Vec3,
    targets: HashMap<i32, EntityHandle>,
    item_uid: Option<i64>,
    state_next_tick: Option<i32>,
    state_phase: u8,
}

impl SkillCast {
    pub fn new(cast_uid: i64, definition: Arc<SkillDefinition>) -> Self {
        Self {
            cast_uid,
            definition,
            state: CastState::Initiated,
            motion_index: None,
            attack_index: None,
            server_tick: 0,
            position: Vec3::default(),
            direction: Vec3::default(),
            rotation: Vec3::default(),
            targets: HashMap::new(),
            item_uid: None,
            state_next_tick: None,
            state_phase: 0,
        }
    }

    pub fn cast_uid(&self) -> i64 {
        self.cast_uid
    }

    pub fn definition(&self) -> &Arc<SkillDefinition> {
        &self.definition
    }

    pub fn state(&self) -> CastState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, CastState::Resolved | CastState::Cancelled)
    }

    pub fn motion_index(&self) -> Option<u8> {
        self.motion_index
    }

    pub fn attack_index(&self) -> Option<u8> {
        self.attack_index
    }

    /// The armed motion entry, if the motion track has been armed.
    pub fn motion(&self) -> Option<&Motion> {
        self.motion_index
            .and_then(|i| self.definition.motions.get(i as usize))
    }

    /// The armed attack entry, if the attack track has been armed.
    pub fn attack(&self) -> Option<&Attack> {
        self.attack_index
            .and_then(|i| self.definition.attacks.get(i as usize))
    }

    /// Arms the motion track with a validated index.
    ///
    /// Fails without mutating the cast when the index is out of bounds, when
    /// the cast is already terminal, or when a different index was armed
    /// earlier. Re-reporting the armed index succeeds and changes nothing.
    pub fn try_set_motion_index(&mut self, index: u8) -> bool {
        if self.is_terminal() {
            return false;
        }
        if index as usize >= self.definition.motions.len() {
            return false;
        }
        match self.motion_index {
            Some(armed) => armed == index,
            None => {
                self.motion_index = Some(index);
                if self.state == CastState::Initiated {
                    self.state = CastState::MotionArmed;
                }
                true
            }
        }
    }

    /// Arms the attack track with a validated index.
    ///
    /// Same contract as [`Self::try_set_motion_index`] against the attack
    /// list; the attack track has no ordering dependency on the motion
    /// track.
    pub fn try_set_attack_index(&mut self, index: u8) -> bool {
        if self.is_terminal() {
            return false;
        }
        if index as usize >= self.definition.attacks.len() {
            return false;
        }
        match self.attack_index {
            Some(armed) => armed == index,
            None => {
                self.attack_index = Some(index);
                self.state = CastState::AttackArmed;
                true
            }
        }
    }

    pub fn server_tick(&self) -> i32 {
        self.server_tick
    }

    pub fn set_server_tick(&mut self, tick: i32) {
        self.server_tick = tick;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn set_pose(&mut self, position: Vec3, direction: Vec3, rotation: Vec3) {
        self.position = position;
        self.direction = direction;
        self.rotation = rotation;
    }

    pub fn item_uid(&self) -> Option<i64> {
        self.item_uid
    }

    pub fn set_item_uid(&mut self, item_uid: Option<i64>) {
        self.item_uid = item_uid;
    }

    /// Records a resolved target. Returns false if the identifier is already
    /// present (idempotent insert).
    pub fn record_target(&mut self, target_id: i32, handle: EntityHandle) -> bool {
        if self.targets.contains_key(&target_id) {
            return false;
        }
        self.targets.insert(target_id, handle);
        true
    }

    pub fn has_target(&self, target_id: i32) -> bool {
        self.targets.contains_key(&target_id)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> &HashMap<i32, EntityHandle> {
        &self.targets
    }

    pub fn state_next_tick(&self) -> Option<i32> {
        self.state_next_tick
    }

    pub fn set_state_next_tick(&mut self, tick: Option<i32>) {
        self.state_next_tick = tick;
    }

    pub fn state_phase(&self) -> u8 {
        self.state_phase
    }

    /// Advances the state-skill phase after its deadline tick arrived.
    /// Clears the deadline; the new phase is reported back for broadcast.
    pub fn advance_state_phase(&mut self) -> u8 {
        self.state_phase = self.state_phase.saturating_add(1);
        self.state_next_tick = None;
        self.state_phase
    }

    pub fn cancel(&mut self) {
        self.state = CastState::Cancelled;
    }

    pub fn complete(&mut self) {
        self.state = CastState::Resolved;
    }
}
