//! Per-player collection of live casts.
//!
//! One registry exists per connected player. An entry is created when a
//! `Use` command begins a cast and removed on cancellation, natural
//! completion, or session/field teardown, never silently replaced: a `Use`
//! that re-reports a live cast uid is a `DuplicateCast` error, and a lookup
//! miss means a stale or forged packet that the caller silently discards.

use crate::cast::SkillCast;
use crate::metadata::SkillDefinition;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CastError {
    #[error("cast {0} is already live")]
    DuplicateCast(i64),
    #[error("skill {0} level {1} has no definition")]
    UnknownSkill(i32, i16),
}

#[derive(Default)]
pub struct CastRegistry {
    casts: HashMap<i64, SkillCast>,
}

impl CastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and stores a new cast in `Initiated` state.
    pub fn begin(
        &mut self,
        cast_uid: i64,
        definition: Arc<SkillDefinition>,
    ) -> Result<&mut SkillCast, CastError> {
        if self.casts.contains_key(&cast_uid) {
            return Err(CastError::DuplicateCast(cast_uid));
        }
        debug!(
            "cast {} begun for skill {} level {}",
            cast_uid, definition.skill_id, definition.level
        );
        Ok(self
            .casts
            .entry(cast_uid)
            .or_insert_with(|| SkillCast::new(cast_uid, definition)))
    }

    pub fn get(&self, cast_uid: i64) -> Option<&SkillCast> {
        self.casts.get(&cast_uid)
    }

    pub fn get_mut(&mut self, cast_uid: i64) -> Option<&mut SkillCast> {
        self.casts.get_mut(&cast_uid)
    }

    /// Removes the entry; removing an absent uid is a no-op.
    pub fn end(&mut self, cast_uid: i64) -> Option<SkillCast> {
        let removed = self.casts.remove(&cast_uid);
        if removed.is_some() {
            debug!("cast {} ended", cast_uid);
        }
        removed
    }

    /// Tears down every live cast, returning them for final bookkeeping.
    pub fn drain(&mut self) -> Vec<SkillCast> {
        self.casts.drain().map(|(_, cast)| cast).collect()
    }

    /// Cast uids whose state-skill deadline has arrived at `tick`.
    pub fn due_state_casts(&self, tick: i32) -> Vec<i64> {
        self.casts
            .values()
            .filter(|cast| matches!(cast.state_next_tick(), Some(due) if due <= tick))
            .map(|cast| cast.cast_uid())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.casts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.casts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::default_table;

    fn definition() -> Arc<SkillDefinition> {
        default_table().get(100201, 1).unwrap()
    }

    #[test]
    fn test_begin_then_get() {
        let mut registry = CastRegistry::new();
        registry.begin(55, definition()).unwrap();

        let cast = registry.get(55).unwrap();
        assert_eq!(cast.cast_uid(), 55);
        assert_eq!(cast.motion_index(), None);
        assert_eq!(cast.attack_index(), None);
    }

    #[test]
    fn test_duplicate_begin_rejected() {
        let mut registry = CastRegistry::new();
        registry.begin(55, definition()).unwrap();

        let err = registry.begin(55, definition()).unwrap_err();
        assert_eq!(err, CastError::DuplicateCast(55));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_absent_is_none() {
        let registry = CastRegistry::new();
        assert!(registry.get(999).is_none());
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut registry = CastRegistry::new();
        registry.begin(55, definition()).unwrap();

        assert!(registry.end(55).is_some());
        assert!(registry.end(55).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_clears_all() {
        let mut registry = CastRegistry::new();
        registry.begin(1, definition()).unwrap();
        registry.begin(2, definition()).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_due_state_casts() {
        let mut registry = CastRegistry::new();
        registry.begin(1, definition()).unwrap();
        registry.begin(2, definition()).unwrap();
        registry.get_mut(1).unwrap().set_state_next_tick(Some(10));
        registry.get_mut(2).unwrap().set_state_next_tick(Some(20));

        assert_eq!(registry.due_state_casts(9), Vec::<i64>::new());
        assert_eq!(registry.due_state_casts(10), vec![1]);
        let mut due = registry.due_state_casts(25);
        due.sort_unstable();
        assert_eq!(due, vec![1, 2]);
    }
}
