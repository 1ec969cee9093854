//! Target resolution for the three attack sub-protocols.
//!
//! `Point` is a preview wave: the chained combo entries are surfaced for
//! progress broadcasting and never touch the cast's target set. `Target`
//! resolves client-reported identifiers against the field index selected by
//! the attack's policy, tolerating bad input: unresolvable identifiers are
//! skipped, duplicates are ignored, and batches beyond the attack's limit
//! are clamped with a warning rather than failed. `Splash` defers to the
//! field tick, which runs the same policy/limit rules over an area query.

use crate::cast::SkillCast;
use crate::field::FieldIndices;
use crate::metadata::Attack;
use log::{debug, warn};
use shared::protocol::TargetRecord;
use shared::Vec3;

/// Collects the reported combo chain for progress broadcasting.
///
/// Point waves re-use the cast uid across repeated button holds; nothing
/// here mutates the cast.
pub fn resolve_point(records: &[TargetRecord]) -> Vec<i32> {
    records.iter().map(|record| record.target_id).collect()
}

/// Resolves a reported target batch into the cast's target set.
///
/// Returns the identifiers newly inserted this wave, in report order. The
/// total set never exceeds `attack.target_count`.
pub fn resolve_targets(
    attack: &Attack,
    requested: &[i32],
    indices: &FieldIndices,
    cast: &mut SkillCast,
) -> Vec<i32> {
    let limit = attack.target_count as usize;
    if requested.len() > limit {
        warn!(
            "cast {}: {} targets reported, limit {}, clamping batch",
            cast.cast_uid(),
            requested.len(),
            limit
        );
    }

    let mut resolved = Vec::new();
    for &target_id in requested.iter().take(limit) {
        if cast.target_count() >= limit {
            break;
        }
        if cast.has_target(target_id) {
            continue;
        }
        match indices.resolve(attack.policy, target_id) {
            Some(handle) => {
                cast.record_target(target_id, handle);
                resolved.push(target_id);
            }
            None => {
                debug!(
                    "cast {}: target {} not present in {:?} index, skipped",
                    cast.cast_uid(),
                    target_id,
                    attack.policy
                );
            }
        }
    }
    resolved
}

/// Resolves an area query around `center` into the cast's target set,
/// applying the same policy and limit rules as a reported batch.
pub fn resolve_area(
    attack: &Attack,
    center: Vec3,
    indices: &FieldIndices,
    cast: &mut SkillCast,
) -> Vec<i32> {
    let limit = attack.target_count as usize;
    let mut resolved = Vec::new();
    for (target_id, handle) in indices.within_radius(attack.policy, center, attack.area_radius) {
        if cast.target_count() >= limit {
            debug!(
                "cast {}: area hit limit {} inside radius {}",
                cast.cast_uid(),
                limit,
                attack.area_radius
            );
            break;
        }
        if cast.record_target(target_id, handle) {
            resolved.push(target_id);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::TargetCategory;
    use crate::field::FieldEntity;
    use crate::metadata::{default_table, TargetPolicy};

    fn hostile(target_id: i32, x: f32) -> FieldEntity {
        FieldEntity {
            target_id,
            object_uid: 9000 + target_id as i64,
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    fn test_indices() -> FieldIndices {
        let mut indices = FieldIndices::new();
        indices.insert(TargetCategory::Hostile, hostile(10, 1.0));
        indices.insert(TargetCategory::Hostile, hostile(11, 2.0));
        indices.insert(TargetCategory::Hostile, hostile(12, 3.0));
        indices.insert(TargetCategory::Hostile, hostile(13, 50.0));
        indices
    }

    fn test_cast() -> SkillCast {
        let table = default_table();
        let mut cast = SkillCast::new(55, table.get(100201, 1).unwrap());
        assert!(cast.try_set_attack_index(0));
        cast
    }

    #[test]
    fn test_point_never_mutates_target_set() {
        let cast = test_cast();
        let records = vec![
            TargetRecord {
                uid: 1,
                target_id: 10,
                prev_uid: None,
                index: 0,
            },
            TargetRecord {
                uid: 2,
                target_id: 11,
                prev_uid: Some(1),
                index: 0,
            },
        ];

        let ids = resolve_point(&records);
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(cast.target_count(), 0);
    }

    #[test]
    fn test_target_batch_clamped_to_limit() {
        let indices = test_indices();
        let mut cast = test_cast();
        let attack = cast.attack().unwrap().clone();

        let resolved = resolve_targets(&attack, &[10, 11, 12, 13], &indices, &mut cast);
        assert_eq!(resolved, vec![10, 11, 12]);
        assert_eq!(cast.target_count(), 3);
        assert!(!cast.has_target(13));
    }

    #[test]
    fn test_unresolvable_targets_skipped() {
        let indices = test_indices();
        let mut cast = test_cast();
        let attack = cast.attack().unwrap().clone();

        let resolved = resolve_targets(&attack, &[99, 10], &indices, &mut cast);
        assert_eq!(resolved, vec![10]);
        assert_eq!(cast.target_count(), 1);
    }

    #[test]
    fn test_duplicate_targets_ignored_across_waves() {
        let indices = test_indices();
        let mut cast = test_cast();
        let attack = cast.attack().unwrap().clone();

        assert_eq!(
            resolve_targets(&attack, &[10, 11], &indices, &mut cast),
            vec![10, 11]
        );
        assert_eq!(
            resolve_targets(&attack, &[11, 12], &indices, &mut cast),
            vec![12]
        );
        assert_eq!(cast.target_count(), 3);
    }

    #[test]
    fn test_wrong_policy_index_resolves_nothing() {
        let indices = test_indices();
        let table = default_table();
        // 200101 targets the friendly index; only hostiles are registered.
        let mut cast = SkillCast::new(56, table.get(200101, 1).unwrap());
        assert!(cast.try_set_attack_index(0));
        let attack = cast.attack().unwrap().clone();
        assert_eq!(attack.policy, TargetPolicy::Friendly);

        let resolved = resolve_targets(&attack, &[10, 11], &indices, &mut cast);
        assert!(resolved.is_empty());
        assert_eq!(cast.target_count(), 0);
    }

    #[test]
    fn test_area_resolution_respects_radius_and_limit() {
        let indices = test_indices();
        let table = default_table();
        let mut cast = SkillCast::new(57, table.get(100300, 1).unwrap());
        assert!(cast.try_set_attack_index(0));
        let attack = cast.attack().unwrap().clone();
        assert_eq!(attack.area_radius, 5.0);

        let mut resolved = resolve_area(&attack, Vec3::default(), &indices, &mut cast);
        resolved.sort_unstable();
        // Target 13 sits at x=50, outside the 5.0 radius.
        assert_eq!(resolved, vec![10, 11, 12]);
    }
}
