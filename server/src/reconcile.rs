//! Animation reconciliation between the client's narration and the server's
//! armed cast state.
//!
//! `sync` is the validation path: a reported motion point outside the
//! definition rejects the event and the caller signals "cast failed" back to
//! the reporting session. `tick_sync` is the diagnostic path: it records the
//! server tick used for cooldown bookkeeping and compares the armed motion's
//! sequence name against whatever the player is currently playing; a
//! mismatch is logged and nothing else happens. Detection, not correction.

use crate::cast::SkillCast;
use log::warn;
use shared::Vec3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The motion report validated; observers should re-play this sequence.
    Applied { sequence_name: String },
    /// The report failed validation; the cast is unchanged and the caller
    /// sends a cast-failed notice to the reporting session.
    Rejected,
}

pub fn sync(
    cast: &mut SkillCast,
    motion_point: u8,
    position: Vec3,
    direction: Vec3,
    rotation: Vec3,
) -> SyncOutcome {
    if !cast.try_set_motion_index(motion_point) {
        warn!(
            "cast {}: sync rejected, motion point {} invalid for {} motions",
            cast.cast_uid(),
            motion_point,
            cast.definition().motions.len()
        );
        return SyncOutcome::Rejected;
    }

    cast.set_pose(position, direction, rotation);
    let sequence_name = cast
        .motion()
        .map(|motion| motion.sequence_name.clone())
        .unwrap_or_default();
    SyncOutcome::Applied { sequence_name }
}

/// Records the reported server tick and checks the armed motion against the
/// player's currently playing sequence. Returns true when they agree.
pub fn tick_sync(cast: &mut SkillCast, server_tick: i32, current_sequence: Option<&str>) -> bool {
    cast.set_server_tick(server_tick);

    let Some(motion) = cast.motion() else {
        // Nothing armed yet; nothing to compare.
        return true;
    };

    match current_sequence {
        Some(playing) if playing == motion.sequence_name => true,
        Some(playing) => {
            warn!(
                "cast {}: desync detected, armed sequence {:?}, playing {:?}",
                cast.cast_uid(),
                motion.sequence_name,
                playing
            );
            false
        }
        None => {
            warn!(
                "cast {}: desync detected, armed sequence {:?}, nothing playing",
                cast.cast_uid(),
                motion.sequence_name
            );
            false
        }
    }
}
