//! One handler per inbound skill command.
//!
//! Handlers run inside the field task against an explicit [`HandlerContext`]
//! and the acting player's [`PlayerContext`]. The error posture is uniform:
//! an unknown cast uid means a stale or forged packet and is silently
//! discarded; an out-of-range index rejects the single event and leaves the
//! cast unchanged; nothing in here panics or disconnects anyone.

use crate::broadcast::ObserverBroadcaster;
use crate::field::{AreaSkill, FieldIndices, PlayerContext};
use crate::metadata::SkillTable;
use crate::reconcile::{self, SyncOutcome};
use crate::registry::CastError;
use crate::targeting;
use log::{debug, warn};
use shared::protocol::{
    AttackPointCommand, AttackSplashCommand, AttackTargetCommand, SyncCommand, UseCommand,
};
use shared::{Packet, SkillCommand};
use std::net::SocketAddr;

/// Ticks a held cast waits before its state phase auto-advances.
const HOLD_PHASE_TICKS: i32 = 30;

/// Field-owned collaborators a handler works against.
pub struct HandlerContext<'a> {
    pub table: &'a SkillTable,
    pub indices: &'a FieldIndices,
    pub area_skills: &'a mut Vec<AreaSkill>,
    pub broadcaster: &'a ObserverBroadcaster,
    pub observers: &'a [SocketAddr],
    pub server_tick: i32,
}

pub fn handle_command(env: &mut HandlerContext, player: &mut PlayerContext, command: SkillCommand) {
    match command {
        SkillCommand::Use(cmd) => handle_use(env, player, cmd),
        SkillCommand::AttackPoint(cmd) => handle_attack_point(env, player, cmd),
        SkillCommand::AttackTarget(cmd) => handle_attack_target(env, player, cmd),
        SkillCommand::AttackSplash(cmd) => handle_attack_splash(env, player, cmd),
        SkillCommand::Sync(cmd) => handle_sync(env, player, cmd),
        SkillCommand::TickSync {
            cast_uid,
            server_tick,
        } => handle_tick_sync(player, cast_uid, server_tick),
        SkillCommand::Cancel { cast_uid } => handle_cancel(env, player, cast_uid),
    }
}

fn handle_use(env: &mut HandlerContext, player: &mut PlayerContext, cmd: UseCommand) {
    let Some(definition) = env.table.get(cmd.skill_id, cmd.level) else {
        warn!(
            "session {}: use rejected, {}",
            player.session_id,
            CastError::UnknownSkill(cmd.skill_id, cmd.level)
        );
        env.broadcaster.send_to(
            Packet::SkillCastFailed {
                cast_uid: cmd.cast_uid,
            },
            player.addr,
        );
        return;
    };

    // Validate the reported motion point before a cast exists, so a bad
    // report leaves no registry entry behind.
    if cmd.motion_point as usize >= definition.motions.len() {
        warn!(
            "session {}: use rejected, motion point {} out of range for skill {}",
            player.session_id, cmd.motion_point, cmd.skill_id
        );
        env.broadcaster.send_to(
            Packet::SkillCastFailed {
                cast_uid: cmd.cast_uid,
            },
            player.addr,
        );
        return;
    }
    let sequence_name = definition.motions[cmd.motion_point as usize]
        .sequence_name
        .clone();

    let cast = match player.registry.begin(cmd.cast_uid, definition) {
        Ok(cast) => cast,
        Err(err) => {
            warn!("session {}: use rejected, {}", player.session_id, err);
            env.broadcaster.send_to(
                Packet::SkillCastFailed {
                    cast_uid: cmd.cast_uid,
                },
                player.addr,
            );
            return;
        }
    };

    let armed = cast.try_set_motion_index(cmd.motion_point);
    debug_assert!(armed, "motion point validated against the definition");
    cast.set_server_tick(cmd.server_tick);
    cast.set_pose(cmd.position, cmd.direction, cmd.rotation);
    cast.set_item_uid((cmd.item_uid != 0).then_some(cmd.item_uid));
    if cmd.is_hold {
        cast.set_state_next_tick(Some(env.server_tick + HOLD_PHASE_TICKS));
    }

    player.position = cmd.position;
    player.current_sequence = Some(sequence_name);

    env.broadcaster.broadcast(
        Packet::SkillUse {
            caster: player.session_id,
            cast_uid: cmd.cast_uid,
            skill_id: cmd.skill_id,
            level: cmd.level,
            motion_point: cmd.motion_point,
            position: cmd.position,
            direction: cmd.direction,
        },
        env.observers,
        None,
    );
}

fn handle_attack_point(
    env: &mut HandlerContext,
    player: &mut PlayerContext,
    cmd: AttackPointCommand,
) {
    let caster = player.session_id;
    let Some(cast) = player.registry.get_mut(cmd.cast_uid) else {
        debug!(
            "session {}: attack point for unknown cast {}, dropped",
            caster, cmd.cast_uid
        );
        return;
    };

    if !cast.try_set_attack_index(cmd.attack_point) {
        warn!(
            "session {}: attack point {} invalid for cast {}",
            caster, cmd.attack_point, cmd.cast_uid
        );
        return;
    }

    let rotation = cast.rotation();
    cast.set_pose(cmd.position, cmd.direction, rotation);

    // Preview wave only: the chain is surfaced to observers and the target
    // set stays untouched.
    let targets = targeting::resolve_point(&cmd.targets);
    env.broadcaster.broadcast(
        Packet::SkillDamage {
            caster,
            cast_uid: cmd.cast_uid,
            attack_point: cmd.attack_point,
            targets,
        },
        env.observers,
        None,
    );
}

fn handle_attack_target(
    env: &mut HandlerContext,
    player: &mut PlayerContext,
    cmd: AttackTargetCommand,
) {
    let caster = player.session_id;
    let Some(cast) = player.registry.get_mut(cmd.cast_uid) else {
        debug!(
            "session {}: attack target for unknown cast {}, dropped",
            caster, cmd.cast_uid
        );
        return;
    };

    if !cast.try_set_attack_index(cmd.attack_point) {
        warn!(
            "session {}: attack point {} invalid for cast {}",
            caster, cmd.attack_point, cmd.cast_uid
        );
        return;
    }
    let Some(attack) = cast.attack().cloned() else {
        return;
    };

    let targets = targeting::resolve_targets(&attack, &cmd.target_ids, env.indices, cast);
    env.broadcaster.broadcast(
        Packet::SkillDamage {
            caster,
            cast_uid: cmd.cast_uid,
            attack_point: cmd.attack_point,
            targets,
        },
        env.observers,
        None,
    );
}

fn handle_attack_splash(
    env: &mut HandlerContext,
    player: &mut PlayerContext,
    cmd: AttackSplashCommand,
) {
    let caster = player.session_id;
    let Some(cast) = player.registry.get_mut(cmd.cast_uid) else {
        debug!(
            "session {}: splash for unknown cast {}, dropped",
            caster, cmd.cast_uid
        );
        return;
    };

    if !cast.try_set_attack_index(cmd.attack_point) {
        warn!(
            "session {}: attack point {} invalid for cast {}",
            caster, cmd.attack_point, cmd.cast_uid
        );
        return;
    }

    let direction = cast.direction();
    cast.set_pose(cmd.position, direction, cmd.rotation);

    env.area_skills.push(AreaSkill {
        owner: caster,
        cast_uid: cmd.cast_uid,
        attack_point: cmd.attack_point,
        position: cmd.position,
        rotation: cmd.rotation,
        resolve_tick: env.server_tick + 1,
    });
    debug!(
        "session {}: cast {} splash registered for tick {}",
        caster,
        cmd.cast_uid,
        env.server_tick + 1
    );

    // Observers see the area placement immediately; the damage wave follows
    // once the field tick resolves it.
    env.broadcaster.broadcast(
        Packet::SkillDamage {
            caster,
            cast_uid: cmd.cast_uid,
            attack_point: cmd.attack_point,
            targets: Vec::new(),
        },
        env.observers,
        None,
    );
}

fn handle_sync(env: &mut HandlerContext, player: &mut PlayerContext, cmd: SyncCommand) {
    let caster = player.session_id;
    let Some(cast) = player.registry.get_mut(cmd.cast_uid) else {
        debug!(
            "session {}: sync for unknown cast {}, dropped",
            caster, cmd.cast_uid
        );
        return;
    };

    match reconcile::sync(cast, cmd.motion_point, cmd.position, cmd.direction, cmd.rotation) {
        SyncOutcome::Applied { sequence_name } => {
            player.position = cmd.position;
            player.current_sequence = Some(sequence_name);
            env.broadcaster.broadcast(
                Packet::SkillSync {
                    caster,
                    cast_uid: cmd.cast_uid,
                    skill_id: cmd.skill_id,
                    motion_point: cmd.motion_point,
                },
                env.observers,
                None,
            );
        }
        SyncOutcome::Rejected => {
            env.broadcaster.send_to(
                Packet::SkillCastFailed {
                    cast_uid: cmd.cast_uid,
                },
                player.addr,
            );
        }
    }
}

fn handle_tick_sync(player: &mut PlayerContext, cast_uid: i64, server_tick: i32) {
    let Some(cast) = player.registry.get_mut(cast_uid) else {
        debug!(
            "session {}: tick sync for unknown cast {}, dropped",
            player.session_id, cast_uid
        );
        return;
    };
    // Diagnostic only: a mismatch is logged inside and nothing is corrected.
    reconcile::tick_sync(cast, server_tick, player.current_sequence.as_deref());
}

fn handle_cancel(env: &mut HandlerContext, player: &mut PlayerContext, cast_uid: i64) {
    let caster = player.session_id;
    let Some(cast) = player.registry.get_mut(cast_uid) else {
        debug!(
            "session {}: cancel for unknown cast {}, dropped",
            caster, cast_uid
        );
        return;
    };

    cast.cancel();
    player.registry.end(cast_uid);
    // Stop the bound sequence for the owner; effects already resolved stay.
    player.current_sequence = None;

    env.broadcaster.broadcast(
        Packet::SkillCancel { caster, cast_uid },
        env.observers,
        None,
    );
}
