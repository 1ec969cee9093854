//! Inbound skill command layer.
//!
//! Every skill message starts with a single command byte; `Attack` carries a
//! second sub-command byte. The whole buffer is decoded once here into a
//! closed [`SkillCommand`] value and never re-dispatched on raw bytes deeper
//! in the server. Encoders exist for every variant so the test client and
//! the integration tests can produce byte-exact traffic.

use crate::codec::{ByteReader, ByteWriter, DecodeError};
use crate::Vec3;

pub const CMD_USE: u8 = 0;
pub const CMD_ATTACK: u8 = 1;
pub const CMD_SYNC: u8 = 2;
pub const CMD_TICK_SYNC: u8 = 3;
pub const CMD_CANCEL: u8 = 4;

pub const ATTACK_POINT: u8 = 0;
pub const ATTACK_TARGET: u8 = 1;
pub const ATTACK_SPLASH: u8 = 2;

/// One reported hit in an attack-point batch.
///
/// Entries within a batch form a chain: a follow-up entry references the
/// object uid of the entry before it, which is how the client narrates
/// multi-hit combos. `index` is the ordinal of the primary entry the record
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub uid: i64,
    pub target_id: i32,
    pub prev_uid: Option<i64>,
    pub index: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseCommand {
    pub cast_uid: i64,
    pub server_tick: i32,
    pub skill_id: i32,
    pub level: i16,
    pub motion_point: u8,
    pub position: Vec3,
    pub direction: Vec3,
    pub rotation: Vec3,
    pub rotate2_z: f32,
    pub item_uid: i64,
    pub is_hold: bool,
    pub hold_int: Option<i32>,
    pub hold_string: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackPointCommand {
    pub cast_uid: i64,
    pub attack_point: u8,
    pub position: Vec3,
    pub direction: Vec3,
    pub iterations: i32,
    pub targets: Vec<TargetRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackTargetCommand {
    pub cast_uid: i64,
    pub target_uid: i64,
    pub impact_position: Vec3,
    pub direction: Vec3,
    pub attack_point: u8,
    pub iterations: i32,
    pub target_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackSplashCommand {
    pub cast_uid: i64,
    pub attack_point: u8,
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncCommand {
    pub cast_uid: i64,
    pub skill_id: i32,
    pub level: i16,
    pub motion_point: u8,
    pub position: Vec3,
    pub direction: Vec3,
    pub rotation: Vec3,
    pub input: Vec3,
    pub is_charge: bool,
    pub is_release: bool,
}

/// Skill command layer, decoded once at the network boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillCommand {
    Use(UseCommand),
    AttackPoint(AttackPointCommand),
    AttackTarget(AttackTargetCommand),
    AttackSplash(AttackSplashCommand),
    Sync(SyncCommand),
    TickSync { cast_uid: i64, server_tick: i32 },
    Cancel { cast_uid: i64 },
}

impl SkillCommand {
    pub fn decode(buf: &[u8]) -> Result<SkillCommand, DecodeError> {
        let mut reader = ByteReader::new(buf);
        let command = reader.read_u8()?;
        match command {
            CMD_USE => decode_use(&mut reader),
            CMD_ATTACK => {
                let sub = reader.read_u8()?;
                match sub {
                    ATTACK_POINT => decode_attack_point(&mut reader),
                    ATTACK_TARGET => decode_attack_target(&mut reader),
                    ATTACK_SPLASH => decode_attack_splash(&mut reader),
                    other => Err(DecodeError::UnknownSubCommand(other)),
                }
            }
            CMD_SYNC => decode_sync(&mut reader),
            CMD_TICK_SYNC => Ok(SkillCommand::TickSync {
                cast_uid: reader.read_i64()?,
                server_tick: reader.read_i32()?,
            }),
            CMD_CANCEL => Ok(SkillCommand::Cancel {
                cast_uid: reader.read_i64()?,
            }),
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        match self {
            SkillCommand::Use(cmd) => encode_use(&mut writer, cmd),
            SkillCommand::AttackPoint(cmd) => encode_attack_point(&mut writer, cmd),
            SkillCommand::AttackTarget(cmd) => encode_attack_target(&mut writer, cmd),
            SkillCommand::AttackSplash(cmd) => encode_attack_splash(&mut writer, cmd),
            SkillCommand::Sync(cmd) => encode_sync(&mut writer, cmd),
            SkillCommand::TickSync {
                cast_uid,
                server_tick,
            } => {
                writer.write_u8(CMD_TICK_SYNC);
                writer.write_i64(*cast_uid);
                writer.write_i32(*server_tick);
            }
            SkillCommand::Cancel { cast_uid } => {
                writer.write_u8(CMD_CANCEL);
                writer.write_i64(*cast_uid);
            }
        }
        writer.into_inner()
    }

    pub fn cast_uid(&self) -> i64 {
        match self {
            SkillCommand::Use(cmd) => cmd.cast_uid,
            SkillCommand::AttackPoint(cmd) => cmd.cast_uid,
            SkillCommand::AttackTarget(cmd) => cmd.cast_uid,
            SkillCommand::AttackSplash(cmd) => cmd.cast_uid,
            SkillCommand::Sync(cmd) => cmd.cast_uid,
            SkillCommand::TickSync { cast_uid, .. } => *cast_uid,
            SkillCommand::Cancel { cast_uid } => *cast_uid,
        }
    }
}

fn decode_use(reader: &mut ByteReader) -> Result<SkillCommand, DecodeError> {
    let cast_uid = reader.read_i64()?;
    let server_tick = reader.read_i32()?;
    let skill_id = reader.read_i32()?;
    let level = reader.read_i16()?;
    let motion_point = reader.read_u8()?;
    let position = reader.read_vec3()?;
    let direction = reader.read_vec3()?;
    let rotation = reader.read_vec3()?;
    let rotate2_z = reader.read_f32()?;
    let _client_tick = reader.read_i32()?;
    let _unknown = reader.read_bool()?;
    let item_uid = reader.read_i64()?;
    let is_hold = reader.read_bool()?;
    let (hold_int, hold_string) = if is_hold {
        (Some(reader.read_i32()?), Some(reader.read_string()?))
    } else {
        (None, None)
    };

    Ok(SkillCommand::Use(UseCommand {
        cast_uid,
        server_tick,
        skill_id,
        level,
        motion_point,
        position,
        direction,
        rotation,
        rotate2_z,
        item_uid,
        is_hold,
        hold_int,
        hold_string,
    }))
}

fn encode_use(writer: &mut ByteWriter, cmd: &UseCommand) {
    writer.write_u8(CMD_USE);
    writer.write_i64(cmd.cast_uid);
    writer.write_i32(cmd.server_tick);
    writer.write_i32(cmd.skill_id);
    writer.write_i16(cmd.level);
    writer.write_u8(cmd.motion_point);
    writer.write_vec3(cmd.position);
    writer.write_vec3(cmd.direction);
    writer.write_vec3(cmd.rotation);
    writer.write_f32(cmd.rotate2_z);
    writer.write_i32(0); // client tick, discarded by the server
    writer.write_bool(false);
    writer.write_i64(cmd.item_uid);
    writer.write_bool(cmd.is_hold);
    if cmd.is_hold {
        writer.write_i32(cmd.hold_int.unwrap_or(0));
        writer.write_string(cmd.hold_string.as_deref().unwrap_or(""));
    }
}

fn decode_attack_point(reader: &mut ByteReader) -> Result<SkillCommand, DecodeError> {
    let cast_uid = reader.read_i64()?;
    let attack_point = reader.read_u8()?;
    let position = reader.read_vec3()?;
    let direction = reader.read_vec3()?;
    let count = reader.read_u8()?;
    let iterations = reader.read_i32()?;

    let mut targets = Vec::new();
    for index in 0..count {
        let uid = reader.read_i64()?;
        let target_id = reader.read_i32()?;
        let _unknown = reader.read_u8()?;
        targets.push(TargetRecord {
            uid,
            target_id,
            prev_uid: None,
            index,
        });

        // Follow-up entries are prefixed with a continuation bit and chain
        // back to the entry before them.
        let mut prev_uid = uid;
        loop {
            let continuation = reader.read_u8()?;
            if continuation & 1 == 0 {
                break;
            }
            let uid = reader.read_i64()?;
            let target_id = reader.read_i32()?;
            let _unknown = reader.read_u8()?;
            targets.push(TargetRecord {
                uid,
                target_id,
                prev_uid: Some(prev_uid),
                index,
            });
            prev_uid = uid;
        }
    }

    Ok(SkillCommand::AttackPoint(AttackPointCommand {
        cast_uid,
        attack_point,
        position,
        direction,
        iterations,
        targets,
    }))
}

fn encode_attack_point(writer: &mut ByteWriter, cmd: &AttackPointCommand) {
    writer.write_u8(CMD_ATTACK);
    writer.write_u8(ATTACK_POINT);
    writer.write_i64(cmd.cast_uid);
    writer.write_u8(cmd.attack_point);
    writer.write_vec3(cmd.position);
    writer.write_vec3(cmd.direction);

    let primary_count = cmd.targets.iter().filter(|t| t.prev_uid.is_none()).count() as u8;
    writer.write_u8(primary_count);
    writer.write_i32(cmd.iterations);

    for index in 0..primary_count {
        let chain: Vec<&TargetRecord> =
            cmd.targets.iter().filter(|t| t.index == index).collect();
        for (pos, record) in chain.iter().enumerate() {
            if record.prev_uid.is_some() {
                writer.write_u8(1);
            }
            writer.write_i64(record.uid);
            writer.write_i32(record.target_id);
            writer.write_u8(0);
            if pos == chain.len() - 1 {
                writer.write_u8(0);
            }
        }
    }
}

fn decode_attack_target(reader: &mut ByteReader) -> Result<SkillCommand, DecodeError> {
    let cast_uid = reader.read_i64()?;
    let target_uid = reader.read_i64()?;
    let impact_position = reader.read_vec3()?;
    let _impact_position2 = reader.read_vec3()?;
    let direction = reader.read_vec3()?;
    let attack_point = reader.read_u8()?;
    let count = reader.read_u8()?;
    let iterations = reader.read_i32()?;

    let mut target_ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        target_ids.push(reader.read_i32()?);
        let _pad = reader.read_u8()?;
    }

    Ok(SkillCommand::AttackTarget(AttackTargetCommand {
        cast_uid,
        target_uid,
        impact_position,
        direction,
        attack_point,
        iterations,
        target_ids,
    }))
}

fn encode_attack_target(writer: &mut ByteWriter, cmd: &AttackTargetCommand) {
    writer.write_u8(CMD_ATTACK);
    writer.write_u8(ATTACK_TARGET);
    writer.write_i64(cmd.cast_uid);
    writer.write_i64(cmd.target_uid);
    writer.write_vec3(cmd.impact_position);
    writer.write_vec3(Vec3::default()); // second impact position, discarded
    writer.write_vec3(cmd.direction);
    writer.write_u8(cmd.attack_point);
    writer.write_u8(cmd.target_ids.len() as u8);
    writer.write_i32(cmd.iterations);
    for target_id in &cmd.target_ids {
        writer.write_i32(*target_id);
        writer.write_u8(0);
    }
}

fn decode_attack_splash(reader: &mut ByteReader) -> Result<SkillCommand, DecodeError> {
    let cast_uid = reader.read_i64()?;
    let attack_point = reader.read_u8()?;
    let _unused = reader.read_i32()?;
    let _unused = reader.read_i32()?;
    let position = reader.read_vec3()?;
    let rotation = reader.read_vec3()?;

    Ok(SkillCommand::AttackSplash(AttackSplashCommand {
        cast_uid,
        attack_point,
        position,
        rotation,
    }))
}

fn encode_attack_splash(writer: &mut ByteWriter, cmd: &AttackSplashCommand) {
    writer.write_u8(CMD_ATTACK);
    writer.write_u8(ATTACK_SPLASH);
    writer.write_i64(cmd.cast_uid);
    writer.write_u8(cmd.attack_point);
    writer.write_i32(0);
    writer.write_i32(0);
    writer.write_vec3(cmd.position);
    writer.write_vec3(cmd.rotation);
}

fn decode_sync(reader: &mut ByteReader) -> Result<SkillCommand, DecodeError> {
    let cast_uid = reader.read_i64()?;
    let skill_id = reader.read_i32()?;
    let level = reader.read_i16()?;
    let motion_point = reader.read_u8()?;
    let position = reader.read_vec3()?;
    let direction = reader.read_vec3()?;
    let rotation = reader.read_vec3()?;
    let input = reader.read_vec3()?;
    let is_charge = reader.read_bool()?;
    let is_release = reader.read_bool()?;
    let _unknown = reader.read_i32()?;

    Ok(SkillCommand::Sync(SyncCommand {
        cast_uid,
        skill_id,
        level,
        motion_point,
        position,
        direction,
        rotation,
        input,
        is_charge,
        is_release,
    }))
}

fn encode_sync(writer: &mut ByteWriter, cmd: &SyncCommand) {
    writer.write_u8(CMD_SYNC);
    writer.write_i64(cmd.cast_uid);
    writer.write_i32(cmd.skill_id);
    writer.write_i16(cmd.level);
    writer.write_u8(cmd.motion_point);
    writer.write_vec3(cmd.position);
    writer.write_vec3(cmd.direction);
    writer.write_vec3(cmd.rotation);
    writer.write_vec3(cmd.input);
    writer.write_bool(cmd.is_charge);
    writer.write_bool(cmd.is_release);
    writer.write_i32(0);
}
