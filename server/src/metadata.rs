//! Immutable skill metadata loaded once at startup.
//!
//! A skill definition describes the ordered animation motions a cast cycles
//! through and the ordered attack entries bound to points in that sequence.
//! Definitions are read-only for the process lifetime and shared across
//! fields behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// A named animation phase with its playback speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motion {
    pub sequence_name: String,
    pub speed: f32,
}

/// Which field index an attack's reported targets are resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetPolicy {
    Hostile,
    Friendly,
    ScavengerPool,
}

/// A targeting/damage policy entry bound to a point in the motion sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attack {
    pub target_count: u8,
    pub policy: TargetPolicy,
    /// Offense value applied when the attack interacts with breakable
    /// entities; consumed by the damage subsystem, carried here verbatim.
    pub broken_offense: i32,
    /// Radius of the area query used for splash resolution.
    pub area_radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub skill_id: i32,
    pub level: i16,
    pub motions: Vec<Motion>,
    pub attacks: Vec<Attack>,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read skill table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse skill table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate definition for skill {0} level {1}")]
    Duplicate(i32, i16),
}

/// Read-only lookup from `(skill_id, level)` to its definition.
pub struct SkillTable {
    definitions: HashMap<(i32, i16), Arc<SkillDefinition>>,
}

impl SkillTable {
    pub fn from_definitions(
        definitions: Vec<SkillDefinition>,
    ) -> Result<Self, TableError> {
        let mut map = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            let key = (definition.skill_id, definition.level);
            if map.insert(key, Arc::new(definition)).is_some() {
                return Err(TableError::Duplicate(key.0, key.1));
            }
        }
        Ok(Self { definitions: map })
    }

    /// Loads a JSON array of definitions from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let file = File::open(path)?;
        let definitions: Vec<SkillDefinition> = serde_json::from_reader(BufReader::new(file))?;
        Self::from_definitions(definitions)
    }

    pub fn get(&self, skill_id: i32, level: i16) -> Option<Arc<SkillDefinition>> {
        self.definitions.get(&(skill_id, level)).cloned()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Built-in table used when the server is started without a data file, and
/// by the test client for a known conversation.
pub fn default_table() -> SkillTable {
    SkillTable::from_definitions(vec![
        SkillDefinition {
            skill_id: 100201,
            level: 1,
            motions: vec![Motion {
                sequence_name: "cast_a".to_string(),
                speed: 1.0,
            }],
            attacks: vec![Attack {
                target_count: 3,
                policy: TargetPolicy::Hostile,
                broken_offense: 0,
                area_radius: 0.0,
            }],
        },
        SkillDefinition {
            skill_id: 100300,
            level: 1,
            motions: vec![
                Motion {
                    sequence_name: "charge_a".to_string(),
                    speed: 1.0,
                },
                Motion {
                    sequence_name: "release_a".to_string(),
                    speed: 1.2,
                },
            ],
            attacks: vec![Attack {
                target_count: 8,
                policy: TargetPolicy::Hostile,
                broken_offense: 100,
                area_radius: 5.0,
            }],
        },
        SkillDefinition {
            skill_id: 200101,
            level: 1,
            motions: vec![Motion {
                sequence_name: "heal_a".to_string(),
                speed: 1.0,
            }],
            attacks: vec![Attack {
                target_count: 4,
                policy: TargetPolicy::Friendly,
                broken_offense: 0,
                area_radius: 0.0,
            }],
        },
    ])
    .expect("built-in skill table is well-formed")
}
