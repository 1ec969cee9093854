use clap::Parser;
use log::info;
use server::cast::TargetCategory;
use server::field::{Field, FieldEntity};
use server::metadata::{default_table, SkillTable};
use server::network::Server;
use shared::Vec3;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate of the field simulation (updates per second)
    #[clap(short, long, default_value = "10")]
    tick_rate: u32,
    /// Maximum number of concurrent sessions
    #[clap(short, long, default_value = "32")]
    max_sessions: usize,
    /// Path to a JSON skill definition table; built-in table when omitted
    #[clap(short, long)]
    skill_table: Option<PathBuf>,
}

/// Populates the field with a handful of entities until spawn data arrives
/// from the world pipeline.
fn seed_demo_entities(field: &mut Field) {
    for target_id in 10..15 {
        field.insert_entity(
            TargetCategory::Hostile,
            FieldEntity {
                target_id,
                object_uid: 9000 + target_id as i64,
                position: Vec3::new(target_id as f32, 0.0, 0.0),
            },
        );
    }
    for target_id in 30..32 {
        field.insert_entity(
            TargetCategory::Scavenger,
            FieldEntity {
                target_id,
                object_uid: 9000 + target_id as i64,
                position: Vec3::new(0.0, target_id as f32, 0.0),
            },
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let table = match &args.skill_table {
        Some(path) => SkillTable::load(path)?,
        None => default_table(),
    };
    info!("Loaded {} skill definitions", table.len());

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);
    let mut server = Server::new(&address, tick_duration, args.max_sessions, Arc::new(table)).await?;

    if let Some(field) = server.field_mut() {
        seed_demo_entities(field);
    }

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
