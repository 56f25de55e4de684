//! Creates the first administrator directly in the KV bucket, so the admin
//! panel can be reached on a fresh deployment.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use doorward_registry::password::{generate_key_id, hash_password};
use doorward_registry::store::{KvStore, RecordStore};
use wards::permissions::ALL_ROOMS;
use wards::{AuditEntry, AuditEventType, AuditSink, RecordId, Role, User};

#[derive(Debug, Parser)]
#[command(name = "doorward-seed")]
#[command(about = "Create an administrator account in the Doorward KV bucket")]
struct Args {
    /// Display name of the administrator
    #[arg(long)]
    name: String,

    /// Email or phone number used to sign in
    #[arg(long)]
    login: String,

    /// Initial password
    #[arg(long, env = "DOORWARD_SEED_PASSWORD", hide_env_values = true)]
    password: String,

    /// NATS server URL
    #[arg(long, env, default_value = "nats://127.0.0.1:4222")]
    nats_url: String,

    /// JetStream KV bucket
    #[arg(long, env = "DOORWARD_KV_BUCKET", default_value = "doorward")]
    kv_bucket: String,

    /// Path to NATS credentials file
    #[arg(long, env)]
    nats_creds_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let store = KvStore::connect(&args.nats_url, &args.kv_bucket, args.nats_creds_path.as_deref())
        .await
        .context("Failed to open KV bucket")?;

    let now = Utc::now();
    let user = User {
        id: RecordId::new(),
        name: args.name.trim().to_string(),
        login: args.login.trim().to_string(),
        key_id: generate_key_id(),
        role: Role::Administrator,
        permitted_rooms: vec![ALL_ROOMS.to_string()],
        password_hash: hash_password(&args.password)?,
        created_at: now,
        updated_at: now,
    };

    store
        .insert_user(user.clone())
        .await
        .with_context(|| format!("Failed to create administrator {}", user.login))?;
    store
        .append(AuditEntry::new(
            AuditEventType::RoomGrantAll,
            format!("Administrator {} was granted access to all rooms", user.name),
            Some(user.id),
        ))
        .await?;

    println!("Created administrator {} ({})", user.login, user.id);
    Ok(())
}
