use clap::Parser;
use rand::seq::SliceRandom;

use crate::PARTICIPANT_COLORS;

#[derive(Parser)]
#[command(name = "mindlink")]
#[command(version)]
#[command(about = "Real-time collaborative mindmap session client")]
pub struct Args {
    /// Room id to join; omit to create a fresh room
    #[arg(long)]
    pub room: Option<String>,

    /// Display name announced to other participants
    #[arg(long, default_value = "anonymous")]
    pub name: String,

    /// Base URL of the room service
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Log filter (tracing EnvFilter syntax)
    #[arg(long, default_value = "mindlink=info")]
    pub log: String,
}

const AVATARS: &[&str] = &["🦊", "🐙", "🦉", "🐢", "🦜", "🐝", "🦕", "🐬"];

/// Pick a random avatar for a freshly minted local identity.
pub fn random_avatar() -> &'static str {
    AVATARS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(AVATARS[0])
}

/// Pick a starting color; the room service reassigns one at join time.
pub fn random_color() -> &'static str {
    PARTICIPANT_COLORS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PARTICIPANT_COLORS[0])
}
