//! Terminal client for mindlink: join or create a collaboration room, watch
//! the shared mindmap and peer presence update live, and issue node
//! mutations from an interactive prompt.

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mindlink::cli::{self, Args};
use mindlink::session::{CollabSession, SessionConfig};
use mindlink::{MindmapNode, Participant};

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_document(node: &MindmapNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = match depth {
        0 => node.content.bold().cyan(),
        1 => node.content.normal().yellow(),
        _ => node.content.normal(),
    };
    println!("{}{} {}", indent, "•".dimmed(), label);
    for child in &node.children {
        render_document(child, depth + 1);
    }
}

fn print_roster(session: &CollabSession) {
    let snap = session.snapshot();
    if snap.participants.is_empty() {
        println!("{}", "nobody else here yet".dimmed());
        return;
    }
    for p in &snap.participants {
        let mut line = format!("{} {}", p.avatar, p.name.bold());
        if let Some(node_id) = snap.selections.get(&p.id) {
            line.push_str(&format!("  selecting {}", node_id.green()));
        }
        if let Some(cursor) = snap.cursors.get(&p.id) {
            line.push_str(&format!("  @ ({:.0}, {:.0})", cursor.x, cursor.y));
        }
        println!("  {}", line);
    }
}

fn print_help() {
    println!(
        "{}\n  {}\n  {}\n  {}\n  {}\n  {}\n  {}\n  {}\n  {}\n  {}",
        "commands:".bold(),
        "roster                      list participants",
        "add <parent-id> <content>   add a child node",
        "edit <node-id> <content>    change a node's text",
        "rm <node-id>                delete a node",
        "mv <node-id> <parent-id>    reparent a node",
        "select <node-id>            announce a selection",
        "deselect                    clear the selection",
        "cursor <x> <y>              broadcast a cursor position",
        "quit                        leave the room and exit",
    );
}

// ---------------------------------------------------------------------------
// Command loop
// ---------------------------------------------------------------------------

async fn handle_command(session: &CollabSession, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("roster") => print_roster(session),
        Some("add") => {
            let (Some(parent), content) = (parts.next(), parts.collect::<Vec<_>>().join(" "))
            else {
                println!("{}", "usage: add <parent-id> <content>".red());
                return true;
            };
            if content.is_empty() {
                println!("{}", "usage: add <parent-id> <content>".red());
                return true;
            }
            let node = MindmapNode {
                id: Uuid::new_v4().to_string(),
                parent_id: Some(parent.to_string()),
                content,
                children: Vec::new(),
            };
            report(session.add_node(node, parent).await);
        }
        Some("edit") => {
            let (Some(node_id), content) = (parts.next(), parts.collect::<Vec<_>>().join(" "))
            else {
                println!("{}", "usage: edit <node-id> <content>".red());
                return true;
            };
            report(
                session
                    .update_node(node_id, serde_json::json!({ "content": content }))
                    .await,
            );
        }
        Some("rm") => match parts.next() {
            Some(node_id) => report(session.delete_node(node_id).await),
            None => println!("{}", "usage: rm <node-id>".red()),
        },
        Some("mv") => match (parts.next(), parts.next()) {
            (Some(node_id), Some(parent)) => report(session.move_node(node_id, parent).await),
            _ => println!("{}", "usage: mv <node-id> <parent-id>".red()),
        },
        Some("select") => match parts.next() {
            Some(node_id) => session.select_node(Some(node_id)).await,
            None => println!("{}", "usage: select <node-id>".red()),
        },
        Some("deselect") => session.select_node(None).await,
        Some("cursor") => {
            match (
                parts.next().and_then(|v| v.parse::<f64>().ok()),
                parts.next().and_then(|v| v.parse::<f64>().ok()),
            ) {
                (Some(x), Some(y)) => session.update_cursor(x, y),
                _ => println!("{}", "usage: cursor <x> <y>".red()),
            }
        }
        Some("help") => print_help(),
        Some("quit") | Some("exit") => return false,
        Some(other) => println!("{} {}", "unknown command:".red(), other),
        None => {}
    }
    true
}

fn report(ok: bool) {
    if ok {
        println!("{}", "ok".green());
    } else {
        println!("{}", "rejected (see logs)".red());
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let user = Participant {
        id: Uuid::new_v4().to_string(),
        name: args.name.clone(),
        avatar: cli::random_avatar().to_string(),
        color: cli::random_color().to_string(),
    };

    let session = CollabSession::new(
        user,
        SessionConfig {
            base_url: args.server.clone(),
            ..SessionConfig::default()
        },
    );

    session.callbacks().set_on_document(|doc| {
        println!("\n{}", "── mindmap ──".dimmed());
        render_document(&doc, 0);
    });

    let room_id = match &args.room {
        Some(id) => {
            if !session.join_room(id).await {
                eprintln!("{} {}", "could not join room".red(), id);
                return Ok(());
            }
            id.clone()
        }
        None => {
            let root = MindmapNode {
                id: Uuid::new_v4().to_string(),
                parent_id: None,
                content: format!("{}'s mindmap", args.name),
                children: Vec::new(),
            };
            match session.create_room(&root).await {
                Some(id) => id,
                None => {
                    eprintln!("{}", "could not create a room".red());
                    return Ok(());
                }
            }
        }
    };

    println!(
        "{} {}  {}",
        "room".bold(),
        room_id.cyan().bold(),
        format!("({} {})", session.user().avatar, session.user().name).dimmed(),
    );
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        if !handle_command(&session, line.trim()).await {
            break;
        }
    }

    session.leave_room().await;
    println!("{}", "bye".dimmed());
    Ok(())
}
