//! `varta`: headless terminal front end for a Varta node.
//!
//! Reads one command per line from stdin. Bus events (found nodes, invites,
//! archived pulses, suggestions) are printed as they happen.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use varta_client::commands::{identity, links, messaging, network};
use varta_client::events::spawn_event_printer;
use varta_client::{ClientConfig, Node};
use varta_shared::constants::APP_NAME;
use varta_shared::AssetKind;
use varta_store::{Database, KeyValueStore};

const HISTORY_LIMIT: usize = 50;

const HELP: &str = "\
commands:
  /whoami                      show the local identity
  /status                      relay connection and room summary
  /nodes                       nodes seen within the liveness window
  /probe <id>                  ask a node to identify itself
  /link <id>                   open a P2P link with a node and invite it
  /group <name> [ids...]       create a group link and invite its members
  /join <link-id> [name]       join a group link by id
  /invites                     list pending invites
  /accept <link-id>            accept a pending invite
  /links                       list links
  /send <link-id> <text>       send a chat message
  /file <link-id> <ref>        send a file reference
  /history <link-id>           show recent messages
  /remove <link-id>            forget a link and its messages
  /logout                      forget this identity and exit
  /quit                        exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("varta=debug,varta_client=debug,varta_net=debug,varta_store=info,warn")
        }))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting {} node v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let database = match &config.data_dir {
        Some(dir) => Database::open_in_dir(dir),
        None => Database::new(),
    }
    .context("Failed to open database")?;
    let store: Arc<dyn KeyValueStore> = Arc::new(database);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let me = match identity::load_identity(store.as_ref()) {
        Some(me) => me,
        None => {
            let name = match &config.display_name {
                Some(name) => name.clone(),
                None => {
                    println!("Choose a display name:");
                    lines
                        .next_line()
                        .await?
                        .context("stdin closed before onboarding")?
                }
            };
            identity::onboard(store.as_ref(), &name).map_err(anyhow::Error::msg)?
        }
    };
    println!("You are {} ({})", me.display_name, me.id);

    let node = Node::new(me, &config, store.clone(), None);
    let _printer = spawn_event_printer(node.bus());
    node.start();

    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match run_command(&node, store.as_ref(), line.trim()) {
                    Flow::Continue => {}
                    Flow::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    node.shutdown();
    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

fn run_command(node: &Node, store: &dyn KeyValueStore, line: &str) -> Flow {
    if line.is_empty() {
        return Flow::Continue;
    }

    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    match cmd {
        "/help" => println!("{HELP}"),
        "/whoami" => print_json(&identity::whoami(node)),
        "/status" => print_json(&network::status(node)),
        "/nodes" => print_json(&network::live_nodes(node)),
        "/probe" => report(network::probe(node, rest).map(|()| "probe sent")),
        "/link" => report(links::quick_handshake(node, rest)),
        "/group" => {
            let name = args.next().unwrap_or_default();
            let members: Vec<String> = args.map(String::from).collect();
            report(links::create_group(node, name, &members));
        }
        "/join" => {
            let link_id = args.next().unwrap_or_default();
            let name = args.collect::<Vec<_>>().join(" ");
            report(links::join_link(node, link_id, &name));
        }
        "/invites" => print_json(&links::pending_invites(node)),
        "/accept" => report(links::accept_invite(node, rest)),
        "/links" => print_json(&links::list_links(node)),
        "/send" | "/file" => {
            let (link_id, body) = rest.split_once(' ').unwrap_or((rest, ""));
            let kind = if cmd == "/file" { AssetKind::File } else { AssetKind::Text };
            if let Err(e) = messaging::send_message(node, link_id, body, kind) {
                eprintln!("error: {e}");
            }
        }
        "/history" => report(messaging::get_messages(node, rest, HISTORY_LIMIT)),
        "/remove" => report(links::remove_link(node, rest).map(|n| format!("removed, {n} messages dropped"))),
        "/logout" => {
            report(identity::logout(store).map(|()| "logged out"));
            return Flow::Quit;
        }
        "/quit" | "/exit" => return Flow::Quit,
        _ => eprintln!("unknown command {cmd:?}, try /help"),
    }

    Flow::Continue
}

fn report<T: Serialize>(result: Result<T, String>) {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: {e}"),
    }
}
