#![forbid(unsafe_code)]

//! `workqueue-ctl`: local operator CLI for `workqueue`.
//!
//! Connects to the IPC socket and sends JSON commands to the server.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(
    name = "workqueue-ctl",
    about = "Local operator CLI for the workqueue server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "workqueue")]
    ipc_name: String,

    /// Shared secret expected by the server.
    #[arg(long, env = "WORKQUEUE_IPC_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Delete every expired lease.
    Cleanup,

    /// List live leases.
    Locks,

    /// Clear an item's owner and drop its lease.
    Reclaim {
        /// Item ID.
        id: String,
        /// Status to set while reclaiming.
        #[arg(long)]
        status: Option<String>,
    },

    /// Show the routing preference of a role.
    Preference {
        /// Role key.
        role: String,
    },

    /// Show an item with its history.
    Item {
        /// Item ID.
        id: String,
    },
}

impl Command {
    fn to_request(&self) -> Value {
        match self {
            Self::Cleanup => json!({ "command": "cleanup" }),
            Self::Locks => json!({ "command": "locks" }),
            Self::Reclaim { id, status } => {
                let mut req = json!({ "command": "reclaim", "id": id });
                if let Some(status) = status {
                    req["status"] = Value::String(status.clone());
                }
                req
            }
            Self::Preference { role } => json!({ "command": "preference", "role": role }),
            Self::Item { id } => json!({ "command": "item", "id": id }),
        }
    }
}

fn main() {
    let args = Cli::parse();

    let mut request = args.command.to_request();
    if let Some(ref token) = args.auth_token {
        request["auth_token"] = Value::String(token.clone());
    }

    match send_ipc_command(&args.ipc_name, &request) {
        Ok(response) => {
            let ok = response.get("ok").and_then(Value::as_bool).unwrap_or(false);
            if ok {
                match response.get("data") {
                    Some(data) => {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    }
                    None => println!("OK"),
                }
            } else {
                let err_msg = response
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                eprintln!("Error: {err_msg}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to server: {err}");
            eprintln!("Is workqueue running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &Value,
) -> std::result::Result<Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    Ok(serde_json::from_str(response_line.trim())?)
}
