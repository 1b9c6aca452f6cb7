//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "devgate", version, about = "Talk to a device management API")]
pub struct Cli {
    /// Device name from the config file
    #[arg(short, long, env = "DEVGATE_DEVICE", global = true)]
    pub device: Option<String>,

    /// Base URL, overrides --device
    #[arg(short, long, env = "DEVGATE_URL", global = true)]
    pub url: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session token
    Login { password: String },

    /// End the session (local token is always cleared)
    Logout,

    /// Show session status as reported by the device
    Status,

    /// Change the device password
    Passwd { old: String, new: String },

    /// Authenticated GET, prints the JSON body
    Get { path: String },

    /// Authenticated POST with a JSON body (default `{}`)
    Post { path: String, json: Option<String> },

    /// Authenticated call printing status and raw body
    Raw {
        path: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        #[arg(long)]
        data: Option<String>,
    },

    /// System information
    Info,

    /// Add or update a device entry in the config file
    AddDevice { name: String, url: String },
}
