//! CLI argument definitions

use burrow_core::config::{DEFAULT_BASE_DIR, DEFAULT_CONTAINER_ID};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "burrow")]
#[command(about = "Minimal namespace container launcher", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a command in a new container
    Run(RunArgs),

    /// Persist the network namespace this process was cloned into
    #[command(name = "networkNamespaceCreated", hide = true)]
    NetworkNamespaceCreated {
        /// Serialized container configuration
        #[arg(long)]
        config: String,
    },

    /// Finish container setup and exec the command
    #[command(name = "containerNamespacesCreated", hide = true)]
    ContainerNamespacesCreated {
        /// Serialized container configuration
        #[arg(long)]
        config: String,

        /// Command to exec
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Container ID, or `auto` to generate one
    #[arg(short, long, default_value = DEFAULT_CONTAINER_ID)]
    pub id: String,

    /// Directory holding the container root filesystems
    #[arg(long, default_value = DEFAULT_BASE_DIR)]
    pub base_dir: PathBuf,

    /// Hostname inside the container (default: the container ID)
    #[arg(long)]
    pub hostname: Option<String>,

    /// Host-side veth address in CIDR notation
    #[arg(long)]
    pub host_ip: Option<String>,

    /// Container-side veth address in CIDR notation
    #[arg(long)]
    pub container_ip: Option<String>,

    /// Create the network namespace in a re-executed helper process
    #[arg(long)]
    pub netns_helper: bool,

    /// Command to run and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}
