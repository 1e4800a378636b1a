use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "hoist",
    about = "Hot-swap module deployment orchestration with an in-cluster message broker",
    version
)]
pub struct Cli {
    /// Base URL of the hoist server for remote commands.
    #[arg(long, env = "HOIST_URL", global = true, default_value = "http://127.0.0.1:7400")]
    pub api: String,

    /// Bearer token; falls back to the saved token file.
    #[arg(long, env = "HOIST_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the hoist server.
    Serve {
        /// Path to hoist.yml. Defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use the in-memory store regardless of config.
        #[arg(long)]
        ephemeral: bool,

        /// Generate a fresh auth token instead of reusing the saved one.
        #[arg(long)]
        rotate_token: bool,
    },

    /// Submit a deployment.
    Deploy {
        /// Module name.
        module: String,
        /// Module version, e.g. 1.4.2.
        version: String,

        #[arg(long, default_value = "development")]
        environment: String,

        #[arg(long, default_value = "rolling")]
        strategy: String,

        #[arg(long, default_value = "cli@localhost")]
        requester: String,

        /// Park at the approval gate until `hoist approve`.
        #[arg(long)]
        require_approval: bool,
    },

    /// List all executions.
    Deployments,

    /// Show one execution with its stages.
    Deployment { execution_id: String },

    /// Approve (or reject) a deployment waiting at the gate.
    Approve {
        execution_id: String,

        #[arg(long)]
        reject: bool,
    },

    /// Cancel a running deployment.
    Cancel { execution_id: String },

    /// Roll a committed deployment back to the previous module version.
    Rollback { execution_id: String },

    /// Publish a message.
    Publish {
        topic: String,
        /// Message payload (opaque, typically JSON).
        payload: String,

        #[arg(long, default_value_t = 0)]
        priority: u8,

        /// Repeatable `key=value` message headers.
        #[arg(long = "header")]
        headers: Vec<String>,
    },

    /// Topic management.
    Topic {
        #[command(subcommand)]
        command: TopicCommand,
    },

    /// Schema management.
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },

    /// Server status summary.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum TopicCommand {
    List,
    Create {
        name: String,

        /// "queue" or "pubsub".
        #[arg(long = "type", default_value = "queue")]
        topic_type: String,

        #[arg(long)]
        partitions: Option<u32>,

        /// "at-most-once", "at-least-once", or "exactly-once".
        #[arg(long)]
        guarantee: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    List,
    /// Register a new schema id from a JSON Schema file.
    Register {
        schema_id: String,
        definition_file: PathBuf,

        #[arg(long, default_value = "backward")]
        compatibility: String,
    },
    Approve {
        schema_id: String,

        #[arg(long)]
        actor: String,
    },
    Reject {
        schema_id: String,

        #[arg(long)]
        actor: String,
    },
}
