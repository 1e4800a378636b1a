mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, SchemaCommand, TopicCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, ephemeral, rotate_token } => {
            commands::serve(config, ephemeral, rotate_token).await
        }
        Command::Deploy {
            module,
            version,
            environment,
            strategy,
            requester,
            require_approval,
        } => {
            commands::deploy(
                &cli.api,
                cli.token,
                module,
                version,
                environment,
                strategy,
                requester,
                require_approval,
            )
            .await
        }
        Command::Deployments => commands::deployments(&cli.api, cli.token).await,
        Command::Deployment { execution_id } => {
            commands::deployment(&cli.api, cli.token, &execution_id).await
        }
        Command::Approve { execution_id, reject } => {
            commands::approve(&cli.api, cli.token, &execution_id, !reject).await
        }
        Command::Cancel { execution_id } => {
            commands::cancel(&cli.api, cli.token, &execution_id).await
        }
        Command::Rollback { execution_id } => {
            commands::rollback(&cli.api, cli.token, &execution_id).await
        }
        Command::Publish { topic, payload, priority, headers } => {
            commands::publish(&cli.api, cli.token, topic, payload, priority, headers).await
        }
        Command::Topic { command } => match command {
            TopicCommand::List => commands::list_topics(&cli.api, cli.token).await,
            TopicCommand::Create { name, topic_type, partitions, guarantee } => {
                commands::create_topic(&cli.api, cli.token, name, topic_type, partitions, guarantee)
                    .await
            }
        },
        Command::Schema { command } => match command {
            SchemaCommand::List => commands::list_schemas(&cli.api, cli.token).await,
            SchemaCommand::Register { schema_id, definition_file, compatibility } => {
                commands::register_schema(
                    &cli.api,
                    cli.token,
                    schema_id,
                    definition_file,
                    compatibility,
                )
                .await
            }
            SchemaCommand::Approve { schema_id, actor } => {
                commands::decide_schema(&cli.api, cli.token, schema_id, actor, true).await
            }
            SchemaCommand::Reject { schema_id, actor } => {
                commands::decide_schema(&cli.api, cli.token, schema_id, actor, false).await
            }
        },
        Command::Status => commands::status(&cli.api, cli.token).await,
    }
}
