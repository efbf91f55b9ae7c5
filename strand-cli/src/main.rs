use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;
use strand_client::{
    Client, ClientConfig, ConceptMap, Options, Session, SessionType, Transaction, TransactionType,
};
use tracing_subscriber::EnvFilter;

mod table;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
    /// JSON Lines (one answer per line)
    Jsonl,
}

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Strand graph database CLI", long_about = None)]
struct Cli {
    /// Server address
    #[arg(long, env = "STRAND_ADDRESS", default_value = strand_client::config::DEFAULT_ADDRESS)]
    address: String,

    /// Connect timeout in seconds
    #[arg(long, default_value = "5")]
    connect_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database management
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
    /// Run a match query and print the answers
    Match {
        /// Database name
        database: String,
        /// Query text
        query: String,
        /// Stop after this many answers
        #[arg(short, long)]
        limit: Option<usize>,
        /// Answers per streamed batch
        #[arg(long)]
        batch_size: Option<u32>,
        /// Enable rule inference
        #[arg(long)]
        infer: bool,
        /// Output format (table, json, jsonl)
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Run an aggregate query (count, sum, mean, ...)
    Aggregate {
        /// Database name
        database: String,
        /// Query text
        query: String,
        /// Enable rule inference
        #[arg(long)]
        infer: bool,
    },
    /// Run an insert query and commit
    Insert {
        /// Database name
        database: String,
        /// Query text
        query: String,
        /// Output format (table, json, jsonl)
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Run a delete query and commit
    Delete {
        /// Database name
        database: String,
        /// Query text
        query: String,
    },
    /// Define schema and commit
    Define {
        /// Database name
        database: String,
        /// Query text
        query: String,
    },
    /// Undefine schema and commit
    Undefine {
        /// Database name
        database: String,
        /// Query text
        query: String,
    },
}

#[derive(Subcommand)]
enum DatabaseCommands {
    /// Create a database
    Create {
        /// Database name
        name: String,
    },
    /// Delete a database
    Delete {
        /// Database name
        name: String,
    },
    /// List all databases
    List,
    /// Check whether a database exists
    Contains {
        /// Database name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::new()
        .with_address(cli.address.clone())
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    let client = Client::with_config(config)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.address))?;
    tracing::debug!(address = %cli.address, "Connected");

    let result = run(&client, cli.command).await;
    client.close().await;
    result
}

async fn run(client: &Client, command: Commands) -> Result<()> {
    match command {
        Commands::Database { command } => handle_database_command(client, command).await?,

        Commands::Match {
            database,
            query,
            limit,
            batch_size,
            infer,
            output,
        } => {
            let mut options = Options::new().with_infer(infer);
            if let Some(size) = batch_size {
                options = options.with_batch_size(size);
            }

            let session = client
                .session_with_options(&database, SessionType::Data, options)
                .await
                .context("Failed to open session")?;
            let tx = session
                .transaction(TransactionType::Read)
                .await
                .context("Failed to open transaction")?;

            let mut cursor = tx.query().match_query(&query)?;
            let mut answers = Vec::new();
            while let Some(answer) = cursor.next().await {
                answers.push(answer.context("Query failed")?);
                if limit.is_some_and(|limit| answers.len() >= limit) {
                    break;
                }
            }
            cursor.close();

            print_answers(&answers, output)?;
            tx.close().await;
            session.close().await?;
        }

        Commands::Aggregate {
            database,
            query,
            infer,
        } => {
            let session = client
                .session_with_options(&database, SessionType::Data, Options::new().with_infer(infer))
                .await
                .context("Failed to open session")?;
            let tx = session
                .transaction(TransactionType::Read)
                .await
                .context("Failed to open transaction")?;

            let value = tx
                .query()
                .match_aggregate(&query)?
                .await
                .context("Query failed")?;
            println!("{}", value);

            tx.close().await;
            session.close().await?;
        }

        Commands::Insert {
            database,
            query,
            output,
        } => {
            let (session, tx) = open_write(client, &database, SessionType::Data).await?;
            let result = async { tx.query().insert(&query)?.collect_all().await }.await;
            let answers = commit_or_close(session, tx, result).await?;
            print_answers(&answers, output)?;
            println!("✓ Inserted {} answer(s)", answers.len());
        }

        Commands::Delete { database, query } => {
            let (session, tx) = open_write(client, &database, SessionType::Data).await?;
            let result = async { tx.query().delete(&query)?.await }.await;
            commit_or_close(session, tx, result).await?;
            println!("✓ Deleted");
        }

        Commands::Define { database, query } => {
            let (session, tx) = open_write(client, &database, SessionType::Schema).await?;
            let result = async { tx.query().define(&query)?.await }.await;
            commit_or_close(session, tx, result).await?;
            println!("✓ Schema defined");
        }

        Commands::Undefine { database, query } => {
            let (session, tx) = open_write(client, &database, SessionType::Schema).await?;
            let result = async { tx.query().undefine(&query)?.await }.await;
            commit_or_close(session, tx, result).await?;
            println!("✓ Schema undefined");
        }
    }

    Ok(())
}

/// Open a session and a write transaction on it
async fn open_write(
    client: &Client,
    database: &str,
    kind: SessionType,
) -> Result<(Session, Transaction)> {
    let session = client
        .session(database, kind)
        .await
        .context("Failed to open session")?;
    let tx = session
        .transaction(TransactionType::Write)
        .await
        .context("Failed to open transaction")?;
    Ok((session, tx))
}

/// Commit if the query succeeded, otherwise discard the transaction
async fn commit_or_close<T>(
    session: Session,
    tx: Transaction,
    result: strand_client::Result<T>,
) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.context("Failed to commit")?;
            session.close().await?;
            Ok(value)
        }
        Err(e) => {
            tx.close().await;
            session.close().await?;
            Err(anyhow::Error::new(e).context("Query failed"))
        }
    }
}

async fn handle_database_command(client: &Client, command: DatabaseCommands) -> Result<()> {
    let databases = client.databases();

    match command {
        DatabaseCommands::Create { name } => {
            databases
                .create(&name)
                .await
                .context("Failed to create database")?;
            println!("Database created: {}", name);
        }

        DatabaseCommands::Delete { name } => {
            databases
                .delete(&name)
                .await
                .context("Failed to delete database")?;
            println!("Database deleted: {}", name);
        }

        DatabaseCommands::List => {
            let mut names = databases.all().await.context("Failed to list databases")?;
            names.sort();
            if names.is_empty() {
                println!("No databases");
            }
            for name in names {
                println!("{}", name);
            }
        }

        DatabaseCommands::Contains { name } => {
            let exists = databases
                .contains(&name)
                .await
                .context("Failed to check database")?;
            println!("{}", exists);
        }
    }

    Ok(())
}

fn print_answers(answers: &[ConceptMap], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Table => {
            println!("{}", table::format_answers_table(answers));
            println!();
            println!("Count: {}", answers.len());
        }
        OutputFormat::Json => {
            let json: Vec<_> = answers.iter().map(table::answer_to_json).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Jsonl => {
            for answer in answers {
                println!("{}", serde_json::to_string(&table::answer_to_json(answer))?);
            }
        }
    }
    Ok(())
}
