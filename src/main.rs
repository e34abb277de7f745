use clap::{Parser, Subcommand};
use semantic_recall::Result;
use semantic_recall::commands::{
    SearchOptions, delete_embeddings, optimize_storage, parse_vector, reconcile_schema, search,
    show_status, show_variants, store_embeddings,
};
use semantic_recall::config::{load_default, run_interactive_config, show_config};
use semantic_recall::search::Partition;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "semantic-recall")]
#[command(about = "Partitioned embedding storage and similarity search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding store and query defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Collapse all installed variants of the query entry point into the canonical one
    Reconcile,
    /// List installed entry point variants and check call dispatch
    Variants,
    /// Store embeddings from a JSON lines file
    Store {
        /// File with one embedding record per line
        file: PathBuf,
        /// Replace embeddings that already exist for the same ref_id and model
        #[arg(long)]
        overwrite: bool,
    },
    /// Find stored embeddings similar to a query vector
    Search {
        /// Owner whose embeddings are searched
        #[arg(long)]
        owner: String,
        /// Query vector as a JSON array or comma separated numbers
        #[arg(long, allow_hyphen_values = true)]
        vector: String,
        /// Model tag; defaults to the configured model
        #[arg(long)]
        model: Option<String>,
        /// Embedding kind, e.g. "message" or "fact"
        #[arg(long)]
        kind: Option<String>,
        /// Minimum similarity in [0, 1]
        #[arg(long)]
        threshold: Option<f32>,
        /// Maximum number of results; unlimited when omitted
        #[arg(long)]
        limit: Option<usize>,
        /// Nearest candidates examined before filtering
        #[arg(long)]
        candidate_cap: Option<usize>,
    },
    /// Compact the catalog and the embeddings table
    Optimize,
    /// Delete every embedding of a source entity
    Delete {
        /// Source entity id
        ref_id: String,
    },
    /// Show catalog and vector store status
    Status {
        /// Also count embeddings of this owner
        #[arg(long, requires = "model")]
        owner: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "message")]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Reconcile => {
            reconcile_schema(&load_default()?).await?;
        }
        Commands::Variants => {
            show_variants(&load_default()?).await?;
        }
        Commands::Store { file, overwrite } => {
            store_embeddings(&load_default()?, &file, overwrite).await?;
        }
        Commands::Search {
            owner,
            vector,
            model,
            kind,
            threshold,
            limit,
            candidate_cap,
        } => {
            let options = SearchOptions {
                owner_id: owner,
                query_vector: parse_vector(&vector)?,
                model_tag: model,
                kind,
                threshold,
                limit,
                candidate_cap,
            };
            search(&load_default()?, &options).await?;
        }
        Commands::Optimize => {
            optimize_storage(&load_default()?).await?;
        }
        Commands::Delete { ref_id } => {
            delete_embeddings(&load_default()?, &ref_id).await?;
        }
        Commands::Status { owner, model, kind } => {
            let partition = owner
                .zip(model)
                .map(|(owner, model)| Partition::new(&owner, &model, &kind));
            show_status(&load_default()?, partition.as_ref()).await?;
        }
    }

    Ok(())
}
