use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kgrag_cli::{bedrock_models, Cli, Pipeline};
use kgrag_core::graph::GraphConnector;
use kgrag_core::AppConfig;
use kgrag_graph::{InMemoryConnector, Neo4jConnector};
use kgrag_loader::DirectoryLoader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stdout)
        .init();

    let config = AppConfig::from_env();

    let (llm, embed_model) = match bedrock_models(&config).await {
        Ok(models) => models,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Bedrock clients");
            println!("Error initializing Bedrock clients: {e}");
            return ExitCode::from(1);
        }
    };

    let connector: Box<dyn GraphConnector> = if cli.memory_graph {
        Box::new(InMemoryConnector::new())
    } else {
        if let Some(configured) = config.neo4j_database.as_deref() {
            if configured != cli.database {
                tracing::info!(
                    configured = %configured,
                    using = %cli.database,
                    "NEO4J_DATABASE is not used; pass --database to select a database"
                );
            }
        }
        Box::new(Neo4jConnector::from_config(&config, cli.database.clone()))
    };

    let loader = DirectoryLoader::new(&cli.data_dir).recursive(cli.recursive);

    let pipeline = Pipeline::new(llm, embed_model, Box::new(loader), connector)
        .with_index_options(cli.index_options())
        .with_query_options(cli.query_options())
        .with_questions(cli.questions());

    let mut stdout = std::io::stdout();
    match pipeline.run(&mut stdout).await {
        Ok(report) => ExitCode::from(report.status.exit_code(cli.strict_exit)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to write output");
            ExitCode::from(1)
        }
    }
}
