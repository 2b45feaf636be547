use anyhow::Result;
use clap::Parser;
use containerhub::{
    cli::{Cli, Commands},
    config::Config,
    service::ExploreService,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("containerhub {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let service = ExploreService::from_config(&config)?;

    match cli.command {
        Commands::Sources => {
            print!("{}", service.sources().await);
        }
        Commands::List { force, filter } => {
            print!("{}", service.list(force, &filter.into()).await?);
        }
        Commands::Show { repository, source } => {
            print!("{}", service.show(&repository, source.as_deref()).await?);
        }
        Commands::DeleteTag {
            repository,
            tags,
            source,
        } => {
            let report = service
                .delete_tags(&repository, &tags, source.as_deref())
                .await?;
            println!("{}", report);
            if !report.is_complete() {
                error!("Failed to delete: {}", report.failed.join(", "));
                std::process::exit(1);
            }
        }
        Commands::DeleteRepo { repository, source } => {
            if service
                .delete_repository(&repository, source.as_deref())
                .await?
            {
                println!("Deleted {}", repository);
            } else {
                error!("Some tags of {} could not be deleted", repository);
                std::process::exit(1);
            }
        }
        Commands::Watch { filter } => {
            info!("Watching registries, press Ctrl-C to stop");
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
            };
            service
                .watch(&filter.into(), shutdown, |table| println!("{}", table))
                .await?;
        }
        Commands::Version => {}
    }

    Ok(())
}
