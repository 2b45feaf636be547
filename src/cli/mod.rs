use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::filter::RepositoryFilter;

#[derive(Parser)]
#[command(name = "containerhub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ~/.config/containerhub/config.toml)
    #[arg(long, global = true, env = "CONTAINERHUB_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show configured registry sources and their health
    Sources,

    /// List repositories across all sources
    List {
        /// Ignore the cache and refetch everything
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show the tags and platforms of one repository
    Show {
        /// Repository name, e.g. library/nginx
        repository: String,

        /// Source the repository lives on
        #[arg(long)]
        source: Option<String>,
    },

    /// Delete one or more tags of a repository
    DeleteTag {
        /// Repository name, e.g. library/nginx
        repository: String,

        /// Tags to delete
        #[arg(required = true)]
        tags: Vec<String>,

        /// Source the repository lives on
        #[arg(long)]
        source: Option<String>,
    },

    /// Delete every tag of a repository
    DeleteRepo {
        /// Repository name, e.g. library/nginx
        repository: String,

        /// Source the repository lives on
        #[arg(long)]
        source: Option<String>,
    },

    /// Keep the repository list refreshed until interrupted
    Watch {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only repositories whose name or namespace contains this text
    #[arg(long)]
    pub search: Option<String>,

    /// Only repositories with an image for this architecture ("all" for any)
    #[arg(long = "arch")]
    pub architecture: Option<String>,

    /// Only repositories on these source hosts; may be repeated
    #[arg(long = "source", value_name = "HOST")]
    pub sources: Vec<String>,

    /// Include repositories without tags
    #[arg(long)]
    pub show_untagged: bool,
}

impl From<FilterArgs> for RepositoryFilter {
    fn from(args: FilterArgs) -> Self {
        RepositoryFilter {
            search: args.search,
            architecture: args.architecture,
            sources: args.sources,
            show_untagged: args.show_untagged,
        }
    }
}
