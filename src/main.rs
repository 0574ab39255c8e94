use clap::{Parser, Subcommand};
use recsync::Result;
use recsync::commands::{
    configure, run_rebuild, run_repair, run_search, run_sync, run_sync_post, serve_mcp,
    show_recommendations, show_status,
};

#[derive(Parser)]
#[command(name = "recsync")]
#[command(about = "Keeps a blog corpus, its vector index, and related-post recommendations in sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding provider and sync settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed unindexed published posts and refresh all recommendations
    Sync,
    /// Sync a single post by slug
    SyncPost {
        /// Post slug to sync
        slug: String,
        /// Refresh every stored recommendation list, not just this post's
        #[arg(long)]
        corpus: bool,
    },
    /// Clear the vector index and re-embed the entire published corpus
    Rebuild,
    /// Re-embed posts with missing or zeroed vectors
    Repair,
    /// Show corpus, index, and provider status
    Status,
    /// Search published posts by meaning
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the stored recommendations for a post
    Recommendations {
        /// Post slug to look up
        slug: String,
    },
    /// Start MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            configure(show)?;
        }
        Commands::Sync => {
            run_sync().await?;
        }
        Commands::SyncPost { slug, corpus } => {
            run_sync_post(slug, corpus).await?;
        }
        Commands::Rebuild => {
            run_rebuild().await?;
        }
        Commands::Repair => {
            run_repair().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Search { query, limit } => {
            run_search(query, limit).await?;
        }
        Commands::Recommendations { slug } => {
            show_recommendations(slug).await?;
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["recsync", "sync"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Sync);
        }
    }

    #[test]
    fn sync_post_command_with_slug() {
        let cli = Cli::try_parse_from(["recsync", "sync-post", "hello-world"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::SyncPost { slug, corpus } = parsed.command {
                assert_eq!(slug, "hello-world");
                assert!(!corpus);
            }
        }
    }

    #[test]
    fn sync_post_command_with_corpus_flag() {
        let cli = Cli::try_parse_from(["recsync", "sync-post", "hello-world", "--corpus"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::SyncPost { slug, corpus } = parsed.command {
                assert_eq!(slug, "hello-world");
                assert!(corpus);
            }
        }
    }

    #[test]
    fn sync_post_requires_slug() {
        let cli = Cli::try_parse_from(["recsync", "sync-post"]);
        assert!(cli.is_err());
    }

    #[test]
    fn search_command_with_default_limit() {
        let cli = Cli::try_parse_from(["recsync", "search", "rust async"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, limit } = parsed.command {
                assert_eq!(query, "rust async");
                assert_eq!(limit, 10);
            }
        }
    }

    #[test]
    fn search_command_with_limit() {
        let cli = Cli::try_parse_from(["recsync", "search", "rust async", "--limit", "5"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, limit } = parsed.command {
                assert_eq!(query, "rust async");
                assert_eq!(limit, 5);
            }
        }
    }

    #[test]
    fn recommendations_command() {
        let cli = Cli::try_parse_from(["recsync", "recommendations", "hello-world"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Recommendations { slug } = parsed.command {
                assert_eq!(slug, "hello-world");
            }
        }
    }

    #[test]
    fn rebuild_and_repair_commands() {
        assert!(Cli::try_parse_from(["recsync", "rebuild"]).is_ok());
        assert!(Cli::try_parse_from(["recsync", "repair"]).is_ok());
    }

    #[test]
    fn serve_command() {
        let cli = Cli::try_parse_from(["recsync", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Serve);
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["recsync", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["recsync", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["recsync", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
