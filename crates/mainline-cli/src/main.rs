//! mainline - Ubuntu mainline kernel CLI

use anyhow::Result;
use clap::Parser;
use mainline_core::ListingFilter;
use tracing_subscriber::EnvFilter;

use mainline_cli::cmd::{self, Context};
use mainline_cli::ui::table::ListColumns;
use mainline_cli::{CacheCommands, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(cli.repo)?;

    match cli.command {
        Commands::List {
            after,
            before,
            limit,
            archs,
            variants,
            json,
        } => {
            let filter = ListingFilter {
                after,
                before,
                limit: limit.as_deref().map(ListingFilter::parse_limit),
            };
            let columns = ListColumns { archs, variants };
            cmd::list::list(&ctx, &filter, columns, json).await
        }
        Commands::Show {
            version,
            archs,
            all,
            json,
        } => cmd::show::show(&ctx, &version, &archs, all, json).await,
        Commands::Download {
            version,
            archs,
            variants,
            output_dir,
            overwrite,
        } => {
            cmd::download::download(
                &ctx,
                &version,
                &archs,
                &variants,
                output_dir.as_deref(),
                overwrite,
            )
            .await
        }
        Commands::Cache { command } => match command {
            CacheCommands::Clear => cmd::cache::clear(&ctx),
            CacheCommands::Inspect => cmd::cache::inspect(&ctx),
            CacheCommands::Verify => cmd::cache::verify(&ctx).await,
        },
    }
}
