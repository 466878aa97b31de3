use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lexica::{ApiServer, AppConfig, AppContext, ItemResult, ItemStatus, StoreBackend};

#[derive(Parser)]
#[command(name = "lexica")]
#[command(about = "Generated reference pages with a scored cache and link graph", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,

    /// Run one batch of stale-page regeneration
    Regenerate {
        /// Pages to regenerate (defaults to LEXICA_REGEN_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Pre-generate pages for topics (defaults to the curated list)
    Warm {
        topics: Vec<String>,
    },

    /// Delete cached pages
    Invalidate {
        /// Delete one page
        #[arg(long, conflicts_with_all = ["all", "stale", "below"])]
        slug: Option<String>,

        /// Delete every page
        #[arg(long)]
        all: bool,

        /// Delete stale pages
        #[arg(long)]
        stale: bool,

        /// Delete pages with confidence below this score
        #[arg(long)]
        below: Option<f64>,
    },

    /// Show cache and runtime statistics
    Stats,

    /// Query the link graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Pages linked to or from a page
    Related {
        slug: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Pages linking to a page
    Backlinks {
        slug: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Graph size and most linked pages
    Stats {
        #[arg(short, long, default_value_t = 10)]
        top: usize,
    },

    /// Mentioned topics that have no page yet
    Suggest {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Pages without any connection
    Orphans,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lexica=info,lexica_kg=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.config.store == StoreBackend::Memory && !matches!(cli.command, Commands::Serve) {
        tracing::warn!("Using the in-memory store; nothing persists after this command");
    }

    let ctx = AppContext::connect(cli.config).await?;

    match cli.command {
        Commands::Serve => {
            ApiServer::new(ctx).start().await?;
        }

        Commands::Regenerate { batch_size } => {
            let batch_size = batch_size.unwrap_or(ctx.scheduler.config().batch_size);
            let summary = ctx.scheduler.run_with_batch_size(batch_size).await?;

            println!("Regeneration run {}", summary.run_id);
            println!("{}", "=".repeat(60));
            print_results(&summary.results);
            println!(
                "\n{} total, {} ok, {} skipped, {} failed ({}ms)",
                summary.total, summary.success, summary.skipped, summary.failed, summary.duration_ms
            );
        }

        Commands::Warm { topics } => {
            let summary = if topics.is_empty() {
                ctx.warming.warm_defaults().await
            } else {
                ctx.warming.warm(&topics).await
            };

            print_results(&summary.results);
            println!(
                "\n{} total, {} ok, {} skipped, {} failed ({}ms)",
                summary.total, summary.success, summary.skipped, summary.failed, summary.duration_ms
            );
        }

        Commands::Invalidate {
            slug,
            all,
            stale,
            below,
        } => {
            let mut events = Vec::new();
            if let Some(slug) = slug {
                events.push(ctx.invalidation.invalidate_one(&slug).await?);
            }
            if all {
                events.push(ctx.invalidation.invalidate_all().await?);
            }
            if stale {
                events.push(ctx.invalidation.invalidate_stale().await?);
            }
            if let Some(threshold) = below {
                events.push(ctx.invalidation.invalidate_low_confidence(threshold).await?);
            }
            if events.is_empty() {
                bail!("nothing to invalidate: pass --slug, --all, --stale or --below");
            }

            for event in events {
                println!(
                    "{}: {} page(s) deleted, {} edge(s) removed",
                    event.reason,
                    event.count(),
                    event.edges_removed
                );
                for slug in &event.slugs {
                    println!("  - {}", slug);
                }
            }
        }

        Commands::Stats => {
            let overview = ctx.cache_overview().await?;
            let store = &overview.store;

            println!("Cache");
            println!("{}", "=".repeat(60));
            println!("  Pages:          {} ({} published)", store.total, store.published);
            println!("  Stale:          {}", store.stale);
            println!("  Avg confidence: {:.2}", store.avg_confidence);
            println!("  Total views:    {}", store.total_views);
            println!("\nRuntime");
            println!("{}", "=".repeat(60));
            println!("  {}", overview.runtime);

            if !overview.popular.is_empty() {
                println!("\nMost viewed");
                for page in &overview.popular {
                    println!("  {:>6}  {}", page.view_count, page.slug);
                }
            }
            if !overview.stale.is_empty() {
                println!("\nStale (next to regenerate)");
                for page in &overview.stale {
                    println!("  {:>6}  {}", page.view_count, page.slug);
                }
            }
            if !overview.low_confidence.is_empty() {
                println!("\nLow confidence");
                for page in &overview.low_confidence {
                    println!("  {:>6.2}  {}", page.confidence_score, page.slug);
                }
            }
        }

        Commands::Graph { action } => {
            let graph = ctx.graph();
            match action {
                GraphAction::Related { slug, limit } => {
                    for page in graph.related_pages(&slug, limit).await? {
                        println!(
                            "{:.2}  {:<8} {} ({})",
                            page.strength,
                            format!("{:?}", page.direction).to_lowercase(),
                            page.slug,
                            page.link_text
                        );
                    }
                }
                GraphAction::Backlinks { slug, limit } => {
                    for edge in graph.backlinks(&slug, limit).await? {
                        println!("{:.2}  {} ({})", edge.strength, edge.from_slug, edge.link_text);
                    }
                }
                GraphAction::Stats { top } => {
                    let stats = graph.graph_stats(top).await?;
                    println!("Pages:       {}", stats.total_pages);
                    println!("Connections: {}", stats.total_connections);
                    println!("Avg/page:    {:.2}", stats.avg_connections_per_page);
                    println!("\nMost linked:");
                    for page in stats.top_linked {
                        println!("  {:>4}  {}", page.incoming, page.slug);
                    }
                }
                GraphAction::Suggest { limit } => {
                    for candidate in graph.suggested_pages(limit).await? {
                        println!(
                            "{:>4}  {} [{}]",
                            candidate.mentioned_count,
                            candidate.normalized_slug,
                            candidate.confidence.as_str()
                        );
                    }
                }
                GraphAction::Orphans => {
                    let orphans = graph.orphaned_pages().await?;
                    if orphans.is_empty() {
                        println!("No orphaned pages.");
                    }
                    for slug in orphans {
                        println!("  - {}", slug);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_results(results: &[ItemResult]) {
    for result in results {
        let icon = match result.status {
            ItemStatus::Success => "●",
            ItemStatus::Skipped => "○",
            ItemStatus::Failed => "✗",
        };
        match &result.detail {
            Some(detail) => println!("{} {} ({}ms): {}", icon, result.slug, result.duration_ms, detail),
            None => println!("{} {} ({}ms)", icon, result.slug, result.duration_ms),
        }
    }
}
