mod config;
mod github;
mod llm;
mod pr;
mod review;
mod webhook;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use review::ReviewRunner;

/// Sentinel-Reviewer — posts an AI-generated first-pass review on GitHub
/// pull requests: a summary plus one section per changed source file.
#[derive(Parser, Debug)]
#[command(name = "sentinel-reviewer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server (POST /webhook/github)
    Serve,

    /// Review a single pull request now
    Review {
        /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
        pr_url: String,

        /// App installation to authenticate as (0 uses GITHUB_TOKEN)
        #[arg(long, default_value_t = 0)]
        installation: u64,

        /// Print the composed comment instead of posting it
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load()?;

    match cli.command {
        Command::Serve => webhook::serve(&config).await?,
        Command::Review {
            pr_url,
            installation,
            dry_run,
        } => {
            let span = info_span!("review_once", pr_url = %pr_url, dry_run);
            review_once(&config, &pr_url, installation, dry_run)
                .instrument(span)
                .await?
        }
    }

    Ok(())
}

/// Fetch PR metadata and run the pipeline in the foreground.
async fn review_once(
    config: &config::Config,
    pr_url: &str,
    installation: u64,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("parsing PR URL");
    let parsed_url = pr::parse_pr_url(pr_url)?;
    debug!(
        owner = %parsed_url.owner,
        repo = %parsed_url.repo,
        pr = parsed_url.pr_number,
        "parsed PR URL"
    );

    info!("fetching pull request from GitHub");
    let client = github::GitHubClient::for_installation(&config.github, installation).await?;
    let pr_ref = client.fetch_pull_request(&parsed_url).await?;

    let generator = Arc::new(llm::OpenAiReviewer::new(&config.openai)?);
    let runner = review::GitHubReviewRunner::new(
        config.github.clone(),
        config.review.clone(),
        generator,
        dry_run,
    );

    let outcome = runner.review(pr_ref).await?;
    info!(%outcome, "done");
    Ok(())
}
