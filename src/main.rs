use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use share_resolver::config;
use share_resolver::logging;
use share_resolver::{
    republish_status, HttpRepublisher, IdentifierExtractor, OutcomeView, RepublishRequest, ResolutionCascade,
};

#[derive(Debug, Parser)]
#[command(name = "share-resolver", version, about = "Resolve file share links into direct download URLs")]
struct Cli {
    /// Config file (defaults to $SHARE_RESOLVER_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the share identifier found in TEXT
    Extract { text: String },

    /// Run the resolution cascade on the link found in TEXT
    Resolve {
        text: String,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        /// Upload the resolved file to the configured video host
        #[arg(long)]
        republish: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging as early as possible.
    if let Err(err) = logging::init_logging() {
        eprintln!("share-resolver: {:#}", err);
    }

    match run(Cli::parse()).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("share-resolver error: {:#}", err);
            std::process::exit(1);
        }
    }
}

/// Ok(false) when the command ran but did not succeed
async fn run(cli: Cli) -> Result<bool> {
    let cfg = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load_or_default()?,
    };
    let extractor = IdentifierExtractor::new(cfg.hosts.clone());

    match cli.command {
        Command::Extract { text } => match extractor.extract(&text) {
            Some(id) => {
                println!("{}", id);
                Ok(true)
            }
            None => {
                println!("no recognized link");
                Ok(false)
            }
        },
        Command::Resolve { text, json, republish } => {
            let id = match extractor.require(&text) {
                Ok(id) => id,
                Err(e) => {
                    println!("{}", e);
                    return Ok(false);
                }
            };

            let republish_settings = cfg.republish.clone();
            let cascade = ResolutionCascade::standard(Arc::new(cfg));
            let outcome = cascade.resolve(&id).await;
            let view = outcome.view();

            if json {
                println!("{}", serde_json::to_string_pretty(&view).context("serialize outcome")?);
            } else {
                print_view(&view, outcome.strategy.as_deref());
            }

            if let (true, OutcomeView::Resolved { video_url, title, .. }) = (republish, &view) {
                let request = RepublishRequest {
                    url: video_url.clone(),
                    title: title.clone(),
                };
                match HttpRepublisher::new(republish_settings) {
                    Ok(republisher) => println!("{}", republish_status(&republisher, &request).await),
                    Err(e) => println!("upload failed ({}), direct link still works: {}", e, request.url),
                }
            }

            Ok(outcome.is_success())
        }
    }
}

fn print_view(view: &OutcomeView, strategy: Option<&str>) {
    match view {
        OutcomeView::Resolved { video_url, title, size_label } => {
            println!("url:   {}", video_url);
            if let Some(title) = title {
                println!("title: {}", title);
            }
            if let Some(size) = size_label {
                println!("size:  {}", size);
            }
            if let Some(strategy) = strategy {
                println!("via:   {}", strategy);
            }
        }
        OutcomeView::Failed { debug_trail, reason } => {
            println!("resolution failed");
            if let Some(reason) = reason {
                println!("reason: {}", reason.description());
                for hint in reason.suggestions() {
                    println!("  - {}", hint);
                }
            }
            for entry in debug_trail {
                println!("  {}", entry);
            }
        }
    }
}
