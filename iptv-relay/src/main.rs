//! iptv-relay: health-scored IPTV source relay.
//!
//! Clients ask for a channel by key and are redirected to the best
//! reachable stream source, or served through a header-injecting proxy
//! when the source host requires it. A background pass probes every
//! source periodically and re-ranks each channel by success rate.

use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod checker;
mod config;
mod logging;
mod metrics;
mod scheduler;
mod source;
#[cfg(test)]
mod testutil;
mod web;

use checker::build_checker;
use config::{Args, ConfigFile, RelayConfig};
use metrics::RelayMetrics;
use scheduler::ScoringScheduler;
use source::{ChannelLoader, ProxyForwarder, SourceRegistry, SourceSelector};
use web::WebState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let file_config = match config::config_path(&args) {
        Some(path) => match config::load_config(&path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => ConfigFile::default(),
    };

    let config = match RelayConfig::resolve(&args, file_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    logging::init_logging(&config.log_dir, config.log_retention_days, &config.log_level)?;

    info!("iptv-relay starting...");
    info!("  Listen address: {}", config.listen);
    info!("  Channel document: {} (timeout {:?})", config.source, config.source_timeout);
    info!("  Proxy rules: {}", config.proxy_rules.len());
    info!("  Checker: {:?} (timeout {:?})", config.checker.kind, config.checker.timeout);
    info!("  Forward timeout: {:?}", config.forward_timeout);

    // Initial channel load; nothing to serve without it
    let loader = ChannelLoader::new(config.source.clone(), config.source_timeout)?;
    let sources = match loader.load().await {
        Ok(sources) => sources,
        Err(e) => {
            error!("Failed to load channel document: {}", e);
            return Err(e.into());
        }
    };
    let registry = Arc::new(SourceRegistry::with_sources(&sources).await?);
    info!("  Channels: {}", registry.channel_count().await);

    let rules = Arc::new(config.proxy_rules);
    let checker = build_checker(&config.checker)?;
    let metrics = RelayMetrics::new();

    let selector = SourceSelector::new(registry.clone(), rules.clone(), checker.clone());
    let forwarder = ProxyForwarder::new(rules.clone(), config.forward_timeout)?;
    let scheduler = Arc::new(ScoringScheduler::new(
        registry.clone(),
        rules,
        checker,
        metrics.clone(),
        config.scoring.clone(),
    ));

    // Start scoring scheduler if enabled
    if config.scoring.enabled {
        info!(
            "Starting scoring scheduler (interval: {}s, probe delay: {}ms)",
            config.scoring.interval_secs, config.scoring.probe_delay_ms
        );
        let _scheduler_handle = Arc::clone(&scheduler).start();
    } else {
        info!("Scoring scheduler disabled; passes run only when triggered");
    }

    let state = Arc::new(WebState::new(
        registry,
        selector,
        forwarder,
        scheduler.clone(),
        loader,
        metrics.clone(),
    ));

    web::start_web_server(config.listen, state).await?;

    scheduler.stop().await;
    metrics.print_report();
    info!("iptv-relay stopped");

    Ok(())
}
