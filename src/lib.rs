// src/lib.rs

pub mod cli;
pub mod config;
pub mod device;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod service;
pub mod subsystem;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::device::Description;
use crate::fs::RealFileSystem;
use crate::service::{ConsoleObserver, NodeOpener, Service, ServiceOptions, Step};
use crate::subsystem::{DeviceSubsystem, SysfsSubsystem};
use crate::watch::{DeviceWatcher, WatchEvent};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the sysfs/netlink device subsystem
/// - the watcher with the configured match rules
/// - the lifecycle service (unless `--once`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let backend = cfg.backend();
    let subsystem: Arc<dyn DeviceSubsystem> = Arc::new(SysfsSubsystem::with_filesystem(
        Arc::new(RealFileSystem),
        backend.sysfs_root.clone(),
        backend.udev_data_dir.clone(),
        cfg.service().monitor_source,
    )?);
    let mut watcher = DeviceWatcher::with_subsystem(subsystem, cfg.match_rules());

    if args.once {
        for event in watcher.scan() {
            if let WatchEvent::Added(device) = event {
                print_device(&device);
            }
        }
        return Ok(());
    }

    let options = ServiceOptions {
        auto_quit: cfg.service().auto_quit,
    };
    let opener = NodeOpener::new(cfg.device().node_kind);
    let mut service = Service::new(watcher, opener, Box::new(ConsoleObserver), options);

    if service.init()? == Step::Quit {
        return Ok(());
    }
    info!(devices = service.registry().len(), "initial scan complete");

    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

/// An explicit `--config` must exist; the default path is optional.
fn load_config(path: Option<&str>) -> Result<ConfigFile> {
    match path {
        Some(path) => Ok(load_and_validate(PathBuf::from(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(load_and_validate(&path)?)
            } else {
                debug!(path = %path.display(), "no config file; using defaults");
                Ok(ConfigFile::default())
            }
        }
    }
}

fn print_device(device: &Description) {
    let node = device
        .devnode()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}  subsystem={} devtype={} node={}",
        device.devpath(),
        device.subsystem().unwrap_or("-"),
        device.devtype().unwrap_or("-"),
        node
    );
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("devwatch dry-run");
    println!("  service.auto_quit = {}", cfg.service().auto_quit);
    println!("  service.monitor_source = {:?}", cfg.service().monitor_source);
    println!("  backend.sysfs_root = {}", cfg.backend().sysfs_root.display());
    println!(
        "  backend.udev_data_dir = {}",
        cfg.backend().udev_data_dir.display()
    );
    println!("  device.node_kind = {:?}", cfg.device().node_kind);
    println!();

    let rules = cfg.match_rules();
    println!("match:");
    println!("  subsystem: {}", rules.subsystem_rule().unwrap_or("<any>"));
    println!("  devtype: {}", rules.devtype_rule().unwrap_or("<any>"));
    if !rules.tag_rules().is_empty() {
        println!("  tags: {:?}", rules.tag_rules());
    }
    for (key, value) in rules.property_rules() {
        println!("  property {key} = {value}");
    }
    for (key, value) in rules.attribute_rules() {
        println!("  attribute {key} = {value}");
    }

    debug!("dry-run complete (no devices touched)");
}
