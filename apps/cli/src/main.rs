mod args;
mod config;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use monitor_app::config::{MonitorConfig, PlatformSelection};
use monitor_app::driver::Monitor;
use monitor_app::plans::PlanId;
use monitor_core::Platform;
use monitor_ingest::default_claude_root;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match args::parse_args() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            args::print_help();
            return ExitCode::from(1);
        }
    };

    let last_used = config::load_last_used();
    let monitor_config = match build_config(&cli, &last_used) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    let tz: Tz = match monitor_config.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            eprintln!("unknown timezone: {}", monitor_config.timezone);
            return ExitCode::from(1);
        }
    };

    // A platform the user explicitly asked for must have its source
    // directory; under `all` the other provider keeps running without it.
    if monitor_config.platforms.includes(Platform::Claude) {
        let root = monitor_config
            .claude_root
            .clone()
            .unwrap_or_else(default_claude_root);
        if !root.is_dir() {
            if monitor_config.platforms == PlatformSelection::Claude {
                eprintln!("claude source directory missing: {}", root.display());
                return ExitCode::from(2);
            }
            eprintln!(
                "warning: claude source directory missing: {} (continuing without it)",
                root.display()
            );
        }
    }

    if !cli.no_save {
        if let Err(err) = config::save_last_used(&to_last_used(&monitor_config)) {
            eprintln!("warning: {err}");
        }
    }

    let monitor = match Monitor::new(monitor_config) {
        Ok(monitor) => monitor,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };
    let mut reader = monitor.reader();
    let cancel = CancellationToken::new();
    let driver = tokio::spawn(monitor.run(cancel.clone()));

    println!("GenAI usage monitor running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
            changed = reader.changed() => {
                if !changed {
                    break;
                }
                render::print_snapshot(&reader.snapshot(), &tz);
            }
        }
    }
    let _ = driver.await;
    ExitCode::SUCCESS
}

/// CLI flags override persisted flags, which override defaults. Validation
/// happens once the merged config is built.
fn build_config(cli: &args::CliArgs, last_used: &config::LastUsed) -> Result<MonitorConfig, String> {
    let mut config = MonitorConfig::default();
    if let Some(platform) = cli.platform.as_deref().or(last_used.platform.as_deref()) {
        config.platforms = PlatformSelection::parse(platform)
            .ok_or_else(|| format!("unknown platform: {platform}"))?;
    }
    if let Some(plan) = cli.plan.as_deref().or(last_used.plan.as_deref()) {
        config.plan = PlanId::parse(plan).ok_or_else(|| format!("unknown plan: {plan}"))?;
    }
    config.custom_limit_tokens = cli.custom_limit_tokens;
    config.custom_limit_cost = cli.custom_limit_cost;
    if let Some(rate) = cli.refresh_rate.or(last_used.refresh_rate) {
        config.refresh_rate_secs = rate;
    }
    if let Some(timezone) = cli.timezone.as_deref().or(last_used.timezone.as_deref()) {
        config.timezone = timezone.to_string();
    }
    if let Some(hour) = cli.reset_hour.or(last_used.reset_hour) {
        config.reset_hour = hour;
    }
    if let Some(dir) = cli.claude_dir.as_deref() {
        config.claude_root = Some(PathBuf::from(dir));
    }
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

fn to_last_used(config: &MonitorConfig) -> config::LastUsed {
    config::LastUsed {
        platform: Some(config.platforms.as_str().to_string()),
        plan: Some(config.plan.as_str().to_string()),
        refresh_rate: Some(config.refresh_rate_secs),
        timezone: Some(config.timezone.clone()),
        reset_hour: Some(config.reset_hour),
    }
}
