use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::signals;
use spindle_core::{
    ControlProfile, ControllerContext, Correction, CorrectionStrategy, DropoutPolicy, HalError,
    ProfileError, SimulatedRig, TimeBase,
};
use spindle_link::metrics::{init_metrics, serve_metrics};
use spindle_link::{run_link, LinkConfig, LinkError, LinkSummary, TcpTransport};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Failures that prevent the controller from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to load profile {}: {source}", path.display())]
    Profile {
        path: PathBuf,
        #[source]
        source: ProfileError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidOverride(#[source] ProfileError),

    #[error("Unknown strategy '{0}' (expected pid, hysteretic or feedforward)")]
    UnknownStrategy(String),

    #[error("Hardware initialization failed: {0}")]
    Hal(#[from] HalError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Failed to start background thread: {0}")]
    Thread(#[from] io::Error),
}

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = match init_tracing(config.json_logs, config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("spindle-ctl: failed to open log file: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Startup failed");
            eprintln!("spindle-ctl: {e}");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<LinkSummary, StartupError> {
    init_metrics();
    if let Some(addr) = &config.metrics_addr {
        info!(addr = %addr, "Starting metrics server");
        let _handle = serve_metrics(addr.clone());
    }

    let profile = build_profile(&config)?;
    info!(
        strategy = profile.strategy.name(),
        tick_period_ms = profile.tick_period_ms,
        dropout_policy = ?profile.tachometer.dropout_policy,
        "Profile loaded"
    );

    let rig = SimulatedRig::new(TimeBase::new(), profile.plant);
    let mut ctx = ControllerContext::new(rig, &profile)?;
    info!(pins = ?profile.pins, "Hardware initialized");

    let mut transport = TcpTransport::bind(&config.bind_addr)?;
    info!(addr = %config.bind_addr, "Listening for clients");

    let stop = Arc::new(AtomicBool::new(false));
    signals::spawn_signal_listener(Arc::clone(&stop))?;
    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        signals::spawn_deadline(Arc::clone(&stop), Duration::from_secs(seconds))?;
    }

    let link_config = LinkConfig {
        telemetry_interval: Duration::from_millis(config.telemetry_ms.max(1)),
        ..LinkConfig::default()
    };
    let summary = run_link(&mut ctx, &mut transport, &link_config, &stop);

    let stats = ctx.stats();
    info!(
        ticks_executed = stats.ticks_executed,
        readings_rejected = stats.readings_rejected,
        commands_executed = stats.commands_executed,
        all_stops = stats.all_stops,
        max_tick_lateness_us = stats.max_tick_lateness_us,
        connections = summary.connections,
        "Run complete"
    );
    Ok(summary)
}

fn build_profile(config: &RuntimeConfig) -> Result<ControlProfile, StartupError> {
    let mut profile = match &config.profile_path {
        Some(path) => {
            ControlProfile::from_json_file(path).map_err(|source| StartupError::Profile {
                path: path.clone(),
                source,
            })?
        }
        None => ControlProfile::default(),
    };

    if let Some(name) = &config.strategy {
        profile.strategy =
            Correction::from_name(name).ok_or_else(|| StartupError::UnknownStrategy(name.clone()))?;
    }
    if let Some(ms) = config.tick_ms {
        profile.tick_period_ms = ms;
    }
    if config.reject_dropouts {
        profile.tachometer.dropout_policy = DropoutPolicy::RejectWhileDriving;
    }

    profile.validate().map_err(StartupError::InvalidOverride)?;
    Ok(profile)
}
