use crate::api::{ApiCommand, ApiServer, RecordingState};
use crate::capture::ProcessCapturer;
use crate::cli::RecordArgs;
use crate::config::Config;
use crate::recording::{
    Finalizer, MonitorSchedule, NoopFinalizer, RecordingParams, RecordingService, ScriptFinalizer,
    ServiceStatus, StatusHandler,
};
use crate::session::{CallParams, ScriptCallSession};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Why the app loop decided to stop the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    Requested,
    Terminal(ServiceStatus),
}

/// Record one call until interrupted, stopped over the API, or ended by the
/// job itself. Returns the job's terminal status.
pub async fn run_recording(config: Config, args: RecordArgs) -> Result<ServiceStatus> {
    let params = build_params(&config, &args)?;
    info!(
        "Recording {} into {:?} (max {} restarts)",
        params.call.url, params.output_dir, params.max_restarts
    );

    let (status_tx, mut status_rx) = mpsc::channel::<ServiceStatus>(1);
    let handler: StatusHandler = Arc::new(move |status| {
        if let Err(e) = status_tx.try_send(status) {
            warn!("Failed to forward service status {}: {}", status, e);
        }
    });

    let mut service = RecordingService::new(
        params,
        Arc::new(ScriptCallSession::new(config.session.clone())),
        Box::new(ProcessCapturer::new(&config.capture)),
        build_finalizer(&config),
        handler,
    );

    service
        .start()
        .await
        .context("Failed to start recording")?;

    let (tx, mut rx) = mpsc::channel::<ApiCommand>(10);
    let api_task = if config.api.enabled {
        let api_server = ApiServer::new(
            config.api.port,
            RecordingState {
                tx,
                status: service.state(),
                job_id: service.job_id(),
                call_url: service.params().call.url.clone(),
            },
        );
        Some(tokio::spawn(async move {
            if let Err(e) = api_server.start().await {
                error!("API server failed: {:#}", e);
            }
        }))
    } else {
        drop(tx);
        None
    };

    info!(job_id = %service.job_id(), "Recording. Press Ctrl-C to stop.");

    let reason = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            StopReason::Interrupted
        }
        Some(status) = status_rx.recv() => StopReason::Terminal(status),
        Some(ApiCommand::StopRecording) = rx.recv() => StopReason::Requested,
    };
    info!(job_id = %service.job_id(), "Stopping recording: {:?}", reason);

    service.stop().await;

    if let Some(task) = api_task {
        task.abort();
    }

    let status = service.status().unwrap_or(ServiceStatus::Error);
    info!(job_id = %service.job_id(), "Recording job ended: {}", status);
    Ok(status)
}

fn build_params(config: &Config, args: &RecordArgs) -> Result<RecordingParams> {
    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => config.output.resolve_directory()?,
    };

    Ok(RecordingParams {
        call: CallParams {
            url: args.url.clone(),
            name: args.call_name(),
            username: args.username.clone(),
            password: args.password.clone(),
        },
        output_dir,
        extension: config.output.extension.clone(),
        monitor: MonitorSchedule::from(&config.monitor),
        max_restarts: args.max_restarts.unwrap_or(config.monitor.max_restarts),
    })
}

fn build_finalizer(config: &Config) -> Arc<dyn Finalizer> {
    match &config.finalize.command {
        Some(command) => Arc::new(ScriptFinalizer::new(
            command.clone(),
            config.finalize.timeout(),
        )),
        None => Arc::new(NoopFinalizer),
    }
}
