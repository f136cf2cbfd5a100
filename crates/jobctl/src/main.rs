mod cli;
mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use jobctl_core::{
    CacheStatus, ExecutorStatus, FixedTtlDelegateIssuer, JobRequest, JobType, OwnerIdentity,
};
use jobctl_executor::{ExecutorJobInfo, FakeExecutor};
use jobctl_metadata::InMemoryMetadataClient;
use jobctl_processor::{JobProcessor, ProcessorConfig};

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::PrintConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run { jobs, timeout_secs } => {
            init_logging(&config.log.level);
            run_demo(config, jobs, Duration::from_secs(timeout_secs)).await
        }
    }
}

async fn run_demo(config: AppConfig, jobs: usize, timeout: Duration) -> anyhow::Result<()> {
    anyhow::ensure!(jobs > 0, "--jobs must be >= 1");

    let metadata = Arc::new(InMemoryMetadataClient::new());
    let executor = Arc::new(FakeExecutor::new());
    let processor = Arc::new(JobProcessor::new(
        metadata,
        executor.clone(),
        ProcessorConfig::default(),
    ));
    let delegate_issuer: Arc<dyn jobctl_core::DelegateIssuer> =
        Arc::new(FixedTtlDelegateIssuer { ttl: Duration::from_secs(3600) });

    let manager = jobctl_manager::start_manager(
        jobctl_cache::Cache::new(),
        processor.clone(),
        executor.clone() as Arc<dyn jobctl_executor::Executor>,
        delegate_issuer,
        config.poller.into_manager_config(),
    );
    let service = jobctl_api::JobService::new(processor, manager);

    println!("jobctl {} — submitting {jobs} demo job(s)", env!("CARGO_PKG_VERSION"));
    tracing::info!(jobs, "starting demo run");

    let mut job_keys = Vec::with_capacity(jobs);
    for i in 0..jobs {
        let request = JobRequest {
            job_type: JobType::RunModel,
            definition: serde_json::json!({ "model": format!("demo-model-{i}") }),
            requested_by: OwnerIdentity {
                user_id: "demo-user".to_string(),
                tenant: "demo-tenant".to_string(),
            },
            object_mapping: HashMap::new(),
        };
        let status = service.submit_job(request).await?;
        println!("submitted {} -> {:?}", status.job_key, status.trac_status);

        // Script the fake executor to run the job to completion so the demo
        // doesn't hang waiting for a real runtime: QUEUED -> RUNNING ->
        // SUCCEEDED, with an empty-but-valid job result waiting in the
        // result volume once `launchJob` creates it.
        executor.script_status(
            &status.job_key,
            vec![
                ExecutorJobInfo::new(ExecutorStatus::Queued),
                ExecutorJobInfo::new(ExecutorStatus::Running),
                ExecutorJobInfo::new(ExecutorStatus::Succeeded),
            ],
        );
        let result = jobctl_core::JobResultFile {
            result: serde_json::json!({ "status": "ok" }),
            object_ids: Vec::new(),
            objects: HashMap::new(),
            attrs: HashMap::new(),
        };
        let file_name = jobctl_core::result_file_name(&status.job_key);
        executor.seed_file(
            &status.job_key,
            jobctl_core::RESULT_VOLUME,
            &file_name,
            serde_json::to_vec(&result)?,
        );

        job_keys.push(status.job_key);
    }

    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_seen: HashMap<jobctl_core::JobKey, CacheStatus> = HashMap::new();
    loop {
        let mut all_scheduled_for_removal = true;
        for job_key in &job_keys {
            let selector = jobctl_api::JobSelector { job_key: job_key.clone() };
            match service.check_job(&selector) {
                Ok(status) => {
                    let cache_status = service
                        .manager()
                        .cache()
                        .get_latest_entry(job_key)
                        .map(|e| e.status);
                    if let Some(cache_status) = cache_status {
                        if last_seen.get(job_key) != Some(&cache_status) {
                            println!(
                                "{job_key}: {cache_status:?} (trac={:?})",
                                status.trac_status
                            );
                            tracing::debug!(%job_key, ?cache_status, trac_status = ?status.trac_status, "cache status transition");
                            last_seen.insert(job_key.clone(), cache_status);
                        }
                        if cache_status != CacheStatus::RemovalScheduled {
                            all_scheduled_for_removal = false;
                        }
                    }
                }
                Err(_) => {
                    // Already removed after its retention delay; nothing
                    // further to observe for this job.
                }
            }
        }

        if all_scheduled_for_removal {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            println!("timed out waiting for jobs to finish");
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    service.into_manager().shutdown().await;
    Ok(())
}
