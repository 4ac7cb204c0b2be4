//! ovn-scale entry point.
//!
//! Loads the deployment and task files named by the environment, runs the
//! routed-network workload and logs a summary. Logs go to stderr.

use anyhow::Context;
use ovn_scale::{run_task, ScaleConfig, TaskDescription};
use ovn_scale_core::{DeploymentDescription, Scenario};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("ovn_scale=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ScaleConfig::from_env();
    tracing::info!(?config, "Configuration loaded");
    config.validate_warn();

    let deployment = DeploymentDescription::load(&config.deployment_path).with_context(|| {
        format!("loading deployment {}", config.deployment_path.display())
    })?;
    let task = TaskDescription::load(&config.task_path)?;

    let task_id = config.task_id.unwrap_or_else(Uuid::new_v4);
    let mut scenario = Scenario::from_store(
        &deployment,
        config.transport.connector(),
        task_id,
        0,
    )?;
    tracing::info!(
        task = %task_id,
        sandboxes = scenario.context().sandboxes.len(),
        iterations = config.iterations,
        "Starting workload"
    );

    let result = run_task(&mut scenario, &task, config.iterations);
    scenario.clear();
    let report = result?;

    let total: std::time::Duration = report.iterations.iter().sum();
    tracing::info!(
        iterations = report.iterations.len(),
        switches = report.switches,
        gateways = report.gateways,
        ports = report.ports,
        bound = report.bound,
        total_ms = total.as_millis() as u64,
        "Workload complete"
    );
    Ok(())
}
