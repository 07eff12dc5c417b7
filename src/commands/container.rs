use anyhow::Result;

use super::remote_run::ensure_project_exists;
use super::{existing_or_new_bundle, Context};
use crate::api::{ApiClient, ContainerRunRequest};
use crate::cli::{ContainerBuildArgs, ContainerRemoteRunArgs};
use crate::config::Config;
use crate::container::{DockerEngine, ImageBuilder, RegistryAuth};
use crate::monitor::{MonitorOptions, MonitorOutcome, RemoteMonitor};

fn image_builder(config: &Config) -> ImageBuilder {
    ImageBuilder::new(Box::new(DockerEngine::new(&config.docker_host)))
}

pub async fn build(ctx: &Context, args: ContainerBuildArgs) -> Result<i32> {
    let mut settings = args.config.to_settings();
    if args.docker_host.is_some() {
        settings.docker_host = args.docker_host;
    }
    let config = ctx.load_config(settings)?;

    let (bundle, _guard) =
        existing_or_new_bundle(&config, args.bundle, args.fuzz_tests, args.revision).await?;
    let image_id = image_builder(&config).build_image_from_bundle(&bundle).await?;
    println!("{image_id}");
    Ok(0)
}

pub async fn remote_run(ctx: &Context, args: ContainerRemoteRunArgs) -> Result<i32> {
    let monitor = args.monitor
        || args.monitor_duration.is_some()
        || args.min_finding_severity.is_some();

    let mut settings = args.config.to_settings();
    args.remote.apply(&mut settings);
    if args.registry.is_some() {
        settings.registry = args.registry;
    }
    if args.docker_host.is_some() {
        settings.docker_host = args.docker_host;
    }
    if args.monitor_duration.is_some() {
        settings.monitor_duration = args.monitor_duration;
    }
    if args.min_finding_severity.is_some() {
        settings.min_finding_severity = args.min_finding_severity;
    }
    let config = ctx.load_config(settings)?;

    let server = config.require_server()?;
    let project = config.require_project()?;
    let registry = config.require_registry()?;
    let client = ApiClient::from_server(server)?;
    ensure_project_exists(&client, &config).await?;

    let fuzz_tests = args.fuzz_tests.clone();
    let (bundle, _guard) =
        existing_or_new_bundle(&config, args.bundle, args.fuzz_tests, args.revision).await?;

    let builder = image_builder(&config);
    let image_id = builder.build_image_from_bundle(&bundle).await?;
    let image_name = project.trim_start_matches("projects/");
    let image = builder
        .upload_image(&image_id, registry, image_name, &RegistryAuth::from_env(registry))
        .await?;

    let run = client
        .start_container_run(&ContainerRunRequest {
            image,
            project: project.to_string(),
            fuzz_tests,
        })
        .await?;

    if args.remote.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        tracing::info!(run = %run.nid, "Started fuzzing run, view findings and coverage at:");
        println!("{}/app/{}/runs", client.server(), project);
    }

    if !monitor {
        return Ok(0);
    }

    let options = MonitorOptions {
        duration: config.monitor_duration,
        min_severity: config.min_finding_severity,
        ..Default::default()
    };
    let outcome = RemoteMonitor::new(&client, options).monitor(&run.nid).await?;
    match outcome {
        MonitorOutcome::FindingsReported(findings) if args.remote.json => {
            println!("{}", serde_json::to_string_pretty(&findings)?);
        }
        MonitorOutcome::TimedOut | MonitorOutcome::Stopped => {
            tracing::info!("Run finished or timed out");
        }
        _ => {}
    }
    Ok(0)
}
