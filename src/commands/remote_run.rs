use anyhow::Result;

use super::{existing_or_new_bundle, Context};
use crate::api::ApiClient;
use crate::cli::RemoteRunArgs;
use crate::config::{Config, ConfigError};

pub async fn run(ctx: &Context, args: RemoteRunArgs) -> Result<i32> {
    let mut settings = args.config.to_settings();
    args.remote.apply(&mut settings);
    let config = ctx.load_config(settings)?;

    let server = config.require_server()?;
    let project = config.require_project()?;
    let client = ApiClient::from_server(server)?;
    ensure_project_exists(&client, &config).await?;

    let (bundle, _guard) =
        existing_or_new_bundle(&config, args.bundle, args.fuzz_tests, args.revision).await?;

    let artifact = client.upload_bundle(project, &bundle).await?;
    tracing::info!(artifact = %artifact.resource_name, "Uploaded bundle");
    let run = client.start_remote_run(&artifact).await?;

    if args.remote.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        tracing::info!("Started fuzzing run, view findings and coverage at:");
        println!("{}", dashboard_url(client.server(), &run.name));
    }
    Ok(0)
}

pub(crate) fn dashboard_url(server: &str, run_name: &str) -> String {
    format!(
        "{}/dashboard/{}/overview?origin=cli",
        server.trim_end_matches('/'),
        run_name.trim_start_matches('/')
    )
}

/// Fail early when the configured project is not on the server
pub(crate) async fn ensure_project_exists(client: &ApiClient, config: &Config) -> Result<()> {
    let project = config.require_project()?;
    let projects = client.list_projects().await?;
    if projects.iter().any(|p| p.name == project) {
        return Ok(());
    }
    let available: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
    Err(ConfigError::InvalidValue {
        key: "project",
        value: project.to_string(),
        reason: if available.is_empty() {
            "no projects are available on the server".to_string()
        } else {
            format!("available projects: {}", available.join(", "))
        },
    }
    .into())
}
