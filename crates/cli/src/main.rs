use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use polio_metrics::TracingService;
use polio_models::FeatureCollection;
use polio_packaging::{BuildContext, BuildOptions, ContainerDescriptor, ImageBuilder, ImageInspector};
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "polio-cli")]
#[command(about = "Build, check and query PolioAPI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "http://localhost:8001", global = true)]
    endpoint: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    /// Python service: python:3.9-slim, pip install, `python app.py`
    PythonApp,
    /// Rust server built from this repository
    PolioApi,
}

impl Preset {
    fn descriptor(self) -> Result<ContainerDescriptor> {
        let name = self
            .to_possible_value()
            .map(|value| value.get_name().to_string())
            .ok_or_else(|| anyhow!("preset {:?} has no name", self))?;
        ContainerDescriptor::preset(&name).ok_or_else(|| anyhow!("unknown preset: {}", name))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Dockerfile for a preset
    Dockerfile {
        #[arg(long, value_enum, default_value = "polio-api")]
        preset: Preset,
    },
    /// Check a build context against a preset and print its fingerprint
    Context {
        /// Build context directory
        dir: PathBuf,
        #[arg(long, value_enum, default_value = "polio-api")]
        preset: Preset,
    },
    /// Build an image from a context directory
    Build {
        /// Build context directory
        dir: PathBuf,
        /// Image tag
        #[arg(long, default_value = "polio-api:latest")]
        tag: String,
        #[arg(long, value_enum, default_value = "polio-api")]
        preset: Preset,
        /// Rebuild every layer
        #[arg(long)]
        no_cache: bool,
    },
    /// Check a built image's working dir, env, ports and command
    Verify {
        /// Image tag
        #[arg(long, default_value = "polio-api:latest")]
        tag: String,
        #[arg(long, value_enum, default_value = "polio-api")]
        preset: Preset,
    },
    /// Fetch the merged GeoJSON from a running service
    Fetch {
        /// Print the whole FeatureCollection instead of a summary
        #[arg(long)]
        raw: bool,
    },
    /// Ask a running service to refetch its sources
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    TracingService::init_compact().map_err(|e| anyhow!(e))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Dockerfile { preset } => {
            let descriptor = preset.descriptor()?;
            descriptor.validate()?;
            print!("{}", descriptor.render());
        }
        Commands::Context { dir, preset } => check_context(dir, preset)?,
        Commands::Build {
            dir,
            tag,
            preset,
            no_cache,
        } => build(dir, tag, preset, no_cache).await?,
        Commands::Verify { tag, preset } => verify(tag, preset).await?,
        Commands::Fetch { raw } => fetch(&Client::new(), &cli.endpoint, raw).await?,
        Commands::Update => update(&Client::new(), &cli.endpoint).await?,
    }

    Ok(())
}

fn check_context(dir: PathBuf, preset: Preset) -> Result<()> {
    let context = BuildContext::scan(&dir)?;
    let report = preset.descriptor()?.validate_context(&context)?;

    println!("context:     {}", dir.display());
    println!("files:       {}", report.files);
    println!("fingerprint: {}", report.fingerprint);
    if let Some(entrypoint) = report.missing_entrypoint {
        println!("warning:     {entrypoint} is missing; the container will exit at start");
    }
    Ok(())
}

async fn build(dir: PathBuf, tag: String, preset: Preset, no_cache: bool) -> Result<()> {
    let context = BuildContext::scan(&dir)?;
    let descriptor = preset.descriptor()?;
    let built = ImageBuilder::default()
        .build_image(&descriptor, &context, &tag, &BuildOptions { no_cache })
        .await
        .with_context(|| format!("building {tag} from {}", dir.display()))?;

    println!("Built {} (context {})", built.tag, built.context_fingerprint);
    if let Some(entrypoint) = built.missing_entrypoint {
        println!("warning: {entrypoint} is missing; the container will exit at start");
    }
    Ok(())
}

async fn verify(tag: String, preset: Preset) -> Result<()> {
    let descriptor = preset.descriptor()?;
    let inspector = ImageInspector::connect()?;
    let image = inspector.inspect(&tag).await?;
    descriptor.runtime_contract().verify(&image)?;

    println!("{tag} matches the {} descriptor", descriptor.name);
    Ok(())
}

async fn fetch(client: &Client, endpoint: &str, raw: bool) -> Result<()> {
    let response = client.get(format!("{}/polio", endpoint)).send().await?;
    if !response.status().is_success() {
        let error_text = response.text().await?;
        bail!("Fetch failed: {}", error_text);
    }

    let body: Value = response.json().await?;
    if raw {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    if body.is_null() {
        println!("No data loaded; the service could not reach its sources");
        return Ok(());
    }

    let collection: FeatureCollection = serde_json::from_value(body)?;
    info!("Fetched {} features", collection.len());
    println!("{} features", collection.len());
    for feature in &collection.features {
        let iso3 = feature.properties.get("iso_3_code").and_then(Value::as_str).unwrap_or("?");
        let name = feature
            .properties
            .get("ADM0_NAME")
            .or_else(|| feature.properties.get("ADM0_NAME_y"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        println!("  {iso3}  {name}  ({})", feature.geometry.kind);
    }
    Ok(())
}

async fn update(client: &Client, endpoint: &str) -> Result<()> {
    let response = client.post(format!("{}/polio/update", endpoint)).send().await?;
    if !response.status().is_success() {
        let error_text = response.text().await?;
        bail!("Update failed: {}", error_text);
    }

    let body: Value = response.json().await?;
    println!("{}", body["message"].as_str().unwrap_or("Update requested"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_to_descriptors() {
        assert_eq!(Preset::PythonApp.descriptor().unwrap().name, "python-app");
        assert_eq!(Preset::PolioApi.descriptor().unwrap().name, "polio-api");
    }

    #[test]
    fn preset_flag_parses() {
        let cli = Cli::try_parse_from(["polio-cli", "dockerfile", "--preset", "python-app"]).unwrap();
        match cli.command {
            Commands::Dockerfile { preset } => {
                assert_eq!(preset.descriptor().unwrap().render(), ContainerDescriptor::python_app().render());
            }
            _ => panic!("expected dockerfile subcommand"),
        }
        assert_eq!(cli.endpoint, "http://localhost:8001");
    }
}
