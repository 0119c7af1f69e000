//! ACT point-cloud CLI entry point.
//!
//! This binary is the composition root for the point-cloud node. Responsibilities:
//!
//! 1. **Parse configuration**: load `.act/pointcloud.toml` (or `--config`),
//!    validate it, and apply command-line overrides.
//! 2. **Wire observability**: configure `tracing-subscriber` with a JSON or
//!    pretty layer on stderr and, when an endpoint is configured, an
//!    OpenTelemetry OTLP exporter. All `tracing` spans and structured events
//!    emitted by every crate in the workspace flow through this layer.
//! 3. **Construct infrastructure**: the native geometry backend, the host
//!    resource probe (live or simulated) and the shared cost model, injected
//!    into an `OperationDispatcher`.
//! 4. **Run one request**: read `{"params": {"operation": ...}}` from
//!    `--request` or stdin, execute it, and print the JSON response on stdout.
//!    Ctrl-C cancels long-running operations before their backend call.

mod config;

use std::io::Read as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use geometry::NativeBackend;
use nodes::{DispatcherConfig, OperationDispatcher, PointCloudNode};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use pointcloud::{CostModel, GeometryBackend, ResourceAnalyzer, ResourceProbe};
use probe::{FixedResourceProbe, NoGpuProbe, NvidiaSmiGpuProbe, SysinfoResourceProbe};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{CliConfig, LogFormat};

const SERVICE_NAME: &str = "act-pointcloud";

/// Execute one point-cloud request and print the response as JSON.
#[derive(Debug, Parser)]
#[command(name = "act-pointcloud", version, about)]
struct Args {
    /// Configuration file (defaults to .act/pointcloud.toml when present).
    #[arg(long, env = "ACT_POINTCLOUD_CONFIG")]
    config: Option<PathBuf>,

    /// Request JSON file; reads stdin when omitted or "-".
    #[arg(long)]
    request: Option<PathBuf>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// OTLP gRPC endpoint for span export.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Report this much available memory instead of probing the host.
    #[arg(long)]
    simulate_available_memory_gib: Option<f64>,

    /// Skip the nvidia-smi GPU query.
    #[arg(long)]
    no_gpu_detection: bool,

    /// Refuse instead of downsampling when an operation exceeds the memory budget.
    #[arg(long)]
    no_auto_optimize: bool,
}

impl Args {
    fn apply_to(&self, config: &mut CliConfig) {
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(endpoint) = &self.otlp_endpoint {
            config.telemetry.otlp_endpoint = Some(endpoint.clone());
        }
        if let Some(gib) = self.simulate_available_memory_gib {
            config.resources.simulate_available_memory_gib = Some(gib);
        }
        if self.no_gpu_detection {
            config.node.gpu_detection = false;
        }
        if self.no_auto_optimize {
            config.node.auto_optimize = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let mut config = CliConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;

    let provider = init_tracing(&config)?;
    let outcome = run(&args, &config).await;

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush spans: {e}");
        }
    }
    outcome
}

async fn run(args: &Args, config: &CliConfig) -> Result<ExitCode> {
    let request = read_request(args.request.as_ref())?;
    let node = build_node(config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling request");
            on_interrupt.cancel();
        }
    });

    let response = node.execute_with_cancellation(request, cancel).await;
    println!("{}", serde_json::to_string_pretty(&response.to_json())?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_request(path: Option<&PathBuf>) -> Result<Value> {
    let text = match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request file {}", path.display()))?,
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read request from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("request is not valid JSON")
}

fn build_probe(config: &CliConfig) -> Arc<dyn ResourceProbe> {
    if let Some(gib) = config.resources.simulate_available_memory_gib {
        info!(available_gib = gib, "using simulated host resources");
        return Arc::new(FixedResourceProbe::with_available_gib(gib));
    }
    if config.node.gpu_detection {
        Arc::new(SysinfoResourceProbe::new(Box::new(NvidiaSmiGpuProbe::new())))
    } else {
        Arc::new(SysinfoResourceProbe::new(Box::new(NoGpuProbe)))
    }
}

fn build_node(config: &CliConfig) -> PointCloudNode {
    let backend: Arc<dyn GeometryBackend> = Arc::new(NativeBackend::new());
    let analyzer = Arc::new(ResourceAnalyzer::new(Arc::new(CostModel::standard())));
    let dispatcher = OperationDispatcher::new(Some(backend), analyzer, build_probe(config))
        .with_config(DispatcherConfig {
            auto_optimize: config.node.auto_optimize,
        });
    PointCloudNode::new(dispatcher)
}

/// Installs the global subscriber. Returns the tracer provider to flush on
/// exit when OTLP export is enabled.
fn init_tracing(config: &CliConfig) -> Result<Option<TracerProvider>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.filter)
            .with_context(|| format!("invalid log filter '{}'", config.logging.filter))?,
    };

    let fmt_layer = match config.logging.format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    };

    let provider = match &config.telemetry.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .context("failed to build OTLP span exporter")?;
            Some(
                TracerProvider::builder()
                    .with_batch_exporter(exporter, runtime::Tokio)
                    .with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        SERVICE_NAME,
                    )]))
                    .build(),
            )
        }
        None => None,
    };
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(provider)
}
