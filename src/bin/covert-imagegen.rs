use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use covert_imagegen::{
    ClientConfig, Collaborators, CovertClient, DeniedNotice, HostVerdicts, KeyPool,
    LockdownSurface, StaticResolver,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolverKind {
    /// Derive the real endpoint from the nominal one.
    Eliding,
    /// Use the base URL as given.
    Static,
}

#[derive(Parser)]
#[command(name = "covert-imagegen", about = "Pinned image generation client")]
struct Args {
    /// Prompt describing the image
    prompt: String,

    /// Nominal service base URL
    #[arg(long, env = "COVERT_BASE_URL")]
    base_url: String,

    /// Accepted certificate fingerprint, `sha256/<base64>` or hex (can be repeated)
    #[arg(long = "pin", env = "COVERT_PINS", value_delimiter = ',', required = true)]
    pins: Vec<String>,

    /// Newline-delimited credential pool
    #[arg(long, env = "COVERT_KEY_POOL")]
    key_pool: PathBuf,

    /// How the real endpoint is derived from the base URL
    #[arg(long, env = "COVERT_RESOLVER", value_enum, default_value_t = ResolverKind::Eliding)]
    resolver: ResolverKind,

    /// Keep background traffic running while the request is in flight
    #[arg(long, env = "COVERT_NOISE")]
    noise: bool,
}

/// Terminal stand-in for a UI surface.
struct StderrSurface;

impl LockdownSurface for StderrSurface {
    fn present(&self, notice: &DeniedNotice) {
        eprintln!("{}", notice.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let pool = KeyPool::load_from_path(&args.key_pool)
        .with_context(|| format!("loading key pool from {}", args.key_pool.display()))?;
    let mut builder = ClientConfig::builder()
        .nominal_base(args.base_url.clone())
        .key_pool(pool);
    for pin in &args.pins {
        builder = builder.pin(pin).context("parsing --pin")?;
    }
    let config = builder.build()?;

    let mut collaborators = Collaborators::live(&config)?;
    if let ResolverKind::Static = args.resolver {
        collaborators.resolver = Arc::new(StaticResolver::parse(&args.base_url)?);
    }

    let client = CovertClient::new(config, collaborators);
    client.attach_surface(Arc::new(StderrSurface));
    if args.noise {
        client.startup(HostVerdicts::default()).await?;
    } else {
        client.startup_without_noise(HostVerdicts::default()).await?;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let url = client
        .generate_image_cancellable(&args.prompt, &cancel)
        .await;
    client.shutdown();

    match url {
        Some(url) => {
            println!("{url}");
            Ok(())
        }
        None => anyhow::bail!("image generation failed"),
    }
}
