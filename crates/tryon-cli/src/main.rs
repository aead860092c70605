use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tryon_contracts::{Catalog, ErrorKind, TryOnError};
use tryon_engine::{
    analyze_photo, deliver, session_event_writer, Delivered, DryrunModel, GeminiConfig,
    GeminiModel, GenerationClient, GenerativeModel, LocalFirstImageSource, OutputMode,
    RequestBuilder, SubjectPhoto, TryOnService,
};

#[derive(Debug, Parser)]
#[command(name = "tryon-rs", version, about = "Virtual try-on against a generative image model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dress the person in a photo with a catalog product.
    TryOn(TryOnArgs),
    /// Describe the person in a photo.
    Analyze(AnalyzeArgs),
    /// List catalog products.
    Products(ProductsArgs),
}

#[derive(Debug, Args)]
struct ModelArgs {
    /// Use the offline dry-run model instead of Gemini.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct TryOnArgs {
    #[arg(long)]
    photo: PathBuf,
    #[arg(long)]
    product: String,
    #[arg(long, default_value = "catalog.json")]
    catalog: PathBuf,
    /// Root that catalog image paths are relative to.
    #[arg(long, default_value = "public")]
    public_dir: PathBuf,
    /// Base URL tried when a product image is missing locally.
    #[arg(long)]
    remote_base: Option<String>,
    #[arg(long, default_value = "public/downloads")]
    out: PathBuf,
    /// Print a data URL instead of writing a file.
    #[arg(long)]
    inline: bool,
    /// Extra styling instruction appended after the images.
    #[arg(long)]
    note: Option<String>,
    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    photo: PathBuf,
    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Debug, Parser)]
struct ProductsArgs {
    #[arg(long, default_value = "catalog.json")]
    catalog: PathBuf,
}

const EXIT_USER_ERROR: i32 = 2;
const EXIT_SERVICE_ERROR: i32 = 1;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tryon-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::TryOn(args) => run_try_on(args),
        Command::Analyze(args) => run_analyze(args),
        Command::Products(args) => run_products(args),
    }
}

fn run_try_on(args: TryOnArgs) -> Result<i32> {
    let catalog = Catalog::load(&args.catalog)?;
    let mut images = LocalFirstImageSource::new(&args.public_dir);
    if let Some(base) = args.remote_base.as_deref() {
        images = images.with_remote_base(base);
    }
    let service = build_service(catalog, images, &args.model)?;
    let photo = SubjectPhoto::from_path(&args.photo)?;

    let generated = match service.try_on(photo, &args.product, args.note.as_deref()) {
        Ok(generated) => generated,
        Err(err) => return Ok(report_failure(&err)),
    };

    let mode = if args.inline {
        OutputMode::Inline
    } else {
        OutputMode::File {
            dir: args.out.clone(),
        }
    };
    let summary = match deliver(&generated.image, &mode)? {
        Delivered::File { path, reference } => json!({
            "ok": true,
            "attempts": generated.attempts,
            "mime_type": generated.image.mime_type(),
            "path": path.display().to_string(),
            "result": reference,
        }),
        Delivered::Inline { data_url } => json!({
            "ok": true,
            "attempts": generated.attempts,
            "mime_type": generated.image.mime_type(),
            "result": data_url,
        }),
    };
    println!("{summary}");
    Ok(0)
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let photo = SubjectPhoto::from_path(&args.photo)?;
    let events = args.model.events.as_deref().map(session_event_writer);
    let mut client = GenerationClient::new(build_model(&args.model)?);
    if let Some(events) = events.clone() {
        client = client.with_events(events);
    }
    match analyze_photo(&client, events.as_ref(), photo) {
        Ok(description) => {
            println!("{}", json!({ "ok": true, "description": description }));
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

fn run_products(args: ProductsArgs) -> Result<i32> {
    let catalog = Catalog::load(&args.catalog)?;
    for product in catalog.list() {
        let stock = if product.in_stock { "in stock" } else { "out of stock" };
        println!(
            "{}\t{}\t{:.2}\t{}\t{}",
            product.id,
            product.name,
            product.price,
            product.category,
            stock
        );
    }
    Ok(0)
}

fn build_service(
    catalog: Catalog,
    images: LocalFirstImageSource,
    args: &ModelArgs,
) -> Result<TryOnService> {
    let model = build_model(args)?;
    debug!(provider = model.name(), model = model.model_id(), "model ready");
    let builder = RequestBuilder::new(Box::new(catalog), Box::new(images));
    let mut service = TryOnService::new(builder, GenerationClient::new(model));
    if let Some(path) = args.events.as_deref() {
        service = service.with_events(session_event_writer(path));
    }
    Ok(service)
}

fn build_model(args: &ModelArgs) -> Result<Box<dyn GenerativeModel>> {
    if args.dryrun {
        return Ok(Box::new(DryrunModel::new()));
    }
    let config = GeminiConfig::from_env().context("cannot configure Gemini")?;
    Ok(Box::new(GeminiModel::new(config)?))
}

fn report_failure(err: &TryOnError) -> i32 {
    let kind = err.kind();
    eprintln!("{}", user_message(err));
    println!(
        "{}",
        json!({ "ok": false, "kind": kind, "error": err.to_string() })
    );
    if kind.is_user_correctable() {
        EXIT_USER_ERROR
    } else {
        EXIT_SERVICE_ERROR
    }
}

fn user_message(err: &TryOnError) -> String {
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::ProductNotFound | ErrorKind::ProductUnavailable => {
            format!("Your input was invalid: {err}.")
        }
        ErrorKind::NoImageGenerated | ErrorKind::NoOutput => {
            "The service could not produce a result. Try a different photo.".to_string()
        }
        ErrorKind::TransportError => {
            "The image service is unavailable right now. Try again later.".to_string()
        }
    }
}
