//! itinerary – command-line itinerary PDF generator and image proxy.
//!
//! Usage:
//!   itinerary <package.json> [output.pdf] [--proxy URL] [--asset-base URL]
//!             [--scale N] [--font PATH] [--settle-ms N]
//!   itinerary plan <package.json>
//!   itinerary serve [--bind ADDR] [--allow-host HOST]...
//!
//! If `output.pdf` is omitted the PDF is written to the current directory as
//! `<slug>-itinerary.pdf`.

use std::{env, fs, path::PathBuf, process, time::Duration};

use itinerary_forge::package::{normalize, AssetResolver};
use itinerary_forge::pagination::plan_pages;
use itinerary_forge::pipeline::{CancelFlag, Generator, GeneratorConfig};
use itinerary_forge::proxy::{self, ProxyConfig};
use itinerary_forge::ItineraryError;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("itinerary");
    let rest = args.get(2..).unwrap_or(&[]);

    let outcome = match args.get(1).map(String::as_str) {
        Some("generate") => generate(rest).await,
        Some("plan") => plan(rest),
        Some("serve") => serve(rest).await,
        Some("--help" | "-h") => {
            print_usage(prog);
            return;
        }
        Some(_) => generate(&args[1..]).await,
        None => Err(CliError::Usage("no package file specified".into())),
    };

    match outcome {
        Ok(()) => {}
        Err(CliError::Usage(msg)) => {
            eprintln!("Error: {msg}");
            print_usage(prog);
            process::exit(2);
        }
        Err(CliError::Run(e)) => {
            log::debug!("{e:?}");
            eprintln!("{}", e.user_message());
            eprintln!("  ({e})");
            process::exit(1);
        }
    }
}

enum CliError {
    Usage(String),
    Run(ItineraryError),
}

impl From<ItineraryError> for CliError {
    fn from(e: ItineraryError) -> Self {
        Self::Run(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Run(e.into())
    }
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String, CliError> {
    iter.next()
        .cloned()
        .ok_or_else(|| CliError::Usage(format!("{flag} needs a value")))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, CliError> {
    value
        .parse()
        .map_err(|_| CliError::Usage(format!("{flag}: '{value}' is not a number")))
}

fn read_record(path: &PathBuf) -> Result<serde_json::Value, CliError> {
    let text = fs::read_to_string(path).map_err(|e| {
        CliError::Usage(format!("cannot read '{}': {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&text).map_err(ItineraryError::from)?)
}

async fn generate(args: &[String]) -> Result<(), CliError> {
    let mut config = GeneratorConfig::from_env()?;
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--proxy" => config.proxy_base = Some(flag_value(&mut iter, arg)?),
            "--asset-base" => config.asset_base = flag_value(&mut iter, arg)?,
            "--scale" => config.scale = parse_number(&flag_value(&mut iter, arg)?, arg)?,
            "--font" => config.font_path = Some(PathBuf::from(flag_value(&mut iter, arg)?)),
            "--settle-ms" => {
                let ms: u64 = parse_number(&flag_value(&mut iter, arg)?, arg)?;
                config.settle_delay = Duration::from_millis(ms);
            }
            other if other.starts_with('-') => {
                return Err(CliError::Usage(format!("Unknown flag: {other}")))
            }
            path if input.is_none() => input = Some(PathBuf::from(path)),
            path if output.is_none() => output = Some(PathBuf::from(path)),
            path => return Err(CliError::Usage(format!("Unexpected argument: {path}"))),
        }
    }
    let input = input.ok_or_else(|| CliError::Usage("no package file specified".into()))?;
    let record = read_record(&input)?;

    let generator = Generator::with_http(config)?;
    let cancel = CancelFlag::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let doc = generator.generate(&record, &cancel).await?;
    let output = output.unwrap_or_else(|| PathBuf::from(&doc.file_name));
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&output, &doc.bytes)?;

    for url in &doc.broken_images {
        eprintln!("warning: image could not be loaded: {url}");
    }
    eprintln!(
        "Wrote '{}' ({} bytes, {} page{})",
        output.display(),
        doc.bytes.len(),
        doc.page_count,
        if doc.page_count == 1 { "" } else { "s" }
    );
    Ok(())
}

fn plan(args: &[String]) -> Result<(), CliError> {
    let [path] = args else {
        return Err(CliError::Usage("plan takes exactly one package file".into()));
    };
    let record = read_record(&PathBuf::from(path))?;
    let config = GeneratorConfig::from_env()?;
    let package = normalize(&record, &AssetResolver::new(&config.asset_base));
    let plan = plan_pages(package.itinerary.len(), config.capacity)?;
    let summary = serde_json::json!({
        "title": package.title,
        "file_name": package.file_name(),
        "days": package.itinerary.len(),
        "total_pages": plan.total_pages(),
        "pages": plan.pages,
    });
    let text = serde_json::to_string_pretty(&summary).map_err(ItineraryError::from)?;
    println!("{text}");
    Ok(())
}

async fn serve(args: &[String]) -> Result<(), CliError> {
    let mut config = ProxyConfig::from_env();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--bind" => {
                let value = flag_value(&mut iter, arg)?;
                config.bind = value
                    .parse()
                    .map_err(|_| CliError::Usage(format!("--bind: bad address '{value}'")))?;
            }
            "--allow-host" => {
                let host = flag_value(&mut iter, arg)?;
                config.allowed_hosts.extend(proxy::parse_host_list(&host));
            }
            other => return Err(CliError::Usage(format!("Unknown argument: {other}"))),
        }
    }
    proxy::serve(config).await?;
    Ok(())
}

fn print_usage(prog: &str) {
    eprintln!("itinerary – travel itinerary PDF generator");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <package.json> [output.pdf] [flags]");
    eprintln!("  {prog} plan <package.json>");
    eprintln!("  {prog} serve [--bind 127.0.0.1:3000] [--allow-host HOST]...");
    eprintln!();
    eprintln!("Generate flags:");
    eprintln!("  --proxy URL        Route images through this image proxy base URL");
    eprintln!("  --asset-base URL   CMS base URL for asset references");
    eprintln!("  --scale N          Device scale factor for rasterization (default 2)");
    eprintln!("  --font PATH        TTF/OTF font file (default: system sans-serif)");
    eprintln!("  --settle-ms N      Delay after images load before capture (default 300)");
    eprintln!();
    eprintln!("Environment: ITINERARY_ASSET_BASE, ITINERARY_PROXY_BASE, ITINERARY_SCALE,");
    eprintln!("  ITINERARY_FONT, ITINERARY_SETTLE_MS, ITINERARY_PROXY_ALLOW,");
    eprintln!("  ITINERARY_PROXY_MAX_BYTES, RUST_LOG");
}
