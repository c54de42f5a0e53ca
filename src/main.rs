//! snapdom - DOM subtree to SVG/raster capture

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use snapdom::dom::{matches_selector_list, parse_selector_list};
use snapdom::{
    CachePolicy, CaptureOptions, Document, Error, ExcludeMode, ExportFormat, FallbackUrl,
    FontExclusions, LocalFont, NodeId, Result, parse_html_with_css,
};

#[derive(Parser)]
#[command(name = "snapdom")]
#[command(version, about = "Capture an HTML file as a self-contained SVG or raster image", long_about = None)]
#[command(after_help = "EXAMPLES:
    snapdom page.html --out card.svg               Capture to SVG
    snapdom page.html --select '#card' --out c.png Capture one element as PNG
    snapdom page.html --scale 2 --out card@2x.png  Capture at 2x
    snapdom page.html                              Print the SVG data URL")]
struct Cli {
    /// Input HTML file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Extra stylesheet applied on top of the document's own
    #[arg(long, value_name = "FILE")]
    css: Option<PathBuf>,

    /// Selector for the capture root (default: body's first element child)
    #[arg(long, value_name = "SELECTOR")]
    select: Option<String>,

    /// Output file; format follows the extension (svg, png, jpg, webp)
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Raster scale factor
    #[arg(long)]
    scale: Option<f64>,

    /// Device pixel ratio for raster backing stores
    #[arg(long)]
    dpr: Option<f64>,

    /// Output width in CSS pixels (height derives from aspect)
    #[arg(long)]
    width: Option<f64>,

    /// Output height in CSS pixels (width derives from aspect)
    #[arg(long)]
    height: Option<f64>,

    /// Embed matching @font-face rules into the SVG
    #[arg(long)]
    embed_fonts: bool,

    /// Selector excluded from the capture (repeatable)
    #[arg(long, value_name = "SELECTOR")]
    exclude: Vec<String>,

    /// How excluded nodes leave the capture: hide or remove
    #[arg(long, value_name = "MODE")]
    exclude_mode: Option<ExcludeMode>,

    /// Degrade failed images to invisible spacers instead of labeled stubs
    #[arg(long)]
    no_placeholders: bool,

    /// Proxy URL template for CORS fallback ({url} placeholder)
    #[arg(long, value_name = "TEMPLATE")]
    proxy: Option<String>,

    /// Skip cooperative yields between phases (default)
    #[arg(long, conflicts_with = "idle")]
    fast: bool,

    /// Yield between capture phases
    #[arg(long)]
    idle: bool,

    /// JSON options merged over the flags (camelCase keys)
    #[arg(long, value_name = "JSON")]
    options: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run(cli: Cli) -> Result<()> {
    let html = fs::read_to_string(&cli.input)?;
    let css = match &cli.css {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };
    let doc = parse_html_with_css(&html, &css);

    let target = select_target(&doc, cli.select.as_deref())?;
    let options = build_options(&cli)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let snapshot = runtime.block_on(snapdom::snapdom(&doc, target, &options))?;

    match &cli.out {
        Some(path) => {
            let written = snapshot.download(Some(path))?;
            log::info!("wrote {}", written.display());
        }
        None => println!("{}", snapshot.url()),
    }
    Ok(())
}

fn select_target(doc: &Document, selector: Option<&str>) -> Result<NodeId> {
    if let Some(selector) = selector {
        let list = parse_selector_list(selector)
            .map_err(|e| Error::InvalidInput(format!("invalid selector {selector:?}: {e:?}")))?;
        return doc
            .descendants(doc.document())
            .filter(|&id| doc.is_element(id))
            .find(|&id| matches_selector_list(doc, id, &list))
            .ok_or_else(|| Error::InvalidInput(format!("no element matches {selector:?}")));
    }
    default_target(doc)
}

/// The body's first element child, or the root element of a body-less tree.
fn default_target(doc: &Document) -> Result<NodeId> {
    let root = doc
        .root_element()
        .ok_or_else(|| Error::InvalidInput("document has no root element".to_string()))?;
    let body = doc
        .children(root)
        .find(|&id| doc.element(id).is_some_and(|el| el.tag() == "body"));
    if let Some(body) = body
        && let Some(child) = doc.children(body).find(|&id| doc.is_element(id))
    {
        return Ok(child);
    }
    Ok(root)
}

fn build_options(cli: &Cli) -> Result<CaptureOptions> {
    let mut options = CaptureOptions::new();
    options.fast = cli.fast || !cli.idle;
    if let Some(scale) = cli.scale {
        options.scale = scale;
    }
    if let Some(dpr) = cli.dpr {
        options.dpr = dpr;
    }
    options.width = cli.width;
    options.height = cli.height;
    options.embed_fonts = cli.embed_fonts;
    options.exclude = cli.exclude.clone();
    if let Some(mode) = cli.exclude_mode {
        options.exclude_mode = mode;
    }
    options.placeholders = !cli.no_placeholders;
    if let Some(proxy) = &cli.proxy {
        options.use_proxy = proxy.clone();
    }
    if let Some(json) = &cli.options {
        let patch: OptionsPatch = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("invalid --options JSON: {e}")))?;
        patch.apply(&mut options);
    }
    Ok(options)
}

/// Keys accepted by `--options`, all optional. Mirrors the camelCase schema
/// the wasm entry deserializes, applied over the flag-built options.
#[derive(Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptionsPatch {
    fast: Option<bool>,
    scale: Option<f64>,
    dpr: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    embed_fonts: Option<bool>,
    exclude: Option<Vec<String>>,
    exclude_mode: Option<ExcludeMode>,
    filter_mode: Option<ExcludeMode>,
    placeholders: Option<bool>,
    use_proxy: Option<String>,
    icon_fonts: Option<Vec<String>>,
    local_fonts: Option<Vec<LocalFont>>,
    exclude_fonts: Option<FontExclusions>,
    cache: Option<CachePolicy>,
    outer_transforms: Option<bool>,
    outer_shadows: Option<bool>,
    /// A fixed substitute URL; the computed form is API-only.
    fallback_url: Option<String>,
    quality: Option<f64>,
    format: Option<ExportFormat>,
    filename: Option<String>,
    background_color: Option<String>,
}

impl OptionsPatch {
    fn apply(self, options: &mut CaptureOptions) {
        if let Some(v) = self.fast {
            options.fast = v;
        }
        if let Some(v) = self.scale {
            options.scale = v;
        }
        if let Some(v) = self.dpr {
            options.dpr = v;
        }
        if let Some(v) = self.width {
            options.width = Some(v);
        }
        if let Some(v) = self.height {
            options.height = Some(v);
        }
        if let Some(v) = self.embed_fonts {
            options.embed_fonts = v;
        }
        if let Some(v) = self.exclude {
            options.exclude = v;
        }
        if let Some(v) = self.exclude_mode {
            options.exclude_mode = v;
        }
        if let Some(v) = self.filter_mode {
            options.filter_mode = v;
        }
        if let Some(v) = self.placeholders {
            options.placeholders = v;
        }
        if let Some(v) = self.use_proxy {
            options.use_proxy = v;
        }
        if let Some(v) = self.icon_fonts {
            options.icon_fonts = v;
        }
        if let Some(v) = self.local_fonts {
            options.local_fonts = v;
        }
        if let Some(v) = self.exclude_fonts {
            options.exclude_fonts = Some(v);
        }
        if let Some(v) = self.cache {
            options.cache = v;
        }
        if let Some(v) = self.outer_transforms {
            options.outer_transforms = v;
        }
        if let Some(v) = self.outer_shadows {
            options.outer_shadows = v;
        }
        if let Some(v) = self.fallback_url {
            options.fallback_url = Some(FallbackUrl::Fixed(v));
        }
        if let Some(v) = self.quality {
            options.quality = v;
        }
        if let Some(v) = self.format {
            options.format = v;
        }
        if let Some(v) = self.filename {
            options.filename = v;
        }
        if let Some(v) = self.background_color {
            options.background_color = Some(v);
        }
    }
}
