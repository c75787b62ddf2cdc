use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use csv::WriterBuilder;
use lambda_surface::config::SurfaceConfig;
use lambda_surface::expectation::{GammaParams, Regime, inverse_moment_closed_form};
use lambda_surface::surface::{LambdaEngine, LambdaSurface};
use ndarray::Array1;
use std::path::{Path, PathBuf};

/// Profile rows shown in the summary table.
const PROFILE_PREVIEW_ROWS: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "lambda-surface")]
#[command(about = "Evaluate Λ(ε, α, κ) = E[X/(1+X)] − α for X ~ Gamma(2/ε² − 1, ε²κ/2)", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the full (α, κ) grid at one ε.
    Surface(SurfaceArgs),
    /// Evaluate E[X/(1+X)] at a single (ε, κ).
    Point(PointArgs),
    /// Print the default configuration as JSON.
    Config,
}

#[derive(Args, Debug)]
struct SurfaceArgs {
    /// JSON configuration; flags below override its fields.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "eps")]
    eps: Option<f64>,
    #[arg(long = "alpha-min")]
    alpha_min: Option<f64>,
    #[arg(long = "alpha-max")]
    alpha_max: Option<f64>,
    #[arg(long = "kappa-min")]
    kappa_min: Option<f64>,
    #[arg(long = "kappa-max")]
    kappa_max: Option<f64>,
    #[arg(long = "n-alpha")]
    n_alpha: Option<usize>,
    #[arg(long = "n-kappa")]
    n_kappa: Option<usize>,
    /// Gauss–Laguerre order.
    #[arg(long = "n-lag")]
    n_lag: Option<usize>,
    /// Working decimal digits for the continuation.
    #[arg(long = "precision")]
    precision: Option<u32>,
    #[arg(long = "magnitude-bound")]
    magnitude_bound: Option<f64>,
    /// Surface CSV: one row per κ, one column per α.
    #[arg(long = "out")]
    out: Option<PathBuf>,
    /// κ-profile CSV: `kappa,ex_over_1px`.
    #[arg(long = "profile-out")]
    profile_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PointArgs {
    #[arg(long = "eps")]
    eps: f64,
    #[arg(long = "kappa")]
    kappa: f64,
    #[arg(long = "n-lag", default_value_t = lambda_surface::config::default_n_lag())]
    n_lag: usize,
    #[arg(long = "precision", default_value_t = lambda_surface::config::default_precision())]
    precision: u32,
    #[arg(long = "magnitude-bound", default_value_t = lambda_surface::config::default_magnitude_bound())]
    magnitude_bound: f64,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Surface(args) => run_surface(args),
        Command::Point(args) => run_point(args),
        Command::Config => run_config(),
    }
}

fn run_surface(args: SurfaceArgs) -> Result<(), String> {
    let config = resolve_surface_config(&args)?;
    let engine = LambdaEngine::from_config(&config).map_err(|e| e.to_string())?;
    let surface = engine.surface(&config.alpha_grid(), &config.kappa_grid());

    print_surface_summary(&surface);

    if let Some(path) = &args.out {
        write_surface_csv(path, &surface)?;
        println!("wrote surface to {}", path.display());
    }
    if let Some(path) = &args.profile_out {
        write_profile_csv(path, &surface.kappas, &surface.profile)?;
        println!("wrote κ-profile to {}", path.display());
    }
    Ok(())
}

fn resolve_surface_config(args: &SurfaceArgs) -> Result<SurfaceConfig, String> {
    let mut config = match &args.config {
        Some(path) => SurfaceConfig::from_path(path).map_err(|e| e.to_string())?,
        None => SurfaceConfig::default(),
    };
    if let Some(eps) = args.eps {
        config.eps = eps;
    }
    if let Some(v) = args.alpha_min {
        config.alpha_range.0 = v;
    }
    if let Some(v) = args.alpha_max {
        config.alpha_range.1 = v;
    }
    if let Some(v) = args.kappa_min {
        config.kappa_range.0 = v;
    }
    if let Some(v) = args.kappa_max {
        config.kappa_range.1 = v;
    }
    if let Some(n) = args.n_alpha {
        config.n_alpha = n;
    }
    if let Some(n) = args.n_kappa {
        config.n_kappa = n;
    }
    if let Some(n) = args.n_lag {
        config.n_lag = n;
    }
    if let Some(p) = args.precision {
        config.precision = p;
    }
    if let Some(b) = args.magnitude_bound {
        config.magnitude_bound = b;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn print_surface_summary(surface: &LambdaSurface) {
    let (n_kappa, n_alpha) = surface.values.dim();
    let range = surface
        .profile_range()
        .map(|(lo, hi)| format!("[{lo:.6}, {hi:.6}]"))
        .unwrap_or_else(|| "-".to_string());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ε", "Regime", "k", "Grid (κ × α)", "NaN cells", "E[X/(1+X)] range"]);
    table.add_row(Row::from(vec![
        Cell::new(format!("{:.6}", surface.eps)),
        Cell::new(surface.regime.name()),
        Cell::new(format!("{:.6}", surface.regime.shape())),
        Cell::new(format!("{n_kappa} × {n_alpha}")),
        Cell::new(surface.nan_count()),
        Cell::new(range),
    ]));
    println!("{table}");

    if surface.kappas.is_empty() {
        return;
    }
    let mut preview = Table::new();
    preview
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["κ", "E[X/(1+X)]"]);
    for i in preview_indices(surface.kappas.len(), PROFILE_PREVIEW_ROWS) {
        preview.add_row(Row::from(vec![
            Cell::new(format!("{:.6e}", surface.kappas[i])),
            Cell::new(format!("{:.10}", surface.profile[i])),
        ]));
    }
    println!("{preview}");
}

/// Evenly spread indices into `0..len`, always including both ends.
fn preview_indices(len: usize, rows: usize) -> Vec<usize> {
    if len <= rows || rows < 2 {
        return (0..len.min(rows)).collect();
    }
    (0..rows).map(|r| r * (len - 1) / (rows - 1)).collect()
}

fn run_point(args: PointArgs) -> Result<(), String> {
    let config = SurfaceConfig {
        eps: args.eps,
        n_lag: args.n_lag,
        precision: args.precision,
        magnitude_bound: args.magnitude_bound,
        ..SurfaceConfig::default()
    };
    if !args.kappa.is_finite() || args.kappa <= 0.0 {
        return Err(format!("κ must be a finite positive number, but was {}", args.kappa));
    }
    let engine = LambdaEngine::from_config(&config).map_err(|e| e.to_string())?;

    let GammaParams { shape, scale } = engine.params(args.kappa);
    let value = engine.expectation(args.kappa);
    let closed_form = 1.0 - inverse_moment_closed_form(engine.special(), shape, scale.recip());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Quantity", "Value"]);
    let method = match engine.regime() {
        Regime::Standard { .. } => "Gauss–Laguerre",
        Regime::Continuation { .. } => "closed form",
    };
    let rows = [
        ("ε", format!("{}", config.eps)),
        ("κ", format!("{}", args.kappa)),
        ("regime", engine.regime().name().to_string()),
        ("k", format!("{shape:.12}")),
        ("θ", format!("{scale:.12}")),
        ("β", format!("{:.12}", scale.recip())),
        ("method", method.to_string()),
        ("E[X/(1+X)]", format!("{value:.15}")),
        ("closed form", format!("{closed_form:.15}")),
    ];
    for (name, v) in rows {
        table.add_row(Row::from(vec![Cell::new(name), Cell::new(v)]));
    }
    println!("{table}");
    Ok(())
}

fn run_config() -> Result<(), String> {
    let payload = serde_json::to_string_pretty(&SurfaceConfig::default())
        .map_err(|e| format!("failed to serialize config: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn write_surface_csv(path: &Path, surface: &LambdaSurface) -> Result<(), String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to create output csv '{}': {e}", path.display()))?;
    let header = std::iter::once("kappa".to_string())
        .chain(surface.alphas.iter().map(|a| format!("{a}")))
        .collect::<Vec<_>>();
    wtr.write_record(header)
        .map_err(|e| format!("failed to write csv header: {e}"))?;
    for (i, row) in surface.values.outer_iter().enumerate() {
        let record = std::iter::once(format!("{}", surface.kappas[i]))
            .chain(row.iter().map(|v| format!("{v}")))
            .collect::<Vec<_>>();
        wtr.write_record(record)
            .map_err(|e| format!("failed to write csv row {i}: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush csv writer: {e}"))?;
    Ok(())
}

fn write_profile_csv(path: &Path, kappas: &Array1<f64>, profile: &Array1<f64>) -> Result<(), String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to create output csv '{}': {e}", path.display()))?;
    wtr.write_record(["kappa", "ex_over_1px"])
        .map_err(|e| format!("failed writing csv header: {e}"))?;
    for (i, (k, v)) in kappas.iter().zip(profile).enumerate() {
        wtr.write_record([format!("{k}"), format!("{v}")])
            .map_err(|e| format!("failed to write csv row {i}: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush csv writer: {e}"))?;
    Ok(())
}
