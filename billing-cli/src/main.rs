use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use billing_cli::{
    config::{BillingConfig, GapStrategyArg},
    observability, report,
    sources::{TariffYamlSource, UsageCsvSource},
};
use billing_core::{compute_bill, BillingError, GapFillStrategy};

const EXIT_VALIDATION: u8 = 2;
const EXIT_MISSING_DATA: u8 = 3;
const EXIT_INTERNAL: u8 = 4;
const EXIT_CANCELLED: u8 = 130;

/// Compute a customer's bill from a tariff document and a usage export.
#[derive(Parser, Debug)]
#[command(name = "compute-bill")]
struct Args {
    /// Customer/utility configuration (defaults to $BILLING_CONFIG or
    /// billing-config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tariff YAML document.
    #[arg(long)]
    tariffs: PathBuf,

    /// Usage CSV export.
    #[arg(long)]
    usage: PathBuf,

    /// First local date of the request period (inclusive).
    #[arg(long)]
    from: NaiveDate,

    /// Last local date of the request period (inclusive).
    #[arg(long)]
    to: NaiveDate,

    /// Gap repair strategy; overrides the config.
    #[arg(long, value_enum)]
    gap_strategy: Option<GapStrategyArg>,

    /// Also dump the non-zero cost matrix entries for audit.
    #[arg(long)]
    show_matrix: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    observability::init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = match &args.config {
        Some(path) => BillingConfig::from_path(path),
        None => BillingConfig::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Ok(ExitCode::from(EXIT_VALIDATION));
        }
    };

    let import = match TariffYamlSource::new(&args.tariffs).read() {
        Ok(i) => i,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(EXIT_VALIDATION));
        }
    };
    for (name, reason) in &import.errors {
        tracing::warn!(tariff = %name, %reason, "tariff rejected during import");
    }
    let Some(tariff) = import
        .tariffs
        .iter()
        .find(|t| t.name == config.customer.tariff && t.utility == config.utility.name)
        .cloned()
    else {
        eprintln!(
            "error: tariff '{}' for utility '{}' not found in {}",
            config.customer.tariff,
            config.utility.name,
            args.tariffs.display()
        );
        return Ok(ExitCode::from(EXIT_VALIDATION));
    };

    let usage = match UsageCsvSource::new(&args.usage).read() {
        Ok(u) => u,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(EXIT_VALIDATION));
        }
    };

    let profile = match config.profile() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(EXIT_VALIDATION));
        }
    };
    let holidays = match config.holiday_set() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Ok(ExitCode::from(EXIT_VALIDATION));
        }
    };

    let strategy: GapFillStrategy = args
        .gap_strategy
        .unwrap_or(config.compute.gap_strategy)
        .into();
    let period = (args.from, args.to);

    // The computation itself is synchronous; run it on a blocking worker
    // and let Ctrl-C flip the cooperative token.
    let token = CancellationToken::new();
    let compute_token = token.clone();
    let task_tariff = tariff.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        compute_bill(
            &profile,
            &task_tariff,
            &holidays,
            usage,
            period,
            strategy,
            Some(&compute_token),
        )
    });

    let result = tokio::select! {
        res = &mut task => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("cancellation requested, stopping computation");
            token.cancel();
            task.await
        }
    }?;

    match result {
        Ok(bill) => {
            print!("{}", report::render(&bill, &tariff));
            if args.show_matrix {
                print!("{}", report::render_cost_matrix(&bill, &tariff));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ (BillingError::InputValidation(_)
        | BillingError::Inconsistency(_)
        | BillingError::ZoneUnknown(_))) => {
            eprintln!("error: {e}");
            Ok(ExitCode::from(EXIT_VALIDATION))
        }
        Err(e @ BillingError::MissingData(_)) => {
            eprintln!("error: {e}");
            Ok(ExitCode::from(EXIT_MISSING_DATA))
        }
        Err(BillingError::Cancelled) => {
            eprintln!("cancelled");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(ExitCode::from(EXIT_INTERNAL))
        }
    }
}
