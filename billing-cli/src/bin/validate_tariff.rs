use std::env;
use std::process::ExitCode;

use billing_cli::{observability, sources::TariffYamlSource};

fn main() -> ExitCode {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: validate-tariff <tariff_yaml_path>");
        return ExitCode::from(2);
    }

    match TariffYamlSource::new(&args[1]).read() {
        Ok(import) => {
            for tariff in &import.tariffs {
                println!(
                    "ok: {} ({}): {} charge(s)",
                    tariff.name,
                    tariff.utility,
                    tariff.charge_count()
                );
            }
            for (name, reason) in &import.errors {
                eprintln!("error: {name}: {reason}");
            }
            if import.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
