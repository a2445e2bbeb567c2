use std::{fs::File, io::Read, path::PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use rust_decimal::Decimal;

use billing_core::UsageRecord;

use super::SourceError;

/// CSV source for customer interval usage.
///
/// Expected header columns (by name):
/// - interval_start, interval_end (ISO-8601, UTC or bearing an offset;
///   naive timestamps are rejected)
/// - usage, usage_unit (kWh | Wh | MWh)
/// - peak_demand, peak_demand_unit (kW | W | MW)
/// - temperature, temperature_unit (optional; validated, not billed)
///
/// Quantities are normalised to kWh/kW on read.
pub struct UsageCsvSource {
    path: PathBuf,
}

impl UsageCsvSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Result<Vec<UsageRecord>, SourceError> {
        let file = File::open(&self.path).map_err(|e| {
            SourceError::UsageCsv(format!("failed to open {}: {e}", self.path.display()))
        })?;
        read_from(file)
    }
}

/// Read and validate usage rows from any reader. Row errors are collected
/// so one pass reports every problem; any row error fails the import,
/// since billing needs a consistent series.
pub fn read_from<R: Read>(reader: R) -> Result<Vec<UsageRecord>, SourceError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| SourceError::UsageCsv(format!("failed to read CSV headers: {e}")))?
        .clone();

    let mut records = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let line = row + 2; // header is line 1
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("row {line}: {e}"));
                continue;
            }
        };
        match record_to_usage(&record, &headers) {
            Ok(usage) => records.push(usage),
            Err(e) => {
                metrics::counter!("usage_csv_parse_errors_total").increment(1);
                errors.push(format!("row {line}: {e}"));
            }
        }
    }

    if !errors.is_empty() {
        let shown = errors.iter().take(5).cloned().collect::<Vec<_>>().join("; ");
        let more = if errors.len() > 5 {
            format!(" (and {} more)", errors.len() - 5)
        } else {
            String::new()
        };
        return Err(SourceError::UsageCsv(format!(
            "{} row(s) rejected: {shown}{more}",
            errors.len()
        )));
    }

    Ok(records)
}

fn record_to_usage(record: &StringRecord, headers: &StringRecord) -> Result<UsageRecord, String> {
    let get = |name: &str| -> Result<&str, String> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| format!("missing column '{name}'"))
    };

    let start = parse_timestamp(get("interval_start")?)?;
    let end = parse_timestamp(get("interval_end")?)?;

    let energy_factor = energy_unit_factor(get("usage_unit")?)?;
    let energy = parse_decimal(get("usage")?, "usage")?
        .checked_mul(energy_factor)
        .ok_or_else(|| "usage value out of range".to_string())?;

    let demand_factor = demand_unit_factor(get("peak_demand_unit")?)?;
    let demand = parse_decimal(get("peak_demand")?, "peak_demand")?
        .checked_mul(demand_factor)
        .ok_or_else(|| "peak_demand value out of range".to_string())?;

    if demand > Decimal::ZERO && demand < Decimal::new(1, 1) {
        tracing::warn!(
            peak_demand_kw = %demand,
            interval_start = %start,
            "peak demand is very low; verify the unit is not W instead of kW"
        );
    }

    // Temperature is optional and never billed, but a present value must
    // still carry a sensible unit.
    if let Ok(raw) = get("temperature") {
        if !raw.trim().is_empty() {
            parse_decimal(raw, "temperature")?;
            let unit = get("temperature_unit").unwrap_or("").trim().to_lowercase();
            if !matches!(unit.as_str(), "c" | "celsius" | "°c") {
                return Err(format!(
                    "invalid temperature_unit '{unit}': must be C or Celsius"
                ));
            }
        }
    }

    UsageRecord::new(start, end, energy, demand).map_err(|e| e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z") {
        return Ok(dt.with_timezone(&Utc));
    }
    // Give naive timestamps their own message: the offset is required, not
    // guessed from the customer's zone.
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if NaiveDateTime::parse_from_str(s, fmt).is_ok() {
            return Err(format!(
                "timestamp '{s}' has no UTC offset; naive timestamps are rejected"
            ));
        }
    }
    Err(format!("invalid timestamp '{s}'"))
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, String> {
    use std::str::FromStr;
    Decimal::from_str(s.trim()).map_err(|e| format!("invalid {field} '{}': {e}", s.trim()))
}

fn energy_unit_factor(unit: &str) -> Result<Decimal, String> {
    match unit.trim().to_lowercase().as_str() {
        "kwh" => Ok(Decimal::ONE),
        "wh" => Ok(Decimal::new(1, 3)),
        "mwh" => Ok(Decimal::ONE_THOUSAND),
        other => Err(format!(
            "invalid usage_unit '{other}': must be kWh, Wh, or MWh"
        )),
    }
}

fn demand_unit_factor(unit: &str) -> Result<Decimal, String> {
    match unit.trim().to_lowercase().as_str() {
        "kw" => Ok(Decimal::ONE),
        "w" => Ok(Decimal::new(1, 3)),
        "mw" => Ok(Decimal::ONE_THOUSAND),
        other => Err(format!(
            "invalid peak_demand_unit '{other}': must be kW, W, or MW"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const HEADER: &str =
        "interval_start,interval_end,usage,usage_unit,peak_demand,peak_demand_unit,temperature,temperature_unit";

    fn read(body: &str) -> Result<Vec<UsageRecord>, SourceError> {
        read_from(format!("{HEADER}\n{body}").as_bytes())
    }

    #[test]
    fn parses_and_normalises_units() {
        let rows = read(
            "2024-01-01T00:00:00Z,2024-01-01T00:05:00Z,1.25,kWh,4,kW,21.5,C\n\
             2024-01-01T00:05:00Z,2024-01-01T00:10:00Z,500,Wh,0.004,MW,,\n\
             2024-01-01T00:10:00Z,2024-01-01T00:15:00Z,0.0005,MWh,4000,W,,",
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].energy_kwh, Decimal::from_str("1.25").unwrap());
        assert_eq!(rows[1].energy_kwh, Decimal::from_str("0.500").unwrap());
        assert_eq!(rows[1].peak_demand_kw, Decimal::from_str("4.000").unwrap());
        assert_eq!(rows[2].energy_kwh, Decimal::from_str("0.5000").unwrap());
        assert_eq!(rows[2].peak_demand_kw, Decimal::from_str("4.000").unwrap());
    }

    #[test]
    fn accepts_explicit_offsets() {
        let rows = read(
            "2024-01-01T00:00:00-08:00,2024-01-01T01:00:00-08:00,1,kWh,4,kW,,",
        )
        .unwrap();
        assert_eq!(
            rows[0].interval_start_utc,
            DateTime::parse_from_rfc3339("2024-01-01T08:00:00Z").unwrap()
        );
    }

    #[test]
    fn rejects_naive_timestamps() {
        let err = read("2024-01-01T00:00:00,2024-01-01T01:00:00,1,kWh,4,kW,,").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no UTC offset"), "{msg}");
    }

    #[test]
    fn rejects_unknown_units() {
        let err = read("2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,1,therms,4,kW,,").unwrap_err();
        assert!(err.to_string().contains("usage_unit"));
    }

    #[test]
    fn rejects_negative_usage() {
        let err = read("2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,-1,kWh,4,kW,,").unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn temperature_columns_are_optional() {
        let rows = read_from(
            "interval_start,interval_end,usage,usage_unit,peak_demand,peak_demand_unit\n\
             2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,1,kWh,4,kW"
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn bad_temperature_unit_is_rejected_when_value_present() {
        let err = read("2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,1,kWh,4,kW,70,F").unwrap_err();
        assert!(err.to_string().contains("temperature_unit"));
    }

    #[test]
    fn reports_every_bad_row_at_once() {
        let err = read(
            "2024-01-01T00:00:00,2024-01-01T01:00:00,1,kWh,4,kW,,\n\
             2024-01-01T01:00:00Z,2024-01-01T02:00:00Z,x,kWh,4,kW,,",
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 row(s) rejected"));
    }
}
