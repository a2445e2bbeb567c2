use std::collections::BTreeMap;
use std::{fs, path::PathBuf};

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billing_core::{
    ApplicabilityRule, CustomerCharge, CustomerChargeType, DemandCharge, EnergyCharge, MonthDay,
    PeakType, SeasonWindow, Tariff,
};

use super::SourceError;

/// YAML import/export for tariff documents.
///
/// Top level: an optional `applicability_rules` mapping (name -> rule,
/// shared by reference) and a `tariffs` list. A charge picks up named
/// rules via `rules:` and may inline further ones under
/// `applicability_rules:`. Times are `HH:MM` local; dates are
/// `YYYY-MM-DD` with the year ignored; the day-class booleans default to
/// true.
///
/// Import is atomic per tariff: a bad tariff lands in the error list and
/// never blocks its neighbours.
pub struct TariffYamlSource {
    path: PathBuf,
}

impl TariffYamlSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Result<TariffImport, SourceError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            SourceError::TariffYaml(format!("failed to read {}: {e}", self.path.display()))
        })?;
        parse_str(&contents)
    }
}

#[derive(Debug, Default)]
pub struct TariffImport {
    pub tariffs: Vec<Tariff>,
    /// (tariff name, reason) for each rejected tariff.
    pub errors: Vec<(String, String)>,
}

impl TariffImport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn default_monthly() -> String {
    "monthly".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period_start_time_local: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period_end_time_local: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    applies_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    applies_end_date: Option<String>,
    #[serde(default = "default_true")]
    applies_weekdays: bool,
    #[serde(default = "default_true")]
    applies_weekends: bool,
    #[serde(default = "default_true")]
    applies_holidays: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnergyChargeSpec {
    name: String,
    rate_usd_per_kwh: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    applicability_rules: Vec<RuleSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DemandChargeSpec {
    name: String,
    rate_usd_per_kw: f64,
    #[serde(default = "default_monthly")]
    peak_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    applicability_rules: Vec<RuleSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CustomerChargeSpec {
    name: String,
    amount_usd: f64,
    #[serde(default = "default_monthly")]
    charge_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TariffSpec {
    name: String,
    utility: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    energy_charges: Vec<EnergyChargeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    demand_charges: Vec<DemandChargeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    customer_charges: Vec<CustomerChargeSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TariffDoc {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    applicability_rules: BTreeMap<String, RuleSpec>,
    tariffs: Vec<TariffSpec>,
}

/// Parse a tariff document. Document-level problems (syntax, empty list,
/// broken shared rules) fail the whole parse; per-tariff problems are
/// collected in the returned error list.
pub fn parse_str(contents: &str) -> Result<TariffImport, SourceError> {
    let doc: TariffDoc = serde_yaml::from_str(contents)
        .map_err(|e| SourceError::TariffYaml(format!("invalid document: {e}")))?;
    if doc.tariffs.is_empty() {
        return Err(SourceError::TariffYaml("tariffs list is empty".to_string()));
    }

    // Shared rules are part of the document contract; one broken rule
    // would poison every tariff that names it.
    let mut named: BTreeMap<String, ApplicabilityRule> = BTreeMap::new();
    for (name, spec) in &doc.applicability_rules {
        let rule = rule_from_spec(spec)
            .map_err(|e| SourceError::TariffYaml(format!("applicability rule '{name}': {e}")))?;
        named.insert(name.clone(), rule);
    }

    let mut import = TariffImport::default();
    for spec in doc.tariffs {
        let name = spec.name.clone();
        match tariff_from_spec(spec, &named) {
            Ok(tariff) => import.tariffs.push(tariff),
            Err(e) => {
                metrics::counter!("tariff_import_errors_total").increment(1);
                tracing::warn!(tariff = %name, error = %e, "tariff rejected during import");
                import.errors.push((name, e));
            }
        }
    }
    Ok(import)
}

/// Serialise tariffs back to the document format. Rules are written
/// inline with year-2000 dates; re-importing yields an equivalent tariff.
pub fn export_str(tariffs: &[Tariff]) -> Result<String, SourceError> {
    let doc = TariffDoc {
        applicability_rules: BTreeMap::new(),
        tariffs: tariffs.iter().map(tariff_to_spec).collect::<Result<_, _>>()?,
    };
    serde_yaml::to_string(&doc)
        .map_err(|e| SourceError::TariffYaml(format!("serialisation failed: {e}")))
}

fn tariff_from_spec(
    spec: TariffSpec,
    named: &BTreeMap<String, ApplicabilityRule>,
) -> Result<Tariff, String> {
    let mut energy = Vec::with_capacity(spec.energy_charges.len());
    for charge in &spec.energy_charges {
        let rules = resolve_rules(&charge.rules, &charge.applicability_rules, named)?;
        energy.push(
            EnergyCharge::new(&charge.name, to_decimal(charge.rate_usd_per_kwh)?, rules)
                .map_err(|e| e.to_string())?,
        );
    }

    let mut demand = Vec::with_capacity(spec.demand_charges.len());
    for charge in &spec.demand_charges {
        let rules = resolve_rules(&charge.rules, &charge.applicability_rules, named)?;
        let peak_type = match charge.peak_type.trim().to_lowercase().as_str() {
            "daily" => PeakType::Daily,
            "monthly" => PeakType::Monthly,
            other => return Err(format!("invalid peak_type '{other}': must be daily or monthly")),
        };
        demand.push(
            DemandCharge::new(&charge.name, to_decimal(charge.rate_usd_per_kw)?, peak_type, rules)
                .map_err(|e| e.to_string())?,
        );
    }

    let mut customer = Vec::with_capacity(spec.customer_charges.len());
    for charge in &spec.customer_charges {
        let charge_type = match charge.charge_type.trim().to_lowercase().as_str() {
            "daily" => CustomerChargeType::Daily,
            "monthly" => CustomerChargeType::Monthly,
            other => {
                return Err(format!("invalid charge_type '{other}': must be daily or monthly"))
            }
        };
        customer.push(
            CustomerCharge::new(&charge.name, to_decimal(charge.amount_usd)?, charge_type)
                .map_err(|e| e.to_string())?,
        );
    }

    Tariff::new(spec.utility, spec.name, energy, demand, customer).map_err(|e| e.to_string())
}

fn resolve_rules(
    refs: &[String],
    inline: &[RuleSpec],
    named: &BTreeMap<String, ApplicabilityRule>,
) -> Result<Vec<ApplicabilityRule>, String> {
    let mut out = Vec::with_capacity(refs.len() + inline.len());
    for name in refs {
        out.push(
            named
                .get(name)
                .cloned()
                .ok_or_else(|| format!("unknown applicability rule '{name}'"))?,
        );
    }
    for spec in inline {
        out.push(rule_from_spec(spec)?);
    }
    Ok(out)
}

fn rule_from_spec(spec: &RuleSpec) -> Result<ApplicabilityRule, String> {
    let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time");
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 0).expect("valid time");

    let start = parse_time_opt(spec.period_start_time_local.as_deref())?;
    let end = parse_time_opt(spec.period_end_time_local.as_deref())?;

    // Legacy documents leave one or both endpoints out; normalise on import.
    // An absent pair means all day; an absent end after a non-midnight start
    // becomes the literal 23:59 spelling, which excludes the last minute.
    let (start, end) = match (start, end) {
        (None, None) => (midnight, midnight),
        (Some(s), None) if s == midnight => (midnight, midnight),
        (Some(s), None) => (s, end_of_day),
        (None, Some(e)) => (midnight, e),
        (Some(s), Some(e)) => (s, e),
    };

    let season = match (&spec.applies_start_date, &spec.applies_end_date) {
        (None, None) => None,
        (Some(s), Some(e)) => Some(SeasonWindow {
            start: parse_month_day(s)?,
            end: parse_month_day(e)?,
        }),
        _ => {
            return Err(
                "applies_start_date and applies_end_date must both be present or both absent"
                    .to_string(),
            )
        }
    };

    ApplicabilityRule::new(
        start,
        end,
        season,
        spec.applies_weekdays,
        spec.applies_weekends,
        spec.applies_holidays,
    )
    .map_err(|e| e.to_string())
}

fn parse_time_opt(value: Option<&str>) -> Result<Option<NaiveTime>, String> {
    let Some(raw) = value else { return Ok(None) };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(Some)
        .map_err(|_| format!("invalid time '{raw}': expected HH:MM"))
}

fn parse_month_day(raw: &str) -> Result<MonthDay, String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{raw}': expected YYYY-MM-DD"))?;
    MonthDay::new(date.month(), date.day()).map_err(|e| e.to_string())
}

fn to_decimal(value: f64) -> Result<Decimal, String> {
    Decimal::try_from(value).map_err(|e| format!("invalid amount {value}: {e}"))
}

fn to_float(value: Decimal) -> Result<f64, SourceError> {
    value
        .to_f64()
        .ok_or_else(|| SourceError::TariffYaml(format!("amount {value} is not representable")))
}

fn tariff_to_spec(tariff: &Tariff) -> Result<TariffSpec, SourceError> {
    Ok(TariffSpec {
        name: tariff.name.clone(),
        utility: tariff.utility.clone(),
        energy_charges: tariff
            .energy_charges
            .iter()
            .map(|c| {
                Ok(EnergyChargeSpec {
                    name: c.name.clone(),
                    rate_usd_per_kwh: to_float(c.rate_usd_per_kwh)?,
                    rules: Vec::new(),
                    applicability_rules: c.rules.iter().map(rule_to_spec).collect(),
                })
            })
            .collect::<Result<_, SourceError>>()?,
        demand_charges: tariff
            .demand_charges
            .iter()
            .map(|c| {
                Ok(DemandChargeSpec {
                    name: c.name.clone(),
                    rate_usd_per_kw: to_float(c.rate_usd_per_kw)?,
                    peak_type: c.peak_type.to_string(),
                    rules: Vec::new(),
                    applicability_rules: c.rules.iter().map(rule_to_spec).collect(),
                })
            })
            .collect::<Result<_, SourceError>>()?,
        customer_charges: tariff
            .customer_charges
            .iter()
            .map(|c| {
                Ok(CustomerChargeSpec {
                    name: c.name.clone(),
                    amount_usd: to_float(c.amount_usd)?,
                    charge_type: c.charge_type.to_string(),
                })
            })
            .collect::<Result<_, SourceError>>()?,
    })
}

fn rule_to_spec(rule: &ApplicabilityRule) -> RuleSpec {
    RuleSpec {
        period_start_time_local: Some(format_time(rule.period_start_local)),
        period_end_time_local: Some(format_time(rule.period_end_local)),
        applies_start_date: rule
            .season
            .map(|w| format!("2000-{:02}-{:02}", w.start.month(), w.start.day())),
        applies_end_date: rule
            .season
            .map(|w| format!("2000-{:02}-{:02}", w.end.month(), w.end.day())),
        applies_weekdays: rule.weekdays,
        applies_weekends: rule.weekends,
        applies_holidays: rule.holidays,
    }
}

fn format_time(t: NaiveTime) -> String {
    if t.second() == 0 {
        t.format("%H:%M").to_string()
    } else {
        t.format("%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const DOC: &str = r#"
applicability_rules:
  summer-peak:
    period_start_time_local: "16:00"
    period_end_time_local: "21:00"
    applies_start_date: "2000-06-01"
    applies_end_date: "2000-09-30"
    applies_weekends: false
    applies_holidays: false

tariffs:
  - name: B-19
    utility: PG&E
    energy_charges:
      - name: Summer Peak Energy
        rate_usd_per_kwh: 0.32
        rules: [summer-peak]
      - name: Base Energy
        rate_usd_per_kwh: 0.11
    demand_charges:
      - name: Summer Peak Demand
        rate_usd_per_kw: 21.5
        peak_type: monthly
        rules: [summer-peak]
    customer_charges:
      - name: Customer Charge
        amount_usd: 125.0
"#;

    #[test]
    fn imports_named_and_default_rules() {
        let import = parse_str(DOC).unwrap();
        assert!(import.is_clean(), "{:?}", import.errors);
        assert_eq!(import.tariffs.len(), 1);
        let tariff = &import.tariffs[0];
        assert_eq!(tariff.utility, "PG&E");

        let peak = &tariff.energy_charges[0];
        assert_eq!(peak.rate_usd_per_kwh, Decimal::from_str("0.32").unwrap());
        assert_eq!(peak.rules.len(), 1);
        let rule = &peak.rules[0];
        assert_eq!(rule.period_start_local, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert!(rule.weekdays);
        assert!(!rule.weekends);
        assert!(!rule.holidays);
        let season = rule.season.unwrap();
        assert_eq!(season.start, MonthDay::new(6, 1).unwrap());

        // No rules at all means the charge applies everywhere.
        let base = &tariff.energy_charges[1];
        assert!(base.rules.is_empty());

        assert_eq!(tariff.demand_charges[0].peak_type, PeakType::Monthly);
        assert_eq!(
            tariff.customer_charges[0].charge_type,
            CustomerChargeType::Monthly
        );
    }

    #[test]
    fn inline_rules_work_without_a_named_section() {
        let import = parse_str(
            r#"
tariffs:
  - name: Inline
    utility: Acme Power
    energy_charges:
      - name: Night Energy
        rate_usd_per_kwh: 0.04
        applicability_rules:
          - period_start_time_local: "00:00"
            period_end_time_local: "06:00"
"#,
        )
        .unwrap();
        assert!(import.is_clean());
        let rule = &import.tariffs[0].energy_charges[0].rules[0];
        assert_eq!(rule.period_end_local, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert!(rule.weekdays && rule.weekends && rule.holidays);
    }

    #[test]
    fn unknown_rule_reference_rejects_only_that_tariff() {
        let import = parse_str(
            r#"
tariffs:
  - name: Broken
    utility: Acme Power
    energy_charges:
      - name: Energy
        rate_usd_per_kwh: 0.1
        rules: [no-such-rule]
  - name: Fine
    utility: Acme Power
    customer_charges:
      - name: Customer Charge
        amount_usd: 10
"#,
        )
        .unwrap();
        assert_eq!(import.tariffs.len(), 1);
        assert_eq!(import.tariffs[0].name, "Fine");
        assert_eq!(import.errors.len(), 1);
        assert_eq!(import.errors[0].0, "Broken");
        assert!(import.errors[0].1.contains("no-such-rule"));
    }

    #[test]
    fn invalid_charge_isolates_its_tariff() {
        let import = parse_str(
            r#"
tariffs:
  - name: Negative
    utility: Acme Power
    energy_charges:
      - name: Energy
        rate_usd_per_kwh: -0.1
  - name: Fine
    utility: Acme Power
    customer_charges:
      - name: Customer Charge
        amount_usd: 10
"#,
        )
        .unwrap();
        assert_eq!(import.tariffs.len(), 1);
        assert_eq!(import.errors.len(), 1);
    }

    #[test]
    fn empty_tariff_list_is_a_document_error() {
        assert!(parse_str("tariffs: []").is_err());
    }

    #[test]
    fn broken_shared_rule_is_a_document_error() {
        let res = parse_str(
            r#"
applicability_rules:
  bad:
    period_start_time_local: "21:00"
    period_end_time_local: "16:00"
tariffs:
  - name: T
    utility: U
    customer_charges:
      - name: C
        amount_usd: 1
"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn one_sided_season_is_rejected() {
        let import = parse_str(
            r#"
tariffs:
  - name: T
    utility: U
    energy_charges:
      - name: Energy
        rate_usd_per_kwh: 0.1
        applicability_rules:
          - applies_start_date: "2000-06-01"
"#,
        )
        .unwrap();
        assert_eq!(import.errors.len(), 1);
        assert!(import.errors[0].1.contains("both"));
    }

    #[test]
    fn legacy_open_ended_period_normalises_to_literal_end_of_day() {
        let import = parse_str(
            r#"
tariffs:
  - name: T
    utility: U
    energy_charges:
      - name: Evening
        rate_usd_per_kwh: 0.1
        applicability_rules:
          - period_start_time_local: "16:00"
"#,
        )
        .unwrap();
        assert!(import.is_clean());
        let rule = &import.tariffs[0].energy_charges[0].rules[0];
        assert_eq!(rule.period_end_local, NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }

    #[test]
    fn export_then_import_round_trips() {
        let import = parse_str(DOC).unwrap();
        let yaml = export_str(&import.tariffs).unwrap();
        let again = parse_str(&yaml).unwrap();
        assert!(again.is_clean(), "{:?}", again.errors);
        assert_eq!(again.tariffs.len(), 1);

        let (a, b) = (&import.tariffs[0], &again.tariffs[0]);
        assert_eq!(a.name, b.name);
        assert_eq!(a.utility, b.utility);
        for (x, y) in a.energy_charges.iter().zip(&b.energy_charges) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.rate_usd_per_kwh, y.rate_usd_per_kwh);
            assert_eq!(x.rules, y.rules);
        }
        for (x, y) in a.demand_charges.iter().zip(&b.demand_charges) {
            assert_eq!(x.rate_usd_per_kw, y.rate_usd_per_kw);
            assert_eq!(x.peak_type, y.peak_type);
            assert_eq!(x.rules, y.rules);
        }
        for (x, y) in a.customer_charges.iter().zip(&b.customer_charges) {
            assert_eq!(x.amount_usd, y.amount_usd);
            assert_eq!(x.charge_type, y.charge_type);
        }
    }
}
