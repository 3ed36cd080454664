//! KPI aggregation: monthly system KPIs, program KPIs, the data-quality
//! watchlist and a flat extract for BI tools.
//!
//! Every table is a grouped aggregation over engagements joined to their
//! client. Groups are keyed by ordered maps, so row order is stable.

use crate::{
    cohort::ClientRecord,
    config::MetricsConfig,
    engagement::EngagementRecord,
    error::{SynthError, SynthResult},
    tables::{ensure_dir, read_rows, TableSet},
    types::{flag, ClientId, Year, DATA_NOT_COLLECTED},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub const MONTHLY_FILE: &str = "system_kpis_monthly.csv";
pub const PROGRAM_FILE: &str = "program_kpis.csv";
pub const WATCHLIST_FILE: &str = "data_quality_watchlist.csv";
pub const EXTRACT_FILE: &str = "tableau_extract.csv";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyKpi {
    pub exit_month: NaiveDate,
    pub exited_clients: u64,
    pub exits_to_perm_housing: u64,
    pub missing_exit_interviews: u64,
    pub median_days_in_program: f64,
    pub perm_housing_rate: f64,
    pub missing_exit_interview_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramKpi {
    pub program_name: String,
    pub total_clients: u64,
    pub exited_clients: u64,
    pub exits_to_perm_housing: u64,
    pub median_days_in_program: f64,
    pub missing_exit_interviews: u64,
    pub perm_housing_rate: f64,
    pub missing_exit_interview_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchlistRow {
    pub provider: String,
    pub program_name: String,
    pub exited_clients: u64,
    pub missing_exit_interviews: u64,
    pub missing_income: u64,
    pub median_days_in_program: f64,
    pub missing_exit_interview_rate: f64,
    pub missing_income_rate: f64,
    #[serde(with = "flag")]
    pub watch_flag: bool,
}

/// One engagement joined to its client, flattened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractRow {
    pub client_id: ClientId,
    pub program_name: String,
    pub provider: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub days_in_program: i64,
    #[serde(with = "flag")]
    pub exited_flag: bool,
    #[serde(with = "flag")]
    pub permanent_housing_flag: bool,
    #[serde(with = "flag")]
    pub exit_interview_completed: bool,
    pub exit_destination: String,
    pub income_at_exit_range: String,
    pub year: Year,
    pub household_type: String,
    pub age_group: String,
    pub race_ethnicity: String,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KpiTables {
    pub monthly: Vec<MonthlyKpi>,
    pub programs: Vec<ProgramKpi>,
    pub watchlist: Vec<WatchlistRow>,
    pub extract: Vec<ExtractRow>,
}

#[derive(Debug, Clone)]
pub struct KpiPaths {
    pub monthly: PathBuf,
    pub programs: PathBuf,
    pub watchlist: PathBuf,
    pub extract: PathBuf,
}

impl KpiPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            monthly: dir.join(MONTHLY_FILE),
            programs: dir.join(PROGRAM_FILE),
            watchlist: dir.join(WATCHLIST_FILE),
            extract: dir.join(EXTRACT_FILE),
        }
    }
}

/// Running totals for one group.
#[derive(Default)]
struct Tally<'a> {
    clients: BTreeSet<&'a str>,
    exited: u64,
    perm: u64,
    missing_interview: u64,
    missing_income: u64,
    days: Vec<i64>,
}

impl<'a> Tally<'a> {
    fn add(&mut self, e: &'a EngagementRecord) {
        self.clients.insert(e.client_id.as_str());
        if e.exited_flag {
            self.exited += 1;
            if e.income_at_exit_range == DATA_NOT_COLLECTED {
                self.missing_income += 1;
            }
        }
        if e.permanent_housing_flag {
            self.perm += 1;
        }
        if !e.exit_interview_completed {
            self.missing_interview += 1;
        }
        self.days.push(e.days_in_program());
    }

    fn median_days(&self) -> f64 {
        median(&self.days)
    }
}

/// Median of whole-day counts; even-length input averages the middle pair.
pub fn median(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// `numerator / denominator`, or 0 when there is nothing to divide by.
pub fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn month_floor(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Build every KPI table. Each engagement must join to exactly one client.
pub fn build_kpis(
    clients: &[ClientRecord],
    engagements: &[EngagementRecord],
    config: &MetricsConfig,
) -> SynthResult<KpiTables> {
    let by_id: HashMap<&str, &ClientRecord> =
        clients.iter().map(|c| (c.client_id.as_str(), c)).collect();

    let joined = engagements
        .iter()
        .map(|e| {
            by_id
                .get(e.client_id.as_str())
                .map(|c| (e, *c))
                .ok_or_else(|| {
                    SynthError::malformed(
                        "program_engagements",
                        format!("client {} not in client table", e.client_id),
                    )
                })
        })
        .collect::<SynthResult<Vec<_>>>()?;

    let mut monthly: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    let mut programs: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut groups: BTreeMap<(&str, &str), Tally> = BTreeMap::new();
    for &(e, _) in &joined {
        monthly.entry(month_floor(e.exit_date)).or_default().add(e);
        programs.entry(e.program_name.as_str()).or_default().add(e);
        groups
            .entry((e.provider.as_str(), e.program_name.as_str()))
            .or_default()
            .add(e);
    }

    let monthly = monthly
        .into_iter()
        .map(|(exit_month, t)| MonthlyKpi {
            exit_month,
            exited_clients: t.exited,
            exits_to_perm_housing: t.perm,
            missing_exit_interviews: t.missing_interview,
            median_days_in_program: t.median_days(),
            perm_housing_rate: rate(t.perm, t.exited),
            missing_exit_interview_rate: rate(t.missing_interview, t.exited),
        })
        .collect();

    let programs = programs
        .into_iter()
        .map(|(name, t)| ProgramKpi {
            program_name: name.to_string(),
            total_clients: t.clients.len() as u64,
            exited_clients: t.exited,
            exits_to_perm_housing: t.perm,
            median_days_in_program: t.median_days(),
            missing_exit_interviews: t.missing_interview,
            perm_housing_rate: rate(t.perm, t.exited),
            missing_exit_interview_rate: rate(t.missing_interview, t.exited),
        })
        .collect();

    let mut watchlist: Vec<WatchlistRow> = groups
        .into_iter()
        .map(|((provider, program), t)| {
            let interview_rate = rate(t.missing_interview, t.exited);
            let income_rate = rate(t.missing_income, t.exited);
            let watch_flag = t.exited >= config.min_exits_for_watch
                && (interview_rate > config.missing_interview_threshold
                    || income_rate > config.missing_income_threshold);
            WatchlistRow {
                provider: provider.to_string(),
                program_name: program.to_string(),
                exited_clients: t.exited,
                missing_exit_interviews: t.missing_interview,
                missing_income: t.missing_income,
                median_days_in_program: t.median_days(),
                missing_exit_interview_rate: interview_rate,
                missing_income_rate: income_rate,
                watch_flag,
            }
        })
        .collect();
    // Stable: ties keep (provider, program) order.
    watchlist.sort_by(|a, b| {
        b.watch_flag
            .cmp(&a.watch_flag)
            .then(b.missing_exit_interview_rate.total_cmp(&a.missing_exit_interview_rate))
            .then(b.missing_income_rate.total_cmp(&a.missing_income_rate))
    });

    let extract = joined
        .iter()
        .map(|(e, c)| ExtractRow {
            client_id: e.client_id.clone(),
            program_name: e.program_name.clone(),
            provider: e.provider.clone(),
            entry_date: e.entry_date,
            exit_date: e.exit_date,
            days_in_program: e.days_in_program(),
            exited_flag: e.exited_flag,
            permanent_housing_flag: e.permanent_housing_flag,
            exit_interview_completed: e.exit_interview_completed,
            exit_destination: e.exit_destination.clone(),
            income_at_exit_range: e.income_at_exit_range.clone(),
            year: c.year,
            household_type: c.household_type.clone(),
            age_group: c.age_group.clone(),
            race_ethnicity: c.race_ethnicity.clone(),
            gender: c.gender.clone(),
        })
        .collect();

    let tables = KpiTables {
        monthly,
        programs,
        watchlist,
        extract,
    };
    log::info!(
        "metrics: {} months, {} programs, {} watchlist groups ({} flagged)",
        tables.monthly.len(),
        tables.programs.len(),
        tables.watchlist.len(),
        tables.watchlist.iter().filter(|w| w.watch_flag).count()
    );
    Ok(tables)
}

pub fn write_kpis(dir: impl AsRef<Path>, tables: &KpiTables) -> SynthResult<KpiPaths> {
    ensure_dir(dir.as_ref())?;
    let paths = KpiPaths::in_dir(dir);
    let mut set = TableSet::new();
    set.rows(&paths.monthly, &tables.monthly)?;
    set.rows(&paths.programs, &tables.programs)?;
    set.rows(&paths.watchlist, &tables.watchlist)?;
    set.rows(&paths.extract, &tables.extract)?;
    set.commit()?;
    Ok(paths)
}

pub fn read_kpis(dir: impl AsRef<Path>) -> SynthResult<KpiTables> {
    let paths = KpiPaths::in_dir(dir);
    Ok(KpiTables {
        monthly: read_rows(&paths.monthly, "system_kpis_monthly")?,
        programs: read_rows(&paths.programs, "program_kpis")?,
        watchlist: read_rows(&paths.watchlist, "data_quality_watchlist")?,
        extract: read_rows(&paths.extract, "tableau_extract")?,
    })
}
