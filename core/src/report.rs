//! Markdown summary report over the generated tables and KPI tables.
//! Cuts usually shown as charts are rendered as tables.

use crate::{
    error::SynthResult,
    generator::SyntheticDataset,
    metrics::{
        rate, KpiTables, MonthlyKpi, ProgramKpi, WatchlistRow, EXTRACT_FILE, MONTHLY_FILE,
        PROGRAM_FILE, WATCHLIST_FILE,
    },
    tables::{ensure_dir, TableSet},
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "report.md";
pub const WATCHLIST_TOP_FILE: &str = "watchlist_top10.csv";
const WATCHLIST_TOP_N: usize = 10;

/// Permanent-housing outcome for one race/ethnicity group, exits only.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityRow {
    pub race_ethnicity: String,
    pub exited_clients: u64,
    pub perm_exits: u64,
    pub perm_rate: f64,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub markdown: String,
    pub watchlist_top: Vec<WatchlistRow>,
    pub equity: Vec<EquityRow>,
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub watchlist_top: PathBuf,
}

/// Permanent-housing rate by race/ethnicity among exited clients,
/// highest rate first.
pub fn equity_by_race(kpis: &KpiTables) -> Vec<EquityRow> {
    let mut groups: BTreeMap<&str, (BTreeSet<&str>, u64)> = BTreeMap::new();
    for row in kpis.extract.iter().filter(|r| r.exited_flag) {
        let entry = groups.entry(row.race_ethnicity.as_str()).or_default();
        entry.0.insert(row.client_id.as_str());
        entry.1 += u64::from(row.permanent_housing_flag);
    }
    let mut rows: Vec<EquityRow> = groups
        .into_iter()
        .map(|(race, (clients, perm))| {
            let exited = clients.len() as u64;
            EquityRow {
                race_ethnicity: race.to_string(),
                exited_clients: exited,
                perm_exits: perm,
                perm_rate: rate(perm, exited),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.perm_rate.total_cmp(&a.perm_rate));
    rows
}

/// Format an integer with thousands separators: 2495 -> "2,495".
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn build_report(dataset: &SyntheticDataset, kpis: &KpiTables) -> SynthResult<Report> {
    let mut programs = kpis.programs.clone();
    programs.sort_by(|a, b| b.perm_housing_rate.total_cmp(&a.perm_housing_rate));
    let equity = equity_by_race(kpis);
    let watchlist_top: Vec<WatchlistRow> = kpis
        .watchlist
        .iter()
        .filter(|w| w.watch_flag)
        .take(WATCHLIST_TOP_N)
        .cloned()
        .collect();

    let mut md = String::new();
    write_totals(&mut md, dataset)?;
    write_programs(&mut md, &programs)?;
    write_equity(&mut md, &equity)?;
    write_monthly(&mut md, &kpis.monthly)?;
    write_watchlist(&mut md, &watchlist_top)?;
    write_outputs(&mut md)?;

    Ok(Report {
        markdown: md,
        watchlist_top,
        equity,
    })
}

fn write_totals(md: &mut String, dataset: &SyntheticDataset) -> fmt::Result {
    let distinct_clients = dataset
        .clients
        .iter()
        .map(|c| c.client_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    writeln!(md, "# System Performance & Data Quality Summary (Synthetic)")?;
    writeln!(md)?;
    writeln!(
        md,
        "Synthetic HMIS-style client episodes, calibrated to publicly reported system totals."
    )?;
    writeln!(md)?;
    writeln!(md, "## Calibrated totals")?;
    writeln!(md, "- Total clients: {}", thousands(distinct_clients))?;
    writeln!(md, "- Total exits: {}", thousands(dataset.exit_count()))?;
    writeln!(md, "- Exits to permanent housing: {}", thousands(dataset.perm_housing_count()))?;
    writeln!(md, "- Access-site visits: {}", thousands(dataset.access_visits.len()))?;
    writeln!(md)
}

fn write_programs(md: &mut String, programs: &[ProgramKpi]) -> fmt::Result {
    writeln!(md, "## Permanent housing rate by program")?;
    writeln!(md, "| Program | Clients | Exits | Perm. housing exits | Perm. housing rate | Median days | Missing exit interview rate |")?;
    writeln!(md, "|---|---:|---:|---:|---:|---:|---:|")?;
    for p in programs {
        writeln!(
            md,
            "| {} | {} | {} | {} | {:.1}% | {:.1} | {:.1}% |",
            p.program_name,
            p.total_clients,
            p.exited_clients,
            p.exits_to_perm_housing,
            p.perm_housing_rate * 100.0,
            p.median_days_in_program,
            p.missing_exit_interview_rate * 100.0
        )?;
    }
    writeln!(md)
}

fn write_equity(md: &mut String, equity: &[EquityRow]) -> fmt::Result {
    writeln!(md, "## Permanent housing rate by race/ethnicity (exits only)")?;
    writeln!(md, "| Race/ethnicity | Exits | Perm. housing exits | Rate |")?;
    writeln!(md, "|---|---:|---:|---:|")?;
    for e in equity {
        writeln!(
            md,
            "| {} | {} | {} | {:.1}% |",
            e.race_ethnicity,
            e.exited_clients,
            e.perm_exits,
            e.perm_rate * 100.0
        )?;
    }
    writeln!(md)
}

fn write_monthly(md: &mut String, monthly: &[MonthlyKpi]) -> fmt::Result {
    writeln!(md, "## Monthly exits vs permanent housing exits")?;
    writeln!(md, "| Month | Exits | Perm. housing exits |")?;
    writeln!(md, "|---|---:|---:|")?;
    for m in monthly {
        writeln!(
            md,
            "| {} | {} | {} |",
            m.exit_month.format("%Y-%m"),
            m.exited_clients,
            m.exits_to_perm_housing
        )?;
    }
    writeln!(md)
}

fn write_watchlist(md: &mut String, watchlist_top: &[WatchlistRow]) -> fmt::Result {
    writeln!(md, "## Data quality watchlist")?;
    if watchlist_top.is_empty() {
        writeln!(md, "No provider/program group crossed the watch thresholds.")?;
    } else {
        writeln!(md, "| Provider | Program | Exits | Missing exit interview rate | Missing income rate |")?;
        writeln!(md, "|---|---|---:|---:|---:|")?;
        for w in watchlist_top {
            writeln!(
                md,
                "| {} | {} | {} | {:.1}% | {:.1}% |",
                w.provider,
                w.program_name,
                w.exited_clients,
                w.missing_exit_interview_rate * 100.0,
                w.missing_income_rate * 100.0
            )?;
        }
    }
    writeln!(md)
}

fn write_outputs(md: &mut String) -> fmt::Result {
    writeln!(md, "## Outputs")?;
    writeln!(md, "- Monthly KPIs: `{MONTHLY_FILE}`")?;
    writeln!(md, "- Program KPIs: `{PROGRAM_FILE}`")?;
    writeln!(md, "- Data quality watchlist: `{WATCHLIST_FILE}`")?;
    writeln!(md, "- Flat extract: `{EXTRACT_FILE}`")?;
    writeln!(md, "- Top watchlist groups: `{WATCHLIST_TOP_FILE}`")
}

/// Write the report and the top-watchlist table together.
pub fn write_report(dir: impl AsRef<Path>, report: &Report) -> SynthResult<ReportPaths> {
    let dir = dir.as_ref();
    ensure_dir(dir)?;
    let paths = ReportPaths {
        markdown: dir.join(REPORT_FILE),
        watchlist_top: dir.join(WATCHLIST_TOP_FILE),
    };
    let mut set = TableSet::new();
    set.text(&paths.markdown, &report.markdown)?;
    set.rows(&paths.watchlist_top, &report.watchlist_top)?;
    set.commit()?;
    log::info!("report: wrote {}", paths.markdown.display());
    Ok(paths)
}
