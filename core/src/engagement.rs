//! Per-client engagement sampling: the unconstrained draft phase.
//!
//! Every client gets exactly one engagement. Nothing here looks at
//! aggregate targets; exact totals are the reconciler's job.

use crate::{
    cohort::ClientRecord,
    config::{GeneratorConfig, ProgramConfig},
    error::{SynthError, SynthResult},
    rng::StreamRng,
    types::{flag, ClientId, DATA_NOT_COLLECTED, NO_EXIT_INTERVIEW},
};
use chrono::{Duration, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::LogNormal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngagementRecord {
    pub client_id: ClientId,
    pub program_name: String,
    pub provider: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    #[serde(with = "flag")]
    pub exited_flag: bool,
    #[serde(with = "flag")]
    pub exit_interview_completed: bool,
    pub exit_destination: String,
    pub income_at_exit_range: String,
    #[serde(with = "flag")]
    pub permanent_housing_flag: bool,
}

impl EngagementRecord {
    /// Whole days between entry and exit, never negative.
    pub fn days_in_program(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days().max(0)
    }
}

/// Prepared distributions for one program.
struct ProgramSampler<'a> {
    program: &'a ProgramConfig,
    duration: LogNormal<f64>,
    destinations: WeightedIndex<f64>,
}

/// Draws one draft engagement per client.
pub struct EngagementSampler<'a> {
    horizon_end: NaiveDate,
    programs: BTreeMap<&'a str, ProgramSampler<'a>>,
    income_labels: &'a [String],
    income: WeightedIndex<f64>,
}

impl<'a> EngagementSampler<'a> {
    /// Build every program's distributions up front. Fails on a config
    /// that has not been validated.
    pub fn new(config: &'a GeneratorConfig) -> SynthResult<Self> {
        let programs = config
            .programs
            .iter()
            .map(|p| -> SynthResult<(&'a str, ProgramSampler<'a>)> {
                let field = format!("programs.{}", p.name);
                let d = p.duration;
                let duration = LogNormal::new(d.mean, d.sigma)
                    .map_err(|e| SynthError::config(format!("{field}.duration"), e.to_string()))?;
                let destinations = p
                    .exit_destinations
                    .table(&format!("{field}.exit_destinations"))?;
                Ok((
                    p.name.as_str(),
                    ProgramSampler {
                        program: p,
                        duration,
                        destinations,
                    },
                ))
            })
            .collect::<SynthResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            horizon_end: config.horizon_end,
            programs,
            income_labels: &config.exit_income.labels,
            income: config.exit_income.table("exit_income")?,
        })
    }

    /// Draft one engagement per client, in client order.
    pub fn sample(
        &self,
        clients: &[ClientRecord],
        rng: &mut StreamRng,
    ) -> SynthResult<Vec<EngagementRecord>> {
        let rows = clients
            .iter()
            .map(|c| self.sample_one(c, rng))
            .collect::<SynthResult<Vec<_>>>()?;
        let exited = rows.iter().filter(|r| r.exited_flag).count();
        log::info!(
            "engagement: drafted {} engagements, {exited} exited before horizon {}",
            rows.len(),
            self.horizon_end
        );
        Ok(rows)
    }

    fn sample_one(
        &self,
        client: &ClientRecord,
        rng: &mut StreamRng,
    ) -> SynthResult<EngagementRecord> {
        let sampler = self
            .programs
            .get(client.primary_program.as_str())
            .ok_or_else(|| {
                SynthError::config(
                    "programs",
                    format!(
                        "client {} has unknown program '{}'",
                        client.client_id, client.primary_program
                    ),
                )
            })?;
        let program = sampler.program;

        let entry_date = random_date_in_year(client.year, rng)?;

        let d = program.duration;
        let raw = sampler.duration.sample(rng);
        let duration_days = raw.clamp(f64::from(d.min_days), f64::from(d.max_days)) as i64;

        // Compared in days; adding first can overflow the calendar.
        let days_left = (self.horizon_end - entry_date).num_days();
        let exited = duration_days <= days_left;
        let exit_date = if exited {
            entry_date + Duration::days(duration_days)
        } else {
            self.horizon_end
        };

        let missing_interview = rng.chance(program.missing_interview_rate);
        let permanent = exited && rng.chance(program.perm_housing_probability);

        let mut destination =
            program.exit_destinations.labels[rng.pick(&sampler.destinations)].clone();
        if missing_interview {
            destination = NO_EXIT_INTERVIEW.to_string();
        }

        let income = if exited {
            self.draw_income(rng)
        } else {
            DATA_NOT_COLLECTED.to_string()
        };

        Ok(EngagementRecord {
            client_id: client.client_id.clone(),
            program_name: program.name.clone(),
            provider: client.provider.clone(),
            entry_date,
            exit_date,
            exited_flag: exited,
            exit_interview_completed: !missing_interview,
            exit_destination: destination,
            income_at_exit_range: income,
            permanent_housing_flag: permanent,
        })
    }

    /// Draw an income band from the exit-income distribution.
    pub fn draw_income(&self, rng: &mut StreamRng) -> String {
        self.income_labels[rng.pick(&self.income)].clone()
    }
}

/// Uniform calendar day within `year`, both ends inclusive.
fn random_date_in_year(year: i32, rng: &mut StreamRng) -> SynthResult<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| SynthError::config("year_counts", format!("bad year {year}")))?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| SynthError::config("year_counts", format!("bad year {year}")))?;
    let span = (end - start).num_days();
    Ok(start + Duration::days(rng.gen_range(0..=span)))
}
