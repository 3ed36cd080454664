use crate::{
    error::{SynthError, SynthResult},
    types::Year,
};
use chrono::{Days, NaiveDate};
use rand::distributions::WeightedIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A categorical distribution: parallel label and weight lists.
/// Weights need not sum to 1; they are normalised before sampling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Categorical {
    pub labels: Vec<String>,
    pub weights: Vec<f64>,
}

impl Categorical {
    pub fn new(pairs: &[(&str, f64)]) -> Self {
        Self {
            labels: pairs.iter().map(|(l, _)| (*l).to_string()).collect(),
            weights: pairs.iter().map(|(_, w)| *w).collect(),
        }
    }

    pub fn validate(&self, field: &str) -> SynthResult<()> {
        if self.labels.is_empty() {
            return Err(SynthError::config(field, "no categories"));
        }
        if self.labels.len() != self.weights.len() {
            return Err(SynthError::config(
                field,
                format!(
                    "{} labels but {} weights",
                    self.labels.len(),
                    self.weights.len()
                ),
            ));
        }
        validate_weights(field, &self.weights)
    }

    /// Weighted sampling table over the label indices.
    pub fn table(&self, field: &str) -> SynthResult<WeightedIndex<f64>> {
        weighted_table(field, &self.weights)
    }
}

pub(crate) fn validate_weights(field: &str, weights: &[f64]) -> SynthResult<()> {
    if weights.is_empty() {
        return Err(SynthError::config(field, "empty probability vector"));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(SynthError::config(
            field,
            format!("weight {w} is negative or not finite"),
        ));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(SynthError::config(field, "weights sum to zero"));
    }
    Ok(())
}

pub(crate) fn weighted_table(field: &str, weights: &[f64]) -> SynthResult<WeightedIndex<f64>> {
    WeightedIndex::new(weights).map_err(|e| SynthError::config(field, e.to_string()))
}

fn validate_rate(field: &str, p: f64) -> SynthResult<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SynthError::config(
            field,
            format!("rate {p} outside [0, 1]"),
        ));
    }
    Ok(())
}

/// Log-normal length-of-stay regime. `mean`/`sigma` describe the
/// underlying normal; draws are truncated to whole days and clipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DurationParams {
    pub mean: f64,
    pub sigma: f64,
    pub min_days: u32,
    pub max_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    /// Exact number of clients whose primary program this is.
    pub count: usize,
    pub duration: DurationParams,
    pub missing_interview_rate: f64,
    pub perm_housing_probability: f64,
    pub exit_destinations: Categorical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisabilityConfig {
    pub name: String,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub count: usize,
    #[serde(default = "default_provider_prefix")]
    pub label_prefix: String,
    /// Explicit provider weights. When absent, weights are drawn
    /// from a flat Dirichlet on the demographics stream.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

fn default_provider_prefix() -> String {
    "Provider_".into()
}

impl ProviderConfig {
    /// Provider labels, 1-based: Provider_01, Provider_02, ...
    pub fn labels(&self) -> Vec<String> {
        (1..=self.count)
            .map(|i| format!("{}{i:02}", self.label_prefix))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessSiteConfig {
    pub site: String,
    pub visits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessFixtureConfig {
    pub window_start: NaiveDate,
    /// Visit dates fall in [window_start, window_start + window_days).
    pub window_days: u32,
    pub sites: Vec<AccessSiteConfig>,
}

/// The single explicit configuration handed to the generator.
/// One instance is one calibration profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub total_clients: usize,
    /// Exact intake-year cohort sizes.
    pub year_counts: BTreeMap<Year, usize>,
    /// Engagements still open on this date are not exited.
    pub horizon_end: NaiveDate,
    pub exit_target: usize,
    pub perm_housing_target: usize,
    pub programs: Vec<ProgramConfig>,
    pub household_types: Categorical,
    pub age_groups: Categorical,
    pub race_ethnicity: Categorical,
    pub gender: Categorical,
    pub disabilities: Vec<DisabilityConfig>,
    pub providers: ProviderConfig,
    pub exit_income: Categorical,
    pub access_sites: AccessFixtureConfig,
}

fn default_seed() -> u64 {
    42
}

impl GeneratorConfig {
    /// Load a calibration profile from a JSON file.
    /// The profile is not validated here; the generator validates on build.
    pub fn load(path: impl AsRef<Path>) -> SynthResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: GeneratorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn program(&self, name: &str) -> Option<&ProgramConfig> {
        self.programs.iter().find(|p| p.name == name)
    }

    /// Feasibility checks. Every violation is fatal and is raised
    /// before any sampling happens.
    pub fn validate(&self) -> SynthResult<()> {
        let year_total: usize = self.year_counts.values().sum();
        if year_total != self.total_clients {
            return Err(SynthError::config(
                "year_counts",
                format!(
                    "year counts sum to {year_total}, total_clients is {}",
                    self.total_clients
                ),
            ));
        }
        for year in self.year_counts.keys() {
            let last_day = NaiveDate::from_ymd_opt(*year, 12, 31).ok_or_else(|| {
                SynthError::config("year_counts", format!("year {year} is not representable"))
            })?;
            if last_day > self.horizon_end {
                return Err(SynthError::config(
                    "year_counts",
                    format!("intake year {year} ends after horizon {}", self.horizon_end),
                ));
            }
        }

        if self.programs.is_empty() {
            return Err(SynthError::config("programs", "no programs configured"));
        }
        let mut seen = BTreeSet::new();
        for p in &self.programs {
            if !seen.insert(p.name.as_str()) {
                return Err(SynthError::config(
                    "programs",
                    format!("duplicate program '{}'", p.name),
                ));
            }
            let field = format!("programs.{}", p.name);
            let d = p.duration;
            if !d.mean.is_finite() || !d.sigma.is_finite() || d.sigma < 0.0 {
                return Err(SynthError::config(
                    format!("{field}.duration"),
                    "mean must be finite and sigma finite and >= 0",
                ));
            }
            if d.min_days > d.max_days {
                return Err(SynthError::config(
                    format!("{field}.duration"),
                    format!("min_days {} > max_days {}", d.min_days, d.max_days),
                ));
            }
            validate_rate(&format!("{field}.missing_interview_rate"), p.missing_interview_rate)?;
            validate_rate(
                &format!("{field}.perm_housing_probability"),
                p.perm_housing_probability,
            )?;
            p.exit_destinations
                .validate(&format!("{field}.exit_destinations"))?;
        }
        let program_total: usize = self.programs.iter().map(|p| p.count).sum();
        if program_total != self.total_clients {
            return Err(SynthError::config(
                "programs",
                format!(
                    "program counts sum to {program_total}, total_clients is {}",
                    self.total_clients
                ),
            ));
        }

        if self.exit_target > self.total_clients {
            return Err(SynthError::config(
                "exit_target",
                format!(
                    "{} exceeds total_clients {}",
                    self.exit_target, self.total_clients
                ),
            ));
        }
        if self.perm_housing_target > self.exit_target {
            return Err(SynthError::config(
                "perm_housing_target",
                format!(
                    "{} exceeds exit_target {}",
                    self.perm_housing_target, self.exit_target
                ),
            ));
        }

        self.household_types.validate("household_types")?;
        self.age_groups.validate("age_groups")?;
        self.race_ethnicity.validate("race_ethnicity")?;
        self.gender.validate("gender")?;
        self.exit_income.validate("exit_income")?;
        for d in &self.disabilities {
            validate_rate(&format!("disabilities.{}", d.name), d.probability)?;
        }

        if self.providers.count == 0 {
            return Err(SynthError::config("providers.count", "must be > 0"));
        }
        if let Some(w) = &self.providers.weights {
            if w.len() != self.providers.count {
                return Err(SynthError::config(
                    "providers.weights",
                    format!("{} weights for {} providers", w.len(), self.providers.count),
                ));
            }
            validate_weights("providers.weights", w)?;
        }

        let any_visits = self.access_sites.sites.iter().any(|s| s.visits > 0);
        if any_visits && self.access_sites.window_days == 0 {
            return Err(SynthError::config(
                "access_sites.window_days",
                "must be > 0 when any site has visits",
            ));
        }
        let window = &self.access_sites;
        if window
            .window_start
            .checked_add_days(Days::new(u64::from(window.window_days)))
            .is_none()
        {
            return Err(SynthError::config(
                "access_sites.window_days",
                format!(
                    "window of {} days from {} runs past the last representable date",
                    window.window_days, window.window_start
                ),
            ));
        }
        Ok(())
    }

    /// Profile calibrated to the publicly reported 2022-2023 system totals.
    pub fn calibrated_2022_2023() -> Self {
        let rental_subsidy = "Rental by client, with ongoing housing subsidy";
        let rental_no_subsidy = "Rental by client, no ongoing housing subsidy";
        let shelter = "Emergency shelter (voucher)";
        let family_temp = "Staying with family (temporary)";
        let friends_temp = "Staying with friends (temporary)";
        let family_perm = "Staying with family (permanent)";
        let no_interview = crate::types::NO_EXIT_INTERVIEW;

        let hhcm = ProgramConfig {
            name: "HHCM".into(),
            count: 291,
            duration: DurationParams { mean: 5.2, sigma: 0.5, min_days: 14, max_days: 240 },
            missing_interview_rate: 0.08,
            perm_housing_probability: 0.35,
            exit_destinations: Categorical::new(&[
                (rental_subsidy, 0.23),
                (rental_no_subsidy, 0.22),
                (shelter, 0.09),
                ("Hotel/motel without voucher", 0.02),
                (family_temp, 0.12),
                (friends_temp, 0.13),
                ("Place not meant for habitation", 0.12),
                (family_perm, 0.02),
                (no_interview, 0.02),
                ("Other", 0.03),
            ]),
        };
        let shi = ProgramConfig {
            name: "SHI".into(),
            count: 358,
            duration: DurationParams { mean: 6.0, sigma: 0.6, min_days: 60, max_days: 900 },
            missing_interview_rate: 0.08,
            perm_housing_probability: 0.32,
            exit_destinations: Categorical::new(&[
                (rental_subsidy, 0.20),
                (no_interview, 0.14),
                ("Deceased", 0.17),
                (shelter, 0.11),
                (family_perm, 0.06),
                (family_temp, 0.11),
                ("Staying with friends (permanent)", 0.03),
                (friends_temp, 0.09),
                ("Jail/prison/juvenile detention", 0.06),
                ("Long-term care/nursing home", 0.03),
            ]),
        };
        let general_destinations = Categorical::new(&[
            (rental_subsidy, 0.18),
            (rental_no_subsidy, 0.18),
            (family_temp, 0.18),
            (friends_temp, 0.18),
            (shelter, 0.12),
            (no_interview, 0.06),
            ("Other", 0.10),
        ]);
        let general_duration = DurationParams { mean: 5.0, sigma: 0.6, min_days: 7, max_days: 365 };
        let cea = ProgramConfig {
            name: "CEA".into(),
            count: 240,
            duration: general_duration,
            missing_interview_rate: 0.05,
            perm_housing_probability: 0.30,
            exit_destinations: general_destinations.clone(),
        };
        let other = ProgramConfig {
            name: "OTHER_COC".into(),
            count: 2495 - 291 - 358 - 240,
            duration: general_duration,
            missing_interview_rate: 0.05,
            perm_housing_probability: 0.30,
            exit_destinations: general_destinations,
        };

        Self {
            seed: default_seed(),
            total_clients: 2495,
            year_counts: [(2022, 1047), (2023, 1448)].into(),
            horizon_end: ymd(2023, 12, 31),
            exit_target: 2261,
            perm_housing_target: 855,
            programs: vec![hhcm, shi, cea, other],
            household_types: Categorical::new(&[
                ("Single Adult", 0.60),
                ("Family", 0.35),
                ("Unaccompanied Youth", 0.05),
            ]),
            age_groups: Categorical::new(&[
                ("Under 5", 0.05),
                ("5-12", 0.06),
                ("13-17", 0.03),
                ("18-24", 0.05),
                ("25-34", 0.18),
                ("35-44", 0.16),
                ("45-54", 0.18),
                ("55-64", 0.14),
                ("65+", 0.15),
            ]),
            race_ethnicity: Categorical::new(&[
                ("Black/African American/African", 0.49),
                ("White", 0.20),
                ("Hispanic/Latino & White", 0.18),
                ("Hispanic/Latino & Black", 0.04),
                ("Other", 0.09),
            ]),
            gender: Categorical::new(&[
                ("Male", 0.40),
                ("Female", 0.58),
                ("Other/Unknown", 0.02),
            ]),
            disabilities: [
                ("Chronic Health Condition", 0.30),
                ("Physical Disability", 0.18),
                ("Developmental Disability", 0.16),
                ("Mental Health Disorder", 0.20),
                ("Drug Use Disorder", 0.08),
                ("Alcohol Use Disorder", 0.06),
                ("HIV/AIDS", 0.01),
            ]
            .into_iter()
            .map(|(name, probability)| DisabilityConfig { name: name.into(), probability })
            .collect(),
            providers: ProviderConfig {
                count: 17,
                label_prefix: default_provider_prefix(),
                weights: None,
            },
            // Weights are the reported exit counts per band.
            exit_income: Categorical::new(&[
                ("No Income", 30.0),
                ("$151–$250", 2.0),
                ("$251–$500", 4.0),
                ("$501–$1,000", 2.0),
                ("$1,001–$1,500", 13.0),
                ("$1,501–$2,000", 11.0),
                ("$2,001+", 105.0),
                (crate::types::DATA_NOT_COLLECTED, 15.0),
            ]),
            access_sites: AccessFixtureConfig {
                window_start: ymd(2023, 6, 1),
                window_days: 240,
                sites: [
                    ("Unity Square Community Center, New Brunswick", 91),
                    ("Middlesex College Resource Hub, Edison", 31),
                    ("First Presbyterian Church of Metuchen, Metuchen", 41),
                    ("Center for Support, Success & Prosperity, Perth Amboy", 71),
                ]
                .into_iter()
                .map(|(site, visits)| AccessSiteConfig { site: site.into(), visits })
                .collect(),
            },
        }
    }

    /// Small profile for tests: same vocabularies, 200 clients.
    pub fn small_test() -> Self {
        let mut cfg = Self::calibrated_2022_2023();
        cfg.total_clients = 200;
        cfg.year_counts = [(2022, 80), (2023, 120)].into();
        for (program, count) in cfg.programs.iter_mut().zip([40, 50, 30, 80]) {
            program.count = count;
        }
        cfg.exit_target = 150;
        cfg.perm_housing_target = 60;
        cfg.providers.count = 5;
        cfg.access_sites.sites.truncate(2);
        for (site, visits) in cfg.access_sites.sites.iter_mut().zip([10, 5]) {
            site.visits = visits;
        }
        cfg
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Thresholds for the data-quality watchlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Groups with fewer exits are never flagged.
    pub min_exits_for_watch: u64,
    pub missing_interview_threshold: f64,
    pub missing_income_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_exits_for_watch: 30,
            missing_interview_threshold: 0.12,
            missing_income_threshold: 0.10,
        }
    }
}
