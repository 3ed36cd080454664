//! The cohort generator: two explicit phases.
//!
//! PHASES (fixed, never interleaved):
//!   1. sample():    exact-count cohort partition, independent attribute
//!                   draws, one draft engagement per client, access sites.
//!   2. reconcile(): force the exit total, settle the flipped rows, force
//!                   the permanent-housing total among exits, then
//!                   re-apply the sentinel rules.
//!
//! RULES:
//!   - The config is validated before any randomness is drawn.
//!   - Each phase draws from its own RNG stream (see rng.rs).
//!   - The output is fully determined by (config, seed).

use crate::{
    access_site::{generate_visits, AccessSiteVisit},
    cohort::{generate_clients, ClientRecord},
    config::GeneratorConfig,
    engagement::{EngagementRecord, EngagementSampler},
    error::SynthResult,
    reconcile::{enforce_consistency, reconcile, settle_exit_flips, FlagColumn, ReconcileReport},
    rng::{RngBank, StreamSlot},
    types::disability_column,
};

/// The three generated tables.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    /// `dis_*` column names, parallel to `ClientRecord::disabilities`.
    pub disability_columns: Vec<String>,
    pub clients: Vec<ClientRecord>,
    pub engagements: Vec<EngagementRecord>,
    pub access_visits: Vec<AccessSiteVisit>,
}

impl SyntheticDataset {
    pub fn exit_count(&self) -> usize {
        FlagColumn::Exited.count(&self.engagements)
    }

    pub fn perm_housing_count(&self) -> usize {
        FlagColumn::PermanentHousing.count(&self.engagements)
    }
}

/// What the reconciliation phase did to the draft.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub exits: ReconcileReport,
    pub perm_housing: ReconcileReport,
    pub consistency_fixes: usize,
}

/// A finished run: final tables plus the reconciliation audit trail.
#[derive(Debug, Clone)]
pub struct Generation {
    pub seed: u64,
    pub dataset: SyntheticDataset,
    pub outcome: ReconcileOutcome,
}

pub struct CohortGenerator {
    config: GeneratorConfig,
    rng_bank: RngBank,
}

impl CohortGenerator {
    /// Validate the config and build a generator. Fails fast on any
    /// infeasible target or bad probability vector.
    pub fn new(config: GeneratorConfig) -> SynthResult<Self> {
        config.validate()?;
        let rng_bank = RngBank::new(config.seed);
        Ok(Self { config, rng_bank })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Phase 1: unconstrained draft tables.
    pub fn sample(&self) -> SynthResult<SyntheticDataset> {
        let mut cohort_rng = self.rng_bank.for_stream(StreamSlot::Cohort);
        let mut demo_rng = self.rng_bank.for_stream(StreamSlot::Demographics);
        let mut engagement_rng = self.rng_bank.for_stream(StreamSlot::Engagement);
        let mut access_rng = self.rng_bank.for_stream(StreamSlot::AccessSite);

        let clients = generate_clients(&self.config, &mut cohort_rng, &mut demo_rng)?;
        let engagements =
            EngagementSampler::new(&self.config)?.sample(&clients, &mut engagement_rng)?;
        let access_visits = generate_visits(&self.config.access_sites, &mut access_rng)?;

        Ok(SyntheticDataset {
            disability_columns: self
                .config
                .disabilities
                .iter()
                .map(|d| disability_column(&d.name))
                .collect(),
            clients,
            engagements,
            access_visits,
        })
    }

    /// Phase 2: force the exact totals on a draft produced by `sample()`.
    pub fn reconcile(&self, dataset: &mut SyntheticDataset) -> SynthResult<ReconcileOutcome> {
        let mut rng = self.rng_bank.for_stream(StreamSlot::Reconciliation);
        let sampler = EngagementSampler::new(&self.config)?;
        let rows = &mut dataset.engagements;

        let exits = reconcile(rows, self.config.exit_target, FlagColumn::Exited, &mut rng)?;
        settle_exit_flips(rows, &exits, self.config.horizon_end, &sampler, &mut rng);

        let perm_housing = reconcile(
            rows,
            self.config.perm_housing_target,
            FlagColumn::PermanentHousing,
            &mut rng,
        )?;

        let consistency_fixes = enforce_consistency(rows);

        log::info!(
            "reconcile: exits {} -> {} ({} flipped), permanent housing {} -> {} ({} flipped), {} sentinel fixes",
            exits.realized,
            exits.target,
            exits.flip_count(),
            perm_housing.realized,
            perm_housing.target,
            perm_housing.flip_count(),
            consistency_fixes
        );

        Ok(ReconcileOutcome {
            exits,
            perm_housing,
            consistency_fixes,
        })
    }

    /// Run both phases.
    pub fn generate(&self) -> SynthResult<Generation> {
        let mut dataset = self.sample()?;
        let outcome = self.reconcile(&mut dataset)?;

        for program in &self.config.programs {
            let exits = dataset
                .engagements
                .iter()
                .filter(|e| e.exited_flag && e.program_name == program.name)
                .count();
            if exits == 0 && program.count > 0 {
                log::warn!("program {} has no exits after reconciliation", program.name);
            }
        }

        Ok(Generation {
            seed: self.config.seed,
            dataset,
            outcome,
        })
    }
}
