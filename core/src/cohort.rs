//! Client cohort generation.
//!
//! Intake year and primary program are exact-count partitions: the
//! configured counts are laid out and shuffled across client identities.
//! Every other attribute is an independent per-client draw.

use crate::{
    config::{weighted_table, GeneratorConfig},
    error::{SynthError, SynthResult},
    rng::StreamRng,
    types::{client_id, ClientId, Year},
};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand_distr::Dirichlet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub year: Year,
    pub household_type: String,
    pub age_group: String,
    pub race_ethnicity: String,
    pub gender: String,
    pub primary_program: String,
    pub provider: String,
    /// One flag per configured disability, in config order.
    pub disabilities: Vec<bool>,
}

/// Expand `(label, count)` pairs into a flat assignment list and shuffle it.
fn exact_partition<T: Clone>(counts: &[(T, usize)], rng: &mut StreamRng) -> Vec<T> {
    let mut out: Vec<T> = counts
        .iter()
        .flat_map(|(label, n)| std::iter::repeat(label.clone()).take(*n))
        .collect();
    out.shuffle(rng);
    out
}

/// Provider weights: explicit when configured, otherwise a flat
/// Dirichlet draw over the provider pool.
fn provider_table(config: &GeneratorConfig, rng: &mut StreamRng) -> SynthResult<WeightedIndex<f64>> {
    let field = "providers.weights";
    match &config.providers.weights {
        Some(w) => weighted_table(field, w),
        // Dirichlet needs at least two components.
        None if config.providers.count < 2 => weighted_table(field, &[1.0]),
        None => {
            let dirichlet = Dirichlet::new_with_size(1.0, config.providers.count)
                .map_err(|e| SynthError::config(field, e.to_string()))?;
            weighted_table(field, &dirichlet.sample(rng))
        }
    }
}

/// Generate the client table. `config` must already be validated.
///
/// `cohort_rng` drives the exact-count shuffles; `demo_rng` drives
/// every approximate attribute.
pub fn generate_clients(
    config: &GeneratorConfig,
    cohort_rng: &mut StreamRng,
    demo_rng: &mut StreamRng,
) -> SynthResult<Vec<ClientRecord>> {
    let n = config.total_clients;

    let year_counts: Vec<(Year, usize)> =
        config.year_counts.iter().map(|(y, c)| (*y, *c)).collect();
    let years = exact_partition(&year_counts, cohort_rng);

    let program_counts: Vec<(&str, usize)> = config
        .programs
        .iter()
        .map(|p| (p.name.as_str(), p.count))
        .collect();
    let programs = exact_partition(&program_counts, cohort_rng);

    let providers = config.providers.labels();
    let provider_tbl = provider_table(config, demo_rng)?;
    let household_tbl = config.household_types.table("household_types")?;
    let age_tbl = config.age_groups.table("age_groups")?;
    let race_tbl = config.race_ethnicity.table("race_ethnicity")?;
    let gender_tbl = config.gender.table("gender")?;

    let mut clients = Vec::with_capacity(n);
    for (i, (year, program)) in years.into_iter().zip(programs).enumerate() {
        let household_type = config.household_types.labels[demo_rng.pick(&household_tbl)].clone();
        let age_group = config.age_groups.labels[demo_rng.pick(&age_tbl)].clone();
        let race_ethnicity = config.race_ethnicity.labels[demo_rng.pick(&race_tbl)].clone();
        let gender = config.gender.labels[demo_rng.pick(&gender_tbl)].clone();
        let provider = providers[demo_rng.pick(&provider_tbl)].clone();
        let disabilities = config
            .disabilities
            .iter()
            .map(|d| demo_rng.chance(d.probability))
            .collect();

        clients.push(ClientRecord {
            client_id: client_id(i),
            year,
            household_type,
            age_group,
            race_ethnicity,
            gender,
            primary_program: program.to_string(),
            provider,
            disabilities,
        });
    }

    log::info!("cohort: generated {} clients", clients.len());
    Ok(clients)
}
