//! Client cohort tests: exact partitions and attribute vocabularies.

use cohort_core::{
    config::GeneratorConfig,
    generator::{CohortGenerator, SyntheticDataset},
};
use std::collections::{BTreeMap, BTreeSet};

fn calibrated(seed: u64) -> SyntheticDataset {
    CohortGenerator::new(GeneratorConfig::calibrated_2022_2023().with_seed(seed))
        .expect("valid profile")
        .generate()
        .expect("generate")
        .dataset
}

#[test]
fn population_has_exact_total_and_unique_ids() {
    let dataset = calibrated(42);
    assert_eq!(dataset.clients.len(), 2495);

    let ids: BTreeSet<&str> = dataset.clients.iter().map(|c| c.client_id.as_str()).collect();
    assert_eq!(ids.len(), 2495, "client IDs are not unique");
    assert_eq!(dataset.clients[0].client_id, "C00001");
    assert_eq!(dataset.clients[2494].client_id, "C02495");
}

#[test]
fn year_counts_match_configured_targets_exactly() {
    for seed in [1, 42, 2023] {
        let dataset = calibrated(seed);
        let mut years: BTreeMap<i32, usize> = BTreeMap::new();
        for c in &dataset.clients {
            *years.entry(c.year).or_default() += 1;
        }
        assert_eq!(years.get(&2022), Some(&1047), "seed {seed}");
        assert_eq!(years.get(&2023), Some(&1448), "seed {seed}");
        assert_eq!(years.len(), 2);
    }
}

#[test]
fn program_counts_match_configured_targets_exactly() {
    let dataset = calibrated(42);
    let mut programs: BTreeMap<&str, usize> = BTreeMap::new();
    for c in &dataset.clients {
        *programs.entry(c.primary_program.as_str()).or_default() += 1;
    }
    assert_eq!(programs["HHCM"], 291);
    assert_eq!(programs["SHI"], 358);
    assert_eq!(programs["CEA"], 240);
    assert_eq!(programs["OTHER_COC"], 1606);
}

#[test]
fn partition_is_shuffled_across_identities() {
    // An unshuffled layout would put every 2022 client first.
    let dataset = calibrated(42);
    let first_block_2023 = dataset.clients[..1047].iter().filter(|c| c.year == 2023).count();
    assert!(first_block_2023 > 300, "only {first_block_2023} of the first 1047 clients are 2023 intakes");
}

#[test]
fn attributes_come_from_configured_vocabularies() {
    let config = GeneratorConfig::calibrated_2022_2023();
    let dataset = calibrated(42);
    let providers: BTreeSet<String> = config.providers.labels().into_iter().collect();

    for c in &dataset.clients {
        assert!(config.household_types.labels.contains(&c.household_type));
        assert!(config.age_groups.labels.contains(&c.age_group));
        assert!(config.race_ethnicity.labels.contains(&c.race_ethnicity));
        assert!(config.gender.labels.contains(&c.gender));
        assert!(providers.contains(&c.provider), "unknown provider {}", c.provider);
        assert_eq!(c.disabilities.len(), 7);
    }
    assert_eq!(dataset.disability_columns[6], "dis_HIV_AIDS");
}

#[test]
fn approximate_marginals_are_near_configured_rates() {
    let dataset = calibrated(42);
    let n = dataset.clients.len() as f64;

    let female = dataset.clients.iter().filter(|c| c.gender == "Female").count() as f64;
    assert!((female / n - 0.58).abs() < 0.04, "female share {:.3}", female / n);

    // Chronic Health Condition is the first indicator at 0.30.
    let chronic = dataset.clients.iter().filter(|c| c.disabilities[0]).count() as f64;
    assert!((chronic / n - 0.30).abs() < 0.04, "chronic share {:.3}", chronic / n);
}

#[test]
fn explicit_provider_weights_are_respected() {
    let mut config = GeneratorConfig::small_test();
    config.providers.weights = Some(vec![0.0, 0.0, 1.0, 0.0, 0.0]);
    let dataset = CohortGenerator::new(config).unwrap().generate().unwrap().dataset;
    assert!(dataset.clients.iter().all(|c| c.provider == "Provider_03"));
}
