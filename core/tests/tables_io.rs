//! CSV output contract: headers, encodings, and reading tables back.

use cohort_core::{
    config::GeneratorConfig,
    error::SynthError,
    generator::CohortGenerator,
    tables::{read_clients, read_dataset, read_engagements, write_dataset},
};

#[test]
fn headers_match_the_downstream_contract() {
    let dir = tempfile::tempdir().unwrap();
    let generation = CohortGenerator::new(GeneratorConfig::small_test())
        .unwrap()
        .generate()
        .unwrap();
    let paths = write_dataset(dir.path(), &generation.dataset).unwrap();

    let first_line = |p: &std::path::Path| {
        std::fs::read_to_string(p)
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string()
    };

    assert_eq!(
        first_line(paths.engagements.as_path()),
        "client_id,program_name,provider,entry_date,exit_date,exited_flag,\
         exit_interview_completed,exit_destination,income_at_exit_range,permanent_housing_flag"
    );
    assert_eq!(first_line(paths.access_sites.as_path()), "site,engagement_date");
    assert!(first_line(paths.clients.as_path()).starts_with(
        "client_id,year,household_type,age_group,race_ethnicity,gender,primary_program,provider,\
         dis_Chronic_Health_Condition"
    ));
}

#[test]
fn flags_and_dates_are_encoded_plainly() {
    let dir = tempfile::tempdir().unwrap();
    let generation = CohortGenerator::new(GeneratorConfig::small_test())
        .unwrap()
        .generate()
        .unwrap();
    let paths = write_dataset(dir.path(), &generation.dataset).unwrap();

    let text = std::fs::read_to_string(&paths.engagements).unwrap();
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    for record in reader.records() {
        let record = record.unwrap();
        for col in [5, 6, 9] {
            assert!(matches!(&record[col], "0" | "1"), "flag column {col} = {}", &record[col]);
        }
        assert_eq!(record[3].len(), 10, "entry_date {}", &record[3]);
        assert!(chrono::NaiveDate::parse_from_str(&record[4], "%Y-%m-%d").is_ok());
    }
}

#[test]
fn written_dataset_reads_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let generation = CohortGenerator::new(GeneratorConfig::small_test().with_seed(11))
        .unwrap()
        .generate()
        .unwrap();
    write_dataset(dir.path(), &generation.dataset).unwrap();

    let loaded = read_dataset(dir.path()).unwrap();
    assert_eq!(loaded, generation.dataset);
}

#[test]
fn missing_client_column_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clients.csv");
    std::fs::write(&path, "client_id,year,household_type\nC00001,2022,Family\n").unwrap();

    let err = read_clients(&path).unwrap_err();
    assert!(matches!(err, SynthError::MalformedTable { .. }), "{err}");
}

#[test]
fn bad_flag_value_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program_engagements.csv");
    std::fs::write(
        &path,
        "client_id,program_name,provider,entry_date,exit_date,exited_flag,\
         exit_interview_completed,exit_destination,income_at_exit_range,permanent_housing_flag\n\
         C00001,CEA,Provider_01,2023-01-05,2023-03-01,2,1,Other,No Income,0\n",
    )
    .unwrap();

    let err = read_engagements(&path).unwrap_err();
    assert!(matches!(err, SynthError::MalformedTable { .. }), "{err}");
}

#[test]
fn unwritable_destination_propagates_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let generation = CohortGenerator::new(GeneratorConfig::small_test())
        .unwrap()
        .generate()
        .unwrap();

    let err = write_dataset(blocker.join("raw"), &generation.dataset).unwrap_err();
    assert!(matches!(err, SynthError::Io(_)), "{err}");
}

#[test]
fn failed_write_leaves_no_partial_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    // A directory where the engagement table should go makes the second file fail.
    std::fs::create_dir_all(raw.join("program_engagements.csv")).unwrap();
    let generation = CohortGenerator::new(GeneratorConfig::small_test())
        .unwrap()
        .generate()
        .unwrap();

    let err = write_dataset(&raw, &generation.dataset).unwrap_err();
    assert!(matches!(err, SynthError::Io(_)), "{err}");

    let mut left: Vec<String> = std::fs::read_dir(&raw)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, vec!["program_engagements.csv".to_string()]);
}

#[test]
fn rewrite_replaces_previous_tables_whole() {
    let dir = tempfile::tempdir().unwrap();
    let first = CohortGenerator::new(GeneratorConfig::small_test().with_seed(1))
        .unwrap()
        .generate()
        .unwrap();
    let second = CohortGenerator::new(GeneratorConfig::small_test().with_seed(2))
        .unwrap()
        .generate()
        .unwrap();

    write_dataset(dir.path(), &first.dataset).unwrap();
    write_dataset(dir.path(), &second.dataset).unwrap();

    assert_eq!(read_dataset(dir.path()).unwrap(), second.dataset);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
}
