//! CSV persistence layer.
//!
//! RULE: Only tables.rs writes or reads output files.
//! Generator, aggregation and report stages hand rows to these
//! functions; they never open files directly.
//!
//! Format: comma-delimited, header row, ISO-8601 dates, flags as 0/1.
//! Column names and category labels are a contract with downstream
//! readers and must not change.

use crate::{
    access_site::AccessSiteVisit,
    cohort::ClientRecord,
    engagement::EngagementRecord,
    error::{SynthError, SynthResult},
    generator::SyntheticDataset,
    types::Year,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const CLIENTS_FILE: &str = "clients.csv";
pub const ENGAGEMENTS_FILE: &str = "program_engagements.csv";
pub const ACCESS_SITES_FILE: &str = "access_site_engagements.csv";

const CLIENT_COLUMNS: [&str; 8] = [
    "client_id",
    "year",
    "household_type",
    "age_group",
    "race_ethnicity",
    "gender",
    "primary_program",
    "provider",
];

/// Where a dataset was written.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub clients: PathBuf,
    pub engagements: PathBuf,
    pub access_sites: PathBuf,
}

impl DatasetPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            clients: dir.join(CLIENTS_FILE),
            engagements: dir.join(ENGAGEMENTS_FILE),
            access_sites: dir.join(ACCESS_SITES_FILE),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.clients, &self.engagements, &self.access_sites]
    }
}

// ── Writers ────────────────────────────────────────────────────

/// A file written beside its destination, not yet visible there.
struct Staged {
    file: NamedTempFile,
    dest: PathBuf,
}

/// A group of output files that appear together or not at all.
///
/// Each file is written to a temp file in its destination directory.
/// `commit()` renames them into place; if any rename fails, the files
/// already placed by this set are removed again.
#[derive(Default)]
pub struct TableSet {
    staged: Vec<Staged>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(
        &mut self,
        dest: &Path,
        fill: impl FnOnce(&mut File) -> SynthResult<()>,
    ) -> SynthResult<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)?;
        fill(file.as_file_mut())?;
        file.as_file_mut().sync_all()?;
        self.staged.push(Staged {
            file,
            dest: dest.to_path_buf(),
        });
        Ok(())
    }

    /// Stage any serde row type with a header row.
    pub fn rows<T: Serialize>(&mut self, dest: &Path, rows: &[T]) -> SynthResult<()> {
        self.stage(dest, |f| {
            let mut writer = csv::Writer::from_writer(f);
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    /// Clients carry a variable set of `dis_*` columns, so the header
    /// is built from `disability_columns` rather than derived by serde.
    pub fn clients(
        &mut self,
        dest: &Path,
        clients: &[ClientRecord],
        disability_columns: &[String],
    ) -> SynthResult<()> {
        if let Some(c) = clients
            .iter()
            .find(|c| c.disabilities.len() != disability_columns.len())
        {
            return Err(SynthError::malformed(
                "clients",
                format!(
                    "{} has {} disability flags, expected {}",
                    c.client_id,
                    c.disabilities.len(),
                    disability_columns.len()
                ),
            ));
        }
        self.stage(dest, |f| {
            let mut writer = csv::Writer::from_writer(f);
            let header = CLIENT_COLUMNS
                .iter()
                .copied()
                .chain(disability_columns.iter().map(String::as_str));
            writer.write_record(header)?;
            for c in clients {
                let year = c.year.to_string();
                let mut record = vec![
                    c.client_id.as_str(),
                    year.as_str(),
                    c.household_type.as_str(),
                    c.age_group.as_str(),
                    c.race_ethnicity.as_str(),
                    c.gender.as_str(),
                    c.primary_program.as_str(),
                    c.provider.as_str(),
                ];
                record.extend(c.disabilities.iter().map(|d| if *d { "1" } else { "0" }));
                writer.write_record(&record)?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    /// Stage a text artefact (the Markdown report).
    pub fn text(&mut self, dest: &Path, content: &str) -> SynthResult<()> {
        self.stage(dest, |f| {
            f.write_all(content.as_bytes())?;
            Ok(())
        })
    }

    /// Move every staged file into place.
    pub fn commit(self) -> SynthResult<()> {
        let mut placed: Vec<PathBuf> = Vec::with_capacity(self.staged.len());
        for staged in self.staged {
            if let Err(e) = staged.file.persist(&staged.dest) {
                for path in &placed {
                    if let Err(err) = std::fs::remove_file(path) {
                        log::warn!("tables: could not roll back {}: {err}", path.display());
                    }
                }
                return Err(e.error.into());
            }
            placed.push(staged.dest);
        }
        Ok(())
    }
}

/// Create an output directory and any missing parents.
pub fn ensure_dir(dir: &Path) -> SynthResult<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Write all three generator tables into `dir`, creating it if needed.
/// Either all three files are in place afterwards or none of them is.
pub fn write_dataset(dir: impl AsRef<Path>, dataset: &SyntheticDataset) -> SynthResult<DatasetPaths> {
    ensure_dir(dir.as_ref())?;
    let paths = DatasetPaths::in_dir(dir);
    let mut set = TableSet::new();
    set.clients(&paths.clients, &dataset.clients, &dataset.disability_columns)?;
    set.rows(&paths.engagements, &dataset.engagements)?;
    set.rows(&paths.access_sites, &dataset.access_visits)?;
    set.commit()?;
    log::info!(
        "tables: wrote {} clients, {} engagements, {} access visits",
        dataset.clients.len(),
        dataset.engagements.len(),
        dataset.access_visits.len()
    );
    Ok(paths)
}

// ── Readers ────────────────────────────────────────────────────

/// Read any serde row type, reporting bad rows against `table`.
pub fn read_rows<T: DeserializeOwned>(path: &Path, table: &str) -> SynthResult<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| SynthError::malformed(table, format!("row {}: {e}", i + 1)))
        })
        .collect()
}

pub fn read_engagements(path: &Path) -> SynthResult<Vec<EngagementRecord>> {
    read_rows(path, "program_engagements")
}

pub fn read_access_visits(path: &Path) -> SynthResult<Vec<AccessSiteVisit>> {
    read_rows(path, "access_site_engagements")
}

/// Read the client table. Disability columns are discovered by their
/// `dis_` prefix and returned in file order.
pub fn read_clients(path: &Path) -> SynthResult<(Vec<ClientRecord>, Vec<String>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SynthError::malformed("clients", format!("missing column '{name}'")))
    };
    let idx: Vec<usize> = CLIENT_COLUMNS
        .iter()
        .map(|name| column(name))
        .collect::<SynthResult<_>>()?;
    let disability_idx: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("dis_"))
        .map(|(i, _)| i)
        .collect();
    let disability_columns = disability_idx
        .iter()
        .map(|i| headers[*i].to_string())
        .collect();

    let mut clients = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        let year: Year = field(idx[1]).parse().map_err(|_| {
            SynthError::malformed("clients", format!("row {}: bad year '{}'", line + 1, field(idx[1])))
        })?;
        let disabilities = disability_idx
            .iter()
            .map(|i| match record.get(*i) {
                Some("1") => Ok(true),
                Some("0") => Ok(false),
                other => Err(SynthError::malformed(
                    "clients",
                    format!("row {}: bad flag {:?} in '{}'", line + 1, other, &headers[*i]),
                )),
            })
            .collect::<SynthResult<Vec<_>>>()?;

        clients.push(ClientRecord {
            client_id: field(idx[0]),
            year,
            household_type: field(idx[2]),
            age_group: field(idx[3]),
            race_ethnicity: field(idx[4]),
            gender: field(idx[5]),
            primary_program: field(idx[6]),
            provider: field(idx[7]),
            disabilities,
        });
    }
    Ok((clients, disability_columns))
}

/// Read back a dataset written by `write_dataset`.
pub fn read_dataset(dir: impl AsRef<Path>) -> SynthResult<SyntheticDataset> {
    let paths = DatasetPaths::in_dir(dir);
    let (clients, disability_columns) = read_clients(&paths.clients)?;
    Ok(SyntheticDataset {
        disability_columns,
        clients,
        engagements: read_engagements(&paths.engagements)?,
        access_visits: read_access_visits(&paths.access_sites)?,
    })
}
