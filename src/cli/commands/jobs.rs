//! Jobs command implementation
//!
//! Implements `kiln jobs` to list each release's jobs and their packages.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use super::OutputMode;
use crate::core::deployment::ensure_unique_releases;
use crate::core::model::Release;
use crate::core::release::load_releases;

#[derive(Serialize, Debug, PartialEq, Eq)]
struct JobRow {
    release: String,
    name: String,
    packages: Vec<String>,
}

/// One row per job, ordered by release then job name
fn job_rows(releases: &[Release]) -> Vec<JobRow> {
    let mut rows: Vec<JobRow> = releases
        .iter()
        .flat_map(|release| release.jobs.iter())
        .map(|job| JobRow {
            release: job.release.clone(),
            name: job.name.clone(),
            packages: job.packages.iter().map(|p| p.name.clone()).collect(),
        })
        .collect();
    rows.sort_by(|a, b| (&a.release, &a.name).cmp(&(&b.release, &b.name)));
    rows
}

/// Execute the jobs command
pub fn execute(releases: &[PathBuf], output: OutputMode) -> Result<()> {
    let releases = load_releases(releases).context("Failed to load releases")?;
    ensure_unique_releases(&releases)?;

    let rows = job_rows(&releases);

    if output.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        println!("{}/{}: {}", row.release, row.name, row.packages.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Job, Package};
    use std::sync::Arc;

    #[test]
    fn test_rows_are_sorted_and_name_their_packages() {
        let libevent = Arc::new(Package::new("tor", "libevent", "LIBEVENT"));
        let tor = Arc::new(Package::new("tor", "tor", "TOR"));
        let mut release = Release::new("tor", "1");
        release.jobs = vec![
            Job {
                name: "tor".into(),
                release: "tor".into(),
                packages: vec![Arc::clone(&tor), Arc::clone(&libevent)],
            },
            Job {
                name: "monitor".into(),
                release: "tor".into(),
                packages: Vec::new(),
            },
        ];

        let rows = job_rows(&[release]);

        assert_eq!(
            rows,
            vec![
                JobRow {
                    release: "tor".into(),
                    name: "monitor".into(),
                    packages: Vec::new(),
                },
                JobRow {
                    release: "tor".into(),
                    name: "tor".into(),
                    packages: vec!["tor".into(), "libevent".into()],
                },
            ]
        );
    }
}
