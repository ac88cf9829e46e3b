//! Report projection
//! Sparse per-run metric records are laid out against a `ReportCatalog`. The
//! result is a plain document used both on screen and for export; it carries
//! no rendering-surface formatting of its own.

pub mod catalog;

pub use catalog::*;

use crate::file_manager::{write_json_file, StoreError};
use crate::models::{EntityId, Job, ReportRecord};
use crate::utils::{format_display_time, sanitize_file_name};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedField {
    pub key: String,
    pub label: String,
    /// Rendered value with its unit, `None` when the record lacks the key
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedSection {
    pub name: String,
    pub fields: Vec<ProjectedField>,
}

impl ProjectedSection {
    pub fn field(&self, label: &str) -> Option<&ProjectedField> {
        self.fields.iter().find(|f| f.label == label)
    }
}

pub fn project(record: &ReportRecord, catalog: &ReportCatalog) -> Vec<ProjectedSection> {
    catalog
        .sections
        .iter()
        .map(|section| ProjectedSection {
            name: section.name.clone(),
            fields: section
                .fields
                .iter()
                .map(|field| ProjectedField {
                    key: field.key.clone(),
                    label: field.label.clone(),
                    value: record.text(&field.key).map(|value| match &field.unit {
                        Some(unit) => format!("{value} {unit}"),
                        None => value,
                    }),
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedRun {
    pub heading: String,
    pub sections: Vec<ProjectedSection>,
}

/// `design | config` when the record names its configuration
fn run_heading(record: &ReportRecord, job: &Job) -> String {
    let design = record
        .text("design")
        .unwrap_or_else(|| job.design_name.clone());
    match record.text("config") {
        Some(config) => format!("{design} | {config}"),
        None => design,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub title: String,
    pub job_id: EntityId,
    pub design_name: String,
    pub submitted: String,
    pub completed: String,
    pub catalog_version: u32,
    pub runs: Vec<ProjectedRun>,
}

impl ReportDocument {
    pub fn build(job: &Job, records: &[ReportRecord], catalog: &ReportCatalog) -> Self {
        Self {
            title: job.status.as_str().to_uppercase(),
            job_id: job.job_id.clone(),
            design_name: job.design_name.clone(),
            submitted: format_display_time(Some(job.created_at)),
            completed: format_display_time(job.completed_at),
            catalog_version: catalog.version,
            runs: records
                .iter()
                .map(|record| ProjectedRun {
                    heading: run_heading(record, job),
                    sections: project(record, catalog),
                })
                .collect(),
        }
    }

    pub fn export_file_name(&self) -> String {
        sanitize_file_name(&format!("{}-{}-report.json", self.job_id, self.design_name))
    }

    /// Write the document as pretty JSON into `dir`, returning the file path
    pub fn export(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        let path = dir.join(self.export_file_name());
        write_json_file(&path, self)?;
        log::info!("Exported report for job {} to {:?}", self.job_id, path);
        Ok(path)
    }
}
