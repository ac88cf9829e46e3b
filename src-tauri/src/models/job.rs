// Job and run snapshots as served by the backend
use crate::status::{
    allowed_actions_for_code, label_or_unknown, run_allowed_actions_for_code, ActionSet, JobStatus,
    StatusCode, StatusLabel, UnknownStatus,
};
use crate::table::{apply, Page, SortValue, Sortable, TableState};
use crate::utils::{format_display_time, sanitize_file_name, since};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque identifier; the backend sends either a string or an integer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Integer ids sort numerically, so `2` comes before `10`
    pub fn as_number(&self) -> Option<f64> {
        self.0.parse::<i64>().ok().map(|n| n as f64)
    }

    fn sort_value(&self) -> SortValue<'_> {
        match self.as_number() {
            Some(n) => SortValue::Number(n),
            None => SortValue::text(&self.0),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => EntityId(s),
            RawId::Signed(n) => EntityId(n.to_string()),
            RawId::Unsigned(n) => EntityId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Normal,
    Exploratory,
    #[serde(other)]
    Unknown,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Normal => "normal",
            JobType::Exploratory => "exploratory",
            JobType::Unknown => "unknown",
        }
    }

    pub fn label(self) -> TypeLabel {
        match self {
            JobType::Normal => TypeLabel { text: "Regular", color: "normal" },
            JobType::Exploratory => TypeLabel { text: "Exploratory", color: "exploratory" },
            JobType::Unknown => TypeLabel { text: "Unknown", color: "default" },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeLabel {
    pub text: &'static str,
    pub color: &'static str,
}

/// A `completedAt` that disagrees with the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleViolation {
    pub entity: String,
    pub status: JobStatus,
    pub has_completed_at: bool,
}

impl fmt::Display for LifecycleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_completed_at {
            write!(f, "{} is {} but has a completion time", self.entity, self.status)
        } else {
            write!(f, "{} is {} but has no completion time", self.entity, self.status)
        }
    }
}

fn check_lifecycle(
    entity: String,
    status: &StatusCode,
    completed_at: Option<DateTime<Utc>>,
) -> Option<LifecycleViolation> {
    // Unknown statuses are reported by the classifier, not here
    let status = status.parse().ok()?;
    let has_completed_at = completed_at.is_some();
    if status.is_terminal() == has_completed_at {
        None
    } else {
        Some(LifecycleViolation {
            entity,
            status,
            has_completed_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: EntityId,
    pub job_id: EntityId,
    pub name: String,
    pub status: StatusCode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn current_status(&self) -> Result<JobStatus, UnknownStatus> {
        self.status.parse()
    }

    pub fn allowed_actions(&self) -> ActionSet {
        run_allowed_actions_for_code(&self.status)
    }

    pub fn lifecycle_violation(&self) -> Option<LifecycleViolation> {
        check_lifecycle(format!("run {}", self.name), &self.status, self.completed_at)
    }

    /// File name the run archive is saved under, safe to join onto a directory
    pub fn archive_file_name(&self) -> String {
        sanitize_file_name(&format!("{}-{}.zip", self.job_id, self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "JobWire")]
pub struct Job {
    pub job_id: EntityId,
    /// Storage key some backends send next to `jobId`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub design_name: String,
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub pdk_variant: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: StatusCode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_script: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub notifications_enabled: bool,
}

/// Wire shape of a job; `id` stands in for `jobId` when the latter is absent
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobWire {
    #[serde(default)]
    job_id: Option<EntityId>,
    #[serde(default)]
    id: Option<EntityId>,
    design_name: String,
    #[serde(rename = "repoURL")]
    repo_url: String,
    pdk_variant: String,
    #[serde(rename = "type")]
    job_type: JobType,
    status: StatusCode,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    runs: Vec<Run>,
    #[serde(default)]
    regression_script: Option<BTreeMap<String, String>>,
    #[serde(default)]
    notifications_enabled: bool,
}

impl TryFrom<JobWire> for Job {
    type Error = String;

    fn try_from(wire: JobWire) -> Result<Self, Self::Error> {
        let job_id = wire
            .job_id
            .or_else(|| wire.id.clone())
            .ok_or_else(|| "job has neither `jobId` nor `id`".to_string())?;
        Ok(Job {
            job_id,
            id: wire.id,
            design_name: wire.design_name,
            repo_url: wire.repo_url,
            pdk_variant: wire.pdk_variant,
            job_type: wire.job_type,
            status: wire.status,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            completed_at: wire.completed_at,
            runs: wire.runs,
            regression_script: wire.regression_script,
            notifications_enabled: wire.notifications_enabled,
        })
    }
}

/// Compute allotment the scheduler grants per job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEstimate {
    pub cpus: u32,
    pub ram_gb: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOverview {
    pub run_count: usize,
    pub reports_ready: bool,
    /// The backend is still working on it; drives the progress indicator
    pub in_progress: bool,
}

impl Job {
    pub fn current_status(&self) -> Result<JobStatus, UnknownStatus> {
        self.status.parse()
    }

    pub fn allowed_actions(&self) -> ActionSet {
        allowed_actions_for_code(&self.status)
    }

    pub fn find_run(&self, name: &str) -> Option<&Run> {
        self.runs.iter().find(|run| run.name == name)
    }

    pub fn resources(&self) -> ResourceEstimate {
        match self.job_type {
            JobType::Exploratory => ResourceEstimate { cpus: 4, ram_gb: 4 * 8 },
            _ => ResourceEstimate { cpus: 1, ram_gb: 8 },
        }
    }

    pub fn overview(&self) -> JobOverview {
        JobOverview {
            run_count: self.runs.len(),
            reports_ready: self.status.is(JobStatus::Completed),
            in_progress: self.current_status().map_or(false, JobStatus::is_active),
        }
    }

    /// Every job or run whose completion time disagrees with its status
    pub fn lifecycle_violations(&self) -> Vec<LifecycleViolation> {
        check_lifecycle(format!("job {}", self.job_id), &self.status, self.completed_at)
            .into_iter()
            .chain(self.runs.iter().filter_map(Run::lifecycle_violation))
            .collect()
    }
}

fn time_value(ts: Option<DateTime<Utc>>) -> SortValue<'static> {
    ts.map(SortValue::Time).unwrap_or(SortValue::Missing)
}

impl Sortable for Job {
    fn sort_value(&self, key: &str) -> SortValue<'_> {
        match key {
            "jobId" => self.job_id.sort_value(),
            "designName" => SortValue::text(&self.design_name),
            "repoURL" => SortValue::text(&self.repo_url),
            "pdkVariant" => SortValue::text(&self.pdk_variant),
            "type" => SortValue::text(self.job_type.as_str()),
            "status" => SortValue::text(self.status.as_str()),
            "createdAt" => SortValue::Time(self.created_at),
            "updatedAt" => SortValue::Time(self.updated_at),
            "completedAt" => time_value(self.completed_at),
            "runs" => SortValue::Number(self.runs.len() as f64),
            _ => SortValue::Missing,
        }
    }

    fn search_keys(&self) -> &'static [&'static str] {
        &["jobId", "designName", "status", "type", "pdkVariant"]
    }
}

impl Sortable for Run {
    fn sort_value(&self, key: &str) -> SortValue<'_> {
        match key {
            "id" => self.id.sort_value(),
            "jobId" => self.job_id.sort_value(),
            "name" => SortValue::text(&self.name),
            "status" => SortValue::text(self.status.as_str()),
            "createdAt" => SortValue::Time(self.created_at),
            "updatedAt" => SortValue::Time(self.updated_at),
            "completedAt" => time_value(self.completed_at),
            _ => SortValue::Missing,
        }
    }

    fn search_keys(&self) -> &'static [&'static str] {
        &["id", "name", "status"]
    }
}

/// Job annotated for one table row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRow {
    #[serde(flatten)]
    pub job: Job,
    pub status_label: StatusLabel,
    pub type_label: TypeLabel,
    pub updated_since: String,
    pub submitted: String,
    pub completed: String,
    pub actions: ActionSet,
}

impl JobRow {
    pub fn new(job: Job, now: DateTime<Utc>) -> Self {
        Self {
            status_label: label_or_unknown(&job.status),
            type_label: job.job_type.label(),
            updated_since: since(job.updated_at, now),
            submitted: format_display_time(Some(job.created_at)),
            completed: format_display_time(job.completed_at),
            actions: job.allowed_actions(),
            job,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRow {
    #[serde(flatten)]
    pub run: Run,
    pub status_label: StatusLabel,
    pub updated_since: String,
    pub started: String,
    pub completed: String,
    pub actions: ActionSet,
}

impl RunRow {
    pub fn new(run: Run, now: DateTime<Utc>) -> Self {
        Self {
            status_label: label_or_unknown(&run.status),
            updated_since: since(run.updated_at, now),
            started: format_display_time(Some(run.created_at)),
            completed: format_display_time(run.completed_at),
            actions: run.allowed_actions(),
            run,
        }
    }
}

/// Job detail view model: the job plus one page of its runs table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    #[serde(flatten)]
    pub row: JobRow,
    pub resources: ResourceEstimate,
    pub overview: JobOverview,
    pub run_rows: Page<RunRow>,
}

impl JobDetails {
    pub fn new(job: Job, now: DateTime<Utc>, runs_table: &TableState) -> Self {
        let resources = job.resources();
        let overview = job.overview();
        let run_rows = apply(job.runs.clone(), runs_table).map(|run| RunRow::new(run, now));
        Self {
            row: JobRow::new(job, now),
            resources,
            overview,
            run_rows,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    pub fn run(name: &str, status: JobStatus) -> Run {
        Run {
            id: EntityId::new(format!("r-{name}")),
            job_id: EntityId::new("42"),
            name: name.to_string(),
            status: status.into(),
            created_at: ts(0),
            updated_at: ts(5),
            completed_at: status.is_terminal().then(|| ts(5)),
        }
    }

    pub fn job(id: &str, status: JobStatus) -> Job {
        Job {
            job_id: EntityId::new(id),
            id: None,
            design_name: format!("design-{id}"),
            repo_url: "https://github.com/example/spm".to_string(),
            pdk_variant: "sky130_fd_sc_hd".to_string(),
            job_type: JobType::Normal,
            status: status.into(),
            created_at: ts(0),
            updated_at: ts(10),
            completed_at: status.is_terminal().then(|| ts(10)),
            runs: vec![],
            regression_script: None,
            notifications_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::status::JobAction;
    use crate::table::{sort, SortDirection, SortSpec};

    const WIRE_JOB: &str = r#"{
        "id": "doc-1",
        "jobId": 17,
        "designName": "spm",
        "repoURL": "https://github.com/example/spm",
        "pdkVariant": "sky130_fd_sc_hd",
        "type": "exploratory",
        "status": "running-placement",
        "createdAt": "2024-03-01T12:00:00Z",
        "updatedAt": "2024-03-01T12:10:00Z",
        "completedAt": null,
        "notificationsEnabled": true,
        "regressionScript": { "FP_CORE_UTIL": "40" },
        "runs": [{
            "id": 3,
            "jobId": 17,
            "name": "config_0",
            "status": "completed",
            "createdAt": "2024-03-01T12:00:00Z",
            "updatedAt": "2024-03-01T12:09:00Z",
            "completedAt": "2024-03-01T12:09:00Z"
        }]
    }"#;

    #[test]
    fn test_decodes_wire_job() {
        let job: Job = serde_json::from_str(WIRE_JOB).unwrap();
        assert_eq!(job.job_id.as_str(), "17");
        assert_eq!(job.id, Some(EntityId::new("doc-1")));
        assert_eq!(job.job_type, JobType::Exploratory);
        assert_eq!(job.current_status(), Ok(JobStatus::RunningPlacement));
        assert_eq!(job.runs[0].id.as_str(), "3");
        assert_eq!(job.runs[0].archive_file_name(), "17-config_0.zip");
        assert!(job.lifecycle_violations().is_empty());
    }

    #[test]
    fn test_unknown_values_do_not_break_decoding() {
        let raw = WIRE_JOB
            .replace("\"exploratory\"", "\"turbo\"")
            .replace("\"running-placement\"", "\"warp-drive\"");
        let job: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(job.job_type, JobType::Unknown);
        assert!(job.current_status().is_err());
        assert_eq!(job.allowed_actions(), ActionSet::NONE);
        assert_eq!(JobRow::new(job, ts(10)).status_label.text, "Unknown");
    }

    #[test]
    fn test_running_job_with_completed_run() {
        let mut job = job("42", JobStatus::Running);
        job.runs.push(run("run1", JobStatus::Completed));

        let run = job.find_run("run1").unwrap();
        assert!(run.allowed_actions().contains(JobAction::Download));
        assert!(!job.allowed_actions().contains(JobAction::Delete));
        assert!(job.allowed_actions().contains(JobAction::Stop));
    }

    #[test]
    fn test_lifecycle_violations() {
        let mut job = job("1", JobStatus::Running);
        job.completed_at = Some(ts(3));
        let mut bad_run = run("r", JobStatus::Failed);
        bad_run.completed_at = None;
        job.runs.push(bad_run);

        let violations = job.lifecycle_violations();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].has_completed_at);
        assert_eq!(violations[1].to_string(), "run r is failed but has no completion time");
    }

    #[test]
    fn test_resources_and_overview() {
        let mut job = job("7", JobStatus::Completed);
        assert_eq!(job.resources(), ResourceEstimate { cpus: 1, ram_gb: 8 });
        job.job_type = JobType::Exploratory;
        assert_eq!(job.resources(), ResourceEstimate { cpus: 4, ram_gb: 32 });

        job.runs = vec![run("a", JobStatus::Completed), run("b", JobStatus::Failed)];
        assert_eq!(
            job.overview(),
            JobOverview { run_count: 2, reports_ready: true, in_progress: false }
        );
        job.status = JobStatus::RunningCts.into();
        assert!(job.overview().in_progress);
        job.status = JobStatus::Stopping.into();
        assert!(!job.overview().in_progress);
    }

    #[test]
    fn test_job_row_serializes_flat() {
        let row = JobRow::new(job("9", JobStatus::Stopped), ts(13));
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["jobId"], "9");
        assert_eq!(value["statusLabel"]["text"], "Stopped");
        assert_eq!(value["typeLabel"]["text"], "Regular");
        assert_eq!(value["updatedSince"], "3m ago");
        assert_eq!(value["actions"]["delete"], true);
        assert_eq!(value["actions"]["stop"], false);
        assert_eq!(value["submitted"], "01 Mar 2024 | 12:00");
    }

    #[test]
    fn test_id_stands_in_for_missing_job_id() {
        let raw = WIRE_JOB.replacen("\"jobId\": 17,", "", 1).replace("\"doc-1\"", "5");
        let job: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(job.job_id.as_str(), "5");
        assert_eq!(job.id, Some(EntityId::new("5")));

        let neither = WIRE_JOB
            .replacen("\"jobId\": 17,", "", 1)
            .replace("\"id\": \"doc-1\",", "");
        assert!(serde_json::from_str::<Job>(&neither).is_err());
    }

    #[test]
    fn test_integer_ids_sort_numerically() {
        let mut jobs: Vec<Job> = [2, 10, 9]
            .iter()
            .map(|n| {
                serde_json::from_str(&WIRE_JOB.replace("\"jobId\": 17", &format!("\"jobId\": {n}")))
                    .unwrap()
            })
            .collect();
        sort(&mut jobs, "jobId", SortDirection::Asc);
        let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "9", "10"]);

        let mut runs: Vec<Run> = ["r-3", "11", "4"]
            .iter()
            .map(|id| {
                let mut run = run("x", JobStatus::Completed);
                run.id = EntityId::new(*id);
                run
            })
            .collect();
        sort(&mut runs, "id", SortDirection::Asc);
        let ids: Vec<&str> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "11", "r-3"]);
    }

    #[test]
    fn test_details_page_the_runs_table() {
        let mut job = job("42", JobStatus::Running);
        job.runs = (0..7)
            .map(|i| {
                let mut run = run(&format!("config_{i}"), JobStatus::Completed);
                run.updated_at = ts(i);
                run
            })
            .collect();

        let table = TableState {
            sort: SortSpec::new("updatedAt", SortDirection::Desc),
            query: String::new(),
            page: 1,
            limit: 5,
        };
        let details = JobDetails::new(job, ts(20), &table);
        assert_eq!(details.run_rows.total, 7);
        assert_eq!(details.run_rows.page_count, 2);
        let names: Vec<&str> = details.run_rows.items.iter().map(|r| r.run.name.as_str()).collect();
        assert_eq!(names, vec!["config_1", "config_0"]);
        assert_eq!(details.overview.run_count, 7);
    }
}
