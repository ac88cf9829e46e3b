// Job creation payload and its field checks
use super::job::JobType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use url::Url;

const DESIGN_NAME_MAX_LEN: usize = 255;
const REPO_URL_MAX_LEN: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PdkVariant {
    pub id: &'static str,
    pub name: &'static str,
}

pub const PDK_VARIANTS: [PdkVariant; 5] = [
    PdkVariant { id: "sky130_fd_sc_hd", name: "sky130_fd_sc_hd" },
    PdkVariant { id: "sky130_fd_sc_hs", name: "sky130_fd_sc_hs" },
    PdkVariant { id: "sky130_fd_sc_ms", name: "sky130_fd_sc_ms" },
    PdkVariant { id: "sky130_fd_sc_ls", name: "sky130_fd_sc_ls" },
    PdkVariant { id: "sky130_fd_sc_hdll", name: "sky130_fd_sc_hdll" },
];

/// Regression-script knobs the flow accepts; `extra` is passed through verbatim
pub const REGRESSION_SCRIPT_FIELDS: [&str; 9] = [
    "GLB_RT_ADJUSTMENT",
    "FP_CORE_UTIL",
    "PL_TARGET_DENSITY",
    "SYNTH_STRATEGY",
    "FP_PDN_VPITCH",
    "FP_PDN_HPITCH",
    "FP_ASPECT_RATIO",
    "SYNTH_MAX_FANOUT",
    "extra",
];

fn default_notifications() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub design_name: String,
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub pdk_variant: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default = "default_notifications")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub regression_script: BTreeMap<String, String>,
}

impl Default for NewJob {
    fn default() -> Self {
        Self {
            design_name: String::new(),
            repo_url: String::new(),
            pdk_variant: PDK_VARIANTS[0].id.to_string(),
            job_type: JobType::Normal,
            notifications_enabled: true,
            regression_script: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct JobFormError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for JobFormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid job: ")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", error.field, error.message)?;
        }
        Ok(())
    }
}

/// `user@host:path` remote as git writes it, e.g. `git@github.com:org/repo.git`
fn is_scp_remote(remote: &str) -> bool {
    if remote.contains("://") || remote.contains(char::is_whitespace) {
        return false;
    }
    let Some((login, path)) = remote.split_once(':') else {
        return false;
    };
    match login.split_once('@') {
        Some((user, host)) => {
            !user.is_empty() && !host.is_empty() && !host.contains('/') && !path.is_empty()
        }
        None => false,
    }
}

/// Repositories are either URLs git can clone or scp-style remotes
fn check_repo_url(repo_url: &str) -> Result<(), url::ParseError> {
    if is_scp_remote(repo_url) {
        return Ok(());
    }
    Url::parse(repo_url).map(|_| ())
}

impl NewJob {
    /// Normalise the form (trim text, drop blank knobs) and check every field.
    /// All problems are reported at once so the form can mark each input.
    pub fn validate(mut self) -> Result<NewJob, JobFormError> {
        let mut errors = Vec::new();

        self.design_name = self.design_name.trim().to_string();
        if self.design_name.is_empty() {
            errors.push(FieldError::new("designName", "is required"));
        } else if self.design_name.chars().count() > DESIGN_NAME_MAX_LEN {
            errors.push(FieldError::new(
                "designName",
                format!("must be at most {DESIGN_NAME_MAX_LEN} characters"),
            ));
        }

        self.repo_url = self.repo_url.trim().to_string();
        if self.repo_url.is_empty() {
            errors.push(FieldError::new("repoURL", "is required"));
        } else if self.repo_url.chars().count() > REPO_URL_MAX_LEN {
            errors.push(FieldError::new(
                "repoURL",
                format!("must be at most {REPO_URL_MAX_LEN} characters"),
            ));
        } else if let Err(e) = check_repo_url(&self.repo_url) {
            errors.push(FieldError::new("repoURL", format!("is not a valid URL ({e})")));
        }

        if !PDK_VARIANTS.iter().any(|v| v.id == self.pdk_variant) {
            errors.push(FieldError::new(
                "pdkVariant",
                format!("{:?} is not a supported PDK variant", self.pdk_variant),
            ));
        }

        if self.job_type == JobType::Unknown {
            errors.push(FieldError::new("type", "must be normal or exploratory"));
        }

        self.regression_script.retain(|_, value| !value.trim().is_empty());
        for key in self.regression_script.keys() {
            if !REGRESSION_SCRIPT_FIELDS.contains(&key.as_str()) {
                errors.push(FieldError::new(
                    format!("regressionScript.{key}"),
                    "is not a known regression parameter",
                ));
            }
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(JobFormError { errors })
        }
    }
}
