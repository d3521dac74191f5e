//! Fetching a job's pipeline structure from a Jenkins server.
//!
//! [`fetch_pipeline_structure`] walks a fallback chain of endpoints and
//! returns the first document that describes the job:
//!
//! 1. `job/P/wfapi/describe`
//! 2. `job/P/lastBuild/wfapi/describe`
//! 3. Blue Ocean run nodes, their steps and per-step logs
//! 4. `config.xml` with an inline pipeline script
//! 5. `config.xml` of a freestyle project
//!
//! Endpoint failures along the chain are logged and skipped. Transport is
//! behind the [`JenkinsFetcher`] trait so the chain can run against canned
//! responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::xml::{class_of, flatten_document, lookup, lookup_text};

const WORKFLOW_RUN_CLASS: &str = "org.jenkinsci.plugins.workflow.job.WorkflowRun";
const WORKFLOW_JOB_CLASS: &str = "org.jenkinsci.plugins.workflow.job.WorkflowJob";
const FREESTYLE_CLASS: &str = "hudson.model.FreeStyleProject";
const PARAMETERS_TREE: &str =
    "api/json?tree=property[parameterDefinitions[name,description,defaultValue,defaultParameterValue[value]]]";

/// Connection settings for the Jenkins server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Set to `false` to accept self-signed certificates.
    pub verify_tls: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verify_tls: true,
        }
    }
}

/// Basic-auth credentials; `secret` is a password or an API token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: Option<String>,
}

/// Read access to a Jenkins server. Paths are relative to the server root.
pub trait JenkinsFetcher {
    fn get_json(&self, path: &str) -> Result<Value>;
    fn get_text(&self, path: &str) -> Result<String>;
}

/// Normalizes a job path for URL use: `folder/app` becomes
/// `folder/job/app`. Leading slashes and existing `job/` segments are
/// tolerated.
///
/// ```
/// use codearts_migrate_extract::normalize_job_path;
///
/// assert_eq!(normalize_job_path("/team/api").unwrap(), "team/job/api");
/// assert_eq!(normalize_job_path("job/team/job/api/").unwrap(), "team/job/api");
/// assert!(normalize_job_path(" / ").is_err());
/// ```
pub fn normalize_job_path(job: &str) -> Result<String> {
    let segments: Vec<&str> = job
        .trim()
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "job")
        .collect();
    if segments.is_empty() {
        return Err(ExtractError::InvalidJobPath(job.to_string()));
    }
    Ok(segments.join("/job/"))
}

/// Assembles the pipeline structure document for `job`.
///
/// The result always carries `name` and `stages`; `parameters` are attached
/// when the server reports any.
///
/// # Errors
///
/// Returns [`InvalidJobPath`](ExtractError::InvalidJobPath) for an empty job
/// path. Endpoint failures never surface: a job nothing answers for yields a
/// structure with no stages.
pub fn fetch_pipeline_structure(fetcher: &dyn JenkinsFetcher, job: &str) -> Result<Value> {
    let path = normalize_job_path(job)?;
    let job_name = path.rsplit('/').next().unwrap_or(&path).to_string();
    info!(job = %path, "fetching pipeline structure");

    let mut structure = describe(fetcher, &format!("job/{path}/wfapi/describe"))
        .or_else(|| describe(fetcher, &format!("job/{path}/lastBuild/wfapi/describe")))
        .or_else(|| blue_ocean(fetcher, &path))
        .or_else(|| from_config_xml(fetcher, &path, &job_name))
        .unwrap_or_else(|| {
            warn!(job = %path, "no endpoint described the job; returning empty structure");
            json!({ "stages": [] })
        });

    if let Some(object) = structure.as_object_mut() {
        let needs_name = object
            .get("name")
            .and_then(Value::as_str)
            .is_none_or(|name| name.is_empty() || name.starts_with('#'));
        if needs_name {
            object.insert("name".into(), Value::String(job_name));
        }
        object.entry("stages").or_insert_with(|| json!([]));

        let parameters = fetch_parameters(fetcher, &path);
        if !parameters.is_empty() {
            object.insert("parameters".into(), Value::Array(parameters));
        }
    }
    Ok(structure)
}

fn has_stages(value: &Value) -> bool {
    value
        .get("stages")
        .and_then(Value::as_array)
        .is_some_and(|stages| !stages.is_empty())
}

fn describe(fetcher: &dyn JenkinsFetcher, endpoint: &str) -> Option<Value> {
    match fetcher.get_json(endpoint) {
        Ok(mut value) if has_stages(&value) => {
            debug!(endpoint, "stages found");
            if let Some(object) = value.as_object_mut() {
                object
                    .entry("_class")
                    .or_insert_with(|| Value::String(WORKFLOW_RUN_CLASS.into()));
            }
            Some(value)
        }
        Ok(_) => {
            debug!(endpoint, "no stages reported");
            None
        }
        Err(err) => {
            warn!(endpoint, %err, "endpoint failed");
            None
        }
    }
}

fn blue_ocean(fetcher: &dyn JenkinsFetcher, path: &str) -> Option<Value> {
    let number = match fetcher.get_json(&format!("job/{path}/api/json")) {
        Ok(info) => info
            .get("lastBuild")
            .and_then(|build| build.get("number"))
            .and_then(Value::as_u64)
            .unwrap_or(1),
        Err(err) => {
            warn!(%err, "job info unavailable; skipping Blue Ocean");
            return None;
        }
    };
    let run = format!(
        "blue/rest/organizations/jenkins/pipelines/{}/runs/{number}",
        path.replace("job/", "")
    );
    let run_info = fetcher
        .get_json(&run)
        .map_err(|err| warn!(%err, "Blue Ocean run unavailable"))
        .ok()?;
    let nodes = fetcher
        .get_json(&format!("{run}/nodes"))
        .map_err(|err| warn!(%err, "Blue Ocean nodes unavailable"))
        .ok()?;

    let mut stages = Vec::new();
    for node in nodes.as_array().into_iter().flatten() {
        if node.get("type").and_then(Value::as_str) != Some("STAGE") {
            continue;
        }
        let node_id = id_of(node);
        let steps: Vec<Value> = match fetcher.get_json(&format!("{run}/nodes/{node_id}/steps")) {
            Ok(steps) => steps
                .as_array()
                .into_iter()
                .flatten()
                .map(|step| {
                    let step_id = id_of(step);
                    let log = fetcher
                        .get_text(&format!("{run}/nodes/{node_id}/steps/{step_id}/log"))
                        .unwrap_or_else(|err| {
                            debug!(%err, step = %step_id, "step log unavailable");
                            String::new()
                        });
                    json!({ "name": display_name(step), "log": log })
                })
                .collect(),
            Err(err) => {
                warn!(%err, node = %node_id, "stage steps unavailable");
                Vec::new()
            }
        };
        stages.push(json!({ "name": display_name(node), "steps": steps }));
    }

    if stages.is_empty() {
        return None;
    }
    info!(count = stages.len(), "stages found through Blue Ocean");
    Some(json!({
        "name": run_info.get("pipeline").and_then(Value::as_str).unwrap_or_default(),
        "_class": WORKFLOW_RUN_CLASS,
        "stages": stages,
    }))
}

fn id_of(node: &Value) -> String {
    match node.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn display_name(node: &Value) -> &str {
    node.get("displayName").and_then(Value::as_str).unwrap_or_default()
}

fn from_config_xml(fetcher: &dyn JenkinsFetcher, path: &str, job_name: &str) -> Option<Value> {
    let xml = fetcher
        .get_text(&format!("job/{path}/config.xml"))
        .map_err(|err| warn!(%err, "config.xml unavailable"))
        .ok()?;
    let document = flatten_document(&xml)
        .map_err(|err| warn!(%err, "config.xml is malformed"))
        .ok()?;
    let (root, job) = document.as_object()?.iter().next()?;

    if let Some(script) = lookup_text(job, &["definition", "script"]) {
        info!("inline pipeline script found in config.xml");
        return Some(json!({
            "name": job_name,
            "_class": WORKFLOW_JOB_CLASS,
            "script": script,
        }));
    }
    if root == "project" {
        info!("freestyle project found in config.xml");
        let git_url = job
            .get("scm")
            .filter(|scm| class_of(scm) == Some("hudson.plugins.git.GitSCM"))
            .and_then(|scm| {
                lookup_text(scm, &["userRemoteConfigs", "hudson.plugins.git.UserRemoteConfig", "url"])
            })
            .unwrap_or_default();
        return Some(json!({
            "name": job_name,
            "_class": FREESTYLE_CLASS,
            "xml_content": xml,
            "git_url": git_url,
            "stages": [],
        }));
    }
    debug!(root = %root, has_definition = lookup(job, &["definition"]).is_some(), "config.xml not usable");
    None
}

fn fetch_parameters(fetcher: &dyn JenkinsFetcher, path: &str) -> Vec<Value> {
    let info = match fetcher.get_json(&format!("job/{path}/{PARAMETERS_TREE}")) {
        Ok(info) => info,
        Err(err) => {
            warn!(%err, "parameter definitions unavailable");
            return Vec::new();
        }
    };
    info.get("property")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|property| property.get("parameterDefinitions")?.as_array())
        .flatten()
        .map(|definition| {
            let field = |key: &str| definition.get(key).cloned().unwrap_or(Value::String(String::new()));
            let default = definition
                .get("defaultParameterValue")
                .and_then(|value| value.get("value"))
                .filter(|value| !value.is_null())
                .cloned()
                .unwrap_or_else(|| field("defaultValue"));
            let mut record = Map::new();
            record.insert("name".into(), field("name"));
            record.insert("default".into(), default);
            record.insert("description".into(), field("description"));
            Value::Object(record)
        })
        .collect()
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use reqwest::blocking::{Client, Response};
    use serde_json::Value;
    use tracing::debug;

    use super::{Credentials, FetchOptions, JenkinsFetcher};
    use crate::error::{ExtractError, Result};

    /// [`JenkinsFetcher`] over blocking HTTP with basic auth.
    #[derive(Debug, Clone)]
    pub struct HttpFetcher {
        client: Client,
        base_url: String,
        credentials: Option<Credentials>,
    }

    impl HttpFetcher {
        /// Builds a fetcher for the server at `base_url`.
        ///
        /// # Errors
        ///
        /// Returns [`HttpError`](ExtractError::HttpError) if the HTTP client
        /// cannot be constructed.
        pub fn new(
            base_url: impl Into<String>,
            credentials: Option<Credentials>,
            options: &FetchOptions,
        ) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(options.timeout_secs))
                .danger_accept_invalid_certs(!options.verify_tls)
                .build()?;
            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                credentials,
            })
        }

        fn get(&self, path: &str) -> Result<Response> {
            let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
            debug!(%url, "GET");
            let mut request = self.client.get(&url);
            if let Some(credentials) = &self.credentials {
                request = request.basic_auth(&credentials.username, credentials.secret.as_ref());
            }
            let response = request.send()?;
            if !response.status().is_success() {
                return Err(ExtractError::HttpStatus {
                    status: response.status().as_u16(),
                    url,
                });
            }
            Ok(response)
        }
    }

    impl JenkinsFetcher for HttpFetcher {
        fn get_json(&self, path: &str) -> Result<Value> {
            Ok(self.get(path)?.json()?)
        }

        fn get_text(&self, path: &str) -> Result<String> {
            Ok(self.get(path)?.text()?)
        }
    }
}
