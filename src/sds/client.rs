//! Authenticated HTTP client for the SDS job-spec index.

use std::time::Duration;

use reqwest::{Certificate, Client};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::error::SdsError;
use super::version::{JobVersion, newest};
use crate::config::Settings;

const SEARCH_PATH: &str = "/mozart_es/job_specs/_search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Value,
}

/// Authenticated session against the science data system.
///
/// Holds credentials; keep it inside the process and do not hand the inner
/// HTTP client to handler code.
pub struct SdsClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    release_tag: Option<String>,
}

impl std::fmt::Debug for SdsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdsClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("release_tag", &self.release_tag)
            .finish_non_exhaustive()
    }
}

impl SdsClient {
    /// Build from `sds_host`, `sds_username`, `sds_password`, and the optional
    /// `sds_ca_cert` (PEM) and `sds_pcm_release_tag` parameters.
    pub fn from_settings(settings: &Settings) -> Result<Self, SdsError> {
        let host = settings
            .get_param("sds_host")
            .ok_or(SdsError::MissingParam("sds_host"))?;
        let username = settings
            .get_param("sds_username")
            .ok_or(SdsError::MissingParam("sds_username"))?;
        let password = settings
            .get_param("sds_password")
            .ok_or(SdsError::MissingParam("sds_password"))?;
        let ca_cert = settings.get_param("sds_ca_cert");

        let mut client = Self::with_base_url(host, username, password, ca_cert.as_deref())?;
        client.release_tag = settings.get_param("sds_pcm_release_tag");
        Ok(client)
    }

    pub fn with_base_url(
        base_url: String,
        username: String,
        password: String,
        ca_cert: Option<&str>,
    ) -> Result<Self, SdsError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60));
        if let Some(pem) = ca_cert {
            let cert = Certificate::from_pem(pem.as_bytes()).map_err(SdsError::Certificate)?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            release_tag: None,
        })
    }

    pub fn with_release_tag(mut self, tag: impl Into<String>) -> Self {
        self.release_tag = Some(tag.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// All job specs whose id starts with `<job_name>:`.
    pub async fn search_job_specs(&self, job_name: &str) -> Result<Vec<Value>, SdsError> {
        let query = json!({
            "query": {
                "prefix": {
                    "id.keyword": { "value": format!("{job_name}:") }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}{SEARCH_PATH}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SdsError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<SearchResponse>().await?;
        debug!(job_name, hits = body.hits.hits.len(), "Job spec search finished");
        Ok(body.hits.hits.into_iter().map(|h| h.source).collect())
    }

    /// Resolve the job-spec version to submit against.
    ///
    /// A configured release tag short-circuits the lookup.
    pub async fn latest_job_version(&self, job_name: &str) -> Result<JobVersion, SdsError> {
        if let Some(tag) = &self.release_tag {
            return Ok(JobVersion::ReleaseTag(tag.clone()));
        }

        let sources = self.search_job_specs(job_name).await?;
        let (version, source) =
            newest(sources).ok_or_else(|| SdsError::JobSpecNotFound(job_name.to_string()))?;
        info!(job_name, %version, "Resolved latest job spec version");
        Ok(JobVersion::Spec { version, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, MapParams};
    use crate::sds::SemVer;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SdsClient {
        SdsClient::with_base_url(format!("{}/", server.uri()), "svc".into(), "secret".into(), None)
            .unwrap()
    }

    #[tokio::test]
    async fn latest_version_from_search_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "query": {"prefix": {"id.keyword": {"value": "job-l2ss:"}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [
                    {"_source": {"id": "job-l2ss:v1.9.0", "job-version": "v1.9.0"}},
                    {"_source": {"id": "job-l2ss:develop", "job-version": "develop"}},
                    {"_source": {"id": "job-l2ss:v1.10.2", "job-version": "v1.10.2"}}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let version = client(&server).latest_job_version("job-l2ss").await.unwrap();
        match version {
            JobVersion::Spec { version, source } => {
                assert_eq!(version, SemVer::new(1, 10, 2));
                assert_eq!(source["id"], "job-l2ss:v1.10.2");
            }
            other => panic!("expected spec, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_tag_skips_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let version = client(&server)
            .with_release_tag("v2.0.0")
            .latest_job_version("job-l2ss")
            .await
            .unwrap();
        assert_eq!(version, JobVersion::ReleaseTag("v2.0.0".into()));
    }

    #[tokio::test]
    async fn no_hits_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": {"hits": []}})))
            .mount(&server)
            .await;

        let err = client(&server).latest_job_version("missing").await.unwrap_err();
        assert!(matches!(err, SdsError::JobSpecNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let err = client(&server).search_job_specs("job").await.unwrap_err();
        match err {
            SdsError::ApiError { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad credentials");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[test]
    fn from_settings_requires_host() {
        let settings = Settings::default();
        let err = SdsClient::from_settings(&settings).unwrap_err();
        assert!(matches!(err, SdsError::MissingParam("sds_host")));
    }

    #[test]
    fn from_settings_reads_params() {
        let params = MapParams::new()
            .with("sds_host", "https://sds.example/")
            .with("sds_username", "svc")
            .with("sds_password", "secret")
            .with("sds_pcm_release_tag", "v4.0.0");
        let settings = Settings::from_source(Environment::Production, Arc::new(params)).unwrap();
        let client = SdsClient::from_settings(&settings).unwrap();
        assert_eq!(client.base_url(), "https://sds.example");
        assert_eq!(client.release_tag.as_deref(), Some("v4.0.0"));
    }

    #[test]
    fn debug_hides_password() {
        let client =
            SdsClient::with_base_url("https://sds".into(), "svc".into(), "hunter2".into(), None)
                .unwrap();
        assert!(!format!("{client:?}").contains("hunter2"));
    }
}
