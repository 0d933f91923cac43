//! Controller management REST client
//!
//! Implements [`ControllerApi`] over the controller's HTTPS management API.
//! Authentication is a `GET /login` with basic credentials; the returned
//! `X-SDS-AUTH-TOKEN` header is replayed on every subsequent request.
//! Failed responses are mapped into [`ControllerFault`]s so the retry and
//! bootstrap layers can classify them.

use crate::config::ControllerConfig;
use crate::domain::ports::{
    ControllerApi, ExportGroupDetails, ExportedVolume, StorageSystem, VolumeInfo,
};
use crate::error::{ControllerFault, Error, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, trace};

const AUTH_TOKEN_HEADER: &str = "X-SDS-AUTH-TOKEN";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct NamedRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResults {
    #[serde(default)]
    resource: Vec<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct StorageSystemRest {
    name: String,
    #[serde(default)]
    serial_number: String,
    #[serde(default)]
    system_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSystemList {
    #[serde(default)]
    storage_system: Vec<StorageSystemRest>,
}

#[derive(Debug, Deserialize)]
struct StoragePortRest {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePortList {
    #[serde(default)]
    storage_port: Vec<StoragePortRest>,
}

#[derive(Debug, Deserialize)]
struct ExportedVolumeRest {
    id: String,
    #[serde(default)]
    lun: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ExportGroupRest {
    name: String,
    #[serde(default)]
    volumes: Vec<ExportedVolumeRest>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportGroupList {
    #[serde(default)]
    export_group: Vec<ExportGroupRest>,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeRest {
    name: String,
    #[serde(default)]
    wwn: String,
    #[serde(default)]
    provisioned_capacity_gb: serde_json::Value,
    #[serde(default)]
    allocated_capacity_gb: serde_json::Value,
}

// =============================================================================
// REST Controller
// =============================================================================

/// HTTPS client for the controller management API.
pub struct RestController {
    client: reqwest::Client,
    base: String,
    token: RwLock<Option<String>>,
}

impl RestController {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Management endpoints ship self-signed certificates.
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            base: format!("https://{}:{}", config.host, config.port),
            token: RwLock::new(None),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base, path);
        trace!(%method, %url, "controller request");

        let mut builder = self.client.request(method, &url);
        if let Some(token) = self.token.read().await.as_deref() {
            builder = builder.header(AUTH_TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, &body))
    }

    async fn get_json<T: serde::de::DeserializeOwned + Default>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path, None).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }
        Ok(response.json().await?)
    }

    /// Search an endpoint by name; `None` when nothing matches.
    async fn search(&self, path: &str, name: &str) -> Result<Option<String>> {
        let results: SearchResults = self
            .get_json(&format!("{path}/search?name={}", urlencoding::encode(name)))
            .await?;
        Ok(results.resource.into_iter().next().map(|r| r.id))
    }

    /// Modify an export group's membership with an add/remove delta.
    async fn export_group_update(&self, group: &str, delta: serde_json::Value) -> Result<()> {
        self.request(
            Method::PUT,
            &format!("/block/exports/{}", urlencoding::encode(group)),
            Some(delta),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl ControllerApi for RestController {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        let url = format!("{}/login", self.base);
        let response = self
            .client
            .get(&url)
            .basic_auth(username, Some(password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "login rejected ({status}): {body}"
            )));
        }

        let token = extract_token(response.headers()).ok_or_else(|| {
            Error::Authentication("login response carried no auth token".to_string())
        })?;
        *self.token.write().await = Some(token);
        debug!("controller login succeeded");
        Ok(())
    }

    async fn project_create(&self, name: &str, tenant: &str) -> Result<()> {
        self.request(
            Method::POST,
            "/projects",
            Some(json!({ "name": name, "tenant": tenant })),
        )
        .await
        .map(|_| ())
    }

    async fn project_query(&self, name: &str, tenant: &str) -> Result<String> {
        self.search("/projects", name).await?.ok_or_else(|| {
            Error::controller(
                ControllerFault::NotFound,
                format!("project {name} not found in tenant {tenant}"),
            )
        })
    }

    async fn host_search(&self, name: &str) -> Result<Option<String>> {
        self.search("/compute/hosts", name).await
    }

    async fn host_create(&self, name: &str, tenant: &str) -> Result<()> {
        self.request(
            Method::POST,
            "/compute/hosts",
            Some(json!({
                "name": name,
                "host_name": name,
                "tenant": tenant,
                "type": "Other",
                "discoverable": false,
            })),
        )
        .await
        .map(|_| ())
    }

    async fn initiator_create(&self, host: &str, protocol: &str, port_wwn: &str) -> Result<()> {
        self.request(
            Method::POST,
            &format!("/compute/hosts/{}/initiators", urlencoding::encode(host)),
            Some(json!({ "protocol": protocol, "initiator_port": port_wwn })),
        )
        .await
        .map(|_| ())
    }

    async fn network_query(&self, name: &str) -> Result<Option<String>> {
        self.search("/vdc/networks", name).await
    }

    async fn network_create(&self, name: &str, net_type: &str) -> Result<()> {
        self.request(
            Method::POST,
            "/vdc/networks",
            Some(json!({ "name": name, "transport_type": net_type })),
        )
        .await
        .map(|_| ())
    }

    async fn network_add_endpoint(&self, name: &str, endpoint: &str) -> Result<()> {
        self.request(
            Method::PUT,
            &format!("/vdc/networks/{}/endpoints", urlencoding::encode(name)),
            Some(json!({ "endpoints": [endpoint], "op": "add" })),
        )
        .await
        .map(|_| ())
    }

    async fn list_storage_systems(&self, varray: &str) -> Result<Vec<StorageSystem>> {
        let list: StorageSystemList = self
            .get_json(&format!(
                "/vdc/storage-systems?varray={}",
                urlencoding::encode(varray)
            ))
            .await?;
        Ok(list
            .storage_system
            .into_iter()
            .map(|s| StorageSystem {
                name: s.name,
                serial_number: s.serial_number,
                system_type: s.system_type,
            })
            .collect())
    }

    async fn list_storage_ports(&self, system: &StorageSystem) -> Result<Vec<String>> {
        let list: StoragePortList = self
            .get_json(&format!(
                "/vdc/storage-systems/{}/storage-ports",
                urlencoding::encode(&system.name)
            ))
            .await?;
        Ok(list
            .storage_port
            .into_iter()
            .map(|p| port_identifier(&p.name))
            .collect())
    }

    async fn export_group_create(
        &self,
        name: &str,
        project: &str,
        tenant: &str,
        varray: &str,
        group_type: &str,
    ) -> Result<()> {
        self.request(
            Method::POST,
            "/block/exports",
            Some(json!({
                "name": name,
                "project": project,
                "tenant": tenant,
                "varray": varray,
                "type": group_type,
            })),
        )
        .await
        .map(|_| ())
    }

    async fn export_group_add_host(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        host: &str,
    ) -> Result<()> {
        self.export_group_update(group, json!({ "hosts": { "add": [host] } }))
            .await
    }

    async fn export_group_add_initiator(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        initiator: &str,
        _host: &str,
    ) -> Result<()> {
        self.export_group_update(group, json!({ "initiators": { "add": [initiator] } }))
            .await
    }

    async fn export_group_show(
        &self,
        group: &str,
        project: &str,
        tenant: &str,
    ) -> Result<ExportGroupDetails> {
        let rest: ExportGroupRest = self
            .get_json(&format!(
                "/block/exports/{}?project={}&tenant={}",
                urlencoding::encode(group),
                urlencoding::encode(project),
                urlencoding::encode(tenant)
            ))
            .await?;
        Ok(ExportGroupDetails {
            name: rest.name,
            volumes: rest
                .volumes
                .into_iter()
                .map(|v| ExportedVolume { id: v.id, lun: v.lun })
                .collect(),
        })
    }

    async fn export_group_list(&self, project: &str, tenant: &str) -> Result<Vec<String>> {
        let list: ExportGroupList = self
            .get_json(&format!(
                "/block/exports?project={}&tenant={}",
                urlencoding::encode(project),
                urlencoding::encode(tenant)
            ))
            .await?;
        Ok(list.export_group.into_iter().map(|g| g.name).collect())
    }

    async fn export_group_add_volumes(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        volumes: &[String],
    ) -> Result<()> {
        let adds: Vec<_> = volumes.iter().map(|id| json!({ "id": id })).collect();
        self.export_group_update(group, json!({ "volume_changes": { "add": adds } }))
            .await
    }

    async fn export_group_remove_volumes(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        volumes: &[String],
    ) -> Result<()> {
        let removes: Vec<_> = volumes.iter().map(|id| json!({ "id": id })).collect();
        self.export_group_update(group, json!({ "volume_changes": { "remove": removes } }))
            .await
    }

    async fn volume_query(&self, project_path: &str, name: &str) -> Result<Option<String>> {
        let results: SearchResults = self
            .get_json(&format!(
                "/block/volumes/search?name={}&project={}",
                urlencoding::encode(name),
                urlencoding::encode(project_path)
            ))
            .await?;
        Ok(results.resource.into_iter().next().map(|r| r.id))
    }

    async fn volume_show(&self, uri: &str) -> Result<VolumeInfo> {
        let rest: VolumeRest = self
            .get_json(&format!("/block/volumes/{}", urlencoding::encode(uri)))
            .await?;
        Ok(VolumeInfo {
            name: rest.name,
            wwn: rest.wwn,
            provisioned_gb: parse_gb(&rest.provisioned_capacity_gb),
            allocated_gb: parse_gb(&rest.allocated_capacity_gb),
        })
    }

    async fn volume_create(
        &self,
        project_path: &str,
        name: &str,
        size_gb: u64,
        varray: &str,
        vpool: &str,
    ) -> Result<()> {
        self.request(
            Method::POST,
            "/block/volumes?sync=true",
            Some(json!({
                "name": name,
                "size": format!("{size_gb}GB"),
                "project": project_path,
                "varray": varray,
                "vpool": vpool,
                "count": 1,
            })),
        )
        .await
        .map(|_| ())
    }

    async fn volume_delete(&self, project_path: &str, name: &str) -> Result<()> {
        let uri = self
            .volume_query(project_path, name)
            .await?
            .ok_or_else(|| {
                Error::controller(
                    ControllerFault::NotFound,
                    format!("volume {name} not found"),
                )
            })?;
        self.request(
            Method::POST,
            &format!(
                "/block/volumes/{}/deactivate?sync=true",
                urlencoding::encode(&uri)
            ),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn search_volumes(&self, project_uri: &str) -> Result<Vec<String>> {
        let results: SearchResults = self
            .get_json(&format!(
                "/block/volumes/search?project={}",
                urlencoding::encode(project_uri)
            ))
            .await?;
        Ok(results.resource.into_iter().map(|r| r.id).collect())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Map a failed response into a controller fault.
fn classify_response(status: StatusCode, body: &str) -> Error {
    let fault = if status == StatusCode::UNAUTHORIZED {
        ControllerFault::Http(401)
    } else if status == StatusCode::NOT_FOUND {
        ControllerFault::NotFound
    } else if status == StatusCode::CONFLICT || body.to_lowercase().contains("already exists") {
        ControllerFault::AlreadyExists
    } else if status.is_server_error() {
        ControllerFault::Failure
    } else {
        ControllerFault::Http(status.as_u16())
    };
    Error::controller(fault, format!("{status}: {body}"))
}

/// Storage port names come back as `system+group+adapter+port`; the last
/// segment is the port identifier.
fn port_identifier(name: &str) -> String {
    name.rsplit('+').next().unwrap_or(name).to_string()
}

/// Capacities arrive as either a JSON number or a decimal string.
fn parse_gb(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0) as u64,
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0) as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_classify_response() {
        assert!(classify_response(StatusCode::UNAUTHORIZED, "").is_session_expired());
        assert!(classify_response(StatusCode::NOT_FOUND, "no such volume").is_not_found());
        assert!(classify_response(StatusCode::CONFLICT, "").is_already_exists());
        assert!(
            classify_response(StatusCode::BAD_REQUEST, "Project already exists")
                .is_already_exists()
        );
        assert!(
            classify_response(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_controller_failure()
        );
        assert_matches!(
            classify_response(StatusCode::BAD_REQUEST, "malformed"),
            Error::Controller { fault: ControllerFault::Http(400), .. }
        );
    }

    #[test]
    fn test_port_identifier_takes_last_segment() {
        assert_eq!(
            port_identifier("VNX+APM00121500018+PORT+iqn.1992-04.com.emc:cx.a0"),
            "iqn.1992-04.com.emc:cx.a0"
        );
        assert_eq!(port_identifier("bare-port"), "bare-port");
    }

    #[test]
    fn test_parse_gb_accepts_number_and_string() {
        assert_eq!(parse_gb(&serde_json::json!(10)), 10);
        assert_eq!(parse_gb(&serde_json::json!("10")), 10);
        assert_eq!(parse_gb(&serde_json::json!("10.0")), 10);
        assert_eq!(parse_gb(&serde_json::json!(null)), 0);
    }
}
