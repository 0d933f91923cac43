//! In-memory controller for tests
//!
//! Implements [`ControllerApi`] over plain maps with the same fault
//! classification a live controller reports: creating an existing object is
//! `AlreadyExists`, referencing a missing one is `NotFound`. Single faults
//! can be injected to exercise the retry and bootstrap paths.

use crate::domain::ports::{
    ControllerApi, ExportGroupDetails, ExportedVolume, StorageSystem, VolumeInfo,
};
use crate::error::{ControllerFault, Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone)]
struct GroupState {
    hosts: BTreeSet<String>,
    initiators: BTreeSet<String>,
    volumes: Vec<ExportedVolume>,
}

#[derive(Debug, Clone)]
struct VolumeRecord {
    name: String,
    wwn: String,
    size_gb: u64,
}

#[derive(Default)]
struct State {
    projects: BTreeMap<String, String>,
    hosts: BTreeSet<String>,
    initiators: BTreeSet<(String, String)>,
    networks: BTreeMap<String, BTreeSet<String>>,
    export_groups: BTreeMap<String, GroupState>,
    volumes: BTreeMap<String, VolumeRecord>,
    storage_systems: Vec<StorageSystem>,
    storage_ports: BTreeMap<String, Vec<String>>,
    next_id: u64,
    last_vpool: Option<String>,
    login_count: u32,
    last_login: Option<(String, String)>,
    expire_next: bool,
    fail_next: Option<(ControllerFault, String)>,
}

/// Test double for the remote controller.
pub struct FakeController {
    state: Mutex<State>,
}

impl FakeController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    // -- fault injection ------------------------------------------------------

    /// The next non-login call fails once with HTTP 401.
    pub fn expire_next_call(&self) {
        self.state.lock().expire_next = true;
    }

    /// The next non-login call fails once with the given fault.
    pub fn fail_next_call(&self, fault: ControllerFault, message: &str) {
        self.state.lock().fail_next = Some((fault, message.to_string()));
    }

    // -- topology seeding -----------------------------------------------------

    pub fn add_storage_system(&self, name: &str, ports: &[&str]) {
        let mut state = self.state.lock();
        state.storage_systems.push(StorageSystem {
            name: name.to_string(),
            serial_number: format!("SN-{name}"),
            system_type: "isilon".to_string(),
        });
        state
            .storage_ports
            .insert(name.to_string(), ports.iter().map(|p| p.to_string()).collect());
    }

    // -- inspection -----------------------------------------------------------

    pub fn login_count(&self) -> u32 {
        self.state.lock().login_count
    }

    pub fn last_login(&self) -> Option<(String, String)> {
        self.state.lock().last_login.clone()
    }

    pub fn project_count(&self) -> usize {
        self.state.lock().projects.len()
    }

    pub fn host_count(&self) -> usize {
        self.state.lock().hosts.len()
    }

    pub fn network_endpoints(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .networks
            .get(name)
            .map(|eps| eps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn export_group_count(&self) -> usize {
        self.state.lock().export_groups.len()
    }

    pub fn group_hosts(&self, group: &str) -> Vec<String> {
        self.state
            .lock()
            .export_groups
            .get(group)
            .map(|g| g.hosts.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn group_initiators(&self, group: &str) -> Vec<String> {
        self.state
            .lock()
            .export_groups
            .get(group)
            .map(|g| g.initiators.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn volume_uri(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .volumes
            .iter()
            .find(|(_, v)| v.name == name)
            .map(|(uri, _)| uri.clone())
    }

    /// Pool named by the most recent volume create.
    pub fn last_vpool(&self) -> Option<String> {
        self.state.lock().last_vpool.clone()
    }

    pub fn volume_wwn(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .volumes
            .values()
            .find(|v| v.name == name)
            .map(|v| v.wwn.clone())
    }

    /// Exported volume uris of a group, in LUN order.
    pub fn exported_volumes(&self, group: &str) -> Vec<String> {
        self.state
            .lock()
            .export_groups
            .get(group)
            .map(|g| g.volumes.iter().map(|v| v.id.clone()).collect())
            .unwrap_or_default()
    }

    fn take_injected(state: &mut State) -> Result<()> {
        if state.expire_next {
            state.expire_next = false;
            return Err(Error::controller(
                ControllerFault::Http(401),
                "Cookie expired or not found",
            ));
        }
        if let Some((fault, message)) = state.fail_next.take() {
            return Err(Error::controller(fault, message));
        }
        Ok(())
    }

    fn exists(fault_message: String) -> Error {
        Error::controller(ControllerFault::AlreadyExists, fault_message)
    }

    fn missing(fault_message: String) -> Error {
        Error::controller(ControllerFault::NotFound, fault_message)
    }
}

impl Default for FakeController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControllerApi for FakeController {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.login_count += 1;
        state.last_login = Some((username.to_string(), password.to_string()));
        Ok(())
    }

    async fn project_create(&self, name: &str, _tenant: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        if state.projects.contains_key(name) {
            return Err(Self::exists(format!("project {name} already exists")));
        }
        state
            .projects
            .insert(name.to_string(), format!("urn:project:{name}"));
        Ok(())
    }

    async fn project_query(&self, name: &str, _tenant: &str) -> Result<String> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        state
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| Self::missing(format!("project {name} not found")))
    }

    async fn host_search(&self, name: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state
            .hosts
            .contains(name)
            .then(|| format!("urn:host:{name}")))
    }

    async fn host_create(&self, name: &str, _tenant: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        if !state.hosts.insert(name.to_string()) {
            return Err(Self::exists(format!("host {name} already exists")));
        }
        Ok(())
    }

    async fn initiator_create(&self, host: &str, _protocol: &str, port_wwn: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        if !state
            .initiators
            .insert((host.to_string(), port_wwn.to_string()))
        {
            return Err(Self::exists(format!("initiator {port_wwn} already exists")));
        }
        Ok(())
    }

    async fn network_query(&self, name: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state
            .networks
            .contains_key(name)
            .then(|| format!("urn:network:{name}")))
    }

    async fn network_create(&self, name: &str, _net_type: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        if state.networks.contains_key(name) {
            return Err(Self::exists(format!("network {name} already exists")));
        }
        state.networks.insert(name.to_string(), BTreeSet::new());
        Ok(())
    }

    async fn network_add_endpoint(&self, name: &str, endpoint: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let endpoints = state
            .networks
            .get_mut(name)
            .ok_or_else(|| Self::missing(format!("network {name} not found")))?;
        if !endpoints.insert(endpoint.to_string()) {
            return Err(Self::exists(format!("endpoint {endpoint} already registered")));
        }
        Ok(())
    }

    async fn list_storage_systems(&self, _varray: &str) -> Result<Vec<StorageSystem>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state.storage_systems.clone())
    }

    async fn list_storage_ports(&self, system: &StorageSystem) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state
            .storage_ports
            .get(&system.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn export_group_create(
        &self,
        name: &str,
        _project: &str,
        _tenant: &str,
        _varray: &str,
        _group_type: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        if state.export_groups.contains_key(name) {
            return Err(Self::exists(format!("export group {name} already exists")));
        }
        state
            .export_groups
            .insert(name.to_string(), GroupState::default());
        Ok(())
    }

    async fn export_group_add_host(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        host: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let entry = state
            .export_groups
            .get_mut(group)
            .ok_or_else(|| Self::missing(format!("export group {group} not found")))?;
        if !entry.hosts.insert(host.to_string()) {
            return Err(Self::exists(format!(
                "host {host} already in export group {group}"
            )));
        }
        Ok(())
    }

    async fn export_group_add_initiator(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        initiator: &str,
        _host: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let entry = state
            .export_groups
            .get_mut(group)
            .ok_or_else(|| Self::missing(format!("export group {group} not found")))?;
        if !entry.initiators.insert(initiator.to_string()) {
            return Err(Self::exists(format!(
                "initiator {initiator} already in export group {group}"
            )));
        }
        Ok(())
    }

    async fn export_group_show(
        &self,
        group: &str,
        _project: &str,
        _tenant: &str,
    ) -> Result<ExportGroupDetails> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let entry = state
            .export_groups
            .get(group)
            .ok_or_else(|| Self::missing(format!("export group {group} not found")))?;
        Ok(ExportGroupDetails {
            name: group.to_string(),
            volumes: entry.volumes.clone(),
        })
    }

    async fn export_group_list(&self, _project: &str, _tenant: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state.export_groups.keys().cloned().collect())
    }

    async fn export_group_add_volumes(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        volumes: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let entry = state
            .export_groups
            .get_mut(group)
            .ok_or_else(|| Self::missing(format!("export group {group} not found")))?;
        for uri in volumes {
            if entry.volumes.iter().any(|v| &v.id == uri) {
                return Err(Self::exists(format!("volume {uri} already exported")));
            }
            let lun = entry.volumes.len() as u32;
            entry.volumes.push(ExportedVolume {
                id: uri.clone(),
                lun,
            });
        }
        Ok(())
    }

    async fn export_group_remove_volumes(
        &self,
        group: &str,
        _tenant: &str,
        _project: &str,
        volumes: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let entry = state
            .export_groups
            .get_mut(group)
            .ok_or_else(|| Self::missing(format!("export group {group} not found")))?;
        for uri in volumes {
            if !entry.volumes.iter().any(|v| &v.id == uri) {
                return Err(Self::missing(format!("volume {uri} not exported")));
            }
            entry.volumes.retain(|v| &v.id != uri);
        }
        Ok(())
    }

    async fn volume_query(&self, _project_path: &str, name: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state
            .volumes
            .iter()
            .find(|(_, v)| v.name == name)
            .map(|(uri, _)| uri.clone()))
    }

    async fn volume_show(&self, uri: &str) -> Result<VolumeInfo> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let record = state
            .volumes
            .get(uri)
            .ok_or_else(|| Self::missing(format!("volume {uri} not found")))?;
        Ok(VolumeInfo {
            name: record.name.clone(),
            wwn: record.wwn.clone(),
            provisioned_gb: record.size_gb,
            allocated_gb: record.size_gb,
        })
    }

    async fn volume_create(
        &self,
        _project_path: &str,
        name: &str,
        size_gb: u64,
        _varray: &str,
        vpool: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        state.last_vpool = Some(vpool.to_string());
        if state.volumes.values().any(|v| v.name == name) {
            return Err(Self::exists(format!("volume {name} already exists")));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.volumes.insert(
            format!("urn:volume:{id}"),
            VolumeRecord {
                name: name.to_string(),
                // Last 3 characters are a controller-specific suffix the
                // device resolver trims off.
                wwn: format!("600601608d203700{id:013x}fff"),
                size_gb,
            },
        );
        Ok(())
    }

    async fn volume_delete(&self, _project_path: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        let uri = state
            .volumes
            .iter()
            .find(|(_, v)| v.name == name)
            .map(|(uri, _)| uri.clone())
            .ok_or_else(|| Self::missing(format!("volume {name} not found")))?;
        state.volumes.remove(&uri);
        Ok(())
    }

    async fn search_volumes(&self, _project_uri: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        Self::take_injected(&mut state)?;
        Ok(state.volumes.keys().cloned().collect())
    }
}
