//! In-memory fakes of the provider and network traits for unit tests.

use crate::cancel::CancellationToken;
use crate::probe::{endpoint_hostname, Network};
use crate::provider::{
    OperationState, PendingOperation, ProviderError, ProviderResult, ResourceGroupOperations,
    StorageAccount, StorageAccountOperations, StorageAccountParams, Subscription,
    SubscriptionOperations,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn test_subscription(id: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        display_name: format!("Test {id}"),
        state: "Enabled".to_string(),
    }
}

#[derive(Default)]
struct ProviderState {
    /// group name -> location
    groups: BTreeMap<String, String>,
    deleted_groups: Vec<String>,
    /// account name -> (group, location)
    accounts: BTreeMap<String, (String, String)>,
    /// poll url -> polls left before success
    pending: HashMap<String, u32>,
    create_calls: usize,
    delete_calls: usize,
    polls: usize,
}

/// Provider that keeps resource groups and storage accounts in memory
pub struct FakeProvider {
    subscriptions: Vec<Subscription>,
    list_error: Option<ProviderError>,
    group_create_error: Option<ProviderError>,
    group_delete_error: Option<ProviderError>,
    failing_regions: HashSet<String>,
    polls_until_done: Option<u32>,
    failing_operation: Option<String>,
    failing_deletes: bool,
    create_delay: Duration,
    cancel_on_create: Option<CancellationToken>,
    cancel_on_group_create: Option<CancellationToken>,
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            subscriptions: vec![test_subscription("sub-1")],
            list_error: None,
            group_create_error: None,
            group_delete_error: None,
            failing_regions: HashSet::new(),
            polls_until_done: None,
            failing_operation: None,
            failing_deletes: false,
            create_delay: Duration::ZERO,
            cancel_on_create: None,
            cancel_on_group_create: None,
            state: Mutex::new(ProviderState::default()),
        }
    }

    pub fn with_subscriptions(mut self, subscriptions: Vec<Subscription>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    pub fn with_list_error(mut self, error: ProviderError) -> Self {
        self.list_error = Some(error);
        self
    }

    pub fn with_existing_group(mut self, name: &str, location: &str) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .groups
            .insert(name.to_string(), location.to_string());
        self
    }

    pub fn with_group_create_error(mut self, error: ProviderError) -> Self {
        self.group_create_error = Some(error);
        self
    }

    pub fn with_group_delete_error(mut self, error: ProviderError) -> Self {
        self.group_delete_error = Some(error);
        self
    }

    /// Storage account creation in this location is rejected
    pub fn with_failing_region(mut self, region: &str) -> Self {
        self.failing_regions.insert(region.to_string());
        self
    }

    /// Creates go through `polls` in-progress polls before succeeding
    pub fn with_polls_until_done(mut self, polls: u32) -> Self {
        self.polls_until_done = Some(polls);
        self
    }

    /// Creates are accepted but the operation then fails
    pub fn with_failing_operation(mut self, detail: &str) -> Self {
        self.failing_operation = Some(detail.to_string());
        self
    }

    pub fn with_failing_deletes(mut self) -> Self {
        self.failing_deletes = true;
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Cancel `token` when the first create arrives
    pub fn with_cancel_on_create(mut self, token: CancellationToken) -> Self {
        self.cancel_on_create = Some(token);
        self
    }

    /// Cancel `token` once the resource group has been created
    pub fn with_cancel_on_group_create(mut self, token: CancellationToken) -> Self {
        self.cancel_on_group_create = Some(token);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap()
    }

    pub fn group_location(&self, name: &str) -> Option<String> {
        self.state().groups.get(name).cloned()
    }

    pub fn group_deleted(&self, name: &str) -> bool {
        self.state().deleted_groups.iter().any(|g| g == name)
    }

    pub fn accounts_in(&self, group: &str) -> Vec<String> {
        self.state()
            .accounts
            .iter()
            .filter(|(_, (g, _))| g == group)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn remaining_accounts(&self) -> usize {
        self.state().accounts.len()
    }

    pub fn create_count(&self) -> usize {
        self.state().create_calls
    }

    pub fn delete_count(&self) -> usize {
        self.state().delete_calls
    }

    pub fn poll_count(&self) -> usize {
        self.state().polls
    }
}

impl SubscriptionOperations for FakeProvider {
    async fn list_subscriptions(&self) -> ProviderResult<Vec<Subscription>> {
        match &self.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.subscriptions.clone()),
        }
    }
}

impl ResourceGroupOperations for FakeProvider {
    async fn resource_group_exists(&self, _subscription_id: &str, name: &str) -> ProviderResult<bool> {
        Ok(self.state().groups.contains_key(name))
    }

    async fn create_or_update_resource_group(
        &self,
        _subscription_id: &str,
        name: &str,
        location: &str,
        _tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        if let Some(e) = &self.group_create_error {
            return Err(e.clone());
        }
        self.state()
            .groups
            .insert(name.to_string(), location.to_string());
        if let Some(token) = &self.cancel_on_group_create {
            token.cancel();
        }
        Ok(())
    }

    async fn begin_delete_resource_group(&self, _subscription_id: &str, name: &str) -> ProviderResult<()> {
        if let Some(e) = &self.group_delete_error {
            return Err(e.clone());
        }
        let mut state = self.state();
        state.groups.remove(name);
        state.deleted_groups.push(name.to_string());
        Ok(())
    }
}

impl StorageAccountOperations for FakeProvider {
    async fn begin_create_storage_account(
        &self,
        _subscription_id: &str,
        resource_group: &str,
        name: &str,
        params: &StorageAccountParams,
    ) -> ProviderResult<PendingOperation> {
        self.state().create_calls += 1;
        if let Some(token) = &self.cancel_on_create {
            token.cancel();
        }
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        if self.failing_regions.contains(&params.location) {
            return Err(ProviderError::Api {
                status: 400,
                code: "LocationNotAvailableForResourceType".to_string(),
                message: format!("The provided location '{}' is not available", params.location),
            });
        }

        let url = format!("https://fake.invalid/operations/{name}");
        let mut state = self.state();
        if self.failing_operation.is_some() {
            state.pending.insert(url.clone(), 0);
            return Ok(PendingOperation::Polling {
                url,
                retry_after: None,
            });
        }

        state.accounts.insert(
            name.to_string(),
            (resource_group.to_string(), params.location.clone()),
        );
        match self.polls_until_done {
            Some(polls) => {
                state.pending.insert(url.clone(), polls);
                Ok(PendingOperation::Polling {
                    url,
                    retry_after: Some(Duration::from_millis(5)),
                })
            }
            None => Ok(PendingOperation::Completed),
        }
    }

    async fn poll_operation(&self, url: &str) -> ProviderResult<OperationState> {
        let mut state = self.state();
        state.polls += 1;
        if let Some(detail) = &self.failing_operation {
            return Ok(OperationState::Failed(detail.clone()));
        }
        match state.pending.get_mut(url) {
            Some(0) => Ok(OperationState::Succeeded),
            Some(left) => {
                *left -= 1;
                Ok(OperationState::InProgress)
            }
            None => Err(ProviderError::NotFound(url.to_string())),
        }
    }

    async fn delete_storage_account(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        name: &str,
    ) -> ProviderResult<()> {
        let mut state = self.state();
        state.delete_calls += 1;
        if self.failing_deletes {
            return Err(ProviderError::Api {
                status: 409,
                code: "ScopeLocked".to_string(),
                message: "The scope is locked".to_string(),
            });
        }
        match state.accounts.remove(name) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound(name.to_string())),
        }
    }

    async fn list_storage_accounts(
        &self,
        _subscription_id: &str,
        resource_group: &str,
    ) -> ProviderResult<Vec<StorageAccount>> {
        Ok(self
            .state()
            .accounts
            .iter()
            .filter(|(_, (group, _))| group == resource_group)
            .map(|(name, (_, location))| StorageAccount {
                name: name.clone(),
                location: location.clone(),
            })
            .collect())
    }
}

/// Network where chosen regions resolve and every host accepts connections
/// unless marked unreachable
pub struct FakeNetwork {
    resolvable: HashSet<String>,
    empty_answer: HashSet<String>,
    unreachable: HashSet<String>,
    failing_trials: HashSet<usize>,
    connect_delay: Duration,
    cancel_on_resolve: Option<CancellationToken>,
    cancel_on_connect: Option<CancellationToken>,
    resolves: AtomicUsize,
    connects: AtomicUsize,
    connected_hosts: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            resolvable: HashSet::new(),
            empty_answer: HashSet::new(),
            unreachable: HashSet::new(),
            failing_trials: HashSet::new(),
            connect_delay: Duration::ZERO,
            cancel_on_resolve: None,
            cancel_on_connect: None,
            resolves: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            connected_hosts: Mutex::new(Vec::new()),
        }
    }

    /// These regions' blob endpoints resolve
    pub fn with_resolvable<'a>(mut self, regions: impl IntoIterator<Item = &'a str>) -> Self {
        self.resolvable
            .extend(regions.into_iter().map(endpoint_hostname));
        self
    }

    /// These regions' blob endpoints resolve to no addresses
    pub fn with_empty_answer<'a>(mut self, regions: impl IntoIterator<Item = &'a str>) -> Self {
        self.empty_answer
            .extend(regions.into_iter().map(endpoint_hostname));
        self
    }

    /// Connections to these hosts are refused
    pub fn with_unreachable<'a>(mut self, hosts: impl IntoIterator<Item = &'a str>) -> Self {
        self.unreachable
            .extend(hosts.into_iter().map(str::to_string));
        self
    }

    /// Connects with these zero-based per-host attempt numbers hang until
    /// the connect timeout and then fail
    pub fn with_failing_trials(mut self, trials: impl IntoIterator<Item = usize>) -> Self {
        self.failing_trials.extend(trials);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_cancel_on_resolve(mut self, token: CancellationToken) -> Self {
        self.cancel_on_resolve = Some(token);
        self
    }

    pub fn with_cancel_on_connect(mut self, token: CancellationToken) -> Self {
        self.cancel_on_connect = Some(token);
        self
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connected_hosts(&self) -> Vec<String> {
        self.connected_hosts.lock().unwrap().clone()
    }
}

impl Network for FakeNetwork {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_resolve {
            token.cancel();
        }

        if self.resolvable.contains(host) {
            Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
        } else if self.empty_answer.contains(host) {
            Ok(Vec::new())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("failed to lookup address information: {host}"),
            ))
        }
    }

    async fn connect(&self, host: &str, _port: u16, timeout: Duration) -> io::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut hosts = self.connected_hosts.lock().unwrap();
            let attempt = hosts.iter().filter(|h| *h == host).count();
            hosts.push(host.to_string());
            attempt
        };
        if let Some(token) = &self.cancel_on_connect {
            token.cancel();
        }
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if self.failing_trials.contains(&attempt) {
            tokio::time::sleep(timeout).await;
            Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
        } else if self.unreachable.contains(host) {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        } else {
            Ok(())
        }
    }
}
