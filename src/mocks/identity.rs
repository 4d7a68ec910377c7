//! In-memory identity catalog.

use super::page_of;
use crate::backend::IdentityBackend;
use crate::error::{BulkError, ServiceError, ServiceKind};
use crate::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// Operations of [`InMemoryIdentity`], for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityOp {
    /// ListPolicies.
    ListPolicies,
    /// ListServerCertificates.
    ListServerCertificates,
    /// ListAttachedRolePolicies.
    ListAttachedRolePolicies,
    /// GetRole.
    GetRole,
    /// GetInstanceProfile.
    GetInstanceProfile,
    /// ListAccountAliases.
    ListAccountAliases,
}

impl IdentityOp {
    fn name(self) -> &'static str {
        match self {
            IdentityOp::ListPolicies => "ListPolicies",
            IdentityOp::ListServerCertificates => "ListServerCertificates",
            IdentityOp::ListAttachedRolePolicies => "ListAttachedRolePolicies",
            IdentityOp::GetRole => "GetRole",
            IdentityOp::GetInstanceProfile => "GetInstanceProfile",
            IdentityOp::ListAccountAliases => "ListAccountAliases",
        }
    }
}

#[derive(Default)]
struct Catalog {
    policies: Vec<PolicySummary>,
    certificates: Vec<ServerCertificateSummary>,
    roles: BTreeMap<String, RoleSummary>,
    attached: HashMap<String, Vec<String>>,
    profiles: BTreeMap<String, InstanceProfileSummary>,
    aliases: Vec<String>,
    failures: HashMap<IdentityOp, (String, u16)>,
}

/// In-memory [`IdentityBackend`] with a configurable page size.
pub struct InMemoryIdentity {
    catalog: Mutex<Catalog>,
    page_size: usize,
    calls: Mutex<HashMap<IdentityOp, usize>>,
}

impl InMemoryIdentity {
    /// Create an empty catalog that pages at the service default of 100.
    pub fn new() -> Self {
        Self {
            catalog: Mutex::new(Catalog::default()),
            page_size: 100,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Set the page size of list calls.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add a managed policy.
    pub fn add_policy(&self, name: &str, arn: &str) {
        self.catalog.lock().policies.push(PolicySummary {
            name: name.to_string(),
            arn: arn.to_string(),
        });
    }

    /// Add a server certificate.
    pub fn add_server_certificate(&self, name: &str, arn: &str) {
        self.catalog.lock().certificates.push(ServerCertificateSummary {
            name: name.to_string(),
            arn: arn.to_string(),
        });
    }

    /// Add a role.
    pub fn add_role(&self, name: &str, arn: &str) {
        self.catalog.lock().roles.insert(
            name.to_string(),
            RoleSummary {
                name: name.to_string(),
                arn: arn.to_string(),
            },
        );
    }

    /// Attach a managed policy to a role.
    pub fn attach_role_policy(&self, role: &str, policy_arn: &str) {
        self.catalog
            .lock()
            .attached
            .entry(role.to_string())
            .or_default()
            .push(policy_arn.to_string());
    }

    /// Add an instance profile with the given role names.
    pub fn add_instance_profile(&self, name: &str, arn: &str, roles: &[&str]) {
        self.catalog.lock().profiles.insert(
            name.to_string(),
            InstanceProfileSummary {
                name: name.to_string(),
                arn: arn.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
    }

    /// Add an account alias.
    pub fn add_account_alias(&self, alias: &str) {
        self.catalog.lock().aliases.push(alias.to_string());
    }

    /// Fail every `op` call with `code` and `status`.
    pub fn fail(&self, op: IdentityOp, code: &str, status: u16) {
        self.catalog
            .lock()
            .failures
            .insert(op, (code.to_string(), status));
    }

    /// Number of `op` calls made so far.
    pub fn calls(&self, op: IdentityOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: IdentityOp) -> Result<(), BulkError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        match self.catalog.lock().failures.get(&op) {
            Some((code, status)) => Err(error(op, code, "injected failure", *status, None)),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

fn error(op: IdentityOp, code: &str, message: &str, status: u16, resource: Option<&str>) -> BulkError {
    let mut e = ServiceError::new(ServiceKind::Identity, op.name(), code, message).with_status(status);
    if let Some(r) = resource {
        e = e.with_resource(r);
    }
    BulkError::Service(e)
}

fn no_such_entity(op: IdentityOp, what: &str, name: &str) -> BulkError {
    error(
        op,
        "NoSuchEntity",
        &format!("The {what} with name {name} cannot be found."),
        404,
        Some(name),
    )
}

#[async_trait]
impl IdentityBackend for InMemoryIdentity {
    async fn list_policies(&self, cursor: Option<Cursor>) -> Result<Page<PolicySummary>, BulkError> {
        self.enter(IdentityOp::ListPolicies)?;
        Ok(page_of(&self.catalog.lock().policies, cursor, self.page_size))
    }

    async fn list_server_certificates(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<Page<ServerCertificateSummary>, BulkError> {
        self.enter(IdentityOp::ListServerCertificates)?;
        Ok(page_of(&self.catalog.lock().certificates, cursor, self.page_size))
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<String>, BulkError> {
        let op = IdentityOp::ListAttachedRolePolicies;
        self.enter(op)?;
        let catalog = self.catalog.lock();
        if !catalog.roles.contains_key(role_name) {
            return Err(no_such_entity(op, "role", role_name));
        }
        let attached = catalog.attached.get(role_name).cloned().unwrap_or_default();
        Ok(page_of(&attached, cursor, self.page_size))
    }

    async fn get_role(&self, role_name: &str) -> Result<RoleSummary, BulkError> {
        let op = IdentityOp::GetRole;
        self.enter(op)?;
        self.catalog
            .lock()
            .roles
            .get(role_name)
            .cloned()
            .ok_or_else(|| no_such_entity(op, "role", role_name))
    }

    async fn get_instance_profile(&self, name: &str) -> Result<InstanceProfileSummary, BulkError> {
        let op = IdentityOp::GetInstanceProfile;
        self.enter(op)?;
        self.catalog
            .lock()
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| no_such_entity(op, "instance profile", name))
    }

    async fn list_account_aliases(&self) -> Result<Vec<String>, BulkError> {
        self.enter(IdentityOp::ListAccountAliases)?;
        Ok(self.catalog.lock().aliases.clone())
    }
}
