//! Name-to-ARN lookups against the identity catalog.

use crate::backend::IdentityBackend;
use crate::error::BulkError;
use crate::pagination::paginate;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Resolves identity resources by name.
///
/// A resource that does not exist is `None`, never an error. Any other
/// failure (access denied, throttling, network) propagates. Catalog
/// searches stop at the first match.
#[derive(Clone)]
pub struct IdentityLookup {
    backend: Arc<dyn IdentityBackend>,
}

impl IdentityLookup {
    /// Create a new lookup service.
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        Self { backend }
    }

    /// ARN of the managed policy called `name`.
    #[instrument(skip(self))]
    pub async fn policy_arn(&self, name: &str) -> Result<Option<String>, BulkError> {
        let backend = &self.backend;
        let policies = paginate("ListPolicies", move |cursor| async move {
            backend
                .list_policies(cursor)
                .await
                .map_err(|e| e.with_resource(name))
        });
        let matching = policies.try_filter(|p| futures::future::ready(p.name == name));
        futures::pin_mut!(matching);
        let found = matching.try_next().await?;
        debug!(found = found.is_some(), "Policy search finished");
        Ok(found.map(|p| p.arn))
    }

    /// Whether a managed policy called `name` exists.
    pub async fn has_policy(&self, name: &str) -> Result<bool, BulkError> {
        Ok(self.policy_arn(name).await?.is_some())
    }

    /// ARN of the server certificate called `name`.
    #[instrument(skip(self))]
    pub async fn server_certificate_arn(&self, name: &str) -> Result<Option<String>, BulkError> {
        let backend = &self.backend;
        let certificates = paginate("ListServerCertificates", move |cursor| async move {
            backend
                .list_server_certificates(cursor)
                .await
                .map_err(|e| e.with_resource(name))
        });
        let matching = certificates.try_filter(|c| futures::future::ready(c.name == name));
        futures::pin_mut!(matching);
        let found = matching.try_next().await?;
        Ok(found.map(|c| c.arn))
    }

    /// ARN of the role called `name`.
    #[instrument(skip(self))]
    pub async fn role_arn(&self, name: &str) -> Result<Option<String>, BulkError> {
        let role = absent_if_not_found(
            self.backend
                .get_role(name)
                .await
                .map_err(|e| e.with_resource(name)),
        )?;
        Ok(role.map(|r| r.arn))
    }

    /// Whether a role called `name` exists.
    pub async fn has_role(&self, name: &str) -> Result<bool, BulkError> {
        Ok(self.role_arn(name).await?.is_some())
    }

    /// ARN of the instance profile called `name`.
    #[instrument(skip(self))]
    pub async fn instance_profile_arn(&self, name: &str) -> Result<Option<String>, BulkError> {
        let profile = absent_if_not_found(
            self.backend
                .get_instance_profile(name)
                .await
                .map_err(|e| e.with_resource(name)),
        )?;
        Ok(profile.map(|p| p.arn))
    }

    /// Whether an instance profile called `name` exists.
    pub async fn has_instance_profile(&self, name: &str) -> Result<bool, BulkError> {
        Ok(self.instance_profile_arn(name).await?.is_some())
    }

    /// Names of the roles in the instance profile called `name`.
    ///
    /// `None` when the profile does not exist; an empty list when it exists
    /// without roles.
    #[instrument(skip(self))]
    pub async fn instance_profile_roles(&self, name: &str) -> Result<Option<Vec<String>>, BulkError> {
        let profile = absent_if_not_found(
            self.backend
                .get_instance_profile(name)
                .await
                .map_err(|e| e.with_resource(name)),
        )?;
        Ok(profile.map(|p| p.roles))
    }

    /// ARNs of the managed policies attached to the role called `role_name`.
    ///
    /// `None` when the role does not exist.
    #[instrument(skip(self))]
    pub async fn attached_role_policy_arns(
        &self,
        role_name: &str,
    ) -> Result<Option<Vec<String>>, BulkError> {
        let backend = &self.backend;
        let attached = paginate("ListAttachedRolePolicies", move |cursor| async move {
            backend
                .list_attached_role_policies(role_name, cursor)
                .await
                .map_err(|e| e.with_resource(role_name))
        });
        absent_if_not_found(attached.try_collect::<Vec<String>>().await)
    }

    /// The account's aliases. Empty when none is set.
    #[instrument(skip(self))]
    pub async fn account_aliases(&self) -> Result<Vec<String>, BulkError> {
        self.backend.list_account_aliases().await
    }
}

fn absent_if_not_found<T>(result: Result<T, BulkError>) -> Result<Option<T>, BulkError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
