//! Identity catalog types.

use serde::{Deserialize, Serialize};

/// A managed policy in a ListPolicies page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    /// Policy name.
    pub name: String,
    /// Policy ARN.
    pub arn: String,
}

/// A server certificate in a ListServerCertificates page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCertificateSummary {
    /// Certificate name.
    pub name: String,
    /// Certificate ARN.
    pub arn: String,
}

/// A role returned by GetRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    /// Role name.
    pub name: String,
    /// Role ARN.
    pub arn: String,
}

/// An instance profile returned by GetInstanceProfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProfileSummary {
    /// Instance profile name.
    pub name: String,
    /// Instance profile ARN.
    pub arn: String,
    /// Names of the roles attached to the profile.
    pub roles: Vec<String>,
}
