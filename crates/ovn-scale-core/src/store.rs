//! Deployment lookups.
//!
//! A [`DeploymentStore`] answers read-only questions about a deployment:
//! which credential reaches the controller, which farms exist and which
//! sandboxes each farm owns. [`DeploymentDescription`] is the JSON-file
//! backed implementation.

use crate::error::{Result, ScaleError};
use crate::model::Sandbox;
use ovn_scale_exec::{Credential, InstallMethod};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Sandbox the controller's databases run in.
pub const DEFAULT_CONTROLLER_SANDBOX: &str = "controller-sandbox";

/// Read-only deployment lookups.
pub trait DeploymentStore {
    /// How sandboxes are reached.
    fn install_method(&self) -> InstallMethod;

    /// Credential of the controller node.
    fn controller_credential(&self) -> Result<Credential>;

    /// Controller sandbox name and host container.
    fn controller_sandbox(&self) -> (String, Option<String>);

    /// Credentials of every farm, by farm name.
    fn farm_credentials(&self) -> Result<HashMap<String, Credential>>;

    /// Sandboxes of `farm`, or of every farm when `None`.
    fn sandboxes(&self, farm: Option<&str>) -> Result<Vec<Sandbox>>;
}

fn default_controller_sandbox() -> String {
    DEFAULT_CONTROLLER_SANDBOX.to_string()
}

/// The controller node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerDescription {
    /// How to reach the node.
    pub credential: Credential,
    /// Sandbox holding the databases.
    #[serde(default = "default_controller_sandbox")]
    pub sandbox: String,
    /// Container holding the databases, for containerized installs.
    #[serde(default)]
    pub host_container: Option<String>,
}

/// One sandbox entry of a farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxDescription {
    /// Sandbox name.
    pub name: String,
    /// Free-form tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// Hosting container.
    #[serde(default)]
    pub host_container: Option<String>,
}

/// A farm host and its sandboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmDescription {
    /// How to reach the host.
    pub credential: Credential,
    /// Sandboxes on the host.
    #[serde(default)]
    pub sandboxes: Vec<SandboxDescription>,
}

/// A whole deployment, as written by the provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescription {
    /// How sandboxes are reached.
    #[serde(default)]
    pub install_method: InstallMethod,
    /// Controller node.
    pub controller: ControllerDescription,
    /// Farms by name.
    #[serde(default)]
    pub farms: BTreeMap<String, FarmDescription>,
}

impl DeploymentDescription {
    /// Load and validate a description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let description: Self = serde_json::from_str(&raw)?;
        description.validate()?;
        Ok(description)
    }

    /// Every sandbox name must be unique across farms.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (farm, desc) in &self.farms {
            for sandbox in &desc.sandboxes {
                if !seen.insert(sandbox.name.as_str()) {
                    return Err(ScaleError::config(format!(
                        "sandbox {} appears more than once (again in farm {farm})",
                        sandbox.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn farm(&self, farm: &str) -> Result<&FarmDescription> {
        self.farms.get(farm).ok_or_else(|| ScaleError::NotFound {
            kind: "farm",
            name: farm.to_string(),
        })
    }
}

fn to_sandbox(farm: &str, desc: &SandboxDescription) -> Sandbox {
    Sandbox {
        name: desc.name.clone(),
        farm: farm.to_string(),
        tag: desc.tag.clone(),
        host_container: desc.host_container.clone(),
    }
}

impl DeploymentStore for DeploymentDescription {
    fn install_method(&self) -> InstallMethod {
        self.install_method
    }

    fn controller_credential(&self) -> Result<Credential> {
        Ok(self.controller.credential.clone())
    }

    fn controller_sandbox(&self) -> (String, Option<String>) {
        (
            self.controller.sandbox.clone(),
            self.controller.host_container.clone(),
        )
    }

    fn farm_credentials(&self) -> Result<HashMap<String, Credential>> {
        Ok(self
            .farms
            .iter()
            .map(|(name, farm)| (name.clone(), farm.credential.clone()))
            .collect())
    }

    fn sandboxes(&self, farm: Option<&str>) -> Result<Vec<Sandbox>> {
        match farm {
            Some(name) => Ok(self
                .farm(name)?
                .sandboxes
                .iter()
                .map(|sb| to_sandbox(name, sb))
                .collect()),
            None => Ok(self
                .farms
                .iter()
                .flat_map(|(name, farm)| farm.sandboxes.iter().map(move |sb| to_sandbox(name, sb)))
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEPLOYMENT: &str = r#"{
        "install_method": "docker",
        "controller": {
            "credential": {"host": "10.0.0.1", "user": "root"}
        },
        "farms": {
            "farm-0": {
                "credential": {"host": "10.0.1.1", "user": "root", "port": 2222},
                "sandboxes": [
                    {"name": "sandbox-0", "host_container": "ovn-chassis-0"},
                    {"name": "sandbox-1", "tag": "rack-a"}
                ]
            },
            "farm-1": {
                "credential": {"host": "10.0.1.2", "user": "root"},
                "sandboxes": [{"name": "sandbox-2"}]
            }
        }
    }"#;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_description() {
        let file = write_temp(DEPLOYMENT);
        let desc = DeploymentDescription::load(file.path()).unwrap();
        assert_eq!(desc.install_method(), InstallMethod::Container);
        assert_eq!(desc.controller.sandbox, DEFAULT_CONTROLLER_SANDBOX);
        assert_eq!(desc.controller_credential().unwrap().port, 22);
        assert_eq!(desc.farm_credentials().unwrap()["farm-0"].port, 2222);
    }

    #[test]
    fn test_sandboxes_by_farm() {
        let desc: DeploymentDescription = serde_json::from_str(DEPLOYMENT).unwrap();
        let farm0 = desc.sandboxes(Some("farm-0")).unwrap();
        assert_eq!(farm0.len(), 2);
        assert_eq!(farm0[0].host_container.as_deref(), Some("ovn-chassis-0"));
        assert_eq!(farm0[1].tag.as_deref(), Some("rack-a"));
        assert!(farm0.iter().all(|sb| sb.farm == "farm-0"));

        let all = desc.sandboxes(None).unwrap();
        let names: Vec<&str> = all.iter().map(|sb| sb.name.as_str()).collect();
        assert_eq!(names, ["sandbox-0", "sandbox-1", "sandbox-2"]);
    }

    #[test]
    fn test_unknown_farm_is_not_found() {
        let desc: DeploymentDescription = serde_json::from_str(DEPLOYMENT).unwrap();
        let err = desc.sandboxes(Some("farm-9")).unwrap_err();
        assert!(matches!(err, ScaleError::NotFound { kind: "farm", .. }));
    }

    #[test]
    fn test_duplicate_sandbox_rejected() {
        let file = write_temp(
            r#"{
                "controller": {"credential": {"host": "c", "user": "root"}},
                "farms": {
                    "a": {"credential": {"host": "a", "user": "root"}, "sandboxes": [{"name": "sb"}]},
                    "b": {"credential": {"host": "b", "user": "root"}, "sandboxes": [{"name": "sb"}]}
                }
            }"#,
        );
        assert!(matches!(
            DeploymentDescription::load(file.path()),
            Err(ScaleError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DeploymentDescription::load("/nonexistent/deployment.json").unwrap_err();
        assert!(matches!(err, ScaleError::Io(_)));
    }
}
