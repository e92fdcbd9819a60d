use serde::{Deserialize, Serialize};

/// Identity of the service emitting events.
///
/// All fields are optional strings; a service with an empty name is
/// considered nil and is skipped wherever identity is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,

    /// Deployment type of the service ("api", "worker", "unit-test", ...).
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = env.into();
        self
    }

    pub fn repository(mut self, repo: impl Into<String>) -> Self {
        self.repository = repo.into();
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// A service with an empty name carries no identity.
    pub fn is_nil(&self) -> bool {
        self.name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_service() {
        assert!(Service::default().is_nil());
        assert!(!Service::new("api").is_nil());
    }

    #[test]
    fn test_builder_chain() {
        let svc = Service::new("billing")
            .environment("staging")
            .kind("worker")
            .version("1.2.3");
        assert_eq!(svc.name, "billing");
        assert_eq!(svc.environment, "staging");
        assert_eq!(svc.kind, "worker");
        assert_eq!(svc.version, "1.2.3");
        assert!(svc.repository.is_empty());
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let svc = Service::new("api").environment("prod");
        let json = serde_json::to_value(&svc).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["name"], "api");
        assert_eq!(obj["environment"], "prod");
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let svc = Service::new("api").kind("unit-test");
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json["type"], "unit-test");
    }
}
