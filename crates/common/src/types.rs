use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_info_carries_name_and_version() {
        let info = ServiceInfo::new("atrium-test");
        assert_eq!(info.name, "atrium-test");
        assert!(!info.version.is_empty());
    }

    #[test]
    fn instance_ids_are_unique() {
        let a = ServiceInfo::new("svc");
        let b = ServiceInfo::new("svc");
        assert_ne!(a.instance_id, b.instance_id);
    }
}
