use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A consultant or staff member. The pipeline only reads people; they are
/// managed elsewhere in the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub designation: Option<String>,
    pub hired_at: Option<NaiveDate>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Practice {
    pub id: Uuid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_person(status: &str) -> Person {
        Person {
            id: Uuid::new_v4(),
            display_name: "Test Person".to_string(),
            email: Some("test@example.com".to_string()),
            designation: Some("partner".to_string()),
            hired_at: None,
            status: status.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn active_person_is_active() {
        assert!(make_person("active").is_active());
    }

    #[test]
    fn inactive_person_is_not_active() {
        assert!(!make_person("inactive").is_active());
    }
}
