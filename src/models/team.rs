//! Team domain model

use serde::{Deserialize, Serialize};

/// A franchise as known locally, correlated to the provider by `external_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Local row id; `None` until persisted
    pub id: Option<i64>,

    /// Provider-assigned id, immutable
    pub external_id: i64,

    /// Short name ("Celtics")
    pub name: String,

    /// Full name ("Boston Celtics")
    pub full_name: String,

    pub abbreviation: String,
    pub city: String,
    pub conference: String,
    pub division: String,
}

impl Team {
    /// Create a team with only the identifying fields set
    pub fn new(external_id: i64, name: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            external_id,
            full_name: name.clone(),
            name,
            abbreviation: abbreviation.into(),
            city: String::new(),
            conference: String::new(),
            division: String::new(),
        }
    }

    /// True when the provider copy carries different content than the stored row
    pub fn differs_from(&self, stored: &Team) -> bool {
        self.external_id != stored.external_id
            || self.name != stored.name
            || self.full_name != stored.full_name
            || self.abbreviation != stored.abbreviation
            || self.city != stored.city
            || self.conference != stored.conference
            || self.division != stored.division
    }
}
