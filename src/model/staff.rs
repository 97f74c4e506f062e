//! Staff users, departments and services.

use serde::{Deserialize, Serialize};

/// A staff member of a jurisdiction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffUser {
    pub id: String,
    pub jurisdiction_id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub is_admin: bool,
}

impl StaffUser {
    pub fn new(
        id: impl Into<String>,
        jurisdiction_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            jurisdiction_id: jurisdiction_id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            phone: None,
            is_admin: false,
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// "First Last", or the email when no name is recorded.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

/// A department within a jurisdiction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub jurisdiction_id: String,
    pub name: String,
}

/// A service category that tickets are filed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub jurisdiction_id: String,
    pub name: String,
}

/// Membership of a staff user in a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffDepartment {
    pub staff_user_id: String,
    pub department_id: String,
    pub is_lead: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_full_name() {
        let s = StaffUser::new("s1", "j1", "ned@city.gov").with_name("Ned", "Flanders");
        assert_eq!(s.display_name(), "Ned Flanders");
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let s = StaffUser::new("s1", "j1", "ned@city.gov");
        assert_eq!(s.display_name(), "ned@city.gov");
    }
}
