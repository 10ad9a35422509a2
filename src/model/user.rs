use std::fmt::Display;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::{IdKind, UserId};
use crate::store::Store;

/// Matric number marking the administrator account.
pub const DEFAULT_ADMIN_MATRIC: &str = "admin";
const DEFAULT_ADMIN_NAME: &str = "System Administrator";
const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Student => "student",
                Self::Admin => "admin",
            }
        )
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique student identity, or [`DEFAULT_ADMIN_MATRIC`] for the administrator.
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
}

impl User {
    /// May this user cast ballots?
    pub fn can_vote(&self) -> bool {
        self.role == Role::Student && self.is_verified && self.is_active
    }
}

/// A student registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
}

impl Registration {
    /// Check all fields are present and plausible.
    pub fn validate(&self) -> Result<()> {
        let matric = self.matric_number.trim();
        if matric.is_empty() {
            return Err(Error::BadRequest("Matric number must not be empty".to_string()));
        }
        if matric.eq_ignore_ascii_case(DEFAULT_ADMIN_MATRIC) {
            return Err(Error::BadRequest(format!("Matric number '{matric}' is reserved")));
        }
        if self.full_name.trim().is_empty() {
            return Err(Error::BadRequest("Full name must not be empty".to_string()));
        }
        if !self.email.contains('@') {
            return Err(Error::BadRequest(format!("Invalid email '{}'", self.email)));
        }
        Ok(())
    }

    /// Convert into a new, unverified student.
    pub fn into_student(self, id: UserId) -> User {
        User {
            id,
            matric_number: self.matric_number.trim().to_string(),
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            role: Role::Student,
            is_verified: false,
            is_active: true,
        }
    }
}

/// Ensure the administrator account exists, creating it if needed.
///
/// This operation is idempotent.
pub async fn ensure_admin_exists(store: &dyn Store) -> Result<User> {
    if let Some(admin) = store.user_by_matric(DEFAULT_ADMIN_MATRIC).await? {
        return Ok(admin);
    }
    let admin = User {
        id: store.next_id(IdKind::User).await?,
        matric_number: DEFAULT_ADMIN_MATRIC.to_string(),
        full_name: DEFAULT_ADMIN_NAME.to_string(),
        email: DEFAULT_ADMIN_EMAIL.to_string(),
        role: Role::Admin,
        is_verified: true,
        is_active: true,
    };
    store.insert_user(&admin).await?;
    warn!("Created default admin account (user {})", admin.id);
    Ok(admin)
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use super::*;

    impl Registration {
        pub fn example() -> Self {
            Self {
                matric_number: "CSC/2020/001".to_string(),
                full_name: "Amaka Obi".to_string(),
                email: "amaka.obi@student.example.edu".to_string(),
            }
        }

        pub fn example_n(n: u32) -> Self {
            Self {
                matric_number: format!("CSC/2020/{n:03}"),
                full_name: format!("Student {n}"),
                email: format!("student{n}@student.example.edu"),
            }
        }
    }

    impl User {
        /// A verified, active student.
        pub fn student_example(id: UserId) -> Self {
            let mut user = Registration::example_n(id).into_student(id);
            user.is_verified = true;
            user
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStore;

    #[test]
    fn registration_validation() {
        assert!(Registration::example().validate().is_ok());

        let mut reg = Registration::example();
        reg.matric_number = " ".to_string();
        assert!(reg.validate().is_err());

        let mut reg = Registration::example();
        reg.matric_number = "ADMIN".to_string();
        assert!(reg.validate().is_err());

        let mut reg = Registration::example();
        reg.email = "nope".to_string();
        assert!(reg.validate().is_err());
    }

    #[test]
    fn new_students_cannot_vote_until_verified() {
        let mut student = Registration::example().into_student(7);
        assert!(!student.can_vote());
        student.is_verified = true;
        assert!(student.can_vote());
        student.is_active = false;
        assert!(!student.can_vote());
    }

    #[rocket::async_test]
    async fn admin_is_created_once() {
        let store = MemoryStore::new();
        let first = ensure_admin_exists(&store).await.unwrap();
        let second = ensure_admin_exists(&store).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.role, Role::Admin);
        assert_eq!(store.users().await.unwrap().len(), 1);
    }
}
