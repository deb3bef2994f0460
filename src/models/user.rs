//! User model
//!
//! This module defines the User entity and related types for the Tilldesk
//! back-office. Users are venue staff; the role determines which surfaces
//! they may touch (cashiers run tills, managers run schedules and reports).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Staff role
    pub role: UserRole,
    /// Whether the account may log in
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this
    /// function; use `services::password::hash_password()`.
    pub fn new(username: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            password_hash,
            role,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Check if the user is a manager (or higher)
    pub fn is_manager(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Manager)
    }

    /// Check if the user runs a till
    ///
    /// Only cashiers are subject to shift enforcement; managers and admins
    /// never get an open/close directive.
    pub fn is_cashier(&self) -> bool {
        self.role == UserRole::Cashier
    }
}

/// Staff role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Administrator - full access
    Admin,
    /// Manager - schedules, reports, all sessions
    Manager,
    /// Cashier - runs a till, subject to shift enforcement
    Cashier,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Cashier
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Manager => write!(f, "manager"),
            UserRole::Cashier => write!(f, "cashier"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "manager" => Ok(UserRole::Manager),
            "cashier" => Ok(UserRole::Cashier),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: UserRole) -> User {
        User::new("staff".to_string(), "hash".to_string(), role)
    }

    #[test]
    fn test_user_new() {
        let user = user_with_role(UserRole::Cashier);

        assert_eq!(user.id, 0);
        assert_eq!(user.username, "staff");
        assert_eq!(user.role, UserRole::Cashier);
        assert!(user.active);
    }

    #[test]
    fn test_role_predicates() {
        assert!(user_with_role(UserRole::Admin).is_admin());
        assert!(user_with_role(UserRole::Admin).is_manager());
        assert!(!user_with_role(UserRole::Admin).is_cashier());

        assert!(!user_with_role(UserRole::Manager).is_admin());
        assert!(user_with_role(UserRole::Manager).is_manager());

        assert!(user_with_role(UserRole::Cashier).is_cashier());
        assert!(!user_with_role(UserRole::Cashier).is_manager());
    }

    #[test]
    fn test_user_role_display() {
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert_eq!(UserRole::Manager.to_string(), "manager");
        assert_eq!(UserRole::Cashier.to_string(), "cashier");
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("admin").unwrap(), UserRole::Admin);
        assert_eq!(UserRole::from_str("MANAGER").unwrap(), UserRole::Manager);
        assert_eq!(UserRole::from_str("Cashier").unwrap(), UserRole::Cashier);
        assert!(UserRole::from_str("waiter").is_err());
    }

    #[test]
    fn test_user_role_default() {
        assert_eq!(UserRole::default(), UserRole::Cashier);
    }
}
