//! Wire DTOs shared with the contest backend, plus the role capability table.
//!
//! DESIGN
//! ======
//! Field names follow the backend's camelCase JSON. Roles are a closed enum so
//! authorization is decided once at the guard boundary instead of by string
//! comparison scattered across views. Unknown role strings degrade to
//! [`Role::User`], the least privileged variant.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// USER
// =============================================================================

/// The authenticated contest user as returned by `/api/users/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Backend user identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address used for both the identity provider and the backend.
    pub email: String,
    /// Avatar image URL, if any.
    #[serde(default)]
    pub photo: Option<String>,
    /// Platform role.
    #[serde(default)]
    pub role: Role,
    /// Number of contests joined.
    #[serde(default, deserialize_with = "deserialize_u64_from_number")]
    pub participation_count: u64,
    /// Number of contests won.
    #[serde(default, deserialize_with = "deserialize_u64_from_number")]
    pub win_count: u64,
    /// Free-form profile text.
    #[serde(default)]
    pub bio: Option<String>,
}

impl User {
    /// Whether this user's role grants `capability`.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }
}

// =============================================================================
// ROLE + CAPABILITIES
// =============================================================================

/// Platform role assigned by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    #[default]
    User,
    Creator,
    Admin,
}

/// Something a route or action may require of the current user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewDashboard,
    ParticipateContests,
    CreateContests,
    ManageOwnContests,
    ModerateUsers,
    ModerateContests,
}

const USER_CAPABILITIES: &[Capability] = &[Capability::ViewDashboard, Capability::ParticipateContests];

const CREATOR_CAPABILITIES: &[Capability] = &[
    Capability::ViewDashboard,
    Capability::ParticipateContests,
    Capability::CreateContests,
    Capability::ManageOwnContests,
];

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ViewDashboard,
    Capability::ParticipateContests,
    Capability::CreateContests,
    Capability::ManageOwnContests,
    Capability::ModerateUsers,
    Capability::ModerateContests,
];

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Creator => "creator",
            Self::Admin => "admin",
        }
    }

    /// Capability table for this role.
    #[must_use]
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::User => USER_CAPABILITIES,
            Self::Creator => CREATOR_CAPABILITIES,
            Self::Admin => ADMIN_CAPABILITIES,
        }
    }

    #[must_use]
    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Parse a wire role name, mapping anything unrecognized to [`Role::User`].
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "creator" => Self::Creator,
            _ => Self::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map_or(Self::User, Self::from_wire))
    }
}

impl Capability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewDashboard => "view_dashboard",
            Self::ParticipateContests => "participate_contests",
            Self::CreateContests => "create_contests",
            Self::ManageOwnContests => "manage_own_contests",
            Self::ModerateUsers => "moderate_users",
            Self::ModerateContests => "moderate_contests",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "view_dashboard" => Ok(Self::ViewDashboard),
            "participate_contests" => Ok(Self::ParticipateContests),
            "create_contests" => Ok(Self::CreateContests),
            "manage_own_contests" => Ok(Self::ManageOwnContests),
            "moderate_users" => Ok(Self::ModerateUsers),
            "moderate_contests" => Ok(Self::ModerateContests),
            _ => Err(format!("unknown capability: {raw}")),
        }
    }
}

// =============================================================================
// REQUEST / RESPONSE BODIES
// =============================================================================

/// Body of `POST /api/auth/register`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub photo: Option<String>,
}

/// Body of `POST /api/auth/login`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/auth/google`, minted from a completed federated sign-in.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginRequest {
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub id_token: String,
}

/// Body of `PATCH /api/users/me`. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.photo.is_none() && self.bio.is_none()
    }
}

/// Response of the register, login and federated login endpoints.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn deserialize_u64_from_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(0),
        serde_json::Value::Number(number) => {
            if let Some(int) = number.as_u64() {
                return Ok(int);
            }
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            if let Some(float) = number.as_f64()
                && float.is_finite()
                && float.fract() == 0.0
                && float >= 0.0
                && float <= u64::MAX as f64
            {
                return Ok(float as u64);
            }
            Err(D::Error::custom("expected non-negative integer"))
        }
        _ => Err(D::Error::custom("expected number")),
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
