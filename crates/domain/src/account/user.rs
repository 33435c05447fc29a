//! User accounts.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use super::AccountError;
use super::validation::{normalize_email, validate_max, validate_name, validate_phone};

/// Access level carried in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            _ => Err(AccountError::invalid(
                "role",
                "Role must be either customer or admin",
            )),
        }
    }
}

/// Postal address on a profile. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

impl Address {
    /// Overlays the parts present in `other`.
    pub fn merge(&mut self, other: Address) {
        let Address {
            street,
            city,
            state,
            zip_code,
            country,
        } = other;
        if street.is_some() {
            self.street = street;
        }
        if city.is_some() {
            self.city = city;
        }
        if state.is_some() {
            self.state = state;
        }
        if zip_code.is_some() {
            self.zip_code = zip_code;
        }
        if country.is_some() {
            self.country = country;
        }
    }

    fn validate(&self) -> Result<(), AccountError> {
        let parts = [
            ("address.street", &self.street, 100, "Street address"),
            ("address.city", &self.city, 50, "City name"),
            ("address.state", &self.state, 50, "State name"),
            ("address.zipCode", &self.zip_code, 20, "Zip code"),
            ("address.country", &self.country, 50, "Country name"),
        ];
        for (field, value, max, label) in parts {
            if let Some(value) = value {
                validate_max(field, value, max, label)?;
            }
        }
        Ok(())
    }
}

/// A registered user, including credentials.
///
/// Never serialized directly; use [`PublicUser`] for anything leaving the
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Always lower-case.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub is_email_verified: bool,
    pub refresh_token: Option<String>,
    /// SHA-256 hex of the outstanding reset token.
    pub reset_password_token_hash: Option<String>,
    pub reset_password_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
}

impl User {
    /// Creates a customer account. The password must already be hashed.
    pub fn register(
        name: &str,
        email: &str,
        password_hash: String,
        phone: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AccountError> {
        validate_name(name)?;
        let email = normalize_email(email)?;
        if let Some(phone) = &phone {
            validate_phone(phone)?;
        }

        Ok(Self {
            id: UserId::new(),
            name: name.trim().to_string(),
            email,
            password_hash,
            role: Role::Customer,
            phone: phone.map(|p| p.trim().to_string()),
            address: None,
            is_email_verified: false,
            refresh_token: None,
            reset_password_token_hash: None,
            reset_password_expires: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the password hash and ends every session.
    pub fn set_password(&mut self, password_hash: String, now: DateTime<Utc>) {
        self.password_hash = password_hash;
        self.refresh_token = None;
        self.reset_password_token_hash = None;
        self.reset_password_expires = None;
        self.updated_at = now;
    }

    pub fn set_refresh_token(&mut self, token: Option<String>, now: DateTime<Utc>) {
        self.refresh_token = token;
        self.updated_at = now;
    }

    pub fn start_password_reset(
        &mut self,
        token_hash: String,
        expires: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.reset_password_token_hash = Some(token_hash);
        self.reset_password_expires = Some(expires);
        self.updated_at = now;
    }

    /// True if `token_hash` matches the stored reset token and it has not expired.
    pub fn reset_token_matches(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        match (&self.reset_password_token_hash, self.reset_password_expires) {
            (Some(stored), Some(expires)) => stored == token_hash && expires > now,
            _ => false,
        }
    }

    /// Applies a profile update. Address parts are merged, not replaced.
    pub fn update_profile(
        &mut self,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(phone) = &update.phone {
            validate_phone(phone)?;
        }
        if let Some(address) = &update.address {
            address.validate()?;
        }

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(phone) = update.phone {
            self.phone = Some(phone.trim().to_string());
        }
        if let Some(address) = update.address {
            self.address.get_or_insert_with(Address::default).merge(address);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn set_role(&mut self, role: Role, now: DateTime<Utc>) {
        self.role = role;
        self.updated_at = now;
    }

    pub fn public(&self) -> PublicUser {
        PublicUser::from(self)
    }
}

/// The user as shown to clients, without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            phone: user.phone.clone(),
            address: user.address.clone(),
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
