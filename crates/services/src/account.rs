//! Profile and user administration.

use chrono::Utc;
use common::{Page, PageRequest, UserId};
use domain::{ProfileUpdate, PublicUser, Role, User};
use store::Store;

use crate::error::{Result, ServiceError};

/// Service for profiles and, for admins, the user list.
pub struct AccountService<S: Store> {
    store: S,
}

impl<S: Store> AccountService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_profile(&self, user_id: UserId) -> Result<PublicUser> {
        Ok(self.user(user_id).await?.public())
    }

    /// Updates name and phone, and merges address parts into the stored
    /// address.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<PublicUser> {
        let mut user = self.user(user_id).await?;
        user.update_profile(update, Utc::now())?;
        self.store.update_user(&user).await?;
        Ok(user.public())
    }

    /// Deletes the caller's account with their cart, orders and reviews.
    #[tracing::instrument(skip(self))]
    pub async fn delete_account(&self, user_id: UserId) -> Result<()> {
        self.delete_user(user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_users(&self, page: PageRequest) -> Result<Page<PublicUser>> {
        Ok(self.store.list_users(page).await?.map(|user| user.public()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, user_id: UserId) -> Result<PublicUser> {
        self.get_profile(user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_user_role(&self, user_id: UserId, role: Role) -> Result<PublicUser> {
        let mut user = self.user(user_id).await?;
        user.set_role(role, Utc::now());
        self.store.update_user(&user).await?;
        tracing::info!(user_id = %user.id, %role, "user role changed");
        Ok(user.public())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: UserId) -> Result<()> {
        if !self.store.delete_user(user_id).await? {
            return Err(user_not_found());
        }
        tracing::info!(user_id = %user_id, "user deleted");
        Ok(())
    }

    async fn user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(user_not_found)
    }
}

fn user_not_found() -> ServiceError {
    ServiceError::NotFound("User not found".to_string())
}
