//! Shared application state.

use services::{
    AccountService, Argon2PasswordService, AuthService, CartService, CatalogService,
    CheckoutService, JwtTokenService,
};
use store::Store;

use crate::config::Config;

/// Authentication service as wired into the server.
pub type Auth<S> = AuthService<S, JwtTokenService, Argon2PasswordService>;

/// Services shared by all route handlers.
pub struct AppState<S: Store> {
    pub auth: Auth<S>,
    pub accounts: AccountService<S>,
    pub catalog: CatalogService<S>,
    pub cart: CartService<S>,
    pub checkout: CheckoutService<S>,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(store: S, config: &Config) -> Self {
        let tokens = JwtTokenService::new(
            config.jwt_secret.clone(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        );

        Self {
            auth: AuthService::new(store.clone(), tokens, Argon2PasswordService::new()),
            accounts: AccountService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store, config.pricing),
        }
    }
}
