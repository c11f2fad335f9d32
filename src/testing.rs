//! Fixtures shared by unit and HTTP tests.

use std::sync::Arc;

use rocket::http::Header;
use rocket::local::asynchronous::Client;

use crate::config::{Config, StoreBackend};
use crate::credential::{PasswordHash, MIN_COST};
use crate::data::user::User;
use crate::resp::jwt::{TokenService, AUTH_HEADER_NAME};
use crate::role::Role;
use crate::security::Security;
use crate::store::{MemoryStore, SharedStore, UserStore};

pub const TEST_SECRET: &str = "test-only-secret";

pub fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

/// Password of every fixture user.
pub fn password_of(username: &str) -> String {
    format!("{}-pw", username)
}

pub async fn add_user(store: &SharedStore, username: &str, role: Role) -> User {
    let hash = PasswordHash::new(password_of(username), MIN_COST).expect("hashing works");
    let roll_number = match role {
        Role::Student => Some(format!("R-{}", username)),
        _ => None,
    };
    let user = User::new(username, format!("{}@example.com", username), hash, role)
        .with_roll_number(roll_number);

    store.insert_user(&user).await.expect("fixture user is stored");
    user
}

pub fn test_config() -> Config {
    Config {
        store: StoreBackend::Memory,
        jwt_secret: TEST_SECRET.to_string(),
        password_cost: MIN_COST,
        admin_usernames: vec!["root".to_string()],
        allowed_origins: Vec::new(),
        ..Config::default()
    }
}

pub async fn client(store: SharedStore) -> Client {
    let config = test_config();
    let security = Security::load(&config).expect("test settings are valid");
    let rocket = crate::build(config, security, store).expect("rocket builds");
    Client::tracked(rocket).await.expect("invalid backend")
}

pub fn bearer(client: &Client, user: &User) -> Header<'static> {
    let tokens: &TokenService = client.rocket().state().expect("token service is managed");
    let token = tokens.issue(user).expect("token is signed");
    Header::new(AUTH_HEADER_NAME, format!("Bearer {}", token))
}
