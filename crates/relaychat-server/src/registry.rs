use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

/// A registered user.
#[derive(Clone, Debug)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: SystemTime,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("display name {0:?} is taken")]
    NameTaken(String),
    #[error("no user for the provided identity")]
    UnknownIdentity,
}

/// In-memory user registry: display name to identity to user record.
///
/// Names are unique for the process lifetime; users are never evicted.
/// A single mutex guards both maps so a registration is observed atomically.
pub struct UserRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// identity -> user
    users: HashMap<String, User>,
    /// display name -> identity
    ids: HashMap<String, String>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Mint a fresh identity for `name`, failing if the name is taken.
    pub fn register(&self, name: &str) -> Result<User, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if inner.ids.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: SystemTime::now(),
        };
        inner.ids.insert(user.name.clone(), user.id.clone());
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    pub fn resolve(&self, identity: &str) -> Result<User, RegistryError> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .users
            .get(identity)
            .cloned()
            .ok_or(RegistryError::UnknownIdentity)
    }

    /// Snapshot of all users, in no particular order.
    pub fn list(&self) -> Vec<User> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.users.values().cloned().collect()
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_names_get_distinct_identities() {
        let registry = UserRegistry::new();
        let alice = registry.register("alice").unwrap();
        let bob = registry.register("bob").unwrap();
        assert_ne!(alice.id, bob.id);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = UserRegistry::new();
        registry.register("alice").unwrap();
        assert_eq!(
            registry.register("alice").unwrap_err(),
            RegistryError::NameTaken("alice".to_string())
        );
    }

    #[test]
    fn resolve_round_trips() {
        let registry = UserRegistry::new();
        let alice = registry.register("alice").unwrap();
        let resolved = registry.resolve(&alice.id).unwrap();
        assert_eq!(resolved.name, "alice");
        assert_eq!(
            registry.resolve("no-such-identity").unwrap_err(),
            RegistryError::UnknownIdentity
        );
    }

    #[test]
    fn list_is_a_snapshot() {
        let registry = UserRegistry::new();
        registry.register("alice").unwrap();
        registry.register("bob").unwrap();
        let mut names: Vec<String> = registry.list().into_iter().map(|u| u.name).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
