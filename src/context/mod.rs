//! Per-request context: URL variables plus a typed environment.
//!
//! A fresh [`Context`] is created for every request the router dispatches. The
//! router fills [`UrlParams`] from the matched pattern; middleware and handlers
//! share data through the [`Env`].
//!
//! ## Capability keys
//!
//! [`Env`] entries are addressed by values of a type implementing [`EnvKey`]. A
//! module that keeps its key type private and exports accessor functions decides
//! who may read and write its data:
//!
//! ```
//! use rttp_web::context::Context;
//!
//! mod auth {
//!     use rttp_web::context::{Context, EnvKey};
//!
//!     #[derive(PartialEq, Eq, Hash)]
//!     struct UserKey;
//!
//!     impl EnvKey for UserKey {
//!         type Value = String;
//!     }
//!
//!     pub fn set_user(ctx: &mut Context, user: &str) {
//!         ctx.env_mut().insert(UserKey, user.to_owned());
//!     }
//!
//!     pub fn user(ctx: &Context) -> Option<&str> {
//!         ctx.env().get(&UserKey).map(String::as_str)
//!     }
//! }
//!
//! let mut ctx = Context::default();
//! auth::set_user(&mut ctx, "carl");
//! assert_eq!(auth::user(&ctx), Some("carl"));
//! ```

use std::{
    any::{Any, TypeId},
    collections::{HashMap, hash_map},
    fmt,
    hash::Hash,
};

/// Variables bound by the matched route pattern.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct UrlParams {
    map: HashMap<String, String>,
}

impl UrlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `value`, replacing an earlier binding of the same name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for UrlParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A key type for the [`Env`].
///
/// Every value of the key type names one entry; unit structs give a single entry,
/// enums or newtypes give a family of them. `Value` fixes what the entry holds.
pub trait EnvKey: Eq + Hash + Send + Sync + 'static {
    type Value: Send + Sync + 'static;
}

/// Request-scoped storage shared by all middleware and the final handler.
///
/// Entries are namespaced by key type, so two modules that both use `"user"`-like
/// keys never collide unless they share the key type itself.
#[derive(Default)]
pub struct Env {
    // TypeId of K -> HashMap<K, K::Value>
    slots: HashMap<TypeId, Box<dyn Slot>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn insert<K: EnvKey>(&mut self, key: K, value: K::Value) -> Option<K::Value> {
        self.slot_mut::<K>().insert(key, value)
    }

    pub fn get<K: EnvKey>(&self, key: &K) -> Option<&K::Value> {
        self.slot::<K>()?.get(key)
    }

    pub fn get_mut<K: EnvKey>(&mut self, key: &K) -> Option<&mut K::Value> {
        self.slots
            .get_mut(&TypeId::of::<K>())?
            .as_any_mut()
            .downcast_mut::<HashMap<K, K::Value>>()?
            .get_mut(key)
    }

    /// Return the entry for `key`, inserting `make()` first if it is missing.
    pub fn get_or_insert_with<K, F>(&mut self, key: K, make: F) -> &mut K::Value
    where
        K: EnvKey,
        F: FnOnce() -> K::Value,
    {
        match self.slot_mut::<K>().entry(key) {
            hash_map::Entry::Occupied(entry) => entry.into_mut(),
            hash_map::Entry::Vacant(entry) => entry.insert(make()),
        }
    }

    pub fn remove<K: EnvKey>(&mut self, key: &K) -> Option<K::Value> {
        self.slots
            .get_mut(&TypeId::of::<K>())?
            .as_any_mut()
            .downcast_mut::<HashMap<K, K::Value>>()?
            .remove(key)
    }

    pub fn contains<K: EnvKey>(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Total number of entries across all key types.
    pub fn len(&self) -> usize {
        self.slots.values().map(|slot| slot.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot<K: EnvKey>(&self) -> Option<&HashMap<K, K::Value>> {
        self.slots
            .get(&TypeId::of::<K>())?
            .as_any()
            .downcast_ref::<HashMap<K, K::Value>>()
    }

    fn slot_mut<K: EnvKey>(&mut self) -> &mut HashMap<K, K::Value> {
        let slot = self
            .slots
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(HashMap::<K, K::Value>::new()) as Box<dyn Slot>);
        match slot.as_any_mut().downcast_mut::<HashMap<K, K::Value>>() {
            Some(map) => map,
            // The slot under TypeId::of::<K>() is only ever created just above.
            None => unreachable!("env slot holds a foreign map type"),
        }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("key_types", &self.slots.len())
            .field("entries", &self.len())
            .finish()
    }
}

// Type-erased view of one key type's map.
trait Slot: Send + Sync {
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K: EnvKey> Slot for HashMap<K, K::Value> {
    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-request carrier of URL variables and the environment.
///
/// Created empty for each request and dropped when the request's chain finishes.
#[derive(Default, Debug)]
pub struct Context {
    url_params: UrlParams,
    env: Env,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose URL parameters come from a pattern match.
    pub fn with_params(url_params: UrlParams) -> Self {
        Self {
            url_params,
            env: Env::new(),
        }
    }

    pub fn url_params(&self) -> &UrlParams {
        &self.url_params
    }

    pub fn url_params_mut(&mut self) -> &mut UrlParams {
        &mut self.url_params
    }

    /// Shorthand for `ctx.url_params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.url_params.get(name)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct RequestId;

    impl EnvKey for RequestId {
        type Value = u64;
    }

    #[derive(Debug, PartialEq, Eq, Hash)]
    enum Flag {
        Beta,
        Debug,
    }

    impl EnvKey for Flag {
        type Value = bool;
    }

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Label(&'static str);

    impl EnvKey for Label {
        type Value = String;
    }

    #[test]
    fn url_params_last_insert_wins() {
        let mut params = UrlParams::new();
        params.insert("x", "a");
        params.insert("x", "b");
        assert_eq!(params.get("x"), Some("b"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn url_params_collect() {
        let params: UrlParams = [("name", "carl"), ("*", "/projects")].into_iter().collect();
        assert_eq!(params.get("name"), Some("carl"));
        assert_eq!(params.get("*"), Some("/projects"));
        assert!(!params.contains("id"));
    }

    #[test]
    fn env_typed_round_trip() {
        let mut env = Env::new();
        assert_eq!(env.insert(RequestId, 7), None);
        assert_eq!(env.insert(RequestId, 8), Some(7));
        assert_eq!(env.get(&RequestId), Some(&8));
    }

    #[test]
    fn env_value_keys_form_a_family() {
        let mut env = Env::new();
        env.insert(Flag::Beta, true);
        env.insert(Flag::Debug, false);
        env.insert(Label("region"), "eu".to_owned());
        assert_eq!(env.get(&Flag::Beta), Some(&true));
        assert_eq!(env.get(&Flag::Debug), Some(&false));
        assert_eq!(env.get(&Label("region")).map(String::as_str), Some("eu"));
        assert_eq!(env.get(&Label("zone")), None);
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn env_mutation_and_removal() {
        let mut env = Env::new();
        *env.get_or_insert_with(RequestId, || 1) += 10;
        *env.get_or_insert_with(RequestId, || 100) += 1;
        assert_eq!(env.get(&RequestId), Some(&12));
        if let Some(id) = env.get_mut(&RequestId) {
            *id = 0;
        }
        assert_eq!(env.remove(&RequestId), Some(0));
        assert!(!env.contains(&RequestId));
        assert!(env.is_empty());
    }

    #[test]
    fn context_starts_empty() {
        let ctx = Context::new();
        assert!(ctx.url_params().is_empty());
        assert!(ctx.env().is_empty());
    }

    #[test]
    fn context_with_params_exposes_bindings() {
        let ctx = Context::with_params([("id", "42")].into_iter().collect());
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.param("missing"), None);
    }
}
