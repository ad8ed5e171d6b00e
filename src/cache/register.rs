use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, RwLock},
};

use crate::cache::traits::SharedCache;
use crate::errors::Result;

pub type BoxedSharedCacheFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn SharedCache>>> + Send>>;
pub type SharedCacheConstructor = Arc<dyn Fn() -> BoxedSharedCacheFuture + Send + Sync>;

static SHARED_CACHE_REGISTRY: Lazy<RwLock<HashMap<String, SharedCacheConstructor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn register_shared_cache_plugin<S: Into<String>>(
    name: S,
    constructor: SharedCacheConstructor,
) {
    let name = name.into();
    let mut registry = SHARED_CACHE_REGISTRY
        .write()
        .expect("Shared cache registry RwLock poisoned - a thread panicked while holding the lock");
    registry.insert(name, constructor);
}

pub fn get_shared_cache_plugin(name: &str) -> Option<SharedCacheConstructor> {
    SHARED_CACHE_REGISTRY
        .read()
        .expect("Shared cache registry RwLock poisoned - a thread panicked while holding the lock")
        .get(name)
        .cloned()
}

pub fn debug_cache_registry() {
    let registry = SHARED_CACHE_REGISTRY
        .read()
        .expect("Shared cache registry RwLock poisoned");
    if registry.is_empty() {
        tracing::debug!("No shared cache plugins registered.");
    } else {
        tracing::debug!("Registered shared cache plugins:");
        for key in registry.keys() {
            tracing::debug!(" - {}", key);
        }
    }
}
