//! Type-keyed storage for per-request and per-response state.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
};

/// Type-erased extensions map, at most one value per type.
///
/// Middleware uses it to attach state to a value in flight without the
/// request or response types knowing about it, e.g. the lifetime an etag
/// should be remembered for.
///
/// # Examples
///
/// ```
/// use rttp_caching::http::Extensions;
///
/// #[derive(Debug, PartialEq)]
/// struct Attempt(u32);
///
/// let mut ext = Extensions::new();
/// ext.insert(Attempt(1));
/// assert_eq!(ext.get::<Attempt>(), Some(&Attempt(1)));
/// assert_eq!(ext.remove::<Attempt>(), Some(Attempt(1)));
/// assert!(ext.is_empty());
/// ```
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Removes and returns the value of type `T`, if present.
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}
