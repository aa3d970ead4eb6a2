//! Service registry - Owns the registered services in registration order

use tracing::{debug, info, warn};

use super::trait_def::{ApplicationService, ServiceKey};
use crate::application::errors::BotError;

struct Slot {
    id: &'static str,
    // empty while the service is running its own hook
    service: Option<Box<dyn ApplicationService>>,
}

/// Registry for the bot's services, keyed by [`ServiceKey::ID`]
#[derive(Default)]
pub struct ServiceRegistry {
    slots: Vec<Slot>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Returns `false` if its id is already taken.
    pub fn add<T>(&mut self, service: T) -> bool
    where
        T: ApplicationService + ServiceKey,
    {
        if self.contains(T::ID) {
            debug!("Service '{}' already registered, ignoring", T::ID);
            return false;
        }
        info!("Registering service: {}", T::ID);
        self.slots.push(Slot {
            id: T::ID,
            service: Some(Box::new(service)),
        });
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    /// Look up a service by type. `None` while that service is mid-hook.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: ApplicationService + ServiceKey,
    {
        self.slots
            .iter()
            .find(|s| s.id == T::ID)?
            .service
            .as_deref()?
            .as_any()
            .downcast_ref::<T>()
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: ApplicationService + ServiceKey,
    {
        self.slots
            .iter_mut()
            .find(|s| s.id == T::ID)?
            .service
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ask every available service to write its state. Returns the ones that
    /// failed.
    pub fn persist_all(&mut self) -> Vec<(&'static str, BotError)> {
        let mut failures = Vec::new();
        for slot in &mut self.slots {
            let Some(service) = slot.service.as_mut() else {
                continue;
            };
            if let Err(e) = service.persist() {
                warn!("Service '{}' could not persist: {}", slot.id, e);
                failures.push((slot.id, e));
            }
        }
        failures
    }

    pub(crate) fn id_at(&self, index: usize) -> Option<&'static str> {
        self.slots.get(index).map(|s| s.id)
    }

    /// Move the service at `index` out so it can borrow the others
    pub(crate) fn take(&mut self, index: usize) -> Option<Box<dyn ApplicationService>> {
        self.slots.get_mut(index)?.service.take()
    }

    pub(crate) fn restore(&mut self, index: usize, service: Box<dyn ApplicationService>) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.service = Some(service);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha(u32);
    impl ServiceKey for Alpha {
        const ID: &'static str = "alpha";
    }
    impl ApplicationService for Alpha {}

    struct Beta;
    impl ServiceKey for Beta {
        const ID: &'static str = "beta";
    }
    impl ApplicationService for Beta {
        fn persist(&mut self) -> Result<(), BotError> {
            Err(BotError::Internal("disk full".to_string()))
        }
    }

    #[test]
    fn duplicate_id_is_ignored() {
        let mut registry = ServiceRegistry::new();
        assert!(registry.add(Alpha(1)));
        assert!(!registry.add(Alpha(2)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get::<Alpha>().map(|a| a.0), Some(1));
    }

    #[test]
    fn typed_lookup_and_order() {
        let mut registry = ServiceRegistry::new();
        registry.add(Beta);
        registry.add(Alpha(0));
        assert_eq!(registry.ids(), vec!["beta", "alpha"]);

        registry.get_mut::<Alpha>().unwrap().0 = 9;
        assert_eq!(registry.get::<Alpha>().unwrap().0, 9);
        assert!(registry.get::<Beta>().is_some());
    }

    #[test]
    fn taken_service_is_hidden_until_restored() {
        let mut registry = ServiceRegistry::new();
        registry.add(Alpha(3));

        let taken = registry.take(0).unwrap();
        assert!(registry.get::<Alpha>().is_none());
        assert_eq!(registry.id_at(0), Some("alpha"));

        registry.restore(0, taken);
        assert_eq!(registry.get::<Alpha>().unwrap().0, 3);
    }

    #[test]
    fn persist_all_reports_failures_and_skips_taken_slots() {
        let mut registry = ServiceRegistry::new();
        registry.add(Alpha(0));
        registry.add(Beta);

        let failures = registry.persist_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "beta");

        let taken = registry.take(1).unwrap();
        assert!(registry.persist_all().is_empty());
        registry.restore(1, taken);
    }
}
