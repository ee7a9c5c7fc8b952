//! Process-wide registry mapping FREEZE class names to unmarshalers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{Result, SerealError};

/// Reconstructs a value from the opaque payload of a FREEZE token.
///
/// The counterpart of the encoder-side freeze hook: the payload bytes are
/// whatever the producing side serialized for this class.
pub trait FreezeUnmarshal {
    fn unmarshal_frozen(
        &mut self,
        payload: &[u8],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

type Factory = Arc<dyn Fn(&[u8]) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync>;

/// The class-name → factory table consulted for FREEZE tokens when the
/// destination has no unmarshaler of its own.
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Factory>>,
}

impl ClassRegistry {
    fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<ClassRegistry> = OnceLock::new();
        INSTANCE.get_or_init(ClassRegistry::new)
    }

    /// Registers `T` for `name`. A later registration for the same name
    /// replaces the earlier one.
    pub fn register<T>(&self, name: &str)
    where
        T: FreezeUnmarshal + Default + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |payload: &[u8]| {
            let mut value = T::default();
            value
                .unmarshal_frozen(payload)
                .map_err(|e| SerealError::UnmarshalerFailed {
                    class: String::new(),
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>)
        });
        self.classes
            .write()
            .unwrap()
            .insert(name.to_owned(), factory);
    }

    /// Runs the registered unmarshaler for `name`, if any.
    pub(crate) fn instantiate(
        &self,
        name: &str,
        payload: &[u8],
    ) -> Option<Result<Arc<dyn Any + Send + Sync>>> {
        let factory = self.classes.read().unwrap().get(name).cloned()?;
        Some(factory(payload).map_err(|e| match e {
            SerealError::UnmarshalerFailed { reason, .. } => SerealError::UnmarshalerFailed {
                class: name.to_owned(),
                reason,
            },
            other => other,
        }))
    }
}

/// Registers `T` as the unmarshaler for FREEZE payloads of class `name`.
pub fn register_class<T>(name: &str)
where
    T: FreezeUnmarshal + Default + Send + Sync + 'static,
{
    ClassRegistry::global().register::<T>(name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Blob {
        data: Vec<u8>,
    }

    impl FreezeUnmarshal for Blob {
        fn unmarshal_frozen(
            &mut self,
            payload: &[u8],
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.data = payload.to_vec();
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sour;

    impl FreezeUnmarshal for Sour {
        fn unmarshal_frozen(
            &mut self,
            _payload: &[u8],
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("always refuses".into())
        }
    }

    #[test]
    fn register_and_instantiate() {
        let registry = ClassRegistry::new();
        registry.register::<Blob>("Blob");
        let instance = registry.instantiate("Blob", b"xyz").unwrap().unwrap();
        assert_eq!(instance.downcast_ref::<Blob>().unwrap().data, b"xyz");
        assert!(registry.instantiate("Missing", b"").is_none());
    }

    #[test]
    fn unmarshal_failure_carries_class() {
        let registry = ClassRegistry::new();
        registry.register::<Sour>("Sour");
        let err = registry.instantiate("Sour", b"").unwrap().unwrap_err();
        match err {
            SerealError::UnmarshalerFailed { class, reason } => {
                assert_eq!(class, "Sour");
                assert!(reason.contains("refuses"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn concurrent_registration() {
        let registry: &'static ClassRegistry = Box::leak(Box::new(ClassRegistry::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    registry.register::<Blob>(&format!("Blob{i}"));
                    assert!(registry.instantiate(&format!("Blob{i}"), b"p").is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
