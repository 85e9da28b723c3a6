use crate::configuration::ConfigurationFactory;
use crate::describe::{AnyInstance, Describe};
use crate::error::{KeystoneError, Result};
use crate::lifecycle::LifeCycleManager;
use dashmap::DashMap;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

type ProvisionFn = Arc<dyn Fn(&Container) -> Result<Arc<AnyInstance>> + Send + Sync>;
type ManageFn = Arc<dyn Fn(&LifeCycleManager, Arc<AnyInstance>) -> Result<()> + Send + Sync>;

thread_local! {
    static RESOLVING: RefCell<Vec<(TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone)]
struct Binding {
    type_name: &'static str,
    provision: ProvisionFn,
    manage: ManageFn,
}

/// Singleton container.
///
/// Bindings are declared while modules configure the container; resolution
/// is thread-safe afterwards. Every singleton is handed to the lifecycle
/// manager when it is first provisioned.
pub struct Container {
    bindings: HashMap<TypeId, Binding>,
    order: Vec<TypeId>,
    singletons: DashMap<TypeId, Arc<AnyInstance>>,
    configuration: Arc<ConfigurationFactory>,
    lifecycle: LifeCycleManager,
}

impl Container {
    pub fn new(configuration: Arc<ConfigurationFactory>, lifecycle: LifeCycleManager) -> Self {
        Self {
            bindings: HashMap::new(),
            order: Vec::new(),
            singletons: DashMap::new(),
            configuration,
            lifecycle,
        }
    }

    pub fn configuration(&self) -> &Arc<ConfigurationFactory> {
        &self.configuration
    }

    pub fn lifecycle(&self) -> &LifeCycleManager {
        &self.lifecycle
    }

    /// Bind the configuration type `T`, built from unprefixed properties.
    pub fn bind_config<T: Describe>(&mut self) -> &mut Self {
        self.bind_config_with_prefix::<T>(None)
    }

    /// Bind the configuration type `T`, built from properties under `prefix`.
    pub fn bind_config_with_prefix<T: Describe>(&mut self, prefix: Option<&str>) -> &mut Self {
        self.configuration.register::<T>(prefix);
        let prefix = prefix.map(str::to_string);
        self.bind::<T>(Arc::new(move |container: &Container| {
            let config = container.configuration.get::<T>(prefix.as_deref())?;
            Ok(config as Arc<AnyInstance>)
        }))
    }

    pub fn bind_instance<T: Describe>(&mut self, instance: Arc<T>) -> &mut Self {
        self.bind::<T>(Arc::new(move |_: &Container| {
            Ok(Arc::clone(&instance) as Arc<AnyInstance>)
        }))
    }

    pub fn bind_provider<T, F>(&mut self, provider: F) -> &mut Self
    where
        T: Describe,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.bind::<T>(Arc::new(move |container: &Container| {
            Ok(Arc::new(provider(container)?) as Arc<AnyInstance>)
        }))
    }

    fn bind<T: Describe>(&mut self, provision: ProvisionFn) -> &mut Self {
        let type_id = TypeId::of::<T>();
        let manage: ManageFn = Arc::new(|lifecycle: &LifeCycleManager, instance: Arc<AnyInstance>| {
            let instance = instance.downcast::<T>().map_err(|_| KeystoneError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            })?;
            lifecycle.add_instance(instance)?;
            Ok(())
        });
        let binding = Binding {
            type_name: std::any::type_name::<T>(),
            provision,
            manage,
        };
        if self.bindings.insert(type_id, binding).is_none() {
            self.order.push(type_id);
        }
        self
    }

    pub fn resolve<T: Describe>(&self) -> Result<Arc<T>> {
        self.resolve_erased(TypeId::of::<T>(), std::any::type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| KeystoneError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    fn resolve_erased(&self, type_id: TypeId, type_name: &'static str) -> Result<Arc<AnyInstance>> {
        if let Some(found) = self.singletons.get(&type_id) {
            return Ok(Arc::clone(found.value()));
        }
        let binding = self
            .bindings
            .get(&type_id)
            .ok_or_else(|| KeystoneError::DependencyNotFound {
                type_name: type_name.to_string(),
            })?;

        let created = {
            let _guard = ResolvingGuard::enter(type_id, binding.type_name)?;
            (binding.provision)(self)?
        };

        // concurrent provisioning keeps the first stored instance; the loser
        // is still offered to the lifecycle, which has already seen the winner
        let winner = Arc::clone(self.singletons.entry(type_id).or_insert(created).value());
        if let Err(e) = (binding.manage)(&self.lifecycle, Arc::clone(&winner)) {
            // a singleton that failed to start is provisioned again on the next resolve
            self.singletons
                .remove_if(&type_id, |_, stored| Arc::ptr_eq(stored, &winner));
            return Err(e);
        }
        Ok(winner)
    }

    /// Provision every bound singleton in binding order.
    pub fn instantiate_singletons(&self) -> Result<()> {
        for type_id in &self.order {
            if let Some(binding) = self.bindings.get(type_id) {
                tracing::debug!("Provisioning {}", binding.type_name);
                self.resolve_erased(*type_id, binding.type_name)?;
            }
        }
        Ok(())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new(Arc::new(ConfigurationFactory::default()), LifeCycleManager::new())
    }
}

/// Marks a type as being provisioned on this thread.
struct ResolvingGuard;

impl ResolvingGuard {
    fn enter(type_id: TypeId, type_name: &'static str) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|(id, _)| *id == type_id) {
                let cycle = stack[start..]
                    .iter()
                    .map(|(_, name)| *name)
                    .chain(std::iter::once(type_name))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(KeystoneError::CircularDependency { cycle });
            }
            stack.push((type_id, type_name));
            Ok(ResolvingGuard)
        })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{MethodDescriptor, TypeDescriptor};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct HttpConfig {
        port: i32,
    }

    impl Describe for HttpConfig {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .constructor(HttpConfig::default)
                .method(
                    MethodDescriptor::setter("set_port", |c: &mut HttpConfig, v: i32| c.port = v)
                        .config("port"),
                )
                .build()
        }
    }

    struct Server {
        port: i32,
        started: AtomicUsize,
    }

    impl Describe for Server {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .method(
                    MethodDescriptor::hook("start", |s: &Server| {
                        s.started.fetch_add(1, Ordering::SeqCst);
                    })
                    .post_construct(),
                )
                .method(MethodDescriptor::hook("stop", |_: &Server| ()).pre_destroy())
                .build()
        }
    }

    struct Ping;
    impl Describe for Ping {}

    struct Pong;
    impl Describe for Pong {}

    fn container(pairs: &[(&str, &str)]) -> Container {
        let properties: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Container::new(
            Arc::new(ConfigurationFactory::new(properties)),
            LifeCycleManager::new(),
        )
    }

    #[test]
    fn test_provider_uses_bound_config_and_is_started() {
        let mut container = container(&[("http.port", "8080")]);
        container
            .bind_config_with_prefix::<HttpConfig>(Some("http"))
            .bind_provider(|c: &Container| {
                Ok(Server {
                    port: c.resolve::<HttpConfig>()?.port,
                    started: AtomicUsize::new(0),
                })
            });

        let server = container.resolve::<Server>().unwrap();
        let again = container.resolve::<Server>().unwrap();
        assert!(Arc::ptr_eq(&server, &again));
        assert_eq!(server.port, 8080);
        assert_eq!(server.started.load(Ordering::SeqCst), 1);
        assert_eq!(container.lifecycle().size(), 1);
    }

    #[test]
    fn test_missing_binding() {
        let container = Container::default();
        let err = container.resolve::<Ping>().err().unwrap();
        assert!(matches!(err, KeystoneError::DependencyNotFound { .. }));
    }

    #[test]
    fn test_configuration_errors_surface_on_resolve() {
        let mut container = container(&[]);
        container.bind_config::<HttpConfig>();
        container.bind_config_with_prefix::<HttpConfig>(Some("x"));
        assert_eq!(container.len(), 1);

        let mut broken = self::container(&[("port", "abc")]);
        broken.bind_config::<HttpConfig>();
        let err = broken.resolve::<HttpConfig>().err().unwrap();
        assert!(matches!(err, KeystoneError::Configuration(_)));
    }

    #[test]
    fn test_bound_instance_started_once() {
        let server = Arc::new(Server {
            port: 1,
            started: AtomicUsize::new(0),
        });
        let mut container = Container::default();
        container.bind_instance(Arc::clone(&server));
        container.instantiate_singletons().unwrap();
        container.resolve::<Server>().unwrap();
        assert_eq!(server.started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_resolution_starts_one_instance() {
        let provisions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&provisions);
        let mut container = Container::default();
        container.bind_provider(move |_: &Container| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Server {
                port: 0,
                started: AtomicUsize::new(0),
            })
        });

        let resolved: Vec<Arc<Server>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| container.resolve::<Server>().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(resolved.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(resolved[0].started.load(Ordering::SeqCst), 1);
        assert_eq!(container.lifecycle().size(), 1);
        assert!(provisions.load(Ordering::SeqCst) >= 1);
    }

    struct Flaky {
        healthy: bool,
    }

    impl Describe for Flaky {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .method(
                    MethodDescriptor::hook("start", |f: &Flaky| {
                        if f.healthy {
                            Ok(())
                        } else {
                            Err(anyhow::anyhow!("not ready"))
                        }
                    })
                    .post_construct(),
                )
                .method(MethodDescriptor::hook("stop", |_: &Flaky| ()).pre_destroy())
                .build()
        }
    }

    #[test]
    fn test_failed_start_is_not_cached() {
        let provisions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&provisions);
        let mut container = Container::default();
        container.bind_provider(move |_: &Container| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Flaky { healthy: attempt > 0 })
        });

        let err = container.resolve::<Flaky>().err().unwrap();
        assert!(matches!(err, KeystoneError::LifeCycle(_)), "{err:?}");
        assert_eq!(container.lifecycle().size(), 0);

        let flaky = container.resolve::<Flaky>().unwrap();
        assert!(flaky.healthy);
        assert_eq!(provisions.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&flaky, &container.resolve::<Flaky>().unwrap()));
        assert_eq!(container.lifecycle().size(), 1);
    }

    #[test]
    fn test_circular_dependency() {
        let mut container = Container::default();
        container
            .bind_provider(|c: &Container| c.resolve::<Pong>().map(|_| Ping))
            .bind_provider(|c: &Container| c.resolve::<Ping>().map(|_| Pong));

        let err = container.resolve::<Ping>().err().unwrap();
        let KeystoneError::CircularDependency { cycle } = err else {
            panic!("expected a cycle");
        };
        assert!(cycle.ends_with("Ping"));
        assert_eq!(cycle.matches("->").count(), 2);
    }
}
