//! Lifecycle Manager
//!
//! Runs the start hooks of every managed instance as it is added and the stop
//! hooks of every instance, in reverse order, when the manager stops.

use super::error::{LifeCycleError, LifeCycleStartError, LifeCycleStopError};
use super::identity::IdentityTracker;
use super::methods::{LifeCycleMethods, LifeCycleMethodsMap, invoke};
use super::shutdown::{ExitHookError, ExitHookId, ExitHooks, ProcessExit};
use crate::describe::{AnyInstance, Describe, short_type_name};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use strum_macros::{Display, FromRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum State {
    Latent,
    Starting,
    Started,
    Stopping,
    Stopped,
}

#[derive(Clone)]
struct ManagedInstance {
    type_name: String,
    object: Arc<AnyInstance>,
    methods: Arc<LifeCycleMethods>,
}

struct Inner {
    state: AtomicU8,
    managed: Mutex<Vec<ManagedInstance>>,
    methods_map: Arc<LifeCycleMethodsMap>,
    tracker: IdentityTracker,
    exit: Arc<dyn ProcessExit>,
    exit_hook: Mutex<Option<ExitHookId>>,
}

/// Manages the start/stop lifecycle of provisioned instances
///
/// The manager is a cheap handle; clones share the same state.
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::LifeCycleManager;
///
/// let manager = LifeCycleManager::new();
///
/// // start hooks run immediately
/// manager.add_instance(Arc::new(database))?;
/// manager.start()?;
/// // ... application runs ...
/// manager.stop()?;
/// ```
#[derive(Clone)]
pub struct LifeCycleManager {
    inner: Arc<Inner>,
}

impl Default for LifeCycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifeCycleManager {
    /// Create a manager whose exit hook is registered with [`ExitHooks::global`].
    pub fn new() -> Self {
        Self::with_exit_hooks(ExitHooks::global())
    }

    /// Create a manager whose exit hook is registered with `exit`.
    pub fn with_exit_hooks(exit: Arc<dyn ProcessExit>) -> Self {
        Self::with_parts(exit, Arc::new(LifeCycleMethodsMap::new()))
    }

    /// Create a manager sharing an existing hook cache.
    pub fn with_parts(exit: Arc<dyn ProcessExit>, methods_map: Arc<LifeCycleMethodsMap>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(State::Latent as u8),
                managed: Mutex::new(Vec::new()),
                methods_map,
                tracker: IdentityTracker::new(),
                exit,
                exit_hook: Mutex::new(None),
            }),
        }
    }

    /// Create a manager and add each of `instances`.
    pub fn with_instances<T, I>(instances: I) -> Result<Self, LifeCycleError>
    where
        T: Describe,
        I: IntoIterator<Item = Arc<T>>,
    {
        let manager = Self::new();
        for instance in instances {
            manager.add_instance(instance)?;
        }
        Ok(manager)
    }

    pub fn state(&self) -> State {
        State::from_repr(self.inner.state.load(Ordering::SeqCst)).unwrap_or(State::Stopped)
    }

    /// Number of instances waiting for their stop hooks
    pub fn size(&self) -> usize {
        self.managed().len()
    }

    /// Run the start hooks of `instance` and manage it until stop.
    ///
    /// An instance that is already managed is skipped, as is one without hooks.
    pub fn add_instance<T: Describe>(&self, instance: Arc<T>) -> Result<(), LifeCycleError> {
        let methods = self.inner.methods_map.get::<T>()?;
        self.add_resolved(short_type_name::<T>(), instance, methods)
    }

    fn add_resolved(
        &self,
        type_name: String,
        object: Arc<AnyInstance>,
        methods: Arc<LifeCycleMethods>,
    ) -> Result<(), LifeCycleError> {
        if matches!(self.state(), State::Stopping | State::Stopped) {
            return Err(LifeCycleError::Stopped);
        }
        if !methods.has_start() && !methods.has_stop() {
            return Ok(());
        }
        if self.inner.tracker.insert_erased(&object).is_none() {
            tracing::debug!("{} is already managed", type_name);
            return Ok(());
        }

        let instance = ManagedInstance {
            type_name,
            object,
            methods,
        };
        start_instance(&instance)?;
        if !instance.methods.has_stop() {
            return Ok(());
        }

        let mut managed = self.managed();
        // a stop that began while the start hooks ran has already taken its snapshot
        if matches!(self.state(), State::Stopping | State::Stopped) {
            drop(managed);
            stop_instance(&instance, &mut |type_name, method, error| {
                tracing::error!(
                    "Exception in pre-destroy method {}::{}(): {:#}",
                    type_name,
                    method,
                    error
                );
            });
            return Err(LifeCycleError::Stopped);
        }
        managed.push(instance);
        Ok(())
    }

    /// Move to started and register the exit hook.
    pub fn start(&self) -> Result<(), LifeCycleStartError> {
        if !self.transition(State::Latent, State::Starting) {
            return Err(LifeCycleStartError::new("System already starting"));
        }
        tracing::info!("Life cycle starting...");

        self.managed().retain(|instance| instance.methods.has_stop());

        let manager = Arc::downgrade(&self.inner);
        match self.inner.exit.register(Box::new(move || stop_on_exit(manager))) {
            Ok(id) => *self.exit_hook() = Some(id),
            Err(e) => tracing::debug!("Exit hook not registered: {}", e),
        }

        self.inner.state.store(State::Started as u8, Ordering::SeqCst);
        tracing::info!("Life cycle startup complete. System ready.");
        Ok(())
    }

    /// Stop every managed instance, logging each stop hook failure.
    ///
    /// The returned error carries no suppressed failures; they were logged.
    pub fn stop(&self) -> Result<(), LifeCycleStopError> {
        let mut failed = false;
        self.stop_with(&mut |type_name, method, error| {
            tracing::error!(
                "Exception in pre-destroy method {}::{}(): {:#}",
                type_name,
                method,
                error
            );
            failed = true;
        });
        if failed {
            Err(LifeCycleStopError::new(Vec::new()))
        } else {
            Ok(())
        }
    }

    /// Stop every managed instance, returning all stop hook failures.
    pub fn stop_without_failure_logging(&self) -> Result<(), LifeCycleStopError> {
        let mut failures = Vec::new();
        self.stop_with(&mut |type_name, method, error| {
            failures.push(error.context(format!(
                "Exception in pre-destroy method {type_name}::{method}()"
            )));
        });
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifeCycleStopError::new(failures))
        }
    }

    fn stop_with(&self, on_failure: &mut dyn FnMut(&str, &str, anyhow::Error)) {
        if !self.transition(State::Started, State::Stopping) {
            return;
        }

        if let Some(id) = self.exit_hook().take() {
            match self.inner.exit.deregister(id) {
                Ok(()) | Err(ExitHookError::AlreadyShuttingDown) => {}
                Err(e) => tracing::debug!("Exit hook not removed: {}", e),
            }
        }

        tracing::info!("Life cycle stopping...");
        let instances: Vec<ManagedInstance> = self.managed().clone();
        for instance in instances.iter().rev() {
            stop_instance(instance, on_failure);
        }

        self.inner.state.store(State::Stopped as u8, Ordering::SeqCst);
        tracing::info!("Life cycle stopped.");
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn managed(&self) -> MutexGuard<'_, Vec<ManagedInstance>> {
        self.inner
            .managed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn exit_hook(&self) -> MutexGuard<'_, Option<ExitHookId>> {
        self.inner
            .exit_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn stop_on_exit(manager: Weak<Inner>) {
    let Some(inner) = manager.upgrade() else {
        return;
    };
    tracing::info!("Process is shutting down, cleaning up");
    if let Err(e) = (LifeCycleManager { inner }).stop() {
        tracing::error!("Error during shutdown: {}", e);
    }
}

fn start_instance(instance: &ManagedInstance) -> Result<(), LifeCycleStartError> {
    tracing::debug!("Starting {}", instance.type_name);
    for method in instance.methods.start_methods() {
        tracing::debug!("\t{}()", method.name());
        let Err(cause) = invoke(method, instance.object.as_ref()) else {
            continue;
        };

        let type_name = &instance.type_name;
        let mut failure = LifeCycleStartError::with_cause(
            format!("Exception in post-construct method {type_name}::{}()", method.name()),
            cause,
        );
        stop_instance(instance, &mut |_, stop_method, error| {
            failure.add_suppressed(error.context(format!(
                "Exception in pre-destroy method {type_name}::{stop_method}() after post-construct failure in {type_name}::{}()",
                method.name()
            )));
        });
        return Err(failure);
    }
    Ok(())
}

fn stop_instance(instance: &ManagedInstance, on_failure: &mut dyn FnMut(&str, &str, anyhow::Error)) {
    tracing::debug!("Stopping {}", instance.type_name);
    for method in instance.methods.stop_methods() {
        tracing::debug!("\t{}()", method.name());
        if let Err(error) = invoke(method, instance.object.as_ref()) {
            on_failure(&instance.type_name, method.name(), error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{MethodDescriptor, TypeDescriptor};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Service {
        name: &'static str,
        log: Log,
        fail_start: bool,
        fail_stop: bool,
    }

    impl Service {
        fn new(name: &'static str, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                fail_start: false,
                fail_stop: false,
            })
        }

        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{event}{}", self.name));
        }

        fn start(&self) -> anyhow::Result<()> {
            self.record("start");
            if self.fail_start {
                anyhow::bail!("{} refused to start", self.name);
            }
            Ok(())
        }

        fn stop(&self) -> anyhow::Result<()> {
            self.record("stop");
            if self.fail_stop {
                anyhow::bail!("{} refused to stop", self.name);
            }
            Ok(())
        }
    }

    impl Describe for Service {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .method(MethodDescriptor::hook("start", Service::start).post_construct())
                .method(MethodDescriptor::hook("stop", Service::stop).pre_destroy())
                .build()
        }
    }

    /// Only a stop hook
    struct Sink {
        name: &'static str,
        log: Log,
    }

    impl Describe for Sink {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .method(
                    MethodDescriptor::hook("close", |sink: &Sink| {
                        sink.log.lock().unwrap().push(format!("stop{}", sink.name))
                    })
                    .pre_destroy(),
                )
                .build()
        }
    }

    struct NoHooks;
    impl Describe for NoHooks {}

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_start_in_add_order_and_stop_in_reverse() {
        let log = log();
        let manager = LifeCycleManager::new();
        manager.add_instance(Service::new("A", &log)).unwrap();
        manager.add_instance(Service::new("B", &log)).unwrap();
        assert_eq!(events(&log), vec!["startA", "startB"]);

        manager.start().unwrap();
        assert_eq!(manager.state(), State::Started);
        manager.stop().unwrap();
        assert_eq!(events(&log), vec!["startA", "startB", "stopB", "stopA"]);
        assert_eq!(manager.state(), State::Stopped);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let log = log();
        let manager = LifeCycleManager::new();
        manager.add_instance(Service::new("A", &log)).unwrap();
        manager.start().unwrap();
        manager.stop().unwrap();
        manager.stop().unwrap();
        assert_eq!(events(&log), vec!["startA", "stopA"]);
    }

    #[test]
    fn test_stop_before_start_does_nothing() {
        let log = log();
        let manager = LifeCycleManager::new();
        manager.add_instance(Service::new("A", &log)).unwrap();
        manager.stop().unwrap();
        assert_eq!(manager.state(), State::Latent);
        assert_eq!(events(&log), vec!["startA"]);
    }

    #[test]
    fn test_duplicate_instance_is_started_once() {
        let log = log();
        let manager = LifeCycleManager::new();
        let service = Service::new("A", &log);
        manager.add_instance(Arc::clone(&service)).unwrap();
        manager.add_instance(Arc::clone(&service)).unwrap();
        assert_eq!(manager.size(), 1);
        assert_eq!(events(&log), vec!["startA"]);
    }

    #[test]
    fn test_second_start_fails() {
        let manager = LifeCycleManager::new();
        manager.start().unwrap();
        let err = manager.start().unwrap_err();
        assert_eq!(err.message(), "System already starting");
    }

    #[test]
    fn test_add_after_stop_fails() {
        let manager = LifeCycleManager::new();
        manager.start().unwrap();
        manager.stop().unwrap();
        let err = manager.add_instance(Service::new("A", &log())).unwrap_err();
        assert!(matches!(err, LifeCycleError::Stopped));
    }

    #[test]
    fn test_instance_without_hooks_is_ignored() {
        let manager = LifeCycleManager::new();
        manager.add_instance(Arc::new(NoHooks)).unwrap();
        assert_eq!(manager.size(), 0);
    }

    #[test]
    fn test_stop_only_instance_is_managed() {
        let log = log();
        let manager = LifeCycleManager::new();
        manager.add_instance(Service::new("A", &log)).unwrap();
        manager
            .add_instance(Arc::new(Sink {
                name: "X",
                log: Arc::clone(&log),
            }))
            .unwrap();
        manager.add_instance(Service::new("B", &log)).unwrap();
        assert_eq!(manager.size(), 3);

        manager.start().unwrap();
        manager.stop().unwrap();
        manager.stop().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["startA", "startB", "stopB", "stopX", "stopA"]
        );
    }

    /// Stops its manager from inside its own start hook
    struct Stopper {
        manager: LifeCycleManager,
        log: Log,
    }

    impl Describe for Stopper {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .method(
                    MethodDescriptor::hook("start", |s: &Stopper| {
                        s.log.lock().unwrap().push("startC".into());
                        s.manager.stop()
                    })
                    .post_construct(),
                )
                .method(
                    MethodDescriptor::hook("stop", |s: &Stopper| {
                        s.log.lock().unwrap().push("stopC".into())
                    })
                    .pre_destroy(),
                )
                .build()
        }
    }

    #[test]
    fn test_instance_added_during_stop_is_stopped() {
        let log = log();
        let manager = LifeCycleManager::new();
        manager.add_instance(Service::new("A", &log)).unwrap();
        manager.start().unwrap();

        let stopper = Arc::new(Stopper {
            manager: manager.clone(),
            log: Arc::clone(&log),
        });
        let err = manager.add_instance(stopper).err().unwrap();
        assert!(matches!(err, LifeCycleError::Stopped));
        assert_eq!(manager.state(), State::Stopped);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["startA", "startC", "stopA", "stopC"]
        );
    }

    #[test]
    fn test_failed_start_runs_stop_hooks_with_suppressed_errors() {
        let log = log();
        let manager = LifeCycleManager::new();
        let broken = Arc::new(Service {
            name: "X",
            log: Arc::clone(&log),
            fail_start: true,
            fail_stop: true,
        });

        let err = manager.add_instance(broken).unwrap_err();
        let LifeCycleError::Start(start) = err else {
            panic!("expected a start error");
        };
        assert_eq!(start.message(), "Exception in post-construct method Service::start()");
        assert_eq!(start.cause().unwrap().to_string(), "X refused to start");
        assert_eq!(start.suppressed().len(), 1);
        assert_eq!(
            start.suppressed()[0].to_string(),
            "Exception in pre-destroy method Service::stop() after post-construct failure in Service::start()"
        );
        assert_eq!(events(&log), vec!["startX", "stopX"]);
        assert_eq!(manager.size(), 0);
    }

    #[test]
    fn test_stop_failures_logged_or_collected() {
        let log = log();
        let failing = |name| {
            Arc::new(Service {
                name,
                log: Arc::clone(&log),
                fail_start: false,
                fail_stop: true,
            })
        };

        let logging = LifeCycleManager::new();
        logging.add_instance(failing("A")).unwrap();
        logging.add_instance(failing("B")).unwrap();
        logging.start().unwrap();
        let err = logging.stop().unwrap_err();
        assert!(err.suppressed().is_empty());
        assert_eq!(logging.state(), State::Stopped);

        let collecting = LifeCycleManager::new();
        collecting.add_instance(failing("C")).unwrap();
        collecting.add_instance(failing("D")).unwrap();
        collecting.start().unwrap();
        let err = collecting.stop_without_failure_logging().unwrap_err();
        let messages: Vec<_> = err.suppressed().iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "Exception in pre-destroy method Service::stop()",
                "Exception in pre-destroy method Service::stop()"
            ]
        );
        assert_eq!(
            events(&log),
            vec!["startA", "startB", "stopB", "stopA", "startC", "startD", "stopD", "stopC"]
        );
    }

    #[test]
    fn test_exit_hook_stops_and_is_removed() {
        let hooks = Arc::new(ExitHooks::new());
        let log = log();
        let manager = LifeCycleManager::with_exit_hooks(hooks.clone());
        manager.add_instance(Service::new("A", &log)).unwrap();
        manager.start().unwrap();
        assert_eq!(hooks.len(), 1);

        hooks.run();
        assert_eq!(manager.state(), State::Stopped);
        assert_eq!(events(&log), vec!["startA", "stopA"]);
    }

    #[test]
    fn test_stop_deregisters_exit_hook() {
        let hooks = Arc::new(ExitHooks::new());
        let manager = LifeCycleManager::with_exit_hooks(hooks.clone());
        manager.start().unwrap();
        manager.stop().unwrap();
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_with_instances() {
        let log = log();
        let manager =
            LifeCycleManager::with_instances([Service::new("A", &log), Service::new("B", &log)])
                .unwrap();
        assert_eq!(manager.size(), 2);
        assert_eq!(manager.state().to_string(), "Latent");
    }

    #[test]
    fn test_concurrent_adds_start_once() {
        let log = log();
        let manager = LifeCycleManager::new();
        let service = Service::new("A", &log);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let manager = manager.clone();
                let service = Arc::clone(&service);
                scope.spawn(move || manager.add_instance(service).unwrap());
            }
        });
        assert_eq!(events(&log), vec!["startA"]);
        assert_eq!(manager.size(), 1);
    }
}
