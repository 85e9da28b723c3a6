//! Application bootstrap
//!
//! [`Bootstrap`] assembles the configuration properties, lets every module
//! declare its bindings, validates all bound configuration types at once and
//! then provisions and starts the singletons.
//!
//! ```rust,ignore
//! let container = Bootstrap::new(vec![Box::new(AppModule) as Box<dyn Module>])
//!     .with_config_file("etc/config.properties")
//!     .strict_config()
//!     .initialize()?;
//! ```

mod column_printer;

use crate::configuration::{
    ConfigurationError, ConfigurationFactory, ConfigurationInspector, Problems, WarningsMonitor,
    load_properties_from, replace_environment_variables,
};
use crate::di::Container;
use crate::error::{KeystoneError, Result};
use crate::lifecycle::{ExitHooks, LifeCycleManager, ShutdownHandler};
use crate::logging;
use crate::module::Module;
use column_printer::ColumnPrinter;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "KEYSTONE_CONFIG";

const PROPERTY_NAME_COLUMN: &str = "PROPERTY";
const DEFAULT_VALUE_COLUMN: &str = "DEFAULT";
const CURRENT_VALUE_COLUMN: &str = "RUNTIME";
const DESCRIPTION_COLUMN: &str = "DESCRIPTION";

pub struct Bootstrap {
    modules: Vec<Box<dyn Module>>,
    required_properties: Option<BTreeMap<String, String>>,
    optional_properties: BTreeMap<String, String>,
    config_file: Option<PathBuf>,
    environment: Option<HashMap<String, String>>,
    initialize_logging: bool,
    quiet: bool,
    strict_config: bool,
    exit_on_signal: bool,
    exit_hooks: Arc<ExitHooks>,
    initialized: bool,
}

impl Bootstrap {
    pub fn new<I>(modules: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Module>>,
    {
        Self {
            modules: modules.into_iter().collect(),
            required_properties: None,
            optional_properties: BTreeMap::new(),
            config_file: None,
            environment: None,
            initialize_logging: true,
            quiet: false,
            strict_config: false,
            exit_on_signal: false,
            exit_hooks: ExitHooks::global(),
            initialized: false,
        }
    }

    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Set a property explicitly; once any is set, no configuration file is read.
    pub fn set_required_configuration_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.required_properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn set_required_configuration_properties(
        mut self,
        properties: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.required_properties
            .get_or_insert_with(BTreeMap::new)
            .extend(properties);
        self
    }

    /// Set a fallback value, overridden by required or file properties.
    pub fn set_optional_configuration_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.optional_properties.insert(key.into(), value.into());
        self
    }

    pub fn set_optional_configuration_properties(
        mut self,
        properties: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.optional_properties.extend(properties);
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Use `environment` instead of the process environment.
    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn do_not_initialize_logging(mut self) -> Self {
        self.initialize_logging = false;
        self
    }

    /// Do not log the effective configuration table.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Treat properties no configuration type consumed as errors.
    pub fn strict_config(mut self) -> Self {
        self.strict_config = true;
        self
    }

    /// Run the exit hooks and exit the process on Ctrl+C or SIGTERM.
    ///
    /// Only takes effect when `initialize` is called inside a tokio runtime.
    pub fn exit_on_signal(mut self) -> Self {
        self.exit_on_signal = true;
        self
    }

    /// Register the lifecycle manager's exit hook with `exit_hooks`
    /// instead of the process-wide registry.
    pub fn with_exit_hooks(mut self, exit_hooks: Arc<ExitHooks>) -> Self {
        self.exit_hooks = exit_hooks;
        self
    }

    /// The registry the lifecycle manager registers its exit hook with
    pub fn exit_hooks(&self) -> Arc<ExitHooks> {
        Arc::clone(&self.exit_hooks)
    }

    pub fn initialize(&mut self) -> Result<Container> {
        if self.initialized {
            return Err(KeystoneError::AlreadyInitialized);
        }
        self.initialized = true;

        if self.initialize_logging {
            logging::initialize_logging();
        }

        let environment = self
            .environment
            .clone()
            .unwrap_or_else(|| std::env::vars().collect());

        let mut problems = Problems::new();
        let properties = self.assemble_properties(&environment, &mut problems)?;

        let monitor: WarningsMonitor = Arc::new(|message: &str| tracing::warn!("{}", message));
        let configuration = Arc::new(ConfigurationFactory::new(properties).with_warnings_monitor(monitor));
        let lifecycle = LifeCycleManager::with_exit_hooks(self.exit_hooks());
        let mut container = Container::new(Arc::clone(&configuration), lifecycle);

        for module in &self.modules {
            module.configure(&mut container)?;
        }

        problems.extend(&configuration.validate_registered());

        for property in configuration.unused_properties() {
            let message = format!("Configuration property '{property}' was not used");
            if self.strict_config {
                problems.add_error(message);
            } else {
                tracing::warn!("{}", message);
                problems.add_warning(message);
            }
        }

        if !self.quiet {
            log_configuration(&configuration);
        }

        if problems.has_errors() {
            return Err(ConfigurationError::new(problems).into());
        }

        container.instantiate_singletons()?;

        let lifecycle = container.lifecycle();
        if lifecycle.size() > 0 {
            lifecycle.start()?;
        }

        if self.exit_on_signal {
            self.spawn_shutdown_handler();
        }

        Ok(container)
    }

    fn assemble_properties(
        &self,
        environment: &HashMap<String, String>,
        problems: &mut Problems,
    ) -> Result<BTreeMap<String, String>> {
        let mut properties = self.optional_properties.clone();
        match &self.required_properties {
            Some(required) => properties.extend(required.clone()),
            None => {
                let path = self
                    .config_file
                    .clone()
                    .or_else(|| environment.get(CONFIG_FILE_ENV).map(PathBuf::from));
                if let Some(path) = path {
                    tracing::info!("Loading configuration from {}", path.display());
                    properties.extend(load_properties_from(&path)?);
                }
            }
        }

        Ok(replace_environment_variables(
            properties,
            environment,
            |_, message| problems.add_error(message),
        ))
    }

    fn spawn_shutdown_handler(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No tokio runtime, shutdown signals are not handled");
            return;
        };
        let handler = ShutdownHandler::new(self.exit_hooks());
        runtime.spawn(async move {
            handler.wait_for_shutdown().await;
            std::process::exit(0);
        });
    }
}

fn log_configuration(configuration: &ConfigurationFactory) {
    let mut printer = ColumnPrinter::new([
        PROPERTY_NAME_COLUMN,
        DEFAULT_VALUE_COLUMN,
        CURRENT_VALUE_COLUMN,
        DESCRIPTION_COLUMN,
    ]);
    for record in ConfigurationInspector::inspect(configuration) {
        for attribute in record.attributes {
            printer.add_row([
                attribute.property_name,
                attribute.default_value,
                attribute.current_value,
                attribute.description,
            ]);
        }
    }
    for line in printer.lines() {
        tracing::info!("{}", line);
    }
}
