use keystone::lifecycle::State;
use keystone::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Default, Config)]
pub struct HttpConfig {
    #[config(name = "port", required)]
    port: i32,
    #[config(name = "host", default_value = "127.0.0.1")]
    host: String,
}

pub struct Repository {
    events: Arc<Mutex<Vec<String>>>,
}

#[lifecycle]
impl Repository {
    #[post_construct]
    pub fn open(&self) {
        self.events.lock().unwrap().push("open repository".into());
    }

    #[pre_destroy]
    pub fn close(&self) {
        self.events.lock().unwrap().push("close repository".into());
    }
}

pub struct HttpServer {
    address: String,
    repository: Arc<Repository>,
}

#[lifecycle]
impl HttpServer {
    #[post_construct]
    pub fn listen(&self) {
        self.repository
            .events
            .lock()
            .unwrap()
            .push(format!("listen {}", self.address));
    }

    #[pre_destroy]
    pub fn shutdown(&self) {
        self.repository.events.lock().unwrap().push("shutdown".into());
    }
}

struct PersistenceModule {
    events: Arc<Mutex<Vec<String>>>,
}

impl Module for PersistenceModule {
    fn configure(&self, container: &mut Container) -> Result<()> {
        container.bind_instance(Arc::new(Repository {
            events: Arc::clone(&self.events),
        }));
        Ok(())
    }
}

fn http_module(container: &mut Container) -> Result<()> {
    container
        .bind_config_with_prefix::<HttpConfig>(Some("http"))
        .bind_provider(|c: &Container| {
            let config = c.resolve::<HttpConfig>()?;
            Ok(HttpServer {
                address: format!("{}:{}", config.host, config.port),
                repository: c.resolve::<Repository>()?,
            })
        });
    Ok(())
}

fn application(events: &Arc<Mutex<Vec<String>>>) -> Bootstrap {
    Bootstrap::new(vec![
        Box::new(PersistenceModule {
            events: Arc::clone(events),
        }) as Box<dyn Module>,
        Box::new(http_module),
    ])
    .with_environment(HashMap::new())
    .with_exit_hooks(Arc::new(ExitHooks::new()))
    .do_not_initialize_logging()
}

#[test]
fn test_application_starts_and_stops_in_order() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let container = application(&events)
        .set_required_configuration_property("http.port", "8080")
        .initialize()
        .unwrap();

    let lifecycle = container.lifecycle();
    assert_eq!(lifecycle.state(), State::Started);
    assert_eq!(lifecycle.size(), 2);

    lifecycle.stop().unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "open repository",
            "listen 127.0.0.1:8080",
            "shutdown",
            "close repository",
        ]
    );
}

#[test]
fn test_exit_hooks_stop_the_application() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut bootstrap = application(&events).set_required_configuration_property("http.port", "1");
    let exit_hooks = bootstrap.exit_hooks();
    let container = bootstrap.initialize().unwrap();

    exit_hooks.run();
    assert_eq!(container.lifecycle().state(), State::Stopped);
    assert_eq!(events.lock().unwrap().last().map(String::as_str), Some("close repository"));
}

#[test]
fn test_toml_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[http]\nport = 9000\nhost = \"0.0.0.0\"").unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let container = application(&events)
        .quiet()
        .with_config_file(file.path())
        .initialize()
        .unwrap();

    let server = container.resolve::<HttpServer>().unwrap();
    assert_eq!(server.address, "0.0.0.0:9000");
}

#[test]
fn test_configuration_errors_prevent_startup() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let err = application(&events)
        .quiet()
        .strict_config()
        .set_required_configuration_property("http.port", "eighty")
        .set_required_configuration_property("http.unknown", "x")
        .initialize()
        .err()
        .unwrap();

    let KeystoneError::Configuration(configuration) = err else {
        panic!("expected configuration errors");
    };
    assert_eq!(
        configuration.errors(),
        [
            "Could not coerce value 'eighty' to i32 (property 'http.port') in order to call [HttpConfig::set_port(i32)]".to_string(),
            "Configuration property 'http.unknown' was not used".to_string(),
        ]
    );
    assert!(events.lock().unwrap().is_empty());
}
