//! Property file loading and environment substitution

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{ENV:([a-zA-Z][a-zA-Z0-9_]*)\}$").expect("environment pattern is valid")
});

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load a property file; `.toml` files are flattened to dotted keys.
pub fn load_properties_from(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>, LoadError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("toml"));
    if is_toml {
        let table: toml::Table = toml::from_str(&content).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let mut properties = BTreeMap::new();
        flatten_toml("", &table, &mut properties);
        Ok(properties)
    } else {
        Ok(parse_properties(&content))
    }
}

/// Parse `key=value` / `key: value` lines; `#` and `!` start comments.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(['=', ':']) {
            Some(index) => (&line[..index], &line[index + 1..]),
            None => (line, ""),
        };
        properties.insert(key.trim_end().to_string(), value.trim_start().to_string());
    }
    properties
}

fn flatten_toml(prefix: &str, table: &toml::Table, properties: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_toml(&name, nested, properties),
            other => {
                properties.insert(name, toml_scalar(other));
            }
        }
    }
}

fn toml_scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        toml::Value::Array(items) => items.iter().map(toml_scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Replace `${ENV:NAME}` values with the named environment variable.
///
/// Only whole-value references are substituted. A reference to an unset
/// variable is reported through `on_error` with the property name and the
/// message, and the property is dropped.
pub fn replace_environment_variables<F>(
    properties: BTreeMap<String, String>,
    environment: &HashMap<String, String>,
    mut on_error: F,
) -> BTreeMap<String, String>
where
    F: FnMut(&str, String),
{
    let mut replaced = BTreeMap::new();
    for (key, value) in properties {
        let Some(captures) = ENV_PATTERN.captures(&value) else {
            replaced.insert(key, value);
            continue;
        };
        let variable = &captures[1];
        match environment.get(variable) {
            Some(resolved) => {
                replaced.insert(key, resolved.clone());
            }
            None => {
                let message = format!(
                    "Configuration property '{key}' references unset environment variable '{variable}'"
                );
                on_error(&key, message);
            }
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_properties_lines() {
        let properties = parse_properties(
            "# comment\n! other comment\n\nhttp.port=8080\nname : service\nflag\nurl=a=b\n",
        );
        assert_eq!(properties["http.port"], "8080");
        assert_eq!(properties["name"], "service");
        assert_eq!(properties["flag"], "");
        assert_eq!(properties["url"], "a=b");
        assert_eq!(properties.len(), 4);
    }

    #[test]
    fn test_load_toml_flattens_tables() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "name = \"svc\"\n[http]\nport = 8080\nsecure = true\nhosts = [\"a\", \"b\"]\n[db.pool]\nsize = 4"
        )
        .unwrap();

        let properties = load_properties_from(file.path()).unwrap();
        assert_eq!(properties["name"], "svc");
        assert_eq!(properties["http.port"], "8080");
        assert_eq!(properties["http.secure"], "true");
        assert_eq!(properties["http.hosts"], "a,b");
        assert_eq!(properties["db.pool.size"], "4");
    }

    #[test]
    fn test_load_properties_file() {
        let mut file = tempfile::Builder::new().suffix(".properties").tempfile().unwrap();
        writeln!(file, "key=value").unwrap();
        let properties = load_properties_from(file.path()).unwrap();
        assert_eq!(properties["key"], "value");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_properties_from(dir.path().join("missing.properties")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "this is = = not toml").unwrap();
        let err = load_properties_from(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Toml { .. }));
    }

    #[test]
    fn test_environment_substitution() {
        let properties = BTreeMap::from([
            ("key".to_string(), "${ENV:TEST_VAR}".to_string()),
            ("plain".to_string(), "value".to_string()),
            ("embedded".to_string(), "x-${ENV:TEST_VAR}".to_string()),
            ("missing".to_string(), "${ENV:NOT_SET}".to_string()),
        ]);
        let environment = HashMap::from([("TEST_VAR".to_string(), "test_value".to_string())]);
        let mut failures = Vec::new();

        let replaced = replace_environment_variables(properties, &environment, |key, message| {
            failures.push((key.to_string(), message))
        });

        assert_eq!(replaced["key"], "test_value");
        assert_eq!(replaced["plain"], "value");
        assert_eq!(replaced["embedded"], "x-${ENV:TEST_VAR}");
        assert!(!replaced.contains_key("missing"));
        assert_eq!(
            failures,
            vec![(
                "missing".to_string(),
                "Configuration property 'missing' references unset environment variable 'NOT_SET'"
                    .to_string()
            )]
        );
    }
}
