//! Aggregated configuration errors and warnings

use crate::describe::AnyInstance;
use std::fmt;

/// Errors and warnings collected during one configuration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Problems {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn extend(&mut self, other: &Problems) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }

    /// Fail with every collected problem if any error was recorded.
    pub fn throw_if_has_errors(&self) -> Result<(), ConfigurationError> {
        if self.has_errors() {
            Err(ConfigurationError::new(self.clone()))
        } else {
            Ok(())
        }
    }
}

/// A failed configuration pass.
///
/// Carries every problem of the pass and, when the failure happened while
/// binding values, the partially configured instance.
pub struct ConfigurationError {
    problems: Problems,
    partial: Option<Box<AnyInstance>>,
}

impl ConfigurationError {
    pub fn new(problems: Problems) -> Self {
        Self {
            problems,
            partial: None,
        }
    }

    pub fn single(message: impl Into<String>) -> Self {
        let mut problems = Problems::new();
        problems.add_error(message);
        Self::new(problems)
    }

    pub fn with_partial(problems: Problems, partial: Box<AnyInstance>) -> Self {
        Self {
            problems,
            partial: Some(partial),
        }
    }

    pub fn problems(&self) -> &Problems {
        &self.problems
    }

    pub fn errors(&self) -> &[String] {
        self.problems.errors()
    }

    pub fn warnings(&self) -> &[String] {
        self.problems.warnings()
    }

    /// The instance as far as it was configured before the pass failed
    pub fn partial_instance<T: 'static>(&self) -> Option<&T> {
        self.partial.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration errors:")?;
        let lines = self
            .problems
            .errors
            .iter()
            .map(|error| ("Error", error))
            .chain(self.problems.warnings.iter().map(|warning| ("Warning", warning)));
        for (index, (kind, message)) in lines.enumerate() {
            write!(f, "\n\n{}) {}: {}", index + 1, kind, message)?;
        }
        let count = self.problems.errors.len();
        write!(f, "\n\n{} error{}", count, if count == 1 { "" } else { "s" })
    }
}

impl fmt::Debug for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationError")
            .field("problems", &self.problems)
            .field("partial", &self.partial.is_some())
            .finish()
    }
}

impl std::error::Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_errors_then_warnings() {
        let mut problems = Problems::new();
        problems.add_warning("property 'a' is deprecated");
        problems.add_error("No value present for 'port'");
        let err = ConfigurationError::new(problems);

        let message = err.to_string();
        let error_at = message.find("1) Error: No value present for 'port'").unwrap();
        let warning_at = message.find("2) Warning: property 'a' is deprecated").unwrap();
        assert!(error_at < warning_at);
        assert!(message.ends_with("1 error"));
    }

    #[test]
    fn test_throw_only_on_errors() {
        let mut problems = Problems::new();
        problems.add_warning("just a warning");
        assert!(problems.throw_if_has_errors().is_ok());

        problems.add_error("broken");
        let err = problems.throw_if_has_errors().unwrap_err();
        assert_eq!(err.errors(), ["broken".to_string()]);
        assert_eq!(err.warnings().len(), 1);
    }

    #[test]
    fn test_partial_instance_downcast() {
        let err = ConfigurationError::with_partial(Problems::new(), Box::new(42_i32));
        assert_eq!(err.partial_instance::<i32>(), Some(&42));
        assert_eq!(err.partial_instance::<String>(), None);
    }
}
