//! Error types for furnishing operations.
//!
//! Every failure surfaced to a caller is a chain of wrappers (which type,
//! which field, which argument) ending in one root cause. Use
//! [`Error::kind`] to classify the root and [`Error::downcast_ref`] to get
//! back the exact error a factory or callable returned.

use std::fmt;

use furnish_support::rendering::{render_cycle, render_factories};

use crate::key::TypeKey;

/// Boxed error returned by user factories, callables and closers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all furnishing operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The context has no installed [`Configuration`](crate::registry::Configuration).
    #[error("No configuration installed in the current context\n  Hint: call Configuration::install() and resolve with the returned context")]
    NoResolver,

    /// No factory matched and no structural rule applies.
    #[error("{}", .0)]
    UnsupportedType(UnsupportedTypeError),

    /// More than one factory matched the requested type.
    #[error("{}", .0)]
    AmbiguousFactory(AmbiguousFactoryError),

    /// A caching factory needed a scope that is not in the chain.
    #[error("Missing scope {scope:?} required by {service}\n  Hint: enter the scope with scope::enter() before resolving")]
    MissingScope {
        scope: String,
        service: TypeKey,
    },

    /// A provider member has an output shape that cannot act as a factory.
    #[error("{}", .0)]
    BadProvider(BadProviderError),

    /// A service was requested again while it was still being constructed.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A catalog entry without the service capability was loaded as a service.
    #[error("{ty} cannot be registered as a service\n  Hint: build the catalog entry with TypeEntry::service() or TypeEntry::provider()")]
    NotAService { ty: TypeKey },

    /// A factory produced a value that does not match its declared type.
    #[error("Type mismatch: factory declared {declared} but its value cannot be bound to {expected}")]
    TypeMismatch {
        expected: TypeKey,
        declared: TypeKey,
    },

    /// A factory, callable or post-construct hook reported a failure.
    #[error(transparent)]
    Failed(BoxError),

    /// One or more values failed to close.
    #[error("{}", .0)]
    Close(CloseError),

    /// Failure while furnishing a value of `ty`.
    #[error("furnishing {ty}: {source}")]
    Furnishing {
        ty: TypeKey,
        #[source]
        source: Box<Error>,
    },

    /// Failure while furnishing a record field.
    #[error("field {field}: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Failure while furnishing a call argument.
    #[error("argument {index} ({ty}): {source}")]
    Argument {
        index: usize,
        ty: TypeKey,
        #[source]
        source: Box<Error>,
    },

    /// Failure while furnishing a sequence element.
    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Classification of an [`Error`]'s root cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoResolver,
    UnsupportedType,
    AmbiguousFactory,
    MissingScope,
    BadProvider,
    CircularDependency,
    NotAService,
    TypeMismatch,
    Failed,
    Close,
}

impl Error {
    /// Wraps a user error.
    ///
    /// A furnishing error travelling through user code is passed back
    /// unchanged so its kind survives.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        match error.into().downcast::<Error>() {
            Ok(inner) => *inner,
            Err(other) => Error::Failed(other),
        }
    }

    /// Unsupported-type error for `T`, without suggestions.
    pub fn unsupported<T: ?Sized + 'static>() -> Self {
        Error::UnsupportedType(UnsupportedTypeError {
            requested: TypeKey::of::<T>(),
            suggestions: Vec::new(),
        })
    }

    /// Wraps `source` with the type being furnished.
    pub fn furnishing(ty: TypeKey, source: Error) -> Self {
        Error::Furnishing {
            ty,
            source: Box::new(source),
        }
    }

    /// Wraps `source` with the record field being furnished.
    pub fn field(field: &'static str, source: Error) -> Self {
        Error::Field {
            field,
            source: Box::new(source),
        }
    }

    /// Wraps `source` with the position of the call argument being furnished.
    pub fn argument(index: usize, ty: TypeKey, source: Error) -> Self {
        Error::Argument {
            index,
            ty,
            source: Box::new(source),
        }
    }

    /// Wraps `source` with the position of the sequence element being furnished.
    pub fn element(index: usize, source: Error) -> Self {
        Error::Element {
            index,
            source: Box::new(source),
        }
    }

    /// Returns the innermost error, looking through context wrappers.
    pub fn root(&self) -> &Error {
        let mut current = self;
        loop {
            match current {
                Error::Furnishing { source, .. }
                | Error::Field { source, .. }
                | Error::Argument { source, .. }
                | Error::Element { source, .. } => current = source.as_ref(),
                root => return root,
            }
        }
    }

    /// Classifies the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::NoResolver => ErrorKind::NoResolver,
            Error::UnsupportedType(_) => ErrorKind::UnsupportedType,
            Error::AmbiguousFactory(_) => ErrorKind::AmbiguousFactory,
            Error::MissingScope { .. } => ErrorKind::MissingScope,
            Error::BadProvider(_) => ErrorKind::BadProvider,
            Error::CircularDependency(_) => ErrorKind::CircularDependency,
            Error::NotAService { .. } => ErrorKind::NotAService,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::Failed(_) => ErrorKind::Failed,
            Error::Close(_) => ErrorKind::Close,
            Error::Furnishing { source, .. }
            | Error::Field { source, .. }
            | Error::Argument { source, .. }
            | Error::Element { source, .. } => source.kind(),
        }
    }

    /// Returns the user error at the root of the chain if it is an `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self.root() {
            Error::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Error when a type has neither a factory nor a structural rule.
#[derive(Debug)]
pub struct UnsupportedTypeError {
    /// The type that was requested
    pub requested: TypeKey,
    /// Similar types that DO have factories (for "did you mean?" suggestions)
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnsupportedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type cannot be furnished: {}", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register a factory producing {}",
            self.requested.short_name()
        )
    }
}

/// Error when several factories can furnish one requested type.
#[derive(Debug)]
pub struct AmbiguousFactoryError {
    /// The type that was requested
    pub requested: TypeKey,
    /// Every matching factory, in registration order
    pub candidates: Vec<(TypeKey, Option<String>)>,
}

impl fmt::Display for AmbiguousFactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Multiple factories located for {} ({} candidates):",
            self.requested,
            self.candidates.len()
        )?;

        let candidates: Vec<(&str, Option<&str>)> = self
            .candidates
            .iter()
            .map(|(key, origin)| (key.type_name(), origin.as_deref()))
            .collect();
        for line in render_factories(&candidates).lines() {
            write!(f, "\n  {line}")?;
        }

        write!(
            f,
            "\n  Hint: remove all but one registration, or request a sequence of {}",
            self.requested.short_name()
        )
    }
}

/// Error when a provider member cannot be turned into a factory.
#[derive(Debug)]
pub struct BadProviderError {
    /// The provider type
    pub provider: TypeKey,
    /// The offending member
    pub member: &'static str,
    /// What is wrong with its output shape
    pub reason: String,
}

impl fmt::Display for BadProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: bad provider {}: {}",
            self.member, self.provider, self.reason
        )?;
        write!(
            f,
            "\n  Hint: provider members must return a single value or Result<T, E>"
        )
    }
}

/// Error when a service depends on itself.
///
/// Shows the full chain so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Example: [A, B, C, A]
    pub chain: Vec<TypeKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected:\n  ")?;

        let chain: Vec<&str> = self.chain.iter().map(|k| k.type_name()).collect();
        write!(f, "{}", render_cycle(&chain))?;

        write!(
            f,
            "\n  Hint: break the cycle with an Option<_> field marked #[furnish(skip)] and fill it later"
        )
    }
}

/// A single value that failed to close.
#[derive(Debug)]
pub struct CloseFailure {
    /// Type of the cached value
    pub ty: TypeKey,
    /// What its closer reported
    pub source: BoxError,
}

/// Every close failure collected while tearing down one scope.
#[derive(Debug)]
pub struct CloseError {
    /// Name of the scope being closed
    pub scope: String,
    /// Failures in the order values were closed
    pub failures: Vec<CloseFailure>,
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s) closing scope {:?}:",
            self.failures.len(),
            self.scope
        )?;
        for failure in &self.failures {
            write!(f, "\n  - {}: {}", failure.ty, failure.source)?;
        }
        Ok(())
    }
}

/// Convenient Result type for furnishing operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Exhausted;

    impl fmt::Display for Exhausted {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("pool exhausted")
        }
    }

    impl std::error::Error for Exhausted {}

    #[test]
    fn unsupported_error_display() {
        let err = Error::UnsupportedType(UnsupportedTypeError {
            requested: TypeKey::of::<i64>(),
            suggestions: vec!["i32".to_string()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("cannot be furnished"));
        assert!(msg.contains("i64"));
        assert!(msg.contains("- i32"));
    }

    #[test]
    fn ambiguous_error_lists_candidates() {
        let err = Error::AmbiguousFactory(AmbiguousFactoryError {
            requested: TypeKey::of::<String>(),
            candidates: vec![
                (TypeKey::of::<String>(), Some("value".to_string())),
                (TypeKey::of::<String>(), None),
            ],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Multiple factories"));
        assert!(msg.contains("#1 String (registered by value)"));
        assert!(msg.contains("#2 String"));
    }

    #[test]
    fn circular_dependency_error_display() {
        let err = Error::CircularDependency(CircularDependencyError {
            chain: vec![
                TypeKey::of::<String>(),
                TypeKey::of::<i32>(),
                TypeKey::of::<String>(),
            ],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Circular"));
        assert!(msg.contains("String → i32 → String"));
    }

    #[test]
    fn wrappers_render_as_causal_chain() {
        let err = Error::furnishing(
            TypeKey::of::<Vec<u8>>(),
            Error::field("port", Error::unsupported::<u16>()),
        );

        let msg = format!("{err}");
        assert!(msg.starts_with("furnishing alloc::vec::Vec<u8>: field port: Type cannot be furnished: u16"));
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn downcast_finds_user_error_through_wrappers() {
        let err = Error::furnishing(
            TypeKey::of::<String>(),
            Error::argument(0, TypeKey::of::<i32>(), Error::failed(Exhausted)),
        );

        assert_eq!(err.kind(), ErrorKind::Failed);
        assert!(err.downcast_ref::<Exhausted>().is_some());
        assert!(err.downcast_ref::<std::fmt::Error>().is_none());
    }

    #[test]
    fn failed_passes_furnishing_errors_through() {
        let err = Error::failed(Error::NoResolver);
        assert_eq!(err.kind(), ErrorKind::NoResolver);

        let err = Error::failed(Exhausted);
        assert!(matches!(err, Error::Failed(_)));
    }

    #[test]
    fn close_error_lists_every_failure() {
        let err = Error::Close(CloseError {
            scope: "request".to_string(),
            failures: vec![
                CloseFailure { ty: TypeKey::of::<i32>(), source: "a".into() },
                CloseFailure { ty: TypeKey::of::<u8>(), source: "b".into() },
            ],
        });

        let msg = format!("{err}");
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains("i32: a"));
        assert!(msg.contains("u8: b"));
    }
}
