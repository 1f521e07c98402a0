//! Resolution path tracking.
//!
//! Every factory invocation and structural build pushes its type onto the path
//! carried by the [`Context`](crate::context::Context). Requesting a type
//! that is already on the path means the graph loops back on itself; the
//! push fails with [`Error::CircularDependency`] instead of recursing until
//! the stack overflows.
//!
//! The path is a persistent linked list: pushing never mutates the parent,
//! so sibling resolutions sharing a prefix do not see each other's frames.
//! A frame only counts while its [`FrameGuard`] is alive. Contexts captured
//! during construction (a service holding its own `Context`) outlive the
//! construction and must not see it as still running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::error::{CircularDependencyError, Error, Result};
use crate::key::TypeKey;

#[derive(Debug)]
struct Frame {
    key: TypeKey,
    parent: Option<Arc<Frame>>,
    finished: AtomicBool,
}

/// Marks a frame finished when dropped.
#[derive(Debug)]
pub(crate) struct FrameGuard {
    frame: Arc<Frame>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.frame.finished.store(true, Ordering::Release);
    }
}

/// Types currently under construction, innermost last.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionPath {
    head: Option<Arc<Frame>>,
}

impl ResolutionPath {
    /// Returns a path extended with `key`.
    ///
    /// # Errors
    /// [`Error::CircularDependency`] if `key` is already being constructed.
    pub fn push(&self, key: TypeKey) -> Result<(ResolutionPath, FrameGuard)> {
        if self.contains(&key) {
            let mut chain = self.keys();
            let cycle_start = chain.iter().position(|k| *k == key).unwrap_or(0);
            let mut cycle = chain.split_off(cycle_start);
            cycle.push(key);

            warn!(cycle = ?cycle, "Circular dependency detected!");

            return Err(Error::CircularDependency(CircularDependencyError {
                chain: cycle,
            }));
        }

        let frame = Arc::new(Frame {
            key,
            parent: self.head.clone(),
            finished: AtomicBool::new(false),
        });
        let guard = FrameGuard {
            frame: frame.clone(),
        };
        Ok((ResolutionPath { head: Some(frame) }, guard))
    }

    /// Returns `true` if `key` is under construction.
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.frames().any(|frame| frame.key == *key)
    }

    /// Keys still under construction, outermost first.
    pub fn keys(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.frames().map(|frame| frame.key).collect();
        keys.reverse();
        keys
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(self.head.as_deref(), |frame| frame.parent.as_deref())
            .filter(|frame| !frame.finished.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;

    #[test]
    fn push_extends_without_touching_parent() {
        let root = ResolutionPath::default();
        let (a, _ga) = root.push(TypeKey::of::<A>()).unwrap();
        let (ab, _gb) = a.push(TypeKey::of::<B>()).unwrap();

        assert!(root.keys().is_empty());
        assert_eq!(a.keys(), vec![TypeKey::of::<A>()]);
        assert_eq!(ab.keys(), vec![TypeKey::of::<A>(), TypeKey::of::<B>()]);
    }

    #[test]
    fn detect_cycle() {
        // A → B → C → B
        let (a, _ga) = ResolutionPath::default().push(TypeKey::of::<A>()).unwrap();
        let (ab, _gb) = a.push(TypeKey::of::<B>()).unwrap();
        let (path, _gc) = ab.push(TypeKey::of::<C>()).unwrap();

        match path.push(TypeKey::of::<B>()).err().unwrap() {
            Error::CircularDependency(err) => {
                assert_eq!(
                    err.chain,
                    vec![TypeKey::of::<B>(), TypeKey::of::<C>(), TypeKey::of::<B>()]
                );
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn detect_self_dependency() {
        let (path, _guard) = ResolutionPath::default().push(TypeKey::of::<A>()).unwrap();
        assert!(path.push(TypeKey::of::<A>()).is_err());
    }

    #[test]
    fn finished_frames_are_ignored() {
        let (a, guard) = ResolutionPath::default().push(TypeKey::of::<A>()).unwrap();
        let (ab, _gb) = a.push(TypeKey::of::<B>()).unwrap();
        drop(guard);

        assert!(!ab.contains(&TypeKey::of::<A>()));
        assert_eq!(ab.keys(), vec![TypeKey::of::<B>()]);
        assert!(ab.push(TypeKey::of::<A>()).is_ok());
        assert!(ab.push(TypeKey::of::<B>()).is_err());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        //     A
        //    / \
        //   B   C
        //    \ /
        //     D
        struct D;
        let (a, _ga) = ResolutionPath::default().push(TypeKey::of::<A>()).unwrap();
        let (ab, _gb) = a.push(TypeKey::of::<B>()).unwrap();
        let (ac, _gc) = a.push(TypeKey::of::<C>()).unwrap();

        assert!(ab.push(TypeKey::of::<D>()).is_ok());
        assert!(ac.push(TypeKey::of::<D>()).is_ok());
    }
}
