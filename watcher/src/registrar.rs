//! Per-root registration with polling fallback.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::backend::{BackendKind, WatchRoot};
use crate::error::Result;
use crate::observer::{Observer, ObserverFactory};

/// Outcome of registering a root set.
pub struct Registration {
    /// The observer holding every successful registration. Constructed but
    /// not yet started; the caller starts it.
    pub observer: Box<dyn Observer>,

    /// Backend that ended up being used after any downgrade.
    pub backend: BackendKind,

    /// Roots successfully attached, in registration order.
    pub watched: Vec<PathBuf>,

    /// Roots skipped because they do not exist or could not be attached even
    /// on the fallback backend.
    pub skipped: Vec<PathBuf>,
}

/// Attach every root to an observer of `initial` kind, downgrading to
/// polling when the backend cannot be constructed or refuses a root.
///
/// A downgrade mid-run re-attaches every previously registered root onto the
/// replacement observer, so no root silently loses its watch. Nonexistent
/// roots are skipped with a warning; only a failure to construct the polling
/// fallback itself is fatal.
pub fn register_all<F: ObserverFactory>(
    factory: &F,
    roots: &[WatchRoot],
    initial: BackendKind,
) -> Result<Registration> {
    let mut backend = initial;
    let mut observer = match factory.build(initial) {
        Ok(observer) => observer,
        Err(e) => {
            warn!("{initial} backend construction failed ({e}), falling back to polling");
            backend = BackendKind::Polling;
            factory.build(BackendKind::Polling)?
        }
    };

    let mut watched: Vec<PathBuf> = Vec::new();
    let mut skipped: Vec<PathBuf> = Vec::new();

    for root in roots {
        if !root.exists() {
            warn!(root = %root.path().display(), "watch root does not exist, skipping");
            skipped.push(root.path().to_path_buf());
            continue;
        }

        match observer.attach(root.path(), true) {
            Ok(()) => {
                info!(root = %root.path().display(), backend = %backend, "watching");
                watched.push(root.path().to_path_buf());
            }
            Err(e) if backend == BackendKind::Polling => {
                // Already on the fallback backend; nothing left to retry on.
                warn!(root = %root.path().display(), "registration failed on polling backend ({e}), skipping");
                skipped.push(root.path().to_path_buf());
            }
            Err(e) => {
                warn!(root = %root.path().display(), "registration failed ({e}), falling back to polling");
                observer.stop();
                backend = BackendKind::Polling;
                observer = factory.build(BackendKind::Polling)?;

                // Carry every root that was already registered over to the
                // replacement observer before retrying the failing one.
                watched.retain(|prior| match observer.attach(prior, true) {
                    Ok(()) => true,
                    Err(re) => {
                        warn!(root = %prior.display(), "re-registration on polling failed ({re}), skipping");
                        skipped.push(prior.clone());
                        false
                    }
                });

                match observer.attach(root.path(), true) {
                    Ok(()) => {
                        info!(root = %root.path().display(), backend = %backend, "watching");
                        watched.push(root.path().to_path_buf());
                    }
                    Err(re) => {
                        warn!(root = %root.path().display(), "registration failed on polling backend ({re}), skipping");
                        skipped.push(root.path().to_path_buf());
                    }
                }
            }
        }
    }

    Ok(Registration {
        observer,
        backend,
        watched,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockState {
        builds: Vec<BackendKind>,
        attached: Vec<(BackendKind, PathBuf)>,
        stops: usize,
        /// Roots whose first attach attempt on the native backend fails.
        fail_native_attach: Vec<PathBuf>,
        fail_native_build: bool,
    }

    #[derive(Clone)]
    struct MockFactory(Arc<Mutex<MockState>>);

    struct MockObserver {
        kind: BackendKind,
        state: Arc<Mutex<MockState>>,
    }

    impl Observer for MockObserver {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn attach(&mut self, root: &Path, _recursive: bool) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if self.kind == BackendKind::Native
                && state.fail_native_attach.iter().any(|p| p == root)
            {
                return Err(WatchError::Registration {
                    root: root.to_path_buf(),
                    source: notify::Error::generic("mock attach failure"),
                });
            }
            state.attached.push((self.kind, root.to_path_buf()));
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {
            self.state.lock().unwrap().stops += 1;
        }
    }

    impl ObserverFactory for MockFactory {
        fn build(&self, kind: BackendKind) -> Result<Box<dyn Observer>> {
            let mut state = self.0.lock().unwrap();
            if kind == BackendKind::Native && state.fail_native_build {
                return Err(WatchError::Construction(notify::Error::generic(
                    "mock build failure",
                )));
            }
            state.builds.push(kind);
            Ok(Box::new(MockObserver {
                kind,
                state: self.0.clone(),
            }))
        }
    }

    fn mock() -> (MockFactory, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (MockFactory(state.clone()), state)
    }

    #[test]
    fn test_nonexistent_root_skipped_others_registered() {
        let temp = TempDir::new().unwrap();
        let (factory, _state) = mock();

        let roots = vec![
            WatchRoot::new("/definitely/not/there"),
            WatchRoot::new(temp.path()),
        ];
        let reg = register_all(&factory, &roots, BackendKind::Native).unwrap();

        assert_eq!(reg.backend, BackendKind::Native);
        assert_eq!(reg.watched, vec![temp.path().to_path_buf()]);
        assert_eq!(reg.skipped, vec![PathBuf::from("/definitely/not/there")]);
    }

    #[test]
    fn test_construction_failure_downgrades_to_polling() {
        let temp = TempDir::new().unwrap();
        let (factory, state) = mock();
        state.lock().unwrap().fail_native_build = true;

        let roots = vec![WatchRoot::new(temp.path())];
        let reg = register_all(&factory, &roots, BackendKind::Native).unwrap();

        assert_eq!(reg.backend, BackendKind::Polling);
        assert_eq!(state.lock().unwrap().builds, vec![BackendKind::Polling]);
    }

    #[test]
    fn test_attach_failure_reregisters_prior_roots_on_polling() {
        let good = TempDir::new().unwrap();
        let bad = TempDir::new().unwrap();
        let later = TempDir::new().unwrap();

        let (factory, state) = mock();
        state
            .lock()
            .unwrap()
            .fail_native_attach
            .push(bad.path().to_path_buf());

        let roots = vec![
            WatchRoot::new(good.path()),
            WatchRoot::new(bad.path()),
            WatchRoot::new(later.path()),
        ];
        let reg = register_all(&factory, &roots, BackendKind::Native).unwrap();

        assert_eq!(reg.backend, BackendKind::Polling);
        assert_eq!(
            reg.watched,
            vec![
                good.path().to_path_buf(),
                bad.path().to_path_buf(),
                later.path().to_path_buf()
            ]
        );

        let state = state.lock().unwrap();
        // The failed native observer was stopped before polling took over.
        assert_eq!(state.stops, 1);
        // good attached on native, then good again + bad + later on polling.
        assert_eq!(
            state.attached,
            vec![
                (BackendKind::Native, good.path().to_path_buf()),
                (BackendKind::Polling, good.path().to_path_buf()),
                (BackendKind::Polling, bad.path().to_path_buf()),
                (BackendKind::Polling, later.path().to_path_buf()),
            ]
        );
    }

    #[test]
    fn test_drive_root_set_selects_polling_and_registers_remaining_roots() {
        use crate::backend::select_backend;

        let ordinary = TempDir::new().unwrap();
        let roots = vec![WatchRoot::new("C:\\"), WatchRoot::new(ordinary.path())];

        let chosen = select_backend(&roots, None, false);
        assert_eq!(chosen, BackendKind::Polling);

        let (factory, state) = mock();
        let reg = register_all(&factory, &roots, chosen).unwrap();

        assert_eq!(reg.backend, BackendKind::Polling);
        assert_eq!(state.lock().unwrap().builds, vec![BackendKind::Polling]);
        // On this host the drive root does not exist and is skipped; every
        // existing root lands on the single polling observer.
        assert_eq!(reg.watched, vec![ordinary.path().to_path_buf()]);
    }
}
