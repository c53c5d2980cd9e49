//! The world lock.
//!
//! One coarse async mutex guards the [`World`]. The scheduler holds the only
//! [`WorldWriter`]; the admin surface gets cloneable [`WorldReader`]s. Both
//! hand out access through a closure, so the guard can never be held across
//! an `.await` by a caller.
//!
//! Readers that only need aggregate figures should prefer
//! [`WorldReader::snapshot`], which reads the last published
//! [`WorldSnapshot`] from a `watch` channel without touching the lock.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use turnward_types::WorldSnapshot;

use crate::world::World;

/// Exclusive write access to the world. Not cloneable.
#[derive(Debug)]
pub struct WorldWriter {
    world: Arc<Mutex<World>>,
    snapshot: watch::Sender<Arc<WorldSnapshot>>,
}

/// Shared read access to the world.
#[derive(Debug, Clone)]
pub struct WorldReader {
    world: Arc<Mutex<World>>,
    snapshot: watch::Receiver<Arc<WorldSnapshot>>,
}

/// Put `world` behind the lock, publishing its initial snapshot.
pub fn arbiter(world: World) -> (WorldWriter, WorldReader) {
    let initial = Arc::new(world.snapshot());
    let (tx, rx) = watch::channel(initial);
    let world = Arc::new(Mutex::new(world));
    (
        WorldWriter {
            world: Arc::clone(&world),
            snapshot: tx,
        },
        WorldReader {
            world,
            snapshot: rx,
        },
    )
}

impl WorldWriter {
    /// Run `f` with the world locked for writing.
    pub async fn write<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut guard = self.world.lock().await;
        f(&mut guard)
    }

    /// Build a snapshot under the lock and publish it.
    pub async fn publish(&self) -> Arc<WorldSnapshot> {
        let snapshot = Arc::new(self.write(|w| w.snapshot()).await);
        self.snapshot.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    /// Another reader onto the same world.
    pub fn reader(&self) -> WorldReader {
        WorldReader {
            world: Arc::clone(&self.world),
            snapshot: self.snapshot.subscribe(),
        }
    }
}

impl WorldReader {
    /// Run `f` with the world locked. Waits behind the scheduler.
    pub async fn read<R>(&self, f: impl FnOnce(&World) -> R) -> R {
        let guard = self.world.lock().await;
        f(&guard)
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Wait for the next published snapshot.
    ///
    /// Returns `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<Arc<WorldSnapshot>> {
        self.snapshot.changed().await.ok()?;
        Some(Arc::clone(&self.snapshot.borrow_and_update()))
    }
}
