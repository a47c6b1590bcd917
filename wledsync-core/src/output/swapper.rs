//! Route table effects for multicast casts
//!
//! An effect periodically permutes which device shows which tile. Only one
//! effect runs at a time; stopping it restores the original routing.

use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::multicast::RouteTable;
use crate::error::{Result, WledSyncError};

/// A route table permutation, applied once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapEffect {
    /// Move the first device to the end
    Circular,
    /// Move the last device to the front
    Reverse,
    /// Shuffle the whole table
    Random,
    /// Shuffle inside consecutive sections
    ShuffleSections { size: usize },
    /// Reverse each section
    ReverseSections { size: usize },
    /// Rotate each section right by `by`
    RotateSections { size: usize, by: usize },
    /// Pause one random slot, restoring the previous one
    RandomReplace,
}

impl std::fmt::Display for SwapEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Circular => write!(f, "circular"),
            Self::Reverse => write!(f, "reverse"),
            Self::Random => write!(f, "random"),
            Self::ShuffleSections { size } => write!(f, "shuffle_sections({})", size),
            Self::ReverseSections { size } => write!(f, "reverse_sections({})", size),
            Self::RotateSections { size, by } => write!(f, "rotate_sections({}, {})", size, by),
            Self::RandomReplace => write!(f, "pause"),
        }
    }
}

/// Mutable state carried between ticks
#[derive(Debug, Clone, Default)]
pub struct SwapState {
    /// Slot paused by the last random replace
    pub paused: Option<usize>,
}

/// Apply one tick of `effect` to `routes`
pub fn apply_effect(
    routes: &mut [Option<usize>],
    initial: &[Option<usize>],
    effect: SwapEffect,
    state: &mut SwapState,
) {
    if routes.is_empty() {
        return;
    }
    let mut rng = rand::thread_rng();

    match effect {
        SwapEffect::Circular => routes.rotate_left(1),
        SwapEffect::Reverse => routes.rotate_right(1),
        SwapEffect::Random => routes.shuffle(&mut rng),
        SwapEffect::ShuffleSections { size } => {
            for section in routes.chunks_mut(size.max(1)) {
                section.shuffle(&mut rng);
            }
        }
        SwapEffect::ReverseSections { size } => {
            for section in routes.chunks_mut(size.max(1)) {
                section.reverse();
            }
        }
        SwapEffect::RotateSections { size, by } => {
            for section in routes.chunks_mut(size.max(1)) {
                let len = section.len();
                section.rotate_right(by % len);
            }
        }
        SwapEffect::RandomReplace => {
            if routes.len() < 2 {
                return;
            }
            if let Some(prev) = state.paused {
                routes[prev] = initial.get(prev).copied().flatten();
            }
            let slot = rng.gen_range(0..routes.len());
            routes[slot] = None;
            state.paused = Some(slot);
        }
    }
}

/// Runs a [`SwapEffect`] on a shared route table
#[derive(Debug)]
pub struct IpSwapper {
    routes: RouteTable,
    initial: Vec<Option<usize>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IpSwapper {
    pub fn new(routes: RouteTable, initial: Vec<Option<usize>>) -> Self {
        Self {
            routes,
            initial,
            task: Mutex::new(None),
        }
    }

    /// Start `effect`, one tick every `delay`
    pub fn start(&self, effect: SwapEffect, delay: Duration) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(WledSyncError::action(
                "A multicast effect is already running, stop it first",
            ));
        }
        if delay.is_zero() {
            return Err(WledSyncError::action("Effect delay must be positive"));
        }

        info!("Starting multicast effect {} every {:?}", effect, delay);
        let routes = self.routes.clone();
        let initial = self.initial.clone();
        *task = Some(tokio::spawn(async move {
            let mut state = SwapState::default();
            loop {
                {
                    let mut table = routes.write();
                    apply_effect(&mut table, &initial, effect, &mut state);
                    debug!("Route table: {:?}", *table);
                }
                tokio::time::sleep(delay).await;
            }
        }));
        Ok(())
    }

    /// Stop the running effect and restore the initial routing
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Multicast effect stopped");
        }
        *self.routes.write() = self.initial.clone();
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for IpSwapper {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> Vec<Option<usize>> {
        (0..n).map(Some).collect()
    }

    #[test]
    fn test_circular_and_reverse() {
        let initial = table(4);
        let mut routes = initial.clone();
        let mut state = SwapState::default();

        apply_effect(&mut routes, &initial, SwapEffect::Circular, &mut state);
        assert_eq!(routes, vec![Some(1), Some(2), Some(3), Some(0)]);

        apply_effect(&mut routes, &initial, SwapEffect::Reverse, &mut state);
        assert_eq!(routes, initial);
    }

    #[test]
    fn test_rotate_sections() {
        let initial = table(5);
        let mut routes = initial.clone();
        apply_effect(
            &mut routes,
            &initial,
            SwapEffect::RotateSections { size: 2, by: 1 },
            &mut SwapState::default(),
        );
        assert_eq!(routes, vec![Some(1), Some(0), Some(3), Some(2), Some(4)]);
    }

    #[test]
    fn test_reverse_sections() {
        let initial = table(6);
        let mut routes = initial.clone();
        apply_effect(
            &mut routes,
            &initial,
            SwapEffect::ReverseSections { size: 3 },
            &mut SwapState::default(),
        );
        assert_eq!(
            routes,
            vec![Some(2), Some(1), Some(0), Some(5), Some(4), Some(3)]
        );
    }

    #[test]
    fn test_random_keeps_devices() {
        let initial = table(8);
        let mut routes = initial.clone();
        apply_effect(&mut routes, &initial, SwapEffect::Random, &mut SwapState::default());
        routes.sort();
        assert_eq!(routes, initial);
    }

    #[test]
    fn test_random_replace_pauses_one_slot() {
        let initial = table(4);
        let mut routes = initial.clone();
        let mut state = SwapState::default();

        for _ in 0..10 {
            apply_effect(&mut routes, &initial, SwapEffect::RandomReplace, &mut state);
            assert_eq!(routes.iter().filter(|r| r.is_none()).count(), 1);
            let paused = state.paused.unwrap();
            assert!(routes[paused].is_none());
        }
    }

    #[tokio::test]
    async fn test_stop_restores_routes() {
        let initial = table(3);
        let routes: RouteTable = std::sync::Arc::new(parking_lot::RwLock::new(initial.clone()));
        let swapper = IpSwapper::new(routes.clone(), initial.clone());

        swapper
            .start(SwapEffect::Circular, Duration::from_millis(5))
            .unwrap();
        assert!(swapper.is_running());
        assert!(swapper
            .start(SwapEffect::Reverse, Duration::from_millis(5))
            .is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        swapper.stop();
        assert!(!swapper.is_running());
        assert_eq!(*routes.read(), initial);
    }
}
