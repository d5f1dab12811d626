//! Downstream tile server pool.

use std::sync::Arc;

use rand::seq::SliceRandom;

/// Immutable list of downstream `host:port` addresses.
///
/// Cloning is cheap; every clone shares the same list.
#[derive(Debug, Clone, Default)]
pub struct TileServerPool {
    hosts: Arc<[String]>,
}

impl TileServerPool {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts: hosts.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Pick a host uniformly at random.
    ///
    /// Uses the thread-local generator, so concurrent callers never contend.
    pub fn pick(&self) -> Option<&str> {
        self.hosts
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}
