//! Configuration presets for tile loading behaviour
//!
//! A [`LoadingProfile`] bundles the cache and fetch-queue settings that
//! usually change together, so a layer can be tuned for constrained or
//! generous environments with a single call.

use crate::tiles::queue::QueueOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadingProfile {
    Balanced,
    LowResource,
    HighPerformance,
    Custom(LoadingOptions),
}

impl LoadingProfile {
    pub fn resolve(&self) -> LoadingOptions {
        match self {
            Self::Balanced => LoadingOptions::default(),
            Self::LowResource => LoadingOptions {
                cache_size: Some(128),
                keep_lower: false,
                queue: QueueOptions::low_resource(),
            },
            Self::HighPerformance => LoadingOptions {
                cache_size: Some(1200),
                keep_lower: true,
                queue: QueueOptions::high_performance(),
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for LoadingProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Cache and queue settings applied by a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingOptions {
    /// Tile cache capacity, `None` for the keep-lower dependent default
    pub cache_size: Option<usize>,
    /// Keep coarser levels loaded under finer ones
    pub keep_lower: bool,
    pub queue: QueueOptions,
}

impl Default for LoadingOptions {
    fn default() -> Self {
        Self {
            cache_size: None,
            keep_lower: true,
            queue: QueueOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_resolve() {
        assert_eq!(LoadingProfile::default().resolve(), LoadingOptions::default());
        let low = LoadingProfile::LowResource.resolve();
        assert!(!low.keep_lower);
        assert!(low.queue.size < QueueOptions::default().size);

        let custom = LoadingOptions {
            cache_size: Some(10),
            ..LoadingOptions::default()
        };
        assert_eq!(LoadingProfile::Custom(custom.clone()).resolve(), custom);
    }

    #[test]
    fn test_profile_from_json() {
        let profile: LoadingProfile =
            serde_json::from_str(r#"{"Custom":{"cache_size":32,"queue":{"size":3}}}"#).unwrap();
        let options = profile.resolve();
        assert_eq!(options.cache_size, Some(32));
        assert_eq!(options.queue.size, 3);
        assert_eq!(options.queue.track, QueueOptions::default().track);
        assert!(options.keep_lower);
    }
}
