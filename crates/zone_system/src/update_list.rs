//! Per-scene ordered log of scene updates.
//!
//! The list is kept contiguous: every entry applies from exactly the version
//! its predecessor produces. Older updates are a producer bug and are rejected;
//! newer updates mean history was lost, so the list restarts from them.

use crate::error::ZoneError;
use crate::update::SceneUpdate;
use tracing::warn;

/// Ordered, contiguous log of [`SceneUpdate`]s for one scene.
#[derive(Debug, Clone, Default)]
pub struct UpdateList {
    updates: Vec<SceneUpdate>,
}

impl UpdateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an update to the list.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::ContinuityViolation`] if the update's base version is
    /// older than the version the list expects next. The list is left untouched.
    ///
    /// An update newer than expected is accepted: prior history is discarded
    /// and the update becomes the sole entry.
    pub fn add_update(&mut self, update: SceneUpdate) -> Result<(), ZoneError> {
        let Some(last) = self.updates.last() else {
            self.updates.push(update);
            return Ok(());
        };

        let expected = last.target_version();
        let got = update.base_version();

        if got < expected {
            return Err(ZoneError::ContinuityViolation {
                scene_id: update.scene_id(),
                expected,
                got,
            });
        }

        if got > expected {
            warn!(
                "⚠️ Update list for scene {} lost continuity (expected base {}, got {}); flushing {} updates",
                update.scene_id(),
                expected,
                got,
                self.updates.len()
            );
            self.updates.clear();
        }

        self.updates.push(update);
        Ok(())
    }

    /// Returns the updates needed to bring a copy at `from_version` up to date.
    ///
    /// Returns `None` when the list cannot bridge the gap (it is empty, or its
    /// earliest update applies from a version newer than `from_version`) or
    /// when no update applies from `from_version` onward.
    pub fn get_updates(&self, from_version: i32) -> Option<Vec<SceneUpdate>> {
        let first = self.updates.first()?;
        if first.base_version() > from_version {
            return None;
        }

        let updates: Vec<SceneUpdate> = self
            .updates
            .iter()
            .filter(|update| update.base_version() >= from_version)
            .cloned()
            .collect();

        if updates.is_empty() {
            None
        } else {
            Some(updates)
        }
    }

    /// Checks that the list ends at `scene_version`.
    ///
    /// An empty list is consistent with any version.
    pub fn validate(&self, scene_version: i32) -> bool {
        match self.updates.last() {
            Some(last) => last.target_version() == scene_version,
            None => true,
        }
    }

    /// The version produced by the most recent update, if any.
    pub fn latest_version(&self) -> Option<i32> {
        self.updates.last().map(SceneUpdate::target_version)
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneUpdate> {
        self.updates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SceneId;
    use crate::update::SetSceneName;

    fn update(base: i32) -> SceneUpdate {
        SceneUpdate::new(
            SceneId(9),
            base,
            SetSceneName {
                name: format!("v{base}"),
            },
        )
    }

    fn chain(bases: std::ops::RangeInclusive<i32>) -> UpdateList {
        let mut list = UpdateList::new();
        for base in bases {
            list.add_update(update(base)).unwrap();
        }
        list
    }

    fn bases(updates: &[SceneUpdate]) -> Vec<i32> {
        updates.iter().map(SceneUpdate::base_version).collect()
    }

    #[test]
    fn test_empty_list() {
        let list = UpdateList::new();
        assert!(list.get_updates(0).is_none());
        assert!(list.validate(0));
        assert!(list.validate(123));
        assert_eq!(list.latest_version(), None);
    }

    #[test]
    fn test_single_update_scenario() {
        let mut list = UpdateList::new();
        list.add_update(update(5)).unwrap();

        let updates = list.get_updates(5).expect("base 5 should be bridgeable");
        assert_eq!(bases(&updates), vec![5]);
        assert!(list.get_updates(6).is_none());
        assert!(list.validate(6));
        assert!(!list.validate(5));
    }

    #[test]
    fn test_contiguous_chain_prefix_and_suffix() {
        let list = chain(3..=7);

        for from in [0, 1, 3] {
            let updates = list.get_updates(from).unwrap();
            assert_eq!(bases(&updates), vec![3, 4, 5, 6, 7]);
        }

        assert_eq!(bases(&list.get_updates(5).unwrap()), vec![5, 6, 7]);
        assert_eq!(bases(&list.get_updates(7).unwrap()), vec![7]);
        assert!(list.get_updates(8).is_none());
    }

    #[test]
    fn test_older_update_is_rejected_without_mutation() {
        let mut list = chain(1..=4);

        let err = list.add_update(update(3)).unwrap_err();
        match err {
            ZoneError::ContinuityViolation { expected, got, .. } => {
                assert_eq!(expected, 5);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(list.len(), 4);
        assert!(list.validate(5));
    }

    #[test]
    fn test_gap_flushes_history() {
        let mut list = chain(1..=4);
        list.add_update(update(10)).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().map(SceneUpdate::base_version), Some(10));
        assert!(list.get_updates(1).is_none());
        assert!(list.validate(11));
    }

    #[test]
    fn test_increment_larger_than_one() {
        let mut list = UpdateList::new();
        list.add_update(update(2).with_increment(3)).unwrap();
        list.add_update(update(5)).unwrap();

        assert!(list.validate(6));
        assert_eq!(bases(&list.get_updates(2).unwrap()), vec![2, 5]);
        assert!(list.add_update(update(4)).is_err());
    }
}
