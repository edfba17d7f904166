//! Retry and rollback
//!
//! Reverts story state to the point captured before a turn, either from an in-memory
//! full snapshot or from a persisted ID differential. The service depends only on
//! [`RestoreCallbacks`]; it never touches the pipeline.

pub mod backup;

pub use backup::{
    ActivationData, BackupState, CharacterFieldSnapshot, EntityIdSnapshot, RetryBackup,
};

use crate::error::StorageError;
use crate::story::{TimeTracker, WorldState};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Storage and host-state operations a restore needs.
#[async_trait]
pub trait RestoreCallbacks: Send + Sync {
    /// Replace entries, characters, locations, items, story beats, embedded images and the
    /// time tracker of the backup's branch with `world`.
    async fn restore_full_state(
        &self,
        backup: &RetryBackup,
        world: &WorldState,
    ) -> Result<(), StorageError>;

    async fn clear_activation_data(&self, story_id: &str) -> Result<(), StorageError>;

    async fn restore_activation_data(
        &self,
        story_id: &str,
        data: &ActivationData,
    ) -> Result<(), StorageError>;

    /// Delete entries at or after `position` on the branch. Returns how many were removed.
    async fn delete_entries_from(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        position: u64,
    ) -> Result<usize, StorageError>;

    /// Delete characters, locations, items, story beats and embedded images on the branch
    /// whose IDs are not in `keep`.
    async fn delete_entities_not_in(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        keep: &EntityIdSnapshot,
    ) -> Result<usize, StorageError>;

    async fn apply_character_snapshots(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        snapshots: &[CharacterFieldSnapshot],
    ) -> Result<(), StorageError>;

    async fn restore_time_tracker(
        &self,
        story_id: &str,
        tracker: Option<TimeTracker>,
    ) -> Result<(), StorageError>;

    /// Clear errors, suggestions and action choices shown for the failed turn.
    async fn clear_transient_ui_state(&self, story_id: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    FullState,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub mode: RestoreMode,
    pub entries_removed: usize,
    pub entities_removed: usize,
    pub error: Option<String>,
}

impl RestoreResult {
    fn ok(mode: RestoreMode, entries_removed: usize, entities_removed: usize) -> Self {
        Self {
            success: true,
            mode,
            entries_removed,
            entities_removed,
            error: None,
        }
    }

    fn failed(mode: RestoreMode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            mode,
            entries_removed: 0,
            entities_removed: 0,
            error: Some(error.into()),
        }
    }
}

/// Held for the duration of a persistent restore; released on drop.
struct RetryLock<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RetryLock<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RetryLock<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryService {
    in_progress: Arc<AtomicBool>,
}

impl RetryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a persistent restore holds the retry lock.
    pub fn is_retry_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Revert state to `backup`. Full-state backups are replaced wholesale; everything else
    /// goes through the ID-differential path.
    pub async fn restore_from_backup<C: RestoreCallbacks + ?Sized>(
        &self,
        backup: &RetryBackup,
        callbacks: &C,
    ) -> RestoreResult {
        match &backup.state {
            BackupState::Full { world } => self.restore_full(backup, world, callbacks).await,
            BackupState::Persistent { .. } => self.restore_persistent(backup, callbacks).await,
        }
    }

    /// User pressed stop mid-generation.
    pub async fn handle_stop_generation<C: RestoreCallbacks + ?Sized>(
        &self,
        backup: &RetryBackup,
        callbacks: &C,
    ) -> RestoreResult {
        callbacks.clear_transient_ui_state(&backup.story_id).await;
        let result = self.restore_from_backup(backup, callbacks).await;
        // The persistent path rebuilds activation tracking from a clean slate.
        if result.success && backup.has_full_state() {
            if let Err(e) = callbacks
                .restore_activation_data(&backup.story_id, &backup.activation_data)
                .await
            {
                warn!(story_id = %backup.story_id, error = %e, "Failed to restore activation data");
            }
        }
        result
    }

    /// User asked to regenerate the last response.
    pub async fn handle_retry_last_message<C: RestoreCallbacks + ?Sized>(
        &self,
        backup: &RetryBackup,
        callbacks: &C,
    ) -> RestoreResult {
        callbacks.clear_transient_ui_state(&backup.story_id).await;
        self.restore_from_backup(backup, callbacks).await
    }

    async fn restore_full<C: RestoreCallbacks + ?Sized>(
        &self,
        backup: &RetryBackup,
        world: &WorldState,
        callbacks: &C,
    ) -> RestoreResult {
        info!(story_id = %backup.story_id, "Restoring full-state retry backup");
        match callbacks.restore_full_state(backup, world).await {
            Ok(()) => RestoreResult::ok(RestoreMode::FullState, 0, 0),
            Err(e) => {
                error!(story_id = %backup.story_id, error = %e, "Full-state restore failed");
                RestoreResult::failed(RestoreMode::FullState, e.to_string())
            }
        }
    }

    async fn restore_persistent<C: RestoreCallbacks + ?Sized>(
        &self,
        backup: &RetryBackup,
        callbacks: &C,
    ) -> RestoreResult {
        let Some(_lock) = RetryLock::acquire(&self.in_progress) else {
            warn!(
                story_id = %backup.story_id,
                "Restore requested while another retry is in progress"
            );
            return RestoreResult::failed(RestoreMode::Persistent, "retry already in progress");
        };
        info!(
            story_id = %backup.story_id,
            branch_id = ?backup.branch_id,
            watermark = backup.entry_count_before_action,
            "Restoring persistent retry backup"
        );
        match persistent_steps(backup, callbacks).await {
            Ok((entries, entities)) => {
                info!(
                    entries_removed = entries,
                    entities_removed = entities,
                    "Persistent restore complete"
                );
                RestoreResult::ok(RestoreMode::Persistent, entries, entities)
            }
            Err(e) => {
                error!(story_id = %backup.story_id, error = %e, "Persistent restore failed");
                RestoreResult::failed(RestoreMode::Persistent, e.to_string())
            }
        }
    }
}

async fn persistent_steps<C: RestoreCallbacks + ?Sized>(
    backup: &RetryBackup,
    callbacks: &C,
) -> Result<(usize, usize), StorageError> {
    let story_id = backup.story_id.as_str();
    let branch_id = backup.branch_id.as_deref();

    callbacks.clear_activation_data(story_id).await?;

    let entries_removed = callbacks
        .delete_entries_from(story_id, branch_id, backup.entry_count_before_action)
        .await?;
    debug!(entries_removed, "Rolled back entries");

    let BackupState::Persistent {
        ids,
        character_snapshots,
        time_tracker,
    } = &backup.state
    else {
        return Ok((entries_removed, 0));
    };

    let mut entities_removed = 0;
    if let Some(ids) = ids {
        entities_removed = callbacks
            .delete_entities_not_in(story_id, branch_id, ids)
            .await?;
        debug!(entities_removed, "Removed entities created by the action");
    }

    if !character_snapshots.is_empty() {
        callbacks
            .apply_character_snapshots(story_id, branch_id, character_snapshots)
            .await?;
    }

    callbacks.restore_time_tracker(story_id, *time_tracker).await?;
    Ok((entries_removed, entities_removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn failing(step: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(step),
            }
        }

        fn record(&self, step: &'static str) -> Result<(), StorageError> {
            self.calls.lock().push(step.to_string());
            if self.fail_on == Some(step) {
                return Err(StorageError::Serialization(format!("{step} exploded")));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl RestoreCallbacks for Recorder {
        async fn restore_full_state(
            &self,
            _backup: &RetryBackup,
            _world: &WorldState,
        ) -> Result<(), StorageError> {
            self.record("restore_full_state")
        }
        async fn clear_activation_data(&self, _story_id: &str) -> Result<(), StorageError> {
            self.record("clear_activation_data")
        }
        async fn restore_activation_data(
            &self,
            _story_id: &str,
            _data: &ActivationData,
        ) -> Result<(), StorageError> {
            self.record("restore_activation_data")
        }
        async fn delete_entries_from(
            &self,
            _story_id: &str,
            _branch_id: Option<&str>,
            _position: u64,
        ) -> Result<usize, StorageError> {
            self.record("delete_entries_from").map(|_| 2)
        }
        async fn delete_entities_not_in(
            &self,
            _story_id: &str,
            _branch_id: Option<&str>,
            _keep: &EntityIdSnapshot,
        ) -> Result<usize, StorageError> {
            self.record("delete_entities_not_in").map(|_| 1)
        }
        async fn apply_character_snapshots(
            &self,
            _story_id: &str,
            _branch_id: Option<&str>,
            _snapshots: &[CharacterFieldSnapshot],
        ) -> Result<(), StorageError> {
            self.record("apply_character_snapshots")
        }
        async fn restore_time_tracker(
            &self,
            _story_id: &str,
            _tracker: Option<TimeTracker>,
        ) -> Result<(), StorageError> {
            self.record("restore_time_tracker")
        }
        async fn clear_transient_ui_state(&self, _story_id: &str) {
            let _ = self.record("clear_transient_ui_state");
        }
    }

    fn world() -> WorldState {
        WorldState {
            characters: vec![crate::story::Character::new("s", "Hero")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn full_backup_uses_single_replace() {
        let service = RetryService::new();
        let callbacks = Recorder::default();
        let backup = RetryBackup::new("s", None, 3, "go").with_full_state(&world());
        let result = service.restore_from_backup(&backup, &callbacks).await;
        assert!(result.success);
        assert_eq!(result.mode, RestoreMode::FullState);
        assert_eq!(callbacks.calls(), vec!["restore_full_state"]);
    }

    #[tokio::test]
    async fn persistent_backup_runs_steps_in_order() {
        let service = RetryService::new();
        let callbacks = Recorder::default();
        let backup = RetryBackup::new("s", None, 3, "go").with_id_snapshot(&world());
        let result = service.restore_from_backup(&backup, &callbacks).await;
        assert!(result.success);
        assert_eq!(result.entries_removed, 2);
        assert_eq!(result.entities_removed, 1);
        assert_eq!(
            callbacks.calls(),
            vec![
                "clear_activation_data",
                "delete_entries_from",
                "delete_entities_not_in",
                "apply_character_snapshots",
                "restore_time_tracker",
            ]
        );
        assert!(!service.is_retry_in_progress());
    }

    #[tokio::test]
    async fn persistent_backup_without_ids_skips_entity_cleanup() {
        let service = RetryService::new();
        let callbacks = Recorder::default();
        let backup = RetryBackup::new("s", None, 3, "go");
        let result = service.restore_from_backup(&backup, &callbacks).await;
        assert!(result.success);
        assert!(!callbacks
            .calls()
            .contains(&"delete_entities_not_in".to_string()));
    }

    #[tokio::test]
    async fn failure_is_reported_and_lock_released() {
        let service = RetryService::new();
        let callbacks = Recorder::failing("delete_entities_not_in");
        let backup = RetryBackup::new("s", None, 3, "go").with_id_snapshot(&world());
        let result = service.restore_from_backup(&backup, &callbacks).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exploded"));
        assert!(!service.is_retry_in_progress());
        assert!(!callbacks
            .calls()
            .contains(&"restore_time_tracker".to_string()));
    }

    #[tokio::test]
    async fn concurrent_restore_is_rejected() {
        let service = RetryService::new();
        let _held = RetryLock::acquire(&service.in_progress).unwrap();
        let callbacks = Recorder::default();
        let backup = RetryBackup::new("s", None, 3, "go");
        let result = service.restore_from_backup(&backup, &callbacks).await;
        assert!(!result.success);
        assert!(callbacks.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_generation_restores_activation_only_for_full_state() {
        let service = RetryService::new();

        let callbacks = Recorder::default();
        let full = RetryBackup::new("s", None, 3, "go").with_full_state(&world());
        service.handle_stop_generation(&full, &callbacks).await;
        assert_eq!(
            callbacks.calls(),
            vec![
                "clear_transient_ui_state",
                "restore_full_state",
                "restore_activation_data"
            ]
        );

        let callbacks = Recorder::default();
        let persistent = RetryBackup::new("s", None, 3, "go").with_id_snapshot(&world());
        service.handle_stop_generation(&persistent, &callbacks).await;
        let calls = callbacks.calls();
        assert_eq!(calls[0], "clear_transient_ui_state");
        assert!(!calls.contains(&"restore_activation_data".to_string()));
    }

    #[tokio::test]
    async fn retry_last_message_clears_ui_first() {
        let service = RetryService::new();
        let callbacks = Recorder::default();
        let full = RetryBackup::new("s", None, 3, "go").with_full_state(&world());
        let result = service.handle_retry_last_message(&full, &callbacks).await;
        assert!(result.success);
        assert_eq!(
            callbacks.calls(),
            vec!["clear_transient_ui_state", "restore_full_state"]
        );
    }
}
