//! The username-change saga.
//!
//! A rename touches two documents, `users/<id>` and `userIDByUsername`, with
//! no transaction spanning them. Steps run strictly in order and each failure
//! stops the saga before anything later runs:
//!
//! 1. verify the password
//! 2. check the candidate against its confirmation and the length rules
//! 3. sanitize it; only the sanitized name is used or stored from here on
//! 4. fetch the current record
//! 5. check the name index for an existing claim
//! 6. write the record, then rewrite the index
//!
//! Nothing is written before step 6. If the record write succeeds and the
//! index write fails, the result is [`RenameError::PartialFailure`]: the
//! record already shows the new name while the index still maps the old one.
//! The record write is never retried; [`IdentityChangeCoordinator::repair_index`]
//! re-runs the index half alone, and only while the record still carries the
//! new name. After a successful compensation, or a later rename, it refuses
//! with [`RenameError::StaleRepair`].
//!
//! Between steps 5 and 6 another client can claim the same name. The store
//! offers no conditional write, so that race is not prevented here; the
//! window is one read followed directly by the writes, and
//! [`NameIndexReconciler`](super::NameIndexReconciler) detects duplicates
//! left behind.
//!
//! There is no cancellation API. Each write is a single awaited call; a
//! caller that may drop the future mid-saga should run it with
//! `tokio::spawn` so issued writes complete.

use std::sync::Arc;
use std::time::Instant;

use shared::{IdentityConfig, Result, ServiceError, UserId, UserRecord, Username};
use thiserror::Error;

use crate::collaborators::{Notifier, PasswordVerifier};
use crate::repository::{NameIndexRepository, UserRepository};

/// Saga step that touched the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStep {
    FetchUser,
    CheckUniqueness,
    WriteUser,
    WriteIndex,
}

impl std::fmt::Display for RenameStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            RenameStep::FetchUser => "reading your account",
            RenameStep::CheckUniqueness => "checking username availability",
            RenameStep::WriteUser => "saving your account",
            RenameStep::WriteIndex => "updating the username lookup",
        };
        f.write_str(step)
    }
}

/// What is needed to finish a rename whose index write failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRepair {
    pub user_id: UserId,
    pub old_user_name: String,
    pub new_user_name: Username,
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("Your password was incorrect.")]
    Authentication,

    #[error("User names do not match.")]
    Mismatch,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("Username {0} is already taken!")]
    Conflict(Username),

    #[error("No account found for user {0}.")]
    NotFound(UserId),

    #[error("Failed while {step}: {source}")]
    Store {
        step: RenameStep,
        #[source]
        source: ServiceError,
    },

    #[error("Your username was changed to {} but the username lookup could not be updated: {source}", .repair.new_user_name)]
    PartialFailure {
        repair: IndexRepair,
        /// Whether the record was successfully reverted to its old name.
        compensated: bool,
        #[source]
        source: ServiceError,
    },

    /// The record no longer carries the name the repair would index.
    #[error("Username lookup was not repaired: account now has name {current_user_name:?}, not {expected}")]
    StaleRepair {
        expected: Username,
        current_user_name: String,
    },
}

impl RenameError {
    /// Validation and credential failures the user can fix by re-entering
    /// the form.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            RenameError::Authentication
                | RenameError::Mismatch
                | RenameError::InvalidFormat(_)
                | RenameError::Conflict(_)
        )
    }

    /// Short outcome label, as used on the duration histogram.
    pub fn outcome(&self) -> &'static str {
        self.metric().trim_start_matches("identity.rename.")
    }

    fn metric(&self) -> &'static str {
        match self {
            RenameError::Authentication => "identity.rename.auth_failed",
            RenameError::Mismatch | RenameError::InvalidFormat(_) => "identity.rename.invalid",
            RenameError::Conflict(_) => "identity.rename.conflict",
            RenameError::NotFound(_) => "identity.rename.not_found",
            RenameError::Store { .. } => "identity.rename.store_error",
            RenameError::PartialFailure { .. } => "identity.rename.partial_failure",
            RenameError::StaleRepair { .. } => "identity.rename.stale_repair",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub new_user_name: Username,
}

pub type RenameResult = std::result::Result<Renamed, RenameError>;

/// In-flight saga state, built once the current record is known.
#[derive(Debug, Clone)]
struct PendingRename {
    user_id: UserId,
    old_user_name: String,
    candidate: Username,
    original_record: UserRecord,
    updated_record: UserRecord,
}

impl PendingRename {
    fn new(user_id: UserId, current: UserRecord, candidate: Username) -> Self {
        Self {
            user_id,
            old_user_name: current.user_name.clone(),
            updated_record: current.renamed(&candidate),
            original_record: current,
            candidate,
        }
    }

    fn index_repair(&self) -> IndexRepair {
        IndexRepair {
            user_id: self.user_id.clone(),
            old_user_name: self.old_user_name.clone(),
            new_user_name: self.candidate.clone(),
        }
    }
}

pub struct IdentityChangeCoordinator {
    users: UserRepository,
    name_index: NameIndexRepository,
    password_verifier: Arc<dyn PasswordVerifier>,
    notifier: Arc<dyn Notifier>,
    compensate_on_partial_failure: bool,
}

impl IdentityChangeCoordinator {
    pub fn new(
        users: UserRepository,
        name_index: NameIndexRepository,
        password_verifier: Arc<dyn PasswordVerifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users,
            name_index,
            password_verifier,
            notifier,
            compensate_on_partial_failure: false,
        }
    }

    /// Builds a coordinator with compensation set from `config`.
    pub fn from_config(
        config: &IdentityConfig,
        users: UserRepository,
        name_index: NameIndexRepository,
        password_verifier: Arc<dyn PasswordVerifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(users, name_index, password_verifier, notifier)
            .with_compensation(config.compensate_on_partial_failure)
    }

    /// On a failed index write, try once to write the original record back.
    /// The outcome is still `PartialFailure`.
    pub fn with_compensation(mut self, enabled: bool) -> Self {
        self.compensate_on_partial_failure = enabled;
        self
    }

    /// Runs the rename saga and reports its single outcome to the notifier.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn rename_user(
        &self,
        user_id: &UserId,
        candidate_user_name: &str,
        confirm_user_name: &str,
        supplied_password: &str,
    ) -> RenameResult {
        shared::record_counter("identity.rename.requests", 1);
        let started = Instant::now();

        let result = self
            .run_saga(user_id, candidate_user_name, confirm_user_name, supplied_password)
            .await;

        let outcome = match &result {
            Ok(renamed) => {
                shared::record_counter("identity.rename.success", 1);
                tracing::info!(new_user_name = %renamed.new_user_name, "Username changed successfully");
                self.notifier.notify("Username successfully changed!", true);
                "success"
            }
            Err(e) => {
                shared::record_counter(e.metric(), 1);
                self.notifier.notify(&e.to_string(), false);
                e.outcome()
            }
        };
        shared::record_duration("identity.rename.duration_seconds", outcome, started.elapsed());

        result
    }

    async fn run_saga(
        &self,
        user_id: &UserId,
        candidate_user_name: &str,
        confirm_user_name: &str,
        supplied_password: &str,
    ) -> RenameResult {
        if !self.password_verifier.verify(supplied_password).await {
            tracing::warn!("Rename rejected: password mismatch");
            return Err(RenameError::Authentication);
        }

        validate_candidate(candidate_user_name, confirm_user_name)?;

        let candidate = Username::from_candidate(candidate_user_name).map_err(invalid_format)?;

        let current = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(|source| store_failure(RenameStep::FetchUser, source))?
            .ok_or_else(|| RenameError::NotFound(user_id.clone()))?;

        let pending = PendingRename::new(user_id.clone(), current, candidate);

        self.ensure_unclaimed(&pending).await?;

        self.commit(pending).await
    }

    async fn ensure_unclaimed(&self, pending: &PendingRename) -> std::result::Result<(), RenameError> {
        let owner = self
            .name_index
            .lookup(&pending.candidate)
            .await
            .map_err(|source| store_failure(RenameStep::CheckUniqueness, source))?;

        if let Some(owner) = owner {
            tracing::warn!(
                candidate = %pending.candidate,
                owner = %owner,
                "Rename rejected: username already indexed"
            );
            return Err(RenameError::Conflict(pending.candidate.clone()));
        }

        Ok(())
    }

    async fn commit(&self, pending: PendingRename) -> RenameResult {
        self.users
            .put(&pending.user_id, &pending.updated_record)
            .await
            .map_err(|source| store_failure(RenameStep::WriteUser, source))?;

        tracing::debug!(
            old_user_name = %pending.old_user_name,
            new_user_name = %pending.candidate,
            "User record updated"
        );

        let repair = pending.index_repair();
        if let Err(source) = self.write_index(&repair).await {
            tracing::error!(
                error = %source,
                old_user_name = %repair.old_user_name,
                new_user_name = %repair.new_user_name,
                "Name index write failed after user record was updated"
            );

            let compensated = self.compensate_on_partial_failure && self.compensate(&pending).await;

            return Err(RenameError::PartialFailure {
                repair,
                compensated,
                source,
            });
        }

        Ok(Renamed {
            new_user_name: pending.candidate,
        })
    }

    async fn write_index(&self, repair: &IndexRepair) -> Result<()> {
        let mut index = self.name_index.load().await?;
        index.apply_rename(&repair.old_user_name, &repair.new_user_name, &repair.user_id);
        self.name_index.save(&index).await
    }

    async fn compensate(&self, pending: &PendingRename) -> bool {
        match self.users.put(&pending.user_id, &pending.original_record).await {
            Ok(()) => {
                tracing::warn!(
                    restored_user_name = %pending.old_user_name,
                    "Reverted user record after failed index write"
                );
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to revert user record");
                false
            }
        }
    }

    /// Re-runs only the index half of a rename that ended in
    /// `PartialFailure`. Safe to call more than once.
    ///
    /// The record is read first; the index is only touched while the record
    /// still carries `repair.new_user_name`.
    #[tracing::instrument(skip(self, repair), fields(user_id = %repair.user_id))]
    pub async fn repair_index(&self, repair: &IndexRepair) -> std::result::Result<(), RenameError> {
        let current = self
            .users
            .find_by_id(&repair.user_id)
            .await
            .map_err(|source| store_failure(RenameStep::FetchUser, source))?
            .ok_or_else(|| RenameError::NotFound(repair.user_id.clone()))?;

        if current.user_name != repair.new_user_name.as_str() {
            tracing::warn!(
                expected = %repair.new_user_name,
                current_user_name = %current.user_name,
                "Name index repair refused: record no longer carries the new name"
            );
            shared::record_counter("identity.rename.stale_repair", 1);
            return Err(RenameError::StaleRepair {
                expected: repair.new_user_name.clone(),
                current_user_name: current.user_name,
            });
        }

        match self.write_index(repair).await {
            Ok(()) => {
                tracing::info!(new_user_name = %repair.new_user_name, "Name index repaired");
                shared::record_counter("identity.rename.index_repaired", 1);
                Ok(())
            }
            Err(source) => {
                tracing::error!(error = %source, "Name index repair failed");
                Err(store_failure(RenameStep::WriteIndex, source))
            }
        }
    }
}

fn validate_candidate(candidate: &str, confirm: &str) -> std::result::Result<(), RenameError> {
    if candidate != confirm {
        return Err(RenameError::Mismatch);
    }
    Username::validate_length(candidate).map_err(invalid_format)
}

fn invalid_format(err: ServiceError) -> RenameError {
    match err {
        ServiceError::InvalidUsername(msg) => RenameError::InvalidFormat(msg),
        other => RenameError::InvalidFormat(other.to_string()),
    }
}

fn store_failure(step: RenameStep, source: ServiceError) -> RenameError {
    tracing::error!(step = ?step, error = %source, "Store failure during rename");
    RenameError::Store { step, source }
}
