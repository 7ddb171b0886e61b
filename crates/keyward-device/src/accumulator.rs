//! SLIP-39 share accumulation across separate, possibly interrupted, entries.
//!
//! Every accepted share is written to the store before the call returns, so
//! a power loss between two entries resumes from the last accepted share.

use tracing::{debug, warn};

use keyward_core::{KeywardError, KeywardResult};
use keyward_crypto::{combine_shares, SecretBytes, Share};
use keyward_storage::{DeviceStorage, SecretStore, ShareSetState};

/// Progress after offering one share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationResult {
    Complete,
    /// Shares still needed.
    Incomplete(u8),
}

/// Output of [`ShareAccumulator::combine`]: the encrypted master secret and
/// the parameters needed to decrypt it.
#[derive(Debug)]
pub struct CombinedSecret {
    pub encrypted_master_secret: SecretBytes,
    pub identifier: u16,
    pub iteration_exponent: u8,
}

pub struct ShareAccumulator<'a, S> {
    storage: &'a mut DeviceStorage<S>,
}

impl<'a, S: SecretStore> ShareAccumulator<'a, S> {
    pub fn new(storage: &'a mut DeviceStorage<S>) -> Self {
        ShareAccumulator { storage }
    }

    pub fn in_progress(&self) -> bool {
        self.storage.is_slip39_in_progress()
    }

    /// Word count expected for the next share, if a set is in progress.
    pub fn word_count(&self) -> KeywardResult<Option<usize>> {
        self.storage
            .load_share_set()?
            .map(|state| state.word_count())
            .transpose()
    }

    /// Add `share` to the in-progress set, starting a new set if none exists.
    ///
    /// A share from another split (identifier, threshold or iteration
    /// exponent differ) fails with `ShareSetMismatch`; a share of another
    /// length fails with `CorruptShareSet`. Neither writes anything.
    /// Re-entering a member index already stored replaces it and leaves the
    /// remaining count unchanged.
    pub fn begin_or_continue(&mut self, share: &Share) -> KeywardResult<AccumulationResult> {
        let mut state = match self.storage.load_share_set()? {
            None => {
                debug!(
                    identifier = share.identifier,
                    threshold = share.threshold,
                    "starting share set"
                );
                ShareSetState::new(
                    share.identifier,
                    share.iteration_exponent,
                    share.threshold,
                    share.value.len(),
                )?
            }
            Some(state) => {
                if share.identifier != state.identifier {
                    warn!(
                        expected = state.identifier,
                        got = share.identifier,
                        "share from a different set rejected"
                    );
                    return Err(KeywardError::ShareSetMismatch(format!(
                        "share identifier {} does not match the set in progress ({})",
                        share.identifier, state.identifier
                    )));
                }
                if share.threshold != state.threshold
                    || share.iteration_exponent != state.iteration_exponent
                {
                    warn!(
                        identifier = share.identifier,
                        "share parameters differ from the set in progress"
                    );
                    return Err(KeywardError::ShareSetMismatch(format!(
                        "share threshold {} / exponent {} do not match \
                         the set in progress ({} / {})",
                        share.threshold,
                        share.iteration_exponent,
                        state.threshold,
                        state.iteration_exponent
                    )));
                }
                state
            }
        };

        let filled = state.put(share.index, share.value.as_bytes())?;
        self.storage.store_share_set(&state)?;

        let remaining = state.remaining();
        debug!(index = share.index, new_slot = filled, remaining, "share accepted");
        Ok(if remaining == 0 {
            AccumulationResult::Complete
        } else {
            AccumulationResult::Incomplete(remaining)
        })
    }

    /// Combine the stored shares. Only valid once the set is complete.
    pub fn combine(&self) -> KeywardResult<CombinedSecret> {
        let state = self
            .storage
            .load_share_set()?
            .ok_or_else(|| KeywardError::InvalidArgument("no share set in progress".into()))?;
        let remaining = state.remaining();
        if remaining != 0 {
            return Err(KeywardError::IncompleteShareSet { remaining });
        }
        let encrypted_master_secret = combine_shares(state.threshold, &state.shares())?;
        Ok(CombinedSecret {
            encrypted_master_secret,
            identifier: state.identifier,
            iteration_exponent: state.iteration_exponent,
        })
    }

    /// Drop the in-progress set. Safe in any state, including no set at all.
    pub fn abort_and_clear(&mut self) -> KeywardResult<()> {
        self.storage.clear_share_set()?;
        debug!("share set cleared");
        Ok(())
    }
}
