//! Best-effort mirror of the fight onto an on-chain program account.
//!
//! The authoritative store never waits on anything in here: every public
//! entry point swallows its errors and logs, and a failed sync is retried
//! the next time gameplay produces new totals.
use crate::{
    mirror::{
        account::{
            MirrorAccount,
            delegate_instruction,
            finalize_instruction,
            initialize_instruction,
            mirror_address,
            record_damage_instruction,
        },
        identity::ServerIdentity,
        transport::{
            Address,
            ChainClient,
            Instruction,
            Transaction,
        },
    },
    model::FightTotals,
};
use anyhow::{
    Context,
    anyhow,
};
use std::{
    collections::HashMap,
    sync::Mutex as StdMutex,
    sync::Arc,
};
use tokio::sync::Mutex;
use url::Url;

pub mod account;
pub mod identity;
pub mod rpc;
pub mod transport;


#[derive(Clone, Debug)]
pub struct MirrorConfig {
    /// The mirror program that owns undelegated boss accounts.
    pub program: Address,
    /// Owner marker meaning the account is already delegated.
    pub delegation_program: Address,
    /// Where initialize/delegate transactions are sent.
    pub base_endpoint: Url,
}

/// Per-week sync state.
///
/// `cursor` holds the cumulative damage last confirmed on the mirror and is
/// `None` until seeded, either to zero on a fresh initialization or from the
/// on-chain value after a restart. It only ever advances on confirmed
/// success. `disabled` latches on authority mismatch and never clears;
/// `finalized` latches once the week has been committed back to the base
/// ledger, after which further pushes would re-delegate a settled account.
#[derive(Debug, Default)]
struct WeekMirror {
    delegated: bool,
    disabled: bool,
    finalized: bool,
    cursor: Option<u64>,
    endpoint: Option<Url>,
}

pub struct MirrorSynchronizer<Chain> {
    chain: Chain,
    identity: ServerIdentity,
    config: MirrorConfig,
    weeks: StdMutex<HashMap<i64, Arc<Mutex<WeekMirror>>>>,
}

impl<Chain: ChainClient> MirrorSynchronizer<Chain> {
    pub fn new(chain: Chain, identity: ServerIdentity, config: MirrorConfig) -> Self {
        Self {
            chain,
            identity,
            config,
            weeks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn authority(&self) -> Address {
        self.identity.address()
    }

    /// Create and delegate the week's account if needed.
    pub async fn initialize(&self, totals: FightTotals) {
        let entry = self.week_entry(totals.week_start);
        let mut mirror = entry.lock().await;
        if mirror.disabled || mirror.finalized {
            return;
        }
        if let Err(e) = self.ensure_delegated(&mut mirror, &totals).await {
            tracing::warn!(
                "mirror initialization failed for week {}: {e:#}",
                totals.week_start
            );
        }
    }

    /// Push whatever damage the mirror has not seen yet.
    pub async fn push(&self, totals: FightTotals) {
        if let Err(e) = self.try_push(&totals).await {
            tracing::warn!("mirror push failed for week {}: {e:#}", totals.week_start);
        }
    }

    /// Commit the final state and hand the account back to the base ledger.
    pub async fn finalize(&self, week_start: i64) {
        if let Err(e) = self.try_finalize(week_start).await {
            tracing::warn!("mirror finalize failed for week {week_start}: {e:#}");
        }
    }

    /// Build a damage-delta transaction for a player to cosign and broadcast
    /// themselves. The cursor is NOT advanced here; it moves only when the
    /// caller confirms the landing via [`Self::acknowledge_player_push`].
    pub async fn build_player_push(
        &self,
        totals: FightTotals,
        player: Address,
    ) -> Option<Transaction> {
        match self.try_build_player_push(&totals, player).await {
            Ok(transaction) => transaction,
            Err(e) => {
                tracing::warn!(
                    "building cosigned push failed for week {}: {e:#}",
                    totals.week_start
                );
                None
            }
        }
    }

    /// A cosigned transaction was confirmed on-chain carrying this
    /// cumulative total. Never moves the cursor backwards.
    pub async fn acknowledge_player_push(&self, week_start: i64, confirmed_total: u64) {
        let entry = self.week_entry(week_start);
        let mut mirror = entry.lock().await;
        let advanced = mirror.cursor.unwrap_or(0).max(confirmed_total);
        mirror.cursor = Some(advanced);
        tracing::debug!("mirror cursor for week {week_start} acknowledged at {advanced}");
    }

    /// Read the mirrored record straight from the ledger. Corrupt or
    /// unreachable records come back as `None`; callers fall back to the
    /// authoritative status.
    pub async fn read_mirror(&self, week_start: i64) -> Option<MirrorAccount> {
        let address = mirror_address(&self.config.program, week_start);
        let info = match self.chain.account(&address).await {
            Ok(info) => info?,
            Err(e) => {
                tracing::debug!("mirror read failed for week {week_start}: {e:#}");
                return None;
            }
        };
        let record = MirrorAccount::decode(&info.data).ok()?;
        if record.is_corrupt() {
            return None;
        }
        Some(record)
    }

    fn week_entry(&self, week_start: i64) -> Arc<Mutex<WeekMirror>> {
        let mut weeks = self.weeks.lock().unwrap();
        weeks.entry(week_start).or_default().clone()
    }

    async fn ensure_delegated(
        &self,
        mirror: &mut WeekMirror,
        totals: &FightTotals,
    ) -> crate::Result<()> {
        if mirror.delegated {
            return Ok(());
        }
        let address = mirror_address(&self.config.program, totals.week_start);

        match self.chain.account(&address).await? {
            Some(info) => {
                let record = MirrorAccount::decode(&info.data)
                    .context("decode existing mirror account")?;
                if record.authority != self.identity.address() {
                    mirror.disabled = true;
                    tracing::warn!(
                        "mirror account {address} is owned by authority {}, not {}; \
                         disabling mirroring for week {}",
                        record.authority,
                        self.identity.address(),
                        totals.week_start
                    );
                    return Err(anyhow!("mirror authority mismatch"));
                }
                if info.owner == self.config.delegation_program {
                    // Already delegated, nothing to submit.
                } else if info.owner == self.config.program {
                    let transaction = self.signed(vec![delegate_instruction(
                        &self.config.program,
                        &address,
                        &self.identity.address(),
                    )]);
                    self.chain
                        .submit(&self.config.base_endpoint, &transaction)
                        .await
                        .context("submit delegate transaction")?;
                } else {
                    return Err(anyhow!(
                        "mirror account {address} has unexpected owner {}",
                        info.owner
                    ));
                }
                if mirror.cursor.is_none() && !record.is_corrupt() {
                    mirror.cursor = Some(record.total_damage);
                }
            }
            None => {
                let transaction = self.signed(vec![
                    initialize_instruction(
                        &self.config.program,
                        &address,
                        &self.identity.address(),
                        totals.week_start,
                        totals.max_hp,
                        totals.spawned_at,
                    ),
                    delegate_instruction(
                        &self.config.program,
                        &address,
                        &self.identity.address(),
                    ),
                ]);
                self.chain
                    .submit(&self.config.base_endpoint, &transaction)
                    .await
                    .context("submit initialize+delegate transaction")?;
                mirror.cursor = Some(0);
            }
        }

        mirror.delegated = true;
        tracing::info!("mirror account {address} delegated for week {}", totals.week_start);
        Ok(())
    }

    /// Seed the cursor from the mirror itself when this process has never
    /// pushed for the week, so a restart does not re-send mirrored damage.
    async fn seeded_cursor(
        &self,
        mirror: &mut WeekMirror,
        week_start: i64,
    ) -> crate::Result<u64> {
        if let Some(cursor) = mirror.cursor {
            return Ok(cursor);
        }
        let address = mirror_address(&self.config.program, week_start);
        let info = self
            .chain
            .account(&address)
            .await?
            .ok_or_else(|| anyhow!("delegated mirror account {address} is missing"))?;
        let record =
            MirrorAccount::decode(&info.data).context("decode mirror for resync")?;
        let seeded = if record.is_corrupt() {
            0
        } else {
            record.total_damage
        };
        mirror.cursor = Some(seeded);
        tracing::info!("mirror cursor for week {week_start} resynced at {seeded}");
        Ok(seeded)
    }

    async fn endpoint_for(
        &self,
        mirror: &mut WeekMirror,
        address: &Address,
    ) -> crate::Result<Url> {
        if let Some(endpoint) = &mirror.endpoint {
            return Ok(endpoint.clone());
        }
        let endpoint = self
            .chain
            .resolve_executor(address)
            .await
            .context("resolve execution endpoint")?;
        mirror.endpoint = Some(endpoint.clone());
        Ok(endpoint)
    }

    async fn try_push(&self, totals: &FightTotals) -> crate::Result<()> {
        let entry = self.week_entry(totals.week_start);
        let mut mirror = entry.lock().await;
        if mirror.disabled || mirror.finalized {
            return Ok(());
        }
        self.ensure_delegated(&mut mirror, totals).await?;

        let last_mirrored = self.seeded_cursor(&mut mirror, totals.week_start).await?;
        if totals.total_damage <= last_mirrored {
            return Ok(());
        }
        let delta = totals.total_damage - last_mirrored;

        let address = mirror_address(&self.config.program, totals.week_start);
        let endpoint = self.endpoint_for(&mut mirror, &address).await?;
        let transaction = self.signed(vec![record_damage_instruction(
            &self.config.program,
            &address,
            &self.identity.address(),
            delta,
            totals.participant_count,
        )]);
        self.chain
            .simulate(&endpoint, &transaction)
            .await
            .context("simulate damage push")?;
        self.chain
            .submit(&endpoint, &transaction)
            .await
            .context("submit damage push")?;

        mirror.cursor = Some(totals.total_damage);
        tracing::debug!(
            "mirrored {delta} damage for week {}, cursor at {}",
            totals.week_start,
            totals.total_damage
        );
        Ok(())
    }

    async fn try_build_player_push(
        &self,
        totals: &FightTotals,
        player: Address,
    ) -> crate::Result<Option<Transaction>> {
        let entry = self.week_entry(totals.week_start);
        let mut mirror = entry.lock().await;
        if mirror.disabled || mirror.finalized {
            return Ok(None);
        }
        self.ensure_delegated(&mut mirror, totals).await?;

        let last_mirrored = self.seeded_cursor(&mut mirror, totals.week_start).await?;
        if totals.total_damage <= last_mirrored {
            return Ok(None);
        }
        let delta = totals.total_damage - last_mirrored;

        let address = mirror_address(&self.config.program, totals.week_start);
        let mut transaction = Transaction::new(
            player,
            vec![record_damage_instruction(
                &self.config.program,
                &address,
                &self.identity.address(),
                delta,
                totals.participant_count,
            )],
        );
        self.identity.sign(&mut transaction);
        Ok(Some(transaction))
    }

    async fn try_finalize(&self, week_start: i64) -> crate::Result<()> {
        let entry = {
            let weeks = self.weeks.lock().unwrap();
            weeks.get(&week_start).cloned()
        };
        let Some(entry) = entry else {
            return Ok(());
        };

        let mut mirror = entry.lock().await;
        if mirror.disabled || mirror.finalized {
            // Disabled weeks stay latched off, and a finalized week must
            // not be committed twice.
            return Ok(());
        }
        if mirror.delegated {
            let address = mirror_address(&self.config.program, week_start);
            let endpoint = self.endpoint_for(&mut mirror, &address).await?;
            let transaction = self.signed(vec![finalize_instruction(
                &self.config.program,
                &address,
                &self.identity.address(),
            )]);
            self.chain
                .submit(&endpoint, &transaction)
                .await
                .context("submit commit-and-undelegate")?;
            tracing::info!("mirror for week {week_start} finalized");
        }
        mirror.finalized = true;
        Ok(())
    }

    fn signed(&self, instructions: Vec<Instruction>) -> Transaction {
        let mut transaction = Transaction::new(self.identity.address(), instructions);
        self.identity.sign(&mut transaction);
        transaction
    }

    #[cfg(test)]
    pub(crate) async fn cursor_for(&self, week_start: i64) -> Option<u64> {
        let entry = self.week_entry(week_start);
        let mirror = entry.lock().await;
        mirror.cursor
    }

    #[cfg(test)]
    pub(crate) async fn is_disabled(&self, week_start: i64) -> bool {
        let entry = self.week_entry(week_start);
        let mirror = entry.lock().await;
        mirror.disabled
    }

    #[cfg(test)]
    pub(crate) async fn is_finalized(&self, week_start: i64) -> bool {
        let entry = self.week_entry(week_start);
        let mirror = entry.lock().await;
        mirror.finalized
    }
}
