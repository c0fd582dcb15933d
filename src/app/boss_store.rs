use crate::model::{
    Character,
    EpochPlayerState,
    Inventory,
    Participant,
    WorldBoss,
};

/// Authoritative persistence for the fight. One implementation is backed by
/// sled, another by in-memory maps for tests. All reads reflect the latest
/// committed write; the combined `commit_*` operations land atomically.
pub trait BossStore {
    fn boss(&self, week_start: i64) -> crate::Result<Option<WorldBoss>>;

    fn put_boss(&mut self, boss: &WorldBoss) -> crate::Result<()>;

    fn participant(
        &self,
        week_start: i64,
        wallet: &str,
    ) -> crate::Result<Option<Participant>>;

    fn participants(&self, week_start: i64) -> crate::Result<Vec<Participant>>;

    fn put_participant(&mut self, participant: &Participant) -> crate::Result<()>;

    /// Lazily created with all latches clear.
    fn epoch_state(
        &self,
        week_start: i64,
        wallet: &str,
    ) -> crate::Result<EpochPlayerState>;

    fn put_epoch_state(&mut self, state: &EpochPlayerState) -> crate::Result<()>;

    fn character(&self, wallet: &str) -> crate::Result<Option<Character>>;

    fn put_character(&mut self, character: &Character) -> crate::Result<()>;

    fn inventory(&self, wallet: &str) -> crate::Result<Inventory>;

    fn put_inventory(&mut self, wallet: &str, inventory: &Inventory)
    -> crate::Result<()>;

    fn has_active_run(&self, week_start: i64, wallet: &str) -> crate::Result<bool>;

    fn set_active_run(&mut self, week_start: i64, wallet: &str) -> crate::Result<()>;

    /// Distinct wallets with an active run this week; feeds HP scaling.
    fn active_run_count(&self, week_start: i64) -> crate::Result<u64>;

    /// Enroll a participant and flip their character into the encounter in
    /// one commit.
    fn commit_join(
        &mut self,
        participant: &Participant,
        character: &Character,
    ) -> crate::Result<()>;

    /// Land an overload: updated boss HP, updated participant crit fields,
    /// and a zeroed inventory, all in one commit.
    fn commit_overload(
        &mut self,
        boss: &WorldBoss,
        participant: &Participant,
        wallet: &str,
    ) -> crate::Result<()>;
}
