// In-memory store used by engine tests and local experiments.
use crate::{
    app::boss_store::BossStore,
    model::{
        Character,
        EpochPlayerState,
        Inventory,
        Participant,
        WorldBoss,
    },
};
use std::collections::{
    BTreeMap,
    BTreeSet,
};

#[derive(Default)]
pub struct InMemoryBossStore {
    bosses: BTreeMap<i64, WorldBoss>,
    participants: BTreeMap<(i64, String), Participant>,
    epoch_states: BTreeMap<(i64, String), EpochPlayerState>,
    characters: BTreeMap<String, Character>,
    inventories: BTreeMap<String, Inventory>,
    runs: BTreeSet<(i64, String)>,
}

impl InMemoryBossStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BossStore for InMemoryBossStore {
    fn boss(&self, week_start: i64) -> crate::Result<Option<WorldBoss>> {
        Ok(self.bosses.get(&week_start).cloned())
    }

    fn put_boss(&mut self, boss: &WorldBoss) -> crate::Result<()> {
        self.bosses.insert(boss.week_start, boss.clone());
        Ok(())
    }

    fn participant(
        &self,
        week_start: i64,
        wallet: &str,
    ) -> crate::Result<Option<Participant>> {
        Ok(self
            .participants
            .get(&(week_start, wallet.to_string()))
            .cloned())
    }

    fn participants(&self, week_start: i64) -> crate::Result<Vec<Participant>> {
        Ok(self
            .participants
            .range((week_start, String::new())..(week_start + 1, String::new()))
            .map(|(_, participant)| participant.clone())
            .collect())
    }

    fn put_participant(&mut self, participant: &Participant) -> crate::Result<()> {
        self.participants.insert(
            (participant.week_start, participant.wallet.clone()),
            participant.clone(),
        );
        Ok(())
    }

    fn epoch_state(
        &self,
        week_start: i64,
        wallet: &str,
    ) -> crate::Result<EpochPlayerState> {
        Ok(self
            .epoch_states
            .get(&(week_start, wallet.to_string()))
            .cloned()
            .unwrap_or_else(|| EpochPlayerState::new(wallet.to_string(), week_start)))
    }

    fn put_epoch_state(&mut self, state: &EpochPlayerState) -> crate::Result<()> {
        self.epoch_states
            .insert((state.week_start, state.wallet.clone()), state.clone());
        Ok(())
    }

    fn character(&self, wallet: &str) -> crate::Result<Option<Character>> {
        Ok(self.characters.get(wallet).cloned())
    }

    fn put_character(&mut self, character: &Character) -> crate::Result<()> {
        self.characters
            .insert(character.wallet.clone(), character.clone());
        Ok(())
    }

    fn inventory(&self, wallet: &str) -> crate::Result<Inventory> {
        Ok(self.inventories.get(wallet).copied().unwrap_or_default())
    }

    fn put_inventory(
        &mut self,
        wallet: &str,
        inventory: &Inventory,
    ) -> crate::Result<()> {
        self.inventories.insert(wallet.to_string(), *inventory);
        Ok(())
    }

    fn has_active_run(&self, week_start: i64, wallet: &str) -> crate::Result<bool> {
        Ok(self.runs.contains(&(week_start, wallet.to_string())))
    }

    fn set_active_run(&mut self, week_start: i64, wallet: &str) -> crate::Result<()> {
        self.runs.insert((week_start, wallet.to_string()));
        Ok(())
    }

    fn active_run_count(&self, week_start: i64) -> crate::Result<u64> {
        Ok(self
            .runs
            .range((week_start, String::new())..(week_start + 1, String::new()))
            .count() as u64)
    }

    fn commit_join(
        &mut self,
        participant: &Participant,
        character: &Character,
    ) -> crate::Result<()> {
        self.put_participant(participant)?;
        self.put_character(character)
    }

    fn commit_overload(
        &mut self,
        boss: &WorldBoss,
        participant: &Participant,
        wallet: &str,
    ) -> crate::Result<()> {
        self.put_boss(boss)?;
        self.put_participant(participant)?;
        self.put_inventory(wallet, &Inventory::default())
    }
}
