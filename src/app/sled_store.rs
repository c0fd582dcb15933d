// Sled-backed implementation of the authoritative fight store.
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
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use sled::{
    Config,
    Db,
    Tree,
    transaction::{
        ConflictableTransactionError,
        Transactional,
    },
};
use std::path::Path;

#[derive(Clone)]
pub struct SledBossStore {
    bosses: Tree,
    participants: Tree,
    epoch_states: Tree,
    characters: Tree,
    inventories: Tree,
    runs: Tree,
}

impl SledBossStore {
    pub fn new(db: &Db) -> crate::Result<Self> {
        let bosses = db.open_tree("bosses").context("open bosses tree")?;
        let participants = db
            .open_tree("participants")
            .context("open participants tree")?;
        let epoch_states = db
            .open_tree("epoch_states")
            .context("open epoch_states tree")?;
        let characters = db.open_tree("characters").context("open characters tree")?;
        let inventories = db
            .open_tree("inventories")
            .context("open inventories tree")?;
        let runs = db.open_tree("runs").context("open runs tree")?;

        Ok(Self {
            bosses,
            participants,
            epoch_states,
            characters,
            inventories,
            runs,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let config = Config::default().path(path);
        let db = config.open().context("open sled database")?;
        Self::new(&db)
    }

    fn week_key(week_start: i64) -> [u8; 8] {
        week_start.to_be_bytes()
    }

    fn wallet_key(week_start: i64, wallet: &str) -> Vec<u8> {
        format!("{week_start}|{wallet}").into_bytes()
    }

    fn week_prefix(week_start: i64) -> Vec<u8> {
        format!("{week_start}|").into_bytes()
    }

    fn serialize<T: Serialize>(value: &T, label: &str) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(value).with_context(|| format!("serialize {label}"))
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> crate::Result<Option<T>> {
        let value = match tree.get(key)? {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(Some(deserialize(value.as_ref())?))
    }
}

impl BossStore for SledBossStore {
    fn boss(&self, week_start: i64) -> crate::Result<Option<WorldBoss>> {
        Self::get(&self.bosses, &Self::week_key(week_start))
    }

    fn put_boss(&mut self, boss: &WorldBoss) -> crate::Result<()> {
        let bytes = Self::serialize(boss, "boss record")?;
        self.bosses
            .insert(Self::week_key(boss.week_start), bytes)
            .context("persist boss record")?;
        self.bosses.flush().context("flush bosses tree")?;
        Ok(())
    }

    fn participant(
        &self,
        week_start: i64,
        wallet: &str,
    ) -> crate::Result<Option<Participant>> {
        Self::get(&self.participants, &Self::wallet_key(week_start, wallet))
    }

    fn participants(&self, week_start: i64) -> crate::Result<Vec<Participant>> {
        let mut all = Vec::new();
        for entry in self.participants.scan_prefix(Self::week_prefix(week_start)) {
            let (_, value) = entry.context("iterate participant records")?;
            all.push(deserialize::<Participant>(value.as_ref())?);
        }
        Ok(all)
    }

    fn put_participant(&mut self, participant: &Participant) -> crate::Result<()> {
        let key = Self::wallet_key(participant.week_start, &participant.wallet);
        let bytes = Self::serialize(participant, "participant record")?;
        self.participants
            .insert(key, bytes)
            .context("persist participant record")?;
        self.participants.flush().context("flush participants tree")?;
        Ok(())
    }

    fn epoch_state(
        &self,
        week_start: i64,
        wallet: &str,
    ) -> crate::Result<EpochPlayerState> {
        let loaded: Option<EpochPlayerState> =
            Self::get(&self.epoch_states, &Self::wallet_key(week_start, wallet))?;
        Ok(loaded
            .unwrap_or_else(|| EpochPlayerState::new(wallet.to_string(), week_start)))
    }

    fn put_epoch_state(&mut self, state: &EpochPlayerState) -> crate::Result<()> {
        let key = Self::wallet_key(state.week_start, &state.wallet);
        let bytes = Self::serialize(state, "epoch state record")?;
        self.epoch_states
            .insert(key, bytes)
            .context("persist epoch state record")?;
        self.epoch_states.flush().context("flush epoch states tree")?;
        Ok(())
    }

    fn character(&self, wallet: &str) -> crate::Result<Option<Character>> {
        Self::get(&self.characters, wallet.as_bytes())
    }

    fn put_character(&mut self, character: &Character) -> crate::Result<()> {
        let bytes = Self::serialize(character, "character record")?;
        self.characters
            .insert(character.wallet.as_bytes(), bytes)
            .context("persist character record")?;
        self.characters.flush().context("flush characters tree")?;
        Ok(())
    }

    fn inventory(&self, wallet: &str) -> crate::Result<Inventory> {
        let loaded: Option<Inventory> = Self::get(&self.inventories, wallet.as_bytes())?;
        Ok(loaded.unwrap_or_default())
    }

    fn put_inventory(
        &mut self,
        wallet: &str,
        inventory: &Inventory,
    ) -> crate::Result<()> {
        let bytes = Self::serialize(inventory, "inventory record")?;
        self.inventories
            .insert(wallet.as_bytes(), bytes)
            .context("persist inventory record")?;
        self.inventories.flush().context("flush inventories tree")?;
        Ok(())
    }

    fn has_active_run(&self, week_start: i64, wallet: &str) -> crate::Result<bool> {
        Ok(self
            .runs
            .contains_key(Self::wallet_key(week_start, wallet))
            .context("look up active run")?)
    }

    fn set_active_run(&mut self, week_start: i64, wallet: &str) -> crate::Result<()> {
        self.runs
            .insert(Self::wallet_key(week_start, wallet), &[1u8][..])
            .context("persist active run marker")?;
        self.runs.flush().context("flush runs tree")?;
        Ok(())
    }

    fn active_run_count(&self, week_start: i64) -> crate::Result<u64> {
        let mut count = 0u64;
        for entry in self.runs.scan_prefix(Self::week_prefix(week_start)) {
            entry.context("iterate active run markers")?;
            count += 1;
        }
        Ok(count)
    }

    fn commit_join(
        &mut self,
        participant: &Participant,
        character: &Character,
    ) -> crate::Result<()> {
        let participant_key =
            Self::wallet_key(participant.week_start, &participant.wallet);
        let participant_bytes = Self::serialize(participant, "participant record")?;
        let character_bytes = Self::serialize(character, "character record")?;
        (&self.participants, &self.characters)
            .transaction(|(participants, characters)| {
                participants
                    .insert(participant_key.as_slice(), participant_bytes.as_slice())?;
                characters.insert(
                    character.wallet.as_bytes(),
                    character_bytes.as_slice(),
                )?;
                Ok::<_, ConflictableTransactionError<()>>(())
            })
            .map_err(|e| anyhow!("join transaction failed: {e:?}"))?;
        self.participants.flush().context("flush participants tree")?;
        self.characters.flush().context("flush characters tree")?;
        Ok(())
    }

    fn commit_overload(
        &mut self,
        boss: &WorldBoss,
        participant: &Participant,
        wallet: &str,
    ) -> crate::Result<()> {
        let participant_key =
            Self::wallet_key(participant.week_start, &participant.wallet);
        let boss_bytes = Self::serialize(boss, "boss record")?;
        let participant_bytes = Self::serialize(participant, "participant record")?;
        let inventory_bytes =
            Self::serialize(&Inventory::default(), "inventory record")?;
        (&self.bosses, &self.participants, &self.inventories)
            .transaction(|(bosses, participants, inventories)| {
                bosses.insert(
                    &Self::week_key(boss.week_start),
                    boss_bytes.as_slice(),
                )?;
                participants
                    .insert(participant_key.as_slice(), participant_bytes.as_slice())?;
                inventories.insert(wallet.as_bytes(), inventory_bytes.as_slice())?;
                Ok::<_, ConflictableTransactionError<()>>(())
            })
            .map_err(|e| anyhow!("overload transaction failed: {e:?}"))?;
        self.bosses.flush().context("flush bosses tree")?;
        self.participants.flush().context("flush participants tree")?;
        self.inventories.flush().context("flush inventories tree")?;
        Ok(())
    }
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> crate::Result<T> {
    serde_json::from_slice(bytes).context("deserialize sled record")
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::SledBossStore;
    use crate::{
        app::boss_store::BossStore,
        model::{
            Character,
            CharacterStatus,
            Inventory,
            Participant,
            WorldBoss,
        },
    };
    use chrono::{
        TimeZone,
        Utc,
    };
    use tempdir::TempDir;

    const WEEK: i64 = 1_787_961_600;

    fn open_store(temp_dir: &TempDir) -> SledBossStore {
        SledBossStore::open(temp_dir.path()).expect("open sled store")
    }

    fn sample_boss() -> WorldBoss {
        WorldBoss {
            name: "Protocol Leviathan".into(),
            week_start: WEEK,
            max_hp: 100_000,
            current_hp: 100_000,
            spawned_at: Utc.timestamp_opt(WEEK, 0).unwrap(),
            killed: false,
        }
    }

    fn sample_participant(wallet: &str) -> Participant {
        Participant {
            wallet: wallet.into(),
            week_start: WEEK,
            joined_at: Utc.timestamp_opt(WEEK, 0).unwrap(),
            passive_damage: 0,
            crit_damage: 0,
            crit_used: false,
        }
    }

    fn sample_character(wallet: &str) -> Character {
        Character {
            wallet: wallet.into(),
            armor: 2,
            engine: 1,
            scanner: 0,
            score: 300,
            status: CharacterStatus::Idle,
            perks: Vec::new(),
        }
    }

    #[test]
    fn sut__when_storing_boss_then_lookup_by_week_returns_it() {
        // given
        let temp_dir = TempDir::new("sled_boss_store").unwrap();
        let mut store = open_store(&temp_dir);
        let boss = sample_boss();

        // when
        store.put_boss(&boss).unwrap();

        // then
        assert_eq!(store.boss(WEEK).unwrap(), Some(boss));
        assert_eq!(store.boss(WEEK + 604_800).unwrap(), None);
    }

    #[test]
    fn sut__when_committing_join_then_participant_and_character_land_together() {
        // given
        let temp_dir = TempDir::new("sled_boss_store_join").unwrap();
        let mut store = open_store(&temp_dir);
        let participant = sample_participant("wallet-a");
        let mut character = sample_character("wallet-a");
        character.status = CharacterStatus::InEncounter;

        // when
        store.commit_join(&participant, &character).unwrap();

        // then
        assert_eq!(store.participant(WEEK, "wallet-a").unwrap(), Some(participant));
        let stored = store.character("wallet-a").unwrap().unwrap();
        assert_eq!(stored.status, CharacterStatus::InEncounter);
    }

    #[test]
    fn sut__when_committing_overload_then_inventory_is_zeroed() {
        // given
        let temp_dir = TempDir::new("sled_boss_store_overload").unwrap();
        let mut store = open_store(&temp_dir);
        let mut boss = sample_boss();
        store.put_boss(&boss).unwrap();
        store
            .put_inventory(
                "wallet-a",
                &Inventory {
                    scrap: 5,
                    crystal: 2,
                    artifact: 1,
                },
            )
            .unwrap();
        let mut participant = sample_participant("wallet-a");
        participant.crit_damage = 21;
        participant.crit_used = true;
        boss.current_hp -= 21;

        // when
        store
            .commit_overload(&boss, &participant, "wallet-a")
            .unwrap();

        // then
        assert!(store.inventory("wallet-a").unwrap().is_empty());
        assert_eq!(store.boss(WEEK).unwrap().unwrap().current_hp, 99_979);
        assert!(store.participant(WEEK, "wallet-a").unwrap().unwrap().crit_used);
    }

    #[test]
    fn participants__scan_is_scoped_to_the_requested_week() {
        // given
        let temp_dir = TempDir::new("sled_boss_store_scan").unwrap();
        let mut store = open_store(&temp_dir);
        let mut other_week = sample_participant("wallet-b");
        other_week.week_start = WEEK + 604_800;
        store.put_participant(&sample_participant("wallet-a")).unwrap();
        store.put_participant(&other_week).unwrap();

        // when
        let this_week = store.participants(WEEK).unwrap();

        // then
        assert_eq!(this_week.len(), 1);
        assert_eq!(this_week[0].wallet, "wallet-a");
    }

    #[test]
    fn active_run_count__counts_distinct_wallets_for_the_week() {
        // given
        let temp_dir = TempDir::new("sled_boss_store_runs").unwrap();
        let mut store = open_store(&temp_dir);
        store.set_active_run(WEEK, "wallet-a").unwrap();
        store.set_active_run(WEEK, "wallet-a").unwrap();
        store.set_active_run(WEEK, "wallet-b").unwrap();
        store.set_active_run(WEEK + 604_800, "wallet-c").unwrap();

        // when / then
        assert_eq!(store.active_run_count(WEEK).unwrap(), 2);
        assert!(store.has_active_run(WEEK, "wallet-b").unwrap());
        assert!(!store.has_active_run(WEEK, "wallet-c").unwrap());
    }

    #[test]
    fn epoch_state__is_lazily_created_with_all_latches_clear() {
        // given
        let temp_dir = TempDir::new("sled_boss_store_epoch").unwrap();
        let mut store = open_store(&temp_dir);

        // when
        let mut state = store.epoch_state(WEEK, "wallet-a").unwrap();

        // then
        assert!(!state.reconnect_used);
        assert!(!state.overload_amp_used);
        assert!(!state.raid_license);

        // when
        state.raid_license = true;
        store.put_epoch_state(&state).unwrap();

        // then
        assert!(store.epoch_state(WEEK, "wallet-a").unwrap().raid_license);
    }
}
