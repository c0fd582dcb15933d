use crate::{
    app::boss_store::BossStore,
    clock::{
        Clock,
        PhasePolicy,
        week_key,
    },
    config::GameConfig,
    model::{
        CRIT_PERK,
        Character,
        CharacterStatus,
        EngineError,
        FightTotals,
        OverloadOutcome,
        Participant,
        ParticipantShare,
        PlayerShare,
        Rejection,
        ResolutionView,
        StatusView,
        TickSummary,
        WorldBoss,
    },
    payment::{
        PaymentClaim,
        PaymentVerifier,
    },
};
use chrono::Duration;
use rand::Rng;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests;

/// Randomness behind the destabilization roll.
pub trait Chance {
    /// Uniform sample in [0, 1).
    fn roll(&mut self) -> f64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomChance;

impl Chance for RandomChance {
    fn roll(&mut self) -> f64 {
        rand::rng().random()
    }
}

/// Always returns the same sample; tests pick a value on either side of the
/// destabilization threshold.
#[derive(Clone, Copy, Debug)]
pub struct FixedChance(pub f64);

impl Chance for FixedChance {
    fn roll(&mut self) -> f64 {
        self.0
    }
}

/// The boss state machine. All gameplay mutations go through here; the
/// caller owns serialization of concurrent requests.
pub struct BossEngine<Store, Payments, Time, Luck> {
    store: Store,
    payments: Payments,
    clock: Time,
    chance: Luck,
    config: GameConfig,
    phase: PhasePolicy,
}

impl<Store, Payments, Time, Luck> BossEngine<Store, Payments, Time, Luck>
where
    Store: BossStore,
    Payments: PaymentVerifier,
    Time: Clock,
    Luck: Chance,
{
    pub fn new(
        store: Store,
        payments: Payments,
        clock: Time,
        chance: Luck,
        config: GameConfig,
        phase: PhasePolicy,
    ) -> Self {
        Self {
            store,
            payments,
            clock,
            chance,
            config,
            phase,
        }
    }

    pub fn current_week(&self) -> i64 {
        week_key(self.clock.now())
    }

    /// Get-or-create for the current week. HP scales with the number of
    /// wallets holding an active run, floored at the configured base.
    pub fn spawn_or_get(&mut self) -> EngineResult<WorldBoss> {
        let now = self.clock.now();
        if !self.phase.is_open(now) {
            return Err(Rejection::PhaseClosed.into());
        }
        let week_start = week_key(now);
        if let Some(existing) = self.store.boss(week_start)? {
            return Ok(existing);
        }

        let active_players = self.store.active_run_count(week_start)?;
        let scaled = (self.config.base_hp as f64
            * active_players as f64
            * self.config.scaling_factor)
            .floor() as u64;
        let max_hp = self.config.base_hp.max(scaled);
        let boss = WorldBoss {
            name: self.config.boss_name.clone(),
            week_start,
            max_hp,
            current_hp: max_hp,
            spawned_at: now,
            killed: false,
        };
        self.store.put_boss(&boss)?;
        tracing::info!(
            "spawned {} for week {} with {} HP ({} active players)",
            boss.name,
            week_start,
            max_hp,
            active_players
        );
        Ok(boss)
    }

    pub fn join(&mut self, wallet: &str) -> EngineResult<Participant> {
        let now = self.clock.now();
        let week_start = week_key(now);
        let boss = self
            .store
            .boss(week_start)?
            .ok_or(Rejection::BossNotSpawned)?;
        if boss.killed {
            return Err(Rejection::BossAlreadyKilled.into());
        }
        if !self.store.has_active_run(week_start, wallet)? {
            return Err(Rejection::NoActiveRun.into());
        }
        if self.store.participant(week_start, wallet)?.is_some() {
            return Err(Rejection::AlreadyJoined.into());
        }
        let mut character = self
            .store
            .character(wallet)?
            .ok_or(Rejection::NoCharacter)?;
        if character.status != CharacterStatus::Idle {
            return Err(Rejection::CharacterBusy.into());
        }

        let participant = Participant {
            wallet: wallet.to_string(),
            week_start,
            joined_at: now,
            passive_damage: 0,
            crit_damage: 0,
            crit_used: false,
        };
        character.status = CharacterStatus::InEncounter;
        self.store.commit_join(&participant, &character)?;
        Ok(participant)
    }

    /// One accrual sweep: destabilization upkeep, then a full passive
    /// recompute per participant, then boss HP derived from the totals.
    /// Returns `None` when no boss exists this week.
    pub fn tick(&mut self) -> EngineResult<Option<TickSummary>> {
        let now = self.clock.now();
        let week_start = week_key(now);
        let Some(mut boss) = self.store.boss(week_start)? else {
            return Ok(None);
        };

        let participants = self.store.participants(week_start)?;
        let mut total_damage = 0u64;
        let participant_count = participants.len() as u32;

        for mut participant in participants {
            if !boss.killed {
                let accrue = self.destabilization_upkeep(&mut participant, now)?;
                if accrue {
                    self.recompute_passive(&mut participant, now)?;
                    self.store.put_participant(&participant)?;
                }
            }
            total_damage += participant.total_damage();
        }

        let mut killed_now = false;
        if !boss.killed {
            boss.current_hp = boss.max_hp.saturating_sub(total_damage);
            if boss.current_hp == 0 {
                boss.killed = true;
                killed_now = true;
                tracing::info!("{} killed by passive accrual", boss.name);
            }
            self.store.put_boss(&boss)?;
        }

        Ok(Some(TickSummary {
            week_start,
            participant_count,
            total_damage,
            killed_now,
        }))
    }

    /// Returns whether this participant accrues damage on this tick.
    fn destabilization_upkeep(
        &mut self,
        participant: &mut Participant,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<bool> {
        let mut state = self
            .store
            .epoch_state(participant.week_start, &participant.wallet)?;

        if state.destabilized {
            let free_recovery =
                Duration::minutes(self.config.free_recovery_minutes);
            let recovered = state
                .destabilized_at
                .is_some_and(|at| now - at >= free_recovery);
            if !state.reconnect_used && recovered {
                state.destabilized = false;
                state.destabilized_at = None;
                self.store.put_epoch_state(&state)?;
                return Ok(true);
            }
            return Ok(false);
        }

        if state.reconnect_used {
            return Ok(true);
        }

        let roll_interval = Duration::minutes(self.config.roll_interval_minutes);
        let due = state
            .last_roll_at
            .is_none_or(|at| now - at >= roll_interval);
        if !due {
            return Ok(true);
        }

        state.last_roll_at = Some(now);
        if self.chance.roll() < self.config.destabilize_chance {
            state.destabilized = true;
            state.destabilized_at = Some(now);
            self.store.put_epoch_state(&state)?;
            tracing::debug!("{} destabilized", participant.wallet);
            return Ok(false);
        }
        self.store.put_epoch_state(&state)?;
        Ok(true)
    }

    /// Full recompute from elapsed time, never an increment. The same inputs
    /// at the same instant always produce the same value.
    fn recompute_passive(
        &mut self,
        participant: &mut Participant,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<()> {
        let Some(character) = self.store.character(&participant.wallet)? else {
            tracing::warn!(
                "participant {} has no character, skipping accrual",
                participant.wallet
            );
            return Ok(());
        };
        let state = self
            .store
            .epoch_state(participant.week_start, &participant.wallet)?;

        let base_power = base_power(&character);
        let efficiency = if state.raid_license {
            self.config.raid_license_efficiency
        } else {
            1.0
        };
        let hours_in_fight =
            (now - participant.joined_at).num_seconds().max(0) as f64 / 3600.0;
        participant.passive_damage =
            (base_power * efficiency * hours_in_fight).floor() as u64;
        Ok(())
    }

    /// One-shot inventory burn. The whole stock converts to damage in a
    /// single commit and cannot be repeated this week.
    pub fn overload(&mut self, wallet: &str) -> EngineResult<OverloadOutcome> {
        let week_start = self.current_week();
        let mut boss = self
            .store
            .boss(week_start)?
            .ok_or(Rejection::BossNotSpawned)?;
        if boss.killed {
            return Err(Rejection::BossAlreadyKilled.into());
        }
        let mut participant = self
            .store
            .participant(week_start, wallet)?
            .ok_or(Rejection::NotJoined)?;
        if participant.crit_used {
            return Err(Rejection::OverloadAlreadyUsed.into());
        }

        let inventory = self.store.inventory(wallet)?;
        if inventory.is_empty() {
            return Err(Rejection::NoInventory.into());
        }
        let raw = inventory.scrap * self.config.overload_scrap_weight
            + inventory.crystal * self.config.overload_crystal_weight
            + inventory.artifact * self.config.overload_artifact_weight;

        let state = self.store.epoch_state(week_start, wallet)?;
        let mut damage = raw as f64;
        if state.overload_amp_used {
            damage *= self.config.amplifier_multiplier;
        }
        let has_crit_perk = self
            .store
            .character(wallet)?
            .is_some_and(|c| c.has_perk(CRIT_PERK));
        if has_crit_perk {
            damage *= self.config.crit_perk_multiplier;
        }
        let damage = damage.floor() as u64;

        participant.crit_damage = damage;
        participant.crit_used = true;
        boss.apply_damage(damage);
        self.store.commit_overload(&boss, &participant, wallet)?;

        tracing::info!(
            "{} overloaded for {} damage, boss at {} HP",
            wallet,
            damage,
            boss.current_hp
        );
        Ok(OverloadOutcome {
            damage,
            boss_killed: boss.killed,
        })
    }

    /// Read-only fight report. Never spawns and never mutates.
    pub fn status(&self, wallet: Option<&str>) -> EngineResult<StatusView> {
        let week_start = self.current_week();
        let boss = self
            .store
            .boss(week_start)?
            .ok_or(Rejection::BossNotSpawned)?;
        let participants = self.store.participants(week_start)?;
        let total_damage: u64 =
            participants.iter().map(Participant::total_damage).sum();

        let mut player = None;
        if let Some(wallet) = wallet {
            if let Some(p) = participants.iter().find(|p| p.wallet == wallet) {
                let share = if total_damage == 0 {
                    0.0
                } else {
                    p.total_damage() as f64 / total_damage as f64
                };
                let destabilized =
                    self.store.epoch_state(week_start, wallet)?.destabilized;
                player = Some(PlayerShare {
                    passive_damage: p.passive_damage,
                    crit_damage: p.crit_damage,
                    destabilized,
                    share,
                });
            }
        }

        Ok(StatusView {
            boss: (&boss).into(),
            participant_count: participants.len() as u32,
            total_damage,
            player,
        })
    }

    /// Final settlement. Available once the boss is dead or the fight
    /// window has closed; pure and repeatable.
    pub fn resolve(&self, week_start: i64) -> EngineResult<ResolutionView> {
        let boss = self
            .store
            .boss(week_start)?
            .ok_or(Rejection::BossNotSpawned)?;
        let now = self.clock.now();
        let same_week = week_key(now) == week_start;
        if !boss.killed && same_week && self.phase.is_open(now) {
            return Err(Rejection::BossNotResolved.into());
        }

        let participants = self.store.participants(week_start)?;
        let total_damage: u64 =
            participants.iter().map(Participant::total_damage).sum();
        let shares = participants
            .iter()
            .map(|p| {
                let damage = p.total_damage();
                let fraction = if total_damage == 0 {
                    0.0
                } else {
                    damage as f64 / total_damage as f64
                };
                ParticipantShare {
                    wallet: p.wallet.clone(),
                    damage,
                    fraction,
                }
            })
            .collect();

        Ok(ResolutionView {
            week_start,
            killed: boss.killed,
            total_damage,
            shares,
        })
    }

    /// Clear destabilization immediately for a fee. The downtime is pushed
    /// onto `joined_at` so the recompute stays continuous across the gap.
    pub async fn reconnect(
        &mut self,
        wallet: &str,
        signature: &str,
    ) -> EngineResult<()> {
        let now = self.clock.now();
        let week_start = week_key(now);
        let mut state = self.store.epoch_state(week_start, wallet)?;
        if state.reconnect_used {
            return Err(Rejection::ReconnectAlreadyUsed.into());
        }
        if !state.destabilized {
            return Err(Rejection::NotDestabilized.into());
        }

        self.verify_payment(wallet, signature, self.config.reconnect_cost, "reconnect")
            .await?;

        let downtime = state
            .destabilized_at
            .map(|at| now - at)
            .unwrap_or_else(Duration::zero);
        if let Some(mut participant) = self.store.participant(week_start, wallet)? {
            participant.joined_at += downtime;
            self.store.put_participant(&participant)?;
        }
        state.destabilized = false;
        state.destabilized_at = None;
        state.reconnect_used = true;
        self.store.put_epoch_state(&state)?;
        Ok(())
    }

    pub async fn purchase_overload_amplifier(
        &mut self,
        wallet: &str,
        signature: &str,
    ) -> EngineResult<()> {
        let week_start = self.current_week();
        let mut state = self.store.epoch_state(week_start, wallet)?;
        if state.overload_amp_used {
            return Err(Rejection::AmplifierAlreadyOwned.into());
        }
        self.verify_payment(
            wallet,
            signature,
            self.config.amplifier_cost,
            "overload_amplifier",
        )
        .await?;
        state.overload_amp_used = true;
        self.store.put_epoch_state(&state)?;
        Ok(())
    }

    pub async fn purchase_raid_license(
        &mut self,
        wallet: &str,
        signature: &str,
    ) -> EngineResult<()> {
        let week_start = self.current_week();
        let mut state = self.store.epoch_state(week_start, wallet)?;
        if state.raid_license {
            return Err(Rejection::RaidLicenseAlreadyOwned.into());
        }
        self.verify_payment(
            wallet,
            signature,
            self.config.raid_license_cost,
            "raid_license",
        )
        .await?;
        state.raid_license = true;
        self.store.put_epoch_state(&state)?;
        Ok(())
    }

    async fn verify_payment(
        &self,
        wallet: &str,
        signature: &str,
        amount: u64,
        action: &str,
    ) -> EngineResult<()> {
        let claim = PaymentClaim {
            signature: signature.to_string(),
            wallet: wallet.to_string(),
            amount,
            action: action.to_string(),
            week_start: self.current_week(),
        };
        self.payments
            .verify_and_record(&claim)
            .await
            .map_err(|e| EngineError::Payment(format!("{e:#}")))
    }

    /// Aggregate totals for the mirror push. `None` when no boss exists.
    pub fn totals(&self, week_start: i64) -> crate::Result<Option<FightTotals>> {
        let Some(boss) = self.store.boss(week_start)? else {
            return Ok(None);
        };
        let participants = self.store.participants(week_start)?;
        let total_damage = participants.iter().map(Participant::total_damage).sum();
        Ok(Some(FightTotals {
            week_start,
            max_hp: boss.max_hp,
            current_hp: boss.current_hp,
            total_damage,
            participant_count: participants.len() as u32,
            killed: boss.killed,
            spawned_at: boss.spawned_at.timestamp(),
        }))
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}

// The score term keeps its fractional part; only the final accrual floors.
fn base_power(character: &Character) -> f64 {
    10.0 + 3.0 * character.armor as f64
        + 2.0 * character.engine as f64
        + 2.0 * character.scanner as f64
        + character.score as f64 / 100.0
}
