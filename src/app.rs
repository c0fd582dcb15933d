use crate::{
    clock::{
        Clock,
        PhasePolicy,
        week_key,
    },
    engine::{
        BossEngine,
        Chance,
        EngineResult,
    },
    mirror::{
        MirrorSynchronizer,
        account::MirrorAccount,
        transport::{
            Address,
            ChainClient,
            Transaction,
        },
    },
    model::{
        BossView,
        Participant,
        ResolutionView,
        StatusView,
    },
    payment::PaymentVerifier,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::sync::oneshot;

pub mod actix_game_api;
pub mod boss_store;
pub mod in_memory_store;
pub mod sled_store;


use boss_store::BossStore;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Exit,
}

/// Reply to an overload. When the caller asked to cosign, `cosign` carries
/// the partially signed transaction plus the cumulative total to report back
/// once it lands.
#[derive(Debug, Serialize, Deserialize)]
pub struct OverloadReply {
    pub damage: u64,
    pub boss_killed: bool,
    pub cosign: Option<CosignBundle>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CosignBundle {
    pub transaction: Transaction,
    pub mirror_total: u64,
}

/// Low-latency snapshot decoded from the mirrored account.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    pub week_start: i64,
    pub max_hp: u64,
    pub current_hp: u64,
    pub total_damage: u64,
    pub participant_count: u32,
    pub killed: bool,
}

impl From<MirrorAccount> for MirrorSnapshot {
    fn from(record: MirrorAccount) -> Self {
        MirrorSnapshot {
            week_start: record.week_start,
            max_hp: record.max_hp,
            current_hp: record.current_hp,
            total_damage: record.total_damage,
            participant_count: record.participant_count,
            killed: record.killed,
        }
    }
}

/// One gameplay request, with a responder for the synchronous answer.
#[derive(Debug)]
pub enum Command {
    Spawn {
        respond: oneshot::Sender<EngineResult<BossView>>,
    },
    Status {
        wallet: Option<String>,
        respond: oneshot::Sender<EngineResult<StatusView>>,
    },
    Join {
        wallet: String,
        respond: oneshot::Sender<EngineResult<Participant>>,
    },
    Overload {
        wallet: String,
        cosigner: Option<Address>,
        respond: oneshot::Sender<EngineResult<OverloadReply>>,
    },
    ConfirmCosignedPush {
        week_start: i64,
        mirror_total: u64,
        respond: oneshot::Sender<()>,
    },
    Reconnect {
        wallet: String,
        signature: String,
        respond: oneshot::Sender<EngineResult<()>>,
    },
    PurchaseAmplifier {
        wallet: String,
        signature: String,
        respond: oneshot::Sender<EngineResult<()>>,
    },
    PurchaseRaidLicense {
        wallet: String,
        signature: String,
        respond: oneshot::Sender<EngineResult<()>>,
    },
    Resolve {
        week_start: Option<i64>,
        respond: oneshot::Sender<EngineResult<ResolutionView>>,
    },
    MirrorView {
        respond: oneshot::Sender<Option<MirrorSnapshot>>,
    },
}

/// Where gameplay commands come from. The HTTP layer is one implementation;
/// tests drive the loop through a bare channel.
pub trait GameApi {
    fn next_command(&mut self) -> impl Future<Output = crate::Result<Command>>;
}

/// Single consumer of all gameplay commands. Because every mutation funnels
/// through this loop, racing requests are applied one at a time and the
/// store never sees a lost update. Mirror work is spawned detached after
/// the authoritative commit.
pub struct App<API, Store, Payments, Time, Luck, Chain> {
    api: API,
    engine: BossEngine<Store, Payments, Time, Luck>,
    mirror: Arc<MirrorSynchronizer<Chain>>,
    clock: Time,
    phase: PhasePolicy,
    tick_period: Duration,
    active_week: Option<i64>,
}

impl<API, Store, Payments, Time, Luck, Chain>
    App<API, Store, Payments, Time, Luck, Chain>
where
    API: GameApi,
    Store: BossStore,
    Payments: PaymentVerifier,
    Time: Clock + Clone,
    Luck: Chance,
    Chain: ChainClient + 'static,
{
    pub fn new(
        api: API,
        engine: BossEngine<Store, Payments, Time, Luck>,
        mirror: Arc<MirrorSynchronizer<Chain>>,
        clock: Time,
        phase: PhasePolicy,
        tick_period: Duration,
    ) -> Self {
        Self {
            api,
            engine,
            mirror,
            clock,
            phase,
            tick_period,
            active_week: None,
        }
    }

    pub async fn run(
        &mut self,
        interrupt: impl Future<Output = ()>,
    ) -> crate::Result<RunState> {
        tokio::select! {
            _ = interrupt => Ok(RunState::Exit),
            command = self.api.next_command() => {
                self.handle_command(command?).await;
                Ok(RunState::Continue)
            }
            _ = tokio::time::sleep(self.tick_period) => {
                self.run_tick().await;
                Ok(RunState::Continue)
            }
        }
    }

    /// Accrual sweep plus the fight lifecycle around it: pushing fresh
    /// totals, finalizing on a kill, and finalizing the previous week once
    /// the window closes.
    async fn run_tick(&mut self) {
        match self.engine.tick() {
            Ok(Some(summary)) => {
                self.active_week = Some(summary.week_start);
                if summary.killed_now {
                    self.spawn_push_and_finalize(summary.week_start);
                } else {
                    self.spawn_push(summary.week_start);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("accrual tick failed: {e}"),
        }

        let now = self.clock.now();
        if let Some(week_start) = self.active_week {
            let week_over = week_key(now) != week_start;
            if week_over || !self.phase.is_open(now) {
                tracing::info!("fight window closed, finalizing week {week_start}");
                let mirror = self.mirror.clone();
                tokio::spawn(async move { mirror.finalize(week_start).await });
                self.active_week = None;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Spawn { respond } => {
                let result = self.engine.spawn_or_get();
                if let Ok(boss) = &result {
                    self.active_week = Some(boss.week_start);
                    self.spawn_initialize(boss.week_start);
                }
                let _ = respond.send(result.map(|boss| (&boss).into()));
            }
            Command::Status { wallet, respond } => {
                // The read is served from freshly recomputed accrual.
                self.run_tick().await;
                let _ = respond.send(self.engine.status(wallet.as_deref()));
            }
            Command::Join { wallet, respond } => {
                let _ = respond.send(self.engine.join(&wallet));
            }
            Command::Overload {
                wallet,
                cosigner,
                respond,
            } => {
                let reply = self.handle_overload(&wallet, cosigner).await;
                let _ = respond.send(reply);
            }
            Command::ConfirmCosignedPush {
                week_start,
                mirror_total,
                respond,
            } => {
                self.mirror
                    .acknowledge_player_push(week_start, mirror_total)
                    .await;
                let _ = respond.send(());
            }
            Command::Reconnect {
                wallet,
                signature,
                respond,
            } => {
                let _ = respond.send(self.engine.reconnect(&wallet, &signature).await);
            }
            Command::PurchaseAmplifier {
                wallet,
                signature,
                respond,
            } => {
                let result = self
                    .engine
                    .purchase_overload_amplifier(&wallet, &signature)
                    .await;
                let _ = respond.send(result);
            }
            Command::PurchaseRaidLicense {
                wallet,
                signature,
                respond,
            } => {
                let result =
                    self.engine.purchase_raid_license(&wallet, &signature).await;
                let _ = respond.send(result);
            }
            Command::Resolve {
                week_start,
                respond,
            } => {
                let week_start = week_start.unwrap_or_else(|| self.engine.current_week());
                let _ = respond.send(self.engine.resolve(week_start));
            }
            Command::MirrorView { respond } => {
                let week_start = self.engine.current_week();
                let snapshot = self
                    .mirror
                    .read_mirror(week_start)
                    .await
                    .map(MirrorSnapshot::from);
                let _ = respond.send(snapshot);
            }
        }
    }

    async fn handle_overload(
        &mut self,
        wallet: &str,
        cosigner: Option<Address>,
    ) -> EngineResult<OverloadReply> {
        let outcome = self.engine.overload(wallet)?;
        let week_start = self.engine.current_week();

        let cosign = match cosigner {
            Some(player) => match self.engine.totals(week_start)? {
                Some(totals) => self
                    .mirror
                    .build_player_push(totals, player)
                    .await
                    .map(|transaction| CosignBundle {
                        transaction,
                        mirror_total: totals.total_damage,
                    }),
                None => None,
            },
            None => {
                if outcome.boss_killed {
                    self.spawn_push_and_finalize(week_start);
                } else {
                    self.spawn_push(week_start);
                }
                None
            }
        };

        Ok(OverloadReply {
            damage: outcome.damage,
            boss_killed: outcome.boss_killed,
            cosign,
        })
    }

    fn spawn_initialize(&self, week_start: i64) {
        if let Some(totals) = self.totals_for(week_start) {
            let mirror = self.mirror.clone();
            tokio::spawn(async move { mirror.initialize(totals).await });
        }
    }

    fn spawn_push(&self, week_start: i64) {
        if let Some(totals) = self.totals_for(week_start) {
            let mirror = self.mirror.clone();
            tokio::spawn(async move { mirror.push(totals).await });
        }
    }

    fn spawn_push_and_finalize(&self, week_start: i64) {
        if let Some(totals) = self.totals_for(week_start) {
            let mirror = self.mirror.clone();
            tokio::spawn(async move {
                mirror.push(totals).await;
                mirror.finalize(week_start).await;
            });
        }
    }

    fn totals_for(&self, week_start: i64) -> Option<crate::model::FightTotals> {
        match self.engine.totals(week_start) {
            Ok(totals) => totals,
            Err(e) => {
                tracing::warn!("reading fight totals for mirror failed: {e}");
                None
            }
        }
    }
}
