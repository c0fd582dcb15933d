use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Perk that multiplies overload damage by the crit bonus.
pub const CRIT_PERK: &str = "critical_overload";

/// One boss per epoch week, keyed by the week start timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldBoss {
    pub name: String,
    pub week_start: i64,
    pub max_hp: u64,
    pub current_hp: u64,
    pub spawned_at: DateTime<Utc>,
    pub killed: bool,
}

impl WorldBoss {
    /// Subtract damage, flooring HP at zero and latching `killed`.
    /// Damage after the kill is ignored.
    pub fn apply_damage(&mut self, damage: u64) {
        if self.killed {
            return;
        }
        self.current_hp = self.current_hp.saturating_sub(damage);
        if self.current_hp == 0 {
            self.killed = true;
        }
    }
}

/// A player enrolled in the current week's fight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub wallet: String,
    pub week_start: i64,
    pub joined_at: DateTime<Utc>,
    pub passive_damage: u64,
    pub crit_damage: u64,
    pub crit_used: bool,
}

impl Participant {
    pub fn total_damage(&self) -> u64 {
        self.passive_damage + self.crit_damage
    }
}

/// Per-wallet, per-week latches and destabilization bookkeeping.
/// Exists independently of the boss row and is created lazily.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochPlayerState {
    pub wallet: String,
    pub week_start: i64,
    pub reconnect_used: bool,
    pub overload_amp_used: bool,
    pub raid_license: bool,
    pub destabilized: bool,
    pub destabilized_at: Option<DateTime<Utc>>,
    pub last_roll_at: Option<DateTime<Utc>>,
}

impl EpochPlayerState {
    pub fn new(wallet: String, week_start: i64) -> Self {
        Self {
            wallet,
            week_start,
            reconnect_used: false,
            overload_amp_used: false,
            raid_license: false,
            destabilized: false,
            destabilized_at: None,
            last_roll_at: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterStatus {
    Idle,
    InEncounter,
    OnMission,
}

/// Gameplay profile owned by the surrounding game loops. The fight only
/// reads gear levels and score and flips the status on join.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub wallet: String,
    pub armor: u64,
    pub engine: u64,
    pub scanner: u64,
    pub score: u64,
    pub status: CharacterStatus,
    pub perks: Vec<String>,
}

impl Character {
    pub fn has_perk(&self, perk: &str) -> bool {
        self.perks.iter().any(|p| p == perk)
    }
}

/// Off-epoch resource stock consumed wholesale by an overload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub scrap: u64,
    pub crystal: u64,
    pub artifact: u64,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        self.scrap == 0 && self.crystal == 0 && self.artifact == 0
    }
}

/// Precondition failures surfaced to the caller with a stable code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    BossNotSpawned,
    BossAlreadyKilled,
    BossNotResolved,
    PhaseClosed,
    NoActiveRun,
    AlreadyJoined,
    NotJoined,
    NoCharacter,
    CharacterBusy,
    OverloadAlreadyUsed,
    NoInventory,
    ReconnectAlreadyUsed,
    NotDestabilized,
    AmplifierAlreadyOwned,
    RaidLicenseAlreadyOwned,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::BossNotSpawned => "BOSS_NOT_SPAWNED",
            Rejection::BossAlreadyKilled => "BOSS_ALREADY_KILLED",
            Rejection::BossNotResolved => "BOSS_NOT_RESOLVED",
            Rejection::PhaseClosed => "PHASE_CLOSED",
            Rejection::NoActiveRun => "NO_ACTIVE_RUN",
            Rejection::AlreadyJoined => "ALREADY_JOINED",
            Rejection::NotJoined => "NOT_JOINED",
            Rejection::NoCharacter => "NO_CHARACTER",
            Rejection::CharacterBusy => "CHARACTER_BUSY",
            Rejection::OverloadAlreadyUsed => "OVERLOAD_ALREADY_USED",
            Rejection::NoInventory => "NO_INVENTORY",
            Rejection::ReconnectAlreadyUsed => "RECONNECT_ALREADY_USED",
            Rejection::NotDestabilized => "NOT_DESTABILIZED",
            Rejection::AmplifierAlreadyOwned => "AMPLIFIER_ALREADY_OWNED",
            Rejection::RaidLicenseAlreadyOwned => "RAID_LICENSE_ALREADY_OWNED",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure taxonomy for engine operations. Domain rejections and payment
/// failures are reported to the caller; internal errors carry the cause.
#[derive(Debug)]
pub enum EngineError {
    Rejected(Rejection),
    Payment(String),
    Internal(anyhow::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Rejected(rejection) => write!(f, "rejected: {rejection}"),
            EngineError::Payment(reason) => write!(f, "payment failed: {reason}"),
            EngineError::Internal(source) => write!(f, "internal error: {source:#}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<Rejection> for EngineError {
    fn from(rejection: Rejection) -> Self {
        EngineError::Rejected(rejection)
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(source: anyhow::Error) -> Self {
        EngineError::Internal(source)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BossView {
    pub name: String,
    pub week_start: i64,
    pub max_hp: u64,
    pub current_hp: u64,
    pub killed: bool,
    pub spawned_at: DateTime<Utc>,
}

impl From<&WorldBoss> for BossView {
    fn from(boss: &WorldBoss) -> Self {
        BossView {
            name: boss.name.clone(),
            week_start: boss.week_start,
            max_hp: boss.max_hp,
            current_hp: boss.current_hp,
            killed: boss.killed,
            spawned_at: boss.spawned_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerShare {
    pub passive_damage: u64,
    pub crit_damage: u64,
    pub destabilized: bool,
    /// `total / grand_total`, zero when nothing has been dealt.
    pub share: f64,
}

/// Read-only fight report, optionally focused on one wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub boss: BossView,
    pub participant_count: u32,
    pub total_damage: u64,
    pub player: Option<PlayerShare>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantShare {
    pub wallet: String,
    pub damage: u64,
    pub fraction: f64,
}

/// Final settlement: contribution fractions for downstream rewards.
/// Pure read, safe to recompute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionView {
    pub week_start: i64,
    pub killed: bool,
    pub total_damage: u64,
    pub shares: Vec<ParticipantShare>,
}

/// Result of one passive accrual sweep over all participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickSummary {
    pub week_start: i64,
    pub participant_count: u32,
    pub total_damage: u64,
    pub killed_now: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverloadOutcome {
    pub damage: u64,
    pub boss_killed: bool,
}

/// Aggregate fight totals for one week, fed to the on-chain mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FightTotals {
    pub week_start: i64,
    pub max_hp: u64,
    pub current_hp: u64,
    pub total_damage: u64,
    pub participant_count: u32,
    pub killed: bool,
    pub spawned_at: i64,
}
