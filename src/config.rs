use serde::{
    Deserialize,
    Serialize,
};

/// Tuning constants for the weekly boss encounter. Defaults match the
/// production deployment; tests construct their own values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    pub boss_name: String,
    pub base_hp: u64,
    pub scaling_factor: f64,
    /// Inventory weights applied by the overload burn.
    pub overload_scrap_weight: u64,
    pub overload_crystal_weight: u64,
    pub overload_artifact_weight: u64,
    /// Multiplier for a purchased overload amplifier.
    pub amplifier_multiplier: f64,
    /// Multiplier for the critical_overload perk.
    pub crit_perk_multiplier: f64,
    /// Passive efficiency with an active raid license.
    pub raid_license_efficiency: f64,
    /// Chance per destabilization roll, in [0, 1].
    pub destabilize_chance: f64,
    /// Minimum time between destabilization rolls.
    pub roll_interval_minutes: i64,
    /// Downtime after which destabilization clears for free.
    pub free_recovery_minutes: i64,
    /// Monetized action prices, in SKR.
    pub reconnect_cost: u64,
    pub amplifier_cost: u64,
    pub raid_license_cost: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            boss_name: String::from("Protocol Leviathan"),
            base_hp: 100_000,
            scaling_factor: 0.8,
            overload_scrap_weight: 1,
            overload_crystal_weight: 3,
            overload_artifact_weight: 10,
            amplifier_multiplier: 1.1,
            crit_perk_multiplier: 1.5,
            raid_license_efficiency: 1.05,
            destabilize_chance: 0.10,
            roll_interval_minutes: 30,
            free_recovery_minutes: 15,
            reconnect_cost: 25,
            amplifier_cost: 18,
            raid_license_cost: 35,
        }
    }
}
