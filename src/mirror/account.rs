// Byte layout and instruction encoding for the mirror program account.
use crate::mirror::transport::{
    Address,
    Instruction,
};
use anyhow::anyhow;
use sha2::{
    Digest,
    Sha256,
};

/// Fixed-offset record the mirror program stores per week.
///
/// | offset | field             | type     |
/// |--------|-------------------|----------|
/// | 0      | discriminator     | [u8; 8]  |
/// | 8      | authority         | [u8; 32] |
/// | 40     | week_start        | i64 LE   |
/// | 48     | max_hp            | u64 LE   |
/// | 56     | current_hp        | u64 LE   |
/// | 64     | total_damage      | u64 LE   |
/// | 72     | participant_count | u32 LE   |
/// | 76     | killed            | u8       |
/// | 77     | spawned_at        | i64 LE   |
/// | 85     | bump              | u8       |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MirrorAccount {
    pub authority: Address,
    pub week_start: i64,
    pub max_hp: u64,
    pub current_hp: u64,
    pub total_damage: u64,
    pub participant_count: u32,
    pub killed: bool,
    pub spawned_at: i64,
    pub bump: u8,
}

pub const MIRROR_ACCOUNT_LEN: usize = 86;

const ACCOUNT_DISCRIMINATOR: &str = "account:BossMirror";

impl MirrorAccount {
    /// Readers must treat a record where HP exceeds the maximum as
    /// uninitialized garbage.
    pub fn is_corrupt(&self) -> bool {
        self.current_hp > self.max_hp
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(MIRROR_ACCOUNT_LEN);
        data.extend_from_slice(&discriminator(ACCOUNT_DISCRIMINATOR));
        data.extend_from_slice(&self.authority.0);
        data.extend_from_slice(&self.week_start.to_le_bytes());
        data.extend_from_slice(&self.max_hp.to_le_bytes());
        data.extend_from_slice(&self.current_hp.to_le_bytes());
        data.extend_from_slice(&self.total_damage.to_le_bytes());
        data.extend_from_slice(&self.participant_count.to_le_bytes());
        data.push(self.killed as u8);
        data.extend_from_slice(&self.spawned_at.to_le_bytes());
        data.push(self.bump);
        data
    }

    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        if data.len() < MIRROR_ACCOUNT_LEN {
            return Err(anyhow!(
                "mirror account data is {} bytes, expected {}",
                data.len(),
                MIRROR_ACCOUNT_LEN
            ));
        }
        let expected = discriminator(ACCOUNT_DISCRIMINATOR);
        if data[0..8] != expected {
            return Err(anyhow!("mirror account discriminator mismatch"));
        }
        Ok(Self {
            authority: Address(data[8..40].try_into().expect("sliced to 32 bytes")),
            week_start: i64::from_le_bytes(
                data[40..48].try_into().expect("sliced to 8 bytes"),
            ),
            max_hp: u64::from_le_bytes(
                data[48..56].try_into().expect("sliced to 8 bytes"),
            ),
            current_hp: u64::from_le_bytes(
                data[56..64].try_into().expect("sliced to 8 bytes"),
            ),
            total_damage: u64::from_le_bytes(
                data[64..72].try_into().expect("sliced to 8 bytes"),
            ),
            participant_count: u32::from_le_bytes(
                data[72..76].try_into().expect("sliced to 4 bytes"),
            ),
            killed: data[76] != 0,
            spawned_at: i64::from_le_bytes(
                data[77..85].try_into().expect("sliced to 8 bytes"),
            ),
            bump: data[85],
        })
    }
}

/// Deterministic per-week account address under the mirror program,
/// derived from the `"boss"` seed and the little-endian week key.
pub fn mirror_address(program: &Address, week_start: i64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"boss");
    hasher.update(week_start.to_le_bytes());
    hasher.update(program.0);
    Address(hasher.finalize().into())
}

/// First eight bytes of `sha256(name)`, the dispatch tag the program
/// expects at the head of instruction data.
pub fn discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(name.as_bytes());
    digest[0..8].try_into().expect("digest is 32 bytes")
}

pub fn initialize_instruction(
    program: &Address,
    mirror: &Address,
    authority: &Address,
    week_start: i64,
    max_hp: u64,
    spawned_at: i64,
) -> Instruction {
    let mut data = discriminator("global:initialize_boss").to_vec();
    data.extend_from_slice(&week_start.to_le_bytes());
    data.extend_from_slice(&max_hp.to_le_bytes());
    data.extend_from_slice(&spawned_at.to_le_bytes());
    Instruction {
        program: *program,
        accounts: vec![*mirror, *authority],
        data,
    }
}

pub fn delegate_instruction(
    program: &Address,
    mirror: &Address,
    authority: &Address,
) -> Instruction {
    Instruction {
        program: *program,
        accounts: vec![*mirror, *authority],
        data: discriminator("global:delegate_boss").to_vec(),
    }
}

pub fn record_damage_instruction(
    program: &Address,
    mirror: &Address,
    authority: &Address,
    damage_delta: u64,
    participant_count: u32,
) -> Instruction {
    let mut data = discriminator("global:record_damage").to_vec();
    data.extend_from_slice(&damage_delta.to_le_bytes());
    data.extend_from_slice(&participant_count.to_le_bytes());
    Instruction {
        program: *program,
        accounts: vec![*mirror, *authority],
        data,
    }
}

pub fn finalize_instruction(
    program: &Address,
    mirror: &Address,
    authority: &Address,
) -> Instruction {
    Instruction {
        program: *program,
        accounts: vec![*mirror, *authority],
        data: discriminator("global:commit_and_undelegate").to_vec(),
    }
}
