use crate::Result;
use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

/// 32-byte account or program address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(raw: &str) -> Result<Self> {
        let bytes = hex::decode(raw.trim())?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("address must be 32 bytes"))?;
        Ok(Address(arr))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// On-ledger account as returned by the read path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub owner: Address,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program: Address,
    pub accounts: Vec<Address>,
    pub data: Vec<u8>,
}

/// A transaction carrying zero or more signatures. A transaction handed to a
/// player for cosigning ships with only the server's signature attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub fee_payer: Address,
    pub instructions: Vec<Instruction>,
    pub signatures: Vec<(Address, Vec<u8>)>,
}

impl Transaction {
    pub fn new(fee_payer: Address, instructions: Vec<Instruction>) -> Self {
        Self {
            fee_payer,
            instructions,
            signatures: Vec::new(),
        }
    }

    /// Canonical bytes covered by every signature.
    pub fn message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(&self.fee_payer.0);
        for instruction in &self.instructions {
            message.extend_from_slice(&instruction.program.0);
            for account in &instruction.accounts {
                message.extend_from_slice(&account.0);
            }
            message.extend_from_slice(&(instruction.data.len() as u32).to_le_bytes());
            message.extend_from_slice(&instruction.data);
        }
        message
    }
}

/// Network access to the base ledger, the executor directory, and whichever
/// execution endpoint a delegated account currently lives on. All calls use
/// bounded timeouts; a timeout is an ordinary error.
pub trait ChainClient: Send + Sync {
    /// Read an account from the base ledger. `None` means not created yet.
    fn account(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Option<AccountInfo>>> + Send;

    /// Resolve the execution endpoint currently serving a delegated account.
    fn resolve_executor(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Url>> + Send;

    /// Dry-run a transaction at an endpoint. `Err` covers both transport
    /// failures and program-level rejection.
    fn simulate(
        &self,
        endpoint: &Url,
        transaction: &Transaction,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Send a transaction and wait for confirmation. `Ok` means landed.
    fn submit(
        &self,
        endpoint: &Url,
        transaction: &Transaction,
    ) -> impl Future<Output = Result<()>> + Send;
}
