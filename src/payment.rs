use crate::Result;
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;
use url::Url;

/// A signed on-ledger transfer a player submits to unlock a monetized action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub signature: String,
    pub wallet: String,
    pub amount: u64,
    pub action: String,
    pub week_start: i64,
}

/// External collaborator that verifies a payment and records it exactly once,
/// keyed by signature. A rejected or replayed signature is an error.
pub trait PaymentVerifier {
    fn verify_and_record(&self, claim: &PaymentClaim) -> impl Future<Output = Result<()>>;
}

/// Talks to the payment service over HTTP.
pub struct HttpPaymentVerifier {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpPaymentVerifier {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build payment verifier HTTP client")?;
        Ok(Self { client, endpoint })
    }
}

impl PaymentVerifier for HttpPaymentVerifier {
    async fn verify_and_record(&self, claim: &PaymentClaim) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(claim)
            .send()
            .await
            .context("send payment verification request")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("payment verifier returned {status}"));
        }
        let verdict: VerifyResponse = response
            .json()
            .await
            .context("decode payment verification response")?;
        if verdict.accepted {
            Ok(())
        } else {
            Err(anyhow!(
                "payment rejected: {}",
                verdict.reason.unwrap_or_else(|| "no reason given".into())
            ))
        }
    }
}

/// Test double with a fixed verdict.
#[derive(Clone, Debug)]
pub struct StaticPaymentVerifier {
    accept: bool,
}

impl StaticPaymentVerifier {
    pub fn accepting() -> Self {
        Self { accept: true }
    }

    pub fn rejecting() -> Self {
        Self { accept: false }
    }
}

impl PaymentVerifier for StaticPaymentVerifier {
    async fn verify_and_record(&self, claim: &PaymentClaim) -> Result<()> {
        if self.accept {
            Ok(())
        } else {
            Err(anyhow!("payment rejected: signature {}", claim.signature))
        }
    }
}
