// JSON-RPC transport against the base ledger and execution endpoints.
use crate::{
    Result,
    mirror::transport::{
        AccountInfo,
        Address,
        ChainClient,
        Transaction,
    },
};
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use std::time::Duration;
use url::Url;

pub struct HttpChainClient {
    client: reqwest::Client,
    base_endpoint: Url,
    router_endpoint: Url,
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct AccountDto {
    owner: String,
    data: String,
}

#[derive(Deserialize)]
struct DelegationStatusDto {
    endpoint: String,
}

#[derive(Deserialize)]
struct SimulationDto {
    #[serde(default)]
    err: Option<String>,
}

impl HttpChainClient {
    pub fn new(base_endpoint: Url, router_endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build chain HTTP client")?;
        Ok(Self {
            client,
            base_endpoint,
            router_endpoint,
        })
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        method: &str,
        params: P,
    ) -> Result<Option<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .client
            .post(endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("send {method} request to {endpoint}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{method} returned HTTP {status}"));
        }
        let envelope: RpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("decode {method} response"))?;
        if let Some(error) = envelope.error {
            return Err(anyhow!(
                "{method} failed with code {}: {}",
                error.code,
                error.message
            ));
        }
        Ok(envelope.result)
    }
}

impl ChainClient for HttpChainClient {
    async fn account(&self, address: &Address) -> Result<Option<AccountInfo>> {
        let result: Option<AccountDto> = self
            .call(&self.base_endpoint, "getAccountInfo", (address.to_hex(),))
            .await?;
        let Some(dto) = result else {
            return Ok(None);
        };
        Ok(Some(AccountInfo {
            owner: Address::from_hex(&dto.owner)?,
            data: hex::decode(&dto.data).context("decode account data hex")?,
        }))
    }

    async fn resolve_executor(&self, address: &Address) -> Result<Url> {
        let result: Option<DelegationStatusDto> = self
            .call(
                &self.router_endpoint,
                "getDelegationStatus",
                (address.to_hex(),),
            )
            .await?;
        let status =
            result.ok_or_else(|| anyhow!("no delegation status for {address}"))?;
        Url::parse(&status.endpoint)
            .with_context(|| format!("parse executor endpoint {}", status.endpoint))
    }

    async fn simulate(&self, endpoint: &Url, transaction: &Transaction) -> Result<()> {
        let result: Option<SimulationDto> = self
            .call(endpoint, "simulateTransaction", (transaction,))
            .await?;
        let simulation =
            result.ok_or_else(|| anyhow!("empty simulation response"))?;
        match simulation.err {
            Some(err) => Err(anyhow!("simulation rejected: {err}")),
            None => Ok(()),
        }
    }

    async fn submit(&self, endpoint: &Url, transaction: &Transaction) -> Result<()> {
        let result: Option<String> = self
            .call(endpoint, "sendAndConfirmTransaction", (transaction,))
            .await?;
        result.ok_or_else(|| anyhow!("transaction was not confirmed"))?;
        Ok(())
    }
}
