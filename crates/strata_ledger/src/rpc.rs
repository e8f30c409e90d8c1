//! JSON client for a ledger gateway.
//!
//! Every call is a `POST {base}/{method}` with a JSON object of parameters.
//! The gateway answers `{"result": ...}` on success or `{"error": "..."}`
//! when the transaction is rejected.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strata_core::{Address, BlobHash, Endpoint};
use tracing::debug;

use crate::{FileRecord, FileRegistration, Ledger, LedgerError};

const LEDGER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<String>,
}

pub struct RpcLedger {
    base_url: String,
    client: reqwest::Client,
}

impl RpcLedger {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(LEDGER_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, LedgerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        debug!("Ledger call {method}");
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(&params)
            .send()
            .await?;

        let status = response.status();
        let reply: Reply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(LedgerError::Rejected(format!("{method}: {error}")));
        }
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("{method}: HTTP {status}")));
        }
        serde_json::from_value(reply.result)
            .map_err(|e| LedgerError::Transport(format!("{method}: malformed reply: {e}")))
    }

    async fn call_unit<P>(&self, method: &str, params: P) -> Result<(), LedgerError>
    where
        P: Serialize + Send,
    {
        let _: serde_json::Value = self.call(method, params).await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_deposit(
        &self,
        owner: &Address,
        hash: &BlobHash,
    ) -> Result<Option<u128>, LedgerError> {
        // Amounts travel as decimal strings to survive JSON number limits.
        let amount: Option<String> = self
            .call("get_deposit", json!({ "owner": owner, "hash": hash }))
            .await?;
        amount
            .map(|a| {
                a.parse::<u128>()
                    .map_err(|e| LedgerError::Transport(format!("bad deposit amount: {e}")))
            })
            .transpose()
    }

    async fn make_deposit(
        &self,
        owner: &Address,
        hash: &BlobHash,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.call_unit(
            "make_deposit",
            json!({ "owner": owner, "hash": hash, "amount": amount.to_string() }),
        )
        .await
    }

    async fn get_balance(&self, address: &Address) -> Result<u128, LedgerError> {
        let balance: String = self
            .call("get_balance", json!({ "address": address }))
            .await?;
        balance
            .parse()
            .map_err(|e| LedgerError::Transport(format!("bad balance: {e}")))
    }

    async fn need_copy(&self, hash: &BlobHash) -> Result<bool, LedgerError> {
        self.call("need_copy", json!({ "hash": hash })).await
    }

    async fn need_replace(
        &self,
        old_peer: &Address,
        hash: &BlobHash,
    ) -> Result<bool, LedgerError> {
        self.call("need_replace", json!({ "old_host": old_peer, "hash": hash }))
            .await
    }

    async fn vote_offline(
        &self,
        voter: &Address,
        peer: &Address,
        hash: &BlobHash,
    ) -> Result<(), LedgerError> {
        self.call_unit(
            "vote_offline",
            json!({ "voter": voter, "host": peer, "hash": hash }),
        )
        .await
    }

    async fn register_file(
        &self,
        owner: &Address,
        registration: FileRegistration,
    ) -> Result<(), LedgerError> {
        self.call_unit(
            "register_file",
            json!({ "owner": owner, "file": registration }),
        )
        .await
    }

    async fn get_file(&self, hash: &BlobHash) -> Result<Option<FileRecord>, LedgerError> {
        self.call("get_file", json!({ "hash": hash })).await
    }

    async fn get_file_hosts(&self, hash: &BlobHash) -> Result<Vec<Address>, LedgerError> {
        self.call("get_file_hosts", json!({ "hash": hash })).await
    }

    async fn add_host_to_file(&self, host: &Address, hash: &BlobHash) -> Result<(), LedgerError> {
        self.call_unit("add_host_to_file", json!({ "host": host, "hash": hash }))
            .await
    }

    async fn replace_host(
        &self,
        new_host: &Address,
        old_host: &Address,
        hash: &BlobHash,
    ) -> Result<(), LedgerError> {
        self.call_unit(
            "replace_host",
            json!({ "new_host": new_host, "old_host": old_host, "hash": hash }),
        )
        .await
    }

    async fn list_owner_files(&self, owner: &Address) -> Result<Vec<BlobHash>, LedgerError> {
        self.call("list_owner_files", json!({ "owner": owner })).await
    }

    async fn get_hosts(&self) -> Result<Vec<Address>, LedgerError> {
        self.call("get_hosts", json!({})).await
    }

    async fn get_host_endpoint(&self, peer: &Address) -> Result<Option<Endpoint>, LedgerError> {
        self.call("get_host_endpoint", json!({ "host": peer })).await
    }

    async fn register_host(
        &self,
        address: &Address,
        endpoint: &Endpoint,
    ) -> Result<(), LedgerError> {
        self.call_unit(
            "register_host",
            json!({ "host": address, "endpoint": endpoint }),
        )
        .await
    }

    async fn time_to_pay(&self, host: &Address, hash: &BlobHash) -> Result<bool, LedgerError> {
        self.call("time_to_pay", json!({ "host": host, "hash": hash }))
            .await
    }

    async fn request_payout(&self, host: &Address, hash: &BlobHash) -> Result<(), LedgerError> {
        self.call_unit("request_payout", json!({ "host": host, "hash": hash }))
            .await
    }
}
