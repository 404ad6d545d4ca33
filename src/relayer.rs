//! Minimal client for the transaction relayer, PROXY transaction type only.
//!
//! A PROXY submission wraps every call into `ProxyWalletFactory.proxy(calls)`,
//! signed by the owner key; the relayer pays gas and executes it through the
//! owner's proxy wallet.

use std::{marker::PhantomData, str::FromStr, time::Duration};

use alloy::{
    hex,
    network::{Ethereum, TransactionBuilder},
    primitives::{keccak256, Address, Bytes, B256, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
    signers::{local::PrivateKeySigner, Signer},
    sol,
    sol_types::SolCall,
    transports::Transport,
};
use async_trait::async_trait;
use reqwest::{header::InvalidHeaderValue, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    builder::BuilderAuth,
    constants::{
        DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROXY_GAS_LIMIT, PROXY_CALL_TYPE,
        PROXY_FACTORY_ADDRESS, PROXY_INIT_CODE_HASH, RELAY_HUB_ADDRESS,
    },
    transaction::RedeemTransaction,
};

use ProxyWalletFactory::{proxyCall, ProxyCall};

sol! {
    contract ProxyWalletFactory {
        struct ProxyCall {
            uint8 typeCode;
            address to;
            uint256 value;
            bytes data;
        }

        function proxy(ProxyCall[] memory calls) external payable returns (bytes[] memory returnValues);
    }
}

const RELAY_PAYLOAD_PATH: &str = "/relay-payload";
const SUBMIT_PATH: &str = "/submit";
const TRANSACTION_PATH: &str = "/transaction";
const PROXY_TX_TYPE: &str = "PROXY";

#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error("relayer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relayer responded with {status}")]
    Status { status: StatusCode, body: String },
    #[error("relayer JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid relay payload: {0}")]
    Payload(String),
    #[error("signing failed: {0}")]
    Signing(#[from] alloy::signers::Error),
    #[error("invalid builder credentials: {0}")]
    Header(#[from] InvalidHeaderValue),
}

impl RelayerError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Response body returned alongside a failing status, if any.
    pub fn data(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TransactionState {
    #[serde(rename = "STATE_NEW")]
    New,
    #[serde(rename = "STATE_EXECUTED")]
    Executed,
    #[serde(rename = "STATE_MINED")]
    Mined,
    #[serde(rename = "STATE_CONFIRMED")]
    Confirmed,
    #[serde(rename = "STATE_FAILED")]
    Failed,
    #[serde(rename = "STATE_INVALID")]
    Invalid,
    #[serde(other)]
    Unknown,
}

impl TransactionState {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Mined | Self::Confirmed)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed | Self::Invalid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "STATE_NEW",
            Self::Executed => "STATE_EXECUTED",
            Self::Mined => "STATE_MINED",
            Self::Confirmed => "STATE_CONFIRMED",
            Self::Failed => "STATE_FAILED",
            Self::Invalid => "STATE_INVALID",
            Self::Unknown => "STATE_UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerTransaction {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default = "unknown_state")]
    pub state: TransactionState,
}

fn unknown_state() -> TransactionState {
    TransactionState::Unknown
}

/// Handle for a submission that has been accepted but not yet mined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    pub transaction_id: String,
    pub transaction_hash: Option<String>,
}

#[async_trait]
pub trait Relayer: Send + Sync {
    /// Submits `transactions` as one relayed call.
    async fn execute(
        &self,
        transactions: &[RedeemTransaction],
        metadata: &str,
    ) -> Result<PendingTransaction, RelayerError>;

    /// Polls until the submission reaches a terminal state, mined or failed.
    /// `None` when it is still pending after the poll budget.
    async fn wait(
        &self,
        pending: &PendingTransaction,
    ) -> Result<Option<RelayerTransaction>, RelayerError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Nonce {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
struct RelayPayload {
    address: String,
    nonce: Nonce,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureParams {
    gas_price: String,
    gas_limit: String,
    relayer_fee: String,
    relay_hub: String,
    relay: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    #[serde(rename = "type")]
    tx_type: &'a str,
    from: String,
    to: String,
    proxy_wallet: String,
    data: String,
    nonce: String,
    signature: String,
    signature_params: SignatureParams,
    metadata: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(rename = "transactionID")]
    transaction_id: String,
    #[serde(default)]
    transaction_hash: Option<String>,
}

pub struct RelayClient<P, T> {
    http: Client,
    base_url: String,
    auth: BuilderAuth,
    signer: PrivateKeySigner,
    provider: P,
    poll_interval: Duration,
    max_polls: u32,
    _transport: PhantomData<fn() -> T>,
}

impl<P, T> RelayClient<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        auth: BuilderAuth,
        signer: PrivateKeySigner,
        provider: P,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth,
            signer,
            provider,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_polls: DEFAULT_MAX_POLLS,
            _transport: PhantomData,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    pub fn proxy_wallet(&self) -> Address {
        derive_proxy_wallet(self.signer.address())
    }

    async fn relay_payload(&self, from: Address) -> Result<(Address, U256), RelayerError> {
        let response = self
            .http
            .get(format!("{}{RELAY_PAYLOAD_PATH}", self.base_url))
            .query(&[("address", from.to_string().as_str()), ("type", PROXY_TX_TYPE)])
            .send()
            .await?;

        let payload: RelayPayload = serde_json::from_str(&checked_text(response).await?)?;

        let relay = Address::from_str(&payload.address).map_err(|e| {
            RelayerError::Payload(format!("relay address {:?}: {e}", payload.address))
        })?;
        let nonce = match payload.nonce {
            Nonce::Number(n) => U256::from(n),
            Nonce::Text(s) => U256::from_str_radix(&s, 10)
                .map_err(|e| RelayerError::Payload(format!("nonce {s:?}: {e}")))?,
        };

        Ok((relay, nonce))
    }

    async fn gas_limit(&self, from: Address, data: &Bytes) -> U256 {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(PROXY_FACTORY_ADDRESS)
            .with_input(data.clone());

        match self.provider.estimate_gas(&request).await {
            Ok(gas) => U256::from(gas),
            Err(e) => {
                tracing::warn!("Gas estimation failed ({e}), using {DEFAULT_PROXY_GAS_LIMIT}");
                U256::from(DEFAULT_PROXY_GAS_LIMIT)
            }
        }
    }

    async fn transaction(&self, id: &str) -> Result<Option<RelayerTransaction>, RelayerError> {
        let response = self
            .http
            .get(format!("{}{TRANSACTION_PATH}", self.base_url))
            .query(&[("id", id)])
            .send()
            .await?;

        let transactions: Vec<RelayerTransaction> =
            serde_json::from_str(&checked_text(response).await?)?;

        Ok(transactions.into_iter().next())
    }
}

#[async_trait]
impl<P, T> Relayer for RelayClient<P, T>
where
    P: Provider<T, Ethereum> + Send + Sync,
    T: Transport + Clone,
{
    async fn execute(
        &self,
        transactions: &[RedeemTransaction],
        metadata: &str,
    ) -> Result<PendingTransaction, RelayerError> {
        let from = self.signer.address();
        let (relay, nonce) = self.relay_payload(from).await?;

        let data = encode_proxy_calls(transactions);
        let gas_limit = self.gas_limit(from, &data).await;

        let hash = proxy_struct_hash(&ProxySignatureInput {
            from,
            to: PROXY_FACTORY_ADDRESS,
            data: &data,
            relayer_fee: U256::ZERO,
            gas_price: U256::ZERO,
            gas_limit,
            nonce,
            relay_hub: RELAY_HUB_ADDRESS,
            relay,
        });
        let signature = self.signer.sign_message(hash.as_slice()).await?;

        let request = SubmitRequest {
            tx_type: PROXY_TX_TYPE,
            from: from.to_string(),
            to: PROXY_FACTORY_ADDRESS.to_string(),
            proxy_wallet: derive_proxy_wallet(from).to_string(),
            data: hex::encode_prefixed(&data),
            nonce: nonce.to_string(),
            signature: hex::encode_prefixed(signature.as_bytes()),
            signature_params: SignatureParams {
                gas_price: U256::ZERO.to_string(),
                gas_limit: gas_limit.to_string(),
                relayer_fee: U256::ZERO.to_string(),
                relay_hub: RELAY_HUB_ADDRESS.to_string(),
                relay: relay.to_string(),
            },
            metadata,
        };
        let body = serde_json::to_string(&request)?;
        let headers = self.auth.headers(&Method::POST, SUBMIT_PATH, &body)?;

        tracing::debug!("Submitting {} call(s) with nonce {nonce}", transactions.len());

        let response = self
            .http
            .post(format!("{}{SUBMIT_PATH}", self.base_url))
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let submitted: SubmitResponse = serde_json::from_str(&checked_text(response).await?)?;
        tracing::info!("Relayer accepted transaction {}", submitted.transaction_id);

        Ok(PendingTransaction {
            transaction_id: submitted.transaction_id,
            transaction_hash: submitted.transaction_hash,
        })
    }

    async fn wait(
        &self,
        pending: &PendingTransaction,
    ) -> Result<Option<RelayerTransaction>, RelayerError> {
        let id = pending.transaction_id.as_str();

        for _ in 0..self.max_polls {
            match self.transaction(id).await {
                Ok(Some(txn)) if txn.state.is_settled() => {
                    tracing::debug!("Relayer transaction {} is {:?}", txn.transaction_id, txn.state);
                    return Ok(Some(txn));
                }
                Ok(Some(txn)) if txn.state.is_failed() => {
                    tracing::error!(
                        "Relayer transaction {id} ended in {} (hash: {})",
                        txn.state.as_str(),
                        txn.transaction_hash.as_deref().unwrap_or("none")
                    );
                    return Ok(Some(txn));
                }
                Ok(Some(txn)) => tracing::debug!("Relayer transaction {id} is {:?}", txn.state),
                Ok(None) => tracing::debug!("Relayer transaction {id} not visible yet"),
                Err(e) if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) => return Err(e),
                Err(e) => tracing::warn!("Polling relayer transaction {id} failed: {e}"),
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        tracing::error!("Relayer transaction {id} did not settle after {} polls", self.max_polls);
        Ok(None)
    }
}

async fn checked_text(response: reqwest::Response) -> Result<String, RelayerError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(RelayerError::Status { status, body })
    }
}

pub fn encode_proxy_calls(transactions: &[RedeemTransaction]) -> Bytes {
    let calls = transactions
        .iter()
        .map(|tx| ProxyCall {
            typeCode: PROXY_CALL_TYPE,
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
        })
        .collect();

    proxyCall { calls }.abi_encode().into()
}

/// Proxy wallet the factory deploys for `owner` (CREATE2, salt = keccak256(owner)).
pub fn derive_proxy_wallet(owner: Address) -> Address {
    PROXY_FACTORY_ADDRESS.create2(keccak256(owner.as_slice()).0, PROXY_INIT_CODE_HASH.0)
}

pub struct ProxySignatureInput<'a> {
    pub from: Address,
    pub to: Address,
    pub data: &'a [u8],
    pub relayer_fee: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub nonce: U256,
    pub relay_hub: Address,
    pub relay: Address,
}

/// keccak256("rlx:" ++ from ++ to ++ data ++ fee ++ gasPrice ++ gasLimit ++ nonce ++ relayHub ++ relay)
pub fn proxy_struct_hash(input: &ProxySignatureInput<'_>) -> B256 {
    let mut preimage = Vec::with_capacity(4 + 20 * 4 + 32 * 4 + input.data.len());

    preimage.extend_from_slice(b"rlx:");
    preimage.extend_from_slice(input.from.as_slice());
    preimage.extend_from_slice(input.to.as_slice());
    preimage.extend_from_slice(input.data);
    preimage.extend_from_slice(&input.relayer_fee.to_be_bytes::<32>());
    preimage.extend_from_slice(&input.gas_price.to_be_bytes::<32>());
    preimage.extend_from_slice(&input.gas_limit.to_be_bytes::<32>());
    preimage.extend_from_slice(&input.nonce.to_be_bytes::<32>());
    preimage.extend_from_slice(input.relay_hub.as_slice());
    preimage.extend_from_slice(input.relay.as_slice());

    keccak256(preimage)
}
