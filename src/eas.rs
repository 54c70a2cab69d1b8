//! EAS and SchemaRegistry contract clients.
//!
//! The flow talks to the chain only through [`SchemaRegistryService`] and
//! [`AttestationService`]. The `*Contract` types implement them with
//! `abigen!` bindings over any ethers middleware.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{parse_log, ContractCall};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use serde::Serialize;

use crate::error::{Error, Result};

/// `expirationTime` value meaning the attestation never expires.
pub const NO_EXPIRATION: u64 = 0;

mod eas_bindings {
    ethers::contract::abigen!(
        Eas,
        r#"[
            struct AttestationRequestData { address recipient; uint64 expiration_time; bool revocable; bytes32 ref_uid; bytes data; uint256 value; }
            struct AttestationRequest { bytes32 schema; AttestationRequestData data; }
            struct RevocationRequestData { bytes32 uid; uint256 value; }
            struct RevocationRequest { bytes32 schema; RevocationRequestData data; }
            struct Attestation { bytes32 uid; bytes32 schema; uint64 time; uint64 expiration_time; uint64 revocation_time; bytes32 ref_uid; address recipient; address attester; bool revocable; bytes data; }
            function attest(AttestationRequest request) external payable returns (bytes32)
            function revoke(RevocationRequest request) external payable
            function getAttestation(bytes32 uid) external view returns (Attestation)
            event Attested(address indexed recipient, address indexed attester, bytes32 uid, bytes32 indexed schema_uid)
        ]"#
    );
}

mod registry_bindings {
    ethers::contract::abigen!(
        SchemaRegistry,
        r#"[
            function register(string schema, address resolver, bool revocable) external returns (bytes32)
        ]"#
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaRegistration {
    pub schema: String,
    pub resolver: Address,
    pub revocable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationRequest {
    pub schema: H256,
    pub data: AttestationRequestData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationRequestData {
    pub recipient: Address,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_uid: H256,
    pub data: Bytes,
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevocationRequest {
    pub schema: H256,
    pub uid: H256,
}

/// An attestation as stored by the EAS contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationRecord {
    pub uid: H256,
    pub schema: H256,
    pub time: u64,
    pub expiration_time: u64,
    pub revocation_time: u64,
    pub ref_uid: H256,
    pub recipient: Address,
    pub attester: Address,
    pub revocable: bool,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationReceipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

#[async_trait]
pub trait SchemaRegistryService: Send + Sync {
    /// Register a schema and wait for the transaction; returns the schema UID.
    async fn register(&self, registration: SchemaRegistration) -> Result<H256>;
}

#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Submit an attestation and wait for it; returns the attestation UID.
    async fn attest(&self, request: AttestationRequest) -> Result<H256>;

    async fn get_attestation(&self, uid: H256) -> Result<AttestationRecord>;

    async fn revoke(&self, request: RevocationRequest) -> Result<RevocationReceipt>;
}

pub struct SchemaRegistryContract<M> {
    contract: registry_bindings::SchemaRegistry<M>,
}

impl<M: Middleware + 'static> SchemaRegistryContract<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: registry_bindings::SchemaRegistry::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> SchemaRegistryService for SchemaRegistryContract<M> {
    async fn register(&self, registration: SchemaRegistration) -> Result<H256> {
        let call = self.contract.register(
            registration.schema,
            registration.resolver,
            registration.revocable,
        );
        let receipt = send_and_confirm(call).await?;
        registered_uid(&receipt, self.contract.address())
    }
}

pub struct EasContract<M> {
    contract: eas_bindings::Eas<M>,
}

impl<M: Middleware + 'static> EasContract<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: eas_bindings::Eas::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> AttestationService for EasContract<M> {
    async fn attest(&self, request: AttestationRequest) -> Result<H256> {
        let call = self.contract.attest(request.into());
        let receipt = send_and_confirm(call).await?;
        attested_uid(&receipt, self.contract.address())
    }

    async fn get_attestation(&self, uid: H256) -> Result<AttestationRecord> {
        let attestation = self
            .contract
            .get_attestation(uid.to_fixed_bytes())
            .call()
            .await
            .map_err(|e| Error::Contract(e.to_string()))?;
        let record = AttestationRecord::from(attestation);
        if record.uid.is_zero() {
            return Err(Error::AttestationNotFound(uid));
        }
        Ok(record)
    }

    async fn revoke(&self, request: RevocationRequest) -> Result<RevocationReceipt> {
        let call = self.contract.revoke(request.into());
        let receipt = send_and_confirm(call).await?;
        Ok(RevocationReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
        })
    }
}

async fn send_and_confirm<M, D>(call: ContractCall<M, D>) -> Result<TransactionReceipt>
where
    M: Middleware + 'static,
    D: Detokenize + Send + Sync,
{
    let pending = call
        .send()
        .await
        .map_err(|e| Error::Contract(e.to_string()))?;
    let tx_hash = pending.tx_hash();
    tracing::debug!(?tx_hash, "transaction submitted");

    let receipt = pending
        .await
        .map_err(|e| Error::Provider(e.to_string()))?
        .ok_or(Error::Dropped(tx_hash))?;
    if receipt.status == Some(U64::zero()) {
        return Err(Error::Reverted(tx_hash));
    }
    Ok(receipt)
}

/// The schema UID is the first indexed topic of the registry's `Registered`
/// event, across all deployed registry versions.
fn registered_uid(receipt: &TransactionReceipt, registry: Address) -> Result<H256> {
    receipt
        .logs
        .iter()
        .find(|log| log.address == registry && log.topics.len() >= 2)
        .map(|log| log.topics[1])
        .ok_or(Error::MissingEvent(receipt.transaction_hash, "Registered"))
}

fn attested_uid(receipt: &TransactionReceipt, eas: Address) -> Result<H256> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == eas)
        .find_map(|log| parse_log::<eas_bindings::AttestedFilter>(log.clone()).ok())
        .map(|event| H256::from(event.uid))
        .ok_or(Error::MissingEvent(receipt.transaction_hash, "Attested"))
}

impl From<AttestationRequest> for eas_bindings::AttestationRequest {
    fn from(request: AttestationRequest) -> Self {
        Self {
            schema: request.schema.to_fixed_bytes(),
            data: eas_bindings::AttestationRequestData {
                recipient: request.data.recipient,
                expiration_time: request.data.expiration_time,
                revocable: request.data.revocable,
                ref_uid: request.data.ref_uid.to_fixed_bytes(),
                data: request.data.data,
                value: request.data.value,
            },
        }
    }
}

impl From<RevocationRequest> for eas_bindings::RevocationRequest {
    fn from(request: RevocationRequest) -> Self {
        Self {
            schema: request.schema.to_fixed_bytes(),
            data: eas_bindings::RevocationRequestData {
                uid: request.uid.to_fixed_bytes(),
                value: U256::zero(),
            },
        }
    }
}

/// `getAttestation` output as decoded by the generated bindings.
type AttestationTuple = (
    [u8; 32],
    [u8; 32],
    u64,
    u64,
    u64,
    [u8; 32],
    Address,
    Address,
    bool,
    Bytes,
);

impl From<AttestationTuple> for AttestationRecord {
    fn from(
        (uid, schema, time, expiration_time, revocation_time, ref_uid, recipient, attester, revocable, data): AttestationTuple,
    ) -> Self {
        Self {
            uid: H256::from(uid),
            schema: H256::from(schema),
            time,
            expiration_time,
            revocation_time,
            ref_uid: H256::from(ref_uid),
            recipient,
            attester,
            revocable,
            data,
        }
    }
}
