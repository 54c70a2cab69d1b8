//! The register → attest → revoke flow.
//!
//! Every action first checks that the clients (and identifiers) it needs are
//! present and silently does nothing otherwise; `Ok(None)` reports such a
//! skipped action. State locks are never held across chain calls.

use std::str::FromStr;
use std::sync::Arc;

use ethers::abi::{ParamType, Token};
use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::FlowConfig;
use crate::eas::{
    AttestationRequest, AttestationRequestData, RevocationReceipt, RevocationRequest,
    SchemaRegistration, NO_EXPIRATION,
};
use crate::error::{Error, Result};
use crate::schema::{SchemaEncoder, SchemaItem};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttestationForm {
    #[serde(rename = "Hours")]
    pub hours: u64,
    #[serde(rename = "NFCID")]
    pub nfc_id: u64,
    #[serde(rename = "EventID")]
    pub event_id: u64,
    #[serde(rename = "OrganizerID")]
    pub organizer_id: u64,
}

impl AttestationForm {
    pub fn get(&self, field: FormField) -> u64 {
        match field {
            FormField::Hours => self.hours,
            FormField::NfcId => self.nfc_id,
            FormField::EventId => self.event_id,
            FormField::OrganizerId => self.organizer_id,
        }
    }

    pub fn set(&mut self, field: FormField, value: u64) {
        let slot = match field {
            FormField::Hours => &mut self.hours,
            FormField::NfcId => &mut self.nfc_id,
            FormField::EventId => &mut self.event_id,
            FormField::OrganizerId => &mut self.organizer_id,
        };
        *slot = value;
    }

    /// The form as typed schema values, in schema order.
    pub fn schema_items(&self) -> Vec<SchemaItem> {
        FormField::ALL
            .iter()
            .map(|&field| {
                SchemaItem::new(
                    field.name(),
                    ParamType::Uint(field.bits()),
                    Token::Uint(U256::from(self.get(field))),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Hours,
    NfcId,
    EventId,
    OrganizerId,
}

impl FormField {
    pub const ALL: [FormField; 4] = [
        FormField::Hours,
        FormField::NfcId,
        FormField::EventId,
        FormField::OrganizerId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormField::Hours => "Hours",
            FormField::NfcId => "NFCID",
            FormField::EventId => "EventID",
            FormField::OrganizerId => "OrganizerID",
        }
    }

    fn bits(self) -> usize {
        match self {
            FormField::Hours => 8,
            _ => 32,
        }
    }
}

impl FromStr for FormField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FormField::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| Error::Encoding(format!("unknown form field {s:?}")))
    }
}

/// Partial form update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormUpdate {
    #[serde(rename = "Hours")]
    pub hours: Option<u64>,
    #[serde(rename = "NFCID")]
    pub nfc_id: Option<u64>,
    #[serde(rename = "EventID")]
    pub event_id: Option<u64>,
    #[serde(rename = "OrganizerID")]
    pub organizer_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    RegisterSchema,
    CreateAttestation,
}

impl Step {
    pub fn heading(self) -> &'static str {
        match self {
            Step::RegisterSchema => "Step 1: Volunteer registers a schema for their own reputation",
            Step::CreateAttestation => "Step 2: Client creates attestation for Volunteer's credibility",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub step: Step,
    pub address: Option<Address>,
    pub schema_uid: Option<H256>,
    pub attestation_uid: Option<H256>,
    pub form: AttestationForm,
}

#[derive(Debug, Default)]
struct FlowState {
    schema_uid: Option<H256>,
    attestation_uid: Option<H256>,
    form: AttestationForm,
}

pub struct FlowController {
    session: Arc<Session>,
    encoder: SchemaEncoder,
    config: FlowConfig,
    state: Mutex<FlowState>,
}

impl FlowController {
    pub fn new(session: Arc<Session>, config: FlowConfig) -> Result<Self> {
        let encoder = SchemaEncoder::new(&config.schema)?;
        let state = FlowState {
            schema_uid: config.schema_uid,
            attestation_uid: config.attestation_uid,
            form: AttestationForm::default(),
        };
        Ok(Self {
            session,
            encoder,
            config,
            state: Mutex::new(state),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn register_schema(&self) -> Result<Option<H256>> {
        let Some(registry) = self.session.clients().schema_registry else {
            tracing::debug!("register skipped: schema registry not connected");
            return Ok(None);
        };

        let uid = registry
            .register(SchemaRegistration {
                schema: self.config.schema.clone(),
                resolver: Address::zero(),
                revocable: true,
            })
            .await?;

        tracing::info!(schema_uid = ?uid, "schema registered");
        self.state.lock().schema_uid = Some(uid);
        Ok(Some(uid))
    }

    pub async fn create_attestation(&self) -> Result<Option<H256>> {
        let Some(eas) = self.session.clients().eas else {
            tracing::debug!("attest skipped: eas not connected");
            return Ok(None);
        };
        let (schema_uid, form) = {
            let state = self.state.lock();
            (state.schema_uid, state.form)
        };
        let Some(schema_uid) = schema_uid else {
            tracing::debug!("attest skipped: no schema registered");
            return Ok(None);
        };

        let data = self.encoder.encode_data(&form.schema_items())?;
        let uid = eas
            .attest(AttestationRequest {
                schema: schema_uid,
                data: AttestationRequestData {
                    recipient: self.config.recipient,
                    expiration_time: NO_EXPIRATION,
                    revocable: true,
                    ref_uid: H256::zero(),
                    data,
                    value: U256::zero(),
                },
            })
            .await?;

        self.state.lock().attestation_uid = Some(uid);
        tracing::info!(attestation_uid = ?uid, ?form, "attestation created");
        Ok(Some(uid))
    }

    /// Revoke the last attestation. The stored identifier is kept as is.
    pub async fn revoke_attestation(&self) -> Result<Option<RevocationReceipt>> {
        let Some(eas) = self.session.clients().eas else {
            tracing::debug!("revoke skipped: eas not connected");
            return Ok(None);
        };
        let Some(attestation_uid) = self.state.lock().attestation_uid else {
            tracing::debug!("revoke skipped: no attestation");
            return Ok(None);
        };

        let record = eas.get_attestation(attestation_uid).await?;
        match self.encoder.decode_data(&record.data) {
            Ok(items) => tracing::debug!(?record, ?items, "fetched attestation"),
            Err(_) => tracing::debug!(?record, "fetched attestation of a foreign schema"),
        }

        let receipt = eas
            .revoke(RevocationRequest {
                schema: record.schema,
                uid: record.uid,
            })
            .await?;

        tracing::info!(?receipt, "attestation revoked");
        Ok(Some(receipt))
    }

    pub fn set_field(&self, name: &str, value: u64) -> Result<()> {
        let field = name.parse::<FormField>()?;
        self.state.lock().form.set(field, value);
        Ok(())
    }

    pub fn apply(&self, update: &FormUpdate) -> AttestationForm {
        let mut state = self.state.lock();
        let form = &mut state.form;
        let changes = [
            (FormField::Hours, update.hours),
            (FormField::NfcId, update.nfc_id),
            (FormField::EventId, update.event_id),
            (FormField::OrganizerId, update.organizer_id),
        ];
        for (field, value) in changes {
            if let Some(value) = value {
                form.set(field, value);
            }
        }
        *form
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        let address = self.session.address();
        let state = self.state.lock();
        FlowSnapshot {
            step: if state.schema_uid.is_some() {
                Step::CreateAttestation
            } else {
                Step::RegisterSchema
            },
            address,
            schema_uid: state.schema_uid,
            attestation_uid: state.attestation_uid,
            form: state.form,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use ethers::types::Bytes;

    use super::*;
    use crate::config::SCHEMA;
    use crate::eas::{AttestationRecord, AttestationService, SchemaRegistryService};
    use crate::session::tests::StaticConnector;
    use crate::session::Connection;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Register(SchemaRegistration),
        Attest(AttestationRequest),
        GetAttestation(H256),
        Revoke(RevocationRequest),
    }

    /// In-memory chain that records every call made through either client.
    pub(crate) struct MockChain {
        pub schema_uid: H256,
        pub attestation_uid: H256,
        pub record: AttestationRecord,
        pub fail_attest: bool,
        pub calls: Mutex<Vec<Call>>,
    }

    impl MockChain {
        pub fn new() -> Self {
            Self {
                schema_uid: H256::repeat_byte(0x11),
                attestation_uid: H256::repeat_byte(0x49),
                record: AttestationRecord {
                    uid: H256::repeat_byte(0x4a),
                    schema: H256::repeat_byte(0x5c),
                    time: 1_700_000_000,
                    expiration_time: 0,
                    revocation_time: 0,
                    ref_uid: H256::zero(),
                    recipient: Address::zero(),
                    attester: Address::repeat_byte(0x42),
                    revocable: true,
                    data: Bytes::default(),
                },
                fail_attest: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SchemaRegistryService for MockChain {
        async fn register(&self, registration: SchemaRegistration) -> Result<H256> {
            self.calls.lock().push(Call::Register(registration));
            Ok(self.schema_uid)
        }
    }

    #[async_trait]
    impl AttestationService for MockChain {
        async fn attest(&self, request: AttestationRequest) -> Result<H256> {
            self.calls.lock().push(Call::Attest(request));
            if self.fail_attest {
                return Err(Error::Reverted(H256::repeat_byte(0xee)));
            }
            Ok(self.attestation_uid)
        }

        async fn get_attestation(&self, uid: H256) -> Result<AttestationRecord> {
            self.calls.lock().push(Call::GetAttestation(uid));
            Ok(self.record.clone())
        }

        async fn revoke(&self, request: RevocationRequest) -> Result<RevocationReceipt> {
            self.calls.lock().push(Call::Revoke(request));
            Ok(RevocationReceipt {
                transaction_hash: H256::repeat_byte(0x77),
                block_number: Some(5),
                gas_used: None,
            })
        }
    }

    pub(crate) async fn connected_session(chain: Arc<MockChain>) -> Arc<Session> {
        let connection = Connection {
            eas: chain.clone(),
            schema_registry: chain,
            address: Address::repeat_byte(0x42),
        };
        let session = Arc::new(Session::new(Some(Arc::new(StaticConnector::new(connection)))));
        session.bootstrap().await.unwrap();
        session
    }

    fn controller(session: Arc<Session>, config: FlowConfig) -> FlowController {
        FlowController::new(session, config).unwrap()
    }

    fn with_schema(uid: H256) -> FlowConfig {
        FlowConfig {
            schema_uid: Some(uid),
            ..FlowConfig::default()
        }
    }

    #[tokio::test]
    async fn register_stores_returned_uid() {
        let chain = Arc::new(MockChain::new());
        let flow = controller(connected_session(chain.clone()).await, FlowConfig::default());
        assert_eq!(flow.snapshot().step, Step::RegisterSchema);

        let uid = flow.register_schema().await.unwrap();

        assert_eq!(uid, Some(chain.schema_uid));
        assert_eq!(flow.snapshot().schema_uid, Some(chain.schema_uid));
        assert_eq!(flow.snapshot().step, Step::CreateAttestation);
        assert_eq!(
            chain.calls(),
            vec![Call::Register(SchemaRegistration {
                schema: SCHEMA.to_string(),
                resolver: Address::zero(),
                revocable: true,
            })]
        );
    }

    #[tokio::test]
    async fn create_encodes_typed_form_values() {
        let chain = Arc::new(MockChain::new());
        let schema_uid = H256::repeat_byte(0x33);
        let flow = controller(connected_session(chain.clone()).await, with_schema(schema_uid));
        flow.set_field("Hours", 5).unwrap();
        flow.set_field("NFCID", 1234).unwrap();
        flow.set_field("EventID", 7).unwrap();
        flow.set_field("OrganizerID", 99).unwrap();

        let expected_items = vec![
            SchemaItem::new("Hours", ParamType::Uint(8), Token::Uint(U256::from(5u64))),
            SchemaItem::new("NFCID", ParamType::Uint(32), Token::Uint(U256::from(1234u64))),
            SchemaItem::new("EventID", ParamType::Uint(32), Token::Uint(U256::from(7u64))),
            SchemaItem::new("OrganizerID", ParamType::Uint(32), Token::Uint(U256::from(99u64))),
        ];
        assert_eq!(flow.snapshot().form.schema_items(), expected_items);

        let uid = flow.create_attestation().await.unwrap();
        assert_eq!(uid, Some(chain.attestation_uid));
        assert_eq!(flow.snapshot().attestation_uid, Some(chain.attestation_uid));

        let calls = chain.calls();
        let [Call::Attest(request)] = calls.as_slice() else {
            panic!("expected one attest call, got {calls:?}");
        };
        assert_eq!(request.schema, schema_uid);
        assert_eq!(request.data.recipient, Address::zero());
        assert_eq!(request.data.expiration_time, NO_EXPIRATION);
        assert!(request.data.revocable);
        let decoded = SchemaEncoder::new(SCHEMA)
            .unwrap()
            .decode_data(&request.data.data)
            .unwrap();
        assert_eq!(decoded, expected_items);
    }

    #[tokio::test]
    async fn create_uses_configured_recipient() {
        let chain = Arc::new(MockChain::new());
        let recipient = Address::repeat_byte(0x0b);
        let config = FlowConfig {
            recipient,
            ..with_schema(H256::repeat_byte(0x33))
        };
        let flow = controller(connected_session(chain.clone()).await, config);

        flow.create_attestation().await.unwrap();

        let calls = chain.calls();
        let [Call::Attest(request)] = calls.as_slice() else {
            panic!("expected one attest call, got {calls:?}");
        };
        assert_eq!(request.data.recipient, recipient);
    }

    #[tokio::test]
    async fn create_is_noop_without_schema() {
        let chain = Arc::new(MockChain::new());
        let flow = controller(connected_session(chain.clone()).await, FlowConfig::default());

        assert_eq!(flow.create_attestation().await.unwrap(), None);
        assert!(chain.calls().is_empty());
        assert!(flow.snapshot().attestation_uid.is_none());
    }

    #[tokio::test]
    async fn create_is_noop_without_client() {
        let flow = controller(Arc::new(Session::new(None)), with_schema(H256::repeat_byte(1)));
        assert_eq!(flow.create_attestation().await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_hours() {
        let chain = Arc::new(MockChain::new());
        let flow = controller(connected_session(chain.clone()).await, with_schema(H256::repeat_byte(1)));
        flow.set_field("Hours", 300).unwrap();

        let err = flow.create_attestation().await.expect_err("300 does not fit uint8");
        assert!(matches!(err, Error::Encoding(_)));
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_attestation_keeps_previous_uid() {
        let mut chain = MockChain::new();
        chain.fail_attest = true;
        let chain = Arc::new(chain);
        let previous = H256::repeat_byte(0x01);
        let config = FlowConfig {
            attestation_uid: Some(previous),
            ..with_schema(H256::repeat_byte(0x33))
        };
        let flow = controller(connected_session(chain.clone()).await, config);

        assert!(matches!(flow.create_attestation().await, Err(Error::Reverted(_))));
        assert_eq!(flow.snapshot().attestation_uid, Some(previous));
    }

    #[tokio::test]
    async fn revoke_uses_fetched_record() {
        let chain = Arc::new(MockChain::new());
        let local_uid = H256::repeat_byte(0x01);
        let local_schema = H256::repeat_byte(0x02);
        let config = FlowConfig {
            attestation_uid: Some(local_uid),
            ..with_schema(local_schema)
        };
        let flow = controller(connected_session(chain.clone()).await, config);

        let receipt = flow.revoke_attestation().await.unwrap();

        assert_eq!(receipt.map(|r| r.transaction_hash), Some(H256::repeat_byte(0x77)));
        assert_eq!(
            chain.calls(),
            vec![
                Call::GetAttestation(local_uid),
                Call::Revoke(RevocationRequest {
                    schema: chain.record.schema,
                    uid: chain.record.uid,
                }),
            ]
        );
        let snapshot = flow.snapshot();
        assert_eq!(snapshot.attestation_uid, Some(local_uid));
        assert_eq!(snapshot.schema_uid, Some(local_schema));
    }

    #[tokio::test]
    async fn revoke_is_noop_without_attestation() {
        let chain = Arc::new(MockChain::new());
        let flow = controller(connected_session(chain.clone()).await, with_schema(H256::repeat_byte(1)));

        assert!(flow.revoke_attestation().await.unwrap().is_none());
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn actions_are_noops_before_bootstrap() {
        let chain = Arc::new(MockChain::new());
        let connection = Connection {
            eas: chain.clone(),
            schema_registry: chain.clone(),
            address: Address::repeat_byte(0x42),
        };
        let session = Arc::new(Session::new(Some(Arc::new(StaticConnector::new(connection)))));
        let config = FlowConfig {
            attestation_uid: Some(H256::repeat_byte(2)),
            ..with_schema(H256::repeat_byte(1))
        };
        let flow = controller(session, config);

        assert!(flow.register_schema().await.unwrap().is_none());
        assert!(flow.create_attestation().await.unwrap().is_none());
        assert!(flow.revoke_attestation().await.unwrap().is_none());
        assert!(chain.calls().is_empty());
        assert!(flow.snapshot().address.is_none());
    }

    #[test]
    fn form_updates_are_partial() {
        let flow = controller(Arc::new(Session::new(None)), FlowConfig::default());
        flow.set_field("NFCID", 10).unwrap();

        let form = flow.apply(&FormUpdate {
            hours: Some(3),
            event_id: Some(8),
            ..FormUpdate::default()
        });

        assert_eq!(
            form,
            AttestationForm {
                hours: 3,
                nfc_id: 10,
                event_id: 8,
                organizer_id: 0,
            }
        );
        assert!(flow.set_field("Minutes", 1).is_err());
    }

    #[test]
    fn form_field_names_round_trip() {
        for field in FormField::ALL {
            assert_eq!(field.name().parse::<FormField>().unwrap(), field);
        }
    }

    #[test]
    fn form_serializes_with_schema_names() {
        let form = AttestationForm {
            hours: 5,
            nfc_id: 1234,
            event_id: 7,
            organizer_id: 99,
        };
        let json = serde_json::to_value(form).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Hours": 5, "NFCID": 1234, "EventID": 7, "OrganizerID": 99})
        );
    }
}
