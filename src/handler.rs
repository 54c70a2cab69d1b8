use actix_web::{error, get, http::StatusCode, post, web, HttpResponse, Responder};
use derive_more::{Display, Error};
use ethers::types::H256;
use serde::Serialize;

use crate::config::SCHEMA_DETAILS;
use crate::eas::RevocationReceipt;
use crate::error::Error as FlowError;
use crate::flow::{FlowSnapshot, FormField, FormUpdate, Step};
use crate::types::AppState;

#[derive(Serialize)]
struct RegisterSchemaResponse {
    performed: bool,
    schema_uid: Option<H256>,
}

#[derive(Serialize)]
struct CreateAttestationResponse {
    performed: bool,
    attestation_uid: Option<H256>,
}

#[derive(Serialize)]
struct RevokeAttestationResponse {
    performed: bool,
    receipt: Option<RevocationReceipt>,
}

#[derive(Debug, Display, Error)]
pub enum UserError {
    #[display(fmt = "error while encoding attestation data")]
    InvalidAttestationData,
    #[display(fmt = "attestation not found")]
    AttestationNotFound,
    #[display(fmt = "error while submitting transaction")]
    Transaction,
    #[display(fmt = "internal server error")]
    Internal,
}

impl error::ResponseError for UserError {
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(actix_web::http::header::ContentType::plaintext())
            .body(self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            UserError::InvalidAttestationData => StatusCode::BAD_REQUEST,
            UserError::AttestationNotFound => StatusCode::NOT_FOUND,
            UserError::Transaction => StatusCode::BAD_GATEWAY,
            UserError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn reject(err: FlowError) -> UserError {
    tracing::error!(error = %err, "action failed");
    match err {
        FlowError::Schema(_) | FlowError::Encoding(_) => UserError::InvalidAttestationData,
        FlowError::AttestationNotFound(_) => UserError::AttestationNotFound,
        FlowError::Provider(_)
        | FlowError::Contract(_)
        | FlowError::Dropped(_)
        | FlowError::Reverted(_)
        | FlowError::MissingEvent(..) => UserError::Transaction,
        FlowError::Config(_) => UserError::Internal,
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(flow_state)
        .service(register_schema)
        .service(update_form)
        .service(set_form_field)
        .service(create_attestation)
        .service(revoke_attestation);
}

#[get("/")]
async fn index(state: web::Data<AppState>) -> impl Responder {
    if let Err(err) = state.flow.session().bootstrap().await {
        tracing::error!(error = %err, "wallet connection failed");
    }
    let snapshot = state.flow.snapshot();
    tracing::debug!(current_address = ?snapshot.address, "rendering page");

    HttpResponse::Ok()
        .content_type(actix_web::http::header::ContentType::html())
        .body(render_page(&snapshot))
}

#[get("/state")]
async fn flow_state(state: web::Data<AppState>) -> impl Responder {
    web::Json(state.flow.snapshot())
}

#[post("/schema")]
async fn register_schema(
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder, UserError> {
    let schema_uid = state.flow.register_schema().await.map_err(reject)?;
    Ok(web::Json(RegisterSchemaResponse {
        performed: schema_uid.is_some(),
        schema_uid,
    }))
}

#[post("/form")]
async fn update_form(
    req: web::Json<FormUpdate>,
    state: web::Data<AppState>,
) -> impl Responder {
    web::Json(state.flow.apply(&req))
}

#[post("/form/{field}")]
async fn set_form_field(
    path: web::Path<String>,
    value: web::Json<u64>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder, UserError> {
    state
        .flow
        .set_field(&path, value.into_inner())
        .map_err(reject)?;
    Ok(web::Json(state.flow.snapshot().form))
}

#[post("/attestation")]
async fn create_attestation(
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder, UserError> {
    let attestation_uid = state.flow.create_attestation().await.map_err(reject)?;
    Ok(web::Json(CreateAttestationResponse {
        performed: attestation_uid.is_some(),
        attestation_uid,
    }))
}

#[post("/attestation/revoke")]
async fn revoke_attestation(
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder, UserError> {
    let receipt = state.flow.revoke_attestation().await.map_err(reject)?;
    Ok(web::Json(RevokeAttestationResponse {
        performed: receipt.is_some(),
        receipt,
    }))
}

const PAGE_SCRIPT: &str = r#"<script>
async function post(path, body) {
  const res = await fetch(path, {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify(body ?? {}),
  });
  if (!res.ok) console.error(path, res.status, await res.text());
  return res;
}
async function registerSchema() {
  await post("/schema");
  location.reload();
}
async function createAttestation() {
  const form = {};
  for (const input of document.querySelectorAll("input[data-field]")) {
    form[input.name] = Number(input.value);
  }
  if ((await post("/form", form)).ok) await post("/attestation");
  location.reload();
}
async function revokeAttestation() {
  const res = await post("/attestation/revoke");
  console.log("Revoking Attestation:", await res.text());
}
</script>"#;

fn render_page(snapshot: &FlowSnapshot) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<h1>Ethereum Attestation Service</h1>\n<h2 style=\"text-align: center\">{}</h2>\n",
        snapshot.step.heading()
    ));
    if let Some(address) = snapshot.address {
        body.push_str(&format!("<div><strong>Connected as:</strong> {address:?}</div>\n"));
    }

    match snapshot.step {
        Step::RegisterSchema => {
            body.push_str("<h2>Register Schema</h2>\n");
            for (label, detail) in [
                ("Schema Name", SCHEMA_DETAILS.schema_name),
                ("Hours", SCHEMA_DETAILS.hours),
                ("NFCID", SCHEMA_DETAILS.nfc_id),
                ("EventID", SCHEMA_DETAILS.event_id),
                ("OrganizerID", SCHEMA_DETAILS.organizer_id),
            ] {
                body.push_str(&format!("<div><strong>{label}:</strong> {detail}</div>\n"));
            }
            body.push_str("<button onclick=\"registerSchema()\">Register Schema</button>\n");
        }
        Step::CreateAttestation => {
            if let Some(uid) = snapshot.schema_uid {
                body.push_str(&format!("<div><strong>Schema UID:</strong> {uid:?}</div>\n"));
            }
            body.push_str("<h2>Create Attestation</h2>\n");
            for field in FormField::ALL {
                body.push_str(&format!(
                    "<input type=\"number\" min=\"0\" data-field name=\"{name}\" value=\"{value}\" placeholder=\"{name}\" />\n",
                    name = field.name(),
                    value = snapshot.form.get(field),
                ));
            }
            body.push_str("<button onclick=\"createAttestation()\">Create Attestation</button>\n");
            if let Some(uid) = snapshot.attestation_uid {
                body.push_str(&format!("<div><strong>Attestation UID:</strong> {uid:?}</div>\n"));
            }
            body.push_str("<h2>Revoke Attestation</h2>\n");
            body.push_str("<button onclick=\"revokeAttestation()\">Revoke Attestation</button>\n");
        }
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Ethereum Attestation Service</title></head>\n\
         <body>\n<div style=\"display: flex; flex-direction: column; justify-content: center\">\n{body}</div>\n{PAGE_SCRIPT}\n</body>\n</html>\n"
    )
}
