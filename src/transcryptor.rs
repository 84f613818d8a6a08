//! The Transcryptor: second translation step, countersigning and audit
//!
//! The Transcryptor is the second of the two parties that must cooperate to
//! issue a ticket. For every request it:
//!
//! 1. validates the **client's** original dual signature (not merely the
//!    Access Manager's wrapper);
//! 2. verifies every step-1 proof against the Access Manager's announced
//!    verifier points; an [`InvalidProof`] aborts before anything is
//!    persisted;
//! 3. performs its own certified RSK step per view;
//! 4. records an audit row binding a fresh ticket id to the request;
//! 5. later countersigns the assembled ticket body
//!    ([`Transcryptor::handle_log_issued_ticket`]) after checking it against
//!    the recorded request.
//!
//! Audit rows feed the operational checksum chains: the pseudonym hash is
//! SHA-256 over the ordered decrypted local-pseudonym encodings, so two
//! tickets for the same subjects hash identically while their ids stay
//! distinct.

#![allow(missing_docs)] // Message fields mirror the wire schema one to one.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::certificate::{X509CertificateChain, X509Identity, X509RootCertificates};
use crate::elgamal::{ElgamalPrivateKey, EncryptedKey};
use crate::errors::PepError;
use crate::proofs::{RskProof, RskVerifiers};
use crate::pseudonyms::{EncryptedLocalPseudonym, EncryptedPseudonym, LocalPseudonym, PolymorphicPseudonym};
use crate::rsk::{RekeyRecipient, SkRecipient};
use crate::signature::{Signature, Timestamp};
use crate::signed::Signed;
use crate::ticketing::{
    SignedTicket2, SignedTicketRequest2, ACCESS_MANAGER_COMMON_NAME, STORAGE_FACILITY_COMMON_NAME,
    TRANSCRYPTOR_COMMON_NAME,
};
use crate::translator::{DataTranslator, PseudonymTranslator};

const LOG_TARGET: &str = "pep_core::transcryptor";

// ============================================================================
// Messages
// ============================================================================

/// Batch data-key translation for the requesting client.
#[derive(Clone, Debug, PartialEq)]
pub struct RekeyRequest {
    pub keys: Vec<EncryptedKey>,
    pub client_certificate_chain: X509CertificateChain,
}

/// The translated data keys, in request order.
#[derive(Clone, Debug, PartialEq)]
pub struct RekeyResponse {
    pub keys: Vec<EncryptedKey>,
}

/// One pseudonym's step-1 outputs: the per-view translations the Access
/// Manager produced, each with its proof.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscryptorRequestEntry {
    pub polymorphic: PolymorphicPseudonym,
    pub access_manager: EncryptedLocalPseudonym,
    pub storage_facility: EncryptedLocalPseudonym,
    pub transcryptor: EncryptedLocalPseudonym,
    pub user_group: Option<EncryptedLocalPseudonym>,
    pub access_manager_proof: RskProof,
    pub storage_facility_proof: RskProof,
    pub transcryptor_proof: RskProof,
    pub user_group_proof: Option<RskProof>,
}

/// The verifier triples for one translation step, one per receiving view.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationVerifiers {
    pub access_manager: RskVerifiers,
    pub storage_facility: RskVerifiers,
    pub transcryptor: RskVerifiers,
    pub user_group: Option<RskVerifiers>,
}

/// The Access Manager's request for the second translation step: the
/// original signed client request plus the step-1 outputs and verifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscryptorRequest {
    pub request: SignedTicketRequest2,
    pub entries: Vec<TranscryptorRequestEntry>,
    pub verifiers: TranslationVerifiers,
}

/// One certified translation: the translated pseudonym and its proof.
#[derive(Clone, Debug, PartialEq)]
pub struct CertifiedTranslation {
    pub pseudonym: EncryptedLocalPseudonym,
    pub proof: RskProof,
}

/// One pseudonym's step-2 outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscryptorResponseEntry {
    pub access_manager: CertifiedTranslation,
    pub storage_facility: CertifiedTranslation,
    pub transcryptor: CertifiedTranslation,
    pub user_group: Option<CertifiedTranslation>,
}

/// The Transcryptor's answer: final per-view pseudonyms with proofs, its
/// own verifier points, and the audit id the eventual ticket must carry.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscryptorResponse {
    pub entries: Vec<TranscryptorResponseEntry>,
    pub verifiers: Option<TranslationVerifiers>,
    pub id: String,
}

/// Asks the Transcryptor to countersign an assembled ticket.
#[derive(Clone, Debug, PartialEq)]
pub struct LogIssuedTicketRequest {
    pub ticket: SignedTicket2,
    pub id: String,
}

/// The countersignature over the ticket body.
#[derive(Clone, Debug, PartialEq)]
pub struct LogIssuedTicketResponse {
    pub signature: Signature,
}

// ============================================================================
// Audit storage and checksum chains
// ============================================================================

/// One issued-ticket audit row.
#[derive(Clone, Debug, PartialEq)]
pub struct TicketAuditRecord {
    pub id: String,
    pub timestamp: Timestamp,
    pub pseudonym_hash: [u8; 32],
    pub columns: Vec<String>,
    pub modes: Vec<String>,
    pub user_group: String,
}

/// SHA-256 over the ordered packed local-pseudonym encodings.
pub fn pseudonym_hash(local_pseudonyms: &[LocalPseudonym]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for pseudonym in local_pseudonyms {
        hasher.update(pseudonym.pack());
    }
    hasher.finalize().into()
}

#[derive(Debug)]
struct PendingTicket {
    pseudonym_hash: [u8; 32],
    pseudonym_count: usize,
    modes: Vec<String>,
    user_group: String,
}

#[derive(Default)]
struct StorageInner {
    requests: Vec<[u8; 32]>,
    issued: Vec<TicketAuditRecord>,
    pending: HashMap<String, PendingTicket>,
}

/// In-memory audit storage. Single writer behind a mutex; writers never hold
/// the lock longer than one append.
#[derive(Default)]
pub struct TranscryptorStorage {
    inner: Mutex<StorageInner>,
}

/// Checkpoint of an empty checksum chain.
pub const EMPTY_TABLE_CHECKPOINT: u64 = 1;
/// Record sequence number 0 is this checkpoint.
pub const FIRST_RECORD_CHECKPOINT: u64 = EMPTY_TABLE_CHECKPOINT + 1;

fn seq_no_to_checkpoint(seq_no: u64) -> u64 {
    seq_no + FIRST_RECORD_CHECKPOINT
}

fn fold_into_checksum(checksum: u64, record_digest: &[u8; 32]) -> u64 {
    let head: [u8; 8] = record_digest[..8]
        .try_into()
        .expect("digest longer than 8 bytes");
    checksum ^ u64::from_be_bytes(head)
}

impl TranscryptorStorage {
    /// Record a handled translation request; returns the fresh ticket id.
    pub fn log_ticket_request(
        &self,
        local_pseudonyms: &[LocalPseudonym],
        modes: &[String],
        user_group: &str,
        hash: [u8; 32],
    ) -> String {
        let mut id_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut id_bytes);
        let id = hex::encode(id_bytes);

        let mut inner = self.inner.lock().expect("audit storage poisoned");
        inner.requests.push(hash);
        inner.pending.insert(
            id.clone(),
            PendingTicket {
                pseudonym_hash: hash,
                pseudonym_count: local_pseudonyms.len(),
                modes: modes.to_vec(),
                user_group: user_group.to_owned(),
            },
        );
        id
    }

    fn take_pending(&self, id: &str) -> Option<PendingTicket> {
        self.inner
            .lock()
            .expect("audit storage poisoned")
            .pending
            .remove(id)
    }

    fn log_issued_ticket(&self, record: TicketAuditRecord) {
        self.inner
            .lock()
            .expect("audit storage poisoned")
            .issued
            .push(record);
    }

    /// The issued-ticket rows, oldest first.
    pub fn issued_tickets(&self) -> Vec<TicketAuditRecord> {
        self.inner
            .lock()
            .expect("audit storage poisoned")
            .issued
            .clone()
    }

    /// Names of the checksum chains this storage maintains.
    pub fn checksum_chain_names(&self) -> Vec<String> {
        vec!["ticket-requests".into(), "issued-tickets".into()]
    }

    /// The chain's value at the highest checkpoint not exceeding
    /// `max_checkpoint`. Returns `(checksum, checkpoint)`.
    pub fn compute_checksum(
        &self,
        chain: &str,
        max_checkpoint: Option<u64>,
    ) -> Result<(u64, u64), PepError> {
        let inner = self.inner.lock().expect("audit storage poisoned");
        let digests: Vec<[u8; 32]> = match chain {
            "ticket-requests" => inner.requests.clone(),
            "issued-tickets" => inner
                .issued
                .iter()
                .map(|record| {
                    let mut hasher = Sha256::new();
                    hasher.update(record.id.as_bytes());
                    hasher.update(record.pseudonym_hash);
                    hasher.finalize().into()
                })
                .collect(),
            other => {
                return Err(PepError::Other {
                    original_type_name: "Error".into(),
                    description: format!("unknown checksum chain {other:?}"),
                })
            }
        };

        let limit = max_checkpoint.unwrap_or(u64::MAX);
        let mut checksum = 0u64;
        let mut checkpoint = EMPTY_TABLE_CHECKPOINT;
        for (seq_no, digest) in digests.iter().enumerate() {
            let record_checkpoint = seq_no_to_checkpoint(seq_no as u64);
            if record_checkpoint > limit {
                break;
            }
            checksum = fold_into_checksum(checksum, digest);
            checkpoint = record_checkpoint;
        }
        Ok((checksum, checkpoint))
    }
}

// ============================================================================
// The Transcryptor
// ============================================================================

/// The Transcryptor server's cryptographic handler.
pub struct Transcryptor {
    identity: X509Identity,
    root_cas: X509RootCertificates,
    pseudonym_translator: PseudonymTranslator,
    data_translator: DataTranslator,
    /// The Transcryptor's own assembled pseudonym decryption key (obtained
    /// through enrollment like any other party); used to decrypt its view
    /// for the audit hash.
    own_pseudonym_key: ElgamalPrivateKey,
    storage: TranscryptorStorage,
    timestamp_leeway_seconds: u64,
}

impl Transcryptor {
    /// Assemble the handler. Key material is read-only afterwards.
    pub fn new(
        identity: X509Identity,
        root_cas: X509RootCertificates,
        pseudonym_translator: PseudonymTranslator,
        data_translator: DataTranslator,
        own_pseudonym_key: ElgamalPrivateKey,
        timestamp_leeway_seconds: u64,
    ) -> Self {
        Transcryptor {
            identity,
            root_cas,
            pseudonym_translator,
            data_translator,
            own_pseudonym_key,
            storage: TranscryptorStorage::default(),
            timestamp_leeway_seconds,
        }
    }

    /// The signing identity (for countersignature checks in tests).
    pub fn identity(&self) -> &X509Identity {
        &self.identity
    }

    /// The audit storage.
    pub fn storage(&self) -> &TranscryptorStorage {
        &self.storage
    }

    /// Handle a signed transcryption request from the Access Manager.
    pub fn handle_signed_request(
        &self,
        signed: &Signed<TranscryptorRequest>,
        now: Timestamp,
    ) -> Result<TranscryptorResponse, PepError> {
        let certified = signed.open(
            &self.root_cas,
            Some(ACCESS_MANAGER_COMMON_NAME),
            self.timestamp_leeway_seconds,
            now,
        )?;
        self.handle_request(&certified.message, now)
    }

    /// Validate, verify, translate and record one request.
    pub fn handle_request(
        &self,
        request: &TranscryptorRequest,
        now: Timestamp,
    ) -> Result<TranscryptorResponse, PepError> {
        let mut rng = OsRng;

        // The client's own signatures, independently of the wrapper.
        let (signatory, ticket_request) = request.request.open_as_transcryptor(
            &self.root_cas,
            self.timestamp_leeway_seconds,
            now,
        )?;
        let user_group = signatory
            .organizational_unit()
            .ok_or_else(|| {
                PepError::AccessDenied("requester certificate carries no user group".into())
            })?
            .to_owned();

        // The explicitly requested pseudonyms must lead the entry list in
        // request order; the Access Manager appends group expansions behind
        // them.
        if request.entries.len() < ticket_request.polymorphic_pseudonyms.len() {
            return Err(PepError::AccessDenied(
                "fewer entries than requested pseudonyms".into(),
            ));
        }
        for (i, requested) in ticket_request.polymorphic_pseudonyms.iter().enumerate() {
            if request.entries[i].polymorphic != *requested {
                return Err(PepError::AccessDenied(format!(
                    "entry {i} does not match the requested pseudonym order"
                )));
            }
        }

        let include_user_group = ticket_request.include_user_group_pseudonyms;
        if include_user_group && request.verifiers.user_group.is_none() {
            return Err(PepError::AccessDenied(
                "user-group pseudonyms requested but no user-group verifiers announced".into(),
            ));
        }

        // Verify every step-1 proof before touching any state.
        for (i, entry) in request.entries.iter().enumerate() {
            self.check_step1_entry(entry, &request.verifiers, include_user_group)
                .map_err(|err| {
                    tracing::warn!(
                        target: LOG_TARGET,
                        "rejecting request: step-1 proof {i} failed: {err}"
                    );
                    err
                })?;
        }

        // Step 2, per entry and view, with fresh proofs.
        let recipients = ViewRecipients::for_user_group(&user_group);
        let mut entries = Vec::with_capacity(request.entries.len());
        let mut own_locals = Vec::with_capacity(request.entries.len());
        for entry in &request.entries {
            let access_manager = self.step2(&entry.access_manager, &recipients.access_manager, &mut rng)?;
            let storage_facility =
                self.step2(&entry.storage_facility, &recipients.storage_facility, &mut rng)?;
            let transcryptor = self.step2(&entry.transcryptor, &recipients.transcryptor, &mut rng)?;
            let user_group_view = match (include_user_group, &entry.user_group) {
                (true, Some(step1)) => Some(self.step2(step1, &recipients.user_group, &mut rng)?),
                (false, _) => None,
                (true, None) => {
                    return Err(PepError::AccessDenied(
                        "entry lacks the requested user-group view".into(),
                    ))
                }
            };
            own_locals.push(transcryptor.pseudonym.decrypt(&self.own_pseudonym_key));
            entries.push(TranscryptorResponseEntry {
                access_manager,
                storage_facility,
                transcryptor,
                user_group: user_group_view,
            });
        }

        let verifiers = request.entries.first().map(|first| {
            self.step2_verifiers(first, &recipients, include_user_group)
        });
        let verifiers = match verifiers {
            Some(v) => Some(v?),
            None => None,
        };

        let hash = pseudonym_hash(&own_locals);
        let id = self.storage.log_ticket_request(
            &own_locals,
            &ticket_request.modes,
            &user_group,
            hash,
        );
        tracing::info!(
            target: LOG_TARGET,
            "translated {} pseudonyms for {user_group}; ticket id {id}",
            entries.len()
        );

        Ok(TranscryptorResponse {
            entries,
            verifiers,
            id,
        })
    }

    fn check_step1_entry(
        &self,
        entry: &TranscryptorRequestEntry,
        verifiers: &TranslationVerifiers,
        include_user_group: bool,
    ) -> Result<(), PepError> {
        let pre = entry.polymorphic.encryption();
        entry
            .access_manager_proof
            .verify(pre, entry.access_manager.encryption(), &verifiers.access_manager)?;
        entry.storage_facility_proof.verify(
            pre,
            entry.storage_facility.encryption(),
            &verifiers.storage_facility,
        )?;
        entry
            .transcryptor_proof
            .verify(pre, entry.transcryptor.encryption(), &verifiers.transcryptor)?;
        if include_user_group {
            match (&entry.user_group, &entry.user_group_proof, &verifiers.user_group) {
                (Some(view), Some(proof), Some(ug_verifiers)) => {
                    proof.verify(pre, view.encryption(), ug_verifiers)?;
                }
                _ => {
                    return Err(PepError::AccessDenied(
                        "incomplete user-group view in step-1 entry".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    fn step2(
        &self,
        step1: &EncryptedLocalPseudonym,
        recipient: &SkRecipient,
        rng: &mut OsRng,
    ) -> Result<CertifiedTranslation, PepError> {
        let (pseudonym, proof) =
            self.pseudonym_translator
                .certified_translate_step(step1, recipient, rng)?;
        Ok(CertifiedTranslation { pseudonym, proof })
    }

    fn step2_verifiers(
        &self,
        first: &TranscryptorRequestEntry,
        recipients: &ViewRecipients,
        include_user_group: bool,
    ) -> Result<TranslationVerifiers, PepError> {
        Ok(TranslationVerifiers {
            access_manager: self.pseudonym_translator.compute_translation_proof_verifiers(
                &recipients.access_manager,
                &first.access_manager.encryption().y,
            )?,
            storage_facility: self.pseudonym_translator.compute_translation_proof_verifiers(
                &recipients.storage_facility,
                &first.storage_facility.encryption().y,
            )?,
            transcryptor: self.pseudonym_translator.compute_translation_proof_verifiers(
                &recipients.transcryptor,
                &first.transcryptor.encryption().y,
            )?,
            user_group: match (include_user_group, &first.user_group) {
                (true, Some(view)) => Some(
                    self.pseudonym_translator.compute_translation_proof_verifiers(
                        &recipients.user_group,
                        &view.encryption().y,
                    )?,
                ),
                _ => None,
            },
        })
    }

    /// Countersign an assembled ticket after checking it against the
    /// recorded request, and persist the issued-ticket audit row.
    pub fn handle_log_issued_ticket(
        &self,
        request: &LogIssuedTicketRequest,
        now: Timestamp,
    ) -> Result<LogIssuedTicketResponse, PepError> {
        let pending = self.storage.take_pending(&request.id).ok_or_else(|| {
            PepError::AccessDenied(format!("unknown ticket id {:?}", request.id))
        })?;

        let access_manager_signature = request.ticket.signature.as_ref().ok_or_else(|| {
            PepError::Signature("ticket to countersign lacks the Access Manager signature".into())
        })?;
        access_manager_signature.validate(
            &request.ticket.data,
            &self.root_cas,
            Some(ACCESS_MANAGER_COMMON_NAME),
            self.timestamp_leeway_seconds,
            false,
            now,
        )?;

        let ticket = request.ticket.open_without_checking_signature()?;
        if ticket.pseudonyms.len() != pending.pseudonym_count
            || ticket.modes != pending.modes
            || ticket.user_group != pending.user_group
        {
            return Err(PepError::AccessDenied(
                "assembled ticket does not match the recorded request".into(),
            ));
        }

        self.storage.log_issued_ticket(TicketAuditRecord {
            id: request.id.clone(),
            timestamp: ticket.timestamp,
            pseudonym_hash: pending.pseudonym_hash,
            columns: ticket.columns.clone(),
            modes: ticket.modes.clone(),
            user_group: ticket.user_group.clone(),
        });

        Ok(LogIssuedTicketResponse {
            signature: Signature::create(&request.ticket.data, &self.identity, false),
        })
    }

    /// Batch data-key translation for the client identified by the chain in
    /// the request.
    pub fn handle_rekey_request(
        &self,
        request: &RekeyRequest,
        now: Timestamp,
    ) -> Result<RekeyResponse, PepError> {
        let mut rng = OsRng;
        request
            .client_certificate_chain
            .validate(&self.root_cas, now)
            .map_err(crate::signature::SignatureError::from)
            .map_err(PepError::from)?;
        let leaf = request
            .client_certificate_chain
            .leaf()
            .map_err(crate::signature::SignatureError::from)
            .map_err(PepError::from)?;
        let recipient = match leaf.organizational_unit() {
            Some(group) => RekeyRecipient::from_name(&group),
            None => RekeyRecipient::from_name(&leaf.common_name().map_err(
                crate::signature::SignatureError::from,
            )?),
        };
        let keys = request
            .keys
            .iter()
            .map(|key| self.data_translator.translate_step(key, &recipient, &mut rng))
            .collect();
        Ok(RekeyResponse { keys })
    }

    /// Key components for an enrolling party.
    pub fn handle_key_component_request(
        &self,
        request: &crate::keycomponents::SignedKeyComponentRequest,
        now: Timestamp,
    ) -> Result<crate::keycomponents::KeyComponentResponse, PepError> {
        crate::keycomponents::KeyComponentResponse::handle_request(
            request,
            &self.pseudonym_translator,
            &self.data_translator,
            &self.root_cas,
            self.timestamp_leeway_seconds,
            now,
        )
    }
}

/// The per-view translation recipients of one request.
pub(crate) struct ViewRecipients {
    pub access_manager: SkRecipient,
    pub storage_facility: SkRecipient,
    pub transcryptor: SkRecipient,
    pub user_group: SkRecipient,
}

impl ViewRecipients {
    pub(crate) fn for_user_group(user_group: &str) -> Self {
        ViewRecipients {
            access_manager: SkRecipient::from_name(ACCESS_MANAGER_COMMON_NAME),
            storage_facility: SkRecipient::from_name(STORAGE_FACILITY_COMMON_NAME),
            transcryptor: SkRecipient::from_name(TRANSCRYPTOR_COMMON_NAME),
            user_group: SkRecipient::from_name(user_group),
        }
    }
}
