//! Client-side protocol driving: requests, ticket verification, enrollment
//!
//! The client trusts no single server. It dual-signs its ticket request,
//! and on receiving the issued ticket it re-validates everything locally:
//! both countersignatures, that the Access Manager narrowed (never
//! broadened) what was requested, that the pseudonym order survived, and
//! that every translation step carries a valid proof against the announced
//! verifier points.

use std::sync::Arc;

use crate::certificate::{X509Identity, X509RootCertificates};
use crate::curve::CurveScalar;
use crate::errors::PepError;
use crate::keycomponents::{assemble_private_key, KeyComponentResponse};
use crate::accessmanager::IndexedTicket2;
use crate::pseudonyms::EncryptedPseudonym;
use crate::signature::Timestamp;
use crate::ticketing::{SignedTicketRequest2, Ticket2, TicketRequest2};
use crate::transcryptor::{CertifiedTranslation, TranslationVerifiers};

const LOG_TARGET: &str = "pep_core::client";

/// A client of the cryptographic core.
pub struct CoreClient {
    identity: Arc<X509Identity>,
    root_cas: X509RootCertificates,
    timestamp_leeway_seconds: u64,
}

/// The client's assembled private keys after enrollment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledKeys {
    /// Decrypts this recipient's encrypted local pseudonyms.
    pub pseudonym_key: CurveScalar,
    /// Decrypts this recipient's translated data keys.
    pub data_key: CurveScalar,
}

impl CoreClient {
    /// A client with its enrolled identity.
    pub fn new(
        identity: Arc<X509Identity>,
        root_cas: X509RootCertificates,
        timestamp_leeway_seconds: u64,
    ) -> Self {
        CoreClient {
            identity,
            root_cas,
            timestamp_leeway_seconds,
        }
    }

    /// Dual-sign a ticket request: one signature for processing, one log
    /// copy for the audit archive.
    pub fn make_ticket_request(&self, request: &TicketRequest2) -> SignedTicketRequest2 {
        SignedTicketRequest2::new(request, &self.identity)
    }

    /// Validate an issued ticket against what was requested. Returns the
    /// opened ticket on success.
    pub fn validate_issued_ticket(
        &self,
        requested: &TicketRequest2,
        issued: &IndexedTicket2,
        user_group: &str,
        now: Timestamp,
    ) -> Result<Ticket2, PepError> {
        let ticket = issued.ticket.open(
            &self.root_cas,
            user_group,
            None,
            self.timestamp_leeway_seconds,
            now,
        )?;

        // The Access Manager may narrow the request, never broaden it.
        for mode in &ticket.modes {
            if !requested.modes.contains(mode) {
                return Err(PepError::AccessDenied(format!(
                    "ticket grants mode {mode:?} which was never requested"
                )));
            }
        }
        if requested.column_groups.is_empty() {
            for column in &ticket.columns {
                if !requested.columns.contains(column) {
                    return Err(PepError::AccessDenied(format!(
                        "ticket grants column {column:?} which was never requested"
                    )));
                }
            }
        }

        // The explicitly requested pseudonyms must lead the ticket in
        // request order.
        if ticket.pseudonyms.len() < requested.polymorphic_pseudonyms.len()
            || ticket.pseudonyms.len() != issued.entries.len()
        {
            return Err(PepError::AccessDenied(
                "ticket pseudonym list does not cover the request".into(),
            ));
        }
        for (i, requested_pseudonym) in requested.polymorphic_pseudonyms.iter().enumerate() {
            if ticket.pseudonyms[i].polymorphic != *requested_pseudonym {
                return Err(PepError::AccessDenied(format!(
                    "ticket pseudonym {i} does not preserve the requested order"
                )));
            }
        }

        let transcryptor_verifiers = issued.transcryptor_verifiers.as_ref();
        for (i, (entry, local)) in issued.entries.iter().zip(&ticket.pseudonyms).enumerate() {
            if entry.step1.polymorphic != local.polymorphic {
                return Err(PepError::AccessDenied(format!(
                    "proof bundle {i} refers to a different pseudonym"
                )));
            }

            // Step 1: polymorphic -> per-view, by the Access Manager.
            let step1 = &entry.step1;
            let pre = step1.polymorphic.encryption();
            let av = &issued.access_manager_verifiers;
            step1
                .access_manager_proof
                .verify(pre, step1.access_manager.encryption(), &av.access_manager)?;
            step1.storage_facility_proof.verify(
                pre,
                step1.storage_facility.encryption(),
                &av.storage_facility,
            )?;
            step1
                .transcryptor_proof
                .verify(pre, step1.transcryptor.encryption(), &av.transcryptor)?;

            // Step 2: per-view, by the Transcryptor.
            let tv = transcryptor_verifiers.ok_or_else(|| {
                PepError::AccessDenied("issued ticket lacks transcryptor verifiers".into())
            })?;
            verify_step2(
                &step1.access_manager,
                &entry.step2.access_manager,
                &tv.access_manager,
            )?;
            verify_step2(
                &step1.storage_facility,
                &entry.step2.storage_facility,
                &tv.storage_facility,
            )?;
            verify_step2(
                &step1.transcryptor,
                &entry.step2.transcryptor,
                &tv.transcryptor,
            )?;

            // The ticket's pseudonyms must be exactly the proven outputs.
            if local.access_manager != entry.step2.access_manager.pseudonym
                || local.storage_facility != entry.step2.storage_facility.pseudonym
            {
                return Err(PepError::AccessDenied(format!(
                    "ticket pseudonym {i} differs from the proven translation"
                )));
            }

            if requested.include_user_group_pseudonyms {
                self.verify_user_group_views(step1, entry, local, issued, tv)?;
            }
        }

        tracing::debug!(
            target: LOG_TARGET,
            "ticket validated: {} pseudonyms, {} proofs checked",
            ticket.pseudonyms.len(),
            issued.entries.len() * if requested.include_user_group_pseudonyms { 8 } else { 6 },
        );
        Ok(ticket)
    }

    fn verify_user_group_views(
        &self,
        step1: &crate::transcryptor::TranscryptorRequestEntry,
        entry: &crate::accessmanager::TicketTranslationEntry,
        local: &crate::ticketing::LocalPseudonyms,
        issued: &IndexedTicket2,
        transcryptor_verifiers: &TranslationVerifiers,
    ) -> Result<(), PepError> {
        let missing = || PepError::AccessDenied("user-group view missing from the ticket".into());
        let step1_view = step1.user_group.as_ref().ok_or_else(missing)?;
        let step1_proof = step1.user_group_proof.as_ref().ok_or_else(missing)?;
        let step2_view = entry.step2.user_group.as_ref().ok_or_else(missing)?;
        let ticket_view = local.access_group.as_ref().ok_or_else(missing)?;
        let av = issued
            .access_manager_verifiers
            .user_group
            .as_ref()
            .ok_or_else(missing)?;
        let tv = transcryptor_verifiers
            .user_group
            .as_ref()
            .ok_or_else(missing)?;

        step1_proof.verify(
            step1.polymorphic.encryption(),
            step1_view.encryption(),
            av,
        )?;
        verify_step2(step1_view, step2_view, tv)?;
        if *ticket_view != step2_view.pseudonym {
            return Err(PepError::AccessDenied(
                "ticket user-group pseudonym differs from the proven translation".into(),
            ));
        }
        Ok(())
    }

    /// Multiply key components from all servers into the client's private
    /// keys.
    pub fn assemble_keys(&self, responses: &[KeyComponentResponse]) -> AssembledKeys {
        AssembledKeys {
            pseudonym_key: assemble_private_key(
                &responses
                    .iter()
                    .map(|r| r.pseudonym_key_component)
                    .collect::<Vec<_>>(),
            ),
            data_key: assemble_private_key(
                &responses
                    .iter()
                    .map(|r| r.encryption_key_component)
                    .collect::<Vec<_>>(),
            ),
        }
    }

    /// Should the caller retry after this error? Only transport failures and
    /// stale-timestamp rejections are retryable, the latter after re-signing.
    pub fn should_retry(error: &PepError) -> bool {
        error.is_retryable()
    }
}

fn verify_step2(
    step1: &crate::pseudonyms::EncryptedLocalPseudonym,
    step2: &CertifiedTranslation,
    verifiers: &crate::proofs::RskVerifiers,
) -> Result<(), PepError> {
    step2
        .proof
        .verify(step1.encryption(), step2.pseudonym.encryption(), verifiers)?;
    Ok(())
}
