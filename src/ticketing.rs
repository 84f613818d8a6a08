//! Ticketing messages: requests, tickets and their dual-signed envelopes
//!
//! A ticket is only valid when countersigned by both the Access Manager and
//! the Transcryptor; neither party alone can issue one. The two envelope
//! types here therefore deviate from the generic [`crate::signed::Signed`]
//! shape and carry two signatures over the same serialized body:
//!
//! - [`SignedTicket2`]: the Access Manager's signature plus the
//!   Transcryptor's countersignature.
//! - [`SignedTicketRequest2`]: the client's signature plus the client's
//!   log-copy signature (archived for audit).
//!
//! The pseudonym order inside a ticket is established by the Access Manager
//! and preserved by every later party; `pseudonyms[i]` across messages
//! always refers to the same subject.

#![allow(missing_docs)] // Message fields mirror the wire schema one to one.

use crate::certificate::{X509Identity, X509RootCertificates};
use crate::errors::{PepError, SignedTicket2ValidityPeriodError};
use crate::pseudonyms::{EncryptedLocalPseudonym, PolymorphicPseudonym};
use crate::serialization::{SerializeError, WireSerializable};
use crate::signature::{Signatory, Signature, Timestamp};

/// Expected leaf common name of the Access Manager's signing certificate.
pub const ACCESS_MANAGER_COMMON_NAME: &str = "AccessManager";
/// Expected leaf common name of the Transcryptor's signing certificate.
pub const TRANSCRYPTOR_COMMON_NAME: &str = "Transcryptor";
/// Expected leaf common name of the Storage Facility's signing certificate.
pub const STORAGE_FACILITY_COMMON_NAME: &str = "StorageFacility";

/// The per-party encrypted views of one subject inside a ticket.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalPseudonyms {
    pub access_manager: EncryptedLocalPseudonym,
    pub storage_facility: EncryptedLocalPseudonym,
    pub polymorphic: PolymorphicPseudonym,
    /// Present when the request asked for user-group pseudonyms.
    pub access_group: Option<EncryptedLocalPseudonym>,
}

/// An access ticket.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Ticket2 {
    pub timestamp: Timestamp,
    pub modes: Vec<String>,
    pub pseudonyms: Vec<LocalPseudonyms>,
    pub columns: Vec<String>,
    pub user_group: String,
}

impl Ticket2 {
    /// Exact mode membership; `read-meta` never implies `read`.
    pub fn has_mode(&self, mode: &str) -> bool {
        self.modes.iter().any(|m| m == mode)
    }

    /// The polymorphic pseudonyms, in ticket order.
    pub fn polymorphic_pseudonyms(&self) -> Vec<PolymorphicPseudonym> {
        self.pseudonyms.iter().map(|p| p.polymorphic).collect()
    }
}

/// A client's request for a ticket.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TicketRequest2 {
    pub modes: Vec<String>,
    pub participant_groups: Vec<String>,
    pub polymorphic_pseudonyms: Vec<PolymorphicPseudonym>,
    pub column_groups: Vec<String>,
    pub columns: Vec<String>,
    pub include_user_group_pseudonyms: bool,
    pub request_indexed_ticket: bool,
}

// ============================================================================
// Dual-signed envelopes
// ============================================================================

/// A ticket body signed by the Access Manager and countersigned by the
/// Transcryptor.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedTicket2 {
    /// The Access Manager's signature, once attached.
    pub signature: Option<Signature>,
    /// The Transcryptor's countersignature, once attached.
    pub transcryptor_signature: Option<Signature>,
    /// The serialized ticket body (magic included).
    pub data: Vec<u8>,
}

impl SignedTicket2 {
    /// Serialize `ticket` and sign it as the Access Manager. The
    /// countersignature is attached separately.
    pub fn new(ticket: &Ticket2, access_manager_identity: &X509Identity) -> Self {
        let data = ticket.to_wire();
        let signature = Signature::create(&data, access_manager_identity, false);
        SignedTicket2 {
            signature: Some(signature),
            transcryptor_signature: None,
            data,
        }
    }

    /// Serialize `ticket` without signing yet (the body the Transcryptor
    /// countersigns before the Access Manager adds its own signature).
    pub fn unsigned(ticket: &Ticket2) -> Self {
        SignedTicket2 {
            signature: None,
            transcryptor_signature: None,
            data: ticket.to_wire(),
        }
    }

    /// Deserialize the ticket without any signature checks.
    pub fn open_without_checking_signature(&self) -> Result<Ticket2, SerializeError> {
        Ticket2::from_wire(&self.data)
    }

    fn validate_both_signatures(
        &self,
        root_cas: &X509RootCertificates,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<(), PepError> {
        let access_manager = self
            .signature
            .as_ref()
            .ok_or_else(|| PepError::Signature("ticket lacks the Access Manager signature".into()))?;
        access_manager.validate(
            &self.data,
            root_cas,
            Some(ACCESS_MANAGER_COMMON_NAME),
            timestamp_leeway_seconds,
            false,
            now,
        )?;
        let transcryptor = self.transcryptor_signature.as_ref().ok_or_else(|| {
            PepError::Signature("ticket lacks the Transcryptor countersignature".into())
        })?;
        transcryptor.validate(
            &self.data,
            root_cas,
            Some(TRANSCRYPTOR_COMMON_NAME),
            timestamp_leeway_seconds,
            false,
            now,
        )?;
        Ok(())
    }

    /// Validate both signatures, the ticket's own freshness, the holder's
    /// access group and (optionally) a required mode, then deserialize.
    pub fn open(
        &self,
        root_cas: &X509RootCertificates,
        access_group: &str,
        access_mode: Option<&str>,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<Ticket2, PepError> {
        self.validate_both_signatures(root_cas, timestamp_leeway_seconds, now)?;
        let ticket = self.open_without_checking_signature()?;
        if now.abs_diff_seconds(ticket.timestamp) > timestamp_leeway_seconds {
            return Err(SignedTicket2ValidityPeriodError(format!(
                "ticket issued at {:?} has expired at {:?}",
                ticket.timestamp, now
            ))
            .into());
        }
        if ticket.user_group != access_group {
            return Err(PepError::AccessDenied(format!(
                "ticket was issued to user group {:?}, not {:?}",
                ticket.user_group, access_group
            )));
        }
        if let Some(mode) = access_mode {
            if !ticket.has_mode(mode) {
                return Err(PepError::AccessDenied(format!(
                    "ticket does not grant mode {mode:?}"
                )));
            }
        }
        Ok(ticket)
    }

    /// Validate signatures only; the audit log stores expired tickets too.
    pub fn open_for_logging(
        &self,
        root_cas: &X509RootCertificates,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<Ticket2, PepError> {
        self.validate_both_signatures(root_cas, timestamp_leeway_seconds, now)?;
        Ok(self.open_without_checking_signature()?)
    }
}

/// A ticket request signed twice by the client: once for processing, once as
/// a log copy for the audit archive.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedTicketRequest2 {
    pub signature: Option<Signature>,
    pub log_signature: Option<Signature>,
    /// The serialized request body (magic included).
    pub data: Vec<u8>,
}

impl SignedTicketRequest2 {
    /// Serialize and dual-sign `request`.
    pub fn new(request: &TicketRequest2, identity: &X509Identity) -> Self {
        let data = request.to_wire();
        SignedTicketRequest2 {
            signature: Some(Signature::create(&data, identity, false)),
            log_signature: Some(Signature::create(&data, identity, true)),
            data,
        }
    }

    fn validate_both_signatures(
        &self,
        root_cas: &X509RootCertificates,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<Signatory, PepError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| PepError::Signature("request lacks the client signature".into()))?;
        let signatory = signature.validate(
            &self.data,
            root_cas,
            None,
            timestamp_leeway_seconds,
            false,
            now,
        )?;
        let log_signature = self
            .log_signature
            .as_ref()
            .ok_or_else(|| PepError::Signature("request lacks the log-copy signature".into()))?;
        let log_signatory = log_signature.validate(
            &self.data,
            root_cas,
            None,
            timestamp_leeway_seconds,
            true,
            now,
        )?;
        if log_signatory.common_name() != signatory.common_name() {
            return Err(PepError::Signature(
                "the log-copy signature names a different signer".into(),
            ));
        }
        Ok(signatory)
    }

    /// Open as the Access Manager: both client signatures must validate.
    pub fn open_as_access_manager(
        &self,
        root_cas: &X509RootCertificates,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<(Signatory, TicketRequest2), PepError> {
        let signatory = self.validate_both_signatures(root_cas, timestamp_leeway_seconds, now)?;
        Ok((signatory, TicketRequest2::from_wire(&self.data)?))
    }

    /// Open as the Transcryptor: the client's own signatures are validated
    /// again, independently of whatever the Access Manager claimed.
    pub fn open_as_transcryptor(
        &self,
        root_cas: &X509RootCertificates,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<(Signatory, TicketRequest2), PepError> {
        let signatory = self.validate_both_signatures(root_cas, timestamp_leeway_seconds, now)?;
        Ok((signatory, TicketRequest2::from_wire(&self.data)?))
    }
}
