//! The Access Manager: policy gate, first translation step, ticket assembly
//!
//! The Access Manager turns a client's signed ticket request into a
//! countersigned ticket, in cooperation with the Transcryptor:
//!
//! 1. validate both client signatures;
//! 2. apply policy: the requester's user group must be entitled to every
//!    requested mode and column, and every named group must resolve;
//! 3. expand participant groups deterministically (sorted, de-duplicated)
//!    behind the explicitly requested pseudonyms; this fixes the pseudonym
//!    order every later party must preserve;
//! 4. perform step 1: one certified RSK per pseudonym per receiving view;
//! 5. forward everything to the Transcryptor and assemble the final ticket
//!    from its response, signing it and attaching the countersignature.
//!
//! Persistent policy storage is a collaborator behind [`AccessPolicy`]; the
//! Transcryptor connection is a collaborator behind [`TranscryptorPort`].

#![allow(missing_docs)] // Message fields mirror the wire schema one to one.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::OsRng;

use crate::certificate::{X509Identity, X509RootCertificates};
use crate::elgamal::ElgamalPublicKey;
use crate::errors::PepError;
use crate::pseudonyms::PolymorphicPseudonym;
use crate::signature::Timestamp;
use crate::signed::Signed;
use crate::ticketing::{LocalPseudonyms, SignedTicket2, SignedTicketRequest2, Ticket2};
use crate::transcryptor::{
    LogIssuedTicketRequest, LogIssuedTicketResponse, TranscryptorRequest, TranscryptorRequestEntry,
    TranscryptorResponse, TranscryptorResponseEntry, TranslationVerifiers, ViewRecipients,
};
use crate::translator::{DataTranslator, PseudonymTranslator};

const LOG_TARGET: &str = "pep_core::accessmanager";

/// Decides what a user group may do. Backed by the Access Manager's policy
/// store; reduced here to the checks the cryptographic core needs.
pub trait AccessPolicy: Send + Sync {
    /// May `user_group` access `columns` under every one of `modes`?
    fn check_ticket_request(
        &self,
        user_group: &str,
        modes: &[String],
        columns: &[String],
    ) -> Result<(), PepError>;

    /// Resolve a participant group to its polymorphic pseudonyms.
    fn expand_participant_group(
        &self,
        group: &str,
    ) -> Result<Vec<PolymorphicPseudonym>, PepError>;

    /// Resolve a column group to its column names.
    fn expand_column_group(&self, group: &str) -> Result<Vec<String>, PepError>;
}

/// A straightforward in-memory policy, used by tests and small deployments.
#[derive(Default)]
pub struct InMemoryAccessPolicy {
    user_groups: HashMap<String, UserGroupEntitlements>,
    participant_groups: HashMap<String, Vec<PolymorphicPseudonym>>,
    column_groups: HashMap<String, Vec<String>>,
}

#[derive(Default)]
struct UserGroupEntitlements {
    modes: HashSet<String>,
    columns: HashSet<String>,
}

impl InMemoryAccessPolicy {
    /// Entitle `user_group` to `modes` over `columns`.
    pub fn allow(&mut self, user_group: &str, modes: &[&str], columns: &[&str]) {
        let entry = self.user_groups.entry(user_group.to_owned()).or_default();
        entry.modes.extend(modes.iter().map(|m| (*m).to_owned()));
        entry.columns.extend(columns.iter().map(|c| (*c).to_owned()));
    }

    /// Register a participant group.
    pub fn add_participant_group(
        &mut self,
        group: &str,
        pseudonyms: Vec<PolymorphicPseudonym>,
    ) {
        self.participant_groups.insert(group.to_owned(), pseudonyms);
    }

    /// Register a column group.
    pub fn add_column_group(&mut self, group: &str, columns: Vec<String>) {
        self.column_groups.insert(group.to_owned(), columns);
    }
}

impl AccessPolicy for InMemoryAccessPolicy {
    fn check_ticket_request(
        &self,
        user_group: &str,
        modes: &[String],
        columns: &[String],
    ) -> Result<(), PepError> {
        let entitlements = self.user_groups.get(user_group).ok_or_else(|| {
            PepError::AccessDenied(format!("unknown user group {user_group:?}"))
        })?;
        for mode in modes {
            if !entitlements.modes.contains(mode) {
                return Err(PepError::AccessDenied(format!(
                    "user group {user_group:?} may not use mode {mode:?}"
                )));
            }
        }
        for column in columns {
            if !entitlements.columns.contains(column) {
                return Err(PepError::AccessDenied(format!(
                    "user group {user_group:?} may not access column {column:?}"
                )));
            }
        }
        Ok(())
    }

    fn expand_participant_group(
        &self,
        group: &str,
    ) -> Result<Vec<PolymorphicPseudonym>, PepError> {
        self.participant_groups.get(group).cloned().ok_or_else(|| {
            PepError::AccessDenied(format!("unknown participant group {group:?}"))
        })
    }

    fn expand_column_group(&self, group: &str) -> Result<Vec<String>, PepError> {
        self.column_groups.get(group).cloned().ok_or_else(|| {
            PepError::AccessDenied(format!("unknown column group {group:?}"))
        })
    }
}

/// The Access Manager's channel to the Transcryptor. In-process for tests;
/// a signed RPC proxy in deployments. Connection failures surface as the
/// retryable transport error.
pub trait TranscryptorPort: Send + Sync {
    fn transcrypt(
        &self,
        request: Signed<TranscryptorRequest>,
        now: Timestamp,
    ) -> Result<TranscryptorResponse, PepError>;

    fn log_issued_ticket(
        &self,
        request: LogIssuedTicketRequest,
        now: Timestamp,
    ) -> Result<LogIssuedTicketResponse, PepError>;
}

impl TranscryptorPort for crate::transcryptor::Transcryptor {
    fn transcrypt(
        &self,
        request: Signed<TranscryptorRequest>,
        now: Timestamp,
    ) -> Result<TranscryptorResponse, PepError> {
        self.handle_signed_request(&request, now)
    }

    fn log_issued_ticket(
        &self,
        request: LogIssuedTicketRequest,
        now: Timestamp,
    ) -> Result<LogIssuedTicketResponse, PepError> {
        self.handle_log_issued_ticket(&request, now)
    }
}

/// One pseudonym's full translation history, handed to the client so it can
/// verify both steps.
#[derive(Clone, Debug, PartialEq)]
pub struct TicketTranslationEntry {
    pub step1: TranscryptorRequestEntry,
    pub step2: TranscryptorResponseEntry,
}

/// The issued ticket plus everything the client needs to verify it.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedTicket2 {
    pub ticket: SignedTicket2,
    pub entries: Vec<TicketTranslationEntry>,
    pub access_manager_verifiers: TranslationVerifiers,
    pub transcryptor_verifiers: Option<TranslationVerifiers>,
}

/// Asks a server for its verifier points towards the named user group.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct VerifiersRequest {
    pub user_group: Option<String>,
}

/// The verifier points for this server's translation step.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiersResponse {
    pub verifiers: TranslationVerifiers,
}

/// The Access Manager's cryptographic handler.
pub struct AccessManager {
    identity: X509Identity,
    root_cas: X509RootCertificates,
    pseudonym_translator: PseudonymTranslator,
    data_translator: DataTranslator,
    master_public_key: ElgamalPublicKey,
    policy: Arc<dyn AccessPolicy>,
    transcryptor: Arc<dyn TranscryptorPort>,
    timestamp_leeway_seconds: u64,
}

impl AccessManager {
    /// Assemble the handler. Key material is read-only afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: X509Identity,
        root_cas: X509RootCertificates,
        pseudonym_translator: PseudonymTranslator,
        data_translator: DataTranslator,
        master_public_key: ElgamalPublicKey,
        policy: Arc<dyn AccessPolicy>,
        transcryptor: Arc<dyn TranscryptorPort>,
        timestamp_leeway_seconds: u64,
    ) -> Self {
        AccessManager {
            identity,
            root_cas,
            pseudonym_translator,
            data_translator,
            master_public_key,
            policy,
            transcryptor,
            timestamp_leeway_seconds,
        }
    }

    /// Handle a client's ticket request end to end.
    pub fn handle_ticket_request(
        &self,
        signed_request: &SignedTicketRequest2,
        now: Timestamp,
    ) -> Result<IndexedTicket2, PepError> {
        let mut rng = OsRng;
        let (signatory, request) = signed_request.open_as_access_manager(
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

        // Columns: explicit ones plus resolved groups, de-duplicated and
        // sorted.
        let mut columns: BTreeSet<String> = request.columns.iter().cloned().collect();
        for group in &request.column_groups {
            columns.extend(self.policy.expand_column_group(group)?);
        }
        let columns: Vec<String> = columns.into_iter().collect();

        // Modes are a set; keep the first occurrence of each.
        let mut modes: Vec<String> = Vec::new();
        for mode in &request.modes {
            if !modes.contains(mode) {
                modes.push(mode.clone());
            }
        }

        self.policy
            .check_ticket_request(&user_group, &modes, &columns)?;

        // Pseudonyms: explicit ones first, in request order, then the group
        // expansion sorted by encoding and de-duplicated (also against the
        // explicit list). This fixes the order for every later party.
        let mut pseudonyms = request.polymorphic_pseudonyms.clone();
        let mut seen: HashSet<[u8; 96]> = pseudonyms.iter().map(|p| p.pack()).collect();
        let mut expansion: BTreeSet<[u8; 96]> = BTreeSet::new();
        for group in &request.participant_groups {
            for pseudonym in self.policy.expand_participant_group(group)? {
                let packed = pseudonym.pack();
                if !seen.contains(&packed) {
                    expansion.insert(packed);
                }
            }
        }
        for packed in expansion {
            seen.insert(packed);
            pseudonyms.push(
                PolymorphicPseudonym::from_packed(&packed)
                    .map_err(crate::serialization::SerializeError::from)?,
            );
        }

        tracing::info!(
            target: LOG_TARGET,
            "issuing ticket for {user_group}: {} pseudonyms, {} columns",
            pseudonyms.len(),
            columns.len()
        );

        // Step 1 per pseudonym and view.
        let recipients = ViewRecipients::for_user_group(&user_group);
        let include_user_group = request.include_user_group_pseudonyms;
        let mut entries = Vec::with_capacity(pseudonyms.len());
        for pseudonym in &pseudonyms {
            let (access_manager, access_manager_proof) = self
                .pseudonym_translator
                .certified_translate_step(pseudonym, &recipients.access_manager, &mut rng)?;
            let (storage_facility, storage_facility_proof) = self
                .pseudonym_translator
                .certified_translate_step(pseudonym, &recipients.storage_facility, &mut rng)?;
            let (transcryptor, transcryptor_proof) = self
                .pseudonym_translator
                .certified_translate_step(pseudonym, &recipients.transcryptor, &mut rng)?;
            let (user_group_view, user_group_proof) = if include_user_group {
                let (view, proof) = self.pseudonym_translator.certified_translate_step(
                    pseudonym,
                    &recipients.user_group,
                    &mut rng,
                )?;
                (Some(view), Some(proof))
            } else {
                (None, None)
            };
            entries.push(TranscryptorRequestEntry {
                polymorphic: *pseudonym,
                access_manager,
                storage_facility,
                transcryptor,
                user_group: user_group_view,
                access_manager_proof,
                storage_facility_proof,
                transcryptor_proof,
                user_group_proof,
            });
        }

        let access_manager_verifiers =
            self.step1_verifiers(&recipients, include_user_group)?;

        // Hand everything to the Transcryptor for step 2.
        let transcryptor_request = TranscryptorRequest {
            request: signed_request.clone(),
            entries: entries.clone(),
            verifiers: access_manager_verifiers.clone(),
        };
        let response = self
            .transcryptor
            .transcrypt(Signed::new(&transcryptor_request, &self.identity), now)?;
        if response.entries.len() != entries.len() {
            return Err(PepError::Transport(
                "transcryptor returned a mismatched entry count".into(),
            ));
        }

        // Assemble and sign the ticket, then fetch the countersignature.
        let ticket = Ticket2 {
            timestamp: now,
            modes,
            pseudonyms: entries
                .iter()
                .zip(&response.entries)
                .map(|(step1, step2)| LocalPseudonyms {
                    access_manager: step2.access_manager.pseudonym,
                    storage_facility: step2.storage_facility.pseudonym,
                    polymorphic: step1.polymorphic,
                    access_group: step2.user_group.as_ref().map(|ct| ct.pseudonym),
                })
                .collect(),
            columns,
            user_group: user_group.clone(),
        };
        let mut signed_ticket = SignedTicket2::new(&ticket, &self.identity);
        let countersigned = self.transcryptor.log_issued_ticket(
            LogIssuedTicketRequest {
                ticket: signed_ticket.clone(),
                id: response.id.clone(),
            },
            now,
        )?;
        signed_ticket.transcryptor_signature = Some(countersigned.signature);

        Ok(IndexedTicket2 {
            ticket: signed_ticket,
            entries: entries
                .into_iter()
                .zip(response.entries)
                .map(|(step1, step2)| TicketTranslationEntry { step1, step2 })
                .collect(),
            access_manager_verifiers,
            transcryptor_verifiers: response.verifiers,
        })
    }

    fn step1_verifiers(
        &self,
        recipients: &ViewRecipients,
        include_user_group: bool,
    ) -> Result<TranslationVerifiers, PepError> {
        Ok(TranslationVerifiers {
            access_manager: self.pseudonym_translator.compute_translation_proof_verifiers(
                &recipients.access_manager,
                &self.master_public_key,
            )?,
            storage_facility: self.pseudonym_translator.compute_translation_proof_verifiers(
                &recipients.storage_facility,
                &self.master_public_key,
            )?,
            transcryptor: self.pseudonym_translator.compute_translation_proof_verifiers(
                &recipients.transcryptor,
                &self.master_public_key,
            )?,
            user_group: if include_user_group {
                Some(self.pseudonym_translator.compute_translation_proof_verifiers(
                    &recipients.user_group,
                    &self.master_public_key,
                )?)
            } else {
                None
            },
        })
    }

    /// This server's step-1 verifier points for a client.
    pub fn handle_verifiers_request(
        &self,
        request: &VerifiersRequest,
    ) -> Result<VerifiersResponse, PepError> {
        let user_group = request.user_group.as_deref().unwrap_or_default();
        let recipients = ViewRecipients::for_user_group(user_group);
        Ok(VerifiersResponse {
            verifiers: self.step1_verifiers(&recipients, request.user_group.is_some())?,
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CoreClient;
    use crate::curve::CurveScalar;
    use crate::keycomponents::assemble_private_key;
    use crate::rsk::{KeyFactorSecret, MasterPrivateKeyShare, RekeyRecipient};
    use crate::signature::DEFAULT_TIMESTAMP_LEEWAY_SECONDS;
    use crate::testutil::TestPki;
    use crate::ticketing::{TicketRequest2, TRANSCRYPTOR_COMMON_NAME};
    use crate::transcryptor::{Transcryptor, EMPTY_TABLE_CHECKPOINT};
    use crate::translator::{DataTranslationKeys, PseudonymTranslationKeys};
    use rand::rngs::OsRng;

    struct ServerSecrets {
        rekey: KeyFactorSecret,
        reshuffle: KeyFactorSecret,
        data_rekey: KeyFactorSecret,
        share: CurveScalar,
        data_share: CurveScalar,
    }

    impl ServerSecrets {
        fn generate(rng: &mut OsRng) -> Self {
            use rand::RngCore;
            let mut secrets = [[0u8; 64]; 3];
            for secret in &mut secrets {
                rng.fill_bytes(secret);
            }
            ServerSecrets {
                rekey: KeyFactorSecret::new(secrets[0]),
                reshuffle: KeyFactorSecret::new(secrets[1]),
                data_rekey: KeyFactorSecret::new(secrets[2]),
                share: CurveScalar::random(rng),
                data_share: CurveScalar::random(rng),
            }
        }

        fn pseudonym_translator(&self) -> PseudonymTranslator {
            PseudonymTranslator::new(PseudonymTranslationKeys {
                encryption_key_factor_secret: self.rekey.clone(),
                pseudonymization_key_factor_secret: self.reshuffle.clone(),
                master_private_encryption_key_share: MasterPrivateKeyShare::from_packed(
                    &self.share.pack(),
                )
                .unwrap(),
            })
        }

        fn data_translator(&self) -> DataTranslator {
            DataTranslator::new(DataTranslationKeys {
                encryption_key_factor_secret: self.data_rekey.clone(),
                blinding_key_secret: None,
                master_private_encryption_key_share: MasterPrivateKeyShare::from_packed(
                    &self.data_share.pack(),
                )
                .unwrap(),
            })
        }
    }

    struct Deployment {
        access_manager: AccessManager,
        transcryptor: Arc<Transcryptor>,
        client: CoreClient,
        master_public_key: ElgamalPublicKey,
        am_secrets: ServerSecrets,
        user_group: &'static str,
    }

    fn deployment() -> Deployment {
        let mut rng = OsRng;
        let pki = TestPki::new();
        let user_group = "Research Assessor";

        let am_secrets = ServerSecrets::generate(&mut rng);
        let ts_secrets = ServerSecrets::generate(&mut rng);
        let master_secret = am_secrets.share * ts_secrets.share;
        let master_public_key = crate::curve::CurvePoint::base_mult(&master_secret);

        // The Transcryptor's own decryption key, as enrollment would
        // assemble it from both servers' components.
        let ts_recipient = RekeyRecipient::from_name(TRANSCRYPTOR_COMMON_NAME);
        let ts_own_key = assemble_private_key(&[
            am_secrets
                .pseudonym_translator()
                .generate_key_component(&ts_recipient),
            ts_secrets
                .pseudonym_translator()
                .generate_key_component(&ts_recipient),
        ]);

        let transcryptor = Arc::new(Transcryptor::new(
            pki.issue(TRANSCRYPTOR_COMMON_NAME, None),
            pki.roots().clone(),
            ts_secrets.pseudonym_translator(),
            ts_secrets.data_translator(),
            ts_own_key,
            DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
        ));

        let mut policy = InMemoryAccessPolicy::default();
        policy.allow(user_group, &["read"], &["WeightKg"]);
        policy.add_participant_group(
            "TestGroup",
            vec![
                PolymorphicPseudonym::from_identifier(&master_public_key, "PEP0001", &mut rng),
                PolymorphicPseudonym::from_identifier(&master_public_key, "PEP0002", &mut rng),
            ],
        );

        let access_manager = AccessManager::new(
            pki.issue(crate::ticketing::ACCESS_MANAGER_COMMON_NAME, None),
            pki.roots().clone(),
            am_secrets.pseudonym_translator(),
            am_secrets.data_translator(),
            master_public_key,
            Arc::new(policy),
            transcryptor.clone(),
            DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
        );

        let client = CoreClient::new(
            Arc::new(pki.issue("assessor@example.org", Some(user_group))),
            pki.roots().clone(),
            DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
        );

        Deployment {
            access_manager,
            transcryptor,
            client,
            master_public_key,
            am_secrets,
            user_group,
        }
    }

    fn base_request() -> TicketRequest2 {
        TicketRequest2 {
            modes: vec!["read".into()],
            participant_groups: vec!["TestGroup".into()],
            polymorphic_pseudonyms: vec![],
            column_groups: vec![],
            columns: vec!["WeightKg".into()],
            include_user_group_pseudonyms: false,
            request_indexed_ticket: true,
        }
    }

    #[test]
    fn issues_and_verifies_a_ticket_for_a_participant_group() {
        let d = deployment();
        let request = base_request();
        let now = Timestamp::now();
        let signed_request = d.client.make_ticket_request(&request);
        let issued = d
            .access_manager
            .handle_ticket_request(&signed_request, now)
            .unwrap();

        let ticket = d
            .client
            .validate_issued_ticket(&request, &issued, d.user_group, now)
            .unwrap();
        assert_eq!(ticket.pseudonyms.len(), 2);
        assert_eq!(ticket.columns, vec!["WeightKg".to_owned()]);
        assert_eq!(ticket.modes, vec!["read".to_owned()]);
        assert!(ticket.pseudonyms.iter().all(|p| p.access_group.is_none()));

        // One audit row, bound to this ticket's id.
        let issued_rows = d.transcryptor.storage().issued_tickets();
        assert_eq!(issued_rows.len(), 1);
        assert_eq!(issued_rows[0].columns, vec!["WeightKg".to_owned()]);
        assert_eq!(issued_rows[0].user_group, d.user_group);
    }

    #[test]
    fn denied_mode_never_reaches_the_transcryptor() {
        let d = deployment();
        let mut request = base_request();
        request.modes = vec!["write".into()];
        let signed_request = d.client.make_ticket_request(&request);
        let result = d
            .access_manager
            .handle_ticket_request(&signed_request, Timestamp::now());
        assert!(matches!(result, Err(PepError::AccessDenied(_))));

        // No transcryptor traffic, no audit rows.
        assert!(d.transcryptor.storage().issued_tickets().is_empty());
        let (_, checkpoint) = d
            .transcryptor
            .storage()
            .compute_checksum("ticket-requests", None)
            .unwrap();
        assert_eq!(checkpoint, EMPTY_TABLE_CHECKPOINT);
    }

    #[test]
    fn user_group_pseudonyms_are_included_on_request() {
        let d = deployment();
        let mut request = base_request();
        request.include_user_group_pseudonyms = true;
        let now = Timestamp::now();
        let signed_request = d.client.make_ticket_request(&request);
        let issued = d
            .access_manager
            .handle_ticket_request(&signed_request, now)
            .unwrap();
        let ticket = d
            .client
            .validate_issued_ticket(&request, &issued, d.user_group, now)
            .unwrap();
        assert_eq!(ticket.pseudonyms.len(), 2);
        assert!(ticket.pseudonyms.iter().all(|p| p.access_group.is_some()));
    }

    #[test]
    fn replaying_a_ticket_past_the_leeway_fails() {
        let d = deployment();
        let request = base_request();
        let now = Timestamp::now();
        let signed_request = d.client.make_ticket_request(&request);
        let issued = d
            .access_manager
            .handle_ticket_request(&signed_request, now)
            .unwrap();

        let replay = now.offset_seconds(61 * 60);
        let result = d
            .client
            .validate_issued_ticket(&request, &issued, d.user_group, replay);
        assert!(matches!(
            result,
            Err(PepError::SignatureValidityPeriod(_) | PepError::TicketValidityPeriod(_))
        ));
    }

    #[test]
    fn tampered_step1_proof_aborts_at_the_transcryptor() {
        let d = deployment();
        let mut rng = OsRng;
        let now = Timestamp::now();
        let request = base_request();
        let signed_request = d.client.make_ticket_request(&request);

        // Rebuild the Access Manager's step 1 by hand so one proof can be
        // swapped before forwarding.
        let translator = d.am_secrets.pseudonym_translator();
        let recipients = ViewRecipients::for_user_group(d.user_group);
        let pp = PolymorphicPseudonym::from_identifier(&d.master_public_key, "PEP0001", &mut rng);
        let (access_manager, am_proof) = translator
            .certified_translate_step(&pp, &recipients.access_manager, &mut rng)
            .unwrap();
        let (storage_facility, sf_proof) = translator
            .certified_translate_step(&pp, &recipients.storage_facility, &mut rng)
            .unwrap();
        let (transcryptor_view, ts_proof) = translator
            .certified_translate_step(&pp, &recipients.transcryptor, &mut rng)
            .unwrap();
        let verifiers = TranslationVerifiers {
            access_manager: translator
                .compute_translation_proof_verifiers(
                    &recipients.access_manager,
                    &d.master_public_key,
                )
                .unwrap(),
            storage_facility: translator
                .compute_translation_proof_verifiers(
                    &recipients.storage_facility,
                    &d.master_public_key,
                )
                .unwrap(),
            transcryptor: translator
                .compute_translation_proof_verifiers(
                    &recipients.transcryptor,
                    &d.master_public_key,
                )
                .unwrap(),
            user_group: None,
        };

        let tampered = TranscryptorRequest {
            request: signed_request,
            entries: vec![TranscryptorRequestEntry {
                polymorphic: pp,
                access_manager,
                storage_facility,
                transcryptor: transcryptor_view,
                user_group: None,
                // Swapped proofs: each view now carries the other's.
                access_manager_proof: sf_proof,
                storage_facility_proof: am_proof,
                transcryptor_proof: ts_proof,
                user_group_proof: None,
            }],
            verifiers,
        };

        let result = d.transcryptor.handle_request(&tampered, now);
        assert!(matches!(result, Err(PepError::InvalidProof(_))));

        // Nothing was persisted.
        assert!(d.transcryptor.storage().issued_tickets().is_empty());
        let (_, checkpoint) = d
            .transcryptor
            .storage()
            .compute_checksum("ticket-requests", None)
            .unwrap();
        assert_eq!(checkpoint, EMPTY_TABLE_CHECKPOINT);
    }

    #[test]
    fn concurrent_identical_requests_get_distinct_ids_and_equal_hashes() {
        let d = deployment();
        let request = base_request();
        let now = Timestamp::now();

        let first = d
            .access_manager
            .handle_ticket_request(&d.client.make_ticket_request(&request), now)
            .unwrap();
        let second = d
            .access_manager
            .handle_ticket_request(&d.client.make_ticket_request(&request), now)
            .unwrap();
        d.client
            .validate_issued_ticket(&request, &first, d.user_group, now)
            .unwrap();
        d.client
            .validate_issued_ticket(&request, &second, d.user_group, now)
            .unwrap();

        let rows = d.transcryptor.storage().issued_tickets();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].id, rows[1].id);
        // Same subjects, same order: the pseudonym hashes coincide.
        assert_eq!(rows[0].pseudonym_hash, rows[1].pseudonym_hash);
    }

    #[test]
    fn explicit_pseudonyms_lead_the_expanded_group() {
        let d = deployment();
        let mut rng = OsRng;
        let mut request = base_request();
        let explicit =
            PolymorphicPseudonym::from_identifier(&d.master_public_key, "PEP0009", &mut rng);
        request.polymorphic_pseudonyms = vec![explicit];
        let now = Timestamp::now();
        let issued = d
            .access_manager
            .handle_ticket_request(&d.client.make_ticket_request(&request), now)
            .unwrap();
        let ticket = d
            .client
            .validate_issued_ticket(&request, &issued, d.user_group, now)
            .unwrap();
        assert_eq!(ticket.pseudonyms.len(), 3);
        assert_eq!(ticket.pseudonyms[0].polymorphic, explicit);

        // The appended expansion is sorted by encoding.
        let tail: Vec<[u8; 96]> = ticket.pseudonyms[1..]
            .iter()
            .map(|p| p.polymorphic.pack())
            .collect();
        let mut sorted = tail.clone();
        sorted.sort();
        assert_eq!(tail, sorted);
    }
}
