//! Permit identifiers and QR verification tokens.
//!
//! A QR token has the shape `PERMIT.<nonce>.<mac>`, both parts hex. The MAC
//! is HMAC-SHA256 under the server secret over the student ID, course ID,
//! issue instant and nonce, so a token for one student cannot be derived from
//! another's and cannot be minted without the secret.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{thread_rng, Rng};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use crate::err::Error;
use crate::models::ExamPermit;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "PERMIT";
const NONCE_LEN: usize = 16;

pub const MIN_SECRET_LEN: usize = 32;

pub struct TokenScheme {
    mac: HmacSha256,
    sequence: AtomicU64,
}

impl TokenScheme {
    pub fn new(secret: &[u8]) -> Result<Self, Error> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::InvalidPayload {
                message: format!(
                    "Token secret must be at least {} bytes, got {}",
                    MIN_SECRET_LEN,
                    secret.len()
                ),
            });
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|err| Error::InternalError {
            kind: "KeyError",
            message: err.to_string(),
        })?;
        Ok(Self {
            mac,
            sequence: AtomicU64::new(0),
        })
    }

    /// Scheme keyed with a fresh secret from the OS RNG. Tokens it issues
    /// stop authenticating once the process exits.
    pub fn random() -> Result<Self, Error> {
        let mut secret = [0u8; MIN_SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        Self::new(&secret)
    }

    /// Unique for every call: the sequence number is process-wide, so two
    /// identical requests in the same millisecond still get distinct IDs.
    pub fn make_permit_id(
        &self,
        timetable_id: &str,
        student_id: &str,
        course_id: &str,
        issued_at: DateTime<Utc>,
    ) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "p{}-{}-{}-{}-{}",
            issued_at.timestamp_millis(),
            seq,
            timetable_id,
            student_id,
            course_id
        )
    }

    pub fn make_qr_token(
        &self,
        student_id: &str,
        course_id: &str,
        issued_at: DateTime<Utc>,
    ) -> String {
        let nonce: [u8; NONCE_LEN] = thread_rng().gen();
        let tag = self
            .keyed(student_id, course_id, issued_at, &nonce)
            .finalize()
            .into_bytes();
        format!(
            "{}.{}.{}",
            TOKEN_PREFIX,
            hex::encode(nonce),
            hex::encode(tag)
        )
    }

    /// Whether `token` was minted by this scheme for the permit's student,
    /// course and issue instant.
    pub fn authenticates(&self, token: &str, permit: &ExamPermit) -> bool {
        let (nonce, tag) = match split_token(token) {
            Some(parts) => parts,
            None => return false,
        };
        self.keyed(
            &permit.student_id,
            &permit.course_id,
            permit.issued_at,
            &nonce,
        )
        .verify_slice(&tag)
        .is_ok()
    }

    fn keyed(
        &self,
        student_id: &str,
        course_id: &str,
        issued_at: DateTime<Utc>,
        nonce: &[u8],
    ) -> HmacSha256 {
        let mut mac = self.mac.clone();
        update_field(&mut mac, student_id.as_bytes());
        update_field(&mut mac, course_id.as_bytes());
        mac.update(&issued_at.timestamp().to_be_bytes());
        mac.update(&issued_at.timestamp_subsec_nanos().to_be_bytes());
        update_field(&mut mac, nonce);
        mac
    }
}

/// Length-prefixed, so no choice of IDs can shift bytes between fields.
fn update_field(mac: &mut HmacSha256, bytes: &[u8]) {
    mac.update(&(bytes.len() as u64).to_be_bytes());
    mac.update(bytes);
}

fn split_token(token: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut parts = token.split('.');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let nonce = hex::decode(parts.next()?).ok()?;
    let tag = hex::decode(parts.next()?).ok()?;
    if parts.next().is_some() || nonce.len() != NONCE_LEN {
        return None;
    }
    Some((nonce, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permit_for(scheme: &TokenScheme, student: &str, course: &str) -> ExamPermit {
        let issued_at = Utc::now();
        ExamPermit {
            id: scheme.make_permit_id("t1", student, course, issued_at),
            timetable_id: "t1".to_string(),
            student_id: student.to_string(),
            student_name: format!("Student {}", student),
            course_id: course.to_string(),
            course_name: "Course".to_string(),
            exam_date: None,
            exam_time: String::new(),
            exam_location: String::new(),
            qr_code_data: scheme.make_qr_token(student, course, issued_at),
            is_valid: true,
            issued_at,
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(matches!(
            TokenScheme::new(b"too short"),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn permit_ids_differ_for_identical_inputs() {
        let scheme = TokenScheme::random().unwrap();
        let now = Utc::now();
        let a = scheme.make_permit_id("t1", "s1", "c101", now);
        let b = scheme.make_permit_id("t1", "s1", "c101", now);
        assert_ne!(a, b);
        assert!(a.starts_with('p'));
        assert!(a.ends_with("-t1-s1-c101"));
    }

    #[test]
    fn tokens_differ_for_identical_inputs() {
        let scheme = TokenScheme::random().unwrap();
        let now = Utc::now();
        let a = scheme.make_qr_token("s1", "c101", now);
        let b = scheme.make_qr_token("s1", "c101", now);
        assert_ne!(a, b);
        assert!(a.starts_with("PERMIT."));
    }

    #[test]
    fn issued_token_authenticates_its_permit() {
        let scheme = TokenScheme::random().unwrap();
        let permit = permit_for(&scheme, "s1", "c101");
        assert!(scheme.authenticates(&permit.qr_code_data, &permit));
    }

    #[test]
    fn token_does_not_transfer_to_another_student() {
        let scheme = TokenScheme::random().unwrap();
        let permit = permit_for(&scheme, "s1", "c101");
        let mut other = permit.clone();
        other.student_id = "s2".to_string();
        assert!(!scheme.authenticates(&permit.qr_code_data, &other));
    }

    #[test]
    fn field_boundaries_are_bound_into_the_mac() {
        let scheme = TokenScheme::random().unwrap();
        let permit = permit_for(&scheme, "s1\u{1f}c1", "c2");
        let mut shifted = permit.clone();
        shifted.student_id = "s1".to_string();
        shifted.course_id = "c1\u{1f}c2".to_string();
        assert!(scheme.authenticates(&permit.qr_code_data, &permit));
        assert!(!scheme.authenticates(&permit.qr_code_data, &shifted));
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let issuer = TokenScheme::new(&[7u8; 32]).unwrap();
        let verifier = TokenScheme::new(&[9u8; 32]).unwrap();
        let permit = permit_for(&issuer, "s1", "c101");
        assert!(!verifier.authenticates(&permit.qr_code_data, &permit));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let scheme = TokenScheme::random().unwrap();
        let permit = permit_for(&scheme, "s1", "c101");
        for token in [
            "",
            "PERMIT",
            "PERMIT.zz.zz",
            "PERMIT-t1-s1-c101-1700000000000",
            "OTHER.00000000000000000000000000000000.00",
        ] {
            assert!(!scheme.authenticates(token, &permit), "{}", token);
        }
    }
}
