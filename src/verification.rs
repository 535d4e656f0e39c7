use std::sync::Arc;

use serde::Serialize;

use crate::err::Error;
use crate::models::ExamPermit;
use crate::store::PermitStore;
use crate::token::TokenScheme;

/// Outcome of checking a QR token. An unknown token is a normal outcome with
/// `found == false`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit: Option<ExamPermit>,
}

impl Verification {
    fn not_found() -> Self {
        Self {
            found: false,
            valid: None,
            permit: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.unwrap_or(false)
    }
}

pub struct VerificationService {
    store: Arc<PermitStore>,
    tokens: Arc<TokenScheme>,
}

impl VerificationService {
    pub fn new(store: Arc<PermitStore>, tokens: Arc<TokenScheme>) -> Self {
        Self { store, tokens }
    }

    /// Read-only. A permit counts as valid only while it has not been revoked
    /// and its token still authenticates under the current secret.
    pub async fn verify(&self, token: &str) -> Result<Verification, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::EmptyToken {
                message: "`qrData` parameter was empty".to_string(),
            });
        }

        let permit = match self.store.find_by_token(token).await {
            Some(permit) => permit,
            None => {
                log::debug!("Verification miss");
                return Ok(Verification::not_found());
            }
        };

        let authentic = self.tokens.authenticates(token, &permit);
        if !authentic {
            log::warn!(
                "Permit {} is stored with a token that does not authenticate",
                permit.id
            );
        }
        log::debug!("Verified permit {}", permit.id);
        Ok(Verification {
            found: true,
            valid: Some(permit.is_valid && authentic),
            permit: Some(permit),
        })
    }
}
