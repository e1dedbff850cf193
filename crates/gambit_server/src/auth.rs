//! Bearer tokens for the reference server.
//!
//! Tokens are signed with HMAC-SHA256 and hex-encoded for transport.
//!
//! ## Token Format
//!
//! - 8 bytes: participant id (big-endian)
//! - 1 byte: kind (0 = access, 1 = refresh)
//! - 8 bytes: epoch (big-endian)
//! - 32 bytes: HMAC-SHA256 signature over the first 17 bytes
//!
//! A token is valid while its epoch equals the participant's current epoch
//! for that kind. Bumping the epoch expires every outstanding token at once.

use crate::error::{ServerError, ServerResult};
use gambit_protocol::ParticipantId;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PAYLOAD_LEN: usize = 17;
const TOKEN_LEN: usize = PAYLOAD_LEN + 32;

/// What a token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Authorizes API calls and channel presence.
    Access,
    /// Exchanged for a fresh access token.
    Refresh,
}

impl TokenKind {
    fn code(self) -> u8 {
        match self {
            TokenKind::Access => 0,
            TokenKind::Refresh => 1,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TokenKind::Access),
            1 => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

/// Decoded claims of a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    /// Token holder.
    pub participant: ParticipantId,
    /// Token kind.
    pub kind: TokenKind,
    /// Epoch the token was minted in.
    pub epoch: u64,
}

/// Mints and verifies signed tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    /// Creates a signer with the given secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mints a token.
    pub fn mint(&self, claims: TokenClaims) -> ServerResult<String> {
        let mut data = Vec::with_capacity(TOKEN_LEN);
        data.extend_from_slice(&claims.participant.get().to_be_bytes());
        data.push(claims.kind.code());
        data.extend_from_slice(&claims.epoch.to_be_bytes());

        let signature = self.sign(&data)?;
        data.extend_from_slice(&signature);

        Ok(hex::encode(data))
    }

    /// Verifies a token's signature and decodes its claims.
    ///
    /// Epoch freshness is checked by the caller.
    pub fn verify(&self, token: &str) -> ServerResult<TokenClaims> {
        let invalid = || ServerError::Unauthorized("Invalid token".into());

        let bytes = hex::decode(token).map_err(|_| invalid())?;
        if bytes.len() != TOKEN_LEN {
            return Err(invalid());
        }
        let (payload, signature) = bytes.split_at(PAYLOAD_LEN);
        if self.sign(payload)?.as_slice() != signature {
            return Err(invalid());
        }

        let mut participant = [0u8; 8];
        participant.copy_from_slice(&payload[0..8]);
        let mut epoch = [0u8; 8];
        epoch.copy_from_slice(&payload[9..17]);

        Ok(TokenClaims {
            participant: ParticipantId(i64::from_be_bytes(participant)),
            kind: TokenKind::from_code(payload[8]).ok_or_else(invalid)?,
            epoch: u64::from_be_bytes(epoch),
        })
    }

    fn sign(&self, data: &[u8]) -> ServerResult<[u8; 32]> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }
}
