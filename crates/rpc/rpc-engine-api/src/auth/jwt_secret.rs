use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Errors returned by [`JwtSecret`].
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The secret is not valid hex.
    #[error(transparent)]
    HexDecode(#[from] hex::FromHexError),
    /// The hex-encoded secret has the wrong length.
    #[error("JWT secret must be {expected} hex digits, got {actual}")]
    InvalidLength {
        /// Number of hex digits a 256-bit secret encodes to.
        expected: usize,
        /// Number of digits provided.
        actual: usize,
    },
    /// The token is signed with an algorithm other than HS256.
    #[error("unsupported signature algorithm, only HS256 is supported")]
    UnsupportedSignatureAlgorithm,
    /// The token signature does not verify against the shared secret.
    #[error("provided signature is invalid")]
    InvalidSignature,
    /// The `iat` claim is too far from the current time.
    #[error("iat claim is not within +-60 seconds of the current time")]
    InvalidIssuanceTimestamp,
    /// The optional `exp` claim lies in the past.
    #[error("token is expired")]
    TokenExpired,
    /// The token could not be decoded.
    #[error("JWT decoding error: {0}")]
    JwtDecoding(String),
    /// The secret file could not be read.
    #[error("could not read JWT secret from {path}: {source}")]
    Read {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
        /// The file the secret was read from.
        path: PathBuf,
    },
    /// The secret file could not be written.
    #[error("could not write JWT secret to {path}: {source}")]
    Write {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
        /// The file the secret was written to.
        path: PathBuf,
    },
}

/// Hex digits in a 256-bit secret key.
const JWT_SECRET_LEN: usize = 64;

/// The `iat` (issued-at) claim may not differ from the current time by more than this.
const JWT_MAX_IAT_DIFF: Duration = Duration::from_secs(60);

/// Consensus clients must sign with HMAC + SHA256.
const JWT_SIGNATURE_ALGO: Algorithm = Algorithm::HS256;

/// The 256-bit key shared between the execution and consensus layers, used to authenticate
/// engine requests.
///
/// See [Engine API authentication](https://github.com/ethereum/execution-apis/blob/main/src/engine/authentication.md).
#[derive(Clone)]
pub struct JwtSecret([u8; 32]);

impl JwtSecret {
    /// Parses a secret from its hex encoding. An optional `0x` prefix and surrounding
    /// whitespace are tolerated.
    pub fn from_hex<S: AsRef<str>>(hex: S) -> Result<Self, JwtError> {
        let hex = hex.as_ref().trim().trim_start_matches("0x");
        if hex.len() != JWT_SECRET_LEN {
            return Err(JwtError::InvalidLength { expected: JWT_SECRET_LEN, actual: hex.len() })
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Reads a hex-encoded secret from the given file.
    pub fn from_file(path: &Path) -> Result<Self, JwtError> {
        let hex = fs::read_to_string(path)
            .map_err(|source| JwtError::Read { source, path: path.to_path_buf() })?;
        Self::from_hex(hex)
    }

    /// Generates a fresh random secret and persists its hex encoding at the given path, for
    /// nodes started without a configured secret file.
    pub fn try_create(path: &Path) -> Result<Self, JwtError> {
        let secret = Self::random();
        fs::write(path, hex::encode(secret.0))
            .map_err(|source| JwtError::Write { source, path: path.to_path_buf() })?;
        Ok(secret)
    }

    /// Generates a random secret.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    /// Validates a bearer token:
    /// - the signature verifies against the shared secret, with HS256,
    /// - the `iat` claim is within ±60 seconds of the current time,
    /// - the `exp` claim, when present, has not passed.
    pub fn validate(&self, jwt: &str) -> Result<(), JwtError> {
        let mut validation = Validation::new(JWT_SIGNATURE_ALGO);
        // `exp` is optional here; checked by hand below when present
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["iat"]);

        let token = decode::<Claims>(jwt, &DecodingKey::from_secret(&self.0), &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => JwtError::UnsupportedSignatureAlgorithm,
                _ => JwtError::JwtDecoding(format!("{err:?}")),
            })?;

        let now = unix_now();
        if !token.claims.is_within_time_window(now) {
            return Err(JwtError::InvalidIssuanceTimestamp)
        }
        if token.claims.exp.is_some_and(|exp| exp <= now) {
            return Err(JwtError::TokenExpired)
        }
        Ok(())
    }

    /// Signs the given claims with this secret, producing a bearer token.
    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        let key = EncodingKey::from_secret(&self.0);
        encode(&Header::new(JWT_SIGNATURE_ALGO), claims, &key)
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the key material
        f.debug_tuple("JwtSecret").field(&"{redacted}").finish()
    }
}

/// The claims the Engine API requires on bearer tokens: `iat` is mandatory, `exp` optional.
/// Other claims are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Unix timestamp the token was issued at.
    pub iat: u64,
    /// Optional unix timestamp the token expires at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl Claims {
    /// Claims issued at the current time, without an expiry.
    pub fn issued_now() -> Self {
        Self { iat: unix_now(), exp: None }
    }

    fn is_within_time_window(&self, now: u64) -> bool {
        now.abs_diff(self.iat) <= JWT_MAX_IAT_DIFF.as_secs()
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    #[test]
    fn parses_hex_with_and_without_prefix() {
        let key = "f79ae8046bc11c9927afe911db7143c51a806c4a537cc08e0d37140b0192f430";
        assert!(JwtSecret::from_hex(key).is_ok());
        assert!(JwtSecret::from_hex(format!("0x{key}")).is_ok());
        assert!(JwtSecret::from_hex(format!("  {key}\n")).is_ok());
    }

    #[test]
    fn key_material_round_trips() {
        let original = "f79ae8046bc11c9927afe911db7143c51a806c4a537cc08e0d37140b0192f430";
        let secret = JwtSecret::from_hex(original).unwrap();
        assert_eq!(hex::encode(secret.0), original);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            JwtSecret::from_hex("f79ae8046"),
            Err(JwtError::InvalidLength { expected: 64, actual: 9 })
        ));
    }

    #[test]
    fn rejects_non_hex() {
        let not_hex = "This__________Is__________Not_______An____Hex_____________String";
        assert!(matches!(JwtSecret::from_hex(not_hex), Err(JwtError::HexDecode(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt.hex");

        let created = JwtSecret::try_create(&path).unwrap();
        let loaded = JwtSecret::from_file(&path).unwrap();
        assert_eq!(created.0, loaded.0);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.hex");
        assert!(matches!(JwtSecret::from_file(&path), Err(JwtError::Read { .. })));
    }

    #[test]
    fn valid_token_passes() {
        let secret = JwtSecret::random();
        let jwt = secret.encode(&Claims::issued_now()).unwrap();
        assert!(secret.validate(&jwt).is_ok());
    }

    #[test]
    fn exp_claim_is_honored_when_present() {
        let secret = JwtSecret::random();

        let live = Claims { iat: unix_now(), exp: Some(unix_now() + 3600) };
        assert!(secret.validate(&secret.encode(&live).unwrap()).is_ok());

        let expired = Claims { iat: unix_now(), exp: Some(unix_now() - 1) };
        let result = secret.validate(&secret.encode(&expired).unwrap());
        assert!(matches!(result, Err(JwtError::TokenExpired)));
    }

    #[test]
    fn iat_outside_the_window_is_rejected() {
        let secret = JwtSecret::random();
        let offset = JWT_MAX_IAT_DIFF.as_secs() + 1;

        let stale = Claims { iat: unix_now() - offset, exp: None };
        let result = secret.validate(&secret.encode(&stale).unwrap());
        assert!(matches!(result, Err(JwtError::InvalidIssuanceTimestamp)));

        let future = Claims { iat: unix_now() + offset, exp: None };
        let result = secret.validate(&secret.encode(&future).unwrap());
        assert!(matches!(result, Err(JwtError::InvalidIssuanceTimestamp)));
    }

    #[test]
    fn wrong_secret_is_an_invalid_signature() {
        let signer = JwtSecret::random();
        let jwt = signer.encode(&Claims::issued_now()).unwrap();

        let verifier = JwtSecret::random();
        assert!(matches!(verifier.validate(&jwt), Err(JwtError::InvalidSignature)));
    }

    #[test]
    fn non_hs256_algorithms_are_rejected() {
        let secret = JwtSecret::random();
        let key = EncodingKey::from_secret(&secret.0);
        let jwt = encode(&Header::new(Algorithm::HS384), &Claims::issued_now(), &key).unwrap();

        let result = secret.validate(&jwt);
        assert!(matches!(result, Err(JwtError::UnsupportedSignatureAlgorithm)));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let secret = JwtSecret::random();
        assert!(!format!("{secret:?}").contains(&hex::encode(secret.0)));
    }
}
