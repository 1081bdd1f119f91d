//! SCRAM-SHA-256 client state machine (RFC 5802, RFC 7677)
//!
//! The conversation is driven payload by payload: [`ScramClient::step`]
//! consumes the latest server payload and produces the next client payload.
//! After the server's final message the client reports [`done`] and, if the
//! server proved knowledge of the credentials, [`valid`].
//!
//! [`done`]: ScramClient::done
//! [`valid`]: ScramClient::valid

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors specific to the SCRAM conversation
#[derive(Error, Debug)]
pub enum ScramError {
    #[error("malformed server message: {0}")]
    Malformed(String),

    #[error("server rejected authentication: {0}")]
    Rejected(String),

    #[error("server nonce does not extend the client nonce")]
    NonceMismatch,

    #[error("invalid server signature")]
    InvalidServerSignature,

    #[error("conversation is already complete")]
    AlreadyDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ClientFirst,
    ServerFirst,
    ServerFinal,
    Done,
}

/// A single-use SCRAM-SHA-256 client conversation
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    state: State,
    client_first_bare: String,
    server_signature: String,
    valid: bool,
}

impl ScramClient {
    /// Starts a conversation with a random client nonce
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut nonce = [0u8; 18];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_nonce(username, password, BASE64.encode(nonce))
    }

    /// Starts a conversation with a fixed client nonce, for deterministic
    /// conversations in tests
    pub fn with_nonce(
        username: impl Into<String>,
        password: impl Into<String>,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client_nonce: nonce.into(),
            state: State::ClientFirst,
            client_first_bare: String::new(),
            server_signature: String::new(),
            valid: false,
        }
    }

    /// Whether the conversation has consumed the server's final message
    pub fn done(&self) -> bool {
        self.state == State::Done
    }

    /// Whether the server proved knowledge of the credentials
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Advances the conversation: an empty input produces the client-first
    /// message, subsequent inputs are server payloads
    pub fn step(&mut self, input: &str) -> Result<String, ScramError> {
        match self.state {
            State::ClientFirst => {
                self.client_first_bare =
                    format!("n={},r={}", escape_username(&self.username), self.client_nonce);
                self.state = State::ServerFirst;
                Ok(format!("n,,{}", self.client_first_bare))
            }
            State::ServerFirst => self.client_final(input),
            State::ServerFinal => self.verify_server_final(input),
            State::Done => Err(ScramError::AlreadyDone),
        }
    }

    /// Handles the server-first message and produces the client-final one
    fn client_final(&mut self, server_first: &str) -> Result<String, ScramError> {
        let fields = parse_fields(server_first)?;

        if let Some(msg) = lookup(&fields, 'e') {
            return Err(ScramError::Rejected(msg.to_owned()));
        }
        if lookup(&fields, 'm').is_some() {
            return Err(ScramError::Malformed(
                "mandatory extensions are not supported".to_owned(),
            ));
        }

        let nonce = lookup(&fields, 'r')
            .ok_or_else(|| ScramError::Malformed("missing nonce".to_owned()))?
            .to_owned();
        if !nonce.starts_with(&self.client_nonce) || nonce == self.client_nonce {
            return Err(ScramError::NonceMismatch);
        }

        let salt = lookup(&fields, 's')
            .ok_or_else(|| ScramError::Malformed("missing salt".to_owned()))?;
        let salt = BASE64
            .decode(salt)
            .map_err(|_| ScramError::Malformed("salt is not valid base64".to_owned()))?;

        let iterations: u32 = lookup(&fields, 'i')
            .ok_or_else(|| ScramError::Malformed("missing iteration count".to_owned()))?
            .parse()
            .map_err(|_| ScramError::Malformed("invalid iteration count".to_owned()))?;
        if iterations == 0 {
            return Err(ScramError::Malformed("zero iteration count".to_owned()));
        }

        let salted_password = hi(self.password.as_bytes(), &salt, iterations);
        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = sha256(&client_key);

        // "biws" is base64("n,,"): no channel binding
        let without_proof = format!("c=biws,r={nonce}");
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, without_proof
        );

        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature)
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = hmac(&salted_password, b"Server Key");
        self.server_signature = BASE64.encode(hmac(&server_key, auth_message.as_bytes()));

        self.state = State::ServerFinal;
        Ok(format!("{without_proof},p={}", BASE64.encode(proof)))
    }

    /// Verifies the server-final message's signature
    fn verify_server_final(&mut self, server_final: &str) -> Result<String, ScramError> {
        self.state = State::Done;

        let fields = parse_fields(server_final)?;

        if let Some(msg) = lookup(&fields, 'e') {
            return Err(ScramError::Rejected(msg.to_owned()));
        }

        let verifier = lookup(&fields, 'v')
            .ok_or_else(|| ScramError::Malformed("missing server signature".to_owned()))?;
        if verifier != self.server_signature {
            return Err(ScramError::InvalidServerSignature);
        }

        self.valid = true;
        Ok(String::new())
    }
}

/// RFC 5802 username escaping: "=" and "," cannot appear verbatim
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Splits "k=v,k=v,..." into attribute/value pairs
fn parse_fields(message: &str) -> Result<Vec<(char, &str)>, ScramError> {
    message
        .split(',')
        .map(|field| {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| ScramError::Malformed(format!("field {field:?}")))?;
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(k), None) => Ok((k, value)),
                _ => Err(ScramError::Malformed(format!("attribute {key:?}"))),
            }
        })
        .collect()
}

fn lookup<'a>(fields: &[(char, &'a str)], key: char) -> Option<&'a str> {
    fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// PBKDF2 with HMAC-SHA-256 and a single block, as SCRAM's Hi()
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(password).expect("HMAC accepts any key length");
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u: [u8; 32] = mac.finalize().into_bytes().into();

    let mut result = u;
    for _ in 1..iterations {
        let mut mac =
            HmacSha256::new_from_slice(password).expect("HMAC accepts any key length");
        mac.update(&u);
        u = mac.finalize().into_bytes().into();
        for (r, b) in result.iter_mut().zip(u) {
            *r ^= b;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3 example conversation
    const USER: &str = "user";
    const PASSWORD: &str = "pencil";
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    #[test]
    fn test_rfc7677_conversation() {
        let mut client = ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE);

        let client_first = client.step("").unwrap();
        assert_eq!(client_first, "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");
        assert!(!client.done());

        let client_final = client.step(SERVER_FIRST).unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );
        assert!(!client.done());

        let last = client.step(SERVER_FINAL).unwrap();
        assert_eq!(last, "");
        assert!(client.done());
        assert!(client.valid());
    }

    #[test]
    fn test_invalid_server_signature() {
        let mut client = ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        client.step("").unwrap();
        client.step(SERVER_FIRST).unwrap();

        let err = client
            .step("v=AAAATRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
            .unwrap_err();
        assert!(matches!(err, ScramError::InvalidServerSignature));
        assert!(client.done());
        assert!(!client.valid());
    }

    #[test]
    fn test_server_error_field() {
        let mut client = ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        client.step("").unwrap();

        let err = client.step("e=unknown-user").unwrap_err();
        assert!(matches!(err, ScramError::Rejected(_)));
    }

    #[test]
    fn test_nonce_must_extend_client_nonce() {
        let mut client = ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        client.step("").unwrap();

        // server echoes a foreign nonce
        let err = client
            .step("r=somethingelse,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert!(matches!(err, ScramError::NonceMismatch));

        // or fails to extend ours at all
        let mut client = ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        client.step("").unwrap();
        let err = client
            .step(&format!("r={CLIENT_NONCE},s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096"))
            .unwrap_err();
        assert!(matches!(err, ScramError::NonceMismatch));
    }

    #[test]
    fn test_username_escaping() {
        let mut client = ScramClient::with_nonce("us=er,name", PASSWORD, CLIENT_NONCE);
        let client_first = client.step("").unwrap();
        assert_eq!(client_first, "n,,n=us=3Der=2Cname,r=rOprNGfwEbeRWgbNEkqO");
    }

    #[test]
    fn test_step_after_done_fails() {
        let mut client = ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE);
        client.step("").unwrap();
        client.step(SERVER_FIRST).unwrap();
        client.step(SERVER_FINAL).unwrap();

        assert!(matches!(client.step("").unwrap_err(), ScramError::AlreadyDone));
    }

    #[test]
    fn test_random_nonces_differ() {
        let a = ScramClient::new(USER, PASSWORD);
        let b = ScramClient::new(USER, PASSWORD);
        assert_ne!(a.client_nonce, b.client_nonce);
        assert!(!a.client_nonce.contains(','));
    }
}
