//! Connection authentication
//!
//! Mechanism negotiation over `hello`, the SCRAM-SHA-256 conversation, and
//! the PLAIN fallback. Servers differ in whether they honour
//! `skipEmptyExchange`: the conversation takes one `saslStart` plus either
//! one or two `saslContinue` round trips, never more.

use tracing::debug;

use mongo_wire::{doc, Binary, MsgBody, OpMsg, Value};

use crate::conn::{command_ok, expect_op_msg, Conn};
use crate::error::{ClientError, Result};
use crate::scram::ScramClient;

const MECHANISM_SCRAM_SHA_256: &str = "SCRAM-SHA-256";
const MECHANISM_PLAIN: &str = "PLAIN";

impl Conn {
    /// Authenticates the connection.
    ///
    /// With no `auth_mechanism` the server's supported mechanisms are
    /// negotiated via `hello`; SCRAM-SHA-256 is preferred, PLAIN is the
    /// fallback. Ends with a `listDatabases` probe confirming the session
    /// is usable.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        auth_source: &str,
        auth_mechanism: Option<&str>,
    ) -> Result<()> {
        let mechanisms = match auth_mechanism {
            Some(mechanism) => vec![mechanism.to_owned()],
            None => self.hello(username, auth_source).await?,
        };

        if mechanisms.iter().any(|m| m == MECHANISM_SCRAM_SHA_256) {
            self.login_scram_sha_256(username, password, auth_source)
                .await
        } else if mechanisms.iter().any(|m| m == MECHANISM_PLAIN) {
            self.login_plain(username, password, auth_source).await
        } else {
            Err(ClientError::Auth(format!(
                "unsupported authentication mechanisms: {mechanisms:?}"
            )))
        }
    }

    /// Asks the server which SASL mechanisms it supports for the user
    async fn hello(&mut self, username: &str, auth_db: &str) -> Result<Vec<String>> {
        let cmd = doc! {
            "hello" => 1_i32,
            "saslSupportedMechs" => format!("{auth_db}.{username}"),
            "$db" => auth_db,
        };

        let (_, body) = self.request(&MsgBody::Msg(OpMsg::new(&cmd)?)).await?;
        let res = expect_op_msg(body)?.document_deep()?;

        let Some(Value::Array(mechanisms)) = res.get("saslSupportedMechs") else {
            return Err(ClientError::Protocol(
                "invalid saslSupportedMechs in hello response".to_owned(),
            ));
        };

        mechanisms
            .iter()
            .map(|mechanism| match mechanism {
                Value::String(s) => Ok(s.clone()),
                other => Err(ClientError::Protocol(format!(
                    "invalid saslSupportedMechs value {other:?}"
                ))),
            })
            .collect()
    }

    /// PLAIN: a single `saslStart` carrying the credentials
    async fn login_plain(
        &mut self,
        username: &str,
        password: &str,
        auth_db: &str,
    ) -> Result<()> {
        let payload = format!("\0{username}\0{password}");

        let cmd = doc! {
            "saslStart" => 1_i32,
            "mechanism" => MECHANISM_PLAIN,
            "payload" => Binary::generic(payload.into_bytes()),
            "$db" => auth_db,
        };

        let (_, body) = self.request(&MsgBody::Msg(OpMsg::new(&cmd)?)).await?;
        let res = expect_op_msg(body)?.document_deep()?;

        if !command_ok(&res) {
            return Err(ClientError::Auth(format!(
                "authentication failed (ok was {:?})",
                res.get("ok")
            )));
        }

        self.check_auth().await
    }

    /// Drives the SCRAM-SHA-256 conversation
    async fn login_scram_sha_256(
        &mut self,
        username: &str,
        password: &str,
        auth_db: &str,
    ) -> Result<()> {
        let mut scram = ScramClient::new(username, password);
        let mut payload = scram.step("")?;

        let mut cmd = doc! {
            "saslStart" => 1_i32,
            "mechanism" => MECHANISM_SCRAM_SHA_256,
            "payload" => Binary::generic(payload.clone().into_bytes()),
            "options" => doc! { "skipEmptyExchange" => true },
            "$db" => auth_db,
        };

        // One saslStart and two saslContinue for servers that ignore
        // skipEmptyExchange; one and one for those that honour it.
        for step in 1..=3 {
            debug!(
                step,
                payload = %payload,
                done = scram.done(),
                valid = scram.valid(),
                "SCRAM client",
            );

            let command = cmd.command().unwrap_or_default().to_owned();
            let (_, body) = self.request(&MsgBody::Msg(OpMsg::new(&cmd)?)).await?;
            let res = expect_op_msg(body)?.document_deep()?;

            if !command_ok(&res) {
                return Err(ClientError::Auth(format!(
                    "{command} failed (ok was {:?})",
                    res.get("ok")
                )));
            }

            let Some(Value::Binary(server_payload)) = res.get("payload") else {
                return Err(ClientError::Protocol(
                    "missing payload in SASL response".to_owned(),
                ));
            };
            payload = String::from_utf8(server_payload.bytes.clone())
                .map_err(|_| ClientError::Protocol("invalid SASL payload".to_owned()))?;

            debug!(step, payload = %payload, "SCRAM server");

            let Some(Value::Bool(done)) = res.get("done") else {
                return Err(ClientError::Protocol(
                    "missing done in SASL response".to_owned(),
                ));
            };

            if !done {
                payload = scram.step(&payload)?;

                cmd = doc! {
                    "saslContinue" => 1_i32,
                    "conversationId" => 1_i32,
                    "payload" => Binary::generic(payload.clone().into_bytes()),
                    "$db" => auth_db,
                };

                continue;
            }

            if step == 2 {
                // the conversation finished at the first saslContinue, so
                // the server supports skipEmptyExchange; the final payload
                // still carries the server signature to verify
                debug!(step, payload = %payload, "conversation done at the first saslContinue");
                scram.step(&payload)?;
            }

            if !scram.done() {
                return Err(ClientError::Auth("conversation is not done".to_owned()));
            }
            if !scram.valid() {
                return Err(ClientError::Auth(
                    "conversation is done, but not valid".to_owned(),
                ));
            }

            return self.check_auth().await;
        }

        Err(ClientError::Auth("too many steps".to_owned()))
    }

    /// Confirms the authenticated session works
    async fn check_auth(&mut self) -> Result<()> {
        let cmd = doc! { "listDatabases" => 1_i32, "$db" => "admin" };

        let (_, body) = self.request(&MsgBody::Msg(OpMsg::new(&cmd)?)).await?;
        let res = expect_op_msg(body)?.document_deep()?;

        if !command_ok(&res) {
            return Err(ClientError::Auth(format!(
                "listDatabases failed (ok was {:?})",
                res.get("ok")
            )));
        }

        Ok(())
    }
}
