//! Per-connection russh handler.
//!
//! One [`SessionHandler`] services one TCP connection. It tracks every open
//! session channel, collects `env` requests per channel and turns the first
//! `exec` request on a channel into a dispatch. The dispatch runs on a
//! blocking worker inside a task of its own, so the connection keeps reading
//! requests for sibling channels while a command is running.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::PublicKey;
use tracing::{debug, info, warn};

use super::auth::{AuthPolicy, Identity};
use super::errors::SessionError;
use super::SESSION_TARGET;
use crate::dispatch::{
    ContextValue, DispatchError, DispatchResult, ExecRequest, RequestContext, Router, keys,
};

/// Extended data stream number for stderr.
const STDERR_STREAM: u32 = 1;

#[derive(Debug, Default)]
struct ChannelState {
    env: BTreeMap<String, String>,
    exec_started: bool,
}

/// Services one SSH connection.
pub struct SessionHandler {
    router: Arc<Router>,
    auth: Arc<AuthPolicy>,
    peer: String,
    identity: Option<Identity>,
    authenticated: Arc<AtomicBool>,
    channels: HashMap<ChannelId, ChannelState>,
}

impl SessionHandler {
    /// Creates a handler for the connection from `peer`.
    #[must_use]
    pub fn new(router: Arc<Router>, auth: Arc<AuthPolicy>, peer: impl Into<String>) -> Self {
        Self {
            router,
            auth,
            peer: peer.into(),
            identity: None,
            authenticated: Arc::new(AtomicBool::new(false)),
            channels: HashMap::new(),
        }
    }

    /// Flag raised once the client authenticates. It stays readable after
    /// the handler has been moved into the transport.
    pub(crate) fn authenticated(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.authenticated)
    }

    fn accept(&mut self, identity: Identity) -> Auth {
        info!(
            target: SESSION_TARGET,
            peer = %self.peer,
            user = identity.user(),
            fingerprint = identity.fingerprint(),
            "client authenticated"
        );
        self.identity = Some(identity);
        self.authenticated.store(true, Ordering::Release);
        Auth::Accept
    }

    fn refuse_request(&self, channel: ChannelId, kind: &str, session: &mut Session) {
        debug!(
            target: SESSION_TARGET,
            peer = %self.peer,
            ?channel,
            request = kind,
            "unsupported channel request"
        );
        session.channel_failure(channel);
    }
}

#[async_trait]
impl Handler for SessionHandler {
    type Error = SessionError;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        let Some(identity) = self.auth.check_none(user) else {
            return Ok(self.auth.reject());
        };
        Ok(self.accept(identity))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let Some(identity) = self.auth.check_key(user, public_key) else {
            debug!(
                target: SESSION_TARGET,
                peer = %self.peer,
                user,
                "public key not authorized"
            );
            return Ok(self.auth.reject());
        };
        Ok(self.accept(identity))
    }

    // Requests for the channel arrive through the handler methods below, so
    // the channel object itself is not kept.
    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let id = channel.id();
        debug!(target: SESSION_TARGET, peer = %self.peer, channel = ?id, "session channel opened");
        self.channels.insert(id, ChannelState::default());
        Ok(true)
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.channels.get_mut(&channel) {
            Some(state) if !state.exec_started => {
                state
                    .env
                    .insert(variable_name.to_owned(), variable_value.to_owned());
                session.channel_success(channel);
            }
            _ => session.channel_failure(channel),
        }
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(state) = self.channels.get_mut(&channel) else {
            session.channel_failure(channel);
            return Ok(());
        };
        if state.exec_started {
            debug!(
                target: SESSION_TARGET,
                peer = %self.peer,
                ?channel,
                "rejecting second exec on channel"
            );
            session.channel_failure(channel);
            return Ok(());
        }
        state.exec_started = true;
        session.channel_success(channel);

        let exec = PendingExec {
            router: Arc::clone(&self.router),
            channel,
            payload: data.to_vec(),
            env: std::mem::take(&mut state.env),
            identity: self.identity.clone(),
            peer: self.peer.clone(),
        };
        tokio::spawn(exec.run(session.handle()));
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.refuse_request(channel, "shell", session);
        Ok(())
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.refuse_request(channel, "pty-req", session);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.refuse_request(channel, name, session);
        Ok(())
    }
}

/// Everything an exec needs once it leaves the connection's event loop.
struct PendingExec {
    router: Arc<Router>,
    channel: ChannelId,
    payload: Vec<u8>,
    env: BTreeMap<String, String>,
    identity: Option<Identity>,
    peer: String,
}

impl PendingExec {
    async fn run(self, handle: Handle) {
        let Self {
            router,
            channel,
            payload,
            env,
            identity,
            peer,
        } = self;
        let label = String::from_utf8_lossy(&payload).trim().to_owned();
        let worker = tokio::task::spawn_blocking(move || {
            dispatch_exec(&router, channel, &payload, env, identity.as_ref())
        });
        let result = worker
            .await
            .unwrap_or_else(|_| DispatchResult::failure(DispatchError::aborted(label.clone())));

        match result.error() {
            None => info!(
                target: SESSION_TARGET,
                peer = %peer,
                ?channel,
                command = %label,
                "command succeeded"
            ),
            Some(error) => warn!(
                target: SESSION_TARGET,
                peer = %peer,
                ?channel,
                command = %label,
                exit_status = error.exit_status(),
                error = %error,
                "command failed"
            ),
        }
        if reply(&handle, channel, &result).await.is_none() {
            debug!(
                target: SESSION_TARGET,
                peer = %peer,
                ?channel,
                "client went away before the reply was sent"
            );
        }
    }
}

fn dispatch_exec(
    router: &Router,
    channel: ChannelId,
    payload: &[u8],
    env: BTreeMap<String, String>,
    identity: Option<&Identity>,
) -> DispatchResult {
    let request = match ExecRequest::parse(payload) {
        Ok(request) => request,
        Err(error) => return error.into(),
    };
    let mut context = seed_context(&request, env, identity);
    context.insert(keys::CHANNEL, ContextValue::Channel(channel));
    router.dispatch(request.command(), &mut context)
}

/// Builds the request context for one exec, minus the channel reference.
pub(crate) fn seed_context(
    request: &ExecRequest,
    env: BTreeMap<String, String>,
    identity: Option<&Identity>,
) -> RequestContext {
    let mut context = RequestContext::new();
    context.insert(keys::REQUEST, request.raw());
    context.insert(keys::COMMAND, request.command());
    context.insert(keys::ARGS, request.args());
    context.insert(keys::ENV, env);
    context.insert(keys::USER, identity.map_or("", Identity::user));
    if let Some(fingerprint) = identity.and_then(Identity::fingerprint) {
        context.insert(keys::FINGERPRINT, fingerprint);
    }
    context
}

/// Writes the body, exit status, EOF and close. Returns `None` as soon as
/// the channel is gone.
async fn reply(handle: &Handle, channel: ChannelId, result: &DispatchResult) -> Option<()> {
    match result.error() {
        None if result.output().is_empty() => {}
        None => handle
            .data(channel, CryptoVec::from_slice(result.output()))
            .await
            .ok()?,
        Some(error) => {
            let message = format!("error: {error}\n");
            handle
                .extended_data(channel, STDERR_STREAM, CryptoVec::from_slice(message.as_bytes()))
                .await
                .ok()?;
        }
    }
    handle
        .exit_status_request(channel, result.exit_status())
        .await
        .ok()?;
    handle.eof(channel).await.ok()?;
    handle.close(channel).await.ok()
}
