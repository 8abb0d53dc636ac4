//! Session Manager
//!
//! Registry of callers and their current session. Each caller has a slot
//! with its own launch lock, so runs from one caller are handled strictly
//! one after another while different callers proceed concurrently, up to
//! `sessions.max_active` live sessions in total.
//!
//! Every failure is reported to the caller as an `output` event followed by
//! `status: error`; nothing escapes as an `Err`.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use super::{ClientId, SessionControl, SessionInfo};
use crate::builder::Builder;
use crate::config::{Config, RunPolicy};
use crate::error::{Error, Result};
use crate::models::{advance, Language, RunRequest, SessionStatus, TerminalStatus};
use crate::protocol::{ClientEvent, EventSink, STOP_ACK};
use crate::pty::{RunCommand, TerminalSession};
use crate::relay::OutputRelay;
use crate::workspace::Workspace;

/// A launched session as seen from the registry
struct ActiveSession {
    control: SessionControl,
    status_rx: watch::Receiver<SessionStatus>,
    relay: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

impl ActiveSession {
    /// Not finalized yet, and the relay has not died without finalizing
    fn is_live(&self) -> bool {
        !self.relay.is_finished() && !self.status_rx.borrow().is_terminal()
    }
}

/// Per-caller registry entry
#[derive(Default)]
struct ClientSlot {
    /// Held for the whole of a run's launch, and while retiring the
    /// previous session
    launch: Arc<Mutex<()>>,
    active: Option<ActiveSession>,
}

/// Per-caller session registry
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<Config>,
    builder: Arc<Builder>,
    slots: Arc<RwLock<HashMap<ClientId, ClientSlot>>>,
    permits: Arc<Semaphore>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: Config) -> Self {
        let permits = Arc::new(Semaphore::new(config.sessions.max_active));
        let builder = Arc::new(Builder::new(config.toolchain.clone()));
        Self {
            config: Arc::new(config),
            builder,
            slots: Arc::new(RwLock::new(HashMap::new())),
            permits,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one inbound event
    ///
    /// Runs are launched on their own task so the caller's event loop never
    /// waits on a build or a program; the handle is returned for callers
    /// that want to wait for the launch to complete.
    pub async fn dispatch(
        &self,
        client: &ClientId,
        event: ClientEvent,
        sink: &EventSink,
    ) -> Option<JoinHandle<()>> {
        debug!("Client {} sent {}", client, event.name());
        match event {
            ClientEvent::RunCode { code, lang } => {
                let manager = self.clone();
                let client = client.clone();
                let sink = sink.clone();
                Some(tokio::spawn(async move {
                    manager.run_code(&client, code, lang.as_deref(), &sink).await;
                }))
            }
            ClientEvent::SendInput { input } => {
                self.input(client, &input).await;
                None
            }
            ClientEvent::StopCode => {
                self.stop(client, sink).await;
                None
            }
        }
    }

    /// Resolve the language selector, then [`run`](Self::run)
    pub async fn run_code(
        &self,
        client: &ClientId,
        code: String,
        lang: Option<&str>,
        sink: &EventSink,
    ) -> Option<String> {
        match Language::from_selector(lang) {
            Ok(language) => self.run(client, RunRequest::new(code, language), sink).await,
            Err(e) => {
                info!("Client {} asked for {}", client, e);
                sink.fail(&e);
                None
            }
        }
    }

    /// Launch a run for `client`, replacing (or refusing, per policy) its
    /// current session
    ///
    /// Returns the new session id once the program is running.
    pub async fn run(
        &self,
        client: &ClientId,
        request: RunRequest,
        sink: &EventSink,
    ) -> Option<String> {
        let session_id = self.launch_run(client, request, sink).await;
        if session_id.is_none() && sink.is_closed() {
            self.forget_idle_slot(client).await;
        }
        session_id
    }

    async fn launch_run(
        &self,
        client: &ClientId,
        request: RunRequest,
        sink: &EventSink,
    ) -> Option<String> {
        let launch = self.launch_lock(client).await;
        let _launch_guard = launch.lock().await;

        if let Err(e) = self.retire_current(client).await {
            info!("Run from {} refused: {}", client, e);
            sink.fail(&e);
            return None;
        }

        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let e = Error::SessionLimitReached {
                    limit: self.config.sessions.max_active,
                };
                warn!("Run from {} refused: {}", client, e);
                sink.fail(&e);
                return None;
            }
        };

        info!("Run request from {} ({})", client, request.language);

        let mut workspace = match Workspace::materialize(
            &request.source,
            request.language,
            &self.config.workspace,
            &self.config.toolchain,
        ) {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!("Workspace for {} failed: {}", client, e);
                sink.fail(&e);
                return None;
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Starting);

        if request.language.needs_build() {
            let failure = match self.builder.build(&workspace).await {
                Ok(result) if result.success => None,
                Ok(result) => Some(result.user_message()),
                Err(e) => Some(e.user_message()),
            };
            if let Some(message) = failure {
                advance(&status_tx, SessionStatus::BuildError);
                workspace.cleanup();
                sink.output(message);
                sink.status(TerminalStatus::Error);
                return None;
            }
        }

        let launched = RunCommand::for_workspace(&workspace, &self.config.toolchain).and_then(
            |command| {
                TerminalSession::launch(
                    &workspace,
                    &command,
                    &self.config.pty,
                    self.config.relay.chunk_size,
                )
            },
        );
        let terminal = match launched {
            Ok(terminal) => terminal,
            Err(e) => {
                warn!("Launch for {} failed: {}", client, e);
                advance(&status_tx, SessionStatus::SpawnError);
                workspace.cleanup();
                sink.fail(&e);
                return None;
            }
        };
        advance(&status_tx, SessionStatus::Running);

        let (reader, terminal_control) = terminal.split();
        let wake = Arc::new(Notify::new());
        let control = SessionControl::new(session_id.clone(), terminal_control, Arc::clone(&wake));
        let relay = OutputRelay::new(
            session_id.clone(),
            reader,
            workspace,
            sink.clone(),
            status_tx,
            wake,
            self.config.relay.poll_interval(),
        );

        let relay_sink = sink.clone();
        let relay_id = session_id.clone();
        let handle = tokio::spawn(async move {
            // The workspace cleans itself up on unwind; the caller still
            // needs its final status
            if AssertUnwindSafe(relay.run()).catch_unwind().await.is_err() {
                error!("Relay for session {} panicked", relay_id);
                relay_sink.status(TerminalStatus::Finished);
            }
            drop(permit);
        });

        let active = ActiveSession {
            control,
            status_rx,
            relay: handle,
            started_at: Utc::now(),
        };

        let mut slots = self.slots.write().await;
        match slots.get_mut(client) {
            Some(slot) if !sink.is_closed() => {
                slot.active = Some(active);
            }
            _ => {
                debug!("Client {} left during launch of {}", client, session_id);
                slots.remove(client);
                drop(slots);
                let _ = active.control.cancel();
                self.spawn_escalation(active.control, active.status_rx);
            }
        }

        Some(session_id)
    }

    /// Forward one line of input to the caller's live session
    pub async fn input(&self, client: &ClientId, text: &str) -> bool {
        let slots = self.slots.read().await;
        match slots.get(client).and_then(|slot| slot.active.as_ref()) {
            Some(active) if active.is_live() => {
                active.control.forward_input(text);
                true
            }
            _ => {
                debug!("Input from {} with no live session dropped", client);
                false
            }
        }
    }

    /// Stop the caller's live session
    ///
    /// The acknowledgement goes out immediately; `status: finished` follows
    /// once the relay sees the program exit. A program still alive after the
    /// kill grace period gets SIGKILL.
    pub async fn stop(&self, client: &ClientId, sink: &EventSink) -> bool {
        let target = {
            let slots = self.slots.read().await;
            slots
                .get(client)
                .and_then(|slot| slot.active.as_ref())
                .filter(|active| active.is_live())
                .map(|active| (active.control.clone(), active.status_rx.clone()))
        };
        let Some((control, status_rx)) = target else {
            debug!("Stop from {} with no live session", client);
            return false;
        };

        // The ack must precede the relay's final status
        sink.output(STOP_ACK);
        let _ = control.cancel();
        self.spawn_escalation(control, status_rx);
        true
    }

    /// Forget a caller, stopping its session if one is live
    pub async fn disconnect(&self, client: &ClientId) {
        let slot = self.slots.write().await.remove(client);
        let Some(active) = slot.and_then(|slot| slot.active) else {
            return;
        };
        if active.is_live() {
            info!("Client {} disconnected with a live session", client);
            let _ = active.control.cancel();
            self.spawn_escalation(active.control, active.status_rx);
        }
    }

    /// Stop every session and wait for all of them to finalize
    pub async fn shutdown(&self) {
        let sessions: Vec<ActiveSession> = {
            let mut slots = self.slots.write().await;
            slots.drain().filter_map(|(_, slot)| slot.active).collect()
        };
        info!("Shutting down {} session(s)", sessions.len());
        join_all(sessions.into_iter().map(|s| self.finish_session(s))).await;
    }

    /// Status of the caller's current session
    pub async fn status(&self, client: &ClientId) -> Option<SessionStatus> {
        let slots = self.slots.read().await;
        let active = slots.get(client)?.active.as_ref()?;
        let status = *active.status_rx.borrow();
        Some(status)
    }

    /// Snapshot of the caller's current session
    pub async fn session_info(&self, client: &ClientId) -> Option<SessionInfo> {
        let slots = self.slots.read().await;
        let active = slots.get(client)?.active.as_ref()?;
        let status = *active.status_rx.borrow();
        Some(SessionInfo {
            session_id: active.control.session_id().to_string(),
            status,
            pid: active.control.pid(),
            started_at: active.started_at,
        })
    }

    /// Wait until the caller's current session reaches a terminal status
    pub async fn wait_finished(&self, client: &ClientId) {
        let status_rx = {
            let slots = self.slots.read().await;
            slots
                .get(client)
                .and_then(|slot| slot.active.as_ref())
                .map(|active| active.status_rx.clone())
        };
        if let Some(mut status_rx) = status_rx {
            if status_rx.wait_for(|status| status.is_terminal()).await.is_err() {
                debug!("Relay for {} went away without finalizing", client);
            }
        }
    }

    /// Callers with a registry slot
    pub async fn client_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Sessions currently holding a permit
    pub fn active_sessions(&self) -> usize {
        self.config.sessions.max_active - self.permits.available_permits()
    }

    async fn launch_lock(&self, client: &ClientId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.write().await;
        Arc::clone(&slots.entry(client.clone()).or_default().launch)
    }

    /// Drop a departed caller's slot that a failed run re-created
    async fn forget_idle_slot(&self, client: &ClientId) {
        let mut slots = self.slots.write().await;
        let idle = slots
            .get(client)
            .is_some_and(|slot| slot.active.as_ref().map_or(true, |active| !active.is_live()));
        if idle {
            debug!("Forgetting slot of departed client {}", client);
            slots.remove(client);
        }
    }

    /// Take the caller's current session out of its slot and see it through
    /// finalization, or refuse if the policy forbids replacing it
    async fn retire_current(&self, client: &ClientId) -> Result<()> {
        let previous = {
            let mut slots = self.slots.write().await;
            let Some(slot) = slots.get_mut(client) else {
                return Ok(());
            };
            let live_id = slot
                .active
                .as_ref()
                .filter(|active| active.is_live())
                .map(|active| active.control.session_id().to_string());
            if let (Some(session_id), RunPolicy::Reject) =
                (live_id, self.config.sessions.run_policy)
            {
                return Err(Error::SessionBusy { session_id });
            }
            slot.active.take()
        };

        if let Some(active) = previous {
            debug!(
                "Retiring session {} of {}",
                active.control.session_id(),
                client
            );
            self.finish_session(active).await;
        }
        Ok(())
    }

    /// Cancel if live, then wait for the relay, escalating to SIGKILL
    async fn finish_session(&self, active: ActiveSession) {
        let live = active.is_live();
        let ActiveSession {
            control, mut relay, ..
        } = active;

        if live {
            let _ = control.cancel();
        }
        if timeout(self.config.sessions.kill_grace(), &mut relay)
            .await
            .is_err()
        {
            let _ = control.force_kill();
            if let Err(e) = relay.await {
                error!("Relay task for session {} failed: {}", control.session_id(), e);
            }
        }
    }

    fn spawn_escalation(
        &self,
        control: SessionControl,
        mut status_rx: watch::Receiver<SessionStatus>,
    ) {
        let grace = self.config.sessions.kill_grace();
        tokio::spawn(async move {
            let finished = timeout(grace, status_rx.wait_for(|status| status.is_terminal()))
                .await
                .is_ok();
            if !finished {
                let _ = control.force_kill();
            }
        });
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("max_active", &self.config.sessions.max_active)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}
